// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Deployment Lifecycle Types
//!
//! A deployment walks a fixed sequence of stages. Nothing is rolled back when a
//! later stage fails, so the stage reached is carried on every error and on the
//! final report. Operators use it to clean up or resume by hand.
//!
//! ```text
//! Resolved ─▶ Packaged ─▶ Published ─▶ FunctionRegistered ─▶ Routed ─▶ Deployed ─▶ Verified ─▶ CleanedUp
//!                                              │                                      ▲
//!                                              └──────────── update ──────────────────┘ (skips Routed/Deployed/Verified)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::artifact::PackageError;
use crate::domain::platform::RemoteProvisioningError;

/// Stable `{project}-{environment}` name of one remote function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentIdentity(String);

impl DeploymentIdentity {
    pub fn new(project_name: &str, environment: &str) -> Self {
        Self(format!("{}-{}", project_name, environment))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStage {
    Resolved,
    Packaged,
    Published,
    FunctionRegistered,
    Routed,
    Deployed,
    Verified,
    CleanedUp,
}

impl DeploymentStage {
    pub fn label(&self) -> &'static str {
        match self {
            DeploymentStage::Resolved => "resolved",
            DeploymentStage::Packaged => "packaged",
            DeploymentStage::Published => "published",
            DeploymentStage::FunctionRegistered => "function-registered",
            DeploymentStage::Routed => "routed",
            DeploymentStage::Deployed => "deployed",
            DeploymentStage::Verified => "verified",
            DeploymentStage::CleanedUp => "cleaned-up",
        }
    }
}

impl fmt::Display for DeploymentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentKind {
    /// Create the function, its routes and the stage
    Deploy,
    /// Re-publish code into an existing function
    Update,
}

impl DeploymentKind {
    /// Whether the pipeline may enter `stage` at all
    pub fn includes(&self, stage: DeploymentStage) -> bool {
        match self {
            DeploymentKind::Deploy => true,
            DeploymentKind::Update => !matches!(
                stage,
                DeploymentStage::Routed | DeploymentStage::Deployed | DeploymentStage::Verified
            ),
        }
    }
}

/// Progress of one orchestrator run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub identity: DeploymentIdentity,
    pub kind: DeploymentKind,
    pub completed: Vec<DeploymentStage>,
    pub function_arn: Option<String>,
    pub endpoint_url: Option<String>,
}

impl DeploymentReport {
    pub fn new(identity: DeploymentIdentity, kind: DeploymentKind) -> Self {
        Self {
            identity,
            kind,
            completed: vec![DeploymentStage::Resolved],
            function_arn: None,
            endpoint_url: None,
        }
    }

    /// Record that `stage` completed.
    ///
    /// Stages only move forward and never outside the plan for `kind`.
    pub fn advance(&mut self, stage: DeploymentStage) {
        debug_assert!(self.kind.includes(stage), "{} is not part of {:?}", stage, self.kind);
        debug_assert!(self.last_stage() < stage, "stage {} after {}", stage, self.last_stage());
        tracing::debug!(identity = %self.identity, stage = %stage, "Deployment stage completed");
        self.completed.push(stage);
    }

    pub fn last_stage(&self) -> DeploymentStage {
        self.completed
            .last()
            .copied()
            .unwrap_or(DeploymentStage::Resolved)
    }

    pub fn reached(&self, stage: DeploymentStage) -> bool {
        self.completed.contains(&stage)
    }
}

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("Packaging failed: {0}")]
    Package(#[from] PackageError),

    #[error("Deployment of {identity} stopped after stage '{reached}': {source}")]
    Remote {
        identity: DeploymentIdentity,
        reached: DeploymentStage,
        #[source]
        source: RemoteProvisioningError,
    },
}

impl DeploymentError {
    /// Last stage that completed before the failure
    pub fn reached(&self) -> DeploymentStage {
        match self {
            DeploymentError::Package(_) => DeploymentStage::Resolved,
            DeploymentError::Remote { reached, .. } => *reached,
        }
    }
}
