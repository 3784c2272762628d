// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Remote Service Traits - Anti-Corruption Layer for the hosting provider
//!
//! The orchestrator only ever talks to the artifact store, the function
//! platform, the routing layer and the log service through these traits.
//! Concrete adapters live in `infrastructure`; in-memory doubles live in
//! `infrastructure::mock`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::domain::logs::LogEvent;
use crate::domain::settings::VpcConfig;

/// Any failure of an external service call. Never retried.
#[derive(Debug, Error)]
pub enum RemoteProvisioningError {
    #[error("Credentials unavailable: {0}")]
    Credentials(String),

    #[error("{service} request failed: {message}")]
    Request {
        service: &'static str,
        message: String,
    },

    #[error("{service} rejected the request with HTTP {status}: {message}")]
    Rejected {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{service} resource not found: {resource}")]
    NotFound {
        service: &'static str,
        resource: String,
    },

    #[error("Malformed {service} response: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub region: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

/// Location of an uploaded artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreReference {
    pub bucket: String,
    pub key: String,
}

impl fmt::Display for StoreReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionArn(pub String);

impl FunctionArn {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApiId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub String);

/// A freshly created routing API and its root resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestApi {
    pub id: ApiId,
    pub root_resource_id: ResourceId,
}

/// Function registration request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub code: StoreReference,
    pub handler: String,
    pub memory_size: u32,
    pub timeout_seconds: u32,
    pub vpc_config: VpcConfig,
    pub role_arn: String,
}

/// How the routing layer maps one function outcome to an HTTP status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationResponse {
    pub status: u16,
    /// Regex over the function's failure message. `None` marks the default
    /// (successful) response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection_pattern: Option<String>,
}

/// One method on one route resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSpec {
    pub http_method: String,
    pub function_arn: FunctionArn,
    pub integration_responses: Vec<IntegrationResponse>,
    pub method_response_codes: Vec<u16>,
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn load_credentials(&self) -> Result<Credentials, RemoteProvisioningError>;
}

#[async_trait]
pub trait IdentityManager: Send + Sync {
    /// Return the execution role's ARN, creating the role if it does not exist
    async fn ensure_execution_role(
        &self,
        credentials: &Credentials,
        role_name: &str,
    ) -> Result<String, RemoteProvisioningError>;
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn upload(
        &self,
        credentials: &Credentials,
        artifact: &Path,
        bucket: &str,
        key: &str,
    ) -> Result<StoreReference, RemoteProvisioningError>;

    async fn remove(
        &self,
        credentials: &Credentials,
        reference: &StoreReference,
    ) -> Result<(), RemoteProvisioningError>;
}

#[async_trait]
pub trait FunctionPlatform: Send + Sync {
    async fn create_function(
        &self,
        credentials: &Credentials,
        spec: &FunctionSpec,
    ) -> Result<FunctionArn, RemoteProvisioningError>;

    async fn update_function_code(
        &self,
        credentials: &Credentials,
        function_name: &str,
        code: &StoreReference,
    ) -> Result<FunctionArn, RemoteProvisioningError>;
}

#[async_trait]
pub trait RoutingLayer: Send + Sync {
    async fn create_api(
        &self,
        credentials: &Credentials,
        name: &str,
    ) -> Result<RestApi, RemoteProvisioningError>;

    async fn create_resource(
        &self,
        credentials: &Credentials,
        api: &ApiId,
        parent: &ResourceId,
        path_part: &str,
    ) -> Result<ResourceId, RemoteProvisioningError>;

    async fn create_method(
        &self,
        credentials: &Credentials,
        api: &ApiId,
        resource: &ResourceId,
        method: &MethodSpec,
    ) -> Result<(), RemoteProvisioningError>;

    /// Publish the API under `stage` and return its public endpoint URL
    async fn deploy_stage(
        &self,
        credentials: &Credentials,
        api: &ApiId,
        stage: &str,
    ) -> Result<String, RemoteProvisioningError>;
}

#[async_trait]
pub trait LogSource: Send + Sync {
    /// Fetch the visible log window of `function_name`.
    ///
    /// `start_time` (epoch milliseconds) is a hint; sources may return older
    /// events too.
    async fn fetch_logs(
        &self,
        credentials: &Credentials,
        function_name: &str,
        start_time: Option<i64>,
    ) -> Result<Vec<LogEvent>, RemoteProvisioningError>;
}

#[async_trait]
pub trait EndpointProbe: Send + Sync {
    /// Issue one request to `url` and return the HTTP status
    async fn touch(&self, url: &str) -> Result<u16, RemoteProvisioningError>;
}

/// Bundle of the remote services a deployment run needs
#[derive(Clone)]
pub struct RemoteServices {
    pub credentials: Arc<dyn CredentialProvider>,
    pub identity: Arc<dyn IdentityManager>,
    pub store: Arc<dyn ArtifactStore>,
    pub functions: Arc<dyn FunctionPlatform>,
    pub routing: Arc<dyn RoutingLayer>,
    pub probe: Arc<dyn EndpointProbe>,
}

/// Pause between route-creation sub-steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDelay(pub Duration);

impl RateLimitDelay {
    pub async fn wait(&self) {
        if !self.0.is_zero() {
            tokio::time::sleep(self.0).await;
        }
    }
}
