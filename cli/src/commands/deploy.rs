// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Deploy and update commands

use anyhow::{Context, Result};
use colored::Colorize;
use std::sync::Arc;

use lambdaport_core::application::deploy::DeploymentOrchestrator;
use lambdaport_core::deployment::{DeploymentError, DeploymentKind, DeploymentReport};
use lambdaport_core::infrastructure::TarballPackager;
use lambdaport_core::settings::ResolvedSettings;

use super::{EnvironmentArgs, GlobalOptions};
use crate::remote;

pub async fn deploy(args: EnvironmentArgs, options: &GlobalOptions) -> Result<()> {
    run(DeploymentKind::Deploy, args, options).await
}

pub async fn update(args: EnvironmentArgs, options: &GlobalOptions) -> Result<()> {
    run(DeploymentKind::Update, args, options).await
}

async fn run(kind: DeploymentKind, args: EnvironmentArgs, options: &GlobalOptions) -> Result<()> {
    let settings = ResolvedSettings::from_file(&args.environment, &args.settings)
        .with_context(|| format!("Failed to resolve settings for '{}'", args.environment))?;

    let plane = remote::control_plane(options.control_plane_url.as_deref())?;
    let services = remote::services(plane, &settings)?;
    let orchestrator = DeploymentOrchestrator::new(
        services,
        Arc::new(TarballPackager::new()),
        options.project_dir(&args.settings),
    );

    let verb = match kind {
        DeploymentKind::Deploy => "Deploying",
        DeploymentKind::Update => "Updating",
    };
    println!("{} {}...", verb, settings.identity().to_string().bold());

    let outcome = match kind {
        DeploymentKind::Deploy => orchestrator.deploy(&settings).await,
        DeploymentKind::Update => orchestrator.update(&settings).await,
    };

    match outcome {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(err) => {
            print_failure(&err);
            Err(err).context(format!("{} {} failed", verb, settings.identity()))
        }
    }
}

fn print_report(report: &DeploymentReport) {
    let done = match report.kind {
        DeploymentKind::Deploy => "Deployed",
        DeploymentKind::Update => "Updated",
    };
    println!("{}", format!("✓ {} {}", done, report.identity).green());

    let stages: Vec<&str> = report.completed.iter().map(|stage| stage.label()).collect();
    println!("  Stages: {}", stages.join(" → ").dimmed());
    if let Some(arn) = &report.function_arn {
        println!("  Function: {}", arn);
    }
    if let Some(url) = &report.endpoint_url {
        println!("  Endpoint: {}", url.cyan());
    }
}

fn print_failure(err: &DeploymentError) {
    if let DeploymentError::Remote { reached, .. } = err {
        eprintln!(
            "{}",
            format!(
                "✗ Stopped after stage '{}'. Nothing was rolled back; clean up or re-run by hand.",
                reached
            )
            .yellow()
        );
    }
}
