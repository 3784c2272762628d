// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Follow the deployed function's logs

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::time::Duration;

use lambdaport_core::application::log_tail::{run_tail, LogTail};
use lambdaport_core::platform::CredentialProvider;
use lambdaport_core::settings::ResolvedSettings;

use super::{EnvironmentArgs, GlobalOptions};
use crate::remote;

#[derive(Args, Debug, Clone)]
pub struct TailArgs {
    #[command(flatten)]
    pub target: EnvironmentArgs,

    /// Milliseconds between polls
    #[arg(long, default_value_t = 1000)]
    pub interval_ms: u64,
}

pub async fn execute(args: TailArgs, options: &GlobalOptions) -> Result<()> {
    let settings = ResolvedSettings::from_file(&args.target.environment, &args.target.settings)
        .with_context(|| format!("Failed to resolve settings for '{}'", args.target.environment))?;

    let plane = remote::control_plane(options.control_plane_url.as_deref())?;
    let credentials = remote::credentials(&settings)
        .load_credentials()
        .await
        .context("Failed to load credentials")?;

    let identity = settings.identity();
    eprintln!(
        "{}",
        format!("Tailing logs for {} (Ctrl+C to stop)", identity).dimmed()
    );

    let tail = LogTail::new(plane, credentials, identity.as_str());
    run_tail(
        tail,
        Duration::from_millis(args.interval_ms),
        remote::shutdown_signal(),
        |event| println!("{}", event.render()),
    )
    .await
    .context("Log tail stopped")?;

    Ok(())
}
