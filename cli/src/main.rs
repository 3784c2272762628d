// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # lambdaport CLI
//!
//! Packages a request/response web application, provisions it on a
//! serverless function platform and follows its logs.
//!
//! ## Commands
//!
//! - `lambdaport deploy <env> [settings]` - First deployment: function, routes, stage
//! - `lambdaport update <env> [settings]` - Re-publish code into the existing function
//! - `lambdaport tail <env> [settings]` - Follow the function's logs until Ctrl+C
//! - `lambdaport settings validate|generate` - Settings document management
//!
//! Remote calls go through the control plane at `--control-plane-url`, using
//! the access token in `LAMBDAPORT_ACCESS_TOKEN` (a `.env` file is honoured).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::debug;

use lambdaport::commands::{self, EnvironmentArgs, GlobalOptions, SettingsCommand};

/// lambdaport - serverless deployment for web applications
#[derive(Parser, Debug)]
#[command(name = "lambdaport")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LAMBDAPORT_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Base URL of the control plane
    #[arg(long, global = true, env = "LAMBDAPORT_CONTROL_PLANE_URL", value_name = "URL")]
    control_plane_url: Option<String>,

    /// Project directory to package (default: the settings document's directory)
    #[arg(long, global = true, value_name = "DIR")]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Package and deploy an environment for the first time
    Deploy {
        #[command(flatten)]
        target: EnvironmentArgs,
    },

    /// Package and publish new code for an existing deployment
    Update {
        #[command(flatten)]
        target: EnvironmentArgs,
    },

    /// Follow the deployed function's logs
    Tail(commands::tail::TailArgs),

    /// Settings document management
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before parsing, so clap's env fallbacks see values from .env
    let env_file = load_env_file(None)?;
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;
    if let Some(path) = env_file {
        debug!(path = %path.display(), "Loaded environment file");
    }

    let options = GlobalOptions {
        control_plane_url: cli.control_plane_url,
        project_dir: cli.project_dir,
    };

    match cli.command {
        Commands::Deploy { target } => commands::deploy::deploy(target, &options).await,
        Commands::Update { target } => commands::deploy::update(target, &options).await,
        Commands::Tail(args) => commands::tail::execute(args, &options).await,
        Commands::Settings { command } => commands::settings::handle_command(command).await,
    }
}

/// Load `path`, or `.env` from the current directory or its parents.
///
/// A missing file is not an error.
fn load_env_file(path: Option<&Path>) -> Result<Option<PathBuf>> {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path).map(|()| path.to_path_buf()),
        None => dotenvy::dotenv(),
    };
    match loaded {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e).context("Failed to load .env file"),
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_tail_parses_interval() {
        let cli = Cli::try_parse_from([
            "lambdaport",
            "tail",
            "production",
            "settings.json",
            "--interval-ms",
            "250",
        ])
        .unwrap();

        match cli.command {
            Commands::Tail(args) => {
                assert_eq!(args.target.environment, "production");
                assert_eq!(args.target.settings, PathBuf::from("settings.json"));
                assert_eq!(args.interval_ms, 250);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_env_file_feeds_flag_fallbacks() {
        let dir = tempfile::TempDir::new().unwrap();
        let env_file = dir.path().join(".env");
        std::fs::write(&env_file, "LAMBDAPORT_CONTROL_PLANE_URL=http://plane.internal:8080\n").unwrap();

        let loaded = load_env_file(Some(&env_file)).unwrap();
        assert_eq!(loaded, Some(env_file));

        let cli = Cli::try_parse_from(["lambdaport", "settings", "generate"]).unwrap();
        assert_eq!(cli.control_plane_url.as_deref(), Some("http://plane.internal:8080"));
    }

    #[test]
    fn test_missing_env_file_is_ignored() {
        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(load_env_file(Some(&dir.path().join(".env"))).unwrap(), None);
    }

    #[test]
    fn test_settings_document_has_default() {
        let cli = Cli::try_parse_from(["lambdaport", "deploy", "dev"]).unwrap();
        match cli.command {
            Commands::Deploy { target } => {
                assert_eq!(target.settings, PathBuf::from("lambdaport_settings.json"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
