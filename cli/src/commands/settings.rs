// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Settings commands
//!
//! Commands: validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use lambdaport_core::settings::ResolvedSettings;

use super::EnvironmentArgs;

const SAMPLE_SETTINGS: &str = include_str!("../../templates/settings.json");

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Resolve one environment and print the effective settings
    Validate {
        #[command(flatten)]
        target: EnvironmentArgs,
    },

    /// Write a sample settings document
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./lambdaport_settings.json")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(command: SettingsCommand) -> Result<()> {
    match command {
        SettingsCommand::Validate { target } => validate(&target),
        SettingsCommand::Generate { output, force } => generate(&output, force),
    }
}

fn validate(target: &EnvironmentArgs) -> Result<()> {
    println!("Validating settings...");

    let settings = ResolvedSettings::from_file(&target.environment, &target.settings)
        .with_context(|| format!("Settings for '{}' are invalid", target.environment))?;

    println!("{}", "✓ Settings are valid".green());
    println!();
    println!("{}", "Resolved settings:".bold());
    println!("  Identity: {}", settings.identity());
    println!("  Bucket: {}", settings.s3_bucket);
    println!("  Application settings: {}", settings.settings_file.display());
    println!("  Memory: {} MB, timeout {} s", settings.memory_size, settings.timeout_seconds);
    let mount = settings.mount_path();
    println!(
        "  Mount path: {}",
        if mount.is_empty() { "(root)".to_string() } else { mount }
    );
    if let Some(domain) = &settings.domain {
        println!("  Domain: {}", domain);
    }
    if !settings.exclude.is_empty() {
        println!("  Exclude: {}", settings.exclude.join(", "));
    }
    if !settings.vpc_config.is_empty() {
        println!(
            "  VPC: {} subnets, {} security groups",
            settings.vpc_config.subnet_ids.len(),
            settings.vpc_config.security_group_ids.len()
        );
    }

    Ok(())
}

fn generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }

    std::fs::write(output, SAMPLE_SETTINGS)
        .with_context(|| format!("Failed to write settings to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Settings generated: {}", output.display()).green()
    );

    Ok(())
}
