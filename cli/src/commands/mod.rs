// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the lambdaport CLI

use clap::Args;
use std::path::{Path, PathBuf};

pub mod deploy;
pub mod settings;
pub mod tail;

pub use self::settings::SettingsCommand;

/// Environment name plus the settings document it is resolved from
#[derive(Args, Debug, Clone)]
pub struct EnvironmentArgs {
    /// Environment key in the settings document (e.g. dev, production)
    #[arg(value_name = "ENVIRONMENT")]
    pub environment: String,

    /// Settings document (JSON keyed by environment)
    #[arg(value_name = "SETTINGS", default_value = "lambdaport_settings.json")]
    pub settings: PathBuf,
}

/// Options shared by every command that reaches the remote services
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub control_plane_url: Option<String>,
    pub project_dir: Option<PathBuf>,
}

impl GlobalOptions {
    /// `--project-dir`, else the directory holding the settings document
    pub fn project_dir(&self, settings: &Path) -> PathBuf {
        if let Some(dir) = &self.project_dir {
            return dir.clone();
        }
        match settings.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_dir_defaults_to_settings_parent() {
        let options = GlobalOptions {
            control_plane_url: None,
            project_dir: None,
        };
        assert_eq!(
            options.project_dir(Path::new("apps/blog/lambdaport_settings.json")),
            PathBuf::from("apps/blog")
        );
        assert_eq!(
            options.project_dir(Path::new("lambdaport_settings.json")),
            PathBuf::from(".")
        );
    }

    #[test]
    fn test_project_dir_flag_wins() {
        let options = GlobalOptions {
            control_plane_url: None,
            project_dir: Some(PathBuf::from("/srv/blog")),
        };
        assert_eq!(
            options.project_dir(Path::new("apps/blog/lambdaport_settings.json")),
            PathBuf::from("/srv/blog")
        );
    }
}
