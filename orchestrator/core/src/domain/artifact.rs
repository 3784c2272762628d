// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Deployment Artifact
//!
//! An artifact is the packaged bundle uploaded for one deploy or update run:
//! the project tree minus excluded patterns, the dependency closure, the
//! entry point at [`ENTRY_POINT_NAME`] and a generated settings file at
//! [`GENERATED_SETTINGS_NAME`]. It is written once and never modified.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::deployment::DeploymentIdentity;
use crate::domain::settings::ResolvedSettings;

/// Archive-root path of the entry-point executable
pub const ENTRY_POINT_NAME: &str = "bootstrap";

/// Handler symbol registered with the function platform
pub const ENTRY_POINT_HANDLER: &str = "bootstrap.handler";

/// Archive-root path of the generated settings file
pub const GENERATED_SETTINGS_NAME: &str = "lambdaport_settings.env";

/// Patterns excluded from every artifact in addition to the user's list
pub const BUILTIN_EXCLUDES: [&str; 2] = ["*.tar.gz", ".git"];

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("Entry point {} does not exist", .0.display())]
    EntryPointMissing(PathBuf),

    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("I/O error while packaging {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Packaging task failed: {0}")]
    Task(String),
}

impl PackageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PackageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// The generated settings file injected at the archive root.
///
/// Application settings (dotenv syntax) followed by the automatically added
/// block the adapter reads at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSettings {
    contents: String,
}

impl GeneratedSettings {
    pub fn render(application_settings: &str, settings: &ResolvedSettings) -> Self {
        let mut contents = application_settings.to_string();
        if !contents.is_empty() && !contents.ends_with('\n') {
            contents.push('\n');
        }

        contents.push_str("\n# Automatically added by lambdaport:\n");
        push_var(&mut contents, "SCRIPT_NAME", &settings.mount_path());
        if settings.event_echo {
            push_var(&mut contents, "EVENT_ECHO", "true");
        }
        if let Some(challenge) = &settings.lets_encrypt {
            push_var(&mut contents, "LETS_ENCRYPT_CHALLENGE_PATH", &challenge.path);
            push_var(&mut contents, "LETS_ENCRYPT_CHALLENGE_CONTENT", &challenge.content);
        }

        Self { contents }
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }
}

fn push_var(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push_str("=\"");
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '$' => out.push_str("\\$"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push_str("\"\n");
}

/// Everything a packager needs to build one artifact
#[derive(Debug, Clone)]
pub struct PackageRequest {
    pub identity: DeploymentIdentity,
    pub project_dir: PathBuf,
    pub output_dir: PathBuf,
    pub exclude: Vec<String>,
    pub dependency_dirs: Vec<PathBuf>,
    pub entry_point: PathBuf,
    pub generated_settings: GeneratedSettings,
}

/// A packaged bundle on local disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    path: PathBuf,
    identity: DeploymentIdentity,
}

impl Artifact {
    pub fn new(path: PathBuf, identity: DeploymentIdentity) -> Self {
        Self { path, identity }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Object key used in the artifact store
    pub fn key(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.tar.gz", self.identity))
    }

    pub fn remove_local(&self) -> std::io::Result<()> {
        std::fs::remove_file(&self.path)
    }
}

/// Builds artifacts from a project directory
pub trait ArtifactPackager: Send + Sync {
    fn package(&self, request: &PackageRequest) -> Result<Artifact, PackageError>;
}
