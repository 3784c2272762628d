// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Deployment Settings
//!
//! Resolves one environment out of a JSON settings document into a typed
//! [`ResolvedSettings`] value. Resolution is pure apart from a single
//! filesystem existence check on the application settings file, so a
//! [`SettingsError`] is always raised before any remote side effect.
//!
//! # Document shape
//!
//! ```json
//! {
//!     "dev": {
//!         "project_name": "blog",
//!         "s3_bucket": "blog-artifacts",
//!         "settings_file": "~/blog/settings.env",
//!         "memory_size": 512
//!     }
//! }
//! ```
//!
//! Keys from [`DEFAULT_SETTINGS`] are filled in only when absent. Keys from
//! [`CUSTOM_SETTINGS`] have no defaults; they are carried over verbatim into
//! [`CustomSettings`] only when the document sets them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::domain::deployment::DeploymentIdentity;

/// Keys every environment must define.
pub const REQUIRED_SETTINGS: [&str; 3] = ["project_name", "s3_bucket", "settings_file"];

/// Operational overrides copied onto the orchestrator configuration when present.
pub const CUSTOM_SETTINGS: [&str; 6] = [
    "http_methods",
    "parameter_depth",
    "integration_response_codes",
    "method_response_codes",
    "role_name",
    "aws_region",
];

/// Default table. Entries fill absent keys and never overwrite present ones.
pub const DEFAULT_SETTINGS: [(&str, DefaultValue); 5] = [
    ("vpc_config", DefaultValue::EmptyObject),
    ("delete_zip", DefaultValue::Bool(true)),
    ("touch", DefaultValue::Bool(true)),
    ("memory_size", DefaultValue::Number(256)),
    ("deploy_delay", DefaultValue::Number(1)),
];

const DEFAULT_TIMEOUT_SECONDS: u32 = 30;

/// A constant entry of the default table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    EmptyObject,
    Bool(bool),
    Number(u64),
}

impl DefaultValue {
    pub fn to_value(self) -> Value {
        match self {
            DefaultValue::EmptyObject => Value::Object(Map::new()),
            DefaultValue::Bool(flag) => Value::Bool(flag),
            DefaultValue::Number(n) => Value::from(n),
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Environment '{0}' is not defined in the settings document")]
    MissingEnvironment(String),

    #[error("Settings for environment '{0}' must be a JSON object")]
    NotAnObject(String),

    #[error("Missing required setting '{key}' for environment '{environment}'")]
    MissingKey {
        environment: String,
        key: &'static str,
    },

    #[error("Invalid settings for environment '{environment}': {source}")]
    Invalid {
        environment: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Please make sure your settings_file is properly defined: {} does not exist", .0.display())]
    SettingsFileNotFound(PathBuf),

    #[error("Failed to read settings document {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings document {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Subnets and security groups the function is attached to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcConfig {
    #[serde(default)]
    pub subnet_ids: Vec<String>,

    #[serde(default)]
    pub security_group_ids: Vec<String>,
}

impl VpcConfig {
    pub fn is_empty(&self) -> bool {
        self.subnet_ids.is_empty() && self.security_group_ids.is_empty()
    }
}

/// Allow-listed overrides. `None` means the document did not set the key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_methods: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_depth: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration_response_codes: Option<Vec<u16>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_response_codes: Option<Vec<u16>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_region: Option<String>,
}

impl CustomSettings {
    /// Copy the allow-listed keys that are present, and nothing else
    fn from_settings(environment: &str, settings: &Map<String, Value>) -> Result<Self, SettingsError> {
        let subset: Map<String, Value> = CUSTOM_SETTINGS
            .iter()
            .filter_map(|key| settings.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect();

        serde_json::from_value(Value::Object(subset)).map_err(|source| SettingsError::Invalid {
            environment: environment.to_string(),
            source,
        })
    }
}

/// Content served for a Let's Encrypt HTTP-01 challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcmeChallenge {
    pub path: String,
    pub content: String,
}

/// Typed view of one environment after defaulting.
#[derive(Debug, Clone, Deserialize)]
struct EnvironmentSettings {
    project_name: String,
    s3_bucket: String,
    settings_file: String,
    vpc_config: VpcConfig,
    memory_size: u32,
    delete_zip: bool,
    touch: bool,
    deploy_delay: f64,
    #[serde(default)]
    timeout: Option<u32>,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default)]
    entry_point: Option<PathBuf>,
    #[serde(default)]
    dependency_dirs: Vec<PathBuf>,
    #[serde(default)]
    event_echo: bool,
    #[serde(default)]
    lets_encrypt_challenge_path: Option<String>,
    #[serde(default)]
    lets_encrypt_challenge_content: Option<String>,
}

/// Settings for one environment, ready for the orchestrator
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub environment: String,
    pub project_name: String,
    pub s3_bucket: String,
    /// Application settings file, `~` already expanded
    pub settings_file: PathBuf,
    pub vpc_config: VpcConfig,
    pub memory_size: u32,
    pub delete_zip: bool,
    pub touch: bool,
    pub deploy_delay: Duration,
    pub timeout_seconds: u32,
    pub domain: Option<String>,
    pub exclude: Vec<String>,
    pub entry_point: Option<PathBuf>,
    pub dependency_dirs: Vec<PathBuf>,
    pub event_echo: bool,
    pub lets_encrypt: Option<AcmeChallenge>,
    pub custom: CustomSettings,
}

impl ResolvedSettings {
    /// Read a settings document from disk and resolve one environment
    pub fn from_file(environment: &str, path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let document: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        resolve(environment, &document)
    }

    pub fn identity(&self) -> DeploymentIdentity {
        DeploymentIdentity::new(&self.project_name, &self.environment)
    }

    /// Mount path injected into the artifact.
    ///
    /// Empty when a custom domain serves the application at its root.
    pub fn mount_path(&self) -> String {
        if self.domain.is_some() {
            String::new()
        } else {
            format!("/{}", self.environment)
        }
    }
}

/// Resolve `environment` out of a raw settings document.
pub fn resolve(environment: &str, document: &Value) -> Result<ResolvedSettings, SettingsError> {
    let mut settings = document
        .get(environment)
        .ok_or_else(|| SettingsError::MissingEnvironment(environment.to_string()))?
        .as_object()
        .cloned()
        .ok_or_else(|| SettingsError::NotAnObject(environment.to_string()))?;

    apply_defaults(&mut settings);

    for key in REQUIRED_SETTINGS {
        if !settings.contains_key(key) {
            return Err(SettingsError::MissingKey {
                environment: environment.to_string(),
                key,
            });
        }
    }

    let custom = CustomSettings::from_settings(environment, &settings)?;
    let typed: EnvironmentSettings =
        serde_json::from_value(Value::Object(settings)).map_err(|source| SettingsError::Invalid {
            environment: environment.to_string(),
            source,
        })?;

    let settings_file = expand_home(&typed.settings_file);
    if !settings_file.is_file() {
        return Err(SettingsError::SettingsFileNotFound(settings_file));
    }

    let deploy_delay = Duration::try_from_secs_f64(typed.deploy_delay).map_err(|_| SettingsError::Invalid {
        environment: environment.to_string(),
        source: serde::de::Error::custom(format!(
            "deploy_delay must be a non-negative number of seconds, got {}",
            typed.deploy_delay
        )),
    })?;

    let lets_encrypt = match (
        typed.lets_encrypt_challenge_path,
        typed.lets_encrypt_challenge_content,
    ) {
        (Some(path), Some(content)) => Some(AcmeChallenge { path, content }),
        _ => None,
    };

    Ok(ResolvedSettings {
        environment: environment.to_string(),
        project_name: typed.project_name,
        s3_bucket: typed.s3_bucket,
        settings_file,
        vpc_config: typed.vpc_config,
        memory_size: typed.memory_size,
        delete_zip: typed.delete_zip,
        touch: typed.touch,
        deploy_delay,
        timeout_seconds: typed.timeout.unwrap_or(DEFAULT_TIMEOUT_SECONDS),
        domain: typed.domain,
        exclude: typed.exclude,
        entry_point: typed.entry_point,
        dependency_dirs: typed.dependency_dirs,
        event_echo: typed.event_echo,
        lets_encrypt,
        custom,
    })
}

/// Fill every absent default-table key. Present keys are left untouched.
pub fn apply_defaults(settings: &mut Map<String, Value>) {
    for (key, value) in DEFAULT_SETTINGS {
        settings.entry(key).or_insert_with(|| value.to_value());
    }
}

/// Expand a leading `~` to the current user's home directory
pub fn expand_home(raw: &str) -> PathBuf {
    let home = match dirs::home_dir() {
        Some(home) => home,
        None => return PathBuf::from(raw),
    };

    if raw == "~" {
        home
    } else if let Some(rest) = raw.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(raw)
    }
}
