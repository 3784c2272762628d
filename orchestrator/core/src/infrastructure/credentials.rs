// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Environment Credential Provider
//!
//! Reads the control-plane access token (and optional region) from process
//! environment variables. The CLI loads `.env` into the environment first.

use async_trait::async_trait;

use crate::domain::platform::{CredentialProvider, Credentials, RemoteProvisioningError};

pub const ACCESS_TOKEN_VAR: &str = "LAMBDAPORT_ACCESS_TOKEN";
pub const REGION_VAR: &str = "LAMBDAPORT_REGION";

#[derive(Debug, Clone)]
pub struct EnvCredentialProvider {
    token_var: String,
    region_var: String,
    default_region: Option<String>,
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self {
            token_var: ACCESS_TOKEN_VAR.to_string(),
            region_var: REGION_VAR.to_string(),
            default_region: None,
        }
    }
}

impl EnvCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Region used when the region variable is unset
    pub fn with_default_region(mut self, region: impl Into<String>) -> Self {
        self.default_region = Some(region.into());
        self
    }

    #[cfg(test)]
    fn with_vars(token_var: &str, region_var: &str) -> Self {
        Self {
            token_var: token_var.to_string(),
            region_var: region_var.to_string(),
            default_region: None,
        }
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn load_credentials(&self) -> Result<Credentials, RemoteProvisioningError> {
        let access_token = std::env::var(&self.token_var)
            .ok()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| {
                RemoteProvisioningError::Credentials(format!("{} is not set", self.token_var))
            })?;

        let region = std::env::var(&self.region_var)
            .ok()
            .filter(|region| !region.is_empty())
            .or_else(|| self.default_region.clone());

        Ok(Credentials { access_token, region })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_token_is_credentials_error() {
        let provider = EnvCredentialProvider::with_vars(
            "LAMBDAPORT_TEST_TOKEN_UNSET",
            "LAMBDAPORT_TEST_REGION_UNSET",
        );
        let err = provider.load_credentials().await.unwrap_err();
        assert!(matches!(err, RemoteProvisioningError::Credentials(_)));
    }

    #[tokio::test]
    async fn test_default_region_applies() {
        std::env::set_var("LAMBDAPORT_TEST_TOKEN_SET", "abc");
        let provider = EnvCredentialProvider::with_vars(
            "LAMBDAPORT_TEST_TOKEN_SET",
            "LAMBDAPORT_TEST_REGION_UNSET",
        )
        .with_default_region("eu-west-1");

        let credentials = provider.load_credentials().await.unwrap();
        assert_eq!(credentials.access_token, "abc");
        assert_eq!(credentials.region.as_deref(), Some("eu-west-1"));
    }
}
