// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::domain::platform::{EndpointProbe, RemoteProvisioningError};

const SERVICE: &str = "endpoint";

/// Issues the post-deploy warm-up GET
pub struct HttpEndpointProbe {
    client: Client,
}

impl HttpEndpointProbe {
    pub fn new(timeout: Duration) -> Result<Self, RemoteProvisioningError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteProvisioningError::Request {
                service: SERVICE,
                message: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EndpointProbe for HttpEndpointProbe {
    /// Any HTTP status counts as an answer; only transport failures are errors
    async fn touch(&self, url: &str) -> Result<u16, RemoteProvisioningError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RemoteProvisioningError::Request {
                service: SERVICE,
                message: e.to_string(),
            })?;
        Ok(response.status().as_u16())
    }
}
