// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Function Runtime Loop
//!
//! Runs inside the deployed function. Pulls one invocation at a time from the
//! platform's runtime API, hands it to the [`ProtocolAdapter`] and posts the
//! outcome back: envelopes to `/response`, signals to `/error`.
//!
//! # API Endpoints
//!
//! - `GET /2018-06-01/runtime/invocation/next` - Block until the next event
//! - `POST /2018-06-01/runtime/invocation/{id}/response` - Success channel
//! - `POST /2018-06-01/runtime/invocation/{id}/error` - Failure channel

use axum::Router;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::application::adapter::{AdapterConfig, AdapterError, ProtocolAdapter, WebApplication};
use crate::domain::artifact::GENERATED_SETTINGS_NAME;
use crate::domain::invocation::AdapterOutcome;

pub const RUNTIME_API_VAR: &str = "AWS_LAMBDA_RUNTIME_API";
pub const TASK_ROOT_VAR: &str = "LAMBDA_TASK_ROOT";
const REQUEST_ID_HEADER: &str = "lambda-runtime-aws-request-id";
const API_VERSION: &str = "2018-06-01";

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Environment variable {0} is not set")]
    MissingEnvironment(&'static str),

    #[error("Runtime API request failed: {0}")]
    Http(String),

    #[error("Runtime API protocol violation: {0}")]
    Protocol(String),

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

impl From<reqwest::Error> for RuntimeError {
    fn from(err: reqwest::Error) -> Self {
        RuntimeError::Http(err.to_string())
    }
}

/// One pending invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub request_id: String,
    pub event: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorReport<'a> {
    error_message: &'a str,
    error_type: &'a str,
}

pub struct RuntimeApiClient {
    client: Client,
    base_url: String,
}

impl RuntimeApiClient {
    /// `api` is `host:port` as the platform provides it, or a full URL
    pub fn new(api: &str) -> Result<Self, RuntimeError> {
        let api = api.trim_end_matches('/');
        let base_url = if api.contains("://") {
            format!("{}/{}/runtime", api, API_VERSION)
        } else {
            format!("http://{}/{}/runtime", api, API_VERSION)
        };
        // No timeout: `next` long-polls until an event arrives
        let client = Client::builder().build()?;
        Ok(Self { client, base_url })
    }

    pub fn from_env() -> Result<Self, RuntimeError> {
        let api = std::env::var(RUNTIME_API_VAR)
            .map_err(|_| RuntimeError::MissingEnvironment(RUNTIME_API_VAR))?;
        Self::new(&api)
    }

    pub async fn next_invocation(&self) -> Result<Invocation, RuntimeError> {
        let url = format!("{}/invocation/next", self.base_url);
        let response = self.client.get(&url).send().await?;

        if response.status() != StatusCode::OK {
            return Err(RuntimeError::Protocol(format!(
                "next invocation returned HTTP {}",
                response.status()
            )));
        }

        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| RuntimeError::Protocol("missing request id header".to_string()))?;
        let event: Value = response.json().await?;

        Ok(Invocation { request_id, event })
    }

    pub async fn send_response(&self, request_id: &str, body: &Value) -> Result<(), RuntimeError> {
        let url = format!("{}/invocation/{}/response", self.base_url, request_id);
        let response = self.client.post(&url).json(body).send().await?;
        accepted(response.status())
    }

    pub async fn send_error(
        &self,
        request_id: &str,
        message: &str,
        error_type: &str,
    ) -> Result<(), RuntimeError> {
        let url = format!("{}/invocation/{}/error", self.base_url, request_id);
        let report = ErrorReport {
            error_message: message,
            error_type,
        };
        let response = self.client.post(&url).json(&report).send().await?;
        accepted(response.status())
    }
}

fn accepted(status: StatusCode) -> Result<(), RuntimeError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(RuntimeError::Protocol(format!("runtime API returned HTTP {}", status)))
    }
}

/// Fetch, handle and answer exactly one invocation
pub async fn process_next<A: WebApplication>(
    client: &RuntimeApiClient,
    adapter: &ProtocolAdapter<A>,
) -> Result<(), RuntimeError> {
    let invocation = client.next_invocation().await?;
    let request_id = invocation.request_id.as_str();
    debug!(request_id, "Handling invocation");

    match adapter.handle(invocation.event).await {
        Ok(AdapterOutcome::Success(envelope)) => {
            client.send_response(request_id, &envelope.to_value()).await
        }
        Ok(outcome) => {
            let error_type = match outcome {
                AdapterOutcome::Redirect(_) => "Redirect",
                _ => "HttpError",
            };
            let signal = outcome.signal().unwrap_or_default();
            client.send_error(request_id, &signal, error_type).await
        }
        Err(err) => {
            warn!(request_id, error = %err, "Invocation rejected");
            let error_type = match err {
                AdapterError::UnsupportedInvocation => "UnsupportedInvocation",
                _ => "AdapterError",
            };
            client.send_error(request_id, &err.to_string(), error_type).await
        }
    }
}

/// Serve invocations until the runtime API itself fails
pub async fn run<A: WebApplication>(
    client: RuntimeApiClient,
    adapter: ProtocolAdapter<A>,
) -> Result<(), RuntimeError> {
    info!(mount_path = %adapter.config().mount_path, "Function runtime started");
    loop {
        match process_next(&client, &adapter).await {
            Ok(()) => {}
            Err(RuntimeError::Protocol(message)) => {
                error!(message = %message, "Runtime API protocol error");
            }
            Err(err) => return Err(err),
        }
    }
}

/// Location of the generated settings file inside the function
pub fn settings_path() -> PathBuf {
    std::env::var(TASK_ROOT_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(GENERATED_SETTINGS_NAME)
}

/// Entry point for the `bootstrap` executable: wraps `router` and serves
/// invocations forever.
pub async fn serve(router: Router) -> Result<(), RuntimeError> {
    // The platform collects stdout; JSON lines keep fields searchable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_err()
    {
        debug!("Tracing subscriber already installed");
    }

    let path = settings_path();
    let config = if path.is_file() {
        AdapterConfig::from_env_file(&path)?
    } else {
        warn!(path = %path.display(), "Generated settings file missing, using defaults");
        AdapterConfig::default()
    };

    let client = RuntimeApiClient::from_env()?;
    run(client, ProtocolAdapter::new(router, config)).await
}
