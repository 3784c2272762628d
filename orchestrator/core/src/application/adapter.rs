// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Protocol Adapter
//!
//! Bridges one invocation event to one call into the wrapped web application
//! and back. The adapter holds no per-invocation state and never retries.
//!
//! # Flow
//!
//! 1. `event_echo` short-circuit (when enabled)
//! 2. reject non-HTTP invocations
//! 3. Let's Encrypt challenge short-circuit (when configured)
//! 4. build a synthetic [`Request`] and dispatch it exactly once
//! 5. translate the status into an [`AdapterOutcome`]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{HeaderName, HeaderValue, HOST};
use axum::http::{Method, Request, Response, StatusCode};
use axum::response::IntoResponse;
use axum::Router;
use futures::FutureExt;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tower::ServiceExt;
use tracing::{debug, error, warn};

use crate::domain::invocation::{
    relative_location, AdapterOutcome, InvocationEvent, ReplyEnvelope, ERROR_STATUS_CODES,
    REDIRECT_STATUS_CODES,
};
use crate::domain::settings::AcmeChallenge;

/// Upper bound on a collected response body
const MAX_RESPONSE_BYTES: usize = 6 * 1024 * 1024;

const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Header carrying the mount path to the application
pub const SCRIPT_NAME_HEADER: &str = "x-script-name";

/// Request extension carrying the mount path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPath(pub String);

/// Failure raised by the wrapped application while serving a request
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("Request handler panicked: {0}")]
    Panicked(String),

    #[error("Application failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Unsupported invocation: event has no HTTP method")]
    UnsupportedInvocation,

    #[error("Malformed invocation event: {0}")]
    MalformedEvent(String),

    #[error("Failed to collect response body: {0}")]
    ResponseBody(String),

    #[error("Failed to load adapter settings from {path}: {message}")]
    Settings { path: String, message: String },
}

/// The request/response application behind the adapter
#[async_trait]
pub trait WebApplication: Send + Sync {
    async fn dispatch(&self, request: Request<Body>) -> Result<Response<Body>, ApplicationError>;

    /// Response served when `dispatch` fails
    fn error_response(&self, _error: &ApplicationError) -> Response<Body> {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

#[async_trait]
impl WebApplication for Router {
    async fn dispatch(&self, request: Request<Body>) -> Result<Response<Body>, ApplicationError> {
        let call = self.clone().oneshot(request);
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(infallible)) => match infallible {},
            Err(payload) => Err(ApplicationError::Panicked(panic_message(payload))),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Decides whether an application error is reported or dropped silently.
///
/// The application's error response is returned either way.
pub trait ErrorPolicy: Send + Sync {
    fn ignore(&self, error: &ApplicationError) -> bool;
}

/// Report every application error
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportAll;

impl ErrorPolicy for ReportAll {
    fn ignore(&self, _error: &ApplicationError) -> bool {
        false
    }
}

impl<F> ErrorPolicy for F
where
    F: Fn(&ApplicationError) -> bool + Send + Sync,
{
    fn ignore(&self, error: &ApplicationError) -> bool {
        self(error)
    }
}

/// Runtime settings read from the generated settings file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterConfig {
    pub mount_path: String,
    pub event_echo: bool,
    pub lets_encrypt: Option<AcmeChallenge>,
}

impl AdapterConfig {
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let lets_encrypt = match (
            vars.get("LETS_ENCRYPT_CHALLENGE_PATH"),
            vars.get("LETS_ENCRYPT_CHALLENGE_CONTENT"),
        ) {
            (Some(path), Some(content)) => Some(AcmeChallenge {
                path: path.clone(),
                content: content.clone(),
            }),
            _ => None,
        };

        Self {
            mount_path: vars.get("SCRIPT_NAME").cloned().unwrap_or_default(),
            event_echo: vars
                .get("EVENT_ECHO")
                .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")),
            lets_encrypt,
        }
    }

    /// Parse a dotenv-formatted settings file. Later keys win.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, AdapterError> {
        let path = path.as_ref();
        let settings_error = |message: String| AdapterError::Settings {
            path: path.display().to_string(),
            message,
        };

        let mut vars = HashMap::new();
        for item in dotenvy::from_path_iter(path).map_err(|e| settings_error(e.to_string()))? {
            let (key, value) = item.map_err(|e| settings_error(e.to_string()))?;
            vars.insert(key, value);
        }
        Ok(Self::from_vars(&vars))
    }
}

pub struct ProtocolAdapter<A> {
    application: A,
    config: AdapterConfig,
    policy: Arc<dyn ErrorPolicy>,
}

impl<A: WebApplication> ProtocolAdapter<A> {
    pub fn new(application: A, config: AdapterConfig) -> Self {
        Self {
            application,
            config,
            policy: Arc::new(ReportAll),
        }
    }

    pub fn with_error_policy(mut self, policy: impl ErrorPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Handle one raw invocation event
    pub async fn handle(&self, raw: serde_json::Value) -> Result<AdapterOutcome, AdapterError> {
        let event: InvocationEvent = serde_json::from_value(raw.clone())
            .map_err(|e| AdapterError::MalformedEvent(e.to_string()))?;

        if self.config.event_echo && event.requests_echo() {
            debug!("Echoing invocation event");
            let content = serde_json::to_string(&raw)
                .map_err(|e| AdapterError::MalformedEvent(e.to_string()))?;
            return Ok(AdapterOutcome::Success(ReplyEnvelope::new(200).with_content(content)));
        }

        if !event.is_http() {
            return Err(AdapterError::UnsupportedInvocation);
        }

        if let Some(challenge) = &self.config.lets_encrypt {
            let path = event.path();
            if path.strip_prefix(ACME_CHALLENGE_PREFIX) == Some(challenge.path.as_str()) {
                return Ok(AdapterOutcome::Success(
                    ReplyEnvelope::new(200).with_content(challenge.content.clone()),
                ));
            }
        }

        let request = self.build_request(&event)?;
        let response = match self.application.dispatch(request).await {
            Ok(response) => response,
            Err(app_error) => {
                if self.policy.ignore(&app_error) {
                    debug!(error = %app_error, "Ignoring application error");
                } else {
                    error!(error = %app_error, "Application error while handling request");
                }
                self.application.error_response(&app_error)
            }
        };

        self.translate(response).await
    }

    fn build_request(&self, event: &InvocationEvent) -> Result<Request<Body>, AdapterError> {
        let method_name = event.method.as_deref().unwrap_or_default().trim().to_ascii_uppercase();
        let method = Method::from_bytes(method_name.as_bytes())
            .map_err(|_| AdapterError::MalformedEvent(format!("invalid method '{}'", method_name)))?;

        let mut uri = event.path();
        let query = event.query_string();
        if !query.is_empty() {
            uri.push('?');
            uri.push_str(&query);
        }

        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(event.decoded_body()))
            .map_err(|e| AdapterError::MalformedEvent(e.to_string()))?;

        let headers = request.headers_mut();
        for (name, value) in &event.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = %name, "Dropping header that is not valid HTTP"),
            }
        }

        if let Some(host) = event.host().and_then(|h| HeaderValue::from_str(h).ok()) {
            headers.insert(HOST, host);
        }
        if let Some(ip) = event.source_ip.as_deref().and_then(|ip| HeaderValue::from_str(ip).ok()) {
            headers
                .entry(HeaderName::from_static("x-forwarded-for"))
                .or_insert(ip);
        }
        if let Ok(mount) = HeaderValue::from_str(&self.config.mount_path) {
            headers.insert(HeaderName::from_static(SCRIPT_NAME_HEADER), mount);
        }

        request
            .extensions_mut()
            .insert(MountPath(self.config.mount_path.clone()));
        Ok(request)
    }

    async fn translate(&self, response: Response<Body>) -> Result<AdapterOutcome, AdapterError> {
        let status = response.status().as_u16();

        // Flat mapping: the last value for a repeated header name wins.
        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            headers.insert(
                canonical_header_name(name.as_str()),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }

        let bytes = axum::body::to_bytes(response.into_body(), MAX_RESPONSE_BYTES)
            .await
            .map_err(|e| AdapterError::ResponseBody(e.to_string()))?;
        let body = String::from_utf8_lossy(&bytes).into_owned();

        if ERROR_STATUS_CODES.contains(&status) {
            return Ok(AdapterOutcome::ErrorStatus { code: status, body });
        }

        if REDIRECT_STATUS_CODES.contains(&status) {
            let location = headers.get("Location").map(String::as_str).unwrap_or("/");
            return Ok(AdapterOutcome::Redirect(relative_location(location)));
        }

        Ok(AdapterOutcome::Success(ReplyEnvelope {
            headers,
            content: if body.is_empty() { None } else { Some(body) },
            status,
        }))
    }
}

/// `content-type` -> `Content-Type`
pub fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
