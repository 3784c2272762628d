// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Invocation Wire Types
//!
//! The platform's reply schema has exactly one success channel, so only one
//! status code can be returned normally. Error statuses and redirects travel
//! over the failure channel as a string signal instead, and the routing layer
//! selects the real status by matching that string. [`ErrorResponseMapping`]
//! is the contract both sides agree on.
//!
//! | application status | outcome                    | signal                                   |
//! |--------------------|----------------------------|------------------------------------------|
//! | 400 401 403 404 500| [`AdapterOutcome::ErrorStatus`] | base64(`<!DOCTYPE html>` + code + body) |
//! | 301 302            | [`AdapterOutcome::Redirect`]    | relative `Location` path                 |
//! | anything else      | [`AdapterOutcome::Success`]     | none, envelope returned normally         |

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use url::Url;

/// Statuses smuggled through the failure channel as an encoded document
pub const ERROR_STATUS_CODES: [u16; 5] = [400, 401, 403, 404, 500];

/// Statuses smuggled through the failure channel as a relative path
pub const REDIRECT_STATUS_CODES: [u16; 2] = [301, 302];

/// Keeps the decoded page renderable in a browser. 15 bytes, so the encoded
/// prefix plus a three-digit code always lands on a base64 block boundary.
const DOCTYPE_PREFIX: &str = "<!DOCTYPE html>";

/// Inbound request as delivered by the routing layer's mapping template
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationEvent {
    #[serde(default)]
    pub method: Option<String>,

    /// Path segments keyed `parameter_1` .. `parameter_N`
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    #[serde(default)]
    pub query: BTreeMap<String, String>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Base64 encoded request body
    #[serde(default)]
    pub body: Option<String>,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub source_ip: Option<String>,
}

impl InvocationEvent {
    /// HTTP invocations carry a method. Anything else is administrative.
    pub fn is_http(&self) -> bool {
        self.method.as_deref().is_some_and(|m| !m.trim().is_empty())
    }

    /// Request path rebuilt from the numbered path parameters, no trailing slash
    pub fn path(&self) -> String {
        let mut params: Vec<(&String, &String)> = self.params.iter().collect();
        params.sort_by_key(|(key, _)| (parameter_index(key), (*key).clone()));

        let segments: Vec<&str> = params
            .iter()
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.is_empty())
            .collect();
        format!("/{}", segments.join("/"))
    }

    pub fn query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&self.query)
            .finish()
    }

    /// Explicit `host` field, falling back to the `Host` header
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref().or_else(|| self.header("host"))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Decoded body bytes. Bodies that are not valid base64 are passed through.
    pub fn decoded_body(&self) -> Vec<u8> {
        match self.body.as_deref() {
            None | Some("") => Vec::new(),
            Some(body) => STANDARD
                .decode(body)
                .unwrap_or_else(|_| body.as_bytes().to_vec()),
        }
    }

    /// Whether the caller asked for the raw event back
    pub fn requests_echo(&self) -> bool {
        let in_query = self
            .query
            .get("event_echo")
            .is_some_and(|value| !matches!(value.to_ascii_lowercase().as_str(), "false" | "0"));
        in_query || self.params.values().any(|value| value == "event_echo")
    }
}

fn parameter_index(key: &str) -> u32 {
    key.strip_prefix("parameter_")
        .and_then(|n| n.parse().ok())
        .unwrap_or(u32::MAX)
}

/// Flat reply accepted on the platform's success channel.
///
/// Serializes as one JSON object: every header as a top-level key, plus the
/// reserved `Content` and `Status` keys. Reserved keys win over headers with
/// the same name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyEnvelope {
    pub headers: BTreeMap<String, String>,
    pub content: Option<String>,
    pub status: u16,
}

impl ReplyEnvelope {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        let content = content.into();
        self.content = if content.is_empty() { None } else { Some(content) };
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for ReplyEnvelope {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let headers = self
            .headers
            .iter()
            .filter(|(name, _)| name.as_str() != "Content" && name.as_str() != "Status");

        let mut map = serializer.serialize_map(None)?;
        for (name, value) in headers {
            map.serialize_entry(name, value)?;
        }
        if let Some(content) = &self.content {
            map.serialize_entry("Content", content)?;
        }
        map.serialize_entry("Status", &self.status)?;
        map.end()
    }
}

/// Result of one invocation. Exactly one per event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterOutcome {
    Success(ReplyEnvelope),
    ErrorStatus { code: u16, body: String },
    Redirect(String),
}

impl AdapterOutcome {
    /// HTTP status the client should finally see
    pub fn status(&self) -> u16 {
        match self {
            AdapterOutcome::Success(envelope) => envelope.status,
            AdapterOutcome::ErrorStatus { code, .. } => *code,
            AdapterOutcome::Redirect(_) => 301,
        }
    }

    /// Failure-channel string, `None` for a normal reply
    pub fn signal(&self) -> Option<String> {
        match self {
            AdapterOutcome::Success(_) => None,
            AdapterOutcome::ErrorStatus { code, body } => Some(encode_error_signal(*code, body)),
            AdapterOutcome::Redirect(path) => Some(path.clone()),
        }
    }
}

pub fn encode_error_signal(code: u16, body: &str) -> String {
    STANDARD.encode(format!("{}{}{}", DOCTYPE_PREFIX, code, body))
}

/// Recover `(code, body)` from an encoded error signal
pub fn decode_error_signal(signal: &str) -> Option<(u16, String)> {
    let decoded = STANDARD.decode(signal).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let rest = text.strip_prefix(DOCTYPE_PREFIX)?;
    let code: u16 = rest.get(..3)?.parse().ok()?;
    Some((code, rest[3..].to_string()))
}

/// Strip scheme and host from a `Location` value so redirects work on both
/// the raw platform URL and a custom domain
pub fn relative_location(location: &str) -> String {
    match Url::parse(location) {
        Ok(url) if url.has_host() => {
            let mut path = url.path().to_string();
            if let Some(query) = url.query() {
                path.push('?');
                path.push_str(query);
            }
            path
        }
        _ if location.starts_with('/') => location.to_string(),
        _ => format!("/{}", location),
    }
}

/// Selection rules the routing layer applies to failure-channel signals
#[derive(Debug, Clone)]
pub struct ErrorResponseMapping {
    rules: Vec<(u16, Regex)>,
}

impl ErrorResponseMapping {
    pub fn new() -> Self {
        let rules = ERROR_STATUS_CODES
            .iter()
            .chain(REDIRECT_STATUS_CODES.iter().take(1))
            .filter_map(|code| {
                let pattern = Self::selection_pattern(*code)?;
                Regex::new(&pattern).ok().map(|regex| (*code, regex))
            })
            .collect();
        Self { rules }
    }

    /// Regex that selects `code` from a signal.
    ///
    /// `None` for statuses delivered over the success channel. 301 and 302
    /// share one pattern, so the routing layer can only express one of them.
    pub fn selection_pattern(code: u16) -> Option<String> {
        if ERROR_STATUS_CODES.contains(&code) {
            let prefix = STANDARD.encode(format!("{}{}", DOCTYPE_PREFIX, code));
            Some(format!("^{}.*", regex::escape(&prefix)))
        } else if REDIRECT_STATUS_CODES.contains(&code) {
            Some("^/.*".to_string())
        } else {
            None
        }
    }

    /// Status the routing layer would pick for `signal`
    pub fn classify(&self, signal: &str) -> Option<u16> {
        self.rules
            .iter()
            .find(|(_, regex)| regex.is_match(signal))
            .map(|(code, _)| *code)
    }
}

impl Default for ErrorResponseMapping {
    fn default() -> Self {
        Self::new()
    }
}
