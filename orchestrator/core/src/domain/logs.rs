// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};

/// Platform bookkeeping lines that are never shown to the operator
pub const NOISE_PREFIXES: [&str; 3] = ["START RequestId", "REPORT RequestId", "END RequestId"];

/// One line of the remote function's log stream.
///
/// Two events are the same event when both fields are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogEvent {
    /// Epoch milliseconds
    pub timestamp: i64,
    pub message: String,
}

impl LogEvent {
    pub fn new(timestamp: i64, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            message: message.into(),
        }
    }

    pub fn is_noise(&self) -> bool {
        let message = self.message.trim_start();
        NOISE_PREFIXES.iter().any(|prefix| message.starts_with(prefix))
    }

    /// `[timestamp] message` with surrounding whitespace trimmed
    pub fn render(&self) -> String {
        let timestamp = DateTime::from_timestamp_millis(self.timestamp)
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_else(|| self.timestamp.to_string());
        format!("[{}] {}", timestamp, self.message.trim())
    }
}
