// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod adapter;
pub mod deploy;
pub mod log_tail;

// Re-export services for convenience
pub use adapter::{AdapterConfig, AdapterError, ApplicationError, ErrorPolicy, ProtocolAdapter, ReportAll, WebApplication};
pub use deploy::{DeploymentOrchestrator, OrchestratorConfig};
pub use log_tail::{run_tail, LogTail};
