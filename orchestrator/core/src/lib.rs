// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lib
//!
//! Deploys a request/response web application to a serverless function
//! platform and runs it there behind a protocol adapter.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Settings resolution, deployment orchestration, log tailing
//!   and the in-function runtime

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
pub use infrastructure::runtime_api::serve;
