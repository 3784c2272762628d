// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Deployment settings, artifacts, remote service contracts and the
//! invocation wire types shared by the orchestrator and the adapter.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and traits, no I/O beyond reading settings files

pub mod settings;
pub mod deployment;
pub mod artifact;
pub mod platform;
pub mod logs;
pub mod invocation;
