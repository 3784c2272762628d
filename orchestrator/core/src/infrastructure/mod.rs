// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod control_plane;
pub mod credentials;
pub mod mock;
pub mod packager;
pub mod probe;
pub mod runtime_api;

pub use control_plane::HttpControlPlane;
pub use credentials::EnvCredentialProvider;
pub use mock::{MockControlPlane, MockOperation, RecordedCall};
pub use packager::{ExcludeSet, TarballPackager};
pub use probe::HttpEndpointProbe;
pub use runtime_api::{RuntimeApiClient, RuntimeError};
