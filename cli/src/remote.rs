// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Remote service wiring
//!
//! Every remote trait is served by one [`HttpControlPlane`]; credentials come
//! from the environment and the warm-up probe is a plain HTTP client.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

use lambdaport_core::application::deploy::DEFAULT_REGION;
use lambdaport_core::infrastructure::{EnvCredentialProvider, HttpControlPlane, HttpEndpointProbe};
use lambdaport_core::platform::RemoteServices;
use lambdaport_core::settings::ResolvedSettings;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

pub fn control_plane(url: Option<&str>) -> Result<Arc<HttpControlPlane>> {
    let url = url.context(
        "No control plane configured. Pass --control-plane-url or set LAMBDAPORT_CONTROL_PLANE_URL",
    )?;
    let plane = HttpControlPlane::new(url).context("Failed to create control plane client")?;
    Ok(Arc::new(plane))
}

pub fn credentials(settings: &ResolvedSettings) -> EnvCredentialProvider {
    let region = settings
        .custom
        .aws_region
        .clone()
        .unwrap_or_else(|| DEFAULT_REGION.to_string());
    EnvCredentialProvider::new().with_default_region(region)
}

pub fn services(plane: Arc<HttpControlPlane>, settings: &ResolvedSettings) -> Result<RemoteServices> {
    let probe = HttpEndpointProbe::new(PROBE_TIMEOUT).context("Failed to create HTTP client")?;
    Ok(RemoteServices {
        credentials: Arc::new(credentials(settings)),
        identity: plane.clone(),
        store: plane.clone(),
        functions: plane.clone(),
        routing: plane,
        probe: Arc::new(probe),
    })
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
