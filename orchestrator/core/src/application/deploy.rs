// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Deployment Orchestrator
//!
//! Application service driving one deploy or update run against the remote
//! service traits.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Sequence packaging and provisioning, track the stage
//!   reached, always clean up the local artifact
//! - **Collaborators:**
//!   - Domain: ResolvedSettings, Artifact, DeploymentReport
//!   - Infrastructure: ArtifactPackager, RemoteServices implementations
//!
//! Remote failures are terminal. Nothing that already happened remotely is
//! rolled back; the returned error names the last completed stage instead.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::artifact::{
    Artifact, ArtifactPackager, GeneratedSettings, PackageError, PackageRequest, ENTRY_POINT_HANDLER,
    ENTRY_POINT_NAME,
};
use crate::domain::deployment::{
    DeploymentError, DeploymentKind, DeploymentReport, DeploymentStage,
};
use crate::domain::invocation::ErrorResponseMapping;
use crate::domain::platform::{
    Credentials, FunctionSpec, IntegrationResponse, MethodSpec, RateLimitDelay,
    RemoteProvisioningError, RemoteServices, ResourceId, RestApi,
};
use crate::domain::settings::{CustomSettings, ResolvedSettings};

pub const DEFAULT_HTTP_METHODS: [&str; 6] = ["DELETE", "GET", "HEAD", "OPTIONS", "PATCH", "POST"];
pub const DEFAULT_PARAMETER_DEPTH: u32 = 8;
pub const DEFAULT_RESPONSE_CODES: [u16; 7] = [200, 301, 400, 401, 403, 404, 500];
pub const DEFAULT_ROLE_NAME: &str = "LambdaportExecution";
pub const DEFAULT_REGION: &str = "us-east-1";

/// Route and identity parameters, overridable per environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub http_methods: Vec<String>,
    pub parameter_depth: u32,
    pub integration_response_codes: Vec<u16>,
    pub method_response_codes: Vec<u16>,
    pub role_name: String,
    pub region: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            http_methods: DEFAULT_HTTP_METHODS.iter().map(|m| m.to_string()).collect(),
            parameter_depth: DEFAULT_PARAMETER_DEPTH,
            integration_response_codes: DEFAULT_RESPONSE_CODES.to_vec(),
            method_response_codes: DEFAULT_RESPONSE_CODES.to_vec(),
            role_name: DEFAULT_ROLE_NAME.to_string(),
            region: DEFAULT_REGION.to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Apply the custom keys present in the settings
    pub fn with_custom(mut self, custom: &CustomSettings) -> Self {
        if let Some(methods) = &custom.http_methods {
            self.http_methods = methods.iter().map(|m| m.to_ascii_uppercase()).collect();
        }
        if let Some(depth) = custom.parameter_depth {
            self.parameter_depth = depth;
        }
        if let Some(codes) = &custom.integration_response_codes {
            self.integration_response_codes = codes.clone();
        }
        if let Some(codes) = &custom.method_response_codes {
            self.method_response_codes = codes.clone();
        }
        if let Some(role) = &custom.role_name {
            self.role_name = role.clone();
        }
        if let Some(region) = &custom.aws_region {
            self.region = region.clone();
        }
        self
    }

    /// Integration responses for every configured code the mapping can select.
    ///
    /// 200 is the default response. Other success codes have no selection
    /// pattern and are skipped.
    pub fn integration_responses(&self) -> Vec<IntegrationResponse> {
        self.integration_response_codes
            .iter()
            .filter_map(|&status| match ErrorResponseMapping::selection_pattern(status) {
                Some(pattern) => Some(IntegrationResponse {
                    status,
                    selection_pattern: Some(pattern),
                }),
                None if status == 200 => Some(IntegrationResponse {
                    status,
                    selection_pattern: None,
                }),
                None => {
                    debug!(status, "No selection pattern for status, skipping integration response");
                    None
                }
            })
            .collect()
    }
}

pub struct DeploymentOrchestrator {
    services: RemoteServices,
    packager: Arc<dyn ArtifactPackager>,
    project_dir: PathBuf,
    output_dir: PathBuf,
}

impl DeploymentOrchestrator {
    pub fn new(
        services: RemoteServices,
        packager: Arc<dyn ArtifactPackager>,
        project_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            services,
            packager,
            project_dir: project_dir.into(),
            output_dir: std::env::temp_dir(),
        }
    }

    /// Directory the local artifact is written to (system temp dir by default)
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    /// First deployment: function, routes, stage, warm-up request
    pub async fn deploy(&self, settings: &ResolvedSettings) -> Result<DeploymentReport, DeploymentError> {
        self.run(DeploymentKind::Deploy, settings).await
    }

    /// Re-publish code into the existing function. Routes are left alone.
    pub async fn update(&self, settings: &ResolvedSettings) -> Result<DeploymentReport, DeploymentError> {
        self.run(DeploymentKind::Update, settings).await
    }

    async fn run(
        &self,
        kind: DeploymentKind,
        settings: &ResolvedSettings,
    ) -> Result<DeploymentReport, DeploymentError> {
        let mut report = DeploymentReport::new(settings.identity(), kind);
        let config = OrchestratorConfig::default().with_custom(&settings.custom);
        info!(identity = %report.identity, kind = ?kind, region = %config.region, "Starting deployment run");

        // Step 2: Package the artifact
        let artifact = self.package(settings).await?;
        report.advance(DeploymentStage::Packaged);
        info!(artifact = %artifact.path().display(), "Artifact packaged");

        // Steps 3-9: Remote provisioning
        let outcome = self.provision(settings, &config, &artifact, &mut report).await;

        // Step 10: Local cleanup runs whatever happened remotely
        if settings.delete_zip {
            match artifact.remove_local() {
                Ok(()) => debug!(artifact = %artifact.path().display(), "Removed local artifact"),
                Err(e) => warn!(
                    artifact = %artifact.path().display(),
                    error = %e,
                    "Failed to remove local artifact"
                ),
            }
        }

        outcome?;
        report.advance(DeploymentStage::CleanedUp);
        info!(identity = %report.identity, "Deployment run finished");
        Ok(report)
    }

    async fn package(&self, settings: &ResolvedSettings) -> Result<Artifact, PackageError> {
        let entry_point = match &settings.entry_point {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.project_dir.join(path),
            None => self.project_dir.join(ENTRY_POINT_NAME),
        };
        let dependency_dirs = settings
            .dependency_dirs
            .iter()
            .map(|dir| if dir.is_absolute() { dir.clone() } else { self.project_dir.join(dir) })
            .collect();

        let settings_file = settings.settings_file.clone();
        let settings = settings.clone();
        let project_dir = self.project_dir.clone();
        let output_dir = self.output_dir.clone();
        let packager = self.packager.clone();

        tokio::task::spawn_blocking(move || {
            let application_settings = std::fs::read_to_string(&settings_file)
                .map_err(|e| PackageError::io(&settings_file, e))?;

            let request = PackageRequest {
                identity: settings.identity(),
                project_dir,
                output_dir,
                exclude: settings.exclude.clone(),
                dependency_dirs,
                entry_point,
                generated_settings: GeneratedSettings::render(&application_settings, &settings),
            };
            packager.package(&request)
        })
        .await
        .map_err(|e| PackageError::Task(e.to_string()))?
    }

    async fn provision(
        &self,
        settings: &ResolvedSettings,
        config: &OrchestratorConfig,
        artifact: &Artifact,
        report: &mut DeploymentReport,
    ) -> Result<(), DeploymentError> {
        let function_name = report.identity.to_string();

        // Step 3: Credentials and execution role
        let credentials = self
            .services
            .credentials
            .load_credentials()
            .await
            .map_err(|e| remote_error(report, e))?;
        let role_arn = self
            .services
            .identity
            .ensure_execution_role(&credentials, &config.role_name)
            .await
            .map_err(|e| remote_error(report, e))?;
        debug!(role_arn = %role_arn, "Execution role ready");

        // Step 4: Upload the artifact
        let reference = self
            .services
            .store
            .upload(&credentials, artifact.path(), &settings.s3_bucket, &artifact.key())
            .await
            .map_err(|e| remote_error(report, e))?;
        report.advance(DeploymentStage::Published);
        info!(reference = %reference, "Artifact uploaded");

        // Step 5: Create or update the function
        let function_arn = match report.kind {
            DeploymentKind::Deploy => {
                let spec = FunctionSpec {
                    name: function_name.clone(),
                    code: reference.clone(),
                    handler: ENTRY_POINT_HANDLER.to_string(),
                    memory_size: settings.memory_size,
                    timeout_seconds: settings.timeout_seconds,
                    vpc_config: settings.vpc_config.clone(),
                    role_arn,
                };
                self.services.functions.create_function(&credentials, &spec).await
            }
            DeploymentKind::Update => {
                self.services
                    .functions
                    .update_function_code(&credentials, &function_name, &reference)
                    .await
            }
        }
        .map_err(|e| remote_error(report, e))?;
        info!(function_arn = %function_arn.as_str(), "Function registered");
        report.function_arn = Some(function_arn.0.clone());
        report.advance(DeploymentStage::FunctionRegistered);

        if report.kind == DeploymentKind::Deploy {
            // Step 6: Routes
            let delay = RateLimitDelay(settings.deploy_delay);
            let method_template = MethodSpec {
                http_method: String::new(),
                function_arn,
                integration_responses: config.integration_responses(),
                method_response_codes: config.method_response_codes.clone(),
            };
            let api = self
                .create_routes(&credentials, &function_name, config, &method_template, delay)
                .await
                .map_err(|e| remote_error(report, e))?;
            report.advance(DeploymentStage::Routed);

            // Step 7: Stage deployment
            let endpoint = self
                .services
                .routing
                .deploy_stage(&credentials, &api.id, &settings.environment)
                .await
                .map_err(|e| remote_error(report, e))?;
            info!(endpoint = %endpoint, "Stage deployed");
            report.endpoint_url = Some(endpoint);
            report.advance(DeploymentStage::Deployed);
        }

        // Step 8: The function holds its own copy of the code now
        self.services
            .store
            .remove(&credentials, &reference)
            .await
            .map_err(|e| remote_error(report, e))?;
        debug!(reference = %reference, "Removed uploaded artifact");

        // Step 9: Warm-up request
        if report.kind == DeploymentKind::Deploy && settings.touch {
            if let Some(endpoint) = report.endpoint_url.clone() {
                let status = self
                    .services
                    .probe
                    .touch(&endpoint)
                    .await
                    .map_err(|e| remote_error(report, e))?;
                info!(endpoint = %endpoint, status, "Endpoint answered warm-up request");
                report.advance(DeploymentStage::Verified);
            }
        }

        Ok(())
    }

    /// Root resource plus one nested `{parameter_N}` resource per depth level,
    /// each carrying every configured method
    async fn create_routes(
        &self,
        credentials: &Credentials,
        api_name: &str,
        config: &OrchestratorConfig,
        template: &MethodSpec,
        delay: RateLimitDelay,
    ) -> Result<RestApi, RemoteProvisioningError> {
        let routing = &self.services.routing;
        let api = routing.create_api(credentials, api_name).await?;
        delay.wait().await;

        self.create_methods(credentials, &api, &api.root_resource_id, config, template, delay)
            .await?;

        let mut parent = api.root_resource_id.clone();
        for depth in 1..=config.parameter_depth {
            let path_part = format!("{{parameter_{}}}", depth);
            let resource = routing
                .create_resource(credentials, &api.id, &parent, &path_part)
                .await?;
            delay.wait().await;

            self.create_methods(credentials, &api, &resource, config, template, delay)
                .await?;
            parent = resource;
        }

        debug!(api = %api.id.0, depth = config.parameter_depth, "Routes created");
        Ok(api)
    }

    async fn create_methods(
        &self,
        credentials: &Credentials,
        api: &RestApi,
        resource: &ResourceId,
        config: &OrchestratorConfig,
        template: &MethodSpec,
        delay: RateLimitDelay,
    ) -> Result<(), RemoteProvisioningError> {
        for http_method in &config.http_methods {
            let method = MethodSpec {
                http_method: http_method.clone(),
                ..template.clone()
            };
            self.services
                .routing
                .create_method(credentials, &api.id, resource, &method)
                .await?;
            delay.wait().await;
        }
        Ok(())
    }
}

fn remote_error(report: &DeploymentReport, source: RemoteProvisioningError) -> DeploymentError {
    warn!(identity = %report.identity, reached = %report.last_stage(), error = %source, "Remote call failed");
    DeploymentError::Remote {
        identity: report.identity.clone(),
        reached: report.last_stage(),
        source,
    }
}
