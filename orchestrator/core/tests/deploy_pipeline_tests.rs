// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Deployment pipeline tests against the in-memory control plane.

use lambdaport_core::application::deploy::DeploymentOrchestrator;
use lambdaport_core::deployment::{DeploymentError, DeploymentStage};
use lambdaport_core::infrastructure::mock::{MockControlPlane, MockOperation, RecordedCall};
use lambdaport_core::infrastructure::packager::TarballPackager;
use lambdaport_core::platform::{RemoteProvisioningError, StoreReference};
use lambdaport_core::settings::{resolve, ResolvedSettings};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    project: TempDir,
    output: TempDir,
    plane: Arc<MockControlPlane>,
}

impl Fixture {
    fn new() -> Self {
        let project = TempDir::new().unwrap();
        std::fs::write(project.path().join("bootstrap"), "#!binary").unwrap();
        std::fs::write(project.path().join("app.env"), "DEBUG=false\n").unwrap();
        std::fs::create_dir_all(project.path().join("templates")).unwrap();
        std::fs::write(project.path().join("templates/index.html"), "<h1>hi</h1>").unwrap();

        Self {
            project,
            output: TempDir::new().unwrap(),
            plane: MockControlPlane::new(),
        }
    }

    fn settings(&self, extra: Value) -> ResolvedSettings {
        let mut env = json!({
            "project_name": "blog",
            "s3_bucket": "artifacts",
            "settings_file": self.project.path().join("app.env").to_string_lossy(),
            "deploy_delay": 0,
        });
        for (key, value) in extra.as_object().unwrap() {
            env[key] = value.clone();
        }
        resolve("dev", &json!({ "dev": env })).unwrap()
    }

    fn orchestrator(&self) -> DeploymentOrchestrator {
        DeploymentOrchestrator::new(
            self.plane.services(),
            Arc::new(TarballPackager::new()),
            self.project.path(),
        )
        .with_output_dir(self.output.path())
    }

    fn artifacts_left(&self) -> usize {
        count_files(self.output.path())
    }

    fn route_calls(&self) -> usize {
        self.plane.count(|call| {
            matches!(
                call,
                RecordedCall::CreateApi(_)
                    | RecordedCall::CreateResource { .. }
                    | RecordedCall::CreateMethod { .. }
            )
        })
    }
}

fn index_of(calls: &[RecordedCall], predicate: impl Fn(&RecordedCall) -> bool) -> usize {
    calls.iter().position(predicate).unwrap()
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_deploy_reaches_every_stage() {
    let fixture = Fixture::new();
    let report = fixture.orchestrator().deploy(&fixture.settings(json!({}))).await.unwrap();

    assert_eq!(
        report.completed,
        vec![
            DeploymentStage::Resolved,
            DeploymentStage::Packaged,
            DeploymentStage::Published,
            DeploymentStage::FunctionRegistered,
            DeploymentStage::Routed,
            DeploymentStage::Deployed,
            DeploymentStage::Verified,
            DeploymentStage::CleanedUp,
        ]
    );
    assert_eq!(report.function_arn.as_deref(), Some("arn:mock:function/blog-dev"));
    let endpoint = report.endpoint_url.clone().unwrap();
    assert!(endpoint.ends_with("/dev"));

    // Root plus eight nested parameter resources, six methods each
    let resources = fixture.plane.count(|c| matches!(c, RecordedCall::CreateResource { .. }));
    let methods = fixture.plane.count(|c| matches!(c, RecordedCall::CreateMethod { .. }));
    assert_eq!(resources, 8);
    assert_eq!(methods, 9 * 6);

    assert_eq!(fixture.plane.stored_objects(), 0);
    assert_eq!(fixture.artifacts_left(), 0);
    assert_eq!(fixture.plane.count(|c| *c == RecordedCall::Touch(endpoint.clone())), 1);
}

#[tokio::test]
async fn test_deploy_follows_remote_call_order() {
    let fixture = Fixture::new();
    fixture
        .orchestrator()
        .deploy(&fixture.settings(json!({ "parameter_depth": 0, "http_methods": ["GET"] })))
        .await
        .unwrap();

    let calls = fixture.plane.calls();
    let role = index_of(&calls, |c| matches!(c, RecordedCall::EnsureRole(_)));
    let upload = index_of(&calls, |c| matches!(c, RecordedCall::Upload { .. }));
    let function = index_of(&calls, |c| matches!(c, RecordedCall::CreateFunction(_)));
    let api = index_of(&calls, |c| matches!(c, RecordedCall::CreateApi(_)));
    let stage = index_of(&calls, |c| matches!(c, RecordedCall::DeployStage { .. }));
    let remove = index_of(&calls, |c| matches!(c, RecordedCall::Remove(_)));
    let touch = index_of(&calls, |c| matches!(c, RecordedCall::Touch(_)));

    assert!(role < upload && upload < function && function < api);
    assert!(api < stage && stage < remove && remove < touch);
}

#[tokio::test]
async fn test_custom_settings_shape_routes() {
    let fixture = Fixture::new();
    let settings = fixture.settings(json!({
        "http_methods": ["GET", "POST"],
        "parameter_depth": 2,
        "role_name": "BlogRole",
        "memory_size": 512,
    }));
    fixture.orchestrator().deploy(&settings).await.unwrap();

    assert_eq!(fixture.plane.count(|c| matches!(c, RecordedCall::CreateResource { .. })), 2);
    assert_eq!(fixture.plane.count(|c| matches!(c, RecordedCall::CreateMethod { .. })), 3 * 2);
    assert_eq!(
        fixture.plane.count(|c| *c == RecordedCall::EnsureRole("BlogRole".to_string())),
        1
    );

    let spec = fixture
        .plane
        .calls()
        .into_iter()
        .find_map(|c| match c {
            RecordedCall::CreateFunction(spec) => Some(spec),
            _ => None,
        })
        .unwrap();
    assert_eq!(spec.memory_size, 512);
    assert_eq!(spec.timeout_seconds, 30);
    assert_eq!(spec.handler, "bootstrap.handler");
}

#[tokio::test]
async fn test_nested_resources_chain_parameters() {
    let fixture = Fixture::new();
    fixture
        .orchestrator()
        .deploy(&fixture.settings(json!({ "parameter_depth": 3, "http_methods": ["GET"] })))
        .await
        .unwrap();

    let path_parts: Vec<String> = fixture
        .plane
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            RecordedCall::CreateResource { path_part, .. } => Some(path_part),
            _ => None,
        })
        .collect();
    assert_eq!(path_parts, vec!["{parameter_1}", "{parameter_2}", "{parameter_3}"]);
}

#[tokio::test]
async fn test_repeated_updates_never_touch_routes() {
    let fixture = Fixture::new();
    fixture.plane.register_function(
        "blog-dev",
        StoreReference {
            bucket: "artifacts".to_string(),
            key: "old.tar.gz".to_string(),
        },
    );
    let settings = fixture.settings(json!({}));

    for _ in 0..3 {
        let report = fixture.orchestrator().update(&settings).await.unwrap();
        assert_eq!(
            report.completed,
            vec![
                DeploymentStage::Resolved,
                DeploymentStage::Packaged,
                DeploymentStage::Published,
                DeploymentStage::FunctionRegistered,
                DeploymentStage::CleanedUp,
            ]
        );
        assert!(report.endpoint_url.is_none());
    }

    assert_eq!(fixture.route_calls(), 0);
    assert_eq!(fixture.plane.count(|c| matches!(c, RecordedCall::Touch(_))), 0);
    assert_eq!(fixture.plane.count(|c| matches!(c, RecordedCall::UpdateFunctionCode { .. })), 3);
    assert_ne!(fixture.plane.function_code("blog-dev").unwrap().key, "old.tar.gz");
    assert_eq!(fixture.artifacts_left(), 0);
}

#[tokio::test]
async fn test_update_of_unknown_function_reports_published() {
    let fixture = Fixture::new();
    let err = fixture.orchestrator().update(&fixture.settings(json!({}))).await.unwrap_err();

    assert_eq!(err.reached(), DeploymentStage::Published);
    assert!(matches!(
        err,
        DeploymentError::Remote {
            source: RemoteProvisioningError::NotFound { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn test_upload_failure_still_removes_local_artifact() {
    let fixture = Fixture::new();
    fixture.plane.fail_on(MockOperation::Upload);

    let err = fixture.orchestrator().deploy(&fixture.settings(json!({}))).await.unwrap_err();

    assert_eq!(err.reached(), DeploymentStage::Packaged);
    assert_eq!(fixture.artifacts_left(), 0);
    assert_eq!(fixture.plane.count(|c| matches!(c, RecordedCall::CreateFunction(_))), 0);
}

#[tokio::test]
async fn test_stage_failure_names_routed() {
    let fixture = Fixture::new();
    fixture.plane.fail_on(MockOperation::DeployStage);

    let err = fixture
        .orchestrator()
        .deploy(&fixture.settings(json!({ "parameter_depth": 1 })))
        .await
        .unwrap_err();

    assert_eq!(err.reached(), DeploymentStage::Routed);
    assert!(err.to_string().contains("blog-dev"));
    // No rollback: the function and the uploaded artifact stay
    assert!(fixture.plane.function_code("blog-dev").is_some());
    assert_eq!(fixture.plane.stored_objects(), 1);
}

#[tokio::test]
async fn test_touch_failure_aborts_after_deployed() {
    let fixture = Fixture::new();
    fixture.plane.fail_on(MockOperation::Touch);

    let err = fixture
        .orchestrator()
        .deploy(&fixture.settings(json!({ "parameter_depth": 0 })))
        .await
        .unwrap_err();
    assert_eq!(err.reached(), DeploymentStage::Deployed);
}

#[tokio::test]
async fn test_touch_disabled_skips_verification() {
    let fixture = Fixture::new();
    let report = fixture
        .orchestrator()
        .deploy(&fixture.settings(json!({ "touch": false, "parameter_depth": 0 })))
        .await
        .unwrap();

    assert!(!report.reached(DeploymentStage::Verified));
    assert!(report.reached(DeploymentStage::CleanedUp));
    assert_eq!(fixture.plane.count(|c| matches!(c, RecordedCall::Touch(_))), 0);
}

#[tokio::test]
async fn test_delete_zip_false_keeps_artifact() {
    let fixture = Fixture::new();
    fixture
        .orchestrator()
        .deploy(&fixture.settings(json!({ "delete_zip": false, "parameter_depth": 0 })))
        .await
        .unwrap();
    assert_eq!(fixture.artifacts_left(), 1);
}

#[tokio::test]
async fn test_missing_entry_point_fails_before_remote_calls() {
    let fixture = Fixture::new();
    std::fs::remove_file(fixture.project.path().join("bootstrap")).unwrap();

    let err = fixture.orchestrator().deploy(&fixture.settings(json!({}))).await.unwrap_err();

    assert!(matches!(err, DeploymentError::Package(_)));
    assert_eq!(err.reached(), DeploymentStage::Resolved);
    assert!(fixture.plane.calls().is_empty());
}

#[tokio::test]
async fn test_missing_settings_file_fails_before_remote_calls() {
    let fixture = Fixture::new();
    let result = resolve(
        "dev",
        &json!({ "dev": {
            "project_name": "blog",
            "s3_bucket": "artifacts",
            "settings_file": fixture.project.path().join("absent.env").to_string_lossy(),
        }}),
    );

    assert!(result.is_err());
    assert!(fixture.plane.calls().is_empty());
}
