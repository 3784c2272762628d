// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP Control Plane Adapter
//!
//! One JSON-over-HTTP facade in front of the artifact store, the function
//! platform, the routing layer and the log service. Implements every remote
//! service trait as an Anti-Corruption Layer.
//!
//! # API Endpoints
//!
//! - `GET /roles/{name}`, `POST /roles` - Execution roles
//! - `PUT /buckets/{bucket}/objects/{key}`, `DELETE` same - Artifact store
//! - `POST /functions`, `PUT /functions/{name}/code` - Function platform
//! - `POST /apis`, `POST /apis/{id}/resources`,
//!   `POST /apis/{id}/resources/{rid}/methods`, `POST /apis/{id}/deployments` - Routing layer
//! - `GET /functions/{name}/logs?start_time=` - Log service
//!
//! Every request carries the access token as a bearer token.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::domain::logs::LogEvent;
use crate::domain::platform::{
    ApiId, ArtifactStore, Credentials, FunctionArn, FunctionPlatform, FunctionSpec, IdentityManager,
    LogSource, MethodSpec, RemoteProvisioningError, ResourceId, RestApi, RoutingLayer, StoreReference,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const IDENTITY: &str = "identity";
const STORE: &str = "store";
const FUNCTIONS: &str = "functions";
const ROUTING: &str = "routing";
const LOGS: &str = "logs";

#[derive(Debug, Deserialize)]
struct ArnResponse {
    arn: String,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DeploymentResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct LogsResponse {
    #[serde(default)]
    events: Vec<LogEvent>,
}

#[derive(Debug, Serialize)]
struct CodeUpdate<'a> {
    bucket: &'a str,
    key: &'a str,
}

pub struct HttpControlPlane {
    client: Client,
    base_url: Url,
}

impl HttpControlPlane {
    pub fn new(base_url: &str) -> Result<Self, RemoteProvisioningError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, RemoteProvisioningError> {
        let base_url = Url::parse(base_url).map_err(|e| RemoteProvisioningError::Request {
            service: "control plane",
            message: format!("invalid base URL '{}': {}", base_url, e),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteProvisioningError::Request {
                service: "control plane",
                message: format!("'{}' cannot be used as a base URL", base_url),
            });
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteProvisioningError::Request {
                service: "control plane",
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, base_url })
    }

    /// Base URL joined with percent-encoded path segments
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(
        &self,
        service: &'static str,
        request: RequestBuilder,
        credentials: &Credentials,
    ) -> Result<Response, RemoteProvisioningError> {
        request
            .bearer_auth(&credentials.access_token)
            .send()
            .await
            .map_err(|e| RemoteProvisioningError::Request {
                service,
                message: e.to_string(),
            })
    }
}

/// Pass 2xx responses through, map everything else to a domain error
async fn check(
    service: &'static str,
    resource: &str,
    response: Response,
) -> Result<Response, RemoteProvisioningError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(RemoteProvisioningError::NotFound {
            service,
            resource: resource.to_string(),
        }),
        status => {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| format!("HTTP {}", status));
            Err(RemoteProvisioningError::Rejected {
                service,
                status: status.as_u16(),
                message,
            })
        }
    }
}

async fn decode<T: DeserializeOwned>(
    service: &'static str,
    response: Response,
) -> Result<T, RemoteProvisioningError> {
    response
        .json::<T>()
        .await
        .map_err(|e| RemoteProvisioningError::Decode {
            service,
            message: e.to_string(),
        })
}

#[async_trait]
impl IdentityManager for HttpControlPlane {
    async fn ensure_execution_role(
        &self,
        credentials: &Credentials,
        role_name: &str,
    ) -> Result<String, RemoteProvisioningError> {
        let url = self.endpoint(&["roles", role_name]);
        let response = self.send(IDENTITY, self.client.get(url), credentials).await?;

        if response.status() != StatusCode::NOT_FOUND {
            let response = check(IDENTITY, role_name, response).await?;
            let role: ArnResponse = decode(IDENTITY, response).await?;
            return Ok(role.arn);
        }

        debug!(role = %role_name, "Execution role missing, creating it");
        let url = self.endpoint(&["roles"]);
        let request = self.client.post(url).json(&json!({ "name": role_name }));
        let response = self.send(IDENTITY, request, credentials).await?;
        let response = check(IDENTITY, role_name, response).await?;
        let role: ArnResponse = decode(IDENTITY, response).await?;
        Ok(role.arn)
    }
}

#[async_trait]
impl ArtifactStore for HttpControlPlane {
    async fn upload(
        &self,
        credentials: &Credentials,
        artifact: &Path,
        bucket: &str,
        key: &str,
    ) -> Result<StoreReference, RemoteProvisioningError> {
        let bytes = tokio::fs::read(artifact)
            .await
            .map_err(|e| RemoteProvisioningError::Request {
                service: STORE,
                message: format!("failed to read {}: {}", artifact.display(), e),
            })?;

        let url = self.endpoint(&["buckets", bucket, "objects", key]);
        let request = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, "application/gzip")
            .body(bytes);
        let response = self.send(STORE, request, credentials).await?;
        check(STORE, bucket, response).await?;

        Ok(StoreReference {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    async fn remove(
        &self,
        credentials: &Credentials,
        reference: &StoreReference,
    ) -> Result<(), RemoteProvisioningError> {
        let url = self.endpoint(&["buckets", &reference.bucket, "objects", &reference.key]);
        let response = self.send(STORE, self.client.delete(url), credentials).await?;
        check(STORE, &reference.to_string(), response).await?;
        Ok(())
    }
}

#[async_trait]
impl FunctionPlatform for HttpControlPlane {
    async fn create_function(
        &self,
        credentials: &Credentials,
        spec: &FunctionSpec,
    ) -> Result<FunctionArn, RemoteProvisioningError> {
        let url = self.endpoint(&["functions"]);
        let response = self
            .send(FUNCTIONS, self.client.post(url).json(spec), credentials)
            .await?;
        let response = check(FUNCTIONS, &spec.name, response).await?;
        let created: ArnResponse = decode(FUNCTIONS, response).await?;
        Ok(FunctionArn(created.arn))
    }

    async fn update_function_code(
        &self,
        credentials: &Credentials,
        function_name: &str,
        code: &StoreReference,
    ) -> Result<FunctionArn, RemoteProvisioningError> {
        let url = self.endpoint(&["functions", function_name, "code"]);
        let body = CodeUpdate {
            bucket: &code.bucket,
            key: &code.key,
        };
        let response = self
            .send(FUNCTIONS, self.client.put(url).json(&body), credentials)
            .await?;
        let response = check(FUNCTIONS, function_name, response).await?;
        let updated: ArnResponse = decode(FUNCTIONS, response).await?;
        Ok(FunctionArn(updated.arn))
    }
}

#[async_trait]
impl RoutingLayer for HttpControlPlane {
    async fn create_api(
        &self,
        credentials: &Credentials,
        name: &str,
    ) -> Result<RestApi, RemoteProvisioningError> {
        let url = self.endpoint(&["apis"]);
        let request = self.client.post(url).json(&json!({ "name": name }));
        let response = self.send(ROUTING, request, credentials).await?;
        let response = check(ROUTING, name, response).await?;
        decode(ROUTING, response).await
    }

    async fn create_resource(
        &self,
        credentials: &Credentials,
        api: &ApiId,
        parent: &ResourceId,
        path_part: &str,
    ) -> Result<ResourceId, RemoteProvisioningError> {
        let url = self.endpoint(&["apis", &api.0, "resources"]);
        let request = self
            .client
            .post(url)
            .json(&json!({ "parent_id": parent.0, "path_part": path_part }));
        let response = self.send(ROUTING, request, credentials).await?;
        let response = check(ROUTING, &api.0, response).await?;
        let created: IdResponse = decode(ROUTING, response).await?;
        Ok(ResourceId(created.id))
    }

    async fn create_method(
        &self,
        credentials: &Credentials,
        api: &ApiId,
        resource: &ResourceId,
        method: &MethodSpec,
    ) -> Result<(), RemoteProvisioningError> {
        let url = self.endpoint(&["apis", &api.0, "resources", &resource.0, "methods"]);
        let response = self
            .send(ROUTING, self.client.post(url).json(method), credentials)
            .await?;
        check(ROUTING, &resource.0, response).await?;
        Ok(())
    }

    async fn deploy_stage(
        &self,
        credentials: &Credentials,
        api: &ApiId,
        stage: &str,
    ) -> Result<String, RemoteProvisioningError> {
        let url = self.endpoint(&["apis", &api.0, "deployments"]);
        let request = self.client.post(url).json(&json!({ "stage": stage }));
        let response = self.send(ROUTING, request, credentials).await?;
        let response = check(ROUTING, &api.0, response).await?;
        let deployment: DeploymentResponse = decode(ROUTING, response).await?;
        Ok(deployment.url)
    }
}

#[async_trait]
impl LogSource for HttpControlPlane {
    async fn fetch_logs(
        &self,
        credentials: &Credentials,
        function_name: &str,
        start_time: Option<i64>,
    ) -> Result<Vec<LogEvent>, RemoteProvisioningError> {
        let url = self.endpoint(&["functions", function_name, "logs"]);
        let mut request = self.client.get(url);
        if let Some(start_time) = start_time {
            request = request.query(&[("start_time", start_time)]);
        }
        let response = self.send(LOGS, request, credentials).await?;
        let response = check(LOGS, function_name, response).await?;
        let logs: LogsResponse = decode(LOGS, response).await?;
        Ok(logs.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::settings::VpcConfig;
    use mockito::Matcher;

    fn credentials() -> Credentials {
        Credentials {
            access_token: "secret".to_string(),
            region: None,
        }
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let plane = HttpControlPlane::new("http://control.local/v1/").unwrap();
        assert_eq!(
            plane.endpoint(&["buckets", "my bucket", "objects", "a.tar.gz"]).as_str(),
            "http://control.local/v1/buckets/my%20bucket/objects/a.tar.gz"
        );
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(HttpControlPlane::new("not a url").is_err());
    }

    #[tokio::test]
    async fn test_existing_role_is_reused() {
        let mut server = mockito::Server::new_async().await;
        let get = server
            .mock("GET", "/roles/LambdaportExecution")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_body(r#"{"arn":"arn:role/LambdaportExecution"}"#)
            .create_async()
            .await;
        let create = server.mock("POST", "/roles").expect(0).create_async().await;

        let plane = HttpControlPlane::new(&server.url()).unwrap();
        let arn = plane
            .ensure_execution_role(&credentials(), "LambdaportExecution")
            .await
            .unwrap();

        assert_eq!(arn, "arn:role/LambdaportExecution");
        get.assert_async().await;
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_role_is_created() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/roles/BlogRole")
            .with_status(404)
            .create_async()
            .await;
        let create = server
            .mock("POST", "/roles")
            .match_body(Matcher::Json(json!({ "name": "BlogRole" })))
            .with_status(201)
            .with_body(r#"{"arn":"arn:role/BlogRole"}"#)
            .create_async()
            .await;

        let plane = HttpControlPlane::new(&server.url()).unwrap();
        let arn = plane.ensure_execution_role(&credentials(), "BlogRole").await.unwrap();

        assert_eq!(arn, "arn:role/BlogRole");
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_puts_artifact_bytes() {
        let mut server = mockito::Server::new_async().await;
        let put = server
            .mock("PUT", "/buckets/artifacts/objects/blog-dev-1.tar.gz")
            .match_body("archive-bytes")
            .with_status(201)
            .create_async()
            .await;

        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "archive-bytes").unwrap();

        let plane = HttpControlPlane::new(&server.url()).unwrap();
        let reference = plane
            .upload(&credentials(), file.path(), "artifacts", "blog-dev-1.tar.gz")
            .await
            .unwrap();

        assert_eq!(reference.to_string(), "artifacts/blog-dev-1.tar.gz");
        put.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_request_carries_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/functions")
            .with_status(409)
            .with_body("function already exists")
            .create_async()
            .await;

        let plane = HttpControlPlane::new(&server.url()).unwrap();
        let spec = FunctionSpec {
            name: "blog-dev".to_string(),
            code: StoreReference {
                bucket: "artifacts".to_string(),
                key: "blog-dev-1.tar.gz".to_string(),
            },
            handler: "bootstrap.handler".to_string(),
            memory_size: 256,
            timeout_seconds: 30,
            vpc_config: VpcConfig::default(),
            role_arn: "arn:role/x".to_string(),
        };
        let err = plane.create_function(&credentials(), &spec).await.unwrap_err();

        match err {
            RemoteProvisioningError::Rejected { status, message, .. } => {
                assert_eq!(status, 409);
                assert_eq!(message, "function already exists");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_missing_function_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/functions/blog-dev/code")
            .with_status(404)
            .create_async()
            .await;

        let plane = HttpControlPlane::new(&server.url()).unwrap();
        let code = StoreReference {
            bucket: "artifacts".to_string(),
            key: "k".to_string(),
        };
        let err = plane
            .update_function_code(&credentials(), "blog-dev", &code)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteProvisioningError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_routes_and_stage() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/apis")
            .with_status(201)
            .with_body(r#"{"id":"api-1","root_resource_id":"root"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/apis/api-1/resources")
            .match_body(Matcher::PartialJson(json!({ "parent_id": "root", "path_part": "{parameter_1}" })))
            .with_status(201)
            .with_body(r#"{"id":"res-1"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/apis/api-1/deployments")
            .match_body(Matcher::Json(json!({ "stage": "dev" })))
            .with_status(201)
            .with_body(r#"{"url":"https://api-1.example.com/dev"}"#)
            .create_async()
            .await;

        let plane = HttpControlPlane::new(&server.url()).unwrap();
        let api = plane.create_api(&credentials(), "blog-dev").await.unwrap();
        assert_eq!(api.root_resource_id, ResourceId("root".to_string()));

        let resource = plane
            .create_resource(&credentials(), &api.id, &api.root_resource_id, "{parameter_1}")
            .await
            .unwrap();
        assert_eq!(resource, ResourceId("res-1".to_string()));

        let url = plane.deploy_stage(&credentials(), &api.id, "dev").await.unwrap();
        assert_eq!(url, "https://api-1.example.com/dev");
    }

    #[tokio::test]
    async fn test_fetch_logs_passes_cursor() {
        let mut server = mockito::Server::new_async().await;
        let logs = server
            .mock("GET", "/functions/blog-dev/logs")
            .match_query(Matcher::UrlEncoded("start_time".into(), "1700".into()))
            .with_status(200)
            .with_body(r#"{"events":[{"timestamp":1700,"message":"hello"}]}"#)
            .create_async()
            .await;

        let plane = HttpControlPlane::new(&server.url()).unwrap();
        let events = plane
            .fetch_logs(&credentials(), "blog-dev", Some(1700))
            .await
            .unwrap();

        assert_eq!(events, vec![LogEvent::new(1700, "hello")]);
        logs.assert_async().await;
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/functions/blog-dev/logs")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let plane = HttpControlPlane::new(&server.url()).unwrap();
        let err = plane.fetch_logs(&credentials(), "blog-dev", None).await.unwrap_err();
        assert!(matches!(err, RemoteProvisioningError::Decode { .. }));
    }
}
