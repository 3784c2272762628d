// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory remote services.
//!
//! Records every call in order and can be told to fail a given operation.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::logs::LogEvent;
use crate::domain::platform::{
    ApiId, ArtifactStore, CredentialProvider, Credentials, EndpointProbe, FunctionArn,
    FunctionPlatform, FunctionSpec, IdentityManager, LogSource, MethodSpec, RemoteProvisioningError,
    RemoteServices, ResourceId, RestApi, RoutingLayer, StoreReference,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Credentials,
    EnsureRole,
    Upload,
    Remove,
    CreateFunction,
    UpdateFunctionCode,
    CreateApi,
    CreateResource,
    CreateMethod,
    DeployStage,
    FetchLogs,
    Touch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    LoadCredentials,
    EnsureRole(String),
    Upload { bucket: String, key: String },
    Remove(StoreReference),
    CreateFunction(FunctionSpec),
    UpdateFunctionCode { name: String, code: StoreReference },
    CreateApi(String),
    CreateResource { api: ApiId, parent: ResourceId, path_part: String },
    CreateMethod { api: ApiId, resource: ResourceId, http_method: String },
    DeployStage { api: ApiId, stage: String },
    FetchLogs { function_name: String, start_time: Option<i64> },
    Touch(String),
}

#[derive(Default)]
struct MockState {
    calls: Vec<RecordedCall>,
    failures: HashSet<MockOperation>,
    objects: HashSet<StoreReference>,
    functions: HashMap<String, StoreReference>,
    logs: Vec<LogEvent>,
    next_id: u64,
}

#[derive(Default)]
pub struct MockControlPlane {
    state: Mutex<MockState>,
}

impl MockControlPlane {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bundle this mock as every remote service
    pub fn services(self: &Arc<Self>) -> RemoteServices {
        RemoteServices {
            credentials: self.clone(),
            identity: self.clone(),
            store: self.clone(),
            functions: self.clone(),
            routing: self.clone(),
            probe: self.clone(),
        }
    }

    pub fn fail_on(&self, operation: MockOperation) {
        self.state().failures.insert(operation);
    }

    /// Pretend `name` was deployed before
    pub fn register_function(&self, name: &str, code: StoreReference) {
        self.state().functions.insert(name.to_string(), code);
    }

    pub fn push_log(&self, event: LogEvent) {
        self.state().logs.push(event);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    pub fn count(&self, predicate: impl Fn(&RecordedCall) -> bool) -> usize {
        self.state().calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn stored_objects(&self) -> usize {
        self.state().objects.len()
    }

    pub fn function_code(&self, name: &str) -> Option<StoreReference> {
        self.state().functions.get(name).cloned()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `call`, then fail if `operation` was marked failing
    fn record(
        &self,
        operation: MockOperation,
        call: RecordedCall,
    ) -> Result<MutexGuard<'_, MockState>, RemoteProvisioningError> {
        let mut state = self.state();
        state.calls.push(call);
        if state.failures.contains(&operation) {
            return Err(RemoteProvisioningError::Request {
                service: "mock",
                message: format!("injected failure for {:?}", operation),
            });
        }
        Ok(state)
    }

    /// [`Self::record`] for calls that leave the state alone
    fn check(&self, operation: MockOperation, call: RecordedCall) -> Result<(), RemoteProvisioningError> {
        self.record(operation, call).map(drop)
    }

    fn next_id(state: &mut MockState, prefix: &str) -> String {
        state.next_id += 1;
        format!("{}-{}", prefix, state.next_id)
    }
}

#[async_trait]
impl CredentialProvider for MockControlPlane {
    async fn load_credentials(&self) -> Result<Credentials, RemoteProvisioningError> {
        self.check(MockOperation::Credentials, RecordedCall::LoadCredentials)?;
        Ok(Credentials {
            access_token: "mock-token".to_string(),
            region: Some("mock-region".to_string()),
        })
    }
}

#[async_trait]
impl IdentityManager for MockControlPlane {
    async fn ensure_execution_role(
        &self,
        _credentials: &Credentials,
        role_name: &str,
    ) -> Result<String, RemoteProvisioningError> {
        self.check(MockOperation::EnsureRole, RecordedCall::EnsureRole(role_name.to_string()))?;
        Ok(format!("arn:mock:role/{}", role_name))
    }
}

#[async_trait]
impl ArtifactStore for MockControlPlane {
    async fn upload(
        &self,
        _credentials: &Credentials,
        artifact: &Path,
        bucket: &str,
        key: &str,
    ) -> Result<StoreReference, RemoteProvisioningError> {
        let call = RecordedCall::Upload {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        let mut state = self.record(MockOperation::Upload, call)?;
        if !artifact.is_file() {
            return Err(RemoteProvisioningError::Request {
                service: "mock",
                message: format!("artifact {} does not exist", artifact.display()),
            });
        }

        let reference = StoreReference {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        state.objects.insert(reference.clone());
        Ok(reference)
    }

    async fn remove(
        &self,
        _credentials: &Credentials,
        reference: &StoreReference,
    ) -> Result<(), RemoteProvisioningError> {
        let mut state = self.record(MockOperation::Remove, RecordedCall::Remove(reference.clone()))?;
        if !state.objects.remove(reference) {
            return Err(RemoteProvisioningError::NotFound {
                service: "mock",
                resource: reference.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl FunctionPlatform for MockControlPlane {
    async fn create_function(
        &self,
        _credentials: &Credentials,
        spec: &FunctionSpec,
    ) -> Result<FunctionArn, RemoteProvisioningError> {
        let mut state = self.record(MockOperation::CreateFunction, RecordedCall::CreateFunction(spec.clone()))?;
        if state.functions.contains_key(&spec.name) {
            return Err(RemoteProvisioningError::Rejected {
                service: "mock",
                status: 409,
                message: format!("function {} already exists", spec.name),
            });
        }
        state.functions.insert(spec.name.clone(), spec.code.clone());
        Ok(FunctionArn(format!("arn:mock:function/{}", spec.name)))
    }

    async fn update_function_code(
        &self,
        _credentials: &Credentials,
        function_name: &str,
        code: &StoreReference,
    ) -> Result<FunctionArn, RemoteProvisioningError> {
        let call = RecordedCall::UpdateFunctionCode {
            name: function_name.to_string(),
            code: code.clone(),
        };
        let mut state = self.record(MockOperation::UpdateFunctionCode, call)?;
        match state.functions.get_mut(function_name) {
            Some(current) => {
                *current = code.clone();
                Ok(FunctionArn(format!("arn:mock:function/{}", function_name)))
            }
            None => Err(RemoteProvisioningError::NotFound {
                service: "mock",
                resource: function_name.to_string(),
            }),
        }
    }
}

#[async_trait]
impl RoutingLayer for MockControlPlane {
    async fn create_api(
        &self,
        _credentials: &Credentials,
        name: &str,
    ) -> Result<RestApi, RemoteProvisioningError> {
        let mut state = self.record(MockOperation::CreateApi, RecordedCall::CreateApi(name.to_string()))?;
        let id = Self::next_id(&mut state, "api");
        let root = Self::next_id(&mut state, "resource");
        Ok(RestApi {
            id: ApiId(id),
            root_resource_id: ResourceId(root),
        })
    }

    async fn create_resource(
        &self,
        _credentials: &Credentials,
        api: &ApiId,
        parent: &ResourceId,
        path_part: &str,
    ) -> Result<ResourceId, RemoteProvisioningError> {
        let call = RecordedCall::CreateResource {
            api: api.clone(),
            parent: parent.clone(),
            path_part: path_part.to_string(),
        };
        let mut state = self.record(MockOperation::CreateResource, call)?;
        Ok(ResourceId(Self::next_id(&mut state, "resource")))
    }

    async fn create_method(
        &self,
        _credentials: &Credentials,
        api: &ApiId,
        resource: &ResourceId,
        method: &MethodSpec,
    ) -> Result<(), RemoteProvisioningError> {
        let call = RecordedCall::CreateMethod {
            api: api.clone(),
            resource: resource.clone(),
            http_method: method.http_method.clone(),
        };
        self.check(MockOperation::CreateMethod, call)?;
        Ok(())
    }

    async fn deploy_stage(
        &self,
        _credentials: &Credentials,
        api: &ApiId,
        stage: &str,
    ) -> Result<String, RemoteProvisioningError> {
        let call = RecordedCall::DeployStage {
            api: api.clone(),
            stage: stage.to_string(),
        };
        self.check(MockOperation::DeployStage, call)?;
        Ok(format!("https://{}.mock.invalid/{}", api.0, stage))
    }
}

#[async_trait]
impl LogSource for MockControlPlane {
    /// Every event at or after `start_time`, boundary included
    async fn fetch_logs(
        &self,
        _credentials: &Credentials,
        function_name: &str,
        start_time: Option<i64>,
    ) -> Result<Vec<LogEvent>, RemoteProvisioningError> {
        let call = RecordedCall::FetchLogs {
            function_name: function_name.to_string(),
            start_time,
        };
        let state = self.record(MockOperation::FetchLogs, call)?;
        Ok(state
            .logs
            .iter()
            .filter(|event| start_time.is_none_or(|start| event.timestamp >= start))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EndpointProbe for MockControlPlane {
    async fn touch(&self, url: &str) -> Result<u16, RemoteProvisioningError> {
        self.check(MockOperation::Touch, RecordedCall::Touch(url.to_string()))?;
        Ok(200)
    }
}
