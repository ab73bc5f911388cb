use std::collections::BTreeMap;
use std::sync::Arc;

use aws_config::SdkConfig;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::LogType;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use awsutil_core::backend::KvBackend;
use awsutil_core::error::ConstructionError;
use awsutil_core::kind::HandleKind;
use awsutil_core::registry::ServiceHandles;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::deploy::FunctionDeployer;
use crate::error::OpError;
use crate::factory::SdkHandleFactory;
use crate::stores::kv::TableStore;
use crate::stores::object::BucketStore;
use crate::stores::vm::InstanceFleet;

/// Result of one function invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionInvocation {
    pub status_code: i32,
    pub payload: Option<Value>,
    /// Base64-encoded tail of the execution log, present when requested.
    pub log_tail: Option<String>,
}

/// Lazily initialized AWS service handles for one logical session.
///
/// Handles are constructed on first use and cached for the session's
/// lifetime; two sessions never share a handle. The thin operations below
/// exist to drive the cached handles — callers with richer needs take the
/// handle itself via the typed accessors.
pub struct AwsSession {
    handles: ServiceHandles<SdkHandleFactory>,
}

impl AwsSession {
    pub fn new(config: SdkConfig, kv_backend: KvBackend) -> Self {
        Self {
            handles: ServiceHandles::new(SdkHandleFactory::new(config), kv_backend),
        }
    }

    /// Session over ambient credential/region configuration, with the
    /// key-value backend resolved from the environment.
    pub async fn from_env() -> Self {
        Self::from_env_with_backend(KvBackend::from_env()).await
    }

    pub async fn from_env_with_backend(kv_backend: KvBackend) -> Self {
        let factory = SdkHandleFactory::from_env().await;
        Self {
            handles: ServiceHandles::new(factory, kv_backend),
        }
    }

    pub fn handles(&self) -> &ServiceHandles<SdkHandleFactory> {
        &self.handles
    }

    pub fn kv_backend(&self) -> &KvBackend {
        self.handles.kv_backend()
    }

    pub fn object_client(&self) -> Result<Arc<aws_sdk_s3::Client>, ConstructionError> {
        self.handles.object_client()
    }

    pub fn object_store(&self) -> Result<Arc<BucketStore>, ConstructionError> {
        self.handles.object_store()
    }

    pub fn identity_client(&self) -> Result<Arc<aws_sdk_iam::Client>, ConstructionError> {
        self.handles.identity_client()
    }

    pub fn function_client(&self) -> Result<Arc<aws_sdk_lambda::Client>, ConstructionError> {
        self.handles.function_client()
    }

    pub fn function_deployer(&self) -> Result<Arc<FunctionDeployer>, ConstructionError> {
        self.handles.function_deployer()
    }

    pub fn vm_client(&self) -> Result<Arc<aws_sdk_ec2::Client>, ConstructionError> {
        self.handles.vm_client()
    }

    pub fn vm_fleet(&self) -> Result<Arc<InstanceFleet>, ConstructionError> {
        self.handles.vm_fleet()
    }

    pub fn kv_client(&self) -> Result<Arc<aws_sdk_dynamodb::Client>, ConstructionError> {
        self.handles.kv_client()
    }

    pub fn kv_store(&self) -> Result<Arc<TableStore>, ConstructionError> {
        self.handles.kv_store()
    }

    // Object storage

    pub async fn list_buckets(&self) -> Result<Vec<String>, OpError> {
        let client = self.object_client()?;
        let response = client
            .list_buckets()
            .send()
            .await
            .map_err(|error| OpError::service(format!("failed to list buckets: {error}")))?;
        Ok(response
            .buckets()
            .iter()
            .filter_map(|bucket| bucket.name().map(str::to_string))
            .collect())
    }

    pub async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
    ) -> Result<(), OpError> {
        let client = self.object_client()?;
        client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map(|_| ())
            .map_err(|error| {
                OpError::service(format!("failed to upload {key} to {bucket}: {error}"))
            })
    }

    /// Delete the given keys in one batched request. Returns the number of
    /// keys submitted; an empty list is a no-op.
    pub async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<usize, OpError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let client = self.object_client()?;
        let mut identifiers = Vec::with_capacity(keys.len());
        for key in keys {
            identifiers.push(
                ObjectIdentifier::builder()
                    .key(key)
                    .build()
                    .map_err(|error| {
                        OpError::service(format!("invalid object key {key}: {error}"))
                    })?,
            );
        }
        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .build()
            .map_err(|error| {
                OpError::service(format!("failed to build delete request: {error}"))
            })?;

        client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|error| {
                OpError::service(format!("failed to delete objects from {bucket}: {error}"))
            })?;
        Ok(keys.len())
    }

    // Identity

    /// Role name to ARN, for every role visible to the account.
    pub async fn list_roles(&self) -> Result<BTreeMap<String, String>, OpError> {
        let client = self.identity_client()?;
        let response = client
            .list_roles()
            .send()
            .await
            .map_err(|error| OpError::service(format!("failed to list roles: {error}")))?;
        Ok(response
            .roles()
            .iter()
            .map(|role| (role.role_name().to_string(), role.arn().to_string()))
            .collect())
    }

    /// ARN of the named role, or `None` when it does not exist.
    pub async fn validate_role(&self, role_name: &str) -> Result<Option<String>, OpError> {
        Ok(self.list_roles().await?.remove(role_name))
    }

    // Functions

    pub async fn invoke_function(
        &self,
        function_name: &str,
        payload: &Value,
        tail_log: bool,
    ) -> Result<FunctionInvocation, OpError> {
        let client = self.function_client()?;
        let body = serde_json::to_vec(payload).map_err(|error| {
            OpError::service(format!("failed to encode invocation payload: {error}"))
        })?;
        let log_type = if tail_log { LogType::Tail } else { LogType::None };

        let response = client
            .invoke()
            .function_name(function_name)
            .payload(Blob::new(body))
            .log_type(log_type)
            .send()
            .await
            .map_err(|error| {
                OpError::service(format!("failed to invoke function {function_name}: {error}"))
            })?;

        if let Some(function_error) = response.function_error() {
            return Err(OpError::service(format!(
                "function {function_name} returned an error: {function_error}"
            )));
        }

        let payload = response
            .payload()
            .map(|blob| serde_json::from_slice(blob.as_ref()))
            .transpose()
            .map_err(|error| {
                OpError::service(format!(
                    "function {function_name} returned a non-JSON payload: {error}"
                ))
            })?;

        Ok(FunctionInvocation {
            status_code: response.status_code(),
            payload,
            log_tail: response.log_result().map(str::to_string),
        })
    }

    pub async fn update_function_code(
        &self,
        function_name: &str,
        zip_archive: Vec<u8>,
    ) -> Result<(), OpError> {
        let client = self.function_client()?;
        client
            .update_function_code()
            .function_name(function_name)
            .zip_file(Blob::new(zip_archive))
            .send()
            .await
            .map(|_| ())
            .map_err(|error| {
                OpError::service(format!(
                    "failed to update code for {function_name}: {error}"
                ))
            })
    }

    pub async fn list_functions(&self) -> Result<Vec<String>, OpError> {
        let client = self.function_client()?;
        let mut pages = client.list_functions().into_paginator().send();
        let mut names = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page
                .map_err(|error| OpError::service(format!("failed to list functions: {error}")))?;
            names.extend(
                page.functions()
                    .iter()
                    .filter_map(|function| function.function_name().map(str::to_string)),
            );
        }
        Ok(names)
    }

    // Virtual machines

    pub async fn start_instances(&self, instance_ids: &[String]) -> Result<(), OpError> {
        let client = self.vm_client()?;
        client
            .start_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
            .map(|_| ())
            .map_err(|error| OpError::service(format!("failed to start instances: {error}")))
    }

    pub async fn stop_instances(&self, instance_ids: &[String]) -> Result<(), OpError> {
        let client = self.vm_client()?;
        client
            .stop_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
            .map(|_| ())
            .map_err(|error| OpError::service(format!("failed to stop instances: {error}")))
    }

    pub async fn terminate_instances(&self, instance_ids: &[String]) -> Result<(), OpError> {
        let client = self.vm_client()?;
        client
            .terminate_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
            .map(|_| ())
            .map_err(|error| OpError::service(format!("failed to terminate instances: {error}")))
    }

    // Key-value database

    pub async fn list_tables(&self) -> Result<Vec<String>, OpError> {
        let client = self.kv_client()?;
        let response = client
            .list_tables()
            .send()
            .await
            .map_err(|error| OpError::service(format!("failed to list tables: {error}")))?;
        Ok(response.table_names().to_vec())
    }

    /// Pre-warm every slot; useful before handing the session to
    /// latency-sensitive callers.
    pub fn warm_all(&self) -> Result<(), ConstructionError> {
        self.handles.warm_all()
    }

    pub fn is_cached(&self, kind: HandleKind) -> bool {
        self.handles.is_cached(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::tests::test_config;

    #[test]
    fn repeated_reads_return_the_cached_client() {
        let session = AwsSession::new(test_config(), KvBackend::default());

        let first = session.object_client().expect("client should build");
        let second = session.object_client().expect("client should hit cache");

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn accessors_fill_only_their_own_slot() {
        let session = AwsSession::new(test_config(), KvBackend::default());

        session.function_client().expect("client should build");

        assert_eq!(
            session.handles().cached_kinds(),
            vec![HandleKind::FunctionClient]
        );
        assert!(!session.is_cached(HandleKind::KvClient));
    }

    #[test]
    fn warm_all_builds_every_handle_offline() {
        let session = AwsSession::new(test_config(), KvBackend::default());

        session.warm_all().expect("every handle should build");

        assert_eq!(session.handles().cached_kinds(), HandleKind::ALL.to_vec());
    }

    #[test]
    fn session_kv_backend_reaches_the_client() {
        let session = AwsSession::new(test_config(), KvBackend::local());

        let client = session.kv_client().expect("kv client should build");

        assert!(session.kv_backend().is_local());
        assert_eq!(
            client.config().region().map(|region| region.as_ref()),
            Some("us-east-1")
        );
    }

    #[tokio::test]
    async fn deleting_no_objects_is_a_no_op() {
        let session = AwsSession::new(test_config(), KvBackend::default());

        let deleted = session
            .delete_objects("sweep-results", &[])
            .await
            .expect("empty delete should succeed without a service call");

        assert_eq!(deleted, 0);
        assert!(!session.is_cached(HandleKind::ObjectClient));
    }

    #[test]
    fn sessions_do_not_share_handles() {
        let first_session = AwsSession::new(test_config(), KvBackend::default());
        let second_session = AwsSession::new(test_config(), KvBackend::default());

        let first = first_session.vm_client().expect("client should build");
        let second = second_session.vm_client().expect("client should build");

        assert!(!Arc::ptr_eq(&first, &second));
    }
}
