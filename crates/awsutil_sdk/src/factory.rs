use aws_config::SdkConfig;
use awsutil_core::backend::KvBackend;
use awsutil_core::factory::HandleFactory;

use crate::deploy::FunctionDeployer;
use crate::stores::kv::TableStore;
use crate::stores::object::BucketStore;
use crate::stores::vm::InstanceFleet;

/// Handle factory backed by the AWS SDK for Rust.
///
/// Every handle is built from one resolved [`SdkConfig`]. The two key-value
/// handles derive a service config from it and override endpoint and region
/// when a local backend is selected; every other handle uses the shared
/// config untouched.
#[derive(Debug, Clone)]
pub struct SdkHandleFactory {
    config: SdkConfig,
}

impl SdkHandleFactory {
    pub fn new(config: SdkConfig) -> Self {
        Self { config }
    }

    /// Resolve ambient credential and region configuration once and build a
    /// factory over it.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(config)
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    fn kv_config(&self, backend: &KvBackend) -> SdkConfig {
        match backend {
            KvBackend::Remote => self.config.clone(),
            KvBackend::Local { endpoint, region } => self
                .config
                .to_builder()
                .endpoint_url(endpoint)
                .region(aws_config::Region::new(region.clone()))
                .build(),
        }
    }
}

impl HandleFactory for SdkHandleFactory {
    type ObjectClient = aws_sdk_s3::Client;
    type ObjectStore = BucketStore;
    type IdentityClient = aws_sdk_iam::Client;
    type FunctionClient = aws_sdk_lambda::Client;
    type FunctionDeployer = FunctionDeployer;
    type VmClient = aws_sdk_ec2::Client;
    type VmFleet = InstanceFleet;
    type KvClient = aws_sdk_dynamodb::Client;
    type KvStore = TableStore;

    fn object_client(&self) -> Result<Self::ObjectClient, String> {
        Ok(aws_sdk_s3::Client::new(&self.config))
    }

    fn object_store(&self) -> Result<Self::ObjectStore, String> {
        Ok(BucketStore::new(aws_sdk_s3::Client::new(&self.config)))
    }

    fn identity_client(&self) -> Result<Self::IdentityClient, String> {
        Ok(aws_sdk_iam::Client::new(&self.config))
    }

    fn function_client(&self) -> Result<Self::FunctionClient, String> {
        Ok(aws_sdk_lambda::Client::new(&self.config))
    }

    fn function_deployer(&self) -> Result<Self::FunctionDeployer, String> {
        Ok(FunctionDeployer::new(
            aws_sdk_lambda::Client::new(&self.config),
            aws_sdk_iam::Client::new(&self.config),
        ))
    }

    fn vm_client(&self) -> Result<Self::VmClient, String> {
        Ok(aws_sdk_ec2::Client::new(&self.config))
    }

    fn vm_fleet(&self) -> Result<Self::VmFleet, String> {
        Ok(InstanceFleet::new(aws_sdk_ec2::Client::new(&self.config)))
    }

    fn kv_client(&self, backend: &KvBackend) -> Result<Self::KvClient, String> {
        Ok(aws_sdk_dynamodb::Client::new(&self.kv_config(backend)))
    }

    fn kv_store(&self, backend: &KvBackend) -> Result<Self::KvStore, String> {
        Ok(TableStore::new(aws_sdk_dynamodb::Client::new(
            &self.kv_config(backend),
        )))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_config() -> SdkConfig {
        SdkConfig::builder()
            .behavior_version(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new("eu-west-1"))
            .build()
    }

    #[test]
    fn local_backend_overrides_kv_endpoint_and_region() {
        let factory = SdkHandleFactory::new(test_config());

        let config = factory.kv_config(&KvBackend::local());

        assert_eq!(config.endpoint_url(), Some("http://localhost:8000"));
        assert_eq!(
            config.region().map(|region| region.as_ref()),
            Some("us-east-1")
        );
    }

    #[test]
    fn remote_backend_keeps_ambient_kv_config() {
        let factory = SdkHandleFactory::new(test_config());

        let config = factory.kv_config(&KvBackend::Remote);

        assert_eq!(config.endpoint_url(), None);
        assert_eq!(
            config.region().map(|region| region.as_ref()),
            Some("eu-west-1")
        );
    }

    #[test]
    fn kv_store_shares_the_backend_override() {
        let factory = SdkHandleFactory::new(test_config());

        let store = factory
            .kv_store(&KvBackend::local())
            .expect("kv store should build");

        assert_eq!(
            store.client().config().region().map(|region| region.as_ref()),
            Some("us-east-1")
        );
    }

    #[test]
    fn non_kv_clients_use_the_ambient_region() {
        let factory = SdkHandleFactory::new(test_config());

        let client = factory.vm_client().expect("vm client should build");

        assert_eq!(
            client.config().region().map(|region| region.as_ref()),
            Some("eu-west-1")
        );
    }
}
