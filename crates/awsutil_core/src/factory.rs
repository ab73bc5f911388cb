use crate::backend::KvBackend;

/// Builds one handle per service family, on demand.
///
/// The registry in [`crate::registry`] calls each method at most once per
/// owner; implementations should not cache anything themselves. Methods
/// return `Err(String)`; the registry attaches the failing
/// [`crate::kind::HandleKind`] when it surfaces the error.
///
/// The two key-value methods receive the owner's [`KvBackend`]; every other
/// handle is built from ambient credential and region configuration alone.
pub trait HandleFactory {
    type ObjectClient;
    type ObjectStore;
    type IdentityClient;
    type FunctionClient;
    type FunctionDeployer;
    type VmClient;
    type VmFleet;
    type KvClient;
    type KvStore;

    fn object_client(&self) -> Result<Self::ObjectClient, String>;
    fn object_store(&self) -> Result<Self::ObjectStore, String>;
    fn identity_client(&self) -> Result<Self::IdentityClient, String>;
    fn function_client(&self) -> Result<Self::FunctionClient, String>;
    fn function_deployer(&self) -> Result<Self::FunctionDeployer, String>;
    fn vm_client(&self) -> Result<Self::VmClient, String>;
    fn vm_fleet(&self) -> Result<Self::VmFleet, String>;
    fn kv_client(&self, backend: &KvBackend) -> Result<Self::KvClient, String>;
    fn kv_store(&self, backend: &KvBackend) -> Result<Self::KvStore, String>;
}
