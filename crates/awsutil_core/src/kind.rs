use serde::{Deserialize, Serialize};

/// Closed set of service handles an owner can hold, one variant per slot.
///
/// Dispatch is by variant (or by the typed accessors on
/// [`crate::registry::ServiceHandles`]); there is no stringly-typed lookup,
/// so an unknown kind is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandleKind {
    ObjectClient,
    ObjectStore,
    IdentityClient,
    FunctionClient,
    FunctionDeployer,
    VmClient,
    VmFleet,
    KvClient,
    KvStore,
}

impl HandleKind {
    /// Every kind, in slot order.
    pub const ALL: [HandleKind; 9] = [
        HandleKind::ObjectClient,
        HandleKind::ObjectStore,
        HandleKind::IdentityClient,
        HandleKind::FunctionClient,
        HandleKind::FunctionDeployer,
        HandleKind::VmClient,
        HandleKind::VmFleet,
        HandleKind::KvClient,
        HandleKind::KvStore,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ObjectClient => "object-client",
            Self::ObjectStore => "object-store",
            Self::IdentityClient => "identity-client",
            Self::FunctionClient => "function-client",
            Self::FunctionDeployer => "function-deployer",
            Self::VmClient => "vm-client",
            Self::VmFleet => "vm-fleet",
            Self::KvClient => "kv-client",
            Self::KvStore => "kv-store",
        }
    }

    /// True for the two kinds whose construction consults the key-value
    /// backend selection.
    pub fn uses_kv_backend(self) -> bool {
        matches!(self, Self::KvClient | Self::KvStore)
    }
}

impl std::fmt::Display for HandleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_stable() {
        let names: Vec<&str> = HandleKind::ALL.iter().map(|kind| kind.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "object-client",
                "object-store",
                "identity-client",
                "function-client",
                "function-deployer",
                "vm-client",
                "vm-fleet",
                "kv-client",
                "kv-store",
            ]
        );
    }

    #[test]
    fn only_kv_kinds_consult_the_backend() {
        let kv_kinds: Vec<HandleKind> = HandleKind::ALL
            .into_iter()
            .filter(|kind| kind.uses_kv_backend())
            .collect();
        assert_eq!(kv_kinds, vec![HandleKind::KvClient, HandleKind::KvStore]);
    }
}
