use serde::{Deserialize, Serialize};

/// Default endpoint for a key-value database running next to the tests.
pub const LOCAL_KV_ENDPOINT: &str = "http://localhost:8000";
/// Placeholder region used with the loopback endpoint.
pub const LOCAL_KV_REGION: &str = "us-east-1";

const LOCAL_KV_FLAG_VAR: &str = "AWSUTIL_LOCAL_KV";
const LOCAL_KV_ENDPOINT_VAR: &str = "AWSUTIL_LOCAL_KV_ENDPOINT";
const LOCAL_KV_REGION_VAR: &str = "AWSUTIL_LOCAL_KV_REGION";

/// Endpoint strategy for the key-value database handles.
///
/// Selected once at owner construction and consulted only by the two
/// key-value factory methods; every other handle kind ignores it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum KvBackend {
    /// Defer to ambient SDK endpoint and region configuration.
    #[default]
    Remote,
    /// Explicit loopback endpoint, for running without a live remote database.
    Local { endpoint: String, region: String },
}

impl KvBackend {
    /// Loopback backend with the default local endpoint and region.
    pub fn local() -> Self {
        KvBackend::Local {
            endpoint: LOCAL_KV_ENDPOINT.to_string(),
            region: LOCAL_KV_REGION.to_string(),
        }
    }

    /// Resolve the backend from `AWSUTIL_LOCAL_KV` (`1`/`true`/`yes` in any
    /// case selects the local backend, anything else the remote one), with
    /// optional endpoint and region overrides.
    pub fn from_env() -> Self {
        let flag = std::env::var(LOCAL_KV_FLAG_VAR)
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if !matches!(flag.as_str(), "1" | "true" | "yes") {
            return KvBackend::Remote;
        }

        KvBackend::Local {
            endpoint: std::env::var(LOCAL_KV_ENDPOINT_VAR)
                .unwrap_or_else(|_| LOCAL_KV_ENDPOINT.to_string()),
            region: std::env::var(LOCAL_KV_REGION_VAR)
                .unwrap_or_else(|_| LOCAL_KV_REGION.to_string()),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, KvBackend::Local { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backend_is_remote() {
        assert_eq!(KvBackend::default(), KvBackend::Remote);
        assert!(!KvBackend::default().is_local());
    }

    #[test]
    fn local_backend_uses_loopback_defaults() {
        let KvBackend::Local { endpoint, region } = KvBackend::local() else {
            panic!("local() should build a local backend");
        };
        assert_eq!(endpoint, "http://localhost:8000");
        assert_eq!(region, "us-east-1");
    }

    #[test]
    fn env_flag_selects_the_local_backend() {
        std::env::set_var(LOCAL_KV_FLAG_VAR, "true");
        std::env::set_var(LOCAL_KV_ENDPOINT_VAR, "http://localhost:9000");
        let lowercase = KvBackend::from_env();

        std::env::set_var(LOCAL_KV_FLAG_VAR, "TRUE");
        let uppercase = KvBackend::from_env();

        std::env::set_var(LOCAL_KV_FLAG_VAR, "0");
        let disabled = KvBackend::from_env();

        std::env::remove_var(LOCAL_KV_FLAG_VAR);
        std::env::remove_var(LOCAL_KV_ENDPOINT_VAR);

        assert_eq!(
            lowercase,
            KvBackend::Local {
                endpoint: "http://localhost:9000".to_string(),
                region: LOCAL_KV_REGION.to_string(),
            }
        );
        assert_eq!(uppercase, lowercase);
        assert_eq!(disabled, KvBackend::Remote);
    }
}
