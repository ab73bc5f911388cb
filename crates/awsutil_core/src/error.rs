use crate::kind::HandleKind;

/// A handle factory failed while building a handle.
///
/// The slot for `kind` stays absent, so a later read retries construction;
/// only successes are cached. The registry performs no retry of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructionError {
    kind: HandleKind,
    message: String,
}

impl ConstructionError {
    pub fn new(kind: HandleKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ConstructionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "failed to construct {} handle: {}",
            self.kind, self.message
        )
    }
}

impl std::error::Error for ConstructionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failing_kind() {
        let error = ConstructionError::new(HandleKind::KvClient, "endpoint unreachable");
        assert_eq!(
            error.to_string(),
            "failed to construct kv-client handle: endpoint unreachable"
        );
        assert_eq!(error.kind(), HandleKind::KvClient);
        assert_eq!(error.message(), "endpoint unreachable");
    }
}
