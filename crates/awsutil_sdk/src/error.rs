use awsutil_core::error::ConstructionError;

/// A service operation failed, either while materializing the handle it
/// needed or inside the service call itself.
#[derive(Debug)]
pub enum OpError {
    /// The handle for the operation could not be constructed; the slot stays
    /// absent and the operation is safe to retry.
    Handle(ConstructionError),
    /// The service call failed after the handle was available.
    Service(String),
}

impl OpError {
    pub fn service(message: impl Into<String>) -> Self {
        OpError::Service(message.into())
    }
}

impl From<ConstructionError> for OpError {
    fn from(error: ConstructionError) -> Self {
        OpError::Handle(error)
    }
}

impl std::fmt::Display for OpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpError::Handle(error) => error.fmt(f),
            OpError::Service(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for OpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OpError::Handle(error) => Some(error),
            OpError::Service(_) => None,
        }
    }
}
