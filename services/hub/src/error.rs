use thiserror::Error;

/// Everything that can go wrong inside the hub, outside of the ordinary
/// per-connection I/O errors that `connection` already handles locally.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("state store error: {0}")]
    Store(String),

    #[error("bus error: {0}")]
    Bus(String),

    #[error("failed to decode message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<redis::RedisError> for HubError {
    fn from(err: redis::RedisError) -> Self {
        // Both the store and bus adapters are backed by the same Redis
        // client; callers that need to tell the two apart wrap this
        // themselves before it escapes the adapter.
        HubError::Store(err.to_string())
    }
}
