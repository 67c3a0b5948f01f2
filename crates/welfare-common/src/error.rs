/// Error types shared across the workspace's server crates.
///
/// These cover infrastructure failures (Redis, the case-management backend)
/// that more than one server can hit. Server-specific errors live in each
/// server crate and wrap `CommonError` via `#[from]`.
use crate::backend::BackendError;

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("redis unavailable")]
    RedisUnavailable,

    #[error("stored document is not valid JSON: {0}")]
    Document(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}
