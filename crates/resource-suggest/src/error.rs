use welfare_common::backend::BackendError;
use welfare_common::error::CommonError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("config error: {0}")]
    Config(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("usage record not found: {0}")]
    UsageNotFound(String),

    #[error("resource {resource_id} is already in use by {client_name}")]
    AlreadyInUse {
        client_name: String,
        resource_id: String,
    },
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        AppError::Common(CommonError::Backend(err))
    }
}
