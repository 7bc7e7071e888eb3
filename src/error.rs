use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectHubError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

pub use crate::Result;

impl From<diesel::result::Error> for ProjectHubError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl ProjectHubError {
    /// True for errors caused by the caller rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::Validation(_)
                | Self::Conflict(_)
                | Self::Forbidden(_)
                | Self::Unauthorized(_)
        )
    }
}
