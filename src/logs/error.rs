use thiserror::Error;
use uuid::Uuid;

/// Errors returned by a [`LogStore`](crate::logs::LogStore)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LogStoreError {
    /// The entry breaks a field constraint; the message names the field
    #[error("{0}")]
    Validation(String),

    #[error("log not found: {0}")]
    NotFound(Uuid),

    /// The entry exists but belongs to another user
    #[error("unauthorized: log {0} does not belong to user")]
    NotOwner(Uuid),
}

impl LogStoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        LogStoreError::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, LogStoreError>;
