use thiserror::Error;

use crate::error::QueryError;

/// Raised by a receiver. Returning one from a pre-phase receiver vetoes the
/// pending bulk operation.
#[derive(Debug, Error, Clone)]
pub enum ObserverError {
    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("System error: {0}")]
    System(String),

    #[error("Query failed inside receiver: {0}")]
    QueryFailed(#[source] Box<QueryError>),
}

impl ObserverError {
    pub fn rejected(message: impl Into<String>) -> Self {
        ObserverError::Rejected(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ObserverError::Validation(message.into())
    }

    pub fn system(message: impl Into<String>) -> Self {
        ObserverError::System(message.into())
    }
}

/// Receivers that touch the store (`raw_update`, `fetch`, ...) can use `?`
impl From<QueryError> for ObserverError {
    fn from(err: QueryError) -> Self {
        ObserverError::QueryFailed(Box::new(err))
    }
}

impl From<anyhow::Error> for ObserverError {
    fn from(err: anyhow::Error) -> Self {
        ObserverError::System(format!("{:#}", err))
    }
}
