use thiserror::Error;

use crate::database::{DatabaseError, Operation, RecordError};
use crate::filter::FilterError;
use crate::signals::{ObserverError, Phase};

/// Error surface of every queryset bulk operation.
///
/// `Database` is whatever the underlying store raised and is passed through
/// untouched. `Observer` means a receiver failed: in the pre-phase nothing was
/// written, in the post-phase the write already happened.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("{phase}_{operation} receiver failed: {source}")]
    Observer {
        operation: Operation,
        phase: Phase,
        #[source]
        source: ObserverError,
    },
}

pub type QueryResult<T> = Result<T, QueryError>;

impl QueryError {
    pub fn observer(operation: Operation, phase: Phase, source: ObserverError) -> Self {
        QueryError::Observer { operation, phase, source }
    }

    pub fn is_observer(&self) -> bool {
        matches!(self, QueryError::Observer { .. })
    }

    pub fn is_database(&self) -> bool {
        matches!(self, QueryError::Database(_))
    }

    /// Whether the mutation may already have been applied
    pub fn after_write(&self) -> bool {
        matches!(self, QueryError::Observer { phase: Phase::Post, .. })
    }

    pub fn observer_error(&self) -> Option<&ObserverError> {
        match self {
            QueryError::Observer { source, .. } => Some(source),
            QueryError::Database(_) => None,
        }
    }
}

impl From<FilterError> for QueryError {
    fn from(err: FilterError) -> Self {
        QueryError::Database(err.into())
    }
}

impl From<RecordError> for QueryError {
    fn from(err: RecordError) -> Self {
        QueryError::Database(err.into())
    }
}
