use thiserror::Error;

use crate::database::operation::Operation;
use crate::database::record::RecordError;
use crate::filter::FilterError;

/// Errors raised by the in-memory store's native operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DatabaseError {
    #[error("{model} has no field named '{field}'")]
    UnknownField { model: &'static str, field: String },

    #[error("{model} matching query does not exist")]
    DoesNotExist { model: &'static str },

    #[error("get() returned more than one {model} -- it returned {count}")]
    MultipleObjectsReturned { model: &'static str, count: usize },

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Cannot use a sliced queryset with {0}")]
    SlicedQuery(Operation),

    #[error("Batch size must be a positive integer, got {0}")]
    InvalidBatchSize(usize),

    #[error("Expected a {operation} call or outcome, got {found}")]
    OperationMismatch { operation: Operation, found: Operation },

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Record(#[from] RecordError),
}
