use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::database::error::DatabaseError;
use serde_json::Value;

use crate::database::record::{values_from_json, Record, RecordError, Values};
use crate::error::QueryResult;

/// The five interceptable bulk operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    BulkCreate,
    GetOrCreate,
    UpdateOrCreate,
    Delete,
    Update,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::BulkCreate,
        Operation::GetOrCreate,
        Operation::UpdateOrCreate,
        Operation::Delete,
        Operation::Update,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::BulkCreate => "bulk_create",
            Operation::GetOrCreate => "get_or_create",
            Operation::UpdateOrCreate => "update_or_create",
            Operation::Delete => "delete",
            Operation::Update => "update",
        }
    }

    /// Position in `Operation::ALL`
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arguments of one in-flight bulk call.
///
/// Receivers get `&mut Call` in both phases; changes made in the pre-phase
/// are what the underlying operation executes with.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    BulkCreate { objs: Vec<Record>, batch_size: Option<usize> },
    GetOrCreate { defaults: Option<Values>, lookup: Values },
    UpdateOrCreate { defaults: Option<Values>, lookup: Values },
    Delete,
    Update { values: Values },
}

impl Call {
    pub fn operation(&self) -> Operation {
        match self {
            Call::BulkCreate { .. } => Operation::BulkCreate,
            Call::GetOrCreate { .. } => Operation::GetOrCreate,
            Call::UpdateOrCreate { .. } => Operation::UpdateOrCreate,
            Call::Delete => Operation::Delete,
            Call::Update { .. } => Operation::Update,
        }
    }

    pub fn get_or_create(defaults: Option<Value>, lookup: Value) -> Result<Self, RecordError> {
        Ok(Call::GetOrCreate {
            defaults: defaults.map(values_from_json).transpose()?,
            lookup: values_from_json(lookup)?,
        })
    }

    pub fn update_or_create(defaults: Option<Value>, lookup: Value) -> Result<Self, RecordError> {
        Ok(Call::UpdateOrCreate {
            defaults: defaults.map(values_from_json).transpose()?,
            lookup: values_from_json(lookup)?,
        })
    }

    pub fn update(values: Value) -> Result<Self, RecordError> {
        Ok(Call::Update { values: values_from_json(values)? })
    }
}

/// Rows removed by a delete, overall and per model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSummary {
    pub total: usize,
    pub per_model: BTreeMap<String, usize>,
}

/// Result of a bulk call, handed to post-phase receivers
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    BulkCreated(Vec<Record>),
    GetOrCreated { record: Record, created: bool },
    UpdateOrCreated { record: Record, created: bool },
    Deleted(DeleteSummary),
    Updated(usize),
}

impl Outcome {
    pub fn operation(&self) -> Operation {
        match self {
            Outcome::BulkCreated(_) => Operation::BulkCreate,
            Outcome::GetOrCreated { .. } => Operation::GetOrCreate,
            Outcome::UpdateOrCreated { .. } => Operation::UpdateOrCreate,
            Outcome::Deleted(_) => Operation::Delete,
            Outcome::Updated(_) => Operation::Update,
        }
    }

    /// Rows inserted, matched or touched by the call
    pub fn affected(&self) -> usize {
        match self {
            Outcome::BulkCreated(records) => records.len(),
            Outcome::GetOrCreated { .. } | Outcome::UpdateOrCreated { .. } => 1,
            Outcome::Deleted(summary) => summary.total,
            Outcome::Updated(count) => *count,
        }
    }

    pub(crate) fn into_created(self) -> QueryResult<Vec<Record>> {
        match self {
            Outcome::BulkCreated(records) => Ok(records),
            other => Err(mismatch(Operation::BulkCreate, &other)),
        }
    }

    pub(crate) fn into_fetched(self, operation: Operation) -> QueryResult<(Record, bool)> {
        match (operation, self) {
            (Operation::GetOrCreate, Outcome::GetOrCreated { record, created })
            | (Operation::UpdateOrCreate, Outcome::UpdateOrCreated { record, created }) => Ok((record, created)),
            (operation, other) => Err(mismatch(operation, &other)),
        }
    }

    pub(crate) fn into_deleted(self) -> QueryResult<DeleteSummary> {
        match self {
            Outcome::Deleted(summary) => Ok(summary),
            other => Err(mismatch(Operation::Delete, &other)),
        }
    }

    pub(crate) fn into_updated(self) -> QueryResult<usize> {
        match self {
            Outcome::Updated(count) => Ok(count),
            other => Err(mismatch(Operation::Update, &other)),
        }
    }
}

fn mismatch(operation: Operation, found: &Outcome) -> crate::error::QueryError {
    DatabaseError::OperationMismatch { operation, found: found.operation() }.into()
}
