use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::database::error::DatabaseError;
use crate::database::model::{Model, Sender};
use crate::database::queryset::{BulkOperations, QuerySet};
use crate::database::record::Values;

/// Rows of one model, ordered by primary key
#[derive(Debug, Default)]
pub(crate) struct Table {
    pub(crate) rows: BTreeMap<i64, Values>,
    next_id: i64,
}

impl Table {
    pub(crate) fn allocate_id(&mut self, model: &str) -> Result<i64, DatabaseError> {
        let id = self.next_id.checked_add(1).ok_or_else(|| sequence_exhausted(model))?;
        self.next_id = id;
        Ok(id)
    }

    /// Keys for a batch of new rows, in order. Explicit keys are kept and move
    /// the sequence past them. On error the sequence is left as it was.
    pub(crate) fn assign_ids(&mut self, model: &str, requested: &[Option<i64>]) -> Result<Vec<i64>, DatabaseError> {
        let mut next_id = self.next_id;
        let mut ids = Vec::with_capacity(requested.len());
        for pk in requested {
            let id = match *pk {
                Some(pk) => {
                    next_id = next_id.max(pk);
                    pk
                }
                None => {
                    next_id = next_id.checked_add(1).ok_or_else(|| sequence_exhausted(model))?;
                    next_id
                }
            };
            ids.push(id);
        }
        self.next_id = next_id;
        Ok(ids)
    }

    /// Keep the sequence ahead of explicitly assigned keys
    pub(crate) fn observe_id(&mut self, id: i64) {
        self.next_id = self.next_id.max(id);
    }
}

fn sequence_exhausted(model: &str) -> DatabaseError {
    DatabaseError::Integrity(format!("{} primary key sequence is exhausted", model))
}

#[derive(Debug, Default)]
pub(crate) struct Store {
    tables: HashMap<TypeId, Table>,
}

impl Store {
    pub(crate) fn table(&self, sender: &Sender) -> Option<&Table> {
        self.tables.get(&sender.type_id())
    }

    pub(crate) fn table_mut(&mut self, sender: &Sender) -> &mut Table {
        self.tables.entry(sender.type_id()).or_default()
    }
}

/// In-memory record store shared by every queryset created from it.
///
/// Cloning is cheap and yields a handle onto the same tables.
#[derive(Debug, Clone, Default)]
pub struct Database {
    store: Arc<RwLock<Store>>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry point for a model's collection, built as the type the model declares
    pub fn objects<M: Model>(&self) -> M::QuerySet {
        M::QuerySet::from_queryset(QuerySet::new::<M>(self.clone()))
    }

    /// Row count for a model, bypassing any queryset
    pub fn count<M: Model>(&self) -> usize {
        self.read()
            .table(&Sender::of::<M>())
            .map_or(0, |table| table.rows.len())
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Store> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }
}
