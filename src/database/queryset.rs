use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::database::error::DatabaseError;
use crate::database::model::{Model, Sender};
use crate::database::operation::{Call, DeleteSummary, Operation, Outcome};
use crate::database::record::Record;
use crate::database::store::{Database, Table};
use crate::error::QueryResult;
use crate::filter::{Filter, FilterData};
use crate::intercept::patch;

/// Lazy, filterable handle on a model's rows.
///
/// The five bulk operations go through the process-wide method table, so
/// they are intercepted whenever `monkey_patch()` is in effect.
pub struct QuerySet {
    db: Database,
    sender: Sender,
    filter: Filter,

    // Attribute bag observers use to carry data from pre to post
    extras: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl QuerySet {
    pub fn new<M: Model>(db: Database) -> Self {
        Self {
            db,
            sender: Sender::of::<M>(),
            filter: Filter::new(),
            extras: HashMap::new(),
        }
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn filter_state(&self) -> &Filter {
        &self.filter
    }

    pub fn filter_data(&self) -> FilterData {
        self.filter.data()
    }

    // === In-place retargeting ===

    /// AND `conditions` onto the current filter
    pub fn narrow(&mut self, conditions: Value) -> QueryResult<&mut Self> {
        self.filter.narrow(conditions).map_err(DatabaseError::from)?;
        Ok(self)
    }

    /// Replace the filter's WHERE clause (`None` selects every row)
    pub fn set_where(&mut self, conditions: Option<Value>) -> QueryResult<&mut Self> {
        self.filter.set_where(conditions).map_err(DatabaseError::from)?;
        Ok(self)
    }

    /// Make the queryset match nothing
    pub fn set_none(&mut self) -> &mut Self {
        self.filter.set_empty(true);
        self
    }

    pub fn set_slice(&mut self, offset: usize, limit: Option<usize>) -> QueryResult<&mut Self> {
        self.filter.slice(offset, limit).map_err(DatabaseError::from)?;
        Ok(self)
    }

    // === Reads ===

    pub fn fetch(&self) -> QueryResult<Vec<Record>> {
        let store = self.db.read();
        let Some(table) = store.table(&self.sender) else {
            return Ok(Vec::new());
        };
        Ok(self
            .matching_ids(table)
            .into_iter()
            .filter_map(|id| table.rows.get(&id).cloned().map(Record::from_row))
            .collect())
    }

    pub fn count(&self) -> QueryResult<usize> {
        let store = self.db.read();
        Ok(store.table(&self.sender).map_or(0, |table| self.matching_ids(table).len()))
    }

    pub fn exists(&self) -> QueryResult<bool> {
        Ok(self.count()? > 0)
    }

    pub fn pks(&self) -> QueryResult<Vec<i64>> {
        let store = self.db.read();
        Ok(store.table(&self.sender).map_or_else(Vec::new, |table| self.matching_ids(table)))
    }

    /// Exactly one row matching `lookup` within this queryset
    pub fn get(&self, lookup: Value) -> QueryResult<Record> {
        let mut narrowed = self.clone();
        narrowed.narrow(lookup)?;
        let mut rows = narrowed.fetch()?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            0 => Err(DatabaseError::DoesNotExist { model: self.sender.name() }.into()),
            count => Err(DatabaseError::MultipleObjectsReturned { model: self.sender.name(), count }.into()),
        }
    }

    /// Primary keys of matching rows, in key order, after slicing
    pub(crate) fn matching_ids(&self, table: &Table) -> Vec<i64> {
        let ids: Vec<i64> = table
            .rows
            .iter()
            .filter(|(_, row)| self.filter.matches(row))
            .map(|(id, _)| *id)
            .collect();
        self.filter.apply_slice(ids)
    }

    // === Extras ===

    pub fn set_extra<T: Any + Send + Sync>(&mut self, value: T) {
        self.extras.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn extra<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.extras.get(&TypeId::of::<T>()).and_then(|boxed| boxed.downcast_ref::<T>())
    }

    pub fn extra_mut<T: Any + Send + Sync>(&mut self) -> Option<&mut T> {
        self.extras.get_mut(&TypeId::of::<T>()).and_then(|boxed| boxed.downcast_mut::<T>())
    }

    pub fn take_extra<T: Any + Send + Sync>(&mut self) -> Option<T> {
        self.extras
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    pub fn has_extra<T: Any + Send + Sync>(&self) -> bool {
        self.extras.contains_key(&TypeId::of::<T>())
    }

    // === Bulk operations ===

    pub fn bulk_create(&mut self, objs: Vec<Record>, batch_size: Option<usize>) -> QueryResult<Vec<Record>> {
        self.dispatch(Call::BulkCreate { objs, batch_size })?.into_created()
    }

    pub fn get_or_create(&mut self, defaults: Option<Value>, lookup: Value) -> QueryResult<(Record, bool)> {
        self.dispatch(Call::get_or_create(defaults, lookup)?)?.into_fetched(Operation::GetOrCreate)
    }

    pub fn update_or_create(&mut self, defaults: Option<Value>, lookup: Value) -> QueryResult<(Record, bool)> {
        self.dispatch(Call::update_or_create(defaults, lookup)?)?.into_fetched(Operation::UpdateOrCreate)
    }

    pub fn delete(&mut self) -> QueryResult<DeleteSummary> {
        self.dispatch(Call::Delete)?.into_deleted()
    }

    pub fn update(&mut self, values: Value) -> QueryResult<usize> {
        self.dispatch(Call::update(values)?)?.into_updated()
    }

    /// Run `call` through whatever implementation is currently live
    pub fn dispatch(&mut self, call: Call) -> QueryResult<Outcome> {
        let method = patch::live(call.operation());
        method(self, call)
    }

    /// Run `call` through the pre-patch implementation, without signals
    pub fn raw(&mut self, call: Call) -> QueryResult<Outcome> {
        let method = patch::original(call.operation());
        method(self, call)
    }

    pub fn raw_update(&mut self, values: Value) -> QueryResult<usize> {
        self.raw(Call::update(values)?)?.into_updated()
    }

    pub fn raw_delete(&mut self) -> QueryResult<DeleteSummary> {
        self.raw(Call::Delete)?.into_deleted()
    }
}

// Extras are per-call scratch space and are not carried over to clones
impl Clone for QuerySet {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            sender: self.sender,
            filter: self.filter.clone(),
            extras: HashMap::new(),
        }
    }
}

impl fmt::Debug for QuerySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySet")
            .field("model", &self.sender.name())
            .field("filter", &self.filter.data())
            .field("extras", &self.extras.len())
            .finish()
    }
}

/// The bulk operations a model's collection type exposes.
///
/// Implemented by `QuerySet` (globally interceptable) and by
/// `SignalQuerySet` (always signals). Builders and reads are provided.
pub trait BulkOperations: Sized {
    fn from_queryset(queryset: QuerySet) -> Self;
    fn queryset(&self) -> &QuerySet;
    fn queryset_mut(&mut self) -> &mut QuerySet;
    fn into_queryset(self) -> QuerySet;

    fn bulk_create(&mut self, objs: Vec<Record>, batch_size: Option<usize>) -> QueryResult<Vec<Record>>;
    fn get_or_create(&mut self, defaults: Option<Value>, lookup: Value) -> QueryResult<(Record, bool)>;
    fn update_or_create(&mut self, defaults: Option<Value>, lookup: Value) -> QueryResult<(Record, bool)>;
    fn delete(&mut self) -> QueryResult<DeleteSummary>;
    fn update(&mut self, values: Value) -> QueryResult<usize>;

    fn all(self) -> Self {
        self
    }

    fn filter(self, conditions: Value) -> QueryResult<Self> {
        let mut qs = self.into_queryset();
        qs.narrow(conditions)?;
        Ok(Self::from_queryset(qs))
    }

    fn exclude(self, conditions: Value) -> QueryResult<Self> {
        let mut qs = self.into_queryset();
        qs.filter.exclude(conditions).map_err(DatabaseError::from)?;
        Ok(Self::from_queryset(qs))
    }

    fn none(self) -> Self {
        let mut qs = self.into_queryset();
        qs.set_none();
        Self::from_queryset(qs)
    }

    fn slice(self, offset: usize, limit: Option<usize>) -> QueryResult<Self> {
        let mut qs = self.into_queryset();
        qs.set_slice(offset, limit)?;
        Ok(Self::from_queryset(qs))
    }

    fn fetch(&self) -> QueryResult<Vec<Record>> {
        self.queryset().fetch()
    }

    fn count(&self) -> QueryResult<usize> {
        self.queryset().count()
    }

    fn exists(&self) -> QueryResult<bool> {
        self.queryset().exists()
    }

    fn get(&self, lookup: Value) -> QueryResult<Record> {
        self.queryset().get(lookup)
    }
}

impl BulkOperations for QuerySet {
    fn from_queryset(queryset: QuerySet) -> Self {
        queryset
    }

    fn queryset(&self) -> &QuerySet {
        self
    }

    fn queryset_mut(&mut self) -> &mut QuerySet {
        self
    }

    fn into_queryset(self) -> QuerySet {
        self
    }

    fn bulk_create(&mut self, objs: Vec<Record>, batch_size: Option<usize>) -> QueryResult<Vec<Record>> {
        QuerySet::bulk_create(self, objs, batch_size)
    }

    fn get_or_create(&mut self, defaults: Option<Value>, lookup: Value) -> QueryResult<(Record, bool)> {
        QuerySet::get_or_create(self, defaults, lookup)
    }

    fn update_or_create(&mut self, defaults: Option<Value>, lookup: Value) -> QueryResult<(Record, bool)> {
        QuerySet::update_or_create(self, defaults, lookup)
    }

    fn delete(&mut self) -> QueryResult<DeleteSummary> {
        QuerySet::delete(self)
    }

    fn update(&mut self, values: Value) -> QueryResult<usize> {
        QuerySet::update(self, values)
    }
}
