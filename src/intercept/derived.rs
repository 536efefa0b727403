use std::fmt;

use serde_json::Value;

use crate::database::{BulkOperations, Call, DeleteSummary, Operation, Outcome, QuerySet, Record};
use crate::error::QueryResult;
use crate::intercept::interceptor::intercept;

/// Collection type that always sends bulk-operation signals.
///
/// A model opts in with `type QuerySet = SignalQuerySet;`. Nothing global is
/// touched: each operation is wrapped here and then handed to the ordinary
/// `QuerySet` dispatch. If `monkey_patch()` is also in effect that dispatch
/// is itself intercepted, so receivers are notified twice per call.
#[derive(Clone)]
pub struct SignalQuerySet {
    inner: QuerySet,
}

impl SignalQuerySet {
    pub fn new(queryset: QuerySet) -> Self {
        Self { inner: queryset }
    }

    pub fn inner(&self) -> &QuerySet {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut QuerySet {
        &mut self.inner
    }

    pub fn into_inner(self) -> QuerySet {
        self.inner
    }

    pub fn bulk_create(&mut self, objs: Vec<Record>, batch_size: Option<usize>) -> QueryResult<Vec<Record>> {
        self.run(Call::BulkCreate { objs, batch_size })?.into_created()
    }

    pub fn get_or_create(&mut self, defaults: Option<Value>, lookup: Value) -> QueryResult<(Record, bool)> {
        self.run(Call::get_or_create(defaults, lookup)?)?
            .into_fetched(Operation::GetOrCreate)
    }

    pub fn update_or_create(&mut self, defaults: Option<Value>, lookup: Value) -> QueryResult<(Record, bool)> {
        self.run(Call::update_or_create(defaults, lookup)?)?
            .into_fetched(Operation::UpdateOrCreate)
    }

    pub fn delete(&mut self) -> QueryResult<DeleteSummary> {
        self.run(Call::Delete)?.into_deleted()
    }

    pub fn update(&mut self, values: Value) -> QueryResult<usize> {
        self.run(Call::update(values)?)?.into_updated()
    }

    fn run(&mut self, call: Call) -> QueryResult<Outcome> {
        intercept(&mut self.inner, call, |qs, call| qs.dispatch(call))
    }
}

impl fmt::Debug for SignalQuerySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SignalQuerySet").field(&self.inner).finish()
    }
}

impl BulkOperations for SignalQuerySet {
    fn from_queryset(queryset: QuerySet) -> Self {
        Self::new(queryset)
    }

    fn queryset(&self) -> &QuerySet {
        &self.inner
    }

    fn queryset_mut(&mut self) -> &mut QuerySet {
        &mut self.inner
    }

    fn into_queryset(self) -> QuerySet {
        self.inner
    }

    fn bulk_create(&mut self, objs: Vec<Record>, batch_size: Option<usize>) -> QueryResult<Vec<Record>> {
        SignalQuerySet::bulk_create(self, objs, batch_size)
    }

    fn get_or_create(&mut self, defaults: Option<Value>, lookup: Value) -> QueryResult<(Record, bool)> {
        SignalQuerySet::get_or_create(self, defaults, lookup)
    }

    fn update_or_create(&mut self, defaults: Option<Value>, lookup: Value) -> QueryResult<(Record, bool)> {
        SignalQuerySet::update_or_create(self, defaults, lookup)
    }

    fn delete(&mut self) -> QueryResult<DeleteSummary> {
        SignalQuerySet::delete(self)
    }

    fn update(&mut self, values: Value) -> QueryResult<usize> {
        SignalQuerySet::update(self, values)
    }
}
