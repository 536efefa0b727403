//! The store's own implementations of the five bulk operations.
//!
//! These are what the method table holds before any patching and what
//! `raw()` falls back to. None of them send signals.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::config::config;
use crate::database::error::DatabaseError;
use crate::database::model::Sender;
use crate::database::operation::{Call, DeleteSummary, Operation, Outcome};
use crate::database::queryset::QuerySet;
use crate::database::record::{Record, RecordError, Values};
use crate::database::store::Table;
use crate::error::QueryResult;
use crate::intercept::patch::Method;

pub(crate) fn method(operation: Operation) -> Method {
    match operation {
        Operation::BulkCreate => bulk_create,
        Operation::GetOrCreate => get_or_create,
        Operation::UpdateOrCreate => update_or_create,
        Operation::Delete => delete,
        Operation::Update => update,
    }
}

pub(crate) fn bulk_create(qs: &mut QuerySet, call: Call) -> QueryResult<Outcome> {
    let (objs, batch_size) = match call {
        Call::BulkCreate { objs, batch_size } => (objs, batch_size),
        other => return Err(wrong_call(Operation::BulkCreate, &other)),
    };

    let batch_size = match batch_size.or(config().database.default_batch_size) {
        Some(0) => return Err(DatabaseError::InvalidBatchSize(0).into()),
        Some(n) => n,
        None => objs.len().max(1),
    };

    let sender = qs.sender();
    for obj in &objs {
        validate_fields(&sender, obj.fields())?;
    }

    let mut store = qs.database().write();
    let table = store.table_mut(&sender);

    let mut explicit = HashSet::new();
    for pk in objs.iter().filter_map(Record::pk) {
        if table.rows.contains_key(&pk) || !explicit.insert(pk) {
            return Err(duplicate_key(&sender, pk));
        }
    }

    // Every key is settled before the first row goes in
    let requested: Vec<Option<i64>> = objs.iter().map(Record::pk).collect();
    let ids = table.assign_ids(sender.name(), &requested)?;

    let mut created = Vec::with_capacity(objs.len());
    let mut batches = 0;
    for (batch, batch_ids) in objs.chunks(batch_size).zip(ids.chunks(batch_size)) {
        batches += 1;
        for (obj, pk) in batch.iter().zip(batch_ids) {
            let mut record = obj.clone();
            record.set_pk(*pk);
            table.rows.insert(*pk, record.fields().clone());
            created.push(record);
        }
    }

    tracing::debug!(
        "bulk_create inserted {} {} rows in {} batches",
        created.len(), sender, batches
    );

    Ok(Outcome::BulkCreated(created))
}

pub(crate) fn get_or_create(qs: &mut QuerySet, call: Call) -> QueryResult<Outcome> {
    let (defaults, lookup) = match call {
        Call::GetOrCreate { defaults, lookup } => (defaults, lookup),
        other => return Err(wrong_call(Operation::GetOrCreate, &other)),
    };
    let (record, created) = fetch_or_insert(qs, defaults, lookup, false)?;
    Ok(Outcome::GetOrCreated { record, created })
}

pub(crate) fn update_or_create(qs: &mut QuerySet, call: Call) -> QueryResult<Outcome> {
    let (defaults, lookup) = match call {
        Call::UpdateOrCreate { defaults, lookup } => (defaults, lookup),
        other => return Err(wrong_call(Operation::UpdateOrCreate, &other)),
    };
    let (record, created) = fetch_or_insert(qs, defaults, lookup, true)?;
    Ok(Outcome::UpdateOrCreated { record, created })
}

pub(crate) fn delete(qs: &mut QuerySet, call: Call) -> QueryResult<Outcome> {
    if !matches!(call, Call::Delete) {
        return Err(wrong_call(Operation::Delete, &call));
    }
    if qs.filter_state().is_sliced() {
        return Err(DatabaseError::SlicedQuery(Operation::Delete).into());
    }

    let sender = qs.sender();
    let mut store = qs.database().write();
    let table = store.table_mut(&sender);

    let ids = qs.matching_ids(table);
    let total = ids.into_iter().filter_map(|id| table.rows.remove(&id)).count();

    let mut per_model = BTreeMap::new();
    if total > 0 {
        per_model.insert(sender.name().to_string(), total);
    }

    tracing::debug!("delete removed {} {} rows", total, sender);

    Ok(Outcome::Deleted(DeleteSummary { total, per_model }))
}

pub(crate) fn update(qs: &mut QuerySet, call: Call) -> QueryResult<Outcome> {
    let values = match call {
        Call::Update { values } => values,
        other => return Err(wrong_call(Operation::Update, &other)),
    };
    if qs.filter_state().is_sliced() {
        return Err(DatabaseError::SlicedQuery(Operation::Update).into());
    }

    let sender = qs.sender();
    validate_assignments(&sender, &values)?;

    let mut store = qs.database().write();
    let table = store.table_mut(&sender);

    let ids = qs.matching_ids(table);
    let mut count = 0;
    for id in ids {
        if let Some(row) = table.rows.get_mut(&id) {
            row.extend(values.clone());
            count += 1;
        }
    }

    tracing::debug!("update touched {} {} rows", count, sender);

    Ok(Outcome::Updated(count))
}

/// Shared body of get_or_create / update_or_create.
///
/// Lookup and insert happen under one write lock so two callers cannot both
/// miss and both create.
fn fetch_or_insert(
    qs: &QuerySet,
    defaults: Option<Values>,
    lookup: Values,
    apply_defaults: bool,
) -> QueryResult<(Record, bool)> {
    let sender = qs.sender();
    validate_fields(&sender, &lookup)?;
    if let Some(ref defaults) = defaults {
        validate_assignments(&sender, defaults)?;
    }

    let mut scoped = qs.clone();
    scoped.narrow(Value::Object(lookup.clone()))?;

    let mut store = qs.database().write();
    let table = store.table_mut(&sender);
    let ids = scoped.matching_ids(table);

    match ids.as_slice() {
        [] => {
            let mut params = creation_params(lookup);
            params.extend(defaults.unwrap_or_default());
            let record = insert(table, &sender, params)?;
            tracing::debug!("created {} row {:?}", sender, record.pk());
            Ok((record, true))
        }
        [id] => {
            let row = table
                .rows
                .get_mut(id)
                .ok_or(DatabaseError::DoesNotExist { model: sender.name() })?;
            if apply_defaults {
                if let Some(defaults) = defaults {
                    row.extend(defaults);
                }
            }
            Ok((Record::from_row(row.clone()), false))
        }
        many => Err(DatabaseError::MultipleObjectsReturned { model: sender.name(), count: many.len() }.into()),
    }
}

/// Lookup entries usable as column values; operator expressions are dropped
fn creation_params(lookup: Values) -> Values {
    lookup
        .into_iter()
        .filter(|(_, value)| !is_operator_expression(value))
        .map(|(key, value)| if key == "pk" { ("id".to_string(), value) } else { (key, value) })
        .collect()
}

fn is_operator_expression(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.keys().any(|k| k.starts_with('$')))
}

fn insert(table: &mut Table, sender: &Sender, mut params: Values) -> QueryResult<Record> {
    let pk = match params.remove("id").and_then(|v| v.as_i64()) {
        Some(pk) if table.rows.contains_key(&pk) => return Err(duplicate_key(sender, pk)),
        Some(pk) => {
            table.observe_id(pk);
            pk
        }
        None => table.allocate_id(sender.name())?,
    };
    params.insert("id".to_string(), Value::from(pk));
    table.rows.insert(pk, params.clone());
    Ok(Record::from_row(params))
}

fn validate_fields(sender: &Sender, fields: &Values) -> Result<(), DatabaseError> {
    match fields.keys().find(|k| !sender.has_field(k)) {
        Some(field) => Err(DatabaseError::UnknownField { model: sender.name(), field: field.clone() }),
        None => Ok(()),
    }
}

/// Assigned values may not touch the primary key
fn validate_assignments(sender: &Sender, values: &Values) -> Result<(), DatabaseError> {
    if let Some(key) = values.keys().find(|k| *k == "id" || *k == "pk") {
        return Err(RecordError::SystemFieldNotAllowed(key.clone()).into());
    }
    validate_fields(sender, values)
}

fn duplicate_key(sender: &Sender, pk: i64) -> crate::error::QueryError {
    DatabaseError::Integrity(format!("duplicate key value {} for {}", pk, sender)).into()
}

fn wrong_call(operation: Operation, call: &Call) -> crate::error::QueryError {
    DatabaseError::OperationMismatch { operation, found: call.operation() }.into()
}
