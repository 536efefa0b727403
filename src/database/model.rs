use std::any::TypeId;
use std::fmt;

use crate::database::queryset::BulkOperations;

/// A model type whose rows live in a `Database` table.
///
/// `QuerySet` selects the collection type `Database::objects` hands out:
/// `crate::database::QuerySet` for plain models, or
/// `crate::intercept::SignalQuerySet` to opt into per-model signals
/// without the global patch.
pub trait Model: 'static {
    /// Table name, also used in logs and delete summaries
    const NAME: &'static str;

    /// Declared fields, excluding the implicit `id`
    const FIELDS: &'static [&'static str];

    type QuerySet: BulkOperations;
}

/// Identity of the model a signal was sent for
#[derive(Clone, Copy)]
pub struct Sender {
    type_id: TypeId,
    name: &'static str,
    fields: &'static [&'static str],
}

impl Sender {
    pub fn of<M: Model>() -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            name: M::NAME,
            fields: M::FIELDS,
        }
    }

    pub fn is<M: Model>(&self) -> bool {
        self.type_id == TypeId::of::<M>()
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &'static [&'static str] {
        self.fields
    }

    pub fn has_field(&self, field: &str) -> bool {
        field == "id" || field == "pk" || self.fields.contains(&field)
    }
}

impl PartialEq for Sender {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for Sender {}

impl fmt::Debug for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Sender").field(&self.name).finish()
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
