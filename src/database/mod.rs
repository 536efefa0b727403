// In-memory record store whose bulk operations the signals wrap

pub mod error;
pub mod model;
pub mod native;
pub mod operation;
pub mod queryset;
pub mod record;
pub mod store;

pub use error::DatabaseError;
pub use model::{Model, Sender};
pub use operation::{Call, DeleteSummary, Operation, Outcome};
pub use queryset::{BulkOperations, QuerySet};
pub use record::{values_from_json, Record, RecordError, Values};
pub use store::Database;
