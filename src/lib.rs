//! Pre/post signals around queryset bulk operations.
//!
//! `bulk_create`, `get_or_create`, `update_or_create`, `delete` and `update`
//! normally run without telling anyone. This crate sends a notification on a
//! named channel before and after each of them, either for every model at
//! once (`monkey_patch()`) or for models that declare
//! `type QuerySet = SignalQuerySet`.

pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod intercept;
pub mod logging;
pub mod signals;

#[cfg(test)]
pub mod testing;

pub use config::{config, SignalsConfig};
pub use database::{
    BulkOperations, Call, Database, DatabaseError, DeleteSummary, Model, Operation, Outcome, QuerySet, Record,
    Sender,
};
pub use error::{QueryError, QueryResult};
pub use intercept::{monkey_patch, unpatch, SignalQuerySet};
pub use signals::{Channel, ObserverError, Phase, ReceiverId, Signal};

pub mod prelude {
    pub use crate::database::{BulkOperations, Call, Database, Model, Outcome, QuerySet, Record};
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::intercept::{monkey_patch, unpatch, SignalQuerySet};
    pub use crate::signals::{self, ObserverError, Phase, Signal};
}

/// App-ready hook: load `.env`, build the config, create the channels and
/// install the global patch when configured to.
pub fn init() -> &'static SignalsConfig {
    let _ = dotenvy::dotenv();

    let config = config::config();
    let channels = signals::channels().len();

    if config.patch.auto_install {
        monkey_patch();
    }

    if crate::is_production!() {
        tracing::info!(
            "queryset signals ready ({} channels, global patch: {})",
            channels,
            config.patch.auto_install
        );
    } else {
        tracing::debug!("queryset signals ready: {:?}", config);
    }

    config
}
