#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use anyhow::Result;
use queryset_signals::prelude::*;
use queryset_signals::signals::{Channel, ReceiverId};

pub struct User;

impl Model for User {
    const NAME: &'static str = "user";
    const FIELDS: &'static [&'static str] = &["username", "first_name", "last_name", "email"];
    type QuerySet = QuerySet;
}

pub struct SignalUser;

impl Model for SignalUser {
    const NAME: &'static str = "signal_user";
    const FIELDS: &'static [&'static str] = &["username", "first_name", "last_name", "email"];
    type QuerySet = SignalQuerySet;
}

pub struct Question;

impl Model for Question {
    const NAME: &'static str = "question";
    const FIELDS: &'static [&'static str] = &["text", "votes"];
    type QuerySet = QuerySet;
}

static SERIAL: OnceLock<Mutex<()>> = OnceLock::new();

/// Channels and the patch are process-wide, so tests in one binary take turns
pub fn serial() -> MutexGuard<'static, ()> {
    SERIAL
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// How signals get switched on for a test run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `monkey_patch()` with a plain-`QuerySet` model
    Patched,
    /// No global patch; the model uses `SignalQuerySet`
    Derived,
}

/// Puts the global patch in the state `mode` needs and removes it on drop
pub struct ModeGuard;

impl ModeGuard {
    pub fn enter(mode: Mode) -> Self {
        match mode {
            Mode::Patched => monkey_patch(),
            Mode::Derived => unpatch(),
        }
        ModeGuard
    }
}

impl Drop for ModeGuard {
    fn drop(&mut self) {
        unpatch();
    }
}

/// Connections that are dropped with the guard
#[derive(Default)]
pub struct Receivers {
    connections: Vec<(&'static Channel, ReceiverId)>,
}

impl Receivers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_for<M, F>(&mut self, channel: &'static Channel, f: F) -> ReceiverId
    where
        M: Model,
        F: Fn(&mut Signal<'_>) -> Result<(), ObserverError> + Send + Sync + 'static,
    {
        let id = channel.connect_for::<M, _>(f);
        self.connections.push((channel, id));
        id
    }
}

impl Drop for Receivers {
    fn drop(&mut self) {
        for (channel, id) in self.connections.drain(..) {
            channel.disconnect(id);
        }
    }
}

/// One delivered signal, as a receiver saw it
#[derive(Debug, Clone, PartialEq)]
pub struct Seen {
    pub name: String,
    pub sender: &'static str,
    pub affected: Option<usize>,
}

/// Records every signal sent for one model on every channel
pub struct Recorder {
    seen: Arc<Mutex<Vec<Seen>>>,
    _receivers: Receivers,
}

impl Recorder {
    pub fn for_model<M: Model>() -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut receivers = Receivers::new();
        for channel in signals::channels() {
            let log = seen.clone();
            receivers.connect_for::<M, _>(channel, move |signal| {
                log.lock().unwrap().push(Seen {
                    name: signal.name(),
                    sender: signal.sender.name(),
                    affected: signal.outcome.map(Outcome::affected),
                });
                Ok(())
            });
        }
        Self { seen, _receivers: receivers }
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.seen().into_iter().map(|s| s.name).collect()
    }

    pub fn clear(&self) {
        self.seen.lock().unwrap().clear();
    }
}

pub fn record(username: &str) -> Record {
    Record::new().with("username", serde_json::json!(username))
}

/// Insert rows without signals and return the database
pub fn seed<M: Model>(usernames: &[&str]) -> Result<Database> {
    let db = Database::new();
    db.objects::<M>()
        .into_queryset()
        .raw(Call::BulkCreate {
            objs: usernames.iter().map(|u| record(u)).collect(),
            batch_size: None,
        })?;
    Ok(db)
}

pub fn usernames<M: Model>(db: &Database) -> Result<Vec<String>> {
    Ok(db
        .objects::<M>()
        .fetch()?
        .iter()
        .filter_map(|r| r.get_str("username").map(str::to_string))
        .collect())
}
