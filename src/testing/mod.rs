// Shared fixtures for unit tests

use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use crate::database::{Model, QuerySet};
use crate::intercept::SignalQuerySet;

pub struct User;

impl Model for User {
    const NAME: &'static str = "user";
    const FIELDS: &'static [&'static str] = &["username", "first_name", "last_name", "email"];
    type QuerySet = QuerySet;
}

/// Same shape as `User`, opted into signals through its collection type
pub struct SignalUser;

impl Model for SignalUser {
    const NAME: &'static str = "signal_user";
    const FIELDS: &'static [&'static str] = &["username", "first_name", "last_name", "email"];
    type QuerySet = SignalQuerySet;
}

pub struct Question;

impl Model for Question {
    const NAME: &'static str = "question";
    const FIELDS: &'static [&'static str] = &["votes"];
    type QuerySet = QuerySet;
}

/// Channels and the method table are process-wide; tests that depend on
/// either hold this for their whole body.
pub fn serial() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}
