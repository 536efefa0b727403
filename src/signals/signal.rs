use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::{Call, Operation, Outcome, QuerySet, Sender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Pre,
    Post,
}

impl Phase {
    pub const ALL: [Phase; 2] = [Phase::Pre, Phase::Post];

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Pre => "pre",
            Phase::Post => "post",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a receiver is handed for one notification.
///
/// `queryset` and `call` are the live values of the in-flight operation, not
/// copies. Whatever a pre-phase receiver leaves in them is what executes:
/// narrowing the queryset retargets the write, `set_none()` neutralizes it,
/// editing `call` changes its arguments. Post-phase receivers see the same
/// queryset (including any extras stashed on it) plus the `outcome`.
#[derive(Debug)]
pub struct Signal<'a> {
    pub phase: Phase,
    pub sender: Sender,
    pub queryset: &'a mut QuerySet,
    pub call: &'a mut Call,
    pub outcome: Option<&'a Outcome>,
    pub sent_at: DateTime<Utc>,
}

impl<'a> Signal<'a> {
    pub fn pre(queryset: &'a mut QuerySet, call: &'a mut Call) -> Self {
        Self {
            phase: Phase::Pre,
            sender: queryset.sender(),
            queryset,
            call,
            outcome: None,
            sent_at: Utc::now(),
        }
    }

    pub fn post(queryset: &'a mut QuerySet, call: &'a mut Call, outcome: &'a Outcome) -> Self {
        Self {
            phase: Phase::Post,
            sender: queryset.sender(),
            queryset,
            call,
            outcome: Some(outcome),
            sent_at: Utc::now(),
        }
    }

    pub fn operation(&self) -> Operation {
        self.call.operation()
    }

    /// Channel-style name, e.g. `pre_bulk_create`
    pub fn name(&self) -> String {
        format!("{}_{}", self.phase, self.operation())
    }
}
