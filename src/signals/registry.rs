// Process-wide channels, one per (phase, operation)

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::database::{Operation, Sender};
use crate::signals::channel::{Channel, Receiver, ReceiverId};
use crate::signals::error::ObserverError;
use crate::signals::signal::{Phase, Signal};

static CHANNELS: Lazy<Vec<Channel>> = Lazy::new(|| {
    let channels: Vec<Channel> = Phase::ALL
        .into_iter()
        .flat_map(|phase| Operation::ALL.into_iter().map(move |op| Channel::new(phase, op)))
        .collect();
    tracing::debug!("Initialized {} queryset signal channels", channels.len());
    channels
});

/// The channel both interception modes send on for `phase` of `operation`
pub fn channel(phase: Phase, operation: Operation) -> &'static Channel {
    let offset = match phase {
        Phase::Pre => 0,
        Phase::Post => Operation::ALL.len(),
    };
    &CHANNELS[offset + operation.index()]
}

pub fn channels() -> &'static [Channel] {
    &CHANNELS
}

/// Connect one callable to several channels, optionally for a single sender
pub fn receiver<F>(channels: &[&Channel], sender: Option<Sender>, f: F) -> Vec<ReceiverId>
where
    F: Fn(&mut Signal<'_>) -> Result<(), ObserverError> + Send + Sync + 'static,
{
    let shared: Receiver = Arc::new(f);
    channels
        .iter()
        .map(|channel| channel.connect_receiver(sender, shared.clone()))
        .collect()
}

pub fn pre_bulk_create() -> &'static Channel {
    channel(Phase::Pre, Operation::BulkCreate)
}

pub fn post_bulk_create() -> &'static Channel {
    channel(Phase::Post, Operation::BulkCreate)
}

pub fn pre_get_or_create() -> &'static Channel {
    channel(Phase::Pre, Operation::GetOrCreate)
}

pub fn post_get_or_create() -> &'static Channel {
    channel(Phase::Post, Operation::GetOrCreate)
}

pub fn pre_update_or_create() -> &'static Channel {
    channel(Phase::Pre, Operation::UpdateOrCreate)
}

pub fn post_update_or_create() -> &'static Channel {
    channel(Phase::Post, Operation::UpdateOrCreate)
}

pub fn pre_delete() -> &'static Channel {
    channel(Phase::Pre, Operation::Delete)
}

pub fn post_delete() -> &'static Channel {
    channel(Phase::Post, Operation::Delete)
}

pub fn pre_update() -> &'static Channel {
    channel(Phase::Pre, Operation::Update)
}

pub fn post_update() -> &'static Channel {
    channel(Phase::Post, Operation::Update)
}
