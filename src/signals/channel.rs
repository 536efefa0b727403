// Named notification channel with an ordered, sender-filterable receiver list

use std::any::TypeId;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use uuid::Uuid;

use crate::config::config;
use crate::database::{Model, Operation, Sender};
use crate::signals::error::ObserverError;
use crate::signals::signal::{Phase, Signal};

/// A connected callable. Shared so one function can sit on several channels.
pub type Receiver = Arc<dyn Fn(&mut Signal<'_>) -> Result<(), ObserverError> + Send + Sync>;

/// Handle returned by `connect`, used to disconnect later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReceiverId(Uuid);

impl ReceiverId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ReceiverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone)]
struct Connection {
    id: ReceiverId,
    sender: Option<TypeId>,
    receiver: Receiver,
}

impl Connection {
    fn accepts(&self, sender: &Sender) -> bool {
        self.sender.map_or(true, |type_id| type_id == sender.type_id())
    }
}

pub struct Channel {
    phase: Phase,
    operation: Operation,
    connections: RwLock<Vec<Connection>>,
}

impl Channel {
    pub fn new(phase: Phase, operation: Operation) -> Self {
        Self {
            phase,
            operation,
            connections: RwLock::new(Vec::new()),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// e.g. `post_update_or_create`
    pub fn name(&self) -> String {
        format!("{}_{}", self.phase, self.operation)
    }

    /// Receive signals for every model
    pub fn connect<F>(&self, receiver: F) -> ReceiverId
    where
        F: Fn(&mut Signal<'_>) -> Result<(), ObserverError> + Send + Sync + 'static,
    {
        self.connect_receiver(None, Arc::new(receiver))
    }

    /// Receive signals only when `M` is the sender
    pub fn connect_for<M, F>(&self, receiver: F) -> ReceiverId
    where
        M: Model,
        F: Fn(&mut Signal<'_>) -> Result<(), ObserverError> + Send + Sync + 'static,
    {
        self.connect_receiver(Some(Sender::of::<M>()), Arc::new(receiver))
    }

    pub fn connect_receiver(&self, sender: Option<Sender>, receiver: Receiver) -> ReceiverId {
        let id = ReceiverId::new();
        let connection = Connection {
            id,
            sender: sender.map(|s| s.type_id()),
            receiver,
        };

        let mut connections = self.connections.write().unwrap_or_else(PoisonError::into_inner);
        connections.push(connection);
        tracing::debug!(
            "Connected receiver {} to {} (sender: {})",
            id,
            self.name(),
            sender.map_or("any", |s| s.name())
        );
        id
    }

    /// Returns whether `id` was connected
    pub fn disconnect(&self, id: ReceiverId) -> bool {
        let mut connections = self.connections.write().unwrap_or_else(PoisonError::into_inner);
        let before = connections.len();
        connections.retain(|c| c.id != id);
        let removed = connections.len() != before;
        if removed {
            tracing::debug!("Disconnected receiver {} from {}", id, self.name());
        }
        removed
    }

    pub fn receiver_count(&self) -> usize {
        self.connections.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn has_listeners(&self) -> bool {
        self.receiver_count() > 0
    }

    /// Whether anything would receive a signal sent for `sender`
    pub fn has_listeners_for(&self, sender: &Sender) -> bool {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|c| c.accepts(sender))
    }

    /// Deliver to receivers in connection order. The first failure stops
    /// delivery and is returned.
    pub fn send(&self, signal: &mut Signal<'_>) -> Result<(), ObserverError> {
        let receivers = self.snapshot(&signal.sender);
        if receivers.is_empty() {
            tracing::trace!("No receivers on {} for {}", self.name(), signal.sender);
            return Ok(());
        }

        let verbose = config().logging.log_receivers;
        for connection in receivers {
            if verbose {
                tracing::debug!("{} -> receiver {} (sender: {})", self.name(), connection.id, signal.sender);
            }
            if let Err(err) = (connection.receiver)(signal) {
                tracing::warn!("Receiver {} on {} failed: {}", connection.id, self.name(), err);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Deliver to every receiver regardless of failures and report each result
    pub fn send_robust(&self, signal: &mut Signal<'_>) -> Vec<(ReceiverId, Result<(), ObserverError>)> {
        self.snapshot(&signal.sender)
            .into_iter()
            .map(|connection| {
                let result = (connection.receiver)(signal);
                if let Err(err) = &result {
                    tracing::warn!("Receiver {} on {} failed: {}", connection.id, self.name(), err);
                }
                (connection.id, result)
            })
            .collect()
    }

    // Copied out so receivers may connect/disconnect while being called
    fn snapshot(&self, sender: &Sender) -> Vec<Connection> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.accepts(sender))
            .cloned()
            .collect()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name())
            .field("receivers", &self.receiver_count())
            .finish()
    }
}
