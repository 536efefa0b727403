// Pre/post notification channels for queryset bulk operations

pub mod channel;
pub mod error;
pub mod registry;
pub mod signal;

pub use channel::{Channel, Receiver, ReceiverId};
pub use error::ObserverError;
pub use registry::{
    channel, channels, post_bulk_create, post_delete, post_get_or_create, post_update,
    post_update_or_create, pre_bulk_create, pre_delete, pre_get_or_create, pre_update,
    pre_update_or_create, receiver,
};
pub use signal::{Phase, Signal};
