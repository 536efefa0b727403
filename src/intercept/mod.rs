// The two ways bulk operations get signals: the global patch and the opt-in type

pub mod derived;
pub mod interceptor;
pub mod patch;

pub use derived::SignalQuerySet;
pub use interceptor::CallState;
pub use patch::{
    is_patched, monkey_patch, monkey_patch_operation, patched_operations, unpatch, unpatch_operation, Method,
};
