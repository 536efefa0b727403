//! Process-wide method table for the five bulk operations.
//!
//! Every `QuerySet` dispatches through this table. Patching an operation
//! preserves whatever implementation is live and installs the signalling
//! interceptor in its place; unpatching puts the preserved one back. Both
//! are idempotent.
//!
//! The lock is only held to read or swap entries, never while a method
//! runs, so receivers are free to patch and unpatch.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use once_cell::sync::Lazy;

use crate::database::native;
use crate::database::{Call, Operation, Outcome, QuerySet};
use crate::error::QueryResult;
use crate::intercept::interceptor;

/// Signature shared by native implementations and the interceptor
pub type Method = fn(&mut QuerySet, Call) -> QueryResult<Outcome>;

#[derive(Clone, Copy)]
struct Slot {
    live: Method,
    // Set only while patched
    preserved: Option<Method>,
}

static METHODS: Lazy<RwLock<[Slot; 5]>> = Lazy::new(|| {
    RwLock::new(Operation::ALL.map(|op| Slot {
        live: native::method(op),
        preserved: None,
    }))
});

fn read() -> RwLockReadGuard<'static, [Slot; 5]> {
    METHODS.read().unwrap_or_else(PoisonError::into_inner)
}

fn write() -> RwLockWriteGuard<'static, [Slot; 5]> {
    METHODS.write().unwrap_or_else(PoisonError::into_inner)
}

/// Intercept all five operations on every `QuerySet`
pub fn monkey_patch() {
    let changed = Operation::ALL.into_iter().filter(|op| monkey_patch_operation(*op)).count();
    if changed > 0 {
        tracing::info!("Queryset signals installed ({} operations patched)", changed);
    } else {
        tracing::debug!("Queryset signals already installed");
    }
}

/// Restore the implementations that were live before `monkey_patch`
pub fn unpatch() {
    let changed = Operation::ALL.into_iter().filter(|op| unpatch_operation(*op)).count();
    if changed > 0 {
        tracing::info!("Queryset signals removed ({} operations restored)", changed);
    } else {
        tracing::debug!("Queryset signals were not installed");
    }
}

/// Returns whether the table changed
pub fn monkey_patch_operation(operation: Operation) -> bool {
    let mut slots = write();
    let slot = &mut slots[operation.index()];
    if slot.preserved.is_some() {
        return false;
    }
    slot.preserved = Some(slot.live);
    slot.live = interceptor::intercepted;
    tracing::debug!("Patched {}", operation);
    true
}

/// Returns whether the table changed
pub fn unpatch_operation(operation: Operation) -> bool {
    let mut slots = write();
    let slot = &mut slots[operation.index()];
    let Some(preserved) = slot.preserved.take() else {
        return false;
    };
    slot.live = preserved;
    tracing::debug!("Unpatched {}", operation);
    true
}

pub fn is_patched(operation: Operation) -> bool {
    read()[operation.index()].preserved.is_some()
}

pub fn patched_operations() -> Vec<Operation> {
    let slots = read();
    Operation::ALL
        .into_iter()
        .filter(|op| slots[op.index()].preserved.is_some())
        .collect()
}

/// What `QuerySet::dispatch` currently runs
pub fn live(operation: Operation) -> Method {
    read()[operation.index()].live
}

/// The pre-patch implementation, or the live one when unpatched
pub fn original(operation: Operation) -> Method {
    let slot = read()[operation.index()];
    slot.preserved.unwrap_or(slot.live)
}

/// The store's own implementation, regardless of patch state
pub fn native(operation: Operation) -> Method {
    native::method(operation)
}

/// What the interceptor delegates to. Never the interceptor itself: if the
/// slot was unpatched mid-call the native implementation is used.
pub(crate) fn preserved_or_native(operation: Operation) -> Method {
    read()[operation.index()]
        .preserved
        .unwrap_or_else(|| native::method(operation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serial;

    fn addr(method: Method) -> usize {
        method as usize
    }

    #[test]
    fn patch_and_unpatch_are_idempotent() {
        let _guard = serial();
        unpatch();

        monkey_patch();
        let once: Vec<usize> = Operation::ALL.iter().map(|op| addr(live(*op))).collect();
        monkey_patch();
        let twice: Vec<usize> = Operation::ALL.iter().map(|op| addr(live(*op))).collect();
        assert_eq!(once, twice);
        assert_eq!(patched_operations(), Operation::ALL.to_vec());

        unpatch();
        unpatch();
        for op in Operation::ALL {
            assert!(!is_patched(op));
            assert_eq!(addr(live(op)), addr(native(op)));
        }
    }

    #[test]
    fn patching_preserves_the_original() {
        let _guard = serial();
        unpatch();

        assert!(monkey_patch_operation(Operation::Delete));
        assert!(!monkey_patch_operation(Operation::Delete));
        assert_eq!(addr(live(Operation::Delete)), addr(interceptor::intercepted));
        assert_eq!(addr(original(Operation::Delete)), addr(native(Operation::Delete)));
        assert_eq!(patched_operations(), vec![Operation::Delete]);

        // untouched operations stay native
        assert_eq!(addr(live(Operation::Update)), addr(native(Operation::Update)));

        assert!(unpatch_operation(Operation::Delete));
        assert!(!unpatch_operation(Operation::Delete));
        assert_eq!(addr(live(Operation::Delete)), addr(native(Operation::Delete)));
    }

    fn assert_consistent(op: Operation) {
        let slot = read()[op.index()];
        let intercepting = addr(slot.live) == addr(interceptor::intercepted);
        assert_eq!(slot.preserved.is_some(), intercepting, "{} slot is torn", op);
        assert_eq!(addr(slot.preserved.unwrap_or(slot.live)), addr(native(op)));
    }

    #[test]
    fn concurrent_patching_keeps_every_slot_consistent() {
        let _guard = serial();
        unpatch();

        std::thread::scope(|scope| {
            for worker in 0..6usize {
                scope.spawn(move || {
                    for round in 0..200usize {
                        let op = Operation::ALL[(worker + round) % Operation::ALL.len()];
                        match (worker + round) % 4 {
                            0 => monkey_patch(),
                            1 => unpatch(),
                            2 => {
                                monkey_patch_operation(op);
                            }
                            _ => {
                                unpatch_operation(op);
                            }
                        }
                        assert_eq!(addr(original(op)), addr(native(op)));
                        assert_consistent(op);
                    }
                });
            }
        });

        for op in Operation::ALL {
            assert_consistent(op);
            assert_eq!(is_patched(op), addr(live(op)) == addr(interceptor::intercepted));
        }
        unpatch();
        assert!(patched_operations().is_empty());
    }

    #[test]
    fn delegate_never_resolves_to_the_interceptor() {
        let _guard = serial();
        unpatch();

        assert_eq!(
            addr(preserved_or_native(Operation::Update)),
            addr(native(Operation::Update))
        );
        monkey_patch_operation(Operation::Update);
        assert_eq!(
            addr(preserved_or_native(Operation::Update)),
            addr(native(Operation::Update))
        );
        unpatch();
    }
}
