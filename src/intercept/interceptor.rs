// Wraps one bulk call in pre/post notifications

use crate::database::{Call, Operation, Outcome, QuerySet, Sender};
use crate::error::{QueryError, QueryResult};
use crate::intercept::patch;
use crate::signals::{channel, ObserverError, Phase, Signal};

/// Lifecycle of one intercepted call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    PreNotified,
    Delegated,
    PostNotified,
    Done,
    Failed,
}

struct CallTrace {
    operation: Operation,
    sender: Sender,
    state: CallState,
}

impl CallTrace {
    fn new(operation: Operation, sender: Sender) -> Self {
        Self {
            operation,
            sender,
            state: CallState::Idle,
        }
    }

    fn advance(&mut self, next: CallState) {
        tracing::trace!(
            "{} on {}: {:?} -> {:?}",
            self.operation,
            self.sender,
            self.state,
            next
        );
        self.state = next;
    }
}

/// Send pre, run `delegate`, send post.
///
/// Pre and post receivers get the same `queryset` and `call` the delegate
/// sees, so whatever a pre receiver does to them is what executes, as long as
/// it is still the same operation on the same model. A pre failure means the
/// delegate never runs; a delegate failure means post is never sent.
pub(crate) fn intercept<D>(queryset: &mut QuerySet, mut call: Call, delegate: D) -> QueryResult<Outcome>
where
    D: FnOnce(&mut QuerySet, Call) -> QueryResult<Outcome>,
{
    let operation = call.operation();
    let sender = queryset.sender();
    let mut trace = CallTrace::new(operation, sender);
    tracing::debug!("Intercepting {} on {}", operation, sender);

    trace.advance(CallState::PreNotified);
    let sent = channel(Phase::Pre, operation).send(&mut Signal::pre(queryset, &mut call));
    if let Err(err) = sent.and_then(|()| check_target(operation, sender, queryset, &call)) {
        trace.advance(CallState::Failed);
        return Err(QueryError::observer(operation, Phase::Pre, err));
    }

    trace.advance(CallState::Delegated);
    let outcome = match delegate(queryset, call.clone()) {
        Ok(outcome) => outcome,
        Err(err) => {
            trace.advance(CallState::Failed);
            return Err(err);
        }
    };
    tracing::debug!("{} on {} affected {} rows", operation, queryset.sender(), outcome.affected());

    trace.advance(CallState::PostNotified);
    if let Err(err) = channel(Phase::Post, operation).send(&mut Signal::post(queryset, &mut call, &outcome)) {
        trace.advance(CallState::Failed);
        return Err(QueryError::observer(operation, Phase::Post, err));
    }

    trace.advance(CallState::Done);
    Ok(outcome)
}

/// Pre receivers may edit the arguments and the filter, but the call must
/// still be the same operation on the same model.
fn check_target(operation: Operation, sender: Sender, queryset: &QuerySet, call: &Call) -> Result<(), ObserverError> {
    if call.operation() != operation {
        return Err(ObserverError::validation(format!(
            "pre_{} receiver replaced the call with {}",
            operation,
            call.operation()
        )));
    }
    if queryset.sender() != sender {
        return Err(ObserverError::validation(format!(
            "pre_{} receiver retargeted {} to {}",
            operation,
            sender,
            queryset.sender()
        )));
    }
    Ok(())
}

/// The method `monkey_patch` installs
pub(crate) fn intercepted(queryset: &mut QuerySet, call: Call) -> QueryResult<Outcome> {
    let operation = call.operation();
    intercept(queryset, call, move |qs, call| {
        let original = patch::preserved_or_native(operation);
        original(qs, call)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DatabaseError, Record};
    use crate::testing::{serial, Question};
    use crate::Database;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn seeded(db: &Database) -> QuerySet {
        let mut qs = QuerySet::new::<Question>(db.clone());
        qs.bulk_create(
            vec![Record::new().with("votes", json!(1)), Record::new().with("votes", json!(2))],
            None,
        )
        .unwrap();
        qs
    }

    #[test]
    fn delegate_sees_pre_receiver_changes() {
        let _guard = serial();
        let db = Database::new();
        let mut qs = seeded(&db);

        let pre = channel(Phase::Pre, Operation::Update).connect_for::<Question, _>(|signal| {
            signal.queryset.narrow(json!({"votes": 1}))?;
            if let Call::Update { values } = signal.call {
                values.insert("votes".into(), json!(10));
            }
            Ok(())
        });

        let call = Call::update(json!({"votes": 5})).unwrap();
        let outcome = intercept(&mut qs, call, |qs, call| native_update(qs, call)).unwrap();
        channel(Phase::Pre, Operation::Update).disconnect(pre);

        assert_eq!(outcome, Outcome::Updated(1));
        let votes: Vec<_> = QuerySet::new::<Question>(db.clone())
            .fetch()
            .unwrap()
            .iter()
            .map(|r| r.get("votes").cloned())
            .collect();
        assert_eq!(votes, vec![Some(json!(10)), Some(json!(2))]);
    }

    #[test]
    fn delegate_failure_skips_post() {
        let _guard = serial();
        let db = Database::new();
        let mut qs = QuerySet::new::<Question>(db);
        let posts = Arc::new(Mutex::new(0));

        let counter = posts.clone();
        let post = channel(Phase::Post, Operation::Delete).connect_for::<Question, _>(move |_signal| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        let err = intercept(&mut qs, Call::Delete, |_qs, _call| {
            Err(DatabaseError::Integrity("locked".into()).into())
        })
        .unwrap_err();
        channel(Phase::Post, Operation::Delete).disconnect(post);

        assert!(matches!(err, QueryError::Database(DatabaseError::Integrity(_))));
        assert_eq!(*posts.lock().unwrap(), 0);
    }

    #[test]
    fn post_failure_is_reported_after_the_write() {
        let _guard = serial();
        let db = Database::new();
        let mut qs = seeded(&db);

        let post = channel(Phase::Post, Operation::Delete)
            .connect_for::<Question, _>(|_signal| Err(ObserverError::system("audit log offline")));
        let err = intercept(&mut qs, Call::Delete, |qs, call| native_delete(qs, call)).unwrap_err();
        channel(Phase::Post, Operation::Delete).disconnect(post);

        assert!(err.after_write());
        assert_eq!(db.count::<Question>(), 0);
    }

    #[test]
    fn swapping_the_operation_is_refused_before_the_write() {
        let _guard = serial();
        let db = Database::new();
        let mut qs = seeded(&db);
        let posts = Arc::new(Mutex::new(Vec::new()));

        let pre = channel(Phase::Pre, Operation::BulkCreate).connect_for::<Question, _>(|signal| {
            *signal.call = Call::Delete;
            Ok(())
        });
        let log = posts.clone();
        let post = channel(Phase::Post, Operation::BulkCreate).connect_for::<Question, _>(move |signal| {
            log.lock().unwrap().push(signal.name());
            Ok(())
        });

        let call = Call::BulkCreate { objs: vec![Record::new().with("votes", json!(3))], batch_size: None };
        let err = intercepted(&mut qs, call).unwrap_err();
        channel(Phase::Pre, Operation::BulkCreate).disconnect(pre);
        channel(Phase::Post, Operation::BulkCreate).disconnect(post);

        assert!(matches!(
            err,
            QueryError::Observer { operation: Operation::BulkCreate, phase: Phase::Pre, source: ObserverError::Validation(_) }
        ));
        assert_eq!(db.count::<Question>(), 2);
        assert!(posts.lock().unwrap().is_empty());
    }

    #[test]
    fn swapping_the_model_is_refused_before_the_write() {
        let _guard = serial();
        let db = Database::new();
        let mut qs = seeded(&db);
        QuerySet::new::<crate::testing::User>(db.clone())
            .bulk_create(vec![Record::new().with("username", json!("ada"))], None)
            .unwrap();

        let target = db.clone();
        let pre = channel(Phase::Pre, Operation::Delete).connect_for::<Question, _>(move |signal| {
            *signal.queryset = QuerySet::new::<crate::testing::User>(target.clone());
            Ok(())
        });
        let err = intercepted(&mut qs, Call::Delete).unwrap_err();
        channel(Phase::Pre, Operation::Delete).disconnect(pre);

        assert!(!err.after_write());
        assert!(matches!(err.observer_error(), Some(ObserverError::Validation(_))));
        assert_eq!(db.count::<Question>(), 2);
        assert_eq!(db.count::<crate::testing::User>(), 1);
    }

    fn native_update(qs: &mut QuerySet, call: Call) -> QueryResult<Outcome> {
        patch::native(Operation::Update)(qs, call)
    }

    fn native_delete(qs: &mut QuerySet, call: Call) -> QueryResult<Outcome> {
        patch::native(Operation::Delete)(qs, call)
    }
}
