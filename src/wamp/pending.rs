//! Table of calls awaiting a result.
//!
//! The application registers calls while the dispatcher completes them, so the
//! table is a [`DashMap`]. Completions run after their entry has been removed
//! and never while a shard lock is held.

use std::sync::{Mutex, PoisonError};

use dashmap::{DashMap, mapref::entry::Entry};
use serde_json::Value;
use tracing::debug;

use super::{call_id::new_call_id, error::CallError};
use crate::{panic::guard_callback, rng::RandomSource};

/// Callback invoked once with the outcome of a call.
pub type Completion = Box<dyn FnOnce(Result<Value, CallError>) + Send>;

struct PendingCall {
    procedure: String,
    completion: Mutex<Completion>,
}

/// Calls sent but not yet answered, keyed by call id.
#[derive(Default)]
pub struct PendingCalls {
    calls: DashMap<String, PendingCall>,
}

impl std::fmt::Debug for PendingCalls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCalls")
            .field("len", &self.calls.len())
            .finish()
    }
}

impl PendingCalls {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register a call under a fresh id and return the id.
    ///
    /// Ids that collide with an in-flight call are redrawn.
    pub fn register(
        &self,
        random: &dyn RandomSource,
        procedure: &str,
        completion: Completion,
    ) -> String {
        loop {
            match self.calls.entry(new_call_id(random)) {
                Entry::Occupied(taken) => {
                    debug!(call_id = %taken.key(), "call id already in flight; redrawing");
                }
                Entry::Vacant(slot) => {
                    let call_id = slot.key().clone();
                    slot.insert(PendingCall {
                        procedure: procedure.to_owned(),
                        completion: Mutex::new(completion),
                    });
                    return call_id;
                }
            }
        }
    }

    /// Remove `call_id` and hand `outcome` to its completion.
    ///
    /// Returns `false` when no call with that id is pending.
    pub fn complete(&self, call_id: &str, outcome: Result<Value, CallError>) -> bool {
        let Some((_, call)) = self.calls.remove(call_id) else {
            return false;
        };
        debug!(call_id, procedure = %call.procedure, ok = outcome.is_ok(), "call completed");
        run(call, outcome);
        true
    }

    /// Remove `call_id` without running its completion.
    pub fn cancel(&self, call_id: &str) -> bool { self.calls.remove(call_id).is_some() }

    /// Fail every pending call with [`CallError::ConnectionClosed`].
    ///
    /// Returns the number of calls failed.
    pub fn fail_all(&self) -> usize {
        let ids: Vec<String> = self.calls.iter().map(|entry| entry.key().clone()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, call)) = self.calls.remove(&id) {
                debug!(call_id = %id, procedure = %call.procedure, "failing pending call");
                run(call, Err(CallError::ConnectionClosed));
                failed += 1;
            }
        }
        failed
    }

    #[must_use]
    pub fn len(&self) -> usize { self.calls.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.calls.is_empty() }

    #[must_use]
    pub fn contains(&self, call_id: &str) -> bool { self.calls.contains_key(call_id) }
}

fn run(call: PendingCall, outcome: Result<Value, CallError>) {
    let completion = call
        .completion
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);
    guard_callback("call completion", || completion(outcome));
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;
    use crate::rng::{RandomSource, SeededRandom};

    type Outcomes = Arc<Mutex<Vec<(String, Result<Value, String>)>>>;

    #[fixture]
    fn pending() -> PendingCalls { PendingCalls::new() }

    fn recorder(label: &str, outcomes: &Outcomes) -> Completion {
        let label = label.to_owned();
        let outcomes = Arc::clone(outcomes);
        Box::new(move |outcome: Result<Value, CallError>| {
            outcomes
                .lock()
                .expect("lock")
                .push((label, outcome.map_err(|e| e.to_string())));
        })
    }

    /// Yields the same bytes for the first two draws, then distinct ones.
    struct RepeatingRandom(Mutex<u8>);

    impl RandomSource for RepeatingRandom {
        fn fill(&self, dest: &mut [u8]) {
            let mut draws = self.0.lock().expect("lock");
            let byte = if *draws < 2 { 0 } else { *draws };
            dest.fill(byte);
            *draws += 1;
        }
    }

    #[rstest]
    fn results_route_to_their_call(pending: PendingCalls) {
        let random = SeededRandom::new(1);
        let outcomes = Outcomes::default();
        let first = pending.register(&random, "add", recorder("first", &outcomes));
        let second = pending.register(&random, "sub", recorder("second", &outcomes));
        assert_ne!(first, second);

        assert!(pending.complete(&second, Ok(json!(2))));
        assert!(pending.complete(&first, Ok(json!(1))));

        let outcomes = outcomes.lock().expect("lock");
        assert_eq!(
            *outcomes,
            vec![
                ("second".to_owned(), Ok(json!(2))),
                ("first".to_owned(), Ok(json!(1))),
            ]
        );
        assert!(pending.is_empty());
    }

    #[rstest]
    fn unknown_id_is_ignored(pending: PendingCalls) {
        let outcomes = Outcomes::default();
        pending.register(&SeededRandom::new(2), "p", recorder("p", &outcomes));
        assert!(!pending.complete("missing!", Ok(Value::Null)));
        assert!(outcomes.lock().expect("lock").is_empty());
        assert_eq!(pending.len(), 1);
    }

    #[rstest]
    fn completion_runs_once(pending: PendingCalls) {
        let outcomes = Outcomes::default();
        let id = pending.register(&SeededRandom::new(3), "p", recorder("p", &outcomes));
        assert!(pending.complete(&id, Ok(Value::Null)));
        assert!(!pending.complete(&id, Ok(Value::Null)));
        assert_eq!(outcomes.lock().expect("lock").len(), 1);
    }

    #[rstest]
    fn colliding_id_is_redrawn(pending: PendingCalls) {
        let random = RepeatingRandom(Mutex::new(0));
        let outcomes = Outcomes::default();
        let first = pending.register(&random, "a", recorder("a", &outcomes));
        let second = pending.register(&random, "b", recorder("b", &outcomes));
        assert_eq!(first, "AAAAAAAA");
        assert_ne!(first, second);
        assert_eq!(pending.len(), 2);
    }

    #[rstest]
    fn fail_all_reports_connection_closed(pending: PendingCalls) {
        let random = SeededRandom::new(4);
        let outcomes = Outcomes::default();
        pending.register(&random, "a", recorder("a", &outcomes));
        pending.register(&random, "b", recorder("b", &outcomes));

        assert_eq!(pending.fail_all(), 2);
        assert!(pending.is_empty());
        let outcomes = outcomes.lock().expect("lock");
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|(_, outcome)| {
            outcome.as_ref().err().map(String::as_str)
                == Some("connection closed before the call completed")
        }));
    }

    #[rstest]
    fn panicking_completion_does_not_stop_fail_all(pending: PendingCalls) {
        let random = SeededRandom::new(5);
        let outcomes = Outcomes::default();
        pending.register(&random, "boom", Box::new(|_: Result<Value, CallError>| panic!("completion failed")));
        pending.register(&random, "ok", recorder("ok", &outcomes));

        assert_eq!(pending.fail_all(), 2);
        assert_eq!(outcomes.lock().expect("lock").len(), 1);
    }

    #[rstest]
    fn cancel_drops_without_running(pending: PendingCalls) {
        let outcomes = Outcomes::default();
        let id = pending.register(&SeededRandom::new(6), "p", recorder("p", &outcomes));
        assert!(pending.contains(&id));
        assert!(pending.cancel(&id));
        assert!(!pending.contains(&id));
        assert!(outcomes.lock().expect("lock").is_empty());
    }
}
