//! Re-run a future-producing call until it fulfills or the attempts run out.
use std::cell::RefCell;
use std::rc::Rc;

use crate::deferred::{Deferred, Resolver};
use crate::resolution::Resolution;
use crate::{Error, Runtime, Settle};

struct Attempts<P> {
    producer: P,
    retries_left: usize,
    made: usize,
}

/// Calls `producer` and, each time its result rejects, calls it again, up to
/// `max_attempts` more times. Fulfills with the first success or rejects with
/// the last reason.
///
/// The producer is handed the runtime on every call. Retries stop quietly if
/// the runtime is dropped in between.
///
/// ```
/// use promise_aplus::{retry, Error, Resolution, Runtime, State};
/// let runtime = Runtime::new();
/// let mut calls = 0;
/// let result = retry(&runtime, move |rt: &Runtime| {
///     calls += 1;
///     if calls < 3 {
///         Resolution::Future(rt.rejected(Error::EmptyRace))
///     } else {
///         Resolution::Value(calls)
///     }
/// }, 2);
/// runtime.run_until_idle().unwrap();
/// assert_eq!(result.state(), State::Fulfilled(3));
/// ```
pub fn retry<T, E, P>(runtime: &Runtime, producer: P, max_attempts: usize) -> Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
    P: FnMut(&Runtime) -> Resolution<T, E> + 'static,
{
    let (resolver, result) = runtime.pair();
    let attempts = Rc::new(RefCell::new(Attempts {
        producer,
        retries_left: max_attempts,
        made: 0,
    }));
    attempt(runtime, attempts, resolver);
    result
}

fn attempt<T, E, P>(runtime: &Runtime, attempts: Rc<RefCell<Attempts<P>>>, resolver: Resolver<T, E>)
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
    P: FnMut(&Runtime) -> Resolution<T, E> + 'static,
{
    let produced = {
        let mut attempts = attempts.borrow_mut();
        attempts.made += 1;
        (attempts.producer)(runtime)
    };
    let on_fulfilled = resolver.clone();
    let home = runtime.downgrade();
    runtime.resolved(produced).then(
        move |value| {
            on_fulfilled.fulfill(value);
            Ok(Resolution::Value(()))
        },
        move |reason| {
            let (again, made) = {
                let mut attempts = attempts.borrow_mut();
                let again = attempts.retries_left > 0;
                if again {
                    attempts.retries_left -= 1;
                }
                (again, attempts.made)
            };
            if !again {
                tracing::debug!(attempts = made, "attempts exhausted");
                resolver.reject(reason);
            } else if let Some(home) = home.upgrade() {
                tracing::debug!(attempt = made, "attempt rejected, retrying");
                attempt(&home, attempts, resolver);
            } else {
                tracing::debug!(attempt = made, "runtime dropped, retry abandoned");
            }
            Ok(Resolution::Value(()))
        },
    );
}
