//! Future handles, their construction, and continuation chaining.
use std::fmt;
use std::marker::PhantomData;

use crate::arena::FutureId;
use crate::resolution::{self, Resolution, ThenCallbacks, Thenable};
use crate::state::{Continuation, State};
use crate::runtime::WeakRuntime;
use crate::{Error, Runtime, Settle};

/// Handle to a future living in a [`Runtime`].
///
/// Handles are cheap to clone; every clone observes the same future.
pub struct Deferred<T, E> {
    id: FutureId,
    runtime: Runtime,
    _marker: PhantomData<fn() -> (T, E)>,
}

/// The settlement capabilities of one future: `resolve` and `reject`.
///
/// Only the first call through any clone of a resolver takes effect. A
/// resolver does not keep its runtime alive; once the runtime is gone, calls
/// are ignored.
pub struct Resolver<T, E> {
    target: FutureId,
    runtime: WeakRuntime,
    _marker: PhantomData<fn() -> (T, E)>,
}

impl Runtime {
    /// A pending future together with its resolver.
    ///
    /// ```
    /// use promise_aplus::{Error, Runtime, Settle, State};
    /// let runtime = Runtime::new();
    /// let (resolver, future) = runtime.pair::<&str, Error>();
    /// resolver.fulfill("Hi");
    /// assert_eq!(future.state(), State::Fulfilled("Hi"));
    /// ```
    pub fn pair<T, E>(&self) -> (Resolver<T, E>, Deferred<T, E>)
    where
        T: Clone + 'static,
        E: Clone + From<Error> + 'static,
    {
        let id = self.alloc::<T, E>();
        let resolver = Resolver {
            target: id,
            runtime: self.downgrade(),
            _marker: PhantomData,
        };
        (resolver, Deferred::from_id(self.clone(), id))
    }

    /// Creates a future and hands its resolver to `init` synchronously.
    ///
    /// An `Err` from `init` rejects the future, unless `init` had already
    /// resolved or rejected it.
    pub fn future<T, E, F>(&self, init: F) -> Deferred<T, E>
    where
        T: Clone + 'static,
        E: Clone + From<Error> + 'static,
        F: FnOnce(Resolver<T, E>) -> Result<(), E>,
    {
        let (resolver, future) = self.pair();
        if let Err(reason) = init(resolver.clone()) {
            tracing::debug!(future = %future.id, "initializer failed");
            resolver.reject(reason);
        }
        future
    }

    /// A future resolved with `resolution`. Thenables and other futures are
    /// unwrapped, so the result may still be pending.
    pub fn resolved<T, E>(&self, resolution: impl Into<Resolution<T, E>>) -> Deferred<T, E>
    where
        T: Clone + 'static,
        E: Clone + From<Error> + 'static,
    {
        let (resolver, future) = self.pair();
        resolver.resolve(resolution.into());
        future
    }

    /// A future already fulfilled with `value`.
    pub fn fulfilled<T, E>(&self, value: T) -> Deferred<T, E>
    where
        T: Clone + 'static,
        E: Clone + From<Error> + 'static,
    {
        self.resolved(Resolution::Value(value))
    }

    /// A future already rejected with `reason`.
    pub fn rejected<T, E>(&self, reason: E) -> Deferred<T, E>
    where
        T: Clone + 'static,
        E: Clone + From<Error> + 'static,
    {
        let (resolver, future) = self.pair();
        resolver.reject(reason);
        future
    }
}

impl<T, E> Deferred<T, E> {
    pub(crate) fn from_id(runtime: Runtime, id: FutureId) -> Self {
        Self {
            id,
            runtime,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> FutureId {
        self.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub(crate) fn belongs_to(&self, runtime: &Runtime) -> bool {
        self.runtime.ptr_eq(runtime)
    }
}

impl<T, E> Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    /// Snapshot of the current state.
    pub fn state(&self) -> State<T, E> {
        self.runtime
            .with_slot::<T, E, _>(self.id, |slot| slot.state.clone())
            .unwrap_or(State::Pending)
    }

    pub fn is_pending(&self) -> bool {
        self.state().is_pending()
    }

    pub fn is_fulfilled(&self) -> bool {
        self.state().is_fulfilled()
    }

    pub fn is_rejected(&self) -> bool {
        self.state().is_rejected()
    }

    /// Attaches fulfillment and rejection handlers and returns the derived
    /// future.
    ///
    /// Handlers always run from the task queue. `Ok(resolution)` resolves the
    /// derived future with it; `Err(reason)` rejects it. Returning this very
    /// future from a handler rejects the derived one with
    /// [`Error::SelfResolution`].
    pub fn then<U, F, G>(&self, on_fulfilled: F, on_rejected: G) -> Deferred<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + 'static,
        G: FnOnce(E) -> Result<Resolution<U, E>, E> + 'static,
    {
        let derived = self.runtime.alloc::<U, E>();
        let source = self.id;
        self.attach(Continuation {
            derived,
            on_fulfilled: Box::new(move |runtime: &Runtime, value: T| {
                settle_derived(runtime, source, derived, on_fulfilled(value))
            }),
            on_rejected: Box::new(move |runtime: &Runtime, reason: E| {
                settle_derived(runtime, source, derived, on_rejected(reason))
            }),
        });
        Deferred::from_id(self.runtime.clone(), derived)
    }

    /// Like [`then`](Self::then) with the rejection passed through unchanged.
    pub fn then_ok<U, F>(&self, on_fulfilled: F) -> Deferred<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + 'static,
    {
        self.then(on_fulfilled, Err)
    }

    /// Like [`then`](Self::then) with the value passed through unchanged.
    pub fn catch<G>(&self, on_rejected: G) -> Deferred<T, E>
    where
        G: FnOnce(E) -> Result<Resolution<T, E>, E> + 'static,
    {
        self.then(|value| Ok(Resolution::Value(value)), on_rejected)
    }

    /// `then` with either handler omitted: a missing fulfillment handler
    /// passes the value through, a missing rejection handler re-raises.
    pub fn then_opt<F, G>(&self, on_fulfilled: Option<F>, on_rejected: Option<G>) -> Deferred<T, E>
    where
        F: FnOnce(T) -> Result<Resolution<T, E>, E> + 'static,
        G: FnOnce(E) -> Result<Resolution<T, E>, E> + 'static,
    {
        self.then(
            move |value| match on_fulfilled {
                Some(handler) => handler(value),
                None => Ok(Resolution::Value(value)),
            },
            move |reason| match on_rejected {
                Some(handler) => handler(reason),
                None => Err(reason),
            },
        )
    }

    /// Maps the fulfilled value.
    pub fn map<U, F>(&self, f: F) -> Deferred<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> U + 'static,
    {
        self.then_ok(move |value| Ok(Resolution::Value(f(value))))
    }

    // Pending: queue the record. Settled: schedule the matching branch now.
    fn attach(&self, continuation: Continuation<T, E>) {
        let id = self.id;
        self.runtime.with_core(|core| {
            let Some(slot) = core.arena.get_mut::<T, E>(id) else {
                tracing::warn!(future = %id, "then on unknown future");
                return;
            };
            slot.observed = true;
            tracing::trace!(future = %id, derived = %continuation.derived, "continuation attached");
            match &slot.state {
                State::Pending => slot.waiters.push(continuation),
                State::Fulfilled(value) => {
                    let value = value.clone();
                    core.queue.push(Box::new(move |runtime: &Runtime| {
                        (continuation.on_fulfilled)(runtime, value)
                    }));
                }
                State::Rejected(reason) => {
                    let reason = reason.clone();
                    core.queue.push(Box::new(move |runtime: &Runtime| {
                        (continuation.on_rejected)(runtime, reason)
                    }));
                }
            }
        });
    }

    /// Settles `target` (same runtime) the way this future settles.
    pub(crate) fn adopt_into(&self, target: FutureId) {
        self.attach(Continuation {
            derived: target,
            on_fulfilled: Box::new(move |runtime: &Runtime, value: T| {
                runtime.fulfill::<T, E>(target, value)
            }),
            on_rejected: Box::new(move |runtime: &Runtime, reason: E| {
                runtime.reject::<T, E>(target, reason)
            }),
        });
    }
}

// Continuations capture ids only, never handles, so the arena holds no
// reference back to its own runtime.
fn settle_derived<U, E>(
    runtime: &Runtime,
    source: FutureId,
    derived: FutureId,
    outcome: Result<Resolution<U, E>, E>,
) where
    U: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    match outcome {
        Err(reason) => runtime.reject::<U, E>(derived, reason),
        Ok(Resolution::Future(future))
            if future.belongs_to(runtime) && future.id() == source =>
        {
            tracing::debug!(%source, %derived, "handler returned its own source");
            runtime.reject::<U, E>(derived, E::from(Error::SelfResolution));
        }
        Ok(resolution) => resolution::resolve(runtime, derived, resolution),
    }
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            runtime: self.runtime.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("id", &self.id)
            .field("status", &self.runtime.status(self.id))
            .finish()
    }
}

/// A future from one runtime seen by another is a foreign thenable.
impl<T, E> Thenable<T, E> for Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    fn then(self: Box<Self>, callbacks: ThenCallbacks<T, E>) -> Result<(), E> {
        let on_reject = callbacks.clone();
        Deferred::then(
            &*self,
            move |value| {
                callbacks.fulfill(value);
                Ok(Resolution::Value(()))
            },
            move |reason| {
                on_reject.reject(reason);
                Ok(Resolution::Value(()))
            },
        );
        Ok(())
    }
}

impl<T, E> Resolver<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    pub fn id(&self) -> FutureId {
        self.target
    }

    /// The future this resolver settles, while its runtime is alive.
    pub fn future(&self) -> Option<Deferred<T, E>> {
        let runtime = self.runtime.upgrade()?;
        Some(Deferred::from_id(runtime, self.target))
    }

    /// Whether `resolve` or `reject` has already been called, or the runtime
    /// is gone.
    pub fn is_spent(&self) -> bool {
        self.runtime.upgrade().map_or(true, |runtime| {
            runtime
                .with_slot::<T, E, _>(self.target, |slot| slot.guard)
                .unwrap_or(true)
        })
    }

    // The runtime to settle through, on the first call only.
    fn latch(&self) -> Option<Runtime> {
        let Some(runtime) = self.runtime.upgrade() else {
            tracing::trace!(future = %self.target, "runtime dropped, resolver ignored");
            return None;
        };
        let first = runtime
            .with_slot::<T, E, _>(self.target, |slot| !std::mem::replace(&mut slot.guard, true))
            .unwrap_or(false);
        if !first {
            tracing::trace!(future = %self.target, "resolver already used, ignored");
            return None;
        }
        Some(runtime)
    }
}

impl<T, E> Settle<T, E> for Resolver<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    fn resolve(&self, resolution: Resolution<T, E>) {
        if let Some(runtime) = self.latch() {
            resolution::resolve(&runtime, self.target, resolution);
        }
    }

    fn reject(&self, reason: E) {
        if let Some(runtime) = self.latch() {
            runtime.reject::<T, E>(self.target, reason);
        }
    }
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            target: self.target,
            runtime: self.runtime.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").field("target", &self.target).finish()
    }
}
