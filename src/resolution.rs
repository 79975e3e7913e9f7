//! The resolution procedure: what it means to resolve a future with a value,
//! with another future, or with a foreign thenable.
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::arena::FutureId;
use crate::deferred::Deferred;
use crate::runtime::WeakRuntime;
use crate::{Error, Runtime, Settle};

/// Anything a future can be resolved with.
pub enum Resolution<T, E> {
    /// A plain value; fulfills directly.
    Value(T),
    /// A native future whose outcome is adopted.
    Future(Deferred<T, E>),
    /// A foreign future-like object, unwrapped through its `then`.
    Thenable(Box<dyn Thenable<T, E>>),
}

impl<T, E> Resolution<T, E> {
    pub fn value(value: T) -> Self {
        Resolution::Value(value)
    }

    pub fn thenable(thenable: impl Thenable<T, E> + 'static) -> Self {
        Resolution::Thenable(Box::new(thenable))
    }
}

impl<T, E> From<Deferred<T, E>> for Resolution<T, E> {
    fn from(future: Deferred<T, E>) -> Self {
        Resolution::Future(future)
    }
}

impl<T: fmt::Debug, E> fmt::Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Future(future) => f.debug_tuple("Future").field(&future.id()).finish(),
            Resolution::Thenable(_) => f.write_str("Thenable(..)"),
        }
    }
}

/// A foreign future-like value.
///
/// `then` receives single-use callbacks and may call them right away, later,
/// or never. Returning `Err` stands for a failure while looking up or calling
/// `then`; it rejects the consuming future unless a callback fired first.
pub trait Thenable<T, E> {
    fn then(self: Box<Self>, callbacks: ThenCallbacks<T, E>) -> Result<(), E>;
}

impl<T, E, F> Thenable<T, E> for F
where
    F: FnOnce(ThenCallbacks<T, E>) -> Result<(), E>,
{
    fn then(self: Box<Self>, callbacks: ThenCallbacks<T, E>) -> Result<(), E> {
        (*self)(callbacks)
    }
}

enum Signal<T, E> {
    Resolve(Resolution<T, E>),
    Reject(E),
}

struct Latch<T, E> {
    fired: Cell<bool>,
    // True while the thenable's `then` is still on the stack.
    inline: Cell<bool>,
    parked: RefCell<Option<Signal<T, E>>>,
}

/// The pair of callbacks handed to a [`Thenable`]. Only the first call to
/// either one has any effect, and none once the runtime is dropped.
pub struct ThenCallbacks<T, E> {
    runtime: WeakRuntime,
    target: FutureId,
    latch: Rc<Latch<T, E>>,
}

impl<T, E> Clone for ThenCallbacks<T, E> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            target: self.target,
            latch: self.latch.clone(),
        }
    }
}

impl<T, E> ThenCallbacks<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    /// Whether a callback has already fired.
    pub fn is_spent(&self) -> bool {
        self.latch.fired.get()
    }

    fn signal(&self, signal: Signal<T, E>) {
        if self.latch.fired.replace(true) {
            tracing::trace!(future = %self.target, "thenable signalled twice, ignored");
            return;
        }
        if self.latch.inline.get() {
            *self.latch.parked.borrow_mut() = Some(signal);
            return;
        }
        let Some(runtime) = self.runtime.upgrade() else {
            tracing::trace!(future = %self.target, "runtime dropped, thenable signal ignored");
            return;
        };
        match signal {
            Signal::Resolve(resolution) => resolve(&runtime, self.target, resolution),
            Signal::Reject(reason) => runtime.reject::<T, E>(self.target, reason),
        }
    }
}

impl<T, E> Settle<T, E> for ThenCallbacks<T, E>
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    fn resolve(&self, resolution: Resolution<T, E>) {
        self.signal(Signal::Resolve(resolution))
    }

    fn reject(&self, reason: E) {
        self.signal(Signal::Reject(reason))
    }
}

/// Resolves the future `target` with `resolution`.
///
/// Thenables that call back synchronously are unwrapped in a loop rather than
/// by recursion, so arbitrarily long chains of them use constant stack.
pub(crate) fn resolve<T, E>(runtime: &Runtime, target: FutureId, resolution: Resolution<T, E>)
where
    T: Clone + 'static,
    E: Clone + From<Error> + 'static,
{
    let mut next = resolution;
    loop {
        match next {
            Resolution::Value(value) => {
                runtime.fulfill::<T, E>(target, value);
                return;
            }
            Resolution::Future(future) if future.belongs_to(runtime) => {
                if future.id() == target {
                    tracing::debug!(future = %target, "future resolved with itself");
                    runtime.reject::<T, E>(target, E::from(Error::SelfResolution));
                } else {
                    future.adopt_into(target);
                }
                return;
            }
            // A future from another runtime is just a foreign thenable here.
            Resolution::Future(future) => {
                next = Resolution::Thenable(Box::new(future));
            }
            Resolution::Thenable(thenable) => {
                let latch = Rc::new(Latch {
                    fired: Cell::new(false),
                    inline: Cell::new(true),
                    parked: RefCell::new(None),
                });
                let callbacks = ThenCallbacks {
                    runtime: runtime.downgrade(),
                    target,
                    latch: latch.clone(),
                };
                let called = thenable.then(callbacks);
                latch.inline.set(false);
                let parked = latch.parked.borrow_mut().take();
                match (parked, called) {
                    (Some(Signal::Resolve(resolution)), _) => next = resolution,
                    (Some(Signal::Reject(reason)), _) => {
                        runtime.reject::<T, E>(target, reason);
                        return;
                    }
                    (None, Err(reason)) => {
                        latch.fired.set(true);
                        tracing::debug!(future = %target, "thenable failed before signalling");
                        runtime.reject::<T, E>(target, reason);
                        return;
                    }
                    (None, Ok(())) => return,
                }
            }
        }
    }
}
