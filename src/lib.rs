//! Promises/A+ futures on a single-threaded, cooperative task queue.
//!
//! A [`Deferred`] starts pending and settles exactly once, to a value or to a
//! rejection reason. Continuations attached with [`Deferred::then`] always run
//! from the runtime's task queue, in attachment order, never inside the call
//! that attached them or settled the source. Nothing runs until the host drives
//! the [`Runtime`].
//!
//! # Examples
//!
//! ```
//! use promise_aplus::{Error, Resolution, Runtime, Settle, State};
//!
//! let runtime = Runtime::new();
//! let doubled = runtime
//!     .future::<i32, Error, _>(|resolver| {
//!         resolver.fulfill(21);
//!         Ok(())
//!     })
//!     .then_ok(|v| Ok(Resolution::Value(v * 2)));
//!
//! assert!(doubled.is_pending());
//! runtime.run_until_idle().unwrap();
//! assert_eq!(doubled.state(), State::Fulfilled(42));
//! ```
pub mod arena;
pub mod combinators;
pub mod config;
pub mod deferred;
pub mod queue;
pub mod resolution;
pub mod retry;
pub mod runtime;
pub mod settled;
pub mod state;
pub mod timer;

pub use arena::FutureId;
pub use combinators::Collection;
pub use config::RuntimeConfig;
pub use deferred::{Deferred, Resolver};
pub use resolution::{Resolution, ThenCallbacks, Thenable};
pub use retry::retry;
pub use runtime::Runtime;
pub use settled::Settled;
pub use state::{State, Status};

/// Errors raised by the core itself.
///
/// Apart from [`Error::DrainBudgetExhausted`], these never escape the API
/// directly: they become rejection reasons through `E: From<Error>`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("resolving future with itself")]
    SelfResolution,
    #[error("non-sequence passed to {combinator}")]
    NotASequence { combinator: &'static str },
    #[error("empty sequence passed to race")]
    EmptyRace,
    #[error("task queue still busy after {budget} tasks")]
    DrainBudgetExhausted { budget: usize },
    #[error("runtime dropped before the future settled")]
    RuntimeDropped,
    #[error("settled future polled after completion")]
    PolledAfterCompletion,
}

/// The settlement side of a future.
///
/// Implemented by the [`Resolver`] handed to initializers and by the
/// [`ThenCallbacks`] handed to foreign thenables. Calls after the first one
/// are ignored.
pub trait Settle<T, E> {
    /// Runs the resolution procedure on `resolution`.
    fn resolve(&self, resolution: Resolution<T, E>);

    fn reject(&self, reason: E);

    fn fulfill(&self, value: T) {
        self.resolve(Resolution::Value(value))
    }
}
