//! Per-future state: the tagged state, the queued continuations and the
//! settle-once guard.
use std::any::Any;
use std::fmt;

use crate::arena::FutureId;
use crate::queue::Task;
use crate::Runtime;

/// Observable state of a future.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> State<T, E> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    pub fn status(&self) -> Status {
        match self {
            Self::Pending => Status::Pending,
            Self::Fulfilled(_) => Status::Fulfilled,
            Self::Rejected(_) => Status::Rejected,
        }
    }

    /// The settled outcome, if any.
    pub fn into_result(self) -> Option<Result<T, E>> {
        match self {
            Self::Pending => None,
            Self::Fulfilled(value) => Some(Ok(value)),
            Self::Rejected(reason) => Some(Err(reason)),
        }
    }
}

/// [`State`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Pending,
    Fulfilled,
    Rejected,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Fulfilled => f.write_str("fulfilled"),
            Self::Rejected => f.write_str("rejected"),
        }
    }
}

/// One `then` registration on a pending future. Exactly one branch runs,
/// once, when the source settles.
pub(crate) struct Continuation<T, E> {
    pub derived: FutureId,
    pub on_fulfilled: Box<dyn FnOnce(&Runtime, T)>,
    pub on_rejected: Box<dyn FnOnce(&Runtime, E)>,
}

pub(crate) struct Slot<T, E> {
    pub state: State<T, E>,
    pub waiters: Vec<Continuation<T, E>>,
    /// Latched by the first `resolve`/`reject` through a public resolver.
    pub guard: bool,
    /// Set once any continuation has been attached.
    pub observed: bool,
}

impl<T: Clone + 'static, E: Clone + 'static> Slot<T, E> {
    pub fn new() -> Self {
        Self {
            state: State::Pending,
            waiters: Vec::new(),
            guard: false,
            observed: false,
        }
    }

    /// Moves to `Fulfilled` and turns every waiter into a deferred task, in
    /// attachment order. `None` if already settled.
    pub fn fulfill(&mut self, value: T) -> Option<Vec<Task>> {
        if self.state.is_settled() {
            return None;
        }
        let waiters = std::mem::take(&mut self.waiters);
        self.state = State::Fulfilled(value.clone());
        Some(
            waiters
                .into_iter()
                .map(|waiter| {
                    let value = value.clone();
                    Box::new(move |runtime: &Runtime| (waiter.on_fulfilled)(runtime, value)) as Task
                })
                .collect(),
        )
    }

    pub fn reject(&mut self, reason: E) -> Option<Vec<Task>> {
        if self.state.is_settled() {
            return None;
        }
        let waiters = std::mem::take(&mut self.waiters);
        self.state = State::Rejected(reason.clone());
        Some(
            waiters
                .into_iter()
                .map(|waiter| {
                    let reason = reason.clone();
                    Box::new(move |runtime: &Runtime| (waiter.on_rejected)(runtime, reason)) as Task
                })
                .collect(),
        )
    }
}

/// Type-erased view of a [`Slot`] so one arena can hold futures of every
/// `T`/`E`.
pub(crate) trait ErasedSlot {
    fn status(&self) -> Status;
    fn waiting(&self) -> usize;
    fn is_unhandled_rejection(&self) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static, E: 'static> ErasedSlot for Slot<T, E> {
    fn status(&self) -> Status {
        self.state.status()
    }

    fn waiting(&self) -> usize {
        self.waiters.len()
    }

    fn is_unhandled_rejection(&self) -> bool {
        self.state.is_rejected() && !self.observed
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
