//! Deterministic virtual clock. Timers never fire on their own; the host moves
//! time with [`Runtime::advance`](crate::Runtime::advance).
use std::collections::BTreeMap;
use std::fmt;

use crate::deferred::Deferred;
use crate::queue::Task;
use crate::resolution::Resolution;
use crate::{Error, Runtime, Settle};

pub struct Timers {
    now: u64,
    next_seq: u64,
    // Keyed by (deadline, registration order) so ties fire FIFO.
    pending: BTreeMap<(u64, u64), Task>,
}

impl Timers {
    pub fn new() -> Self {
        Self {
            now: 0,
            next_seq: 0,
            pending: BTreeMap::new(),
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    /// Registers `task` to be released `ticks` from now.
    pub fn schedule(&mut self, ticks: u64, task: Task) -> u64 {
        let deadline = self.now.saturating_add(ticks);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert((deadline, seq), task);
        deadline
    }

    /// Pops the earliest timer due at or before `limit`, moving the clock to
    /// its deadline.
    pub fn pop_due(&mut self, limit: u64) -> Option<Task> {
        let (&key, _) = self.pending.iter().next()?;
        if key.0 > limit {
            return None;
        }
        let task = self.pending.remove(&key)?;
        if key.0 > self.now {
            self.now = key.0;
        }
        Some(task)
    }

    pub fn advance_to(&mut self, target: u64) {
        if target > self.now {
            self.now = target;
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for Timers {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Timers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timers")
            .field("now", &self.now)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Runtime {
    /// A future resolved with `resolution` once `ticks` have passed.
    pub fn resolve_after<T, E>(&self, ticks: u64, resolution: impl Into<Resolution<T, E>>) -> Deferred<T, E>
    where
        T: Clone + 'static,
        E: Clone + From<Error> + 'static,
    {
        let (resolver, future) = self.pair();
        // Timers live in the core, so a handle into this runtime is parked as
        // an id and rebuilt when the timer fires.
        let task: Task = match resolution.into() {
            Resolution::Future(inner) if inner.belongs_to(self) => {
                let id = inner.id();
                Box::new(move |runtime: &Runtime| {
                    resolver.resolve(Resolution::Future(Deferred::from_id(runtime.clone(), id)))
                })
            }
            resolution => Box::new(move |_: &Runtime| resolver.resolve(resolution)),
        };
        self.schedule_after(ticks, task);
        future
    }

    /// A future rejected with `reason` once `ticks` have passed.
    pub fn reject_after<T, E>(&self, ticks: u64, reason: E) -> Deferred<T, E>
    where
        T: Clone + 'static,
        E: Clone + From<Error> + 'static,
    {
        let (resolver, future) = self.pair();
        self.schedule_after(ticks, move |_| resolver.reject(reason));
        future
    }
}
