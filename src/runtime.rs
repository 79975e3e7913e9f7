//! The runtime owns the future arena, the task queue and the virtual clock.
//! Every [`Deferred`](crate::Deferred) handle points back into one runtime.
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::arena::{FutureArena, FutureId};
use crate::config::RuntimeConfig;
use crate::queue::{Task, TaskQueue};
use crate::state::{Slot, Status};
use crate::timer::Timers;
use crate::Error;

pub(crate) struct Core {
    pub arena: FutureArena,
    pub queue: TaskQueue,
    pub timers: Timers,
    pub config: RuntimeConfig,
}

/// Cheaply cloneable handle to a single-threaded future runtime.
///
/// Borrows of the shared core are only held for bookkeeping; handlers,
/// initializers and thenables always run with nothing borrowed, so they may
/// call back into the runtime freely.
#[derive(Clone)]
pub struct Runtime {
    core: Rc<RefCell<Core>>,
}

/// Non-owning handle held by settlement capabilities. Anything stored inside
/// the core refers back to it through this, never through a [`Runtime`].
#[derive(Clone)]
pub(crate) struct WeakRuntime {
    core: Weak<RefCell<Core>>,
}

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.core.upgrade().map(|core| Runtime { core })
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let core = Core {
            arena: FutureArena::new(),
            queue: TaskQueue::with_capacity(config.queue_capacity),
            timers: Timers::new(),
            config,
        };
        Self {
            core: Rc::new(RefCell::new(core)),
        }
    }

    pub fn config(&self) -> RuntimeConfig {
        self.core.borrow().config.clone()
    }

    /// Whether both handles drive the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }

    /// Queues `task` to run on a later turn.
    pub fn defer(&self, task: impl FnOnce(&Runtime) + 'static) {
        self.core.borrow_mut().queue.push(Box::new(task));
    }

    /// Runs a single queued task. Returns `false` if the queue was empty.
    pub fn turn(&self) -> bool {
        // The borrow must end before the task runs.
        let task = self.core.borrow_mut().queue.pop();
        match task {
            Some(task) => {
                task(self);
                true
            }
            None => false,
        }
    }

    /// Runs queued tasks, including any they queue, until the queue is empty.
    /// Returns the number of tasks run.
    pub fn run_until_idle(&self) -> Result<usize, Error> {
        let mut ran = 0;
        self.drain(&mut ran)?;
        Ok(ran)
    }

    pub fn pending_tasks(&self) -> usize {
        self.core.borrow().queue.len()
    }

    /// Current virtual time in ticks.
    pub fn now(&self) -> u64 {
        self.core.borrow().timers.now()
    }

    /// Queues `task` once the clock has moved `ticks` forward.
    pub fn schedule_after(&self, ticks: u64, task: impl FnOnce(&Runtime) + 'static) {
        let deadline = self
            .core
            .borrow_mut()
            .timers
            .schedule(ticks, Box::new(task));
        tracing::trace!(deadline, "timer scheduled");
    }

    /// Moves the clock `ticks` forward. Due timers are released in deadline
    /// order and the task queue is drained after each one. Returns the number
    /// of tasks run.
    pub fn advance(&self, ticks: u64) -> Result<usize, Error> {
        let target = self.now().saturating_add(ticks);
        let mut ran = 0;
        self.drain(&mut ran)?;
        loop {
            let due = self.core.borrow_mut().timers.pop_due(target);
            let Some(task) = due else {
                break;
            };
            self.core.borrow_mut().queue.push(task);
            self.drain(&mut ran)?;
        }
        self.core.borrow_mut().timers.advance_to(target);
        tracing::trace!(now = target, tasks = ran, "clock advanced");
        Ok(ran)
    }

    /// Number of futures ever created on this runtime.
    pub fn future_count(&self) -> usize {
        self.core.borrow().arena.len()
    }

    pub fn status(&self, id: FutureId) -> Option<Status> {
        self.core.borrow().arena.status(id)
    }

    /// Continuations still waiting on the future `id`.
    pub fn waiting(&self, id: FutureId) -> usize {
        self.core.borrow().arena.waiting(id)
    }

    /// Rejected futures that never had a continuation attached.
    pub fn unhandled_rejections(&self) -> Vec<FutureId> {
        self.core.borrow().arena.unhandled_rejections()
    }

    fn drain(&self, ran: &mut usize) -> Result<(), Error> {
        let budget = self.core.borrow().config.drain_budget;
        loop {
            if let Some(budget) = budget {
                if *ran >= budget && self.pending_tasks() > 0 {
                    tracing::warn!(budget, pending = self.pending_tasks(), "drain budget exhausted");
                    return Err(Error::DrainBudgetExhausted { budget });
                }
            }
            if !self.turn() {
                return Ok(());
            }
            *ran += 1;
        }
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            core: Rc::downgrade(&self.core),
        }
    }

    pub(crate) fn with_core<R>(&self, f: impl FnOnce(&mut Core) -> R) -> R {
        f(&mut *self.core.borrow_mut())
    }

    pub(crate) fn alloc<T: Clone + 'static, E: Clone + 'static>(&self) -> FutureId {
        let id = self.core.borrow_mut().arena.alloc::<T, E>();
        tracing::trace!(future = %id, "future created");
        id
    }

    pub(crate) fn with_slot<T: 'static, E: 'static, R>(
        &self,
        id: FutureId,
        f: impl FnOnce(&mut Slot<T, E>) -> R,
    ) -> Option<R> {
        let mut core = self.core.borrow_mut();
        match core.arena.get_mut::<T, E>(id) {
            Some(slot) => Some(f(slot)),
            None => {
                tracing::warn!(future = %id, "unknown future");
                None
            }
        }
    }

    /// Settles `id` as fulfilled and queues its continuations.
    pub(crate) fn fulfill<T: Clone + 'static, E: Clone + 'static>(&self, id: FutureId, value: T) {
        let tasks = self.with_slot::<T, E, _>(id, |slot| slot.fulfill(value));
        self.enqueue_settlement(id, Status::Fulfilled, tasks.flatten());
    }

    /// Settles `id` as rejected and queues its continuations.
    pub(crate) fn reject<T: Clone + 'static, E: Clone + 'static>(&self, id: FutureId, reason: E) {
        let tasks = self.with_slot::<T, E, _>(id, |slot| slot.reject(reason));
        self.enqueue_settlement(id, Status::Rejected, tasks.flatten());
    }

    fn enqueue_settlement(&self, id: FutureId, status: Status, tasks: Option<Vec<Task>>) {
        let Some(tasks) = tasks else {
            tracing::trace!(future = %id, %status, "already settled, ignored");
            return;
        };
        tracing::trace!(future = %id, %status, continuations = tasks.len(), "settled");
        let mut core = self.core.borrow_mut();
        for task in tasks {
            core.queue.push(task);
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.core.try_borrow() {
            Ok(core) => f
                .debug_struct("Runtime")
                .field("arena", &core.arena)
                .field("queue", &core.queue)
                .field("timers", &core.timers)
                .finish(),
            Err(_) => f.write_str("Runtime { <busy> }"),
        }
    }
}
