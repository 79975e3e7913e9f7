//! The single cooperative task queue. Every continuation runs from here,
//! never from the stack frame that scheduled it.
use std::collections::VecDeque;
use std::fmt;

use crate::Runtime;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce(&Runtime)>;

/// Strict FIFO queue of deferred tasks.
pub struct TaskQueue {
    tasks: VecDeque<Task>,
}

impl TaskQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tasks: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, task: Task) {
        self.tasks.push_back(task);
        tracing::trace!(pending = self.tasks.len(), "task queued");
    }

    pub fn pop(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.tasks.len())
            .finish()
    }
}
