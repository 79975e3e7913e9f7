/// Knobs for a [`Runtime`](crate::Runtime).
///
/// ```
/// use promise_aplus::{Runtime, RuntimeConfig};
/// let runtime = Runtime::with_config(RuntimeConfig::default().with_drain_budget(10_000));
/// assert_eq!(runtime.config().drain_budget, Some(10_000));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Upper bound on tasks run by one `run_until_idle` or `advance` call.
    /// `None` drains until the queue is empty.
    pub drain_budget: Option<usize>,
    /// Initial capacity of the task queue.
    pub queue_capacity: usize,
}

impl RuntimeConfig {
    pub fn with_drain_budget(mut self, budget: usize) -> Self {
        self.drain_budget = Some(budget);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            drain_budget: None,
            queue_capacity: 64,
        }
    }
}
