//! Concurrent fan-out with per-task outcome capture
//!
//! Every spawned task runs to completion. A failing or panicking task yields
//! a [`TaskFailure`] in its own slot and never cancels its siblings.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;

use tokio::task::{Id, JoinError, JoinSet};
use tracing::warn;

/// Why a task produced no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    Panicked(String),
    Cancelled,
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Panicked(message) => write!(f, "task panicked: {message}"),
            Self::Cancelled => f.write_str("task cancelled"),
        }
    }
}

/// Outcome of one task, in spawn order.
#[derive(Debug)]
pub struct TaskOutcome<T> {
    pub label: String,
    pub result: Result<T, TaskFailure>,
}

/// Explicit group of independent tasks.
///
/// ```rust
/// use busysync_common::resilience::TaskGroup;
///
/// # async fn example() {
/// let mut group = TaskGroup::new();
/// group.spawn("a", async { 1 });
/// group.spawn("b", async { 2 });
/// let values: Vec<i32> =
///     group.join_all().await.into_iter().filter_map(|o| o.result.ok()).collect();
/// assert_eq!(values, vec![1, 2]);
/// # }
/// ```
pub struct TaskGroup<T> {
    set: JoinSet<T>,
    slots: HashMap<Id, (usize, String)>,
}

impl<T: Send + 'static> Default for TaskGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> TaskGroup<T> {
    pub fn new() -> Self {
        Self { set: JoinSet::new(), slots: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Spawn `task` under `label`. Outcomes are reported in spawn order.
    pub fn spawn<F>(&mut self, label: impl Into<String>, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let index = self.slots.len();
        let handle = self.set.spawn(task);
        self.slots.insert(handle.id(), (index, label.into()));
    }

    /// Wait for every task and return their outcomes in spawn order.
    pub async fn join_all(mut self) -> Vec<TaskOutcome<T>> {
        let mut outcomes: Vec<(usize, TaskOutcome<T>)> = Vec::with_capacity(self.slots.len());

        while let Some(joined) = self.set.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, value)) => (id, Ok(value)),
                Err(err) => (err.id(), Err(failure_from(err))),
            };
            let (index, label) = self.slots.remove(&id).unwrap_or((usize::MAX, String::new()));
            if let Err(failure) = &result {
                warn!(task = %label, error = %failure, "Task in group failed");
            }
            outcomes.push((index, TaskOutcome { label, result }));
        }

        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }
}

fn failure_from(err: JoinError) -> TaskFailure {
    if err.is_panic() {
        TaskFailure::Panicked(panic_message(err.into_panic()))
    } else {
        TaskFailure::Cancelled
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn outcomes_follow_spawn_order() {
        let mut group = TaskGroup::new();
        group.spawn("slow", async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            1
        });
        group.spawn("fast", async { 2 });

        let outcomes = group.join_all().await;
        let labels: Vec<_> = outcomes.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["slow", "fast"]);
        assert_eq!(outcomes[0].result, Ok(1));
        assert_eq!(outcomes[1].result, Ok(2));
    }

    #[tokio::test]
    async fn panic_is_isolated() {
        let mut group: TaskGroup<Result<u32, String>> = TaskGroup::new();
        group.spawn("ok", async { Ok(5) });
        group.spawn("err", async { Err("network down".to_string()) });
        group.spawn("panic", async { panic!("adapter bug") });

        let outcomes = group.join_all().await;
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].result, Ok(Ok(5)));
        assert_eq!(outcomes[1].result, Ok(Err("network down".to_string())));
        assert_eq!(outcomes[2].result, Err(TaskFailure::Panicked("adapter bug".to_string())));
    }

    #[tokio::test]
    async fn empty_group_joins_immediately() {
        let group: TaskGroup<()> = TaskGroup::new();
        assert!(group.is_empty());
        assert!(group.join_all().await.is_empty());
    }
}
