//! Single-lane task queue.
//!
//! Named async operations run one at a time, strictly in the order they were
//! enqueued. Each task waits on the completion gate of the task enqueued
//! before it, so ordering holds even when an earlier task is cancelled: a
//! cancelled task still takes its turn and resolves as cancelled instead of
//! invoking its operation.

use crate::error::{Result, WizardError};
use crate::fault::panic_message;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Default rejection message for cancelled tasks.
pub const DEFAULT_CANCEL_REASON: &str = "Canceled";

/// Selects pending tasks by operation name.
#[derive(Debug, Clone, Copy)]
pub enum TaskFilter<'a> {
    All,
    Names(&'a [&'a str]),
}

impl TaskFilter<'_> {
    fn matches(&self, name: &str) -> bool {
        match self {
            TaskFilter::All => true,
            TaskFilter::Names(names) => names.contains(&name),
        }
    }
}

#[derive(Debug)]
struct PendingTask {
    name: &'static str,
    cancel: Option<String>,
    started: bool,
}

#[derive(Default)]
struct QueueState {
    /// Gate released when the most recently enqueued task finishes.
    tail: Option<oneshot::Receiver<()>>,
    /// Tasks that have not resolved yet, including the running one.
    pending: HashMap<Uuid, PendingTask>,
}

/// Serializes named async operations on the tokio runtime.
#[derive(Clone, Default)]
pub struct TaskQueue {
    state: Arc<Mutex<QueueState>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `op` under `name`. The task is spawned immediately and runs as
    /// soon as every previously enqueued task has finished; the returned
    /// handle does not have to be polled for the queue to make progress.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue<T, F, Fut>(&self, name: &'static str, op: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let (gate_tx, gate_rx) = oneshot::channel::<()>();
        let previous = {
            let mut state = self.state.lock();
            state.pending.insert(
                id,
                PendingTask {
                    name,
                    cancel: None,
                    started: false,
                },
            );
            state.tail.replace(gate_rx)
        };
        tracing::debug!("TaskQueue.enqueue: task={} id={}", name, id);

        let queue = self.clone();
        let join = tokio::spawn(async move {
            if let Some(previous) = previous {
                // A dropped sender (finished or panicked task) also opens the gate.
                let _ = previous.await;
            }
            let _turn = Turn {
                queue: queue.clone(),
                id,
                _gate: gate_tx,
            };
            if let Some(reason) = queue.begin(id) {
                tracing::debug!("TaskQueue: task {} canceled: {}", name, reason);
                return Err(WizardError::Cancelled { task: name, reason });
            }
            op().await
        });

        TaskHandle { name, join }
    }

    /// Mark every matching task that has not started yet as cancelled.
    /// Returns the number of tasks marked.
    pub fn cancel_pending(&self, filter: TaskFilter<'_>, reason: impl Into<String>) -> usize {
        let reason = reason.into();
        let mut state = self.state.lock();
        let mut cancelled = 0;
        for task in state.pending.values_mut() {
            if task.started || !filter.matches(task.name) {
                continue;
            }
            task.cancel = Some(reason.clone());
            cancelled += 1;
        }
        if cancelled > 0 {
            tracing::debug!("TaskQueue.cancel_pending: {} task(s) canceled: {}", cancelled, reason);
        }
        cancelled
    }

    /// True if any unresolved task (running or waiting) has one of `names`.
    pub fn has_pending(&self, names: &[&str]) -> bool {
        let state = self.state.lock();
        state.pending.values().any(|task| names.contains(&task.name))
    }

    /// True while at least one task is waiting or running.
    pub fn is_busy(&self) -> bool {
        !self.state.lock().pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Called when the task reaches the head of the queue. Returns the
    /// cancellation reason if the task was cancelled while waiting.
    fn begin(&self, id: Uuid) -> Option<String> {
        let mut state = self.state.lock();
        let task = state.pending.get_mut(&id)?;
        if let Some(reason) = task.cancel.take() {
            return Some(reason);
        }
        task.started = true;
        None
    }

    fn complete(&self, id: Uuid) {
        let mut state = self.state.lock();
        if let Some(task) = state.pending.remove(&id) {
            if state.pending.is_empty() {
                tracing::debug!("TaskQueue: last task resolved: {}", task.name);
            } else {
                tracing::debug!("TaskQueue: task resolved: {}", task.name);
            }
        }
    }
}

/// Held for the duration of a task's turn. Dropping it (normally or during
/// a panic unwind) removes the pending entry and then opens the gate for the
/// next task.
struct Turn {
    queue: TaskQueue,
    id: Uuid,
    _gate: oneshot::Sender<()>,
}

impl Drop for Turn {
    fn drop(&mut self) {
        self.queue.complete(self.id);
    }
}

/// Resolves to the outcome of a queued task.
pub struct TaskHandle<T> {
    name: &'static str,
    join: JoinHandle<Result<T>>,
}

impl<T> TaskHandle<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let task = self.name;
        match Pin::new(&mut self.join).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(err)) => {
                let message = if err.is_panic() {
                    panic_message(err.into_panic().as_ref())
                } else {
                    err.to_string()
                };
                Poll::Ready(Err(WizardError::TaskPanicked { task, message }))
            }
        }
    }
}
