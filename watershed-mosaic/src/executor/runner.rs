//! Bounded-parallelism task runner.
//!
//! Tasks are dispatched strictly by [`Priority`] (ties in submission order)
//! onto at most `max_parallel` concurrent slots. A task whose completion
//! check reports it as already done is skipped. The first failure stops
//! dispatch, aborts every in-flight task and is returned from
//! [`JobRunner::join`].

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use super::ExecutorError;

/// Boxed future of one task.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), ExecutorError>> + Send + 'static>>;

/// Dispatch priority. Higher values are dispatched first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Priority(pub i64);

impl Priority {
    pub const NORMAL: Priority = Priority(0);

    /// Priority for the item at `position` of an already ordered queue, so
    /// that earlier positions are dispatched first.
    pub fn from_position(position: usize) -> Self {
        Priority(-(position.min(i64::MAX as usize) as i64))
    }
}

/// A named unit of work.
pub struct Task {
    name: String,
    priority: Priority,
    work: Box<dyn FnOnce() -> TaskFuture + Send>,
    is_complete: Option<Box<dyn Fn() -> bool + Send>>,
}

impl Task {
    /// Creates a task. `work` is only called when the task is dispatched.
    pub fn new<F, Fut>(name: impl Into<String>, priority: Priority, work: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ExecutorError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            priority,
            work: Box::new(move || Box::pin(work()) as TaskFuture),
            is_complete: None,
        }
    }

    /// Adds a check consulted just before dispatch; returning true skips the
    /// task.
    pub fn with_completion_check<C>(mut self, check: C) -> Self
    where
        C: Fn() -> bool + Send + 'static,
    {
        self.is_complete = Some(Box::new(check));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }
}

struct Queued {
    seq: u64,
    task: Task,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then lower sequence number
        self.task
            .priority
            .cmp(&other.task.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Counts reported by a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerSummary {
    pub submitted: usize,
    pub executed: usize,
    pub skipped: usize,
    pub duration: Duration,
}

/// Runs submitted tasks with bounded parallelism.
pub struct JobRunner {
    max_parallel: usize,
    pending: BinaryHeap<Queued>,
    names: HashSet<String>,
    next_seq: u64,
    cancel: CancellationToken,
}

impl JobRunner {
    /// Creates a runner allowing `max_parallel` concurrent tasks (at least 1).
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
            pending: BinaryHeap::new(),
            names: HashSet::new(),
            next_seq: 0,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses an external token so the caller can stop dispatch.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Queues a task. Names must be unique within one runner.
    pub fn submit(&mut self, task: Task) -> Result<(), ExecutorError> {
        if !self.names.insert(task.name.clone()) {
            return Err(ExecutorError::DuplicateTask(task.name));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(Queued { seq, task });
        Ok(())
    }

    /// Dispatches every queued task and waits for all of them.
    ///
    /// Returns the first task error; remaining tasks are not started and
    /// running ones are aborted.
    pub async fn join(mut self) -> Result<RunnerSummary, ExecutorError> {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut in_flight: JoinSet<(String, Result<(), ExecutorError>)> = JoinSet::new();
        let mut summary = RunnerSummary {
            submitted: self.pending.len(),
            ..RunnerSummary::default()
        };
        let mut failure: Option<ExecutorError> = None;

        'dispatch: while let Some(Queued { task, .. }) = self.pending.pop() {
            if task.is_complete.as_ref().map(|check| check()).unwrap_or(false) {
                tracing::debug!(task = %task.name, "Already complete, skipping");
                summary.skipped += 1;
                continue;
            }

            let permit = loop {
                tokio::select! {
                    biased;

                    _ = self.cancel.cancelled() => {
                        failure = Some(ExecutorError::Cancelled);
                        break 'dispatch;
                    }

                    Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                        match settle(joined) {
                            Ok(()) => summary.executed += 1,
                            Err(e) => {
                                failure = Some(e);
                                break 'dispatch;
                            }
                        }
                    }

                    permit = semaphore.clone().acquire_owned() => {
                        match permit {
                            Ok(permit) => break permit,
                            Err(_) => {
                                failure = Some(ExecutorError::Cancelled);
                                break 'dispatch;
                            }
                        }
                    }
                }
            };

            tracing::debug!(task = %task.name, priority = task.priority.0, "Dispatching");
            let name = task.name;
            let future = (task.work)();
            in_flight.spawn(async move {
                let _permit = permit;
                (name, future.await)
            });
        }

        if failure.is_none() {
            while !in_flight.is_empty() {
                tokio::select! {
                    biased;

                    _ = self.cancel.cancelled() => {
                        failure = Some(ExecutorError::Cancelled);
                        break;
                    }

                    Some(joined) = in_flight.join_next() => {
                        if let Err(e) = settle(joined) {
                            failure = Some(e);
                            break;
                        }
                        summary.executed += 1;
                    }
                }
            }
        }

        if let Some(error) = failure {
            self.cancel.cancel();
            let aborted = in_flight.len();
            in_flight.abort_all();
            while in_flight.join_next().await.is_some() {}
            tracing::error!(
                error = %error,
                aborted,
                not_started = self.pending.len(),
                "Run stopped"
            );
            return Err(error);
        }

        summary.duration = started.elapsed();
        Ok(summary)
    }
}

fn settle(joined: Result<(String, Result<(), ExecutorError>), JoinError>) -> Result<(), ExecutorError> {
    match joined {
        Ok((_, Ok(()))) => Ok(()),
        Ok((name, Err(e))) => {
            tracing::error!(task = %name, error = %e, "Task failed");
            Err(e)
        }
        Err(e) => Err(ExecutorError::TaskPanicked {
            name: "unknown".to_string(),
            message: e.to_string(),
        }),
    }
}
