//! Fan-out/fan-in over independent expert tasks.
//!
//! Every task runs in its own Tokio task against a shared read-only context.
//! A task failure (error or panic) never affects its siblings.
//! Results come back in input order regardless of completion order.

use crew_domain::{
    ExpertId, ExpertTaskDescriptor, ExpertTaskResult, ExternalFailure, TaskFailureNote, TaskId,
};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One task that did not produce a result
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFailure {
    /// Position of the task in the input
    pub index: usize,
    pub task_id: TaskId,
    pub expert: ExpertId,
    pub cause: ExternalFailure,
}

impl TaskFailure {
    pub fn to_note(&self) -> TaskFailureNote {
        TaskFailureNote {
            task_id: self.task_id.clone(),
            expert: self.expert.clone(),
            cause: self.cause.message().to_string(),
        }
    }
}

/// Some tasks succeeded, some failed
#[derive(Debug, Clone, PartialEq)]
pub struct PartialFailure {
    /// Successful results, in input order
    pub results: Vec<ExpertTaskResult>,
    /// Failures, in input order
    pub failures: Vec<TaskFailure>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FanOutError {
    #[error("{} of {} expert tasks failed", .0.failures.len(), .0.failures.len() + .0.results.len())]
    Partial(PartialFailure),

    #[error("All {} expert tasks failed", .failures.len())]
    Total { failures: Vec<TaskFailure> },

    #[error("Fan-out cancelled")]
    Cancelled,
}

/// Runs expert tasks concurrently with a bounded width.
///
/// Imposes no deadline of its own; callers bound slow tasks inside the
/// worker or through the cancellation token.
#[derive(Debug, Clone)]
pub struct FanOutExecutor {
    max_parallel: usize,
}

impl Default for FanOutExecutor {
    fn default() -> Self {
        Self::new(5)
    }
}

impl FanOutExecutor {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
        }
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Run `worker` once per task and collect every outcome.
    ///
    /// Returns all results when every task succeeds,
    /// [`FanOutError::Partial`] when some fail and [`FanOutError::Total`]
    /// when all fail. Cancellation aborts every in-flight task.
    pub async fn run_all<C, W, Fut>(
        &self,
        tasks: Vec<ExpertTaskDescriptor>,
        context: Arc<C>,
        worker: W,
        cancel: &CancellationToken,
    ) -> Result<Vec<ExpertTaskResult>, FanOutError>
    where
        C: Send + Sync + 'static,
        W: Fn(ExpertTaskDescriptor, Arc<C>) -> Fut,
        Fut: Future<Output = Result<ExpertTaskResult, ExternalFailure>> + Send + 'static,
    {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }
        if cancel.is_cancelled() {
            return Err(FanOutError::Cancelled);
        }

        info!(tasks = tasks.len(), max_parallel = self.max_parallel, "Fanning out expert tasks");

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut slots: Vec<Option<Result<ExpertTaskResult, ExternalFailure>>> =
            vec![None; tasks.len()];
        let identities: Vec<(TaskId, ExpertId)> = tasks
            .iter()
            .map(|t| (t.id.clone(), t.expert.clone()))
            .collect();

        let mut join_set = JoinSet::new();
        for (index, task) in tasks.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let expert = task.expert.clone();
            let work = worker(task, Arc::clone(&context));

            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, Err(ExternalFailure::terminal("executor shut down")));
                };
                let result = AssertUnwindSafe(work)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(ExternalFailure::terminal(format!("{} evaluation panicked", expert)))
                    });
                (index, result)
            });
        }

        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    join_set.abort_all();
                    warn!("Fan-out cancelled, aborted in-flight expert tasks");
                    return Err(FanOutError::Cancelled);
                }
                joined = join_set.join_next() => joined,
            };

            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok((index, outcome)) => {
                    debug!(index, ok = outcome.is_ok(), "Expert task finished");
                    slots[index] = Some(outcome);
                }
                Err(e) => {
                    // Only reachable through abort; panics are caught inside the task
                    warn!("Expert task join error: {}", e);
                }
            }
        }

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for (index, (slot, (task_id, expert))) in slots.into_iter().zip(identities).enumerate() {
            match slot {
                Some(Ok(result)) => results.push(result),
                Some(Err(cause)) => failures.push(TaskFailure {
                    index,
                    task_id,
                    expert,
                    cause,
                }),
                None => failures.push(TaskFailure {
                    index,
                    task_id,
                    expert,
                    cause: ExternalFailure::terminal("expert task did not complete"),
                }),
            }
        }

        if failures.is_empty() {
            info!(results = results.len(), "All expert tasks succeeded");
            Ok(results)
        } else if results.is_empty() {
            warn!(failed = failures.len(), "Every expert task failed");
            Err(FanOutError::Total { failures })
        } else {
            warn!(
                succeeded = results.len(),
                failed = failures.len(),
                "Expert fan-out partially failed"
            );
            Err(FanOutError::Partial(PartialFailure { results, failures }))
        }
    }
}
