//! Background worker capability.

use std::future::Future;
use std::sync::Mutex;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{BoxError, Error};
use crate::server::ready::ReadySignal;

const MODULE: &str = "worker";

/// Error returned by a failing worker task.
pub type TaskError = BoxError;

/// A unit of long-running work. Each task receives a child cancellation
/// token and should exit promptly once it is cancelled; the pool never
/// forcibly kills tasks that ignore cancellation.
pub type WorkerTaskFn = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<(), TaskError>> + Send>;

/// A terminal task failure, identified by the task's ordinal in the list
/// passed to [`WorkerPool::start`].
#[derive(Debug)]
pub struct TaskFailure {
    pub task: usize,
    pub error: TaskError,
}

/// Wraps an async closure into a [`WorkerTaskFn`].
pub fn task<F, Fut>(f: F) -> WorkerTaskFn
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    Box::new(move |cancel| Box::pin(f(cancel)))
}

/// The worker pool capability.
///
/// Tasks run concurrently under one shared cancellation token. Task errors
/// are observational: they are logged, queued on the failure channel, and
/// never abort sibling tasks or make `start` return early.
pub struct WorkerPool {
    started: Mutex<bool>,
    cancel: CancellationToken,

    ready: ReadySignal,
    failure_tx: mpsc::UnboundedSender<TaskFailure>,
    failure_rx: Mutex<Option<mpsc::UnboundedReceiver<TaskFailure>>>,
}

impl WorkerPool {
    pub fn new() -> Self {
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        Self {
            started: Mutex::new(false),
            cancel: CancellationToken::new(),
            ready: ReadySignal::new(),
            failure_tx,
            failure_rx: Mutex::new(Some(failure_rx)),
        }
    }

    /// Launches every task concurrently, signals readiness once all of them
    /// are scheduled, and blocks until every task has returned.
    ///
    /// Task errors are delivered onto the failure channel and do not abort
    /// siblings; `start` always waits for the full drain. A panicking task is
    /// isolated by the join set and logged. A second `start` is an
    /// [`Error::AlreadyStarted`].
    pub async fn start(&self, tasks: Vec<WorkerTaskFn>) -> Result<(), Error> {
        {
            let mut started = self.started.lock().unwrap();
            if *started {
                return Err(Error::AlreadyStarted { module: MODULE });
            }
            *started = true;
        }

        let mut join_set = JoinSet::new();
        for (ordinal, task) in tasks.into_iter().enumerate() {
            let cancel = self.cancel.child_token();
            let failures = self.failure_tx.clone();

            join_set.spawn(async move {
                tracing::debug!(task = ordinal, "worker task started");
                match task(cancel).await {
                    Ok(()) => tracing::debug!(task = ordinal, "worker task finished"),
                    Err(error) => {
                        tracing::warn!(task = ordinal, error = %error, "worker task failed");
                        let _ = failures.send(TaskFailure {
                            task: ordinal,
                            error,
                        });
                    }
                }
            });
        }

        tracing::info!(tasks = join_set.len(), "starting worker pool");
        self.ready.signal();

        while let Some(joined) = join_set.join_next().await {
            if let Err(error) = joined {
                // A panicked task lands here; siblings keep running.
                tracing::error!(error = %error, "worker task aborted");
            }
        }

        Ok(())
    }

    /// Signals all tasks to stop by cancelling the shared token.
    ///
    /// Does not wait for task completion — that happens inside the blocking
    /// `start` call. Idempotent, and safe before `start`.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// A signal that fires once all tasks have been scheduled.
    pub fn ready(&self) -> ReadySignal {
        self.ready.clone()
    }

    /// Takes the failure channel. The first task error is always observable;
    /// later ones stay queued until consumed. Returns `None` after the first
    /// call.
    pub fn failures(&self) -> Option<mpsc::UnboundedReceiver<TaskFailure>> {
        self.failure_rx.lock().unwrap().take()
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}
