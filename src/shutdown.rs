//! Stop coordination for background triggers.
//!
//! Every background task registers here before it starts and receives a
//! [`StopSignal`]. [`ShutdownCoordinator::initiate`] requests the stop, then
//! waits for every registered task to finish its current unit of work and
//! exit. Only after that may the caller release shared resources.

use std::future::Future;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Stopping,
    Stopped,
}

/// Kinds of background task the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    FileWatcher,
    UpdatePoller,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileWatcher => f.write_str("file-watcher"),
            Self::UpdatePoller => f.write_str("update-poller"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ShutdownError {
    #[error("Shutdown requested, {0} not started")]
    NotAccepting(TaskKind),
}

/// Result of a stop request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that were running when the stop was requested.
    pub requested: usize,
    /// Tasks that exited cleanly after the request.
    pub acknowledged: usize,
}

/// Stop request as seen by a background task.
#[derive(Debug, Clone)]
pub struct StopSignal {
    token: CancellationToken,
}

impl StopSignal {
    /// Resolves once a stop has been requested.
    pub async fn requested(&self) {
        self.token.cancelled().await
    }

    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }
}

struct RegisteredTask {
    kind: TaskKind,
    handle: JoinHandle<()>,
}

struct Inner {
    state: ShutdownState,
    tasks: Vec<RegisteredTask>,
    registered: usize,
}

/// Sequences background-task exit ahead of resource teardown.
pub struct ShutdownCoordinator {
    inner: Mutex<Inner>,
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { state: ShutdownState::Running, tasks: Vec::new(), registered: 0 }),
            token: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ShutdownState {
        self.inner.lock().state
    }

    /// Whether new background tasks may still be registered.
    pub fn is_accepting(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Registered tasks that have not exited yet.
    pub fn active_tasks(&self) -> usize {
        self.inner
            .lock()
            .tasks
            .iter()
            .filter(|t| !t.handle.is_finished())
            .count()
    }

    /// Tasks started over the coordinator's lifetime, including those that already exited.
    pub fn registered_tasks(&self) -> usize {
        self.inner.lock().registered
    }

    /// Register and start a background task.
    ///
    /// Registration and spawn happen under one lock, so a task is either
    /// counted by a later [`initiate`](Self::initiate) or never started.
    /// Must be called within a tokio runtime.
    pub fn spawn<F, Fut>(&self, kind: TaskKind, task: F) -> Result<(), ShutdownError>
    where
        F: FnOnce(StopSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.inner.lock();
        if inner.state != ShutdownState::Running {
            return Err(ShutdownError::NotAccepting(kind));
        }
        let signal = StopSignal { token: self.token.child_token() };
        let handle = tokio::spawn(task(signal));
        inner.tasks.push(RegisteredTask { kind, handle });
        inner.registered += 1;
        tracing::debug!(task = %kind, "background task started");
        Ok(())
    }

    /// Request a stop and wait until every registered task has exited.
    ///
    /// There is no timeout: tasks complete in-flight work before exiting.
    /// Calls after the first return an empty report.
    pub async fn initiate(&self) -> ShutdownReport {
        let tasks = {
            let mut inner = self.inner.lock();
            if inner.state != ShutdownState::Running {
                return ShutdownReport { requested: 0, acknowledged: 0 };
            }
            inner.state = ShutdownState::Stopping;
            std::mem::take(&mut inner.tasks)
        };

        let requested = tasks.len();
        self.token.cancel();

        let mut acknowledged = 0;
        for task in tasks {
            match task.handle.await {
                Ok(()) => {
                    acknowledged += 1;
                    tracing::debug!(task = %task.kind, "background task acknowledged stop");
                }
                Err(e) => {
                    tracing::warn!(task = %task.kind, error = %e, "background task ended abnormally");
                }
            }
        }

        self.inner.lock().state = ShutdownState::Stopped;
        ShutdownReport { requested, acknowledged }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ShutdownCoordinator {
    fn drop(&mut self) {
        // tasks of an engine dropped without stop still wind down
        self.token.cancel();
    }
}
