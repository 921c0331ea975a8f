//! Thread-affinity marker for security code.
//!
//! Permission checkers and identity providers declare whether they need a
//! blocking-capable worker context. The dispatcher runs them inside a scope
//! that records what the current context allows, and the code under that scope
//! can observe it through [`is_blocking_allowed`].

use std::future::Future;

use serde::{Deserialize, Serialize};

tokio::task_local! {
    static BLOCKING_ALLOWED: bool;
}

/// Where a piece of security code must run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionAffinity {
    /// On the request's original, non-blocking execution context.
    #[default]
    NonBlocking,
    /// On a worker that is allowed to block.
    Blocking,
}

impl ExecutionAffinity {
    #[must_use]
    pub fn allows_blocking(self) -> bool {
        matches!(self, Self::Blocking)
    }
}

/// Whether the current scope is allowed to block. `false` outside any scope.
#[must_use]
pub fn is_blocking_allowed() -> bool {
    BLOCKING_ALLOWED.try_with(|allowed| *allowed).unwrap_or(false)
}

/// Run `fut` with the blocking marker set to `allowed`.
pub async fn scope<F: Future>(allowed: bool, fut: F) -> F::Output {
    BLOCKING_ALLOWED.scope(allowed, fut).await
}

/// Run `f` synchronously with the blocking marker set to `allowed`.
pub fn sync_scope<R>(allowed: bool, f: impl FnOnce() -> R) -> R {
    BLOCKING_ALLOWED.sync_scope(allowed, f)
}

/// A blocking worker could not run or finish the task.
#[derive(Debug, thiserror::Error)]
#[error("blocking worker failed: {0}")]
pub struct WorkerError(String);

/// Run the future produced by `task` on the context `affinity` requires.
///
/// Non-blocking work is polled inline with the marker cleared. Blocking work
/// moves to a tokio blocking worker and is driven there with the marker set.
///
/// # Errors
///
/// Returns [`WorkerError`] if no runtime is available or the worker panicked.
pub async fn run_on<F, Fut, T>(affinity: ExecutionAffinity, task: F) -> Result<T, WorkerError>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = T>,
    T: Send + 'static,
{
    match affinity {
        ExecutionAffinity::NonBlocking => Ok(scope(false, task()).await),
        ExecutionAffinity::Blocking => {
            let handle =
                tokio::runtime::Handle::try_current().map_err(|e| WorkerError(e.to_string()))?;
            tokio::task::spawn_blocking(move || sync_scope(true, || handle.block_on(task())))
                .await
                .map_err(|e| WorkerError(e.to_string()))
        }
    }
}
