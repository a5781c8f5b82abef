//! Bounded-concurrency dispatcher shared by all chains in the process.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, PartialEq)]
pub enum PoolError {
    #[error("worker pool is shut down")]
    ShutDown,
}

/// A worker pool with a fixed concurrency cap. Submitted tasks start
/// immediately while under the cap and queue until capacity frees otherwise.
/// The pool owns no message data, only scheduling; it is cheap to clone and
/// safe to share across every chain in the process.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// A pool running at most `max_tasks` tasks concurrently.
    pub fn new(max_tasks: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_tasks.clamp(1, Semaphore::MAX_PERMITS))),
            shutdown: CancellationToken::new(),
        }
    }

    /// The default pool: an effectively unbounded cap, every submission
    /// starts immediately.
    pub fn unbounded() -> Self {
        Self::new(Semaphore::MAX_PERMITS)
    }

    /// Submit a task. Returns an error if the pool has been shut down; the
    /// task itself runs once a permit is available.
    pub fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return Err(PoolError::ShutDown);
        }
        let semaphore = self.semaphore.clone();
        tokio::spawn(async move {
            // acquire fails only when the pool shut down while we queued
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            task.await;
        });
        Ok(())
    }

    /// Shut the pool down. Queued tasks that have not started yet are
    /// dropped; submitting afterwards is an error. The pool is never
    /// restarted.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.semaphore.close();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::unbounded()
    }
}
