//! Bridge from synchronous call sites to the async cache
//!
//! Work is handed to a dedicated multi-thread runtime and the caller waits on a
//! completion channel. The caller's own executor never has to drive the
//! operation, so a stalled caller cannot starve it.

use std::future::Future;
use std::sync::mpsc;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, info};

use crate::domain::DomainError;

const THREAD_NAME: &str = "fleet-cache-worker";

/// Owns the worker runtime used by blocking cache calls
#[derive(Debug)]
pub struct BlockingBridge {
    runtime: Option<Runtime>,
    handle: Handle,
    workers: usize,
}

impl BlockingBridge {
    /// Starts a runtime with `workers` threads (at least one)
    pub fn new(workers: usize) -> Result<Self, DomainError> {
        let workers = workers.max(1);

        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name(THREAD_NAME)
            .enable_all()
            .build()
            .map_err(|e| {
                DomainError::internal(format!("Failed to start blocking worker runtime: {}", e))
            })?;

        let handle = runtime.handle().clone();
        debug!(workers, "Blocking worker runtime started");

        Ok(Self {
            runtime: Some(runtime),
            handle,
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Handle for spawning work onto the worker runtime
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Runs `future` on the workers and blocks the calling thread until it settles
    ///
    /// Must not be called from a task already running on this bridge's workers.
    pub fn run<F, T>(&self, future: F) -> Result<T, DomainError>
    where
        F: Future<Output = Result<T, DomainError>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);

        self.handle.spawn(async move {
            // The caller only goes away if it panicked; nothing to report then.
            let _ = tx.send(future.await);
        });

        rx.recv().map_err(|_| {
            DomainError::internal("Blocking worker dropped the operation before it settled")
        })?
    }

    /// Runs `future` on the workers and awaits it from another runtime
    pub async fn spawn<F, T>(&self, future: F) -> Result<T, DomainError>
    where
        F: Future<Output = Result<T, DomainError>> + Send + 'static,
        T: Send + 'static,
    {
        self.handle
            .spawn(future)
            .await
            .map_err(|e| DomainError::internal(format!("Blocking worker task failed: {}", e)))?
    }

    /// Stops the worker runtime without waiting for in-flight work
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            // shutdown_background never blocks, so this is safe inside async code
            runtime.shutdown_background();
            info!("Blocking worker runtime stopped");
        }
    }
}

impl Drop for BlockingBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_run_returns_value() {
        let bridge = BlockingBridge::new(1).unwrap();

        let value = bridge
            .run(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(42)
            })
            .unwrap();

        assert_eq!(value, 42);
    }

    #[test]
    fn test_run_propagates_error() {
        let bridge = BlockingBridge::new(1).unwrap();

        let err = bridge
            .run(async { Err::<(), _>(DomainError::store_unavailable("down")) })
            .unwrap_err();

        assert!(err.is_store_unavailable());
    }

    #[test]
    fn test_run_reports_panicked_operation() {
        let bridge = BlockingBridge::new(1).unwrap();

        let result = bridge.run(async {
            if true {
                panic!("operation blew up");
            }
            Ok(())
        });

        assert!(matches!(result, Err(DomainError::Internal { .. })));
    }

    #[test]
    fn test_zero_workers_is_clamped() {
        let bridge = BlockingBridge::new(0).unwrap();
        assert_eq!(bridge.workers(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_run_from_single_threaded_runtime_does_not_deadlock() {
        let bridge = BlockingBridge::new(1).unwrap();

        // Blocks the only thread of the test runtime; the bridge still completes.
        let value = bridge
            .run(async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok("done")
            })
            .unwrap();

        assert_eq!(value, "done");
    }

    #[tokio::test]
    async fn test_spawn_awaits_across_runtimes() {
        let bridge = BlockingBridge::new(2).unwrap();

        let value = bridge.spawn(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_drop_inside_async_context() {
        let bridge = BlockingBridge::new(1).unwrap();
        drop(bridge);
    }
}
