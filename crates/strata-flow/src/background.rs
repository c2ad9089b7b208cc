//! Background work with an observable result.
//!
//! Pipelines and teardowns outlive the request that started them. Each one
//! is spawned on the runtime and paired with a [`WorkHandle`]; failures are
//! also kept in the registry so they stay visible when nobody awaits the
//! handle.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{Instrument, error};

use crate::error::{Error, Result};

/// A failed piece of background work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkFailure {
    /// Name the work was spawned under.
    pub name: String,
    /// Rendered error.
    pub message: String,
}

/// Failures kept for inspection; older ones are dropped first.
pub const MAX_RECORDED_FAILURES: usize = 256;

#[derive(Debug, Default)]
struct Registry {
    running: Vec<JoinHandle<()>>,
    failures: VecDeque<WorkFailure>,
}

impl Registry {
    fn record(&mut self, failure: WorkFailure) {
        if self.failures.len() == MAX_RECORDED_FAILURES {
            self.failures.pop_front();
        }
        self.failures.push_back(failure);
    }
}

/// Owner of all background work started by an orchestrator.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    registry: Arc<Mutex<Registry>>,
}

/// Result channel of one piece of background work.
#[derive(Debug)]
pub struct WorkHandle {
    name: String,
    result: oneshot::Receiver<Result<()>>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("background registry poisoned")
}

fn internal(message: String) -> Error {
    Error::Core(strata_core::Error::Internal { message })
}

impl BackgroundTasks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `work` and returns its handle.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry is poisoned.
    pub fn spawn<F>(&self, name: impl Into<String>, work: F) -> Result<WorkHandle>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let (tx, rx) = oneshot::channel();
        let registry = Arc::clone(&self.registry);
        let task_name = name.clone();
        let span = tracing::info_span!("background", work = %name);

        let join = tokio::spawn(
            async move {
                let result = work.await;
                if let Err(e) = &result {
                    error!(work = %task_name, error = %e, "background work failed");
                    if let Ok(mut registry) = registry.lock() {
                        registry.record(WorkFailure {
                            name: task_name.clone(),
                            message: e.to_string(),
                        });
                    }
                }
                // The handle may have been dropped; the failure is recorded above.
                let _ = tx.send(result);
            }
            .instrument(span),
        );

        let mut registry = self.registry.lock().map_err(poison_err)?;
        registry.running.retain(|handle| !handle.is_finished());
        registry.running.push(join);
        Ok(WorkHandle { name, result: rx })
    }

    /// Waits for all outstanding work, including work spawned meanwhile.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry is poisoned.
    pub async fn drain(&self) -> Result<()> {
        loop {
            let running = {
                let mut registry = self.registry.lock().map_err(poison_err)?;
                std::mem::take(&mut registry.running)
            };
            if running.is_empty() {
                return Ok(());
            }
            for handle in running {
                if let Err(e) = handle.await {
                    let mut registry = self.registry.lock().map_err(poison_err)?;
                    registry.record(WorkFailure {
                        name: "unknown".to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Returns the most recent failures, oldest first.
    ///
    /// At most [`MAX_RECORDED_FAILURES`] are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry is poisoned.
    pub fn failures(&self) -> Result<Vec<WorkFailure>> {
        let registry = self.registry.lock().map_err(poison_err)?;
        Ok(registry.failures.iter().cloned().collect())
    }

    /// Returns the recorded failures and clears them.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry is poisoned.
    pub fn take_failures(&self) -> Result<Vec<WorkFailure>> {
        let mut registry = self.registry.lock().map_err(poison_err)?;
        Ok(registry.failures.drain(..).collect())
    }
}

impl WorkHandle {
    /// A handle for work that finished synchronously.
    #[must_use]
    pub fn completed(name: impl Into<String>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Ok(()));
        Self {
            name: name.into(),
            result: rx,
        }
    }

    /// Returns the work's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for the work and returns its result.
    ///
    /// # Errors
    ///
    /// Returns the work's own error, or an internal error if the work
    /// panicked before reporting.
    pub async fn wait(self) -> Result<()> {
        self.result
            .await
            .map_err(|_| internal(format!("background work {} ended without a result", self.name)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handle_yields_the_work_result() {
        let tasks = BackgroundTasks::new();
        let ok = tasks.spawn("ok", async { Ok(()) }).unwrap();
        let bad = tasks
            .spawn("bad", async { Err(Error::conflict("nope")) })
            .unwrap();

        ok.wait().await.unwrap();
        assert!(matches!(bad.wait().await, Err(Error::Conflict { .. })));
        let failures = tasks.failures().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].name, "bad");
    }

    #[tokio::test]
    async fn drain_waits_for_dropped_handles() {
        let tasks = BackgroundTasks::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        drop(tasks.spawn("slow", async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            let _ = tx.send(());
            Ok(())
        }));
        tasks.drain().await.unwrap();
        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn failure_log_is_bounded_and_drained_on_take() {
        let tasks = BackgroundTasks::new();
        for i in 0..MAX_RECORDED_FAILURES + 10 {
            let handle = tasks
                .spawn(format!("job-{i}"), async { Err(Error::conflict("nope")) })
                .unwrap();
            let _ = handle.wait().await;
        }

        let failures = tasks.failures().unwrap();
        assert_eq!(failures.len(), MAX_RECORDED_FAILURES);
        assert_eq!(failures[0].name, "job-10");

        assert_eq!(tasks.take_failures().unwrap().len(), MAX_RECORDED_FAILURES);
        assert!(tasks.failures().unwrap().is_empty());
    }

    #[tokio::test]
    async fn completed_handle_is_ok() {
        let handle = WorkHandle::completed("noop");
        assert_eq!(handle.name(), "noop");
        handle.wait().await.unwrap();
    }
}
