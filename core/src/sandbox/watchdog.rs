use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::worker::WorkerHandle;
use super::SandboxLimits;
use crate::error::{PipelineError, PipelineResult};
use crate::types::{ExecutionMessage, ExecutionRequest};

/// Time-bounded access to the sandbox.
///
/// Owns the current [`WorkerHandle`] and replaces it wholesale whenever a run
/// exceeds its budget or the worker dies. At most one run is in flight:
/// `run` borrows the watchdog mutably.
pub struct Watchdog {
    worker: WorkerHandle,
    limits: SandboxLimits,
}

impl Watchdog {
    pub fn new(limits: SandboxLimits) -> PipelineResult<Self> {
        let worker = WorkerHandle::spawn(limits.clone())?;
        Ok(Self { worker, limits })
    }

    /// Id of the worker currently serving runs
    pub fn worker_id(&self) -> Uuid {
        self.worker.id()
    }

    /// Run `script`, giving up after `budget`.
    ///
    /// A run that outlives its budget yields exactly one
    /// [`ExecutionMessage::Timeout`]; the worker is replaced before this
    /// returns so the next run starts on a fresh thread.
    pub async fn run(
        &mut self,
        script: impl Into<String>,
        budget: Duration,
    ) -> PipelineResult<Vec<ExecutionMessage>> {
        let execution_id = Uuid::new_v4();
        let request = ExecutionRequest {
            script: script.into(),
        };

        let reply = match self.worker.submit(execution_id, request) {
            Ok(reply) => reply,
            Err(err) => {
                warn!(%execution_id, worker_id = %self.worker.id(), "sandbox worker unavailable");
                self.replace()?;
                return Err(err);
            }
        };

        let started = Instant::now();
        match tokio::time::timeout(budget, reply).await {
            Ok(Ok(reply)) => {
                debug!(
                    %execution_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    messages = reply.messages.len(),
                    "execution finished"
                );
                Ok(reply.messages)
            }
            Ok(Err(_)) => {
                warn!(%execution_id, worker_id = %self.worker.id(), "sandbox worker crashed");
                self.replace()?;
                Err(PipelineError::WorkerCrashed { worker: "sandbox" })
            }
            Err(_) => {
                warn!(
                    %execution_id,
                    budget_ms = budget.as_millis() as u64,
                    "execution timed out, replacing sandbox worker"
                );
                self.replace()?;
                Ok(vec![ExecutionMessage::Timeout])
            }
        }
    }

    /// Spawn the replacement first, then retire the old worker
    fn replace(&mut self) -> PipelineResult<()> {
        let fresh = WorkerHandle::spawn(self.limits.clone())?;
        let old = std::mem::replace(&mut self.worker, fresh);
        info!(old = %old.id(), new = %self.worker.id(), "sandbox worker replaced");
        old.terminate();
        Ok(())
    }
}

/// Cloneable front for a [`Watchdog`] with a fixed budget.
///
/// Concurrent callers queue on the mutex, so runs never overlap.
#[derive(Clone)]
pub struct SharedWatchdog {
    inner: Arc<Mutex<Watchdog>>,
    budget: Duration,
}

impl SharedWatchdog {
    pub fn new(watchdog: Watchdog, budget: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(watchdog)),
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub async fn run(&self, script: impl Into<String>) -> PipelineResult<Vec<ExecutionMessage>> {
        let mut watchdog = self.inner.lock().await;
        watchdog.run(script, self.budget).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::MarshaledValue;

    #[tokio::test]
    async fn test_normal_run_passes_messages_through() {
        let mut watchdog = Watchdog::new(SandboxLimits::default()).unwrap();
        let messages = watchdog
            .run("print('a')\nreturn 2", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(
            messages,
            vec![
                ExecutionMessage::printed("a"),
                ExecutionMessage::Value {
                    payload: MarshaledValue::Integer(2)
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_infinite_loop_times_out_once_and_recovers() {
        let mut watchdog = Watchdog::new(SandboxLimits::default()).unwrap();
        let first_worker = watchdog.worker_id();

        let started = Instant::now();
        let messages = watchdog
            .run("while true do end", Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(messages, vec![ExecutionMessage::Timeout]);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_ne!(watchdog.worker_id(), first_worker);

        let messages = watchdog
            .run("return 1 + 1", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(
            messages,
            vec![ExecutionMessage::Value {
                payload: MarshaledValue::Integer(2)
            }]
        );
    }

    #[tokio::test]
    async fn test_runtime_fault_keeps_worker() {
        let mut watchdog = Watchdog::new(SandboxLimits::default()).unwrap();
        let worker = watchdog.worker_id();

        let messages = watchdog
            .run("error('boom')", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].to_string().contains("boom"));
        assert_eq!(watchdog.worker_id(), worker);
    }

    #[tokio::test]
    async fn test_shared_watchdog_serializes_runs() {
        let shared = SharedWatchdog::new(
            Watchdog::new(SandboxLimits::default()).unwrap(),
            Duration::from_millis(300),
        );

        let slow = {
            let shared = shared.clone();
            tokio::spawn(async move { shared.run("while true do end").await })
        };
        let fast = {
            let shared = shared.clone();
            tokio::spawn(async move { shared.run("print('next')").await })
        };

        assert_eq!(
            slow.await.unwrap().unwrap(),
            vec![ExecutionMessage::Timeout]
        );
        assert_eq!(
            fast.await.unwrap().unwrap(),
            vec![ExecutionMessage::printed("next")]
        );
    }
}
