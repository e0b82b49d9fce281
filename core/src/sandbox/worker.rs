//! Dedicated sandbox thread
//!
//! The thread owns nothing between runs: each job builds a fresh VM through
//! [`execute_script`]. Jobs are processed strictly in arrival order. A handle
//! is single-use: once terminated its abort flag stays set and the VM still
//! running on the thread unwinds at the next instruction-hook check.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use tokio::sync::oneshot;
use tracing::{debug, error, info_span};
use uuid::Uuid;

use super::runner::execute_script;
use super::SandboxLimits;
use crate::error::{PipelineError, PipelineResult};
use crate::types::{ExecutionReply, ExecutionRequest};

const WORKER: &str = "sandbox";

/// Lifecycle of a [`WorkerHandle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Spawned = 0,
    Busy = 1,
    Idle = 2,
    Terminated = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Spawned,
            1 => WorkerState::Busy,
            2 => WorkerState::Idle,
            _ => WorkerState::Terminated,
        }
    }
}

struct Job {
    execution_id: Uuid,
    request: ExecutionRequest,
    span: tracing::Span,
    reply: oneshot::Sender<ExecutionReply>,
}

/// Owned channel to one sandbox thread
pub struct WorkerHandle {
    id: Uuid,
    tx: mpsc::Sender<Job>,
    abort: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
}

impl WorkerHandle {
    /// Start a new sandbox thread
    pub fn spawn(limits: SandboxLimits) -> PipelineResult<Self> {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel::<Job>();
        let abort = Arc::new(AtomicBool::new(false));
        let state = Arc::new(AtomicU8::new(WorkerState::Spawned as u8));

        let thread_abort = Arc::clone(&abort);
        let thread_state = Arc::clone(&state);

        thread::Builder::new()
            .name(format!("lunar-sandbox-{}", &id.simple().to_string()[..8]))
            .spawn(move || run_jobs(rx, limits, thread_abort, thread_state))
            .map_err(|source| PipelineError::Spawn {
                worker: WORKER,
                source,
            })?;

        debug!(worker_id = %id, "sandbox worker spawned");

        Ok(Self {
            id,
            tx,
            abort,
            state,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Queue a script; the receiver resolves with the run's reply, or errors
    /// if the thread died before replying.
    pub fn submit(
        &self,
        execution_id: Uuid,
        request: ExecutionRequest,
    ) -> PipelineResult<oneshot::Receiver<ExecutionReply>> {
        if self.state() == WorkerState::Terminated {
            return Err(PipelineError::WorkerGone { worker: WORKER });
        }

        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(Job {
                execution_id,
                request,
                span: tracing::Span::current(),
                reply,
            })
            .map_err(|_| PipelineError::WorkerGone { worker: WORKER })?;

        Ok(reply_rx)
    }

    /// Stop the worker. Any run in progress is abandoned.
    pub fn terminate(self) {
        debug!(worker_id = %self.id, state = ?self.state(), "terminating sandbox worker");
        // Drop does the work
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.abort.store(true, Ordering::Relaxed);
        self.state
            .store(WorkerState::Terminated as u8, Ordering::Release);
    }
}

fn run_jobs(
    rx: mpsc::Receiver<Job>,
    limits: SandboxLimits,
    abort: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
) {
    while let Ok(job) = rx.recv() {
        if abort.load(Ordering::Relaxed) {
            break;
        }

        let _guard = job.span.enter();
        let _run = info_span!("sandbox_run", execution_id = %job.execution_id).entered();
        transition(&state, WorkerState::Busy);

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            execute_script(&job.request.script, &limits, &abort)
        }));

        match result {
            Ok(messages) => {
                transition(&state, WorkerState::Idle);
                // Receiver is gone when the watchdog gave up on this run
                let _ = job.reply.send(ExecutionReply { messages });
            }
            Err(_) => {
                error!("sandbox worker panicked during execution");
                // Dropping the reply tells the host the worker crashed
                state.store(WorkerState::Terminated as u8, Ordering::Release);
                return;
            }
        }
    }
    state.store(WorkerState::Terminated as u8, Ordering::Release);
}

/// Move to `next` unless the handle has already been terminated
fn transition(state: &AtomicU8, next: WorkerState) {
    let _ = state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
        (current != WorkerState::Terminated as u8).then_some(next as u8)
    });
}
