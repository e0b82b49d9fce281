use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use super::document::{DocumentSnapshot, SharedDocument, TextProvider};
use super::sink::OutputSink;
use super::{CompileService, ExecuteService, PipelineState};
use crate::error::PipelineResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorOptions {
    /// Quiet period after the last edit before compiling
    pub debounce: Duration,
    /// Compile the initial text without waiting for an edit
    pub compile_on_start: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(250),
            compile_on_start: true,
        }
    }
}

struct Stages<C, E, S> {
    document: SharedDocument,
    compiler: C,
    executor: E,
    sink: S,
    state: watch::Sender<PipelineState>,
}

impl<C, E, S> Stages<C, E, S>
where
    C: CompileService,
    E: ExecuteService,
    S: OutputSink,
{
    fn set_state(&self, state: PipelineState) {
        if *self.state.borrow() != state {
            self.state.send_replace(state);
            self.sink.state_changed(state);
        }
    }

    fn is_stale(&self, revision: u64) -> bool {
        self.document.revision() != revision
    }

    /// Compile then execute one snapshot, dropping anything that a newer
    /// revision has superseded along the way
    async fn process(&self, snapshot: DocumentSnapshot) {
        let revision = snapshot.revision;
        self.set_state(PipelineState::Compiling);

        let compiled = self.compiler.compile(snapshot.uri, snapshot.text).await;
        if self.is_stale(revision) {
            debug!(revision, "discarding superseded compile result");
            return;
        }
        let result = match compiled {
            Ok(result) => result,
            Err(err) => {
                error!(revision, error = %err, "compile failed");
                self.sink.failed(revision, &err);
                self.set_state(PipelineState::Idle);
                return;
            }
        };

        self.sink.compiled(revision, &result);
        self.sink.diagnostics(revision, &result.diagnostics);

        if result.has_errors() {
            info!(
                revision,
                errors = result.errors().count(),
                "compile reported errors, skipping execution"
            );
            self.set_state(PipelineState::Idle);
            return;
        }

        self.set_state(PipelineState::Executing);
        let executed = self.executor.execute(result.script).await;
        if self.is_stale(revision) {
            debug!(revision, "discarding superseded execution result");
            return;
        }

        match executed {
            Ok(messages) => self.sink.executed(revision, &messages),
            Err(err) => {
                error!(revision, error = %err, "execution failed");
                self.sink.failed(revision, &err);
            }
        }
        self.set_state(PipelineState::Idle);
    }
}

/// Debounced compile-and-run loop over one document
pub struct Orchestrator<C, E, S> {
    stages: Arc<Stages<C, E, S>>,
    changes: watch::Receiver<u64>,
    options: OrchestratorOptions,
}

impl<C, E, S> Orchestrator<C, E, S>
where
    C: CompileService,
    E: ExecuteService,
    S: OutputSink,
{
    pub fn new(
        document: SharedDocument,
        compiler: C,
        executor: E,
        sink: S,
        options: OrchestratorOptions,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        // Subscribe now so edits made before `run` is polled are not missed
        let changes = document.subscribe();
        Self {
            stages: Arc::new(Stages {
                document,
                compiler,
                executor,
                sink,
                state,
            }),
            changes,
            options,
        }
    }

    /// Observe state transitions
    pub fn state(&self) -> watch::Receiver<PipelineState> {
        self.stages.state.subscribe()
    }

    /// Run until `shutdown` is cancelled or the document is dropped
    pub async fn run(self, shutdown: CancellationToken) -> PipelineResult<()> {
        let mut changes = self.changes.clone();
        let mut tasks = JoinSet::new();
        let mut deadline = self.options.compile_on_start.then(Instant::now);

        info!(
            uri = self.stages.document.uri(),
            debounce_ms = self.options.debounce.as_millis() as u64,
            "pipeline started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let revision = *changes.borrow_and_update();
                    debug!(revision, "document changed");
                    deadline = Some(Instant::now() + self.options.debounce);
                    self.stages.set_state(PipelineState::Debouncing);
                }

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    let snapshot = self.stages.document.snapshot();
                    let span = info_span!("pipeline_run", revision = snapshot.revision);
                    let stages = Arc::clone(&self.stages);
                    tasks.spawn(async move { stages.process(snapshot).await }.instrument(span));
                }

                Some(joined) = tasks.join_next() => {
                    if let Err(err) = joined {
                        error!(error = %err, "pipeline task aborted");
                    }
                }
            }
        }

        tasks.shutdown().await;
        self.stages.set_state(PipelineState::Idle);
        info!("pipeline stopped");
        Ok(())
    }
}
