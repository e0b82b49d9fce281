//! Host-side pipeline: debounce edits, compile, execute, report.

pub mod document;
pub mod pipeline;
pub mod sink;

#[cfg(test)]
mod tests;

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use crate::error::PipelineResult;
use crate::sandbox::SharedWatchdog;
use crate::transpile::TranspileClient;
use crate::types::{CompileResult, ExecutionMessage};

pub use document::{DocumentSnapshot, SharedDocument, TextProvider};
pub use pipeline::{Orchestrator, OrchestratorOptions};
pub use sink::OutputSink;

/// Where the pipeline currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Debouncing,
    Compiling,
    Executing,
}

/// Compiles one document version
pub trait CompileService: Send + Sync + 'static {
    fn compile(
        &self,
        uri: String,
        text: String,
    ) -> impl Future<Output = PipelineResult<CompileResult>> + Send;
}

/// Runs one compiled script under the sandbox's limits
pub trait ExecuteService: Send + Sync + 'static {
    fn execute(
        &self,
        script: String,
    ) -> impl Future<Output = PipelineResult<Vec<ExecutionMessage>>> + Send;
}

impl<T: CompileService> CompileService for Arc<T> {
    fn compile(
        &self,
        uri: String,
        text: String,
    ) -> impl Future<Output = PipelineResult<CompileResult>> + Send {
        (**self).compile(uri, text)
    }
}

impl<T: ExecuteService> ExecuteService for Arc<T> {
    fn execute(
        &self,
        script: String,
    ) -> impl Future<Output = PipelineResult<Vec<ExecutionMessage>>> + Send {
        (**self).execute(script)
    }
}

impl CompileService for TranspileClient {
    async fn compile(&self, uri: String, text: String) -> PipelineResult<CompileResult> {
        self.sync_document(uri.clone(), text).await?;
        self.transpile(uri).await
    }
}

impl ExecuteService for SharedWatchdog {
    async fn execute(&self, script: String) -> PipelineResult<Vec<ExecutionMessage>> {
        self.run(script).await
    }
}
