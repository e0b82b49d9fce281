use std::sync::Arc;

use super::PipelineState;
use crate::error::PipelineError;
use crate::types::{CompileResult, Diagnostic, ExecutionMessage};

/// Display surfaces fed by the pipeline.
///
/// Every call carries the document revision it belongs to; results of
/// superseded revisions never reach the sink.
pub trait OutputSink: Send + Sync + 'static {
    /// Generated script, Lua AST and source map
    fn compiled(&self, revision: u64, result: &CompileResult);

    fn diagnostics(&self, revision: u64, diagnostics: &[Diagnostic]);

    fn executed(&self, revision: u64, messages: &[ExecutionMessage]);

    /// A worker failed in a way that is not a compile or runtime error
    fn failed(&self, revision: u64, error: &PipelineError);

    fn state_changed(&self, _state: PipelineState) {}
}

impl<T: OutputSink> OutputSink for Arc<T> {
    fn compiled(&self, revision: u64, result: &CompileResult) {
        (**self).compiled(revision, result)
    }

    fn diagnostics(&self, revision: u64, diagnostics: &[Diagnostic]) {
        (**self).diagnostics(revision, diagnostics)
    }

    fn executed(&self, revision: u64, messages: &[ExecutionMessage]) {
        (**self).executed(revision, messages)
    }

    fn failed(&self, revision: u64, error: &PipelineError) {
        (**self).failed(revision, error)
    }

    fn state_changed(&self, state: PipelineState) {
        (**self).state_changed(state)
    }
}
