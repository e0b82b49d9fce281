//! Plain-data types that cross worker boundaries
//!
//! Values sent between the host, the transpile worker and the sandbox
//! worker are owned copies; nothing here borrows from either side.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::compiler::lua::ast::Chunk;
use crate::sandbox::MarshaledValue;

/// Text shown for a run that exceeded its budget
pub const TIMEOUT_TEXT: &str = "Lua code execution timed out";

/// Table key carrying an explicit array length, so arrays with holes
/// survive the trip through the VM
pub const LENGTH_MARKER: &str = "____arrayLength";

/* ===================== Diagnostics ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        f.write_str(label)
    }
}

/// A compile diagnostic located in one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Byte offset of the first character
    pub start: usize,
    /// Length in bytes
    pub length: usize,
    /// 0-indexed line of `start`
    pub line: usize,
    /// 0-indexed column of `start`
    pub column: usize,
    /// Identifier of the check that produced it (e.g. "undefined-variable")
    pub code: String,
    /// Document the diagnostic belongs to
    #[serde(default)]
    pub file: String,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {}[{}]: {}",
            self.line + 1,
            self.column + 1,
            self.severity,
            self.code,
            self.message
        )
    }
}

/* ===================== Compilation ===================== */

/// Output of one compile request; immutable once produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileResult {
    /// Document the result was compiled from
    pub uri: String,
    /// Document version the result corresponds to
    pub version: u64,
    /// Generated Lua source
    pub script: String,
    /// Generated Lua syntax tree
    pub ast: Chunk,
    /// Source Map v3 JSON
    pub source_map: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

/* ===================== Execution ===================== */

/// Request sent to the sandbox worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub script: String,
}

/// Reply from the sandbox worker for one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReply {
    pub messages: Vec<ExecutionMessage>,
}

/// One entry of a run's output stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ExecutionMessage {
    /// A line written by `print`
    PrintedLine { text: String },
    /// The chunk's top-level return value
    Value { payload: MarshaledValue },
    /// A runtime fault or abnormal VM status
    Error { text: String },
    /// The run exceeded its budget
    Timeout,
}

impl ExecutionMessage {
    pub fn printed(text: impl Into<String>) -> Self {
        ExecutionMessage::PrintedLine { text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        ExecutionMessage::Error { text: text.into() }
    }

    /// True for the messages that end a run abnormally
    pub fn is_failure(&self) -> bool {
        matches!(self, ExecutionMessage::Error { .. } | ExecutionMessage::Timeout)
    }
}

impl fmt::Display for ExecutionMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMessage::PrintedLine { text } => f.write_str(text),
            ExecutionMessage::Value { payload } => write!(f, "Module exports: {}", payload),
            ExecutionMessage::Error { text } => f.write_str(text),
            ExecutionMessage::Timeout => f.write_str(TIMEOUT_TEXT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_message_wire_shape() {
        let json = serde_json::to_value(ExecutionMessage::printed("hi")).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "printed-line", "text": "hi" }));

        let json = serde_json::to_value(ExecutionMessage::Timeout).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "timeout" }));
    }

    #[test]
    fn test_diagnostic_display_is_one_based() {
        let diagnostic = Diagnostic {
            severity: Severity::Error,
            message: "Undefined variable 'x'".to_string(),
            start: 8,
            length: 1,
            line: 0,
            column: 8,
            code: "undefined-variable".to_string(),
            file: "main.flow".to_string(),
        };
        assert_eq!(
            diagnostic.to_string(),
            "1:9 error[undefined-variable]: Undefined variable 'x'"
        );
    }
}
