//! Live Flow-to-Lua pipeline
//!
//! Edits to a document are debounced, compiled to Lua on a transpile worker
//! thread and executed in a sandboxed Lua VM on a second worker thread under
//! a watchdog budget.

pub mod application;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod sandbox;
pub mod share;
pub mod transpile;
pub mod types;

// Re-export main types
pub use types::*;

pub use application::{initialize, Application, InitBuilder, InitOptions};
pub use error::{PipelineError, PipelineResult};
