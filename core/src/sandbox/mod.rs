//! Execution sandbox
//!
//! `runner` executes one script in a fresh restricted Lua state, `marshal`
//! copies the result out of the VM, `worker` hosts runs on a dedicated thread
//! and `watchdog` bounds each run in time.

pub mod marshal;
pub mod runner;
pub mod watchdog;
pub mod worker;

pub use marshal::{
    array_layout, classify, format_error_payload, marshal, marshal_with_budget, Classified,
    MarshaledValue,
};
pub use runner::execute_script;
pub use watchdog::{SharedWatchdog, Watchdog};
pub use worker::{WorkerHandle, WorkerState};

/// Per-run resource limits for the VM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Cap on VM heap usage; `None` disables it
    pub memory_limit_bytes: Option<usize>,
    /// Instructions between abort-flag checks
    pub instruction_interval: u32,
    /// Printed lines kept per run
    pub max_output_lines: usize,
    /// Printed bytes kept per run
    pub max_output_bytes: usize,
    /// Values copied out of the returned result
    pub max_marshal_nodes: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            memory_limit_bytes: Some(64 * 1024 * 1024),
            instruction_interval: 1000,
            max_output_lines: 5000,
            max_output_bytes: 1024 * 1024,
            max_marshal_nodes: marshal::DEFAULT_MAX_NODES,
        }
    }
}
