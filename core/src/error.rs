use thiserror::Error;

/// Unexpected host-side failures of the pipeline.
///
/// Compile diagnostics, runtime faults and timeouts are not errors: they are
/// reported as data. These are the cases where a worker itself misbehaved.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to spawn {worker} worker: {source}")]
    Spawn {
        worker: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{worker} worker died without replying")]
    WorkerCrashed { worker: &'static str },

    #[error("{worker} worker is no longer running")]
    WorkerGone { worker: &'static str },

    #[error("unknown document: {0}")]
    UnknownDocument(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_worker() {
        let crashed = PipelineError::WorkerCrashed { worker: "sandbox" };
        assert_eq!(crashed.to_string(), "sandbox worker died without replying");

        let gone = PipelineError::WorkerGone { worker: "transpile" };
        assert_eq!(gone.to_string(), "transpile worker is no longer running");

        let unknown = PipelineError::UnknownDocument("inmemory://model/x.flow".into());
        assert_eq!(unknown.to_string(), "unknown document: inmemory://model/x.flow");
    }
}
