//! Transpile worker thread and its async client

use std::panic::AssertUnwindSafe;
use std::sync::mpsc;
use std::thread;

use tokio::sync::oneshot;
use tracing::{debug, error, info_span};
use uuid::Uuid;

use super::service::LanguageService;
use crate::error::{PipelineError, PipelineResult};
use crate::types::{CompileResult, Diagnostic};

const WORKER: &str = "transpile";

enum Request {
    SyncDocument {
        uri: String,
        text: String,
        reply: oneshot::Sender<u64>,
    },
    Transpile {
        uri: String,
        reply: oneshot::Sender<PipelineResult<CompileResult>>,
    },
    Diagnostics {
        uri: String,
        reply: oneshot::Sender<PipelineResult<Vec<Diagnostic>>>,
    },
    CloseDocument {
        uri: String,
        reply: oneshot::Sender<bool>,
    },
    #[cfg(test)]
    Panic { reply: oneshot::Sender<()> },
}

struct Envelope {
    request_id: Uuid,
    span: tracing::Span,
    request: Request,
}

/// Start the transpile worker. It runs until every client is dropped.
pub fn spawn() -> PipelineResult<TranspileClient> {
    let (tx, rx) = mpsc::channel::<Envelope>();

    thread::Builder::new()
        .name("lunar-transpile".into())
        .spawn(move || serve(rx))
        .map_err(|source| PipelineError::Spawn {
            worker: WORKER,
            source,
        })?;

    Ok(TranspileClient { tx })
}

fn serve(rx: mpsc::Receiver<Envelope>) {
    let mut service = LanguageService::new();

    while let Ok(envelope) = rx.recv() {
        let _guard = envelope.span.enter();
        let _request = info_span!("transpile_request", request_id = %envelope.request_id).entered();

        // A panic drops the reply, which the client reports as a crash.
        // Open documents survive and later requests are still served.
        let handled = std::panic::catch_unwind(AssertUnwindSafe(|| {
            handle(&mut service, envelope.request)
        }));
        if handled.is_err() {
            error!(request_id = %envelope.request_id, "transpile request panicked");
        }
    }
    debug!("transpile worker stopped");
}

fn handle(service: &mut LanguageService, request: Request) {
    // Replies are best effort: the caller may have stopped waiting
    match request {
        Request::SyncDocument { uri, text, reply } => {
            let _ = reply.send(service.sync_document(&uri, text));
        }
        Request::Transpile { uri, reply } => {
            let _ = reply.send(service.get_output(&uri));
        }
        Request::Diagnostics { uri, reply } => {
            let _ = reply.send(service.get_diagnostics(&uri));
        }
        Request::CloseDocument { uri, reply } => {
            let _ = reply.send(service.close_document(&uri));
        }
        #[cfg(test)]
        Request::Panic { reply } => {
            let _reply = reply;
            panic!("transpile request failed");
        }
    }
}

/// Cloneable async handle to the transpile worker.
///
/// Each call is one request/reply pair correlated by a fresh request id.
#[derive(Clone)]
pub struct TranspileClient {
    tx: mpsc::Sender<Envelope>,
}

impl TranspileClient {
    /// Open or replace a document; returns its version
    pub async fn sync_document(&self, uri: impl Into<String>, text: impl Into<String>) -> PipelineResult<u64> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::SyncDocument {
            uri: uri.into(),
            text: text.into(),
            reply,
        })?;
        rx.await.map_err(|_| crashed())
    }

    /// Compile a document: script, Lua AST, source map and its diagnostics
    pub async fn transpile(&self, uri: impl Into<String>) -> PipelineResult<CompileResult> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Transpile {
            uri: uri.into(),
            reply,
        })?;
        rx.await.map_err(|_| crashed())?
    }

    pub async fn diagnostics(&self, uri: impl Into<String>) -> PipelineResult<Vec<Diagnostic>> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Diagnostics {
            uri: uri.into(),
            reply,
        })?;
        rx.await.map_err(|_| crashed())?
    }

    pub async fn close_document(&self, uri: impl Into<String>) -> PipelineResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::CloseDocument {
            uri: uri.into(),
            reply,
        })?;
        rx.await.map_err(|_| crashed())
    }

    fn request(&self, request: Request) -> PipelineResult<()> {
        let envelope = Envelope {
            request_id: Uuid::new_v4(),
            span: tracing::Span::current(),
            request,
        };
        debug!(request_id = %envelope.request_id, "transpile request");
        self.tx
            .send(envelope)
            .map_err(|_| PipelineError::WorkerGone { worker: WORKER })
    }
}

fn crashed() -> PipelineError {
    PipelineError::WorkerCrashed { worker: WORKER }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    const MAIN: &str = "inmemory://model/main.flow";

    #[tokio::test]
    async fn test_round_trip_through_worker() {
        let client = spawn().unwrap();

        assert_eq!(assert_ok!(client.sync_document(MAIN, "const x = 1\nprint(x)").await), 1);
        let result = assert_ok!(client.transpile(MAIN).await);
        assert_eq!(result.script, "local x = 1\nprint(x)\n");
        assert_eq!(result.version, 1);

        assert_eq!(client.sync_document(MAIN, "print(y)").await.unwrap(), 2);
        let diagnostics = client.diagnostics(MAIN).await.unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].is_error());
    }

    #[tokio::test]
    async fn test_unknown_document_error_crosses_boundary() {
        let client = spawn().unwrap();
        let err = client.transpile(MAIN).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnknownDocument(_)));
    }

    #[tokio::test]
    async fn test_worker_survives_a_panicking_request() {
        let client = spawn().unwrap();
        assert_ok!(client.sync_document(MAIN, "print(1)").await);

        let (reply, rx) = oneshot::channel();
        client.request(Request::Panic { reply }).unwrap();
        assert!(rx.await.is_err());

        let result = assert_ok!(client.transpile(MAIN).await);
        assert_eq!(result.script, "print(1)\n");
    }

    #[tokio::test]
    async fn test_clients_share_one_program() {
        let client = spawn().unwrap();
        let other = client.clone();

        assert_ok!(
            other
                .sync_document("inmemory://model/env.flow", "declare const host;")
                .await
        );
        assert_ok!(client.sync_document(MAIN, "print(host)").await);
        assert!(client.diagnostics(MAIN).await.unwrap().is_empty());

        assert!(other.close_document("inmemory://model/env.flow").await.unwrap());
        assert_eq!(client.diagnostics(MAIN).await.unwrap().len(), 1);
    }
}
