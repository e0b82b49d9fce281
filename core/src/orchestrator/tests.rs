use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::error::{PipelineError, PipelineResult};
use crate::transpile::LanguageService;
use crate::types::{CompileResult, Diagnostic, ExecutionMessage};

const URI: &str = "inmemory://model/main.flow";

/// Compiles with a real language service, recording every text it was given
#[derive(Default)]
struct MockCompiler {
    service: Mutex<LanguageService>,
    texts: Mutex<Vec<String>>,
    delay: Duration,
}

impl CompileService for MockCompiler {
    async fn compile(&self, uri: String, text: String) -> PipelineResult<CompileResult> {
        self.texts.lock().unwrap().push(text.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut service = self.service.lock().unwrap();
        service.sync_document(&uri, text);
        service.get_output(&uri)
    }
}

#[derive(Default)]
struct MockExecutor {
    scripts: Mutex<Vec<String>>,
    fail: bool,
}

impl ExecuteService for MockExecutor {
    async fn execute(&self, script: String) -> PipelineResult<Vec<ExecutionMessage>> {
        self.scripts.lock().unwrap().push(script);
        if self.fail {
            return Err(PipelineError::WorkerCrashed { worker: "sandbox" });
        }
        Ok(vec![ExecutionMessage::printed("ran")])
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Compiled(u64),
    Diagnostics(u64, usize),
    Executed(u64, Vec<ExecutionMessage>),
    Failed(u64),
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<Event>>,
    states: Mutex<Vec<PipelineState>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl OutputSink for RecordingSink {
    fn compiled(&self, revision: u64, _result: &CompileResult) {
        self.events.lock().unwrap().push(Event::Compiled(revision));
    }

    fn diagnostics(&self, revision: u64, diagnostics: &[Diagnostic]) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Diagnostics(revision, diagnostics.len()));
    }

    fn executed(&self, revision: u64, messages: &[ExecutionMessage]) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Executed(revision, messages.to_vec()));
    }

    fn failed(&self, revision: u64, _error: &PipelineError) {
        self.events.lock().unwrap().push(Event::Failed(revision));
    }

    fn state_changed(&self, state: PipelineState) {
        self.states.lock().unwrap().push(state);
    }
}

struct Harness {
    document: SharedDocument,
    compiler: Arc<MockCompiler>,
    executor: Arc<MockExecutor>,
    sink: Arc<RecordingSink>,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<PipelineResult<()>>>,
}

fn start(text: &str, compiler: MockCompiler, executor: MockExecutor, compile_on_start: bool) -> Harness {
    let document = SharedDocument::new(URI, text);
    let compiler = Arc::new(compiler);
    let executor = Arc::new(executor);
    let sink = Arc::new(RecordingSink::default());
    let shutdown = CancellationToken::new();

    let orchestrator = Orchestrator::new(
        document.clone(),
        Arc::clone(&compiler),
        Arc::clone(&executor),
        Arc::clone(&sink),
        OrchestratorOptions {
            debounce: Duration::from_millis(250),
            compile_on_start,
        },
    );
    let handle = tokio::spawn(orchestrator.run(shutdown.clone()));

    Harness {
        document,
        compiler,
        executor,
        sink,
        shutdown,
        handle: Some(handle),
    }
}

impl Harness {
    /// Let every pending debounce, compile and execution finish, then stop
    async fn finish(&mut self) {
        tokio::time::sleep(Duration::from_secs(2)).await;
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap().unwrap();
        }
    }

    fn compiled_texts(&self) -> Vec<String> {
        self.compiler.texts.lock().unwrap().clone()
    }

    fn executed_scripts(&self) -> Vec<String> {
        self.executor.scripts.lock().unwrap().clone()
    }
}

#[tokio::test(start_paused = true)]
async fn test_edits_inside_debounce_window_compile_once() {
    let mut harness = start("", MockCompiler::default(), MockExecutor::default(), false);

    harness.document.set_value("print(1)".into());
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.document.set_value("print(2)".into());
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.document.set_value("print(3)".into());
    harness.finish().await;

    assert_eq!(harness.compiled_texts(), vec!["print(3)".to_string()]);
    assert_eq!(harness.executed_scripts(), vec!["print(3)\n".to_string()]);
    assert_eq!(
        harness.sink.events(),
        vec![
            Event::Compiled(3),
            Event::Diagnostics(3, 0),
            Event::Executed(3, vec![ExecutionMessage::printed("ran")]),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_syntax_error_skips_execution() {
    let mut harness = start("", MockCompiler::default(), MockExecutor::default(), false);

    harness.document.set_value("let x = ;".into());
    harness.finish().await;

    assert!(harness.executed_scripts().is_empty());

    let events = harness.sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], Event::Compiled(1));
    assert!(matches!(events[1], Event::Diagnostics(1, n) if n >= 1));
}

#[tokio::test(start_paused = true)]
async fn test_superseded_results_are_discarded() {
    let compiler = MockCompiler {
        delay: Duration::from_millis(500),
        ..MockCompiler::default()
    };
    let mut harness = start("", compiler, MockExecutor::default(), false);

    harness.document.set_value("print(1)".into());
    // First compile starts at 250ms and is still running at 300ms
    tokio::time::sleep(Duration::from_millis(300)).await;
    harness.document.set_value("print(2)".into());
    harness.finish().await;

    assert_eq!(
        harness.compiled_texts(),
        vec!["print(1)".to_string(), "print(2)".to_string()]
    );
    assert_eq!(harness.executed_scripts(), vec!["print(2)\n".to_string()]);
    assert!(harness
        .sink
        .events()
        .iter()
        .all(|event| !matches!(event, Event::Compiled(1) | Event::Executed(1, _))));
}

#[tokio::test(start_paused = true)]
async fn test_compile_on_start() {
    let mut harness = start("print(0)", MockCompiler::default(), MockExecutor::default(), true);
    harness.finish().await;

    assert_eq!(harness.compiled_texts(), vec!["print(0)".to_string()]);
    assert_eq!(harness.executed_scripts().len(), 1);
    assert!(harness.sink.events().contains(&Event::Compiled(0)));
}

#[tokio::test(start_paused = true)]
async fn test_execution_failure_reported() {
    let executor = MockExecutor {
        fail: true,
        ..MockExecutor::default()
    };
    let mut harness = start("", MockCompiler::default(), executor, false);

    harness.document.set_value("print(1)".into());
    harness.finish().await;

    assert_eq!(harness.sink.events().last(), Some(&Event::Failed(1)));
}

#[tokio::test(start_paused = true)]
async fn test_state_transitions() {
    let mut harness = start("", MockCompiler::default(), MockExecutor::default(), false);

    harness.document.set_value("print(1)".into());
    harness.finish().await;

    assert_eq!(
        *harness.sink.states.lock().unwrap(),
        vec![
            PipelineState::Debouncing,
            PipelineState::Compiling,
            PipelineState::Executing,
            PipelineState::Idle,
        ]
    );
}
