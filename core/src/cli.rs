use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::{self, InitOptions};
use crate::error::PipelineError;
use crate::orchestrator::{OutputSink, PipelineState, TextProvider};
use crate::share;
use crate::types::{CompileResult, Diagnostic, ExecutionMessage};

#[derive(Parser)]
#[command(name = "lunar")]
#[command(about = "Lunar - compile Flow to Lua and run it in a sandbox", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a Flow file and print the generated Lua
    Compile {
        /// Flow source file
        file: PathBuf,

        /// Print the Lua syntax tree as JSON instead of the script
        #[arg(long)]
        ast: bool,

        /// Print the source map instead of the script
        #[arg(long)]
        source_map: bool,

        /// Print the whole compile result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compile a Flow file and execute it in the sandbox
    Run {
        /// Flow source file
        file: PathBuf,

        /// Execution budget in milliseconds (overrides config)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Re-run a Flow file every time it changes
    Watch {
        /// Flow source file
        file: PathBuf,

        /// How often to check the file for changes
        #[arg(long, default_value = "200")]
        poll_ms: u64,
    },

    /// Encode a file as a share link, or decode one
    Share {
        /// Flow source file to encode
        #[arg(required_unless_present = "decode")]
        file: Option<PathBuf>,

        /// Share link or `#code/...` fragment to decode
        #[arg(long, conflicts_with = "file")]
        decode: Option<String>,

        /// Prefix for encoded links
        #[arg(long, default_value = "")]
        base: String,
    },

    /// Print the effective configuration
    Config,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

/// Default log filter for this invocation, from `logging.level`
pub fn default_log_level(cli: &Cli) -> String {
    let options = InitOptions {
        config_path: cli.config.clone(),
        ..Default::default()
    };
    application::load_config(&options)
        .map(|config| config.logging.level)
        .unwrap_or_else(|_| "info".to_string())
}

/// Handles an already parsed command line
pub async fn run_cli_with_args(cli: Cli) -> Result<()> {
    let mut options = InitOptions {
        config_path: cli.config.clone(),
        ..Default::default()
    };

    match cli.command {
        Commands::Compile {
            file,
            ast,
            source_map,
            json,
        } => {
            let app = application::initialize(options)?;
            let source = read_source(&file).await?;
            let uri = app.config().pipeline.document_uri.clone();

            app.transpiler.sync_document(uri.as_str(), source).await?;
            let result = app.transpiler.transpile(uri.as_str()).await?;

            print_diagnostics(&file, &result.diagnostics);
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if ast {
                println!("{}", serde_json::to_string_pretty(&result.ast)?);
            } else if source_map {
                println!("{}", result.source_map);
            } else {
                print!("{}", result.script);
            }

            if result.has_errors() {
                std::process::exit(1);
            }
        }

        Commands::Run { file, timeout_ms } => {
            options.timeout_ms = timeout_ms;
            let app = application::initialize(options)?;
            let source = read_source(&file).await?;
            let uri = app.config().pipeline.document_uri.clone();

            app.transpiler.sync_document(uri.as_str(), source).await?;
            let result = app.transpiler.transpile(uri.as_str()).await?;
            print_diagnostics(&file, &result.diagnostics);
            if result.has_errors() {
                std::process::exit(1);
            }

            let messages = app.watchdog.run(result.script).await?;
            for message in &messages {
                print_message(message);
            }
            if messages.iter().any(ExecutionMessage::is_failure) {
                std::process::exit(1);
            }
        }

        Commands::Watch { file, poll_ms } => {
            let app = application::initialize(options)?;
            watch(app, file, Duration::from_millis(poll_ms.max(10))).await?;
        }

        Commands::Share { file, decode, base } => match (file, decode) {
            (_, Some(link)) => {
                let code = share::decode_fragment(&link).context("Failed to decode share link")?;
                print!("{}", code);
            }
            (Some(file), None) => {
                let source = read_source(&file).await?;
                println!("{}", share::share_url(&base, &source));
            }
            (None, None) => anyhow::bail!("either a file or --decode is required"),
        },

        Commands::Config => {
            let config = application::load_config(&options)?;
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

async fn read_source(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn watch(app: application::Application, file: PathBuf, poll: Duration) -> Result<()> {
    let initial = read_source(&file).await?;
    let document = app.document(initial);
    let orchestrator = app.orchestrator(document.clone(), TerminalSink::new(file.clone()));

    let shutdown = CancellationToken::new();
    let pipeline = tokio::spawn(orchestrator.run(shutdown.clone()));

    info!(file = %file.display(), "watching for changes, press Ctrl-C to stop");
    let mut ticker = tokio::time::interval(poll);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                match tokio::fs::read_to_string(&file).await {
                    Ok(text) if text != document.get_value() => document.set_value(text),
                    Ok(_) => {}
                    Err(err) => warn!(file = %file.display(), error = %err, "failed to read watched file"),
                }
            }
        }
    }

    shutdown.cancel();
    pipeline.await.context("Pipeline task panicked")??;
    Ok(())
}

fn print_diagnostics(file: &Path, diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        eprintln!("{}:{}", file.display(), diagnostic);
    }
}

fn print_message(message: &ExecutionMessage) {
    match message {
        ExecutionMessage::PrintedLine { .. } | ExecutionMessage::Value { .. } => {
            println!("{}", message)
        }
        ExecutionMessage::Error { .. } | ExecutionMessage::Timeout => eprintln!("{}", message),
    }
}

/// Prints pipeline output to the terminal with local timestamps
pub struct TerminalSink {
    file: PathBuf,
}

impl TerminalSink {
    pub fn new(file: PathBuf) -> Self {
        Self { file }
    }

    fn stamp() -> String {
        Local::now().format("%H:%M:%S").to_string()
    }
}

impl OutputSink for TerminalSink {
    fn compiled(&self, revision: u64, result: &CompileResult) {
        println!(
            "[{}] revision {} compiled ({} lines of Lua)",
            Self::stamp(),
            revision,
            result.script.lines().count()
        );
    }

    fn diagnostics(&self, _revision: u64, diagnostics: &[Diagnostic]) {
        print_diagnostics(&self.file, diagnostics);
    }

    fn executed(&self, revision: u64, messages: &[ExecutionMessage]) {
        println!("[{}] revision {} output:", Self::stamp(), revision);
        for message in messages {
            print_message(message);
        }
    }

    fn failed(&self, revision: u64, error: &PipelineError) {
        eprintln!("[{}] revision {} failed: {}", Self::stamp(), revision, error);
    }

    fn state_changed(&self, state: PipelineState) {
        tracing::debug!(?state, "pipeline state");
    }
}
