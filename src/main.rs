//! Binary entry point for the retrace CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Run a fixture through its incremental builds and check build.log
//! retrace run fixtures/simple --compiler kotlinc-lookups
//!
//! # Regenerate the golden build log
//! retrace run fixtures/simple --update-golden
//!
//! # Show a file without its lookup annotations
//! retrace strip fixtures/simple/a.kt
//!
//! # List the fixture's sources and modification steps
//! retrace plan fixtures/simple
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tempfile::TempDir;
use tracing::info;

use retrace::annotate::strip_annotations;
use retrace::compiler::ProcessCompiler;
use retrace::config::{CliOverrides, ResolvedConfig};
use retrace::error::{OutputErrorCode, RetraceError};
use retrace::fixture::{Fixture, WorkTree};
use retrace::orchestrator::{GoldenOutcome, IncrementalRunner, RunOptions};
use retrace::plan::{slash_path, PlannedStep};

// ============================================================================
// CLI Structure
// ============================================================================

/// Verify compiler name lookups across incremental builds.
#[derive(Parser, Debug)]
#[command(
    name = "retrace",
    version,
    about = "Verify compiler name lookups across incremental builds"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Log level for tracing output (overridden by RUST_LOG).
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a fixture's initial build and every modification step.
    Run {
        /// Fixture directory.
        fixture: PathBuf,

        /// Compiler command; repeat for each argument (`--compiler kc --compiler -v`).
        #[arg(long = "compiler", value_name = "ARG", allow_hyphen_values = true)]
        compiler: Vec<String>,

        /// Working tree (default: a temporary directory).
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Compiler timeout in seconds.
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Write the build log to the golden file instead of comparing.
        #[arg(long)]
        update_golden: bool,
    },

    /// Print a source file with lookup annotations removed.
    Strip {
        file: PathBuf,
    },

    /// Print a fixture's sources and modification steps.
    Plan {
        fixture: PathBuf,
    },
}

// ============================================================================
// JSON Responses
// ============================================================================

#[derive(Serialize)]
struct RunResponse<'a> {
    status: &'static str,
    work_dir: String,
    #[serde(flatten)]
    report: &'a retrace::orchestrator::RunReport,
}

#[derive(Serialize)]
struct PlanResponse<'a> {
    status: &'static str,
    sources: Vec<String>,
    steps: &'a [PlannedStep],
}

#[derive(Serialize)]
struct ErrorResponse {
    status: &'static str,
    code: u8,
    message: String,
}

fn emit_json<T: Serialize>(value: &T) -> Result<(), RetraceError> {
    let mut stdout = io::stdout();
    serde_json::to_writer_pretty(&mut stdout, value)
        .map_err(|e| RetraceError::internal(format!("failed to write JSON: {}", e)))?;
    writeln!(stdout).map_err(|e| RetraceError::internal(e.to_string()))?;
    let _ = stdout.flush();
    Ok(())
}

// ============================================================================
// Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.log_level);
    let format = cli.global.format;

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let error_code = OutputErrorCode::from(&err);
            match format {
                OutputFormat::Json => {
                    let response = ErrorResponse {
                        status: "error",
                        code: error_code.code(),
                        message: err.to_string(),
                    };
                    if emit_json(&response).is_err() {
                        eprintln!("error: {}", err);
                    }
                }
                OutputFormat::Text => eprintln!("error: {}", err),
            }
            ExitCode::from(error_code.code())
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn execute(cli: Cli) -> Result<(), RetraceError> {
    let format = cli.global.format;
    match cli.command {
        Command::Run {
            fixture,
            compiler,
            work_dir,
            timeout,
            update_golden,
        } => {
            let overrides = CliOverrides {
                compiler: (!compiler.is_empty()).then_some(compiler),
                timeout_secs: timeout,
                update_golden,
            };
            execute_run(&fixture, &overrides, work_dir, format)
        }
        Command::Strip { file } => execute_strip(&file),
        Command::Plan { fixture } => execute_plan(&fixture, format),
    }
}

// ============================================================================
// Command Executors
// ============================================================================

/// Resolve the compiler program on PATH, keeping its arguments.
fn resolve_compiler(mut command: Vec<String>) -> Result<Vec<String>, RetraceError> {
    let Some(program) = command.first_mut() else {
        return Err(RetraceError::invalid_args(
            "no compiler configured; pass --compiler, set RETRACE_COMPILER or add `compiler` to retrace.toml",
        ));
    };
    let resolved = which::which(program.as_str()).map_err(|e| {
        RetraceError::invalid_args(format!("compiler '{}' not found: {}", program, e))
    })?;
    *program = resolved.to_string_lossy().into_owned();
    Ok(command)
}

fn execute_run(
    fixture_dir: &Path,
    overrides: &CliOverrides,
    work_dir: Option<PathBuf>,
    format: OutputFormat,
) -> Result<(), RetraceError> {
    let config = ResolvedConfig::resolve(fixture_dir, overrides)?;
    let command = resolve_compiler(config.compiler.value.clone())?;
    let fixture = Fixture::load(fixture_dir, &config.fixture_options())?;

    // The temporary tree must outlive the runner.
    let (_scratch, work_root) = match work_dir {
        Some(dir) => (None, dir),
        None => {
            let dir = TempDir::new()
                .map_err(|e| RetraceError::internal(format!("failed to create work dir: {}", e)))?;
            let path = dir.path().to_path_buf();
            (Some(dir), path)
        }
    };
    let tree = WorkTree::create(&work_root)?;
    let work_dir_display = tree.root().display().to_string();

    info!(
        fixture = %fixture_dir.display(),
        compiler = %command.join(" "),
        timeout = ?config.timeout.value,
        work_dir = %work_dir_display,
        "starting run"
    );

    let compiler = ProcessCompiler::new(command).with_timeout(config.timeout.value);
    let options = RunOptions {
        classpath: config.classpath.value.clone(),
        metadata_extensions: config.metadata_extensions.value.clone(),
        update_golden: config.update_golden.value,
    };
    let report = IncrementalRunner::new(&compiler, &fixture, tree, options).run()?;

    match format {
        OutputFormat::Text => {
            print!("{}", report.log.render());
            if report.golden == GoldenOutcome::Written {
                eprintln!("wrote {}", report.golden_path.display());
            }
        }
        OutputFormat::Json => emit_json(&RunResponse {
            status: "ok",
            work_dir: work_dir_display,
            report: &report,
        })?,
    }

    Ok(())
}

fn execute_strip(file: &Path) -> Result<(), RetraceError> {
    let text = fs::read_to_string(file).map_err(|e| {
        RetraceError::invalid_args(format!("cannot read {}: {}", file.display(), e))
    })?;
    print!("{}", strip_annotations(&text));
    Ok(())
}

fn execute_plan(fixture_dir: &Path, format: OutputFormat) -> Result<(), RetraceError> {
    let config = ResolvedConfig::resolve(fixture_dir, &CliOverrides::default())?;
    let fixture = Fixture::load(fixture_dir, &config.fixture_options())?;
    let sources: Vec<String> = fixture.sources().iter().map(|s| slash_path(s)).collect();

    match format {
        OutputFormat::Text => {
            println!("INITIAL BUILD");
            for source in &sources {
                println!("  {}", source);
            }
            print!("{}", fixture.plan());
        }
        OutputFormat::Json => emit_json(&PlanResponse {
            status: "ok",
            sources,
            steps: fixture.plan().steps(),
        })?,
    }
    Ok(())
}
