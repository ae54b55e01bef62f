//! Compiler invocation boundary.
//!
//! The harness never looks inside the compiler. It hands a [`Compiler`] the
//! list of dirty files, an output directory and the step's lookup sink, and
//! gets back a [`CompileReport`]: exit status, diagnostics and the
//! "these sources produced this artifact" events.
//!
//! Two implementations exist:
//! - [`process::ProcessCompiler`] runs an external compiler process and
//!   parses its textual report (see [`messages`])
//! - anything else implementing the trait in-process (test compilers)

pub mod messages;
pub mod process;

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::recorder::LookupTracker;

pub use messages::{parse_compiler_output, parse_lookup_record, LookupRecord, ParsedOutput};
pub use process::ProcessCompiler;

// ============================================================================
// Request / Report
// ============================================================================

/// What to compile in one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileRequest {
    /// Absolute paths of the files to compile, sorted.
    pub files: Vec<PathBuf>,
    /// Directory artifacts are written to.
    pub output_dir: PathBuf,
    /// Search path entries (earlier outputs come first).
    pub classpath: Vec<PathBuf>,
}

/// Process-level outcome of a compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitStatus {
    Ok,
    CompilationError,
    InternalError,
    ScriptExecutionError,
    /// Any other process exit code.
    Other(i32),
}

impl ExitStatus {
    /// Map a process exit code.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => ExitStatus::Ok,
            1 => ExitStatus::CompilationError,
            2 => ExitStatus::InternalError,
            3 => ExitStatus::ScriptExecutionError,
            other => ExitStatus::Other(other),
        }
    }

    /// Whether the compile succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, ExitStatus::Ok)
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Ok => write!(f, "OK"),
            ExitStatus::CompilationError => write!(f, "COMPILATION_ERROR"),
            ExitStatus::InternalError => write!(f, "INTERNAL_ERROR"),
            ExitStatus::ScriptExecutionError => write!(f, "SCRIPT_EXECUTION_ERROR"),
            ExitStatus::Other(code) => write!(f, "{}", code),
        }
    }
}

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    /// Unclassified compiler chatter; kept in the report, not in build logs.
    Logging,
}

impl Severity {
    /// Prefix used on the wire and in build logs.
    pub fn prefix(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Logging => "logging",
        }
    }
}

/// One compiler diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Error, message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity.prefix(), self.message)
    }
}

/// "These sources produced this artifact."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEvent {
    pub sources: Vec<PathBuf>,
    pub output: PathBuf,
}

/// Everything a compile reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileReport {
    pub exit: ExitStatus,
    pub diagnostics: Vec<Diagnostic>,
    pub outputs: Vec<OutputEvent>,
}

impl CompileReport {
    /// A successful compile with no messages.
    pub fn ok() -> Self {
        CompileReport {
            exit: ExitStatus::Ok,
            diagnostics: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Diagnostics that belong in a build log.
    pub fn reportable_diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity != Severity::Logging)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors at the compiler boundary.
///
/// A failing compile is not an error: it is an [`ExitStatus`] in the report.
/// These variants mean the protocol itself broke.
#[derive(Debug, Error)]
pub enum CompileError {
    /// No compiler command configured.
    #[error("no compiler command configured")]
    EmptyCommand,

    /// The compiler process could not be started.
    #[error("failed to start compiler '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// I/O failure on a protocol file.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A line that starts like an output message but does not parse.
    #[error("malformed output message on compiler output line {line_number}: {line}")]
    MalformedOutputMessage { line_number: usize, line: String },

    /// A lookup side-channel record that does not parse.
    #[error("malformed lookup record at {}:{line_number}: {reason}", path.display())]
    MalformedLookup {
        path: PathBuf,
        line_number: usize,
        reason: String,
    },

    /// The invocation manifest could not be serialized.
    #[error("failed to serialize compiler manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

// ============================================================================
// Compiler Trait
// ============================================================================

/// A compiler the harness can drive.
///
/// Implementations must send every lookup of this invocation to `tracker`
/// and to nothing else.
pub trait Compiler {
    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// Compile `request.files`, reporting lookups to `tracker`.
    fn compile(
        &self,
        request: &CompileRequest,
        tracker: &dyn LookupTracker,
    ) -> Result<CompileReport, CompileError>;
}
