//! Unified error type and CLI exit codes.
//!
//! Each subsystem owns a `thiserror` enum; [`RetraceError`] wraps them so the
//! CLI has one type to render, and [`OutputErrorCode`] gives every failure a
//! stable exit code.

use std::fmt;

use thiserror::Error;

use crate::compiler::CompileError;
use crate::config::ConfigError;
use crate::fixture::FixtureError;
use crate::orchestrator::RunError;
use crate::plan::PlanError;
use crate::verify::VerifyError;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Stable exit codes, also reported in JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from caller.
    InvalidArguments = 2,
    /// Fixture, plan or configuration could not be resolved.
    ResolutionError = 3,
    /// The compiler could not be run or broke its protocol, or the working
    /// tree could not be updated.
    CompileProtocol = 4,
    /// Lookups or the build log did not match expectations.
    VerificationFailed = 5,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for CLI output.
#[derive(Debug, Error)]
pub enum RetraceError {
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fixture(#[from] FixtureError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl RetraceError {
    pub fn invalid_args(message: impl Into<String>) -> Self {
        RetraceError::InvalidArguments {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        RetraceError::Internal {
            message: message.into(),
        }
    }
}

impl From<PlanError> for RetraceError {
    fn from(err: PlanError) -> Self {
        RetraceError::Fixture(FixtureError::Plan(err))
    }
}

impl From<VerifyError> for RetraceError {
    fn from(err: VerifyError) -> Self {
        RetraceError::Run(RunError::Verify(err))
    }
}

impl From<&RetraceError> for OutputErrorCode {
    fn from(err: &RetraceError) -> Self {
        match err {
            RetraceError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            RetraceError::Config(_) | RetraceError::Fixture(_) => OutputErrorCode::ResolutionError,
            RetraceError::Compile(_) => OutputErrorCode::CompileProtocol,
            RetraceError::Run(run) => match run {
                RunError::Fixture(_) | RunError::Plan(_) => OutputErrorCode::ResolutionError,
                RunError::Io { .. } | RunError::Compile { .. } => OutputErrorCode::CompileProtocol,
                RunError::Verify(_)
                | RunError::LookupMismatch { .. }
                | RunError::MissingGoldenLog { .. }
                | RunError::BuildLogMismatch { .. } => OutputErrorCode::VerificationFailed,
            },
            RetraceError::Internal { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<RetraceError> for OutputErrorCode {
    fn from(err: RetraceError) -> Self {
        OutputErrorCode::from(&err)
    }
}
