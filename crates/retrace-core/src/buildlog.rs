//! Human-readable build log compared against a golden file.
//!
//! ```text
//! ==== INITIAL BUILD ====
//! Compiling files:
//!   a.kt
//!   b.kt (no lookups)
//! Exit code: OK
//!
//! ==== STEP 1 ====
//! Compiling files:
//!   b.kt (unknown)
//! Exit code: COMPILATION_ERROR
//!   error: b.kt:1:9: unresolved reference: x
//!
//! ```
//!
//! Steps are appended once each and rendered at the end; a step is never
//! edited after it has been pushed.

use std::fmt;

use serde::Serialize;

use crate::compiler::{Diagnostic, ExitStatus};
use crate::types::LookupStatus;

/// Indentation for file and diagnostic lines.
const INDENT: &str = "  ";

/// Which build a step records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Initial,
    Step(u32),
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepName::Initial => write!(f, "INITIAL BUILD"),
            StepName::Step(n) => write!(f, "STEP {}", n),
        }
    }
}

/// A file compiled in a step, with its lookup measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledFile {
    /// Path relative to the source root, forward slashes.
    pub path: String,
    pub status: LookupStatus,
}

/// One section of the build log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildStep {
    pub name: StepName,
    pub compiled: Vec<CompiledFile>,
    pub exit: ExitStatus,
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildStep {
    /// Create a step; compiled files are sorted by path.
    pub fn new(
        name: StepName,
        mut compiled: Vec<CompiledFile>,
        exit: ExitStatus,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        compiled.sort_by(|a, b| a.path.cmp(&b.path));
        BuildStep {
            name,
            compiled,
            exit,
            diagnostics,
        }
    }

    fn render_into(&self, out: &mut String) {
        out.push_str(&format!("==== {} ====\n", self.name));
        out.push_str("Compiling files:\n");
        for file in &self.compiled {
            out.push_str(INDENT);
            out.push_str(&file.path);
            out.push_str(file.status.suffix());
            out.push('\n');
        }
        out.push_str(&format!("Exit code: {}\n", self.exit));
        for diagnostic in &self.diagnostics {
            for line in diagnostic.to_string().lines() {
                out.push_str(INDENT);
                out.push_str(line);
                out.push('\n');
            }
        }
        out.push('\n');
    }
}

/// Append-only sequence of build steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildLog {
    steps: Vec<BuildStep>,
}

impl BuildLog {
    pub fn new() -> Self {
        BuildLog::default()
    }

    /// Append a finished step.
    pub fn push(&mut self, step: BuildStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Render the whole log.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            step.render_into(&mut out);
        }
        out
    }
}

impl fmt::Display for BuildLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
