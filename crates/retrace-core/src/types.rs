//! Value types shared by the recorder, the verifier and the build log.
//!
//! This module contains the position/scope model of a lookup event:
//! - [`Position`]: 1-indexed line and column of a lookup site
//! - [`ScopeKind`]: the kind of scope a name was resolved against
//! - [`LookupInfo`]: one recorded name-resolution event (interned strings)
//! - [`LookupStatus`]: how a compiled file's lookup count is reported

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::intern::StrId;

// ============================================================================
// Position
// ============================================================================

/// Position of a lookup site in a source file.
///
/// - `line`: 1-indexed line number
/// - `column`: 1-indexed column, counted in Unicode scalar values (chars)
///
/// Tabs and multi-byte characters each count as one column, which is the
/// unit the annotation renderer splices with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed, chars).
    pub column: u32,
}

impl Position {
    /// Sentinel reported by compilers that do not track positions.
    pub const NO_POSITION: Position = Position { line: 0, column: 0 };

    /// Create a new position.
    pub fn new(line: u32, column: u32) -> Self {
        Position { line, column }
    }

    /// Whether this is a real position (both coordinates 1-indexed).
    pub fn is_valid(&self) -> bool {
        self.line >= 1 && self.column >= 1
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

// ============================================================================
// ScopeKind
// ============================================================================

/// Category of the scope a lookup resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeKind {
    /// A class, interface or object member scope.
    Classifier,
    /// A package scope.
    Package,
}

impl ScopeKind {
    /// Short form used inside annotations: lowercase first letter of the name.
    pub fn short(&self) -> char {
        match self {
            ScopeKind::Classifier => 'c',
            ScopeKind::Package => 'p',
        }
    }

    /// Full uppercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Classifier => "CLASSIFIER",
            ScopeKind::Package => "PACKAGE",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeKind {
    type Err = String;

    /// Accepts the full name in any case, or the short letter.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CLASSIFIER" | "C" => Ok(ScopeKind::Classifier),
            "PACKAGE" | "P" => Ok(ScopeKind::Package),
            _ => Err(format!("unknown scope kind '{}'", s)),
        }
    }
}

// ============================================================================
// LookupInfo
// ============================================================================

/// One recorded name-resolution event.
///
/// String fields are handles into the recorder's interner; resolve them with
/// [`crate::recorder::RecordedLookups::resolve`]. Two events are identical
/// when all handles and the position match, since the interner hands out a
/// single handle per distinct string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LookupInfo {
    /// File the lookup happened in.
    pub file_path: StrId,
    /// Lookup site.
    pub position: Position,
    /// Kind of the resolving scope.
    pub scope_kind: ScopeKind,
    /// Fully-qualified scope name; the empty string is the root scope.
    pub scope_fq_name: StrId,
    /// Simple name of the resolved symbol.
    pub name: StrId,
}

impl LookupInfo {
    /// The part of the event that identifies it within a column group.
    pub fn identity(&self) -> (ScopeKind, StrId, StrId) {
        (self.scope_kind, self.scope_fq_name, self.name)
    }
}

// ============================================================================
// LookupStatus
// ============================================================================

/// How a compiled file's lookup measurement appears in the build log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "count", rename_all = "snake_case")]
pub enum LookupStatus {
    /// The file was compiled and recorded this many lookups (at least one).
    Count(usize),
    /// The file was compiled and recorded nothing.
    NoLookups,
    /// No trustworthy measurement exists for the file.
    Unknown,
}

impl LookupStatus {
    /// Status for a file with a known measurement.
    pub fn from_count(count: usize) -> Self {
        if count == 0 {
            LookupStatus::NoLookups
        } else {
            LookupStatus::Count(count)
        }
    }

    /// Suffix appended after the file name in the build log.
    pub fn suffix(&self) -> &'static str {
        match self {
            LookupStatus::Count(_) => "",
            LookupStatus::NoLookups => " (no lookups)",
            LookupStatus::Unknown => " (unknown)",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
