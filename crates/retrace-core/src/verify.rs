//! Lookup verification against annotated expectations.
//!
//! After a file is compiled, its recorded lookups are rendered back into the
//! compiled (annotation-free) text as inline annotations and the result is
//! compared with the annotated source the test author wrote.
//!
//! Rendering, per line:
//! 1. lookups are grouped by column and groups are visited in ascending
//!    column order with a rolling byte cursor, so each splice happens before
//!    any column offset it could disturb
//! 2. a group renders as one annotation, duplicates (same kind, scope and
//!    name) collapsed to their first occurrence
//! 3. the annotation is spliced in immediately before its column
//!
//! Lines are then joined back with `\n`.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::annotate::{find_annotations, format_entry, wrap_entries};
use crate::diff::line_diff;
use crate::recorder::RecordedLookups;
use crate::text::{byte_offset_to_position, column_to_byte_offset, split_lines};
use crate::types::{LookupInfo, Position};

/// Errors raised while verifying one file's lookups.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The compiled source still contains an annotation comment.
    #[error("stale annotation {text} left in compiled source {}:{line}:{column}", file.display())]
    StaleAnnotation {
        file: PathBuf,
        line: u32,
        column: u32,
        text: String,
    },

    /// The compiler recorded a lookup without a position.
    #[error("lookup of '{name}' in {} has no position (compiler ignored requires_position)", file.display())]
    MissingPosition { file: PathBuf, name: String },

    /// The compiler recorded a lookup at a position the file does not have.
    #[error("lookup of '{name}' at {position} is outside the text of {}", file.display())]
    PositionOutOfRange {
        file: PathBuf,
        position: Position,
        name: String,
    },

    /// Rendered lookups differ from the expected annotated source.
    #[error("lookups in {} do not match expected annotations:\n{diff}", file.display())]
    Mismatch { file: PathBuf, diff: String },
}

impl VerifyError {
    /// File the error is about.
    pub fn file(&self) -> &Path {
        match self {
            VerifyError::StaleAnnotation { file, .. }
            | VerifyError::MissingPosition { file, .. }
            | VerifyError::PositionOutOfRange { file, .. }
            | VerifyError::Mismatch { file, .. } => file,
        }
    }
}

/// Fail if `compiled` still contains any annotation comment.
pub fn check_no_annotations(file: &Path, compiled: &str) -> Result<(), VerifyError> {
    match find_annotations(compiled).into_iter().next() {
        None => Ok(()),
        Some(range) => {
            let (line, column) = byte_offset_to_position(compiled, range.start);
            Err(VerifyError::StaleAnnotation {
                file: file.to_path_buf(),
                line,
                column,
                text: compiled[range].to_string(),
            })
        }
    }
}

/// Render `lookups` into `compiled` as inline annotations.
pub fn render_annotated(
    file: &Path,
    compiled: &str,
    lookups: &[LookupInfo],
    recorded: &RecordedLookups,
) -> Result<String, VerifyError> {
    let out_of_range = |lookup: &LookupInfo| VerifyError::PositionOutOfRange {
        file: file.to_path_buf(),
        position: lookup.position,
        name: recorded.resolve(lookup.name).to_string(),
    };

    let mut lines: Vec<String> = split_lines(compiled).into_iter().map(str::to_string).collect();

    // line -> column -> lookups in recording order
    let mut by_line: BTreeMap<u32, BTreeMap<u32, Vec<&LookupInfo>>> = BTreeMap::new();
    for lookup in lookups {
        if !lookup.position.is_valid() {
            return Err(VerifyError::MissingPosition {
                file: file.to_path_buf(),
                name: recorded.resolve(lookup.name).to_string(),
            });
        }
        if lookup.position.line as usize > lines.len() {
            return Err(out_of_range(lookup));
        }
        by_line
            .entry(lookup.position.line)
            .or_default()
            .entry(lookup.position.column)
            .or_default()
            .push(lookup);
    }

    for (line_no, columns) in by_line {
        let Some(line) = lines.get_mut(line_no as usize - 1) else {
            continue;
        };

        let mut rendered = String::with_capacity(line.len() + 16 * columns.len());
        let mut start = 0usize;
        for (column, group) in columns {
            let Some(offset) = column_to_byte_offset(line, column) else {
                return Err(out_of_range(group[0]));
            };
            let rest = &line[offset..];

            let mut seen = HashSet::new();
            let entries: Vec<String> = group
                .iter()
                .filter(|lookup| seen.insert(lookup.identity()))
                .map(|lookup| {
                    format_entry(
                        lookup.scope_kind,
                        recorded.resolve(lookup.scope_fq_name),
                        recorded.resolve(lookup.name),
                        rest,
                    )
                })
                .collect();

            rendered.push_str(&line[start..offset]);
            rendered.push_str(&wrap_entries(&entries));
            start = offset;
        }
        rendered.push_str(&line[start..]);
        *line = rendered;
    }

    Ok(lines.join("\n"))
}

/// Verify one compiled file against its expected annotated source.
///
/// Returns the rendered text on success so callers can store it.
pub fn verify_file(
    file: &Path,
    compiled: &str,
    expected: &str,
    recorded: &RecordedLookups,
) -> Result<String, VerifyError> {
    check_no_annotations(file, compiled)?;
    let lookups = recorded.for_file(&file.to_string_lossy());
    let actual = render_annotated(file, compiled, &lookups, recorded)?;
    debug!(file = %file.display(), lookups = lookups.len(), "rendered lookups");
    if actual == expected {
        Ok(actual)
    } else {
        Err(VerifyError::Mismatch {
            file: file.to_path_buf(),
            diff: line_diff(expected, &actual),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
