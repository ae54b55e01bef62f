//! Parsing of the compiler's textual report.
//!
//! ## Output messages
//!
//! ```text
//! OUTPUT: [/abs/src/a.kt, /abs/src/b.kt] -> /abs/out/A.class
//! ```
//!
//! Any line whose first token is `OUTPUT:` is an output message and must
//! match this grammar; a line that does not is a protocol error, never
//! silently skipped, because artifact attribution depends on it.
//!
//! ## Diagnostics
//!
//! Lines starting with `error:`, `warning:` or `info:` become diagnostics of
//! that severity. Every other non-blank line is kept as logging chatter.
//!
//! ## Lookup records
//!
//! The lookup side channel carries one tab-separated record per line:
//!
//! ```text
//! <abs path>\t<line>\t<column>\t<scope kind>\t<scope fq name>\t<name>
//! ```
//!
//! A line or column of `0` or below is the "no position" sentinel.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use super::{CompileError, Diagnostic, OutputEvent, Severity};
use crate::types::{Position, ScopeKind};

/// First token of an output message line.
pub const OUTPUT_PREFIX: &str = "OUTPUT:";

static OUTPUT_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^OUTPUT:\s*\[(?P<sources>[^\]]*)\]\s*->\s*(?P<output>\S(?:.*\S)?)\s*$").unwrap()
});

/// Structured content of a compiler's textual report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOutput {
    pub diagnostics: Vec<Diagnostic>,
    pub outputs: Vec<OutputEvent>,
}

/// Parse the compiler's report line by line.
pub fn parse_compiler_output(text: &str) -> Result<ParsedOutput, CompileError> {
    let mut parsed = ParsedOutput::default();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with(OUTPUT_PREFIX) {
            let event =
                parse_output_message(line).ok_or_else(|| CompileError::MalformedOutputMessage {
                    line_number: index + 1,
                    line: raw.to_string(),
                })?;
            parsed.outputs.push(event);
        } else {
            parsed.diagnostics.push(parse_diagnostic(line));
        }
    }

    Ok(parsed)
}

fn parse_output_message(line: &str) -> Option<OutputEvent> {
    let caps = OUTPUT_MESSAGE.captures(line)?;

    let sources_text = caps.name("sources")?.as_str().trim();
    let mut sources = Vec::new();
    if !sources_text.is_empty() {
        for source in sources_text.split(',') {
            let source = source.trim();
            if source.is_empty() || !Path::new(source).is_absolute() {
                return None;
            }
            sources.push(PathBuf::from(source));
        }
    }

    let output = PathBuf::from(caps.name("output")?.as_str());
    if !output.is_absolute() {
        return None;
    }

    Some(OutputEvent { sources, output })
}

fn parse_diagnostic(line: &str) -> Diagnostic {
    for severity in [Severity::Error, Severity::Warning, Severity::Info] {
        if let Some(message) = line
            .strip_prefix(severity.prefix())
            .and_then(|rest| rest.strip_prefix(':'))
        {
            return Diagnostic::new(severity, message.trim_start());
        }
    }
    Diagnostic::new(Severity::Logging, line)
}

/// One record read from the lookup side channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRecord {
    pub file: String,
    pub position: Position,
    pub scope_kind: ScopeKind,
    pub scope_fq_name: String,
    pub name: String,
}

/// Parse one lookup side-channel record.
pub fn parse_lookup_record(line: &str) -> Result<LookupRecord, String> {
    let fields: Vec<&str> = line.split('\t').collect();
    let [file, line_no, column, kind, scope, name] = fields.as_slice() else {
        return Err(format!("expected 6 tab-separated fields, found {}", fields.len()));
    };

    if file.is_empty() {
        return Err("empty file path".to_string());
    }
    let line_no: i64 = line_no
        .trim()
        .parse()
        .map_err(|_| format!("invalid line '{}'", line_no))?;
    let column: i64 = column
        .trim()
        .parse()
        .map_err(|_| format!("invalid column '{}'", column))?;
    let position = if line_no <= 0 || column <= 0 {
        Position::NO_POSITION
    } else {
        let line_no = u32::try_from(line_no).map_err(|_| format!("line {} too large", line_no))?;
        let column = u32::try_from(column).map_err(|_| format!("column {} too large", column))?;
        Position::new(line_no, column)
    };
    let scope_kind: ScopeKind = kind.parse()?;
    if name.is_empty() {
        return Err("empty name".to_string());
    }

    Ok(LookupRecord {
        file: file.to_string(),
        position,
        scope_kind,
        scope_fq_name: scope.to_string(),
        name: name.to_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod output_message_tests {
        use super::*;

        #[test]
        fn parses_sources_and_artifact() {
            let parsed =
                parse_compiler_output("OUTPUT: [/w/a.kt, /w/b.kt] -> /out/A.class\n").unwrap();
            assert_eq!(
                parsed.outputs,
                vec![OutputEvent {
                    sources: vec![PathBuf::from("/w/a.kt"), PathBuf::from("/w/b.kt")],
                    output: PathBuf::from("/out/A.class"),
                }]
            );
            assert!(parsed.diagnostics.is_empty());
        }

        #[test]
        fn empty_source_list_is_allowed() {
            let parsed =
                parse_compiler_output("OUTPUT: [] -> /out/META-INF/main.kotlin_module").unwrap();
            assert!(parsed.outputs[0].sources.is_empty());
        }

        #[test]
        fn artifact_path_may_contain_spaces() {
            let parsed = parse_compiler_output("OUTPUT: [/w/a.kt] -> /out dir/A.class  ").unwrap();
            assert_eq!(parsed.outputs[0].output, PathBuf::from("/out dir/A.class"));
        }

        #[test]
        fn malformed_output_line_is_fatal() {
            let text = "info: starting\nOUTPUT: /w/a.kt -> /out/A.class\n";
            match parse_compiler_output(text) {
                Err(CompileError::MalformedOutputMessage { line_number, line }) => {
                    assert_eq!(line_number, 2);
                    assert_eq!(line, "OUTPUT: /w/a.kt -> /out/A.class");
                }
                other => panic!("expected malformed output error, got {:?}", other),
            }
        }

        #[test]
        fn relative_paths_are_malformed() {
            assert!(parse_compiler_output("OUTPUT: [a.kt] -> /out/A.class").is_err());
            assert!(parse_compiler_output("OUTPUT: [/w/a.kt] -> A.class").is_err());
            assert!(parse_compiler_output("OUTPUT: [/w/a.kt, ] -> /out/A.class").is_err());
            assert!(parse_compiler_output("OUTPUT: [/w/a.kt] ->").is_err());
        }
    }

    mod diagnostic_tests {
        use super::*;

        #[test]
        fn severity_prefixes() {
            let text = "error: a.kt:1:1: boom\nwarning:  w\ninfo: i\nplain chatter\n\n";
            let parsed = parse_compiler_output(text).unwrap();
            let severities: Vec<Severity> =
                parsed.diagnostics.iter().map(|d| d.severity).collect();
            assert_eq!(
                severities,
                vec![
                    Severity::Error,
                    Severity::Warning,
                    Severity::Info,
                    Severity::Logging
                ]
            );
            assert_eq!(parsed.diagnostics[0].message, "a.kt:1:1: boom");
            assert_eq!(parsed.diagnostics[1].message, "w");
        }

        #[test]
        fn prefix_must_be_followed_by_colon() {
            let parsed = parse_compiler_output("errors were found").unwrap();
            assert_eq!(parsed.diagnostics[0].severity, Severity::Logging);
        }
    }

    mod lookup_record_tests {
        use super::*;

        #[test]
        fn parses_full_record() {
            let record = parse_lookup_record("/w/a.kt\t3\t9\tPACKAGE\tpkg\tfoo").unwrap();
            assert_eq!(record.file, "/w/a.kt");
            assert_eq!(record.position, Position::new(3, 9));
            assert_eq!(record.scope_kind, ScopeKind::Package);
            assert_eq!(record.scope_fq_name, "pkg");
            assert_eq!(record.name, "foo");
        }

        #[test]
        fn empty_scope_is_root() {
            let record = parse_lookup_record("/w/a.kt\t1\t1\tc\t\tA").unwrap();
            assert_eq!(record.scope_fq_name, "");
            assert_eq!(record.scope_kind, ScopeKind::Classifier);
        }

        #[test]
        fn non_positive_coordinates_are_the_sentinel() {
            let record = parse_lookup_record("/w/a.kt\t-1\t-1\tp\tpkg\tfoo").unwrap();
            assert_eq!(record.position, Position::NO_POSITION);
        }

        #[test]
        fn rejects_bad_records() {
            assert!(parse_lookup_record("/w/a.kt\t1\t1\tp\tpkg").is_err());
            assert!(parse_lookup_record("/w/a.kt\tx\t1\tp\tpkg\tfoo").is_err());
            assert!(parse_lookup_record("/w/a.kt\t1\t1\tmodule\tpkg\tfoo").is_err());
            assert!(parse_lookup_record("\t1\t1\tp\tpkg\tfoo").is_err());
            assert!(parse_lookup_record("/w/a.kt\t1\t1\tp\tpkg\t").is_err());
        }
    }
}
