//! Shared helpers for integration tests.
//!
//! [`ToyCompiler`] is a tiny in-process "compiler" for a Kotlin-shaped toy
//! language, enough to drive the incremental engine end to end:
//!
//! - `class X` and `fun f` declare names
//! - `X(` or `f(` references a name; the lookup is recorded at the use
//!   site (classifier scope for capitalised names, package scope otherwise)
//! - an unknown reference is an `unresolved reference` error and the file
//!   produces no artifact
//! - each compiled file produces `out/<stem>.sym` listing its declarations;
//!   later steps learn earlier declarations from the `.sym` files on the
//!   classpath
//! - a successful compile also writes `out/META-INF/main.kotlin_module`

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use retrace::compiler::{
    CompileError, CompileReport, CompileRequest, Compiler, Diagnostic, ExitStatus, OutputEvent,
    Severity,
};
use retrace::recorder::LookupTracker;
use retrace::types::{Position, ScopeKind};

const KEYWORDS: &[&str] = &["class", "fun", "val", "var", "package", "return"];

/// One identifier with its 1-based line and char column.
struct Token {
    text: String,
    line: u32,
    column: u32,
    followed_by_paren: bool,
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for (line_index, line) in text.split('\n').enumerate() {
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            if chars[i].is_alphabetic() || chars[i] == '_' {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token {
                    text: chars[start..i].iter().collect(),
                    line: line_index as u32 + 1,
                    column: start as u32 + 1,
                    followed_by_paren: chars.get(i) == Some(&'('),
                });
            } else {
                i += 1;
            }
        }
    }
    tokens
}

fn declarations(tokens: &[Token]) -> Vec<String> {
    tokens
        .windows(2)
        .filter(|pair| pair[0].text == "class" || pair[0].text == "fun")
        .map(|pair| format!("{} {}", pair[0].text, pair[1].text))
        .collect()
}

fn classpath_declarations(classpath: &[PathBuf]) -> BTreeSet<String> {
    let mut known = BTreeSet::new();
    for dir in classpath {
        let Ok(entries) = fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("sym") {
                continue;
            }
            if let Ok(text) = fs::read_to_string(&path) {
                for line in text.lines() {
                    if let Some((_, name)) = line.split_once(' ') {
                        known.insert(name.to_string());
                    }
                }
            }
        }
    }
    known
}

/// In-process toy compiler.
#[derive(Debug, Default)]
pub struct ToyCompiler;

impl Compiler for ToyCompiler {
    fn name(&self) -> &str {
        "toy"
    }

    fn compile(
        &self,
        request: &CompileRequest,
        tracker: &dyn LookupTracker,
    ) -> Result<CompileReport, CompileError> {
        let mut sources = Vec::new();
        for file in &request.files {
            let text = fs::read_to_string(file).map_err(|source| CompileError::Io {
                path: file.clone(),
                source,
            })?;
            sources.push((file.clone(), tokenize(&text)));
        }

        let mut known = classpath_declarations(&request.classpath);
        for (_, tokens) in &sources {
            for decl in declarations(tokens) {
                if let Some((_, name)) = decl.split_once(' ') {
                    known.insert(name.to_string());
                }
            }
        }

        let mut report = CompileReport::ok();
        report.diagnostics.push(Diagnostic::new(
            Severity::Logging,
            format!("toy: compiling {} file(s)", sources.len()),
        ));

        let mut compiled = Vec::new();
        for (file, tokens) in &sources {
            let key = file.to_string_lossy();
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mut failed = false;
            for (i, token) in tokens.iter().enumerate() {
                let declared_here = i > 0 && matches!(tokens[i - 1].text.as_str(), "class" | "fun");
                if !token.followed_by_paren
                    || declared_here
                    || KEYWORDS.contains(&token.text.as_str())
                {
                    continue;
                }
                if known.contains(&token.text) {
                    let kind = if token.text.starts_with(char::is_uppercase) {
                        ScopeKind::Classifier
                    } else {
                        ScopeKind::Package
                    };
                    tracker.record(
                        &key,
                        Position::new(token.line, token.column),
                        "",
                        kind,
                        &token.text,
                    );
                } else {
                    failed = true;
                    report.diagnostics.push(Diagnostic::error(format!(
                        "{}:{}:{}: unresolved reference: {}",
                        file_name, token.line, token.column, token.text
                    )));
                }
            }
            if failed {
                continue;
            }

            let stem = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let output = request.output_dir.join(format!("{}.sym", stem));
            let mut listing = declarations(tokens).join("\n");
            listing.push('\n');
            fs::write(&output, listing).map_err(|source| CompileError::Io {
                path: output.clone(),
                source,
            })?;
            report.outputs.push(OutputEvent {
                sources: vec![file.clone()],
                output,
            });
            compiled.push(file.clone());
        }

        if compiled.len() == sources.len() {
            let meta_dir = request.output_dir.join("META-INF");
            let module = meta_dir.join("main.kotlin_module");
            fs::create_dir_all(&meta_dir)
                .and_then(|_| fs::write(&module, b"module"))
                .map_err(|source| CompileError::Io {
                    path: module.clone(),
                    source,
                })?;
            report.outputs.push(OutputEvent {
                sources: compiled,
                output: module,
            });
        } else {
            report.exit = ExitStatus::CompilationError;
        }

        Ok(report)
    }
}

/// Compiler driven by a closure.
pub struct FnCompiler<F>(pub F);

impl<F> Compiler for FnCompiler<F>
where
    F: Fn(&CompileRequest, &dyn LookupTracker) -> CompileReport,
{
    fn name(&self) -> &str {
        "fn"
    }

    fn compile(
        &self,
        request: &CompileRequest,
        tracker: &dyn LookupTracker,
    ) -> Result<CompileReport, CompileError> {
        Ok((self.0)(request, tracker))
    }
}

/// Create a fixture directory from `(relative path, content)` pairs.
pub fn write_fixture(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("create fixture dir");
    for (relative, content) in files {
        let path = dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture subdir");
        }
        fs::write(&path, content).expect("write fixture file");
    }
    dir
}

/// Directory holding checked-in fixtures.
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Whether golden files should be rewritten.
pub fn update_mode() -> bool {
    std::env::var("RETRACE_UPDATE_GOLDEN").is_ok()
}

/// Position of the first occurrence of `needle` in `text` (1-based, chars).
pub fn position_of(text: &str, needle: &str) -> Position {
    for (index, line) in text.split('\n').enumerate() {
        if let Some(offset) = line.find(needle) {
            let column = line[..offset].chars().count() as u32 + 1;
            return Position::new(index as u32 + 1, column);
        }
    }
    panic!("'{}' not found", needle);
}
