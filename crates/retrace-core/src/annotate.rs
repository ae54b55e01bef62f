//! Lookup annotation lexing and formatting.
//!
//! Expected lookups are written inline in test sources as block comments:
//!
//! ```text
//! val x = /*p:pkg*/foo() + /*c:pkg.A(bar) p:pkg(bar)*/bar
//! ```
//!
//! An annotation is a `/* ... */` comment whose opening `/*` is not followed
//! by another `*`. Doc comments (`/** ... */`, including the empty `/**/`)
//! are never annotations; the lexer skips over them whole so that comment
//! text inside a doc comment is left alone. An unterminated `/*` is not an
//! annotation either.
//!
//! When the body of a candidate annotation contains another `/*`, the inner
//! opener wins and the outer one is plain text. A `/*` inside a string
//! literal or a line comment therefore never swallows source up to the next
//! annotation's `*/`.
//!
//! Each annotation entry has the form `k:scope(name)`:
//! - `k` is the scope kind's short letter
//! - `scope` is the fully-qualified scope name, `<root>` when empty
//! - `(name)` is omitted when the source text at the insertion point already
//!   shows the name (see [`name_is_apparent`])

use std::ops::Range;

use crate::types::ScopeKind;

/// Rendering of the empty (root) scope name.
pub const ROOT_SCOPE: &str = "<root>";

/// Declaration keywords that make the looked-up name apparent when the text
/// at the insertion point starts with one of them.
pub const DECLARATION_KEYWORDS: &[&str] = &[
    "interface ",
    "class ",
    "enum class ",
    "object ",
    "fun ",
    "operator fun ",
    "val ",
    "var ",
];

// ============================================================================
// Lexing
// ============================================================================

/// Byte ranges of all annotations in `text`, in source order.
pub fn find_annotations(text: &str) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut i = 0usize;

    while i + 1 < bytes.len() {
        if bytes[i] != b'/' || bytes[i + 1] != b'*' {
            i += 1;
            continue;
        }
        let body_start = i + 2;
        let Some(close) = find_close(bytes, body_start) else {
            // unterminated: nothing after this point can be a comment
            break;
        };
        if bytes.get(body_start) != Some(&b'*') {
            if let Some(inner) = find_open(bytes, body_start, close) {
                i = inner;
                continue;
            }
            found.push(i..close + 2);
        }
        i = close + 2;
    }

    found
}

fn find_close(bytes: &[u8], from: usize) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(2)
        .position(|w| w == b"*/")
        .map(|p| from + p)
}

fn find_open(bytes: &[u8], from: usize, to: usize) -> Option<usize> {
    bytes
        .get(from..to)?
        .windows(2)
        .position(|w| w == b"/*")
        .map(|p| from + p)
}

/// Remove every annotation from `text`, leaving all other text untouched.
pub fn strip_annotations(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut start = 0usize;
    for range in find_annotations(text) {
        stripped.push_str(&text[start..range.start]);
        start = range.end;
    }
    stripped.push_str(&text[start..]);
    stripped
}

// ============================================================================
// Formatting
// ============================================================================

/// Whether `rest` (the text right after the insertion point) already shows
/// `name`, making a `(name)` suffix redundant.
pub fn name_is_apparent(rest: &str, name: &str) -> bool {
    rest.starts_with(name)
        || rest
            .strip_prefix('$')
            .is_some_and(|after| after.starts_with(name))
        || DECLARATION_KEYWORDS.iter().any(|kw| rest.starts_with(kw))
}

/// Format one annotation entry.
pub fn format_entry(scope_kind: ScopeKind, scope_fq_name: &str, name: &str, rest: &str) -> String {
    let scope = if scope_fq_name.is_empty() {
        ROOT_SCOPE
    } else {
        scope_fq_name
    };
    if name_is_apparent(rest, name) {
        format!("{}:{}", scope_kind.short(), scope)
    } else {
        format!("{}:{}({})", scope_kind.short(), scope, name)
    }
}

/// Wrap formatted entries into one inline annotation.
pub fn wrap_entries(entries: &[String]) -> String {
    format!("/*{}*/", entries.join(" "))
}

// ============================================================================
// Tests
// ============================================================================
