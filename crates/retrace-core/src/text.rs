//! Text position utilities for line and column conversions.
//!
//! ## Coordinate Conventions
//!
//! - Lines and columns are **1-indexed** (matching compiler diagnostics)
//! - Columns count Unicode scalar values, so a tab or a multi-byte
//!   character occupies exactly one column
//! - Byte offsets are **0-indexed**
//!
//! Unlike editor-facing helpers, nothing here clamps: a position that does
//! not exist in the text is reported as `None`, because a lookup recorded
//! outside its file is a compiler protocol bug.

/// Split text into lines on `\n` only.
///
/// Joining the result with `"\n"` reproduces the input exactly, including a
/// trailing newline (which yields a final empty line) and any `\r`.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

/// Convert a 1-indexed char column to a byte offset within `line`.
///
/// Column `chars + 1` addresses the end of the line. Returns `None` for
/// column 0 or columns past the end.
pub fn column_to_byte_offset(line: &str, column: u32) -> Option<usize> {
    if column == 0 {
        return None;
    }
    let target = (column - 1) as usize;
    let mut chars = 0usize;
    for (offset, _) in line.char_indices() {
        if chars == target {
            return Some(offset);
        }
        chars += 1;
    }
    if chars == target {
        Some(line.len())
    } else {
        None
    }
}

/// Convert a byte offset in `content` to a 1-indexed (line, column) pair.
pub fn byte_offset_to_position(content: &str, offset: usize) -> (u32, u32) {
    let offset = offset.min(content.len());
    let before = &content[..floor_char_boundary(content, offset)];
    let line = before.matches('\n').count() as u32 + 1;
    let line_start = before.rfind('\n').map(|p| p + 1).unwrap_or(0);
    (line, before[line_start..].chars().count() as u32 + 1)
}

fn floor_char_boundary(content: &str, mut offset: usize) -> usize {
    while offset > 0 && !content.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

// ============================================================================
// Tests
// ============================================================================
