//! Line-level diff rendering for content mismatches.
//!
//! Every failed comparison (annotated source or build log) is reported with
//! a diff in this format, so a failure points at the diverging lines rather
//! than just "not equal".

use difference::{Changeset, Difference};

/// Unchanged lines shown around each change.
const CONTEXT_LINES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Same,
    Removed,
    Added,
}

impl Tag {
    fn marker(self) -> char {
        match self {
            Tag::Same => ' ',
            Tag::Removed => '-',
            Tag::Added => '+',
        }
    }
}

/// Render a unified-style line diff between `expected` and `actual`.
///
/// Returns an empty string when the texts are identical. Hunks are headed
/// with the 1-indexed line number in `expected` where they start.
pub fn line_diff(expected: &str, actual: &str) -> String {
    if expected == actual {
        return String::new();
    }

    let changeset = Changeset::new(expected, actual, "\n");
    let mut lines: Vec<(Tag, &str)> = Vec::new();
    for chunk in &changeset.diffs {
        let (tag, text) = match chunk {
            Difference::Same(text) => (Tag::Same, text),
            Difference::Rem(text) => (Tag::Removed, text),
            Difference::Add(text) => (Tag::Added, text),
        };
        lines.extend(text.split('\n').map(|line| (tag, line)));
    }

    let mut keep = vec![false; lines.len()];
    for (i, (tag, _)) in lines.iter().enumerate() {
        if *tag != Tag::Same {
            let from = i.saturating_sub(CONTEXT_LINES);
            let to = (i + CONTEXT_LINES).min(lines.len() - 1);
            keep[from..=to].iter_mut().for_each(|k| *k = true);
        }
    }

    let mut out = String::from("--- expected\n+++ actual\n");
    let mut expected_line = 1usize;
    let mut in_hunk = false;
    for (i, (tag, text)) in lines.iter().enumerate() {
        if keep[i] {
            if !in_hunk {
                out.push_str(&format!("@@ line {} @@\n", expected_line));
                in_hunk = true;
            }
            out.push(tag.marker());
            out.push_str(text);
            out.push('\n');
        } else {
            in_hunk = false;
        }
        if *tag != Tag::Added {
            expected_line += 1;
        }
    }
    out
}
