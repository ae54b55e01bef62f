//! String interning for recorded lookups.
//!
//! A build records the same file paths, scope names and symbol names many
//! thousands of times. The [`StringInterner`] stores each distinct string
//! once and hands out a copyable [`StrId`] handle for it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Handle to an interned string.
///
/// Handles are only meaningful for the interner that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrId(pub u32);

impl StrId {
    /// Create a new string handle.
    pub fn new(id: u32) -> Self {
        StrId(id)
    }
}

impl fmt::Display for StrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "str_{}", self.0)
    }
}

/// Arena of canonical strings with index-based handles.
#[derive(Debug, Default)]
pub struct StringInterner {
    ids: HashMap<Arc<str>, StrId>,
    strings: Vec<Arc<str>>,
    bytes: usize,
}

impl StringInterner {
    /// Create an empty interner.
    pub fn new() -> Self {
        StringInterner::default()
    }

    /// Return the handle for `text`, storing it on first sight.
    pub fn intern(&mut self, text: &str) -> StrId {
        if let Some(&id) = self.ids.get(text) {
            return id;
        }
        let id = StrId::new(self.strings.len() as u32);
        let canonical: Arc<str> = Arc::from(text);
        self.bytes += canonical.len();
        self.strings.push(Arc::clone(&canonical));
        self.ids.insert(canonical, id);
        id
    }

    /// Look up an already-interned string without inserting it.
    pub fn get(&self, text: &str) -> Option<StrId> {
        self.ids.get(text).copied()
    }

    /// Resolve a handle back to its string.
    ///
    /// Returns the empty string for handles this interner never produced.
    pub fn resolve(&self, id: StrId) -> &str {
        self.strings
            .get(id.0 as usize)
            .map(|s| s.as_ref())
            .unwrap_or("")
    }

    /// Number of distinct strings stored.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Whether nothing has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Total bytes of distinct string content stored.
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}
