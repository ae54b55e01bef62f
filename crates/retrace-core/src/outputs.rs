//! Source file to output artifact tracking across build steps.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Mapping from each compiled source file to the artifacts it produced.
///
/// Sets are unions: recording the same pair twice is a no-op. Artifacts whose
/// extension is listed in `metadata_extensions` are module-level metadata and
/// are never attributed to a source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceToOutputMap {
    entries: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    #[serde(skip)]
    metadata_extensions: Vec<String>,
}

impl SourceToOutputMap {
    /// Create an empty map excluding artifacts with the given extensions.
    pub fn new<I, S>(metadata_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SourceToOutputMap {
            entries: BTreeMap::new(),
            metadata_extensions: metadata_extensions.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `output` is a module-metadata artifact.
    pub fn is_metadata(&self, output: &Path) -> bool {
        output
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.metadata_extensions.iter().any(|m| m == ext))
            .unwrap_or(false)
    }

    /// Remove and return the outputs previously produced by `source`.
    ///
    /// Must be called before `source` is recompiled; the caller deletes the
    /// returned artifacts.
    pub fn invalidate(&mut self, source: &Path) -> Option<BTreeSet<PathBuf>> {
        let removed = self.entries.remove(source);
        if let Some(outputs) = &removed {
            debug!(
                source = %source.display(),
                outputs = outputs.len(),
                "invalidated outputs"
            );
        }
        removed
    }

    /// Union `output` into the output set of `source`.
    ///
    /// Returns `false` when the pair was not recorded, either because it was
    /// already present or because `output` is a metadata artifact.
    pub fn record(&mut self, source: &Path, output: &Path) -> bool {
        if self.is_metadata(output) {
            return false;
        }
        self.entries
            .entry(source.to_path_buf())
            .or_default()
            .insert(output.to_path_buf())
    }

    /// Outputs currently attributed to `source`.
    pub fn outputs(&self, source: &Path) -> Option<&BTreeSet<PathBuf>> {
        self.entries.get(source)
    }

    /// Whether `source` has any recorded outputs.
    pub fn contains(&self, source: &Path) -> bool {
        self.entries.contains_key(source)
    }

    /// Iterate over all sources and their outputs, sorted by source path.
    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &BTreeSet<PathBuf>)> {
        self.entries.iter()
    }

    /// Number of sources with recorded outputs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no source has recorded outputs.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
