//! Fixture discovery and working-tree preparation.
//!
//! A fixture is a directory holding the annotated initial sources, the
//! modification plan files (see [`crate::plan`]), an optional `retrace.toml`
//! and the golden build log. The engine never compiles inside the fixture:
//! sources are copied (stripped) into a separate [`WorkTree`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::CONFIG_FILE_NAME;
use crate::plan::{is_plan_file, slash_path, ModificationPlan, PlanError};

/// Errors loading a fixture or preparing a working tree.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// The fixture directory does not exist.
    #[error("fixture directory not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The fixture has no initial source files.
    #[error("fixture {} contains no source files", path.display())]
    NoSources { path: PathBuf },

    /// An exclude pattern is not a valid glob.
    #[error("invalid exclude pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// Directory traversal failed.
    #[error("failed to walk fixture: {0}")]
    Walk(#[from] walkdir::Error),

    /// File I/O failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The modification plan is invalid.
    #[error(transparent)]
    Plan(#[from] PlanError),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> FixtureError + '_ {
    move |source| FixtureError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// What counts as a source when scanning a fixture.
#[derive(Debug, Clone)]
pub struct FixtureOptions {
    /// Extensions of initial source files (without the dot).
    pub source_extensions: Vec<String>,
    /// Glob patterns (fixture-relative, forward slashes) to skip.
    pub exclude: Vec<String>,
    /// File name of the golden build log.
    pub build_log: String,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        FixtureOptions {
            source_extensions: vec!["kt".to_string()],
            exclude: Vec::new(),
            build_log: "build.log".to_string(),
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, FixtureError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| FixtureError::InvalidGlob {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| FixtureError::InvalidGlob {
        pattern: patterns.join(", "),
        source,
    })
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

/// A loaded fixture directory.
#[derive(Debug, Clone)]
pub struct Fixture {
    root: PathBuf,
    sources: Vec<PathBuf>,
    plan: ModificationPlan,
    build_log: PathBuf,
}

impl Fixture {
    /// Scan `root` for initial sources and the modification plan.
    pub fn load(root: &Path, options: &FixtureOptions) -> Result<Self, FixtureError> {
        if !root.is_dir() {
            return Err(FixtureError::NotFound {
                path: root.to_path_buf(),
            });
        }
        let exclude = build_globset(&options.exclude)?;

        let mut entries: Vec<(PathBuf, bool)> = Vec::new();
        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
        {
            let entry = entry?;
            if entry.depth() == 0 {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(root)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| entry.path().to_path_buf());
            if exclude.is_match(slash_path(&relative)) {
                continue;
            }
            entries.push((relative, entry.file_type().is_dir()));
        }

        let mut sources: Vec<PathBuf> = entries
            .iter()
            .filter(|(path, is_dir)| !is_dir && is_initial_source(path, options))
            .map(|(path, _)| path.clone())
            .collect();
        sources.sort();
        if sources.is_empty() {
            return Err(FixtureError::NoSources {
                path: root.to_path_buf(),
            });
        }

        let plan = ModificationPlan::from_entries(entries)?;
        debug!(
            fixture = %root.display(),
            sources = sources.len(),
            steps = plan.len(),
            "loaded fixture"
        );

        Ok(Fixture {
            root: root.to_path_buf(),
            sources,
            plan,
            build_log: root.join(&options.build_log),
        })
    }

    /// Fixture directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Initial source files, relative to the fixture root, sorted.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Incremental steps after the initial build.
    pub fn plan(&self) -> &ModificationPlan {
        &self.plan
    }

    /// Path of the golden build log.
    pub fn build_log_path(&self) -> &Path {
        &self.build_log
    }

    /// Read a fixture-relative file.
    pub fn read(&self, relative: &Path) -> Result<String, FixtureError> {
        let path = self.root.join(relative);
        fs::read_to_string(&path).map_err(io_error(&path))
    }
}

fn is_initial_source(path: &Path, options: &FixtureOptions) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if is_plan_file(name) || name == options.build_log || name == CONFIG_FILE_NAME {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| options.source_extensions.iter().any(|s| s == ext))
        .unwrap_or(false)
}

// ============================================================================
// Working tree
// ============================================================================

/// Directories the incremental build mutates in place.
///
/// `src/` holds the stripped sources the compiler sees, `out/` the
/// artifacts. Both are emptied when the tree is created; no two runs may
/// share a working tree.
#[derive(Debug, Clone)]
pub struct WorkTree {
    root: PathBuf,
    src_dir: PathBuf,
    out_dir: PathBuf,
}

impl WorkTree {
    /// Create (or reset) the working tree under `root`.
    pub fn create(root: &Path) -> Result<Self, FixtureError> {
        fs::create_dir_all(root).map_err(io_error(root))?;
        let root = root.canonicalize().map_err(io_error(root))?;
        let src_dir = root.join("src");
        let out_dir = root.join("out");
        for dir in [&src_dir, &out_dir] {
            if dir.exists() {
                fs::remove_dir_all(dir).map_err(io_error(dir))?;
            }
            fs::create_dir_all(dir).map_err(io_error(dir))?;
        }
        Ok(WorkTree {
            root,
            src_dir,
            out_dir,
        })
    }

    /// Canonical root of the tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the compiled sources.
    pub fn src_dir(&self) -> &Path {
        &self.src_dir
    }

    /// Directory receiving artifacts.
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Absolute path of a source-relative file.
    pub fn source_path(&self, relative: &Path) -> PathBuf {
        self.src_dir.join(relative)
    }

    /// Write a source file, creating parent directories.
    pub fn write_source(&self, relative: &Path, content: &str) -> Result<PathBuf, FixtureError> {
        let path = self.source_path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        fs::write(&path, content).map_err(io_error(&path))?;
        Ok(path)
    }

    /// Read a source file as the compiler saw it.
    pub fn read_source(&self, relative: &Path) -> Result<String, FixtureError> {
        let path = self.source_path(relative);
        fs::read_to_string(&path).map_err(io_error(&path))
    }

    /// Remove a source file.
    pub fn remove_source(&self, relative: &Path) -> Result<(), FixtureError> {
        let path = self.source_path(relative);
        fs::remove_file(&path).map_err(io_error(&path))
    }

    /// Whether a source file currently exists.
    pub fn has_source(&self, relative: &Path) -> bool {
        self.source_path(relative).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    mod fixture_tests {
        use super::*;

        #[test]
        fn discovers_sources_and_plan() {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "a.kt", "class A");
            write(dir.path(), "pkg/b.kt", "class B");
            write(dir.path(), "b.kt.new.1", "class B2");
            write(dir.path(), "build.log", "");
            write(dir.path(), "notes.txt", "");
            write(dir.path(), ".hidden/c.kt", "class C");

            let fixture = Fixture::load(dir.path(), &FixtureOptions::default()).unwrap();
            assert_eq!(
                fixture.sources(),
                &[PathBuf::from("a.kt"), PathBuf::from("pkg/b.kt")]
            );
            assert_eq!(fixture.plan().len(), 1);
            assert_eq!(fixture.build_log_path(), dir.path().join("build.log"));
        }

        #[test]
        fn exclude_patterns_skip_files() {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "a.kt", "class A");
            write(dir.path(), "gen/g.kt", "class G");

            let options = FixtureOptions {
                exclude: vec!["gen/**".to_string()],
                ..FixtureOptions::default()
            };
            let fixture = Fixture::load(dir.path(), &options).unwrap();
            assert_eq!(fixture.sources(), &[PathBuf::from("a.kt")]);
        }

        #[test]
        fn invalid_glob_is_reported() {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "a.kt", "class A");
            let options = FixtureOptions {
                exclude: vec!["[".to_string()],
                ..FixtureOptions::default()
            };
            let err = Fixture::load(dir.path(), &options).unwrap_err();
            assert!(matches!(err, FixtureError::InvalidGlob { .. }));
        }

        #[test]
        fn missing_directory_and_empty_fixture() {
            let dir = TempDir::new().unwrap();
            let err =
                Fixture::load(&dir.path().join("nope"), &FixtureOptions::default()).unwrap_err();
            assert!(matches!(err, FixtureError::NotFound { .. }));

            write(dir.path(), "readme.md", "");
            let err = Fixture::load(dir.path(), &FixtureOptions::default()).unwrap_err();
            assert!(matches!(err, FixtureError::NoSources { .. }));
        }

        #[test]
        fn plan_errors_surface() {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "a.kt", "class A");
            write(dir.path(), "a.kt.new.2", "class A");
            let err = Fixture::load(dir.path(), &FixtureOptions::default()).unwrap_err();
            assert!(matches!(err, FixtureError::Plan(PlanError::MissingStep { .. })));
        }
    }

    mod work_tree_tests {
        use super::*;

        #[test]
        fn create_resets_src_and_out() {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "src/stale.kt", "old");
            write(dir.path(), "out/Stale.class", "old");
            write(dir.path(), "keep.txt", "kept");

            let tree = WorkTree::create(dir.path()).unwrap();
            assert!(!tree.src_dir().join("stale.kt").exists());
            assert!(!tree.out_dir().join("Stale.class").exists());
            assert!(tree.root().join("keep.txt").exists());
        }

        #[test]
        fn write_read_remove_source() {
            let dir = TempDir::new().unwrap();
            let tree = WorkTree::create(dir.path()).unwrap();
            let rel = Path::new("pkg/a.kt");

            let abs = tree.write_source(rel, "class A").unwrap();
            assert!(abs.is_absolute());
            assert!(tree.has_source(rel));
            assert_eq!(tree.read_source(rel).unwrap(), "class A");

            tree.remove_source(rel).unwrap();
            assert!(!tree.has_source(rel));
            assert!(matches!(tree.remove_source(rel), Err(FixtureError::Io { .. })));
        }
    }
}
