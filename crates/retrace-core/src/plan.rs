//! Modification plans: which files change in each incremental step.
//!
//! A fixture directory describes its steps with sibling files named after the
//! file they act on:
//!
//! | Fixture entry         | Step `N` operation                          |
//! |-----------------------|---------------------------------------------|
//! | `<file>.new.<N>`      | write this content to `<file>` (modify/add) |
//! | `<file>.touch.<N>`    | mark `<file>` dirty, content unchanged      |
//! | `<file>.delete.<N>`   | delete `<file>`                             |
//!
//! Steps run in ascending `N` starting at 1 with no gaps. Removing or
//! modifying a whole directory (a package) is not modelled by the
//! incremental engine and is rejected.
//!
//! This module is pure: it works on fixture-relative entries handed to it by
//! [`crate::fixture`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

static PLAN_FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<target>.+)\.(?P<op>new|touch|delete)\.(?P<step>\d+)$").unwrap()
});

/// Render a relative path with forward slashes.
pub fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// ============================================================================
// Errors
// ============================================================================

/// Errors in a fixture's modification plan.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A plan file whose step number is zero or out of range.
    #[error("invalid step number in plan file '{name}'")]
    InvalidStepNumber { name: String },

    /// Step numbers skip a value.
    #[error("modification plan has no step {missing} (steps must be numbered 1..={last} without gaps)")]
    MissingStep { missing: u32, last: u32 },

    /// Two operations on the same file in one step.
    #[error("step {step} has more than one operation on '{target}'")]
    ConflictingOperations { step: u32, target: String },

    /// Directory-level changes are outside the incremental model.
    #[error("step {step}: '{target}' is a directory; package removal or modification is unsupported")]
    UnsupportedDirectoryOperation { step: u32, target: String },

    /// Touch or delete of a file that does not exist at that step.
    #[error("step {step}: cannot {operation} '{target}', the file does not exist")]
    MissingTarget {
        step: u32,
        operation: &'static str,
        target: String,
    },
}

// ============================================================================
// Model
// ============================================================================

/// One file operation in a step. Paths are relative to the source root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Modification {
    /// Replace or add `target` with the content of fixture file `content`.
    Modify { target: PathBuf, content: PathBuf },
    /// Recompile `target` without changing it.
    Touch { target: PathBuf },
    /// Remove `target`.
    Delete { target: PathBuf },
}

impl Modification {
    /// File the operation acts on.
    pub fn target(&self) -> &Path {
        match self {
            Modification::Modify { target, .. }
            | Modification::Touch { target }
            | Modification::Delete { target } => target,
        }
    }

    /// Operation name as it appears in fixture file names.
    pub fn operation(&self) -> &'static str {
        match self {
            Modification::Modify { .. } => "new",
            Modification::Touch { .. } => "touch",
            Modification::Delete { .. } => "delete",
        }
    }
}

impl fmt::Display for Modification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modification::Modify { target, content } => write!(
                f,
                "modify {} <- {}",
                slash_path(target),
                slash_path(content)
            ),
            Modification::Touch { target } => write!(f, "touch {}", slash_path(target)),
            Modification::Delete { target } => write!(f, "delete {}", slash_path(target)),
        }
    }
}

/// All operations of one step, sorted by target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    pub number: u32,
    pub modifications: Vec<Modification>,
}

/// Ordered modification steps of a fixture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModificationPlan {
    steps: Vec<PlannedStep>,
}

/// Parse a plan file name into (target name, operation, step text).
fn split_plan_name(name: &str) -> Option<(&str, &str, &str)> {
    let caps = PLAN_FILE_NAME.captures(name)?;
    Some((
        caps.name("target")?.as_str(),
        caps.name("op")?.as_str(),
        caps.name("step")?.as_str(),
    ))
}

/// Whether a fixture file name denotes a plan operation rather than a source.
pub fn is_plan_file(name: &str) -> bool {
    split_plan_name(name).is_some()
}

impl ModificationPlan {
    /// Build a plan from fixture entries.
    ///
    /// `entries` yields every fixture-relative path together with whether it
    /// is a directory. Entries that are not plan files are ignored apart from
    /// being used to reject directory deletions.
    pub fn from_entries<I>(entries: I) -> Result<Self, PlanError>
    where
        I: IntoIterator<Item = (PathBuf, bool)>,
    {
        let entries: Vec<(PathBuf, bool)> = entries.into_iter().collect();
        let directories: BTreeSet<&Path> = entries
            .iter()
            .filter(|(_, is_dir)| *is_dir)
            .map(|(path, _)| path.as_path())
            .collect();

        let mut by_step: BTreeMap<u32, BTreeMap<PathBuf, Modification>> = BTreeMap::new();
        for (path, is_dir) in &entries {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some((target_name, op, step_text)) = split_plan_name(name) else {
                continue;
            };
            let step = match step_text.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(PlanError::InvalidStepNumber {
                        name: slash_path(path),
                    })
                }
            };
            let target = path.with_file_name(target_name);
            if *is_dir || directories.contains(target.as_path()) {
                return Err(PlanError::UnsupportedDirectoryOperation {
                    step,
                    target: slash_path(&target),
                });
            }

            let modification = match op {
                "new" => Modification::Modify {
                    target: target.clone(),
                    content: path.clone(),
                },
                "touch" => Modification::Touch {
                    target: target.clone(),
                },
                _ => Modification::Delete {
                    target: target.clone(),
                },
            };
            let step_ops = by_step.entry(step).or_default();
            if step_ops.insert(target.clone(), modification).is_some() {
                return Err(PlanError::ConflictingOperations {
                    step,
                    target: slash_path(&target),
                });
            }
        }

        let last = by_step.keys().next_back().copied().unwrap_or(0);
        if let Some(missing) = (1..=last).find(|n| !by_step.contains_key(n)) {
            return Err(PlanError::MissingStep { missing, last });
        }

        let steps = by_step
            .into_iter()
            .map(|(number, ops)| PlannedStep {
                number,
                modifications: ops.into_values().collect(),
            })
            .collect();
        Ok(ModificationPlan { steps })
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    /// Number of incremental steps (the initial build is not counted).
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the fixture has only an initial build.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Display for ModificationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            writeln!(f, "STEP {}", step.number)?;
            for modification in &step.modifications {
                writeln!(f, "  {}", modification)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(names: &[&str]) -> Vec<(PathBuf, bool)> {
        names.iter().map(|n| (PathBuf::from(n), false)).collect()
    }

    mod name_tests {
        use super::*;

        #[test]
        fn recognizes_plan_files() {
            assert!(is_plan_file("a.kt.new.1"));
            assert!(is_plan_file("a.kt.touch.12"));
            assert!(is_plan_file("a.kt.delete.2"));
            assert!(!is_plan_file("a.kt"));
            assert!(!is_plan_file("new.kt"));
            assert!(!is_plan_file("build.log"));
        }

        #[test]
        fn slash_path_joins_components() {
            assert_eq!(slash_path(Path::new("pkg/sub/a.kt")), "pkg/sub/a.kt");
        }
    }

    mod plan_tests {
        use super::*;

        #[test]
        fn no_plan_files_means_empty_plan() {
            let plan =
                ModificationPlan::from_entries(files(&["a.kt", "b.kt", "build.log"])).unwrap();
            assert!(plan.is_empty());
        }

        #[test]
        fn steps_are_ordered_and_operations_sorted() {
            let plan = ModificationPlan::from_entries(files(&[
                "a.kt",
                "b.kt",
                "b.kt.new.1",
                "a.kt.touch.1",
                "a.kt.delete.2",
            ]))
            .unwrap();

            assert_eq!(plan.len(), 2);
            let step1 = &plan.steps()[0];
            assert_eq!(step1.number, 1);
            assert_eq!(
                step1.modifications,
                vec![
                    Modification::Touch {
                        target: PathBuf::from("a.kt")
                    },
                    Modification::Modify {
                        target: PathBuf::from("b.kt"),
                        content: PathBuf::from("b.kt.new.1"),
                    },
                ]
            );
            assert_eq!(
                plan.steps()[1].modifications,
                vec![Modification::Delete {
                    target: PathBuf::from("a.kt")
                }]
            );
        }

        #[test]
        fn nested_targets_keep_their_directory() {
            let plan = ModificationPlan::from_entries(vec![
                (PathBuf::from("pkg"), true),
                (PathBuf::from("pkg/c.kt"), false),
                (PathBuf::from("pkg/c.kt.new.1"), false),
            ])
            .unwrap();
            assert_eq!(
                plan.steps()[0].modifications[0].target(),
                Path::new("pkg/c.kt")
            );
        }

        #[test]
        fn gap_in_step_numbers_is_rejected() {
            let err =
                ModificationPlan::from_entries(files(&["a.kt.new.1", "a.kt.new.3"])).unwrap_err();
            assert!(matches!(err, PlanError::MissingStep { missing: 2, last: 3 }));
        }

        #[test]
        fn step_zero_is_rejected() {
            assert!(matches!(
                ModificationPlan::from_entries(files(&["a.kt.new.0"])),
                Err(PlanError::InvalidStepNumber { .. })
            ));
        }

        #[test]
        fn non_numeric_suffix_is_not_a_plan_file() {
            let plan =
                ModificationPlan::from_entries(files(&["a.new.kt", "a.kt.touch.x"])).unwrap();
            assert!(plan.is_empty());
        }

        #[test]
        fn two_operations_on_one_file_conflict() {
            let err = ModificationPlan::from_entries(files(&["a.kt.new.1", "a.kt.delete.1"]))
                .unwrap_err();
            match err {
                PlanError::ConflictingOperations { step, target } => {
                    assert_eq!(step, 1);
                    assert_eq!(target, "a.kt");
                }
                other => panic!("unexpected error {:?}", other),
            }
        }

        #[test]
        fn deleting_a_package_directory_is_unsupported() {
            let err = ModificationPlan::from_entries(vec![
                (PathBuf::from("pkg"), true),
                (PathBuf::from("pkg/a.kt"), false),
                (PathBuf::from("pkg.delete.1"), false),
            ])
            .unwrap_err();
            assert!(matches!(err, PlanError::UnsupportedDirectoryOperation { step: 1, .. }));
        }

        #[test]
        fn plan_entry_that_is_a_directory_is_unsupported() {
            let err = ModificationPlan::from_entries(vec![(PathBuf::from("pkg.new.1"), true)])
                .unwrap_err();
            assert!(matches!(err, PlanError::UnsupportedDirectoryOperation { .. }));
        }

        #[test]
        fn display_lists_steps() {
            let plan =
                ModificationPlan::from_entries(files(&["a.kt.new.1", "b.kt.delete.1"])).unwrap();
            assert_eq!(
                plan.to_string(),
                "STEP 1\n  modify a.kt <- a.kt.new.1\n  delete b.kt\n"
            );
        }
    }
}
