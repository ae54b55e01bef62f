//! Incremental build orchestration.
//!
//! [`IncrementalRunner`] drives a fixture through its builds, strictly one
//! after another:
//!
//! - **Initial**: every fixture source is dirty. Logged as `INITIAL BUILD`.
//! - **Step N**: the plan's operations for step N are applied to the working
//!   tree; modified, added and touched files are dirty. Logged as `STEP N`.
//! - **Terminal**: the rendered log is compared with the golden build log
//!   (or written to it in update mode).
//!
//! Every build runs the same pipeline:
//! 1. write each dirty file's stripped text to the working tree, keeping the
//!    annotated text as the expectation
//! 2. invalidate the file's previous outputs and delete those artifacts
//! 3. compile the dirty files with a fresh [`LookupRecorder`]
//! 4. attribute reported artifacts to their sources
//! 5. verify each compiled file's lookups against its expectation
//! 6. append the step to the [`BuildLog`]
//!
//! Deleted files are invalidated and removed but never compiled or listed.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use crate::annotate::strip_annotations;
use crate::buildlog::{BuildLog, BuildStep, CompiledFile, StepName};
use crate::compiler::{CompileError, CompileReport, CompileRequest, Compiler};
use crate::diff::line_diff;
use crate::fixture::{Fixture, FixtureError, WorkTree};
use crate::outputs::SourceToOutputMap;
use crate::plan::{slash_path, Modification, PlanError, PlannedStep};
use crate::recorder::LookupRecorder;
use crate::types::LookupStatus;
use crate::verify::{verify_file, VerifyError};

// ============================================================================
// Errors
// ============================================================================

fn join_errors(errors: &[VerifyError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors that stop an incremental run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Working-tree or artifact I/O failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Fixture(#[from] FixtureError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    /// The compiler protocol broke during a step.
    #[error("{step}: {source}")]
    Compile {
        step: StepName,
        #[source]
        source: CompileError,
    },

    /// A verification failure that cannot be reported as a diff.
    #[error(transparent)]
    Verify(#[from] VerifyError),

    /// Rendered lookups differ from expectations in one or more files.
    #[error(
        "{step}: lookups differ from expectations in {} file(s)\n{}",
        .mismatches.len(),
        join_errors(.mismatches)
    )]
    LookupMismatch {
        step: StepName,
        mismatches: Vec<VerifyError>,
    },

    #[error("golden build log {} not found; rerun in update mode to create it", path.display())]
    MissingGoldenLog { path: PathBuf },

    #[error("build log differs from {}:\n{diff}", path.display())]
    BuildLogMismatch { path: PathBuf, diff: String },
}

// ============================================================================
// Options / Report
// ============================================================================

/// Knobs for a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Search path entries appended after the output directory.
    pub classpath: Vec<PathBuf>,
    /// Artifact extensions excluded from source attribution.
    pub metadata_extensions: Vec<String>,
    /// Write the golden log instead of comparing against it.
    pub update_golden: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            classpath: Vec::new(),
            metadata_extensions: vec!["kotlin_module".to_string()],
            update_golden: false,
        }
    }
}

/// What happened to the golden build log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GoldenOutcome {
    Matched,
    Written,
}

/// Result of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub log: BuildLog,
    pub outputs: SourceToOutputMap,
    pub golden: GoldenOutcome,
    pub golden_path: PathBuf,
}

// ============================================================================
// Runner
// ============================================================================

/// Drives one fixture through its initial build and incremental steps.
pub struct IncrementalRunner<'a> {
    compiler: &'a dyn Compiler,
    fixture: &'a Fixture,
    tree: WorkTree,
    options: RunOptions,
    outputs: SourceToOutputMap,
    /// Annotated text of every live source, keyed by source-relative path.
    expectations: BTreeMap<PathBuf, String>,
    log: BuildLog,
}

impl<'a> IncrementalRunner<'a> {
    pub fn new(
        compiler: &'a dyn Compiler,
        fixture: &'a Fixture,
        tree: WorkTree,
        options: RunOptions,
    ) -> Self {
        let outputs = SourceToOutputMap::new(options.metadata_extensions.iter().cloned());
        IncrementalRunner {
            compiler,
            fixture,
            tree,
            options,
            outputs,
            expectations: BTreeMap::new(),
            log: BuildLog::new(),
        }
    }

    /// Run every build, then check the golden log.
    pub fn run(mut self) -> Result<RunReport, RunError> {
        self.run_builds()?;
        self.finish()
    }

    /// Run the initial build and every planned step.
    pub fn run_builds(&mut self) -> Result<(), RunError> {
        self.initial_build()?;
        let fixture = self.fixture;
        for step in fixture.plan().steps() {
            self.incremental_step(step)?;
        }
        Ok(())
    }

    /// Compare (or write) the golden build log and produce the report.
    pub fn finish(self) -> Result<RunReport, RunError> {
        let rendered = self.log.render();
        let path = self.fixture.build_log_path().to_path_buf();

        let golden = if self.options.update_golden {
            fs::write(&path, &rendered).map_err(|source| RunError::Io {
                path: path.clone(),
                source,
            })?;
            info!(path = %path.display(), "updated golden build log");
            GoldenOutcome::Written
        } else {
            let expected = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(RunError::MissingGoldenLog { path });
                }
                Err(source) => return Err(RunError::Io { path, source }),
            };
            if expected != rendered {
                return Err(RunError::BuildLogMismatch {
                    diff: line_diff(&expected, &rendered),
                    path,
                });
            }
            GoldenOutcome::Matched
        };

        Ok(RunReport {
            log: self.log,
            outputs: self.outputs,
            golden,
            golden_path: path,
        })
    }

    /// Build log so far.
    pub fn log(&self) -> &BuildLog {
        &self.log
    }

    /// Current source-to-artifact mapping.
    pub fn outputs(&self) -> &SourceToOutputMap {
        &self.outputs
    }

    /// Working tree the runner mutates.
    pub fn tree(&self) -> &WorkTree {
        &self.tree
    }

    fn initial_build(&mut self) -> Result<(), RunError> {
        let mut dirty = BTreeMap::new();
        for source in self.fixture.sources() {
            dirty.insert(source.clone(), self.fixture.read(source)?);
        }
        self.build(StepName::Initial, dirty)
    }

    fn incremental_step(&mut self, step: &PlannedStep) -> Result<(), RunError> {
        let name = StepName::Step(step.number);
        let mut dirty = BTreeMap::new();

        for modification in &step.modifications {
            match modification {
                Modification::Modify { target, content } => {
                    dirty.insert(target.clone(), self.fixture.read(content)?);
                }
                Modification::Touch { target } => {
                    let expected = self.live_expectation(step.number, modification)?;
                    dirty.insert(target.clone(), expected);
                }
                Modification::Delete { target } => {
                    self.live_expectation(step.number, modification)?;
                    self.delete_source(target)?;
                }
            }
        }

        self.build(name, dirty)
    }

    fn live_expectation(&self, step: u32, modification: &Modification) -> Result<String, RunError> {
        let target = modification.target();
        match self.expectations.get(target) {
            Some(text) if self.tree.has_source(target) => Ok(text.clone()),
            _ => Err(PlanError::MissingTarget {
                step,
                operation: modification.operation(),
                target: slash_path(target),
            }
            .into()),
        }
    }

    fn delete_source(&mut self, relative: &Path) -> Result<(), RunError> {
        let path = self.tree.source_path(relative);
        self.invalidate(&path)?;
        self.tree.remove_source(relative)?;
        self.expectations.remove(relative);
        debug!(file = %slash_path(relative), "deleted source");
        Ok(())
    }

    /// Drop `source`'s outputs from the map and from disk.
    fn invalidate(&mut self, source: &Path) -> Result<(), RunError> {
        let Some(artifacts) = self.outputs.invalidate(source) else {
            return Ok(());
        };
        for artifact in artifacts {
            match fs::remove_file(&artifact) {
                Ok(()) => debug!(artifact = %artifact.display(), "deleted artifact"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!(artifact = %artifact.display(), "invalidated artifact already missing");
                }
                Err(source) => {
                    return Err(RunError::Io {
                        path: artifact,
                        source,
                    })
                }
            }
        }
        Ok(())
    }

    fn build(&mut self, name: StepName, dirty: BTreeMap<PathBuf, String>) -> Result<(), RunError> {
        let _span = info_span!("build", step = %name, compiler = self.compiler.name()).entered();

        let mut files = Vec::with_capacity(dirty.len());
        for (relative, annotated) in &dirty {
            let path = self
                .tree
                .write_source(relative, &strip_annotations(annotated))?;
            self.invalidate(&path)?;
            self.expectations.insert(relative.clone(), annotated.clone());
            files.push(path);
        }

        let recorder = LookupRecorder::new();
        let report = if files.is_empty() {
            CompileReport::ok()
        } else {
            let mut classpath = vec![self.tree.out_dir().to_path_buf()];
            classpath.extend(self.options.classpath.iter().cloned());
            let request = CompileRequest {
                files: files.clone(),
                output_dir: self.tree.out_dir().to_path_buf(),
                classpath,
            };
            self.compiler
                .compile(&request, &recorder)
                .map_err(|source| RunError::Compile { step: name, source })?
        };
        let recorded = recorder.finish();

        let mut attributed: BTreeSet<&Path> = BTreeSet::new();
        for event in &report.outputs {
            for source in &event.sources {
                self.outputs.record(source, &event.output);
                attributed.insert(source.as_path());
            }
        }

        let mut compiled = Vec::with_capacity(dirty.len());
        let mut mismatches = Vec::new();
        for ((relative, expected), path) in dirty.iter().zip(&files) {
            let key = path.to_string_lossy();
            let status = if report.exit.is_ok() || attributed.contains(path.as_path()) {
                LookupStatus::from_count(recorded.count_for_file(&key))
            } else {
                LookupStatus::Unknown
            };
            compiled.push(CompiledFile {
                path: slash_path(relative),
                status,
            });

            let text = self.tree.read_source(relative)?;
            match verify_file(path, &text, expected, &recorded) {
                Ok(_) => {}
                Err(mismatch @ VerifyError::Mismatch { .. }) => mismatches.push(mismatch),
                Err(fatal) => return Err(fatal.into()),
            }
        }

        info!(
            step = %name,
            dirty = files.len(),
            exit = %report.exit,
            lookups = recorded.len(),
            mismatches = mismatches.len(),
            "build finished"
        );

        let diagnostics = report.reportable_diagnostics().cloned().collect();
        self.log
            .push(BuildStep::new(name, compiled, report.exit, diagnostics));

        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(RunError::LookupMismatch {
                step: name,
                mismatches,
            })
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{ExitStatus, OutputEvent};
    use crate::fixture::FixtureOptions;
    use crate::recorder::LookupTracker;
    use crate::types::{Position, ScopeKind};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Emits one artifact per file, records a lookup of `A` at every
    /// occurrence of `A()` in other files and remembers each request.
    #[derive(Default)]
    struct ScriptedCompiler {
        requests: Mutex<Vec<Vec<PathBuf>>>,
        exit: Option<ExitStatus>,
    }

    impl Compiler for ScriptedCompiler {
        fn name(&self) -> &str {
            "scripted"
        }

        fn compile(
            &self,
            request: &CompileRequest,
            tracker: &dyn LookupTracker,
        ) -> Result<CompileReport, CompileError> {
            self.requests.lock().unwrap().push(request.files.clone());
            let mut report = CompileReport::ok();
            for file in &request.files {
                let text = fs::read_to_string(file).unwrap();
                for (i, line) in text.lines().enumerate() {
                    if let Some(col) = line.find("A()") {
                        tracker.record(
                            &file.to_string_lossy(),
                            Position::new(i as u32 + 1, col as u32 + 1),
                            "",
                            ScopeKind::Classifier,
                            "A",
                        );
                    }
                }
                let stem = file.file_stem().unwrap().to_string_lossy().to_uppercase();
                let output = request.output_dir.join(format!("{}.class", stem));
                fs::write(&output, b"").unwrap();
                report.outputs.push(OutputEvent {
                    sources: vec![file.clone()],
                    output,
                });
            }
            if let Some(exit) = self.exit {
                report.exit = exit;
                report.outputs.clear();
            }
            Ok(report)
        }
    }

    fn write(root: &Path, rel: &str, content: &str) {
        fs::write(root.join(rel), content).unwrap();
    }

    fn setup(files: &[(&str, &str)]) -> (TempDir, TempDir, Fixture) {
        let fixture_dir = TempDir::new().unwrap();
        for (rel, content) in files {
            write(fixture_dir.path(), rel, content);
        }
        let work = TempDir::new().unwrap();
        let fixture = Fixture::load(fixture_dir.path(), &FixtureOptions::default()).unwrap();
        (fixture_dir, work, fixture)
    }

    #[test]
    fn initial_build_compiles_everything_and_verifies() {
        let (_f, work, fixture) = setup(&[
            ("a.kt", "class A\n"),
            ("b.kt", "val x = /*c:<root>*/A()\n"),
        ]);
        let compiler = ScriptedCompiler::default();
        let tree = WorkTree::create(work.path()).unwrap();
        let mut runner = IncrementalRunner::new(&compiler, &fixture, tree, RunOptions::default());
        runner.run_builds().unwrap();

        assert_eq!(
            runner.log().render(),
            "==== INITIAL BUILD ====\nCompiling files:\n  a.kt (no lookups)\n  b.kt\nExit code: OK\n\n"
        );
        let b = runner.tree().source_path(Path::new("b.kt"));
        assert_eq!(fs::read_to_string(&b).unwrap(), "val x = A()\n");
        assert_eq!(runner.outputs().len(), 2);
    }

    #[test]
    fn lookup_mismatch_reports_every_file() {
        let (_f, work, fixture) = setup(&[("a.kt", "val y = A()\n"), ("b.kt", "val x = A()\n")]);
        let compiler = ScriptedCompiler::default();
        let tree = WorkTree::create(work.path()).unwrap();
        let mut runner = IncrementalRunner::new(&compiler, &fixture, tree, RunOptions::default());
        match runner.run_builds() {
            Err(RunError::LookupMismatch { step, mismatches }) => {
                assert_eq!(step, StepName::Initial);
                assert_eq!(mismatches.len(), 2);
                assert!(mismatches[0].to_string().contains("+val y = /*c:<root>*/A()"));
            }
            other => panic!("expected lookup mismatch, got {:?}", other.err()),
        }
    }

    #[test]
    fn modified_file_alone_is_recompiled_and_invalidated() {
        let (_f, work, fixture) = setup(&[
            ("a.kt", "class A\n"),
            ("b.kt", "class B\n"),
            ("b.kt.new.1", "class B2\n"),
        ]);
        let compiler = ScriptedCompiler::default();
        let tree = WorkTree::create(work.path()).unwrap();
        let mut runner = IncrementalRunner::new(&compiler, &fixture, tree, RunOptions::default());
        runner.run_builds().unwrap();

        let requests = compiler.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].len(), 1);
        assert!(requests[1][0].ends_with("b.kt"));

        let a = runner.tree().source_path(Path::new("a.kt"));
        assert_eq!(
            runner.outputs().outputs(&a).unwrap().len(),
            1,
            "untouched file keeps its outputs"
        );
        assert!(runner
            .log()
            .render()
            .contains("==== STEP 1 ====\nCompiling files:\n  b.kt (no lookups)\n"));
    }

    #[test]
    fn deleted_file_loses_outputs_and_is_not_listed() {
        let (_f, work, fixture) = setup(&[
            ("a.kt", "class A\n"),
            ("b.kt", "class B\n"),
            ("b.kt.delete.1", ""),
            ("a.kt.touch.1", ""),
        ]);
        let compiler = ScriptedCompiler::default();
        let tree = WorkTree::create(work.path()).unwrap();
        let mut runner = IncrementalRunner::new(&compiler, &fixture, tree, RunOptions::default());
        runner.run_builds().unwrap();

        let b = runner.tree().source_path(Path::new("b.kt"));
        assert!(!b.exists());
        assert!(!runner.outputs().contains(&b));
        assert!(!runner.tree().out_dir().join("B.class").exists());
        let step = &runner.log().steps()[1];
        assert_eq!(step.compiled.len(), 1);
        assert_eq!(step.compiled[0].path, "a.kt");
    }

    #[test]
    fn touching_a_missing_file_is_a_plan_error() {
        let (_f, work, fixture) = setup(&[("a.kt", "class A\n"), ("z.kt.touch.1", "")]);
        let compiler = ScriptedCompiler::default();
        let tree = WorkTree::create(work.path()).unwrap();
        let mut runner = IncrementalRunner::new(&compiler, &fixture, tree, RunOptions::default());
        let err = runner.run_builds().unwrap_err();
        assert!(matches!(
            err,
            RunError::Plan(PlanError::MissingTarget { step: 1, operation: "touch", .. })
        ));
    }

    #[test]
    fn failed_compile_without_outputs_is_unknown() {
        let (_f, work, fixture) = setup(&[("a.kt", "class A\n")]);
        let compiler = ScriptedCompiler {
            exit: Some(ExitStatus::CompilationError),
            ..ScriptedCompiler::default()
        };
        let tree = WorkTree::create(work.path()).unwrap();
        let mut runner = IncrementalRunner::new(&compiler, &fixture, tree, RunOptions::default());
        runner.run_builds().unwrap();
        let step = &runner.log().steps()[0];
        assert_eq!(step.compiled[0].status, LookupStatus::Unknown);
        assert_eq!(step.exit, ExitStatus::CompilationError);
    }

    #[test]
    fn golden_log_is_written_then_matched() {
        let (fixture_dir, work, fixture) = setup(&[("a.kt", "class A\n")]);
        let compiler = ScriptedCompiler::default();

        let missing = IncrementalRunner::new(
            &compiler,
            &fixture,
            WorkTree::create(work.path()).unwrap(),
            RunOptions::default(),
        )
        .run()
        .unwrap_err();
        assert!(matches!(missing, RunError::MissingGoldenLog { .. }));

        let options = RunOptions {
            update_golden: true,
            ..RunOptions::default()
        };
        let report = IncrementalRunner::new(
            &compiler,
            &fixture,
            WorkTree::create(work.path()).unwrap(),
            options,
        )
        .run()
        .unwrap();
        assert_eq!(report.golden, GoldenOutcome::Written);
        assert!(fixture_dir.path().join("build.log").exists());

        let report = IncrementalRunner::new(
            &compiler,
            &fixture,
            WorkTree::create(work.path()).unwrap(),
            RunOptions::default(),
        )
        .run()
        .unwrap();
        assert_eq!(report.golden, GoldenOutcome::Matched);
    }

    #[test]
    fn golden_log_mismatch_carries_diff() {
        let (fixture_dir, work, fixture) = setup(&[("a.kt", "class A\n")]);
        write(fixture_dir.path(), "build.log", "==== INITIAL BUILD ====\n");
        let compiler = ScriptedCompiler::default();
        let err = IncrementalRunner::new(
            &compiler,
            &fixture,
            WorkTree::create(work.path()).unwrap(),
            RunOptions::default(),
        )
        .run()
        .unwrap_err();
        match err {
            RunError::BuildLogMismatch { diff, .. } => {
                assert!(diff.contains("+Compiling files:"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
