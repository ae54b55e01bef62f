//! External compiler process adapter.
//!
//! Protocol, per invocation:
//! 1. A scratch directory receives `manifest.json` (files, output directory,
//!    classpath, lookup file path, `requires_position`) and an empty
//!    `lookups.tsv`.
//! 2. The compiler command runs with the manifest path appended as its last
//!    argument and exported as `RETRACE_MANIFEST`.
//! 3. stdout then stderr are parsed as the compiler report
//!    (see [`super::messages`]).
//! 4. Every record in `lookups.tsv` is replayed into the step's tracker.
//!
//! On unix the compiler runs in its own process group. A timeout kills the
//! whole group, so wrapper scripts cannot keep the step alive through a
//! forked child. A timed-out invocation reports `INTERNAL_ERROR` with a
//! timeout diagnostic; its partial output and lookups are discarded.
//!
//! The scratch directory belongs to one invocation, so the tracker passed in
//! is the only sink the compiler's lookups can reach.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tempfile::TempDir;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

use super::messages::{parse_compiler_output, parse_lookup_record};
use super::{CompileError, CompileReport, CompileRequest, Compiler, Diagnostic, ExitStatus};
use crate::recorder::LookupTracker;

/// Environment variable carrying the manifest path.
pub const MANIFEST_ENV: &str = "RETRACE_MANIFEST";

/// Default limit for one compiler invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    files: &'a [PathBuf],
    output_dir: &'a Path,
    classpath: &'a [PathBuf],
    lookups_file: &'a Path,
    requires_position: bool,
}

/// Runs an external compiler command for each build step.
#[derive(Debug, Clone)]
pub struct ProcessCompiler {
    command: Vec<String>,
    timeout: Duration,
}

impl ProcessCompiler {
    /// Create an adapter for `command` (program followed by fixed arguments).
    pub fn new(command: Vec<String>) -> Self {
        ProcessCompiler {
            command,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the per-invocation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn write_manifest(
        &self,
        scratch: &Path,
        request: &CompileRequest,
        requires_position: bool,
    ) -> Result<(PathBuf, PathBuf), CompileError> {
        let manifest_path = scratch.join("manifest.json");
        let lookups_path = scratch.join("lookups.tsv");
        fs::write(&lookups_path, b"").map_err(|source| CompileError::Io {
            path: lookups_path.clone(),
            source,
        })?;

        let manifest = Manifest {
            files: &request.files,
            output_dir: &request.output_dir,
            classpath: &request.classpath,
            lookups_file: &lookups_path,
            requires_position,
        };
        let json = serde_json::to_vec_pretty(&manifest)?;
        fs::write(&manifest_path, json).map_err(|source| CompileError::Io {
            path: manifest_path.clone(),
            source,
        })?;
        Ok((manifest_path, lookups_path))
    }

    fn replay_lookups(
        &self,
        lookups_path: &Path,
        tracker: &dyn LookupTracker,
    ) -> Result<usize, CompileError> {
        let content = fs::read_to_string(lookups_path).map_err(|source| CompileError::Io {
            path: lookups_path.to_path_buf(),
            source,
        })?;
        let mut count = 0usize;
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record = parse_lookup_record(line).map_err(|reason| CompileError::MalformedLookup {
                path: lookups_path.to_path_buf(),
                line_number: index + 1,
                reason,
            })?;
            tracker.record(
                &record.file,
                record.position,
                &record.scope_fq_name,
                record.scope_kind,
                &record.name,
            );
            count += 1;
        }
        Ok(count)
    }
}

/// Run the compiler in a fresh process group.
#[cfg(unix)]
fn isolate(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate(_cmd: &mut Command) {}

/// Kill the compiler and everything it spawned.
fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        // The child leads its own group, so its pid is the group id.
        unsafe {
            libc::killpg(child.id() as libc::pid_t, libc::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

impl Compiler for ProcessCompiler {
    fn name(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or("<none>")
    }

    fn compile(
        &self,
        request: &CompileRequest,
        tracker: &dyn LookupTracker,
    ) -> Result<CompileReport, CompileError> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(CompileError::EmptyCommand);
        };

        let scratch = TempDir::new().map_err(|source| CompileError::Io {
            path: std::env::temp_dir(),
            source,
        })?;
        let (manifest_path, lookups_path) =
            self.write_manifest(scratch.path(), request, tracker.requires_position())?;
        fs::create_dir_all(&request.output_dir).map_err(|source| CompileError::Io {
            path: request.output_dir.clone(),
            source,
        })?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(&manifest_path)
            .env(MANIFEST_ENV, &manifest_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        isolate(&mut cmd);

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| CompileError::Spawn {
            program: program.clone(),
            source,
        })?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let io_err = |source| CompileError::Io {
            path: PathBuf::from(program),
            source,
        };
        let Some(status) = child.wait_timeout(self.timeout).map_err(io_err)? else {
            kill_process_group(&mut child);
            warn!(
                compiler = %program,
                timeout = ?self.timeout,
                "compiler timed out and was killed"
            );
            // The drain threads are left detached: a descendant that escaped
            // the group may still hold the pipes open.
            return Ok(CompileReport {
                exit: ExitStatus::InternalError,
                diagnostics: vec![Diagnostic::error(format!(
                    "compiler timed out after {:?}",
                    self.timeout
                ))],
                outputs: Vec::new(),
            });
        };
        let exit = status
            .code()
            .map(ExitStatus::from_code)
            .unwrap_or(ExitStatus::InternalError);

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();
        let mut text = String::from_utf8_lossy(&stdout).into_owned();
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&String::from_utf8_lossy(&stderr));

        let parsed = parse_compiler_output(&text)?;
        let lookups = self.replay_lookups(&lookups_path, tracker)?;

        debug!(
            compiler = %program,
            files = request.files.len(),
            exit = %exit,
            outputs = parsed.outputs.len(),
            lookups,
            elapsed = ?start.elapsed(),
            "compiler finished"
        );

        Ok(CompileReport {
            exit,
            diagnostics: parsed.diagnostics,
            outputs: parsed.outputs,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
