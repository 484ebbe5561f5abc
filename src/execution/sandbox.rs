//! Sandboxed snippet execution: vet, stage, run in a separate interpreter, harvest.

use std::{collections::BTreeMap, fs, path::Path, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    config::SandboxSettings,
    process::{self, InterpreterOptions, ProcessError, ResourceLimits},
};

use super::{
    harness::{HarnessStatus, BOOTSTRAP},
    harvest::{harvest, Harvest},
    session::{ExecutionSession, ScratchDirs},
    ExecutionError, ExecutionRequest, ExecutionResult, PolicyGate,
};

/// Snippet executor bound to one [`ExecutionSession`].
///
/// `execute` blocks only the awaiting task; concurrent calls each get their
/// own scratch directory and share the session's artifact list.
#[derive(Debug, Clone)]
pub struct Sandbox {
    session: Arc<ExecutionSession>,
    gate: PolicyGate,
    settings: SandboxSettings,
}

/// Captured streams plus the fault that ended the run.
struct Fault {
    error: ExecutionError,
    stdout: String,
    stderr: String,
}

impl From<ExecutionError> for Fault {
    fn from(error: ExecutionError) -> Self {
        Self { error, stdout: String::new(), stderr: String::new() }
    }
}

impl Sandbox {
    /// Create a sandbox with a fresh session under `settings.output_root`.
    pub fn new(settings: SandboxSettings) -> std::io::Result<Self> {
        let session = ExecutionSession::create(&settings.output_root)?;
        Ok(Self::with_session(Arc::new(session), settings))
    }

    pub fn with_session(session: Arc<ExecutionSession>, settings: SandboxSettings) -> Self {
        Self { session, gate: PolicyGate::default(), settings }
    }

    pub fn session(&self) -> &Arc<ExecutionSession> {
        &self.session
    }

    pub fn settings(&self) -> &SandboxSettings {
        &self.settings
    }

    pub fn is_dangerous(&self, snippet: &str) -> bool {
        self.gate.is_dangerous(snippet)
    }

    /// Run a snippet and report on it. Never fails: every fault is folded
    /// into a report with `success == false` and empty artifact lists.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        match self.run(&request).await {
            Ok(result) => result,
            Err(Fault { error, stdout, mut stderr }) => {
                if let ExecutionError::Policy(violation) = &error {
                    warn!(session = %self.session.id(), %violation, "snippet rejected");
                    stderr = format!("Security error: {error}");
                } else if let Some(trace) = error.trace() {
                    stderr.push('\n');
                    stderr.push_str(trace);
                }
                ExecutionResult::failure(error.to_string(), stdout, stderr)
            }
        }
    }

    /// Cleanup of the underlying session; see [`ExecutionSession::cleanup`].
    pub fn cleanup(&self) {
        self.session.cleanup();
    }

    async fn run(&self, request: &ExecutionRequest) -> Result<ExecutionResult, Fault> {
        if request.snippet.trim().is_empty() {
            return Err(ExecutionError::EmptySnippet.into());
        }
        self.gate.check(&request.snippet).map_err(ExecutionError::from)?;
        if self.session.is_closed() {
            return Err(ExecutionError::SessionClosed.into());
        }

        let dirs = self.session.scratch_dir().map_err(ExecutionError::Scratch)?;
        let staged = stage_inputs(&dirs.scratch, request.input_paths.as_deref().unwrap_or_default());
        let input_map = serde_json::to_string(&staged).unwrap_or_else(|_| "{}".to_string());

        let args = vec![
            dirs.scratch.to_string_lossy().into_owned(),
            dirs.status_path().to_string_lossy().into_owned(),
            input_map,
            self.settings.preview_rows.to_string(),
        ];
        let opts = self.interpreter_options(&dirs);

        info!(session = %self.session.id(), exec = %dirs.id, inputs = staged.len(), "executing snippet");
        let output = process::python::run_bootstrap(&opts, BOOTSTRAP, &args, &request.snippet)
            .await
            .map_err(|e| match e {
                ProcessError::Spawn { source, .. } => ExecutionError::Launch(source).into(),
                ProcessError::Timeout { timeout, stdout, stderr } => Fault {
                    error: ExecutionError::Timeout(timeout),
                    stdout,
                    stderr,
                },
                ProcessError::Io(e) => Fault::from(ExecutionError::Launch(e)),
            })?;

        let fail = |error: ExecutionError| Fault {
            error,
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
        };

        let status = match HarnessStatus::read(&dirs.status_path()) {
            Ok(Some(status)) => status,
            Ok(None) => return Err(fail(ExecutionError::AbnormalExit(output.status))),
            Err(e) => {
                warn!(exec = %dirs.id, error = %e, "unreadable status record");
                return Err(fail(ExecutionError::AbnormalExit(output.status)));
            }
        };
        if !status.ok {
            debug!(exec = %dirs.id, error_type = ?status.error_type, "snippet raised");
            return Err(fail(ExecutionError::Runtime {
                message: status.error_message(),
                trace: status.traceback.clone().unwrap_or_default(),
            }));
        }

        let collected =
            harvest(&dirs.scratch, &status.previews).map_err(|e| fail(ExecutionError::Harvest(e)))?;
        self.session.track(collected.paths().map(Path::to_path_buf));
        let Harvest { files, plots } = collected;
        info!(exec = %dirs.id, files = files.len(), plots = plots.len(), "snippet finished");

        Ok(ExecutionResult {
            success: true,
            stdout: output.stdout,
            stderr: output.stderr,
            error: None,
            files,
            plots,
        })
    }

    fn interpreter_options(&self, dirs: &ScratchDirs) -> InterpreterOptions {
        let home = dirs.control.to_string_lossy().into_owned();
        // Shared across calls so matplotlib builds its font cache once per session.
        let mpl_config = self.session.root().join(".mplconfig").to_string_lossy().into_owned();
        let threads = self.settings.threads.to_string();
        InterpreterOptions {
            program: self.settings.python_path.clone(),
            cwd: dirs.scratch.clone(),
            env: vec![
                ("HOME".into(), home),
                ("MPLCONFIGDIR".into(), mpl_config),
                ("MPLBACKEND".into(), "Agg".into()),
                ("PYTHONIOENCODING".into(), "utf-8".into()),
                ("PYTHONDONTWRITEBYTECODE".into(), "1".into()),
                ("OMP_NUM_THREADS".into(), threads.clone()),
                ("OPENBLAS_NUM_THREADS".into(), threads.clone()),
                ("MKL_NUM_THREADS".into(), threads),
            ],
            limits: ResourceLimits {
                cpu_seconds: self.settings.cpu_seconds,
                memory_mb: self.settings.memory_mb,
                file_size_mb: self.settings.file_size_mb,
            },
            isolate_network: self.settings.isolate_network,
            timeout: self.settings.timeout,
            output_limit: self.settings.output_limit_bytes,
        }
    }
}

/// Copy each existing input into `scratch` under its base filename.
///
/// Missing or unreadable inputs are skipped with a warning; a later input
/// with the same base name replaces an earlier one.
fn stage_inputs(scratch: &Path, inputs: &[impl AsRef<Path>]) -> BTreeMap<String, String> {
    let mut staged = BTreeMap::new();
    for input in inputs {
        let input = input.as_ref();
        if !input.is_file() {
            warn!(path = %input.display(), "input file not found; skipping");
            continue;
        }
        let Some(name) = input.file_name() else { continue };
        let dest = scratch.join(name);
        match fs::copy(input, &dest) {
            Ok(_) => {
                staged.insert(
                    name.to_string_lossy().into_owned(),
                    dest.to_string_lossy().into_owned(),
                );
            }
            Err(e) => warn!(path = %input.display(), error = %e, "failed to stage input; skipping"),
        }
    }
    staged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{EMPTY_SNIPPET_ERROR, SECURITY_ERROR};
    use std::path::PathBuf;

    fn sandbox(base: &Path) -> Sandbox {
        let settings = SandboxSettings {
            output_root: base.to_path_buf(),
            python_path: PathBuf::from("/nonexistent/python-for-tests"),
            ..Default::default()
        };
        Sandbox::new(settings).unwrap()
    }

    fn scratch_count(sandbox: &Sandbox) -> usize {
        fs::read_dir(sandbox.session().root())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("exec_"))
            .count()
    }

    #[tokio::test]
    async fn rejected_snippet_never_touches_disk() {
        let base = tempfile::tempdir().unwrap();
        let sandbox = sandbox(base.path());
        let result = sandbox
            .execute(ExecutionRequest::new("import os\nos.system('echo hi')"))
            .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some(SECURITY_ERROR));
        assert_eq!(result.stderr, format!("Security error: {SECURITY_ERROR}"));
        assert!(result.stdout.is_empty());
        assert!(result.files.is_empty() && result.plots.is_empty());
        assert_eq!(scratch_count(&sandbox), 0);
    }

    #[tokio::test]
    async fn empty_snippet_is_rejected() {
        let base = tempfile::tempdir().unwrap();
        let sandbox = sandbox(base.path());
        let result = sandbox.execute(ExecutionRequest::new("  \n\t")).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some(EMPTY_SNIPPET_ERROR));
        assert_eq!(scratch_count(&sandbox), 0);
    }

    #[tokio::test]
    async fn launch_failure_is_reported_not_raised() {
        let base = tempfile::tempdir().unwrap();
        let sandbox = sandbox(base.path());
        let result = sandbox.execute(ExecutionRequest::new("x = 1")).await;
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("failed to launch interpreter"));
        assert!(result.files.is_empty() && result.plots.is_empty());
        assert!(sandbox.session().tracked().is_empty());
    }

    #[tokio::test]
    async fn execute_after_cleanup_fails_cleanly() {
        let base = tempfile::tempdir().unwrap();
        let sandbox = sandbox(base.path());
        sandbox.cleanup();
        let result = sandbox.execute(ExecutionRequest::new("x = 1")).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Execution session has been cleaned up"));
        assert!(!sandbox.session().root().exists());
    }

    #[test]
    fn staging_copies_existing_inputs_only() {
        let src = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let data = src.path().join("data.csv");
        fs::write(&data, "a,b\n1,2\n").unwrap();

        let staged = stage_inputs(
            scratch.path(),
            &[data.clone(), src.path().join("missing.csv")],
        );
        assert_eq!(staged.len(), 1);
        let dest = PathBuf::from(&staged["data.csv"]);
        assert_eq!(dest, scratch.path().join("data.csv"));
        assert_eq!(fs::read_to_string(dest).unwrap(), "a,b\n1,2\n");
    }

    #[test]
    fn staging_nothing_is_fine() {
        let scratch = tempfile::tempdir().unwrap();
        let staged = stage_inputs(scratch.path(), &[] as &[PathBuf]);
        assert!(staged.is_empty());
    }
}
