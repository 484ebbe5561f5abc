//! Execution engine: request/result types, error taxonomy and submodules.

use std::{path::PathBuf, process::ExitStatus, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod extract;
pub mod harness;
pub mod harvest;
pub mod policy;
pub mod sandbox;
pub mod session;

pub use policy::{PolicyGate, PolicyViolation};
pub use sandbox::Sandbox;
pub use session::ExecutionSession;

pub const SECURITY_ERROR: &str = "Code contains potentially dangerous operations";
pub const EMPTY_SNIPPET_ERROR: &str = "Input code cannot be empty.";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub snippet: String,
    #[serde(default)]
    pub input_paths: Option<Vec<PathBuf>>,
}

impl ExecutionRequest {
    pub fn new(snippet: impl Into<String>) -> Self {
        Self { snippet: snippet.into(), input_paths: None }
    }

    pub fn with_inputs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.input_paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub files: Vec<FileArtifact>,
    pub plots: Vec<PlotArtifact>,
}

impl ExecutionResult {
    /// Failure report; artifact lists are always empty on this path.
    pub fn failure(error: impl Into<String>, stdout: String, stderr: String) -> Self {
        Self {
            success: false,
            stdout,
            stderr,
            error: Some(error.into()),
            files: Vec::new(),
            plots: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileArtifact {
    pub filename: String,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotArtifact {
    pub filename: String,
    pub path: PathBuf,
    /// Base64-encoded PNG bytes.
    pub data: String,
}

/// Everything that can stop a snippet from producing a successful report.
///
/// None of these escape [`Sandbox::execute`]; each is folded into an
/// [`ExecutionResult`] with `success == false`.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Code contains potentially dangerous operations")]
    Policy(#[from] PolicyViolation),
    #[error("Input code cannot be empty.")]
    EmptySnippet,
    #[error("Execution session has been cleaned up")]
    SessionClosed,
    #[error("failed to prepare scratch directory: {0}")]
    Scratch(#[source] std::io::Error),
    #[error("failed to launch interpreter: {0}")]
    Launch(#[source] std::io::Error),
    #[error("Execution timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("{message}")]
    Runtime { message: String, trace: String },
    #[error("interpreter exited abnormally ({0})")]
    AbnormalExit(ExitStatus),
    #[error("failed to collect artifacts: {0}")]
    Harvest(#[source] std::io::Error),
}

impl ExecutionError {
    /// Diagnostic trace to append to captured stderr, if the fault carries one.
    pub fn trace(&self) -> Option<&str> {
        match self {
            Self::Runtime { trace, .. } if !trace.is_empty() => Some(trace),
            _ => None,
        }
    }
}
