//! Interpreter process management: launch options, resource limits, output capture.

use std::{path::PathBuf, process::ExitStatus, time::Duration};

use thiserror::Error;

pub mod python;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    /// CPU time in seconds; 0 leaves the inherited limit.
    pub cpu_seconds: u64,
    /// Address space in MiB; 0 leaves the inherited limit.
    pub memory_mb: u64,
    /// Largest file the child may write, in MiB; 0 leaves the inherited limit.
    pub file_size_mb: u64,
}

#[derive(Debug, Clone)]
pub struct InterpreterOptions {
    pub program: PathBuf,
    pub cwd: PathBuf,
    /// Variables set on top of the cleared environment.
    pub env: Vec<(String, String)>,
    pub limits: ResourceLimits,
    pub isolate_network: bool,
    pub timeout: Duration,
    /// Per-stream cap on captured bytes.
    pub output_limit: usize,
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// Carries whatever the child wrote before it was killed.
    #[error("timed out after {timeout:?}")]
    Timeout {
        timeout: Duration,
        stdout: String,
        stderr: String,
    },
    #[error("i/o error while waiting for child: {0}")]
    Io(#[from] std::io::Error),
}

pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Byte sink that keeps at most `limit` bytes (0 = unlimited) and drops the rest.
#[derive(Debug, Default)]
pub struct CappedBuffer {
    bytes: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl CappedBuffer {
    pub fn new(limit: usize) -> Self {
        Self { bytes: Vec::new(), limit, truncated: false }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        if self.limit == 0 {
            self.bytes.extend_from_slice(chunk);
            return;
        }
        let room = self.limit.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Lossy text of the retained bytes, with [`TRUNCATION_MARKER`] when input was dropped.
    pub fn to_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if !self.truncated {
            return text;
        }
        // A cut through a multi-byte char decodes to U+FFFD; drop it.
        while text.ends_with('\u{FFFD}') {
            text.pop();
        }
        text.push_str(TRUNCATION_MARKER);
        text
    }
}
