//! Sandboxed execution of short data-analysis snippets.
//!
//! [`execution::Sandbox`] vets a snippet with a lexical [`execution::PolicyGate`],
//! runs it in a separate resource-limited Python process inside a per-call
//! scratch directory, and harvests the files and plots it leaves behind.

pub mod cli;
pub mod config;
pub mod execution;
pub mod logging;
pub mod printer;
pub mod process;
pub mod utils;

pub use execution::{
    ExecutionRequest, ExecutionResult, ExecutionSession, FileArtifact, PlotArtifact, PolicyGate,
    Sandbox,
};
