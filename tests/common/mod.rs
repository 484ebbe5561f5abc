use std::{path::Path, process::Command};

use snipbox::{config::SandboxSettings, Sandbox};

pub const PYTHON: &str = "python3";

/// True when `python3` runs and can import every module in `modules`.
pub fn python_with(modules: &[&str]) -> bool {
    let probe = if modules.is_empty() {
        "pass".to_string()
    } else {
        format!("import {}", modules.join(", "))
    };
    Command::new(PYTHON)
        .arg("-c")
        .arg(probe)
        .env("MPLBACKEND", "Agg")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Shipped defaults (timeout, rlimits, output cap) rooted at `root`.
pub fn settings(root: &Path) -> SandboxSettings {
    SandboxSettings {
        output_root: root.to_path_buf(),
        python_path: PYTHON.into(),
        ..Default::default()
    }
}

pub fn sandbox(root: &Path) -> Sandbox {
    Sandbox::new(settings(root)).expect("session root is creatable")
}
