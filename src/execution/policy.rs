//! Static, lexical vetting of snippets before anything is executed.
//!
//! This is a fast pre-filter and nothing more: string concatenation,
//! `getattr` indirection or aliasing all slip past it. Containment comes
//! from running the snippet in a separate, resource-limited interpreter
//! process (see `process::python`), not from this check.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Top-level modules a snippet may import.
pub const ALLOWED_MODULES: &[&str] = &[
    "pandas",
    "numpy",
    "matplotlib",
    "seaborn",
    "math",
    "datetime",
    "collections",
    "json",
    "csv",
    "re",
    "random",
    "statistics",
    "itertools",
];

/// Patterns that deny a snippet regardless of its imports.
const DENIED_PATTERNS: &[&str] = &[
    r"import\s+os\s*;",
    r"from\s+os\s+import",
    r"import\s+sys\s*;",
    r"from\s+sys\s+import",
    r"import\s+subprocess",
    r"from\s+subprocess\s+import",
    r"__import__\s*\(",
    r"eval\s*\(",
    r"exec\s*\(",
    r#"open\s*\(.+?["']w["']"#,
    r#"open\s*\(.+?["']a["']"#,
    r"os\.(system|popen|spawn|exec)",
    r"subprocess\.(Popen|call|run)",
    r"importlib",
    r"shutil\.(copy|move|rmtree)",
    r"pathlib\.Path",
    r"__builtins__",
];

static IMPORT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(import|from)\s+([a-zA-Z0-9_.]+)").expect("import pattern is valid")
});

static DENYLIST: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    DENIED_PATTERNS
        .iter()
        .map(|p| (*p, Regex::new(p).expect("denylist pattern is valid")))
        .collect()
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("import of '{module}' on line {line} is not allowed")]
    DisallowedImport { module: String, line: usize },
    #[error("matches denied pattern `{pattern}`")]
    DeniedPattern { pattern: &'static str },
}

#[derive(Debug, Clone)]
pub struct PolicyGate {
    allowed: HashSet<&'static str>,
}

impl Default for PolicyGate {
    fn default() -> Self {
        Self { allowed: ALLOWED_MODULES.iter().copied().collect() }
    }
}

impl PolicyGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dangerous(&self, snippet: &str) -> bool {
        self.check(snippet).is_err()
    }

    /// First reason the snippet is denied; imports are checked before patterns.
    pub fn check(&self, snippet: &str) -> Result<(), PolicyViolation> {
        for (idx, line) in snippet.split('\n').enumerate() {
            if let Some(caps) = IMPORT_LINE.captures(line) {
                let module = caps[2].split('.').next().unwrap_or_default();
                if !self.allowed.contains(module) {
                    return Err(PolicyViolation::DisallowedImport {
                        module: module.to_string(),
                        line: idx + 1,
                    });
                }
            }
        }

        for (pattern, re) in DENYLIST.iter() {
            if re.is_match(snippet) {
                return Err(PolicyViolation::DeniedPattern { pattern });
            }
        }

        Ok(())
    }
}
