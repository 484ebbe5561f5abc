//! Utilities (snippet source loading).

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Read a snippet source file.
/// Currently supports .py, .md, .txt, and files without extension.
pub fn read_snippet_file(path: &Path) -> Result<String> {
    if !path.exists() {
        bail!("Snippet file '{}' does not exist", path.display());
    }
    if !path.is_file() {
        bail!("'{}' is not a file", path.display());
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "py" | "md" | "txt" | "" => fs::read_to_string(path)
            .with_context(|| format!("Failed to read file '{}'", path.display())),
        _ => {
            bail!("Unsupported file type: .{}\nCurrently supported: .py, .md, .txt, and files without extension", extension);
        }
    }
}

/// Pick the snippet out of the raw source: the first python block when
/// `from_markdown` is set, the text itself otherwise.
pub fn select_snippet(source: &str, from_markdown: bool) -> Result<String> {
    if !from_markdown {
        return Ok(source.to_string());
    }
    crate::execution::extract::python_blocks(source)
        .into_iter()
        .next()
        .context("no ```python block found in the Markdown input")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_python_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snippet.py");
        fs::write(&path, "print('hi')\n").unwrap();
        assert_eq!(read_snippet_file(&path).unwrap(), "print('hi')\n");
    }

    #[test]
    fn rejects_missing_and_unsupported_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_snippet_file(&dir.path().join("nope.py")).is_err());
        let bin = dir.path().join("blob.bin");
        fs::write(&bin, [0u8, 1, 2]).unwrap();
        assert!(read_snippet_file(&bin).is_err());
        assert!(read_snippet_file(dir.path()).is_err());
    }

    #[test]
    fn selects_first_python_block() {
        let md = "text\n```python\nprint(1)\n```\n```python\nprint(2)\n```";
        assert_eq!(select_snippet(md, true).unwrap(), "print(1)");
        assert_eq!(select_snippet(md, false).unwrap(), md);
        assert!(select_snippet("no code here", true).is_err());
    }
}
