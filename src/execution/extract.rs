//! Pull runnable Python out of a Markdown-formatted assistant reply.

use once_cell::sync::Lazy;
use regex::Regex;

static PYTHON_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:python|py|python3)[ \t]*\r?\n(.*?)```").expect("fence pattern is valid")
});

/// Fenced python blocks in order of appearance, trimmed; empty blocks dropped.
pub fn python_blocks(text: &str) -> Vec<String> {
    PYTHON_FENCE
        .captures_iter(text)
        .map(|c| c[1].trim().to_string())
        .filter(|b| !b.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_blocks_in_order() {
        let reply = "Here you go:\n```python\nimport pandas as pd\nprint(1)\n```\n\
                     and a variant\n```py\nprint(2)\n```\n";
        assert_eq!(python_blocks(reply), ["import pandas as pd\nprint(1)", "print(2)"]);
    }

    #[test]
    fn ignores_other_languages_and_empty_blocks() {
        let reply = "```bash\nls\n```\n```python\n\n```\n```\nplain\n```";
        assert!(python_blocks(reply).is_empty());
    }

    #[test]
    fn handles_crlf_fences() {
        let reply = "```python\r\nx = 1\r\n```";
        assert_eq!(python_blocks(reply), ["x = 1"]);
    }
}
