//! Printers: colored text and markdown (termimad) execution reports.

use owo_colors::OwoColorize;
use termimad::MadSkin;

use crate::execution::ExecutionResult;

pub struct TextPrinter {
    pub color: Option<&'static str>,
}

impl TextPrinter {
    pub fn print(&self, text: &str) {
        if let Some(c) = self.color {
            match c {
                "green" => println!("{}", text.green()),
                "red" => println!("{}", text.red()),
                "cyan" => println!("{}", text.cyan()),
                "yellow" => println!("{}", text.yellow()),
                _ => println!("{}", text),
            }
        } else {
            println!("{}", text);
        }
    }
}

pub struct MarkdownPrinter {
    pub skin: MadSkin,
}

impl Default for MarkdownPrinter {
    fn default() -> Self {
        Self { skin: MadSkin::default() }
    }
}

impl MarkdownPrinter {
    pub fn print(&self, text: &str) {
        self.skin.print_text(text);
        println!();
    }
}

/// Human-readable report; `markdown` renders through termimad.
pub fn print_report(result: &ExecutionResult, markdown: bool) {
    let status = if result.success {
        TextPrinter { color: Some("green") }
    } else {
        TextPrinter { color: Some("red") }
    };
    match &result.error {
        Some(err) => status.print(&format!("failed: {}", err)),
        None => status.print("ok"),
    }

    let body = render_markdown(result);
    if body.is_empty() {
        return;
    }
    if markdown {
        MarkdownPrinter::default().print(&body);
    } else {
        print!("{}", body);
    }
}

/// Markdown body of a report (streams, files, plots); empty when there is nothing to show.
pub fn render_markdown(result: &ExecutionResult) -> String {
    let mut md = String::new();
    if !result.stdout.is_empty() {
        md.push_str(&format!("### stdout\n\n```\n{}\n```\n\n", result.stdout.trim_end()));
    }
    if !result.stderr.is_empty() {
        md.push_str(&format!("### stderr\n\n```\n{}\n```\n\n", result.stderr.trim_end()));
    }
    if !result.files.is_empty() {
        md.push_str("### files\n\n");
        for f in &result.files {
            md.push_str(&format!("* `{}` ({})", f.filename, f.path.display()));
            if f.preview.is_some() {
                md.push_str(" - preview available");
            }
            if let Some(err) = &f.preview_error {
                md.push_str(&format!(" - preview failed: {}", err));
            }
            md.push('\n');
        }
        md.push('\n');
    }
    if !result.plots.is_empty() {
        md.push_str("### plots\n\n");
        for p in &result.plots {
            md.push_str(&format!(
                "* `{}` ({}, {} base64 chars)\n",
                p.filename,
                p.path.display(),
                p.data.len()
            ));
        }
        md.push('\n');
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{FileArtifact, PlotArtifact};
    use std::path::PathBuf;

    #[test]
    fn renders_sections_that_have_content() {
        let result = ExecutionResult {
            success: true,
            stdout: "hello\n".into(),
            stderr: String::new(),
            error: None,
            files: vec![FileArtifact {
                filename: "out.csv".into(),
                path: PathBuf::from("/s/exec_1/out.csv"),
                preview: Some("<table/>".into()),
                preview_error: None,
            }],
            plots: vec![PlotArtifact {
                filename: "plot_1.png".into(),
                path: PathBuf::from("/s/exec_1/plot_1.png"),
                data: "iVBO".into(),
            }],
        };
        let md = render_markdown(&result);
        assert!(md.contains("### stdout"));
        assert!(!md.contains("### stderr"));
        assert!(md.contains("`out.csv`") && md.contains("preview available"));
        assert!(md.contains("`plot_1.png`") && md.contains("4 base64 chars"));
    }

    #[test]
    fn empty_report_renders_nothing() {
        assert!(render_markdown(&ExecutionResult::default()).is_empty());
    }
}
