use std::path::PathBuf;

use clap::{ArgGroup, Parser};

#[derive(Parser, Debug, Clone)]
#[command(name = "snipbox", about = "Run data-analysis snippets in a sandboxed interpreter", version)]
#[command(group(ArgGroup::new("source").args(["code", "file"]).multiple(false)))]
#[command(group(ArgGroup::new("md_switch").args(["md", "no_md"]).multiple(false)))]
pub struct Cli {
    /// Snippet to run. Read from stdin when omitted.
    #[arg(value_name = "CODE")]
    pub code: Option<String>,

    /// Read the snippet from a file (.py, .md, .txt).
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// File the snippet may read; exposed as `input_files[<name>]`.
    /// Can be used multiple times: --input a.csv --input b.csv
    #[arg(short = 'i', long = "input", action = clap::ArgAction::Append)]
    pub inputs: Vec<PathBuf>,

    /// Treat the source as a Markdown reply and run its first python block.
    #[arg(long = "from-markdown")]
    pub from_markdown: bool,

    /// Only run the policy check and print the verdict.
    #[arg(long)]
    pub check: bool,

    /// Print the execution report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Render the report as Markdown.
    #[arg(long)]
    pub md: bool,
    /// Print the report as plain text.
    #[arg(long = "no-md")]
    pub no_md: bool,

    /// Keep the session directory (and its artifacts) after the run.
    #[arg(long)]
    pub keep: bool,

    /// Interpreter timeout in seconds (overrides EXEC_TIMEOUT).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Python executable (overrides PYTHON_PATH).
    #[arg(long)]
    pub python: Option<PathBuf>,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repeated_inputs() {
        let cli = Cli::try_parse_from([
            "snipbox", "--input", "a.csv", "-i", "b.csv", "--json", "print(1)",
        ])
        .unwrap();
        assert_eq!(cli.inputs, [PathBuf::from("a.csv"), PathBuf::from("b.csv")]);
        assert_eq!(cli.code.as_deref(), Some("print(1)"));
        assert!(cli.json);
    }

    #[test]
    fn code_and_file_conflict() {
        assert!(Cli::try_parse_from(["snipbox", "--file", "x.py", "print(1)"]).is_err());
    }
}
