use std::io::{self, Read};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use is_terminal::IsTerminal;

use snipbox::{
    cli::Cli,
    config::{Config, SandboxSettings},
    execution::{ExecutionRequest, PolicyGate, Sandbox},
    logging, printer, utils,
};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Cli::parse();

    // Load config
    let cfg = Config::load();
    logging::init(&cfg);

    // Resolve source: positional, --file, or stdin
    let stdin_is_tty = io::stdin().is_terminal();
    let source = if let Some(code) = args.code.clone() {
        code
    } else if let Some(path) = &args.file {
        utils::read_snippet_file(path)?
    } else if !stdin_is_tty {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        bail!("Provide a snippet as an argument, with --file, or via stdin");
    };
    let snippet = utils::select_snippet(&source, args.from_markdown)?;

    if args.check {
        return Ok(match PolicyGate::new().check(&snippet) {
            Ok(()) => {
                println!("allowed");
                ExitCode::SUCCESS
            }
            Err(violation) => {
                println!("denied: {}", violation);
                ExitCode::FAILURE
            }
        });
    }

    let mut settings = SandboxSettings::from_config(&cfg);
    if let Some(secs) = args.timeout.filter(|s| *s > 0) {
        settings.timeout = Duration::from_secs(secs);
    }
    if let Some(python) = args.python.clone() {
        settings.python_path = python;
    }

    let sandbox = Sandbox::new(settings).with_context(|| {
        format!("failed to create session under {}", cfg.output_root().display())
    })?;

    let mut request = ExecutionRequest::new(snippet);
    if !args.inputs.is_empty() {
        request = request.with_inputs(args.inputs.iter().cloned());
    }
    let result = sandbox.execute(request).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let md = if args.no_md { false } else { args.md || io::stdout().is_terminal() };
        printer::print_report(&result, md);
    }

    if args.keep {
        eprintln!("artifacts kept in {}", sandbox.session().root().display());
    } else {
        sandbox.cleanup();
    }

    Ok(if result.success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
