mod cli;
mod commands;
mod logging;
mod render;
mod report;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use colored::Colorize;

use branchbench_core::error::SessionError;
use branchbench_core::runner::CapturedOutput;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbosity = cli.verbosity();
    let _log_guard = logging::init(verbosity, cli.log_file.as_deref());

    let result = match cli.command {
        Commands::Run(args) => commands::run::run(args, verbosity).await,
        Commands::Hooks(args) => commands::hooks::run(args),
        Commands::Emit(args) => commands::emit::run(args),
        Commands::Parse(args) => commands::parse::run(args),
        Commands::Completion(args) => {
            clap_complete::generate(
                args.shell,
                &mut <Cli as clap::CommandFactory>::command(),
                "branchbench",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            report_failure(&e);
            std::process::exit(1);
        }
    }
}

/// Print a failed command's error chain, plus any subprocess output the
/// error preserved.
fn report_failure(err: &anyhow::Error) {
    eprintln!("\n{} {}", "FAILED".red().bold(), err);
    for cause in err.chain().skip(1) {
        eprintln!("  {} {}", "caused by:".dimmed(), cause);
    }

    let captured = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<SessionError>())
        .and_then(SessionError::captured_output);
    if let Some(output) = captured {
        print_captured(output);
    }
}

fn print_captured(output: &CapturedOutput) {
    if output.is_empty() {
        return;
    }
    let sections = [
        ("stdout", output.stdout_lines()),
        ("stderr", output.stderr_lines()),
    ];
    for (name, lines) in sections {
        if lines.is_empty() {
            continue;
        }
        eprintln!("\n  {}", format!("{}:", name).bold());
        for line in lines {
            eprintln!("    {}", line);
        }
    }
}
