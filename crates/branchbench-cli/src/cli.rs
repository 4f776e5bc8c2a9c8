use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use crate::commands::{emit::EmitArgs, hooks::HooksArgs, parse::ParseArgs, run::RunArgs};

/// branchbench: compare front-end build and watch-rebuild times across git branches
///
/// Bundler plugins report compile boundaries as `TimingEventLogger` lines;
/// branchbench drives the watch process and turns those lines into timings.
#[derive(Parser, Debug)]
#[command(name = "branchbench", version, about, long_about = None)]
pub struct Cli {
    /// Increase output verbosity (show debug info)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Also write logs to a daily-rolling branchbench.log in this directory
    #[arg(long, global = true, value_name = "DIR")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Verbosity level resolved from --verbose / --quiet flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// --quiet: only errors and essential output
    Quiet,
    /// default: normal output
    Normal,
    /// --verbose: extra debug info
    Verbose,
}

impl Cli {
    /// Resolve the verbosity level from CLI flags
    pub fn verbosity(&self) -> Verbosity {
        match (self.quiet, self.verbose) {
            (true, _) => Verbosity::Quiet,
            (_, true) => Verbosity::Verbose,
            _ => Verbosity::Normal,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Benchmark install, build and watch-rebuild times for the configured branches
    Run(RunArgs),

    /// Relay host build-tool hook names from stdin into timing event lines
    Hooks(HooksArgs),

    /// Print a single timing event line stamped with the current time
    Emit(EmitArgs),

    /// Decode timing events from captured output and show the watch timings
    Parse(ParseArgs),

    /// Generate shell completion scripts
    Completion(CompletionArgs),
}

/// Arguments for the `completion` command
#[derive(Args, Debug)]
pub struct CompletionArgs {
    /// The shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_resolution() {
        let cli = Cli::parse_from(["branchbench", "parse"]);
        assert_eq!(cli.verbosity(), Verbosity::Normal);

        let cli = Cli::parse_from(["branchbench", "-v", "parse"]);
        assert_eq!(cli.verbosity(), Verbosity::Verbose);

        let cli = Cli::parse_from(["branchbench", "parse", "--quiet"]);
        assert_eq!(cli.verbosity(), Verbosity::Quiet);
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["branchbench", "-v", "-q", "parse"]).is_err());
    }

    #[test]
    fn test_log_file_is_global() {
        let cli = Cli::parse_from(["branchbench", "run", "--log-file", "logs"]);
        assert_eq!(cli.log_file, Some(PathBuf::from("logs")));
        assert!(matches!(cli.command, Commands::Run(_)));
    }

    #[test]
    fn test_completion_parses_shell() {
        let cli = Cli::parse_from(["branchbench", "completion", "zsh"]);
        match cli.command {
            Commands::Completion(args) => assert_eq!(args.shell, Shell::Zsh),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
