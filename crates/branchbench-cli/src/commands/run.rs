use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use colored::Colorize;
use tracing::debug;

use branchbench_core::config::BenchConfig;
use branchbench_core::driver::{Benchmark, BranchReport};

use crate::cli::Verbosity;
use crate::render;
use crate::report;

/// Arguments for the `run` command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to branchbench.yaml (searched for upwards from the current directory by default)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Benchmark only this branch (can be repeated; must be listed in the config)
    #[arg(short, long = "branch")]
    pub branches: Vec<String>,

    /// Continue with the remaining branches when one fails
    #[arg(long)]
    pub keep_going: bool,

    /// Print the reports as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Benchmark the selected branches and print the comparison.
pub async fn run(args: RunArgs, verbosity: Verbosity) -> Result<()> {
    let config_path = match args.config {
        Some(ref path) => path.clone(),
        None => {
            let cwd = std::env::current_dir().context("Failed to get current directory")?;
            BenchConfig::find(&cwd)?
        }
    };
    let config = BenchConfig::load(&config_path)?;
    debug!(path = %config_path.display(), branches = config.branches.len(), "loaded config");

    for warning in config.validate() {
        eprintln!("{} {}", "WARNING:".yellow().bold(), warning);
    }

    let branches = select_branches(&config, &args.branches)?;

    if verbosity != Verbosity::Quiet && !args.json {
        println!(
            "{} {} branch(es) from {}",
            "branchbench".cyan().bold(),
            branches.len(),
            config.repository.bold()
        );
    }

    let reports = if verbosity == Verbosity::Quiet || args.json {
        Benchmark::new(&config, None)
            .keep_going(args.keep_going)
            .run(&branches)
            .await?
    } else {
        let (tx, render_handle) = render::spawn_renderer(
            branches.len(),
            "Benchmarking",
            verbosity == Verbosity::Verbose,
        );
        let result = Benchmark::new(&config, Some(&tx))
            .keep_going(args.keep_going)
            .run(&branches)
            .await;
        drop(tx);
        render_handle.await??;
        result?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        println!("{}", report::render_table(&reports));
    }

    let failed = failed_branches(&reports);
    if !failed.is_empty() {
        bail!(
            "{} of {} branch(es) failed: {}",
            failed.len(),
            reports.len(),
            failed.join(", ")
        );
    }

    if verbosity != Verbosity::Quiet && !args.json {
        println!("\n{}", "SUCCESS".green().bold());
    }
    Ok(())
}

/// Branches to benchmark: the requested subset in the order given, or every
/// configured branch.
fn select_branches(config: &BenchConfig, requested: &[String]) -> Result<Vec<String>> {
    let configured = config.unique_branches();
    if requested.is_empty() {
        return Ok(configured);
    }

    let mut selected: Vec<String> = Vec::new();
    for branch in requested {
        if !configured.contains(branch) {
            bail!(
                "Branch '{}' is not listed in the config (available: {})",
                branch,
                configured.join(", ")
            );
        }
        if !selected.contains(branch) {
            selected.push(branch.clone());
        }
    }
    Ok(selected)
}

fn failed_branches(reports: &[BranchReport]) -> Vec<&str> {
    reports
        .iter()
        .filter(|r| !r.succeeded())
        .map(|r| r.branch.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: RunArgs,
    }

    fn config() -> BenchConfig {
        BenchConfig::parse("repository: x\nbranches: [main, webpack5, main]\ntouchFile: a.js\n")
            .expect("valid config")
    }

    #[test]
    fn test_run_args_defaults() {
        let cli = TestCli::parse_from(["test"]);
        assert!(cli.args.config.is_none());
        assert!(cli.args.branches.is_empty());
        assert!(!cli.args.keep_going);
        assert!(!cli.args.json);
    }

    #[test]
    fn test_run_args_all_flags() {
        let cli = TestCli::parse_from([
            "test",
            "--config",
            "bench/branchbench.yaml",
            "-b",
            "main",
            "--branch",
            "webpack5",
            "--keep-going",
            "--json",
        ]);
        assert_eq!(
            cli.args.config,
            Some(PathBuf::from("bench/branchbench.yaml"))
        );
        assert_eq!(cli.args.branches, vec!["main", "webpack5"]);
        assert!(cli.args.keep_going);
        assert!(cli.args.json);
    }

    #[test]
    fn test_select_branches_defaults_to_configured_unique() {
        let selected = select_branches(&config(), &[]).expect("select");
        assert_eq!(selected, vec!["main", "webpack5"]);
    }

    #[test]
    fn test_select_branches_keeps_requested_order() {
        let requested = vec![
            "webpack5".to_string(),
            "main".to_string(),
            "webpack5".to_string(),
        ];
        let selected = select_branches(&config(), &requested).expect("select");
        assert_eq!(selected, vec!["webpack5", "main"]);
    }

    #[test]
    fn test_select_branches_rejects_unknown_branch() {
        let err = select_branches(&config(), &["nope".to_string()]).expect_err("unknown");
        assert!(err.to_string().contains("'nope'"));
    }

    #[test]
    fn test_failed_branches() {
        let reports = vec![
            BranchReport {
                branch: "main".to_string(),
                timings: Vec::new(),
                error: None,
            },
            BranchReport {
                branch: "broken".to_string(),
                timings: Vec::new(),
                error: Some("boom".to_string()),
            },
        ];
        assert_eq!(failed_branches(&reports), vec!["broken"]);
    }
}
