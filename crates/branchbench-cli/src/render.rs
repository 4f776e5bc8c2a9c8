use std::collections::HashMap;

use anyhow::Result;
use colored::{Color, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use branchbench_core::events::Event;
use branchbench_core::event::TimingEvent;

/// Colors assigned to branches so their output is easy to tell apart.
const BRANCH_COLORS: &[Color] = &[
    Color::Cyan,
    Color::Green,
    Color::Yellow,
    Color::Blue,
    Color::Magenta,
    Color::BrightCyan,
    Color::BrightGreen,
    Color::BrightYellow,
];

/// Width (in characters) of the separator line drawn around branch output.
const SEPARATOR_WIDTH: usize = 60;

/// Create a styled progress bar counting finished branches.
///
/// `{spinner} [{bar}] {pos}/{len} {msg}`
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.set_message(message.to_string());
    pb
}

/// Spawn a renderer task with a progress bar.
///
/// Returns an event sender and a join handle. Drop the sender when done
/// to signal the render loop to finish, then await the handle. Command
/// output is echoed only when `show_output` is set.
pub fn spawn_renderer(
    total: usize,
    message: &str,
    show_output: bool,
) -> (mpsc::UnboundedSender<Event>, JoinHandle<Result<()>>) {
    let pb = create_progress_bar(total as u64, message);
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move { render_loop(rx, Some(pb), show_output).await });
    (tx, handle)
}

/// Get the color for a branch, assigning a new one if not seen before.
fn branch_color(
    color_map: &mut HashMap<String, Color>,
    color_idx: &mut usize,
    branch: &str,
) -> Color {
    *color_map.entry(branch.to_string()).or_insert_with(|| {
        let c = BRANCH_COLORS[*color_idx % BRANCH_COLORS.len()];
        *color_idx += 1;
        c
    })
}

/// Build a separator line: `─── branch ─────────────────`
fn separator_line(name: &str, color: Color) -> String {
    let label = format!(" {} ", name);
    let prefix_dashes = 3;
    let suffix_dashes = SEPARATOR_WIDTH.saturating_sub(prefix_dashes + label.chars().count());
    format!(
        "{}{}{}",
        "─".repeat(prefix_dashes).color(color),
        label.color(color).bold(),
        "─".repeat(suffix_dashes).color(color),
    )
}

fn closing_separator(color: Color) -> String {
    format!("{}", "─".repeat(SEPARATOR_WIDTH).color(color))
}

/// Short human description of a decoded timing event.
fn describe_timing(event: &TimingEvent) -> String {
    match event.sequence() {
        Some(sequence) => format!("{} ({})", event.kind(), sequence),
        None => event.kind().to_string(),
    }
}

/// Print `line` without tearing the progress bar, if there is one.
fn print_line(pb: Option<&ProgressBar>, line: String, is_stderr: bool) {
    match pb {
        Some(pb) => pb.suspend(|| print_direct(&line, is_stderr)),
        None => print_direct(&line, is_stderr),
    }
}

fn print_direct(line: &str, is_stderr: bool) {
    if is_stderr {
        eprintln!("{}", line);
    } else {
        println!("{}", line);
    }
}

async fn render_loop(
    mut rx: mpsc::UnboundedReceiver<Event>,
    pb: Option<ProgressBar>,
    show_output: bool,
) -> Result<()> {
    let mut color_map: HashMap<String, Color> = HashMap::new();
    let mut color_idx = 0usize;

    while let Some(event) = rx.recv().await {
        match event {
            Event::BranchStarted {
                ref branch,
                ref path,
            } => {
                let color = branch_color(&mut color_map, &mut color_idx, branch);
                print_line(pb.as_ref(), separator_line(branch, color), false);
                print_line(pb.as_ref(), format!("{}", path.dimmed()), false);
            }
            Event::StepStarted {
                ref branch,
                ref command,
            } => {
                let color = branch_color(&mut color_map, &mut color_idx, branch);
                let prefix = format!("[{}]", branch).color(color).bold();
                print_line(pb.as_ref(), format!("{} $ {}", prefix, command.bold()), false);
                if let Some(ref pb) = pb {
                    pb.set_message(format!("{}: {}", branch, command));
                }
            }
            Event::StepFinished {
                ref branch,
                ref command,
                success,
                duration,
            } => {
                let color = branch_color(&mut color_map, &mut color_idx, branch);
                let prefix = format!("[{}]", branch).color(color).bold();
                let elapsed = format!("({:.1}s)", duration.as_secs_f64());
                if success {
                    print_line(
                        pb.as_ref(),
                        format!("{} {} {} {}", prefix, command, "done".green(), elapsed.dimmed()),
                        false,
                    );
                } else {
                    print_line(
                        pb.as_ref(),
                        format!("{} {} {} {}", prefix, command, "FAILED".red(), elapsed.dimmed()),
                        true,
                    );
                }
            }
            Event::Output {
                ref branch,
                ref line,
                is_stderr,
            } => {
                if show_output {
                    let color = branch_color(&mut color_map, &mut color_idx, branch);
                    let prefix = format!("[{}]", branch).color(color).bold();
                    print_line(pb.as_ref(), format!("{} {}", prefix, line), is_stderr);
                }
            }
            Event::Timing {
                ref branch,
                ref event,
            } => {
                let color = branch_color(&mut color_map, &mut color_idx, branch);
                let prefix = format!("[{}]", branch).color(color).bold();
                print_line(
                    pb.as_ref(),
                    format!("{} {}", prefix, describe_timing(event).dimmed()),
                    false,
                );
            }
            Event::BranchFinished {
                ref branch,
                success,
                duration,
            } => {
                let color = branch_color(&mut color_map, &mut color_idx, branch);
                let prefix = format!("[{}]", branch).color(color).bold();
                let elapsed = format!("({:.1}s)", duration.as_secs_f64());
                if success {
                    print_line(
                        pb.as_ref(),
                        format!("{} {} {}", prefix, "SUCCESS".green(), elapsed.dimmed()),
                        false,
                    );
                } else {
                    print_line(
                        pb.as_ref(),
                        format!("{} {} {}", prefix, "FAILED".red(), elapsed.dimmed()),
                        true,
                    );
                }
                print_line(pb.as_ref(), closing_separator(color), false);
                if let Some(ref pb) = pb {
                    pb.inc(1);
                }
            }
            Event::Warning(ref msg) => {
                print_line(pb.as_ref(), format!("{} {}", "WARNING:".yellow().bold(), msg), true);
            }
            Event::Info(ref msg) => {
                print_line(pb.as_ref(), msg.clone(), false);
            }
        }
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    Ok(())
}
