use std::time::Duration;

use crate::event::TimingEvent;

/// Events emitted by the benchmark driver while it works through branches.
///
/// These events decouple the execution engine from the presentation layer,
/// allowing different frontends (colored CLI output, JSON) to consume the
/// same event stream.
#[derive(Debug, Clone)]
pub enum Event {
    /// A branch clone is ready and about to be benchmarked.
    BranchStarted { branch: String, path: String },
    /// All steps for a branch have finished.
    BranchFinished {
        branch: String,
        success: bool,
        duration: Duration,
    },
    /// A command is about to run in a branch's clone.
    StepStarted { branch: String, command: String },
    /// A command has exited.
    StepFinished {
        branch: String,
        command: String,
        success: bool,
        duration: Duration,
    },
    /// A line of output from a running command.
    Output {
        branch: String,
        line: String,
        is_stderr: bool,
    },
    /// A timing event decoded from command output.
    Timing { branch: String, event: TimingEvent },
    /// A warning message.
    Warning(String),
    /// An informational message.
    Info(String),
}
