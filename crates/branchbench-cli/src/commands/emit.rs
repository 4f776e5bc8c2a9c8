use anyhow::{Context, Result, bail};
use clap::Args;

use branchbench_core::encoder::EventEncoder;
use branchbench_core::event::{EventKind, TimingEvent};
use branchbench_core::hooks::now_millis;

/// Arguments for the `emit` command
#[derive(Args, Debug)]
pub struct EmitArgs {
    /// Event kind: watch-compile-start, watch-compile-done, build-start or build-done
    pub kind: EventKind,

    /// Compile sequence number (watch events only, starting at 1)
    #[arg(short, long)]
    pub sequence: Option<u64>,

    /// Timestamp in milliseconds since the Unix epoch (defaults to now)
    #[arg(long)]
    pub timestamp: Option<u64>,
}

/// Print one encoded event line to stdout.
pub fn run(args: EmitArgs) -> Result<()> {
    let event = event_from_args(&args, now_millis())?;
    EventEncoder::stdout()
        .emit(&event)
        .context("Failed to write timing event")?;
    Ok(())
}

fn event_from_args(args: &EmitArgs, now: u64) -> Result<TimingEvent> {
    let kind = args.kind;
    match (kind.is_watch(), args.sequence) {
        (true, None) => bail!("{} requires --sequence", kind),
        (true, Some(0)) => bail!("--sequence starts at 1"),
        (false, Some(_)) => bail!("{} does not take a sequence", kind),
        _ => {}
    }

    let timestamp = args.timestamp.unwrap_or(now);
    match TimingEvent::from_parts(kind, args.sequence, timestamp) {
        Some(event) => Ok(event),
        None => bail!("Cannot build a {} event from the given arguments", kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: EmitArgs,
    }

    #[test]
    fn test_emit_args_parse_kind_and_sequence() {
        let cli = TestCli::parse_from(["test", "watch-compile-done", "--sequence", "2"]);
        assert_eq!(cli.args.kind, EventKind::WatchCompileDone);
        assert_eq!(cli.args.sequence, Some(2));
        assert_eq!(cli.args.timestamp, None);
    }

    #[test]
    fn test_emit_args_reject_unknown_kind() {
        assert!(TestCli::try_parse_from(["test", "rebuild"]).is_err());
    }

    #[test]
    fn test_event_from_args_uses_now_by_default() {
        let cli = TestCli::parse_from(["test", "watch-compile-start", "-s", "1"]);
        let event = event_from_args(&cli.args, 1234).expect("valid event");
        assert_eq!(
            event,
            TimingEvent::WatchCompileStart {
                sequence: 1,
                timestamp: 1234
            }
        );
    }

    #[test]
    fn test_event_from_args_explicit_timestamp() {
        let cli = TestCli::parse_from(["test", "build-done", "--timestamp", "99"]);
        let event = event_from_args(&cli.args, 1234).expect("valid event");
        assert_eq!(event, TimingEvent::BuildDone { timestamp: 99 });
    }

    #[test]
    fn test_event_from_args_validates_sequence() {
        let cli = TestCli::parse_from(["test", "watch-compile-done"]);
        assert!(event_from_args(&cli.args, 0).is_err());

        let cli = TestCli::parse_from(["test", "watch-compile-done", "-s", "0"]);
        assert!(event_from_args(&cli.args, 0).is_err());

        let cli = TestCli::parse_from(["test", "build-start", "-s", "1"]);
        assert!(event_from_args(&cli.args, 0).is_err());
    }
}
