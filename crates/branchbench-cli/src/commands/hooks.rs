use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use branchbench_core::hooks::{Clock, HookName, PluginMode, TimingPlugin};

/// How the host compiler is running.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookMode {
    /// Watching: `done` marks a finished watch compile
    Watch,
    /// One-shot build: `done` marks the end of the build
    Build,
}

impl From<HookMode> for PluginMode {
    fn from(mode: HookMode) -> Self {
        match mode {
            HookMode::Watch => PluginMode::Watch,
            HookMode::Build => PluginMode::Build,
        }
    }
}

/// Arguments for the `hooks` command
#[derive(Args, Debug)]
pub struct HooksArgs {
    /// Whether the host compiler is watching or running a one-shot build
    #[arg(long, value_enum, default_value_t = HookMode::Watch)]
    pub mode: HookMode,
}

/// Read hook names from stdin and print one timing event line per hook.
pub fn run(args: HooksArgs) -> Result<()> {
    let mut plugin = TimingPlugin::stdout(args.mode.into());
    relay(io::stdin().lock(), &mut plugin)
}

/// Dispatch every non-blank line of `input` to `plugin`.
pub fn relay<R, W, C>(input: R, plugin: &mut TimingPlugin<W, C>) -> Result<()>
where
    R: BufRead,
    W: Write,
    C: Clock,
{
    for (idx, line) in input.lines().enumerate() {
        let line = line.context("Failed to read hook name")?;
        let name = line.trim();
        if name.is_empty() {
            continue;
        }

        let hook = name
            .parse::<HookName>()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Invalid hook on line {}", idx + 1))?;
        plugin
            .dispatch(hook)
            .with_context(|| format!("Failed to emit event for hook '{}'", hook))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchbench_core::decoder::EventDecoder;
    use branchbench_core::encoder::EventEncoder;
    use branchbench_core::event::TimingEvent;

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now_millis(&self) -> u64 {
            self.0
        }
    }

    fn relay_to_events(input: &str, mode: PluginMode) -> Result<Vec<TimingEvent>> {
        let mut plugin = TimingPlugin::new(EventEncoder::new(Vec::new()), FixedClock(500), mode);
        relay(input.as_bytes(), &mut plugin)?;
        let bytes = plugin.into_encoder().into_inner();
        let text = String::from_utf8(bytes).expect("utf-8 output");
        let decoder = EventDecoder::new();
        Ok(text
            .lines()
            .map(|line| {
                decoder
                    .try_parse(line)
                    .expect("valid event")
                    .expect("event line")
            })
            .collect())
    }

    #[test]
    fn test_hooks_args_default_to_watch_mode() {
        use clap::Parser;

        #[derive(Parser)]
        struct TestCli {
            #[command(flatten)]
            args: HooksArgs,
        }

        let cli = TestCli::parse_from(["test"]);
        assert_eq!(cli.args.mode, HookMode::Watch);

        let cli = TestCli::parse_from(["test", "--mode", "build"]);
        assert_eq!(cli.args.mode, HookMode::Build);
    }

    #[test]
    fn test_relay_watch_mode_counts_runs_and_dones() {
        let events =
            relay_to_events("watch-run\ndone\n\nwatchRun\ndone\n", PluginMode::Watch).expect("relay");
        assert_eq!(
            events,
            vec![
                TimingEvent::WatchCompileStart {
                    sequence: 1,
                    timestamp: 500
                },
                TimingEvent::WatchCompileDone {
                    sequence: 1,
                    timestamp: 500
                },
                TimingEvent::WatchCompileStart {
                    sequence: 2,
                    timestamp: 500
                },
                TimingEvent::WatchCompileDone {
                    sequence: 2,
                    timestamp: 500
                },
            ]
        );
    }

    #[test]
    fn test_relay_build_mode_maps_done_to_build_done() {
        let events = relay_to_events("before-run\ndone\n", PluginMode::Build).expect("relay");
        assert_eq!(
            events,
            vec![
                TimingEvent::BuildStart { timestamp: 500 },
                TimingEvent::BuildDone { timestamp: 500 },
            ]
        );
    }

    #[test]
    fn test_relay_rejects_unknown_hook_with_line_number() {
        let err = relay_to_events("watch-run\nafter-emit\n", PluginMode::Watch)
            .expect_err("unknown hook");
        let message = format!("{:#}", err);
        assert!(message.contains("line 2"));
        assert!(message.contains("after-emit"));
    }
}
