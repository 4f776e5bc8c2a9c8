use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::encoder::EventEncoder;
use crate::event::TimingEvent;

/// Lifecycle callbacks a host build tool invokes on its instrumentation plugin.
///
/// The host calls these synchronously, once per build or rebuild cycle, an
/// unbounded number of times over a watch session.
pub trait LifecycleHooks {
    /// A watch-triggered compilation is about to run.
    fn on_watch_run(&mut self) -> io::Result<()>;
    /// A watch compilation finished.
    fn on_compile_done(&mut self) -> io::Result<()>;
    /// A one-shot build is about to run.
    fn on_build_start(&mut self) -> io::Result<()>;
    /// A one-shot build finished.
    fn on_build_done(&mut self) -> io::Result<()>;
}

/// Source of emission timestamps, in milliseconds since the Unix epoch.
pub trait Clock {
    fn now_millis(&self) -> u64;
}

/// Wall-clock [`Clock`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        now_millis()
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Whether the host compiler runs once or keeps watching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PluginMode {
    #[default]
    Watch,
    Build,
}

/// Instrumentation plugin: turns lifecycle callbacks into timing events.
///
/// Start and done counters are tracked independently. Consumers pair events by
/// sequence value, not by emission order.
pub struct TimingPlugin<W: Write, C: Clock = SystemClock> {
    encoder: EventEncoder<W>,
    clock: C,
    mode: PluginMode,
    watch_runs: u64,
    compiles_done: u64,
}

impl TimingPlugin<io::Stdout, SystemClock> {
    /// Plugin writing to stdout with wall-clock timestamps.
    pub fn stdout(mode: PluginMode) -> Self {
        Self::new(EventEncoder::stdout(), SystemClock, mode)
    }
}

impl<W: Write, C: Clock> TimingPlugin<W, C> {
    pub fn new(encoder: EventEncoder<W>, clock: C, mode: PluginMode) -> Self {
        Self {
            encoder,
            clock,
            mode,
            watch_runs: 0,
            compiles_done: 0,
        }
    }

    /// Dispatch a host hook by name.
    ///
    /// `done` means "compile done" in watch mode and "build done" in build mode,
    /// matching how the host reuses one hook for both.
    pub fn dispatch(&mut self, hook: HookName) -> io::Result<()> {
        match (hook, self.mode) {
            (HookName::WatchRun, _) => self.on_watch_run(),
            (HookName::Done, PluginMode::Watch) => self.on_compile_done(),
            (HookName::Done, PluginMode::Build) | (HookName::BuildDone, _) => self.on_build_done(),
            (HookName::BeforeRun, _) => self.on_build_start(),
        }
    }

    pub fn into_encoder(self) -> EventEncoder<W> {
        self.encoder
    }

    fn emit(&mut self, event: TimingEvent) -> io::Result<()> {
        self.encoder.emit(&event).map(|_| ())
    }
}

impl<W: Write, C: Clock> LifecycleHooks for TimingPlugin<W, C> {
    fn on_watch_run(&mut self) -> io::Result<()> {
        self.watch_runs += 1;
        let event = TimingEvent::WatchCompileStart {
            sequence: self.watch_runs,
            timestamp: self.clock.now_millis(),
        };
        self.emit(event)
    }

    fn on_compile_done(&mut self) -> io::Result<()> {
        self.compiles_done += 1;
        let event = TimingEvent::WatchCompileDone {
            sequence: self.compiles_done,
            timestamp: self.clock.now_millis(),
        };
        self.emit(event)
    }

    fn on_build_start(&mut self) -> io::Result<()> {
        let event = TimingEvent::BuildStart {
            timestamp: self.clock.now_millis(),
        };
        self.emit(event)
    }

    fn on_build_done(&mut self) -> io::Result<()> {
        let event = TimingEvent::BuildDone {
            timestamp: self.clock.now_millis(),
        };
        self.emit(event)
    }
}

/// Host hook names accepted by the `hooks` relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookName {
    WatchRun,
    Done,
    BeforeRun,
    BuildDone,
}

impl FromStr for HookName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "watch-run" | "watchRun" => Ok(HookName::WatchRun),
            "done" => Ok(HookName::Done),
            "before-run" | "beforeRun" => Ok(HookName::BeforeRun),
            "build-done" | "buildDone" => Ok(HookName::BuildDone),
            other => Err(format!(
                "unknown hook '{}' (expected watch-run, done, before-run or build-done)",
                other
            )),
        }
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookName::WatchRun => "watch-run",
            HookName::Done => "done",
            HookName::BeforeRun => "before-run",
            HookName::BuildDone => "build-done",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::decoder::EventDecoder;

    /// Clock that advances by a fixed step on every read.
    struct StepClock {
        next: Cell<u64>,
        step: u64,
    }

    impl StepClock {
        fn new(start: u64, step: u64) -> Self {
            Self {
                next: Cell::new(start),
                step,
            }
        }
    }

    impl Clock for StepClock {
        fn now_millis(&self) -> u64 {
            let now = self.next.get();
            self.next.set(now + self.step);
            now
        }
    }

    fn decode_all(output: &[u8]) -> Vec<TimingEvent> {
        let decoder = EventDecoder::new();
        String::from_utf8_lossy(output)
            .lines()
            .filter_map(|line| decoder.try_parse(line).expect("valid event line"))
            .collect()
    }

    #[test]
    fn test_watch_hooks_emit_increasing_sequences() {
        let mut plugin = TimingPlugin::new(
            EventEncoder::new(Vec::new()),
            StepClock::new(1000, 500),
            PluginMode::Watch,
        );
        plugin.on_watch_run().expect("emit");
        plugin.on_compile_done().expect("emit");
        plugin.on_watch_run().expect("emit");
        plugin.on_compile_done().expect("emit");

        let events = decode_all(plugin.into_encoder().get_ref());
        assert_eq!(
            events,
            vec![
                TimingEvent::WatchCompileStart {
                    sequence: 1,
                    timestamp: 1000
                },
                TimingEvent::WatchCompileDone {
                    sequence: 1,
                    timestamp: 1500
                },
                TimingEvent::WatchCompileStart {
                    sequence: 2,
                    timestamp: 2000
                },
                TimingEvent::WatchCompileDone {
                    sequence: 2,
                    timestamp: 2500
                },
            ]
        );
    }

    #[test]
    fn test_done_counter_is_independent_of_start_counter() {
        let mut plugin = TimingPlugin::new(
            EventEncoder::new(Vec::new()),
            StepClock::new(0, 1),
            PluginMode::Watch,
        );
        // Initial compile fires `done` without a preceding watch-run.
        plugin.on_compile_done().expect("emit");
        plugin.on_watch_run().expect("emit");

        let events = decode_all(plugin.into_encoder().get_ref());
        assert_eq!(events[0].sequence(), Some(1));
        assert_eq!(events[1].sequence(), Some(1));
    }

    #[test]
    fn test_dispatch_done_depends_on_mode() {
        let mut watch = TimingPlugin::new(
            EventEncoder::new(Vec::new()),
            StepClock::new(0, 1),
            PluginMode::Watch,
        );
        watch.dispatch(HookName::Done).expect("emit");
        let events = decode_all(watch.into_encoder().get_ref());
        assert!(matches!(events[0], TimingEvent::WatchCompileDone { .. }));

        let mut build = TimingPlugin::new(
            EventEncoder::new(Vec::new()),
            StepClock::new(0, 1),
            PluginMode::Build,
        );
        build.dispatch(HookName::BeforeRun).expect("emit");
        build.dispatch(HookName::Done).expect("emit");
        let events = decode_all(build.into_encoder().get_ref());
        assert_eq!(
            events,
            vec![
                TimingEvent::BuildStart { timestamp: 0 },
                TimingEvent::BuildDone { timestamp: 1 },
            ]
        );
    }

    #[test]
    fn test_hook_name_parsing() {
        assert_eq!("watch-run".parse::<HookName>(), Ok(HookName::WatchRun));
        assert_eq!("watchRun".parse::<HookName>(), Ok(HookName::WatchRun));
        assert_eq!(" done ".parse::<HookName>(), Ok(HookName::Done));
        assert_eq!("before-run".parse::<HookName>(), Ok(HookName::BeforeRun));
        assert_eq!("build-done".parse::<HookName>(), Ok(HookName::BuildDone));
        assert!("emit".parse::<HookName>().is_err());
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }
}
