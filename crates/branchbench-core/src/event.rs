use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Timing events emitted by the instrumentation plugin inside a build-tool
/// process and consumed by the benchmark driver.
///
/// The set is closed: encoder and decoder both match on it exhaustively, so a
/// new kind has to land on both sides at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TimingEvent {
    /// A watch-mode compilation started. `sequence` starts at 1.
    WatchCompileStart { sequence: u64, timestamp: u64 },
    /// A watch-mode compilation finished. Paired with the start of equal `sequence`.
    WatchCompileDone { sequence: u64, timestamp: u64 },
    /// A one-shot build started.
    BuildStart { timestamp: u64 },
    /// A one-shot build finished.
    BuildDone { timestamp: u64 },
}

impl TimingEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TimingEvent::WatchCompileStart { .. } => EventKind::WatchCompileStart,
            TimingEvent::WatchCompileDone { .. } => EventKind::WatchCompileDone,
            TimingEvent::BuildStart { .. } => EventKind::BuildStart,
            TimingEvent::BuildDone { .. } => EventKind::BuildDone,
        }
    }

    /// Milliseconds since the Unix epoch at which the event was emitted.
    pub fn timestamp(&self) -> u64 {
        match *self {
            TimingEvent::WatchCompileStart { timestamp, .. }
            | TimingEvent::WatchCompileDone { timestamp, .. }
            | TimingEvent::BuildStart { timestamp }
            | TimingEvent::BuildDone { timestamp } => timestamp,
        }
    }

    /// Sequence number for watch kinds, `None` for build kinds.
    pub fn sequence(&self) -> Option<u64> {
        match *self {
            TimingEvent::WatchCompileStart { sequence, .. }
            | TimingEvent::WatchCompileDone { sequence, .. } => Some(sequence),
            TimingEvent::BuildStart { .. } | TimingEvent::BuildDone { .. } => None,
        }
    }

    /// Assemble an event from its wire parts.
    ///
    /// Returns `None` when the sequence presence does not fit the kind
    /// (watch kinds need one, build kinds must not have one).
    pub fn from_parts(kind: EventKind, sequence: Option<u64>, timestamp: u64) -> Option<Self> {
        match (kind, sequence) {
            (EventKind::WatchCompileStart, Some(sequence)) => Some(TimingEvent::WatchCompileStart {
                sequence,
                timestamp,
            }),
            (EventKind::WatchCompileDone, Some(sequence)) => Some(TimingEvent::WatchCompileDone {
                sequence,
                timestamp,
            }),
            (EventKind::BuildStart, None) => Some(TimingEvent::BuildStart { timestamp }),
            (EventKind::BuildDone, None) => Some(TimingEvent::BuildDone { timestamp }),
            _ => None,
        }
    }
}

/// The tag half of a [`TimingEvent`], as written on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    WatchCompileStart,
    WatchCompileDone,
    BuildStart,
    BuildDone,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::WatchCompileStart,
        EventKind::WatchCompileDone,
        EventKind::BuildStart,
        EventKind::BuildDone,
    ];

    /// Wire tag for this kind.
    pub fn tag(self) -> &'static str {
        match self {
            EventKind::WatchCompileStart => "watch-compile-start",
            EventKind::WatchCompileDone => "watch-compile-done",
            EventKind::BuildStart => "build-start",
            EventKind::BuildDone => "build-done",
        }
    }

    /// Whether events of this kind carry a sequence number.
    pub fn is_watch(self) -> bool {
        matches!(
            self,
            EventKind::WatchCompileStart | EventKind::WatchCompileDone
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.tag() == s)
            .ok_or_else(|| format!("unknown timing event kind '{}'", s))
    }
}

/// A named elapsed time for one branch, in milliseconds.
///
/// Either derived from a start/done event pair or measured directly as the
/// wall-clock time around a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Timing {
    pub name: String,
    pub elapsed_ms: i64,
}

impl Timing {
    pub fn new(name: impl Into<String>, elapsed_ms: i64) -> Self {
        Self {
            name: name.into(),
            elapsed_ms,
        }
    }

    /// Timing between two event timestamps, saturating at the `i64` range.
    pub fn between(name: impl Into<String>, start_ms: u64, end_ms: u64) -> Self {
        let elapsed = i128::from(end_ms) - i128::from(start_ms);
        let elapsed = i64::try_from(elapsed)
            .unwrap_or(if elapsed < 0 { i64::MIN } else { i64::MAX });
        Self::new(name, elapsed)
    }

    /// Render as seconds, e.g. `3.4s`.
    pub fn format_as_seconds(&self) -> String {
        format!("{}s", self.elapsed_ms as f64 / 1000.0)
    }
}
