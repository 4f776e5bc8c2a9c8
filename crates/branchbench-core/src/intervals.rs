use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::error::{ProtocolError, SessionError};
use crate::event::{EventKind, Timing, TimingEvent};

/// Name of the timing derived from a build start/done pair.
pub const BUILD_COMPILATION: &str = "Build compilation";

/// Display name for the watch compile with the given sequence.
pub fn watch_compilation_name(sequence: u64) -> String {
    format!("Watch compilation ({})", sequence)
}

/// Pair watch start/done events by sequence value and compute their durations.
///
/// Pairing ignores arrival order: a done may be logged before its start, and
/// starts and dones of different sequences may interleave freely. Timings come
/// out in the order their start events appear in the log.
///
/// # Errors
///
/// - [`SessionError::IncompleteInterval`] for a start with no done.
/// - [`ProtocolError::OrphanDone`] for a done with no start.
/// - [`ProtocolError::DuplicateSequence`] when a sequence repeats within a kind.
pub fn reconstruct_watch_timings(log: &[TimingEvent]) -> Result<Vec<Timing>, SessionError> {
    let mut starts: Vec<(u64, u64)> = Vec::new();
    let mut start_seen: HashSet<u64> = HashSet::new();
    let mut dones: HashMap<u64, u64> = HashMap::new();

    for event in log {
        match *event {
            TimingEvent::WatchCompileStart {
                sequence,
                timestamp,
            } => {
                if !start_seen.insert(sequence) {
                    return Err(ProtocolError::DuplicateSequence {
                        kind: EventKind::WatchCompileStart,
                        sequence,
                    }
                    .into());
                }
                starts.push((sequence, timestamp));
            }
            TimingEvent::WatchCompileDone {
                sequence,
                timestamp,
            } => match dones.entry(sequence) {
                Entry::Occupied(_) => {
                    return Err(ProtocolError::DuplicateSequence {
                        kind: EventKind::WatchCompileDone,
                        sequence,
                    }
                    .into());
                }
                Entry::Vacant(slot) => {
                    slot.insert(timestamp);
                }
            },
            TimingEvent::BuildStart { .. } | TimingEvent::BuildDone { .. } => {}
        }
    }

    // Report orphans in log order so the error is deterministic.
    for event in log {
        if let TimingEvent::WatchCompileDone { sequence, .. } = *event
            && !start_seen.contains(&sequence)
        {
            return Err(ProtocolError::OrphanDone { sequence }.into());
        }
    }

    starts
        .into_iter()
        .map(|(sequence, started)| -> Result<Timing, SessionError> {
            let finished = dones
                .get(&sequence)
                .copied()
                .ok_or(SessionError::IncompleteInterval { sequence })?;
            Ok(Timing::between(
                watch_compilation_name(sequence),
                started,
                finished,
            ))
        })
        .collect()
}

/// Pair the first build start with the first build done after it.
///
/// Returns `None` when the log holds no complete build interval.
pub fn reconstruct_build_timing(log: &[TimingEvent]) -> Option<Timing> {
    let (start_idx, started) = log.iter().enumerate().find_map(|(i, e)| match *e {
        TimingEvent::BuildStart { timestamp } => Some((i, timestamp)),
        _ => None,
    })?;
    let finished = log[start_idx + 1..].iter().find_map(|e| match *e {
        TimingEvent::BuildDone { timestamp } => Some(timestamp),
        _ => None,
    })?;
    Some(Timing::between(BUILD_COMPILATION, started, finished))
}
