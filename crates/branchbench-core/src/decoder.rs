use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::encoder::LOGGER_NAME;
use crate::error::ProtocolError;
use crate::event::{EventKind, TimingEvent};

static EVENT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    // safety: the pattern is a compile-time constant
    Regex::new(&format!(
        r"^\[{}\] \[(\d+)\] \[\+[^\]]*s\] \[([^\]]*)\] \[(.*)\]$",
        LOGGER_NAME
    ))
    .expect("timing event pattern is valid")
});

/// Recognizes timing event lines in arbitrary subprocess output.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventDecoder;

impl EventDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Try to decode one line of output.
    ///
    /// Returns `Ok(None)` for anything that is not an event line, which is the
    /// normal case for build-tool output. Returns an error only when the line
    /// has the event shape but an unknown kind or a bad payload.
    pub fn try_parse(&self, line: &str) -> Result<Option<TimingEvent>, ProtocolError> {
        let line = line.trim_end_matches(['\n', '\r']);
        let Some(caps) = EVENT_LINE.captures(line) else {
            return Ok(None);
        };

        let raw_timestamp = &caps[1];
        let timestamp: u64 =
            raw_timestamp
                .parse()
                .map_err(|_| ProtocolError::MalformedTimestamp {
                    raw: raw_timestamp.to_string(),
                })?;

        let tag = &caps[2];
        let kind: EventKind = tag.parse().map_err(|_| ProtocolError::UnknownKind {
            tag: tag.to_string(),
        })?;

        let raw_payload = &caps[3];
        let malformed = || ProtocolError::MalformedPayload {
            kind,
            payload: raw_payload.to_string(),
        };
        let payload: Value = serde_json::from_str(raw_payload).map_err(|_| malformed())?;

        let sequence = match (kind.is_watch(), payload) {
            (true, Value::Number(n)) => match n.as_u64() {
                Some(seq) if seq > 0 => Some(seq),
                _ => return Err(malformed()),
            },
            (false, Value::Null) => None,
            _ => return Err(malformed()),
        };

        TimingEvent::from_parts(kind, sequence, timestamp)
            .map(Some)
            .ok_or_else(malformed)
    }
}
