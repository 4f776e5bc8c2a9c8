use std::io::{self, Write};

use crate::event::TimingEvent;

/// Name every event line starts with, so consumers can grep for it.
pub const LOGGER_NAME: &str = "TimingEventLogger";

/// Serializes [`TimingEvent`]s into single greppable lines:
///
/// ```text
/// [TimingEventLogger] [1718000000000] [+3.4s] [watch-compile-done] [2]
/// ```
///
/// The `+<delta>s` field is the time since this encoder's previous event. The
/// previous timestamp is owned by the encoder instance, so two encoders (two
/// subprocesses, say) never affect each other's deltas.
pub struct EventEncoder<W: Write> {
    writer: W,
    previous_timestamp: Option<u64>,
}

impl EventEncoder<io::Stdout> {
    /// Encoder writing to the process's standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> EventEncoder<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            previous_timestamp: None,
        }
    }

    /// Build the line for `event` (no trailing newline) and advance the delta state.
    pub fn encode(&mut self, event: &TimingEvent) -> String {
        let timestamp = event.timestamp();
        let delta_ms = timestamp.saturating_sub(self.previous_timestamp.unwrap_or(timestamp));
        self.previous_timestamp = Some(timestamp);

        let payload = match event.sequence() {
            Some(sequence) => {
                debug_assert!(sequence > 0, "watch sequences start at 1");
                sequence.to_string()
            }
            None => "null".to_string(),
        };

        format!(
            "[{}] [{}] [+{}s] [{}] [{}]",
            LOGGER_NAME,
            timestamp,
            delta_ms as f64 / 1000.0,
            event.kind().tag(),
            payload
        )
    }

    /// Encode `event`, write it as one line and flush immediately.
    ///
    /// The consumer reads line by line from a pipe, so nothing may sit in a
    /// buffer between events.
    pub fn emit(&mut self, event: &TimingEvent) -> io::Result<String> {
        let line = self.encode(event);
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(line)
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
