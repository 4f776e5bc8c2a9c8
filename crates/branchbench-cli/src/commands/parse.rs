use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use branchbench_core::decoder::EventDecoder;
use branchbench_core::event::{Timing, TimingEvent};
use branchbench_core::intervals::{reconstruct_build_timing, reconstruct_watch_timings};
use branchbench_core::line_buffer::LineBuffer;

/// Arguments for the `parse` command
#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Captured process output to decode (reads stdin when omitted)
    pub file: Option<PathBuf>,
}

/// Decode every event in the input, print it as a JSON line, then print the
/// timings the events pair up into.
pub fn run(args: ParseArgs) -> Result<()> {
    let raw = match args.file {
        Some(ref path) => std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    let events = decode_events(&raw)?;
    let mut stdout = io::stdout().lock();
    for event in &events {
        writeln!(stdout, "{}", serde_json::to_string(event)?)?;
    }

    for timing in timings_from_events(&events)? {
        writeln!(stdout, "{}: {}", timing.name, timing.format_as_seconds())?;
    }
    Ok(())
}

/// Split raw output into lines and decode the event lines, in order.
pub fn decode_events(raw: &[u8]) -> Result<Vec<TimingEvent>> {
    let mut buffer = LineBuffer::new();
    let mut lines = buffer.push_bytes(raw);
    lines.extend(buffer.finish());

    let decoder = EventDecoder::new();
    let mut events = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if let Some(event) = decoder
            .try_parse(line)
            .with_context(|| format!("Invalid timing event on line {}", idx + 1))?
        {
            events.push(event);
        }
    }
    Ok(events)
}

/// Watch compile timings followed by the build compilation, when present.
fn timings_from_events(events: &[TimingEvent]) -> Result<Vec<Timing>> {
    let mut timings = reconstruct_watch_timings(events)?;
    timings.extend(reconstruct_build_timing(events));
    Ok(timings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPTURED: &str = "\
$ webpack --watch
[TimingEventLogger] [1000] [+0s] [watch-compile-start] [1]
asset main.js 1.2 MiB [emitted]
[TimingEventLogger] [3400] [+2.4s] [watch-compile-done] [1]
[TimingEventLogger] [5000] [+1.6s] [watch-compile-start] [2]
[TimingEventLogger] [5300] [+0.3s] [watch-compile-done] [2]
";

    #[test]
    fn test_decode_events_skips_tool_output() {
        let events = decode_events(CAPTURED.as_bytes()).expect("decode");
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            TimingEvent::WatchCompileStart {
                sequence: 1,
                timestamp: 1000
            }
        );
    }

    #[test]
    fn test_decode_events_handles_missing_trailing_newline() {
        let raw = "noise\n[TimingEventLogger] [7] [+0s] [build-done] [null]";
        let events = decode_events(raw.as_bytes()).expect("decode");
        assert_eq!(events, vec![TimingEvent::BuildDone { timestamp: 7 }]);
    }

    #[test]
    fn test_decode_events_reports_line_of_bad_event() {
        let raw = "ok\nstill ok\n[TimingEventLogger] [7] [+0s] [build-done] [3]\n";
        let err = decode_events(raw.as_bytes()).expect_err("bad payload");
        assert!(format!("{:#}", err).contains("line 3"));
    }

    #[test]
    fn test_timings_from_events() {
        let events = decode_events(CAPTURED.as_bytes()).expect("decode");
        let timings = timings_from_events(&events).expect("complete pairs");
        assert_eq!(
            timings,
            vec![
                Timing::new("Watch compilation (1)", 2400),
                Timing::new("Watch compilation (2)", 300),
            ]
        );
    }
}
