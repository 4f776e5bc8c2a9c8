use std::fmt;

use thiserror::Error;

use crate::event::EventKind;
use crate::runner::CapturedOutput;

/// A line matched the event grammar but could not be understood, or the
/// collected events break the start/done pairing rules.
///
/// Either way the producer and consumer disagree about the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown timing event kind '{tag}'")]
    UnknownKind { tag: String },

    #[error("malformed payload for {kind} event: {payload}")]
    MalformedPayload { kind: EventKind, payload: String },

    #[error("malformed timestamp '{raw}'")]
    MalformedTimestamp { raw: String },

    #[error("watch-compile-done ({sequence}) has no matching watch-compile-start")]
    OrphanDone { sequence: u64 },

    #[error("duplicate {kind} event for sequence {sequence}")]
    DuplicateSequence { kind: EventKind, sequence: u64 },
}

/// Fatal conditions for one branch's benchmark session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("timing protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("watch compilation ({sequence}) started but never finished")]
    IncompleteInterval { sequence: u64 },

    #[error("watch process exited unexpectedly ({code})")]
    UnexpectedTermination {
        code: ExitCode,
        output: CapturedOutput,
    },

    #[error("`{command}` failed ({code})")]
    ToolFailed {
        command: String,
        code: ExitCode,
        output: CapturedOutput,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Subprocess output preserved for diagnosis, if this error carries any.
    pub fn captured_output(&self) -> Option<&CapturedOutput> {
        match self {
            SessionError::UnexpectedTermination { output, .. }
            | SessionError::ToolFailed { output, .. } => Some(output),
            SessionError::Protocol(_)
            | SessionError::IncompleteInterval { .. }
            | SessionError::Io(_) => None,
        }
    }
}

/// How a subprocess ended, for error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Code(i32),
    /// Killed by a signal or otherwise without an exit code.
    Signal,
}

impl From<std::process::ExitStatus> for ExitCode {
    fn from(status: std::process::ExitStatus) -> Self {
        match status.code() {
            Some(code) => ExitCode::Code(code),
            None => ExitCode::Signal,
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitCode::Code(code) => write!(f, "exit code {}", code),
            ExitCode::Signal => f.write_str("terminated by signal"),
        }
    }
}
