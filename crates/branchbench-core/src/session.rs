use tracing::debug;

use crate::error::{ExitCode, SessionError};
use crate::event::TimingEvent;
use crate::runner::CapturedOutput;

/// Which watch compile the session is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the initial compile to finish before touching a file.
    AwaitingFirstCompile,
    /// The file was touched; waiting for the rebuild to finish.
    AwaitingSecondCompile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The watch process is live.
    Running(Phase),
    /// Termination was requested after the rebuild finished.
    Finished,
    /// The watch process exited on its own before the rebuild finished.
    Failed,
}

/// Side effects the driver must perform in response to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Modify the watched source file to trigger a rebuild.
    TouchFile,
    /// Ask the watch process to stop.
    Terminate,
}

/// State machine for one watch session.
///
/// Every decoded event is appended to the log regardless of state. The first
/// finished compile triggers a file change, the second triggers termination.
/// Side effects are returned to the caller rather than performed here.
#[derive(Debug)]
pub struct WatchSession {
    state: SessionState,
    log: Vec<TimingEvent>,
    termination_requested: bool,
}

impl Default for WatchSession {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchSession {
    /// A session for a watch process that has just been spawned.
    pub fn new() -> Self {
        Self {
            state: SessionState::Running(Phase::AwaitingFirstCompile),
            log: Vec::new(),
            termination_requested: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn termination_requested(&self) -> bool {
        self.termination_requested
    }

    /// Record `event` and return the side effect it calls for, if any.
    pub fn observe(&mut self, event: TimingEvent) -> Option<SessionAction> {
        self.log.push(event);

        let TimingEvent::WatchCompileDone { sequence, .. } = event else {
            return None;
        };

        match (self.state, sequence) {
            (SessionState::Running(Phase::AwaitingFirstCompile), 1) => {
                debug!("first watch compile done, touching file");
                self.state = SessionState::Running(Phase::AwaitingSecondCompile);
                Some(SessionAction::TouchFile)
            }
            (SessionState::Running(Phase::AwaitingSecondCompile), 2) => {
                debug!("second watch compile done, terminating watch process");
                self.state = SessionState::Finished;
                self.termination_requested = true;
                Some(SessionAction::Terminate)
            }
            _ => None,
        }
    }

    /// Handle the watch process exiting.
    ///
    /// An exit after our own termination request is the expected end of the
    /// session. Any other exit is a failure carrying the process output.
    pub fn on_exit(&mut self, code: ExitCode, output: CapturedOutput) -> Result<(), SessionError> {
        if self.termination_requested {
            debug!(%code, "watch process exited after termination request");
            return Ok(());
        }
        self.state = SessionState::Failed;
        Err(SessionError::UnexpectedTermination { code, output })
    }

    /// Events observed so far, in arrival order.
    pub fn log(&self) -> &[TimingEvent] {
        &self.log
    }

    pub fn into_log(self) -> Vec<TimingEvent> {
        self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(sequence: u64, timestamp: u64) -> TimingEvent {
        TimingEvent::WatchCompileStart {
            sequence,
            timestamp,
        }
    }

    fn done(sequence: u64, timestamp: u64) -> TimingEvent {
        TimingEvent::WatchCompileDone {
            sequence,
            timestamp,
        }
    }

    #[test]
    fn test_new_session_awaits_first_compile() {
        let session = WatchSession::new();
        assert_eq!(
            session.state(),
            SessionState::Running(Phase::AwaitingFirstCompile)
        );
        assert!(session.log().is_empty());
        assert!(!session.termination_requested());
    }

    #[test]
    fn test_two_compiles_touch_once_then_terminate_once() {
        let mut session = WatchSession::new();

        let actions: Vec<_> = [start(1, 0), done(1, 1000)]
            .into_iter()
            .filter_map(|e| session.observe(e))
            .collect();
        assert_eq!(actions, vec![SessionAction::TouchFile]);
        assert_eq!(
            session.state(),
            SessionState::Running(Phase::AwaitingSecondCompile)
        );

        let actions: Vec<_> = [start(2, 1500), done(2, 2500)]
            .into_iter()
            .filter_map(|e| session.observe(e))
            .collect();
        assert_eq!(actions, vec![SessionAction::Terminate]);
        assert_eq!(session.state(), SessionState::Finished);
        assert_eq!(session.log().len(), 4);
    }

    #[test]
    fn test_late_events_after_finish_are_logged_without_actions() {
        let mut session = WatchSession::new();
        session.observe(done(1, 10));
        session.observe(done(2, 20));
        assert_eq!(session.observe(start(3, 30)), None);
        assert_eq!(session.observe(done(3, 40)), None);
        assert_eq!(session.observe(done(2, 50)), None);
        assert_eq!(session.log().len(), 5);
    }

    #[test]
    fn test_second_done_before_first_does_not_terminate() {
        let mut session = WatchSession::new();
        assert_eq!(session.observe(done(2, 10)), None);
        assert_eq!(
            session.state(),
            SessionState::Running(Phase::AwaitingFirstCompile)
        );
    }

    #[test]
    fn test_build_events_are_logged_only() {
        let mut session = WatchSession::new();
        assert_eq!(session.observe(TimingEvent::BuildStart { timestamp: 1 }), None);
        assert_eq!(session.observe(TimingEvent::BuildDone { timestamp: 2 }), None);
        assert_eq!(session.into_log().len(), 2);
    }

    #[test]
    fn test_exit_after_termination_request_is_not_a_failure() {
        let mut session = WatchSession::new();
        session.observe(done(1, 10));
        session.observe(done(2, 20));
        session
            .on_exit(ExitCode::Signal, CapturedOutput::default())
            .expect("self-initiated exit is fine");
        assert_eq!(session.state(), SessionState::Finished);
        assert_eq!(session.log().len(), 2);
    }

    #[test]
    fn test_exit_before_finish_fails_with_output() {
        let mut session = WatchSession::new();
        session.observe(start(1, 0));
        let mut output = CapturedOutput::default();
        output.push_stderr("Error: Cannot find module 'webpack'".to_string());

        let err = session
            .on_exit(ExitCode::Code(1), output)
            .expect_err("unexpected exit");
        assert_eq!(session.state(), SessionState::Failed);
        match err {
            SessionError::UnexpectedTermination { code, output } => {
                assert_eq!(code, ExitCode::Code(1));
                assert_eq!(output.stderr_lines(), ["Error: Cannot find module 'webpack'"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
