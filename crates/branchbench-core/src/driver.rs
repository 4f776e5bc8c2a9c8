use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BenchConfig;
use crate::decoder::EventDecoder;
use crate::error::{ProtocolError, SessionError};
use crate::event::{Timing, TimingEvent};
use crate::events::Event;
use crate::git::{self, ClonedRepo};
use crate::hooks::now_millis;
use crate::intervals::{reconstruct_build_timing, reconstruct_watch_timings};
use crate::runner::{
    self, CapturedOutput, CommandSpec, OutputLine, StreamingChild, Stream, emit, forward_output,
    request_termination,
};
use crate::session::{SessionAction, WatchSession};

/// How long to keep reading buffered output after the watch process exits.
///
/// Tools started by the shell may keep the pipes open a little longer.
pub const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Timings collected for one branch.
#[derive(Debug, Clone, Serialize)]
pub struct BranchReport {
    pub branch: String,
    pub timings: Vec<Timing>,
    /// Set when the branch failed and the run continued with the next one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BranchReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Benchmarks every configured branch, one after another.
pub struct Benchmark<'a> {
    config: &'a BenchConfig,
    events: Option<&'a UnboundedSender<Event>>,
    keep_going: bool,
}

impl<'a> Benchmark<'a> {
    pub fn new(config: &'a BenchConfig, events: Option<&'a UnboundedSender<Event>>) -> Self {
        Self {
            config,
            events,
            keep_going: false,
        }
    }

    /// Record a failing branch in its report and continue, instead of aborting the run.
    pub fn keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }

    /// Prepare a clone for every branch, then benchmark them in order.
    pub async fn run(&self, branches: &[String]) -> Result<Vec<BranchReport>> {
        let mut prepared: Vec<(String, Result<ClonedRepo>)> = Vec::new();
        for branch in branches {
            emit(self.events, Event::Info(format!("Preparing clone of '{}'", branch)));
            let source = self.config.repository.clone();
            let working_dir = self.config.working_directory.clone();
            let name = branch.clone();
            let cloned = tokio::task::spawn_blocking(move || {
                git::prepare_clone(&source, &working_dir, &name)
            })
            .await
            .context("Clone task panicked")?;

            match cloned {
                Ok(repo) => prepared.push((branch.clone(), Ok(repo))),
                Err(e) if self.keep_going => prepared.push((branch.clone(), Err(e))),
                Err(e) => return Err(e),
            }
        }

        let mut reports = Vec::with_capacity(prepared.len());
        for (branch, repo) in prepared {
            let outcome = match repo {
                Ok(repo) => {
                    BranchBenchmark::new(self.config, self.events)
                        .run(&repo)
                        .await
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(timings) => reports.push(BranchReport {
                    branch,
                    timings,
                    error: None,
                }),
                Err(e) if self.keep_going => {
                    emit(
                        self.events,
                        Event::Warning(format!("Branch '{}' failed: {:#}", branch, e)),
                    );
                    reports.push(BranchReport {
                        branch,
                        timings: Vec::new(),
                        error: Some(format!("{:#}", e)),
                    });
                }
                Err(e) => {
                    return Err(e.context(format!("Benchmark of branch '{}' failed", branch)));
                }
            }
        }

        Ok(reports)
    }
}

/// Install, optional build, and watch timings for one cloned branch.
pub struct BranchBenchmark<'a> {
    config: &'a BenchConfig,
    events: Option<&'a UnboundedSender<Event>>,
}

impl<'a> BranchBenchmark<'a> {
    pub fn new(config: &'a BenchConfig, events: Option<&'a UnboundedSender<Event>>) -> Self {
        Self { config, events }
    }

    pub async fn run(&self, repo: &ClonedRepo) -> Result<Vec<Timing>> {
        let start = Instant::now();
        emit(
            self.events,
            Event::BranchStarted {
                branch: repo.branch.clone(),
                path: repo.path.display().to_string(),
            },
        );

        let result = self.run_steps(repo).await;

        emit(
            self.events,
            Event::BranchFinished {
                branch: repo.branch.clone(),
                success: result.is_ok(),
                duration: start.elapsed(),
            },
        );
        result
    }

    async fn run_steps(&self, repo: &ClonedRepo) -> Result<Vec<Timing>> {
        let mut timings = Vec::new();

        timings.push(self.install(repo).await?);

        if self.config.run_build {
            timings.extend(self.build(repo).await?);
        }

        let spec = self.command_spec(repo, &self.config.commands.watch);
        let driver = WatchDriver::new(spec, repo.path.join(&self.config.touch_file));
        let watch_timings = self
            .step(repo, &self.config.commands.watch, driver.run(self.events))
            .await
            .with_context(|| format!("Watch session on '{}' failed", repo.branch))?;
        timings.extend(watch_timings);

        Ok(timings)
    }

    async fn install(&self, repo: &ClonedRepo) -> Result<Timing> {
        let command = &self.config.commands.install;
        let spec = self.command_spec(repo, command);
        let output = self
            .step(repo, command, runner::run_to_completion(&spec, self.events, |_| {}))
            .await?;
        Ok(Timing::new(command.clone(), output.elapsed.as_millis() as i64))
    }

    /// Time a one-shot build. The plugin's own build start/done pair, when
    /// present in the output, is reported alongside the wall-clock time.
    async fn build(&self, repo: &ClonedRepo) -> Result<Vec<Timing>> {
        let command = &self.config.commands.build;
        let spec = self.command_spec(repo, command);
        let decoder = EventDecoder::new();
        let mut log: Vec<TimingEvent> = Vec::new();
        let mut protocol_error: Option<ProtocolError> = None;

        let output = self
            .step(
                repo,
                command,
                runner::run_to_completion(&spec, self.events, |line| {
                    match decoder.try_parse(line) {
                        Ok(Some(event)) => {
                            debug!(?event, "decoded build event");
                            emit(
                                self.events,
                                Event::Timing {
                                    branch: repo.branch.clone(),
                                    event,
                                },
                            );
                            log.push(event);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            protocol_error.get_or_insert(e);
                        }
                    }
                }),
            )
            .await?;

        if let Some(e) = protocol_error {
            return Err(SessionError::from(e).into());
        }

        let mut timings = vec![Timing::new(
            command.clone(),
            output.elapsed.as_millis() as i64,
        )];
        timings.extend(reconstruct_build_timing(&log));
        Ok(timings)
    }

    /// Run one step, bracketing it with start/finish events.
    async fn step<T, F>(&self, repo: &ClonedRepo, command: &str, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T, SessionError>>,
    {
        info!(branch = %repo.branch, command, "running step");
        emit(
            self.events,
            Event::StepStarted {
                branch: repo.branch.clone(),
                command: command.to_string(),
            },
        );
        let start = Instant::now();
        let result = fut.await;
        emit(
            self.events,
            Event::StepFinished {
                branch: repo.branch.clone(),
                command: command.to_string(),
                success: result.is_ok(),
                duration: start.elapsed(),
            },
        );
        Ok(result?)
    }

    fn command_spec(&self, repo: &ClonedRepo, command: &str) -> CommandSpec {
        CommandSpec {
            command: command.to_string(),
            cwd: repo.path.join(&self.config.package_path),
            env: build_branch_env(&self.config.env, repo),
            label: repo.branch.clone(),
        }
    }
}

/// Environment for commands in a branch's clone: the configured variables
/// plus `BRANCHBENCH_BRANCH` and `BRANCHBENCH_CLONE_PATH`.
fn build_branch_env(config_env: &HashMap<String, String>, repo: &ClonedRepo) -> HashMap<String, String> {
    let mut env = config_env.clone();
    env.insert("BRANCHBENCH_BRANCH".to_string(), repo.branch.clone());
    env.insert(
        "BRANCHBENCH_CLONE_PATH".to_string(),
        repo.path.display().to_string(),
    );
    env
}

/// Runs one watch session: spawns the watch command, reacts to its timing
/// events, and turns the collected events into timings.
pub struct WatchDriver {
    spec: CommandSpec,
    touch_file: PathBuf,
    decoder: EventDecoder,
    drain_grace: Duration,
}

impl WatchDriver {
    pub fn new(spec: CommandSpec, touch_file: PathBuf) -> Self {
        Self {
            spec,
            touch_file,
            decoder: EventDecoder::new(),
            drain_grace: DRAIN_GRACE,
        }
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    /// Run the session to completion.
    ///
    /// The first finished compile appends a comment to the touch file; the
    /// second stops the watch process. An exit we did not ask for, a protocol
    /// violation, or an unpaired compile is fatal.
    pub async fn run(
        &self,
        events: Option<&UnboundedSender<Event>>,
    ) -> Result<Vec<Timing>, SessionError> {
        let StreamingChild {
            mut child,
            mut lines,
        } = runner::spawn_streaming(&self.spec)?;
        let mut session = WatchSession::new();
        let mut output = CapturedOutput::default();
        let mut touch_task: Option<JoinHandle<io::Result<()>>> = None;

        let status = loop {
            tokio::select! {
                line = lines.recv() => {
                    let Some(line) = line else {
                        break child.wait().await;
                    };
                    match self.process_line(line, &mut session, &mut output, events) {
                        Ok(Some(action)) => {
                            self.apply(action, &mut child, &mut touch_task, events);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            return Err(self.abort(child, touch_task, e.into()).await);
                        }
                    }
                }
                touched = touch_finished(&mut touch_task), if touch_task.is_some() => {
                    touch_task = None;
                    if let Err(e) = touched {
                        return Err(self.abort(child, None, e).await);
                    }
                }
                status = child.wait() => break status,
            }
        };
        let status = match status {
            Ok(status) => status,
            Err(e) => return Err(self.abort(child, touch_task, e.into()).await),
        };

        // Collect what is still buffered; events flushed before the exit
        // still count towards the session.
        loop {
            match tokio::time::timeout(self.drain_grace, lines.recv()).await {
                Ok(Some(line)) => {
                    match self.process_line(line, &mut session, &mut output, events) {
                        Ok(Some(SessionAction::Terminate)) => {
                            debug!("rebuild finished as the watch process exited");
                        }
                        Ok(Some(SessionAction::TouchFile)) => {
                            warn!("first compile finished after the watch process exited");
                        }
                        Ok(None) => {}
                        Err(e) => return Err(self.abort(child, touch_task, e.into()).await),
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    warn!("watch output still open after exit, stopping the read");
                    break;
                }
            }
        }

        let touched = finish_touch(touch_task).await;
        session.on_exit(status.into(), output)?;
        touched?;

        let log = session.into_log();
        debug!(events = log.len(), "watch session complete");
        reconstruct_watch_timings(&log)
    }

    fn process_line(
        &self,
        line: OutputLine,
        session: &mut WatchSession,
        output: &mut CapturedOutput,
        events: Option<&UnboundedSender<Event>>,
    ) -> Result<Option<SessionAction>, ProtocolError> {
        forward_output(events, &self.spec.label, &line);
        let decoded = match line.stream {
            Stream::Stdout => self.decoder.try_parse(&line.line),
            Stream::Stderr => Ok(None),
        };
        output.push(line);

        let Some(event) = decoded? else {
            return Ok(None);
        };
        debug!(?event, state = ?session.state(), "decoded watch event");
        emit(
            events,
            Event::Timing {
                branch: self.spec.label.clone(),
                event,
            },
        );
        Ok(session.observe(event))
    }

    fn apply(
        &self,
        action: SessionAction,
        child: &mut Child,
        touch_task: &mut Option<JoinHandle<io::Result<()>>>,
        events: Option<&UnboundedSender<Event>>,
    ) {
        match action {
            SessionAction::TouchFile => {
                emit(
                    events,
                    Event::Info(format!("Updating file {}", self.touch_file.display())),
                );
                *touch_task = Some(tokio::spawn(append_trigger_comment(
                    self.touch_file.clone(),
                )));
            }
            SessionAction::Terminate => {
                if let Err(e) = request_termination(child) {
                    warn!(error = %e, "failed to request watch termination");
                }
            }
        }
    }

    /// Stop the child after a fatal error and hand the error back.
    async fn abort(
        &self,
        mut child: Child,
        touch_task: Option<JoinHandle<io::Result<()>>>,
        error: SessionError,
    ) -> SessionError {
        if let Err(e) = request_termination(&mut child) {
            warn!(error = %e, "failed to stop watch process after error");
        }
        let _ = child.wait().await;
        if let Err(e) = finish_touch(touch_task).await {
            warn!(error = %e, "touch file write failed during abort");
        }
        error
    }
}

/// Append a timestamped comment to `path` so file watchers see a change.
pub async fn append_trigger_comment(path: PathBuf) -> io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .open(&path)
        .await?;
    file.write_all(trigger_comment(now_millis()).as_bytes())
        .await?;
    file.flush().await
}

fn trigger_comment(millis: u64) -> String {
    format!("// Trigger file change {}\n", millis)
}

/// Resolves once the pending touch-file write completes. Never resolves
/// when there is none.
async fn touch_finished(
    task: &mut Option<JoinHandle<io::Result<()>>>,
) -> Result<(), SessionError> {
    match task {
        Some(handle) => {
            handle.await.map_err(io::Error::other)??;
            Ok(())
        }
        None => std::future::pending().await,
    }
}

async fn finish_touch(task: Option<JoinHandle<io::Result<()>>>) -> Result<(), SessionError> {
    let Some(task) = task else {
        return Ok(());
    };
    task.await.map_err(io::Error::other)??;
    Ok(())
}
