//! Timing event protocol and watch-session orchestration for branchbench.
//!
//! Bundler plugins report compile boundaries by printing `TimingEventLogger`
//! lines to stdout. This crate encodes and decodes those lines, drives a watch
//! process through one initial compile and one rebuild, and turns the collected
//! events into per-branch timings.

pub mod config;
pub mod decoder;
pub mod driver;
pub mod encoder;
pub mod error;
pub mod event;
pub mod events;
pub mod git;
pub mod hooks;
pub mod intervals;
pub mod line_buffer;
pub mod runner;
pub mod session;

pub use error::{ExitCode, ProtocolError, SessionError};
pub use event::{EventKind, Timing, TimingEvent};
