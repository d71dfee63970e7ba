// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orc-coordinator: the Run Coordinator (RC), Stop Watcher (SW), and
//! Status Writer (STW) — the heart of the orchestrator. One
//! `Coordinator` instance lives per worker process; `run` drives
//! exactly one job from claim through cleanup.

pub mod config;
mod coordinator;
mod error;
pub mod status_writer;
pub mod stop_watcher;

pub use config::{StatusWriterConfig, WorkerConfig};
pub use coordinator::{Coordinator, RunOutcome};
pub use error::CoordinatorError;
pub use status_writer::StatusWriter;
