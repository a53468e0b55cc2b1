//! The two ways of carrying out a job submission: talking to the real REST
//! endpoint, or synthesizing an outcome locally.

mod rest;
mod simulated;

pub use rest::{auth_header, execute_url, RestExecutor, SUCCESS_MESSAGE};
pub use simulated::{SimulatedExecutor, SimulationSettings};

use async_trait::async_trait;
use common::{JobPayload, Outcome, ServerConnection};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    Simulated,
    Rest,
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorKind::Simulated => write!(f, "simulated"),
            ExecutorKind::Rest => write!(f, "rest"),
        }
    }
}

#[async_trait]
pub trait JobExecutor: Send + Sync {
    fn kind(&self) -> ExecutorKind;

    /// Submits an already-built payload and reports how it ended.
    /// Failures are folded into `Outcome::Failed`, never returned as errors.
    async fn dispatch(&self, connection: &ServerConnection, payload: &JobPayload) -> Outcome;
}
