//! Job execution for SAP Data Services batch jobs.
//!
//! [`JobExecutionClient`] turns a connection and a job request into a finished
//! [`common::ExecutionRecord`], either against the REST endpoint or through a
//! local simulation. The surrounding modules cover what a front end needs
//! around that: config, intent parsing, history and stats.

pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod history;
pub mod intent;
pub mod stats;

pub use client::{JobExecutionClient, EXECUTION_LOG_TARGET};
pub use config::{Config, ConfigStore};
pub use error::{validate_connection, ConfigError, ExecutionError, IntentError, NETWORK_ERROR_MESSAGE};
pub use executor::{ExecutorKind, JobExecutor, RestExecutor, SimulatedExecutor, SimulationSettings};
pub use history::HistoryStore;
pub use intent::{GeminiIntentParser, IntentParser, ParsedJobRequest};
pub use stats::{ExecutionSummary, JobStats, StatsCollector};
