use crate::job::JobPayload;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
    Pending,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Pending)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Pending => write!(f, "Pending"),
            ExecutionStatus::Success => write!(f, "Success"),
            ExecutionStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Pending" => Ok(ExecutionStatus::Pending),
            "Success" => Ok(ExecutionStatus::Success),
            "Failed" => Ok(ExecutionStatus::Failed),
            _ => Err(anyhow!("Unknown execution status: {}", s)),
        }
    }
}

/// Terminal result of a dispatch. There is no pending variant on purpose.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success { message: String, response: Value },
    Failed { message: String, response: Value },
}

impl Outcome {
    pub fn status(&self) -> ExecutionStatus {
        match self {
            Outcome::Success { .. } => ExecutionStatus::Success,
            Outcome::Failed { .. } => ExecutionStatus::Failed,
        }
    }
}

/// One job submission and how it ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRecord {
    pub id: ExecutionId,
    pub submitted_at: DateTime<Utc>,
    pub job_name: String,
    pub status: ExecutionStatus,
    pub message: String,
    pub request_payload: Value,
    pub response_payload: Value,
}

impl ExecutionRecord {
    pub fn pending(payload: &JobPayload) -> Self {
        Self {
            id: ExecutionId::generate(),
            submitted_at: Utc::now(),
            job_name: payload.job_name.clone(),
            status: ExecutionStatus::Pending,
            message: "Initializing request...".to_string(),
            request_payload: payload.to_json(),
            response_payload: Value::Null,
        }
    }

    /// Moves a pending record to its terminal state. Consumes the record so it
    /// cannot be resolved twice through the same value.
    pub fn resolve(mut self, outcome: Outcome) -> Self {
        debug_assert_eq!(self.status, ExecutionStatus::Pending);
        self.status = outcome.status();
        let (message, response) = match outcome {
            Outcome::Success { message, response } | Outcome::Failed { message, response } => {
                (message, response)
            }
        };
        self.message = message;
        self.response_payload = response;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobRequest;

    fn payload() -> JobPayload {
        JobRequest::new("Daily_Load", "MAIN_REPO", "JS_PROD_01")
            .unwrap()
            .with_variable("$G_Region", "EU")
            .payload("cms:6400")
    }

    #[test]
    fn test_pending_record() {
        let p = payload();
        let record = ExecutionRecord::pending(&p);
        assert_eq!(record.status, ExecutionStatus::Pending);
        assert!(!record.is_terminal());
        assert_eq!(record.job_name, "Daily_Load");
        assert_eq!(record.request_payload, p.to_json());
        assert!(record.response_payload.is_null());
    }

    #[test]
    fn test_resolve_sets_terminal_state() {
        let record = ExecutionRecord::pending(&payload());
        let id = record.id.clone();
        let resolved = record.resolve(Outcome::Failed {
            message: "boom".to_string(),
            response: serde_json::json!({"error": "boom"}),
        });
        assert_eq!(resolved.id, id);
        assert_eq!(resolved.status, ExecutionStatus::Failed);
        assert_eq!(resolved.message, "boom");
        assert_eq!(resolved.response_payload["error"], "boom");
    }

    #[test]
    fn test_ids_are_unique() {
        let a = ExecutionRecord::pending(&payload());
        let b = ExecutionRecord::pending(&payload());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_status_round_trip_text() {
        for status in [ExecutionStatus::Pending, ExecutionStatus::Success, ExecutionStatus::Failed] {
            assert_eq!(status.to_string().parse::<ExecutionStatus>().unwrap(), status);
        }
        assert!("Running".parse::<ExecutionStatus>().is_err());
    }
}
