use crate::config::Config;
use crate::executor::{ExecutorKind, JobExecutor, RestExecutor, SimulatedExecutor, SimulationSettings};
use common::{ExecutionRecord, ExecutionStatus, JobRequest, Outcome, ServerConnection};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Log target for request/response payload dumps, so they can be routed to their own file.
pub const EXECUTION_LOG_TARGET: &str = "execution";

/// Turns a connection plus a job request into a finished `ExecutionRecord`.
/// Holds no per-call state; clones share the same executor.
#[derive(Clone)]
pub struct JobExecutionClient {
    executor: Arc<dyn JobExecutor>,
}

impl JobExecutionClient {
    pub fn new(executor: Arc<dyn JobExecutor>) -> Self {
        Self { executor }
    }

    pub fn simulated(settings: SimulationSettings) -> Self {
        Self::new(Arc::new(SimulatedExecutor::new(settings)))
    }

    pub fn rest(timeout: Option<Duration>) -> anyhow::Result<Self> {
        Ok(Self::new(Arc::new(RestExecutor::new(timeout)?)))
    }

    /// Picks the mock or the real executor from the config.
    pub fn for_mode(simulate: bool, config: &Config) -> anyhow::Result<Self> {
        if simulate {
            Ok(Self::simulated(config.simulation.settings()))
        } else {
            Self::rest(config.http.timeout())
        }
    }

    pub fn kind(&self) -> ExecutorKind {
        self.executor.kind()
    }

    pub async fn execute(&self, connection: &ServerConnection, request: &JobRequest) -> ExecutionRecord {
        let payload = request.payload(&connection.cms_system);
        let record = ExecutionRecord::pending(&payload);

        log::info!(
            "Submitting job {} [{}] via {} executor",
            record.job_name,
            record.id,
            self.executor.kind()
        );
        log::debug!(target: EXECUTION_LOG_TARGET, "Request {}: {}", record.id, record.request_payload);

        let outcome = self.executor.dispatch(connection, &payload).await;
        let record = record.resolve(outcome);

        match record.status {
            ExecutionStatus::Success => log::info!("Job {} succeeded: {}", record.job_name, record.message),
            _ => log::warn!("Job {} failed: {}", record.job_name, record.message),
        }
        log::debug!(target: EXECUTION_LOG_TARGET, "Response {}: {}", record.id, record.response_payload);

        record
    }

    /// Runs every request at once. Records come back in completion order; a run
    /// whose task died comes back last as a `Failed` record.
    pub async fn execute_all(
        &self,
        connection: &ServerConnection,
        requests: Vec<JobRequest>,
    ) -> Vec<ExecutionRecord> {
        let mut pending = Vec::with_capacity(requests.len());
        let mut set = JoinSet::new();
        for (index, request) in requests.into_iter().enumerate() {
            pending.push(Some(request.payload(&connection.cms_system)));
            let client = self.clone();
            let connection = connection.clone();
            set.spawn(async move { (index, client.execute(&connection, &request).await) });
        }

        let mut records = Vec::with_capacity(pending.len());
        let mut last_error = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, record)) => {
                    pending[index] = None;
                    records.push(record);
                }
                Err(e) => {
                    log::error!("Job task aborted: {}", e);
                    last_error = Some(e.to_string());
                }
            }
        }

        let reason = last_error.unwrap_or_else(|| "task ended without a result".to_string());
        for payload in pending.into_iter().flatten() {
            let message = format!("Job {} aborted: {}", payload.job_name, reason);
            records.push(ExecutionRecord::pending(&payload).resolve(Outcome::Failed {
                response: json!({ "error": message }),
                message,
            }));
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::SimulationSettings;
    use async_trait::async_trait;
    use common::JobPayload;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn request(name: &str) -> JobRequest {
        JobRequest::new(name, "MAIN_REPO", "JS_PROD_01")
            .unwrap()
            .with_variable("$G_Region", "US")
            .with_variable("$G_Region", "EU")
    }

    fn seeded(seed: u64) -> JobExecutionClient {
        let settings = SimulationSettings {
            delay: Duration::ZERO,
            success_rate: 0.8,
        };
        JobExecutionClient::new(Arc::new(SimulatedExecutor::with_rng(
            settings,
            StdRng::seed_from_u64(seed),
        )))
    }

    #[tokio::test]
    async fn test_simulated_records_are_terminal() {
        let client = seeded(5);
        let conn = ServerConnection::default();
        for _ in 0..200 {
            let record = client.execute(&conn, &request("Daily_Load")).await;
            assert!(record.is_terminal());
        }
    }

    #[tokio::test]
    async fn test_request_payload_matches_built_body() {
        let client = seeded(11);
        let conn = ServerConnection::default();
        let req = request("Daily_Load");

        let record = client.execute(&conn, &req).await;
        assert_eq!(record.request_payload, req.payload(&conn.cms_system).to_json());
        assert_eq!(record.request_payload["globalVariables"]["$G_Region"], "EU");
        assert_eq!(record.request_payload["cmsSystem"], common::DEFAULT_CMS_SYSTEM);
    }

    /// Finishes "slow" jobs after the others so ordering can be observed.
    struct StaggeredExecutor;

    #[async_trait]
    impl JobExecutor for StaggeredExecutor {
        fn kind(&self) -> ExecutorKind {
            ExecutorKind::Simulated
        }

        async fn dispatch(&self, _connection: &ServerConnection, payload: &JobPayload) -> Outcome {
            if payload.job_name.starts_with("slow") {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Outcome::Success {
                message: payload.job_name.clone(),
                response: serde_json::Value::Null,
            }
        }
    }

    #[tokio::test]
    async fn test_execute_all_reports_in_completion_order() {
        let client = JobExecutionClient::new(Arc::new(StaggeredExecutor));
        let conn = ServerConnection::default();
        let records = client
            .execute_all(&conn, vec![request("slow_job"), request("fast_job")])
            .await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].job_name, "fast_job");
        assert_eq!(records[1].job_name, "slow_job");
        assert_ne!(records[0].id, records[1].id);
    }

    /// Panics on jobs named "crash", standing in for a task that never reports back.
    struct CrashingExecutor;

    #[async_trait]
    impl JobExecutor for CrashingExecutor {
        fn kind(&self) -> ExecutorKind {
            ExecutorKind::Simulated
        }

        async fn dispatch(&self, _connection: &ServerConnection, payload: &JobPayload) -> Outcome {
            if payload.job_name == "crash" {
                panic!("executor blew up");
            }
            Outcome::Success {
                message: "ok".to_string(),
                response: serde_json::Value::Null,
            }
        }
    }

    #[tokio::test]
    async fn test_execute_all_keeps_aborted_runs() {
        let client = JobExecutionClient::new(Arc::new(CrashingExecutor));
        let conn = ServerConnection::default();
        let records = client
            .execute_all(&conn, vec![request("crash"), request("Daily_Load")])
            .await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].job_name, "Daily_Load");
        assert_eq!(records[0].status, ExecutionStatus::Success);

        let lost = &records[1];
        assert_eq!(lost.job_name, "crash");
        assert_eq!(lost.status, ExecutionStatus::Failed);
        assert!(lost.message.starts_with("Job crash aborted"), "{}", lost.message);
        assert_eq!(lost.request_payload, request("crash").payload(&conn.cms_system).to_json());
    }

    #[test]
    fn test_for_mode_selects_executor() {
        let config = Config::default();
        assert_eq!(JobExecutionClient::for_mode(true, &config).unwrap().kind(), ExecutorKind::Simulated);
        assert_eq!(JobExecutionClient::for_mode(false, &config).unwrap().kind(), ExecutorKind::Rest);
    }
}
