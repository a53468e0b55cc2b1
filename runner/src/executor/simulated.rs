use super::{ExecutorKind, JobExecutor};
use async_trait::async_trait;
use common::{JobPayload, Outcome, ServerConnection};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationSettings {
    /// Artificial latency before the outcome is reported.
    pub delay: Duration,
    /// Probability in `[0, 1]` that a run succeeds.
    pub success_rate: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1500),
            success_rate: 0.8,
        }
    }
}

struct Draw {
    succeeded: bool,
    pid: u32,
    run_id: uuid::Uuid,
}

/// Mock executor: no network, the outcome comes from a random draw.
pub struct SimulatedExecutor {
    settings: SimulationSettings,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl SimulatedExecutor {
    pub fn new(settings: SimulationSettings) -> Self {
        Self::with_rng(settings, StdRng::from_entropy())
    }

    /// Uses the given random source, so a seeded generator gives repeatable runs.
    pub fn with_rng<R: RngCore + Send + 'static>(settings: SimulationSettings, rng: R) -> Self {
        let success_rate = if settings.success_rate.is_nan() {
            let fallback = SimulationSettings::default().success_rate;
            log::warn!("Simulation success rate is NaN, using {}", fallback);
            fallback
        } else {
            settings.success_rate.clamp(0.0, 1.0)
        };
        Self {
            settings: SimulationSettings {
                success_rate,
                ..settings
            },
            rng: Mutex::new(Box::new(rng)),
        }
    }

    pub fn settings(&self) -> SimulationSettings {
        self.settings
    }

    fn draw(&self) -> Draw {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let succeeded = rng.gen::<f64>() < self.settings.success_rate;
        let pid = rng.gen_range(1000..10000);
        let run_id = uuid::Builder::from_random_bytes(rng.gen()).into_uuid();
        Draw {
            succeeded,
            pid,
            run_id,
        }
    }
}

#[async_trait]
impl JobExecutor for SimulatedExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Simulated
    }

    async fn dispatch(&self, _connection: &ServerConnection, payload: &JobPayload) -> Outcome {
        let draw = self.draw();

        if !self.settings.delay.is_zero() {
            tokio::time::sleep(self.settings.delay).await;
        }

        if draw.succeeded {
            Outcome::Success {
                message: format!(
                    "Job {} triggered successfully. PID: {}",
                    payload.job_name, draw.pid
                ),
                response: json!({
                    "status": "OK",
                    "pid": draw.pid,
                    "runId": draw.run_id.to_string(),
                }),
            }
        } else {
            Outcome::Failed {
                message: format!(
                    "Error: Connection timed out to Job Server {}.",
                    payload.job_server
                ),
                response: json!({
                    "status": "ERROR",
                    "code": 503,
                    "message": "Service Unavailable",
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ExecutionStatus, JobRequest};

    fn instant(success_rate: f64) -> SimulationSettings {
        SimulationSettings {
            delay: Duration::ZERO,
            success_rate,
        }
    }

    fn payload() -> JobPayload {
        JobRequest::new("Daily_Sales_Load", "MAIN_REPO", "JS_PROD_01")
            .unwrap()
            .payload("localhost:6400")
    }

    #[tokio::test]
    async fn test_success_rate_converges() {
        let executor = SimulatedExecutor::with_rng(instant(0.8), StdRng::seed_from_u64(42));
        let conn = ServerConnection::default();
        let payload = payload();

        let trials = 2000;
        let mut successes = 0;
        for _ in 0..trials {
            if executor.dispatch(&conn, &payload).await.status() == ExecutionStatus::Success {
                successes += 1;
            }
        }
        let rate = successes as f64 / trials as f64;
        assert!((rate - 0.8).abs() <= 0.05, "observed rate {}", rate);
    }

    #[tokio::test]
    async fn test_success_outcome_shape() {
        let executor = SimulatedExecutor::with_rng(instant(1.0), StdRng::seed_from_u64(7));
        match executor.dispatch(&ServerConnection::default(), &payload()).await {
            Outcome::Success { message, response } => {
                assert!(message.starts_with("Job Daily_Sales_Load triggered successfully. PID: "));
                assert_eq!(response["status"], "OK");
                let pid = response["pid"].as_u64().unwrap();
                assert!((1000..10000).contains(&pid));
                assert!(message.ends_with(&pid.to_string()));
                assert!(uuid::Uuid::parse_str(response["runId"].as_str().unwrap()).is_ok());
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_outcome_shape() {
        let executor = SimulatedExecutor::with_rng(instant(0.0), StdRng::seed_from_u64(7));
        match executor.dispatch(&ServerConnection::default(), &payload()).await {
            Outcome::Failed { message, response } => {
                assert_eq!(message, "Error: Connection timed out to Job Server JS_PROD_01.");
                assert_eq!(response["status"], "ERROR");
                assert_eq!(response["code"], 503);
                assert_eq!(response["message"], "Service Unavailable");
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_same_seed_same_outcomes() {
        let a = SimulatedExecutor::with_rng(instant(0.5), StdRng::seed_from_u64(99));
        let b = SimulatedExecutor::with_rng(instant(0.5), StdRng::seed_from_u64(99));
        let conn = ServerConnection::default();
        let payload = payload();
        for _ in 0..20 {
            assert_eq!(
                a.dispatch(&conn, &payload).await,
                b.dispatch(&conn, &payload).await
            );
        }
    }

    #[test]
    fn test_success_rate_is_clamped() {
        let executor = SimulatedExecutor::with_rng(instant(1.7), StdRng::seed_from_u64(1));
        assert_eq!(executor.settings().success_rate, 1.0);

        let executor = SimulatedExecutor::with_rng(instant(f64::NAN), StdRng::seed_from_u64(1));
        assert_eq!(executor.settings().success_rate, 0.8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_applied() {
        let settings = SimulationSettings {
            delay: Duration::from_millis(1500),
            success_rate: 1.0,
        };
        let executor = SimulatedExecutor::with_rng(settings, StdRng::seed_from_u64(3));
        let start = tokio::time::Instant::now();
        executor.dispatch(&ServerConnection::default(), &payload()).await;
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }
}
