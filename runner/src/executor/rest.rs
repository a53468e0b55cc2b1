use super::{ExecutorKind, JobExecutor};
use crate::error::ExecutionError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use common::{Credential, JobPayload, Outcome, ServerConnection};
use anyhow::Context;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;

pub const SUCCESS_MESSAGE: &str = "Job executed successfully via API.";

/// `{base_url}/jobs/{job_name}/execute`, with one trailing slash dropped from the base.
/// The job name is encoded as a single path segment.
pub fn execute_url(base_url: &str, job_name: &str) -> Result<Url, ExecutionError> {
    if matches!(job_name, "." | "..") {
        return Err(ExecutionError::InvalidRequest(format!("Invalid job name '{}'", job_name)));
    }
    let mut url = Url::parse(base_url)
        .map_err(|e| ExecutionError::InvalidRequest(format!("Base URL '{}': {}", base_url, e)))?;
    url.path_segments_mut()
        .map_err(|_| ExecutionError::InvalidRequest(format!("Base URL '{}' cannot hold a path", base_url)))?
        .pop_if_empty()
        .extend(["jobs", job_name, "execute"]);
    Ok(url)
}

/// Header name and value carrying the credential.
pub fn auth_header(credential: &Credential) -> (&'static str, String) {
    match credential {
        Credential::Basic { username, password } => {
            let encoded = STANDARD.encode(format!("{}:{}", username, password));
            (AUTHORIZATION.as_str(), format!("Basic {}", encoded))
        }
        Credential::Token { token } => (common::TOKEN_HEADER, token.clone()),
    }
}

/// Posts jobs to a Data Services REST wrapper.
pub struct RestExecutor {
    client: reqwest::Client,
}

impl RestExecutor {
    /// `timeout` of `None` leaves the transport's own behavior in place.
    pub fn new(timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send(
        &self,
        connection: &ServerConnection,
        payload: &JobPayload,
    ) -> Result<Value, ExecutionError> {
        let url = execute_url(&connection.base_url, &payload.job_name)?;
        let (header_name, header_value) = auth_header(&connection.credential);
        log::info!("POST {} (auth: {})", url, connection.auth_mode());

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(header_name, header_value)
            .body(payload.to_json().to_string())
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        // The body is parsed before the status is looked at, so an error page
        // that is not JSON reports as malformed rather than as the status.
        let data: Value = serde_json::from_slice(&body)?;

        if !status.is_success() {
            let message = data
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| {
                    format!(
                        "HTTP {} - {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("Unknown Status")
                    )
                });
            return Err(ExecutionError::Application(message));
        }

        Ok(data)
    }
}

#[async_trait]
impl JobExecutor for RestExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Rest
    }

    async fn dispatch(&self, connection: &ServerConnection, payload: &JobPayload) -> Outcome {
        match self.send(connection, payload).await {
            Ok(data) => Outcome::Success {
                message: SUCCESS_MESSAGE.to_string(),
                response: data,
            },
            Err(e) => {
                log::warn!("Job {} failed: {}", payload.job_name, e);
                e.into_outcome()
            }
        }
    }
}
