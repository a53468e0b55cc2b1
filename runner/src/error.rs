use common::{Outcome, ServerConnection};
use serde_json::json;
use thiserror::Error;

/// Shown instead of the raw transport error, which is rarely actionable on its own.
pub const NETWORK_ERROR_MESSAGE: &str = "Network Error (possible CORS or connectivity issue). \
Ensure the SAP server is reachable and allows requests from this client.";

/// Ways a real job submission can fail. All of them end up in a `Failed` record.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The request never completed: DNS, refused connection, TLS, reset.
    #[error("{0}")]
    Transport(String),

    /// The request could not be built, e.g. an unparseable base URL.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The endpoint answered with a non-success status.
    #[error("{0}")]
    Application(String),

    /// The endpoint answered with something that is not JSON.
    #[error("Malformed response from server: {0}")]
    MalformedResponse(String),
}

impl ExecutionError {
    /// Text for the record's `message` field.
    pub fn record_message(&self) -> String {
        match self {
            ExecutionError::Transport(_) => NETWORK_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    pub fn into_outcome(self) -> Outcome {
        Outcome::Failed {
            message: self.record_message(),
            response: json!({ "error": self.to_string() }),
        }
    }
}

impl From<reqwest::Error> for ExecutionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            ExecutionError::InvalidRequest(e.to_string())
        } else {
            ExecutionError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ExecutionError {
    fn from(e: serde_json::Error) -> Self {
        ExecutionError::MalformedResponse(e.to_string())
    }
}

/// Problems with the connection settings, caught before a real dispatch.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Connection is missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Unsupported config file format '{0}'. Use .yaml, .yml, or .toml")]
    UnsupportedFormat(String),
}

pub fn validate_connection(connection: &ServerConnection) -> Result<(), ConfigError> {
    let missing = connection.missing_fields();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::MissingFields(missing))
    }
}

/// Failures of the natural-language intent parser. Kept apart from
/// `ExecutionError` so callers never mistake one for a failed job run.
#[derive(Debug, Error)]
pub enum IntentError {
    #[error("Gemini API key is missing. Set the {0} environment variable or intent.api_key in the config")]
    MissingApiKey(String),

    #[error("Intent request failed: {0}")]
    Http(String),

    #[error("Could not understand the model response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for IntentError {
    fn from(e: reqwest::Error) -> Self {
        IntentError::Http(e.to_string())
    }
}
