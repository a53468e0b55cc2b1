//! Natural-language job requests ("run the daily sales load for NA, fiscal
//! year 2024") turned into a job name plus global variables by Gemini.

use crate::config::IntentConfig;
use crate::error::IntentError;
use anyhow::Result;
use async_trait::async_trait;
use common::{GlobalVariable, JobRequest};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// What the model extracted from the user's sentence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParsedJobRequest {
    pub job_name: String,
    /// Values are strings or numbers.
    #[serde(default)]
    pub global_variables: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl ParsedJobRequest {
    pub fn to_variables(&self) -> Vec<GlobalVariable> {
        self.global_variables
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                GlobalVariable::new(key.clone(), value)
            })
            .collect()
    }

    pub fn into_request(self, repository: &str, job_server: &str) -> Result<JobRequest> {
        let variables = self.to_variables();
        Ok(JobRequest::new(self.job_name, repository, job_server)?.with_variables(variables))
    }
}

#[async_trait]
pub trait IntentParser: Send + Sync {
    async fn parse(&self, text: &str, known_jobs: &[String]) -> Result<ParsedJobRequest, IntentError>;
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

pub struct GeminiIntentParser {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl GeminiIntentParser {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
            api_key_env: IntentConfig::default().api_key_env,
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn from_config(config: &IntentConfig) -> Self {
        Self {
            api_key_env: config.api_key_env.clone(),
            ..Self::new(&config.endpoint, &config.model, config.resolve_api_key())
        }
    }

    fn system_instruction(known_jobs: &[String]) -> String {
        format!(
            "You are an expert SAP Data Services administrator assistant.\n\
             Translate natural language requests into a structured JSON configuration for executing an SAP Data Services batch job.\n\
             Extract:\n\
             1. The job name. Use the name the user gives; if a list of available jobs is provided, match it closely.\n\
             2. Global variables. SAP global variables start with '$'. If the user leaves it out, prepend it, preferring the $G_VarName form (\"region\" becomes \"$G_Region\").\n\n\
             Available Jobs Hint: {}",
            known_jobs.join(", ")
        )
    }

    fn request_body(text: &str, known_jobs: &[String]) -> Value {
        json!({
            "systemInstruction": {
                "parts": [{ "text": Self::system_instruction(known_jobs) }]
            },
            "contents": [{
                "role": "user",
                "parts": [{ "text": text }]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "jobName": { "type": "STRING", "description": "The name of the SAP DS job to execute" },
                        "globalVariables": {
                            "type": "OBJECT",
                            "description": "Key-value pairs for global variables. Keys must start with $."
                        },
                        "explanation": { "type": "STRING", "description": "Brief explanation of what was extracted" }
                    },
                    "required": ["jobName", "globalVariables"]
                }
            }
        })
    }

    fn extract(body: &[u8]) -> Result<ParsedJobRequest, IntentError> {
        let response: GeminiResponse =
            serde_json::from_slice(body).map_err(|e| IntentError::Malformed(e.to_string()))?;
        let text = response
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .find(|t| !t.trim().is_empty())
            .ok_or_else(|| IntentError::Malformed("model returned no text".to_string()))?;

        let parsed: ParsedJobRequest =
            serde_json::from_str(&text).map_err(|e| IntentError::Malformed(e.to_string()))?;
        if parsed.job_name.trim().is_empty() {
            return Err(IntentError::Malformed("no job name in response".to_string()));
        }
        Ok(parsed)
    }
}

#[async_trait]
impl IntentParser for GeminiIntentParser {
    async fn parse(&self, text: &str, known_jobs: &[String]) -> Result<ParsedJobRequest, IntentError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| IntentError::MissingApiKey(self.api_key_env.clone()))?;

        let url = format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        );
        log::info!("Parsing job intent with {}", self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&Self::request_body(text, known_jobs))
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            let detail = String::from_utf8_lossy(&body);
            return Err(IntentError::Http(format!(
                "HTTP {} - {}",
                status.as_u16(),
                detail.chars().take(200).collect::<String>()
            )));
        }

        let parsed = Self::extract(&body)?;
        log::debug!("Intent parsed: {:?}", parsed);
        Ok(parsed)
    }
}
