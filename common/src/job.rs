use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named parameter passed into a job run, conventionally prefixed `$G_`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalVariable {
    pub key: String,
    pub value: String,
}

impl GlobalVariable {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// True when the key is only a prefix (`$G_`, `$`) with no name after it.
    pub fn is_bare_prefix(&self) -> bool {
        matches!(self.key.trim(), "$" | "$G" | "$G_")
    }

    /// A bare prefix that was never given a name or a value, e.g. `$G_=`.
    pub fn is_placeholder(&self) -> bool {
        self.is_bare_prefix() && self.value.trim().is_empty()
    }
}

/// Everything needed to submit one batch job. Built fresh per submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobRequest {
    pub job_name: String,
    pub repository_name: String,
    pub job_server_name: String,
    #[serde(default)]
    pub server_group: Option<String>,
    #[serde(default)]
    pub variables: Vec<GlobalVariable>,
}

impl JobRequest {
    pub fn new(
        job_name: impl Into<String>,
        repository_name: impl Into<String>,
        job_server_name: impl Into<String>,
    ) -> Result<Self> {
        let job_name = job_name.into();
        if job_name.trim().is_empty() {
            bail!("Job name must not be empty");
        }
        Ok(Self {
            job_name,
            repository_name: repository_name.into(),
            job_server_name: job_server_name.into(),
            server_group: None,
            variables: Vec::new(),
        })
    }

    pub fn with_server_group(mut self, group: Option<String>) -> Self {
        self.server_group = group.filter(|g| !g.trim().is_empty());
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.push(GlobalVariable::new(key, value));
        self
    }

    pub fn with_variables(mut self, vars: impl IntoIterator<Item = GlobalVariable>) -> Self {
        self.variables.extend(vars);
        self
    }

    /// Collapses the ordered variable list into a map. Later keys overwrite earlier ones.
    pub fn global_variables(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for var in &self.variables {
            map.insert(var.key.clone(), var.value.clone());
        }
        map
    }

    pub fn payload(&self, cms_system: &str) -> JobPayload {
        JobPayload {
            job_name: self.job_name.clone(),
            repo_name: self.repository_name.clone(),
            job_server: self.job_server_name.clone(),
            server_group: self.server_group.clone(),
            global_variables: self.global_variables(),
            cms_system: cms_system.to_string(),
        }
    }
}

/// The JSON body posted to the job-execution endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub job_name: String,
    pub repo_name: String,
    pub job_server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_group: Option<String>,
    pub global_variables: BTreeMap<String, String>,
    pub cms_system: String,
}

impl JobPayload {
    pub fn to_json(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "jobName": self.job_name,
            "repoName": self.repo_name,
            "jobServer": self.job_server,
            "globalVariables": self.global_variables,
            "cmsSystem": self.cms_system,
        });
        if let (Some(group), Some(obj)) = (&self.server_group, body.as_object_mut()) {
            obj.insert("serverGroup".to_string(), serde_json::Value::String(group.clone()));
        }
        body
    }
}
