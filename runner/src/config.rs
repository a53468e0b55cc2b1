use crate::error::ConfigError;
use crate::executor::SimulationSettings;
use anyhow::{Context, Result};
use common::ServerConnection;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the stored password or token.
pub const SECRET_ENV: &str = "DSRUNNER_SECRET";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunnerConfig {
    #[serde(default = "default_repository")]
    pub repository: String,
    #[serde(default = "default_job_server")]
    pub job_server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_group: Option<String>,
    #[serde(default = "default_simulate")]
    pub simulate: bool,
    #[serde(default = "default_known_jobs")]
    pub known_jobs: Vec<String>,
}

fn default_repository() -> String { common::DEFAULT_REPOSITORY.to_string() }
fn default_job_server() -> String { common::DEFAULT_JOB_SERVER.to_string() }
fn default_simulate() -> bool { true }
fn default_known_jobs() -> Vec<String> { common::KNOWN_JOBS.iter().map(|j| j.to_string()).collect() }

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            repository: default_repository(),
            job_server: default_job_server(),
            server_group: None,
            simulate: default_simulate(),
            known_jobs: default_known_jobs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationConfig {
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_success_rate", deserialize_with = "finite_rate")]
    pub success_rate: f64,
}

fn default_delay_ms() -> u64 { 1500 }
fn default_success_rate() -> f64 { 0.8 }

fn finite_rate<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let rate = f64::deserialize(deserializer)?;
    if rate.is_finite() {
        Ok(rate)
    } else {
        Err(serde::de::Error::custom(format!("success_rate must be a finite number, got {}", rate)))
    }
}

impl SimulationConfig {
    pub fn settings(&self) -> SimulationSettings {
        SimulationSettings {
            delay: Duration::from_millis(self.delay_ms),
            success_rate: self.success_rate,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            success_rate: default_success_rate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct HttpConfig {
    /// Unset means no client-side timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl HttpConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_model() -> String { "gemini-2.5-flash".to_string() }
fn default_endpoint() -> String { "https://generativelanguage.googleapis.com/v1beta".to_string() }
fn default_api_key_env() -> String { "GEMINI_API_KEY".to_string() }

impl IntentConfig {
    /// The configured key, else the one from the named environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty()))
    }
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// Separate file for request/response payload dumps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_log: Option<PathBuf>,
}

fn default_log_level() -> String { "warn".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            output: None,
            execution_log: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    #[serde(default = "default_history_limit")]
    pub default_limit: usize,
}

fn default_history_limit() -> usize { 20 }

impl HistoryConfig {
    pub fn resolve_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|d| d.join(common::APP_DIR_NAME).join(common::HISTORY_DB_FILE_NAME))
                .unwrap_or_else(|| PathBuf::from(common::FALLBACK_DB_PATH))
        })
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            default_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub connection: ServerConnection,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub intent: IntentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Detect file type by extension and load
    pub fn from_file(path: &Path) -> Result<Self> {
        match Format::of(path)? {
            Format::Yaml => Self::from_yaml_file(path),
            Format::Toml => Self::from_toml_file(path),
        }
    }

    /// Applies `DSRUNNER_SECRET` on top of whatever the file holds.
    pub fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var(SECRET_ENV) {
            if !secret.is_empty() {
                let credential = std::mem::take(&mut self.connection.credential);
                self.connection.credential = credential.with_secret(secret);
            }
        }
    }
}

enum Format {
    Yaml,
    Toml,
}

impl Format {
    fn of(path: &Path) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            "yaml" | "yml" => Ok(Format::Yaml),
            "toml" => Ok(Format::Toml),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// File-backed home for the connection settings and defaults.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$XDG_CONFIG_HOME/dsrunner/config.yaml` or the platform equivalent.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join(common::APP_DIR_NAME).join(common::CONFIG_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(common::FALLBACK_CONFIG_PATH))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is not an error: the defaults apply until the first save.
    pub fn load(&self) -> Result<Config> {
        if !self.path.exists() {
            log::debug!("No config at {:?}, using defaults", self.path);
            return Ok(Config::default());
        }
        Config::from_file(&self.path)
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        let content = match Format::of(&self.path)? {
            Format::Yaml => serde_yaml::to_string(config).context("Failed to serialize config as YAML")?,
            Format::Toml => toml::to_string_pretty(config).context("Failed to serialize config as TOML")?,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write config file: {:?}", self.path))?;
        log::info!("Saved config to {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AuthMode, Credential};

    fn sample() -> Config {
        let mut config = Config::default();
        config.connection = ServerConnection {
            base_url: "https://ds.example.com:8443/rest/".to_string(),
            cms_system: "bi-platform:6400".to_string(),
            credential: Credential::Token {
                token: "tok".to_string(),
            },
        };
        config.runner.server_group = Some("SG_EAST".to_string());
        config.http.timeout_secs = Some(30);
        config
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("nope.yaml"));
        assert_eq!(store.load().unwrap(), Config::default());
    }

    #[test]
    fn test_save_and_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("nested").join("config.yaml"));
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), sample());
    }

    #[test]
    fn test_save_and_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.toml"));
        store.save(&sample()).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.connection.auth_mode(), AuthMode::Token);
        assert_eq!(loaded, sample());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(
            &path,
            "connection:\n  base_url: https://h/rest\n  cms_system: cms:6400\n  credential:\n    mode: basic\n    username: admin\n    password: pw\nsimulation:\n  delay_ms: 0\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.connection.credential.secret(), "pw");
        assert_eq!(config.simulation.delay_ms, 0);
        assert_eq!(config.simulation.success_rate, 0.8);
        assert_eq!(config.runner.repository, "MAIN_REPO");
        assert!(config.runner.simulate);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = Config::from_file(Path::new("config.json")).unwrap_err();
        assert!(err.to_string().contains("Unsupported config file format"));
    }

    #[test]
    fn test_broken_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "connection: [not, a, map]").unwrap();
        let err = ConfigStore::new(path).load().unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_non_finite_success_rate_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("config.yaml");
        fs::write(&yaml, "simulation:\n  success_rate: .nan\n").unwrap();
        let err = Config::from_file(&yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("success_rate must be a finite number"), "{:#}", err);

        let toml = dir.path().join("config.toml");
        fs::write(&toml, "[simulation]\nsuccess_rate = inf\n").unwrap();
        assert!(Config::from_file(&toml).is_err());

        fs::write(&yaml, "simulation:\n  success_rate: 0.5\n").unwrap();
        assert_eq!(Config::from_file(&yaml).unwrap().simulation.success_rate, 0.5);
    }
}
