pub mod connection;
pub mod execution;
pub mod job;
pub mod variables;

pub use connection::{AuthMode, Credential, ServerConnection};
pub use execution::{ExecutionId, ExecutionRecord, ExecutionStatus, Outcome};
pub use job::{GlobalVariable, JobPayload, JobRequest};
pub use variables::{parse_variable, parse_variables};

// Connection defaults used when no config file exists yet
pub const DEFAULT_BASE_URL: &str = "https://api.example.sap-ds.com/DataServices/servlet/rest";
pub const DEFAULT_CMS_SYSTEM: &str = "localhost:6400";
pub const DEFAULT_USERNAME: &str = "Administrator";

// Job defaults
pub const DEFAULT_REPOSITORY: &str = "MAIN_REPO";
pub const DEFAULT_JOB_SERVER: &str = "JS_PROD_01";
pub const KNOWN_JOBS: &[&str] = &["Daily_Sales_Load", "Monthly_Finance_Close", "Master_Data_Sync"];

/// Header carrying the session token when the connection uses token auth.
pub const TOKEN_HEADER: &str = "X-SAP-Token";

// Per-user file names, resolved under the platform config/data dirs
pub const APP_DIR_NAME: &str = "dsrunner";
pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const HISTORY_DB_FILE_NAME: &str = "history.db";

// Fallback paths when no home directory can be resolved
pub const FALLBACK_CONFIG_PATH: &str = "dsrunner.yaml";
pub const FALLBACK_DB_PATH: &str = "dsrunner-history.db";
