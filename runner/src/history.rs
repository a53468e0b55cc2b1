use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use common::{ExecutionId, ExecutionRecord, ExecutionStatus};
use rusqlite::{params, Connection};
use std::path::Path;

/// SQLite-backed execution log. Newest entries come first on every read.
pub struct HistoryStore {
    conn: Connection,
}

struct RawRow {
    id: String,
    submitted_at: String,
    job_name: String,
    status: String,
    message: String,
    request_payload: String,
    response_payload: String,
}

impl HistoryStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create history directory: {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open history database: {:?}", path))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                submitted_at TEXT NOT NULL,
                job_name TEXT NOT NULL,
                status TEXT NOT NULL,
                message TEXT NOT NULL,
                request_payload TEXT NOT NULL,
                response_payload TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_executions_job ON executions (job_name)",
            [],
        )?;
        Ok(Self { conn })
    }

    /// Stores a finished record. Pending records are refused.
    pub fn record(&self, record: &ExecutionRecord) -> Result<()> {
        if !record.is_terminal() {
            bail!("Refusing to store pending execution {}", record.id);
        }
        self.conn.execute(
            "INSERT OR REPLACE INTO executions
                (id, submitted_at, job_name, status, message, request_payload, response_payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id.0,
                record.submitted_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                record.job_name,
                record.status.to_string(),
                record.message,
                record.request_payload.to_string(),
                record.response_payload.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<ExecutionRecord>> {
        self.query(
            "SELECT id, submitted_at, job_name, status, message, request_payload, response_payload
             FROM executions ORDER BY submitted_at DESC, rowid DESC LIMIT ?1",
            params![limit as i64],
        )
    }

    pub fn for_job(&self, job_name: &str, limit: usize) -> Result<Vec<ExecutionRecord>> {
        self.query(
            "SELECT id, submitted_at, job_name, status, message, request_payload, response_payload
             FROM executions WHERE job_name = ?1 ORDER BY submitted_at DESC, rowid DESC LIMIT ?2",
            params![job_name, limit as i64],
        )
    }

    pub fn all(&self) -> Result<Vec<ExecutionRecord>> {
        self.query(
            "SELECT id, submitted_at, job_name, status, message, request_payload, response_payload
             FROM executions ORDER BY submitted_at DESC, rowid DESC",
            [],
        )
    }

    /// Deletes everything and returns how many rows went.
    pub fn clear(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM executions", [])?)
    }

    fn query<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<ExecutionRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok(RawRow {
                id: row.get(0)?,
                submitted_at: row.get(1)?,
                job_name: row.get(2)?,
                status: row.get(3)?,
                message: row.get(4)?,
                request_payload: row.get(5)?,
                response_payload: row.get(6)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(Self::decode(row?)?);
        }
        Ok(records)
    }

    fn decode(raw: RawRow) -> Result<ExecutionRecord> {
        let submitted_at = DateTime::parse_from_rfc3339(&raw.submitted_at)
            .with_context(|| format!("Bad timestamp on execution {}", raw.id))?
            .with_timezone(&Utc);
        let status: ExecutionStatus = raw.status.parse()?;
        Ok(ExecutionRecord {
            submitted_at,
            job_name: raw.job_name,
            status,
            message: raw.message,
            request_payload: serde_json::from_str(&raw.request_payload)
                .with_context(|| format!("Bad request payload on execution {}", raw.id))?,
            response_payload: serde_json::from_str(&raw.response_payload)
                .with_context(|| format!("Bad response payload on execution {}", raw.id))?,
            id: ExecutionId(raw.id),
        })
    }
}
