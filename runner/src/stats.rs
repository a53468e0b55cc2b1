use common::{ExecutionRecord, ExecutionStatus};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionSummary {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl ExecutionSummary {
    /// `None` until something has run.
    pub fn success_rate(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.succeeded as f64 / self.total as f64)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStats {
    pub job_name: String,
    pub summary: ExecutionSummary,
}

/// Success/failure counters per job, safe to feed from concurrent runs.
pub struct StatsCollector {
    executions: DashMap<String, AtomicU64>,
    successes: DashMap<String, AtomicU64>,
    failures: DashMap<String, AtomicU64>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            executions: DashMap::new(),
            successes: DashMap::new(),
            failures: DashMap::new(),
        }
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ExecutionRecord>) -> Self {
        let collector = Self::new();
        for record in records {
            collector.record(record);
        }
        collector
    }

    pub fn record(&self, record: &ExecutionRecord) {
        let counter = match record.status {
            ExecutionStatus::Success => &self.successes,
            ExecutionStatus::Failed => &self.failures,
            ExecutionStatus::Pending => {
                log::debug!("Skipping pending execution {} in stats", record.id);
                return;
            }
        };
        bump(&self.executions, &record.job_name);
        bump(counter, &record.job_name);
    }

    pub fn summary(&self) -> ExecutionSummary {
        ExecutionSummary {
            total: sum(&self.executions),
            succeeded: sum(&self.successes),
            failed: sum(&self.failures),
        }
    }

    /// One row per job, sorted by name.
    pub fn per_job(&self) -> Vec<JobStats> {
        let mut rows: Vec<JobStats> = self
            .executions
            .iter()
            .map(|entry| JobStats {
                job_name: entry.key().clone(),
                summary: ExecutionSummary {
                    total: entry.value().load(Ordering::Relaxed),
                    succeeded: get(&self.successes, entry.key()),
                    failed: get(&self.failures, entry.key()),
                },
            })
            .collect();
        rows.sort_by(|a, b| a.job_name.cmp(&b.job_name));
        rows
    }

    /// Prometheus text exposition of the counters.
    pub fn export(&self) -> String {
        let rows = self.per_job();
        let mut output = String::new();

        let families: [(&str, &str, fn(&ExecutionSummary) -> u64); 3] = [
            ("dsrunner_job_executions_total", "Total number of job executions", |s| s.total),
            ("dsrunner_job_successes_total", "Total number of successful job executions", |s| s.succeeded),
            ("dsrunner_job_failures_total", "Total number of failed job executions", |s| s.failed),
        ];

        for (name, help, value) in families {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            for row in &rows {
                output.push_str(&format!(
                    "{}{{job_name=\"{}\"}} {}\n",
                    name,
                    escape_label(&row.job_name),
                    value(&row.summary)
                ));
            }
            output.push('\n');
        }

        let summary = self.summary();
        output.push_str("# HELP dsrunner_success_ratio Share of executions that succeeded\n");
        output.push_str("# TYPE dsrunner_success_ratio gauge\n");
        output.push_str(&format!(
            "dsrunner_success_ratio {}\n",
            summary.success_rate().unwrap_or(0.0)
        ));

        output
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn bump(map: &DashMap<String, AtomicU64>, key: &str) {
    map.entry(key.to_string())
        .or_insert_with(|| AtomicU64::new(0))
        .fetch_add(1, Ordering::Relaxed);
}

fn get(map: &DashMap<String, AtomicU64>, key: &str) -> u64 {
    map.get(key).map(|v| v.load(Ordering::Relaxed)).unwrap_or(0)
}

fn sum(map: &DashMap<String, AtomicU64>) -> u64 {
    map.iter().map(|e| e.value().load(Ordering::Relaxed)).sum()
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}
