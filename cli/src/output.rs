use anyhow::{Context, Result};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use common::{ExecutionRecord, ExecutionStatus};
use runner::{ExecutionSummary, JobStats, ParsedJobRequest};
use serde::Serialize;
use std::path::Path;

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn status_cell(status: ExecutionStatus) -> Cell {
    let color = match status {
        ExecutionStatus::Success => Color::Green,
        ExecutionStatus::Failed => Color::Red,
        ExecutionStatus::Pending => Color::Blue,
    };
    Cell::new(status).fg(color)
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn print_record(record: &ExecutionRecord, as_json: bool) {
    if as_json {
        match serde_json::to_string(record) {
            Ok(line) => println!("{}", line),
            Err(e) => log::error!("Failed to serialize record {}: {}", record.id, e),
        }
        return;
    }

    let mut table = table();
    table.add_row(vec![Cell::new("Job"), Cell::new(&record.job_name)]);
    table.add_row(vec![Cell::new("Status"), status_cell(record.status)]);
    table.add_row(vec![Cell::new("Message"), Cell::new(&record.message)]);
    table.add_row(vec![Cell::new("Execution ID"), Cell::new(&record.id)]);
    table.add_row(vec![
        Cell::new("Submitted"),
        Cell::new(record.submitted_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")),
    ]);
    table.add_row(vec![Cell::new("Request"), Cell::new(pretty(&record.request_payload))]);
    table.add_row(vec![Cell::new("Response"), Cell::new(pretty(&record.response_payload))]);
    println!("{table}");
}

pub fn print_history(records: &[ExecutionRecord], details: bool) {
    if records.is_empty() {
        println!("No execution history. Run a job to see the results here.");
        return;
    }

    let mut table = table();
    let mut header = vec!["Submitted", "Job", "Status", "Message"];
    if details {
        header.extend(["Request", "Response"]);
    }
    table.set_header(header);

    for record in records {
        let mut row = vec![
            Cell::new(record.submitted_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")),
            Cell::new(&record.job_name),
            status_cell(record.status),
            Cell::new(&record.message),
        ];
        if details {
            row.push(Cell::new(pretty(&record.request_payload)));
            row.push(Cell::new(pretty(&record.response_payload)));
        }
        table.add_row(row);
    }
    println!("{table}");
}

pub fn print_stats(summary: &ExecutionSummary, rows: &[JobStats]) {
    let rate = |s: &ExecutionSummary| {
        s.success_rate()
            .map(|r| format!("{:.1}%", r * 100.0))
            .unwrap_or_else(|| "-".to_string())
    };

    println!("Total executions: {}", summary.total);
    println!("Successful runs:  {}", summary.succeeded);
    println!("Failed runs:      {}", summary.failed);
    println!("Success rate:     {}", rate(summary));

    if rows.is_empty() {
        println!("\nNo data available");
        return;
    }

    let mut table = table();
    table.set_header(vec!["Job", "Runs", "Success", "Failed", "Rate"]);
    for row in rows {
        table.add_row(vec![
            Cell::new(&row.job_name),
            Cell::new(row.summary.total),
            Cell::new(row.summary.succeeded).fg(Color::Green),
            Cell::new(row.summary.failed).fg(Color::Red),
            Cell::new(rate(&row.summary)),
        ]);
    }
    println!("\n{table}");
}

pub fn print_parsed(parsed: &ParsedJobRequest) {
    println!("Job: {}", parsed.job_name);
    if let Some(explanation) = &parsed.explanation {
        println!("{}", explanation);
    }
    let vars = parsed.to_variables();
    if vars.is_empty() {
        println!("No global variables.");
        return;
    }
    let mut table = table();
    table.set_header(vec!["Variable", "Value"]);
    for var in vars {
        table.add_row(vec![var.key, var.value]);
    }
    println!("{table}");
}

#[derive(Serialize)]
struct HistoryRow<'a> {
    id: &'a str,
    submitted_at: String,
    job_name: &'a str,
    status: String,
    message: &'a str,
    request_payload: String,
    response_payload: String,
}

pub fn export_csv(records: &[ExecutionRecord], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {:?}", path))?;
    for record in records {
        writer.serialize(HistoryRow {
            id: &record.id.0,
            submitted_at: record.submitted_at.to_rfc3339(),
            job_name: &record.job_name,
            status: record.status.to_string(),
            message: &record.message,
            request_payload: record.request_payload.to_string(),
            response_payload: record.response_payload.to_string(),
        })?;
    }
    writer.flush()?;
    Ok(())
}

pub fn print_config(config: &runner::Config, path: &Path) {
    println!("{}", config_table(config, path));
}

fn config_table(config: &runner::Config, path: &Path) -> Table {
    let conn = &config.connection;
    let secret = if conn.credential.secret().is_empty() { "(not set)" } else { "********" };

    let mut table = table();
    table.set_header(vec!["Setting", "Value"]);
    table.add_row(vec!["Config file".to_string(), path.display().to_string()]);
    table.add_row(vec!["Base URL".to_string(), conn.base_url.clone()]);
    table.add_row(vec!["CMS system".to_string(), conn.cms_system.clone()]);
    table.add_row(vec!["Auth".to_string(), conn.auth_mode().to_string()]);
    if let Some(username) = conn.credential.username() {
        table.add_row(vec!["Username".to_string(), username.to_string()]);
    }
    let secret_label = match conn.auth_mode() {
        common::AuthMode::Basic => "Password",
        common::AuthMode::Token => "Token",
    };
    table.add_row(vec![secret_label.to_string(), secret.to_string()]);
    table.add_row(vec!["Repository".to_string(), config.runner.repository.clone()]);
    table.add_row(vec!["Job server".to_string(), config.runner.job_server.clone()]);
    table.add_row(vec![
        "Server group".to_string(),
        config.runner.server_group.clone().unwrap_or_else(|| "-".to_string()),
    ]);
    table.add_row(vec![
        "Default mode".to_string(),
        if config.runner.simulate { "simulate" } else { "live" }.to_string(),
    ]);
    table.add_row(vec!["Known jobs".to_string(), config.runner.known_jobs.join(", ")]);
    table.add_row(vec![
        "History".to_string(),
        config.history.resolve_db_path().display().to_string(),
    ]);
    table
}
