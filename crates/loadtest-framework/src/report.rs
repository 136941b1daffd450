//! Run summary types and rendering.

use crate::config::Phase;
use crate::error::SchedulerError;
use crate::metrics::MetricsSnapshot;
use crate::status::WorkloadStatus;
use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use serde::Serialize;
use std::path::Path;

/// Outcome and aggregate metrics of one scheduler session.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub workload: String,
    pub phase: Phase,
    pub status: WorkloadStatus,
    /// Why the run aborted, when it did.
    pub abort_reason: Option<String>,
    /// Human-readable target rate.
    pub target: String,
    pub target_run_duration_secs: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metrics: MetricsSnapshot,
    pub avg_latency_ms: Option<f64>,
    /// Most recent error messages, oldest first.
    pub errors: Vec<String>,
    pub post_process_error: Option<String>,
}

impl RunSummary {
    pub fn is_completed(&self) -> bool {
        self.status == WorkloadStatus::Completed
    }

    pub fn is_aborted(&self) -> bool {
        self.status == WorkloadStatus::Aborted
    }

    /// Write the summary as pretty-printed JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), SchedulerError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Generate a plain-text summary.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Run Summary ({}): {}\n\
             ================\n\
             Workload: {}\n\
             Target: {}\n\
             Duration: {} of {}\n",
            self.phase,
            self.status,
            self.workload,
            self.target,
            format_duration(self.metrics.elapsed_secs),
            format_duration(self.target_run_duration_secs),
        );

        if let Some(reason) = &self.abort_reason {
            summary.push_str(&format!("Abort reason: {reason}\n"));
        }

        summary.push_str(&format!(
            "\nResults:\n\
             - Success: {}\n\
             - Errors: {}\n\
             - Aborted: {}\n\
             - Pending: {}\n\
             - Calls/sec: {:.1} ({:+.1}% vs target)\n\
             - Errors/sec: {:.2}\n",
            format_number(self.metrics.success),
            format_number(self.metrics.errors),
            format_number(self.metrics.aborted),
            format_number(self.metrics.pending),
            self.metrics.calls_per_second,
            self.metrics.cps_diff_pct,
            self.metrics.errors_per_second,
        ));

        if !self.errors.is_empty() {
            summary.push_str("\nErrors:\n");
            for error in &self.errors {
                summary.push_str(&format!("- {error}\n"));
            }
        }

        summary
    }

    /// Render the summary as a table.
    pub fn format_table(&self) -> String {
        let mut output = String::new();

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Metric", "Value"]);

        let status_cell = match self.status {
            WorkloadStatus::Completed => Cell::new(self.status).fg(Color::Green),
            WorkloadStatus::Aborted => Cell::new(self.status).fg(Color::Red),
            _ => Cell::new(self.status).fg(Color::Yellow),
        };
        table.add_row(vec![Cell::new("Status"), status_cell]);
        if let Some(reason) = &self.abort_reason {
            table.add_row(vec![Cell::new("Abort reason"), Cell::new(reason).fg(Color::Red)]);
        }
        table.add_row(vec!["Workload", self.workload.as_str()]);
        table.add_row(vec!["Phase".to_string(), self.phase.to_string()]);
        table.add_row(vec!["Target", self.target.as_str()]);
        table.add_row(vec![
            "Duration".to_string(),
            format!(
                "{} / {}",
                format_duration(self.metrics.elapsed_secs),
                format_duration(self.target_run_duration_secs)
            ),
        ]);
        table.add_row(vec!["Success".to_string(), format_number(self.metrics.success)]);
        table.add_row(vec!["Errors".to_string(), format_number(self.metrics.errors)]);
        table.add_row(vec!["Aborted".to_string(), format_number(self.metrics.aborted)]);
        table.add_row(vec!["Pending".to_string(), format_number(self.metrics.pending)]);
        table.add_row(vec![
            "Calls/sec".to_string(),
            format!(
                "{:.1} ({:+.1}% vs target)",
                self.metrics.calls_per_second, self.metrics.cps_diff_pct
            ),
        ]);
        table.add_row(vec![
            "Errors/sec".to_string(),
            format!("{:.2}", self.metrics.errors_per_second),
        ]);
        table.add_row(vec![
            "Avg latency".to_string(),
            self.avg_latency_ms
                .map(|ms| format!("{ms:.2}ms"))
                .unwrap_or_else(|| "-".to_string()),
        ]);
        if let Some(started) = self.started_at {
            table.add_row(vec!["Started".to_string(), started.to_rfc3339()]);
        }
        if let Some(completed) = self.completed_at {
            table.add_row(vec!["Completed".to_string(), completed.to_rfc3339()]);
        }

        output.push_str(&table.to_string());

        if !self.errors.is_empty() {
            output.push_str("\n\nRecent errors:\n");
            for error in &self.errors {
                output.push_str(&format!("  - {error}\n"));
            }
        }
        if let Some(error) = &self.post_process_error {
            output.push_str(&format!("\nPost-process failed: {error}\n"));
        }

        output
    }
}

/// Format duration in human-readable form.
fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else if secs < 3600.0 {
        let mins = (secs / 60.0).floor();
        let remaining_secs = secs - (mins * 60.0);
        format!("{}m {:02.0}s", mins as u64, remaining_secs)
    } else {
        let hours = (secs / 3600.0).floor();
        let remaining = secs - (hours * 3600.0);
        let mins = (remaining / 60.0).floor();
        format!("{}h {:02.0}m", hours as u64, mins as u64)
    }
}

/// Format number with thousands separators.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}
