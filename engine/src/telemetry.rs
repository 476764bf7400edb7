use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::{LogFormat, LoggingConfig};

/// Initialize the process-wide `tracing` subscriber. Idempotent
/// failure mode: if a subscriber is already installed this returns an
/// error rather than panicking.
pub fn init_telemetry(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("invalid log level configuration")?;

    let registry = Registry::default().with(env_filter);

    match config.format {
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);
            registry.with(fmt_layer).try_init().context("failed to install tracing subscriber")?;
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .flatten_event(true);
            registry.with(fmt_layer).try_init().context("failed to install tracing subscriber")?;
        }
        LogFormat::Compact => {
            let fmt_layer = fmt::layer().compact().with_target(true);
            registry.with(fmt_layer).try_init().context("failed to install tracing subscriber")?;
        }
    }

    tracing::info!(log_level = %config.level, log_format = ?config.format, "telemetry initialized");
    Ok(())
}

/// One append-only telemetry record. Distinct from the structured
/// `tracing` output: this is the machine-read feed the `metrics`
/// operation aggregates over, so it gets its own file rather than
/// being scraped out of the human-facing log.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub agent_id: Option<String>,
    pub task_id: Option<String>,
    pub outcome: String,
    pub duration_ms: Option<u64>,
}

/// Best-effort NDJSON appender for `telemetry/events.log`.
///
/// Failures to write are logged via `tracing` and otherwise swallowed:
/// telemetry is diagnostic, not part of the mutation path, so a full
/// disk must never fail an otherwise-successful operation.
pub struct TelemetryLog {
    path: PathBuf,
}

impl TelemetryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, event: &TelemetryEvent) {
        if let Err(e) = self.try_append(event) {
            tracing::warn!(error = %e, "failed to append telemetry event");
        }
    }

    fn try_append(&self, event: &TelemetryEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(event)?;
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Read back every event for the `metrics` operation.
    pub fn read_all(&self) -> Result<Vec<TelemetryEvent>> {
        Self::read_all_from(&self.path)
    }

    /// A crash mid-append can leave the final line truncated, so only
    /// that trailing line is tolerated when malformed; it is discarded
    /// rather than failing the whole read. Any earlier malformed line
    /// indicates real corruption and still errors out.
    fn read_all_from(path: &Path) -> Result<Vec<TelemetryEvent>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path)?;
        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();

        let mut events = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            match serde_json::from_str(line) {
                Ok(event) => events.push(event),
                Err(e) if i == lines.len() - 1 => {
                    tracing::warn!(error = %e, "discarding truncated trailing telemetry record");
                }
                Err(e) => return Err(e).context("malformed telemetry record"),
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_read_round_trip() {
        let dir = tempdir().unwrap();
        let log = TelemetryLog::new(dir.path().join("events.log"));

        log.append(&TelemetryEvent {
            timestamp: Utc::now(),
            operation: "complete".to_string(),
            agent_id: Some("alice".to_string()),
            task_id: Some("a1b2c3d4".to_string()),
            outcome: "ok".to_string(),
            duration_ms: Some(12),
        });

        let events = log.read_all().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].operation, "complete");
    }

    #[test]
    fn missing_log_reads_as_empty() {
        let dir = tempdir().unwrap();
        let log = TelemetryLog::new(dir.path().join("missing.log"));
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn truncated_trailing_line_is_discarded_not_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");
        let good = serde_json::to_string(&TelemetryEvent {
            timestamp: Utc::now(),
            operation: "add".to_string(),
            agent_id: None,
            task_id: None,
            outcome: "ok".to_string(),
            duration_ms: None,
        })
        .unwrap();
        std::fs::write(&path, format!("{good}\n{{\"timestamp\":\"truncat")).unwrap();

        let log = TelemetryLog::new(&path);
        let events = log.read_all().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].operation, "add");
    }

    #[test]
    fn malformed_non_trailing_line_still_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");
        let good = serde_json::to_string(&TelemetryEvent {
            timestamp: Utc::now(),
            operation: "add".to_string(),
            agent_id: None,
            task_id: None,
            outcome: "ok".to_string(),
            duration_ms: None,
        })
        .unwrap();
        std::fs::write(&path, format!("not json at all\n{good}\n")).unwrap();

        let log = TelemetryLog::new(&path);
        assert!(log.read_all().is_err());
    }
}
