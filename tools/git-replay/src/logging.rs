use crate::errors::ReplayError;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const DEFAULT_DISK_BUDGET_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

static RUN_LOGGER: OnceLock<JsonlLogger> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
        }
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), ReplayError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ReplayError::Io(e.to_string()))?;
        }
        let line = serde_json::to_string(&LogEvent {
            level: event.level,
            event_type: event.event_type,
            payload: truncate_json(event.payload.clone(), self.max_payload_bytes),
        })
        .map_err(|e| ReplayError::Io(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ReplayError::Io(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| ReplayError::Io(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            prune_run_logs(parent, self.budget_bytes, &self.path)?;
        }
        Ok(())
    }
}

/// Installs the process-wide run log. Returns false if one was already installed.
pub fn install_run_logger(logger: JsonlLogger) -> bool {
    RUN_LOGGER.set(logger).is_ok()
}

/// Best effort: a run must never fail because its log could not be written.
pub fn append_run_log(level: &str, event_type: &str, payload: Value) {
    let Some(logger) = RUN_LOGGER.get() else {
        return;
    };
    let _ = logger.append(&LogEvent {
        level,
        event_type,
        payload,
    });
}

/// Deletes the oldest run logs next to `keep` until their total fits `budget_bytes`.
/// Only `*.jsonl` files named `<stem>.*` or `<stem>-*` after `keep` count as run logs;
/// `keep` itself is never deleted, even when it alone exceeds the budget.
pub fn prune_run_logs(
    dir: &Path,
    budget_bytes: u64,
    keep: &Path,
) -> Result<Vec<PathBuf>, ReplayError> {
    let stem = keep
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut logs = fs::read_dir(dir)
        .map_err(|e| ReplayError::Io(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_run_log(path, &stem))
        .filter_map(|path| {
            let meta = fs::metadata(&path).ok()?;
            Some((meta.modified().ok(), meta.len(), path))
        })
        .collect::<Vec<_>>();
    logs.sort_by(|a, b| a.0.cmp(&b.0));

    let mut total = logs.iter().map(|(_, len, _)| *len).sum::<u64>();
    let mut deleted = Vec::new();
    for (_, len, path) in logs {
        if total <= budget_bytes {
            break;
        }
        if path == keep {
            continue;
        }
        fs::remove_file(&path).map_err(|e| ReplayError::Io(e.to_string()))?;
        total = total.saturating_sub(len);
        deleted.push(path);
    }
    Ok(deleted)
}

fn is_run_log(path: &Path, stem: &str) -> bool {
    if stem.is_empty() || !path.extension().is_some_and(|ext| ext == "jsonl") {
        return false;
    }
    let Some(name) = path.file_name().map(|name| name.to_string_lossy()) else {
        return false;
    };
    name.starts_with(&format!("{stem}.")) || name.starts_with(&format!("{stem}-"))
}

fn truncate_json(value: Value, max_bytes: usize) -> Value {
    let rendered = serde_json::to_string(&value).unwrap_or_default();
    if rendered.len() <= max_bytes {
        return value;
    }
    let mut cut = max_bytes.saturating_sub(3);
    while cut > 0 && !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    Value::String(format!("{}...", &rendered[..cut]))
}
