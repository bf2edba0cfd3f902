//! Optional long-term memory for finished runs.
//!
//! Storage is best-effort: callers record a run after it finishes, and a
//! failing store never changes the run outcome.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::core::types::RunReport;
use crate::io::ids::timestamp;

pub trait MemoryStore {
    fn store(&self, key: &str, content: &str, metadata: &Map<String, Value>) -> Result<()>;
}

/// Appends one JSON object per stored entry to a file.
#[derive(Debug, Clone)]
pub struct JsonlMemoryStore {
    path: PathBuf,
}

#[derive(Serialize)]
struct MemoryRecord<'a> {
    key: &'a str,
    content: &'a str,
    metadata: &'a Map<String, Value>,
    stored_at: String,
}

impl JsonlMemoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MemoryStore for JsonlMemoryStore {
    fn store(&self, key: &str, content: &str, metadata: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let record = MemoryRecord {
            key,
            content,
            metadata,
            stored_at: timestamp(),
        };
        let mut line = serde_json::to_string(&record).context("serialize memory record")?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append {}", self.path.display()))?;
        debug!(key, path = %self.path.display(), "memory stored");
        Ok(())
    }
}

/// Store a summary of `report` under its run id. Returns whether it was stored.
pub fn remember_run(store: &dyn MemoryStore, report: &RunReport) -> bool {
    let content = format!(
        "Goal: {}\nAudit: {}\nFinal context:\n{}",
        report.goal,
        report.audit.as_str(),
        report.final_context
    );
    let metadata = match json!({
        "goal": report.goal,
        "success": report.success,
        "status": report.status,
        "steps": report.steps.len(),
        "plan_fallback": report.plan_fallback,
        "ended_at": report.ended_at,
    }) {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    match store.store(&report.run_id, &content, &metadata) {
        Ok(()) => true,
        Err(err) => {
            warn!(run_id = %report.run_id, err = %format!("{err:#}"), "failed to store run in memory");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AuditReport, RunStatus};
    use anyhow::anyhow;

    fn report() -> RunReport {
        RunReport {
            run_id: "20260101T000000Z-abc123".to_string(),
            goal: "Compute 2+2".to_string(),
            plan_fallback: false,
            steps: Vec::new(),
            outputs: Vec::new(),
            audit: AuditReport::new("- achieved"),
            status: RunStatus::Completed,
            success: true,
            final_context: "\nStep 1 Output: 4".to_string(),
            started_at: "2026-01-01T00:00:00.000Z".to_string(),
            ended_at: "2026-01-01T00:00:01.000Z".to_string(),
        }
    }

    struct BrokenStore;

    impl MemoryStore for BrokenStore {
        fn store(&self, _: &str, _: &str, _: &Map<String, Value>) -> Result<()> {
            Err(anyhow!("disk full"))
        }
    }

    #[test]
    fn remember_run_appends_one_record_per_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = JsonlMemoryStore::new(temp.path().join("nested").join("memory.jsonl"));

        assert!(remember_run(&store, &report()));
        assert!(remember_run(&store, &report()));

        let contents = fs::read_to_string(store.path()).expect("read");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let record: Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(record["key"], "20260101T000000Z-abc123");
        assert_eq!(record["metadata"]["success"], true);
        assert_eq!(record["metadata"]["status"]["kind"], "completed");
        assert!(record["content"].as_str().expect("content").contains("Step 1 Output: 4"));
        assert!(record["stored_at"].is_string());
    }

    #[test]
    fn store_failure_is_reported_not_raised() {
        assert!(!remember_run(&BrokenStore, &report()));
    }
}
