use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent::state::AgentStep;
use crate::errors::AndroidUseResult;

/// One line of the session log. `role` is "task" for the opening entry and
/// "step" for everything after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ts: i64,
    pub role: String,
    pub step: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<serde_json::Value>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HistoryEntry {
    pub fn task(task: &str) -> Self {
        Self {
            ts: chrono::Utc::now().timestamp_millis(),
            role: "task".into(),
            step: 0,
            content: Some(task.to_string()),
            action: None,
            success: true,
            error: None,
        }
    }

    pub fn step(record: &AgentStep) -> Self {
        Self {
            ts: record.timestamp.timestamp_millis(),
            role: "step".into(),
            step: record.step_num,
            content: (!record.reasoning.is_empty()).then(|| record.reasoning.clone()),
            action: Some(serde_json::json!({
                "name": record.action,
                "params": record.params,
            })),
            success: record.success,
            error: record.error.clone(),
        }
    }
}

/// Append-only JSONL log of one run, one file per session.
pub struct SessionHistory {
    pub session_id: String,
    entries: Vec<HistoryEntry>,
    file_path: PathBuf,
}

impl SessionHistory {
    pub fn new(history_dir: &str) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        let file_path = sessions_dir(history_dir).join(format!("session_{session_id}.jsonl"));
        Self {
            session_id,
            entries: Vec::new(),
            file_path,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    /// Append the latest entry to the JSONL file.
    pub fn flush(&self) -> AndroidUseResult<()> {
        if let Some(last) = self.entries.last() {
            let line = serde_json::to_string(last)?;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.file_path)?;
            writeln!(file, "{line}")?;
            tracing::debug!(
                path = %self.file_path.display(),
                "history entry flushed"
            );
        }
        Ok(())
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

/// Relative directories land under the platform data dir
/// (`~/.local/share/android-use/sessions` and equivalents); absolute paths
/// are used as given. Falls back to the working directory when no data dir
/// exists.
fn sessions_dir(history_dir: &str) -> PathBuf {
    let configured = PathBuf::from(history_dir);
    let dir = if configured.is_absolute() {
        configured
    } else if let Some(data) = dirs::data_dir() {
        data.join("android-use").join(configured)
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(configured)
    };
    let _ = std::fs::create_dir_all(&dir);
    dir
}
