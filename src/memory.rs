use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AndroidUseResult;

/// One reinforced task pattern. Strength grows by one per successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub task: String,
    pub success_count: u32,
    pub failure_count: u32,
    pub last_used: DateTime<Utc>,
}

/// Aggregate counters served by `GET /memory/stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_memories: u64,
    pub total_accumulated_experience: u64,
}

/// Reinforcement store for finished tasks, persisted as a JSON file.
/// An absent or unreadable file starts the store empty.
pub struct TaskMemory {
    path: PathBuf,
    records: BTreeMap<String, MemoryRecord>,
}

impl TaskMemory {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Vec<MemoryRecord>>(&text) {
                Ok(list) => list
                    .into_iter()
                    .map(|r| (normalize_task(&r.task), r))
                    .collect(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "memory file unreadable, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "memory file unreadable, starting empty");
                BTreeMap::new()
            }
        };
        Self { path, records }
    }

    /// Record one finished run. An existing pattern is reinforced, a new one
    /// is created, and the store is written back.
    pub fn record_experience(&mut self, task: &str, success: bool) -> AndroidUseResult<()> {
        let key = normalize_task(task);
        match self.records.get_mut(&key) {
            Some(record) => {
                if success {
                    record.success_count += 1;
                } else {
                    record.failure_count += 1;
                }
                record.last_used = Utc::now();
                tracing::info!(
                    task = %record.task,
                    strength = record.success_count,
                    "memory reinforced"
                );
            }
            None => {
                self.records.insert(
                    key,
                    MemoryRecord {
                        task: task.trim().to_string(),
                        success_count: u32::from(success),
                        failure_count: u32::from(!success),
                        last_used: Utc::now(),
                    },
                );
                tracing::info!(task = %task.trim(), "memory created");
            }
        }
        self.save()
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            total_memories: self.records.len() as u64,
            total_accumulated_experience: self
                .records
                .values()
                .map(|r| u64::from(r.success_count))
                .sum(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> AndroidUseResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let list: Vec<&MemoryRecord> = self.records.values().collect();
        std::fs::write(&self.path, serde_json::to_string_pretty(&list)?)?;
        Ok(())
    }
}

/// Case- and whitespace-insensitive pattern key, so "Open  Settings" and
/// "open settings" reinforce the same record.
fn normalize_task(task: &str) -> String {
    task.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> TaskMemory {
        let path = std::env::temp_dir().join(format!(
            "android-use-memory-test-{}.json",
            uuid::Uuid::new_v4()
        ));
        TaskMemory::load(path)
    }

    #[test]
    fn repeated_success_reinforces_one_record() {
        let mut store = temp_store();
        store.record_experience("Open Settings", true).unwrap();
        store.record_experience("open   settings", true).unwrap();

        assert_eq!(
            store.stats(),
            MemoryStats {
                total_memories: 1,
                total_accumulated_experience: 2,
            }
        );
    }

    #[test]
    fn failures_count_as_memories_but_not_experience() {
        let mut store = temp_store();
        store.record_experience("book a flight", false).unwrap();

        assert_eq!(
            store.stats(),
            MemoryStats {
                total_memories: 1,
                total_accumulated_experience: 0,
            }
        );
    }

    #[test]
    fn stats_sum_over_all_records() {
        let mut store = temp_store();
        store.record_experience("task a", true).unwrap();
        store.record_experience("task a", true).unwrap();
        store.record_experience("task b", true).unwrap();
        store.record_experience("task c", false).unwrap();

        let stats = store.stats();
        assert_eq!(stats.total_memories, 3);
        assert_eq!(stats.total_accumulated_experience, 3);
    }

    #[test]
    fn store_round_trips_through_its_file() {
        let mut store = temp_store();
        let path = store.path().to_path_buf();
        store.record_experience("check the weather", true).unwrap();
        store.record_experience("check the weather", true).unwrap();
        drop(store);

        let reloaded = TaskMemory::load(&path);
        assert_eq!(reloaded.stats().total_accumulated_experience, 2);
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let path = std::env::temp_dir().join(format!(
            "android-use-memory-corrupt-{}.json",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&path, "{ not json").unwrap();

        let mut store = TaskMemory::load(&path);
        assert_eq!(store.stats().total_memories, 0);

        // A fresh record replaces the corrupt file.
        store.record_experience("recover", true).unwrap();
        let reloaded = TaskMemory::load(&path);
        assert_eq!(reloaded.stats().total_memories, 1);
    }
}
