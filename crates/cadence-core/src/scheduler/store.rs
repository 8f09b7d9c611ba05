//! Scheduler task storage using JSON files
//!
//! One pretty-printed JSON record per task, named `<id>.json`, in a single
//! directory. Records are fully rewritten on every save; there are no
//! transactions across tasks.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::types::{validate_task_id, Result, ScheduledTask, SchedulerError};

const RECORD_EXTENSION: &str = "json";

/// File-based scheduler store
#[derive(Debug, Clone)]
pub struct SchedulerStore {
    dir: PathBuf,
}

impl SchedulerStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn from_path(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory holding the task records
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `id`
    pub fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, RECORD_EXTENSION))
    }

    /// Load every task record.
    ///
    /// Unreadable or malformed records, and records whose `id` differs from
    /// their file name, are skipped with a warning. Records are
    /// returned sorted by ID so startup order is stable.
    pub fn load_all(&self) -> Result<Vec<ScheduledTask>> {
        let mut tasks = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!(dir = %self.dir.display(), "Failed to read store entry: {}", e);
                    continue;
                }
            };
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }

            match Self::read_record(&path) {
                Ok(task) => tasks.push(task),
                Err(e) => warn!(path = %path.display(), "Skipping task record: {}", e),
            }
        }

        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(count = tasks.len(), dir = %self.dir.display(), "Loaded task records");
        Ok(tasks)
    }

    fn read_record(path: &Path) -> Result<ScheduledTask> {
        let bytes = fs::read(path)?;
        let task: ScheduledTask = serde_json::from_slice(&bytes)?;
        validate_task_id(&task.id)?;

        // The file name is the record's identity
        let stem = path.file_stem().and_then(|stem| stem.to_str());
        if stem != Some(task.id.as_str()) {
            return Err(SchedulerError::InvalidConfig(format!(
                "record id {:?} does not match its file name",
                task.id
            )));
        }
        Ok(task)
    }

    /// Write the full current state of `task`.
    ///
    /// The record is written to a sibling temp file and renamed into place.
    pub fn save(&self, task: &ScheduledTask) -> Result<()> {
        validate_task_id(&task.id)?;
        let json = serde_json::to_vec_pretty(task)?;

        let path = self.record_path(&task.id);
        let tmp = self.dir.join(format!(".{}.{}.tmp", task.id, RECORD_EXTENSION));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        debug!(task_id = %task.id, status = %task.status, "Saved task record");
        Ok(())
    }

    /// Delete the record for `id`; a missing record is not an error
    pub fn delete(&self, id: &str) -> Result<()> {
        validate_task_id(id)?;
        match fs::remove_file(self.record_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
