use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use localhub_core::tasks::{NewTask, Task, TaskError, TaskRepository};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// Task repository persisted as a pretty-printed JSON array in one file.
///
/// A missing or unparsable file reads as an empty list. Every
/// read-modify-write cycle holds an async mutex, and writes go through a
/// temp file that is renamed into place.
pub struct JsonFileTaskRepo {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileTaskRepo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Vec<Task>, TaskError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(storage_err(err)),
        };
        match serde_json::from_slice(&bytes) {
            Ok(tasks) => Ok(tasks),
            Err(err) => {
                warn!(path = %self.path.display(), "task file unreadable, treating as empty: {err}");
                Ok(Vec::new())
            }
        }
    }

    fn save(&self, tasks: &[Task]) -> Result<(), TaskError> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(storage_err)?;

        let json = serde_json::to_vec_pretty(tasks).map_err(storage_err)?;
        let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
        tmp.write_all(&json).map_err(storage_err)?;
        tmp.flush().map_err(storage_err)?;
        tmp.persist(&self.path).map_err(|e| storage_err(e.error))?;
        Ok(())
    }
}

#[async_trait]
impl TaskRepository for JsonFileTaskRepo {
    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Task>, TaskError> {
        self.load()
    }

    #[instrument(skip_all)]
    async fn create(&self, input: NewTask) -> Result<Task, TaskError> {
        let _guard = self.write_lock.lock().await;
        let mut tasks = self.load()?;
        let next_id = tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        let task = Task::new(next_id, input)?;
        tasks.push(task.clone());
        self.save(&tasks)?;
        info!(id = task.id, title = %task.title, "task created");
        Ok(task)
    }

    #[instrument(skip(self))]
    async fn set_completed(&self, id: u64, completed: bool) -> Result<Task, TaskError> {
        let _guard = self.write_lock.lock().await;
        let mut tasks = self.load()?;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(TaskError::NotFound { id })?;
        task.completed = completed;
        let updated = task.clone();
        self.save(&tasks)?;
        info!(id, completed, "task updated");
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: u64) -> Result<(), TaskError> {
        let _guard = self.write_lock.lock().await;
        let mut tasks = self.load()?;
        tasks.retain(|t| t.id != id);
        self.save(&tasks)?;
        info!(id, "task deleted");
        Ok(())
    }
}

fn storage_err<E: ToString>(err: E) -> TaskError {
    TaskError::Storage {
        reason: err.to_string(),
    }
}
