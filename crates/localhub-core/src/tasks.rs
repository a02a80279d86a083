use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Task entity as persisted in the task list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Free-form due date as entered by the user; empty when unset.
    #[serde(default)]
    pub due_date: String,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewTask {
    /// Missing and blank titles are both rejected by `Task::new`.
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due_date: String,
}

impl Task {
    /// Build a task from validated input. The title must not be blank.
    pub fn new(id: u64, input: NewTask) -> Result<Self, TaskError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(TaskError::InvalidTitle);
        }
        Ok(Self {
            id,
            title: title.to_string(),
            description: input.description.trim().to_string(),
            due_date: input.due_date.trim().to_string(),
            completed: false,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task title is required")]
    InvalidTitle,
    #[error("task {id} not found")]
    NotFound { id: u64 },
    #[error("task storage failure: {reason}")]
    Storage { reason: String },
}

/// Repository contract for task persistence.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Task>, TaskError>;
    async fn create(&self, input: NewTask) -> Result<Task, TaskError>;
    async fn set_completed(&self, id: u64, completed: bool) -> Result<Task, TaskError>;
    /// Remove a task. Unknown ids are ignored.
    async fn delete(&self, id: u64) -> Result<(), TaskError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_trims_input_and_starts_open() {
        let task = Task::new(
            3,
            NewTask {
                title: "  Write docs ".into(),
                description: " draft ".into(),
                due_date: "2025-01-31".into(),
            },
        )
        .expect("valid task");
        assert_eq!(task.id, 3);
        assert_eq!(task.title, "Write docs");
        assert_eq!(task.description, "draft");
        assert!(!task.completed);
    }

    #[test]
    fn blank_title_is_rejected() {
        let err = Task::new(1, NewTask::default()).expect_err("blank title");
        assert!(matches!(err, TaskError::InvalidTitle));
    }

    #[test]
    fn missing_title_reaches_validation() {
        let input: NewTask = serde_json::from_str("{}").expect("parse");
        let err = Task::new(1, input).expect_err("missing title");
        assert!(matches!(err, TaskError::InvalidTitle));
    }

    #[test]
    fn missing_optional_fields_deserialize_with_defaults() {
        let task: Task = serde_json::from_str(
            r#"{"id": 1, "title": "t", "created_at": "2024-05-01T10:00:00Z"}"#,
        )
        .expect("parse");
        assert_eq!(task.description, "");
        assert!(!task.completed);
    }
}
