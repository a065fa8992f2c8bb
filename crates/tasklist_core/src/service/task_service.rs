//! Task list use-case service.
//!
//! # Responsibility
//! - Normalize caller input before it reaches the repository.
//! - Collapse repository failures into caller-facing error kinds.
//!
//! # Invariants
//! - Titles are trimmed and never blank.
//! - Blank notes are stored as `None`.
//! - Service layer remains storage-agnostic.

use crate::model::task::{NewTask, Task, TaskId, TaskPatch, TaskTag};
use crate::repo::task_repo::{RepoError, TaskRepository};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Request model for creating a task.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreateTaskRequest {
    pub title: String,
    pub note: Option<String>,
    pub tag: TaskTag,
    /// Insert position; `None` appends.
    pub position: Option<i64>,
}

/// Errors from task service operations.
#[derive(Debug)]
pub enum TaskServiceError {
    /// Title is blank after trim.
    InvalidTitle,
    /// Target task does not exist.
    NotFound(TaskId),
    /// Requested position is outside the valid range.
    InvalidPosition { requested: i64, min: i64, max: i64 },
    /// Store stayed contended through every retry; safe to retry later.
    Conflict { attempts: u32 },
    /// Store cannot be reached.
    Unavailable(String),
    /// Any other repository failure.
    Repo(RepoError),
}

impl Display for TaskServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTitle => write!(f, "task title must not be blank"),
            Self::NotFound(id) => write!(f, "task not found: {id}"),
            Self::InvalidPosition {
                requested,
                min,
                max,
            } => write!(f, "invalid position {requested}; expected {min}..={max}"),
            Self::Conflict { attempts } => {
                write!(f, "task list is busy; gave up after {attempts} attempt(s)")
            }
            Self::Unavailable(message) => write!(f, "task store unavailable: {message}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TaskServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for TaskServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::InvalidPosition {
                requested,
                min,
                max,
            } => Self::InvalidPosition {
                requested,
                min,
                max,
            },
            RepoError::TransactionConflict { attempts } => Self::Conflict { attempts },
            RepoError::StoreUnavailable(message) => Self::Unavailable(message),
            other => Self::Repo(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, TaskServiceError>;

/// Task list service facade.
pub struct TaskService<R: TaskRepository> {
    repo: R,
}

impl<R: TaskRepository> TaskService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates one task. New tasks always start incomplete.
    pub fn create_task(&self, request: CreateTaskRequest) -> ServiceResult<Task> {
        let draft = NewTask {
            title: normalize_title(&request.title)?,
            note: normalize_note(request.note),
            tag: request.tag,
        };
        let task = self.repo.create_task(&draft, request.position)?;
        info!(
            "event=task_create module=task_service status=ok task_id={} position={}",
            task.id, task.position
        );
        Ok(task)
    }

    /// Lists all tasks in position order.
    pub fn list_tasks(&self) -> ServiceResult<Vec<Task>> {
        self.repo.list_tasks().map_err(Into::into)
    }

    /// Loads one task.
    pub fn get_task(&self, id: TaskId) -> ServiceResult<Task> {
        self.repo
            .get_task(id)?
            .ok_or(TaskServiceError::NotFound(id))
    }

    /// Updates payload fields. `updated_at` is refreshed even for an empty
    /// patch.
    pub fn update_task(&self, id: TaskId, patch: TaskPatch) -> ServiceResult<Task> {
        let patch = TaskPatch {
            title: patch.title.as_deref().map(normalize_title).transpose()?,
            note: patch.note.map(normalize_note),
            ..patch
        };
        let task = self.repo.update_task(id, &patch)?;
        info!("event=task_update module=task_service status=ok task_id={id}");
        Ok(task)
    }

    /// Sets the completed flag.
    pub fn toggle_completed(&self, id: TaskId, completed: bool) -> ServiceResult<Task> {
        let task = self.repo.set_completed(id, completed)?;
        info!(
            "event=task_toggle module=task_service status=ok task_id={id} completed={completed}"
        );
        Ok(task)
    }

    /// Deletes one task and closes the gap it leaves.
    pub fn delete_task(&self, id: TaskId) -> ServiceResult<()> {
        self.repo.delete_task(id)?;
        info!("event=task_delete module=task_service status=ok task_id={id}");
        Ok(())
    }

    /// Moves one task and returns the reordered list.
    pub fn reorder_task(&self, id: TaskId, new_position: i64) -> ServiceResult<Vec<Task>> {
        let tasks = self.repo.reorder_task(id, new_position)?;
        info!(
            "event=task_reorder module=task_service status=ok task_id={id} position={new_position}"
        );
        Ok(tasks)
    }
}

fn normalize_title(value: &str) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TaskServiceError::InvalidTitle);
    }
    Ok(trimmed.to_string())
}

fn normalize_note(value: Option<String>) -> Option<String> {
    value
        .map(|note| note.trim().to_string())
        .filter(|note| !note.is_empty())
}
