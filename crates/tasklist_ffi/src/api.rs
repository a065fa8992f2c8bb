//! FFI use-case API for the task list UI.
//!
//! # Responsibility
//! - Expose create/list/update/delete/toggle/reorder to Dart via FRB.
//! - Parse raw ids and tags, and map core errors to stable error codes.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Every failure carries an `error_code` from [`ApiErrorCode`].

use log::warn;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};
use tasklist_core::db::open_with_config;
use tasklist_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    CreateTaskRequest, SqliteTaskRepository, StoreConfig, Task, TaskId, TaskPatch, TaskService,
    TaskServiceError, TaskTag,
};
use uuid::Uuid;

static STORE_CONFIG: OnceLock<StoreConfig> = OnceLock::new();

/// Stable error classes surfaced to UI callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCode {
    NotFound,
    InvalidPosition,
    InvalidInput,
    Conflict,
    StoreUnavailable,
    Internal,
}

impl ApiErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidPosition => "invalid_position",
            Self::InvalidInput => "invalid_input",
            Self::Conflict => "conflict",
            Self::StoreUnavailable => "store_unavailable",
            Self::Internal => "internal",
        }
    }

    /// HTTP-equivalent status for transports that need one.
    pub fn http_status(self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::InvalidPosition | Self::InvalidInput => 400,
            Self::Conflict => 409,
            Self::StoreUnavailable => 503,
            Self::Internal => 500,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Conflict)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ApiError {
    code: ApiErrorCode,
    message: String,
}

impl ApiError {
    fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            code: ApiErrorCode::InvalidInput,
            message: message.into(),
        }
    }
}

impl From<TaskServiceError> for ApiError {
    fn from(value: TaskServiceError) -> Self {
        let code = match &value {
            TaskServiceError::InvalidTitle => ApiErrorCode::InvalidInput,
            TaskServiceError::NotFound(_) => ApiErrorCode::NotFound,
            TaskServiceError::InvalidPosition { .. } => ApiErrorCode::InvalidPosition,
            TaskServiceError::Conflict { .. } => ApiErrorCode::Conflict,
            TaskServiceError::Unavailable(_) => ApiErrorCode::StoreUnavailable,
            TaskServiceError::Repo(_) => ApiErrorCode::Internal,
        };
        Self {
            code,
            message: value.to_string(),
        }
    }
}

/// Task as seen by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskItem {
    pub id: String,
    pub title: String,
    pub note: Option<String>,
    pub completed: bool,
    pub position: i64,
    /// Tag label, e.g. `default` or `purple`.
    pub tag: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl From<Task> for TaskItem {
    fn from(task: Task) -> Self {
        Self {
            id: task.id.to_string(),
            title: task.title,
            note: task.note,
            completed: task.completed,
            position: task.position,
            tag: task.tag.as_str().to_string(),
            created_at_ms: task.created_at,
            updated_at_ms: task.updated_at,
        }
    }
}

/// Single-task response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResponse {
    pub ok: bool,
    pub task: Option<TaskItem>,
    pub error_code: Option<String>,
    pub message: String,
}

/// Ordered task list response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskListResponse {
    pub ok: bool,
    /// Ascending by `position`.
    pub items: Vec<TaskItem>,
    pub error_code: Option<String>,
    pub message: String,
}

/// Delete response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteResponse {
    pub ok: bool,
    pub success: bool,
    pub error_code: Option<String>,
    pub message: String,
}

/// Health-check payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp_ms: i64,
}

impl TaskResponse {
    fn from_result(operation: &str, result: Result<Task, ApiError>) -> Self {
        match result {
            Ok(task) => Self {
                ok: true,
                task: Some(task.into()),
                error_code: None,
                message: format!("{operation} ok"),
            },
            Err(err) => Self {
                ok: false,
                task: None,
                error_code: Some(err.code.as_str().to_string()),
                message: failure_message(operation, &err),
            },
        }
    }
}

impl TaskListResponse {
    fn from_result(operation: &str, result: Result<Vec<Task>, ApiError>) -> Self {
        match result {
            Ok(tasks) => Self {
                ok: true,
                message: format!("{} task(s).", tasks.len()),
                items: tasks.into_iter().map(TaskItem::from).collect(),
                error_code: None,
            },
            Err(err) => Self {
                ok: false,
                items: Vec::new(),
                error_code: Some(err.code.as_str().to_string()),
                message: failure_message(operation, &err),
            },
        }
    }
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Liveness check with wall-clock timestamp.
#[flutter_rust_bridge::frb(sync)]
pub fn healthcheck() -> HealthResponse {
    HealthResponse {
        status: "ok".to_string(),
        timestamp_ms: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or_default(),
    }
}

/// Initializes Rust core logging once per process.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Creates a task. `tag` defaults to `default`; `position` defaults to the
/// end of the list.
#[flutter_rust_bridge::frb(sync)]
pub fn create_task(
    title: String,
    note: Option<String>,
    tag: Option<String>,
    position: Option<i64>,
) -> TaskResponse {
    let result = parse_optional_tag(tag.as_deref())
        .and_then(|tag| parse_position(position).map(|position| (tag, position)))
        .and_then(|(tag, position)| {
            with_task_service(|service| {
                service.create_task(CreateTaskRequest {
                    title,
                    note,
                    tag: tag.unwrap_or_default(),
                    position,
                })
            })
        });
    TaskResponse::from_result("create_task", result)
}

/// Lists all tasks in position order.
#[flutter_rust_bridge::frb(sync)]
pub fn list_tasks() -> TaskListResponse {
    TaskListResponse::from_result("list_tasks", with_task_service(|service| service.list_tasks()))
}

/// Updates payload fields. `clear_note = true` removes the note and wins
/// over `note`.
#[flutter_rust_bridge::frb(sync)]
pub fn update_task(
    id: String,
    title: Option<String>,
    note: Option<String>,
    clear_note: bool,
    tag: Option<String>,
    completed: Option<bool>,
) -> TaskResponse {
    let result = parse_task_id(&id)
        .and_then(|task_id| parse_optional_tag(tag.as_deref()).map(|tag| (task_id, tag)))
        .and_then(|(task_id, tag)| {
            let patch = TaskPatch {
                title,
                note: if clear_note { Some(None) } else { note.map(Some) },
                tag,
                completed,
            };
            with_task_service(|service| service.update_task(task_id, patch))
        });
    TaskResponse::from_result("update_task", result)
}

/// Deletes a task; positions above it close the gap.
#[flutter_rust_bridge::frb(sync)]
pub fn delete_task(id: String) -> DeleteResponse {
    let result =
        parse_task_id(&id).and_then(|task_id| with_task_service(|service| service.delete_task(task_id)));
    match result {
        Ok(()) => DeleteResponse {
            ok: true,
            success: true,
            error_code: None,
            message: "delete_task ok".to_string(),
        },
        Err(err) => DeleteResponse {
            ok: false,
            success: false,
            error_code: Some(err.code.as_str().to_string()),
            message: failure_message("delete_task", &err),
        },
    }
}

/// Sets the completed flag.
#[flutter_rust_bridge::frb(sync)]
pub fn toggle_task_completion(id: String, completed: bool) -> TaskResponse {
    let result = parse_task_id(&id).and_then(|task_id| {
        with_task_service(|service| service.toggle_completed(task_id, completed))
    });
    TaskResponse::from_result("toggle_task_completion", result)
}

/// Moves a task to `new_position` and returns the reordered list.
///
/// An unknown id reports `not_found` before the position is range-checked.
#[flutter_rust_bridge::frb(sync)]
pub fn reorder_tasks(id: String, new_position: i64) -> TaskListResponse {
    let result = parse_task_id(&id).and_then(|task_id| {
        with_task_service(|service| service.reorder_task(task_id, new_position))
    });
    TaskListResponse::from_result("reorder_tasks", result)
}

fn failure_message(operation: &str, err: &ApiError) -> String {
    format!("{operation} failed: {}", err.message)
}

fn parse_task_id(raw: &str) -> Result<TaskId, ApiError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::invalid_input(format!("invalid task id `{raw}`")))
}

fn parse_optional_tag(raw: Option<&str>) -> Result<Option<TaskTag>, ApiError> {
    raw.map(|value| {
        value
            .parse::<TaskTag>()
            .map_err(|err| ApiError::invalid_input(err.to_string()))
    })
    .transpose()
}

fn parse_position(position: Option<i64>) -> Result<Option<i64>, ApiError> {
    match position {
        Some(value) if value < 0 => Err(ApiError {
            code: ApiErrorCode::InvalidPosition,
            message: format!("position must be non-negative, got {value}"),
        }),
        other => Ok(other),
    }
}

fn resolve_store_config() -> StoreConfig {
    STORE_CONFIG
        .get_or_init(StoreConfig::from_env_or_default_file)
        .clone()
}

fn with_task_service<T>(
    f: impl FnOnce(&TaskService<SqliteTaskRepository<'_>>) -> Result<T, TaskServiceError>,
) -> Result<T, ApiError> {
    let config = resolve_store_config();
    let conn = open_with_config(&config).map_err(|err| {
        warn!("event=api_store_open module=ffi status=error error={err}");
        ApiError {
            code: ApiErrorCode::StoreUnavailable,
            message: format!("task DB open failed: {err}"),
        }
    })?;
    let repo = SqliteTaskRepository::try_new(&conn)
        .map_err(|err| ApiError {
            code: ApiErrorCode::Internal,
            message: format!("task repo init failed: {err}"),
        })?
        .with_retry_policy(config.retry);
    let service = TaskService::new(repo);
    f(&service).map_err(ApiError::from)
}

#[cfg(test)]
mod tests {
    use super::{
        core_version, create_task, delete_task, healthcheck, init_logging, list_tasks, ping,
        reorder_tasks, toggle_task_completion, update_task, ApiErrorCode,
    };
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_title(prefix: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time went backwards")
            .as_nanos();
        format!("{prefix}-{nanos}")
    }

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn healthcheck_reports_ok() {
        let health = healthcheck();
        assert_eq!(health.status, "ok");
        assert!(health.timestamp_ms > 0);
    }

    #[test]
    fn init_logging_rejects_empty_log_dir() {
        let error = init_logging("info".to_string(), String::new());
        assert!(!error.is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn error_codes_have_http_equivalents() {
        assert_eq!(ApiErrorCode::NotFound.http_status(), 404);
        assert_eq!(ApiErrorCode::InvalidPosition.http_status(), 400);
        assert_eq!(ApiErrorCode::StoreUnavailable.http_status(), 503);
        assert!(ApiErrorCode::Conflict.is_transient());
        assert!(!ApiErrorCode::NotFound.is_transient());
    }

    #[test]
    fn create_defaults_tag_and_shows_up_in_list() {
        let title = unique_title("create");
        let created = create_task(title.clone(), Some("  ".to_string()), None, None);
        assert!(created.ok, "{}", created.message);
        let item = created.task.expect("created task should be returned");
        assert_eq!(item.tag, "default");
        assert_eq!(item.note, None);
        assert!(!item.completed);

        let listed = list_tasks();
        assert!(listed.ok, "{}", listed.message);
        assert!(listed.items.iter().any(|task| task.id == item.id));
        assert!(listed
            .items
            .windows(2)
            .all(|pair| pair[0].position + 1 == pair[1].position));
    }

    #[test]
    fn create_rejects_unknown_tag_and_blank_title() {
        let bad_tag = create_task("ok title".to_string(), None, Some("teal".to_string()), None);
        assert!(!bad_tag.ok);
        assert_eq!(bad_tag.error_code.as_deref(), Some("invalid_input"));

        let blank = create_task("   ".to_string(), None, None, None);
        assert!(!blank.ok);
        assert_eq!(blank.error_code.as_deref(), Some("invalid_input"));

        let negative = create_task("neg".to_string(), None, None, Some(-3));
        assert_eq!(negative.error_code.as_deref(), Some("invalid_position"));
    }

    #[test]
    fn update_toggle_reorder_and_delete_roundtrip() {
        let created = create_task(unique_title("flow"), None, Some("purple".to_string()), None);
        assert!(created.ok, "{}", created.message);
        let id = created.task.expect("task").id;

        let updated = update_task(
            id.clone(),
            Some("renamed".to_string()),
            Some("with note".to_string()),
            false,
            None,
            None,
        );
        assert!(updated.ok, "{}", updated.message);
        let updated_item = updated.task.expect("task");
        assert_eq!(updated_item.title, "renamed");
        assert_eq!(updated_item.note.as_deref(), Some("with note"));
        assert_eq!(updated_item.tag, "purple");

        let toggled = toggle_task_completion(id.clone(), true);
        assert!(toggled.ok, "{}", toggled.message);
        assert!(toggled.task.expect("task").completed);

        let reordered = reorder_tasks(id.clone(), 0);
        assert!(reordered.ok, "{}", reordered.message);
        assert!(reordered.items.iter().any(|task| task.id == id));

        let deleted = delete_task(id.clone());
        assert!(deleted.ok && deleted.success, "{}", deleted.message);

        let again = delete_task(id);
        assert!(!again.success);
        assert_eq!(again.error_code.as_deref(), Some("not_found"));
    }

    #[test]
    fn malformed_and_unknown_ids_are_reported() {
        let malformed = toggle_task_completion("not-a-uuid".to_string(), true);
        assert_eq!(malformed.error_code.as_deref(), Some("invalid_input"));

        let unknown = reorder_tasks(uuid::Uuid::new_v4().to_string(), 0);
        assert!(!unknown.ok);
        assert_eq!(unknown.error_code.as_deref(), Some("not_found"));
        assert!(unknown.items.is_empty());
    }

    #[test]
    fn reorder_reports_unknown_id_before_bad_position() {
        let unknown = reorder_tasks(uuid::Uuid::new_v4().to_string(), -1);
        assert_eq!(unknown.error_code.as_deref(), Some("not_found"));

        let created = create_task(unique_title("range"), None, None, None);
        assert!(created.ok, "{}", created.message);
        let id = created.task.expect("task").id;
        let negative = reorder_tasks(id.clone(), -1);
        assert_eq!(negative.error_code.as_deref(), Some("invalid_position"));
        assert!(negative.items.is_empty());

        assert!(delete_task(id).ok);
    }
}
