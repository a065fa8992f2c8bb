//! Core domain logic for the ordered task list.
//! This crate is the single source of truth for position invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod ordering;
pub mod repo;
pub mod service;

pub use config::{default_db_path, default_log_level, LogConfig, RetryPolicy, StoreConfig};
pub use logging::{init_logging, init_logging_with, logging_status};
pub use model::task::{NewTask, Task, TaskId, TaskPatch, TaskTag, UnknownTag, POSITION_BASE};
pub use ordering::{
    append_position, check_dense, CreatePlan, OrderingError, PositionMove, PositionSnapshot,
    ReorderPlan, ShiftPlan,
};
pub use repo::task_repo::{
    RepoError, RepoResult, SqliteTaskRepository, TaskRepository, PARKING_POSITION,
};
pub use service::task_service::{
    CreateTaskRequest, ServiceResult, TaskService, TaskServiceError,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
