//! Task repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Turn ordering plans into atomic read-modify-write transactions.
//! - Serve task reads in ascending position order.
//!
//! # Invariants
//! - Create, delete and reorder read the position snapshot, plan, and apply
//!   inside one `IMMEDIATE` transaction; a failure rolls everything back.
//! - Payload edits never write `position`.
//! - Reads and writes share one retry loop, so lock contention and store
//!   failures surface as the same error kinds everywhere.
//! - Every row whose position or payload changes gets a fresh `updated_at`.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::config::RetryPolicy;
use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::task::{NewTask, Task, TaskId, TaskPatch, TaskTag};
use crate::ordering::{OrderingError, PositionMove, PositionSnapshot};
use log::{debug, error, warn};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Slot outside the dense range that holds a task while neighbors shift.
pub const PARKING_POSITION: i64 = -1;

const TASK_SELECT_SQL: &str = "SELECT
    id,
    title,
    note,
    completed,
    position,
    tag,
    created_at,
    updated_at
FROM tasks";

const TASK_COLUMNS: [&str; 8] = [
    "id",
    "title",
    "note",
    "completed",
    "position",
    "tag",
    "created_at",
    "updated_at",
];

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from task repository operations.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Referenced task does not exist.
    NotFound(TaskId),
    /// Requested position lies outside `[min, max]`.
    InvalidPosition { requested: i64, min: i64, max: i64 },
    /// Lock contention persisted through every retry attempt.
    TransactionConflict { attempts: u32 },
    /// Store cannot be reached or written.
    StoreUnavailable(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid task, or positions are
    /// no longer dense.
    InvalidData(String),
}

impl RepoError {
    fn is_contention(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_contention())
    }

    fn is_unavailable(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_unavailable())
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "task not found: {id}"),
            Self::InvalidPosition {
                requested,
                min,
                max,
            } => write!(f, "invalid position {requested}; expected {min}..={max}"),
            Self::TransactionConflict { attempts } => {
                write!(f, "transaction conflict persisted after {attempts} attempt(s)")
            }
            Self::StoreUnavailable(message) => write!(f, "task store unavailable: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "task repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "task repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "task repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted task data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<OrderingError> for RepoError {
    fn from(value: OrderingError) -> Self {
        match value {
            OrderingError::PositionOutOfRange {
                requested,
                min,
                max,
            } => Self::InvalidPosition {
                requested,
                min,
                max,
            },
            OrderingError::UnknownTask(id) => Self::NotFound(id),
            OrderingError::Inconsistent(message) => Self::InvalidData(message),
        }
    }
}

/// Repository interface for the ordered task list.
pub trait TaskRepository {
    /// Creates a task, appended or inserted at `requested_position`.
    fn create_task(&self, draft: &NewTask, requested_position: Option<i64>) -> RepoResult<Task>;
    /// Loads one task by id.
    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>>;
    /// Lists all tasks in ascending position order.
    fn list_tasks(&self) -> RepoResult<Vec<Task>>;
    /// Applies payload fields from `patch`.
    fn update_task(&self, id: TaskId, patch: &TaskPatch) -> RepoResult<Task>;
    /// Sets the completed flag.
    fn set_completed(&self, id: TaskId, completed: bool) -> RepoResult<Task>;
    /// Deletes a task and compacts the positions above it.
    fn delete_task(&self, id: TaskId) -> RepoResult<()>;
    /// Moves a task to `new_position`; returns the full ordered list.
    fn reorder_task(&self, id: TaskId, new_position: i64) -> RepoResult<Vec<Task>>;
    /// Loads and validates the current position order.
    fn position_snapshot(&self) -> RepoResult<PositionSnapshot>;
}

/// SQLite-backed task repository.
pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
    retry: RetryPolicy,
}

impl<'conn> SqliteTaskRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_task_connection_ready(conn)?;
        Ok(Self {
            conn,
            retry: RetryPolicy::default(),
        })
    }

    /// Replaces the conflict retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Runs `body` in a transaction, retrying on lock contention.
    fn run<T>(
        &self,
        event: &'static str,
        behavior: TransactionBehavior,
        mut body: impl FnMut(&Transaction<'_>) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let started_at = Instant::now();
        let attempts = self.retry.attempts();
        let mut attempt = 1;
        loop {
            let result = self.run_once(behavior, &mut body);
            match result {
                Ok(value) => {
                    debug!(
                        "event={event} module=task_repo status=ok attempts={attempt} duration_ms={}",
                        started_at.elapsed().as_millis()
                    );
                    return Ok(value);
                }
                Err(err) if err.is_contention() && attempt < attempts => {
                    warn!(
                        "event=tx_conflict_retry module=task_repo status=retry op={event} attempt={attempt}"
                    );
                    std::thread::sleep(self.retry.delay_for(attempt));
                    attempt += 1;
                }
                Err(err) if err.is_contention() => {
                    error!(
                        "event={event} module=task_repo status=error error_code=tx_conflict attempts={attempt}"
                    );
                    return Err(RepoError::TransactionConflict { attempts: attempt });
                }
                Err(err) if err.is_unavailable() => {
                    error!(
                        "event={event} module=task_repo status=error error_code=store_unavailable error={err}"
                    );
                    return Err(RepoError::StoreUnavailable(err.to_string()));
                }
                Err(err) => {
                    debug!("event={event} module=task_repo status=error error={err}");
                    return Err(err);
                }
            }
        }
    }

    fn run_once<T>(
        &self,
        behavior: TransactionBehavior,
        body: &mut impl FnMut(&Transaction<'_>) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let tx = Transaction::new_unchecked(self.conn, behavior)?;
        let value = body(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn create_task(&self, draft: &NewTask, requested_position: Option<i64>) -> RepoResult<Task> {
        self.run("task_create", TransactionBehavior::Immediate, |tx| {
            let snapshot = load_snapshot(tx)?;
            let plan = snapshot.assign_on_create(requested_position)?;
            let now = now_epoch_ms();

            apply_moves(tx, plan.shifts.moves(), now)?;
            let task = Task {
                id: Uuid::new_v4(),
                title: draft.title.clone(),
                note: draft.note.clone(),
                completed: false,
                position: plan.target,
                tag: draft.tag,
                created_at: now,
                updated_at: now,
            };
            insert_task(tx, &task)?;

            debug!(
                "event=task_create module=task_repo status=planned position={} shifted={}",
                plan.target,
                plan.shifts.len()
            );
            Ok(task)
        })
    }

    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>> {
        self.run("task_get", TransactionBehavior::Deferred, |tx| load_task(tx, id))
    }

    fn list_tasks(&self) -> RepoResult<Vec<Task>> {
        self.run("task_list", TransactionBehavior::Deferred, |tx| list_ordered(tx))
    }

    fn update_task(&self, id: TaskId, patch: &TaskPatch) -> RepoResult<Task> {
        self.run("task_update", TransactionBehavior::Deferred, |tx| {
            let changed = tx.execute(
                "UPDATE tasks
                 SET
                    title = COALESCE(?2, title),
                    note = CASE WHEN ?3 = 1 THEN ?4 ELSE note END,
                    tag = COALESCE(?5, tag),
                    completed = COALESCE(?6, completed),
                    updated_at = ?7
                 WHERE id = ?1;",
                params![
                    id.to_string(),
                    patch.title.as_deref(),
                    bool_to_int(patch.note.is_some()),
                    patch.note.clone().flatten(),
                    patch.tag.map(TaskTag::as_str),
                    patch.completed.map(bool_to_int),
                    now_epoch_ms(),
                ],
            )?;
            if changed == 0 {
                return Err(RepoError::NotFound(id));
            }
            load_required_task(tx, id)
        })
    }

    fn set_completed(&self, id: TaskId, completed: bool) -> RepoResult<Task> {
        self.run("task_toggle", TransactionBehavior::Deferred, |tx| {
            let changed = tx.execute(
                "UPDATE tasks
                 SET completed = ?2,
                     updated_at = ?3
                 WHERE id = ?1;",
                params![id.to_string(), bool_to_int(completed), now_epoch_ms()],
            )?;
            if changed == 0 {
                return Err(RepoError::NotFound(id));
            }
            load_required_task(tx, id)
        })
    }

    fn delete_task(&self, id: TaskId) -> RepoResult<()> {
        self.run("task_delete", TransactionBehavior::Immediate, |tx| {
            let snapshot = load_snapshot(tx)?;
            let position = snapshot.position_of(id).ok_or(RepoError::NotFound(id))?;
            let plan = snapshot.compact_on_delete(position)?;

            tx.execute("DELETE FROM tasks WHERE id = ?1;", [id.to_string()])?;
            apply_moves(tx, plan.moves(), now_epoch_ms())?;

            debug!(
                "event=task_delete module=task_repo status=planned position={position} shifted={}",
                plan.len()
            );
            Ok(())
        })
    }

    fn reorder_task(&self, id: TaskId, new_position: i64) -> RepoResult<Vec<Task>> {
        self.run("task_reorder", TransactionBehavior::Immediate, |tx| {
            let snapshot = load_snapshot(tx)?;
            if snapshot.position_of(id).is_none() {
                return Err(RepoError::NotFound(id));
            }
            let plan = snapshot.reorder(id, new_position)?;

            if !plan.is_noop() {
                let now = now_epoch_ms();
                let subject = PositionMove {
                    id,
                    from: plan.from,
                    to: PARKING_POSITION,
                };
                move_task(tx, &subject, now)?;
                apply_moves(tx, plan.shifts.moves(), now)?;
                move_task(
                    tx,
                    &PositionMove {
                        id,
                        from: PARKING_POSITION,
                        to: plan.to,
                    },
                    now,
                )?;
            }

            debug!(
                "event=task_reorder module=task_repo status=planned from={} to={} shifted={}",
                plan.from,
                plan.to,
                plan.shifts.len()
            );
            list_ordered(tx)
        })
    }

    fn position_snapshot(&self) -> RepoResult<PositionSnapshot> {
        self.run("task_snapshot", TransactionBehavior::Deferred, |tx| {
            load_snapshot(tx)
        })
    }
}

fn load_snapshot(conn: &Connection) -> RepoResult<PositionSnapshot> {
    let mut stmt = conn.prepare(
        "SELECT id, position
         FROM tasks
         ORDER BY position ASC;",
    )?;
    let mut rows = stmt.query([])?;
    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        let id_text: String = row.get(0)?;
        entries.push((parse_uuid(&id_text)?, row.get::<_, i64>(1)?));
    }
    Ok(PositionSnapshot::from_rows(entries)?)
}

fn apply_moves(conn: &Connection, moves: &[PositionMove], now: i64) -> RepoResult<()> {
    for step in moves {
        move_task(conn, step, now)?;
    }
    Ok(())
}

fn move_task(conn: &Connection, step: &PositionMove, now: i64) -> RepoResult<()> {
    let changed = conn.execute(
        "UPDATE tasks
         SET position = ?3,
             updated_at = ?4
         WHERE id = ?1
           AND position = ?2;",
        params![step.id.to_string(), step.from, step.to, now],
    )?;
    if changed != 1 {
        return Err(RepoError::InvalidData(format!(
            "task {} was not at position {} when moving to {}",
            step.id, step.from, step.to
        )));
    }
    Ok(())
}

fn insert_task(conn: &Connection, task: &Task) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO tasks (
            id,
            title,
            note,
            completed,
            position,
            tag,
            created_at,
            updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
        params![
            task.id.to_string(),
            task.title.as_str(),
            task.note.as_deref(),
            bool_to_int(task.completed),
            task.position,
            task.tag.as_str(),
            task.created_at,
            task.updated_at,
        ],
    )?;
    Ok(())
}

fn load_task(conn: &Connection, id: TaskId) -> RepoResult<Option<Task>> {
    let task = conn
        .query_row(
            &format!("{TASK_SELECT_SQL} WHERE id = ?1;"),
            [id.to_string()],
            |row| Ok(parse_task_row(row)),
        )
        .optional()?;
    task.transpose()
}

fn load_required_task(conn: &Connection, id: TaskId) -> RepoResult<Task> {
    load_task(conn, id)?.ok_or(RepoError::NotFound(id))
}

fn list_ordered(conn: &Connection) -> RepoResult<Vec<Task>> {
    let mut stmt = conn.prepare(&format!("{TASK_SELECT_SQL} ORDER BY position ASC;"))?;
    let mut rows = stmt.query([])?;
    let mut tasks = Vec::new();
    while let Some(row) = rows.next()? {
        tasks.push(parse_task_row(row)?);
    }
    Ok(tasks)
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let id_text: String = row.get("id")?;
    let tag_text: String = row.get("tag")?;
    let tag = tag_text.parse::<TaskTag>().map_err(|_| {
        RepoError::InvalidData(format!("invalid tag `{tag_text}` in tasks.tag"))
    })?;

    let completed = match row.get::<_, i64>("completed")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid completed value `{other}` in tasks.completed"
            )));
        }
    };

    let position: i64 = row.get("position")?;
    if position < 0 {
        return Err(RepoError::InvalidData(format!(
            "negative position `{position}` in tasks.position"
        )));
    }

    Ok(Task {
        id: parse_uuid(&id_text)?,
        title: row.get("title")?,
        note: row.get("note")?,
        completed,
        position,
        tag,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_uuid(value: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in tasks.id")))
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

fn ensure_task_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let mut stmt = conn.prepare("PRAGMA table_info(tasks);")?;
    let mut rows = stmt.query([])?;
    let mut present = Vec::new();
    while let Some(row) = rows.next()? {
        present.push(row.get::<_, String>(1)?);
    }
    if present.is_empty() {
        return Err(RepoError::MissingRequiredTable("tasks"));
    }

    for column in TASK_COLUMNS {
        if !present.iter().any(|name| name == column) {
            return Err(RepoError::MissingRequiredColumn {
                table: "tasks",
                column,
            });
        }
    }

    Ok(())
}
