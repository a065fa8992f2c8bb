//! Task domain model.
//!
//! # Responsibility
//! - Define the persisted task record and its create/update inputs.
//! - Keep payload fields opaque to the ordering rules.
//!
//! # Invariants
//! - `id` and `created_at` never change once assigned.
//! - `position` is owned by the ordering engine; payload edits never touch it.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Stable task identifier.
pub type TaskId = Uuid;

/// First position of a non-empty list.
pub const POSITION_BASE: i64 = 0;

/// Display tag carried with a task. Ignored by ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskTag {
    #[default]
    Default,
    Red,
    Blue,
    Green,
    Yellow,
    Purple,
    Pink,
    Orange,
}

impl TaskTag {
    pub const ALL: [TaskTag; 8] = [
        TaskTag::Default,
        TaskTag::Red,
        TaskTag::Blue,
        TaskTag::Green,
        TaskTag::Yellow,
        TaskTag::Purple,
        TaskTag::Pink,
        TaskTag::Orange,
    ];

    /// Storage and wire label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Red => "red",
            Self::Blue => "blue",
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Purple => "purple",
            Self::Pink => "pink",
            Self::Orange => "orange",
        }
    }
}

impl Display for TaskTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a label is not part of the tag palette.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTag(pub String);

impl Display for UnknownTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let expected = TaskTag::ALL
            .iter()
            .map(|tag| tag.as_str())
            .collect::<Vec<_>>()
            .join("|");
        write!(f, "unknown tag `{}`; expected {expected}", self.0)
    }
}

impl Error for UnknownTag {}

impl FromStr for TaskTag {
    type Err = UnknownTag;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        TaskTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == normalized)
            .ok_or_else(|| UnknownTag(value.to_string()))
    }
}

/// Persisted task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub note: Option<String>,
    pub completed: bool,
    /// Rank in the list; dense from `POSITION_BASE`.
    pub position: i64,
    pub tag: TaskTag,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds; refreshed by payload edits and position shifts.
    pub updated_at: i64,
}

/// Input for creating a task. New tasks always start incomplete.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewTask {
    pub title: String,
    pub note: Option<String>,
    pub tag: TaskTag,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_tag(mut self, tag: TaskTag) -> Self {
        self.tag = tag;
        self
    }
}

/// Partial payload update. `None` leaves a field unchanged.
///
/// `note: Some(None)` clears the note.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub note: Option<Option<String>>,
    pub tag: Option<TaskTag>,
    pub completed: Option<bool>,
}
