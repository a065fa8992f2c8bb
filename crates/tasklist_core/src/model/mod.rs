//! Domain model for the ordered task list.
//!
//! # Invariants
//! - Every task is identified by a stable `TaskId`.
//! - `position` values of all tasks form a dense range starting at
//!   [`task::POSITION_BASE`].

pub mod task;
