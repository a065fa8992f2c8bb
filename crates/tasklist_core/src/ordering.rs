//! Position ordering engine.
//!
//! # Responsibility
//! - Decide which task positions change, and to what, for create, delete and
//!   reorder.
//! - Hold the list order as an invariant-checked value so the rules can be
//!   exercised without a store.
//!
//! # Invariants
//! - A [`PositionSnapshot`] is always dense and unique: positions are exactly
//!   `POSITION_BASE..POSITION_BASE + len`.
//! - Plans move every affected task by exactly one slot; only the subject of
//!   a create or reorder lands on an arbitrary position.
//! - Moves inside a [`ShiftPlan`] are ordered so that applying them one by
//!   one never puts two tasks on the same position, provided the subject
//!   task has been removed or parked first.
//!
//! The engine performs no I/O.

use crate::model::task::{TaskId, POSITION_BASE};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors raised when a requested mutation does not fit the current order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderingError {
    /// Requested position lies outside `[min, max]`.
    PositionOutOfRange { requested: i64, min: i64, max: i64 },
    /// Task id is not part of the snapshot.
    UnknownTask(TaskId),
    /// Input positions are not dense and unique.
    Inconsistent(String),
}

impl Display for OrderingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PositionOutOfRange {
                requested,
                min,
                max,
            } => write!(f, "position {requested} is outside [{min}, {max}]"),
            Self::UnknownTask(id) => write!(f, "task not in ordering snapshot: {id}"),
            Self::Inconsistent(message) => write!(f, "inconsistent task positions: {message}"),
        }
    }
}

impl Error for OrderingError {}

/// One task moving from one position to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionMove {
    pub id: TaskId,
    pub from: i64,
    pub to: i64,
}

/// Ordered list of one-slot moves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShiftPlan {
    moves: Vec<PositionMove>,
}

impl ShiftPlan {
    pub fn moves(&self) -> &[PositionMove] {
        &self.moves
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    fn shifted<'a>(ids: impl Iterator<Item = (i64, &'a TaskId)>, delta: i64) -> Self {
        Self {
            moves: ids
                .map(|(from, id)| PositionMove {
                    id: *id,
                    from,
                    to: from + delta,
                })
                .collect(),
        }
    }
}

/// Outcome of [`PositionSnapshot::assign_on_create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePlan {
    /// Position the new task takes.
    pub target: i64,
    /// Existing tasks pushed up to make room, highest position first.
    pub shifts: ShiftPlan,
}

/// Outcome of [`PositionSnapshot::reorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderPlan {
    pub id: TaskId,
    pub from: i64,
    pub to: i64,
    /// Neighbors rotated by one slot to close the gap at `from`.
    pub shifts: ShiftPlan,
}

impl ReorderPlan {
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// Dense, unique list order. Index `i` holds the task at `POSITION_BASE + i`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionSnapshot {
    order: Vec<TaskId>,
}

impl PositionSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a snapshot from `(id, position)` rows in any order.
    ///
    /// # Errors
    /// - `Inconsistent` when positions have gaps, duplicates, or do not start
    ///   at `POSITION_BASE`, or when an id appears twice.
    pub fn from_rows(rows: impl IntoIterator<Item = (TaskId, i64)>) -> Result<Self, OrderingError> {
        let mut rows: Vec<(TaskId, i64)> = rows.into_iter().collect();
        rows.sort_by_key(|(_, position)| *position);
        check_dense(rows.iter().map(|(_, position)| *position))?;
        Self::from_ordered_ids(rows.into_iter().map(|(id, _)| id).collect())
    }

    /// Builds a snapshot from ids already in display order.
    pub fn from_ordered_ids(order: Vec<TaskId>) -> Result<Self, OrderingError> {
        let mut seen = HashSet::with_capacity(order.len());
        if let Some(duplicate) = order.iter().find(|id| !seen.insert(**id)) {
            return Err(OrderingError::Inconsistent(format!(
                "task {duplicate} holds more than one position"
            )));
        }
        Ok(Self { order })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in ascending position order.
    pub fn ids(&self) -> &[TaskId] {
        &self.order
    }

    /// `(id, position)` pairs in ascending position order.
    pub fn entries(&self) -> impl Iterator<Item = (TaskId, i64)> + '_ {
        self.indexed(0).map(|(position, id)| (*id, position))
    }

    pub fn position_of(&self, id: TaskId) -> Option<i64> {
        self.order
            .iter()
            .position(|candidate| *candidate == id)
            .map(to_position)
    }

    /// Picks the position for a new task and the pushes needed to free it.
    ///
    /// Without a request the task is appended after the current maximum.
    /// With a request `p`, every task at `>= p` moves up one slot.
    ///
    /// # Errors
    /// - `PositionOutOfRange` when `p` is outside `[base, base + len]`.
    pub fn assign_on_create(&self, requested: Option<i64>) -> Result<CreatePlan, OrderingError> {
        let append_at = append_position(self.last_position());
        let Some(target) = requested else {
            return Ok(CreatePlan {
                target: append_at,
                shifts: ShiftPlan::default(),
            });
        };

        let index = self.checked_index(target, append_at)?;
        Ok(CreatePlan {
            target,
            shifts: ShiftPlan::shifted(self.indexed(index).rev(), 1),
        })
    }

    /// Moves every task above `deleted_position` down one slot.
    ///
    /// The snapshot still contains the deleted task; it is not part of the
    /// plan.
    ///
    /// # Errors
    /// - `PositionOutOfRange` when nothing occupies `deleted_position`.
    pub fn compact_on_delete(&self, deleted_position: i64) -> Result<ShiftPlan, OrderingError> {
        let index = self.checked_index(deleted_position, self.last_position_or_empty())?;
        Ok(ShiftPlan::shifted(self.indexed(index + 1), -1))
    }

    /// Rotates the interval between the task's position and `new_position` by
    /// one slot.
    ///
    /// Forward moves pull `(old, new]` down; backward moves push `[new, old)`
    /// up. Equal positions yield an empty plan.
    ///
    /// # Errors
    /// - `UnknownTask` when `id` is not in the snapshot.
    /// - `PositionOutOfRange` when `new_position` is outside
    ///   `[base, base + len - 1]`.
    pub fn reorder(&self, id: TaskId, new_position: i64) -> Result<ReorderPlan, OrderingError> {
        let from = self
            .position_of(id)
            .ok_or(OrderingError::UnknownTask(id))?;
        let to_index = self.checked_index(new_position, self.last_position_or_empty())?;
        let from_index = self
            .index_of(from)
            .ok_or(OrderingError::UnknownTask(id))?;

        let shifts = if from_index < to_index {
            ShiftPlan::shifted(
                self.indexed(from_index + 1).take(to_index - from_index),
                -1,
            )
        } else if from_index > to_index {
            ShiftPlan::shifted(
                self.indexed(to_index).take(from_index - to_index).rev(),
                1,
            )
        } else {
            ShiftPlan::default()
        };

        Ok(ReorderPlan {
            id,
            from,
            to: new_position,
            shifts,
        })
    }

    /// Returns the order after inserting `id` according to `plan`.
    pub fn after_create(&self, id: TaskId, plan: &CreatePlan) -> Result<Self, OrderingError> {
        let mut rows = self.rows_after(plan.shifts.moves());
        rows.push((id, plan.target));
        Self::from_rows(rows)
    }

    /// Returns the order after removing `id` and compacting with `plan`.
    pub fn after_delete(&self, id: TaskId, plan: &ShiftPlan) -> Result<Self, OrderingError> {
        let mut rows = self.rows_after(plan.moves());
        rows.retain(|(candidate, _)| *candidate != id);
        Self::from_rows(rows)
    }

    /// Returns the order after applying a reorder plan.
    pub fn after_reorder(&self, plan: &ReorderPlan) -> Result<Self, OrderingError> {
        let mut rows = self.rows_after(plan.shifts.moves());
        for row in rows.iter_mut().filter(|(candidate, _)| *candidate == plan.id) {
            row.1 = plan.to;
        }
        Self::from_rows(rows)
    }

    fn rows_after(&self, moves: &[PositionMove]) -> Vec<(TaskId, i64)> {
        let mut rows: Vec<(TaskId, i64)> = self.entries().collect();
        for step in moves {
            if let Some(row) = rows.iter_mut().find(|(id, _)| *id == step.id) {
                row.1 = step.to;
            }
        }
        rows
    }

    fn indexed(
        &self,
        start: usize,
    ) -> impl DoubleEndedIterator<Item = (i64, &TaskId)> + ExactSizeIterator + '_ {
        self.order
            .iter()
            .enumerate()
            .skip(start)
            .map(|(index, id)| (to_position(index), id))
    }

    fn last_position(&self) -> Option<i64> {
        self.order.len().checked_sub(1).map(to_position)
    }

    fn last_position_or_empty(&self) -> i64 {
        POSITION_BASE + self.order.len() as i64 - 1
    }

    fn index_of(&self, position: i64) -> Option<usize> {
        usize::try_from(position - POSITION_BASE)
            .ok()
            .filter(|index| *index < self.order.len())
    }

    fn checked_index(&self, position: i64, max: i64) -> Result<usize, OrderingError> {
        if position < POSITION_BASE || position > max {
            return Err(OrderingError::PositionOutOfRange {
                requested: position,
                min: POSITION_BASE,
                max,
            });
        }
        Ok((position - POSITION_BASE) as usize)
    }
}

/// Position for a task appended after `current_max`, or the base when the
/// list is empty.
pub fn append_position(current_max: Option<i64>) -> i64 {
    current_max.map_or(POSITION_BASE, |max| max + 1)
}

/// Checks that `positions` are exactly `POSITION_BASE..POSITION_BASE + n`.
pub fn check_dense(positions: impl IntoIterator<Item = i64>) -> Result<(), OrderingError> {
    let mut sorted: Vec<i64> = positions.into_iter().collect();
    sorted.sort_unstable();
    for (index, position) in sorted.iter().enumerate() {
        let expected = to_position(index);
        if *position == expected {
            continue;
        }
        let message = if index > 0 && sorted[index - 1] == *position {
            format!("position {position} is shared")
        } else {
            format!("expected position {expected}, found {position}")
        };
        return Err(OrderingError::Inconsistent(message));
    }
    Ok(())
}

fn to_position(index: usize) -> i64 {
    POSITION_BASE + index as i64
}

#[cfg(test)]
mod tests {
    use super::{
        append_position, check_dense, OrderingError, PositionMove, PositionSnapshot, ShiftPlan,
    };
    use crate::model::task::TaskId;
    use uuid::Uuid;

    fn ids(count: usize) -> Vec<TaskId> {
        (0..count).map(|_| Uuid::new_v4()).collect()
    }

    fn snapshot(order: &[TaskId]) -> PositionSnapshot {
        PositionSnapshot::from_ordered_ids(order.to_vec()).unwrap()
    }

    fn moved(plan: &ShiftPlan) -> Vec<(TaskId, i64, i64)> {
        plan.moves()
            .iter()
            .map(|PositionMove { id, from, to }| (*id, *from, *to))
            .collect()
    }

    #[test]
    fn append_starts_at_base_and_follows_max() {
        assert_eq!(append_position(None), 0);
        assert_eq!(append_position(Some(4)), 5);

        let empty = PositionSnapshot::empty();
        let plan = empty.assign_on_create(None).unwrap();
        assert_eq!(plan.target, 0);
        assert!(plan.shifts.is_empty());
    }

    #[test]
    fn create_appends_in_creation_order() {
        let mut order = PositionSnapshot::empty();
        let created = ids(3);
        for id in &created {
            let plan = order.assign_on_create(None).unwrap();
            order = order.after_create(*id, &plan).unwrap();
        }
        let positions: Vec<_> = order.entries().collect();
        assert_eq!(
            positions,
            vec![(created[0], 0), (created[1], 1), (created[2], 2)]
        );
    }

    #[test]
    fn create_at_position_shifts_tail_from_the_top() {
        let old = ids(3);
        let fresh = Uuid::new_v4();
        let order = snapshot(&old);

        let plan = order.assign_on_create(Some(1)).unwrap();
        assert_eq!(plan.target, 1);
        assert_eq!(moved(&plan.shifts), vec![(old[2], 2, 3), (old[1], 1, 2)]);

        let after = order.after_create(fresh, &plan).unwrap();
        assert_eq!(after.ids(), &[old[0], fresh, old[1], old[2]]);
    }

    #[test]
    fn create_at_append_slot_shifts_nothing() {
        let order = snapshot(&ids(2));
        let plan = order.assign_on_create(Some(2)).unwrap();
        assert_eq!(plan.target, 2);
        assert!(plan.shifts.is_empty());
    }

    #[test]
    fn create_rejects_position_past_append_slot() {
        let order = snapshot(&ids(2));
        let err = order.assign_on_create(Some(3)).unwrap_err();
        assert_eq!(
            err,
            OrderingError::PositionOutOfRange {
                requested: 3,
                min: 0,
                max: 2
            }
        );
        assert!(order.assign_on_create(Some(-1)).is_err());
    }

    #[test]
    fn delete_compacts_only_positions_above() {
        let tasks = ids(4);
        let order = snapshot(&tasks);

        let plan = order.compact_on_delete(1).unwrap();
        assert_eq!(moved(&plan), vec![(tasks[2], 2, 1), (tasks[3], 3, 2)]);

        let after = order.after_delete(tasks[1], &plan).unwrap();
        assert_eq!(after.ids(), &[tasks[0], tasks[2], tasks[3]]);
    }

    #[test]
    fn delete_of_last_position_moves_nothing() {
        let order = snapshot(&ids(3));
        assert!(order.compact_on_delete(2).unwrap().is_empty());
        assert!(order.compact_on_delete(3).is_err());
        assert!(PositionSnapshot::empty().compact_on_delete(0).is_err());
    }

    #[test]
    fn reorder_forward_pulls_interval_down() {
        let [a, b, c, d]: [TaskId; 4] = ids(4).try_into().unwrap();
        let order = snapshot(&[a, b, c, d]);

        let plan = order.reorder(a, 2).unwrap();
        assert_eq!((plan.from, plan.to), (0, 2));
        assert_eq!(moved(&plan.shifts), vec![(b, 1, 0), (c, 2, 1)]);
        assert_eq!(order.after_reorder(&plan).unwrap().ids(), &[b, c, a, d]);
    }

    #[test]
    fn reorder_backward_pushes_interval_up() {
        let [a, b, c, d]: [TaskId; 4] = ids(4).try_into().unwrap();
        let order = snapshot(&[a, b, c, d]);

        let plan = order.reorder(d, 1).unwrap();
        assert_eq!((plan.from, plan.to), (3, 1));
        assert_eq!(moved(&plan.shifts), vec![(c, 2, 3), (b, 1, 2)]);
        assert_eq!(order.after_reorder(&plan).unwrap().ids(), &[a, d, b, c]);
    }

    #[test]
    fn reorder_to_same_position_is_noop() {
        let tasks = ids(3);
        let order = snapshot(&tasks);
        let plan = order.reorder(tasks[1], 1).unwrap();
        assert!(plan.is_noop());
        assert!(plan.shifts.is_empty());
        assert_eq!(order.after_reorder(&plan).unwrap(), order);
    }

    #[test]
    fn reorder_rejects_out_of_range_and_unknown_ids() {
        let tasks = ids(3);
        let order = snapshot(&tasks);

        assert_eq!(
            order.reorder(tasks[0], 3).unwrap_err(),
            OrderingError::PositionOutOfRange {
                requested: 3,
                min: 0,
                max: 2
            }
        );
        assert!(order.reorder(tasks[0], -1).is_err());

        let stranger = Uuid::new_v4();
        assert_eq!(
            order.reorder(stranger, 0).unwrap_err(),
            OrderingError::UnknownTask(stranger)
        );
    }

    #[test]
    fn reorder_moves_only_the_distance_travelled() {
        let tasks = ids(50);
        let order = snapshot(&tasks);
        let plan = order.reorder(tasks[20], 23).unwrap();
        assert_eq!(plan.shifts.len(), 3);
        assert!(plan
            .shifts
            .moves()
            .iter()
            .all(|step| (step.from - step.to).abs() == 1));
    }

    #[test]
    fn shift_plans_never_collide_when_applied_in_order() {
        let tasks = ids(6);
        let order = snapshot(&tasks);

        let plans = [
            order.assign_on_create(Some(0)).unwrap().shifts,
            order.compact_on_delete(0).unwrap(),
            order.reorder(tasks[0], 5).unwrap().shifts,
            order.reorder(tasks[5], 0).unwrap().shifts,
        ];
        for plan in plans {
            let mut occupied: Vec<i64> = order.entries().map(|(_, position)| position).collect();
            // The subject slot is vacated before shifts run.
            if let Some(first) = plan.moves().first() {
                let vacated = first.to;
                occupied.retain(|position| *position != vacated);
            }
            for step in plan.moves() {
                assert!(!occupied.contains(&step.to), "collision at {}", step.to);
                occupied.retain(|position| *position != step.from);
                occupied.push(step.to);
            }
        }
    }

    #[test]
    fn from_rows_rejects_gaps_duplicates_and_offset_base() {
        let [a, b, c]: [TaskId; 3] = ids(3).try_into().unwrap();
        assert!(PositionSnapshot::from_rows([(b, 1), (a, 0), (c, 2)]).is_ok());

        let gap = PositionSnapshot::from_rows([(a, 0), (b, 2)]).unwrap_err();
        assert!(matches!(gap, OrderingError::Inconsistent(message) if message.contains("expected position 1")));

        let shared = PositionSnapshot::from_rows([(a, 0), (b, 0)]).unwrap_err();
        assert!(matches!(shared, OrderingError::Inconsistent(message) if message.contains("shared")));

        assert!(PositionSnapshot::from_rows([(a, 1), (b, 2)]).is_err());
        assert!(PositionSnapshot::from_ordered_ids(vec![a, a]).is_err());
        assert!(check_dense(Vec::new()).is_ok());
    }

    #[test]
    fn mixed_operations_keep_positions_dense() {
        // Reference model: a plain Vec where index == position.
        let mut model: Vec<TaskId> = Vec::new();
        let mut order = PositionSnapshot::empty();
        let mut seed: u64 = 0x5eed;
        let mut next = |bound: usize| {
            seed = seed
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            ((seed >> 33) as usize) % bound.max(1)
        };

        for _ in 0..400 {
            match next(4) {
                0 | 1 => {
                    let id = Uuid::new_v4();
                    let requested = if next(2) == 0 {
                        None
                    } else {
                        Some(next(model.len() + 1) as i64)
                    };
                    let plan = order.assign_on_create(requested).unwrap();
                    model.insert(plan.target as usize, id);
                    order = order.after_create(id, &plan).unwrap();
                }
                2 if !model.is_empty() => {
                    let index = next(model.len());
                    let id = model.remove(index);
                    let plan = order.compact_on_delete(index as i64).unwrap();
                    order = order.after_delete(id, &plan).unwrap();
                }
                _ if !model.is_empty() => {
                    let id = model[next(model.len())];
                    let target = next(model.len());
                    let plan = order.reorder(id, target as i64).unwrap();
                    let current = model.iter().position(|candidate| *candidate == id).unwrap();
                    let subject = model.remove(current);
                    model.insert(target, subject);
                    order = order.after_reorder(&plan).unwrap();
                }
                _ => {}
            }

            assert_eq!(order.ids(), model.as_slice());
            check_dense(order.entries().map(|(_, position)| position)).unwrap();
        }
    }
}
