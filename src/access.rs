use std::fmt;
use tracing::warn;

use crate::engine::EngineError;
use crate::models::{Goal, Milestone, OwnerId, Task};

/// Records that belong to exactly one owner.
pub trait Owned {
    fn owner_id(&self) -> OwnerId;
}

impl Owned for Goal {
    fn owner_id(&self) -> OwnerId {
        self.owner_id
    }
}

impl Owned for Milestone {
    fn owner_id(&self) -> OwnerId {
        self.owner_id
    }
}

impl Owned for Task {
    fn owner_id(&self) -> OwnerId {
        self.owner_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Goal,
    Milestone,
    Task,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordKind::Goal => "goal",
            RecordKind::Milestone => "milestone",
            RecordKind::Task => "task",
        })
    }
}

/// Ownership check applied to every record lookup.
///
/// A missing record and a record owned by someone else produce the same
/// `NotFound`, so callers cannot probe for ids they do not own.
pub fn authorize<T: Owned>(
    record: Option<T>,
    owner: OwnerId,
    kind: RecordKind,
    id: i64,
) -> Result<T, EngineError> {
    match record {
        Some(record) if record.owner_id() == owner => Ok(record),
        Some(record) => {
            warn!(%kind, id, %owner, actual_owner = %record.owner_id(), "rejected access to foreign record");
            Err(EngineError::NotFound { kind, id })
        }
        None => {
            warn!(%kind, id, %owner, "record not found");
            Err(EngineError::NotFound { kind, id })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_gets_the_record() {
        let task = Task::new(OwnerId(1), 10, "Stretch".to_string());
        let found = authorize(Some(task.clone()), OwnerId(1), RecordKind::Task, 5).unwrap();
        assert_eq!(found, task);
    }

    #[test]
    fn foreign_and_missing_look_the_same() {
        let task = Task::new(OwnerId(1), 10, "Stretch".to_string());
        let foreign = authorize(Some(task), OwnerId(2), RecordKind::Task, 5).unwrap_err();
        let missing = authorize::<Task>(None, OwnerId(2), RecordKind::Task, 5).unwrap_err();
        assert_eq!(foreign.to_string(), missing.to_string());
        assert!(matches!(
            foreign,
            EngineError::NotFound {
                kind: RecordKind::Task,
                id: 5
            }
        ));
    }
}
