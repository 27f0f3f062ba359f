use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::utils::now_timestamp;

/// Identifier of the user every record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub i64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalCategory {
    #[default]
    Personal,
    Health,
    Career,
    Finance,
    Learning,
    Relationships,
    Other,
}

#[derive(Debug, Error)]
#[error("unknown goal category: {0}")]
pub struct UnknownCategory(pub String);

impl GoalCategory {
    pub const ALL: [GoalCategory; 7] = [
        GoalCategory::Personal,
        GoalCategory::Health,
        GoalCategory::Career,
        GoalCategory::Finance,
        GoalCategory::Learning,
        GoalCategory::Relationships,
        GoalCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GoalCategory::Personal => "personal",
            GoalCategory::Health => "health",
            GoalCategory::Career => "career",
            GoalCategory::Finance => "finance",
            GoalCategory::Learning => "learning",
            GoalCategory::Relationships => "relationships",
            GoalCategory::Other => "other",
        }
    }
}

impl fmt::Display for GoalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GoalCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        GoalCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: Option<i64>,
    pub owner_id: OwnerId,
    pub title: String,
    pub description: Option<String>,
    pub category: GoalCategory,
    pub target_date: Option<String>, // ISO 8601: YYYY-MM-DD
    pub progress: u8,                // 0..=100, derived from milestones
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: Option<i64>,
    pub owner_id: OwnerId,
    pub goal_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub completed: bool, // derived from tasks
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Option<i64>,
    pub owner_id: OwnerId,
    pub milestone_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub completed: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Goal {
    pub fn new(owner_id: OwnerId, title: String) -> Self {
        let now = now_timestamp();
        Self {
            id: None,
            owner_id,
            title,
            description: None,
            category: GoalCategory::default(),
            target_date: None,
            progress: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

impl Milestone {
    pub fn new(owner_id: OwnerId, goal_id: i64, title: String) -> Self {
        let now = now_timestamp();
        Self {
            id: None,
            owner_id,
            goal_id,
            title,
            description: None,
            due_date: None,
            completed: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

impl Task {
    pub fn new(owner_id: OwnerId, milestone_id: i64, title: String) -> Self {
        let now = now_timestamp();
        Self {
            id: None,
            owner_id,
            milestone_id,
            title,
            description: None,
            due_date: None,
            completed: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// A milestone together with its tasks, in creation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneWithTasks {
    #[serde(flatten)]
    pub milestone: Milestone,
    pub tasks: Vec<Task>,
}

/// A goal with its full milestone/task tree as stored after a mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalSnapshot {
    #[serde(flatten)]
    pub goal: Goal,
    pub milestones: Vec<MilestoneWithTasks>,
}

impl GoalSnapshot {
    pub fn milestone(&self, id: i64) -> Option<&MilestoneWithTasks> {
        self.milestones.iter().find(|m| m.milestone.id == Some(id))
    }

    pub fn completed_milestones(&self) -> usize {
        self.milestones.iter().filter(|m| m.milestone.completed).count()
    }
}

/// Result of toggling a task: the task itself plus the refreshed goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleOutcome {
    pub task: Task,
    pub goal: GoalSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalSummary {
    #[serde(flatten)]
    pub goal: Goal,
    pub milestone_count: usize,
    pub completed_milestones: usize,
}

#[derive(Debug, Clone, Default)]
pub struct NewGoal {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<GoalCategory>,
    pub target_date: Option<String>,
}

/// Input for milestones and tasks; both carry the same editable fields.
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
}

impl NewItem {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

impl NewGoal {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Field edits for a goal. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct GoalPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<GoalCategory>,
    pub target_date: Option<String>,
}

/// Field edits for a milestone or task. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<String>,
}

/// A stored derived value that disagrees with what its children imply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Inconsistency {
    Milestone { id: i64, stored: bool, derived: bool },
    Goal { id: i64, stored: u8, derived: u8 },
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inconsistency::Milestone { id, stored, derived } => write!(
                f,
                "milestone {}: completed is {} but its tasks imply {}",
                id, stored, derived
            ),
            Inconsistency::Goal { id, stored, derived } => write!(
                f,
                "goal {}: progress is {}% but its milestones imply {}%",
                id, stored, derived
            ),
        }
    }
}
