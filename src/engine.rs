//! Goal progress engine.
//!
//! Keeps `Milestone::completed` and `Goal::progress` consistent with the
//! completion state of the tasks underneath them. Every operation takes the
//! caller's [`OwnerId`] explicitly and runs as one IMMEDIATE transaction:
//! the ownership check, the task write and the milestone/goal re-derivation
//! either all land or none do.

use thiserror::Error;
use tracing::{debug, info};

use crate::access::{RecordKind, authorize};
use crate::database::{Database, DatabaseError, Records};
use crate::models::{
    Goal, GoalPatch, GoalSnapshot, GoalSummary, Inconsistency, ItemPatch, Milestone,
    MilestoneWithTasks, NewGoal, NewItem, OwnerId, Task, ToggleOutcome,
};
use crate::progress;
use crate::utils::{now_timestamp, parse_date};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: i64 },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

pub struct Engine {
    db: Database,
}

impl Engine {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // ---- progress cascade ----

    /// Flip a task's completion and cascade the change to its milestone and
    /// goal.
    pub fn toggle_task_completion(
        &self,
        owner: OwnerId,
        task_id: i64,
    ) -> Result<ToggleOutcome, EngineError> {
        self.db.write(|records| {
            let task = authorize(records.task(task_id)?, owner, RecordKind::Task, task_id)?;
            let milestone = load_milestone(records, owner, task.milestone_id)?;
            let now = now_timestamp();

            records.set_task_completed(task_id, !task.completed, &now)?;
            if rederive_milestone(records, &milestone, &now)? {
                rederive_goal(records, milestone.goal_id, &now)?;
            }

            let task = authorize(records.task(task_id)?, owner, RecordKind::Task, task_id)?;
            let goal = snapshot(records, owner, milestone.goal_id)?;
            info!(
                task_id,
                completed = task.completed,
                goal_id = milestone.goal_id,
                progress = goal.goal.progress,
                "task toggled"
            );
            Ok(ToggleOutcome { task, goal })
        })
    }

    /// Create a task under a milestone. A completed milestone that gains an
    /// open task is no longer completed.
    pub fn create_task(
        &self,
        owner: OwnerId,
        milestone_id: i64,
        input: NewItem,
    ) -> Result<(Task, GoalSnapshot), EngineError> {
        let title = required_title(&input.title)?;
        let due_date = checked_date(input.due_date)?;

        self.db.write(|records| {
            let milestone = load_milestone(records, owner, milestone_id)?;
            let now = now_timestamp();

            let mut task = Task::new(owner, milestone_id, title);
            task.description = input.description;
            task.due_date = due_date;
            let id = records.insert_task(&task)?;
            task.id = Some(id);

            if rederive_milestone(records, &milestone, &now)? {
                rederive_goal(records, milestone.goal_id, &now)?;
            }

            info!(task_id = id, milestone_id, "task created");
            Ok((task, snapshot(records, owner, milestone.goal_id)?))
        })
    }

    /// Delete a task and re-derive its milestone against the tasks left.
    pub fn delete_task(&self, owner: OwnerId, task_id: i64) -> Result<GoalSnapshot, EngineError> {
        self.db.write(|records| {
            let task = authorize(records.task(task_id)?, owner, RecordKind::Task, task_id)?;
            let milestone = load_milestone(records, owner, task.milestone_id)?;
            let now = now_timestamp();

            records.delete_task(task_id)?;
            if rederive_milestone(records, &milestone, &now)? {
                rederive_goal(records, milestone.goal_id, &now)?;
            }

            info!(task_id, milestone_id = task.milestone_id, "task deleted");
            snapshot(records, owner, milestone.goal_id)
        })
    }

    /// Delete a milestone with its tasks and recompute the goal over the
    /// milestones that remain.
    pub fn delete_milestone(
        &self,
        owner: OwnerId,
        milestone_id: i64,
    ) -> Result<GoalSnapshot, EngineError> {
        self.db.write(|records| {
            let milestone = load_milestone(records, owner, milestone_id)?;
            let now = now_timestamp();

            records.delete_milestone(milestone_id)?;
            rederive_goal(records, milestone.goal_id, &now)?;

            info!(milestone_id, goal_id = milestone.goal_id, "milestone deleted");
            snapshot(records, owner, milestone.goal_id)
        })
    }

    /// Delete a goal together with its milestones and tasks.
    pub fn delete_goal(&self, owner: OwnerId, goal_id: i64) -> Result<(), EngineError> {
        self.db.write(|records| {
            authorize(records.goal(goal_id)?, owner, RecordKind::Goal, goal_id)?;
            records.delete_goal(goal_id)?;
            info!(goal_id, "goal deleted");
            Ok(())
        })
    }

    // ---- creation and edits ----

    pub fn create_goal(&self, owner: OwnerId, input: NewGoal) -> Result<Goal, EngineError> {
        let title = required_title(&input.title)?;
        let target_date = checked_date(input.target_date)?;

        self.db.write(|records| {
            let mut goal = Goal::new(owner, title);
            goal.description = input.description;
            goal.category = input.category.unwrap_or_default();
            goal.target_date = target_date;
            let id = records.insert_goal(&goal)?;
            goal.id = Some(id);
            info!(goal_id = id, %owner, "goal created");
            Ok(goal)
        })
    }

    /// Create a milestone under a goal. The new milestone starts incomplete,
    /// so the goal's percentage is recomputed.
    pub fn create_milestone(
        &self,
        owner: OwnerId,
        goal_id: i64,
        input: NewItem,
    ) -> Result<(Milestone, GoalSnapshot), EngineError> {
        let title = required_title(&input.title)?;
        let due_date = checked_date(input.due_date)?;

        self.db.write(|records| {
            authorize(records.goal(goal_id)?, owner, RecordKind::Goal, goal_id)?;
            let now = now_timestamp();

            let mut milestone = Milestone::new(owner, goal_id, title);
            milestone.description = input.description;
            milestone.due_date = due_date;
            let id = records.insert_milestone(&milestone)?;
            milestone.id = Some(id);

            rederive_goal(records, goal_id, &now)?;

            info!(milestone_id = id, goal_id, "milestone created");
            Ok((milestone, snapshot(records, owner, goal_id)?))
        })
    }

    pub fn update_goal(
        &self,
        owner: OwnerId,
        goal_id: i64,
        patch: GoalPatch,
    ) -> Result<Goal, EngineError> {
        let title = patch.title.as_deref().map(required_title).transpose()?;
        let target_date = checked_date(patch.target_date)?;

        self.db.write(|records| {
            let mut goal = authorize(records.goal(goal_id)?, owner, RecordKind::Goal, goal_id)?;
            if let Some(title) = title {
                goal.title = title;
            }
            if let Some(description) = patch.description {
                goal.description = Some(description);
            }
            if let Some(category) = patch.category {
                goal.category = category;
            }
            if target_date.is_some() {
                goal.target_date = target_date;
            }
            goal.updated_at = now_timestamp();
            records.update_goal(&goal)?;
            debug!(goal_id, "goal updated");
            Ok(goal)
        })
    }

    pub fn update_milestone(
        &self,
        owner: OwnerId,
        milestone_id: i64,
        patch: ItemPatch,
    ) -> Result<Milestone, EngineError> {
        let title = patch.title.as_deref().map(required_title).transpose()?;
        let due_date = checked_date(patch.due_date)?;

        self.db.write(|records| {
            let mut milestone = load_milestone(records, owner, milestone_id)?;
            if let Some(title) = title {
                milestone.title = title;
            }
            if let Some(description) = patch.description {
                milestone.description = Some(description);
            }
            if due_date.is_some() {
                milestone.due_date = due_date;
            }
            milestone.updated_at = now_timestamp();
            records.update_milestone(&milestone)?;
            debug!(milestone_id, "milestone updated");
            Ok(milestone)
        })
    }

    pub fn update_task(
        &self,
        owner: OwnerId,
        task_id: i64,
        patch: ItemPatch,
    ) -> Result<Task, EngineError> {
        let title = patch.title.as_deref().map(required_title).transpose()?;
        let due_date = checked_date(patch.due_date)?;

        self.db.write(|records| {
            let mut task = authorize(records.task(task_id)?, owner, RecordKind::Task, task_id)?;
            if let Some(title) = title {
                task.title = title;
            }
            if let Some(description) = patch.description {
                task.description = Some(description);
            }
            if due_date.is_some() {
                task.due_date = due_date;
            }
            task.updated_at = now_timestamp();
            records.update_task(&task)?;
            debug!(task_id, "task updated");
            Ok(task)
        })
    }

    // ---- reads ----

    pub fn get_goal(&self, owner: OwnerId, goal_id: i64) -> Result<GoalSnapshot, EngineError> {
        self.db.read(|records| snapshot(records, owner, goal_id))
    }

    pub fn list_goals(&self, owner: OwnerId) -> Result<Vec<GoalSummary>, EngineError> {
        self.db.read(|records| {
            let mut summaries = Vec::new();
            for goal in records.goals_of(owner)? {
                let goal_id = goal.id.ok_or(DatabaseError::MissingId("goal"))?;
                let flags = records.milestone_completion(goal_id)?;
                summaries.push(GoalSummary {
                    goal,
                    milestone_count: flags.len(),
                    completed_milestones: flags.iter().filter(|c| **c).count(),
                });
            }
            Ok(summaries)
        })
    }

    /// Compare every stored derived value of the owner's goals with what the
    /// children imply. An empty result means the tree is consistent.
    pub fn verify(&self, owner: OwnerId) -> Result<Vec<Inconsistency>, EngineError> {
        self.db.read(|records| {
            let mut found = Vec::new();
            for goal in records.goals_of(owner)? {
                let goal_id = goal.id.ok_or(DatabaseError::MissingId("goal"))?;
                let mut milestone_flags = Vec::new();
                for milestone in records.milestones_of(goal_id)? {
                    let milestone_id = milestone.id.ok_or(DatabaseError::MissingId("milestone"))?;
                    let derived =
                        progress::milestone_completed(records.task_completion(milestone_id)?);
                    if derived != milestone.completed {
                        found.push(Inconsistency::Milestone {
                            id: milestone_id,
                            stored: milestone.completed,
                            derived,
                        });
                    }
                    milestone_flags.push(derived);
                }
                let derived = progress::progress_of(&milestone_flags);
                if derived != goal.progress {
                    found.push(Inconsistency::Goal {
                        id: goal_id,
                        stored: goal.progress,
                        derived,
                    });
                }
            }
            Ok(found)
        })
    }

    /// Re-derive every milestone and goal of the owner. Returns how many
    /// records were rewritten.
    pub fn repair(&self, owner: OwnerId) -> Result<usize, EngineError> {
        self.db.write(|records| {
            let now = now_timestamp();
            let mut rewritten = 0;
            for goal in records.goals_of(owner)? {
                let goal_id = goal.id.ok_or(DatabaseError::MissingId("goal"))?;
                for milestone in records.milestones_of(goal_id)? {
                    if rederive_milestone(records, &milestone, &now)? {
                        rewritten += 1;
                    }
                }
                if rederive_goal(records, goal_id, &now)? {
                    rewritten += 1;
                }
            }
            info!(%owner, rewritten, "repair finished");
            Ok(rewritten)
        })
    }
}

fn load_milestone(
    records: &Records<'_>,
    owner: OwnerId,
    milestone_id: i64,
) -> Result<Milestone, EngineError> {
    authorize(
        records.milestone(milestone_id)?,
        owner,
        RecordKind::Milestone,
        milestone_id,
    )
}

/// Re-read the milestone's tasks and store the completion they imply.
/// Returns true when the stored flag changed.
fn rederive_milestone(
    records: &Records<'_>,
    milestone: &Milestone,
    now: &str,
) -> Result<bool, DatabaseError> {
    let id = milestone.id.ok_or(DatabaseError::MissingId("milestone"))?;
    let derived = progress::milestone_completed(records.task_completion(id)?);
    if derived == milestone.completed {
        return Ok(false);
    }
    records.set_milestone_completed(id, derived, now)?;
    debug!(milestone_id = id, completed = derived, "milestone re-derived");
    Ok(true)
}

/// Re-read the goal's milestones and store the progress they imply.
/// Returns true when the stored value changed.
fn rederive_goal(records: &Records<'_>, goal_id: i64, now: &str) -> Result<bool, DatabaseError> {
    let Some(goal) = records.goal(goal_id)? else {
        return Ok(false);
    };
    let derived = progress::progress_of(&records.milestone_completion(goal_id)?);
    if derived == goal.progress {
        return Ok(false);
    }
    records.set_goal_progress(goal_id, derived, now)?;
    debug!(goal_id, from = goal.progress, to = derived, "goal progress re-derived");
    Ok(true)
}

fn snapshot(
    records: &Records<'_>,
    owner: OwnerId,
    goal_id: i64,
) -> Result<GoalSnapshot, EngineError> {
    let goal = authorize(records.goal(goal_id)?, owner, RecordKind::Goal, goal_id)?;
    let mut milestones = Vec::new();
    for milestone in records.milestones_of(goal_id)? {
        let milestone_id = milestone.id.ok_or(DatabaseError::MissingId("milestone"))?;
        let tasks = records.tasks_of(milestone_id)?;
        milestones.push(MilestoneWithTasks { milestone, tasks });
    }
    Ok(GoalSnapshot { goal, milestones })
}

fn required_title(title: &str) -> Result<String, EngineError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(EngineError::Validation("title is required".to_string()));
    }
    Ok(title.to_string())
}

fn checked_date(date: Option<String>) -> Result<Option<String>, EngineError> {
    match date {
        Some(date) => {
            let parsed = parse_date(date.trim()).map_err(|e| {
                EngineError::Validation(format!("invalid date '{}': {}", date, e))
            })?;
            // Store zero-padded so dates sort as text
            Ok(Some(parsed.format("%Y-%m-%d").to_string()))
        }
        None => Ok(None),
    }
}
