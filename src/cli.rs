use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fmt::Write as _;
use thiserror::Error;

use crate::engine::{Engine, EngineError};
use crate::models::{
    GoalCategory, GoalPatch, GoalSnapshot, GoalSummary, ItemPatch, NewGoal, NewItem, OwnerId,
};

#[derive(Parser)]
#[command(name = "goaltrack")]
#[command(about = "Goals, milestones and tasks with automatic progress tracking")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Use development mode (uses separate dev config/database)
    #[arg(long)]
    pub dev: bool,

    /// Act as this user instead of the configured owner
    #[arg(long)]
    pub owner: Option<i64>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new goal
    AddGoal {
        /// Goal title
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// personal, health, career, finance, learning, relationships or other
        #[arg(long)]
        category: Option<GoalCategory>,
        /// Target date (YYYY-MM-DD)
        #[arg(long)]
        target: Option<String>,
    },
    /// Add a milestone to a goal
    AddMilestone {
        goal_id: i64,
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,
    },
    /// Add a task to a milestone
    AddTask {
        milestone_id: i64,
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,
    },
    /// Mark a task done, or open again if it was done
    ToggleTask { task_id: i64 },
    /// Delete a task
    DeleteTask { task_id: i64 },
    /// Delete a milestone and its tasks
    DeleteMilestone { milestone_id: i64 },
    /// Delete a goal with all its milestones and tasks
    DeleteGoal { goal_id: i64 },
    /// Show a goal with its milestones and tasks
    Show { goal_id: i64 },
    /// List all goals
    List,
    /// Change a goal's title, description, category or target date
    EditGoal {
        goal_id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<GoalCategory>,
        #[arg(long)]
        target: Option<String>,
    },
    /// Change a milestone's title, description or due date
    EditMilestone {
        milestone_id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        due: Option<String>,
    },
    /// Change a task's title, description or due date
    EditTask {
        task_id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        due: Option<String>,
    },
    /// Report milestones and goals whose stored state disagrees with their children
    Check,
    /// Re-derive completion and progress for every goal
    Repair,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} inconsistencies found")]
    Inconsistent(usize),
}

/// Everything a command handler needs besides its arguments
pub struct Context<'a> {
    pub engine: &'a Engine,
    pub owner: OwnerId,
    pub default_category: GoalCategory,
    pub json: bool,
}

impl Context<'_> {
    fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce() -> String) -> Result<(), CliError> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            print!("{}", human());
        }
        Ok(())
    }
}

/// Dispatch a parsed command
pub fn run(command: Commands, ctx: &Context<'_>) -> Result<(), CliError> {
    match command {
        Commands::AddGoal {
            title,
            description,
            category,
            target,
        } => handle_add_goal(ctx, title, description, category, target),
        Commands::AddMilestone {
            goal_id,
            title,
            description,
            due,
        } => {
            let input = NewItem {
                title,
                description,
                due_date: due,
            };
            let (milestone, goal) = ctx.engine.create_milestone(ctx.owner, goal_id, input)?;
            ctx.emit(&goal, || {
                format!(
                    "Milestone created successfully (ID: {})\n{}",
                    milestone.id.unwrap_or_default(),
                    format_snapshot(&goal)
                )
            })
        }
        Commands::AddTask {
            milestone_id,
            title,
            description,
            due,
        } => {
            let input = NewItem {
                title,
                description,
                due_date: due,
            };
            let (task, goal) = ctx.engine.create_task(ctx.owner, milestone_id, input)?;
            ctx.emit(&goal, || {
                format!(
                    "Task created successfully (ID: {})\n{}",
                    task.id.unwrap_or_default(),
                    format_snapshot(&goal)
                )
            })
        }
        Commands::ToggleTask { task_id } => {
            let outcome = ctx.engine.toggle_task_completion(ctx.owner, task_id)?;
            ctx.emit(&outcome, || {
                let state = if outcome.task.completed { "done" } else { "open" };
                format!(
                    "Task {} marked as {}\n{}",
                    task_id,
                    state,
                    format_snapshot(&outcome.goal)
                )
            })
        }
        Commands::DeleteTask { task_id } => {
            let goal = ctx.engine.delete_task(ctx.owner, task_id)?;
            ctx.emit(&goal, || {
                format!("Task {} deleted\n{}", task_id, format_snapshot(&goal))
            })
        }
        Commands::DeleteMilestone { milestone_id } => {
            let goal = ctx.engine.delete_milestone(ctx.owner, milestone_id)?;
            ctx.emit(&goal, || {
                format!(
                    "Milestone {} deleted\n{}",
                    milestone_id,
                    format_snapshot(&goal)
                )
            })
        }
        Commands::DeleteGoal { goal_id } => {
            ctx.engine.delete_goal(ctx.owner, goal_id)?;
            ctx.emit(&serde_json::json!({ "deleted": goal_id }), || {
                format!("Goal {} deleted\n", goal_id)
            })
        }
        Commands::Show { goal_id } => {
            let goal = ctx.engine.get_goal(ctx.owner, goal_id)?;
            ctx.emit(&goal, || format_snapshot(&goal))
        }
        Commands::List => {
            let goals = ctx.engine.list_goals(ctx.owner)?;
            ctx.emit(&goals, || format_summaries(&goals))
        }
        Commands::EditGoal {
            goal_id,
            title,
            description,
            category,
            target,
        } => {
            let patch = GoalPatch {
                title,
                description,
                category,
                target_date: target,
            };
            let goal = ctx.engine.update_goal(ctx.owner, goal_id, patch)?;
            ctx.emit(&goal, || format!("Goal {} updated\n", goal_id))
        }
        Commands::EditMilestone {
            milestone_id,
            title,
            description,
            due,
        } => {
            let patch = ItemPatch {
                title,
                description,
                due_date: due,
            };
            let milestone = ctx.engine.update_milestone(ctx.owner, milestone_id, patch)?;
            ctx.emit(&milestone, || format!("Milestone {} updated\n", milestone_id))
        }
        Commands::EditTask {
            task_id,
            title,
            description,
            due,
        } => {
            let patch = ItemPatch {
                title,
                description,
                due_date: due,
            };
            let task = ctx.engine.update_task(ctx.owner, task_id, patch)?;
            ctx.emit(&task, || format!("Task {} updated\n", task_id))
        }
        Commands::Check => {
            let found = ctx.engine.verify(ctx.owner)?;
            ctx.emit(&found, || {
                if found.is_empty() {
                    "All goals are consistent\n".to_string()
                } else {
                    found.iter().map(|i| format!("{}\n", i)).collect()
                }
            })?;
            if found.is_empty() {
                Ok(())
            } else {
                Err(CliError::Inconsistent(found.len()))
            }
        }
        Commands::Repair => {
            let rewritten = ctx.engine.repair(ctx.owner)?;
            ctx.emit(&serde_json::json!({ "rewritten": rewritten }), || {
                format!("Repaired {} records\n", rewritten)
            })
        }
    }
}

/// Handle the add-goal command
pub fn handle_add_goal(
    ctx: &Context<'_>,
    title: String,
    description: Option<String>,
    category: Option<GoalCategory>,
    target: Option<String>,
) -> Result<(), CliError> {
    let input = NewGoal {
        title,
        description,
        category: Some(category.unwrap_or(ctx.default_category)),
        target_date: target,
    };
    let goal = ctx.engine.create_goal(ctx.owner, input)?;
    ctx.emit(&goal, || {
        format!("Goal created successfully (ID: {})\n", goal.id.unwrap_or_default())
    })
}

/// Render a goal tree for the terminal
pub fn format_snapshot(snapshot: &GoalSnapshot) -> String {
    let goal = &snapshot.goal;
    let mut out = String::new();
    let _ = write!(
        out,
        "#{} {} [{}] {}%",
        goal.id.unwrap_or_default(),
        goal.title,
        goal.category,
        goal.progress
    );
    if let Some(target) = &goal.target_date {
        let _ = write!(out, " (target {})", target);
    }
    out.push('\n');

    for entry in &snapshot.milestones {
        let milestone = &entry.milestone;
        let done = entry.tasks.iter().filter(|t| t.completed).count();
        let _ = writeln!(
            out,
            "  {} #{} {} ({}/{})",
            checkbox(milestone.completed),
            milestone.id.unwrap_or_default(),
            milestone.title,
            done,
            entry.tasks.len()
        );
        for task in &entry.tasks {
            let _ = writeln!(
                out,
                "      {} #{} {}",
                checkbox(task.completed),
                task.id.unwrap_or_default(),
                task.title
            );
        }
    }
    out
}

fn format_summaries(goals: &[GoalSummary]) -> String {
    if goals.is_empty() {
        return "No goals yet\n".to_string();
    }
    let mut out = String::new();
    for summary in goals {
        let _ = writeln!(
            out,
            "#{} {} [{}] {}% ({}/{} milestones)",
            summary.goal.id.unwrap_or_default(),
            summary.goal.title,
            summary.goal.category,
            summary.goal.progress,
            summary.completed_milestones,
            summary.milestone_count
        );
    }
    out
}

fn checkbox(done: bool) -> &'static str {
    if done { "[x]" } else { "[ ]" }
}
