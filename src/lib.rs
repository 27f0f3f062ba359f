pub mod access;
pub mod cli;
pub mod config;
pub mod database;
pub mod engine;
pub mod models;
pub mod progress;
pub mod utils;

pub use config::Config;
pub use database::Database;
pub use engine::{Engine, EngineError};
pub use models::{Goal, GoalCategory, GoalSnapshot, Milestone, OwnerId, Task, ToggleOutcome};
pub use utils::Profile;
