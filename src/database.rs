use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::models::{Goal, GoalCategory, Milestone, OwnerId, Task};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Failed to create database directory: {0}")]
    DirectoryError(String),
    #[error("Record has no id: {0}")]
    MissingId(&'static str),
}

impl ToSql for OwnerId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for OwnerId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(OwnerId)
    }
}

impl ToSql for GoalCategory {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for GoalCategory {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database file and initialize the schema
    pub fn new(path: &str, busy_timeout: Duration) -> Result<Self, DatabaseError> {
        let db_path = PathBuf::from(path);

        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DatabaseError::DirectoryError(e.to_string()))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(busy_timeout)?;
        // journal_mode answers with the mode now in effect
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;

        let db = Database { conn };
        db.initialize_schema()?;
        debug!(path = %db_path.display(), "database opened");

        Ok(db)
    }

    /// Private in-memory database, used by tests and throwaway sessions
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize the database schema (tables and indexes)
    fn initialize_schema(&self) -> Result<(), DatabaseError> {
        // Cascading deletes depend on this; it is per-connection
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS goals (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id        INTEGER NOT NULL,
                title           TEXT NOT NULL,
                description     TEXT,
                category        TEXT NOT NULL DEFAULT 'personal',
                target_date     TEXT,
                progress        INTEGER NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS milestones (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id        INTEGER NOT NULL,
                goal_id         INTEGER NOT NULL REFERENCES goals(id) ON DELETE CASCADE,
                title           TEXT NOT NULL,
                description     TEXT,
                due_date        TEXT,
                completed       INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS tasks (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id        INTEGER NOT NULL,
                milestone_id    INTEGER NOT NULL REFERENCES milestones(id) ON DELETE CASCADE,
                title           TEXT NOT NULL,
                description     TEXT,
                due_date        TEXT,
                completed       INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_goals_owner_id ON goals(owner_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_milestones_goal_id ON milestones(goal_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tasks_milestone_id ON tasks(milestone_id)",
            [],
        )?;

        Ok(())
    }

    /// Get a reference to the underlying connection
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside an IMMEDIATE transaction and commit if it succeeds.
    ///
    /// IMMEDIATE takes the write lock up front, so everything `f` reads is
    /// current until commit. Returning an error drops the transaction,
    /// which rolls it back.
    pub fn write<F, R, E>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&Records<'_>) -> Result<R, E>,
        E: From<DatabaseError>,
    {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(DatabaseError::from)?;
        let result = f(&Records::new(&tx))?;
        tx.commit().map_err(DatabaseError::from)?;
        Ok(result)
    }

    /// Run `f` inside a read transaction so it sees one consistent state.
    pub fn read<F, R, E>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&Records<'_>) -> Result<R, E>,
        E: From<DatabaseError>,
    {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Deferred)
            .map_err(DatabaseError::from)?;
        let result = f(&Records::new(&tx))?;
        tx.commit().map_err(DatabaseError::from)?;
        Ok(result)
    }
}

/// Record-level access to goals, milestones and tasks.
///
/// Lookups by id are not filtered by owner; callers run the result through
/// `access::authorize`.
pub struct Records<'c> {
    conn: &'c Connection,
}

const GOAL_COLUMNS: &str =
    "id, owner_id, title, description, category, target_date, progress, created_at, updated_at";
const MILESTONE_COLUMNS: &str =
    "id, owner_id, goal_id, title, description, due_date, completed, created_at, updated_at";
const TASK_COLUMNS: &str =
    "id, owner_id, milestone_id, title, description, due_date, completed, created_at, updated_at";

fn optional<T>(result: rusqlite::Result<T>) -> Result<Option<T>, DatabaseError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DatabaseError::from(e)),
    }
}

impl<'c> Records<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn row_to_goal(row: &rusqlite::Row) -> Result<Goal, rusqlite::Error> {
        Ok(Goal {
            id: Some(row.get(0)?),
            owner_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            category: row.get(4)?,
            target_date: row.get(5)?,
            progress: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn row_to_milestone(row: &rusqlite::Row) -> Result<Milestone, rusqlite::Error> {
        Ok(Milestone {
            id: Some(row.get(0)?),
            owner_id: row.get(1)?,
            goal_id: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            due_date: row.get(5)?,
            completed: row.get::<_, i64>(6)? != 0,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn row_to_task(row: &rusqlite::Row) -> Result<Task, rusqlite::Error> {
        Ok(Task {
            id: Some(row.get(0)?),
            owner_id: row.get(1)?,
            milestone_id: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            due_date: row.get(5)?,
            completed: row.get::<_, i64>(6)? != 0,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    /// Insert a goal and return its ID
    pub fn insert_goal(&self, goal: &Goal) -> Result<i64, DatabaseError> {
        self.conn.execute(
            "INSERT INTO goals (owner_id, title, description, category, target_date, progress, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                goal.owner_id,
                goal.title,
                goal.description,
                goal.category,
                goal.target_date,
                goal.progress,
                goal.created_at,
                goal.updated_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Insert a milestone and return its ID
    pub fn insert_milestone(&self, milestone: &Milestone) -> Result<i64, DatabaseError> {
        self.conn.execute(
            "INSERT INTO milestones (owner_id, goal_id, title, description, due_date, completed, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                milestone.owner_id,
                milestone.goal_id,
                milestone.title,
                milestone.description,
                milestone.due_date,
                if milestone.completed { 1 } else { 0 },
                milestone.created_at,
                milestone.updated_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Insert a task and return its ID
    pub fn insert_task(&self, task: &Task) -> Result<i64, DatabaseError> {
        self.conn.execute(
            "INSERT INTO tasks (owner_id, milestone_id, title, description, due_date, completed, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                task.owner_id,
                task.milestone_id,
                task.title,
                task.description,
                task.due_date,
                if task.completed { 1 } else { 0 },
                task.created_at,
                task.updated_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn goal(&self, id: i64) -> Result<Option<Goal>, DatabaseError> {
        let sql = format!("SELECT {} FROM goals WHERE id = ?1", GOAL_COLUMNS);
        optional(
            self.conn
                .query_row(&sql, rusqlite::params![id], Self::row_to_goal),
        )
    }

    pub fn milestone(&self, id: i64) -> Result<Option<Milestone>, DatabaseError> {
        let sql = format!("SELECT {} FROM milestones WHERE id = ?1", MILESTONE_COLUMNS);
        optional(
            self.conn
                .query_row(&sql, rusqlite::params![id], Self::row_to_milestone),
        )
    }

    pub fn task(&self, id: i64) -> Result<Option<Task>, DatabaseError> {
        let sql = format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS);
        optional(
            self.conn
                .query_row(&sql, rusqlite::params![id], Self::row_to_task),
        )
    }

    /// All goals of an owner, newest first
    pub fn goals_of(&self, owner: OwnerId) -> Result<Vec<Goal>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM goals WHERE owner_id = ?1 ORDER BY created_at DESC, id DESC",
            GOAL_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let goals = stmt
            .query_map(rusqlite::params![owner], Self::row_to_goal)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(goals)
    }

    /// Milestones of a goal in creation order
    pub fn milestones_of(&self, goal_id: i64) -> Result<Vec<Milestone>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM milestones WHERE goal_id = ?1 ORDER BY id ASC",
            MILESTONE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let milestones = stmt
            .query_map(rusqlite::params![goal_id], Self::row_to_milestone)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(milestones)
    }

    /// Tasks of a milestone in creation order
    pub fn tasks_of(&self, milestone_id: i64) -> Result<Vec<Task>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE milestone_id = ?1 ORDER BY id ASC",
            TASK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let tasks = stmt
            .query_map(rusqlite::params![milestone_id], Self::row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Completion flags of every task under a milestone
    pub fn task_completion(&self, milestone_id: i64) -> Result<Vec<bool>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT completed FROM tasks WHERE milestone_id = ?1")?;
        let flags = stmt
            .query_map(rusqlite::params![milestone_id], |row| {
                Ok(row.get::<_, i64>(0)? != 0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(flags)
    }

    /// Completion flags of every milestone under a goal
    pub fn milestone_completion(&self, goal_id: i64) -> Result<Vec<bool>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT completed FROM milestones WHERE goal_id = ?1")?;
        let flags = stmt
            .query_map(rusqlite::params![goal_id], |row| {
                Ok(row.get::<_, i64>(0)? != 0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(flags)
    }

    /// Update a goal's editable fields. Progress is left alone.
    pub fn update_goal(&self, goal: &Goal) -> Result<(), DatabaseError> {
        let id = goal.id.ok_or(DatabaseError::MissingId("goal"))?;
        self.conn.execute(
            "UPDATE goals SET title = ?1, description = ?2, category = ?3, target_date = ?4, updated_at = ?5
             WHERE id = ?6",
            rusqlite::params![
                goal.title,
                goal.description,
                goal.category,
                goal.target_date,
                goal.updated_at,
                id
            ],
        )?;
        Ok(())
    }

    /// Update a milestone's editable fields. Completion is left alone.
    pub fn update_milestone(&self, milestone: &Milestone) -> Result<(), DatabaseError> {
        let id = milestone.id.ok_or(DatabaseError::MissingId("milestone"))?;
        self.conn.execute(
            "UPDATE milestones SET title = ?1, description = ?2, due_date = ?3, updated_at = ?4
             WHERE id = ?5",
            rusqlite::params![
                milestone.title,
                milestone.description,
                milestone.due_date,
                milestone.updated_at,
                id
            ],
        )?;
        Ok(())
    }

    /// Update a task's editable fields. Completion is left alone.
    pub fn update_task(&self, task: &Task) -> Result<(), DatabaseError> {
        let id = task.id.ok_or(DatabaseError::MissingId("task"))?;
        self.conn.execute(
            "UPDATE tasks SET title = ?1, description = ?2, due_date = ?3, updated_at = ?4
             WHERE id = ?5",
            rusqlite::params![task.title, task.description, task.due_date, task.updated_at, id],
        )?;
        Ok(())
    }

    pub fn set_task_completed(
        &self,
        id: i64,
        completed: bool,
        now: &str,
    ) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE tasks SET completed = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![if completed { 1 } else { 0 }, now, id],
        )?;
        Ok(())
    }

    pub fn set_milestone_completed(
        &self,
        id: i64,
        completed: bool,
        now: &str,
    ) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE milestones SET completed = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![if completed { 1 } else { 0 }, now, id],
        )?;
        Ok(())
    }

    pub fn set_goal_progress(&self, id: i64, progress: u8, now: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE goals SET progress = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![progress, now, id],
        )?;
        Ok(())
    }

    /// Delete a goal; its milestones and their tasks go with it
    pub fn delete_goal(&self, id: i64) -> Result<usize, DatabaseError> {
        Ok(self
            .conn
            .execute("DELETE FROM goals WHERE id = ?1", rusqlite::params![id])?)
    }

    /// Delete a milestone; its tasks go with it
    pub fn delete_milestone(&self, id: i64) -> Result<usize, DatabaseError> {
        Ok(self
            .conn
            .execute("DELETE FROM milestones WHERE id = ?1", rusqlite::params![id])?)
    }

    pub fn delete_task(&self, id: i64) -> Result<usize, DatabaseError> {
        Ok(self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1", rusqlite::params![id])?)
    }
}
