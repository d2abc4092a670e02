//! SQLite history store.
//!
//! Configs are deduplicated by hash; runs get a per-task `run_number` so
//! meta-reasoner cadence (`run_number % N`) and history rendering have a
//! total order to work with. One connection per process, serialized behind
//! a mutex; every statement is its own transaction, so concurrent processes
//! coordinate through SQLite's own file locking.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::HillClimberError;
use crate::types::{
    HillClimberConfig, HillClimberConfigInput, HillClimberRun, HillClimberRunInput,
};

/// Per-task aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStats {
    pub total_runs: i64,
    pub pass_count: i64,
    pub pass_rate: f64,
    pub best_score: i64,
    pub best_hint: Option<String>,
}

/// Store-wide aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct HillClimberStats {
    pub total_runs: i64,
    pub by_task: HashMap<String, TaskStats>,
}

pub struct HillClimberStore {
    conn: Mutex<Connection>,
}

impl HillClimberStore {
    pub fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        let conn = Connection::open(path).map_err(HillClimberError::Connection)?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory().map_err(HillClimberError::Connection)?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a config, or return the existing row with the same hash.
    pub fn save_config(&self, input: &HillClimberConfigInput) -> crate::Result<HillClimberConfig> {
        save_config_with(&self.lock(), input)
    }

    /// Current (most recently saved) config for a task, creating the default
    /// when none exists yet.
    pub fn ensure_default_config(&self, task_id: &str) -> crate::Result<HillClimberConfig> {
        let conn = self.lock();
        if let Some(config) = current_config_with(&conn, task_id)? {
            return Ok(config);
        }
        save_config_with(&conn, &HillClimberConfigInput::default_for(task_id))
    }

    pub fn get_current_config(&self, task_id: &str) -> crate::Result<Option<HillClimberConfig>> {
        current_config_with(&self.lock(), task_id)
    }

    /// Persist a run with the next `run_number` for its task.
    pub fn save_run(&self, input: &HillClimberRunInput) -> crate::Result<HillClimberRun> {
        let conn = self.lock();
        let run_number: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(run_number), 0) + 1 FROM hc_runs WHERE task_id = ?1",
                params![input.task_id],
                |row| row.get(0),
            )
            .map_err(HillClimberError::Query)?;

        let step_summary_json = input
            .step_summary
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| HillClimberError::TaskRun(e.to_string()))?;

        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO hc_runs (
                run_id, run_number, task_id, config_id, passed, turns, duration_ms,
                step_summary_json, error_message, meta_model, proposed_change,
                change_accepted, score, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                input.run_id,
                run_number,
                input.task_id,
                input.config_id,
                input.passed,
                input.turns,
                input.duration_ms as i64,
                step_summary_json,
                input.error_message,
                input.meta_model,
                input.proposed_change,
                input.change_accepted,
                input.score,
                now,
            ],
        )
        .map_err(HillClimberError::Insert)?;

        Ok(HillClimberRun {
            id: conn.last_insert_rowid(),
            run_number,
            input: input.clone(),
            created_at: now,
        })
    }

    /// Number of runs recorded for a task.
    pub fn run_count(&self, task_id: &str) -> crate::Result<i64> {
        self.lock()
            .query_row(
                "SELECT COUNT(*) FROM hc_runs WHERE task_id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .map_err(HillClimberError::Query)
    }

    /// The most recent runs for a task, newest first.
    pub fn recent_runs(&self, task_id: &str, limit: usize) -> crate::Result<Vec<HillClimberRun>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, run_id, run_number, task_id, config_id, passed, turns, duration_ms,
                       step_summary_json, error_message, meta_model, proposed_change,
                       change_accepted, score, created_at
                FROM hc_runs WHERE task_id = ?1 ORDER BY run_number DESC LIMIT ?2
                "#,
            )
            .map_err(HillClimberError::Query)?;

        let runs = stmt
            .query_map(params![task_id, limit as i64], row_to_run)
            .map_err(HillClimberError::Query)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(HillClimberError::Query)?;
        Ok(runs)
    }

    /// Distinct hints ever tried for a task, oldest first.
    pub fn tried_hints(&self, task_id: &str, limit: usize) -> crate::Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT DISTINCT hint FROM hc_configs
                WHERE task_id = ?1 AND hint IS NOT NULL ORDER BY id ASC LIMIT ?2
                "#,
            )
            .map_err(HillClimberError::Query)?;
        let hints = stmt
            .query_map(params![task_id, limit as i64], |row| row.get(0))
            .map_err(HillClimberError::Query)?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(HillClimberError::Query)?;
        Ok(hints)
    }

    /// Hint and score of the best-scoring run for a task.
    pub fn best_hint(&self, task_id: &str) -> crate::Result<Option<(Option<String>, i64)>> {
        best_hint_with(&self.lock(), task_id)
    }

    pub fn get_stats(&self) -> crate::Result<HillClimberStats> {
        let conn = self.lock();
        let total_runs: i64 = conn
            .query_row("SELECT COUNT(*) FROM hc_runs", [], |row| row.get(0))
            .map_err(HillClimberError::Query)?;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT task_id, COUNT(*), SUM(passed), MAX(score)
                FROM hc_runs GROUP BY task_id
                "#,
            )
            .map_err(HillClimberError::Query)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .map_err(HillClimberError::Query)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(HillClimberError::Query)?;

        let mut by_task = HashMap::new();
        for (task_id, runs, passes, best_score) in rows {
            let best_hint = best_hint_with(&conn, &task_id)?.and_then(|(hint, _)| hint);
            by_task.insert(
                task_id,
                TaskStats {
                    total_runs: runs,
                    pass_count: passes,
                    pass_rate: passes as f64 / runs as f64,
                    best_score,
                    best_hint,
                },
            );
        }

        Ok(HillClimberStats {
            total_runs,
            by_task,
        })
    }
}

fn migrate(conn: &Connection) -> crate::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS hc_configs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id TEXT NOT NULL,
            hint TEXT,
            use_skills INTEGER NOT NULL DEFAULT 0,
            max_turns_override INTEGER,
            config_hash TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(task_id, config_hash)
        );

        CREATE TABLE IF NOT EXISTS hc_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL UNIQUE,
            run_number INTEGER NOT NULL,
            task_id TEXT NOT NULL,
            config_id INTEGER NOT NULL REFERENCES hc_configs(id),
            passed INTEGER NOT NULL,
            turns INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL,
            step_summary_json TEXT,
            error_message TEXT,
            meta_model TEXT,
            proposed_change TEXT,
            change_accepted INTEGER NOT NULL DEFAULT 0,
            score INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_hc_runs_task ON hc_runs(task_id, run_number);
        CREATE INDEX IF NOT EXISTS idx_hc_configs_task ON hc_configs(task_id, id DESC);
        "#,
    )
    .map_err(HillClimberError::Migration)
}

fn save_config_with(
    conn: &Connection,
    input: &HillClimberConfigInput,
) -> crate::Result<HillClimberConfig> {
    let hash = input.config_hash();
    if let Some(existing) = config_by_hash_with(conn, &input.task_id, &hash)? {
        return Ok(existing);
    }

    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        r#"
        INSERT INTO hc_configs (task_id, hint, use_skills, max_turns_override, config_hash, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            input.task_id,
            input.hint,
            input.use_skills,
            input.max_turns_override,
            hash,
            now,
        ],
    )
    .map_err(HillClimberError::Insert)?;

    debug!(task_id = %input.task_id, %hash, "saved new config");
    Ok(HillClimberConfig {
        id: conn.last_insert_rowid(),
        task_id: input.task_id.clone(),
        hint: input.hint.clone(),
        use_skills: input.use_skills,
        max_turns_override: input.max_turns_override,
        config_hash: hash,
        created_at: now,
    })
}

fn current_config_with(
    conn: &Connection,
    task_id: &str,
) -> crate::Result<Option<HillClimberConfig>> {
    conn.query_row(
        r#"
        SELECT id, task_id, hint, use_skills, max_turns_override, config_hash, created_at
        FROM hc_configs WHERE task_id = ?1 ORDER BY id DESC LIMIT 1
        "#,
        params![task_id],
        row_to_config,
    )
    .optional()
    .map_err(HillClimberError::Query)
}

fn config_by_hash_with(
    conn: &Connection,
    task_id: &str,
    hash: &str,
) -> crate::Result<Option<HillClimberConfig>> {
    conn.query_row(
        r#"
        SELECT id, task_id, hint, use_skills, max_turns_override, config_hash, created_at
        FROM hc_configs WHERE task_id = ?1 AND config_hash = ?2
        "#,
        params![task_id, hash],
        row_to_config,
    )
    .optional()
    .map_err(HillClimberError::Query)
}

fn best_hint_with(
    conn: &Connection,
    task_id: &str,
) -> crate::Result<Option<(Option<String>, i64)>> {
    conn.query_row(
        r#"
        SELECT c.hint, r.score
        FROM hc_runs r JOIN hc_configs c ON r.config_id = c.id
        WHERE r.task_id = ?1
        ORDER BY r.score DESC, r.run_number ASC LIMIT 1
        "#,
        params![task_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
    .map_err(HillClimberError::Query)
}

fn row_to_config(row: &rusqlite::Row<'_>) -> rusqlite::Result<HillClimberConfig> {
    Ok(HillClimberConfig {
        id: row.get(0)?,
        task_id: row.get(1)?,
        hint: row.get(2)?,
        use_skills: row.get(3)?,
        max_turns_override: row.get(4)?,
        config_hash: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<HillClimberRun> {
    let step_summary_json: Option<String> = row.get(8)?;
    Ok(HillClimberRun {
        id: row.get(0)?,
        run_number: row.get(2)?,
        input: HillClimberRunInput {
            run_id: row.get(1)?,
            task_id: row.get(3)?,
            config_id: row.get(4)?,
            passed: row.get(5)?,
            turns: row.get(6)?,
            duration_ms: row.get::<_, i64>(7)? as u64,
            step_summary: step_summary_json.and_then(|s| serde_json::from_str(&s).ok()),
            error_message: row.get(9)?,
            meta_model: row.get(10)?,
            proposed_change: row.get(11)?,
            change_accepted: row.get(12)?,
            score: row.get(13)?,
        },
        created_at: row.get(14)?,
    })
}
