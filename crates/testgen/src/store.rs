//! SQLite evolution store.
//!
//! One connection per process, serialized behind a mutex; every statement
//! runs in its own implicit transaction, so concurrent processes coordinate
//! through SQLite's own file locking. Configs are deduplicated by their
//! hash so repeated runs of an identical tuple share a row.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::TestGenError;
use crate::types::{TestGenConfig, TestGenConfigInput, TestGenRun, TestGenRunInput};

/// Aggregate view over all stored runs.
#[derive(Debug, Clone, PartialEq)]
pub struct TestGenStats {
    pub total_runs: i64,
    pub best_score: i64,
    pub avg_score: f64,
    pub total_tests_generated: i64,
}

pub struct TestGenStore {
    conn: Mutex<Connection>,
}

impl TestGenStore {
    pub fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        let conn = Connection::open(path).map_err(TestGenError::Connection)?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory().map_err(TestGenError::Connection)?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a config, or return the existing row with the same hash.
    pub fn save_config(&self, input: &TestGenConfigInput) -> crate::Result<TestGenConfig> {
        let conn = self.lock();
        let hash = input.config_hash();

        if let Some(existing) = config_by_hash_with(&conn, &hash)? {
            return Ok(existing);
        }

        let now = chrono::Utc::now().to_rfc3339();
        let json =
            serde_json::to_string(input).map_err(|e| TestGenError::BadModelOutput(e.to_string()))?;
        conn.execute(
            "INSERT INTO testgen_configs (config_hash, config_json, created_at) VALUES (?1, ?2, ?3)",
            params![hash, json, now],
        )
        .map_err(TestGenError::Insert)?;

        Ok(TestGenConfig {
            id: conn.last_insert_rowid(),
            config_hash: hash,
            input: input.clone(),
            created_at: now,
        })
    }

    /// Best-scoring config across all runs, for evolution seeding.
    pub fn best_config(&self) -> crate::Result<Option<TestGenConfig>> {
        let conn = self.lock();
        let hash: Option<String> = conn
            .query_row(
                r#"
                SELECT c.config_hash
                FROM testgen_runs r JOIN testgen_configs c ON r.config_id = c.id
                ORDER BY r.score DESC, r.id ASC LIMIT 1
                "#,
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(TestGenError::Query)?;

        match hash {
            Some(hash) => config_by_hash_with(&conn, &hash),
            None => Ok(None),
        }
    }

    pub fn save_run(&self, input: &TestGenRunInput) -> crate::Result<TestGenRun> {
        let conn = self.lock();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO testgen_runs (
                run_id, session_id, config_id, task_id, total_tests,
                comprehensiveness_score, duration_ms, total_tokens,
                category_balance, anti_cheat_coverage, parameter_discovery,
                reflection_effectiveness, token_efficiency,
                meta_model, proposed_change, change_accepted, score, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
            params![
                input.run_id,
                input.session_id,
                input.config_id,
                input.task_id,
                input.total_tests,
                input.comprehensiveness_score,
                input.duration_ms as i64,
                input.total_tokens as i64,
                input.category_balance,
                input.anti_cheat_coverage,
                input.parameter_discovery,
                input.reflection_effectiveness,
                input.token_efficiency,
                input.meta_model,
                input.proposed_change,
                input.change_accepted,
                input.score,
                now,
            ],
        )
        .map_err(TestGenError::Insert)?;

        Ok(TestGenRun {
            id: conn.last_insert_rowid(),
            input: input.clone(),
            created_at: now,
        })
    }

    pub fn get_stats(&self) -> crate::Result<TestGenStats> {
        self.lock()
            .query_row(
                r#"
                SELECT COUNT(*),
                       COALESCE(MAX(score), 0),
                       COALESCE(AVG(score), 0.0),
                       COALESCE(SUM(total_tests), 0)
                FROM testgen_runs
                "#,
                [],
                |row| {
                    Ok(TestGenStats {
                        total_runs: row.get(0)?,
                        best_score: row.get(1)?,
                        avg_score: row.get(2)?,
                        total_tests_generated: row.get(3)?,
                    })
                },
            )
            .map_err(TestGenError::Query)
    }
}

fn migrate(conn: &Connection) -> crate::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS testgen_configs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            config_hash TEXT NOT NULL UNIQUE,
            config_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS testgen_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL UNIQUE,
            session_id TEXT NOT NULL,
            config_id INTEGER NOT NULL REFERENCES testgen_configs(id),
            task_id TEXT NOT NULL,
            total_tests INTEGER NOT NULL,
            comprehensiveness_score REAL,
            duration_ms INTEGER NOT NULL,
            total_tokens INTEGER NOT NULL,
            category_balance REAL,
            anti_cheat_coverage REAL,
            parameter_discovery REAL,
            reflection_effectiveness REAL,
            token_efficiency REAL,
            meta_model TEXT,
            proposed_change TEXT,
            change_accepted INTEGER NOT NULL DEFAULT 0,
            score INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_testgen_runs_task ON testgen_runs(task_id);
        CREATE INDEX IF NOT EXISTS idx_testgen_runs_score ON testgen_runs(score DESC);
        "#,
    )
    .map_err(TestGenError::Migration)
}

fn config_by_hash_with(conn: &Connection, hash: &str) -> crate::Result<Option<TestGenConfig>> {
    conn.query_row(
        "SELECT id, config_hash, config_json, created_at FROM testgen_configs WHERE config_hash = ?1",
        params![hash],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        },
    )
    .optional()
    .map_err(TestGenError::Query)?
    .map(|(id, config_hash, json, created_at)| {
        let input = serde_json::from_str(&json)
            .map_err(|e| TestGenError::BadModelOutput(e.to_string()))?;
        Ok(TestGenConfig {
            id,
            config_hash,
            input,
            created_at,
        })
    })
    .transpose()
}
