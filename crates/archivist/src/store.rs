//! Backing stores: an in-memory trajectory queue and the SQLite skill,
//! reflection, and memory tables.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::ArchivistError;
use crate::skills::{EpisodicMemory, Reflection, Skill, SkillSource, SkillStatus};
use crate::types::{Trajectory, TrajectoryOutcome};

/// Learned skills younger than this can't be pruned yet.
const SKILL_PRUNE_AGE_DAYS: i64 = 7;
/// Learned skills with at least this much usage survive pruning.
const SKILL_PRUNE_MIN_USAGE: u32 = 2;

// ============================================================================
// Trajectory store
// ============================================================================

/// In-memory queue of trajectories awaiting archival.
#[derive(Debug, Default)]
pub struct TrajectoryStore {
    trajectories: HashMap<String, Trajectory>,
}

impl TrajectoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&mut self, trajectory: Trajectory) {
        self.trajectories.insert(trajectory.id.clone(), trajectory);
    }

    pub fn get(&self, id: &str) -> Option<&Trajectory> {
        self.trajectories.get(id)
    }

    pub fn get_unarchived(&self) -> Vec<&Trajectory> {
        self.trajectories.values().filter(|t| !t.archived).collect()
    }

    pub fn get_by_outcome(&self, outcome: TrajectoryOutcome) -> Vec<&Trajectory> {
        self.trajectories
            .values()
            .filter(|t| t.outcome == outcome)
            .collect()
    }

    pub fn mark_archived(&mut self, ids: &[String]) {
        for id in ids {
            if let Some(t) = self.trajectories.get_mut(id) {
                t.archived = true;
            }
        }
    }

    /// Remove trajectories past the age limit, returning how many went.
    pub fn prune(&mut self, max_age_days: u32) -> usize {
        let stale: Vec<String> = self
            .trajectories
            .values()
            .filter(|t| !t.is_within_age(max_age_days))
            .map(|t| t.id.clone())
            .collect();
        for id in &stale {
            self.trajectories.remove(id);
        }
        stale.len()
    }

    pub fn count(&self) -> usize {
        self.trajectories.len()
    }
}

// ============================================================================
// Skill store
// ============================================================================

/// SQLite-backed skills, reflections, and episodic memories.
///
/// One connection per process, serialized behind a mutex so the store can
/// be shared across async tasks.
pub struct SkillStore {
    conn: Mutex<Connection>,
}

impl SkillStore {
    pub fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        let conn = Connection::open(path).map_err(ArchivistError::Connection)?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory().map_err(ArchivistError::Connection)?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn save_skill(&self, skill: &Skill) -> crate::Result<()> {
        self.lock()
            .execute(
                r#"
                INSERT OR REPLACE INTO skills (
                    id, name, description, content, category, source,
                    usage_count, success_rate, status, tags_json, learned_from_json, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
                params![
                    skill.id,
                    skill.name,
                    skill.description,
                    skill.content,
                    skill.category,
                    enum_str(&skill.source)?,
                    skill.usage_count,
                    skill.success_rate,
                    enum_str(&skill.status)?,
                    serde_json::to_string(&skill.tags)?,
                    serde_json::to_string(&skill.learned_from)?,
                    skill.created_at,
                ],
            )
            .map_err(ArchivistError::Insert)?;
        Ok(())
    }

    pub fn get_skill(&self, id: &str) -> crate::Result<Skill> {
        get_skill_with(&self.lock(), id)
    }

    pub fn list_skills(&self, status: Option<SkillStatus>) -> crate::Result<Vec<Skill>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT * FROM skills WHERE ?1 IS NULL OR status = ?1 ORDER BY created_at")
            .map_err(ArchivistError::Query)?;
        let status_str = status.map(|s| enum_str(&s)).transpose()?;
        let skills = stmt
            .query_map(params![status_str], row_to_skill)
            .map_err(ArchivistError::Query)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(ArchivistError::Query)?;
        Ok(skills)
    }

    /// Record one use of a skill, folding the outcome into its success rate.
    pub fn record_usage(&self, id: &str, success: bool) -> crate::Result<()> {
        let conn = self.lock();
        let skill = get_skill_with(&conn, id)?;
        let uses = skill.usage_count as f64;
        let new_rate = (skill.success_rate * uses + if success { 1.0 } else { 0.0 }) / (uses + 1.0);
        conn.execute(
            "UPDATE skills SET usage_count = usage_count + 1, success_rate = ?2 WHERE id = ?1",
            params![id, new_rate],
        )
        .map_err(ArchivistError::Insert)?;
        Ok(())
    }

    /// Delete learned skills older than a week that never caught on
    /// (fewer than two uses). Returns how many were removed.
    pub fn prune_stale_learned(&self) -> crate::Result<usize> {
        let cutoff = (Utc::now() - chrono::Duration::days(SKILL_PRUNE_AGE_DAYS)).to_rfc3339();
        let removed = self
            .lock()
            .execute(
                "DELETE FROM skills WHERE source = 'learned' AND created_at < ?1 AND usage_count < ?2",
                params![cutoff, SKILL_PRUNE_MIN_USAGE],
            )
            .map_err(ArchivistError::Query)?;
        if removed > 0 {
            debug!(removed, "pruned stale learned skills");
        }
        Ok(removed)
    }

    pub fn save_reflection(&self, reflection: &Reflection) -> crate::Result<()> {
        self.lock()
            .execute(
                r#"
                INSERT OR REPLACE INTO reflections (
                    id, episode_id, task_id, failure_type, description,
                    lesson, suggested_approach, related_skills_json, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    reflection.id,
                    reflection.episode_id,
                    reflection.task_id,
                    enum_str(&reflection.failure_type)?,
                    reflection.description,
                    reflection.lesson,
                    reflection.suggested_approach,
                    serde_json::to_string(&reflection.related_skills)?,
                    reflection.created_at,
                ],
            )
            .map_err(ArchivistError::Insert)?;
        Ok(())
    }

    pub fn reflections_for_task(&self, task_id: &str) -> crate::Result<Vec<Reflection>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT * FROM reflections WHERE task_id = ?1 ORDER BY created_at")
            .map_err(ArchivistError::Query)?;
        let reflections = stmt
            .query_map(params![task_id], row_to_reflection)
            .map_err(ArchivistError::Query)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(ArchivistError::Query)?;
        Ok(reflections)
    }

    pub fn save_memory(&self, memory: &EpisodicMemory) -> crate::Result<()> {
        self.lock()
            .execute(
                r#"
                INSERT OR REPLACE INTO episodic_memories (id, episode_id, summary, skill_ids_json, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    memory.id,
                    memory.episode_id,
                    memory.summary,
                    serde_json::to_string(&memory.skill_ids)?,
                    memory.created_at,
                ],
            )
            .map_err(ArchivistError::Insert)?;
        Ok(())
    }

    pub fn memories_mentioning_skill(&self, skill_id: &str) -> crate::Result<Vec<EpisodicMemory>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT * FROM episodic_memories WHERE skill_ids_json LIKE ?1")
            .map_err(ArchivistError::Query)?;
        let pattern = format!("%\"{skill_id}\"%");
        let memories = stmt
            .query_map(params![pattern], row_to_memory)
            .map_err(ArchivistError::Query)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(ArchivistError::Query)?;
        Ok(memories)
    }
}

fn migrate(conn: &Connection) -> crate::Result<()> {
    conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS skills (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    description TEXT NOT NULL,
                    content TEXT NOT NULL,
                    category TEXT NOT NULL,
                    source TEXT NOT NULL,
                    usage_count INTEGER NOT NULL DEFAULT 0,
                    success_rate REAL NOT NULL DEFAULT 0.0,
                    status TEXT NOT NULL DEFAULT 'draft',
                    tags_json TEXT NOT NULL DEFAULT '[]',
                    learned_from_json TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS reflections (
                    id TEXT PRIMARY KEY,
                    episode_id TEXT NOT NULL,
                    task_id TEXT NOT NULL,
                    failure_type TEXT NOT NULL,
                    description TEXT NOT NULL,
                    lesson TEXT NOT NULL,
                    suggested_approach TEXT NOT NULL,
                    related_skills_json TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS episodic_memories (
                    id TEXT PRIMARY KEY,
                    episode_id TEXT,
                    summary TEXT NOT NULL,
                    skill_ids_json TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_skills_status ON skills(status);
                CREATE INDEX IF NOT EXISTS idx_reflections_task ON reflections(task_id);
                "#,
            )
    .map_err(ArchivistError::Migration)
}

fn get_skill_with(conn: &Connection, id: &str) -> crate::Result<Skill> {
    conn.query_row("SELECT * FROM skills WHERE id = ?1", params![id], row_to_skill)
        .optional()
        .map_err(ArchivistError::Query)?
        .ok_or_else(|| ArchivistError::NotFound(id.to_string()))
}

/// Serde-derived snake/lowercase string for a unit enum variant.
fn enum_str<T: serde::Serialize>(value: &T) -> crate::Result<String> {
    let json = serde_json::to_string(value)?;
    Ok(json.trim_matches('"').to_string())
}

fn parse_enum<T: serde::de::DeserializeOwned>(s: String) -> rusqlite::Result<T> {
    serde_json::from_str(&format!("\"{s}\"")).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_json_list(s: String) -> Vec<String> {
    serde_json::from_str(&s).unwrap_or_default()
}

fn row_to_skill(row: &rusqlite::Row<'_>) -> rusqlite::Result<Skill> {
    Ok(Skill {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        content: row.get("content")?,
        category: row.get("category")?,
        source: parse_enum::<SkillSource>(row.get("source")?)?,
        usage_count: row.get("usage_count")?,
        success_rate: row.get("success_rate")?,
        status: parse_enum::<SkillStatus>(row.get("status")?)?,
        tags: parse_json_list(row.get("tags_json")?),
        learned_from: parse_json_list(row.get("learned_from_json")?),
        created_at: row.get("created_at")?,
    })
}

fn row_to_reflection(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reflection> {
    Ok(Reflection {
        id: row.get("id")?,
        episode_id: row.get("episode_id")?,
        task_id: row.get("task_id")?,
        failure_type: parse_enum(row.get("failure_type")?)?,
        description: row.get("description")?,
        lesson: row.get("lesson")?,
        suggested_approach: row.get("suggested_approach")?,
        related_skills: parse_json_list(row.get("related_skills_json")?),
        created_at: row.get("created_at")?,
    })
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<EpisodicMemory> {
    Ok(EpisodicMemory {
        id: row.get("id")?,
        episode_id: row.get("episode_id")?,
        summary: row.get("summary")?,
        skill_ids: parse_json_list(row.get("skill_ids_json")?),
        created_at: row.get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::FailureType;
    use crate::types::TokenUsage;

    fn trajectory(id: &str, outcome: TrajectoryOutcome) -> Trajectory {
        Trajectory {
            id: id.to_string(),
            task_id: "task".to_string(),
            task_description: "Test".to_string(),
            actions: vec![],
            outcome,
            error_message: None,
            skills_used: vec![],
            files_modified: vec![],
            total_duration_ms: 1000,
            model: "fm".to_string(),
            tokens: TokenUsage {
                input: 10,
                output: 5,
                total: 15,
            },
            timestamp: Utc::now().to_rfc3339(),
            episode_id: None,
            archived: false,
        }
    }

    #[test]
    fn test_trajectory_store_unarchived_and_mark() {
        let mut store = TrajectoryStore::new();
        for i in 0..5 {
            let mut t = trajectory(&format!("t{i}"), TrajectoryOutcome::Success);
            if i < 2 {
                t.archived = true;
            }
            store.save(t);
        }

        assert_eq!(store.get_unarchived().len(), 3);
        store.mark_archived(&["t2".to_string()]);
        assert_eq!(store.get_unarchived().len(), 2);
        assert!(store.get("t2").unwrap().archived);
    }

    #[test]
    fn test_trajectory_store_prune_old() {
        let mut store = TrajectoryStore::new();
        store.save(trajectory("fresh", TrajectoryOutcome::Success));
        let mut old = trajectory("old", TrajectoryOutcome::Failure);
        old.timestamp = (Utc::now() - chrono::Duration::days(60)).to_rfc3339();
        store.save(old);

        assert_eq!(store.prune(30), 1);
        assert_eq!(store.count(), 1);
        assert!(store.get("fresh").is_some());
    }

    #[test]
    fn test_skill_save_load_round_trip() {
        let store = SkillStore::open_in_memory().unwrap();
        let mut skill = Skill::learned("grep first", "search before editing", "grep -rn", "search");
        skill.tags = vec!["search".to_string()];
        skill.learned_from = vec!["ep-1".to_string()];
        store.save_skill(&skill).unwrap();

        let loaded = store.get_skill(&skill.id).unwrap();
        assert_eq!(loaded.name, "grep first");
        assert_eq!(loaded.source, SkillSource::Learned);
        assert_eq!(loaded.tags, vec!["search"]);
        assert_eq!(loaded.learned_from, vec!["ep-1"]);
    }

    #[test]
    fn test_record_usage_updates_success_rate() {
        let store = SkillStore::open_in_memory().unwrap();
        let skill = Skill::learned("s", "d", "c", "cat");
        store.save_skill(&skill).unwrap();

        store.record_usage(&skill.id, true).unwrap();
        store.record_usage(&skill.id, true).unwrap();
        store.record_usage(&skill.id, false).unwrap();

        let loaded = store.get_skill(&skill.id).unwrap();
        assert_eq!(loaded.usage_count, 3);
        assert!((loaded.success_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_prune_stale_learned_skills() {
        let store = SkillStore::open_in_memory().unwrap();

        let mut stale = Skill::learned("stale", "d", "c", "cat");
        stale.created_at = (Utc::now() - chrono::Duration::days(10)).to_rfc3339();
        store.save_skill(&stale).unwrap();

        let mut used = Skill::learned("used", "d", "c", "cat");
        used.created_at = (Utc::now() - chrono::Duration::days(10)).to_rfc3339();
        used.usage_count = 5;
        store.save_skill(&used).unwrap();

        let fresh = Skill::learned("fresh", "d", "c", "cat");
        store.save_skill(&fresh).unwrap();

        let mut bootstrap = Skill::learned("boot", "d", "c", "cat");
        bootstrap.source = SkillSource::Bootstrap;
        bootstrap.created_at = (Utc::now() - chrono::Duration::days(100)).to_rfc3339();
        store.save_skill(&bootstrap).unwrap();

        assert_eq!(store.prune_stale_learned().unwrap(), 1);
        assert!(store.get_skill(&stale.id).is_err());
        assert!(store.get_skill(&used.id).is_ok());
        assert!(store.get_skill(&fresh.id).is_ok());
        assert!(store.get_skill(&bootstrap.id).is_ok());
    }

    #[test]
    fn test_list_skills_by_status() {
        let store = SkillStore::open_in_memory().unwrap();
        let mut active = Skill::learned("a", "d", "c", "cat");
        active.status = SkillStatus::Active;
        store.save_skill(&active).unwrap();
        store.save_skill(&Skill::learned("b", "d", "c", "cat")).unwrap();

        assert_eq!(store.list_skills(None).unwrap().len(), 2);
        assert_eq!(store.list_skills(Some(SkillStatus::Active)).unwrap().len(), 1);
        assert_eq!(store.list_skills(Some(SkillStatus::Retired)).unwrap().len(), 0);
    }

    #[test]
    fn test_reflection_round_trip() {
        let store = SkillStore::open_in_memory().unwrap();
        let reflection = Reflection {
            id: "refl-1".to_string(),
            episode_id: "ep-1".to_string(),
            task_id: "regex-log".to_string(),
            failure_type: FailureType::WrongOutput,
            description: "pattern missed multiline input".to_string(),
            lesson: "always test multiline".to_string(),
            suggested_approach: "use re.MULTILINE".to_string(),
            related_skills: vec!["skill-1".to_string()],
            created_at: Utc::now().to_rfc3339(),
        };
        store.save_reflection(&reflection).unwrap();

        let loaded = store.reflections_for_task("regex-log").unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].failure_type, FailureType::WrongOutput);
        assert_eq!(loaded[0].related_skills, vec!["skill-1"]);
    }

    #[test]
    fn test_memory_lookup_by_skill() {
        let store = SkillStore::open_in_memory().unwrap();
        let memory = EpisodicMemory {
            id: "mem-1".to_string(),
            episode_id: Some("ep-1".to_string()),
            summary: "learned the retry loop".to_string(),
            skill_ids: vec!["skill-retry".to_string()],
            created_at: Utc::now().to_rfc3339(),
        };
        store.save_memory(&memory).unwrap();

        let found = store.memories_mentioning_skill("skill-retry").unwrap();
        assert_eq!(found.len(), 1);
        assert!(store.memories_mentioning_skill("skill-other").unwrap().is_empty());
    }
}
