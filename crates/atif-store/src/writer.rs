//! Crash-safe streaming writer for a single session.
//!
//! One writer owns one session. Steps append to the JSONL log as they happen;
//! after each append the index sidecar is rewritten through a uniquely-named
//! temp file and renamed into place. Appends and index updates are not
//! globally atomic, but the log is append-only and the index never tears, so
//! a crash costs at most the trailing partial line.

use std::path::{Path, PathBuf};

use atif::{Agent, FinalMetrics, Step, session};
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::index::{Checkpoint, TrajectoryIndex, TrajectoryStatus};
use crate::reader::JsonlHeader;

/// Resolved file locations for a streaming session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterPaths {
    pub dir: PathBuf,
    pub jsonl: PathBuf,
    pub index: PathBuf,
}

#[derive(Debug, PartialEq, Eq)]
enum WriterPhase {
    Created,
    Streaming,
    Closed,
}

struct WriterState {
    phase: WriterPhase,
    /// Number of steps appended so far
    step_count: i64,
    /// Highest step ID appended so far
    max_step_id: i64,
}

/// Append-only step logger for one session.
///
/// `write_step` calls are serialized internally, so the JSONL stays in append
/// order and the index reflects the true step count even under concurrent use
/// of a shared writer handle.
pub struct StreamWriter {
    session_id: String,
    agent: Agent,
    parent_session_id: Option<String>,
    paths: WriterPaths,
    state: Mutex<WriterState>,
}

impl StreamWriter {
    /// Create a writer for `session_id` rooted at `base_dir`.
    ///
    /// The date folder comes from the session ID when parseable, otherwise
    /// from the current date. Nothing is written until [`initialize`].
    ///
    /// [`initialize`]: StreamWriter::initialize
    pub fn new(
        base_dir: impl AsRef<Path>,
        session_id: impl Into<String>,
        agent: Agent,
        parent_session_id: Option<String>,
    ) -> Self {
        let session_id = session_id.into();
        let folder = session::date_folder_for_session(&session_id)
            .unwrap_or_else(session::today_folder);
        let dir = base_dir.as_ref().join(folder);
        let jsonl = dir.join(format!("{session_id}.atif.jsonl"));
        let index = dir.join(format!("{session_id}.index.json"));

        Self {
            session_id,
            agent,
            parent_session_id,
            paths: WriterPaths { dir, jsonl, index },
            state: Mutex::new(WriterState {
                phase: WriterPhase::Created,
                step_count: 0,
                max_step_id: 0,
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// File locations this writer targets.
    pub fn paths(&self) -> WriterPaths {
        self.paths.clone()
    }

    /// Create the date directory, write the header line, and publish an
    /// `in_progress` index. Idempotent directory creation; calling after
    /// [`close`] fails.
    ///
    /// [`close`]: StreamWriter::close
    pub async fn initialize(&self) -> crate::Result<()> {
        let mut state = self.state.lock().await;
        if state.phase == WriterPhase::Closed {
            return Err(StoreError::WriterClosed(self.session_id.clone()));
        }

        tokio::fs::create_dir_all(&self.paths.dir)
            .await
            .map_err(|e| StoreError::write(&self.paths.dir, e))?;

        let header = JsonlHeader {
            header: true,
            schema_version: atif::SCHEMA_VERSION.to_string(),
            session_id: self.session_id.clone(),
            agent: self.agent.clone(),
            created_at: now_iso(),
            parent_session_id: self.parent_session_id.clone(),
        };
        let line = serde_json::to_string(&header)
            .map_err(|e| StoreError::parse(&self.paths.jsonl, e))?;
        self.append_line(&line).await?;

        state.phase = WriterPhase::Streaming;
        self.update_index(&state, TrajectoryStatus::InProgress, None)
            .await?;
        debug!(session_id = %self.session_id, "initialized streaming trajectory");
        Ok(())
    }

    /// Append one step and advance the index checkpoint.
    pub async fn write_step(&self, step: &Step) -> crate::Result<()> {
        let mut state = self.state.lock().await;
        match state.phase {
            WriterPhase::Closed => {
                return Err(StoreError::WriterClosed(self.session_id.clone()));
            }
            WriterPhase::Created => {
                return Err(StoreError::InvalidPath(format!(
                    "writer for {} not initialized",
                    self.session_id
                )));
            }
            WriterPhase::Streaming => {}
        }

        let line =
            serde_json::to_string(step).map_err(|e| StoreError::parse(&self.paths.jsonl, e))?;
        self.append_line(&line).await?;

        state.step_count += 1;
        state.max_step_id = state.max_step_id.max(step.step_id);
        self.update_index(&state, TrajectoryStatus::InProgress, None)
            .await
    }

    /// Write the terminal index and refuse further writes.
    pub async fn close(
        &self,
        final_metrics: Option<FinalMetrics>,
        status: TrajectoryStatus,
    ) -> crate::Result<()> {
        let mut state = self.state.lock().await;
        if state.phase == WriterPhase::Closed {
            return Err(StoreError::WriterClosed(self.session_id.clone()));
        }
        self.update_index(&state, status, final_metrics).await?;
        state.phase = WriterPhase::Closed;
        debug!(session_id = %self.session_id, ?status, "closed streaming trajectory");
        Ok(())
    }

    /// Append a line to the JSONL log, recreating the date directory once if
    /// it vanished mid-run.
    async fn append_line(&self, line: &str) -> crate::Result<()> {
        let payload = format!("{line}\n");
        match append(&self.paths.jsonl, &payload).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(dir = %self.paths.dir.display(), "date directory missing, recreating");
                tokio::fs::create_dir_all(&self.paths.dir)
                    .await
                    .map_err(|e| StoreError::write(&self.paths.dir, e))?;
                append(&self.paths.jsonl, &payload)
                    .await
                    .map_err(|e| StoreError::write(&self.paths.jsonl, e))
            }
            Err(e) => Err(StoreError::write(&self.paths.jsonl, e)),
        }
    }

    /// Rewrite the index via a uniquely-named temp file.
    ///
    /// The temp name carries a timestamp and random suffix so concurrent
    /// updates on the same session can never race on a shared temp path.
    async fn update_index(
        &self,
        state: &WriterState,
        status: TrajectoryStatus,
        final_metrics: Option<FinalMetrics>,
    ) -> crate::Result<()> {
        let index = TrajectoryIndex {
            session_id: self.session_id.clone(),
            agent: self.agent.clone(),
            checkpoint: Checkpoint {
                step_id: state.max_step_id,
                timestamp: now_iso(),
                completed_step_count: state.step_count,
            },
            status,
            final_metrics,
            parent_session_id: self.parent_session_id.clone(),
        };
        let json = serde_json::to_string_pretty(&index)
            .map_err(|e| StoreError::parse(&self.paths.index, e))?;

        match write_atomic(&self.paths.dir, &self.paths.index, &json).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::create_dir_all(&self.paths.dir)
                    .await
                    .map_err(|e| StoreError::write(&self.paths.dir, e))?;
                write_atomic(&self.paths.dir, &self.paths.index, &json)
                    .await
                    .map_err(|e| StoreError::write(&self.paths.index, e))
            }
            Err(e) => Err(StoreError::write(&self.paths.index, e)),
        }
    }
}

async fn append(path: &Path, payload: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .await?;
    file.write_all(payload.as_bytes()).await?;
    file.flush().await
}

async fn write_atomic(dir: &Path, target: &Path, contents: &str) -> std::io::Result<()> {
    let unique = format!(
        "{}.{}.{}.tmp",
        target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index".to_string()),
        Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        &uuid::Uuid::new_v4().simple().to_string()[..8],
    );
    let tmp = dir.join(unique);
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, target).await
}

fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn writer(base: &Path) -> StreamWriter {
        StreamWriter::new(
            base,
            "session-2025-01-02T03-04-05-abc123",
            Agent::new("test-agent", "1.0.0"),
            None,
        )
    }

    async fn read_index(paths: &WriterPaths) -> TrajectoryIndex {
        let raw = tokio::fs::read_to_string(&paths.index).await.unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_writes_header_and_index() {
        let tmp = TempDir::new().unwrap();
        let w = writer(tmp.path());
        w.initialize().await.unwrap();

        let paths = w.paths();
        assert!(paths.dir.ends_with("20250102"));

        let log = tokio::fs::read_to_string(&paths.jsonl).await.unwrap();
        let first: serde_json::Value = serde_json::from_str(log.lines().next().unwrap()).unwrap();
        assert_eq!(first["__header__"], true);
        assert_eq!(first["schema_version"], atif::SCHEMA_VERSION);

        let index = read_index(&paths).await;
        assert_eq!(index.status, TrajectoryStatus::InProgress);
        assert_eq!(index.checkpoint.completed_step_count, 0);
    }

    #[tokio::test]
    async fn test_write_step_appends_and_checkpoints() {
        let tmp = TempDir::new().unwrap();
        let w = writer(tmp.path());
        w.initialize().await.unwrap();
        w.write_step(&Step::user(1, "first")).await.unwrap();
        w.write_step(&Step::agent(2, "second")).await.unwrap();

        let paths = w.paths();
        let log = tokio::fs::read_to_string(&paths.jsonl).await.unwrap();
        assert_eq!(log.lines().count(), 3);

        let index = read_index(&paths).await;
        assert_eq!(index.checkpoint.completed_step_count, 2);
        assert_eq!(index.checkpoint.step_id, 2);
    }

    #[tokio::test]
    async fn test_recovers_when_date_directory_deleted() {
        let tmp = TempDir::new().unwrap();
        let w = writer(tmp.path());
        w.initialize().await.unwrap();
        w.write_step(&Step::user(1, "first")).await.unwrap();

        tokio::fs::remove_dir_all(&w.paths().dir).await.unwrap();

        w.write_step(&Step::agent(2, "second")).await.unwrap();

        let index = read_index(&w.paths()).await;
        assert_eq!(index.checkpoint.completed_step_count, 2);
        assert_eq!(index.checkpoint.step_id, 2);
        assert_eq!(index.status, TrajectoryStatus::InProgress);
    }

    #[tokio::test]
    async fn test_close_then_write_fails() {
        let tmp = TempDir::new().unwrap();
        let w = writer(tmp.path());
        w.initialize().await.unwrap();
        w.write_step(&Step::user(1, "only")).await.unwrap();
        w.close(Some(FinalMetrics::default()), TrajectoryStatus::Complete)
            .await
            .unwrap();

        let err = w.write_step(&Step::agent(2, "late")).await.unwrap_err();
        assert!(matches!(err, StoreError::WriterClosed(_)));
        let err = w.initialize().await.unwrap_err();
        assert!(matches!(err, StoreError::WriterClosed(_)));

        let index = read_index(&w.paths()).await;
        assert_eq!(index.status, TrajectoryStatus::Complete);
        assert!(index.final_metrics.is_some());
    }

    #[tokio::test]
    async fn test_parallel_writes_serialize_on_one_writer() {
        let tmp = TempDir::new().unwrap();
        let w = Arc::new(writer(tmp.path()));
        w.initialize().await.unwrap();

        // Deliberately out of order; the checkpoint must still land on the max.
        let mut handles = Vec::new();
        for id in [2i64, 1, 3] {
            let w = Arc::clone(&w);
            handles.push(tokio::spawn(async move {
                w.write_step(&Step::user(id, format!("step {id}"))).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let paths = w.paths();
        let log = tokio::fs::read_to_string(&paths.jsonl).await.unwrap();
        assert_eq!(log.lines().count(), 4, "header plus three step lines");

        let index = read_index(&paths).await;
        assert_eq!(index.checkpoint.completed_step_count, 3);
        assert_eq!(index.checkpoint.step_id, 3);

        // Temp files must never survive a rename.
        let mut entries = tokio::fs::read_dir(&paths.dir).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name().to_string_lossy().into_owned();
            assert!(!name.ends_with(".tmp"), "leftover temp file: {name}");
        }
    }

    #[tokio::test]
    async fn test_two_writers_distinct_sessions_do_not_interfere() {
        let tmp = TempDir::new().unwrap();
        let a = Arc::new(StreamWriter::new(
            tmp.path(),
            "session-2025-01-02T03-04-05-aaaaaa",
            Agent::new("a", "1"),
            None,
        ));
        let b = Arc::new(StreamWriter::new(
            tmp.path(),
            "session-2025-01-02T03-04-05-bbbbbb",
            Agent::new("b", "1"),
            None,
        ));
        a.initialize().await.unwrap();
        b.initialize().await.unwrap();

        let step_a = Step::user(1, "to a");
        let step_b = Step::user(1, "to b");
        let (ra, rb) = tokio::join!(a.write_step(&step_a), b.write_step(&step_b));
        ra.unwrap();
        rb.unwrap();

        for w in [&a, &b] {
            let log = tokio::fs::read_to_string(&w.paths().jsonl).await.unwrap();
            assert_eq!(log.lines().count(), 2);
        }
    }

    #[tokio::test]
    async fn test_unparseable_session_id_falls_back_to_today() {
        let tmp = TempDir::new().unwrap();
        let w = StreamWriter::new(tmp.path(), "adhoc-session", Agent::new("a", "1"), None);
        let dir = w.paths().dir;
        assert!(dir.ends_with(atif::session::today_folder()));
    }
}
