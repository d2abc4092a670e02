//! Reconstruct trajectories from streamed JSONL logs.

use std::path::Path;

use atif::{Agent, Step, Trajectory};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;

/// First line of every streamed log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonlHeader {
    #[serde(rename = "__header__")]
    pub header: bool,
    pub schema_version: String,
    pub session_id: String,
    pub agent: Agent,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_session_id: Option<String>,
}

/// Read a streamed `.atif.jsonl` log back into a [`Trajectory`].
///
/// A process crash can leave a trailing unterminated line; it is skipped with
/// a warning rather than failing the whole read. Interior lines that fail to
/// parse are an error.
pub fn read_jsonl(path: impl AsRef<Path>) -> crate::Result<Trajectory> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(path.display().to_string())
        } else {
            StoreError::write(path, e)
        }
    })?;

    let terminated = raw.ends_with('\n');
    let lines: Vec<&str> = raw.lines().collect();
    if lines.is_empty() {
        return Err(StoreError::parse(
            path,
            serde_json::from_str::<JsonlHeader>("").unwrap_err(),
        ));
    }

    let header: JsonlHeader =
        serde_json::from_str(lines[0]).map_err(|e| StoreError::parse(path, e))?;

    let mut trajectory = Trajectory {
        schema_version: header.schema_version,
        session_id: header.session_id,
        agent: header.agent,
        parent_session_id: header.parent_session_id,
        created_at: Some(header.created_at),
        steps: Vec::new(),
        notes: None,
        final_metrics: None,
        extra: None,
    };

    let last = lines.len() - 1;
    for (i, line) in lines.iter().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Step>(line) {
            Ok(step) => trajectory.steps.push(step),
            Err(e) if i == last && !terminated => {
                warn!(path = %path.display(), "skipping trailing partial line");
                let _ = e;
            }
            Err(e) => return Err(StoreError::parse(path, e)),
        }
    }

    Ok(trajectory)
}
