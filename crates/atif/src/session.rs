//! Session ID generation and date-folder derivation.
//!
//! Session IDs look like `session-2025-10-16T14-30-00-a1b2c3d4`. The first
//! ten characters after the `session-` prefix encode the date, which decides
//! the on-disk date folder (`YYYYMMDD`).

use chrono::Utc;

/// Generate a fresh session ID: `session-YYYY-MM-DDTHH-MM-SS-<rand>`.
///
/// The random suffix is the first 8 hex chars of a v4 UUID, which satisfies
/// the ≥ 6 char requirement consumers rely on for uniqueness.
pub fn generate_session_id() -> String {
    let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S");
    let random = &uuid::Uuid::new_v4().simple().to_string()[..8];
    format!("session-{timestamp}-{random}")
}

/// Derive the `YYYYMMDD` date folder for a session ID.
///
/// Takes the first ten chars after `session-` with dashes removed. Returns
/// `None` when the ID does not carry a parseable date prefix; callers fall
/// back to the current date.
pub fn date_folder_for_session(session_id: &str) -> Option<String> {
    let rest = session_id.strip_prefix("session-")?;
    if rest.len() < 10 {
        return None;
    }
    let date_part = &rest[..10];
    let compact: String = date_part.chars().filter(|c| *c != '-').collect();
    if compact.len() == 8 && compact.chars().all(|c| c.is_ascii_digit()) {
        Some(compact)
    } else {
        None
    }
}

/// Current date as a `YYYYMMDD` folder name.
pub fn today_folder() -> String {
    Utc::now().format("%Y%m%d").to_string()
}
