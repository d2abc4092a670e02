//! Lock-guarded bridge auto-start.
//!
//! The bridge is a process-wide singleton. When it is down, the first caller
//! to acquire `<tmp>/fm-bridge.lock` spawns it and polls `/health` until it
//! reports running; everyone else sees the lock and waits for the same
//! instance. Lock files older than 60 seconds are treated as leftovers from
//! a dead process and replaced.

use std::path::PathBuf;
use std::time::Duration;

use llm::LlmError;
use tracing::{debug, info, warn};

use crate::client::FmBridgeClient;

const LOCK_STALE_AFTER: Duration = Duration::from_secs(60);
const DEFAULT_BRIDGE_PATH: &str = "/usr/local/bin/fm-bridge";

/// Startup knobs; the defaults give 10 polls at 500 ms within a 10 s budget.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub bridge_path: Option<PathBuf>,
    pub startup_timeout: Duration,
    pub poll_interval: Duration,
    pub max_polls: u32,
    pub lock_path: PathBuf,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            bridge_path: None,
            startup_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            max_polls: 10,
            lock_path: std::env::temp_dir().join("fm-bridge.lock"),
        }
    }
}

impl LaunchConfig {
    fn resolve_bridge_path(&self) -> PathBuf {
        self.bridge_path
            .clone()
            .or_else(|| std::env::var("FM_BRIDGE_PATH").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BRIDGE_PATH))
    }
}

/// Spawns and supervises startup of the local bridge.
pub struct BridgeLauncher {
    config: LaunchConfig,
}

impl BridgeLauncher {
    pub fn new(config: LaunchConfig) -> Self {
        Self { config }
    }

    /// Make sure a bridge is answering health checks, starting one if needed.
    pub async fn ensure_running(&self, client: &FmBridgeClient) -> crate::Result<()> {
        if let Ok(health) = client.health().await {
            if health.is_running() {
                return Ok(());
            }
        }

        let _lock = self.acquire_lock()?;
        // Someone else may have won the race while we waited on the lock.
        if let Ok(health) = client.health().await {
            if health.is_running() {
                return Ok(());
            }
        }

        self.spawn_bridge()?;
        self.poll_until_healthy(client).await
    }

    fn acquire_lock(&self) -> crate::Result<LockGuard> {
        let path = &self.config.lock_path;

        if let Ok(contents) = std::fs::read_to_string(path) {
            if let Some(age) = lock_age(&contents) {
                if age < LOCK_STALE_AFTER {
                    debug!(path = %path.display(), ?age, "bridge lock held elsewhere");
                } else {
                    warn!(path = %path.display(), ?age, "removing stale bridge lock");
                    let _ = std::fs::remove_file(path);
                }
            } else {
                warn!(path = %path.display(), "removing unreadable bridge lock");
                let _ = std::fs::remove_file(path);
            }
        }

        let contents = format!("{} {}", chrono::Utc::now().timestamp_millis(), std::process::id());
        std::fs::write(path, contents)
            .map_err(|e| LlmError::request_failed(None, format!("cannot write bridge lock: {e}")))?;
        Ok(LockGuard { path: path.clone() })
    }

    fn spawn_bridge(&self) -> crate::Result<()> {
        if !cfg!(target_os = "macos") && std::env::var("FM_BRIDGE_PATH").is_err() {
            return Err(LlmError::NotMacos);
        }

        let bridge = self.config.resolve_bridge_path();
        if !bridge.exists() {
            return Err(LlmError::BridgeNotFound(bridge.display().to_string()));
        }

        info!(path = %bridge.display(), "spawning fm bridge");
        std::process::Command::new(&bridge)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| {
                LlmError::request_failed(None, format!("failed to spawn bridge: {e}"))
            })?;
        Ok(())
    }

    async fn poll_until_healthy(&self, client: &FmBridgeClient) -> crate::Result<()> {
        let deadline = tokio::time::Instant::now() + self.config.startup_timeout;
        for attempt in 0..self.config.max_polls {
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(self.config.poll_interval).await;
            match client.health().await {
                Ok(health) if health.is_running() => {
                    info!(attempt, "fm bridge is up");
                    return Ok(());
                }
                Ok(_) => debug!(attempt, "bridge answered but not running yet"),
                Err(_) => debug!(attempt, "bridge not answering yet"),
            }
        }
        Err(LlmError::Timeout(self.config.startup_timeout))
    }
}

/// Deletes the lock file on drop, success or failure alike.
struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Age of a lock file given its `"<timestamp_ms> <pid>"` contents.
fn lock_age(contents: &str) -> Option<Duration> {
    let timestamp_ms: i64 = contents.split_whitespace().next()?.parse().ok()?;
    let age_ms = chrono::Utc::now().timestamp_millis() - timestamp_ms;
    if age_ms < 0 {
        return Some(Duration::ZERO);
    }
    Some(Duration::from_millis(age_ms as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_age_parsing() {
        let fresh = format!("{} 1234", chrono::Utc::now().timestamp_millis());
        assert!(lock_age(&fresh).unwrap() < Duration::from_secs(1));

        let stale = format!("{} 1234", chrono::Utc::now().timestamp_millis() - 120_000);
        assert!(lock_age(&stale).unwrap() > LOCK_STALE_AFTER);

        assert!(lock_age("garbage").is_none());
        assert!(lock_age("").is_none());
    }

    #[test]
    fn test_stale_lock_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join("fm-bridge.lock");
        std::fs::write(&lock_path, "1000 999999").unwrap();

        let launcher = BridgeLauncher::new(LaunchConfig {
            lock_path: lock_path.clone(),
            ..Default::default()
        });
        let guard = launcher.acquire_lock().unwrap();

        let contents = std::fs::read_to_string(&lock_path).unwrap();
        let pid: u32 = contents.split_whitespace().nth(1).unwrap().parse().unwrap();
        assert_eq!(pid, std::process::id());

        drop(guard);
        assert!(!lock_path.exists(), "lock released on drop");
    }

    #[tokio::test]
    async fn test_spawn_fails_without_bridge_binary() {
        let tmp = TempDir::new().unwrap();
        let launcher = BridgeLauncher::new(LaunchConfig {
            bridge_path: Some(tmp.path().join("missing-bridge")),
            lock_path: tmp.path().join("fm-bridge.lock"),
            ..Default::default()
        });

        let err = launcher.spawn_bridge().unwrap_err();
        assert!(matches!(
            err,
            LlmError::BridgeNotFound(_) | LlmError::NotMacos
        ));
    }
}
