//! Archive lifecycle reaper.
//!
//! Finished archives are handed off for download and then become garbage.
//! This loop deletes zip files older than a TTL from the output directory
//! while the server is running. Cadence and TTL are env-tunable.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Notify;

const DEFAULT_TTL_SECS: u64 = 1800;
const DEFAULT_TICK_SECS: u64 = 300;

/// Spawn the reaper until shutdown is signaled.
pub fn spawn(out_dir: PathBuf, shutdown: Arc<Notify>) -> tokio::task::JoinHandle<()> {
    let ttl = Duration::from_secs(read_env_u64("SITEPACK_REAP_TTL_SECS", DEFAULT_TTL_SECS));
    let tick = Duration::from_secs(read_env_u64("SITEPACK_REAP_TICK_SECS", DEFAULT_TICK_SECS).max(1));
    tokio::spawn(async move {
        tracing::info!(
            "archive reaper started: dir={} ttl={}s tick={}s",
            out_dir.display(),
            ttl.as_secs(),
            tick.as_secs()
        );
        let mut ticker = tokio::time::interval(tick);
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    tracing::info!("archive reaper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = reap_once(&out_dir, ttl);
                    if removed > 0 {
                        tracing::info!("archive reaper removed {removed} expired archive(s)");
                    }
                }
            }
        }
    })
}

/// Delete expired zip files from the directory, returning how many went.
pub fn reap_once(dir: &Path, ttl: Duration) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return 0,
    };
    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("zip") {
            continue;
        }
        let expired = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .map(|age| age >= ttl)
            .unwrap_or(false);
        if !expired {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!("failed to remove expired archive {}: {e}", path.display()),
        }
    }
    removed
}

fn read_env_u64(name: &str, default_value: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default_value)
}
