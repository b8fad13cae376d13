//! On-disk copy of the last fetched forecast.
//!
//! Lets a restarted service keep publishing from a recent snapshot instead of
//! spending an API call on every start.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::model::ForecastSnapshot;

#[derive(Debug, Clone)]
pub struct SnapshotCache {
    path: PathBuf,
}

impl SnapshotCache {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached snapshot; `None` if nothing was stored yet.
    pub async fn load(&self) -> Result<Option<ForecastSnapshot>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("Failed to read cache file: {}", self.path.display())
                });
            }
        };

        let snapshot = serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse cache file: {}", self.path.display()))?;

        debug!(path = %self.path.display(), "loaded cached forecast");
        Ok(Some(snapshot))
    }

    /// Persist a snapshot, creating parent directories as needed.
    pub async fn store(&self, snapshot: &ForecastSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }

        let data =
            serde_json::to_vec_pretty(snapshot).context("Failed to serialize forecast snapshot")?;

        tokio::fs::write(&self.path, data)
            .await
            .with_context(|| format!("Failed to write cache file: {}", self.path.display()))?;

        Ok(())
    }
}

/// Whether a snapshot anchored at `anchor_time` is younger than `max_age` at `now`.
pub fn is_fresh(snapshot: &ForecastSnapshot, now: DateTime<Utc>, max_age: Duration) -> bool {
    now - snapshot.anchor_time < max_age
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Interval;

    fn snapshot(anchor_time: DateTime<Utc>) -> ForecastSnapshot {
        ForecastSnapshot {
            overall_kind: Some("RAIN".into()),
            overall_phrase: "Light rain for 20 min".into(),
            intervals: vec![Interval::new(0, 20, Some("RAIN"))],
            anchor_time,
        }
    }

    #[tokio::test]
    async fn load_returns_none_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path().join("last_update.json"));
        assert!(cache.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path().join("sub").join("last_update.json"));
        let snap = snapshot(Utc::now());

        cache.store(&snap).await.unwrap();
        assert_eq!(cache.load().await.unwrap(), Some(snap));
    }

    #[tokio::test]
    async fn corrupt_cache_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last_update.json");
        std::fs::write(&path, b"not json").unwrap();

        let err = SnapshotCache::new(&path).load().await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse cache file"));
    }

    #[test]
    fn freshness_uses_anchor_age() {
        let now = Utc::now();
        let max_age = Duration::minutes(80);
        assert!(is_fresh(&snapshot(now - Duration::minutes(79)), now, max_age));
        assert!(!is_fresh(&snapshot(now - Duration::minutes(80)), now, max_age));
    }
}
