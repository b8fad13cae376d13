//! Where snapshots come from: the provider, backed by the on-disk cache.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    cache::{SnapshotCache, is_fresh},
    model::ForecastSnapshot,
    provider::ForecastProvider,
};

/// A provider plus an optional cache. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ForecastSource {
    provider: Arc<dyn ForecastProvider>,
    cache: Option<SnapshotCache>,
    max_age: Duration,
}

impl ForecastSource {
    pub fn new(provider: Box<dyn ForecastProvider>, cache: Option<SnapshotCache>) -> Self {
        Self { provider: Arc::from(provider), cache, max_age: Duration::from_secs(80 * 60) }
    }

    /// How old a cached snapshot may be and still be used at startup.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn is_live(&self) -> bool {
        self.provider.is_live()
    }

    /// Obtain the initial snapshot: a fresh cached one, else a new fetch.
    ///
    /// A failed fetch falls back to a stale cached snapshot when there is one.
    pub async fn startup(&self, now: DateTime<Utc>) -> Result<ForecastSnapshot> {
        let cached = match &self.cache {
            Some(cache) => cache.load().await.unwrap_or_else(|err| {
                warn!(error = %err, "ignoring unreadable forecast cache");
                None
            }),
            None => None,
        };

        if let Some(snapshot) = &cached {
            let max_age = chrono::Duration::from_std(self.max_age)
                .unwrap_or_else(|_| chrono::Duration::minutes(80));
            if self.is_live() && is_fresh(snapshot, now, max_age) {
                info!(anchor = %snapshot.anchor_time, "using cached forecast");
                return Ok(snapshot.clone());
            }
        }

        match self.refresh().await {
            Ok(snapshot) => Ok(snapshot),
            Err(err) => match cached {
                Some(stale) => {
                    warn!(
                        error = %err,
                        anchor = %stale.anchor_time,
                        "fetch failed, using stale cache"
                    );
                    Ok(stale)
                }
                None => Err(err.context("No forecast available")),
            },
        }
    }

    /// Fetch a new snapshot and persist it when a cache is configured.
    pub async fn refresh(&self) -> Result<ForecastSnapshot> {
        let snapshot = self.provider.fetch().await?;
        debug!(
            kind = ?snapshot.overall_kind,
            intervals = snapshot.intervals.len(),
            "fetched forecast"
        );

        if let Some(cache) = self.cache.as_ref().filter(|_| self.is_live()) {
            if let Err(err) = cache.store(&snapshot).await {
                warn!(error = %err, path = %cache.path().display(), "failed to cache forecast");
            }
        }

        Ok(snapshot)
    }
}
