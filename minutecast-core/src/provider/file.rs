use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};

use crate::model::ForecastSnapshot;

use super::{ForecastProvider, accuweather::MinuteCastResponse};

/// Serves a saved provider response, re-anchored at the time it is read.
#[derive(Debug, Clone)]
pub struct FileProvider {
    path: PathBuf,
}

impl FileProvider {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

#[async_trait]
impl ForecastProvider for FileProvider {
    async fn fetch(&self) -> Result<ForecastSnapshot> {
        let body = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read test data: {}", self.path.display()))?;

        let parsed = MinuteCastResponse::from_json(&body)
            .with_context(|| format!("Invalid test data in {}", self.path.display()))?;

        Ok(parsed.into_snapshot(Utc::now()))
    }

    fn is_live(&self) -> bool {
        false
    }
}
