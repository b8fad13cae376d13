use crate::{
    Config, ForecastSnapshot,
    provider::{accuweather::AccuWeatherProvider, file::FileProvider},
};
use async_trait::async_trait;
use std::{fmt::Debug, path::Path};

pub mod accuweather;
pub mod file;

/// Source of forecast snapshots.
///
/// Each call produces a new snapshot anchored to the moment it was obtained.
#[async_trait]
pub trait ForecastProvider: Send + Sync + Debug {
    async fn fetch(&self) -> anyhow::Result<ForecastSnapshot>;

    /// Whether repeated fetches can return newer data.
    fn is_live(&self) -> bool {
        true
    }
}

/// Construct a provider from config, or a file-backed one when `test_data` is set.
pub fn provider_from_config(
    config: &Config,
    test_data: Option<&Path>,
) -> anyhow::Result<Box<dyn ForecastProvider>> {
    if let Some(path) = test_data {
        return Ok(Box::new(FileProvider::new(path)));
    }

    let token = config.api_token()?;
    let location = config.location()?;
    let provider = AccuWeatherProvider::new(token.to_owned(), location)?;

    Ok(Box::new(provider))
}
