use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::model::{ForecastSnapshot, Interval, Location};

use super::ForecastProvider;

const ACCUWEATHER_BASE: &str = "https://dataservice.accuweather.com";

#[derive(Debug, Clone)]
pub struct AccuWeatherProvider {
    api_key: String,
    location: Location,
    base_url: String,
    http: Client,
}

impl AccuWeatherProvider {
    pub fn new(api_key: String, location: Location) -> Result<Self> {
        Self::new_with_base_url(api_key, location, ACCUWEATHER_BASE)
    }

    pub fn new_with_base_url(api_key: String, location: Location, base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            api_key,
            location,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl ForecastProvider for AccuWeatherProvider {
    async fn fetch(&self) -> Result<ForecastSnapshot> {
        let url = format!("{}/forecasts/v1/minute", self.base_url);

        let res = self
            .http
            .get(&url)
            .query(&[("q", self.location.query().as_str()), ("apikey", self.api_key.as_str())])
            .send()
            .await
            .context("Failed to send request to AccuWeather (minute cast)")?;

        let status = res.status();
        let body = res.text().await.context("Failed to read AccuWeather response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "AccuWeather minute cast request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        debug!(body = %truncate_body(&body), "received live minute cast");

        let parsed = MinuteCastResponse::from_json(&body)?;
        Ok(parsed.into_snapshot(Utc::now()))
    }
}

/// MinuteCast response body as served by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MinuteCastResponse {
    pub summary: CastSummary,
    #[serde(default)]
    pub summaries: Vec<CastInterval>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub mobile_link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CastSummary {
    pub phrase: String,
    #[serde(rename = "Type")]
    pub kind: Option<String>,
    #[serde(rename = "TypeId", default)]
    pub type_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CastInterval {
    pub start_minute: i64,
    pub end_minute: i64,
    #[serde(default)]
    pub count_minute: i64,
    #[serde(default)]
    pub minute_text: String,
    #[serde(rename = "Type")]
    pub kind: Option<String>,
    #[serde(rename = "TypeId", default)]
    pub type_id: i64,
}

impl MinuteCastResponse {
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body).context("Failed to parse AccuWeather minute cast JSON")
    }

    /// Anchor the response at `fetched_at`; interval offsets are relative to it.
    pub fn into_snapshot(self, fetched_at: DateTime<Utc>) -> ForecastSnapshot {
        ForecastSnapshot {
            overall_kind: self.summary.kind,
            overall_phrase: self.summary.phrase,
            intervals: self
                .summaries
                .into_iter()
                .map(|s| Interval {
                    start_minute: s.start_minute,
                    end_minute: s.end_minute,
                    kind: s.kind,
                })
                .collect(),
            anchor_time: fetched_at,
        }
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
