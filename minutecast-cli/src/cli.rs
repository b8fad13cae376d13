use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use inquire::{CustomType, Password, PasswordDisplayMode};
use minutecast_core::{
    CastService, Config, ForecastSource, Location, Status, WeatherState,
    cache::SnapshotCache,
    derive, provider_from_config,
    publish::{JsonLinesPublisher, Topics},
};
use std::{path::PathBuf, sync::Arc};
use tracing::{debug, info, warn};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "minutecast", version, about = "Minute-by-minute rain indicator")]
pub struct Cli {
    /// Enable debug logging.
    #[arg(short = 'v', long, global = true)]
    pub debug: bool,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

/// Per-run overrides of the stored configuration.
#[derive(Debug, Args)]
pub struct Overrides {
    /// AccuWeather API token.
    #[arg(
        short = 't',
        long,
        global = true,
        env = "MINUTECAST_API_TOKEN",
        hide_env_values = true
    )]
    pub api_token: Option<String>,

    /// Latitude with up to 3 digit precision, e.g. 52.520.
    #[arg(
        short = 'x',
        long,
        global = true,
        env = "MINUTECAST_LATITUDE",
        allow_negative_numbers = true
    )]
    pub latitude: Option<f64>,

    /// Longitude with up to 3 digit precision, e.g. -120.223.
    #[arg(
        short = 'y',
        long,
        global = true,
        env = "MINUTECAST_LONGITUDE",
        allow_negative_numbers = true
    )]
    pub longitude: Option<f64>,

    /// Use a saved provider response instead of the live API.
    #[arg(short = 'd', long, global = true, env = "MINUTECAST_TEST_DATA")]
    pub test_data: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure API token and location.
    Configure,

    /// Show the current rain state once.
    Show {
        /// Evaluate at this RFC 3339 instant instead of now.
        #[arg(long)]
        at: Option<String>,

        /// Print the state as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Publish the rain state continuously until interrupted.
    Start,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Show { at, json } => {
                let config = self.overrides.apply(Config::load()?)?;
                show(&config, self.overrides.test_data, at.as_deref(), json).await
            }
            Command::Start => {
                let config = self.overrides.apply(Config::load()?)?;
                start(config, self.overrides.test_data).await
            }
        }
    }
}

impl Overrides {
    fn apply(&self, mut config: Config) -> Result<Config> {
        if let Some(token) = &self.api_token {
            config.api_token = Some(token.clone());
        }

        match (self.latitude, self.longitude, config.location) {
            (Some(lat), Some(lon), _) => config.location = Some(Location::new(lat, lon)?),
            (Some(lat), None, Some(loc)) => {
                config.location = Some(Location::new(lat, loc.longitude)?);
            }
            (None, Some(lon), Some(loc)) => {
                config.location = Some(Location::new(loc.latitude, lon)?);
            }
            (None, None, _) => {}
            _ => anyhow::bail!(
                "Both --latitude and --longitude are required when no location is configured."
            ),
        }

        Ok(config)
    }
}

fn configure() -> Result<()> {
    let mut config = Config::load()?;

    let token = Password::new("AccuWeather API token:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API token")?;

    let mut latitude = CustomType::<f64>::new("Latitude:")
        .with_error_message("Please enter a number, e.g. 52.520");
    let mut longitude = CustomType::<f64>::new("Longitude:")
        .with_error_message("Please enter a number, e.g. 13.405");
    if let Some(loc) = config.location {
        latitude = latitude.with_default(loc.latitude);
        longitude = longitude.with_default(loc.longitude);
    }

    let latitude = latitude.prompt().context("Failed to read latitude")?;
    let longitude = longitude.prompt().context("Failed to read longitude")?;

    if !token.trim().is_empty() {
        config.api_token = Some(token.trim().to_string());
    }
    config.location = Some(Location::new(latitude, longitude)?);
    config.save()?;

    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

async fn show(
    config: &Config,
    test_data: Option<PathBuf>,
    at: Option<&str>,
    json: bool,
) -> Result<()> {
    let now = match at {
        Some(s) => DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("Invalid --at timestamp '{s}', expected RFC 3339"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let snapshot = build_source(config, test_data)?.startup(Utc::now()).await?;
    let state = derive(&snapshot, now);
    debug!(?snapshot, "derived state from snapshot");

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        println!("{}", render(&state, snapshot.anchor_time, now));
    }

    Ok(())
}

async fn start(config: Config, test_data: Option<PathBuf>) -> Result<()> {
    let source = build_source(&config, test_data)?;
    let snapshot = source.startup(Utc::now()).await?;
    info!(anchor = %snapshot.anchor_time, phrase = %snapshot.overall_phrase, "forecast ready");

    let service = CastService::new(
        source,
        Arc::new(JsonLinesPublisher::new(std::io::stdout())),
        Topics::new(config.topic_prefix.clone()),
    )
    .with_intervals(config.refresh_interval(), config.publish_interval());

    service.register().await?;

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl-C");
        }
    };

    service.run(snapshot, shutdown).await
}

fn build_source(config: &Config, test_data: Option<PathBuf>) -> Result<ForecastSource> {
    let provider = provider_from_config(config, test_data.as_deref())?;
    let cache = SnapshotCache::new(config.resolved_cache_path()?);

    Ok(ForecastSource::new(provider, Some(cache)).with_max_age(config.refresh_interval()))
}

fn render(state: &WeatherState, anchor: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let mut out = format!("Weather:    {}\n", state.status);

    match state.status {
        Status::Rain => {
            out.push_str(&format!("Rain ends:  in {} min\n", state.rain_end_minutes));
        }
        Status::Soon => {
            out.push_str(&format!("Rain start: in {} min\n", state.rain_start_minutes));
            out.push_str(&format!("Rain ends:  in {} min\n", state.rain_end_minutes));
        }
        Status::Clear | Status::Unknown => {}
    }

    let age = (now - anchor).num_minutes().max(0);
    out.push_str(&format!("Message:    {}\n", state.message));
    out.push_str(&format!(
        "Forecast:   {} ({age} min old)",
        anchor.format("%Y-%m-%d %H:%M UTC")
    ));
    out
}
