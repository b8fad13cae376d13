//! Core library for the `minutecast` rain indicator.
//!
//! This crate defines:
//! - The forecast-to-state derivation engine
//! - Forecast snapshot and weather state models
//! - Configuration & credentials handling
//! - Forecast providers, the on-disk snapshot cache and state publishing
//!
//! It is used by `minutecast-cli`, but can also be reused by other binaries or services.

pub mod cache;
pub mod config;
pub mod engine;
pub mod model;
pub mod provider;
pub mod publish;
pub mod service;
pub mod source;

pub use config::Config;
pub use engine::derive;
pub use model::{ForecastSnapshot, Interval, Location, LocationError, Status, WeatherState};
pub use provider::{ForecastProvider, provider_from_config};
pub use service::CastService;
pub use source::ForecastSource;
