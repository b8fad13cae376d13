use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Precipitation marker used by the provider for rain segments.
pub const RAIN_KIND: &str = "RAIN";

/// One minute-bounded segment of a forecast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start_minute: i64,
    pub end_minute: i64,
    /// `Some` marks precipitation, `None` clear conditions.
    pub kind: Option<String>,
}

impl Interval {
    pub fn new(start_minute: i64, end_minute: i64, kind: Option<&str>) -> Self {
        Self { start_minute, end_minute, kind: kind.map(str::to_owned) }
    }

    pub fn is_precipitation(&self) -> bool {
        self.kind.is_some()
    }
}

/// A fetched forecast, anchored to the instant it was retrieved.
///
/// Interval offsets are minutes relative to `anchor_time` and are expected in
/// ascending `start_minute` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastSnapshot {
    pub overall_kind: Option<String>,
    pub overall_phrase: String,
    pub intervals: Vec<Interval>,
    pub anchor_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Clear,
    Soon,
    Rain,
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Clear => "CLEAR",
            Status::Soon => "SOON",
            Status::Rain => "RAIN",
            Status::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-facing rain state, recomputed on every tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherState {
    #[serde(rename = "weather")]
    pub status: Status,
    #[serde(rename = "rain_start")]
    pub rain_start_minutes: u32,
    #[serde(rename = "rain_end")]
    pub rain_end_minutes: u32,
    pub message: String,
}

impl WeatherState {
    pub(crate) fn idle(status: Status, message: impl Into<String>) -> Self {
        Self { status, rain_start_minutes: 0, rain_end_minutes: 0, message: message.into() }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LocationError {
    #[error("expected \"<latitude>,<longitude>\", got '{0}'")]
    Format(String),
    #[error("invalid number '{0}'")]
    Number(String),
    #[error("latitude {0} is outside -90..=90")]
    Latitude(f64),
    #[error("longitude {0} is outside -180..=180")]
    Longitude(f64),
}

/// Geographic position the forecast is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, LocationError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(LocationError::Latitude(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(LocationError::Longitude(longitude));
        }
        Ok(Self { latitude, longitude })
    }

    /// Query string the provider expects: three decimal places each.
    pub fn query(&self) -> String {
        format!("{:.3},{:.3}", self.latitude, self.longitude)
    }
}

impl FromStr for Location {
    type Err = LocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s.split_once(',').ok_or_else(|| LocationError::Format(s.to_string()))?;
        let parse = |v: &str| {
            v.trim().parse::<f64>().map_err(|_| LocationError::Number(v.trim().to_string()))
        };
        Location::new(parse(lat)?, parse(lon)?)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.query())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_serializes_with_wire_field_names() {
        let state = WeatherState {
            status: Status::Soon,
            rain_start_minutes: 4,
            rain_end_minutes: 19,
            message: "Rain starting in 4 min".into(),
        };

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "weather": "SOON",
                "rain_start": 4,
                "rain_end": 19,
                "message": "Rain starting in 4 min",
            })
        );
    }

    #[test]
    fn unknown_status_literal() {
        assert_eq!(serde_json::to_string(&Status::Unknown).unwrap(), "\"UNKNOWN\"");
        assert_eq!(Status::Unknown.to_string(), "UNKNOWN");
    }

    #[test]
    fn location_query_uses_three_decimals() {
        let loc = Location::new(52.52, -120.2234).unwrap();
        assert_eq!(loc.query(), "52.520,-120.223");
    }

    #[test]
    fn location_parses_pair() {
        let loc: Location = " 48.137 , 11.575".parse().unwrap();
        assert_eq!(loc, Location { latitude: 48.137, longitude: 11.575 });
    }

    #[test]
    fn location_rejects_bad_input() {
        assert_eq!("48.1".parse::<Location>(), Err(LocationError::Format("48.1".into())));
        assert_eq!("abc,1".parse::<Location>(), Err(LocationError::Number("abc".into())));
        assert_eq!("91,0".parse::<Location>(), Err(LocationError::Latitude(91.0)));
        assert_eq!("0,-181".parse::<Location>(), Err(LocationError::Longitude(-181.0)));
    }

    #[test]
    fn interval_precipitation_marker_is_presence() {
        assert!(Interval::new(0, 5, Some("SNOW")).is_precipitation());
        assert!(!Interval::new(0, 5, None).is_precipitation());
    }
}
