//! Declared input schemas for the travel tools.
//!
//! [`ToolRequest`] is the typed view of a step's arguments. The planner and
//! the repair strategy build arguments through it; tools validate incoming
//! [`StepArgs`] against it before any attempt is made.

use crate::errors::ToolError;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use voyage_common::StepArgs;

pub const FLIGHTS: &str = "flights";
pub const LODGING: &str = "lodging";
pub const EVENTS: &str = "events";
pub const WEATHER: &str = "weather";
pub const TRANSIT: &str = "transit";
pub const KNOWLEDGE: &str = "knowledge";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightSearch {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_date: Option<NaiveDate>,
    #[serde(default = "default_passengers")]
    pub passengers: u32,
    #[serde(default = "default_cabin")]
    pub class_preference: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub avoid_overnight: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LodgingSearch {
    pub destination: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[serde(default = "default_guests")]
    pub guests: u32,
    #[serde(default = "default_rooms")]
    pub rooms: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price_per_night: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amenities: Vec<String>,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSearch {
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid_friendly: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    #[serde(default = "default_event_results")]
    pub max_results: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherForecast {
    pub latitude: f64,
    pub longitude: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub include_hourly: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitRoute {
    pub origin: String,
    pub destination: String,
    #[serde(default = "default_transit_mode")]
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSearch {
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_similarity")]
    pub similarity_threshold: f64,
}

fn default_passengers() -> u32 {
    1
}

fn default_guests() -> u32 {
    2
}

fn default_rooms() -> u32 {
    1
}

fn default_cabin() -> String {
    "economy".to_string()
}

fn default_max_results() -> u32 {
    5
}

fn default_event_results() -> u32 {
    10
}

fn default_transit_mode() -> String {
    "mixed".to_string()
}

fn default_similarity() -> f64 {
    0.7
}

/// Typed arguments for one of the known tools.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    Flights(FlightSearch),
    Lodging(LodgingSearch),
    Events(EventSearch),
    Weather(WeatherForecast),
    Transit(TransitRoute),
    Knowledge(KnowledgeSearch),
}

fn decode<T: DeserializeOwned>(args: &StepArgs) -> Result<T, ToolError> {
    serde_json::from_value(args.to_value()).map_err(|e| ToolError::InvalidInput(e.to_string()))
}

fn in_range(field: &str, value: u32, min: u32, max: u32) -> Result<(), ToolError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ToolError::InvalidInput(format!(
            "{} must be between {} and {}, got {}",
            field, min, max, value
        )))
    }
}

fn non_negative(field: &str, value: Option<f64>) -> Result<(), ToolError> {
    match value {
        Some(v) if v < 0.0 || !v.is_finite() => Err(ToolError::InvalidInput(format!(
            "{} must be a non-negative number, got {}",
            field, v
        ))),
        _ => Ok(()),
    }
}

fn ordered(start_field: &str, start: NaiveDate, end_field: &str, end: NaiveDate) -> Result<(), ToolError> {
    if end < start {
        return Err(ToolError::InvalidInput(format!(
            "{} ({}) is before {} ({})",
            end_field, end, start_field, start
        )));
    }
    Ok(())
}

impl ToolRequest {
    /// Decode and check arguments for `tool_name`.
    pub fn parse(tool_name: &str, args: &StepArgs) -> Result<Self, ToolError> {
        let request = match tool_name {
            FLIGHTS => Self::Flights(decode(args)?),
            LODGING => Self::Lodging(decode(args)?),
            EVENTS => Self::Events(decode(args)?),
            WEATHER => Self::Weather(decode(args)?),
            TRANSIT => Self::Transit(decode(args)?),
            KNOWLEDGE => Self::Knowledge(decode(args)?),
            other => return Err(ToolError::UnknownTool(other.to_string())),
        };
        request.check()?;
        Ok(request)
    }

    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::Flights(_) => FLIGHTS,
            Self::Lodging(_) => LODGING,
            Self::Events(_) => EVENTS,
            Self::Weather(_) => WEATHER,
            Self::Transit(_) => TRANSIT,
            Self::Knowledge(_) => KNOWLEDGE,
        }
    }

    /// Value constraints serde cannot express.
    fn check(&self) -> Result<(), ToolError> {
        match self {
            Self::Flights(f) => {
                in_range("passengers", f.passengers, 1, 9)?;
                in_range("max_results", f.max_results, 1, 20)?;
                non_negative("max_price", f.max_price)?;
                if !matches!(f.class_preference.as_str(), "economy" | "business" | "first") {
                    return Err(ToolError::InvalidInput(format!(
                        "class_preference must be economy, business or first, got '{}'",
                        f.class_preference
                    )));
                }
                if let Some(ret) = f.return_date {
                    ordered("departure_date", f.departure_date, "return_date", ret)?;
                }
                Ok(())
            }
            Self::Lodging(l) => {
                in_range("guests", l.guests, 1, 10)?;
                in_range("rooms", l.rooms, 1, 5)?;
                in_range("max_results", l.max_results, 1, 20)?;
                non_negative("max_price_per_night", l.max_price_per_night)?;
                if l.check_out <= l.check_in {
                    return Err(ToolError::InvalidInput(format!(
                        "check_out ({}) must be after check_in ({})",
                        l.check_out, l.check_in
                    )));
                }
                Ok(())
            }
            Self::Events(e) => {
                in_range("max_results", e.max_results, 1, 50)?;
                non_negative("max_price", e.max_price)?;
                ordered("start_date", e.start_date, "end_date", e.end_date)
            }
            Self::Weather(w) => {
                if !(-90.0..=90.0).contains(&w.latitude) {
                    return Err(ToolError::InvalidInput(format!(
                        "latitude must be within [-90, 90], got {}",
                        w.latitude
                    )));
                }
                if !(-180.0..=180.0).contains(&w.longitude) {
                    return Err(ToolError::InvalidInput(format!(
                        "longitude must be within [-180, 180], got {}",
                        w.longitude
                    )));
                }
                ordered("start_date", w.start_date, "end_date", w.end_date)
            }
            Self::Transit(t) => {
                if !matches!(t.mode.as_str(), "walk" | "public" | "taxi" | "mixed") {
                    return Err(ToolError::InvalidInput(format!(
                        "mode must be walk, public, taxi or mixed, got '{}'",
                        t.mode
                    )));
                }
                Ok(())
            }
            Self::Knowledge(k) => {
                in_range("max_results", k.max_results, 1, 20)?;
                if !(0.0..=1.0).contains(&k.similarity_threshold) {
                    return Err(ToolError::InvalidInput(format!(
                        "similarity_threshold must be within [0, 1], got {}",
                        k.similarity_threshold
                    )));
                }
                if k.query.trim().is_empty() {
                    return Err(ToolError::InvalidInput("query must not be empty".to_string()));
                }
                Ok(())
            }
        }
    }

    /// Serialize back into step arguments.
    pub fn into_args(self) -> StepArgs {
        let value = match self {
            Self::Flights(r) => serde_json::to_value(r),
            Self::Lodging(r) => serde_json::to_value(r),
            Self::Events(r) => serde_json::to_value(r),
            Self::Weather(r) => serde_json::to_value(r),
            Self::Transit(r) => serde_json::to_value(r),
            Self::Knowledge(r) => serde_json::to_value(r),
        };
        value
            .ok()
            .and_then(|v| StepArgs::from_value(v).ok())
            .unwrap_or_default()
    }
}

/// Validate `args` for `tool_name`; tools without a declared schema accept anything.
pub fn validate_args(tool_name: &str, args: &StepArgs) -> Result<(), ToolError> {
    match ToolRequest::parse(tool_name, args) {
        Ok(_) | Err(ToolError::UnknownTool(_)) => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn flight_args() -> StepArgs {
        StepArgs::new()
            .with("origin", "SFO")
            .with("destination", "NRT")
            .with("departure_date", "2025-04-01")
    }

    #[test]
    fn test_parse_applies_defaults() {
        let request = ToolRequest::parse(FLIGHTS, &flight_args()).unwrap();
        match request {
            ToolRequest::Flights(f) => {
                assert_eq!(f.passengers, 1);
                assert_eq!(f.class_preference, "economy");
                assert_eq!(f.max_results, 5);
                assert!(!f.avoid_overnight);
                assert_eq!(f.departure_date, date("2025-04-01"));
            }
            other => panic!("Expected flights request, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_field_is_invalid_input() {
        let args = StepArgs::new().with("origin", "SFO");
        let err = ToolRequest::parse(FLIGHTS, &args).unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
        assert!(err.to_string().contains("destination"));
    }

    #[test]
    fn test_range_checks() {
        let args = flight_args().with("passengers", 12);
        let err = ToolRequest::parse(FLIGHTS, &args).unwrap_err();
        assert!(err.to_string().contains("passengers"));

        let lodging = StepArgs::new()
            .with("destination", "Tokyo")
            .with("check_in", "2025-04-05")
            .with("check_out", "2025-04-01");
        assert!(ToolRequest::parse(LODGING, &lodging).is_err());
    }

    #[test]
    fn test_unknown_tool_passes_generic_validation() {
        assert!(matches!(
            ToolRequest::parse("currency", &StepArgs::new()),
            Err(ToolError::UnknownTool(_))
        ));
        assert!(validate_args("currency", &StepArgs::new()).is_ok());
        assert!(validate_args(WEATHER, &StepArgs::new()).is_err());
    }

    #[test]
    fn test_into_args_omits_unset_options() {
        let args = ToolRequest::Events(EventSearch {
            destination: "Tokyo".into(),
            start_date: date("2025-04-01"),
            end_date: date("2025-04-05"),
            categories: vec!["museum".into()],
            kid_friendly: None,
            max_price: None,
            max_results: 10,
        })
        .into_args();

        assert_eq!(args.get_str("destination"), Some("Tokyo"));
        assert_eq!(args.get_str("start_date"), Some("2025-04-01"));
        assert!(args.get("kid_friendly").is_none());
        assert!(ToolRequest::parse(EVENTS, &args).is_ok());
    }
}
