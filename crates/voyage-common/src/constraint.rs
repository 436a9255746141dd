//! Typed trip constraints and the per-run constraint store.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix used by the extraction collaborator for the destination preference.
const DESTINATION_PREFIX: &str = "destination:";

/// The category of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Budget,
    Dates,
    Airports,
    Preference,
    Weather,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintKind::Budget => write!(f, "budget"),
            ConstraintKind::Dates => write!(f, "dates"),
            ConstraintKind::Airports => write!(f, "airports"),
            ConstraintKind::Preference => write!(f, "preference"),
            ConstraintKind::Weather => write!(f, "weather"),
        }
    }
}

/// Payload of a constraint, one variant per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintValue {
    /// Spending ceiling for the whole trip.
    Budget {
        limit: f64,
        #[serde(default = "default_currency")]
        currency: String,
    },
    /// Travel window, inclusive on both ends.
    Dates { start: NaiveDate, end: NaiveDate },
    /// Candidate departure airports and the arrival airport.
    Airports {
        origins: Vec<String>,
        destination: String,
    },
    /// Free-text preference ("kid-friendly", "Avoid overnight flights", ...)
    Preference { text: String },
    /// Location whose forecast matters for the itinerary.
    Weather { latitude: f64, longitude: f64 },
}

fn default_currency() -> String {
    "USD".to_string()
}

impl ConstraintValue {
    /// The kind implied by this payload.
    pub fn kind(&self) -> ConstraintKind {
        match self {
            ConstraintValue::Budget { .. } => ConstraintKind::Budget,
            ConstraintValue::Dates { .. } => ConstraintKind::Dates,
            ConstraintValue::Airports { .. } => ConstraintKind::Airports,
            ConstraintValue::Preference { .. } => ConstraintKind::Preference,
            ConstraintValue::Weather { .. } => ConstraintKind::Weather,
        }
    }
}

/// A single hard or soft constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    #[serde(flatten)]
    pub value: ConstraintValue,
    /// Hard constraints must hold; soft ones are preferences.
    #[serde(default = "default_is_hard")]
    pub is_hard: bool,
}

fn default_is_hard() -> bool {
    true
}

impl Constraint {
    pub fn hard(value: ConstraintValue) -> Self {
        Self {
            value,
            is_hard: true,
        }
    }

    pub fn soft(value: ConstraintValue) -> Self {
        Self {
            value,
            is_hard: false,
        }
    }

    pub fn budget(limit: f64) -> Self {
        Self::hard(ConstraintValue::Budget {
            limit,
            currency: default_currency(),
        })
    }

    pub fn dates(start: NaiveDate, end: NaiveDate) -> Self {
        Self::hard(ConstraintValue::Dates { start, end })
    }

    pub fn airports(origins: &[&str], destination: &str) -> Self {
        Self::hard(ConstraintValue::Airports {
            origins: origins.iter().map(|o| o.to_string()).collect(),
            destination: destination.to_string(),
        })
    }

    pub fn preference(text: &str) -> Self {
        Self::soft(ConstraintValue::Preference {
            text: text.to_string(),
        })
    }

    pub fn weather(latitude: f64, longitude: f64) -> Self {
        Self::soft(ConstraintValue::Weather {
            latitude,
            longitude,
        })
    }

    pub fn kind(&self) -> ConstraintKind {
        self.value.kind()
    }
}

/// Read-only list of constraints for one run, with typed lookups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintSet {
    constraints: Vec<Constraint>,
}

impl ConstraintSet {
    pub fn new(constraints: Vec<Constraint>) -> Self {
        Self { constraints }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Limit of the first hard budget constraint, with its currency.
    pub fn budget_limit(&self) -> Option<(f64, &str)> {
        self.constraints.iter().find_map(|c| match &c.value {
            ConstraintValue::Budget { limit, currency } if c.is_hard => {
                Some((*limit, currency.as_str()))
            }
            _ => None,
        })
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.constraints.iter().find_map(|c| match &c.value {
            ConstraintValue::Dates { start, end } => Some((*start, *end)),
            _ => None,
        })
    }

    /// Origins and destination of the airports constraint.
    pub fn airports(&self) -> Option<(&[String], &str)> {
        self.constraints.iter().find_map(|c| match &c.value {
            ConstraintValue::Airports {
                origins,
                destination,
            } => Some((origins.as_slice(), destination.as_str())),
            _ => None,
        })
    }

    pub fn weather_location(&self) -> Option<(f64, f64)> {
        self.constraints.iter().find_map(|c| match &c.value {
            ConstraintValue::Weather {
                latitude,
                longitude,
            } => Some((*latitude, *longitude)),
            _ => None,
        })
    }

    /// Preference texts, excluding the destination marker.
    pub fn preferences(&self) -> Vec<&str> {
        self.constraints
            .iter()
            .filter_map(|c| match &c.value {
                ConstraintValue::Preference { text } => Some(text.as_str()),
                _ => None,
            })
            .filter(|text| !is_destination_marker(text))
            .collect()
    }

    /// Whether any preference mentions the given keyword (case-insensitive).
    pub fn prefers(&self, keyword: &str) -> bool {
        let keyword = keyword.to_lowercase();
        self.preferences()
            .iter()
            .any(|p| p.to_lowercase().contains(&keyword))
    }

    /// Destination city from a `Destination: <city>` preference.
    pub fn destination(&self) -> Option<String> {
        self.constraints.iter().find_map(|c| match &c.value {
            ConstraintValue::Preference { text } if is_destination_marker(text) => {
                let city = text[DESTINATION_PREFIX.len()..].trim();
                (!city.is_empty()).then(|| city.to_string())
            }
            _ => None,
        })
    }
}

fn is_destination_marker(text: &str) -> bool {
    text.get(..DESTINATION_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(DESTINATION_PREFIX))
}

impl From<Vec<Constraint>> for ConstraintSet {
    fn from(constraints: Vec<Constraint>) -> Self {
        Self::new(constraints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_kind_follows_payload() {
        assert_eq!(Constraint::budget(100.0).kind(), ConstraintKind::Budget);
        assert_eq!(
            Constraint::preference("museum").kind(),
            ConstraintKind::Preference
        );
        assert_eq!(Constraint::weather(35.0, 135.7).kind(), ConstraintKind::Weather);
    }

    #[test]
    fn test_budget_limit_ignores_soft_budget() {
        let set = ConstraintSet::new(vec![Constraint::soft(ConstraintValue::Budget {
            limit: 500.0,
            currency: "USD".into(),
        })]);
        assert!(set.budget_limit().is_none());

        let set = ConstraintSet::new(vec![Constraint::budget(2000.0)]);
        assert_eq!(set.budget_limit(), Some((2000.0, "USD")));
    }

    #[test]
    fn test_destination_is_parsed_and_excluded_from_preferences() {
        let set = ConstraintSet::new(vec![
            Constraint::preference("Destination: Kyoto"),
            Constraint::preference("art museums"),
        ]);
        assert_eq!(set.destination().as_deref(), Some("Kyoto"));
        assert_eq!(set.preferences(), vec!["art museums"]);
        assert!(set.prefers("MUSEUM"));
        assert!(!set.prefers("kid-friendly"));
    }

    #[test]
    fn test_deserialize_tagged_constraint() {
        let json = r#"[
            {"kind": "budget", "limit": 2500.0},
            {"kind": "dates", "start": "2025-10-01", "end": "2025-10-05"},
            {"kind": "airports", "origins": ["SFO", "OAK"], "destination": "KIX"},
            {"kind": "preference", "text": "kid-friendly", "is_hard": false}
        ]"#;
        let set: ConstraintSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.len(), 4);
        assert_eq!(set.budget_limit(), Some((2500.0, "USD")));
        assert_eq!(
            set.date_range(),
            Some((date("2025-10-01"), date("2025-10-05")))
        );
        let (origins, destination) = set.airports().unwrap();
        assert_eq!(origins, ["SFO".to_string(), "OAK".to_string()]);
        assert_eq!(destination, "KIX");
        assert!(set.iter().any(|c| !c.is_hard));
    }
}
