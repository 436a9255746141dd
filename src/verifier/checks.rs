//! Feasibility, weather, and preference checks.

use crate::tools::schema::{EVENTS, FLIGHTS, WEATHER};
use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;
use voyage_common::{
    ConstraintKind, ConstraintSet, Severity, Violation, ViolationDetail, WorkingSet,
};

pub const KID_FRIENDLY: &str = "kid-friendly";
pub const MUSEUM: &str = "museum";

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    raw.parse::<NaiveDateTime>()
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_local()))
}

fn items<'a>(output: &'a Value, list: &str) -> impl Iterator<Item = &'a Value> {
    output
        .get(list)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// Warn about flights landing more than one calendar day after departure.
///
/// Only runs when the traveller asked to avoid overnight flights.
pub fn check_overnight_flights(constraints: &ConstraintSet, working_set: &WorkingSet) -> Vec<Violation> {
    if !constraints.prefers("avoid overnight") {
        return Vec::new();
    }

    let mut violations = Vec::new();
    for (key, output) in working_set.outputs_for(FLIGHTS) {
        let step_id = WorkingSet::step_id_from_key(FLIGHTS, key).unwrap_or(key);
        for flight in items(output, "flights") {
            let departure = flight.get("departure_time").and_then(Value::as_str).and_then(parse_timestamp);
            let arrival = flight.get("arrival_time").and_then(Value::as_str).and_then(parse_timestamp);
            let (Some(departure), Some(arrival)) = (departure, arrival) else {
                tracing::debug!(step = step_id, "flight without parseable times skipped");
                continue;
            };

            let overnight = departure
                .date()
                .succ_opt()
                .is_some_and(|next_day| arrival.date() > next_day);
            if !overnight {
                continue;
            }

            let flight_number = flight
                .get("flight_number")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            violations.push(
                Violation::new(
                    ConstraintKind::Preference,
                    Severity::Warning,
                    format!(
                        "Flight {} is an overnight flight, which the traveller prefers to avoid.",
                        flight_number
                    ),
                    ViolationDetail::OvernightFlight {
                        step_id: step_id.to_string(),
                        flight_number,
                    },
                )
                .with_fix("Search for alternative flights or adjust travel dates."),
            );
        }
    }
    violations
}

/// One informational violation per rainy forecast entry.
///
/// The date is reported as the tool wrote it, parseable or not.
pub fn check_weather(working_set: &WorkingSet) -> Vec<Violation> {
    working_set
        .outputs_for(WEATHER)
        .flat_map(|(_, output)| items(output, "daily_forecast"))
        .filter(|day| day.get("is_rainy").and_then(Value::as_bool).unwrap_or(false))
        .map(|day| {
            let date = match day.get("date") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => "an unknown date".to_string(),
            };
            Violation::new(
                ConstraintKind::Weather,
                Severity::Info,
                format!(
                    "Rain expected on {}. Consider swapping outdoor activities for indoor ones.",
                    date
                ),
                ViolationDetail::RainyDay { date },
            )
            .with_fix("Identify outdoor activities on this day and find indoor alternatives.")
        })
        .collect()
}

fn any_event(working_set: &WorkingSet, pred: impl Fn(&Value) -> bool) -> bool {
    working_set
        .outputs_for(EVENTS)
        .flat_map(|(_, output)| items(output, "events"))
        .any(pred)
}

fn mentions_museum(event: &Value) -> bool {
    ["category", "name"].iter().any(|field| {
        event
            .get(*field)
            .and_then(Value::as_str)
            .is_some_and(|s| s.to_lowercase().contains(MUSEUM))
    })
}

/// Preferences that no event output satisfies yet.
pub fn check_preferences(constraints: &ConstraintSet, working_set: &WorkingSet) -> Vec<Violation> {
    let mut violations = Vec::new();

    let wants_kids = constraints.prefers(KID_FRIENDLY) || constraints.prefers("toddler-friendly");
    if wants_kids
        && !any_event(working_set, |e| e.get("kid_friendly").and_then(Value::as_bool) == Some(true))
    {
        violations.push(
            Violation::new(
                ConstraintKind::Preference,
                Severity::Warning,
                "No kid-friendly activities found, but the traveller prefers them.",
                ViolationDetail::MissingPreference {
                    preference: KID_FRIENDLY.to_string(),
                },
            )
            .with_fix("Search for kid-friendly events or attractions."),
        );
    }

    if constraints.prefers(MUSEUM) && !any_event(working_set, mentions_museum) {
        violations.push(
            Violation::new(
                ConstraintKind::Preference,
                Severity::Warning,
                "No museums found, but the traveller prefers them.",
                ViolationDetail::MissingPreference {
                    preference: MUSEUM.to_string(),
                },
            )
            .with_fix("Search for museums in the destination."),
        );
    }

    violations
}
