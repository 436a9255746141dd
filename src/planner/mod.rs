//! Plan generation.
//!
//! The first call lays out the whole search DAG from the constraints: one
//! flight search per origin airport, lodging after the flights, events and
//! transit after lodging, and an independent forecast. Later calls only
//! append what the constraints still need and the plan lacks. The
//! orchestrator validates every proposal before merging it.

use crate::tools::schema::{
    self, EventSearch, FlightSearch, KnowledgeSearch, LodgingSearch, ToolRequest, TransitRoute,
    WeatherForecast,
};
use crate::verifier::{KID_FRIENDLY, MUSEUM};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use voyage_common::working_set::EXTRACTED_DATA_KEY;
use voyage_common::{ConstraintSet, Plan, PlanStep, WorkingSet};

const NEIGHBORHOODS_PREFIX: &str = "compare neighborhoods:";

/// Steps to append to the plan, with the planner's explanation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanProposal {
    pub steps: Vec<PlanStep>,
    pub reasoning: String,
}

impl PlanProposal {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Source of plan steps.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        constraints: &ConstraintSet,
        current_plan: &Plan,
        working_set: &WorkingSet,
    ) -> PlanProposal;
}

/// Rule-based [`Planner`] for travel itineraries.
#[derive(Debug, Clone, Copy, Default)]
pub struct TravelPlanner;

fn slug(text: &str) -> String {
    let slug: String = text
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    slug.trim_matches('_').to_string()
}

/// Neighborhoods named in a `Compare neighborhoods: A, B` preference.
fn neighborhoods(constraints: &ConstraintSet) -> Vec<String> {
    constraints
        .preferences()
        .into_iter()
        .find_map(|p| {
            let head = p.get(..NEIGHBORHOODS_PREFIX.len())?;
            head.eq_ignore_ascii_case(NEIGHBORHOODS_PREFIX)
                .then(|| &p[NEIGHBORHOODS_PREFIX.len()..])
        })
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Party size from the extraction seed, clamped to what the searches accept.
fn travelers(working_set: &WorkingSet) -> u32 {
    working_set
        .get(EXTRACTED_DATA_KEY)
        .and_then(|data| data.get("travelers"))
        .and_then(Value::as_u64)
        .map(|n| n.clamp(1, 9) as u32)
        .unwrap_or(1)
}

fn city(constraints: &ConstraintSet) -> Option<String> {
    constraints
        .destination()
        .or_else(|| constraints.airports().map(|(_, dest)| dest.to_string()))
}

fn wants_kid_friendly(constraints: &ConstraintSet) -> bool {
    constraints.prefers(KID_FRIENDLY) || constraints.prefers("toddler-friendly")
}

fn flight_step(origin: &str, destination: &str, (start, end): (NaiveDate, NaiveDate), passengers: u32) -> PlanStep {
    let args = ToolRequest::Flights(FlightSearch {
        origin: origin.to_uppercase(),
        destination: destination.to_string(),
        departure_date: start,
        return_date: (end > start).then_some(end),
        passengers,
        class_preference: "economy".to_string(),
        max_results: 5,
        max_price: None,
        avoid_overnight: false,
    })
    .into_args();
    PlanStep::new(&format!("flights_{}", slug(origin)), schema::FLIGHTS, args)
}

fn events_step(id: &str, constraints: &ConstraintSet, city: &str, (start, end): (NaiveDate, NaiveDate), after: &[String]) -> PlanStep {
    let mut categories = Vec::new();
    if constraints.prefers(MUSEUM) {
        categories.push(MUSEUM.to_string());
    }
    let args = ToolRequest::Events(EventSearch {
        destination: city.to_string(),
        start_date: start,
        end_date: end,
        categories,
        kid_friendly: wants_kid_friendly(constraints).then_some(true),
        max_price: None,
        max_results: 10,
    })
    .into_args();
    PlanStep::new(id, schema::EVENTS, args).depends_on(after.iter().cloned())
}

impl TravelPlanner {
    fn initial(&self, constraints: &ConstraintSet, working_set: &WorkingSet) -> PlanProposal {
        let dates = constraints.date_range();
        let city = city(constraints);
        let party = travelers(working_set);
        let mut steps: Vec<PlanStep> = Vec::new();
        let mut notes: Vec<String> = Vec::new();

        let mut flight_ids = Vec::new();
        if let (Some((origins, dest)), Some(dates)) = (constraints.airports(), dates) {
            let mut seen = BTreeSet::new();
            for origin in origins.iter().filter(|o| seen.insert(slug(o))) {
                let step = flight_step(origin, dest, dates, party);
                flight_ids.push(step.id.clone());
                steps.push(step);
            }
            notes.push(format!(
                "Compare flights to {} from {} in parallel.",
                dest,
                origins.join(", ")
            ));
        }

        let mut lodging_ids = Vec::new();
        if let (Some(city), Some((start, end))) = (city.as_deref(), dates) {
            let check_out = if end > start { end } else { start.succ_opt().unwrap_or(end) };
            let areas = neighborhoods(constraints);
            let variants: Vec<(String, Option<String>)> = if areas.is_empty() {
                vec![("lodging_1".to_string(), None)]
            } else {
                areas
                    .iter()
                    .map(|n| (format!("lodging_{}", slug(n)), Some(n.clone())))
                    .collect()
            };
            for (id, neighborhood) in variants {
                if lodging_ids.contains(&id) {
                    continue;
                }
                let args = ToolRequest::Lodging(LodgingSearch {
                    destination: city.to_string(),
                    check_in: start,
                    check_out,
                    guests: party.clamp(1, 10),
                    rooms: 1,
                    neighborhood,
                    max_price_per_night: None,
                    amenities: Vec::new(),
                    max_results: 5,
                })
                .into_args();
                steps.push(PlanStep::new(&id, schema::LODGING, args).depends_on(flight_ids.iter().cloned()));
                lodging_ids.push(id);
            }
            notes.push(if areas.is_empty() {
                format!("Search lodging in {} once flights are known.", city)
            } else {
                format!("Compare lodging across {}.", areas.join(", "))
            });

            if !constraints.preferences().is_empty() {
                steps.push(events_step("events_1", constraints, city, (start, end), &lodging_ids));
                notes.push("Find activities matching the stated preferences.".to_string());
            }

            let from = constraints
                .airports()
                .map(|(_, dest)| dest.to_string())
                .unwrap_or_else(|| format!("{} station", city));
            let args = ToolRequest::Transit(TransitRoute {
                origin: from,
                destination: format!("{} city center", city),
                mode: "mixed".to_string(),
                departure_time: None,
            })
            .into_args();
            steps.push(PlanStep::new("transit_1", schema::TRANSIT, args).depends_on(lodging_ids.iter().cloned()));
        }

        if let (Some((latitude, longitude)), Some((start, end))) = (constraints.weather_location(), dates) {
            let args = ToolRequest::Weather(WeatherForecast {
                latitude,
                longitude,
                start_date: start,
                end_date: end,
                include_hourly: false,
            })
            .into_args();
            steps.push(PlanStep::new("weather_1", schema::WEATHER, args));
            notes.push("Check the forecast for the travel dates.".to_string());
        }

        if steps.is_empty() {
            let query = match city.as_deref() {
                Some(city) => format!("travel planning {}", city),
                None => "travel planning".to_string(),
            };
            let args = ToolRequest::Knowledge(KnowledgeSearch {
                query,
                max_results: 5,
                similarity_threshold: 0.7,
            })
            .into_args();
            steps.push(PlanStep::new("knowledge_1", schema::KNOWLEDGE, args));
            notes.push("Not enough structured constraints; fall back to a knowledge search.".to_string());
        }

        PlanProposal {
            steps,
            reasoning: notes.join(" "),
        }
    }

    fn extend(&self, constraints: &ConstraintSet, plan: &Plan, working_set: &WorkingSet) -> PlanProposal {
        let mut steps = Vec::new();
        let mut notes = Vec::new();

        if let (Some((origins, dest)), Some(dates)) = (constraints.airports(), constraints.date_range()) {
            let searched: BTreeSet<String> = plan
                .steps_for_tool(schema::FLIGHTS)
                .filter_map(|s| s.args.get_str("origin"))
                .map(slug)
                .collect();
            let mut added = BTreeSet::new();
            for origin in origins {
                let key = slug(origin);
                if searched.contains(&key) || !added.insert(key) {
                    continue;
                }
                let step = flight_step(origin, dest, dates, travelers(working_set));
                if plan.contains(&step.id) {
                    continue;
                }
                notes.push(format!("Add a flight search from {}.", origin));
                steps.push(step);
            }
        }

        let needs_events = wants_kid_friendly(constraints) || constraints.prefers(MUSEUM);
        if needs_events && plan.steps_for_tool(schema::EVENTS).next().is_none() {
            if let (Some(city), Some(dates)) = (city(constraints), constraints.date_range()) {
                let lodging: Vec<String> = plan
                    .steps_for_tool(schema::LODGING)
                    .map(|s| s.id.clone())
                    .collect();
                steps.push(events_step(&plan.fresh_id("events"), constraints, &city, dates, &lodging));
                notes.push("Add an events search for the stated preferences.".to_string());
            }
        }

        let reasoning = if notes.is_empty() {
            "Current plan still covers the constraints.".to_string()
        } else {
            notes.join(" ")
        };
        PlanProposal { steps, reasoning }
    }
}

#[async_trait]
impl Planner for TravelPlanner {
    async fn plan(
        &self,
        constraints: &ConstraintSet,
        current_plan: &Plan,
        working_set: &WorkingSet,
    ) -> PlanProposal {
        if current_plan.is_empty() {
            self.initial(constraints, working_set)
        } else {
            self.extend(constraints, current_plan, working_set)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{DagBuilder, validate_extension};
    use serde_json::json;
    use voyage_common::Constraint;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn trip(extra: Vec<Constraint>) -> ConstraintSet {
        let mut constraints = vec![
            Constraint::dates(date("2025-04-01"), date("2025-04-06")),
            Constraint::airports(&["SFO", "OAK"], "NRT"),
            Constraint::preference("Destination: Tokyo"),
        ];
        constraints.extend(extra);
        ConstraintSet::new(constraints)
    }

    fn ids(proposal: &PlanProposal) -> Vec<&str> {
        proposal.steps.iter().map(|s| s.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_initial_plan_layout() {
        let constraints = trip(vec![
            Constraint::preference("Toddler-friendly activities"),
            Constraint::weather(35.68, 139.69),
        ]);
        let proposal = TravelPlanner
            .plan(&constraints, &Plan::default(), &WorkingSet::new())
            .await;

        assert_eq!(
            ids(&proposal),
            vec!["flights_sfo", "flights_oak", "lodging_1", "events_1", "transit_1", "weather_1"]
        );

        let plan = Plan::new(proposal.steps.clone());
        let graph = DagBuilder::from_plan(&plan).build().unwrap();
        assert_eq!(graph.len(), 6);

        let lodging = plan.get("lodging_1").unwrap();
        assert!(lodging.dependencies.contains("flights_sfo"));
        assert!(lodging.dependencies.contains("flights_oak"));
        assert!(plan.get("events_1").unwrap().dependencies.contains("lodging_1"));
        assert!(plan.get("transit_1").unwrap().dependencies.contains("lodging_1"));
        assert!(plan.get("weather_1").unwrap().dependencies.is_empty());
        assert_eq!(plan.get("events_1").unwrap().args.get("kid_friendly"), Some(&json!(true)));
        assert_eq!(lodging.args.get_str("destination"), Some("Tokyo"));

        for step in plan.steps() {
            assert!(
                ToolRequest::parse(&step.tool_name, &step.args).is_ok(),
                "{} has invalid args",
                step.id
            );
        }
    }

    #[tokio::test]
    async fn test_knowledge_fallback() {
        let proposal = TravelPlanner
            .plan(&ConstraintSet::default(), &Plan::default(), &WorkingSet::new())
            .await;

        assert_eq!(ids(&proposal), vec!["knowledge_1"]);
        assert!(proposal.reasoning.contains("knowledge"));
    }

    #[tokio::test]
    async fn test_neighborhood_comparison_and_party_size() {
        let constraints = trip(vec![Constraint::preference("Compare neighborhoods: Shinjuku, Asakusa")]);
        let ws = WorkingSet::seeded(json!({"travelers": 3}));
        let proposal = TravelPlanner.plan(&constraints, &Plan::default(), &ws).await;

        let plan = Plan::new(proposal.steps);
        assert_eq!(
            plan.get("lodging_asakusa").unwrap().args.get_str("neighborhood"),
            Some("Asakusa")
        );
        assert!(plan.contains("lodging_shinjuku"));
        assert_eq!(plan.get("flights_sfo").unwrap().args.get_u64("passengers"), Some(3));
        let events = plan.get("events_1").unwrap();
        assert!(events.dependencies.contains("lodging_shinjuku"));
        assert!(events.dependencies.contains("lodging_asakusa"));
    }

    #[tokio::test]
    async fn test_second_call_adds_nothing() {
        let constraints = trip(vec![Constraint::preference("museum")]);
        let first = TravelPlanner
            .plan(&constraints, &Plan::default(), &WorkingSet::new())
            .await;
        let plan = Plan::new(first.steps);

        let second = TravelPlanner.plan(&constraints, &plan, &WorkingSet::new()).await;
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_extension_adds_missing_origin_and_events() {
        let constraints = trip(vec![Constraint::preference("kid-friendly")]);
        let plan = Plan::new(vec![flight_step(
            "SFO",
            "NRT",
            (date("2025-04-01"), date("2025-04-06")),
            1,
        )]);

        let proposal = TravelPlanner.plan(&constraints, &plan, &WorkingSet::new()).await;

        assert_eq!(ids(&proposal), vec!["flights_oak", "events_1"]);
        assert!(validate_extension(&plan, &proposal.steps).is_ok());
    }
}
