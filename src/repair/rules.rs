//! Deterministic repair rules keyed on violation detail.

use crate::repair::{RepairPatch, RepairProposal, RepairStrategy};
use crate::tools::schema::{self, EventSearch, ToolRequest};
use crate::verifier::{KID_FRIENDLY, MUSEUM};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use voyage_common::{
    ConstraintSet, Plan, PlanStep, StepArgs, StepStatus, Violation, ViolationDetail, WorkingSet,
};

/// Category marking the indoor alternatives added for rainy days.
const INDOOR: &str = "indoor";

/// Price caps applied on budget overage: (tool, arg, output list, output price field).
const PRICE_CAPS: &[(&str, &str, &str, &str)] = &[
    (schema::FLIGHTS, "max_price", "flights", "price_usd"),
    (schema::LODGING, "max_price_per_night", "lodgings", "price_per_night"),
    (schema::EVENTS, "max_price", "events", "price_usd"),
];

/// Rule-based [`RepairStrategy`].
///
/// - budget overage: halve `max_results` and cap prices by `limit / total`,
///   once no cost search is pending
/// - overnight flight: ask the flight search to avoid overnight arrivals
/// - rainy day: add one indoor events search pinned to that date
/// - missing preference: widen the events search, add one, or wait for it
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedRepair;

/// Patches under construction; modifies to the same step are merged.
#[derive(Default)]
struct Draft {
    deltas: BTreeMap<String, StepArgs>,
    added: Vec<PlanStep>,
    notes: Vec<String>,
}

impl Draft {
    fn modify(&mut self, step_id: &str, delta: StepArgs) {
        self.deltas.entry(step_id.to_string()).or_default().merge(&delta);
    }

    fn fresh_id(&self, plan: &Plan, prefix: &str) -> String {
        (1..)
            .map(|n| format!("{}_{}", prefix, n))
            .find(|id| !plan.contains(id) && !self.added.iter().any(|s| &s.id == id))
            .unwrap_or_else(|| prefix.to_string())
    }

    fn into_proposal(self, plan: &Plan) -> RepairProposal {
        let mut patches: Vec<RepairPatch> = plan
            .steps()
            .iter()
            .filter_map(|step| {
                self.deltas.get(&step.id).map(|delta| RepairPatch::Modify {
                    step_id: step.id.clone(),
                    arg_delta: delta.clone(),
                })
            })
            .collect();
        patches.extend(self.added.into_iter().map(|step| RepairPatch::Add { step }));

        let reasoning = if self.notes.is_empty() {
            "No applicable repairs; waiting for pending steps or accepting the plan as is.".to_string()
        } else {
            self.notes.join(" ")
        };

        RepairProposal { patches, reasoning }
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn average_price(working_set: &WorkingSet, step: &PlanStep, list: &str, field: &str) -> Option<f64> {
    let prices: Vec<f64> = working_set
        .get(&step.output_key())?
        .get(list)?
        .as_array()?
        .iter()
        .filter_map(|item| item.get(field).and_then(Value::as_f64))
        .collect();
    (!prices.is_empty()).then(|| prices.iter().sum::<f64>() / prices.len() as f64)
}

fn default_max_results(tool: &str) -> u64 {
    if tool == schema::EVENTS { 10 } else { 5 }
}

fn cost_bearing(step: &PlanStep) -> bool {
    PRICE_CAPS.iter().any(|(tool, ..)| *tool == step.tool_name)
}

impl RuleBasedRepair {
    fn repair_budget(&self, plan: &Plan, working_set: &WorkingSet, total: f64, limit: f64, draft: &mut Draft) {
        if total <= 0.0 {
            return;
        }
        // Totals still include outputs of searches that are about to re-run.
        if plan.steps().iter().any(|s| cost_bearing(s) && s.status.is_active()) {
            draft.notes.push(
                "Budget exceeded, but cost searches are still pending; waiting for fresh prices."
                    .to_string(),
            );
            return;
        }
        let ratio = (limit / total).clamp(0.0, 1.0);
        let mut touched = 0;

        for step in plan.steps().iter().filter(|s| cost_bearing(s)) {
            let mut delta = StepArgs::new();

            let current = step
                .args
                .get_u64("max_results")
                .unwrap_or_else(|| default_max_results(&step.tool_name));
            if current > 1 {
                delta.insert("max_results", (current / 2).max(1));
            }

            if let Some((_, arg, list, field)) = PRICE_CAPS.iter().find(|(tool, ..)| *tool == step.tool_name) {
                let basis = step
                    .args
                    .get_f64(arg)
                    .or_else(|| average_price(working_set, step, list, field));
                if let Some(basis) = basis {
                    delta.insert(arg, round_cents(basis * ratio));
                }
            }

            if !delta.is_empty() {
                draft.modify(&step.id, delta);
                touched += 1;
            }
        }

        if touched > 0 {
            draft.notes.push(format!(
                "Budget exceeded by {:.2}: narrowed {} search step(s) and capped prices at {:.0}% of current levels.",
                total - limit,
                touched,
                ratio * 100.0
            ));
        }
    }

    fn repair_overnight(&self, plan: &Plan, step_id: &str, flight_number: &str, draft: &mut Draft) {
        let Some(step) = plan.get(step_id) else {
            return;
        };
        if step.args.get("avoid_overnight") == Some(&Value::Bool(true)) {
            return;
        }
        draft.modify(step_id, StepArgs::new().with("avoid_overnight", true));
        draft.notes.push(format!(
            "Flight {} arrives overnight: re-running {} with overnight arrivals excluded.",
            flight_number, step_id
        ));
    }

    fn lodging_dependencies(plan: &Plan) -> Vec<String> {
        plan.steps_for_tool(schema::LODGING).map(|s| s.id.clone()).collect()
    }

    fn events_step(
        constraints: &ConstraintSet,
        id: String,
        plan: &Plan,
        start: NaiveDate,
        end: NaiveDate,
        categories: Vec<String>,
        kid_friendly: Option<bool>,
    ) -> Option<PlanStep> {
        let destination = constraints
            .destination()
            .or_else(|| constraints.airports().map(|(_, dest)| dest.to_string()))?;
        let args = ToolRequest::Events(EventSearch {
            destination,
            start_date: start,
            end_date: end,
            categories,
            kid_friendly,
            max_price: None,
            max_results: 10,
        })
        .into_args();
        Some(PlanStep::new(&id, schema::EVENTS, args).depends_on(Self::lodging_dependencies(plan)))
    }

    fn repair_rainy_day(
        &self,
        constraints: &ConstraintSet,
        plan: &Plan,
        reported: &str,
        draft: &mut Draft,
    ) {
        // Dates the tool reports in another format fall back to the whole trip.
        let parsed = reported.get(..10).and_then(|d| d.parse::<NaiveDate>().ok());
        let Some((start, end)) = parsed.map(|d| (d, d)).or_else(|| constraints.date_range()) else {
            draft.notes.push(format!(
                "Rain expected on {}, but no trip dates to search indoor activities for.",
                reported
            ));
            return;
        };

        let start_value = json!(start.to_string());
        let end_value = json!(end.to_string());
        let already = plan
            .steps_for_tool(schema::EVENTS)
            .chain(draft.added.iter())
            .any(|s| {
                s.args.get("start_date") == Some(&start_value)
                    && s.args.get("end_date") == Some(&end_value)
                    && s.args
                        .get("categories")
                        .and_then(Value::as_array)
                        .is_some_and(|c| c.iter().any(|v| v == INDOOR))
            });
        if already {
            return;
        }

        let id = draft.fresh_id(plan, "events_indoor");
        let categories = vec![INDOOR.to_string(), MUSEUM.to_string()];
        if let Some(step) = Self::events_step(constraints, id, plan, start, end, categories, None) {
            draft.notes.push(format!(
                "Rain expected on {}: added indoor activity search {}.",
                reported, step.id
            ));
            draft.added.push(step);
        }
    }

    fn repair_preference(
        &self,
        constraints: &ConstraintSet,
        plan: &Plan,
        preference: &str,
        draft: &mut Draft,
    ) {
        let events: Vec<&PlanStep> = plan.steps_for_tool(schema::EVENTS).collect();

        if events.iter().any(|s| s.status.is_active()) || draft.added.iter().any(|s| s.tool_name == schema::EVENTS) {
            draft.notes.push(format!(
                "Waiting for the pending events search before judging the {} preference.",
                preference
            ));
            return;
        }

        if let Some(step) = events.first() {
            let delta = match preference {
                KID_FRIENDLY => StepArgs::new().with("kid_friendly", true),
                MUSEUM => {
                    let mut categories: BTreeSet<String> = step
                        .args
                        .get("categories")
                        .and_then(Value::as_array)
                        .map(|c| c.iter().filter_map(Value::as_str).map(str::to_string).collect())
                        .unwrap_or_default();
                    if !categories.insert(MUSEUM.to_string()) {
                        return;
                    }
                    StepArgs::new().with("categories", categories.into_iter().collect::<Vec<_>>())
                }
                _ => return,
            };
            if delta.iter().all(|(k, v)| step.args.get(k) == Some(v)) {
                return;
            }
            draft.modify(&step.id, delta);
            draft.notes.push(format!(
                "No {} activities found: widened events search {}.",
                preference, step.id
            ));
            return;
        }

        let Some((start, end)) = constraints.date_range() else {
            return;
        };
        let (categories, kid_friendly) = match preference {
            KID_FRIENDLY => (Vec::new(), Some(true)),
            MUSEUM => (vec![MUSEUM.to_string()], None),
            _ => return,
        };
        let id = draft.fresh_id(plan, "events");
        if let Some(step) = Self::events_step(constraints, id, plan, start, end, categories, kid_friendly) {
            draft.notes.push(format!(
                "No events searched yet for the {} preference: added {}.",
                preference, step.id
            ));
            draft.added.push(step);
        }
    }
}

#[async_trait]
impl RepairStrategy for RuleBasedRepair {
    async fn propose(
        &self,
        constraints: &ConstraintSet,
        plan: &Plan,
        violations: &[Violation],
        working_set: &WorkingSet,
    ) -> RepairProposal {
        let mut draft = Draft::default();

        for violation in violations {
            match &violation.detail {
                ViolationDetail::BudgetOverage { total, limit, .. } => {
                    self.repair_budget(plan, working_set, *total, *limit, &mut draft)
                }
                ViolationDetail::OvernightFlight {
                    step_id,
                    flight_number,
                } => self.repair_overnight(plan, step_id, flight_number, &mut draft),
                ViolationDetail::RainyDay { date } => {
                    self.repair_rainy_day(constraints, plan, date, &mut draft)
                }
                ViolationDetail::MissingPreference { preference } => {
                    self.repair_preference(constraints, plan, preference, &mut draft)
                }
            }
        }

        draft.into_proposal(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voyage_common::{Constraint, ConstraintKind, Severity};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn constraints() -> ConstraintSet {
        ConstraintSet::new(vec![
            Constraint::budget(2000.0),
            Constraint::dates(date("2025-04-01"), date("2025-04-05")),
            Constraint::airports(&["SFO"], "Tokyo"),
        ])
    }

    fn completed(id: &str, tool: &str, args: StepArgs) -> PlanStep {
        let mut step = PlanStep::new(id, tool, args);
        step.status = StepStatus::Completed;
        step
    }

    fn violation(detail: ViolationDetail) -> Violation {
        Violation::new(ConstraintKind::Preference, Severity::Warning, "test", detail)
    }

    async fn propose(plan: &Plan, violations: &[Violation], ws: &WorkingSet) -> RepairProposal {
        RuleBasedRepair.propose(&constraints(), plan, violations, ws).await
    }

    #[tokio::test]
    async fn test_budget_overage_narrows_and_caps() {
        let plan = Plan::new(vec![
            completed("flights_sfo", "flights", StepArgs::new().with("max_results", 6)),
            completed("lodging_1", "lodging", StepArgs::new()),
            completed("weather_1", "weather", StepArgs::new()),
        ]);
        let mut ws = WorkingSet::new();
        ws.insert(
            "lodging_lodging_1_output",
            json!({"lodgings": [{"price_per_night": 200.0}, {"price_per_night": 100.0}]}),
        );

        let proposal = propose(
            &plan,
            &[violation(ViolationDetail::BudgetOverage {
                total: 2500.0,
                limit: 2000.0,
                overage: 500.0,
            })],
            &ws,
        )
        .await;

        assert_eq!(proposal.patches.len(), 2);
        match &proposal.patches[0] {
            RepairPatch::Modify { step_id, arg_delta } => {
                assert_eq!(step_id, "flights_sfo");
                assert_eq!(arg_delta.get_u64("max_results"), Some(3));
                assert!(arg_delta.get("max_price").is_none());
            }
            other => panic!("Expected modify, got {:?}", other),
        }
        match &proposal.patches[1] {
            RepairPatch::Modify { step_id, arg_delta } => {
                assert_eq!(step_id, "lodging_1");
                assert_eq!(arg_delta.get_u64("max_results"), Some(2));
                assert_eq!(arg_delta.get_f64("max_price_per_night"), Some(120.0));
            }
            other => panic!("Expected modify, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_budget_waits_for_pending_searches() {
        let plan = Plan::new(vec![
            completed("flights_sfo", "flights", StepArgs::new()),
            PlanStep::new("lodging_1", "lodging", StepArgs::new().with("max_results", 2)),
        ]);
        let proposal = propose(
            &plan,
            &[violation(ViolationDetail::BudgetOverage {
                total: 2100.0,
                limit: 2000.0,
                overage: 100.0,
            })],
            &WorkingSet::new(),
        )
        .await;

        assert!(proposal.patches.is_empty());
        assert!(proposal.reasoning.contains("pending"));
    }

    #[tokio::test]
    async fn test_overnight_sets_flag_once() {
        let plan = Plan::new(vec![completed("flights_sfo", "flights", StepArgs::new())]);
        let detail = ViolationDetail::OvernightFlight {
            step_id: "flights_sfo".into(),
            flight_number: "UA837".into(),
        };

        let proposal = propose(&plan, &[violation(detail.clone())], &WorkingSet::new()).await;
        assert_eq!(
            proposal.patches,
            vec![RepairPatch::Modify {
                step_id: "flights_sfo".into(),
                arg_delta: StepArgs::new().with("avoid_overnight", true),
            }]
        );

        let plan = Plan::new(vec![completed(
            "flights_sfo",
            "flights",
            StepArgs::new().with("avoid_overnight", true),
        )]);
        let proposal = propose(&plan, &[violation(detail)], &WorkingSet::new()).await;
        assert!(proposal.patches.is_empty());
    }

    #[tokio::test]
    async fn test_rainy_day_adds_indoor_search_once() {
        let plan = Plan::new(vec![completed("lodging_1", "lodging", StepArgs::new())]);
        let rain = violation(ViolationDetail::RainyDay {
            date: "2025-04-02".into(),
        });

        let proposal = propose(&plan, &[rain.clone(), rain.clone()], &WorkingSet::new()).await;
        assert_eq!(proposal.patches.len(), 1);
        let RepairPatch::Add { step } = &proposal.patches[0] else {
            panic!("Expected add patch");
        };
        assert_eq!(step.id, "events_indoor_1");
        assert_eq!(step.tool_name, "events");
        assert_eq!(step.args.get_str("start_date"), Some("2025-04-02"));
        assert!(step.dependencies.contains("lodging_1"));

        let mut plan = plan;
        plan.push(step.clone());
        let proposal = propose(&plan, &[rain], &WorkingSet::new()).await;
        assert!(proposal.patches.is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_rain_date_searches_whole_trip() {
        let plan = Plan::new(vec![completed("lodging_1", "lodging", StepArgs::new())]);
        let rain = violation(ViolationDetail::RainyDay {
            date: "Apr 2".into(),
        });

        let proposal = propose(&plan, &[rain], &WorkingSet::new()).await;
        assert_eq!(proposal.patches.len(), 1);
        let RepairPatch::Add { step } = &proposal.patches[0] else {
            panic!("Expected add patch");
        };
        assert_eq!(step.args.get_str("start_date"), Some("2025-04-01"));
        assert_eq!(step.args.get_str("end_date"), Some("2025-04-05"));
        assert!(proposal.reasoning.contains("Apr 2"));
    }

    #[tokio::test]
    async fn test_missing_preference_modifies_completed_events() {
        let plan = Plan::new(vec![completed(
            "events_1",
            "events",
            StepArgs::new().with("categories", vec!["art"]),
        )]);
        let proposal = propose(
            &plan,
            &[
                violation(ViolationDetail::MissingPreference {
                    preference: MUSEUM.into(),
                }),
                violation(ViolationDetail::MissingPreference {
                    preference: KID_FRIENDLY.into(),
                }),
            ],
            &WorkingSet::new(),
        )
        .await;

        assert_eq!(proposal.patches.len(), 1);
        let RepairPatch::Modify { arg_delta, .. } = &proposal.patches[0] else {
            panic!("Expected modify patch");
        };
        assert_eq!(arg_delta.get("categories"), Some(&json!(["art", "museum"])));
        assert_eq!(arg_delta.get("kid_friendly"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_missing_preference_adds_or_waits() {
        let missing = violation(ViolationDetail::MissingPreference {
            preference: KID_FRIENDLY.into(),
        });

        let proposal = propose(&Plan::default(), &[missing.clone()], &WorkingSet::new()).await;
        let RepairPatch::Add { step } = &proposal.patches[0] else {
            panic!("Expected add patch");
        };
        assert_eq!(step.args.get("kid_friendly"), Some(&json!(true)));
        assert_eq!(step.args.get_str("destination"), Some("Tokyo"));

        let plan = Plan::new(vec![PlanStep::new("events_1", "events", StepArgs::new())]);
        let proposal = propose(&plan, &[missing], &WorkingSet::new()).await;
        assert!(proposal.patches.is_empty());
        assert!(proposal.reasoning.contains("Waiting"));
    }
}
