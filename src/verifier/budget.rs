//! Spend tallies over tool outputs.

use crate::tools::schema::{EVENTS, FLIGHTS, LODGING, TRANSIT};
use serde_json::Value;
use voyage_common::{
    BudgetCounters, ConstraintKind, ConstraintSet, Severity, Violation, ViolationDetail, WorkingSet,
};

/// Sum `field` over every item of `list` in every output of `tool`.
fn sum_outputs(working_set: &WorkingSet, tool: &str, list: &str, field: &str) -> f64 {
    working_set
        .outputs_for(tool)
        .filter_map(|(_, output)| output.get(list).and_then(Value::as_array))
        .flatten()
        .filter_map(|item| item.get(field).and_then(Value::as_f64))
        .sum()
}

/// Recompute every category from scratch.
pub fn tally(working_set: &WorkingSet, currency: &str) -> BudgetCounters {
    let mut counters = BudgetCounters::new(currency);
    counters.flights = sum_outputs(working_set, FLIGHTS, "flights", "price_usd");
    counters.lodging = sum_outputs(working_set, LODGING, "lodgings", "total_price");
    counters.activities = sum_outputs(working_set, EVENTS, "events", "price_usd");
    counters.transport = sum_outputs(working_set, TRANSIT, "routes", "cost_usd");
    counters.recompute_total();
    counters
}

/// A critical violation when a hard budget is exceeded.
pub fn check_budget(constraints: &ConstraintSet, counters: &BudgetCounters) -> Option<Violation> {
    let (limit, currency) = constraints.budget_limit()?;
    let overage = counters.overage(limit)?;

    Some(
        Violation::new(
            ConstraintKind::Budget,
            Severity::Critical,
            format!(
                "Total estimated cost ({:.2} {cur}) exceeds budget limit ({:.2} {cur}) by {:.2} {cur}.",
                counters.total,
                limit,
                overage,
                cur = currency
            ),
            ViolationDetail::BudgetOverage {
                total: counters.total,
                limit,
                overage,
            },
        )
        .with_fix("Consider cheaper flights, lodging, or fewer activities."),
    )
}
