//! Constraint verification over the working set.
//!
//! [`Verifier::verify`] is pure: it reads the constraints and the working
//! set, recomputes budget counters from scratch, and returns a fresh
//! violation list. Running it twice on the same input gives the same
//! result.

mod budget;
mod checks;

pub use budget::{check_budget, tally};
pub use checks::{KID_FRIENDLY, MUSEUM, check_overnight_flights, check_preferences, check_weather};

use serde::{Deserialize, Serialize};
use voyage_common::{BudgetCounters, ConstraintSet, Violation, WorkingSet};

/// Result of one verifier pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub violations: Vec<Violation>,
    pub budget: BudgetCounters,
}

impl Verification {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

pub struct Verifier {
    default_currency: String,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new("USD")
    }
}

impl Verifier {
    pub fn new(default_currency: &str) -> Self {
        Self {
            default_currency: default_currency.to_string(),
        }
    }

    /// Run every check; results are concatenated in check order.
    pub fn verify(&self, constraints: &ConstraintSet, working_set: &WorkingSet) -> Verification {
        let currency = constraints
            .budget_limit()
            .map(|(_, c)| c)
            .unwrap_or(self.default_currency.as_str());
        let budget = tally(working_set, currency);

        let mut violations = Vec::new();
        violations.extend(check_budget(constraints, &budget));
        violations.extend(check_overnight_flights(constraints, working_set));
        violations.extend(check_weather(working_set));
        violations.extend(check_preferences(constraints, working_set));

        tracing::debug!(
            violations = violations.len(),
            total = budget.total,
            "verification finished"
        );

        Verification { violations, budget }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use voyage_common::{Constraint, Severity};

    fn scenario() -> (ConstraintSet, WorkingSet) {
        let constraints = ConstraintSet::new(vec![
            Constraint::budget(2000.0),
            Constraint::preference("Avoid overnight flights"),
            Constraint::preference("kid-friendly"),
        ]);
        let mut ws = WorkingSet::new();
        ws.insert(
            "flights_flights_sfo_output",
            json!({"flights": [{"flight_number": "UA837", "price_usd": 1200.0,
                "departure_time": "2025-04-01T13:00:00", "arrival_time": "2025-04-02T16:00:00"}]}),
        );
        ws.insert("lodging_lodging_1_output", json!({"lodgings": [{"total_price": 900.0}]}));
        ws.insert(
            "weather_weather_1_output",
            json!({"daily_forecast": [{"date": "2025-04-03", "is_rainy": true}]}),
        );
        (constraints, ws)
    }

    #[test]
    fn test_budget_scenario() {
        let (constraints, ws) = scenario();
        let result = Verifier::default().verify(&constraints, &ws);

        assert_eq!(result.budget.total, 2100.0);
        let critical: Vec<_> = result.violations.iter().filter(|v| v.is_critical()).collect();
        assert_eq!(critical.len(), 1);
        assert!(critical[0].description.contains("100.00"));
    }

    #[test]
    fn test_checks_concatenate_in_order() {
        let (constraints, ws) = scenario();
        let result = Verifier::default().verify(&constraints, &ws);

        let severities: Vec<Severity> = result.violations.iter().map(|v| v.severity).collect();
        // budget, weather, kid-friendly (the flight lands the next day: not overnight)
        assert_eq!(
            severities,
            vec![Severity::Critical, Severity::Info, Severity::Warning]
        );
    }

    #[test]
    fn test_verify_is_idempotent() {
        let (constraints, ws) = scenario();
        let verifier = Verifier::default();
        assert_eq!(verifier.verify(&constraints, &ws), verifier.verify(&constraints, &ws));
    }

    #[test]
    fn test_empty_inputs_are_clean() {
        let result = Verifier::default().verify(&ConstraintSet::default(), &WorkingSet::new());
        assert!(result.is_clean());
        assert_eq!(result.budget.total, 0.0);
        assert_eq!(result.budget.currency, "USD");
    }
}
