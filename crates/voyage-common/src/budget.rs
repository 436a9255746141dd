//! Running spend totals per category.

use serde::{Deserialize, Serialize};

/// Spend per category, recomputed from the working set on every pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetCounters {
    pub flights: f64,
    pub lodging: f64,
    pub activities: f64,
    pub transport: f64,
    pub food: f64,
    pub total: f64,
    pub currency: String,
}

impl Default for BudgetCounters {
    fn default() -> Self {
        Self::new("USD")
    }
}

impl BudgetCounters {
    pub fn new(currency: &str) -> Self {
        Self {
            flights: 0.0,
            lodging: 0.0,
            activities: 0.0,
            transport: 0.0,
            food: 0.0,
            total: 0.0,
            currency: currency.to_string(),
        }
    }

    /// Recompute `total` from the category fields.
    pub fn recompute_total(&mut self) {
        self.total = self.flights + self.lodging + self.activities + self.transport + self.food;
    }

    /// Amount by which `total` exceeds `limit`, if any.
    pub fn overage(&self, limit: f64) -> Option<f64> {
        (self.total > limit).then(|| self.total - limit)
    }
}
