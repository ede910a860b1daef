use std::sync::Arc;

use crs_eviction::PressureSource;
use crs_store::CapacityBudget;

/// Pressure sensed from the memory tier's own budget.
#[derive(Debug, Clone)]
pub struct BudgetPressure {
    budget: Arc<CapacityBudget>,
}

impl BudgetPressure {
    pub fn new(budget: Arc<CapacityBudget>) -> Self {
        Self { budget }
    }
}

impl PressureSource for BudgetPressure {
    fn headroom_fraction(&self) -> f64 {
        self.budget.headroom_fraction()
    }

    fn name(&self) -> &'static str {
        "memory-budget"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_budget_usage() {
        let budget = Arc::new(CapacityBudget::new(1_000));
        let source = BudgetPressure::new(Arc::clone(&budget));
        assert!((source.headroom_fraction() - 1.0).abs() < 1e-9);
        budget.try_reserve(900).unwrap();
        assert!((source.headroom_fraction() - 0.1).abs() < 1e-9);
    }
}
