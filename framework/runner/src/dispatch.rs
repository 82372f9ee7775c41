use std::collections::HashSet;

use rand::Rng;

use crate::plan::PlanError;

/// Weighted selection over named scenarios.
///
/// Scenarios keep their declaration order, which decides how the cumulative weights are laid out.
#[derive(Debug, Clone)]
pub struct ScenarioDispatcher<T> {
    entries: Vec<(String, f64, T)>,
    total_weight: f64,
}

impl<T> ScenarioDispatcher<T> {
    pub fn new(entries: Vec<(String, f64, T)>) -> Result<Self, PlanError> {
        if entries.is_empty() {
            return Err(PlanError::NoScenarios);
        }

        let mut seen = HashSet::new();
        for (name, weight, _) in &entries {
            if !seen.insert(name.as_str()) {
                return Err(PlanError::DuplicateScenario(name.clone()));
            }
            if !weight.is_finite() || *weight <= 0.0 {
                return Err(PlanError::InvalidWeight {
                    name: name.clone(),
                    weight: *weight,
                });
            }
        }

        let total_weight: f64 = entries.iter().map(|(_, weight, _)| weight).sum();
        if !total_weight.is_finite() {
            return Err(PlanError::TotalWeightOverflow);
        }

        Ok(Self {
            entries,
            total_weight,
        })
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64, &T)> {
        self.entries
            .iter()
            .map(|(name, weight, value)| (name.as_str(), *weight, value))
    }

    /// Pick a scenario with probability `weight / total_weight`.
    pub fn select<R: Rng>(&self, rng: &mut R) -> (&str, &T) {
        let draw = rng.gen_range(0.0..self.total_weight);
        self.select_at(draw)
    }

    /// The first scenario whose cumulative weight reaches `draw`.
    pub fn select_at(&self, draw: f64) -> (&str, &T) {
        let mut cumulative = 0.0;
        for (name, weight, value) in &self.entries {
            cumulative += weight;
            if draw <= cumulative {
                return (name, value);
            }
        }

        // Rounding can leave the draw just past the last boundary.
        let (name, _, value) = &self.entries[self.entries.len() - 1];
        (name, value)
    }
}
