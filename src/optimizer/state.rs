//! Convergence bookkeeping for one optimisation run

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a run stopped in the converged state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceReason {
    /// Zero descent direction or duality gap below epsilon
    Stationary,
    /// Line search found no decrease
    NoImprovement,
    /// Accepted step moved no weight by epsilon or more
    WeightChange,
    /// Accepted step improved the objective by less than tol
    ObjectiveStall,
    /// Weights were fixed up front (`average` algorithm)
    FixedWeights,
}

/// Terminal state of a fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceStatus {
    Converged(ConvergenceReason),
    /// Iteration budget exhausted; the model is still usable
    MaxIterReached,
}

impl ConvergenceStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceStatus::Converged(_))
    }
}

impl fmt::Display for ConvergenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvergenceStatus::Converged(reason) => write!(f, "converged ({reason:?})"),
            ConvergenceStatus::MaxIterReached => f.write_str("maximum iterations reached"),
        }
    }
}

/// One row of the optimisation history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    /// Objective at the weights held after this iteration
    pub objective: f64,
    /// max |Δw| of the accepted step, 0 when no step was taken
    pub weight_change: f64,
    /// Relative duality gap before the step
    pub duality_gap: f64,
    /// Accepted step size, 0 when no step was taken
    pub step: f64,
}

/// Previous and current iterate of the weight loop
#[derive(Debug, Clone)]
pub struct ConvergenceState {
    previous_weights: Vec<f64>,
    weights: Vec<f64>,
    previous_objective: f64,
    objective: f64,
    iteration: usize,
    history: Vec<IterationRecord>,
}

impl ConvergenceState {
    pub fn new(weights: Vec<f64>, objective: f64) -> Self {
        Self {
            previous_weights: weights.clone(),
            weights,
            previous_objective: objective,
            objective,
            iteration: 0,
            history: Vec::new(),
        }
    }

    /// Advance the counter and return the new iteration number
    pub fn begin_iteration(&mut self) -> usize {
        self.iteration += 1;
        self.iteration
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn objective(&self) -> f64 {
        self.objective
    }

    /// Move to an accepted point
    pub fn accept(&mut self, weights: Vec<f64>, objective: f64) {
        self.previous_weights = std::mem::replace(&mut self.weights, weights);
        self.previous_objective = self.objective;
        self.objective = objective;
    }

    /// max |Δw| of the last accepted step
    pub fn weight_change(&self) -> f64 {
        super::simplex::max_abs_diff(&self.weights, &self.previous_weights)
    }

    /// Objective decrease of the last accepted step
    pub fn improvement(&self) -> f64 {
        self.previous_objective - self.objective
    }

    pub fn record(&mut self, duality_gap: f64, step: f64) -> IterationRecord {
        let weight_change = if step > 0.0 { self.weight_change() } else { 0.0 };
        let record = IterationRecord {
            iteration: self.iteration,
            objective: self.objective,
            weight_change,
            duality_gap,
            step,
        };
        self.history.push(record);
        record
    }

    /// Final weights and history
    pub fn finish(self) -> (Vec<f64>, usize, Vec<IterationRecord>) {
        (self.weights, self.iteration, self.history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_accept_tracks_changes() {
        let mut state = ConvergenceState::new(vec![0.5, 0.5], 3.0);
        assert_eq!(state.begin_iteration(), 1);

        state.accept(vec![0.8, 0.2], 2.0);
        assert_relative_eq!(state.weight_change(), 0.3, epsilon = 1e-12);
        assert_relative_eq!(state.improvement(), 1.0);

        let record = state.record(0.25, 0.3);
        assert_eq!(record.iteration, 1);
        assert_eq!(record.objective, 2.0);

        let (weights, iterations, history) = state.finish();
        assert_eq!(weights, vec![0.8, 0.2]);
        assert_eq!(iterations, 1);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_record_without_step() {
        let mut state = ConvergenceState::new(vec![1.0], -1.0);
        state.begin_iteration();
        let record = state.record(0.0, 0.0);
        assert_eq!(record.weight_change, 0.0);
        assert_eq!(record.objective, -1.0);
        assert!(ConvergenceStatus::Converged(ConvergenceReason::Stationary).is_converged());
        assert!(!ConvergenceStatus::MaxIterReached.is_converged());
    }
}
