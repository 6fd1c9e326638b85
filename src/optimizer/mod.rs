//! Multiple kernel learning optimizer
//!
//! Alternates between the convex dual sub-problem at fixed kernel weights and
//! a projected-gradient step on the weights. The objective
//!
//! ```text
//! J(w) = max_α dual(α; Σ wₘ Kₘ)
//! ```
//!
//! is convex in `w` and is minimised over the probability simplex. For fixed
//! weights the optimal dual coefficients γ give `∂J/∂wₘ = -½ γᵀKₘγ`; the
//! descent direction is the negative gradient projected onto the simplex
//! tangent space, and each step is validated by re-solving the sub-problem
//! along a backtracking line search.

pub mod simplex;
pub mod state;

pub use self::state::{ConvergenceReason, ConvergenceState, ConvergenceStatus, IterationRecord};

use crate::config::{Algorithm, MKLParams};
use crate::core::{MKLError, Result};
use crate::provider::KernelSet;
use crate::solver::{DualSolution, DualSolver};
use log::{debug, log, warn, Level};
use rayon::prelude::*;
use self::simplex::{
    descent_direction, duality_gap, max_feasible_step, project_onto_simplex, squared_norm,
};

/// Sufficient decrease constant of the line search
const ARMIJO_SIGMA: f64 = 1e-4;

/// Default number of step trials per line search
pub const DEFAULT_MAX_LINE_SEARCH: usize = 20;

/// Outcome of a fit
#[derive(Debug, Clone)]
pub struct MKLResult {
    /// Kernel weights on the simplex
    pub weights: Vec<f64>,
    /// Sub-solver solution at `weights`
    pub solution: DualSolution,
    pub status: ConvergenceStatus,
    pub iterations: usize,
    pub history: Vec<IterationRecord>,
    /// Weight-convergence threshold the run stopped against
    pub epsilon: f64,
}

/// Weight optimizer over a fixed kernel set
pub struct MKLOptimizer<'a> {
    solver: &'a dyn DualSolver,
    algo: Algorithm,
    epsilon: f64,
    tol: f64,
    max_iter: Option<usize>,
    verbose: bool,
    max_line_search: usize,
}

impl<'a> MKLOptimizer<'a> {
    /// `epsilon` is the resolved weight-convergence threshold
    pub fn new(solver: &'a dyn DualSolver, params: &MKLParams, epsilon: f64) -> Self {
        Self {
            solver,
            algo: params.algo,
            epsilon,
            tol: params.tol,
            max_iter: params.max_iter,
            verbose: params.verbose,
            max_line_search: DEFAULT_MAX_LINE_SEARCH,
        }
    }

    pub fn with_max_line_search(mut self, trials: usize) -> Self {
        self.max_line_search = trials.max(1);
        self
    }

    fn progress_level(&self) -> Level {
        if self.verbose {
            Level::Info
        } else {
            Level::Debug
        }
    }

    /// Sub-solve at `weights`
    fn solve_at(
        &self,
        kernels: &KernelSet,
        weights: &[f64],
        targets: Option<&[f64]>,
    ) -> Result<DualSolution> {
        let combined = kernels.combine(weights)?;
        let solution = self.solver.solve(&combined, targets)?;
        if !solution.objective.is_finite() {
            return Err(MKLError::solver(format!(
                "sub-solver objective is not finite at weights {weights:?}"
            )));
        }
        Ok(solution)
    }

    /// Fit kernel weights and the final dual solution
    pub fn optimize(&self, kernels: &KernelSet, targets: Option<&[f64]>) -> Result<MKLResult> {
        if kernels.is_empty() {
            return Err(MKLError::config("at least one kernel is required"));
        }
        if !(self.epsilon > 0.0 && self.epsilon.is_finite()) {
            return Err(MKLError::config(format!(
                "epsilon must be positive, got {}",
                self.epsilon
            )));
        }

        let weights = simplex::uniform(kernels.len());
        let solution = self.solve_at(kernels, &weights, targets)?;

        match self.algo {
            Algorithm::Average => {
                log!(
                    self.progress_level(),
                    "Average weights over {} kernels, objective {:.6}",
                    kernels.len(),
                    solution.objective
                );
                let mut state = ConvergenceState::new(weights, solution.objective);
                state.begin_iteration();
                state.record(0.0, 0.0);
                let (weights, iterations, history) = state.finish();
                Ok(MKLResult {
                    weights,
                    solution,
                    status: ConvergenceStatus::Converged(ConvergenceReason::FixedWeights),
                    iterations,
                    history,
                    epsilon: self.epsilon,
                })
            }
            Algorithm::Simple => self.simple(kernels, targets, weights, solution),
        }
    }

    /// Projected gradient descent on the simplex
    fn simple(
        &self,
        kernels: &KernelSet,
        targets: Option<&[f64]>,
        weights: Vec<f64>,
        mut solution: DualSolution,
    ) -> Result<MKLResult> {
        let level = self.progress_level();
        let mut state = ConvergenceState::new(weights, solution.objective);

        let status = loop {
            let iteration = state.begin_iteration();
            let gradient: Vec<f64> = (0..kernels.len())
                .into_par_iter()
                .map(|m| solution.kernel_gradient(kernels.get(m)))
                .collect();
            let gap = duality_gap(state.weights(), &gradient, state.objective());
            let direction = descent_direction(state.weights(), &gradient);
            let slope = squared_norm(&direction);

            if slope == 0.0 || gap <= self.epsilon {
                state.record(gap, 0.0);
                log!(
                    level,
                    "Iteration {iteration}: stationary, objective {:.6}, gap {gap:.3e}",
                    state.objective()
                );
                break ConvergenceStatus::Converged(ConvergenceReason::Stationary);
            }

            let Some((trial, trial_solution, step)) =
                self.line_search(kernels, targets, &state, &direction, slope)?
            else {
                state.record(gap, 0.0);
                log!(
                    level,
                    "Iteration {iteration}: line search found no decrease, objective {:.6}",
                    state.objective()
                );
                break ConvergenceStatus::Converged(ConvergenceReason::NoImprovement);
            };

            state.accept(trial, trial_solution.objective);
            solution = trial_solution;
            let record = state.record(gap, step);
            log!(
                level,
                "Iteration {iteration}: objective {:.6}, weight change {:.3e}, \
                 gap {gap:.3e}, step {step:.3e}",
                record.objective,
                record.weight_change
            );

            if record.weight_change < self.epsilon {
                break ConvergenceStatus::Converged(ConvergenceReason::WeightChange);
            }
            if state.improvement() < self.tol {
                break ConvergenceStatus::Converged(ConvergenceReason::ObjectiveStall);
            }
            if self.max_iter == Some(iteration) {
                warn!(
                    "MKL optimizer stopped after {iteration} iterations without converging \
                     (gap {gap:.3e}, epsilon {})",
                    self.epsilon
                );
                break ConvergenceStatus::MaxIterReached;
            }
        };

        let (weights, iterations, history) = state.finish();
        debug!("Final kernel weights: {weights:?} ({status})");
        Ok(MKLResult {
            weights,
            solution,
            status,
            iterations,
            history,
            epsilon: self.epsilon,
        })
    }

    /// Backtracking search from the largest feasible step.
    ///
    /// Accepts the first trial with sufficient decrease; `None` when every
    /// trial fails.
    fn line_search(
        &self,
        kernels: &KernelSet,
        targets: Option<&[f64]>,
        state: &ConvergenceState,
        direction: &[f64],
        slope: f64,
    ) -> Result<Option<(Vec<f64>, DualSolution, f64)>> {
        let objective = state.objective();
        let mut step = max_feasible_step(state.weights(), direction);
        if !step.is_finite() {
            step = 1.0;
        }

        for _ in 0..self.max_line_search {
            let moved: Vec<f64> = state
                .weights()
                .iter()
                .zip(direction)
                .map(|(w, d)| w + step * d)
                .collect();
            let trial = project_onto_simplex(&moved);
            let trial_solution = self.solve_at(kernels, &trial, targets)?;
            let value = trial_solution.objective;

            if value <= objective - ARMIJO_SIGMA * step * slope && value < objective {
                return Ok(Some((trial, trial_solution, step)));
            }
            debug!("Rejected step {step:.3e}: objective {value:.6} vs {objective:.6}");
            step *= 0.5;
        }
        Ok(None)
    }
}
