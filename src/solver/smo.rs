//! Sequential Minimal Optimization (SMO) over a precomputed kernel
//!
//! Solves the generic dual problem
//!
//! ```text
//! min  ½ aᵀQa + pᵀa
//! s.t. yᵀa = Δ,  0 ≤ aₜ ≤ Cₜ,  yₜ ∈ {-1, +1}
//! ```
//!
//! with `Q[s][t] = y_s y_t K[index_s][index_t]`. Classification, regression and
//! one-class duals are all instances of this form; they differ only in how
//! variables map onto kernel rows and in `p`, `y`, `C` and the starting point.
//! Working pairs are picked by maximal violation refined with second-order
//! gain, then optimised analytically with box clipping.

use crate::core::{GramMatrix, MKLError, Result};
use crate::solver::shrinking::ShrinkingStrategy;
use log::trace;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Curvature floor for non positive-definite pairs
const TAU: f64 = 1e-12;

/// One instance of the generic dual problem
#[derive(Debug, Clone)]
pub struct QpProblem<'a> {
    kernel: &'a GramMatrix,
    index: Vec<usize>,
    y: Vec<f64>,
    p: Vec<f64>,
    upper: Vec<f64>,
}

impl<'a> QpProblem<'a> {
    /// # Panics
    /// Panics if the per-variable vectors differ in length
    pub fn new(
        kernel: &'a GramMatrix,
        index: Vec<usize>,
        y: Vec<f64>,
        p: Vec<f64>,
        upper: Vec<f64>,
    ) -> Self {
        assert!(
            index.len() == y.len() && y.len() == p.len() && p.len() == upper.len(),
            "QP vectors must have same length"
        );
        Self {
            kernel,
            index,
            y,
            p,
            upper,
        }
    }

    /// Number of dual variables
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Kernel row of variable `t`
    pub fn index(&self, t: usize) -> usize {
        self.index[t]
    }

    #[inline]
    pub fn y(&self, t: usize) -> f64 {
        self.y[t]
    }

    #[inline]
    pub fn p(&self, t: usize) -> f64 {
        self.p[t]
    }

    #[inline]
    pub fn upper(&self, t: usize) -> f64 {
        self.upper[t]
    }

    /// Unsigned kernel value between the rows of two variables
    #[inline]
    pub fn k(&self, s: usize, t: usize) -> f64 {
        self.kernel.get(self.index[s], self.index[t])
    }

    /// Signed Hessian entry
    #[inline]
    pub fn q(&self, s: usize, t: usize) -> f64 {
        self.y[s] * self.y[t] * self.k(s, t)
    }

    #[inline]
    pub fn at_upper(&self, t: usize, a: f64) -> bool {
        a >= self.upper[t]
    }

    #[inline]
    pub fn at_lower(&self, a: f64) -> bool {
        a <= 0.0
    }

    /// Variable can move in the direction that increases yᵀa
    #[inline]
    pub fn in_up(&self, t: usize, a: f64) -> bool {
        if self.y[t] > 0.0 {
            !self.at_upper(t, a)
        } else {
            !self.at_lower(a)
        }
    }

    /// Variable can move in the direction that decreases yᵀa
    #[inline]
    pub fn in_low(&self, t: usize, a: f64) -> bool {
        if self.y[t] > 0.0 {
            !self.at_lower(a)
        } else {
            !self.at_upper(t, a)
        }
    }

    /// Reject kernels the solver cannot work with
    fn check_kernel(&self, tol: f64) -> Result<()> {
        let mut rows: Vec<usize> = self.index.clone();
        rows.sort_unstable();
        rows.dedup();
        for &r in &rows {
            let diag = self.kernel.get(r, r);
            if !diag.is_finite() {
                return Err(MKLError::solver(format!("non-finite kernel entry at ({r}, {r})")));
            }
            if diag < -tol {
                return Err(MKLError::solver(format!(
                    "kernel is numerically indefinite: K[{r}][{r}] = {diag}"
                )));
            }
            if let Some(&c) = rows.iter().find(|&&c| !self.kernel.get(r, c).is_finite()) {
                return Err(MKLError::solver(format!("non-finite kernel entry at ({r}, {c})")));
            }
        }
        Ok(())
    }
}

/// Configuration of the SMO solver
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// KKT violation tolerance
    pub tol: f64,
    /// Maximum number of pair updates before giving up
    pub max_iterations: usize,
    /// Enable shrinking heuristic
    pub shrinking: bool,
    /// Seed for the working-set scan order; `None` scans in index order
    pub seed: Option<u64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tol: 1e-3,
            max_iterations: 10_000_000,
            shrinking: true,
            seed: None,
        }
    }
}

/// Result of one SMO run
#[derive(Debug, Clone)]
pub struct QpSolution {
    /// Dual variables
    pub alpha: Vec<f64>,
    /// Offset: the decision function is Σ yₜaₜK(·) - rho
    pub rho: f64,
    /// Minimised value ½aᵀQa + pᵀa
    pub objective: f64,
    /// Number of pair updates performed
    pub iterations: usize,
}

/// SMO solver for the generic dual problem
pub struct SMOSolver {
    config: SolverConfig,
}

impl SMOSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solve `problem` starting from the feasible point `alpha0`
    pub fn solve(&self, problem: &QpProblem<'_>, alpha0: Vec<f64>) -> Result<QpSolution> {
        let n = problem.len();
        if n == 0 {
            return Err(MKLError::EmptyDataset);
        }
        if alpha0.len() != n {
            return Err(MKLError::DimensionMismatch {
                expected: n,
                actual: alpha0.len(),
            });
        }
        problem.check_kernel(self.config.tol)?;

        let mut alpha = alpha0;
        let mut grad = self.initial_gradient(problem, &alpha);

        let mut order: Vec<usize> = (0..n).collect();
        if let Some(seed) = self.config.seed {
            order.shuffle(&mut StdRng::seed_from_u64(seed));
        }
        let mut shrinking = ShrinkingStrategy::new(order, n.min(1000));

        let mut iterations = 0;
        loop {
            if self.config.shrinking && shrinking.tick() {
                let removed = shrinking.shrink(problem, &alpha, &grad);
                if removed > 0 {
                    trace!("Shrunk {removed} variables at iteration {iterations}");
                }
            }

            let pair = match self.select_working_set(problem, &alpha, &grad, shrinking.active()) {
                None if shrinking.is_shrunk() => {
                    // Optimal on the active set; recheck with every variable
                    shrinking.unshrink(problem, &alpha, &mut grad);
                    self.select_working_set(problem, &alpha, &grad, shrinking.active())
                }
                pair => pair,
            };
            let Some((i, j)) = pair else {
                break;
            };

            if iterations >= self.config.max_iterations {
                return Err(MKLError::solver(format!(
                    "dual solver did not reach tolerance {} within {} iterations",
                    self.config.tol, self.config.max_iterations
                )));
            }

            self.take_step(problem, i, j, &mut alpha, &mut grad, shrinking.active());
            iterations += 1;
        }

        let rho = self.calculate_rho(problem, &alpha, &grad);
        let objective = self.calculate_objective(problem, &alpha, &grad);
        if !objective.is_finite() || !rho.is_finite() {
            return Err(MKLError::solver("dual solver produced a non-finite solution"));
        }

        Ok(QpSolution {
            alpha,
            rho,
            objective,
            iterations,
        })
    }

    /// G = Qa + p
    fn initial_gradient(&self, problem: &QpProblem<'_>, alpha: &[f64]) -> Vec<f64> {
        let n = problem.len();
        let mut grad: Vec<f64> = (0..n).map(|t| problem.p(t)).collect();
        for j in (0..n).filter(|&j| alpha[j] != 0.0) {
            for (t, g) in grad.iter_mut().enumerate() {
                *g += problem.q(t, j) * alpha[j];
            }
        }
        grad
    }

    /// Pick the maximal violating variable `i`, then the partner `j` with the
    /// largest second-order decrease. `None` means the active set is optimal.
    fn select_working_set(
        &self,
        problem: &QpProblem<'_>,
        alpha: &[f64],
        grad: &[f64],
        active: &[usize],
    ) -> Option<(usize, usize)> {
        let mut gmax = f64::NEG_INFINITY;
        let mut best_i = None;
        for &t in active {
            if problem.in_up(t, alpha[t]) {
                let value = -problem.y(t) * grad[t];
                if value > gmax {
                    gmax = value;
                    best_i = Some(t);
                }
            }
        }
        let i = best_i?;

        let mut gmax2 = f64::NEG_INFINITY;
        let mut best_j = None;
        let mut obj_min = f64::INFINITY;
        let k_ii = problem.k(i, i);
        for &t in active {
            if !problem.in_low(t, alpha[t]) {
                continue;
            }
            let yg = problem.y(t) * grad[t];
            gmax2 = gmax2.max(yg);

            let grad_diff = gmax + yg;
            if grad_diff > 0.0 {
                let mut quad = k_ii + problem.k(t, t) - 2.0 * problem.k(i, t);
                if quad <= 0.0 {
                    quad = TAU;
                }
                let obj_diff = -(grad_diff * grad_diff) / quad;
                if obj_diff < obj_min {
                    obj_min = obj_diff;
                    best_j = Some(t);
                }
            }
        }

        if gmax + gmax2 < self.config.tol {
            return None;
        }
        best_j.map(|j| (i, j))
    }

    /// Analytic two-variable update with clipping to the feasible box
    fn take_step(
        &self,
        problem: &QpProblem<'_>,
        i: usize,
        j: usize,
        alpha: &mut [f64],
        grad: &mut [f64],
        active: &[usize],
    ) {
        let c_i = problem.upper(i);
        let c_j = problem.upper(j);
        let old_i = alpha[i];
        let old_j = alpha[j];

        let mut quad = problem.k(i, i) + problem.k(j, j) - 2.0 * problem.k(i, j);
        if quad <= 0.0 {
            quad = TAU;
        }

        if problem.y(i) != problem.y(j) {
            let delta = (-grad[i] - grad[j]) / quad;
            let diff = alpha[i] - alpha[j];
            alpha[i] += delta;
            alpha[j] += delta;

            if diff > 0.0 {
                if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = diff;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = -diff;
            }
            if diff > c_i - c_j {
                if alpha[i] > c_i {
                    alpha[i] = c_i;
                    alpha[j] = c_i - diff;
                }
            } else if alpha[j] > c_j {
                alpha[j] = c_j;
                alpha[i] = c_j + diff;
            }
        } else {
            let delta = (grad[i] - grad[j]) / quad;
            let sum = alpha[i] + alpha[j];
            alpha[i] -= delta;
            alpha[j] += delta;

            if sum > c_i {
                if alpha[i] > c_i {
                    alpha[i] = c_i;
                    alpha[j] = sum - c_i;
                }
            } else if alpha[j] < 0.0 {
                alpha[j] = 0.0;
                alpha[i] = sum;
            }
            if sum > c_j {
                if alpha[j] > c_j {
                    alpha[j] = c_j;
                    alpha[i] = sum - c_j;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = sum;
            }
        }

        let delta_i = alpha[i] - old_i;
        let delta_j = alpha[j] - old_j;
        for &t in active {
            grad[t] += problem.q(t, i) * delta_i + problem.q(t, j) * delta_j;
        }
    }

    /// Offset from free variables, or the midpoint of the feasible interval
    /// when every variable sits at a bound
    fn calculate_rho(&self, problem: &QpProblem<'_>, alpha: &[f64], grad: &[f64]) -> f64 {
        let mut upper_bound = f64::INFINITY;
        let mut lower_bound = f64::NEG_INFINITY;
        let mut free_sum = 0.0;
        let mut n_free = 0usize;

        for t in 0..problem.len() {
            let yg = problem.y(t) * grad[t];
            let positive = problem.y(t) > 0.0;
            if problem.at_upper(t, alpha[t]) {
                if positive {
                    lower_bound = lower_bound.max(yg);
                } else {
                    upper_bound = upper_bound.min(yg);
                }
            } else if problem.at_lower(alpha[t]) {
                if positive {
                    upper_bound = upper_bound.min(yg);
                } else {
                    lower_bound = lower_bound.max(yg);
                }
            } else {
                n_free += 1;
                free_sum += yg;
            }
        }

        if n_free > 0 {
            free_sum / n_free as f64
        } else {
            (upper_bound + lower_bound) / 2.0
        }
    }

    /// ½aᵀQa + pᵀa computed from the maintained gradient
    fn calculate_objective(&self, problem: &QpProblem<'_>, alpha: &[f64], grad: &[f64]) -> f64 {
        0.5 * (0..problem.len())
            .map(|t| alpha[t] * (grad[t] + problem.p(t)))
            .sum::<f64>()
    }
}
