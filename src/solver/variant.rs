//! Dual sub-solvers for the three estimator variants
//!
//! Every variant maps its dual problem onto [`QpProblem`] and runs the same
//! SMO solver on a precomputed kernel. The result is a [`DualSolution`]: one
//! or more machines with signed dual coefficients over the training samples,
//! plus the dual optimum in maximisation form.

use crate::core::{GramMatrix, MKLError, Result};
use crate::solver::params::{OneClassParams, SvcParams, SvrParams};
use crate::solver::smo::{QpProblem, SMOSolver};
use log::trace;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Estimator variant tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Classification,
    Regression,
    OneClass,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Variant::Classification => "classification",
            Variant::Regression => "regression",
            Variant::OneClass => "one-class",
        };
        f.write_str(name)
    }
}

/// One trained decision function `f(x) = Σ coefᵢ K(x, xᵢ) + bias`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DualMachine {
    /// Signed dual coefficients, one per training sample
    pub dual_coef: Vec<f64>,
    pub bias: f64,
    /// Training indices with non-zero coefficient
    pub support: Vec<usize>,
    /// (positive, negative) class for classification machines
    pub classes: Option<(f64, f64)>,
}

impl DualMachine {
    fn from_coef(dual_coef: Vec<f64>, rho: f64, classes: Option<(f64, f64)>) -> Self {
        let support = (0..dual_coef.len())
            .filter(|&i| dual_coef[i] != 0.0)
            .collect();
        Self {
            dual_coef,
            bias: -rho,
            support,
            classes,
        }
    }
}

/// Sub-solver output for one combined kernel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DualSolution {
    pub variant: Variant,
    pub machines: Vec<DualMachine>,
    /// Sorted distinct labels; empty unless classifying
    pub classes: Vec<f64>,
    /// Dual optimum summed over machines, in maximisation form
    pub objective: f64,
    /// SMO pair updates summed over machines
    pub iterations: usize,
}

impl DualSolution {
    /// Sorted training indices that are support vectors of any machine
    pub fn support_union(&self) -> Vec<usize> {
        let mut support: Vec<usize> = self
            .machines
            .iter()
            .flat_map(|m| m.support.iter().copied())
            .collect();
        support.sort_unstable();
        support.dedup();
        support
    }

    /// The same solution re-indexed onto the training samples `rows`.
    ///
    /// Coefficients outside `rows` are dropped; pass a superset of the
    /// support to keep every decision value unchanged.
    pub fn restrict(&self, rows: &[usize]) -> DualSolution {
        let machines = self
            .machines
            .iter()
            .map(|m| {
                let dual_coef = rows.iter().map(|&r| m.dual_coef[r]).collect();
                DualMachine::from_coef(dual_coef, -m.bias, m.classes)
            })
            .collect();
        DualSolution {
            machines,
            classes: self.classes.clone(),
            ..*self
        }
    }

    /// ∂J/∂wₘ for the kernel `kernel`: -½ Σ γᵀKₘγ over machines
    pub fn kernel_gradient(&self, kernel: &GramMatrix) -> f64 {
        -0.5 * self
            .machines
            .iter()
            .map(|m| kernel.quadratic_form(&m.dual_coef))
            .sum::<f64>()
    }

    /// Decision values for each row of `cross`, one per machine.
    ///
    /// `cross` holds the combined kernel between the rows and the training
    /// samples listed in `columns`.
    pub fn decision_values(&self, cross: &GramMatrix, columns: &[usize]) -> Vec<Vec<f64>> {
        (0..cross.n_rows())
            .map(|i| {
                let row = cross.row(i);
                self.machines
                    .iter()
                    .map(|m| {
                        columns
                            .iter()
                            .zip(row)
                            .map(|(&j, &k)| m.dual_coef[j] * k)
                            .sum::<f64>()
                            + m.bias
                    })
                    .collect()
            })
            .collect()
    }

    /// Map decision values to predictions
    ///
    /// Classification votes over machines with ties going to the lowest
    /// class, regression returns the value itself and one-class returns
    /// +1 for inliers and -1 for outliers.
    pub fn predict(&self, decisions: &[Vec<f64>]) -> Vec<f64> {
        match self.variant {
            Variant::Classification => decisions.iter().map(|d| self.vote(d)).collect(),
            Variant::Regression => decisions.iter().map(|d| d[0]).collect(),
            Variant::OneClass => decisions
                .iter()
                .map(|d| if d[0] > 0.0 { 1.0 } else { -1.0 })
                .collect(),
        }
    }

    fn vote(&self, decision: &[f64]) -> f64 {
        let mut votes = vec![0usize; self.classes.len()];
        for (machine, &value) in self.machines.iter().zip(decision) {
            let Some((positive, negative)) = machine.classes else {
                continue;
            };
            let winner = if value > 0.0 { positive } else { negative };
            if let Some(k) = self.classes.iter().position(|&c| c == winner) {
                votes[k] += 1;
            }
        }
        let mut best = 0;
        for (k, &count) in votes.iter().enumerate() {
            if count > votes[best] {
                best = k;
            }
        }
        self.classes.get(best).copied().unwrap_or(f64::NAN)
    }
}

/// A convex dual sub-solver over a precomputed combined kernel.
///
/// Implementations keep no state between calls.
pub trait DualSolver: Send + Sync {
    fn variant(&self) -> Variant;

    /// Check the sub-solver parameters
    fn validate(&self) -> Result<()>;

    /// Solve the dual on `kernel`; `targets` is `None` only for one-class
    fn solve(&self, kernel: &GramMatrix, targets: Option<&[f64]>) -> Result<DualSolution>;
}

fn require_targets<'a>(
    variant: Variant,
    kernel: &GramMatrix,
    targets: Option<&'a [f64]>,
) -> Result<&'a [f64]> {
    let targets =
        targets.ok_or_else(|| MKLError::config(format!("{variant} requires targets")))?;
    if targets.len() != kernel.n_rows() {
        return Err(MKLError::DimensionMismatch {
            expected: kernel.n_rows(),
            actual: targets.len(),
        });
    }
    if let Some(&bad) = targets.iter().find(|t| !t.is_finite()) {
        return Err(MKLError::InvalidLabel(bad));
    }
    Ok(targets)
}

/// Sorted distinct class labels
pub fn unique_classes(targets: &[f64]) -> Vec<f64> {
    let mut classes = targets.to_vec();
    classes.sort_by(f64::total_cmp);
    classes.dedup();
    classes
}

/// C-SVC; one-vs-one machines when there are more than two classes
#[derive(Debug, Clone)]
pub struct SvcSolver {
    params: SvcParams,
    seed: Option<u64>,
}

impl SvcSolver {
    pub fn new(params: SvcParams, seed: Option<u64>) -> Self {
        Self { params, seed }
    }

    /// Binary machine separating `positive` from `negative` on `rows`
    fn solve_pair(
        &self,
        kernel: &GramMatrix,
        targets: &[f64],
        rows: Vec<usize>,
        positive: f64,
        negative: f64,
    ) -> Result<(DualMachine, f64, usize)> {
        let y: Vec<f64> = rows
            .iter()
            .map(|&r| if targets[r] == positive { 1.0 } else { -1.0 })
            .collect();
        let m = rows.len();
        let problem = QpProblem::new(
            kernel,
            rows.clone(),
            y.clone(),
            vec![-1.0; m],
            vec![self.params.c; m],
        );
        let solution =
            SMOSolver::new(self.params.solver_config(self.seed)).solve(&problem, vec![0.0; m])?;

        let mut dual_coef = vec![0.0; targets.len()];
        for (t, &r) in rows.iter().enumerate() {
            dual_coef[r] = y[t] * solution.alpha[t];
        }
        trace!(
            "SVC machine {positive} vs {negative}: {} iterations, rho = {}",
            solution.iterations,
            solution.rho
        );
        let machine = DualMachine::from_coef(dual_coef, solution.rho, Some((positive, negative)));
        Ok((machine, -solution.objective, solution.iterations))
    }
}

impl DualSolver for SvcSolver {
    fn variant(&self) -> Variant {
        Variant::Classification
    }

    fn validate(&self) -> Result<()> {
        self.params.validate()
    }

    fn solve(&self, kernel: &GramMatrix, targets: Option<&[f64]>) -> Result<DualSolution> {
        let targets = require_targets(self.variant(), kernel, targets)?;
        let classes = unique_classes(targets);
        if classes.len() < 2 {
            return Err(MKLError::InvalidDataset(
                "classification needs at least two classes".into(),
            ));
        }

        let mut machines = Vec::new();
        let mut objective = 0.0;
        let mut iterations = 0;

        if classes.len() == 2 {
            let rows = (0..targets.len()).collect();
            let (machine, obj, iters) =
                self.solve_pair(kernel, targets, rows, classes[1], classes[0])?;
            machines.push(machine);
            objective += obj;
            iterations += iters;
        } else {
            for a in 0..classes.len() {
                for b in a + 1..classes.len() {
                    let rows = (0..targets.len())
                        .filter(|&r| targets[r] == classes[a] || targets[r] == classes[b])
                        .collect();
                    let (machine, obj, iters) =
                        self.solve_pair(kernel, targets, rows, classes[a], classes[b])?;
                    machines.push(machine);
                    objective += obj;
                    iterations += iters;
                }
            }
        }

        Ok(DualSolution {
            variant: self.variant(),
            machines,
            classes,
            objective,
            iterations,
        })
    }
}

/// ε-insensitive support vector regression
#[derive(Debug, Clone)]
pub struct SvrSolver {
    params: SvrParams,
    seed: Option<u64>,
}

impl SvrSolver {
    pub fn new(params: SvrParams, seed: Option<u64>) -> Self {
        Self { params, seed }
    }
}

impl DualSolver for SvrSolver {
    fn variant(&self) -> Variant {
        Variant::Regression
    }

    fn validate(&self) -> Result<()> {
        self.params.validate()
    }

    fn solve(&self, kernel: &GramMatrix, targets: Option<&[f64]>) -> Result<DualSolution> {
        let targets = require_targets(self.variant(), kernel, targets)?;
        let n = targets.len();
        let eps = self.params.epsilon_insensitive;

        // Variables 0..n are αᵢ, n..2n are αᵢ*; both read kernel row i
        let index: Vec<usize> = (0..n).chain(0..n).collect();
        let y: Vec<f64> = (0..2 * n).map(|t| if t < n { 1.0 } else { -1.0 }).collect();
        let p: Vec<f64> = targets
            .iter()
            .map(|&t| eps - t)
            .chain(targets.iter().map(|&t| eps + t))
            .collect();
        let problem = QpProblem::new(kernel, index, y, p, vec![self.params.c; 2 * n]);
        let solution = SMOSolver::new(self.params.solver_config(self.seed))
            .solve(&problem, vec![0.0; 2 * n])?;

        let dual_coef = (0..n)
            .map(|i| solution.alpha[i] - solution.alpha[i + n])
            .collect();
        Ok(DualSolution {
            variant: self.variant(),
            machines: vec![DualMachine::from_coef(dual_coef, solution.rho, None)],
            classes: Vec::new(),
            objective: -solution.objective,
            iterations: solution.iterations,
        })
    }
}

/// ν one-class SVM for novelty and outlier detection
#[derive(Debug, Clone)]
pub struct OneClassSolver {
    params: OneClassParams,
    seed: Option<u64>,
}

impl OneClassSolver {
    pub fn new(params: OneClassParams, seed: Option<u64>) -> Self {
        Self { params, seed }
    }

    /// Feasible start with Σα = νn: the first ⌊νn⌋ entries at 1, then the remainder
    fn initial_alpha(&self, n: usize) -> Vec<f64> {
        let total = self.params.nu * n as f64;
        let full = (total.floor() as usize).min(n);
        let mut alpha = vec![0.0; n];
        alpha[..full].iter_mut().for_each(|a| *a = 1.0);
        if full < n {
            alpha[full] = total - full as f64;
        }
        alpha
    }
}

impl DualSolver for OneClassSolver {
    fn variant(&self) -> Variant {
        Variant::OneClass
    }

    fn validate(&self) -> Result<()> {
        self.params.validate()
    }

    fn solve(&self, kernel: &GramMatrix, _targets: Option<&[f64]>) -> Result<DualSolution> {
        let n = kernel.n_rows();
        if n == 0 {
            return Err(MKLError::EmptyDataset);
        }
        let problem = QpProblem::new(
            kernel,
            (0..n).collect(),
            vec![1.0; n],
            vec![0.0; n],
            vec![1.0; n],
        );
        let solution = SMOSolver::new(self.params.solver_config(self.seed))
            .solve(&problem, self.initial_alpha(n))?;

        Ok(DualSolution {
            variant: self.variant(),
            machines: vec![DualMachine::from_coef(solution.alpha, solution.rho, None)],
            classes: Vec::new(),
            objective: -solution.objective,
            iterations: solution.iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn linear_gram(points: &[f64]) -> GramMatrix {
        GramMatrix::from_rows(
            points
                .iter()
                .map(|&a| points.iter().map(|&b| a * b + 1.0).collect())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_svc_binary_separates_training_set() {
        let points = [2.0, 1.5, 1.0, -1.0, -1.5, -2.0];
        let labels = [1.0, 1.0, 1.0, 0.0, 0.0, 0.0];
        let kernel = linear_gram(&points);
        let solver = SvcSolver::new(SvcParams::default().with_c(10.0), None);

        let solution = solver.solve(&kernel, Some(&labels)).unwrap();
        assert_eq!(solution.machines.len(), 1);
        assert_eq!(solution.classes, vec![0.0, 1.0]);
        assert!(solution.objective > 0.0);

        let columns: Vec<usize> = (0..6).collect();
        let decisions = solution.decision_values(&kernel, &columns);
        assert_eq!(solution.predict(&decisions), labels.to_vec());

        // Σ γᵢ = 0 from the equality constraint
        let sum: f64 = solution.machines[0].dual_coef.iter().sum();
        assert_relative_eq!(sum, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_svc_one_vs_one() {
        let points: [f64; 6] = [-3.0, -2.8, 0.0, 0.2, 3.0, 2.8];
        let labels = [0.0, 0.0, 1.0, 1.0, 2.0, 2.0];
        let kernel = GramMatrix::from_rows(
            points
                .iter()
                .map(|&a| points.iter().map(|&b| (-(a - b) * (a - b)).exp()).collect())
                .collect(),
        )
        .unwrap();
        let solver = SvcSolver::new(SvcParams::default().with_c(10.0), Some(3));

        let solution = solver.solve(&kernel, Some(&labels)).unwrap();
        assert_eq!(solution.machines.len(), 3);
        assert_eq!(solution.machines[0].classes, Some((0.0, 1.0)));

        // The (0, 1) machine never touches class 2 samples
        assert_eq!(solution.machines[0].dual_coef[4], 0.0);
        assert_eq!(solution.machines[0].dual_coef[5], 0.0);

        let columns: Vec<usize> = (0..6).collect();
        let decisions = solution.decision_values(&kernel, &columns);
        assert_eq!(solution.predict(&decisions), labels.to_vec());
    }

    #[test]
    fn test_svc_needs_two_classes() {
        let kernel = linear_gram(&[1.0, 2.0]);
        let solver = SvcSolver::new(SvcParams::default(), None);
        assert!(matches!(
            solver.solve(&kernel, Some(&[1.0, 1.0])),
            Err(MKLError::InvalidDataset(_))
        ));
        assert!(matches!(
            solver.solve(&kernel, None),
            Err(MKLError::Configuration(_))
        ));
        assert!(matches!(
            solver.solve(&kernel, Some(&[1.0, f64::NAN])),
            Err(MKLError::InvalidLabel(_))
        ));
    }

    #[test]
    fn test_vote_ties_go_to_lowest_class() {
        let machine = |pos, neg| DualMachine {
            dual_coef: vec![],
            bias: 0.0,
            support: vec![],
            classes: Some((pos, neg)),
        };
        let solution = DualSolution {
            variant: Variant::Classification,
            machines: vec![machine(0.0, 1.0), machine(0.0, 2.0), machine(1.0, 2.0)],
            classes: vec![0.0, 1.0, 2.0],
            objective: 0.0,
            iterations: 0,
        };
        // 0 beats 1, 2 beats 0, 1 beats 2: one vote each
        assert_eq!(solution.predict(&[vec![1.0, -1.0, 1.0]]), vec![0.0]);
        // 1 beats 0, 2 beats 0, 2 beats 1
        assert_eq!(solution.predict(&[vec![-1.0, -1.0, -1.0]]), vec![2.0]);
    }

    #[test]
    fn test_svr_fits_within_tube() {
        let points = [0.0, 1.0, 2.0, 3.0, 4.0];
        let targets: Vec<f64> = points.iter().map(|x| 2.0 * x + 1.0).collect();
        let kernel = linear_gram(&points);
        let params = SvrParams::default()
            .with_c(100.0)
            .with_epsilon_insensitive(0.1);
        let solver = SvrSolver::new(
            SvrParams {
                tol: 1e-6,
                ..params
            },
            None,
        );

        let solution = solver.solve(&kernel, Some(&targets)).unwrap();
        let columns: Vec<usize> = (0..5).collect();
        let predictions = solution.predict(&solution.decision_values(&kernel, &columns));
        for (p, t) in predictions.iter().zip(&targets) {
            assert!((p - t).abs() <= 0.1 + 1e-3, "prediction {p} vs target {t}");
        }
    }

    #[test]
    fn test_one_class_alpha_sums_to_nu_n() {
        let points: [f64; 5] = [0.0, 0.1, -0.1, 0.05, 5.0];
        let kernel = GramMatrix::from_rows(
            points
                .iter()
                .map(|&a| points.iter().map(|&b| (-(a - b) * (a - b)).exp()).collect())
                .collect(),
        )
        .unwrap();
        let solver = OneClassSolver::new(OneClassParams::default().with_nu(0.3), None);
        assert_eq!(solver.initial_alpha(5), vec![1.0, 0.5, 0.0, 0.0, 0.0]);

        let solution = solver.solve(&kernel, None).unwrap();
        let total: f64 = solution.machines[0].dual_coef.iter().sum();
        assert_relative_eq!(total, 1.5, epsilon = 1e-9);
        assert!(solution.objective <= 0.0);
    }

    #[test]
    fn test_kernel_gradient_matches_quadratic_form() {
        let kernel = GramMatrix::from_rows(vec![vec![2.0, 1.0], vec![1.0, 3.0]]).unwrap();
        let solution = DualSolution {
            variant: Variant::Regression,
            machines: vec![DualMachine::from_coef(vec![1.0, -1.0], 0.0, None)],
            classes: vec![],
            objective: 0.0,
            iterations: 0,
        };
        // γᵀKγ = 2 - 2 + 3 = 3
        assert_relative_eq!(solution.kernel_gradient(&kernel), -1.5);
        assert_eq!(solution.support_union(), vec![0, 1]);
    }
}
