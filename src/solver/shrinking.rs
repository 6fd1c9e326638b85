//! Shrinking heuristic
//!
//! Variables sitting at a bound whose gradient says they cannot re-enter the
//! working set are temporarily dropped from working-set selection and from
//! gradient updates. Before optimality is declared the gradient of every
//! dropped variable is reconstructed and the full set is checked again.

use crate::solver::smo::QpProblem;

/// Tracks which dual variables take part in working-set selection
#[derive(Debug, Clone)]
pub struct ShrinkingStrategy {
    /// Active variables in scan order
    active: Vec<usize>,
    /// Full scan order, restored on unshrink
    order: Vec<usize>,
    /// Iterations between shrinking passes
    period: usize,
    counter: usize,
}

impl ShrinkingStrategy {
    /// Create a strategy over variables scanned in `order`
    pub fn new(order: Vec<usize>, period: usize) -> Self {
        Self {
            active: order.clone(),
            order,
            period: period.max(1),
            counter: 0,
        }
    }

    /// Active variables in scan order
    pub fn active(&self) -> &[usize] {
        &self.active
    }

    /// Whether any variable is currently shrunk
    pub fn is_shrunk(&self) -> bool {
        self.active.len() < self.order.len()
    }

    /// Advance the iteration counter; true when a shrinking pass is due
    pub fn tick(&mut self) -> bool {
        self.counter += 1;
        if self.counter >= self.period {
            self.counter = 0;
            true
        } else {
            false
        }
    }

    /// Drop bound variables that cannot be selected given the current gradient.
    ///
    /// Returns the number of variables removed.
    pub fn shrink(&mut self, problem: &QpProblem<'_>, alpha: &[f64], grad: &[f64]) -> usize {
        let (gmax_up, gmax_low) = max_violations(problem, alpha, grad, &self.active);
        let before = self.active.len();
        self.active
            .retain(|&t| !be_shrunk(problem, alpha, grad, t, gmax_up, gmax_low));
        before - self.active.len()
    }

    /// Reactivate every variable, rebuilding the gradient of the shrunk ones.
    pub fn unshrink(&mut self, problem: &QpProblem<'_>, alpha: &[f64], grad: &mut [f64]) {
        let mut is_active = vec![false; self.order.len()];
        for &t in &self.active {
            is_active[t] = true;
        }
        let nonzero: Vec<usize> = (0..alpha.len()).filter(|&j| alpha[j] != 0.0).collect();
        for t in (0..self.order.len()).filter(|&t| !is_active[t]) {
            grad[t] = problem.p(t)
                + nonzero
                    .iter()
                    .map(|&j| problem.q(t, j) * alpha[j])
                    .sum::<f64>();
        }
        self.active = self.order.clone();
        self.counter = 0;
    }
}

/// max over I_up of -yG and max over I_low of yG
fn max_violations(
    problem: &QpProblem<'_>,
    alpha: &[f64],
    grad: &[f64],
    set: &[usize],
) -> (f64, f64) {
    let mut gmax_up = f64::NEG_INFINITY;
    let mut gmax_low = f64::NEG_INFINITY;
    for &t in set {
        let yg = problem.y(t) * grad[t];
        if problem.in_up(t, alpha[t]) {
            gmax_up = gmax_up.max(-yg);
        }
        if problem.in_low(t, alpha[t]) {
            gmax_low = gmax_low.max(yg);
        }
    }
    (gmax_up, gmax_low)
}

fn be_shrunk(
    problem: &QpProblem<'_>,
    alpha: &[f64],
    grad: &[f64],
    t: usize,
    gmax_up: f64,
    gmax_low: f64,
) -> bool {
    let positive = problem.y(t) > 0.0;
    if problem.at_upper(t, alpha[t]) {
        if positive {
            -grad[t] > gmax_up
        } else {
            -grad[t] > gmax_low
        }
    } else if problem.at_lower(alpha[t]) {
        if positive {
            grad[t] > gmax_low
        } else {
            grad[t] > gmax_up
        }
    } else {
        false
    }
}
