//! Geometry of the probability simplex {w : w ≥ 0, Σw = 1}

/// Weights at or below this value are treated as zero when pinning
pub const ZERO_WEIGHT: f64 = 1e-12;

/// Uniform point over `n` kernels
pub fn uniform(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

/// Euclidean projection of `v` onto the probability simplex.
///
/// Sort-based algorithm of Duchi et al. (2008), O(n log n).
pub fn project_onto_simplex(v: &[f64]) -> Vec<f64> {
    if v.is_empty() {
        return Vec::new();
    }
    let mut sorted = v.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mut cumulative = 0.0;
    let mut theta = 0.0;
    for (j, &u) in sorted.iter().enumerate() {
        cumulative += u;
        let candidate = (cumulative - 1.0) / (j + 1) as f64;
        if u - candidate > 0.0 {
            theta = candidate;
        }
    }

    let mut w: Vec<f64> = v.iter().map(|&x| (x - theta).max(0.0)).collect();
    // Remove rounding drift so the sum is 1 up to one ulp
    let total: f64 = w.iter().sum();
    if total > 0.0 {
        w.iter_mut().for_each(|x| *x /= total);
    }
    w
}

/// Negative gradient projected onto {Σd = 0}, with components that would
/// push a zero weight negative pinned at zero.
///
/// Pinning repeats until no further component needs it, since removing one
/// shifts the mean of the rest.
pub fn descent_direction(weights: &[f64], gradient: &[f64]) -> Vec<f64> {
    let n = weights.len();
    let mut free = vec![true; n];
    let mut direction = vec![0.0; n];

    loop {
        let n_free = free.iter().filter(|&&f| f).count();
        if n_free == 0 {
            return vec![0.0; n];
        }
        let mean = (0..n).filter(|&m| free[m]).map(|m| gradient[m]).sum::<f64>() / n_free as f64;

        let mut pinned = false;
        for m in 0..n {
            direction[m] = if free[m] { mean - gradient[m] } else { 0.0 };
            if free[m] && weights[m] <= ZERO_WEIGHT && direction[m] < 0.0 {
                free[m] = false;
                pinned = true;
            }
        }
        if !pinned {
            return direction;
        }
    }
}

/// Largest step along `direction` that keeps every weight non-negative
pub fn max_feasible_step(weights: &[f64], direction: &[f64]) -> f64 {
    weights
        .iter()
        .zip(direction)
        .filter(|(_, &d)| d < 0.0)
        .map(|(&w, &d)| w / -d)
        .fold(f64::INFINITY, f64::min)
}

/// Relative duality gap of the simplex-constrained problem.
///
/// `Σ wₘgₘ - min gₘ` is zero exactly when every kernel with positive weight
/// attains the smallest gradient component.
pub fn duality_gap(weights: &[f64], gradient: &[f64], objective: f64) -> f64 {
    let weighted: f64 = weights.iter().zip(gradient).map(|(w, g)| w * g).sum();
    let min_grad = gradient.iter().copied().fold(f64::INFINITY, f64::min);
    (weighted - min_grad).max(0.0) / objective.abs().max(f64::EPSILON)
}

pub fn squared_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum()
}

/// max |aᵢ - bᵢ|
pub fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_projection_properties() {
        let cases: [&[f64]; 5] = [
            &[0.2, 0.3, 0.5],
            &[3.0, -1.0, 0.5],
            &[-5.0, -4.0],
            &[0.0, 0.0, 0.0, 0.0],
            &[1e6, 1e6 + 1.0],
        ];
        for v in cases {
            let w = project_onto_simplex(v);
            assert!(w.iter().all(|&x| x >= 0.0), "{w:?}");
            assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_projection_fixes_points_on_simplex() {
        let v = [0.25, 0.25, 0.5];
        let w = project_onto_simplex(&v);
        for (a, b) in v.iter().zip(&w) {
            assert_relative_eq!(a, b, epsilon = 1e-15);
        }
        assert_eq!(project_onto_simplex(&[2.0, 0.0]), vec![1.0, 0.0]);
        assert_eq!(project_onto_simplex(&[0.7]), vec![1.0]);
    }

    #[test]
    fn test_descent_direction_sums_to_zero() {
        let d = descent_direction(&[0.3, 0.3, 0.4], &[-1.0, -2.0, -6.0]);
        assert_relative_eq!(d.iter().sum::<f64>(), 0.0, epsilon = 1e-12);
        // Most negative gradient gains weight
        assert!(d[2] > 0.0);
        assert!(d[0] < 0.0);
    }

    #[test]
    fn test_descent_direction_pins_zero_weights() {
        let d = descent_direction(&[0.0, 0.5, 0.5], &[5.0, -1.0, -3.0]);
        assert_eq!(d[0], 0.0);
        assert_relative_eq!(d[1], -1.0);
        assert_relative_eq!(d[2], 1.0);

        // A single kernel can never move
        assert_eq!(descent_direction(&[1.0], &[-4.0]), vec![0.0]);
    }

    #[test]
    fn test_max_feasible_step() {
        assert_relative_eq!(max_feasible_step(&[0.5, 0.5], &[-1.0, 1.0]), 0.5);
        assert_relative_eq!(max_feasible_step(&[0.2, 0.8], &[1.0, -2.0]), 0.4);
        assert!(max_feasible_step(&[0.5, 0.5], &[0.0, 0.0]).is_infinite());
    }

    #[test]
    fn test_duality_gap() {
        // All weight on the smallest gradient component: stationary
        assert_eq!(duality_gap(&[1.0, 0.0], &[-3.0, -1.0], 2.0), 0.0);
        // (0.5·-3 + 0.5·-1) + 3 = 1, relative to |J| = 2
        assert_relative_eq!(duality_gap(&[0.5, 0.5], &[-3.0, -1.0], 2.0), 0.5);
    }
}
