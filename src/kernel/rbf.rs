//! RBF (Radial Basis Function) kernel implementation
//!
//! K(x, y) = exp(-γ * ||x - y||²)

use crate::core::SparseVector;
use crate::kernel::Kernel;

/// RBF kernel with width parameter gamma
#[derive(Debug, Clone, Copy)]
pub struct RBFKernel {
    gamma: f64,
}

impl RBFKernel {
    /// Create a new RBF kernel
    ///
    /// # Panics
    /// Panics if gamma is not positive
    pub fn new(gamma: f64) -> Self {
        assert!(gamma > 0.0, "Gamma must be positive, got: {}", gamma);
        Self { gamma }
    }
}

impl Kernel for RBFKernel {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64 {
        (-self.gamma * squared_euclidean_distance(x, y)).exp()
    }

    fn name(&self) -> &str {
        "rbf"
    }
}

/// ||x - y||² over the union of the two supports
pub(crate) fn squared_euclidean_distance(x: &SparseVector, y: &SparseVector) -> f64 {
    let mut distance_sq = 0.0;
    let mut i = 0;
    let mut j = 0;

    while i < x.indices.len() && j < y.indices.len() {
        let x_idx = x.indices[i];
        let y_idx = y.indices[j];

        if x_idx == y_idx {
            let diff = x.values[i] - y.values[j];
            distance_sq += diff * diff;
            i += 1;
            j += 1;
        } else if x_idx < y_idx {
            distance_sq += x.values[i] * x.values[i];
            i += 1;
        } else {
            distance_sq += y.values[j] * y.values[j];
            j += 1;
        }
    }

    distance_sq += x.values[i..].iter().map(|v| v * v).sum::<f64>();
    distance_sq += y.values[j..].iter().map(|v| v * v).sum::<f64>();
    distance_sq
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rbf_identical_vectors() {
        let kernel = RBFKernel::new(0.5);
        let x = SparseVector::new(vec![0, 3], vec![1.0, 2.0]);
        assert_eq!(kernel.compute(&x, &x), 1.0);
    }

    #[test]
    fn test_rbf_known_value() {
        let kernel = RBFKernel::new(0.5);
        let x = SparseVector::new(vec![0], vec![1.0]);
        let y = SparseVector::new(vec![1], vec![1.0]);

        // ||x - y||² = 2
        assert_relative_eq!(kernel.compute(&x, &y), (-1.0f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_squared_distance_tails() {
        let x = SparseVector::new(vec![0, 5, 9], vec![1.0, 2.0, 3.0]);
        let y = SparseVector::new(vec![5], vec![1.0]);
        assert_eq!(squared_euclidean_distance(&x, &y), 1.0 + 1.0 + 9.0);
        assert_eq!(squared_euclidean_distance(&y, &x), 11.0);
    }

    #[test]
    #[should_panic(expected = "Gamma must be positive")]
    fn test_rbf_invalid_gamma() {
        RBFKernel::new(0.0);
    }
}
