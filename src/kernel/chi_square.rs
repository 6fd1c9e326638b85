//! Chi-square kernel implementation
//!
//! K(x, y) = exp(-γ * Σᵢ (xᵢ - yᵢ)² / (xᵢ + yᵢ)), meant for non-negative
//! histogram-like features. Terms with xᵢ + yᵢ ≤ 0 are skipped.

use crate::core::SparseVector;
use crate::kernel::Kernel;

#[derive(Debug, Clone, Copy)]
pub struct ChiSquareKernel {
    pub gamma: f64,
}

impl ChiSquareKernel {
    /// # Panics
    /// Panics if gamma is not positive
    pub fn new(gamma: f64) -> Self {
        assert!(gamma > 0.0, "Gamma must be positive, got: {}", gamma);
        Self { gamma }
    }
}

impl Kernel for ChiSquareKernel {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64 {
        (-self.gamma * chi_square_distance(x, y)).exp()
    }

    fn name(&self) -> &str {
        "chi2"
    }
}

fn chi_square_distance(x: &SparseVector, y: &SparseVector) -> f64 {
    // A term where only one side is non-zero reduces to that value.
    let single = |v: f64| if v > 0.0 { v } else { 0.0 };

    let mut distance = 0.0;
    let mut i = 0;
    let mut j = 0;

    while i < x.indices.len() && j < y.indices.len() {
        if x.indices[i] == y.indices[j] {
            let sum = x.values[i] + y.values[j];
            if sum > 0.0 {
                let diff = x.values[i] - y.values[j];
                distance += diff * diff / sum;
            }
            i += 1;
            j += 1;
        } else if x.indices[i] < y.indices[j] {
            distance += single(x.values[i]);
            i += 1;
        } else {
            distance += single(y.values[j]);
            j += 1;
        }
    }

    distance += x.values[i..].iter().map(|&v| single(v)).sum::<f64>();
    distance += y.values[j..].iter().map(|&v| single(v)).sum::<f64>();
    distance
}
