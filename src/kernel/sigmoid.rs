//! Sigmoid (hyperbolic tangent) kernel implementation
//!
//! K(x, y) = tanh(γ * x^T y + coef0). Not positive semi-definite for every
//! parameter choice; the dual solver reports indefiniteness it cannot absorb.

use crate::core::SparseVector;
use crate::kernel::linear::dot_product_sparse;
use crate::kernel::Kernel;

#[derive(Debug, Clone, Copy)]
pub struct SigmoidKernel {
    pub gamma: f64,
    pub coef0: f64,
}

impl SigmoidKernel {
    /// # Panics
    /// Panics if gamma is not positive
    pub fn new(gamma: f64, coef0: f64) -> Self {
        assert!(gamma > 0.0, "Gamma must be positive, got: {}", gamma);
        Self { gamma, coef0 }
    }
}

impl Kernel for SigmoidKernel {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64 {
        (self.gamma * dot_product_sparse(x, y) + self.coef0).tanh()
    }

    fn name(&self) -> &str {
        "sigmoid"
    }
}
