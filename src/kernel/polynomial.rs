//! Polynomial kernel implementation
//!
//! K(x, y) = (γ * x^T y + coef0)^degree

use crate::core::SparseVector;
use crate::kernel::linear::dot_product_sparse;
use crate::kernel::Kernel;

#[derive(Debug, Clone, Copy)]
pub struct PolynomialKernel {
    pub degree: u32,
    pub gamma: f64,
    pub coef0: f64,
}

impl PolynomialKernel {
    /// # Panics
    /// Panics if degree is zero or gamma is not positive
    pub fn new(degree: u32, gamma: f64, coef0: f64) -> Self {
        assert!(degree > 0, "Degree must be positive");
        assert!(gamma > 0.0, "Gamma must be positive, got: {}", gamma);
        Self {
            degree,
            gamma,
            coef0,
        }
    }
}

impl Kernel for PolynomialKernel {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64 {
        (self.gamma * dot_product_sparse(x, y) + self.coef0).powi(self.degree as i32)
    }

    fn name(&self) -> &str {
        "poly"
    }
}
