//! Kernel trait definition

use crate::core::SparseVector;

/// Kernel function trait
///
/// A kernel function K(x, y) must satisfy Mercer's condition for the Gram
/// matrices it produces to be valid inputs to the dual solver. Positive
/// semi-definiteness is assumed, not verified.
pub trait Kernel: Send + Sync {
    /// Compute kernel value K(x, y)
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64;

    /// Short human readable name, used in logs
    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> Kernel for F
where
    F: Fn(&SparseVector, &SparseVector) -> f64 + Send + Sync,
{
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64 {
        self(x, y)
    }
}
