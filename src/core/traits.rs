//! Core traits for MKL

use crate::core::{Sample, SparseVector};

/// Dataset abstraction for efficient data access
pub trait Dataset: Send + Sync {
    /// Number of samples in the dataset
    fn len(&self) -> usize;

    /// Number of features (dimensionality)
    fn dim(&self) -> usize;

    /// Get a single sample by index
    ///
    /// # Panics
    /// Panics if index >= len()
    fn get_sample(&self, i: usize) -> Sample;

    /// Get all labels as a vector
    fn get_labels(&self) -> Vec<f64>;

    /// Feature vectors in dataset order
    fn features(&self) -> Vec<SparseVector> {
        (0..self.len())
            .map(|i| self.get_sample(i).features)
            .collect()
    }

    /// Check if the dataset is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
