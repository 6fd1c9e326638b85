//! Core type definitions for MKL

use crate::core::{MKLError, Result};
use serde::{Deserialize, Serialize};

/// Sparse vector representation with sorted indices
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    /// Sorted indices of non-zero elements
    pub indices: Vec<usize>,
    /// Values corresponding to indices
    pub values: Vec<f64>,
}

impl SparseVector {
    /// Create a new sparse vector, ensuring indices are sorted
    pub fn new(indices: Vec<usize>, values: Vec<f64>) -> Self {
        assert_eq!(
            indices.len(),
            values.len(),
            "Indices and values must have same length"
        );

        let mut pairs: Vec<_> = indices.into_iter().zip(values).collect();
        pairs.sort_by_key(|&(idx, _)| idx);

        let (indices, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        Self { indices, values }
    }

    /// Build a sparse vector from a dense slice, dropping exact zeros
    pub fn from_dense(dense: &[f64]) -> Self {
        let (indices, values) = dense
            .iter()
            .enumerate()
            .filter(|(_, &v)| v != 0.0)
            .map(|(i, &v)| (i, v))
            .unzip();
        Self { indices, values }
    }

    /// Create an empty sparse vector
    pub fn empty() -> Self {
        Self {
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Get the value at a specific index (0 if not present)
    pub fn get(&self, index: usize) -> f64 {
        match self.indices.binary_search(&index) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    /// Compute squared L2 norm
    pub fn norm_squared(&self) -> f64 {
        self.values.iter().map(|&v| v * v).sum()
    }

    /// Number of non-zero elements
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// One past the largest stored index (0 for an empty vector)
    pub fn dim(&self) -> usize {
        self.indices.last().map_or(0, |&i| i + 1)
    }

    /// Check if vector is empty
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Training sample with features and target
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    /// Feature vector (sparse representation)
    pub features: SparseVector,
    /// Class label, regression target, or ignored for one-class
    pub label: f64,
}

impl Sample {
    /// Create a new sample
    pub fn new(features: SparseVector, label: f64) -> Self {
        Self { features, label }
    }
}

/// Dense row-major kernel matrix.
///
/// Training Gram matrices are square (n_samples × n_samples); matrices used
/// at inference time are n_test × n_train.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GramMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl GramMatrix {
    /// Wrap row-major data of the given shape
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(MKLError::DimensionMismatch {
                expected: rows * cols,
                actual: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Build a matrix from nested rows, all of which must have equal length
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for row in rows {
            if row.len() != n_cols {
                return Err(MKLError::DimensionMismatch {
                    expected: n_cols,
                    actual: row.len(),
                });
            }
            data.extend(row);
        }
        Ok(Self {
            rows: n_rows,
            cols: n_cols,
            data,
        })
    }

    /// All-zero matrix
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn n_rows(&self) -> usize {
        self.rows
    }

    pub fn n_cols(&self) -> usize {
        self.cols
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.cols + j] = value;
    }

    /// Row `i` as a slice
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Raw row-major storage
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// `self += weight * other`
    pub fn add_scaled(&mut self, weight: f64, other: &GramMatrix) -> Result<()> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(MKLError::DimensionMismatch {
                expected: self.rows * self.cols,
                actual: other.rows * other.cols,
            });
        }
        for (dst, &src) in self.data.iter_mut().zip(&other.data) {
            *dst += weight * src;
        }
        Ok(())
    }

    /// Sub-matrix with the given row and column indices
    pub fn select(&self, rows: &[usize], cols: &[usize]) -> GramMatrix {
        let mut data = Vec::with_capacity(rows.len() * cols.len());
        for &i in rows {
            let row = self.row(i);
            data.extend(cols.iter().map(|&j| row[j]));
        }
        GramMatrix {
            rows: rows.len(),
            cols: cols.len(),
            data,
        }
    }

    /// `coefᵀ K coef`, skipping zero coefficients
    pub fn quadratic_form(&self, coef: &[f64]) -> f64 {
        let nonzero: Vec<usize> = (0..coef.len()).filter(|&i| coef[i] != 0.0).collect();
        let mut total = 0.0;
        for &i in &nonzero {
            let row = self.row(i);
            let inner: f64 = nonzero.iter().map(|&j| row[j] * coef[j]).sum();
            total += coef[i] * inner;
        }
        total
    }

    /// Whether every entry is finite
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}
