//! Kernel matrix provider
//!
//! Turns kernel specifications plus training input into the ordered set of
//! Gram matrices the optimizer combines, and later evaluates the same kernels
//! between new samples and the training set for inference.

use crate::cache::{data_fingerprint, KernelCache};
use crate::core::{GramMatrix, MKLError, Result, SparseVector};
use crate::kernel::{resolve_specs, Kernel, KernelParams, KernelSpec, Kernels};
use log::debug;
use rayon::prelude::*;
use std::sync::Arc;

/// Input to fit and inference
#[derive(Debug, Clone, Copy)]
pub enum MKLInput<'a> {
    /// One matrix per kernel: train × train at fit, test × train at inference
    Gram(&'a [GramMatrix]),
    /// Raw samples for kernel functions
    Samples(&'a [SparseVector]),
}

impl<'a> MKLInput<'a> {
    /// Number of samples described by the input
    pub fn n_rows(&self) -> usize {
        match self {
            MKLInput::Gram(matrices) => matrices.first().map_or(0, GramMatrix::n_rows),
            MKLInput::Samples(samples) => samples.len(),
        }
    }
}

impl<'a> From<&'a [GramMatrix]> for MKLInput<'a> {
    fn from(matrices: &'a [GramMatrix]) -> Self {
        MKLInput::Gram(matrices)
    }
}

impl<'a> From<&'a Vec<GramMatrix>> for MKLInput<'a> {
    fn from(matrices: &'a Vec<GramMatrix>) -> Self {
        MKLInput::Gram(matrices)
    }
}

impl<'a> From<&'a [SparseVector]> for MKLInput<'a> {
    fn from(samples: &'a [SparseVector]) -> Self {
        MKLInput::Samples(samples)
    }
}

impl<'a> From<&'a Vec<SparseVector>> for MKLInput<'a> {
    fn from(samples: &'a Vec<SparseVector>) -> Self {
        MKLInput::Samples(samples)
    }
}

/// Ordered, immutable set of N training Gram matrices of identical shape
#[derive(Debug, Clone)]
pub struct KernelSet {
    matrices: Vec<Arc<GramMatrix>>,
    labels: Vec<String>,
}

impl KernelSet {
    /// Build a set, checking every matrix is square with the same side
    pub fn new(matrices: Vec<Arc<GramMatrix>>, labels: Vec<String>) -> Result<Self> {
        let first = matrices
            .first()
            .ok_or_else(|| MKLError::config("at least one kernel matrix is required"))?;
        let n = first.n_rows();
        for (matrix, label) in matrices.iter().zip(&labels) {
            if !matrix.is_square() || matrix.n_rows() != n {
                return Err(MKLError::config(format!(
                    "kernel '{label}' has shape {}x{}, expected {n}x{n}",
                    matrix.n_rows(),
                    matrix.n_cols()
                )));
            }
        }
        Ok(Self { matrices, labels })
    }

    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    pub fn n_samples(&self) -> usize {
        self.matrices[0].n_rows()
    }

    pub fn get(&self, m: usize) -> &GramMatrix {
        &self.matrices[m]
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Σ wₘ Kₘ, skipping zero weights
    pub fn combine(&self, weights: &[f64]) -> Result<GramMatrix> {
        if weights.len() != self.len() {
            return Err(MKLError::DimensionMismatch {
                expected: self.len(),
                actual: weights.len(),
            });
        }
        let n = self.n_samples();
        let mut combined = GramMatrix::zeros(n, n);
        for (matrix, &w) in self.matrices.iter().zip(weights) {
            if w != 0.0 {
                combined.add_scaled(w, matrix)?;
            }
        }
        Ok(combined)
    }
}

/// What inference needs to evaluate the kernels of a fitted model again
#[derive(Clone)]
pub enum KernelBasis {
    /// Cross matrices are supplied by the caller
    Precomputed { n_kernels: usize, n_train: usize },
    /// Kernel functions plus the training samples they are evaluated against
    Functions {
        specs: Vec<KernelSpec>,
        kernels: Vec<Arc<dyn Kernel>>,
        train: Vec<SparseVector>,
    },
}

impl KernelBasis {
    pub fn n_kernels(&self) -> usize {
        match self {
            KernelBasis::Precomputed { n_kernels, .. } => *n_kernels,
            KernelBasis::Functions { kernels, .. } => kernels.len(),
        }
    }

    pub fn n_train(&self) -> usize {
        match self {
            KernelBasis::Precomputed { n_train, .. } => *n_train,
            KernelBasis::Functions { train, .. } => train.len(),
        }
    }

    /// Combined kernel between `input` rows and the training samples in `columns`.
    ///
    /// Only kernels with non-zero weight are evaluated.
    pub fn cross_kernel(
        &self,
        input: MKLInput<'_>,
        weights: &[f64],
        columns: &[usize],
    ) -> Result<GramMatrix> {
        match (self, input) {
            (KernelBasis::Precomputed { n_kernels, n_train }, MKLInput::Gram(matrices)) => {
                if matrices.len() != *n_kernels {
                    return Err(MKLError::config(format!(
                        "expected {n_kernels} precomputed matrices, got {}",
                        matrices.len()
                    )));
                }
                let n_test = input.n_rows();
                let rows: Vec<usize> = (0..n_test).collect();
                let mut combined = GramMatrix::zeros(n_test, columns.len());
                for (m, (matrix, &w)) in matrices.iter().zip(weights).enumerate() {
                    if matrix.n_rows() != n_test || matrix.n_cols() != *n_train {
                        return Err(MKLError::config(format!(
                            "precomputed matrix {m} has shape {}x{}, expected {n_test}x{n_train}",
                            matrix.n_rows(),
                            matrix.n_cols()
                        )));
                    }
                    if w != 0.0 {
                        combined.add_scaled(w, &matrix.select(&rows, columns))?;
                    }
                }
                Ok(combined)
            }
            (KernelBasis::Functions { kernels, train, .. }, MKLInput::Samples(samples)) => {
                let mut combined = GramMatrix::zeros(samples.len(), columns.len());
                for (kernel, &w) in kernels.iter().zip(weights) {
                    if w == 0.0 {
                        continue;
                    }
                    for (i, x) in samples.iter().enumerate() {
                        for (c, &j) in columns.iter().enumerate() {
                            let value = combined.get(i, c) + w * kernel.compute(x, &train[j]);
                            combined.set(i, c, value);
                        }
                    }
                }
                Ok(combined)
            }
            (KernelBasis::Precomputed { .. }, MKLInput::Samples(_)) => Err(MKLError::config(
                "model was fitted on precomputed kernels; pass precomputed matrices",
            )),
            (KernelBasis::Functions { .. }, MKLInput::Gram(_)) => Err(MKLError::config(
                "model was fitted with kernel functions; pass samples",
            )),
        }
    }
}

/// Computes the training kernel set from specs and input
pub struct KernelProvider<'a> {
    kernels: &'a Kernels,
    kernels_params: Option<&'a [(String, KernelParams)]>,
    cache: Option<&'a mut KernelCache>,
}

impl<'a> KernelProvider<'a> {
    pub fn new(kernels: &'a Kernels, kernels_params: Option<&'a [(String, KernelParams)]>) -> Self {
        Self {
            kernels,
            kernels_params,
            cache: None,
        }
    }

    /// Reuse and store training Gram matrices in `cache`
    pub fn with_cache(mut self, cache: &'a mut KernelCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Check the kernel configuration without touching any data
    pub fn validate(&self) -> Result<()> {
        resolve_specs(self.kernels, self.kernels_params, 1).map(|_| ())
    }

    /// Build the kernel set for `input`.
    ///
    /// `n_targets` is the label count the matrices must agree with, when labels
    /// exist.
    pub fn compute(
        &mut self,
        input: MKLInput<'_>,
        n_targets: Option<usize>,
    ) -> Result<(KernelSet, KernelBasis)> {
        match (self.kernels.is_precomputed(), input) {
            (true, MKLInput::Gram(matrices)) => self.from_precomputed(matrices, n_targets),
            (false, MKLInput::Samples(samples)) => self.from_samples(samples, n_targets),
            (true, MKLInput::Samples(_)) => Err(MKLError::config(
                "kernels are 'precomputed' but samples were given; pass Gram matrices",
            )),
            (false, MKLInput::Gram(_)) => Err(MKLError::config(
                "kernel functions are configured but Gram matrices were given; pass samples",
            )),
        }
    }

    fn from_precomputed(
        &self,
        matrices: &[GramMatrix],
        n_targets: Option<usize>,
    ) -> Result<(KernelSet, KernelBasis)> {
        let specs = resolve_specs(self.kernels, self.kernels_params, matrices.len())?;
        let labels = specs.into_iter().map(|s| s.label).collect();
        let set = KernelSet::new(matrices.iter().cloned().map(Arc::new).collect(), labels)?;
        check_targets(set.n_samples(), n_targets)?;

        let basis = KernelBasis::Precomputed {
            n_kernels: set.len(),
            n_train: set.n_samples(),
        };
        Ok((set, basis))
    }

    fn from_samples(
        &mut self,
        samples: &[SparseVector],
        n_targets: Option<usize>,
    ) -> Result<(KernelSet, KernelBasis)> {
        if samples.is_empty() {
            return Err(MKLError::EmptyDataset);
        }
        check_targets(samples.len(), n_targets)?;

        let specs = resolve_specs(self.kernels, self.kernels_params, 0)?;
        let n_features = samples.iter().map(SparseVector::dim).max().unwrap_or(0).max(1);
        let kernels = specs
            .iter()
            .map(|spec| {
                spec.instantiate(n_features)?.ok_or_else(|| {
                    MKLError::config(format!("kernel '{}' has no kernel function", spec.label))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let data_key = self.cache.as_ref().map(|_| data_fingerprint(samples));
        let mut slots: Vec<Option<Arc<GramMatrix>>> = vec![None; specs.len()];
        if let (Some(cache), Some(data_key)) = (self.cache.as_deref_mut(), data_key) {
            for (slot, spec) in slots.iter_mut().zip(&specs) {
                if let Some(spec_key) = spec.fingerprint(n_features) {
                    *slot = cache.get(spec_key, data_key, samples.len());
                }
            }
        }

        let missing: Vec<usize> = (0..slots.len()).filter(|&m| slots[m].is_none()).collect();
        debug!(
            "Computing {} of {} Gram matrices over {} samples",
            missing.len(),
            slots.len(),
            samples.len()
        );
        let computed = compute_gram_matrices(&missing, &kernels, samples);

        for (m, matrix) in missing.into_iter().zip(computed) {
            let matrix = Arc::new(matrix);
            if let (Some(cache), Some(data_key)) = (self.cache.as_deref_mut(), data_key) {
                if let Some(spec_key) = specs[m].fingerprint(n_features) {
                    cache.put(spec_key, data_key, Arc::clone(&matrix));
                }
            }
            slots[m] = Some(matrix);
        }

        let matrices = slots.into_iter().flatten().collect();
        let labels = specs.iter().map(|s| s.label.clone()).collect();
        let set = KernelSet::new(matrices, labels)?;
        let basis = KernelBasis::Functions {
            specs,
            kernels,
            train: samples.to_vec(),
        };
        Ok((set, basis))
    }
}

fn check_targets(n_samples: usize, n_targets: Option<usize>) -> Result<()> {
    match n_targets {
        Some(n) if n != n_samples => Err(MKLError::config(format!(
            "kernel matrices cover {n_samples} samples but {n} targets were given"
        ))),
        _ => Ok(()),
    }
}

/// Evaluate the kernels at `indices` in parallel, in index order
fn compute_gram_matrices(
    indices: &[usize],
    kernels: &[Arc<dyn Kernel>],
    samples: &[SparseVector],
) -> Vec<GramMatrix> {
    indices
        .par_iter()
        .map(|&m| gram_matrix(kernels[m].as_ref(), samples))
        .collect()
}

/// Symmetric Gram matrix of one kernel over `samples`
pub fn gram_matrix(kernel: &dyn Kernel, samples: &[SparseVector]) -> GramMatrix {
    let n = samples.len();
    let mut matrix = GramMatrix::zeros(n, n);
    for i in 0..n {
        for j in i..n {
            let value = kernel.compute(&samples[i], &samples[j]);
            matrix.set(i, j, value);
            matrix.set(j, i, value);
        }
    }
    matrix
}
