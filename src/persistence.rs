//! Model serialization and persistence
//!
//! A fitted model is stored as JSON: the named kernel specs, the learned
//! weights, the support vectors and the dual solution re-indexed onto them.
//! Models fitted on precomputed matrices or on kernel functions cannot be
//! stored, since neither can be evaluated again from the file alone.

use crate::api::FittedModel;
use crate::config::MKLParams;
use crate::core::{MKLError, Result, SparseVector};
use crate::kernel::{KernelName, KernelParams, KernelSource, KernelSpec};
use crate::optimizer::ConvergenceStatus;
use crate::provider::{KernelBasis, MKLInput};
use crate::solver::{DualSolution, Variant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

/// One named kernel of a stored model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedKernel {
    pub name: KernelName,
    #[serde(default)]
    pub params: KernelParams,
}

/// Metadata for tracking and validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Library version used to create the model
    pub library_version: String,
    pub created_at: DateTime<Utc>,
    pub status: ConvergenceStatus,
    pub iterations: usize,
    pub n_support_vectors: usize,
    /// MKL options the model was fitted with
    pub params: MKLParams,
}

/// Serializable fitted model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedModel {
    pub variant: Variant,
    pub kernels: Vec<SavedKernel>,
    /// Feature count the kernel defaults were resolved against
    pub n_features: usize,
    pub weights: Vec<f64>,
    pub support_vectors: Vec<SparseVector>,
    /// Dual solution indexed by position in `support_vectors`
    pub solution: DualSolution,
    pub metadata: ModelMetadata,
}

impl SavedModel {
    /// Snapshot a fitted model
    pub fn from_fitted(fitted: &FittedModel, params: &MKLParams) -> Result<Self> {
        let KernelBasis::Functions { specs, train, .. } = fitted.basis() else {
            return Err(MKLError::Serialization(
                "models fitted on precomputed kernels cannot be saved".into(),
            ));
        };
        let kernels = specs
            .iter()
            .map(|spec| match &spec.source {
                KernelSource::Named { name, params } => Ok(SavedKernel {
                    name: *name,
                    params: *params,
                }),
                _ => Err(MKLError::Serialization(format!(
                    "kernel '{}' is a function and cannot be saved",
                    spec.label
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        let n_features = train.iter().map(SparseVector::dim).max().unwrap_or(0).max(1);
        let support = fitted.support();
        let result = fitted.result();

        Ok(Self {
            variant: fitted.variant(),
            kernels,
            n_features,
            weights: result.weights.clone(),
            support_vectors: support.iter().map(|&i| train[i].clone()).collect(),
            solution: result.solution.restrict(support),
            metadata: ModelMetadata {
                library_version: env!("CARGO_PKG_VERSION").to_string(),
                created_at: Utc::now(),
                status: result.status,
                iterations: result.iterations,
                n_support_vectors: support.len(),
                params: params.clone(),
            },
        })
    }

    /// Save model to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Load model from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let model: SavedModel = serde_json::from_reader(reader)?;
        model.check()?;
        Ok(model)
    }

    fn check(&self) -> Result<()> {
        if self.kernels.len() != self.weights.len() {
            return Err(MKLError::Serialization(format!(
                "{} kernels but {} weights",
                self.kernels.len(),
                self.weights.len()
            )));
        }
        let n_sv = self.support_vectors.len();
        if self.solution.machines.iter().any(|m| m.dual_coef.len() != n_sv) {
            return Err(MKLError::Serialization(
                "dual coefficients do not match the support vectors".into(),
            ));
        }
        Ok(())
    }

    fn basis(&self) -> Result<KernelBasis> {
        let specs: Vec<KernelSpec> = self
            .kernels
            .iter()
            .map(|k| KernelSpec::named(k.name, k.params))
            .collect();
        let kernels = specs
            .iter()
            .map(|spec| {
                spec.instantiate(self.n_features)?.ok_or_else(|| {
                    MKLError::Serialization(format!("kernel '{}' has no function", spec.label))
                })
            })
            .collect::<Result<Vec<Arc<_>>>>()?;
        Ok(KernelBasis::Functions {
            specs,
            kernels,
            train: self.support_vectors.clone(),
        })
    }

    /// Decision values of every machine for each sample
    pub fn decision_function(&self, samples: &[SparseVector]) -> Result<Vec<Vec<f64>>> {
        let columns: Vec<usize> = (0..self.support_vectors.len()).collect();
        let cross = self
            .basis()?
            .cross_kernel(MKLInput::Samples(samples), &self.weights, &columns)?;
        Ok(self.solution.decision_values(&cross, &columns))
    }

    pub fn predict(&self, samples: &[SparseVector]) -> Result<Vec<f64>> {
        let decisions = self.decision_function(samples)?;
        Ok(self.solution.predict(&decisions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MKLClassifier, OneClassMKL};
    use crate::core::GramMatrix;
    use crate::kernel::Kernels;
    use tempfile::NamedTempFile;

    fn toy() -> (Vec<SparseVector>, Vec<f64>) {
        let x = vec![
            SparseVector::from_dense(&[0.0, 1.0]),
            SparseVector::from_dense(&[0.5, 1.5]),
            SparseVector::from_dense(&[3.0, 0.0]),
            SparseVector::from_dense(&[3.5, 0.5]),
            SparseVector::from_dense(&[6.0, 2.0]),
            SparseVector::from_dense(&[6.5, 2.5]),
        ];
        (x, vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0])
    }

    #[test]
    fn test_save_and_load_matches_estimator() {
        let (x, y) = toy();
        let mut clf = MKLClassifier::new()
            .with_kernels(Kernels::named([KernelName::Linear, KernelName::Rbf]))
            .with_max_iter(20)
            .with_random_state(1);
        clf.fit(&x, &y).unwrap();

        let file = NamedTempFile::new().unwrap();
        clf.save(file.path()).unwrap();
        let loaded = SavedModel::load_from_file(file.path()).unwrap();

        assert_eq!(loaded.variant, Variant::Classification);
        for (a, b) in loaded.weights.iter().zip(clf.weights().unwrap()) {
            approx::assert_relative_eq!(a, b, epsilon = 1e-15);
        }
        assert_eq!(loaded.predict(&x).unwrap(), clf.predict(&x).unwrap());

        let direct = clf.decision_function(&x).unwrap();
        let restored = loaded.decision_function(&x).unwrap();
        for (a, b) in direct.iter().flatten().zip(restored.iter().flatten()) {
            approx::assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_precomputed_models_cannot_be_saved() {
        let gram = GramMatrix::from_rows(vec![
            vec![1.0, 0.5, 0.1],
            vec![0.5, 1.0, 0.2],
            vec![0.1, 0.2, 1.0],
        ])
        .unwrap();
        let mut oc = OneClassMKL::new();
        oc.fit(&vec![gram]).unwrap();
        assert!(matches!(
            oc.to_saved_model(),
            Err(MKLError::Serialization(_))
        ));
    }

    #[test]
    fn test_function_kernels_cannot_be_saved() {
        let (x, _) = toy();
        let kernel = |a: &SparseVector, b: &SparseVector| -> f64 {
            (a.norm_squared() * b.norm_squared()).sqrt()
        };
        let mut oc = OneClassMKL::new().with_kernels(Kernels::List(vec![
            crate::kernel::KernelChoice::function(kernel),
        ]));
        oc.fit(&x).unwrap();
        assert!(matches!(
            oc.to_saved_model(),
            Err(MKLError::Serialization(_))
        ));
    }

    #[test]
    fn test_unfitted_model_cannot_be_saved() {
        let clf = MKLClassifier::new();
        assert!(matches!(clf.to_saved_model(), Err(MKLError::ModelNotFitted)));
    }
}
