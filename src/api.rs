//! Estimator facades for multiple kernel learning
//!
//! Three estimators share one optimizer and differ only in the dual
//! sub-solver they drive and in their defaults:
//!
//! - [`MKLClassifier`]: C-SVC, one-vs-one for more than two classes
//! - [`MKLRegressor`]: ε-SVR
//! - [`OneClassMKL`]: ν one-class SVM for outlier detection
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use rmkl::api::MKLClassifier;
//! use rmkl::kernel::{KernelName, KernelParams, Kernels};
//! use rmkl::SparseVector;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let x = vec![
//!     SparseVector::from_dense(&[1.0, 0.5]),
//!     SparseVector::from_dense(&[-1.0, -0.5]),
//! ];
//! let y = vec![1.0, -1.0];
//!
//! let mut clf = MKLClassifier::new()
//!     .with_kernels(Kernels::named([KernelName::Rbf]))
//!     .with_kernels_params(vec![
//!         ("rbf".into(), KernelParams::gamma(0.1)),
//!         ("rbf".into(), KernelParams::gamma(1.0)),
//!     ])
//!     .with_max_iter(50);
//! clf.fit(&x, &y)?;
//! println!("weights: {:?}", clf.weights());
//! println!("predictions: {:?}", clf.predict(&x)?);
//! # Ok(())
//! # }
//! ```

use crate::cache::{CacheStats, KernelCache};
use crate::config::{Algorithm, EstimatorConfig, MKLParams};
use crate::core::{MKLError, Result};
use crate::kernel::{KernelParams, Kernels};
use crate::optimizer::{ConvergenceStatus, IterationRecord, MKLOptimizer, MKLResult};
use crate::persistence::SavedModel;
use crate::provider::{KernelBasis, KernelProvider, MKLInput};
use crate::solver::{
    unique_classes, DualSolution, DualSolver, OneClassParams, OneClassSolver, SvcParams, SvcSolver,
    SvrParams, SvrSolver, Variant,
};
use log::{debug, info};
use std::path::Path;

/// Default weight threshold of the regression and one-class estimators
pub const DEFAULT_EPSILON: f64 = 1e-2;

/// Classifier weight threshold for two classes when none is configured
pub const BINARY_EPSILON: f64 = 1e-2;

/// Classifier weight threshold for more than two classes when none is configured.
///
/// One-vs-one sums the gradients of k(k-1)/2 machines, so it is coarser.
pub const MULTICLASS_EPSILON: f64 = 1e-1;

/// Everything inference needs from a fit
#[derive(Clone)]
pub struct FittedModel {
    result: MKLResult,
    basis: KernelBasis,
    /// Training indices that carry a non-zero coefficient in any machine
    support: Vec<usize>,
}

impl FittedModel {
    fn new(result: MKLResult, basis: KernelBasis) -> Self {
        let support = result.solution.support_union();
        Self {
            result,
            basis,
            support,
        }
    }

    pub fn variant(&self) -> Variant {
        self.result.solution.variant
    }

    pub fn weights(&self) -> &[f64] {
        &self.result.weights
    }

    /// Weight-convergence threshold resolved at fit time
    pub fn epsilon(&self) -> f64 {
        self.result.epsilon
    }

    pub fn result(&self) -> &MKLResult {
        &self.result
    }

    pub fn solution(&self) -> &DualSolution {
        &self.result.solution
    }

    pub fn basis(&self) -> &KernelBasis {
        &self.basis
    }

    pub fn support(&self) -> &[usize] {
        &self.support
    }

    /// Decision values of every machine for each input row
    pub fn decision_values(&self, input: MKLInput<'_>) -> Result<Vec<Vec<f64>>> {
        let cross = self
            .basis
            .cross_kernel(input, &self.result.weights, &self.support)?;
        Ok(self.result.solution.decision_values(&cross, &self.support))
    }

    pub fn predict(&self, input: MKLInput<'_>) -> Result<Vec<f64>> {
        let decisions = self.decision_values(input)?;
        Ok(self.result.solution.predict(&decisions))
    }
}

/// State shared by the three estimators
struct EstimatorCore {
    kernels: Kernels,
    kernels_params: Option<Vec<(String, KernelParams)>>,
    params: MKLParams,
    cache: KernelCache,
    fitted: Option<FittedModel>,
}

impl EstimatorCore {
    fn new(epsilon: Option<f64>) -> Self {
        Self {
            kernels: Kernels::default(),
            kernels_params: None,
            params: MKLParams {
                epsilon,
                ..MKLParams::default()
            },
            cache: KernelCache::default(),
            fitted: None,
        }
    }

    /// Validate, compute the kernel set and run the optimizer.
    ///
    /// Every configuration check happens before any kernel is evaluated.
    fn fit(
        &mut self,
        solver: &dyn DualSolver,
        input: MKLInput<'_>,
        targets: Option<&[f64]>,
        default_epsilon: f64,
    ) -> Result<()> {
        self.params.validate()?;
        solver.validate()?;
        KernelProvider::new(&self.kernels, self.kernels_params.as_deref()).validate()?;

        let epsilon = match self.params.epsilon {
            Some(epsilon) => epsilon,
            None => {
                debug!("No epsilon configured, using {default_epsilon}");
                default_epsilon
            }
        };

        self.fitted = None;
        let mut provider = KernelProvider::new(&self.kernels, self.kernels_params.as_deref());
        if self.params.precompute_kernels {
            provider = provider.with_cache(&mut self.cache);
        }
        let (kernels, basis) = provider.compute(input, targets.map(<[f64]>::len))?;

        info!(
            "Fitting {} MKL over {} kernels and {} samples ({} algorithm)",
            solver.variant(),
            kernels.len(),
            kernels.n_samples(),
            self.params.algo
        );
        let result = MKLOptimizer::new(solver, &self.params, epsilon).optimize(&kernels, targets)?;
        info!(
            "MKL {} after {} iterations, weights {:?}",
            result.status, result.iterations, result.weights
        );

        self.fitted = Some(FittedModel::new(result, basis));
        Ok(())
    }

    fn fitted(&self) -> Result<&FittedModel> {
        self.fitted.as_ref().ok_or(MKLError::ModelNotFitted)
    }
}

/// Builder setters and accessors common to every estimator
macro_rules! mkl_estimator_common {
    ($estimator:ty) => {
        impl $estimator {
            /// Kernel sources: precomputed matrices or a list of kernels
            pub fn with_kernels(mut self, kernels: Kernels) -> Self {
                self.core.kernels = kernels;
                self
            }

            /// Per-kernel parameters as (kernel name, parameters) pairs
            pub fn with_kernels_params(mut self, params: Vec<(String, KernelParams)>) -> Self {
                self.core.kernels_params = Some(params);
                self
            }

            pub fn with_precompute_kernels(mut self, precompute: bool) -> Self {
                self.core.params.precompute_kernels = precompute;
                self
            }

            pub fn with_algo(mut self, algo: Algorithm) -> Self {
                self.core.params.algo = algo;
                self
            }

            pub fn with_epsilon(mut self, epsilon: f64) -> Self {
                self.core.params.epsilon = Some(epsilon);
                self
            }

            pub fn with_tol(mut self, tol: f64) -> Self {
                self.core.params.tol = tol;
                self
            }

            pub fn with_verbose(mut self, verbose: bool) -> Self {
                self.core.params.verbose = verbose;
                self
            }

            /// Iteration ceiling; `None` is unbounded
            pub fn with_max_iter(mut self, max_iter: impl Into<Option<usize>>) -> Self {
                self.core.params.max_iter = max_iter.into();
                self
            }

            pub fn with_random_state(mut self, seed: u64) -> Self {
                self.core.params.random_state = Some(seed);
                self
            }

            /// Replace every MKL option at once
            pub fn with_mkl_params(mut self, params: MKLParams) -> Self {
                self.core.params = params;
                self
            }

            pub fn mkl_params(&self) -> &MKLParams {
                &self.core.params
            }

            pub fn kernels(&self) -> &Kernels {
                &self.core.kernels
            }

            pub fn is_fitted(&self) -> bool {
                self.core.fitted.is_some()
            }

            /// Learned kernel weights
            pub fn weights(&self) -> Option<&[f64]> {
                self.core.fitted.as_ref().map(FittedModel::weights)
            }

            pub fn status(&self) -> Option<ConvergenceStatus> {
                self.core.fitted.as_ref().map(|f| f.result.status)
            }

            /// Number of optimizer iterations of the last fit
            /// Threshold the last fit used, after resolving an unset epsilon
            pub fn fitted_epsilon(&self) -> Option<f64> {
                self.core.fitted.as_ref().map(FittedModel::epsilon)
            }

            pub fn n_iter(&self) -> Option<usize> {
                self.core.fitted.as_ref().map(|f| f.result.iterations)
            }

            pub fn history(&self) -> &[IterationRecord] {
                self.core
                    .fitted
                    .as_ref()
                    .map(|f| f.result.history.as_slice())
                    .unwrap_or_default()
            }

            pub fn dual_solution(&self) -> Option<&DualSolution> {
                self.core.fitted.as_ref().map(FittedModel::solution)
            }

            pub fn fitted_model(&self) -> Option<&FittedModel> {
                self.core.fitted.as_ref()
            }

            pub fn cache_stats(&self) -> CacheStats {
                self.core.cache.stats()
            }

            pub fn clear_cache(&mut self) {
                self.core.cache.clear();
            }

            /// Serializable snapshot of the fitted model
            pub fn to_saved_model(&self) -> Result<SavedModel> {
                SavedModel::from_fitted(self.core.fitted()?, &self.core.params)
            }

            pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
                self.to_saved_model()?.save_to_file(path)
            }
        }
    };
}

/// Multiple kernel classifier
pub struct MKLClassifier {
    core: EstimatorCore,
    svm: SvcParams,
}

impl MKLClassifier {
    /// No epsilon is set: fit picks [`BINARY_EPSILON`] or [`MULTICLASS_EPSILON`]
    pub fn new() -> Self {
        Self {
            core: EstimatorCore::new(None),
            svm: SvcParams::default(),
        }
    }

    pub fn from_config(config: &EstimatorConfig) -> Result<Self> {
        Ok(Self::new()
            .with_mkl_params(config.mkl.clone())
            .with_svm(config.svc_params()?))
    }

    pub fn with_svm(mut self, params: SvcParams) -> Self {
        self.svm = params;
        self
    }

    pub fn svm_params(&self) -> &SvcParams {
        &self.svm
    }

    pub fn fit<'a>(&mut self, input: impl Into<MKLInput<'a>>, y: &[f64]) -> Result<&mut Self> {
        let default_epsilon = if unique_classes(y).len() > 2 {
            MULTICLASS_EPSILON
        } else {
            BINARY_EPSILON
        };
        let solver = SvcSolver::new(self.svm, self.core.params.random_state);
        self.core.fit(&solver, input.into(), Some(y), default_epsilon)?;
        Ok(self)
    }

    pub fn predict<'a>(&self, input: impl Into<MKLInput<'a>>) -> Result<Vec<f64>> {
        self.core.fitted()?.predict(input.into())
    }

    /// One value per one-vs-one machine for each sample; a single value for
    /// two classes, positive towards the larger label
    pub fn decision_function<'a>(&self, input: impl Into<MKLInput<'a>>) -> Result<Vec<Vec<f64>>> {
        self.core.fitted()?.decision_values(input.into())
    }

    /// Sorted class labels seen at fit
    pub fn classes(&self) -> Option<&[f64]> {
        self.core
            .fitted
            .as_ref()
            .map(|f| f.result.solution.classes.as_slice())
    }

    /// Mean accuracy on the given data
    pub fn score<'a>(&self, input: impl Into<MKLInput<'a>>, y: &[f64]) -> Result<f64> {
        let predictions = self.predict(input)?;
        check_len(y.len(), predictions.len())?;
        let correct = predictions.iter().zip(y).filter(|(p, t)| p == t).count();
        Ok(correct as f64 / y.len().max(1) as f64)
    }
}

impl Default for MKLClassifier {
    fn default() -> Self {
        Self::new()
    }
}

mkl_estimator_common!(MKLClassifier);

/// Multiple kernel regressor
pub struct MKLRegressor {
    core: EstimatorCore,
    svm: SvrParams,
}

impl MKLRegressor {
    pub fn new() -> Self {
        Self {
            core: EstimatorCore::new(Some(DEFAULT_EPSILON)),
            svm: SvrParams::default(),
        }
    }

    pub fn from_config(config: &EstimatorConfig) -> Result<Self> {
        let mut params = config.mkl.clone();
        params.epsilon = params.epsilon.or(Some(DEFAULT_EPSILON));
        Ok(Self::new()
            .with_mkl_params(params)
            .with_svm(config.svr_params()?))
    }

    pub fn with_svm(mut self, params: SvrParams) -> Self {
        self.svm = params;
        self
    }

    pub fn svm_params(&self) -> &SvrParams {
        &self.svm
    }

    pub fn fit<'a>(&mut self, input: impl Into<MKLInput<'a>>, y: &[f64]) -> Result<&mut Self> {
        let solver = SvrSolver::new(self.svm, self.core.params.random_state);
        self.core.fit(&solver, input.into(), Some(y), DEFAULT_EPSILON)?;
        Ok(self)
    }

    pub fn predict<'a>(&self, input: impl Into<MKLInput<'a>>) -> Result<Vec<f64>> {
        self.core.fitted()?.predict(input.into())
    }

    /// Coefficient of determination R²
    pub fn score<'a>(&self, input: impl Into<MKLInput<'a>>, y: &[f64]) -> Result<f64> {
        let predictions = self.predict(input)?;
        check_len(y.len(), predictions.len())?;
        if y.is_empty() {
            return Err(MKLError::EmptyDataset);
        }
        let mean = y.iter().sum::<f64>() / y.len() as f64;
        let ss_res: f64 = predictions.iter().zip(y).map(|(p, t)| (t - p).powi(2)).sum();
        let ss_tot: f64 = y.iter().map(|t| (t - mean).powi(2)).sum();
        Ok(if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 })
    }
}

impl Default for MKLRegressor {
    fn default() -> Self {
        Self::new()
    }
}

mkl_estimator_common!(MKLRegressor);

/// Multiple kernel one-class SVM for outlier detection
pub struct OneClassMKL {
    core: EstimatorCore,
    svm: OneClassParams,
}

impl OneClassMKL {
    pub fn new() -> Self {
        Self {
            core: EstimatorCore::new(Some(DEFAULT_EPSILON)),
            svm: OneClassParams::default(),
        }
    }

    pub fn from_config(config: &EstimatorConfig) -> Result<Self> {
        let mut params = config.mkl.clone();
        params.epsilon = params.epsilon.or(Some(DEFAULT_EPSILON));
        Ok(Self::new()
            .with_mkl_params(params)
            .with_svm(config.one_class_params()?))
    }

    pub fn with_svm(mut self, params: OneClassParams) -> Self {
        self.svm = params;
        self
    }

    pub fn svm_params(&self) -> &OneClassParams {
        &self.svm
    }

    pub fn fit<'a>(&mut self, input: impl Into<MKLInput<'a>>) -> Result<&mut Self> {
        let solver = OneClassSolver::new(self.svm, self.core.params.random_state);
        self.core.fit(&solver, input.into(), None, DEFAULT_EPSILON)?;
        Ok(self)
    }

    /// +1 for inliers, -1 for outliers
    pub fn predict<'a>(&self, input: impl Into<MKLInput<'a>>) -> Result<Vec<f64>> {
        self.core.fitted()?.predict(input.into())
    }

    /// Signed distance to the boundary; negative for outliers
    pub fn decision_function<'a>(&self, input: impl Into<MKLInput<'a>>) -> Result<Vec<f64>> {
        let decisions = self.core.fitted()?.decision_values(input.into())?;
        Ok(decisions.into_iter().map(|d| d[0]).collect())
    }

    /// Unshifted scores: `decision_function + offset`
    pub fn score_samples<'a>(&self, input: impl Into<MKLInput<'a>>) -> Result<Vec<f64>> {
        let offset = self.offset().ok_or(MKLError::ModelNotFitted)?;
        Ok(self
            .decision_function(input)?
            .into_iter()
            .map(|d| d + offset)
            .collect())
    }

    /// Threshold subtracted from the raw scores
    pub fn offset(&self) -> Option<f64> {
        self.core
            .fitted
            .as_ref()
            .and_then(|f| f.result.solution.machines.first())
            .map(|m| -m.bias)
    }
}

impl Default for OneClassMKL {
    fn default() -> Self {
        Self::new()
    }
}

mkl_estimator_common!(OneClassMKL);

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(MKLError::DimensionMismatch { expected, actual });
    }
    Ok(())
}
