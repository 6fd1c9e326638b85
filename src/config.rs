//! Estimator configuration
//!
//! MKL-owned options live in [`MKLParams`]; options of the dual sub-solver
//! live in one struct per variant ([`SvcParams`], [`SvrParams`],
//! [`OneClassParams`]). The two sets never overlap: the kernel and the random
//! seed can only be set on the MKL side.
//!
//! [`EstimatorConfig`] is the JSON document form used by the command line:
//!
//! ```json
//! {
//!   "mkl": { "epsilon": 0.01, "max_iter": 100, "random_state": 7 },
//!   "svm": { "C": 10.0 }
//! }
//! ```

use crate::core::{MKLError, Result};
pub use crate::solver::{OneClassParams, SvcParams, SvrParams};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Keys the sub-solver section may not carry, with the MKL option replacing them
const RESERVED_SVM_KEYS: &[(&str, &str)] =
    &[("kernel", "kernels"), ("random_state", "random_state")];

/// Weight update rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Projected gradient descent on the simplex with line search
    #[default]
    Simple,
    /// Uniform weights and a single sub-solve
    Average,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Simple => f.write_str("simple"),
            Algorithm::Average => f.write_str("average"),
        }
    }
}

impl FromStr for Algorithm {
    type Err = MKLError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "simple" => Ok(Algorithm::Simple),
            "average" => Ok(Algorithm::Average),
            other => Err(MKLError::config(format!("unknown algorithm '{other}'"))),
        }
    }
}

/// Options owned by the MKL layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MKLParams {
    pub algo: Algorithm,
    /// Weight-stability and duality-gap threshold; `None` lets the estimator pick
    pub epsilon: Option<f64>,
    /// Minimum objective improvement per accepted step
    pub tol: f64,
    /// Log per-iteration progress at info level
    pub verbose: bool,
    /// Iteration ceiling; `None` is unbounded
    pub max_iter: Option<usize>,
    /// Forwarded to the sub-solver for tie-breaking
    pub random_state: Option<u64>,
    /// Keep training Gram matrices between fits with identical data
    pub precompute_kernels: bool,
}

impl Default for MKLParams {
    fn default() -> Self {
        Self {
            algo: Algorithm::Simple,
            epsilon: None,
            tol: 1e-8,
            verbose: false,
            max_iter: None,
            random_state: None,
            precompute_kernels: true,
        }
    }
}

impl MKLParams {
    pub fn validate(&self) -> Result<()> {
        if let Some(epsilon) = self.epsilon {
            if !(epsilon > 0.0 && epsilon.is_finite()) {
                return Err(MKLError::config(format!("epsilon must be positive, got {epsilon}")));
            }
        }
        if !(self.tol > 0.0 && self.tol.is_finite()) {
            return Err(MKLError::config(format!("tol must be positive, got {}", self.tol)));
        }
        if self.max_iter == Some(0) {
            return Err(MKLError::config(
                "max_iter must be a positive integer or unbounded",
            ));
        }
        Ok(())
    }
}

/// JSON configuration document: MKL options plus a sub-solver section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EstimatorConfig {
    pub mkl: MKLParams,
    /// Raw sub-solver options, interpreted per variant
    pub svm: serde_json::Map<String, serde_json::Value>,
}

impl EstimatorConfig {
    /// Parse a configuration document.
    ///
    /// Reserved sub-solver keys are rejected before anything else is read.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| MKLError::config(format!("invalid config: {e}")))?;
        if let Some(svm) = value.get("svm").and_then(serde_json::Value::as_object) {
            check_reserved(svm)?;
        }
        let config: EstimatorConfig = serde_json::from_value(value)
            .map_err(|e| MKLError::config(format!("invalid config: {e}")))?;
        config.mkl.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn svc_params(&self) -> Result<SvcParams> {
        self.svm_params()
    }

    pub fn svr_params(&self) -> Result<SvrParams> {
        self.svm_params()
    }

    pub fn one_class_params(&self) -> Result<OneClassParams> {
        self.svm_params()
    }

    fn svm_params<T: DeserializeOwned>(&self) -> Result<T> {
        check_reserved(&self.svm)?;
        serde_json::from_value(serde_json::Value::Object(self.svm.clone()))
            .map_err(|e| MKLError::config(format!("invalid svm section: {e}")))
    }
}

fn check_reserved(svm: &serde_json::Map<String, serde_json::Value>) -> Result<()> {
    for (key, owner) in RESERVED_SVM_KEYS {
        if svm.contains_key(*key) {
            return Err(MKLError::config(format!(
                "'{key}' cannot be set on the svm section; \
                 it is owned by the MKL layer, use '{owner}'"
            )));
        }
    }
    Ok(())
}
