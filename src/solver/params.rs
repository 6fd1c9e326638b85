//! Sub-solver parameters, one set per estimator variant
//!
//! None of these carry a kernel or a seed: both belong to the MKL layer.

use crate::core::{MKLError, Result};
use crate::solver::smo::SolverConfig;
use serde::{Deserialize, Serialize};

fn default_c() -> f64 {
    1.0
}

fn default_tol() -> f64 {
    1e-3
}

fn default_shrinking() -> bool {
    true
}

fn default_max_iterations() -> usize {
    10_000_000
}

fn default_svr_epsilon() -> f64 {
    0.1
}

fn default_nu() -> f64 {
    0.5
}

fn check_common(tol: f64, max_iterations: usize) -> Result<()> {
    if !(tol > 0.0 && tol.is_finite()) {
        return Err(MKLError::config(format!("svm tol must be positive, got {tol}")));
    }
    if max_iterations == 0 {
        return Err(MKLError::config("svm max_iterations must be positive"));
    }
    Ok(())
}

/// C-SVC parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SvcParams {
    #[serde(rename = "C", alias = "c", default = "default_c")]
    pub c: f64,
    #[serde(default = "default_tol")]
    pub tol: f64,
    #[serde(default = "default_shrinking")]
    pub shrinking: bool,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for SvcParams {
    fn default() -> Self {
        Self {
            c: default_c(),
            tol: default_tol(),
            shrinking: default_shrinking(),
            max_iterations: default_max_iterations(),
        }
    }
}

impl SvcParams {
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.c > 0.0 && self.c.is_finite()) {
            return Err(MKLError::config(format!("C must be positive, got {}", self.c)));
        }
        check_common(self.tol, self.max_iterations)
    }

    pub(crate) fn solver_config(&self, seed: Option<u64>) -> SolverConfig {
        SolverConfig {
            tol: self.tol,
            max_iterations: self.max_iterations,
            shrinking: self.shrinking,
            seed,
        }
    }
}

/// ε-SVR parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SvrParams {
    #[serde(rename = "C", alias = "c", default = "default_c")]
    pub c: f64,
    /// Half-width of the insensitive tube
    #[serde(rename = "epsilon", default = "default_svr_epsilon")]
    pub epsilon_insensitive: f64,
    #[serde(default = "default_tol")]
    pub tol: f64,
    #[serde(default = "default_shrinking")]
    pub shrinking: bool,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for SvrParams {
    fn default() -> Self {
        Self {
            c: default_c(),
            epsilon_insensitive: default_svr_epsilon(),
            tol: default_tol(),
            shrinking: default_shrinking(),
            max_iterations: default_max_iterations(),
        }
    }
}

impl SvrParams {
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_epsilon_insensitive(mut self, epsilon: f64) -> Self {
        self.epsilon_insensitive = epsilon;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.c > 0.0 && self.c.is_finite()) {
            return Err(MKLError::config(format!("C must be positive, got {}", self.c)));
        }
        if !(self.epsilon_insensitive >= 0.0 && self.epsilon_insensitive.is_finite()) {
            return Err(MKLError::config(format!(
                "svr epsilon must be non-negative, got {}",
                self.epsilon_insensitive
            )));
        }
        check_common(self.tol, self.max_iterations)
    }

    pub(crate) fn solver_config(&self, seed: Option<u64>) -> SolverConfig {
        SolverConfig {
            tol: self.tol,
            max_iterations: self.max_iterations,
            shrinking: self.shrinking,
            seed,
        }
    }
}

/// One-class SVM parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OneClassParams {
    /// Upper bound on the outlier fraction, lower bound on the support fraction
    #[serde(default = "default_nu")]
    pub nu: f64,
    #[serde(default = "default_tol")]
    pub tol: f64,
    #[serde(default = "default_shrinking")]
    pub shrinking: bool,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for OneClassParams {
    fn default() -> Self {
        Self {
            nu: default_nu(),
            tol: default_tol(),
            shrinking: default_shrinking(),
            max_iterations: default_max_iterations(),
        }
    }
}

impl OneClassParams {
    pub fn with_nu(mut self, nu: f64) -> Self {
        self.nu = nu;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.nu > 0.0 && self.nu <= 1.0) {
            return Err(MKLError::config(format!("nu must be in (0, 1], got {}", self.nu)));
        }
        check_common(self.tol, self.max_iterations)
    }

    pub(crate) fn solver_config(&self, seed: Option<u64>) -> SolverConfig {
        SolverConfig {
            tol: self.tol,
            max_iterations: self.max_iterations,
            shrinking: self.shrinking,
            seed,
        }
    }
}
