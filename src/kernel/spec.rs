//! Kernel specifications
//!
//! A [`KernelSpec`] says where one Gram matrix of the combination comes from:
//! a caller-supplied precomputed matrix, a named kernel with parameters, or a
//! caller-supplied kernel function.

use crate::core::{MKLError, Result};
use crate::kernel::{
    ChiSquareKernel, Kernel, LinearKernel, PolynomialKernel, RBFKernel, SigmoidKernel,
};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

/// Kernel functions available by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelName {
    Linear,
    Poly,
    Rbf,
    Sigmoid,
    Chi2,
}

impl KernelName {
    pub fn as_str(&self) -> &'static str {
        match self {
            KernelName::Linear => "linear",
            KernelName::Poly => "poly",
            KernelName::Rbf => "rbf",
            KernelName::Sigmoid => "sigmoid",
            KernelName::Chi2 => "chi2",
        }
    }
}

impl fmt::Display for KernelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KernelName {
    type Err = MKLError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(KernelName::Linear),
            "poly" | "polynomial" => Ok(KernelName::Poly),
            "rbf" | "gaussian" => Ok(KernelName::Rbf),
            "sigmoid" => Ok(KernelName::Sigmoid),
            "chi2" | "chi_square" => Ok(KernelName::Chi2),
            "precomputed" => Err(MKLError::config(
                "'precomputed' cannot be mixed into a list of kernel functions",
            )),
            other => Err(MKLError::config(format!("unknown kernel '{other}'"))),
        }
    }
}

/// Parameters of a named kernel. Unset fields take per-kernel defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KernelParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degree: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coef0: Option<f64>,
}

impl KernelParams {
    pub fn gamma(gamma: f64) -> Self {
        Self {
            gamma: Some(gamma),
            ..Self::default()
        }
    }

    pub fn with_degree(mut self, degree: u32) -> Self {
        self.degree = Some(degree);
        self
    }

    pub fn with_coef0(mut self, coef0: f64) -> Self {
        self.coef0 = Some(coef0);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.gamma.is_none() && self.degree.is_none() && self.coef0.is_none()
    }

    /// Parse `gamma=0.5,degree=2,coef0=1` (empty string means defaults)
    pub fn parse(s: &str) -> Result<Self> {
        let mut params = Self::default();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| MKLError::Parse(format!("expected key=value, got '{pair}'")))?;
            let bad = |_| MKLError::Parse(format!("invalid value for {key}: '{value}'"));
            match key.trim() {
                "gamma" => params.gamma = Some(value.trim().parse().map_err(bad)?),
                "coef0" => params.coef0 = Some(value.trim().parse().map_err(bad)?),
                "degree" => {
                    params.degree = Some(value.trim().parse().map_err(|_| {
                        MKLError::Parse(format!("invalid value for degree: '{value}'"))
                    })?)
                }
                other => {
                    return Err(MKLError::Parse(format!("unknown kernel parameter '{other}'")))
                }
            }
        }
        Ok(params)
    }
}

/// One entry of a kernel list: a named kernel or a kernel function
#[derive(Clone)]
pub enum KernelChoice {
    Named(KernelName),
    Function(Arc<dyn Kernel>),
}

impl KernelChoice {
    pub fn function<K: Kernel + 'static>(kernel: K) -> Self {
        KernelChoice::Function(Arc::new(kernel))
    }
}

impl From<KernelName> for KernelChoice {
    fn from(name: KernelName) -> Self {
        KernelChoice::Named(name)
    }
}

impl fmt::Debug for KernelChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelChoice::Named(name) => write!(f, "Named({name})"),
            KernelChoice::Function(kernel) => write!(f, "Function({})", kernel.name()),
        }
    }
}

/// Where the Gram matrices come from
#[derive(Debug, Clone, Default)]
pub enum Kernels {
    /// The caller passes N Gram matrices to fit and N cross matrices to predict
    #[default]
    Precomputed,
    List(Vec<KernelChoice>),
}

impl Kernels {
    pub fn named<I: IntoIterator<Item = KernelName>>(names: I) -> Self {
        Kernels::List(names.into_iter().map(KernelChoice::Named).collect())
    }

    pub fn is_precomputed(&self) -> bool {
        matches!(self, Kernels::Precomputed)
    }
}

/// Source of a single Gram matrix
#[derive(Clone)]
pub enum KernelSource {
    /// Position in the caller's list of precomputed matrices
    Precomputed { index: usize },
    Named { name: KernelName, params: KernelParams },
    Function(Arc<dyn Kernel>),
}

/// A labelled kernel source
#[derive(Clone)]
pub struct KernelSpec {
    pub label: String,
    pub source: KernelSource,
}

impl fmt::Debug for KernelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelSpec")
            .field("label", &self.label)
            .finish()
    }
}

impl KernelSpec {
    pub fn precomputed(index: usize) -> Self {
        Self {
            label: format!("precomputed[{index}]"),
            source: KernelSource::Precomputed { index },
        }
    }

    pub fn named(name: KernelName, params: KernelParams) -> Self {
        Self {
            label: name.to_string(),
            source: KernelSource::Named { name, params },
        }
    }

    pub fn function(kernel: Arc<dyn Kernel>) -> Self {
        Self {
            label: kernel.name().to_string(),
            source: KernelSource::Function(kernel),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Build the kernel function for a training set with `n_features` columns.
    ///
    /// Returns `None` for precomputed specs, which have no function.
    pub fn instantiate(&self, n_features: usize) -> Result<Option<Arc<dyn Kernel>>> {
        let (name, params) = match &self.source {
            KernelSource::Precomputed { .. } => return Ok(None),
            KernelSource::Function(kernel) => return Ok(Some(Arc::clone(kernel))),
            KernelSource::Named { name, params } => (*name, *params),
        };

        let gamma = resolve_gamma(params.gamma, n_features, &self.label)?;
        let kernel: Arc<dyn Kernel> = match name {
            KernelName::Linear => Arc::new(LinearKernel::new()),
            KernelName::Rbf => Arc::new(RBFKernel::new(gamma)),
            KernelName::Chi2 => Arc::new(ChiSquareKernel::new(gamma)),
            KernelName::Sigmoid => {
                Arc::new(SigmoidKernel::new(gamma, finite_coef0(params.coef0, 0.0, &self.label)?))
            }
            KernelName::Poly => {
                let degree = params.degree.unwrap_or(3);
                if degree == 0 {
                    return Err(MKLError::config(format!(
                        "kernel '{}': degree must be positive",
                        self.label
                    )));
                }
                let coef0 = finite_coef0(params.coef0, 1.0, &self.label)?;
                Arc::new(PolynomialKernel::new(degree, gamma, coef0))
            }
        };
        Ok(Some(kernel))
    }

    /// Stable identity for caching; `None` when the spec cannot be fingerprinted
    pub fn fingerprint(&self, n_features: usize) -> Option<u64> {
        let mut hasher = DefaultHasher::new();
        match &self.source {
            KernelSource::Function(_) => return None,
            KernelSource::Precomputed { index } => {
                "precomputed".hash(&mut hasher);
                index.hash(&mut hasher);
            }
            KernelSource::Named { name, params } => {
                name.hash(&mut hasher);
                n_features.hash(&mut hasher);
                params.gamma.map(f64::to_bits).hash(&mut hasher);
                params.degree.hash(&mut hasher);
                params.coef0.map(f64::to_bits).hash(&mut hasher);
            }
        }
        Some(hasher.finish())
    }
}

fn resolve_gamma(gamma: Option<f64>, n_features: usize, label: &str) -> Result<f64> {
    match gamma {
        Some(g) if g > 0.0 && g.is_finite() => Ok(g),
        Some(g) => Err(MKLError::config(format!(
            "kernel '{label}': gamma must be positive and finite, got {g}"
        ))),
        None => Ok(1.0 / n_features.max(1) as f64),
    }
}

fn finite_coef0(coef0: Option<f64>, default: f64, label: &str) -> Result<f64> {
    match coef0 {
        Some(c) if !c.is_finite() => Err(MKLError::config(format!(
            "kernel '{label}': coef0 must be finite, got {c}"
        ))),
        Some(c) => Ok(c),
        None => Ok(default),
    }
}

/// Expand `kernels` and `kernels_params` into one spec per Gram matrix.
///
/// A single kernel is broadcast over several parameter sets; otherwise the
/// two lists must have equal length. Precomputed kernels resolve to
/// `n_precomputed` index specs and accept no parameters.
pub fn resolve_specs(
    kernels: &Kernels,
    kernels_params: Option<&[(String, KernelParams)]>,
    n_precomputed: usize,
) -> Result<Vec<KernelSpec>> {
    let choices = match kernels {
        Kernels::Precomputed => {
            if kernels_params.is_some() {
                return Err(MKLError::config(
                    "kernels_params cannot be used with precomputed kernels",
                ));
            }
            return Ok((0..n_precomputed).map(KernelSpec::precomputed).collect());
        }
        Kernels::List(choices) => choices,
    };

    if choices.is_empty() {
        return Err(MKLError::config("at least one kernel is required"));
    }

    let params: Vec<(Option<String>, KernelParams)> = match kernels_params {
        None => vec![(None, KernelParams::default()); choices.len()],
        Some([]) => return Err(MKLError::config("kernels_params must not be empty")),
        Some(list) => list
            .iter()
            .map(|(label, p)| (Some(label.clone()), *p))
            .collect(),
    };

    let pairs: Vec<(&KernelChoice, &(Option<String>, KernelParams))> =
        if choices.len() == params.len() {
            choices.iter().zip(params.iter()).collect()
        } else if choices.len() == 1 {
            params.iter().map(|p| (&choices[0], p)).collect()
        } else {
            return Err(MKLError::config(format!(
                "{} kernels cannot be paired with {} parameter sets",
                choices.len(),
                params.len()
            )));
        };

    pairs
        .into_iter()
        .map(|(choice, (label, params))| {
            let spec = match choice {
                KernelChoice::Named(name) => KernelSpec::named(*name, *params),
                KernelChoice::Function(kernel) => {
                    if !params.is_empty() {
                        return Err(MKLError::config(format!(
                            "kernel function '{}' captures its own parameters; \
                             pass empty params for it",
                            kernel.name()
                        )));
                    }
                    KernelSpec::function(Arc::clone(kernel))
                }
            };
            Ok(match label {
                Some(label) => spec.with_label(label.clone()),
                None => spec,
            })
        })
        .collect()
}
