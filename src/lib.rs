//! Multiple Kernel Learning for support vector machines
//!
//! Learns a convex combination of kernels together with a C-SVC, ε-SVR or
//! ν one-class SVM, using the SimpleMKL reduced-gradient algorithm of
//! Rakotomamonjy et al., "SimpleMKL" (JMLR 2008).

pub mod api;
pub mod cache;
pub mod config;
pub mod core;
pub mod data;
pub mod kernel;
pub mod optimizer;
pub mod persistence;
pub mod provider;
pub mod solver;

// Re-export main types for convenience
pub use crate::api::{FittedModel, MKLClassifier, MKLRegressor, OneClassMKL};
pub use crate::cache::{CacheStats, KernelCache};
pub use crate::config::{Algorithm, EstimatorConfig, MKLParams};
pub use crate::core::traits::*;
pub use crate::core::types::*;
pub use crate::core::{MKLError, Result};
pub use crate::data::{CSVDataset, LibSVMDataset};
pub use crate::kernel::{Kernel, KernelName, KernelParams, Kernels};
pub use crate::optimizer::{ConvergenceReason, ConvergenceStatus, IterationRecord, MKLResult};
pub use crate::persistence::SavedModel;
pub use crate::provider::{KernelSet, MKLInput};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
