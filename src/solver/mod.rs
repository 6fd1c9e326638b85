//! Dual sub-solvers
//!
//! A Sequential Minimal Optimization (SMO) solver over precomputed kernels,
//! and the classification, regression and one-class problems built on it.

pub mod params;
pub mod shrinking;
pub mod smo;
pub mod variant;

pub use self::params::{OneClassParams, SvcParams, SvrParams};
pub use self::shrinking::ShrinkingStrategy;
pub use self::smo::{QpProblem, QpSolution, SMOSolver, SolverConfig};
pub use self::variant::{
    unique_classes, DualMachine, DualSolution, DualSolver, OneClassSolver, SvcSolver, SvrSolver,
    Variant,
};
