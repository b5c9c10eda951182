//! Dimension inference and least-squares fitting.
pub mod dimensions;
pub mod levenberg_marquardt;
pub mod problem;

pub use dimensions::DimensionSolver;
pub use levenberg_marquardt::LevenbergMarquardt;
pub use problem::{FitBackend, FitOutcome, FitProblem, Weighting};
