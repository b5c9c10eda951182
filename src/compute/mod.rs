//! Builds and evaluates formulas over quantities.
pub mod diff;
pub mod engine;
pub mod expr;
pub mod kernel;

pub use engine::{Engine, Propagated};
pub use expr::{BinaryOp, Expr, Function};
