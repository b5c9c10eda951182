// Crate root: quantities with units and uncertainties, combined through
// symbolic formulas with automatic error propagation and dimension inference.
//
// `Workspace` is the entry point; `script::Interpreter` drives it from
// parsed commands.

pub mod analysis;
pub mod compute;
pub mod config;
pub mod display;
pub mod error;
pub mod script;
pub mod solver;
pub mod store;
pub mod workspace;

pub use analysis::{Dimension, Rational, UnitRegistry};
pub use compute::{Expr, Function};
pub use config::Config;
pub use error::{QuantityError, Result};
pub use store::{Quantity, QuantityId};
pub use workspace::{AssignArgs, FitArgs, Operand, PlotArgs, PlotItem, ValueInput, Workspace};
