//! Dimension algebra, unit resolution and dependency analysis.
pub mod dimension;
pub mod topology;
pub mod units;

pub use dimension::{Dimension, Rational};
pub use units::{adjust_to_unit, Adjusted, ResolvedUnit, UnitRegistry};
