//! Error types shared by every stage of quantity construction.
use crate::analysis::dimension::Dimension;
use std::fmt;
use thiserror::Error;

/// Why the dimension solver could not produce a unique assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveFailure {
    /// No assignment satisfies every constraint.
    Inconsistent,
    /// Some unknowns are not pinned down by the formula.
    Underdetermined { free: Vec<String> },
}

impl fmt::Display for SolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveFailure::Inconsistent => write!(f, "the dimension constraints are inconsistent"),
            SolveFailure::Underdetermined { free } => {
                write!(f, "the dimensions of {} are not determined", free.join(", "))
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum QuantityError {
    #[error("Dimension mismatch in {context}: {expected} != {found}")]
    DimensionMismatch {
        context: String,
        expected: Dimension,
        found: Dimension,
    },
    #[error("Shape mismatch: {left:?} and {right:?} can't be adjusted by duplicating")]
    ShapeMismatch { left: Vec<usize>, right: Vec<usize> },
    #[error("Finding dimensions was not successful ({reason}). Specify units manually.")]
    UnsolvableDimensions { reason: SolveFailure },
    #[error("Quantity '{name}' doesn't have an error formula")]
    MissingDerivation { name: String },
    #[error("Unknown {kind} backend '{name}'")]
    UnknownBackend { kind: &'static str, name: String },
    #[error("Unknown unit '{symbol}'")]
    UnknownUnit { symbol: String },
    #[error("Invalid unit expression '{expression}'")]
    InvalidUnitExpression { expression: String },
    #[error("Dimension of quantity '{name}' is not known yet")]
    UnknownDimension { name: String },
    #[error("Quantity '{name}' is a placeholder without a value")]
    Unresolved { name: String },
    #[error("Quantity '{name}' already has a value")]
    AlreadyResolved { name: String },
    #[error("Definition of '{name}' depends on itself")]
    CyclicDefinition { name: String },
    #[error("No quantity with id {id}")]
    UnknownQuantity { id: u32 },
    #[error("No quantity named '{name}'")]
    UnknownName { name: String },
    #[error("Exponent {exponent} can't be applied to a dimensionful base")]
    UnsupportedExponent { exponent: String },
    #[error("Quantity '{name}' has no error")]
    MissingError { name: String },
    #[error("Fit did not converge after {iterations} iterations")]
    NonConvergence { iterations: usize },
    #[error("Invalid fit data: {reason}")]
    InvalidFitData { reason: String },
    #[error("Can't parse formula '{formula}': {reason}")]
    InvalidFormula { formula: String, reason: String },
    #[error("Line {line}: {reason}")]
    InvalidScript { line: usize, reason: String },
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl QuantityError {
    pub(crate) fn mismatch(context: impl Into<String>, expected: &Dimension, found: &Dimension) -> Self {
        QuantityError::DimensionMismatch {
            context: context.into(),
            expected: expected.clone(),
            found: found.clone(),
        }
    }
}

pub type Result<T> = std::result::Result<T, QuantityError>;
