use crate::analysis::dimension::Dimension;
use crate::compute::expr::Expr;
use crate::error::{QuantityError, Result};
use ndarray::ArrayD;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct QuantityId(pub u32);

impl QuantityId {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
    pub fn new(idx: usize) -> Self { Self(idx as u32) }
}

impl fmt::Display for QuantityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a value or error came to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Derivation {
    Formula(Expr),
    /// Produced by a fit; displayed as the literal marker `fit`.
    Fit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuantityState {
    /// Declared (e.g. a fit parameter) but not computed yet.
    Placeholder,
    /// Value and error in base units.
    Resolved {
        value: ArrayD<f64>,
        error: Option<ArrayD<f64>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub name: String,
    pub longname: Option<String>,
    pub state: QuantityState,
    pub value_formula: Option<Derivation>,
    pub error_formula: Option<Derivation>,
    /// `None` until known; distinct from dimensionless.
    pub dim: Option<Dimension>,
    /// Display-only unit.
    pub prefer_unit: Option<String>,
}

impl Quantity {
    pub fn placeholder(name: impl Into<String>, longname: Option<String>) -> Self {
        Self {
            name: name.into(),
            longname,
            state: QuantityState::Placeholder,
            value_formula: None,
            error_formula: None,
            dim: None,
            prefer_unit: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.state, QuantityState::Resolved { .. })
    }

    pub fn value(&self) -> Result<&ArrayD<f64>> {
        match &self.state {
            QuantityState::Resolved { value, .. } => Ok(value),
            QuantityState::Placeholder => Err(QuantityError::Unresolved { name: self.name.clone() }),
        }
    }

    pub fn error(&self) -> Result<Option<&ArrayD<f64>>> {
        match &self.state {
            QuantityState::Resolved { error, .. } => Ok(error.as_ref()),
            QuantityState::Placeholder => Err(QuantityError::Unresolved { name: self.name.clone() }),
        }
    }

    pub fn dimension(&self) -> Result<&Dimension> {
        self.dim
            .as_ref()
            .ok_or_else(|| QuantityError::UnknownDimension { name: self.name.clone() })
    }

    /// Scalar value, if the quantity is resolved and 0-dimensional or single-element.
    pub fn scalar(&self) -> Option<(f64, Option<f64>)> {
        let value = self.value().ok()?;
        if value.len() != 1 {
            return None;
        }
        let v = value.iter().next().copied()?;
        let e = match self.error().ok()? {
            Some(err) if err.len() == 1 => err.iter().next().copied(),
            _ => None,
        };
        Some((v, e))
    }

    /// Placeholder -> Resolved. Resolving twice is an error.
    pub fn resolve(&mut self, value: ArrayD<f64>, error: Option<ArrayD<f64>>) -> Result<()> {
        if self.is_resolved() {
            return Err(QuantityError::AlreadyResolved { name: self.name.clone() });
        }
        self.state = QuantityState::Resolved { value, error };
        Ok(())
    }
}
