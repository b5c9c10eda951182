use super::Workspace;
use crate::analysis::dimension::Dimension;
use crate::analysis::topology;
use crate::analysis::units::ResolvedUnit;
use crate::compute::engine::Engine;
use crate::compute::expr::Expr;
use crate::compute::kernel;
use crate::error::{QuantityError, Result};
use crate::store::{Derivation, Quantity, QuantityId, QuantityState};
use ndarray::{arr0, Array1, Array2, ArrayD};
use tracing::{debug, info};

/// What a new quantity's value is made from: plain numbers (in the given
/// unit) or an expression over existing quantities.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueInput {
    Number(ArrayD<f64>),
    Formula(Expr),
}

/// Plain numbers, used for explicit errors.
#[derive(Debug, Clone, PartialEq)]
pub struct Numbers(pub ArrayD<f64>);

macro_rules! numeric_input {
    ($($ty:ty => |$v:ident| $conv:expr),* $(,)?) => {
        $(
            impl From<$ty> for Numbers {
                fn from($v: $ty) -> Self { Numbers($conv) }
            }
            impl From<$ty> for ValueInput {
                fn from($v: $ty) -> Self { ValueInput::Number($conv) }
            }
        )*
    };
}

numeric_input! {
    f64 => |v| arr0(v).into_dyn(),
    Vec<f64> => |v| Array1::from(v).into_dyn(),
    Array1<f64> => |v| v.into_dyn(),
    Array2<f64> => |v| v.into_dyn(),
    ArrayD<f64> => |v| v,
}

impl From<Expr> for ValueInput {
    fn from(e: Expr) -> Self {
        match e.constant_value() {
            Some(x) => ValueInput::Number(arr0(x).into_dyn()),
            None => ValueInput::Formula(e),
        }
    }
}

impl From<QuantityId> for ValueInput {
    fn from(id: QuantityId) -> Self {
        ValueInput::Formula(Expr::q(id))
    }
}

/// Optional arguments of [`Workspace::assign`].
#[derive(Debug, Clone, Default)]
pub struct AssignArgs {
    pub error: Option<ArrayD<f64>>,
    /// Unit of both value and error; overrides the separate units.
    pub unit: Option<String>,
    pub name: Option<String>,
    pub longname: Option<String>,
    pub value_unit: Option<String>,
    pub error_unit: Option<String>,
    /// Take the declared unit's dimension instead of checking the formula's.
    pub ignore_dim: bool,
}

impl AssignArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(mut self, error: impl Into<Numbers>) -> Self {
        self.error = Some(error.into().0);
        self
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn longname(mut self, longname: &str) -> Self {
        self.longname = Some(longname.to_string());
        self
    }

    pub fn value_unit(mut self, unit: &str) -> Self {
        self.value_unit = Some(unit.to_string());
        self
    }

    pub fn error_unit(mut self, unit: &str) -> Self {
        self.error_unit = Some(unit.to_string());
        self
    }

    pub fn ignore_dim(mut self, ignore: bool) -> Self {
        self.ignore_dim = ignore;
        self
    }
}

/// Resolved units of an assignment.
struct Units {
    value: Option<ResolvedUnit>,
    error: Option<ResolvedUnit>,
}

impl Units {
    fn value_factor(&self) -> f64 {
        self.value.as_ref().map_or(1.0, |u| u.scale)
    }

    fn error_factor(&self) -> f64 {
        self.error.as_ref().map_or(1.0, |u| u.scale)
    }

    /// The declared dimension, from the value unit or else the error unit.
    fn declared(&self) -> Option<&Dimension> {
        self.value.as_ref().or(self.error.as_ref()).map(|u| &u.dim)
    }

    fn prefer_unit(&self) -> Option<String> {
        self.value.as_ref().or(self.error.as_ref()).map(|u| u.unit.clone())
    }
}

impl Workspace {
    fn resolve_units(&self, args: &AssignArgs) -> Result<Units> {
        let resolve = |u: &Option<String>| u.as_deref().map(|s| self.units.resolve(s)).transpose();
        if args.unit.is_some() {
            let unit = resolve(&args.unit)?;
            return Ok(Units {
                value: unit.clone(),
                error: unit,
            });
        }
        let units = Units {
            value: resolve(&args.value_unit)?,
            error: resolve(&args.error_unit)?,
        };
        if let (Some(v), Some(e)) = (&units.value, &units.error) {
            if v.dim != e.dim {
                return Err(QuantityError::mismatch("value and error units", &v.dim, &e.dim));
            }
        }
        Ok(units)
    }

    /// Builds a quantity from user input without touching the registry.
    fn build_quantity(&self, value: ValueInput, args: &AssignArgs) -> Result<Quantity> {
        let units = self.resolve_units(args)?;
        let engine = Engine::new(&self.registry);

        let (value, value_formula, dim) = match value {
            ValueInput::Number(v) => {
                let dim = units.declared().cloned().unwrap_or_else(Dimension::dimensionless);
                (v * units.value_factor(), None, dim)
            }
            ValueInput::Formula(expr) => {
                let computed = engine.value(&expr)?;
                let dim = if args.ignore_dim {
                    units.declared().cloned().unwrap_or_else(Dimension::dimensionless)
                } else {
                    let calculated = engine.dimension(&expr)?;
                    if let Some(declared) = units.declared() {
                        if *declared != calculated {
                            return Err(QuantityError::mismatch("declared unit", declared, &calculated));
                        }
                    }
                    calculated
                };
                let computed = if args.ignore_dim { computed * units.value_factor() } else { computed };
                (computed, Some(expr), dim)
            }
        };

        let (error, error_formula) = match (&args.error, &value_formula) {
            (Some(e), _) => {
                let scaled = e * units.error_factor();
                (Some(kernel::tile_trailing(&scaled, value.shape())?), None)
            }
            (None, Some(expr)) => {
                let propagated = engine.propagate(expr)?;
                let error = if args.ignore_dim {
                    propagated.error * units.error_factor()
                } else {
                    propagated.error
                };
                (Some(error), Some(Derivation::Formula(propagated.formula)))
            }
            (None, None) => (None, None),
        };

        let mut quantity = Quantity::placeholder(args.name.clone().unwrap_or_default(), args.longname.clone());
        quantity.state = QuantityState::Resolved { value, error };
        quantity.value_formula = value_formula.map(Derivation::Formula);
        quantity.error_formula = error_formula;
        quantity.dim = Some(dim);
        quantity.prefer_unit = units.prefer_unit();
        Ok(quantity)
    }

    /// Creates a new quantity from numbers or a formula.
    pub fn assign(&mut self, value: impl Into<ValueInput>, args: AssignArgs) -> Result<QuantityId> {
        let mut quantity = self.build_quantity(value.into(), &args)?;
        if args.name.is_none() {
            quantity.name = self.registry.dummy_name();
        }
        let dim = quantity.dim.clone().unwrap_or_default();
        let name = quantity.name.clone();
        let id = self.registry.add(quantity);
        info!(name = %name, dim = %dim, "assigned quantity");
        Ok(id)
    }

    /// Defines a placeholder created by [`Workspace::params`]. The
    /// placeholder keeps its name.
    pub fn assign_to(&mut self, target: QuantityId, value: impl Into<ValueInput>, args: AssignArgs) -> Result<()> {
        let slot = self.registry.get(target)?;
        if slot.is_resolved() {
            return Err(QuantityError::AlreadyResolved { name: slot.name.clone() });
        }
        let value = value.into();
        if let ValueInput::Formula(expr) = &value {
            topology::check_acyclic(&self.registry, target, expr)?;
        }
        let quantity = self.build_quantity(value, &args)?;
        self.registry.define(target, quantity)?;
        debug!(id = %target, "defined placeholder");
        Ok(())
    }
}
