use super::diff::{self, differentiate};
use super::expr::{BinaryOp, Expr};
use super::kernel;
use crate::analysis::dimension::{Dimension, Rational};
use crate::error::{QuantityError, Result};
use crate::store::{QuantityId, Registry};
use ndarray::{arr0, ArrayD};
use std::collections::HashMap;
use tracing::debug;

/// Largest denominator accepted for a rational exponent of a dimensionful base.
pub const MAX_EXPONENT_DENOMINATOR: i64 = 1000;

/// Propagated uncertainty of an expression together with the symbolic
/// formula it was evaluated from.
#[derive(Debug, Clone, PartialEq)]
pub struct Propagated {
    pub error: ArrayD<f64>,
    pub formula: Expr,
}

/// Evaluates expressions against the quantities of a registry.
///
/// Overrides replace the stored value of a quantity for the lifetime of the
/// engine; fits use them to evaluate a model at trial parameters.
pub struct Engine<'a> {
    registry: &'a Registry,
    overrides: HashMap<QuantityId, ArrayD<f64>>,
}

impl<'a> Engine<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, id: QuantityId, value: ArrayD<f64>) -> Self {
        self.overrides.insert(id, value);
        self
    }

    pub fn set_override(&mut self, id: QuantityId, value: ArrayD<f64>) {
        self.overrides.insert(id, value);
    }

    pub fn value(&self, expr: &Expr) -> Result<ArrayD<f64>> {
        match expr {
            Expr::Literal(x) => Ok(arr0(*x).into_dyn()),
            Expr::Quantity(id) => match self.overrides.get(id) {
                Some(v) => Ok(v.clone()),
                None => Ok(self.registry.get(*id)?.value()?.clone()),
            },
            Expr::ErrorOf(id) => self.error_of(*id),
            Expr::Neg(a) => Ok(self.value(a)?.mapv(|x| -x)),
            Expr::Binary { op, lhs, rhs } => {
                let (l, r) = (self.value(lhs)?, self.value(rhs)?);
                kernel::zip_with(&l, &r, |a, b| op.apply(a, b))
            }
            Expr::Pow { base, exponent } => {
                let (b, e) = (self.value(base)?, self.value(exponent)?);
                kernel::zip_with(&b, &e, f64::powf)
            }
            Expr::Func { func, arg } => Ok(self.value(arg)?.mapv(|x| func.apply(x))),
        }
    }

    /// Stored error of a quantity; zeros shaped like its value when it has none.
    fn error_of(&self, id: QuantityId) -> Result<ArrayD<f64>> {
        let q = self.registry.get(id)?;
        match q.error()? {
            Some(e) => Ok(e.clone()),
            None => Ok(ArrayD::zeros(q.value()?.raw_dim())),
        }
    }

    pub fn dimension(&self, expr: &Expr) -> Result<Dimension> {
        match expr {
            Expr::Literal(_) => Ok(Dimension::dimensionless()),
            Expr::Quantity(id) | Expr::ErrorOf(id) => Ok(self.registry.get(*id)?.dimension()?.clone()),
            Expr::Neg(a) => self.dimension(a),
            Expr::Binary { op, lhs, rhs } => {
                let (l, r) = (self.dimension(lhs)?, self.dimension(rhs)?);
                match op {
                    BinaryOp::Add | BinaryOp::Sub => {
                        if l != r {
                            let context = if *op == BinaryOp::Add { "addition" } else { "subtraction" };
                            return Err(QuantityError::mismatch(context, &l, &r));
                        }
                        Ok(l)
                    }
                    BinaryOp::Mul => Ok(l.multiply(&r)),
                    BinaryOp::Div => Ok(l.divide(&r)),
                }
            }
            Expr::Pow { base, exponent } => {
                let e_dim = self.dimension(exponent)?;
                if !e_dim.is_dimensionless() {
                    return Err(QuantityError::mismatch("exponent", &Dimension::dimensionless(), &e_dim));
                }
                let b_dim = self.dimension(base)?;
                if b_dim.is_dimensionless() {
                    return Ok(b_dim);
                }
                let value = exponent.constant_value().ok_or_else(|| QuantityError::UnsupportedExponent {
                    exponent: "a non-constant expression".to_string(),
                })?;
                let rational = Rational::from_f64(value, MAX_EXPONENT_DENOMINATOR)
                    .ok_or_else(|| QuantityError::UnsupportedExponent { exponent: value.to_string() })?;
                Ok(b_dim.power(rational))
            }
            Expr::Func { func, arg } => {
                let a_dim = self.dimension(arg)?;
                if !func.is_transcendental() {
                    return Ok(a_dim);
                }
                if !a_dim.is_dimensionless() {
                    return Err(QuantityError::mismatch(
                        format!("argument of {}", func.name()),
                        &Dimension::dimensionless(),
                        &a_dim,
                    ));
                }
                Ok(a_dim)
            }
        }
    }

    /// First-order Gaussian propagation over the distinct free quantities
    /// of `expr`. Quantities without an error contribute nothing.
    pub fn propagate(&self, expr: &Expr) -> Result<Propagated> {
        let value = self.value(expr)?;

        let mut terms = Vec::new();
        for id in expr.free_quantities() {
            if self.registry.get(id)?.error()?.is_none() {
                continue;
            }
            let partial = differentiate(expr, id);
            if partial == Expr::Literal(0.0) {
                continue;
            }
            terms.push(diff::pow(diff::mul(partial, Expr::error_of(id)), Expr::Literal(2.0)));
        }

        let formula = match terms.into_iter().reduce(diff::add) {
            Some(sum) => diff::pow(sum, Expr::lit(1.0) / Expr::lit(2.0)),
            None => Expr::Literal(0.0),
        };

        let mut error = self.value(&formula)?;
        if error.shape() != value.shape() {
            error = kernel::broadcast_to(&error, value.shape())?;
        }
        debug!(shape = ?value.shape(), "propagated error");
        Ok(Propagated { error, formula })
    }
}
