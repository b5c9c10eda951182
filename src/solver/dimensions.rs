//! Infers the dimensions of unknown quantities from a target equation.
//!
//! The dimension of any sub-expression is an affine form
//! `Σ cᵢ·dim(uᵢ) + D` over the unknowns `uᵢ` (written multiplicatively for
//! `D`). Additions and function arguments contribute equality constraints,
//! and the whole formula must equal the target. Every base dimension shares
//! the same coefficient matrix, so the system is solved once with one
//! right-hand side per base.

use crate::analysis::dimension::{Dimension, Rational};
use crate::compute::engine::MAX_EXPONENT_DENOMINATOR;
use crate::compute::expr::{BinaryOp, Expr};
use crate::error::{QuantityError, Result, SolveFailure};
use crate::store::{QuantityId, Registry};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq)]
struct Affine {
    coeffs: BTreeMap<usize, Rational>,
    constant: Dimension,
}

impl Affine {
    fn known(dim: Dimension) -> Self {
        Self { coeffs: BTreeMap::new(), constant: dim }
    }

    fn unknown(idx: usize) -> Self {
        Self {
            coeffs: BTreeMap::from([(idx, Rational::ONE)]),
            constant: Dimension::dimensionless(),
        }
    }

    fn add(&self, other: &Affine) -> Affine {
        let mut coeffs = self.coeffs.clone();
        for (&k, &v) in &other.coeffs {
            let slot = coeffs.entry(k).or_insert(Rational::ZERO);
            *slot = *slot + v;
        }
        coeffs.retain(|_, v| !v.is_zero());
        Affine {
            coeffs,
            constant: self.constant.multiply(&other.constant),
        }
    }

    fn scale(&self, k: Rational) -> Affine {
        let mut coeffs: BTreeMap<usize, Rational> = self.coeffs.iter().map(|(&i, &c)| (i, c * k)).collect();
        coeffs.retain(|_, v| !v.is_zero());
        Affine {
            coeffs,
            constant: self.constant.power(k),
        }
    }

    fn sub(&self, other: &Affine) -> Affine {
        self.add(&other.scale(-Rational::ONE))
    }

    fn is_dimensionless_constant(&self) -> bool {
        self.coeffs.is_empty() && self.constant.is_dimensionless()
    }
}

pub struct DimensionSolver<'a> {
    registry: &'a Registry,
    unknowns: Vec<QuantityId>,
    index: HashMap<QuantityId, usize>,
}

impl<'a> DimensionSolver<'a> {
    /// Every quantity not listed in `unknowns` must already have a dimension.
    pub fn new(registry: &'a Registry, unknowns: impl IntoIterator<Item = QuantityId>) -> Self {
        let unknowns: Vec<QuantityId> = unknowns.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let index = unknowns.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        Self { registry, unknowns, index }
    }

    fn reduce(&self, expr: &Expr, constraints: &mut Vec<Affine>) -> Result<Affine> {
        match expr {
            Expr::Literal(_) => Ok(Affine::default()),
            Expr::Quantity(id) | Expr::ErrorOf(id) => match self.index.get(id) {
                Some(&i) => Ok(Affine::unknown(i)),
                None => Ok(Affine::known(self.registry.get(*id)?.dimension()?.clone())),
            },
            Expr::Neg(a) => self.reduce(a, constraints),
            Expr::Binary { op, lhs, rhs } => {
                let l = self.reduce(lhs, constraints)?;
                let r = self.reduce(rhs, constraints)?;
                Ok(match op {
                    BinaryOp::Add | BinaryOp::Sub => {
                        constraints.push(l.sub(&r));
                        l
                    }
                    BinaryOp::Mul => l.add(&r),
                    BinaryOp::Div => l.sub(&r),
                })
            }
            Expr::Pow { base, exponent } => {
                let e = self.reduce(exponent, constraints)?;
                constraints.push(e);
                let b = self.reduce(base, constraints)?;
                if b.is_dimensionless_constant() {
                    return Ok(b);
                }
                let value = exponent.constant_value().ok_or_else(|| QuantityError::UnsupportedExponent {
                    exponent: "a non-constant expression".to_string(),
                })?;
                let k = Rational::from_f64(value, MAX_EXPONENT_DENOMINATOR)
                    .ok_or_else(|| QuantityError::UnsupportedExponent { exponent: value.to_string() })?;
                Ok(b.scale(k))
            }
            Expr::Func { func, arg } => {
                let a = self.reduce(arg, constraints)?;
                if !func.is_transcendental() {
                    return Ok(a);
                }
                constraints.push(a);
                Ok(Affine::default())
            }
        }
    }

    /// Solves for the dimension of every unknown so that `expr` has
    /// dimension `target`.
    pub fn solve(&self, expr: &Expr, target: &Dimension) -> Result<BTreeMap<QuantityId, Dimension>> {
        let mut constraints = Vec::new();
        let whole = self.reduce(expr, &mut constraints)?;
        constraints.push(whole.sub(&Affine::known(target.clone())));

        // Each constraint reads Σ cᵢ xᵢ = -D, one column per base dimension.
        let bases: Vec<String> = constraints
            .iter()
            .flat_map(|c| c.constant.terms().map(|(b, _)| b.to_string()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let n = self.unknowns.len();
        let mut rows: Vec<Vec<Rational>> = constraints
            .iter()
            .map(|c| {
                let mut row = vec![Rational::ZERO; n + bases.len()];
                for (&i, &v) in &c.coeffs {
                    row[i] = v;
                }
                for (j, b) in bases.iter().enumerate() {
                    row[n + j] = -c.constant.exponent(b);
                }
                row
            })
            .collect();

        let pivots = rref(&mut rows, n);
        let fail = |reason| QuantityError::UnsolvableDimensions { reason };

        if rows[pivots.len()..].iter().any(|row| row[n..].iter().any(|v| !v.is_zero())) {
            debug!("dimension system is inconsistent");
            return Err(fail(SolveFailure::Inconsistent));
        }
        if pivots.len() < n {
            let free = (0..n)
                .filter(|c| !pivots.contains(c))
                .map(|c| Ok(self.registry.get(self.unknowns[c])?.name.clone()))
                .collect::<Result<Vec<_>>>()?;
            debug!(?free, "dimension system is underdetermined");
            return Err(fail(SolveFailure::Underdetermined { free }));
        }

        let mut solution = BTreeMap::new();
        for (r, &col) in pivots.iter().enumerate() {
            let dim = Dimension::from_terms(bases.iter().enumerate().map(|(j, b)| (b.as_str(), rows[r][n + j])));
            solution.insert(self.unknowns[col], dim);
        }
        Ok(solution)
    }
}

/// Gauss-Jordan elimination over the first `ncols` columns. Returns the
/// pivot column of each leading row.
fn rref(rows: &mut [Vec<Rational>], ncols: usize) -> Vec<usize> {
    let mut pivots = Vec::new();
    let mut r = 0;
    for col in 0..ncols {
        let Some(p) = (r..rows.len()).find(|&i| !rows[i][col].is_zero()) else {
            continue;
        };
        rows.swap(r, p);
        let pivot = rows[r][col];
        for v in rows[r].iter_mut() {
            *v = *v / pivot;
        }
        for i in 0..rows.len() {
            if i == r || rows[i][col].is_zero() {
                continue;
            }
            let factor = rows[i][col];
            for j in 0..rows[i].len() {
                let delta = factor * rows[r][j];
                rows[i][j] = rows[i][j] - delta;
            }
        }
        pivots.push(col);
        r += 1;
    }
    pivots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::dimension::base;
    use crate::store::Quantity;
    use rstest::rstest;

    fn with_dim(reg: &mut Registry, name: &str, dim: Option<Dimension>) -> QuantityId {
        let mut q = Quantity::placeholder(name, None);
        q.dim = dim;
        reg.add(q)
    }

    fn dim(terms: &[(&str, i64)]) -> Dimension {
        Dimension::from_terms(terms.iter().map(|&(b, e)| (b, Rational::integer(e))))
    }

    fn energy() -> Dimension {
        dim(&[(base::MASS, 1), (base::LENGTH, 2), (base::TIME, -2)])
    }

    #[test]
    fn test_kinetic_energy_gives_mass() {
        let mut reg = Registry::new();
        let k = with_dim(&mut reg, "k", None);
        let v = with_dim(&mut reg, "v", Some(dim(&[(base::LENGTH, 1), (base::TIME, -1)])));
        let f = Expr::q(k) * Expr::q(v).pow(2.0);

        let solution = DimensionSolver::new(&reg, [k]).solve(&f, &energy()).unwrap();
        assert_eq!(solution[&k], Dimension::base(base::MASS));
    }

    #[test]
    fn test_extra_unknown_is_underdetermined() {
        let mut reg = Registry::new();
        let k = with_dim(&mut reg, "k", None);
        let c = with_dim(&mut reg, "c", None);
        let v = with_dim(&mut reg, "v", Some(dim(&[(base::LENGTH, 1), (base::TIME, -1)])));
        let f = Expr::q(k) * Expr::q(v).pow(2.0) * Expr::q(c);

        let err = DimensionSolver::new(&reg, [k, c]).solve(&f, &energy()).unwrap_err();
        match err {
            QuantityError::UnsolvableDimensions {
                reason: SolveFailure::Underdetermined { free },
            } => assert_eq!(free, vec!["c".to_string()]),
            other => panic!("expected underdetermined, got {:?}", other),
        }
    }

    #[test]
    fn test_conflicting_constraints_are_inconsistent() {
        let mut reg = Registry::new();
        let k = with_dim(&mut reg, "k", None);
        let t = with_dim(&mut reg, "t", Some(Dimension::base(base::TIME)));
        let f = Expr::q(k) + Expr::q(t);

        let err = DimensionSolver::new(&reg, [k])
            .solve(&f, &Dimension::base(base::LENGTH))
            .unwrap_err();
        assert!(matches!(
            err,
            QuantityError::UnsolvableDimensions { reason: SolveFailure::Inconsistent }
        ));
    }

    #[rstest]
    #[case::linear_model(&[(base::LENGTH, 1)], &[(base::LENGTH, 1), (base::TIME, -1)], &[(base::LENGTH, 1)])]
    #[case::decay_rate(&[(base::TIME, -1)], &[], &[])]
    fn test_fit_model_parameters(
        #[case] expect_m: &[(&str, i64)],
        #[case] expect_n: &[(&str, i64)],
        #[case] y_dim: &[(&str, i64)],
    ) {
        // y = n*t + b for a position, y = exp(-m*t) * n for a dimensionless ratio
        let mut reg = Registry::new();
        let t = with_dim(&mut reg, "t", Some(Dimension::base(base::TIME)));
        let m = with_dim(&mut reg, "m", None);
        let n = with_dim(&mut reg, "n", None);
        let f = if y_dim.is_empty() {
            (-(Expr::q(m) * Expr::q(t))).exp() * Expr::q(n)
        } else {
            Expr::q(n) * Expr::q(t) + Expr::q(m)
        };
        let solution = DimensionSolver::new(&reg, [m, n]).solve(&f, &dim(y_dim)).unwrap();
        assert_eq!(solution[&m], dim(expect_m));
        assert_eq!(solution[&n], dim(expect_n));
    }

    #[test]
    fn test_square_root_gives_rational_exponent() {
        let mut reg = Registry::new();
        let a = with_dim(&mut reg, "a", None);
        let f = Expr::q(a).sqrt();
        let solution = DimensionSolver::new(&reg, [a])
            .solve(&f, &Dimension::base(base::LENGTH))
            .unwrap();
        assert_eq!(solution[&a], dim(&[(base::LENGTH, 2)]));
    }

    #[test]
    fn test_known_quantity_without_dimension() {
        let mut reg = Registry::new();
        let k = with_dim(&mut reg, "k", None);
        let x = with_dim(&mut reg, "x", None);
        let err = DimensionSolver::new(&reg, [k])
            .solve(&(Expr::q(k) * Expr::q(x)), &Dimension::dimensionless())
            .unwrap_err();
        assert!(matches!(err, QuantityError::UnknownDimension { .. }));
    }
}
