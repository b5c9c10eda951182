use crate::compute::diff::differentiate;
use crate::compute::engine::Engine;
use crate::compute::expr::Expr;
use crate::compute::kernel;
use crate::error::{QuantityError, Result};
use crate::store::{QuantityId, Registry};
use nalgebra::{DMatrix, DVector};
use ndarray::{arr0, Array1, ArrayD};

/// How y uncertainties enter a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Weighting {
    /// Weight when every y error is present and positive.
    #[default]
    Auto,
    Weighted,
    Unweighted,
}

impl Weighting {
    /// The sigmas to weight with, if any.
    pub fn sigma(&self, errors: Option<Array1<f64>>) -> Result<Option<Array1<f64>>> {
        let usable = errors.filter(|e| e.iter().all(|&s| s.is_finite() && s > 0.0));
        match self {
            Weighting::Unweighted => Ok(None),
            Weighting::Auto => Ok(usable),
            Weighting::Weighted => usable.map(Some).ok_or_else(|| QuantityError::InvalidFitData {
                reason: "weighted fit needs a positive error for every y value".to_string(),
            }),
        }
    }
}

/// One least-squares problem: a model curve sampled at `n` points.
pub struct FitProblem<'a> {
    pub registry: &'a Registry,
    pub model: Expr,
    pub params: Vec<QuantityId>,
    /// Quantities replaced by sample arrays of length `n`.
    pub xvars: Vec<(QuantityId, ArrayD<f64>)>,
    pub y: Array1<f64>,
    pub sigma: Option<Array1<f64>>,
    pub absolute_sigma: bool,
}

impl<'a> FitProblem<'a> {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn is_weighted(&self) -> bool {
        self.sigma.is_some()
    }

    /// Partial derivatives of the model, one per parameter.
    pub fn partials(&self) -> Vec<Expr> {
        self.params.iter().map(|&p| differentiate(&self.model, p)).collect()
    }

    fn engine(&self, p: &DVector<f64>) -> Engine<'a> {
        let mut engine = Engine::new(self.registry);
        for (x, samples) in &self.xvars {
            engine.set_override(*x, samples.clone());
        }
        for (i, &id) in self.params.iter().enumerate() {
            engine.set_override(id, arr0(p[i]).into_dyn());
        }
        engine
    }

    fn sampled(&self, engine: &Engine<'_>, expr: &Expr) -> Result<Array1<f64>> {
        let value = engine.value(expr)?;
        let value = kernel::broadcast_to(&value, &[self.len()])?;
        value
            .into_dimensionality()
            .map_err(|_| QuantityError::InvalidFitData {
                reason: "model does not evaluate to one value per sample".to_string(),
            })
    }

    fn weight(&self, i: usize) -> f64 {
        self.sigma.as_ref().map_or(1.0, |s| 1.0 / s[i])
    }

    /// Weighted residuals `(y - f(p)) / σ`.
    pub fn residuals(&self, p: &DVector<f64>) -> Result<DVector<f64>> {
        let f = self.sampled(&self.engine(p), &self.model)?;
        Ok(DVector::from_iterator(
            self.len(),
            (0..self.len()).map(|i| (self.y[i] - f[i]) * self.weight(i)),
        ))
    }

    /// Weighted model Jacobian `∂f/∂p / σ`, evaluated from the exact partials.
    pub fn jacobian(&self, p: &DVector<f64>, partials: &[Expr]) -> Result<DMatrix<f64>> {
        let engine = self.engine(p);
        let mut jac = DMatrix::zeros(self.len(), partials.len());
        for (j, d) in partials.iter().enumerate() {
            let column = self.sampled(&engine, d)?;
            for i in 0..self.len() {
                jac[(i, j)] = column[i] * self.weight(i);
            }
        }
        Ok(jac)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    pub values: Vec<f64>,
    pub errors: Vec<f64>,
    pub chi_square: f64,
    pub iterations: usize,
}

/// A least-squares fitting method.
pub trait FitBackend {
    fn name(&self) -> &'static str;
    fn fit(&self, problem: &FitProblem<'_>) -> Result<FitOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;
    use rstest::rstest;

    #[rstest]
    #[case(Weighting::Auto, Some(arr1(&[0.1, 0.2])), true)]
    #[case(Weighting::Auto, Some(arr1(&[0.1, 0.0])), false)]
    #[case(Weighting::Auto, None, false)]
    #[case(Weighting::Unweighted, Some(arr1(&[0.1, 0.2])), false)]
    #[case(Weighting::Weighted, Some(arr1(&[0.1, 0.2])), true)]
    fn test_weighting_choice(#[case] w: Weighting, #[case] errors: Option<Array1<f64>>, #[case] weighted: bool) {
        assert_eq!(w.sigma(errors).unwrap().is_some(), weighted);
    }

    #[test]
    fn test_weighted_without_errors_fails() {
        assert!(matches!(
            Weighting::Weighted.sigma(None),
            Err(QuantityError::InvalidFitData { .. })
        ));
    }
}
