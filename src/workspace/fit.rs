use super::{Operand, Workspace};
use crate::analysis::dimension::Dimension;
use crate::compute::engine::Engine;
use crate::compute::expr::Expr;
use crate::error::{QuantityError, Result, SolveFailure};
use crate::solver::dimensions::DimensionSolver;
use crate::solver::problem::{FitOutcome, FitProblem, Weighting};
use crate::store::QuantityId;
use ndarray::{Array1, ArrayD, Axis, IxDyn};
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct FitArgs {
    /// Quantity in the model standing for the x data. Needed when the x data
    /// is an expression rather than the model's own variable.
    pub xvar: Option<QuantityId>,
    /// Axis of the y data holding the samples; the fit is repeated over
    /// every other axis. Defaults to the last axis.
    pub ydata_axis: Option<usize>,
    pub weighting: Weighting,
    pub absolute_sigma: bool,
    pub ignore_dim: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    pub params: Vec<QuantityId>,
    /// One outcome per fitted lane of the y data, in row-major order.
    pub outcomes: Vec<FitOutcome>,
}

fn invalid(reason: impl Into<String>) -> QuantityError {
    QuantityError::InvalidFitData { reason: reason.into() }
}

impl Workspace {
    /// Fits `func` to the data and stores the results in the parameter
    /// placeholders.
    pub fn fit(
        &mut self,
        func: &Expr,
        xdata: impl Into<Operand>,
        ydata: impl Into<Operand>,
        params: &[QuantityId],
        args: FitArgs,
    ) -> Result<FitReport> {
        for &p in params {
            let q = self.registry.get(p)?;
            if q.is_resolved() {
                return Err(QuantityError::AlreadyResolved { name: q.name.clone() });
            }
        }
        self.fit_backend(&self.config.fit_module)?;
        let (xdata, ydata) = (xdata.into(), ydata.into());
        let axis = self.check_data(&xdata, &ydata, args.ydata_axis)?;
        if let (Weighting::Weighted, Operand::Quantity(id)) = (args.weighting, &ydata) {
            let q = self.registry.get(*id)?;
            if q.error()?.is_none() {
                return Err(QuantityError::MissingError { name: q.name.clone() });
            }
        }

        let x = self.materialize(xdata)?;
        let y = self.materialize(ydata)?;
        let func = match args.xvar {
            Some(var) if var != x => func.substitute(var, &Expr::q(x)),
            _ => func.clone(),
        };

        if !args.ignore_dim {
            self.infer_parameter_dimensions(&func, y, params)?;
        }

        let xs = self.registry.get(x)?.value()?.clone();
        let yq = self.registry.get(y)?;
        let ys = yq.value()?;
        let yerr = yq.error()?;

        let backend = self.fit_backend(&self.config.fit_module)?;
        let err_lanes: Vec<Option<Array1<f64>>> = match yerr {
            Some(e) => e.lanes(Axis(axis)).into_iter().map(|l| Some(l.to_owned())).collect(),
            None => vec![None; ys.len() / xs.len()],
        };

        let mut outcomes = Vec::new();
        for (lane, errors) in ys.lanes(Axis(axis)).into_iter().zip(err_lanes) {
            let problem = FitProblem {
                registry: &self.registry,
                model: func.clone(),
                params: params.to_vec(),
                xvars: vec![(x, xs.clone())],
                y: lane.to_owned(),
                sigma: args.weighting.sigma(errors)?,
                absolute_sigma: args.absolute_sigma,
            };
            let outcome = backend.fit(&problem)?;
            debug!(iterations = outcome.iterations, chi_square = outcome.chi_square, "fitted lane");
            outcomes.push(outcome);
        }

        let mut shape = ys.shape().to_vec();
        shape.remove(axis);
        if args.ignore_dim {
            // Computed in base units: parameters without a dimension are plain numbers.
            for &p in params {
                if self.registry.get(p)?.dim.is_none() {
                    self.registry.assign_dimension(p, Dimension::dimensionless())?;
                }
            }
        }
        for (i, &p) in params.iter().enumerate() {
            let values = outcomes.iter().map(|o| o.values[i]).collect();
            let errors = outcomes.iter().map(|o| o.errors[i]).collect();
            let as_array = |v: Vec<f64>| {
                ArrayD::from_shape_vec(IxDyn(&shape), v).map_err(|e| invalid(e.to_string()))
            };
            self.registry.resolve_fit(p, as_array(values)?, as_array(errors)?)?;
        }

        info!(backend = %self.config.fit_module, lanes = outcomes.len(), "fit finished");
        Ok(FitReport {
            params: params.to_vec(),
            outcomes,
        })
    }

    /// Validates the data layout before anything is added to the registry.
    /// Returns the sample axis of the y data.
    fn check_data(&self, xdata: &Operand, ydata: &Operand, ydata_axis: Option<usize>) -> Result<usize> {
        let engine = Engine::new(&self.registry);
        let xs = engine.value(&xdata.to_expr())?;
        if xs.ndim() != 1 {
            return Err(invalid("x data must be one-dimensional"));
        }
        if xs.is_empty() {
            return Err(invalid("no data points"));
        }
        let ys = engine.value(&ydata.to_expr())?;
        if ys.ndim() == 0 {
            return Err(invalid("y data must be an array"));
        }
        let axis = ydata_axis.unwrap_or(ys.ndim() - 1);
        if axis >= ys.ndim() {
            return Err(invalid(format!("y data has no axis {}", axis)));
        }
        if ys.shape()[axis] != xs.len() {
            return Err(invalid(format!(
                "{} x values but {} y values along axis {}",
                xs.len(),
                ys.shape()[axis],
                axis
            )));
        }
        Ok(axis)
    }

    /// Makes the model's dimension match the y data, solving for parameter
    /// dimensions if it doesn't already.
    fn infer_parameter_dimensions(&mut self, func: &Expr, y: QuantityId, params: &[QuantityId]) -> Result<()> {
        let target = self.registry.get(y)?.dimension()?.clone();
        if Engine::new(&self.registry).dimension(func).ok().as_ref() == Some(&target) {
            return Ok(());
        }

        let present: Vec<QuantityId> = params.iter().copied().filter(|&p| func.contains(p)).collect();
        let solution = DimensionSolver::new(&self.registry, present).solve(func, &target)?;
        for (id, dim) in solution {
            if self.registry.get(id)?.dim.as_ref() != Some(&dim) {
                self.registry.assign_dimension(id, dim)?;
            }
        }

        match Engine::new(&self.registry).dimension(func) {
            Ok(found) if found == target => Ok(()),
            Ok(found) => Err(QuantityError::mismatch("fit function", &target, &found)),
            Err(_) => Err(QuantityError::UnsolvableDimensions {
                reason: SolveFailure::Inconsistent,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::dimension::{base, Dimension, Rational};
    use crate::workspace::AssignArgs;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2};
    use rstest::rstest;

    fn velocity() -> Dimension {
        Dimension::from_terms([(base::LENGTH, Rational::integer(1)), (base::TIME, Rational::integer(-1))])
    }

    fn line_data(ws: &mut Workspace) -> (QuantityId, QuantityId) {
        let t = ws
            .assign(vec![0.0, 1.0, 2.0, 3.0, 4.0], AssignArgs::new().name("t").unit("s"))
            .unwrap();
        let h = ws
            .assign(
                vec![1.0, 3.5, 6.0, 8.5, 11.0],
                AssignArgs::new().name("h").error(0.1).unit("m"),
            )
            .unwrap();
        (t, h)
    }

    #[test]
    fn test_line_fit_infers_parameter_dimensions() {
        let mut ws = Workspace::default();
        let (t, h) = line_data(&mut ws);
        let p = ws.params(&["v h0"]);
        let (v, h0) = (p[0], p[1]);
        let model = Expr::q(v) * Expr::q(t) + Expr::q(h0);

        let report = ws.fit(&model, t, h, &p, FitArgs::default()).unwrap();
        assert_eq!(report.outcomes.len(), 1);

        let (value, error) = ws.quantity(v).unwrap().scalar().unwrap();
        assert_abs_diff_eq!(value, 2.5, epsilon = 1e-8);
        assert!(error.unwrap() < 1e-6);
        assert_eq!(ws.quantity(v).unwrap().dim, Some(velocity()));
        assert_eq!(ws.quantity(h0).unwrap().dim, Some(Dimension::base(base::LENGTH)));
        assert_abs_diff_eq!(ws.quantity(h0).unwrap().scalar().unwrap().0, 1.0, epsilon = 1e-8);
        assert_eq!(ws.formula(v).unwrap(), "fit");
        assert_eq!(ws.convert(v, None).unwrap().unit, "m/s");
    }

    #[test]
    fn test_refit_is_rejected() {
        let mut ws = Workspace::default();
        let (t, h) = line_data(&mut ws);
        let p = ws.params(&["v h0"]);
        let model = Expr::q(p[0]) * Expr::q(t) + Expr::q(p[1]);
        ws.fit(&model, t, h, &p, FitArgs::default()).unwrap();
        assert!(matches!(
            ws.fit(&model, t, h, &p, FitArgs::default()),
            Err(QuantityError::AlreadyResolved { .. })
        ));
    }

    #[test]
    fn test_repeats_over_other_axes() {
        let mut ws = Workspace::default();
        let t = ws.assign(vec![0.0, 1.0, 2.0], AssignArgs::new().name("t")).unwrap();
        let y = ws
            .assign(arr2(&[[0.0, 2.0, 4.0], [1.0, 4.0, 7.0]]), AssignArgs::new().name("y").error(0.5))
            .unwrap();
        let p = ws.params(&["a c"]);
        let model = Expr::q(p[0]) * Expr::q(t) + Expr::q(p[1]);

        let report = ws.fit(&model, t, y, &p, FitArgs::default()).unwrap();
        assert_eq!(report.outcomes.len(), 2);
        let a = ws.quantity(p[0]).unwrap().value().unwrap().clone();
        assert_eq!(a.shape(), &[2]);
        assert_abs_diff_eq!(a[IxDyn(&[0])], 2.0, epsilon = 1e-8);
        assert_abs_diff_eq!(a[IxDyn(&[1])], 3.0, epsilon = 1e-8);
    }

    #[test]
    fn test_expression_as_x_data() {
        let mut ws = Workspace::default();
        let t = ws.assign(vec![1.0, 2.0, 3.0], AssignArgs::new().name("t").unit("s")).unwrap();
        let y = ws.assign(vec![2.0, 8.0, 18.0], AssignArgs::new().name("y").unit("m")).unwrap();
        let u = ws.params(&["u"])[0];
        let k = ws.params(&["k"])[0];
        let model = Expr::q(k) * Expr::q(u);

        let args = FitArgs { xvar: Some(u), ..FitArgs::default() };
        ws.fit(&model, Expr::q(t) * Expr::q(t), y, &[k], args).unwrap();
        assert_abs_diff_eq!(ws.quantity(k).unwrap().scalar().unwrap().0, 2.0, epsilon = 1e-8);
        assert_eq!(
            ws.quantity(k).unwrap().dim,
            Some(Dimension::from_terms([
                (base::LENGTH, Rational::integer(1)),
                (base::TIME, Rational::integer(-2)),
            ]))
        );
        assert!(!ws.quantity(u).unwrap().is_resolved());
    }

    #[test]
    fn test_unconstrained_parameter() {
        let mut ws = Workspace::default();
        let (t, h) = line_data(&mut ws);
        let p = ws.params(&["a b"]);
        let model = Expr::q(p[0]) * Expr::q(p[1]) * Expr::q(t);
        assert!(matches!(
            ws.fit(&model, t, h, &p, FitArgs::default()),
            Err(QuantityError::UnsolvableDimensions { reason: SolveFailure::Underdetermined { .. } })
        ));
        assert!(!ws.quantity(p[0]).unwrap().is_resolved());
    }

    #[test]
    fn test_weighted_fit_needs_errors() {
        let mut ws = Workspace::default();
        let t = ws.assign(arr1(&[0.0, 1.0, 2.0]), AssignArgs::new().name("t")).unwrap();
        let y = ws.assign(arr1(&[0.0, 1.0, 2.0]), AssignArgs::new().name("y")).unwrap();
        let a = ws.params(&["a"]);
        let args = FitArgs { weighting: Weighting::Weighted, ..FitArgs::default() };
        match ws.fit(&(Expr::q(a[0]) * Expr::q(t)), t, y, &a, args) {
            Err(QuantityError::MissingError { name }) => assert_eq!(name, "y"),
            other => panic!("expected missing error, got {:?}", other),
        }
    }

    #[test]
    fn test_ignore_dim_leaves_dimensionless_parameters() {
        let mut ws = Workspace::default();
        let (t, h) = line_data(&mut ws);
        let p = ws.params(&["v h0"]);
        let model = Expr::q(p[0]) * Expr::q(t) + Expr::q(p[1]);
        let args = FitArgs { ignore_dim: true, ..FitArgs::default() };
        ws.fit(&model, t, h, &p, args).unwrap();

        assert_eq!(ws.quantity(p[0]).unwrap().dim, Some(Dimension::dimensionless()));
        let table = ws.table(&p).unwrap();
        assert!(table.to_text(2).starts_with("v"));
        let doubled = ws.assign(Expr::q(p[0]) * 2.0, AssignArgs::new().name("w")).unwrap();
        assert_abs_diff_eq!(ws.quantity(doubled).unwrap().scalar().unwrap().0, 5.0, epsilon = 1e-8);
        assert_eq!(ws.convert(p[1], None).unwrap().unit, "1");
    }

    #[rstest]
    #[case(arr1(&[0.0, 1.0]).into_dyn(), None)]
    #[case(arr2(&[[0.0, 1.0, 2.0]]).into_dyn(), None)]
    #[case(arr1(&[0.0, 1.0, 2.0, 3.0, 4.0]).into_dyn(), Some(3))]
    fn test_bad_data_leaves_registry_untouched(#[case] xdata: ArrayD<f64>, #[case] axis: Option<usize>) {
        let mut ws = Workspace::default();
        let (_, h) = line_data(&mut ws);
        let x = ws.assign(xdata, AssignArgs::new().name("x")).unwrap();
        let p = ws.params(&["v h0"]);
        let count = ws.registry.count();
        let model = Expr::q(p[0]) * Expr::q(x) + Expr::q(p[1]);
        let args = FitArgs { ydata_axis: axis, ..FitArgs::default() };

        // Expression y data would otherwise become a dummy quantity.
        let result = ws.fit(&model, x, Expr::q(h) * 2.0, &p, args);
        assert!(matches!(result, Err(QuantityError::InvalidFitData { .. })));
        assert_eq!(ws.registry.count(), count);
        assert_eq!(ws.quantity(p[0]).unwrap().dim, None);
    }

    #[test]
    fn test_unknown_fit_module() {
        let mut ws = Workspace::default();
        ws.config.fit_module = "scipy".to_string();
        let (t, h) = line_data(&mut ws);
        let p = ws.params(&["v h0"]);
        let model = Expr::q(p[0]) * Expr::q(t) + Expr::q(p[1]);
        assert!(matches!(
            ws.fit(&model, t, h, &p, FitArgs::default()),
            Err(QuantityError::UnknownBackend { kind: "fit", .. })
        ));
    }
}
