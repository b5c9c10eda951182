use super::{Operand, Workspace};
use crate::analysis::dimension::Dimension;
use crate::analysis::topology;
use crate::analysis::units::adjust_to_unit;
use crate::compute::engine::Engine;
use crate::compute::expr::Expr;
use crate::compute::kernel;
use crate::display::plot::{extent, DataSeries, FunctionCurve, PlotRequest};
use crate::display::render::to_plain;
use crate::error::{QuantityError, Result};
use crate::store::QuantityId;
use ndarray::{Array1, ArrayD};
use tracing::debug;

/// One x/y pair to plot. If `x` is a quantity and `y` depends on it, the
/// pair is drawn as a function of `x`; otherwise as data points.
#[derive(Debug, Clone)]
pub struct PlotItem {
    pub x: Operand,
    pub y: Operand,
    pub label: Option<String>,
}

impl PlotItem {
    pub fn new(x: impl Into<Operand>, y: impl Into<Operand>) -> Self {
        Self {
            x: x.into(),
            y: y.into(),
            label: None,
        }
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }
}

#[derive(Debug, Clone)]
pub struct PlotArgs {
    pub xlabel: Option<String>,
    pub ylabel: Option<String>,
    pub xunit: Option<String>,
    pub yunit: Option<String>,
    /// Axis ranges in base units.
    pub xrange: Option<(f64, f64)>,
    pub yrange: Option<(f64, f64)>,
    pub ignore_dim: bool,
    /// Backend name; the configured one if absent.
    pub module: Option<String>,
    /// Points sampled per function curve.
    pub samples: usize,
}

impl Default for PlotArgs {
    fn default() -> Self {
        Self {
            xlabel: None,
            ylabel: None,
            xunit: None,
            yunit: None,
            xrange: None,
            yrange: None,
            ignore_dim: false,
            module: None,
            samples: 200,
        }
    }
}

/// Dimension and display unit shared by every item on one axis.
#[derive(Default)]
struct AxisScale {
    dim: Option<Dimension>,
    factor: f64,
    unit: Option<String>,
}

impl AxisScale {
    fn check(&mut self, axis: &str, dim: Dimension) -> Result<()> {
        match &self.dim {
            Some(first) if *first != dim => Err(QuantityError::mismatch(format!("plotted {} data", axis), first, &dim)),
            Some(_) => Ok(()),
            None => {
                self.dim = Some(dim);
                Ok(())
            }
        }
    }

    fn label(&self, explicit: &Option<String>) -> String {
        match (explicit, self.unit.as_deref()) {
            (Some(l), _) => l.clone(),
            (None, None | Some("1")) => String::new(),
            (None, Some(u)) => format!("[{}]", u),
        }
    }
}

impl Workspace {
    fn default_label(&self, operand: &Operand) -> Result<String> {
        Ok(match operand {
            Operand::Quantity(id) => {
                let q = self.registry.get(*id)?;
                match &q.longname {
                    Some(long) => format!("{} {}", long, q.name),
                    None => q.name.clone(),
                }
            }
            Operand::Expr(e) => to_plain(&self.registry, e),
        })
    }

    /// `y` written in terms of `x`, if it depends on it.
    fn as_function(&self, item: &PlotItem) -> Result<Option<(QuantityId, Expr)>> {
        let Operand::Quantity(x) = item.x else {
            return Ok(None);
        };
        let unfolded = topology::unfold(&self.registry, &item.y.to_expr(), x)?;
        Ok(unfolded.contains(x).then_some((x, unfolded)))
    }

    fn sample_range(&self, x: QuantityId, args: &PlotArgs, data: &[(f64, f64)]) -> Result<(f64, f64)> {
        if let Some(r) = args.xrange {
            return Ok(r);
        }
        let q = self.registry.get(x)?;
        if let Ok(values) = q.value() {
            if let Some(r) = extent(values.iter().copied()) {
                return Ok(r);
            }
        }
        extent(data.iter().flat_map(|&(lo, hi)| [lo, hi])).ok_or_else(|| QuantityError::Unresolved { name: q.name.clone() })
    }

    /// Collects everything a plot backend needs, in display units.
    pub fn plot_request(&mut self, items: &[PlotItem], args: &PlotArgs) -> Result<PlotRequest> {
        let mut xaxis = AxisScale { factor: 1.0, ..AxisScale::default() };
        let mut yaxis = AxisScale { factor: 1.0, ..AxisScale::default() };
        if !args.ignore_dim {
            for item in items {
                xaxis.check("x", self.dimension_of(&item.x)?)?;
                yaxis.check("y", self.dimension_of(&item.y)?)?;
            }
            for (axis, unit) in [(&mut xaxis, &args.xunit), (&mut yaxis, &args.yunit)] {
                if let Some(dim) = &axis.dim {
                    let (factor, shown) = self.units.convert_to_unit(dim, unit.as_deref())?;
                    axis.factor = factor;
                    axis.unit = Some(shown);
                }
            }
        }

        let mut request = PlotRequest::default();
        let mut functions = Vec::new();
        let mut data_ranges = Vec::new();
        for item in items {
            let label = match &item.label {
                Some(l) => l.clone(),
                None => self.default_label(&item.y)?,
            };
            if let Some(function) = self.as_function(item)? {
                functions.push((label, function));
                continue;
            }

            let x = self.materialize(item.x.clone())?;
            let y = self.materialize(item.y.clone())?;
            let (xq, yq) = (self.registry.get(x)?, self.registry.get(y)?);
            let (xv, xe, yv, ye) = if args.ignore_dim {
                (xq.value()?.clone(), xq.error()?.cloned(), yq.value()?.clone(), yq.error()?.cloned())
            } else {
                let ax = adjust_to_unit(&self.units, xq, xaxis.unit.as_deref())?;
                let ay = adjust_to_unit(&self.units, yq, yaxis.unit.as_deref())?;
                (ax.value, ax.error, ay.value, ay.error)
            };
            let flat = |a: ArrayD<f64>| a.iter().copied().collect::<Vec<f64>>();
            if let Some(r) = extent(xq.value()?.iter().copied()) {
                data_ranges.push(r);
            }
            request.data_sets.push(DataSeries {
                label,
                x: flat(xv),
                x_err: xe.map(flat),
                y: flat(yv),
                y_err: ye.map(flat),
            });
        }

        for (label, (x, expr)) in functions {
            let (lo, hi) = self.sample_range(x, args, &data_ranges)?;
            let n = args.samples.max(2);
            let xs = Array1::linspace(lo, hi, n);
            let engine = Engine::new(&self.registry).with_override(x, xs.clone().into_dyn());
            let ys = engine.value(&expr)?;
            let ys = kernel::broadcast_to(&ys, &[n])?;
            request.functions.push(FunctionCurve {
                label,
                points: xs
                    .iter()
                    .zip(ys.iter())
                    .map(|(&x, &y)| (x / xaxis.factor, y / yaxis.factor))
                    .collect(),
            });
        }

        request.xlabel = xaxis.label(&args.xlabel);
        request.ylabel = yaxis.label(&args.ylabel);
        request.xrange = args.xrange.map(|(lo, hi)| (lo / xaxis.factor, hi / xaxis.factor));
        request.yrange = args.yrange.map(|(lo, hi)| (lo / yaxis.factor, hi / yaxis.factor));
        debug!(
            data_sets = request.data_sets.len(),
            functions = request.functions.len(),
            "built plot request"
        );
        Ok(request)
    }

    /// Renders the items with the selected plot backend.
    pub fn plot(&mut self, items: &[PlotItem], args: PlotArgs) -> Result<String> {
        let module = args.module.clone().unwrap_or_else(|| self.config.plot_module.clone());
        self.plot_backend(&module)?;
        let request = self.plot_request(items, &args)?;
        self.plot_backend(&module)?.render(&request)
    }
}
