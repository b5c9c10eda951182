//! The session facade: owns the quantity registry, the unit registry, the
//! configuration and the pluggable fit/plot backends.

mod assign;
mod fit;
mod plot;

pub use assign::{AssignArgs, ValueInput};
pub use fit::{FitArgs, FitReport};
pub use plot::{PlotArgs, PlotItem};

use crate::analysis::units::{adjust_to_unit, Adjusted, UnitRegistry};
use crate::compute::engine::Engine;
use crate::compute::expr::Expr;
use crate::config::Config;
use crate::display::plot::{PlotBackend, TextPlot};
use crate::display::render::to_latex;
use crate::display::table::Table;
use crate::display::trace::format_trace;
use crate::error::{QuantityError, Result};
use crate::solver::levenberg_marquardt::LevenbergMarquardt;
use crate::solver::problem::FitBackend;
use crate::store::{Derivation, Quantity, QuantityId, Registry};
use crate::analysis::dimension::Dimension;
use std::collections::HashMap;

/// Either an existing quantity or an expression over quantities.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Quantity(QuantityId),
    Expr(Expr),
}

impl Operand {
    pub fn to_expr(&self) -> Expr {
        match self {
            Operand::Quantity(id) => Expr::q(*id),
            Operand::Expr(e) => e.clone(),
        }
    }
}

impl From<QuantityId> for Operand {
    fn from(id: QuantityId) -> Self { Operand::Quantity(id) }
}

impl From<Expr> for Operand {
    fn from(e: Expr) -> Self {
        match e {
            Expr::Quantity(id) => Operand::Quantity(id),
            other => Operand::Expr(other),
        }
    }
}

pub struct Workspace {
    pub registry: Registry,
    pub units: UnitRegistry,
    pub config: Config,
    fit_backends: HashMap<String, Box<dyn FitBackend>>,
    plot_backends: HashMap<String, Box<dyn PlotBackend>>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Workspace {
    pub fn new(config: Config) -> Self {
        let mut ws = Self {
            registry: Registry::new(),
            units: config.unit_system.registry(),
            config,
            fit_backends: HashMap::new(),
            plot_backends: HashMap::new(),
        };
        ws.register_fit_backend(Box::new(LevenbergMarquardt::default()));
        ws.register_plot_backend(Box::new(TextPlot));
        ws
    }

    pub fn register_fit_backend(&mut self, backend: Box<dyn FitBackend>) {
        self.fit_backends.insert(backend.name().to_string(), backend);
    }

    pub fn register_plot_backend(&mut self, backend: Box<dyn PlotBackend>) {
        self.plot_backends.insert(backend.name().to_string(), backend);
    }

    fn fit_backend(&self, name: &str) -> Result<&dyn FitBackend> {
        self.fit_backends
            .get(name)
            .map(|b| b.as_ref())
            .ok_or_else(|| QuantityError::UnknownBackend { kind: "fit", name: name.to_string() })
    }

    fn plot_backend(&self, name: &str) -> Result<&dyn PlotBackend> {
        self.plot_backends
            .get(name)
            .map(|b| b.as_ref())
            .ok_or_else(|| QuantityError::UnknownBackend { kind: "plot", name: name.to_string() })
    }

    pub fn quantity(&self, id: QuantityId) -> Result<&Quantity> {
        self.registry.get(id)
    }

    pub fn find(&self, name: &str) -> Result<QuantityId> {
        self.registry
            .find(name)
            .ok_or_else(|| QuantityError::UnknownName { name: name.to_string() })
    }

    /// Creates empty quantities to be used as fit parameters. A single
    /// string is split on whitespace.
    pub fn params(&mut self, names: &[&str]) -> Vec<QuantityId> {
        let split: Vec<&str> = match names {
            [single] => single.split_whitespace().collect(),
            many => many.to_vec(),
        };
        split
            .into_iter()
            .map(|n| self.registry.add_placeholder(Some(n), None))
            .collect()
    }

    pub(crate) fn dimension_of(&self, operand: &Operand) -> Result<Dimension> {
        match operand {
            Operand::Quantity(id) => Ok(self.registry.get(*id)?.dimension()?.clone()),
            Operand::Expr(e) => Engine::new(&self.registry).dimension(e),
        }
    }

    /// Turns an expression operand into a dummy quantity.
    pub(crate) fn materialize(&mut self, operand: Operand) -> Result<QuantityId> {
        match operand {
            Operand::Quantity(id) => Ok(id),
            Operand::Expr(e) => self.assign(e, AssignArgs::default()),
        }
    }

    /// LaTeX form of a quantity's error derivation.
    pub fn formula(&self, id: QuantityId) -> Result<String> {
        let q = self.registry.get(id)?;
        match &q.error_formula {
            None => Err(QuantityError::MissingDerivation { name: q.name.clone() }),
            Some(Derivation::Fit) => Ok("fit".to_string()),
            Some(Derivation::Formula(expr)) => Ok(format!(
                "\\sigma_{{{}}} = {}",
                q.name,
                to_latex(&self.registry, expr)
            )),
        }
    }

    pub fn trace(&self, id: QuantityId) -> Result<String> {
        self.registry.get(id)?;
        Ok(format_trace(&self.registry, &self.units, id))
    }

    pub fn table(&self, ids: &[QuantityId]) -> Result<Table> {
        Table::build(&self.registry, &self.units, ids, self.config.rounding)
    }

    /// Value and error of a quantity in `unit` (or its preferred unit).
    pub fn convert(&self, id: QuantityId, unit: Option<&str>) -> Result<Adjusted> {
        adjust_to_unit(&self.units, self.registry.get(id)?, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::QuantityState;

    #[test]
    fn test_params_split_single_string() {
        let mut ws = Workspace::default();
        let ids = ws.params(&["a b  c"]);
        assert_eq!(ids.len(), 3);
        assert_eq!(ws.quantity(ids[2]).unwrap().name, "c");
        assert!(matches!(ws.quantity(ids[0]).unwrap().state, QuantityState::Placeholder));

        let more = ws.params(&["d", "e"]);
        assert_eq!(more.len(), 2);
        assert_eq!(ws.find("e").unwrap(), more[1]);
    }

    #[test]
    fn test_formula_of_measured_quantity_is_missing() {
        let mut ws = Workspace::default();
        let x = ws.assign(2.0, AssignArgs::new().name("x").error(0.1).unit("m")).unwrap();
        assert!(matches!(ws.formula(x), Err(QuantityError::MissingDerivation { .. })));
    }

    #[test]
    fn test_formula_latex() {
        let mut ws = Workspace::default();
        let x = ws.assign(2.0, AssignArgs::new().name("x").error(0.1)).unwrap();
        let y = ws.assign(3.0, AssignArgs::new().name("y").error(0.2)).unwrap();
        let z = ws.assign(Expr::q(x) * Expr::q(y), AssignArgs::new().name("z")).unwrap();
        assert_eq!(
            ws.formula(z).unwrap(),
            "\\sigma_{z} = \\sqrt{\\left(y \\cdot \\sigma_{x}\\right)^{2} + \\left(x \\cdot \\sigma_{y}\\right)^{2}}"
        );
    }

    #[test]
    fn test_trace_shows_tree_and_back_references() {
        let mut ws = Workspace::default();
        let v = ws.assign(2.0, AssignArgs::new().name("v").error(0.1).unit("m/s")).unwrap();
        let m = ws.assign(3.0, AssignArgs::new().name("m").error(0.1).unit("kg")).unwrap();
        let p = ws.assign(Expr::q(m) * Expr::q(v), AssignArgs::new().name("p")).unwrap();
        let e = ws.assign(Expr::q(p) * Expr::q(v) / 2.0, AssignArgs::new().name("E")).unwrap();

        let trace = ws.trace(e).unwrap();
        let lines: Vec<&str> = trace.lines().collect();
        assert_eq!(lines[0], "TRACE for quantity 'E':");
        assert!(lines[2].starts_with("[L1] E[6.000 ± "));
        assert!(lines[2].ends_with(" J] = p * v / 2"));
        assert!(lines[3].starts_with("|--[L2] v[2.000 ± 0.100 m/s] -> measured"));
        assert!(lines[4].starts_with("`--[L2] p[6.000 ± "));
        assert_eq!(lines[5], "   |---> (Ref to L2)");
        assert_eq!(lines[6], "   `--[L3] m[3.000 ± 0.100 kg] -> measured");
        assert_eq!(ws.quantity(e).unwrap().dim, Some(ws.units.resolve("J").unwrap().dim));
    }

    #[test]
    fn test_unknown_backend() {
        let ws = Workspace::default();
        assert!(matches!(
            ws.fit_backend("scipy"),
            Err(QuantityError::UnknownBackend { kind: "fit", .. })
        ));
        assert!(ws.plot_backend("text").is_ok());
    }
}
