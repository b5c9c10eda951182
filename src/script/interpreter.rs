use super::parser::parse_formula;
use super::{Environment, Output};
use crate::error::{QuantityError, Result};
use crate::solver::problem::Weighting;
use crate::store::QuantityId;
use crate::workspace::{AssignArgs, FitArgs, Operand, PlotArgs, PlotItem, ValueInput, Workspace};
use ndarray::{arr0, Array1, ArrayD};
use tracing::debug;

/// The value side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSource {
    Numbers(Vec<f64>),
    Formula(String),
}

/// One statement of a script. Formulas are kept as text and parsed against
/// the environment when the command runs.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Assign {
        name: String,
        value: ValueSource,
        error: Option<Vec<f64>>,
        unit: Option<String>,
        longname: Option<String>,
        ignore_dim: bool,
    },
    Params {
        names: Vec<String>,
    },
    Fit {
        func: String,
        xdata: String,
        ydata: String,
        params: Vec<String>,
        xvar: Option<String>,
        weighting: Weighting,
        absolute_sigma: bool,
    },
    Table {
        names: Vec<String>,
        maxcols: usize,
        latex: bool,
    },
    Formula {
        name: String,
    },
    Plot {
        items: Vec<(String, String)>,
        xunit: Option<String>,
        yunit: Option<String>,
    },
}

impl Command {
    fn kind(&self) -> &'static str {
        match self {
            Command::Assign { .. } => "assign",
            Command::Params { .. } => "params",
            Command::Fit { .. } => "fit",
            Command::Table { .. } => "table",
            Command::Formula { .. } => "formula",
            Command::Plot { .. } => "plot",
        }
    }
}

/// A single number is a scalar, anything else a 1-D array.
fn array(values: Vec<f64>) -> ArrayD<f64> {
    match values.as_slice() {
        [single] => arr0(*single).into_dyn(),
        _ => Array1::from(values).into_dyn(),
    }
}

/// Runs commands in order against one workspace.
pub struct Interpreter {
    pub workspace: Workspace,
    pub env: Environment,
    pub output: Output,
}

impl Interpreter {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            env: Environment::default(),
            output: Output::default(),
        }
    }

    fn lookup(&self, name: &str) -> Result<QuantityId> {
        self.env
            .get(name)
            .ok_or_else(|| QuantityError::UnknownName { name: name.to_string() })
    }

    fn operand(&self, source: &str) -> Result<Operand> {
        Ok(Operand::from(parse_formula(source, &self.env)?))
    }

    pub fn execute(&mut self, command: Command) -> Result<()> {
        debug!(command = command.kind(), "executing");
        match command {
            Command::Assign {
                name,
                value,
                error,
                unit,
                longname,
                ignore_dim,
            } => {
                let value = match value {
                    ValueSource::Numbers(v) => ValueInput::Number(array(v)),
                    ValueSource::Formula(f) => ValueInput::from(parse_formula(&f, &self.env)?),
                };
                let mut args = AssignArgs::new().name(&name).ignore_dim(ignore_dim);
                args.error = error.map(array);
                args.unit = unit;
                args.longname = longname;

                // A name declared by `params` is filled in place.
                let placeholder = self
                    .env
                    .get(&name)
                    .filter(|&id| self.workspace.quantity(id).is_ok_and(|q| !q.is_resolved()));
                match placeholder {
                    Some(id) => self.workspace.assign_to(id, value, args)?,
                    None => {
                        let id = self.workspace.assign(value, args)?;
                        self.env.insert(&name, id);
                    }
                }
            }
            Command::Params { names } => {
                let refs: Vec<&str> = names.iter().map(String::as_str).collect();
                for id in self.workspace.params(&refs) {
                    let name = self.workspace.quantity(id)?.name.clone();
                    self.env.insert(&name, id);
                }
            }
            Command::Fit {
                func,
                xdata,
                ydata,
                params,
                xvar,
                weighting,
                absolute_sigma,
            } => {
                let func = parse_formula(&func, &self.env)?;
                let x = self.operand(&xdata)?;
                let y = self.operand(&ydata)?;
                let params = params.iter().map(|p| self.lookup(p)).collect::<Result<Vec<_>>>()?;
                let args = FitArgs {
                    xvar: xvar.map(|v| self.lookup(&v)).transpose()?,
                    weighting,
                    absolute_sigma,
                    ..FitArgs::default()
                };
                self.workspace.fit(&func, x, y, &params, args)?;
                let table = self.workspace.table(&params)?;
                self.output.push(table.to_text(params.len()));
            }
            Command::Table { names, maxcols, latex } => {
                let ids = names.iter().map(|n| self.lookup(n)).collect::<Result<Vec<_>>>()?;
                let table = self.workspace.table(&ids)?;
                let text = if latex { table.to_latex(maxcols) } else { table.to_text(maxcols) };
                self.output.push(text);
            }
            Command::Formula { name } => {
                let id = self.lookup(&name)?;
                let latex = self.workspace.formula(id)?;
                self.output.push(latex);
            }
            Command::Plot { items, xunit, yunit } => {
                let items = items
                    .iter()
                    .map(|(x, y)| -> Result<PlotItem> { Ok(PlotItem::new(self.operand(x)?, self.operand(y)?)) })
                    .collect::<Result<Vec<_>>>()?;
                let args = PlotArgs {
                    xunit,
                    yunit,
                    ..PlotArgs::default()
                };
                let rendered = self.workspace.plot(&items, args)?;
                self.output.push(rendered);
            }
        }
        Ok(())
    }

    /// Executes `commands` in order, stopping at the first failure.
    pub fn run(&mut self, commands: impl IntoIterator<Item = Command>) -> Result<()> {
        for command in commands {
            self.execute(command)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assign(name: &str, value: ValueSource, error: Option<Vec<f64>>, unit: Option<&str>) -> Command {
        Command::Assign {
            name: name.to_string(),
            value,
            error,
            unit: unit.map(str::to_string),
            longname: None,
            ignore_dim: false,
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_scripted_session() {
        let mut interp = Interpreter::new(Workspace::default());
        interp
            .run([
                assign("t", ValueSource::Numbers(vec![0.0, 1.0, 2.0, 3.0]), None, Some("s")),
                assign("h", ValueSource::Numbers(vec![1.0, 3.0, 5.0, 7.0]), Some(vec![0.1]), Some("m")),
                Command::Params { names: names(&["v h0"]) },
                Command::Fit {
                    func: "v * t + h0".to_string(),
                    xdata: "t".to_string(),
                    ydata: "h".to_string(),
                    params: names(&["v", "h0"]),
                    xvar: None,
                    weighting: Weighting::Auto,
                    absolute_sigma: false,
                },
                assign("m", ValueSource::Numbers(vec![2.0]), Some(vec![0.1]), Some("kg")),
                assign("p", ValueSource::Formula("m * v".to_string()), None, None),
                Command::Formula { name: "p".to_string() },
                Command::Table { names: names(&["m"]), maxcols: 4, latex: false },
            ])
            .unwrap();

        let v = interp.env.get("v").unwrap();
        assert_abs_diff_eq!(interp.workspace.quantity(v).unwrap().scalar().unwrap().0, 2.0, epsilon = 1e-8);
        assert_eq!(interp.output.entries.len(), 3);
        assert!(interp.output.entries[0].starts_with("v [m/s]"));
        assert!(interp.output.entries[1].starts_with("\\sigma_{p} = "));
        assert_eq!(interp.output.entries[2], "m [kg]\n-----------\n2.00 ± 0.10");
    }

    #[test]
    fn test_assign_fills_declared_param() {
        let mut interp = Interpreter::new(Workspace::default());
        interp.execute(Command::Params { names: names(&["g"]) }).unwrap();
        let g = interp.env.get("g").unwrap();
        interp
            .execute(assign("g", ValueSource::Numbers(vec![9.81]), Some(vec![0.01]), Some("m/s^2")))
            .unwrap();
        assert_eq!(interp.env.get("g"), Some(g));
        assert!(interp.workspace.quantity(g).unwrap().is_resolved());
    }

    #[test]
    fn test_unknown_name_stops_run() {
        let mut interp = Interpreter::new(Workspace::default());
        let result = interp.run([
            assign("a", ValueSource::Formula("b * 2".to_string()), None, None),
            Command::Formula { name: "a".to_string() },
        ]);
        assert!(matches!(result, Err(QuantityError::UnknownName { .. })));
        assert!(interp.output.entries.is_empty());
    }
}
