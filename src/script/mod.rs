//! A thin command shell over [`Workspace`]: named quantities, commands
//! executed in order, and the results file.

mod interpreter;
mod parser;
mod reader;

pub use interpreter::{Command, Interpreter, ValueSource};
pub use parser::parse_formula;
pub use reader::parse_script;

use crate::analysis::topology;
use crate::analysis::units::adjust_to_unit;
use crate::config::Config;
use crate::error::{QuantityError, Result};
use crate::store::QuantityId;
use crate::workspace::Workspace;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Names visible to formulas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    names: BTreeMap<String, QuantityId>,
}

impl Environment {
    pub fn insert(&mut self, name: &str, id: QuantityId) {
        self.names.insert(name.to_string(), id);
    }

    pub fn get(&self, name: &str) -> Option<QuantityId> {
        self.names.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, QuantityId)> + '_ {
        self.names.iter().map(|(n, &id)| (n.as_str(), id))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Text produced by the executed commands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Output {
    pub entries: Vec<String>,
}

impl Output {
    pub fn push(&mut self, entry: String) {
        self.entries.push(entry);
    }

    /// Writes every scalar quantity of `env` to the results file as
    /// `name,value,error,unit` in display units, inputs before the
    /// quantities derived from them.
    pub fn generate(&self, workspace: &Workspace, env: &Environment) -> Result<PathBuf> {
        let names: HashMap<QuantityId, &str> = env.iter().map(|(n, id)| (id, n)).collect();
        let mut csv = String::from("name,value,error,unit\n");
        for id in topology::sort(&workspace.registry)? {
            let Some(name) = names.get(&id) else {
                continue;
            };
            let q = workspace.quantity(id)?;
            if q.scalar().is_none() || q.dim.is_none() {
                continue;
            }
            let shown = adjust_to_unit(&workspace.units, q, None)?;
            let value = shown.value.iter().next().copied().unwrap_or(f64::NAN);
            let error = shown
                .error
                .as_ref()
                .and_then(|e| e.iter().next().copied())
                .map(|e| e.to_string())
                .unwrap_or_default();
            let _ = writeln!(csv, "{},{},{},{}", name, value, error, shown.unit);
        }

        let path = workspace.config.results_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, csv)?;
        info!(path = %path.display(), "wrote results");
        Ok(path)
    }
}

/// Reads every script, then executes their commands in order and writes the
/// results file. Results go to the directory of the first script.
pub fn run_files(paths: &[PathBuf], mut config: Config) -> Result<(Interpreter, PathBuf)> {
    let first = paths.first().ok_or(QuantityError::InvalidScript {
        line: 0,
        reason: "no input file specified".to_string(),
    })?;
    config.directory = first
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let mut commands = Vec::new();
    for path in paths {
        let text = fs::read_to_string(path)?;
        let parsed = parse_script(&text)?;
        info!(path = %path.display(), commands = parsed.len(), "read script");
        commands.extend(parsed);
    }

    let mut interpreter = Interpreter::new(Workspace::new(config));
    interpreter.run(commands)?;
    let results = interpreter.output.generate(&interpreter.workspace, &interpreter.env)?;
    Ok((interpreter, results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::expr::Expr;
    use crate::config::Config;
    use crate::workspace::AssignArgs;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_generate_writes_scalars_only() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            directory: dir.path().join("out"),
            ..Config::default()
        };
        let mut ws = Workspace::new(config);
        let mut env = Environment::default();
        let a = ws.assign(1.5, AssignArgs::new().name("a").error(0.02).unit("km")).unwrap();
        let b = ws.assign(Expr::q(a) * 2.0, AssignArgs::new().name("b")).unwrap();
        let n = ws.assign(3.0, AssignArgs::new().name("n")).unwrap();
        let c = ws.assign(vec![1.0, 2.0], AssignArgs::new().name("c")).unwrap();
        let p = ws.params(&["p"])[0];
        for (name, id) in [("b", b), ("a", a), ("c", c), ("n", n), ("p", p)] {
            env.insert(name, id);
        }

        let path = Output::default().generate(&ws, &env).unwrap();
        assert_eq!(path, dir.path().join("out").join("results.csv"));
        let written = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[0], "name,value,error,unit");
        assert_eq!(lines.len(), 4);
        assert!(lines.contains(&"n,3,,1"));
        let pos = |l: &str| lines.iter().position(|x| *x == l).unwrap();
        assert!(pos("a,1.5,0.02,km") < pos("b,3000,40,m"));
    }

    #[test]
    fn test_run_files_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data.txt");
        let analysis = dir.path().join("analysis.txt");
        fs::write(
            &data,
            "# free fall\n\
             t = 0, 1, 2, 3 [s]\n\
             h \"height\" = 1, 3, 5, 7 +- 0.1 [m]\n\
             m = 2 +- 0.1 [kg]\n",
        )
        .unwrap();
        fs::write(
            &analysis,
            "params v h0\n\
             fit v * t + h0 to t, h with v h0\n\
             p = m * v\n\
             formula p\n",
        )
        .unwrap();

        let (interp, results) = run_files(&[data, analysis], Config::default()).unwrap();
        assert_eq!(results, dir.path().join("results.csv"));
        assert_eq!(interp.output.entries.len(), 2);

        let written = fs::read_to_string(results).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[0], "name,value,error,unit");
        assert!(lines.contains(&"m,2,0.1,kg"));
        let row = lines.iter().find(|l| l.starts_with("p,")).unwrap();
        let fields: Vec<&str> = row.split(',').collect();
        assert_abs_diff_eq!(fields[1].parse::<f64>().unwrap(), 4.0, epsilon = 1e-6);
        assert_eq!(fields[3], "kg*m/s");
        let pos = |prefix: &str| lines.iter().position(|l| l.starts_with(prefix)).unwrap();
        assert!(pos("v,") < pos("p,"));
    }

    #[test]
    fn test_run_files_rejects_malformed_script_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("bad.txt");
        fs::write(&script, "x = 1 [m]\ntable x; wide\n").unwrap();
        match run_files(&[script], Config::default()) {
            Err(QuantityError::InvalidScript { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected script error, got {:?}", other.map(|(_, p)| p)),
        }
        assert!(!dir.path().join("results.csv").exists());
    }
}
