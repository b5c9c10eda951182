//! Line-oriented script syntax.
//!
//! ```text
//! # measured data
//! t = 0, 1, 2, 3 [s]
//! h "height" = 1, 3, 5, 7 +- 0.1 [m]
//! params v h0
//! fit v * t + h0 to t, h with v h0; weighted
//! p = m * v
//! table v h0; maxcols = 2
//! formula p
//! plot t, h and t, v * t + h0; xunit = ms
//! ```

use super::interpreter::{Command, ValueSource};
use crate::error::{QuantityError, Result};
use crate::solver::problem::Weighting;

const DEFAULT_MAXCOLS: usize = 5;

struct Line<'a> {
    number: usize,
    head: &'a str,
    options: Vec<(&'a str, Option<&'a str>)>,
}

impl<'a> Line<'a> {
    fn new(number: usize, text: &'a str) -> Self {
        let mut parts = text.split(';');
        let head = parts.next().unwrap_or_default().trim();
        let options = parts
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(|o| match o.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (o, None),
            })
            .collect();
        Self { number, head, options }
    }

    fn invalid(&self, reason: impl Into<String>) -> QuantityError {
        QuantityError::InvalidScript {
            line: self.number,
            reason: reason.into(),
        }
    }

    /// Rejects options the statement doesn't know.
    fn check_options(&self, known: &[&str]) -> Result<()> {
        match self.options.iter().find(|(k, _)| !known.contains(k)) {
            Some((k, _)) => Err(self.invalid(format!("unknown option '{}'", k))),
            None => Ok(()),
        }
    }

    fn flag(&self, key: &str) -> bool {
        self.options.iter().any(|(k, _)| *k == key)
    }

    fn value(&self, key: &str) -> Result<Option<String>> {
        match self.options.iter().find(|(k, _)| *k == key) {
            Some((_, Some(v))) if !v.is_empty() => Ok(Some(v.to_string())),
            Some(_) => Err(self.invalid(format!("option '{}' needs a value", key))),
            None => Ok(None),
        }
    }
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Splits on `sep` outside parentheses.
fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts
}

fn numbers(s: &str) -> Option<Vec<f64>> {
    s.split(',').map(|n| n.trim().parse::<f64>().ok()).collect()
}

fn names(line: &Line, s: &str) -> Result<Vec<String>> {
    let list: Vec<String> = s.split_whitespace().map(str::to_string).collect();
    if list.is_empty() {
        return Err(line.invalid("expected at least one name"));
    }
    match list.iter().find(|n| !is_name(n)) {
        Some(bad) => Err(line.invalid(format!("'{}' is not a name", bad))),
        None => Ok(list),
    }
}

/// `X, Y` with both sides non-empty.
fn pair(line: &Line, s: &str) -> Result<(String, String)> {
    match split_top_level(s, ',').as_slice() {
        [x, y] if !x.is_empty() && !y.is_empty() => Ok((x.to_string(), y.to_string())),
        _ => Err(line.invalid(format!("expected 'x, y', found '{}'", s))),
    }
}

fn assign(line: &Line, lhs: &str, rhs: &str) -> Result<Command> {
    line.check_options(&["ignore_dim"])?;
    let (name, longname) = match lhs.split_once('"') {
        Some((name, rest)) => {
            let long = rest
                .strip_suffix('"')
                .ok_or_else(|| line.invalid("unterminated long name"))?;
            (name.trim(), Some(long.to_string()))
        }
        None => (lhs, None),
    };
    if !is_name(name) {
        return Err(line.invalid(format!("'{}' is not a name", name)));
    }

    let mut rhs = rhs.trim();
    let mut unit = None;
    if let Some(body) = rhs.strip_suffix(']') {
        let open = body.rfind('[').ok_or_else(|| line.invalid("unbalanced unit brackets"))?;
        unit = Some(body[open + 1..].trim().to_string());
        rhs = body[..open].trim();
    }
    if rhs.contains(['[', ']']) {
        return Err(line.invalid("unbalanced unit brackets"));
    }
    let (value, error) = match rhs.split_once("+-").or_else(|| rhs.split_once('±')) {
        Some((v, e)) => {
            let e = numbers(e).ok_or_else(|| line.invalid(format!("bad error '{}'", e.trim())))?;
            (v.trim(), Some(e))
        }
        None => (rhs, None),
    };
    if value.is_empty() {
        return Err(line.invalid(format!("no value for '{}'", name)));
    }
    let value = match numbers(value) {
        Some(v) => ValueSource::Numbers(v),
        None => ValueSource::Formula(value.to_string()),
    };
    Ok(Command::Assign {
        name: name.to_string(),
        value,
        error,
        unit,
        longname,
        ignore_dim: line.flag("ignore_dim"),
    })
}

fn fit(line: &Line, rest: &str) -> Result<Command> {
    line.check_options(&["xvar", "weighted", "unweighted", "absolute_sigma"])?;
    let (func, rest) = rest
        .split_once(" to ")
        .ok_or_else(|| line.invalid("expected 'fit <function> to <x>, <y> with <params>'"))?;
    let (data, params) = rest
        .split_once(" with ")
        .ok_or_else(|| line.invalid("expected 'with <params>'"))?;
    let (xdata, ydata) = pair(line, data)?;
    let weighting = match (line.flag("weighted"), line.flag("unweighted")) {
        (true, true) => return Err(line.invalid("'weighted' and 'unweighted' both given")),
        (true, false) => Weighting::Weighted,
        (false, true) => Weighting::Unweighted,
        (false, false) => Weighting::Auto,
    };
    Ok(Command::Fit {
        func: func.trim().to_string(),
        xdata,
        ydata,
        params: names(line, params)?,
        xvar: line.value("xvar")?,
        weighting,
        absolute_sigma: line.flag("absolute_sigma"),
    })
}

fn table(line: &Line, rest: &str) -> Result<Command> {
    line.check_options(&["maxcols", "latex"])?;
    let maxcols = match line.value("maxcols")? {
        Some(v) => v
            .parse::<usize>()
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| line.invalid(format!("bad maxcols '{}'", v)))?,
        None => DEFAULT_MAXCOLS,
    };
    Ok(Command::Table {
        names: names(line, rest)?,
        maxcols,
        latex: line.flag("latex"),
    })
}

fn plot(line: &Line, rest: &str) -> Result<Command> {
    line.check_options(&["xunit", "yunit"])?;
    let items = rest
        .split(" and ")
        .map(|item| pair(line, item))
        .collect::<Result<Vec<_>>>()?;
    Ok(Command::Plot {
        items,
        xunit: line.value("xunit")?,
        yunit: line.value("yunit")?,
    })
}

fn statement(line: &Line) -> Result<Command> {
    let head = line.head;
    let (word, rest) = head.split_once(char::is_whitespace).unwrap_or((head, ""));
    let rest = rest.trim();
    // `fit = 2` assigns a quantity called fit.
    let keyword = !rest.starts_with('=') && !rest.starts_with('"');
    match word {
        "params" if keyword => {
            line.check_options(&[])?;
            Ok(Command::Params { names: names(line, rest)? })
        }
        "fit" if keyword => fit(line, rest),
        "table" if keyword => table(line, rest),
        "formula" if keyword => {
            line.check_options(&[])?;
            match names(line, rest)?.as_slice() {
                [name] => Ok(Command::Formula { name: name.clone() }),
                _ => Err(line.invalid("'formula' takes one name")),
            }
        }
        "plot" if keyword => plot(line, rest),
        _ => match head.split_once('=') {
            Some((lhs, rhs)) => assign(line, lhs.trim(), rhs),
            None => Err(line.invalid(format!("can't read statement '{}'", head))),
        },
    }
}

/// Reads a whole script. Nothing is executed, so a malformed line anywhere
/// rejects the script.
pub fn parse_script(text: &str) -> Result<Vec<Command>> {
    text.lines()
        .enumerate()
        .filter_map(|(i, raw)| {
            let code = raw.split('#').next().unwrap_or_default().trim();
            (!code.is_empty()).then(|| statement(&Line::new(i + 1, code)))
        })
        .collect()
}
