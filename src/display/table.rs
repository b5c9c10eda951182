//! Tables of quantity values in display units.
use crate::analysis::units::{adjust_to_unit, UnitRegistry};
use crate::error::Result;
use crate::store::{QuantityId, Registry};

/// Rounds `error` to two significant digits and `value` to the same
/// decimal place.
pub fn round_to_error(value: f64, error: f64) -> (String, String) {
    if !(error.is_finite() && error > 0.0) {
        return (format!("{}", value), format!("{}", error));
    }
    let decimals = 1 - error.log10().floor() as i32;
    if decimals > 0 {
        let d = decimals as usize;
        (format!("{:.*}", d, value), format!("{:.*}", d, error))
    } else {
        let step = 10f64.powi(-decimals);
        (
            format!("{:.0}", (value / step).round() * step),
            format!("{:.0}", (error / step).round() * step),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub unit: String,
    pub cells: Vec<Cell>,
}

impl Column {
    fn header(&self) -> String {
        if self.unit == "1" {
            self.name.clone()
        } else {
            format!("{} [{}]", self.name, self.unit)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<Column>,
}

impl Table {
    /// One column per quantity; array quantities give one row per element.
    pub fn build(registry: &Registry, units: &UnitRegistry, ids: &[QuantityId], rounding: bool) -> Result<Self> {
        let mut columns = Vec::with_capacity(ids.len());
        for &id in ids {
            let q = registry.get(id)?;
            let adjusted = adjust_to_unit(units, q, None)?;
            let errors: Vec<Option<f64>> = match &adjusted.error {
                Some(e) => e.iter().map(|&x| Some(x)).collect(),
                None => vec![None; adjusted.value.len()],
            };
            let cells = adjusted
                .value
                .iter()
                .zip(errors)
                .map(|(&v, e)| match e {
                    Some(e) if rounding => {
                        let (v, e) = round_to_error(v, e);
                        Cell { value: v, error: Some(e) }
                    }
                    Some(e) => Cell {
                        value: format!("{}", v),
                        error: Some(format!("{}", e)),
                    },
                    None => Cell {
                        value: format!("{}", v),
                        error: None,
                    },
                })
                .collect();
            columns.push(Column {
                name: q.name.clone(),
                unit: adjusted.unit,
                cells,
            });
        }
        Ok(Self { columns })
    }

    fn rows(columns: &[Column]) -> usize {
        columns.iter().map(|c| c.cells.len()).max().unwrap_or(0)
    }

    /// Plain text, split into blocks of at most `maxcols` columns.
    pub fn to_text(&self, maxcols: usize) -> String {
        let mut blocks = Vec::new();
        for chunk in self.columns.chunks(maxcols.max(1)) {
            let rows = Self::rows(chunk);
            let text_cell = |c: Option<&Cell>| match c {
                Some(Cell { value, error: Some(e) }) => format!("{} ± {}", value, e),
                Some(Cell { value, error: None }) => value.clone(),
                None => String::new(),
            };
            let grid: Vec<Vec<String>> = chunk
                .iter()
                .map(|col| {
                    std::iter::once(col.header())
                        .chain((0..rows).map(|r| text_cell(col.cells.get(r))))
                        .collect()
                })
                .collect();
            let widths: Vec<usize> = grid
                .iter()
                .map(|col| col.iter().map(|s| s.chars().count()).max().unwrap_or(0))
                .collect();

            let mut lines = Vec::with_capacity(rows + 2);
            for r in 0..=rows {
                let line = grid
                    .iter()
                    .zip(&widths)
                    .map(|(col, &w)| format!("{:<w$}", col[r], w = w))
                    .collect::<Vec<_>>()
                    .join(" | ");
                lines.push(line.trim_end().to_string());
                if r == 0 {
                    lines.push(widths.iter().map(|&w| "-".repeat(w)).collect::<Vec<_>>().join("-+-"));
                }
            }
            blocks.push(lines.join("\n"));
        }
        blocks.join("\n\n")
    }

    /// LaTeX `tabular` environments, split into blocks of at most `maxcols` columns.
    pub fn to_latex(&self, maxcols: usize) -> String {
        let mut blocks = Vec::new();
        for chunk in self.columns.chunks(maxcols.max(1)) {
            let rows = Self::rows(chunk);
            let mut out = String::new();
            out.push_str(&format!("\\begin{{tabular}}{{|{}}}\n\\hline\n", "c|".repeat(chunk.len())));
            let header: Vec<String> = chunk
                .iter()
                .map(|c| {
                    if c.unit == "1" {
                        format!("${}$", c.name)
                    } else {
                        format!("${}$ [${}$]", c.name, c.unit)
                    }
                })
                .collect();
            out.push_str(&format!("{} \\\\\n\\hline\n", header.join(" & ")));
            for r in 0..rows {
                let row: Vec<String> = chunk
                    .iter()
                    .map(|c| match c.cells.get(r) {
                        Some(Cell { value, error: Some(e) }) => format!("${} \\pm {}$", value, e),
                        Some(Cell { value, error: None }) => format!("${}$", value),
                        None => String::new(),
                    })
                    .collect();
                out.push_str(&format!("{} \\\\\n", row.join(" & ")));
            }
            out.push_str("\\hline\n\\end{tabular}");
            blocks.push(out);
        }
        blocks.join("\n")
    }
}
