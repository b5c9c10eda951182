//! Plot requests handed to rendering backends.
use crate::error::Result;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq)]
pub struct DataSeries {
    pub label: String,
    pub x: Vec<f64>,
    pub x_err: Option<Vec<f64>>,
    pub y: Vec<f64>,
    pub y_err: Option<Vec<f64>>,
}

/// A model curve, already sampled in display units.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCurve {
    pub label: String,
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlotRequest {
    pub data_sets: Vec<DataSeries>,
    pub functions: Vec<FunctionCurve>,
    pub xlabel: String,
    pub ylabel: String,
    pub xrange: Option<(f64, f64)>,
    pub yrange: Option<(f64, f64)>,
}

pub trait PlotBackend {
    fn name(&self) -> &'static str;
    fn render(&self, request: &PlotRequest) -> Result<String>;
}

/// Describes a plot in words instead of drawing it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextPlot;

impl TextPlot {
    pub const NAME: &'static str = "text";
}

/// Smallest and largest of `values`.
pub(crate) fn extent(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

fn fmt_range(r: Option<(f64, f64)>) -> String {
    match r {
        Some((lo, hi)) => format!("[{}, {}]", lo, hi),
        None => "[]".to_string(),
    }
}

impl PlotBackend for TextPlot {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn render(&self, request: &PlotRequest) -> Result<String> {
        let mut out = String::new();
        let label = |l: &str| if l.is_empty() { "-".to_string() } else { l.to_string() };
        let _ = writeln!(out, "plot: x {} vs y {}", label(&request.xlabel), label(&request.ylabel));
        if let Some(r) = request.xrange {
            let _ = writeln!(out, "x range {}", fmt_range(Some(r)));
        }
        if let Some(r) = request.yrange {
            let _ = writeln!(out, "y range {}", fmt_range(Some(r)));
        }
        for d in &request.data_sets {
            let _ = writeln!(
                out,
                "data '{}': {} points, x in {}, y in {}{}",
                d.label,
                d.x.len().max(d.y.len()),
                fmt_range(extent(d.x.iter().copied())),
                fmt_range(extent(d.y.iter().copied())),
                if d.y_err.is_some() { ", with error bars" } else { "" }
            );
        }
        for f in &request.functions {
            let _ = writeln!(
                out,
                "function '{}': {} samples, y in {}",
                f.label,
                f.points.len(),
                fmt_range(extent(f.points.iter().map(|p| p.1)))
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent() {
        assert_eq!(extent([3.0, -1.0, 2.0].into_iter()), Some((-1.0, 3.0)));
        assert_eq!(extent(std::iter::empty()), None);
    }

    #[test]
    fn test_text_plot_summary() {
        let request = PlotRequest {
            data_sets: vec![DataSeries {
                label: "h".into(),
                x: vec![0.0, 1.0, 2.0],
                x_err: None,
                y: vec![1.0, 4.0, 9.0],
                y_err: Some(vec![0.1, 0.1, 0.1]),
            }],
            functions: vec![FunctionCurve {
                label: "a * t".into(),
                points: vec![(0.0, 0.0), (2.0, 8.0)],
            }],
            xlabel: "[s]".into(),
            ylabel: "[m]".into(),
            xrange: Some((0.0, 2.0)),
            yrange: None,
        };
        let text = TextPlot.render(&request).unwrap();
        assert_eq!(
            text,
            "plot: x [s] vs y [m]\n\
             x range [0, 2]\n\
             data 'h': 3 points, x in [0, 2], y in [1, 9], with error bars\n\
             function 'a * t': 2 samples, y in [0, 8]\n"
        );
    }
}
