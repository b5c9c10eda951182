//! Human-readable output: expressions, derivation traces, tables and plots.
pub mod plot;
pub mod render;
pub mod table;
pub mod trace;

pub use plot::{DataSeries, FunctionCurve, PlotBackend, PlotRequest, TextPlot};
pub use render::{to_latex, to_plain, ExprPrinter, Style};
pub use table::{round_to_error, Table};
pub use trace::format_trace;
