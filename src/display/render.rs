//! Expression printing in plain text and LaTeX.
use crate::compute::expr::{BinaryOp, Expr, Function};
use crate::store::{QuantityId, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Plain,
    Latex,
}

pub struct ExprPrinter<'a> {
    registry: &'a Registry,
    style: Style,
}

const PREC_ADD: u8 = 1;
const PREC_MUL: u8 = 2;
const PREC_NEG: u8 = 3;
const PREC_POW: u8 = 4;
const PREC_ATOM: u8 = 5;

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Literal(x) if *x < 0.0 => PREC_NEG,
        Expr::Literal(_) | Expr::Quantity(_) | Expr::ErrorOf(_) | Expr::Func { .. } => PREC_ATOM,
        Expr::Neg(_) => PREC_NEG,
        Expr::Binary { op: BinaryOp::Add | BinaryOp::Sub, .. } => PREC_ADD,
        Expr::Binary { .. } => PREC_MUL,
        Expr::Pow { exponent, .. } if is_half(exponent) => PREC_ATOM,
        Expr::Pow { .. } => PREC_POW,
    }
}

fn is_half(e: &Expr) -> bool {
    e.constant_value() == Some(0.5)
}

pub fn format_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        format!("{}", x)
    }
}

impl<'a> ExprPrinter<'a> {
    pub fn new(registry: &'a Registry, style: Style) -> Self {
        Self { registry, style }
    }

    fn name(&self, id: QuantityId) -> String {
        self.registry
            .get(id)
            .map_or_else(|_| id.to_string(), |q| q.name.clone())
    }

    fn paren(&self, s: String) -> String {
        match self.style {
            Style::Plain => format!("({})", s),
            Style::Latex => format!("\\left({}\\right)", s),
        }
    }

    fn wrapped(&self, expr: &Expr, min_prec: u8) -> String {
        let s = self.print(expr);
        if precedence(expr) < min_prec {
            self.paren(s)
        } else {
            s
        }
    }

    pub fn print(&self, expr: &Expr) -> String {
        match (self.style, expr) {
            (_, Expr::Literal(x)) => format_number(*x),
            (_, Expr::Quantity(id)) => self.name(*id),
            (Style::Plain, Expr::ErrorOf(id)) => format!("σ_{}", self.name(*id)),
            (Style::Latex, Expr::ErrorOf(id)) => format!("\\sigma_{{{}}}", self.name(*id)),
            (_, Expr::Neg(a)) => format!("-{}", self.wrapped(a, PREC_POW)),
            (Style::Latex, Expr::Binary { op: BinaryOp::Div, lhs, rhs }) => {
                format!("\\frac{{{}}}{{{}}}", self.print(lhs), self.print(rhs))
            }
            (_, Expr::Binary { op, lhs, rhs }) => {
                let prec = if matches!(op, BinaryOp::Add | BinaryOp::Sub) { PREC_ADD } else { PREC_MUL };
                // Right operands of - and / bind tighter.
                let rhs_prec = if matches!(op, BinaryOp::Sub | BinaryOp::Div) { prec + 1 } else { prec };
                let symbol = match (self.style, op) {
                    (Style::Latex, BinaryOp::Mul) => "\\cdot",
                    _ => op.symbol(),
                };
                format!("{} {} {}", self.wrapped(lhs, prec), symbol, self.wrapped(rhs, rhs_prec))
            }
            (Style::Plain, Expr::Pow { base, exponent }) if is_half(exponent) => {
                format!("sqrt({})", self.print(base))
            }
            (Style::Latex, Expr::Pow { base, exponent }) if is_half(exponent) => {
                format!("\\sqrt{{{}}}", self.print(base))
            }
            (Style::Plain, Expr::Pow { base, exponent }) => {
                format!("{}^{}", self.wrapped(base, PREC_ATOM), self.wrapped(exponent, PREC_ATOM))
            }
            (Style::Latex, Expr::Pow { base, exponent }) => {
                format!("{}^{{{}}}", self.wrapped(base, PREC_ATOM), self.print(exponent))
            }
            (Style::Plain, Expr::Func { func, arg }) => format!("{}({})", func.name(), self.print(arg)),
            (Style::Latex, Expr::Func { func: Function::Abs, arg }) => {
                format!("\\left|{}\\right|", self.print(arg))
            }
            (Style::Latex, Expr::Func { func, arg }) => {
                let name = match func {
                    Function::Log10 => "\\log_{10}".to_string(),
                    Function::Asin => "\\arcsin".to_string(),
                    Function::Acos => "\\arccos".to_string(),
                    Function::Atan => "\\arctan".to_string(),
                    other => format!("\\{}", other.name()),
                };
                format!("{}{}", name, self.paren(self.print(arg)))
            }
        }
    }
}

pub fn to_plain(registry: &Registry, expr: &Expr) -> String {
    ExprPrinter::new(registry, Style::Plain).print(expr)
}

pub fn to_latex(registry: &Registry, expr: &Expr) -> String {
    ExprPrinter::new(registry, Style::Latex).print(expr)
}
