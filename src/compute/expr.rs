//! Symbolic expressions over quantities.

use crate::store::QuantityId;
use std::collections::BTreeSet;
use std::ops::{Add, Div, Mul, Neg, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Exp,
    Ln,
    Log10,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Abs,
}

impl Function {
    pub const ALL: [Function; 13] = [
        Function::Exp,
        Function::Ln,
        Function::Log10,
        Function::Sin,
        Function::Cos,
        Function::Tan,
        Function::Asin,
        Function::Acos,
        Function::Atan,
        Function::Sinh,
        Function::Cosh,
        Function::Tanh,
        Function::Abs,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Function::Exp => "exp",
            Function::Ln => "ln",
            Function::Log10 => "log10",
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Asin => "asin",
            Function::Acos => "acos",
            Function::Atan => "atan",
            Function::Sinh => "sinh",
            Function::Cosh => "cosh",
            Function::Tanh => "tanh",
            Function::Abs => "abs",
        }
    }

    /// `log` is accepted as an alias of `ln`.
    pub fn from_name(name: &str) -> Option<Self> {
        if name == "log" {
            return Some(Function::Ln);
        }
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Function::Exp => x.exp(),
            Function::Ln => x.ln(),
            Function::Log10 => x.log10(),
            Function::Sin => x.sin(),
            Function::Cos => x.cos(),
            Function::Tan => x.tan(),
            Function::Asin => x.asin(),
            Function::Acos => x.acos(),
            Function::Atan => x.atan(),
            Function::Sinh => x.sinh(),
            Function::Cosh => x.cosh(),
            Function::Tanh => x.tanh(),
            Function::Abs => x.abs(),
        }
    }

    /// Transcendental functions need a dimensionless argument.
    pub fn is_transcendental(&self) -> bool {
        !matches!(self, Function::Abs)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(f64),
    Quantity(QuantityId),
    /// The uncertainty of a quantity. Only appears in error formulas.
    ErrorOf(QuantityId),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Pow {
        base: Box<Expr>,
        exponent: Box<Expr>,
    },
    Func {
        func: Function,
        arg: Box<Expr>,
    },
}

impl Expr {
    pub fn lit(x: f64) -> Self {
        Expr::Literal(x)
    }

    pub fn q(id: QuantityId) -> Self {
        Expr::Quantity(id)
    }

    pub fn error_of(id: QuantityId) -> Self {
        Expr::ErrorOf(id)
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn pow(self, exponent: impl Into<Expr>) -> Self {
        Expr::Pow {
            base: Box::new(self),
            exponent: Box::new(exponent.into()),
        }
    }

    pub fn sqrt(self) -> Self {
        self.pow(Expr::lit(1.0) / Expr::lit(2.0))
    }

    pub fn apply(self, func: Function) -> Self {
        Expr::Func {
            func,
            arg: Box::new(self),
        }
    }

    pub fn exp(self) -> Self { self.apply(Function::Exp) }
    pub fn ln(self) -> Self { self.apply(Function::Ln) }
    pub fn sin(self) -> Self { self.apply(Function::Sin) }
    pub fn cos(self) -> Self { self.apply(Function::Cos) }
    pub fn abs(self) -> Self { self.apply(Function::Abs) }

    /// Quantities the expression reads, excluding error-of symbols.
    pub fn free_quantities(&self) -> BTreeSet<QuantityId> {
        let mut out = BTreeSet::new();
        self.visit(&mut |e| {
            if let Expr::Quantity(id) = e {
                out.insert(*id);
            }
        });
        out
    }

    pub fn contains(&self, id: QuantityId) -> bool {
        match self {
            Expr::Quantity(q) => *q == id,
            Expr::Literal(_) | Expr::ErrorOf(_) => false,
            Expr::Neg(a) | Expr::Func { arg: a, .. } => a.contains(id),
            Expr::Binary { lhs, rhs, .. } => lhs.contains(id) || rhs.contains(id),
            Expr::Pow { base, exponent } => base.contains(id) || exponent.contains(id),
        }
    }

    /// Replaces every `Quantity(id)` leaf with `replacement`.
    pub fn substitute(&self, id: QuantityId, replacement: &Expr) -> Expr {
        match self {
            Expr::Quantity(q) if *q == id => replacement.clone(),
            Expr::Literal(_) | Expr::Quantity(_) | Expr::ErrorOf(_) => self.clone(),
            Expr::Neg(a) => Expr::Neg(Box::new(a.substitute(id, replacement))),
            Expr::Binary { op, lhs, rhs } => Expr::binary(
                *op,
                lhs.substitute(id, replacement),
                rhs.substitute(id, replacement),
            ),
            Expr::Pow { base, exponent } => Expr::Pow {
                base: Box::new(base.substitute(id, replacement)),
                exponent: Box::new(exponent.substitute(id, replacement)),
            },
            Expr::Func { func, arg } => Expr::Func {
                func: *func,
                arg: Box::new(arg.substitute(id, replacement)),
            },
        }
    }

    /// No quantity or error-of leaves.
    pub fn is_literal(&self) -> bool {
        let mut literal = true;
        self.visit(&mut |e| {
            if matches!(e, Expr::Quantity(_) | Expr::ErrorOf(_)) {
                literal = false;
            }
        });
        literal
    }

    /// Numeric value of a literal-only expression.
    pub fn constant_value(&self) -> Option<f64> {
        match self {
            Expr::Literal(x) => Some(*x),
            Expr::Quantity(_) | Expr::ErrorOf(_) => None,
            Expr::Neg(a) => a.constant_value().map(|x| -x),
            Expr::Binary { op, lhs, rhs } => Some(op.apply(lhs.constant_value()?, rhs.constant_value()?)),
            Expr::Pow { base, exponent } => Some(base.constant_value()?.powf(exponent.constant_value()?)),
            Expr::Func { func, arg } => Some(func.apply(arg.constant_value()?)),
        }
    }

    /// Pre-order traversal.
    pub fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Literal(_) | Expr::Quantity(_) | Expr::ErrorOf(_) => {}
            Expr::Neg(a) | Expr::Func { arg: a, .. } => a.visit(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.visit(f);
                rhs.visit(f);
            }
            Expr::Pow { base, exponent } => {
                base.visit(f);
                exponent.visit(f);
            }
        }
    }
}

impl From<f64> for Expr {
    fn from(x: f64) -> Self { Expr::Literal(x) }
}

impl From<QuantityId> for Expr {
    fn from(id: QuantityId) -> Self { Expr::Quantity(id) }
}

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr { Expr::Neg(Box::new(self)) }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<R: Into<Expr>> $trait<R> for Expr {
            type Output = Expr;
            fn $method(self, rhs: R) -> Expr {
                Expr::binary($op, self, rhs.into())
            }
        }

        impl $trait<Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, Expr::Literal(self), rhs)
            }
        }
    };
}

impl_binary_op!(Add, add, BinaryOp::Add);
impl_binary_op!(Sub, sub, BinaryOp::Sub);
impl_binary_op!(Mul, mul, BinaryOp::Mul);
impl_binary_op!(Div, div, BinaryOp::Div);
