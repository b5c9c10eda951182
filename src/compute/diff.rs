//! Exact symbolic partial derivatives and the light simplifier used to keep
//! them readable.

use super::expr::{BinaryOp, Expr, Function};
use crate::store::QuantityId;

fn is_lit(e: &Expr, x: f64) -> bool {
    matches!(e, Expr::Literal(v) if *v == x)
}

pub fn add(a: Expr, b: Expr) -> Expr {
    match (&a, &b) {
        (Expr::Literal(x), Expr::Literal(y)) => Expr::Literal(x + y),
        _ if is_lit(&a, 0.0) => b,
        _ if is_lit(&b, 0.0) => a,
        _ => Expr::binary(BinaryOp::Add, a, b),
    }
}

pub fn sub(a: Expr, b: Expr) -> Expr {
    match (&a, &b) {
        (Expr::Literal(x), Expr::Literal(y)) => Expr::Literal(x - y),
        _ if a == b => Expr::Literal(0.0),
        _ if is_lit(&b, 0.0) => a,
        _ if is_lit(&a, 0.0) => neg(b),
        _ => Expr::binary(BinaryOp::Sub, a, b),
    }
}

pub fn mul(a: Expr, b: Expr) -> Expr {
    match (&a, &b) {
        (Expr::Literal(x), Expr::Literal(y)) => Expr::Literal(x * y),
        _ if is_lit(&a, 0.0) || is_lit(&b, 0.0) => Expr::Literal(0.0),
        _ if is_lit(&a, 1.0) => b,
        _ if is_lit(&b, 1.0) => a,
        _ if is_lit(&a, -1.0) => neg(b),
        _ if is_lit(&b, -1.0) => neg(a),
        _ => Expr::binary(BinaryOp::Mul, a, b),
    }
}

pub fn div(a: Expr, b: Expr) -> Expr {
    match (&a, &b) {
        (Expr::Literal(x), Expr::Literal(y)) if *y != 0.0 && (x / y).fract() == 0.0 => Expr::Literal(x / y),
        _ if is_lit(&a, 0.0) => Expr::Literal(0.0),
        _ if is_lit(&b, 1.0) => a,
        _ if a == b => Expr::Literal(1.0),
        _ => Expr::binary(BinaryOp::Div, a, b),
    }
}

pub fn neg(a: Expr) -> Expr {
    match a {
        Expr::Literal(x) => Expr::Literal(-x),
        Expr::Neg(inner) => *inner,
        other => Expr::Neg(Box::new(other)),
    }
}

pub fn pow(base: Expr, exponent: Expr) -> Expr {
    match (&base, &exponent) {
        _ if is_lit(&exponent, 0.0) => Expr::Literal(1.0),
        _ if is_lit(&exponent, 1.0) => base,
        (Expr::Literal(b), Expr::Literal(e)) if b.powf(*e).fract() == 0.0 => Expr::Literal(b.powf(*e)),
        _ if is_lit(&base, 0.0) || is_lit(&base, 1.0) => base,
        _ => base.pow(exponent),
    }
}

fn func(f: Function, arg: Expr) -> Expr {
    arg.apply(f)
}

/// Rebuilds `expr` bottom-up through the folding constructors.
pub fn simplify(expr: &Expr) -> Expr {
    match expr {
        Expr::Literal(_) | Expr::Quantity(_) | Expr::ErrorOf(_) => expr.clone(),
        Expr::Neg(a) => neg(simplify(a)),
        Expr::Binary { op, lhs, rhs } => {
            let (l, r) = (simplify(lhs), simplify(rhs));
            match op {
                BinaryOp::Add => add(l, r),
                BinaryOp::Sub => sub(l, r),
                BinaryOp::Mul => mul(l, r),
                BinaryOp::Div => div(l, r),
            }
        }
        Expr::Pow { base, exponent } => pow(simplify(base), simplify(exponent)),
        Expr::Func { func: f, arg } => func(*f, simplify(arg)),
    }
}

/// Derivative of `f(arg)` with respect to `arg`, written in terms of `arg`.
fn outer_derivative(f: Function, a: &Expr) -> Expr {
    let one = || Expr::Literal(1.0);
    let half = || Expr::lit(1.0) / Expr::lit(2.0);
    match f {
        Function::Exp => func(Function::Exp, a.clone()),
        Function::Ln => div(one(), a.clone()),
        Function::Log10 => div(one(), mul(a.clone(), func(Function::Ln, Expr::Literal(10.0)))),
        Function::Sin => func(Function::Cos, a.clone()),
        Function::Cos => neg(func(Function::Sin, a.clone())),
        Function::Tan => div(one(), pow(func(Function::Cos, a.clone()), Expr::Literal(2.0))),
        Function::Asin => div(one(), pow(sub(one(), pow(a.clone(), Expr::Literal(2.0))), half())),
        Function::Acos => neg(div(one(), pow(sub(one(), pow(a.clone(), Expr::Literal(2.0))), half()))),
        Function::Atan => div(one(), add(one(), pow(a.clone(), Expr::Literal(2.0)))),
        Function::Sinh => func(Function::Cosh, a.clone()),
        Function::Cosh => func(Function::Sinh, a.clone()),
        Function::Tanh => sub(one(), pow(func(Function::Tanh, a.clone()), Expr::Literal(2.0))),
        Function::Abs => div(a.clone(), func(Function::Abs, a.clone())),
    }
}

/// `∂expr/∂wrt`, simplified. Error-of symbols are constants.
pub fn differentiate(expr: &Expr, wrt: QuantityId) -> Expr {
    if !expr.contains(wrt) {
        return Expr::Literal(0.0);
    }
    match expr {
        Expr::Quantity(q) => Expr::Literal(if *q == wrt { 1.0 } else { 0.0 }),
        Expr::Literal(_) | Expr::ErrorOf(_) => Expr::Literal(0.0),
        Expr::Neg(a) => neg(differentiate(a, wrt)),
        Expr::Binary { op, lhs, rhs } => {
            let (dl, dr) = (differentiate(lhs, wrt), differentiate(rhs, wrt));
            let (l, r) = (simplify(lhs), simplify(rhs));
            match op {
                BinaryOp::Add => add(dl, dr),
                BinaryOp::Sub => sub(dl, dr),
                BinaryOp::Mul => add(mul(dl, r), mul(l, dr)),
                BinaryOp::Div => div(
                    sub(mul(dl, r.clone()), mul(l, dr)),
                    pow(r, Expr::Literal(2.0)),
                ),
            }
        }
        Expr::Pow { base, exponent } => {
            let b = simplify(base);
            let e = simplify(exponent);
            let db = differentiate(base, wrt);
            if !exponent.contains(wrt) {
                // e * b^(e-1) * b'
                let lowered = match e.constant_value() {
                    Some(x) => Expr::Literal(x - 1.0),
                    None => sub(e.clone(), Expr::Literal(1.0)),
                };
                return mul(mul(e, pow(b, lowered)), db);
            }
            let de = differentiate(exponent, wrt);
            let whole = pow(b.clone(), e.clone());
            if !base.contains(wrt) {
                return mul(mul(whole, func(Function::Ln, b)), de);
            }
            // b^e * (e' ln b + e b' / b)
            mul(
                whole,
                add(mul(de, func(Function::Ln, b.clone())), div(mul(e, db), b)),
            )
        }
        Expr::Func { func: f, arg } => {
            let a = simplify(arg);
            mul(outer_derivative(*f, &a), differentiate(arg, wrt))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const X: QuantityId = QuantityId(0);
    const Y: QuantityId = QuantityId(1);

    fn at(e: &Expr, x: f64, y: f64) -> f64 {
        e.substitute(X, &Expr::lit(x))
            .substitute(Y, &Expr::lit(y))
            .constant_value()
            .unwrap()
    }

    #[test]
    fn test_product_rule() {
        let f = Expr::q(X) * Expr::q(Y);
        assert_eq!(differentiate(&f, X), Expr::q(Y));
        assert_eq!(differentiate(&f, Y), Expr::q(X));
    }

    #[test]
    fn test_self_difference_is_zero() {
        let f = Expr::q(X) - Expr::q(X);
        assert_eq!(differentiate(&f, X), Expr::lit(0.0));
        assert_eq!(simplify(&f), Expr::lit(0.0));
    }

    #[test]
    fn test_unrelated_quantity_has_zero_derivative() {
        let f = Expr::q(X).sin();
        assert_eq!(differentiate(&f, Y), Expr::lit(0.0));
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        let cases = vec![
            Expr::q(X).pow(3.0) / Expr::q(Y),
            Expr::q(X).sqrt() * Expr::q(Y).exp(),
            (Expr::q(X) * Expr::q(Y)).ln(),
            Expr::q(X).pow(Expr::q(Y)),
            Expr::q(X).apply(Function::Atan) + Expr::q(Y).apply(Function::Tanh),
            Expr::q(X).apply(Function::Log10) - Expr::q(Y).cos(),
            (Expr::q(X) / 3.0).apply(Function::Asin),
            (Expr::q(Y) / 4.0).apply(Function::Acos) * Expr::q(X).apply(Function::Tan),
            -Expr::q(X).apply(Function::Cosh) * Expr::q(Y).apply(Function::Sinh),
            (Expr::q(X) - 5.0).abs(),
        ];
        let (x0, y0, h) = (1.3, 0.7, 1e-6);
        for f in cases {
            let dx = differentiate(&f, X);
            let dy = differentiate(&f, Y);
            let num_dx = (at(&f, x0 + h, y0) - at(&f, x0 - h, y0)) / (2.0 * h);
            let num_dy = (at(&f, x0, y0 + h) - at(&f, x0, y0 - h)) / (2.0 * h);
            assert_abs_diff_eq!(at(&dx, x0, y0), num_dx, epsilon = 1e-5);
            assert_abs_diff_eq!(at(&dy, x0, y0), num_dy, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_simplify_folds_identities() {
        let f = (Expr::q(X) * 1.0 + 0.0) / (Expr::q(Y) / Expr::q(Y));
        assert_eq!(simplify(&f), Expr::q(X));
        assert_eq!(simplify(&(-(-Expr::q(X)))), Expr::q(X));
        assert_eq!(simplify(&Expr::q(X).pow(1.0)), Expr::q(X));
    }
}
