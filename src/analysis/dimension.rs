//! Physical dimensions as exponent vectors over named base dimensions.
//!
//! A `Dimension` is an element of the free abelian group generated by the
//! registered base dimensions: multiplication adds exponents, division
//! subtracts them and powers scale them. Exponents are rational so that
//! square roots of dimensionful quantities stay exact.

use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Names of the SI base dimensions.
pub mod base {
    pub const LENGTH: &str = "length";
    pub const MASS: &str = "mass";
    pub const TIME: &str = "time";
    pub const CURRENT: &str = "current";
    pub const TEMPERATURE: &str = "temperature";
    pub const AMOUNT: &str = "amount";
    pub const LUMINOSITY: &str = "luminosity";
}

fn gcd(mut a: i128, mut b: i128) -> i128 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// An exact fraction with a positive denominator, always in lowest terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    num: i64,
    den: i64,
}

impl Rational {
    pub const ZERO: Self = Self { num: 0, den: 1 };
    pub const ONE: Self = Self { num: 1, den: 1 };

    /// `den` must be non-zero.
    pub fn new(num: i64, den: i64) -> Self {
        debug_assert!(den != 0, "zero denominator");
        Self::reduce(num as i128, den as i128)
    }

    pub fn integer(n: i64) -> Self {
        Self { num: n, den: 1 }
    }

    fn reduce(num: i128, den: i128) -> Self {
        let g = gcd(num, den).max(1);
        let sign = if den < 0 { -1 } else { 1 };
        Self {
            num: (sign * num / g) as i64,
            den: (sign * den / g) as i64,
        }
    }

    /// Finds the fraction with the smallest denominator (up to `max_den`)
    /// that reproduces `x` to within floating point noise.
    pub fn from_f64(x: f64, max_den: i64) -> Option<Self> {
        if !x.is_finite() {
            return None;
        }
        for den in 1..=max_den {
            let num = (x * den as f64).round();
            if num.abs() >= i64::MAX as f64 {
                return None;
            }
            if (num / den as f64 - x).abs() <= 1e-9 * x.abs().max(1.0) {
                return Some(Self::new(num as i64, den));
            }
        }
        None
    }

    pub fn numer(&self) -> i64 { self.num }
    pub fn denom(&self) -> i64 { self.den }
    pub fn is_zero(&self) -> bool { self.num == 0 }
    pub fn is_integer(&self) -> bool { self.den == 1 }

    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl Add for Rational {
    type Output = Rational;
    fn add(self, rhs: Rational) -> Rational {
        Rational::reduce(
            self.num as i128 * rhs.den as i128 + rhs.num as i128 * self.den as i128,
            self.den as i128 * rhs.den as i128,
        )
    }
}

impl Sub for Rational {
    type Output = Rational;
    fn sub(self, rhs: Rational) -> Rational {
        self + (-rhs)
    }
}

impl Mul for Rational {
    type Output = Rational;
    fn mul(self, rhs: Rational) -> Rational {
        Rational::reduce(self.num as i128 * rhs.num as i128, self.den as i128 * rhs.den as i128)
    }
}

impl Div for Rational {
    type Output = Rational;
    /// `rhs` must be non-zero.
    fn div(self, rhs: Rational) -> Rational {
        debug_assert!(!rhs.is_zero(), "division by zero");
        Rational::reduce(self.num as i128 * rhs.den as i128, self.den as i128 * rhs.num as i128)
    }
}

impl Neg for Rational {
    type Output = Rational;
    fn neg(self) -> Rational {
        Rational { num: -self.num, den: self.den }
    }
}

impl From<i64> for Rational {
    fn from(n: i64) -> Self { Rational::integer(n) }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

/// A physical dimension. Terms are kept sorted by base name and never carry
/// a zero exponent, so derived equality is exact group equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Dimension {
    terms: SmallVec<[(String, Rational); 4]>,
}

impl Dimension {
    pub fn dimensionless() -> Self {
        Self::default()
    }

    /// A single base dimension with exponent one.
    pub fn base(name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self::from_terms([(name, Rational::ONE)])
    }

    /// Builds a dimension from `(base, exponent)` pairs, aggregating repeated bases.
    pub fn from_terms<S: Into<String>>(terms: impl IntoIterator<Item = (S, Rational)>) -> Self {
        let mut acc: BTreeMap<String, Rational> = BTreeMap::new();
        for (name, exp) in terms {
            let slot = acc.entry(name.into()).or_insert(Rational::ZERO);
            *slot = *slot + exp;
        }
        Self {
            terms: acc.into_iter().filter(|(_, e)| !e.is_zero()).collect(),
        }
    }

    pub fn is_dimensionless(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn exponent(&self, name: &str) -> Rational {
        self.terms
            .iter()
            .find(|(n, _)| n == name)
            .map_or(Rational::ZERO, |(_, e)| *e)
    }

    pub fn terms(&self) -> impl Iterator<Item = (&str, Rational)> + '_ {
        self.terms.iter().map(|(n, e)| (n.as_str(), *e))
    }

    pub fn multiply(&self, other: &Dimension) -> Dimension {
        Self::from_terms(self.terms.iter().chain(other.terms.iter()).cloned())
    }

    pub fn divide(&self, other: &Dimension) -> Dimension {
        self.multiply(&other.recip())
    }

    pub fn power(&self, exponent: Rational) -> Dimension {
        Self::from_terms(self.terms.iter().map(|(n, e)| (n.clone(), *e * exponent)))
    }

    pub fn recip(&self) -> Dimension {
        self.power(-Rational::ONE)
    }
}

impl Mul for &Dimension {
    type Output = Dimension;
    fn mul(self, rhs: &Dimension) -> Dimension { self.multiply(rhs) }
}

impl Div for &Dimension {
    type Output = Dimension;
    fn div(self, rhs: &Dimension) -> Dimension { self.divide(rhs) }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return write!(f, "dimensionless");
        }
        let parts: Vec<String> = self
            .terms
            .iter()
            .map(|(name, e)| {
                if *e == Rational::ONE {
                    name.clone()
                } else if e.is_integer() {
                    format!("{}^{}", name, e)
                } else {
                    format!("{}^({})", name, e)
                }
            })
            .collect();
        write!(f, "{}", parts.join("*"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn velocity() -> Dimension {
        Dimension::from_terms([(base::LENGTH, Rational::ONE), (base::TIME, Rational::integer(-1))])
    }

    #[rstest]
    #[case(Rational::new(2, 4), "1/2")]
    #[case(Rational::new(3, -6), "-1/2")]
    #[case(Rational::new(4, 2), "2")]
    #[case(Rational::new(0, 7), "0")]
    fn test_rational_normalization(#[case] r: Rational, #[case] expected: &str) {
        assert_eq!(r.to_string(), expected);
    }

    #[rstest]
    #[case(0.5, Some(Rational::new(1, 2)))]
    #[case(-2.0, Some(Rational::integer(-2)))]
    #[case(1.0 / 3.0, Some(Rational::new(1, 3)))]
    #[case(std::f64::consts::PI, None)]
    fn test_rational_from_f64(#[case] x: f64, #[case] expected: Option<Rational>) {
        assert_eq!(Rational::from_f64(x, 1000), expected);
    }

    #[test]
    fn test_velocity_squared_times_mass_is_energy() {
        let energy = Dimension::from_terms([
            (base::MASS, Rational::ONE),
            (base::LENGTH, Rational::integer(2)),
            (base::TIME, Rational::integer(-2)),
        ]);
        let mass = Dimension::base(base::MASS);
        assert_eq!(&mass * &velocity().power(Rational::integer(2)), energy);
        assert_eq!(energy.to_string(), "length^2*mass*time^-2");
    }

    #[test]
    fn test_dimensionless_is_identity_and_cancellation_prunes() {
        let v = velocity();
        assert!((&v / &v).is_dimensionless());
        assert_eq!(&v * &Dimension::dimensionless(), v);
        assert_eq!(Dimension::dimensionless().to_string(), "dimensionless");
    }

    #[test]
    fn test_rational_power_display() {
        let root = Dimension::base(base::LENGTH).power(Rational::new(1, 2));
        assert_eq!(root.to_string(), "length^(1/2)");
        assert_eq!(root.exponent(base::LENGTH), Rational::new(1, 2));
        assert_eq!(root.exponent(base::MASS), Rational::ZERO);
    }

    const BASES: [&str; 4] = [base::LENGTH, base::MASS, base::TIME, base::CURRENT];

    fn dimension() -> impl Strategy<Value = Dimension> {
        proptest::collection::vec((0usize..4, -4i64..=4, 1i64..=3), 0..5).prop_map(|terms| {
            Dimension::from_terms(
                terms.into_iter().map(|(b, n, d)| (BASES[b], Rational::new(n, d))),
            )
        })
    }

    fn exponent() -> impl Strategy<Value = Rational> {
        (-3i64..=3, 1i64..=4).prop_map(|(n, d)| Rational::new(n, d))
    }

    proptest! {
        #[test]
        fn group_identity(a in dimension(), b in dimension()) {
            prop_assert_eq!(a.multiply(&b.divide(&b)), a);
        }

        #[test]
        fn group_commutative(a in dimension(), b in dimension()) {
            prop_assert_eq!(a.multiply(&b), b.multiply(&a));
        }

        #[test]
        fn group_associative(a in dimension(), b in dimension(), c in dimension()) {
            prop_assert_eq!(a.multiply(&b).multiply(&c), a.multiply(&b.multiply(&c)));
        }

        #[test]
        fn power_one_is_identity(a in dimension()) {
            prop_assert_eq!(a.power(Rational::ONE), a);
        }

        #[test]
        fn power_distributes(a in dimension(), b in dimension(), n in exponent()) {
            prop_assert_eq!(
                a.multiply(&b).power(n),
                a.power(n).multiply(&b.power(n))
            );
        }
    }
}
