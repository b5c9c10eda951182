//! Unit expressions and the registry that resolves them to base-unit scale
//! factors and dimensions.

use super::dimension::{base, Dimension, Rational};
use crate::error::{QuantityError, Result};
use crate::store::Quantity;
use ndarray::ArrayD;
use std::collections::{BTreeMap, HashMap};

/// A parsed unit expression, mapping each unit symbol to its exponent.
/// Example: "kg*m/s^2" -> { "kg": 1, "m": 1, "s": -2 }
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedUnit {
    terms: BTreeMap<String, Rational>,
}

impl ParsedUnit {
    /// Parses `num/den` where both sides are `*`-separated products of
    /// `symbol` or `symbol^exp` factors. Exponents are integers or
    /// parenthesised fractions such as `^(1/2)`.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || QuantityError::InvalidUnitExpression { expression: s.to_string() };
        if s.trim().is_empty() {
            return Err(invalid());
        }

        let parts = split_top_level(s, '/');
        if parts.len() > 2 {
            return Err(invalid());
        }

        let mut terms = BTreeMap::new();
        Self::parse_product(parts[0], Rational::ONE, &mut terms).ok_or_else(invalid)?;
        if let Some(den) = parts.get(1) {
            Self::parse_product(den, -Rational::ONE, &mut terms).ok_or_else(invalid)?;
        }
        Ok(Self { terms })
    }

    fn parse_product(s: &str, sign: Rational, terms: &mut BTreeMap<String, Rational>) -> Option<()> {
        let s = s.trim();
        if s == "1" {
            return Some(());
        }
        for factor in s.split('*') {
            let (symbol, exp) = match factor.split_once('^') {
                Some((b, e)) => (b.trim(), parse_exponent(e)?),
                None => (factor.trim(), Rational::ONE),
            };
            if symbol.is_empty() || !symbol.chars().all(|c| c.is_alphabetic() || c == '°') {
                return None;
            }
            let slot = terms.entry(symbol.to_string()).or_insert(Rational::ZERO);
            *slot = *slot + exp * sign;
        }
        Some(())
    }

    pub fn from_terms<S: Into<String>>(terms: impl IntoIterator<Item = (S, Rational)>) -> Self {
        let mut parsed = Self::default();
        for (symbol, exp) in terms {
            let slot = parsed.terms.entry(symbol.into()).or_insert(Rational::ZERO);
            *slot = *slot + exp;
        }
        parsed
    }

    pub fn terms(&self) -> impl Iterator<Item = (&str, Rational)> + '_ {
        self.terms
            .iter()
            .filter(|(_, e)| !e.is_zero())
            .map(|(s, e)| (s.as_str(), *e))
    }

    pub fn multiply(&mut self, other: &Self) {
        for (k, v) in &other.terms {
            let slot = self.terms.entry(k.clone()).or_insert(Rational::ZERO);
            *slot = *slot + *v;
        }
    }

    pub fn divide(&mut self, other: &Self) {
        for (k, v) in &other.terms {
            let slot = self.terms.entry(k.clone()).or_insert(Rational::ZERO);
            *slot = *slot - *v;
        }
    }

    /// Sorted, aggregated `num/den` form; `1` when everything cancels.
    pub fn to_canonical(&self) -> String {
        let (num, den): (Vec<_>, Vec<_>) = self.terms().partition(|(_, e)| e.numer() > 0);

        let fmt = |terms: Vec<(&str, Rational)>| -> String {
            if terms.is_empty() {
                return "1".to_string();
            }
            terms
                .into_iter()
                .map(|(k, e)| {
                    let a = if e.numer() < 0 { -e } else { e };
                    if a == Rational::ONE {
                        k.to_string()
                    } else if a.is_integer() {
                        format!("{}^{}", k, a)
                    } else {
                        format!("{}^({})", k, a)
                    }
                })
                .collect::<Vec<_>>()
                .join("*")
        };

        let n_str = fmt(num);
        let d_str = fmt(den);
        if d_str == "1" {
            n_str
        } else {
            format!("{}/{}", n_str, d_str)
        }
    }
}

fn parse_exponent(e: &str) -> Option<Rational> {
    let e = e.trim();
    let inner = e
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .unwrap_or(e)
        .trim();
    match inner.split_once('/') {
        Some((n, d)) => {
            let d: i64 = d.trim().parse().ok()?;
            if d == 0 {
                return None;
            }
            Some(Rational::new(n.trim().parse().ok()?, d))
        }
        None => inner.parse::<i64>().ok().map(Rational::integer),
    }
}

/// Splits on `sep` outside of parentheses.
fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitDef {
    pub scale: f64,
    pub dim: Dimension,
    pub prefixable: bool,
}

/// Outcome of resolving a unit expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUnit {
    /// Multiply a number given in this unit by `scale` to get base units.
    pub scale: f64,
    pub dim: Dimension,
    /// Canonical spelling of the expression.
    pub unit: String,
}

const PREFIXES: &[(&str, f64)] = &[
    ("da", 1e1),
    ("Y", 1e24),
    ("Z", 1e21),
    ("E", 1e18),
    ("P", 1e15),
    ("T", 1e12),
    ("G", 1e9),
    ("M", 1e6),
    ("k", 1e3),
    ("h", 1e2),
    ("d", 1e-1),
    ("c", 1e-2),
    ("m", 1e-3),
    ("µ", 1e-6),
    ("u", 1e-6),
    ("n", 1e-9),
    ("p", 1e-12),
    ("f", 1e-15),
    ("a", 1e-18),
    ("z", 1e-21),
    ("y", 1e-24),
];

/// Registered base dimensions and named units. Built once (usually with
/// [`UnitRegistry::si`]) and then only read.
#[derive(Debug, Clone, Default)]
pub struct UnitRegistry {
    /// Base dimension -> symbol of its base unit.
    base_units: BTreeMap<String, String>,
    units: HashMap<String, UnitDef>,
    /// Named units tried, in order, when picking a display unit automatically.
    display_units: Vec<String>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The SI system with its common derived units and decimal prefixes.
    pub fn si() -> Self {
        let mut r = Self::new();
        r.register_base(base::LENGTH, "m", true);
        r.register_base(base::MASS, "kg", false);
        r.register_base(base::TIME, "s", true);
        r.register_base(base::CURRENT, "A", true);
        r.register_base(base::TEMPERATURE, "K", true);
        r.register_base(base::AMOUNT, "mol", true);
        r.register_base(base::LUMINOSITY, "cd", true);

        let dim = |terms: &[(&str, i64)]| {
            Dimension::from_terms(terms.iter().map(|&(b, e)| (b, Rational::integer(e))))
        };
        let (m, l, t, i) = (base::MASS, base::LENGTH, base::TIME, base::CURRENT);

        r.register_unit("g", 1e-3, dim(&[(m, 1)]), true);
        for (symbol, d) in [
            ("N", dim(&[(m, 1), (l, 1), (t, -2)])),
            ("J", dim(&[(m, 1), (l, 2), (t, -2)])),
            ("W", dim(&[(m, 1), (l, 2), (t, -3)])),
            ("Pa", dim(&[(m, 1), (l, -1), (t, -2)])),
            ("C", dim(&[(i, 1), (t, 1)])),
            ("V", dim(&[(m, 1), (l, 2), (t, -3), (i, -1)])),
            ("Ohm", dim(&[(m, 1), (l, 2), (t, -3), (i, -2)])),
            ("F", dim(&[(m, -1), (l, -2), (t, 4), (i, 2)])),
            ("T", dim(&[(m, 1), (t, -2), (i, -1)])),
            ("Wb", dim(&[(m, 1), (l, 2), (t, -2), (i, -1)])),
            ("H", dim(&[(m, 1), (l, 2), (t, -2), (i, -2)])),
        ] {
            r.register_unit(symbol, 1.0, d, true);
            r.display_units.push(symbol.to_string());
        }
        r.register_unit("Ω", 1.0, dim(&[(m, 1), (l, 2), (t, -3), (i, -2)]), true);
        r.register_unit("S", 1.0, dim(&[(m, -1), (l, -2), (t, 3), (i, 2)]), true);
        r.register_unit("Hz", 1.0, dim(&[(t, -1)]), true);
        r.register_unit("eV", 1.602_176_634e-19, dim(&[(m, 1), (l, 2), (t, -2)]), true);
        r.register_unit("L", 1e-3, dim(&[(l, 3)]), true);
        r.register_unit("bar", 1e5, dim(&[(m, 1), (l, -1), (t, -2)]), true);
        r.register_unit("atm", 101_325.0, dim(&[(m, 1), (l, -1), (t, -2)]), false);
        r.register_unit("min", 60.0, dim(&[(t, 1)]), false);
        r.register_unit("h", 3600.0, dim(&[(t, 1)]), false);
        r.register_unit("d", 86_400.0, dim(&[(t, 1)]), false);
        r.register_unit("rad", 1.0, Dimension::dimensionless(), true);
        r.register_unit("sr", 1.0, Dimension::dimensionless(), false);
        r.register_unit("deg", std::f64::consts::PI / 180.0, Dimension::dimensionless(), false);
        r.register_unit("°", std::f64::consts::PI / 180.0, Dimension::dimensionless(), false);
        r
    }

    /// Registers a base dimension together with its base unit (scale 1).
    pub fn register_base(&mut self, dimension: &str, symbol: &str, prefixable: bool) {
        self.base_units.insert(dimension.to_string(), symbol.to_string());
        self.register_unit(symbol, 1.0, Dimension::base(dimension), prefixable);
    }

    pub fn register_unit(&mut self, symbol: &str, scale: f64, dim: Dimension, prefixable: bool) {
        self.units.insert(symbol.to_string(), UnitDef { scale, dim, prefixable });
    }

    pub fn base_dimensions(&self) -> impl Iterator<Item = &str> + '_ {
        self.base_units.keys().map(String::as_str)
    }

    fn lookup(&self, symbol: &str) -> Option<(f64, Dimension)> {
        if let Some(def) = self.units.get(symbol) {
            return Some((def.scale, def.dim.clone()));
        }
        PREFIXES.iter().find_map(|(prefix, factor)| {
            let rest = symbol.strip_prefix(prefix)?;
            let def = self.units.get(rest).filter(|d| d.prefixable)?;
            Some((def.scale * factor, def.dim.clone()))
        })
    }

    /// Resolves a unit expression into its scale factor, dimension and
    /// canonical spelling.
    pub fn resolve(&self, expression: &str) -> Result<ResolvedUnit> {
        let parsed = ParsedUnit::parse(expression)?;
        let mut scale = 1.0;
        let mut dim = Dimension::dimensionless();
        for (symbol, exp) in parsed.terms() {
            let (s, d) = self
                .lookup(symbol)
                .ok_or_else(|| QuantityError::UnknownUnit { symbol: symbol.to_string() })?;
            scale *= s.powf(exp.to_f64());
            dim = dim.multiply(&d.power(exp));
        }
        Ok(ResolvedUnit {
            scale,
            dim,
            unit: parsed.to_canonical(),
        })
    }

    /// Picks the unit used to display a value of dimension `dim`.
    ///
    /// Returns `(factor, unit)` where `display = stored / factor`. A
    /// `preferred` unit must have exactly `dim`.
    pub fn convert_to_unit(&self, dim: &Dimension, preferred: Option<&str>) -> Result<(f64, String)> {
        if let Some(p) = preferred {
            let resolved = self.resolve(p)?;
            if resolved.dim != *dim {
                return Err(QuantityError::mismatch("display unit", dim, &resolved.dim));
            }
            return Ok((resolved.scale, resolved.unit));
        }
        if dim.is_dimensionless() {
            return Ok((1.0, "1".to_string()));
        }
        for symbol in &self.display_units {
            if let Some(def) = self.units.get(symbol) {
                if def.dim == *dim {
                    return Ok((def.scale, symbol.clone()));
                }
            }
        }
        Ok((1.0, self.base_expression(dim)))
    }

    /// Writes `dim` as a product of base units, e.g. `kg*m/s^2`.
    pub fn base_expression(&self, dim: &Dimension) -> String {
        ParsedUnit::from_terms(dim.terms().map(|(name, e)| {
            let symbol = self.base_units.get(name).map_or(name, String::as_str);
            (symbol.to_string(), e)
        }))
        .to_canonical()
    }
}

/// Value and error of a quantity expressed in a display unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Adjusted {
    pub value: ArrayD<f64>,
    pub error: Option<ArrayD<f64>>,
    pub unit: String,
}

/// Expresses a quantity in `unit`, falling back to its preferred unit and
/// then to an automatically chosen one.
pub fn adjust_to_unit(units: &UnitRegistry, quantity: &Quantity, unit: Option<&str>) -> Result<Adjusted> {
    let dim = quantity.dimension()?;
    let preferred = unit.or(quantity.prefer_unit.as_deref());
    let (factor, unit) = units.convert_to_unit(dim, preferred)?;
    Ok(Adjusted {
        value: quantity.value()? / factor,
        error: quantity.error()?.map(|e| e / factor),
        unit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    #[rstest]
    #[case("mol", "mol")]
    #[case("m*s", "m*s")]
    #[case("s*m", "m*s")]
    #[case("m/s", "m/s")]
    #[case("m/s^2", "m/s^2")]
    #[case("kg*m/s^2", "kg*m/s^2")]
    #[case("m*m", "m^2")]
    #[case("m^2/m", "m")]
    #[case("m/m", "1")]
    #[case("1/s", "1/s")]
    #[case("m^1", "m")]
    #[case("m^-1", "1/m")]
    #[case("m^(1/2)", "m^(1/2)")]
    #[case("Hz^(1/2)/m^(3/2)", "Hz^(1/2)/m^(3/2)")]
    fn test_unit_parsing_and_canonicalization(#[case] input: &str, #[case] expected: &str) {
        let parsed = ParsedUnit::parse(input).unwrap();
        assert_eq!(parsed.to_canonical(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("m//s")]
    #[case("m/s/s")]
    #[case("m^x")]
    #[case("m^(1/0)")]
    #[case("*s")]
    #[case("2*m")]
    fn test_parse_invalid(#[case] input: &str) {
        assert!(matches!(
            ParsedUnit::parse(input),
            Err(QuantityError::InvalidUnitExpression { .. })
        ));
    }

    #[test]
    fn test_unit_arithmetic() {
        let mut force = ParsedUnit::parse("kg*m/s^2").unwrap();
        let time = ParsedUnit::parse("s").unwrap();
        force.multiply(&time);
        assert_eq!(force.to_canonical(), "kg*m/s");
        force.divide(&ParsedUnit::parse("kg").unwrap());
        assert_eq!(force.to_canonical(), "m/s");
    }

    #[rstest]
    #[case("km", 1e3)]
    #[case("mg", 1e-6)]
    #[case("µs", 1e-6)]
    #[case("us", 1e-6)]
    #[case("min", 60.0)]
    #[case("mmol", 1e-3)]
    #[case("dam", 10.0)]
    #[case("kPa", 1e3)]
    #[case("km/h", 1e3 / 3600.0)]
    #[case("cm^2", 1e-4)]
    #[case("mL", 1e-6)]
    fn test_resolve_scale(#[case] expression: &str, #[case] scale: f64) {
        let units = UnitRegistry::si();
        let resolved = units.resolve(expression).unwrap();
        assert_abs_diff_eq!(resolved.scale, scale, epsilon = scale * 1e-12);
    }

    #[test]
    fn test_resolve_dimension_of_derived_units() {
        let units = UnitRegistry::si();
        let newton = units.resolve("N").unwrap();
        let explicit = units.resolve("kg*m/s^2").unwrap();
        assert_eq!(newton.dim, explicit.dim);
        assert_eq!(explicit.unit, "kg*m/s^2");
        assert!(units.resolve("rad").unwrap().dim.is_dimensionless());
    }

    #[rstest]
    #[case("furlong")]
    #[case("mkg")]
    #[case("m*parsec")]
    fn test_unknown_unit(#[case] expression: &str) {
        let units = UnitRegistry::si();
        assert!(matches!(units.resolve(expression), Err(QuantityError::UnknownUnit { .. })));
    }

    #[test]
    fn test_automatic_display_unit() {
        let units = UnitRegistry::si();
        let energy = units.resolve("kg*m^2/s^2").unwrap().dim;
        assert_eq!(units.convert_to_unit(&energy, None).unwrap(), (1.0, "J".to_string()));

        let velocity = units.resolve("km/h").unwrap().dim;
        assert_eq!(units.convert_to_unit(&velocity, None).unwrap(), (1.0, "m/s".to_string()));

        let plain = Dimension::dimensionless();
        assert_eq!(units.convert_to_unit(&plain, None).unwrap().1, "1");
    }

    #[test]
    fn test_preferred_display_unit_must_match() {
        let units = UnitRegistry::si();
        let length = Dimension::base(base::LENGTH);
        let (factor, unit) = units.convert_to_unit(&length, Some("mm")).unwrap();
        assert_abs_diff_eq!(factor, 1e-3);
        assert_eq!(unit, "mm");
        assert!(matches!(
            units.convert_to_unit(&length, Some("s")),
            Err(QuantityError::DimensionMismatch { .. })
        ));
    }
}
