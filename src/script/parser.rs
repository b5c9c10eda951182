//! Recursive-descent parser for formula strings such as `m * g * h^2 / 2`.
//!
//! Grammar:
//! ```text
//! sum     := product (('+' | '-') product)*
//! product := unary (('*' | '/') unary)*
//! unary   := '-' unary | power
//! power   := atom (('^' | '**') unary)?
//! atom    := number | name | name '(' sum ')' | '(' sum ')'
//! ```

use super::Environment;
use crate::compute::expr::{Expr, Function};
use crate::error::{QuantityError, Result};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Name(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => {
                i += 1;
                continue;
            }
            '+' => tokens.push(Token::Plus),
            '-' => tokens.push(Token::Minus),
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Caret);
                i += 1;
            }
            '*' => tokens.push(Token::Star),
            '/' => tokens.push(Token::Slash),
            '^' => tokens.push(Token::Caret),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent part, e.g. 1.5e-3
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text.parse::<f64>().map_err(|_| format!("bad number '{}'", text))?;
                tokens.push(Token::Number(value));
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
                continue;
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
        i += 1;
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    env: &'a Environment,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn invalid(&self, reason: impl Into<String>) -> QuantityError {
        QuantityError::InvalidFormula {
            formula: self.source.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        match self.next() {
            Some(t) if t == token => Ok(()),
            Some(t) => Err(self.invalid(format!("expected {:?}, found {:?}", token, t))),
            None => Err(self.invalid(format!("expected {:?} at end of input", token))),
        }
    }

    fn sum(&mut self) -> Result<Expr> {
        let mut lhs = self.product()?;
        while let Some(op) = self.peek() {
            lhs = match op {
                Token::Plus => {
                    self.pos += 1;
                    lhs + self.product()?
                }
                Token::Minus => {
                    self.pos += 1;
                    lhs - self.product()?
                }
                _ => break,
            };
        }
        Ok(lhs)
    }

    fn product(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.peek() {
            lhs = match op {
                Token::Star => {
                    self.pos += 1;
                    lhs * self.unary()?
                }
                Token::Slash => {
                    self.pos += 1;
                    lhs / self.unary()?
                }
                _ => break,
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            return Ok(-self.unary()?);
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.atom()?;
        if self.peek() == Some(&Token::Caret) {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(base.pow(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Number(x)) => Ok(Expr::lit(x)),
            Some(Token::LParen) => {
                let inner = self.sum()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Name(name)) if self.peek() == Some(&Token::LParen) => {
                self.pos += 1;
                let arg = self.sum()?;
                self.expect(Token::RParen)?;
                if name == "sqrt" {
                    return Ok(arg.sqrt());
                }
                Function::from_name(&name)
                    .map(|f| arg.apply(f))
                    .ok_or_else(|| self.invalid(format!("unknown function '{}'", name)))
            }
            Some(Token::Name(name)) => match self.env.get(&name) {
                Some(id) => Ok(Expr::q(id)),
                None => Err(QuantityError::UnknownName { name }),
            },
            Some(t) => Err(self.invalid(format!("unexpected {:?}", t))),
            None => Err(self.invalid("unexpected end of input")),
        }
    }
}

/// Parses `source`, resolving names through `env`.
pub fn parse_formula(source: &str, env: &Environment) -> Result<Expr> {
    let tokens = tokenize(source).map_err(|reason| QuantityError::InvalidFormula {
        formula: source.to_string(),
        reason,
    })?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        env,
        source,
    };
    let expr = parser.sum()?;
    if let Some(t) = parser.peek() {
        let t = t.clone();
        return Err(parser.invalid(format!("trailing {:?}", t)));
    }
    Ok(expr)
}
