//! Arithmetic expressions for sizing formulas.
//!
//! Formulas arrive as text from the model or from a human edit, e.g.
//! `market_size = schools * spend_per_school`. This module tokenizes and
//! parses that text into an AST, derives the ordered list of variables it
//! references, and evaluates it against bound values.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary ('^' unary)?
//! primary := number | identifier | '(' expr ')'
//! ```
//!
//! Numbers may carry thousands separators (`130,000`) and a `%` suffix
//! (`35%` is `0.35`). `×`, `·` and `÷` are accepted for `*` and `/`. A single
//! leading `name =` is treated as a label and ignored.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::EvaluationError;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    fn apply(self, lhs: f64, rhs: f64) -> Result<f64, EvaluationError> {
        match self {
            Self::Add => Ok(lhs + rhs),
            Self::Sub => Ok(lhs - rhs),
            Self::Mul => Ok(lhs * rhs),
            Self::Div if rhs == 0.0 => Err(EvaluationError::DivisionByZero),
            Self::Div => Ok(lhs / rhs),
            Self::Pow => Ok(lhs.powf(rhs)),
        }
    }

    fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
            Self::Pow => '^',
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    fn eval<F>(&self, lookup: &F) -> Result<f64, EvaluationError>
    where
        F: Fn(&str) -> Option<f64>,
    {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Variable(name) => {
                lookup(name).ok_or_else(|| EvaluationError::UnknownVariable(name.clone()))
            }
            Self::Neg(inner) => Ok(-inner.eval(lookup)?),
            Self::Binary { op, lhs, rhs } => op.apply(lhs.eval(lookup)?, rhs.eval(lookup)?),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Variable(name) => f.write_str(name),
            Self::Neg(inner) => write!(f, "-({})", inner),
            Self::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Ident(String),
    Op(BinaryOp),
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    position: usize,
}

fn parse_error(position: usize, message: impl Into<String>) -> EvaluationError {
    EvaluationError::Parse {
        position,
        message: message.into(),
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, EvaluationError> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (position, c) = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let op = match c {
            '+' => Some(BinaryOp::Add),
            '-' | '−' => Some(BinaryOp::Sub),
            '*' | '×' | '·' => Some(BinaryOp::Mul),
            '/' | '÷' => Some(BinaryOp::Div),
            '^' => Some(BinaryOp::Pow),
            _ => None,
        };
        if let Some(op) = op {
            tokens.push(Token {
                kind: TokenKind::Op(op),
                position,
            });
            i += 1;
            continue;
        }

        match c {
            '(' => {
                tokens.push(Token {
                    kind: TokenKind::LParen,
                    position,
                });
                i += 1;
            }
            ')' => {
                tokens.push(Token {
                    kind: TokenKind::RParen,
                    position,
                });
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut literal = String::new();
                while i < chars.len() {
                    let ch = chars[i].1;
                    let separator = ch == ','
                        && chars.get(i + 1).is_some_and(|(_, next)| next.is_ascii_digit())
                        && !literal.contains('.');
                    if ch.is_ascii_digit() || ch == '.' {
                        literal.push(ch);
                    } else if !separator {
                        break;
                    }
                    i += 1;
                }
                let mut value: f64 = literal
                    .parse()
                    .map_err(|_| parse_error(position, format!("invalid number `{}`", literal)))?;
                if chars.get(i).is_some_and(|(_, ch)| *ch == '%') {
                    value /= 100.0;
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Number(value),
                    position,
                });
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                    name.push(chars[i].1);
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Ident(name),
                    position,
                });
            }
            other => {
                return Err(parse_error(
                    position,
                    format!("unexpected character `{}`", other),
                ))
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    fn position(&self) -> usize {
        self.peek().map(|t| t.position).unwrap_or(self.end)
    }

    fn eat_op(&mut self, ops: &[BinaryOp]) -> Option<BinaryOp> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Op(op),
                ..
            }) if ops.contains(op) => {
                let op = *op;
                self.cursor += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn expr(&mut self) -> Result<Expr, EvaluationError> {
        let mut lhs = self.term()?;
        while let Some(op) = self.eat_op(&[BinaryOp::Add, BinaryOp::Sub]) {
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, EvaluationError> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat_op(&[BinaryOp::Mul, BinaryOp::Div]) {
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, EvaluationError> {
        match self.eat_op(&[BinaryOp::Sub, BinaryOp::Add]) {
            Some(BinaryOp::Sub) => Ok(Expr::Neg(Box::new(self.unary()?))),
            Some(_) => self.unary(),
            None => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, EvaluationError> {
        let base = self.primary()?;
        if self.eat_op(&[BinaryOp::Pow]).is_some() {
            let exponent = self.unary()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, EvaluationError> {
        let position = self.position();
        let token = self
            .tokens
            .get(self.cursor)
            .cloned()
            .ok_or_else(|| parse_error(position, "unexpected end of expression"))?;
        self.cursor += 1;

        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Ident(name) => Ok(Expr::Variable(name)),
            TokenKind::LParen => {
                let inner = self.expr()?;
                match self.peek() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => {
                        self.cursor += 1;
                        Ok(inner)
                    }
                    _ => Err(parse_error(self.position(), "expected `)`")),
                }
            }
            TokenKind::RParen => Err(parse_error(token.position, "unexpected `)`")),
            TokenKind::Op(op) => Err(parse_error(
                token.position,
                format!("unexpected operator `{}`", op.symbol()),
            )),
        }
    }
}

/// A parsed formula expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Expr,
    variables: Vec<String>,
}

impl Expression {
    /// Parse expression text.
    ///
    /// Positions in parse errors are byte offsets into the text after any
    /// `name =` label has been removed.
    pub fn parse(text: &str) -> Result<Self, EvaluationError> {
        let body = strip_label(text);
        let tokens = tokenize(body)?;
        if tokens.is_empty() {
            return Err(parse_error(0, "empty expression"));
        }

        let mut variables: Vec<String> = Vec::new();
        for token in &tokens {
            if let TokenKind::Ident(name) = &token.kind {
                if !variables.contains(name) {
                    variables.push(name.clone());
                }
            }
        }

        let mut parser = Parser {
            tokens,
            cursor: 0,
            end: body.len(),
        };
        let ast = parser.expr()?;
        if let Some(extra) = parser.peek() {
            return Err(parse_error(extra.position, "unexpected trailing input"));
        }

        Ok(Self {
            source: body.trim().to_string(),
            ast,
            variables,
        })
    }

    /// The expression text (without any label).
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Variables in order of first appearance, without duplicates.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// The parsed tree.
    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Evaluate with a lookup function for variable values.
    pub fn evaluate<F>(&self, lookup: F) -> Result<f64, EvaluationError>
    where
        F: Fn(&str) -> Option<f64>,
    {
        let value = self.ast.eval(&lookup)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(EvaluationError::NonFinite)
        }
    }

    /// Evaluate against a map of bindings.
    pub fn evaluate_with(&self, bindings: &HashMap<String, f64>) -> Result<f64, EvaluationError> {
        self.evaluate(|name| bindings.get(name).copied())
    }
}

impl FromStr for Expression {
    type Err = EvaluationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Drop a leading `label =` if the label is a single identifier.
fn strip_label(text: &str) -> &str {
    match text.split_once('=') {
        Some((label, body))
            if !label.trim().is_empty()
                && label
                    .trim()
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == ' ') =>
        {
            body
        }
        _ => text,
    }
}
