//! A restricted, whitelist-grammar expression evaluator for trait-emergence
//! rule conditions (the only consumer wired into [`crate::engine`]) and for
//! embedders who want optional pluggable economic policies over the same
//! grammar. This is deliberately not a general scripting engine: every
//! identifier, attribute, and call is checked against a fixed whitelist at
//! parse time, and nothing in the grammar can loop, allocate unboundedly, or
//! call back into host code beyond the fixed function set below.
//!
//! Grammar (precedence low to high):
//! `or_expr -> and_expr -> not_expr -> comparison -> additive ->
//! multiplicative -> power -> unary -> postfix (call/attribute) -> primary`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::numerics::{clamp, sigmoid};

/// Attribute names an expression is allowed to access via `.`.
const ATTRIBUTE_WHITELIST: [&str; 14] = [
    "id",
    "role",
    "currency",
    "employer",
    "retainer_fee",
    "bribe_threshold",
    "wealth",
    "compute",
    "copy",
    "defend",
    "raid",
    "trade",
    "sense",
    "adapt",
];

/// Function names an expression is allowed to call.
const CALL_WHITELIST: [&str; 8] = ["abs", "min", "max", "sigmoid", "clamp", "sqrt", "exp", "log"];

/// A value produced by evaluating an expression, or supplied as context.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// An integer.
    Int(i64),
    /// A floating-point number.
    Float(f64),
    /// A boolean.
    Bool(bool),
    /// The null value, equal only to itself.
    Null,
    /// A nested object, reachable via attribute access from an identifier
    /// bound to it in the context (e.g. an agent-shaped value).
    Object(BTreeMap<String, Value>),
}

impl Value {
    fn as_f64(&self) -> Result<f64, EvalError> {
        match self {
            Value::Int(i) => Ok(*i as f64),
            Value::Float(f) => Ok(*f),
            other => Err(EvalError::TypeError(format!("expected a number, got {other:?}"))),
        }
    }

    fn as_bool(&self) -> Result<bool, EvalError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(EvalError::TypeError(format!("expected a boolean, got {other:?}"))),
        }
    }

    fn is_int(&self) -> bool {
        matches!(self, Value::Int(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "null"),
            Value::Object(_) => write!(f, "<object>"),
        }
    }
}

/// Variable bindings an expression is evaluated against.
pub type Context = BTreeMap<String, Value>;

/// Errors raised while lexing or parsing an expression, before any
/// evaluation is attempted.
#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    /// An unrecognized character was encountered.
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
    /// A token appeared where the grammar did not expect one.
    #[error("unexpected token {0:?}")]
    UnexpectedToken(Token),
    /// The expression ended before the grammar was satisfied.
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    /// Trailing tokens remained after a complete expression was parsed.
    #[error("trailing input after expression: {0:?}")]
    TrailingInput(Token),
    /// An identifier began with `_`, or was otherwise disallowed.
    #[error("identifier '{0}' is not allowed")]
    DisallowedIdentifier(String),
    /// An attribute name is not in the fixed whitelist.
    #[error("attribute '{0}' is not allowed")]
    DisallowedAttribute(String),
    /// A call name is not in the fixed whitelist.
    #[error("function '{0}' is not allowed")]
    DisallowedCall(String),
}

/// Errors raised while evaluating an already-parsed expression against a
/// [`Context`].
#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    /// An identifier had no binding in the context.
    #[error("name '{0}' is not defined")]
    NameError(String),
    /// An attribute was accessed on a non-object value, or the base object
    /// had no such key.
    #[error("no such attribute: {0}")]
    AttributeError(String),
    /// An operand had the wrong type for the operator or function applied.
    #[error("type error: {0}")]
    TypeError(String),
    /// Division or modulo by zero.
    #[error("division by zero")]
    DivideByZero,
    /// A call's argument count did not match what the function requires.
    #[error("wrong number of arguments to '{0}'")]
    Arity(&'static str),
}

/// A lexical token.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// Identifier (includes `true`/`false`/`null`/`and`/`or`/`not` which are
    /// reinterpreted by the parser).
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
    StarStar,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    Comma,
    Dot,
}

fn tokenize(src: &str) -> Result<Vec<Token>, PolicyError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::StarStar);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '/' => {
                if chars.get(i + 1) == Some(&'/') {
                    tokens.push(Token::SlashSlash);
                    i += 2;
                } else {
                    tokens.push(Token::Slash);
                    i += 1;
                }
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            _ if c.is_ascii_digit() => {
                let start = i;
                let mut is_float = false;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    if chars[i] == '.' {
                        is_float = true;
                    }
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                if is_float {
                    let value = text
                        .parse::<f64>()
                        .map_err(|_| PolicyError::UnexpectedChar(c, start))?;
                    tokens.push(Token::Float(value));
                } else {
                    let value = text
                        .parse::<i64>()
                        .map_err(|_| PolicyError::UnexpectedChar(c, start))?;
                    tokens.push(Token::Int(value));
                }
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Ident(text));
            }
            other => return Err(PolicyError::UnexpectedChar(other, i)),
        }
    }
    Ok(tokens)
}

/// A parsed, whitelist-checked expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A literal value.
    Literal(Value),
    /// A free identifier, resolved from the [`Context`] at evaluation time.
    Ident(String),
    /// `lhs.attr`.
    Attribute(Box<Expr>, String),
    /// `name(args...)`.
    Call(String, Vec<Expr>),
    /// `op expr`.
    Unary(UnaryOp, Box<Expr>),
    /// `lhs op rhs`.
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// `lhs op rhs`.
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    /// A chain of comparisons: `first op1 rest[0] op2 rest[1] ...`, each
    /// link short-circuiting the chain to `false` on first failure.
    Compare(Box<Expr>, Vec<(CompareOp, Expr)>),
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Arithmetic no-op, type-checked.
    Pos,
    /// Boolean negation.
    Not,
}

/// Binary arithmetic operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/` (true division, always float)
    Div,
    /// `//` (floor division)
    FloorDiv,
    /// `%`
    Mod,
    /// `**`
    Pow,
}

/// Boolean operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    /// `and`
    And,
    /// `or`
    Or,
}

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<(), PolicyError> {
        match self.advance() {
            Some(ref tok) if tok == expected => Ok(()),
            Some(tok) => Err(PolicyError::UnexpectedToken(tok)),
            None => Err(PolicyError::UnexpectedEnd),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, PolicyError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, PolicyError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Ident(w)) if w == "or") {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Logical(LogicalOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, PolicyError> {
        let mut lhs = self.parse_not()?;
        while matches!(self.peek(), Some(Token::Ident(w)) if w == "and") {
            self.advance();
            let rhs = self.parse_not()?;
            lhs = Expr::Logical(LogicalOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, PolicyError> {
        if matches!(self.peek(), Some(Token::Ident(w)) if w == "not") {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, PolicyError> {
        let first = self.parse_additive()?;
        let mut chain = Vec::new();
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CompareOp::Eq,
                Some(Token::Ne) => CompareOp::Ne,
                Some(Token::Lt) => CompareOp::Lt,
                Some(Token::Le) => CompareOp::Le,
                Some(Token::Gt) => CompareOp::Gt,
                Some(Token::Ge) => CompareOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            chain.push((op, rhs));
        }
        if chain.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), chain))
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, PolicyError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, PolicyError> {
        let mut lhs = self.parse_power()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::SlashSlash) => BinOp::FloorDiv,
                Some(Token::Percent) => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_power()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_power(&mut self) -> Result<Expr, PolicyError> {
        let lhs = self.parse_unary()?;
        if matches!(self.peek(), Some(Token::StarStar)) {
            self.advance();
            let rhs = self.parse_power()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, PolicyError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                let inner = self.parse_unary()?;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)))
            }
            Some(Token::Plus) => {
                self.advance();
                let inner = self.parse_unary()?;
                Ok(Expr::Unary(UnaryOp::Pos, Box::new(inner)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, PolicyError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let name = match self.advance() {
                        Some(Token::Ident(name)) => name,
                        Some(tok) => return Err(PolicyError::UnexpectedToken(tok)),
                        None => return Err(PolicyError::UnexpectedEnd),
                    };
                    if !ATTRIBUTE_WHITELIST.contains(&name.as_str()) {
                        return Err(PolicyError::DisallowedAttribute(name));
                    }
                    expr = Expr::Attribute(Box::new(expr), name);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, PolicyError> {
        match self.advance() {
            Some(Token::Int(i)) => Ok(Expr::Literal(Value::Int(i))),
            Some(Token::Float(f)) => Ok(Expr::Literal(Value::Float(f))),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => self.parse_ident_primary(name),
            Some(tok) => Err(PolicyError::UnexpectedToken(tok)),
            None => Err(PolicyError::UnexpectedEnd),
        }
    }

    fn parse_ident_primary(&mut self, name: String) -> Result<Expr, PolicyError> {
        match name.as_str() {
            "true" => return Ok(Expr::Literal(Value::Bool(true))),
            "false" => return Ok(Expr::Literal(Value::Bool(false))),
            "null" => return Ok(Expr::Literal(Value::Null)),
            _ => {}
        }
        if matches!(self.peek(), Some(Token::LParen)) {
            self.advance();
            if !CALL_WHITELIST.contains(&name.as_str()) {
                return Err(PolicyError::DisallowedCall(name));
            }
            let mut args = Vec::new();
            if !matches!(self.peek(), Some(Token::RParen)) {
                args.push(self.parse_expr()?);
                while matches!(self.peek(), Some(Token::Comma)) {
                    self.advance();
                    args.push(self.parse_expr()?);
                }
            }
            self.expect(&Token::RParen)?;
            return Ok(Expr::Call(name, args));
        }
        if name.starts_with('_') {
            return Err(PolicyError::DisallowedIdentifier(name));
        }
        Ok(Expr::Ident(name))
    }
}

/// Parse `source` into an [`Expr`], rejecting any construct outside the
/// grammar described in the module docs.
pub fn parse(source: &str) -> Result<Expr, PolicyError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if let Some(tok) = parser.peek() {
        return Err(PolicyError::TrailingInput(tok.clone()));
    }
    Ok(expr)
}

fn numeric_binop(op: BinOp, a: &Value, b: &Value) -> Result<Value, EvalError> {
    let both_int = a.is_int() && b.is_int();
    let (af, bf) = (a.as_f64()?, b.as_f64()?);
    match op {
        BinOp::Add if both_int => Ok(Value::Int(af as i64 + bf as i64)),
        BinOp::Add => Ok(Value::Float(af + bf)),
        BinOp::Sub if both_int => Ok(Value::Int(af as i64 - bf as i64)),
        BinOp::Sub => Ok(Value::Float(af - bf)),
        BinOp::Mul if both_int => Ok(Value::Int(af as i64 * bf as i64)),
        BinOp::Mul => Ok(Value::Float(af * bf)),
        BinOp::Div => {
            if bf == 0.0 {
                return Err(EvalError::DivideByZero);
            }
            Ok(Value::Float(af / bf))
        }
        BinOp::FloorDiv => {
            if bf == 0.0 {
                return Err(EvalError::DivideByZero);
            }
            let result = (af / bf).floor();
            if both_int {
                Ok(Value::Int(result as i64))
            } else {
                Ok(Value::Float(result))
            }
        }
        BinOp::Mod => {
            if bf == 0.0 {
                return Err(EvalError::DivideByZero);
            }
            if both_int {
                Ok(Value::Int((af as i64).rem_euclid(bf as i64)))
            } else {
                Ok(Value::Float(af.rem_euclid(bf)))
            }
        }
        BinOp::Pow => Ok(Value::Float(af.powf(bf))),
    }
}

fn compare_values(op: CompareOp, a: &Value, b: &Value) -> Result<bool, EvalError> {
    if matches!(op, CompareOp::Eq | CompareOp::Ne) {
        let equal = match (a, b) {
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Null, Value::Null) => true,
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => a.as_f64()? == b.as_f64()?,
            _ => false,
        };
        return Ok(if op == CompareOp::Eq { equal } else { !equal });
    }
    let (af, bf) = (a.as_f64()?, b.as_f64()?);
    Ok(match op {
        CompareOp::Lt => af < bf,
        CompareOp::Le => af <= bf,
        CompareOp::Gt => af > bf,
        CompareOp::Ge => af >= bf,
        CompareOp::Eq | CompareOp::Ne => unreachable!("handled above"),
    })
}

fn call_builtin(name: &str, args: &[Value]) -> Result<Value, EvalError> {
    match name {
        "abs" => {
            let [a] = args else { return Err(EvalError::Arity("abs")) };
            match a {
                Value::Int(i) => Ok(Value::Int(i.abs())),
                _ => Ok(Value::Float(a.as_f64()?.abs())),
            }
        }
        "min" => {
            if args.is_empty() {
                return Err(EvalError::Arity("min"));
            }
            let mut best = args[0].clone();
            for candidate in &args[1..] {
                if candidate.as_f64()? < best.as_f64()? {
                    best = candidate.clone();
                }
            }
            Ok(best)
        }
        "max" => {
            if args.is_empty() {
                return Err(EvalError::Arity("max"));
            }
            let mut best = args[0].clone();
            for candidate in &args[1..] {
                if candidate.as_f64()? > best.as_f64()? {
                    best = candidate.clone();
                }
            }
            Ok(best)
        }
        "sigmoid" => {
            let [a] = args else { return Err(EvalError::Arity("sigmoid")) };
            Ok(Value::Float(sigmoid(a.as_f64()?)))
        }
        "clamp" => {
            let [v, lo, hi] = args else { return Err(EvalError::Arity("clamp")) };
            Ok(Value::Float(clamp(v.as_f64()?, lo.as_f64()?, hi.as_f64()?)))
        }
        "sqrt" => {
            let [a] = args else { return Err(EvalError::Arity("sqrt")) };
            Ok(Value::Float(a.as_f64()?.sqrt()))
        }
        "exp" => {
            let [a] = args else { return Err(EvalError::Arity("exp")) };
            Ok(Value::Float(a.as_f64()?.exp()))
        }
        "log" => {
            let [a] = args else { return Err(EvalError::Arity("log")) };
            Ok(Value::Float(a.as_f64()?.ln()))
        }
        other => Err(EvalError::TypeError(format!("unknown function '{other}'"))),
    }
}

/// Evaluate `expr` against `ctx`.
pub fn eval(expr: &Expr, ctx: &Context) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Ident(name) => ctx.get(name).cloned().ok_or_else(|| EvalError::NameError(name.clone())),
        Expr::Attribute(base, name) => match eval(base, ctx)? {
            Value::Object(map) => map
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::AttributeError(name.clone())),
            _ => Err(EvalError::AttributeError(name.clone())),
        },
        Expr::Call(name, arg_exprs) => {
            let mut args = Vec::with_capacity(arg_exprs.len());
            for arg in arg_exprs {
                args.push(eval(arg, ctx)?);
            }
            call_builtin(name, &args)
        }
        Expr::Unary(UnaryOp::Neg, inner) => match eval(inner, ctx)? {
            Value::Int(i) => Ok(Value::Int(-i)),
            other => Ok(Value::Float(-other.as_f64()?)),
        },
        Expr::Unary(UnaryOp::Pos, inner) => {
            let value = eval(inner, ctx)?;
            value.as_f64()?;
            Ok(value)
        }
        Expr::Unary(UnaryOp::Not, inner) => Ok(Value::Bool(!eval(inner, ctx)?.as_bool()?)),
        Expr::Binary(op, lhs, rhs) => numeric_binop(*op, &eval(lhs, ctx)?, &eval(rhs, ctx)?),
        Expr::Logical(LogicalOp::And, lhs, rhs) => {
            if !eval(lhs, ctx)?.as_bool()? {
                Ok(Value::Bool(false))
            } else {
                Ok(Value::Bool(eval(rhs, ctx)?.as_bool()?))
            }
        }
        Expr::Logical(LogicalOp::Or, lhs, rhs) => {
            if eval(lhs, ctx)?.as_bool()? {
                Ok(Value::Bool(true))
            } else {
                Ok(Value::Bool(eval(rhs, ctx)?.as_bool()?))
            }
        }
        Expr::Compare(first, chain) => {
            let mut prev = eval(first, ctx)?;
            for (op, next_expr) in chain {
                let next = eval(next_expr, ctx)?;
                if !compare_values(*op, &prev, &next)? {
                    return Ok(Value::Bool(false));
                }
                prev = next;
            }
            Ok(Value::Bool(true))
        }
    }
}

/// Parse and evaluate `source` in one step.
pub fn evaluate(source: &str, ctx: &Context) -> Result<Value, PolicyOrEvalError> {
    let expr = parse(source).map_err(PolicyOrEvalError::Parse)?;
    eval(&expr, ctx).map_err(PolicyOrEvalError::Eval)
}

/// Either stage of failure from [`evaluate`].
#[derive(Debug, Error, PartialEq)]
pub enum PolicyOrEvalError {
    /// Failed to parse.
    #[error(transparent)]
    Parse(#[from] PolicyError),
    /// Failed to evaluate.
    #[error(transparent)]
    Eval(#[from] EvalError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, Value)]) -> Context {
        pairs.iter().cloned().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn evaluates_trait_emergence_style_condition() {
        let c = ctx(&[("copy", Value::Int(12)), ("tick", Value::Int(4))]);
        let result = evaluate("copy >= 12 and tick % 2 == 0", &c).unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn short_circuits_and_on_false_lhs() {
        let c = ctx(&[("copy", Value::Int(1))]);
        // missing_name would raise NameError if evaluated; it must not be.
        let result = evaluate("copy >= 12 and missing_name == 0", &c).unwrap();
        assert_eq!(result, Value::Bool(false));
    }

    #[test]
    fn chained_comparison_short_circuits() {
        let c = ctx(&[("x", Value::Int(5))]);
        let result = evaluate("1 < x < 3", &c).unwrap();
        assert_eq!(result, Value::Bool(false));
    }

    #[test]
    fn rejects_leading_underscore_identifier() {
        let err = parse("_secret > 0").unwrap_err();
        assert_eq!(err, PolicyError::DisallowedIdentifier("_secret".to_string()));
    }

    #[test]
    fn rejects_disallowed_call() {
        let err = parse("eval(1)").unwrap_err();
        assert_eq!(err, PolicyError::DisallowedCall("eval".to_string()));
    }

    #[test]
    fn rejects_disallowed_attribute() {
        let err = parse("agent.__class__").unwrap_err();
        assert_eq!(err, PolicyError::DisallowedAttribute("__class__".to_string()));
    }

    #[test]
    fn missing_identifier_is_a_name_error_not_a_parse_error() {
        let err = evaluate("missing > 0", &Context::new()).unwrap_err();
        assert_eq!(err, PolicyOrEvalError::Eval(EvalError::NameError("missing".to_string())));
    }

    #[test]
    fn arithmetic_precedence_matches_convention() {
        let result = evaluate("2 + 3 * 4", &Context::new()).unwrap();
        assert_eq!(result, Value::Int(14));
    }

    #[test]
    fn power_is_right_associative() {
        // 2 ** (3 ** 2) == 2 ** 9 == 512, not (2 ** 3) ** 2 == 64.
        let result = evaluate("2 ** 3 ** 2", &Context::new()).unwrap();
        assert_eq!(result, Value::Float(512.0));
    }

    #[test]
    fn calls_builtin_functions() {
        let result = evaluate("clamp(1.5, 0.0, 1.0)", &Context::new()).unwrap();
        assert_eq!(result, Value::Float(1.0));
    }

    #[test]
    fn attribute_access_reads_object_field() {
        let mut agent = BTreeMap::new();
        agent.insert("currency".to_string(), Value::Int(250));
        let c = ctx(&[("agent", Value::Object(agent))]);
        let result = evaluate("agent.currency > 100", &c).unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn division_by_zero_is_an_eval_error() {
        let err = evaluate("1 / 0", &Context::new()).unwrap_err();
        assert_eq!(err, PolicyOrEvalError::Eval(EvalError::DivideByZero));
    }

    #[test]
    fn trailing_input_is_rejected() {
        let err = parse("1 + 1 2").unwrap_err();
        assert!(matches!(err, PolicyError::TrailingInput(_)));
    }
}
