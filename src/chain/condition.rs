//! Step pre-conditions
//!
//! Conditions are parsed into a small expression tree once, when a chain is
//! validated, and evaluated before each step. Supported syntax:
//!
//! ```text
//! {{status}} == "paid"
//! $prev.status_code >= 200 && $prev.status_code < 300
//! {{total}} > 100 or not ({{user.role}} == 'guest')
//! ```
//!
//! Operands are variable references (`{{name.path}}`), fields of the previous
//! step's result (`$prev.status_code`, `$prev.status`, `$prev.duration_ms`),
//! and string, number, boolean or null literals.
//!
//! Evaluation fails closed: a missing variable, a missing previous result or a
//! comparison between incompatible types makes the condition "not met" and the
//! reason is reported alongside the outcome.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

use super::template::Placeholder;
use super::variables::VariableStore;

/// Errors raised while parsing a condition
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionParseError {
    #[error("Unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("Unterminated {0}")]
    Unterminated(&'static str),

    #[error("Invalid variable reference: {0}")]
    InvalidReference(String),

    #[error("Unknown previous-step field: {0}")]
    UnknownField(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Unknown keyword: {0}")]
    UnknownKeyword(String),

    #[error("Unexpected {0}")]
    UnexpectedToken(String),

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Expression nested deeper than {0} levels")]
    TooDeep(usize),
}

/// Errors raised while evaluating a condition; all of them mean "not met"
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("Variable not set: {0}")]
    UnknownVariable(String),

    #[error("No previous step result")]
    NoPreviousStep,

    #[error("Previous step has no response")]
    NoPreviousResponse,

    #[error("Cannot compare {left} {op} {right}")]
    IncompatibleTypes {
        left: &'static str,
        op: CompareOp,
        right: &'static str,
    },

    #[error("Expected a boolean, got {0}")]
    NotBoolean(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        })
    }
}

/// Fields of the previous step result usable in conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrevField {
    StatusCode,
    Status,
    DurationMs,
}

impl PrevField {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "status_code" => Some(PrevField::StatusCode),
            "status" => Some(PrevField::Status),
            "duration_ms" => Some(PrevField::DurationMs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Variable(Placeholder),
    Previous(PrevField),
    Literal(Value),
}

/// Parsed condition tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
    Truthy(Operand),
}

/// What the condition evaluator needs to know about the previous step
#[derive(Debug, Clone, PartialEq)]
pub struct PreviousStep {
    pub status: String,
    pub status_code: Option<u16>,
    pub duration_ms: u64,
}

/// Result of evaluating a step condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionOutcome {
    pub met: bool,
    /// Why the condition was not met because of an evaluation error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Expression {
    pub fn parse(input: &str) -> Result<Self, ConditionParseError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(ConditionParseError::UnexpectedToken(token.describe())),
        }
    }

    /// Evaluate, mapping any evaluation error to "not met"
    pub fn evaluate(
        &self,
        store: &VariableStore,
        previous: Option<&PreviousStep>,
    ) -> ConditionOutcome {
        match self.eval(store, previous) {
            Ok(met) => ConditionOutcome { met, reason: None },
            Err(e) => ConditionOutcome {
                met: false,
                reason: Some(e.to_string()),
            },
        }
    }

    /// Evaluate, surfacing evaluation errors
    pub fn eval(
        &self,
        store: &VariableStore,
        previous: Option<&PreviousStep>,
    ) -> Result<bool, EvalError> {
        match self {
            Expression::Compare { left, op, right } => {
                let left = resolve(left, store, previous)?;
                let right = resolve(right, store, previous)?;
                compare(&left, *op, &right)
            }
            Expression::And(a, b) => {
                Ok(a.eval(store, previous)? && b.eval(store, previous)?)
            }
            Expression::Or(a, b) => Ok(a.eval(store, previous)? || b.eval(store, previous)?),
            Expression::Not(inner) => Ok(!inner.eval(store, previous)?),
            Expression::Truthy(operand) => match resolve(operand, store, previous)? {
                Value::Bool(b) => Ok(b),
                other => Err(EvalError::NotBoolean(type_name(&other))),
            },
        }
    }
}

/// Parse and evaluate in one go; parse errors are also "not met"
pub fn evaluate_condition(
    condition: &str,
    store: &VariableStore,
    previous: Option<&PreviousStep>,
) -> ConditionOutcome {
    match Expression::parse(condition) {
        Ok(expr) => expr.evaluate(store, previous),
        Err(e) => ConditionOutcome {
            met: false,
            reason: Some(e.to_string()),
        },
    }
}

fn resolve(
    operand: &Operand,
    store: &VariableStore,
    previous: Option<&PreviousStep>,
) -> Result<Value, EvalError> {
    match operand {
        Operand::Literal(value) => Ok(value.clone()),
        Operand::Variable(p) => p
            .resolve(store)
            .cloned()
            .ok_or_else(|| EvalError::UnknownVariable(p.reference())),
        Operand::Previous(field) => {
            let previous = previous.ok_or(EvalError::NoPreviousStep)?;
            match field {
                PrevField::Status => Ok(Value::String(previous.status.clone())),
                PrevField::DurationMs => Ok(Value::from(previous.duration_ms)),
                PrevField::StatusCode => previous
                    .status_code
                    .map(Value::from)
                    .ok_or(EvalError::NoPreviousResponse),
            }
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> Result<bool, EvalError> {
    let incompatible = || EvalError::IncompatibleTypes {
        left: type_name(left),
        op,
        right: type_name(right),
    };
    let equality = |equal: bool| match op {
        CompareOp::Eq => Ok(equal),
        CompareOp::Ne => Ok(!equal),
        _ => Err(incompatible()),
    };

    match (left, right) {
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            match (as_number(left), as_number(right)) {
                (Some(l), Some(r)) => compare_numbers(l, op, r).ok_or_else(incompatible),
                _ => Err(incompatible()),
            }
        }
        (Value::String(l), Value::String(r)) => match op {
            CompareOp::Eq | CompareOp::Ne => equality(l == r),
            _ => match (as_number(left), as_number(right)) {
                (Some(l), Some(r)) => compare_numbers(l, op, r).ok_or_else(incompatible),
                _ => Err(incompatible()),
            },
        },
        (Value::Null, _) | (_, Value::Null) => equality(left.is_null() && right.is_null()),
        (Value::Bool(l), Value::Bool(r)) => equality(l == r),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            equality(left == right)
        }
        _ => Err(incompatible()),
    }
}

/// `None` when either side is NaN
fn compare_numbers(left: f64, op: CompareOp, right: f64) -> Option<bool> {
    let ordering = left.partial_cmp(&right)?;
    Some(match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    })
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Op(CompareOp),
    Operand(Operand),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::And => "'&&'".to_string(),
            Token::Or => "'||'".to_string(),
            Token::Not => "'!'".to_string(),
            Token::Op(op) => format!("'{}'", op),
            Token::Operand(_) => "operand".to_string(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConditionParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '{' if next == Some('{') => {
                let start = i + 2;
                let end = (start..chars.len().saturating_sub(1))
                    .find(|&j| chars[j] == '}' && chars[j + 1] == '}')
                    .ok_or(ConditionParseError::Unterminated("variable reference"))?;
                let reference: String = chars[start..end].iter().collect();
                let placeholder = Placeholder::parse(&reference)
                    .ok_or(ConditionParseError::InvalidReference(reference))?;
                tokens.push(Token::Operand(Operand::Variable(placeholder)));
                i = end + 2;
            }
            '$' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_alphanumeric() || matches!(chars[end], '_' | '.')) {
                    end += 1;
                }
                let reference: String = chars[start..end].iter().collect();
                let field = reference
                    .strip_prefix("prev.")
                    .and_then(PrevField::parse)
                    .ok_or_else(|| ConditionParseError::UnknownField(reference.clone()))?;
                tokens.push(Token::Operand(Operand::Previous(field)));
                i = end;
            }
            '"' | '\'' => {
                let (literal, end) = read_string(&chars, i)?;
                tokens.push(Token::Operand(Operand::Literal(Value::String(literal))));
                i = end;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Op(CompareOp::Eq));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Op(CompareOp::Ne));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '<' | '>' => {
                let op = match (c, next == Some('=')) {
                    ('<', true) => CompareOp::Le,
                    ('<', false) => CompareOp::Lt,
                    (_, true) => CompareOp::Ge,
                    (_, false) => CompareOp::Gt,
                };
                tokens.push(Token::Op(op));
                i += if next == Some('=') { 2 } else { 1 };
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = parse_number(&text)
                    .ok_or(ConditionParseError::InvalidNumber(text))?;
                tokens.push(Token::Operand(Operand::Literal(number)));
            }
            c if c.is_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.as_str() {
                    "and" | "AND" => Token::And,
                    "or" | "OR" => Token::Or,
                    "not" | "NOT" => Token::Not,
                    "true" => Token::Operand(Operand::Literal(Value::Bool(true))),
                    "false" => Token::Operand(Operand::Literal(Value::Bool(false))),
                    "null" => Token::Operand(Operand::Literal(Value::Null)),
                    _ => return Err(ConditionParseError::UnknownKeyword(word)),
                };
                tokens.push(token);
            }
            _ => return Err(ConditionParseError::UnexpectedChar { ch: c, pos: i }),
        }
    }

    Ok(tokens)
}

fn read_string(chars: &[char], open: usize) -> Result<(String, usize), ConditionParseError> {
    let quote = chars[open];
    let mut out = String::new();
    let mut i = open + 1;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or(ConditionParseError::Unterminated("string"))?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => *other,
                });
                i += 2;
            }
            c if c == quote => return Ok((out, i + 1)),
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    Err(ConditionParseError::Unterminated("string"))
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::from(i));
    }
    let f = text.parse::<f64>().ok()?;
    serde_json::Number::from_f64(f).map(Value::Number)
}

// ============================================================================
// Parser
// ============================================================================

/// Limit on tree depth: `(`, `!`/`not` and each chained `&&`/`||` add a level
const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn descend(&mut self) -> Result<(), ConditionParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ConditionParseError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn or(&mut self) -> Result<Expression, ConditionParseError> {
        let entry = self.depth;
        let mut expr = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            self.descend()?;
            let rhs = self.and()?;
            expr = Expression::Or(Box::new(expr), Box::new(rhs));
        }
        self.depth = entry;
        Ok(expr)
    }

    fn and(&mut self) -> Result<Expression, ConditionParseError> {
        let entry = self.depth;
        let mut expr = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            self.descend()?;
            let rhs = self.unary()?;
            expr = Expression::And(Box::new(expr), Box::new(rhs));
        }
        self.depth = entry;
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expression, ConditionParseError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            self.descend()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Expression::Not(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expression, ConditionParseError> {
        match self.next() {
            Some(Token::LParen) => {
                self.descend()?;
                let expr = self.or()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::RParen) => Ok(expr),
                    Some(token) => Err(ConditionParseError::UnexpectedToken(token.describe())),
                    None => Err(ConditionParseError::Unterminated("parenthesis")),
                }
            }
            Some(Token::Operand(left)) => match self.peek() {
                Some(Token::Op(op)) => {
                    let op = *op;
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Operand(right)) => Ok(Expression::Compare { left, op, right }),
                        Some(token) => Err(ConditionParseError::UnexpectedToken(token.describe())),
                        None => Err(ConditionParseError::UnexpectedEnd),
                    }
                }
                _ => Ok(Expression::Truthy(left)),
            },
            Some(token) => Err(ConditionParseError::UnexpectedToken(token.describe())),
            None => Err(ConditionParseError::UnexpectedEnd),
        }
    }
}
