//! Recursive-descent parser for label expressions
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! or_expr    := and_expr ('|' and_expr)*
//! and_expr   := not_expr ('&' not_expr)*
//! not_expr   := '!' not_expr | primary
//! primary    := '(' or_expr ')' | comparison
//! comparison := IDENTIFIER ('=' | '!=') IDENTIFIER
//! IDENTIFIER := [A-Za-z0-9_.\-/]+
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use super::{Labels, LabelsAware};

/// Longest expression accepted by the parser (in characters)
pub const MAX_EXPRESSION_LENGTH: usize = 1000;

static ALLOWED_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9\s&|!()=_.\-/]+$").expect("label expression whitelist is a valid regex")
});

/// Malformed label expression
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid label expression: {message}")]
pub struct LabelExpressionError {
    message: String,
}

impl LabelExpressionError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Human-readable description of what went wrong
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A compiled label expression.
///
/// Evaluation is pure: the same expression evaluated against the same labels
/// always yields the same answer, so one parse can serve any number of
/// entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelExpression {
    /// `key=value`
    Equals {
        /// Label key
        key: String,
        /// Expected value
        value: String,
    },
    /// `key!=value` (also true when `key` is absent)
    NotEquals {
        /// Label key
        key: String,
        /// Rejected value
        value: String,
    },
    /// `!expr`
    Not(Box<LabelExpression>),
    /// `lhs & rhs`
    And(Box<LabelExpression>, Box<LabelExpression>),
    /// `lhs | rhs`
    Or(Box<LabelExpression>, Box<LabelExpression>),
}

impl LabelExpression {
    /// Parse an expression string.
    ///
    /// # Errors
    ///
    /// Returns a [`LabelExpressionError`] describing the first problem found:
    /// empty input, over-long input, disallowed characters, unexpected or
    /// missing tokens, unbalanced parentheses, or trailing input.
    pub fn parse(input: &str) -> Result<Self, LabelExpressionError> {
        let sanitized = sanitize(input)?;
        let tokens = tokenize(sanitized)?;
        if tokens.is_empty() {
            return Err(LabelExpressionError::new("No valid tokens found in expression"));
        }

        let mut parser = Parser { tokens, position: 0 };
        let expression = parser.parse_or()?;

        if let Some(token) = parser.peek() {
            return Err(LabelExpressionError::new(format!(
                "Unexpected token after expression: '{token}'"
            )));
        }

        Ok(expression)
    }

    /// Evaluate against a labels map
    #[must_use]
    pub fn evaluate(&self, labels: &Labels) -> bool {
        match self {
            Self::Equals { key, value } => labels.get(key) == Some(value),
            Self::NotEquals { key, value } => labels.get(key) != Some(value),
            Self::Not(inner) => !inner.evaluate(labels),
            Self::And(lhs, rhs) => lhs.evaluate(labels) && rhs.evaluate(labels),
            Self::Or(lhs, rhs) => lhs.evaluate(labels) || rhs.evaluate(labels),
        }
    }

    /// Evaluate against any label-bearing entity
    #[must_use]
    pub fn matches<E: LabelsAware + ?Sized>(&self, entity: &E) -> bool {
        self.evaluate(entity.labels())
    }

    /// Keep only the entities this expression matches
    pub fn filter<E: LabelsAware>(&self, items: impl IntoIterator<Item = E>) -> Vec<E> {
        items.into_iter().filter(|item| self.matches(item)).collect()
    }
}

impl FromStr for LabelExpression {
    type Err = LabelExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for LabelExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals { key, value } => write!(f, "{key}={value}"),
            Self::NotEquals { key, value } => write!(f, "{key}!={value}"),
            Self::Not(inner) => write!(f, "!{inner}"),
            Self::And(lhs, rhs) => write!(f, "({lhs} & {rhs})"),
            Self::Or(lhs, rhs) => write!(f, "({lhs} | {rhs})"),
        }
    }
}

fn sanitize(input: &str) -> Result<&str, LabelExpressionError> {
    if input.chars().count() > MAX_EXPRESSION_LENGTH {
        return Err(LabelExpressionError::new(format!(
            "Expression string too long (max {MAX_EXPRESSION_LENGTH} characters)"
        )));
    }

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(LabelExpressionError::new("Expression string cannot be empty"));
    }

    if !ALLOWED_CHARS.is_match(input) {
        return Err(LabelExpressionError::new(
            "Expression contains invalid characters. Only alphanumeric, operators (&|!=), \
             parentheses, hyphen, underscore, dot and slash are allowed",
        ));
    }

    Ok(trimmed)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    And,
    Or,
    Not,
    Equals,
    NotEquals,
    LParen,
    RParen,
    Identifier(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => f.write_str("&"),
            Self::Or => f.write_str("|"),
            Self::Not => f.write_str("!"),
            Self::Equals => f.write_str("="),
            Self::NotEquals => f.write_str("!="),
            Self::LParen => f.write_str("("),
            Self::RParen => f.write_str(")"),
            Self::Identifier(ident) => f.write_str(ident),
        }
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/')
}

fn tokenize(input: &str) -> Result<Vec<Token>, LabelExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let token = match c {
            '&' => Token::And,
            '|' => Token::Or,
            '=' => Token::Equals,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::NotEquals);
                } else {
                    tokens.push(Token::Not);
                }
                continue;
            }
            c if is_identifier_char(c) => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if !is_identifier_char(c) {
                        break;
                    }
                    ident.push(c);
                    chars.next();
                }
                tokens.push(Token::Identifier(ident));
                continue;
            }
            other => {
                return Err(LabelExpressionError::new(format!(
                    "Unexpected character: '{other}'"
                )));
            }
        };

        chars.next();
        tokens.push(token);
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn matches(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<LabelExpression, LabelExpressionError> {
        let mut lhs = self.parse_and()?;
        while self.matches(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = LabelExpression::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<LabelExpression, LabelExpressionError> {
        let mut lhs = self.parse_not()?;
        while self.matches(&Token::And) {
            let rhs = self.parse_not()?;
            lhs = LabelExpression::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<LabelExpression, LabelExpressionError> {
        if self.matches(&Token::Not) {
            let inner = self.parse_not()?;
            return Ok(LabelExpression::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<LabelExpression, LabelExpressionError> {
        if self.matches(&Token::LParen) {
            let inner = self.parse_or()?;
            if !self.matches(&Token::RParen) {
                return Err(match self.peek() {
                    Some(token) => LabelExpressionError::new(format!(
                        "Expected ')' after expression but got '{token}'"
                    )),
                    None => LabelExpressionError::new("Expected ')' after expression (end of input)"),
                });
            }
            return Ok(inner);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<LabelExpression, LabelExpressionError> {
        let key = self.identifier("Expected label key")?;

        if self.matches(&Token::Equals) {
            let value = self.identifier("Expected label value after '='")?;
            Ok(LabelExpression::Equals { key, value })
        } else if self.matches(&Token::NotEquals) {
            let value = self.identifier("Expected label value after '!='")?;
            Ok(LabelExpression::NotEquals { key, value })
        } else {
            Err(LabelExpressionError::new(format!(
                "Expected '=' or '!=' after label key '{key}'"
            )))
        }
    }

    fn identifier(&mut self, context: &str) -> Result<String, LabelExpressionError> {
        match self.tokens.get(self.position) {
            Some(Token::Identifier(ident)) => {
                let ident = ident.clone();
                self.position += 1;
                Ok(ident)
            }
            Some(other) => Err(LabelExpressionError::new(format!(
                "{context} but got '{other}'"
            ))),
            None => Err(LabelExpressionError::new(format!("{context} (end of input)"))),
        }
    }
}
