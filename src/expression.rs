//! Expression language for computed attributes.
//!
//! The language is deliberately small: an expression is a literal, an
//! attribute path read from the owning entity (`address.city`,
//! `emails[0].email`), or a call to one of the [`Builtin`] functions. There is
//! no way to name a type, call a method on a value, or reach anything other
//! than the entity graph being evaluated; such expressions fail with
//! [`ExpressionError::SandboxViolation`] every time they are evaluated.
//!
//! ```text
//! expression := literal | path | call
//! call       := IDENT '(' [expression (',' expression)*] ')'
//! path       := IDENT ('.' IDENT | '[' INTEGER ']')*
//! literal    := STRING | INTEGER | 'null' | 'true' | 'false'
//! ```

use std::borrow::Cow;
use std::fmt;

use crate::entity::{Entity, EntityError};
use crate::path::{is_identifier_char, AttributePath, PathSegment};
use crate::value::Value;

/// Deepest nesting of function calls an expression may use.
pub const MAX_DEPTH: usize = 64;

/// Error raised while parsing or evaluating an expression.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExpressionError {
    #[error("expression '{expression}' leaves the sandbox: {reason}")]
    SandboxViolation { expression: String, reason: String },

    #[error("expression '{expression}' is malformed at offset {offset}: {reason}")]
    Syntax {
        expression: String,
        offset: usize,
        reason: String,
    },

    #[error("argument {index} of {function}() is invalid: {reason}")]
    InvalidArgument {
        function: &'static str,
        index: usize,
        reason: String,
    },

    #[error("failed to read '{path}': {source}")]
    Resolution {
        path: String,
        source: Box<EntityError>,
    },
}

/// Closed table of functions callable from expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// `concat(delimiter, value...)`: joins the non-null values with the
    /// delimiter, dropping null arguments.
    Concat,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "concat" => Some(Builtin::Concat),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Concat => "concat",
        }
    }

    fn apply(self, args: Vec<Value>) -> Result<Value, ExpressionError> {
        match self {
            Builtin::Concat => concat(args),
        }
    }
}

fn concat(args: Vec<Value>) -> Result<Value, ExpressionError> {
    let invalid = |index: usize, reason: String| ExpressionError::InvalidArgument {
        function: Builtin::Concat.name(),
        index,
        reason,
    };

    let mut args = args.into_iter();
    let delimiter = match args.next() {
        None => return Err(invalid(0, "a delimiter is required".to_string())),
        Some(Value::Null) => return Err(invalid(0, "the delimiter must not be null".to_string())),
        Some(value) if !value.is_scalar() => {
            return Err(invalid(0, format!("expected a string, got {}", value.type_name())))
        }
        Some(value) => value.to_string(),
    };

    let mut parts = Vec::new();
    for (offset, value) in args.enumerate() {
        match value {
            Value::Null => {}
            value if value.is_scalar() => parts.push(value.to_string()),
            value => {
                return Err(invalid(
                    offset + 1,
                    format!("expected a scalar, got {}", value.type_name()),
                ))
            }
        }
    }

    Ok(Value::String(parts.join(&delimiter)))
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Path(AttributePath),
    Call {
        function: Builtin,
        args: Vec<Expression>,
    },
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            source,
            tokens,
            position: 0,
            depth: 0,
        };
        let expression = parser.expression()?;
        match parser.peek() {
            (Token::End, _) => Ok(expression),
            (token, offset) => Err(parser.syntax(offset, format!("unexpected {}", token))),
        }
    }

    /// Evaluate against `entity`, the only data source an expression can see.
    pub fn evaluate(&self, entity: &Entity) -> Result<Value, ExpressionError> {
        match self {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Path(path) => entity
                .resolve_path(path)
                .map(Cow::into_owned)
                .map_err(|source| ExpressionError::Resolution {
                    path: path.to_string(),
                    source: Box::new(source),
                }),
            Expression::Call { function, args } => {
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(entity))
                    .collect::<Result<Vec<_>, _>>()?;
                function.apply(values)
            }
        }
    }

    /// Every attribute path read by the expression.
    pub fn referenced_paths(&self) -> Vec<&AttributePath> {
        match self {
            Expression::Literal(_) => Vec::new(),
            Expression::Path(path) => vec![path],
            Expression::Call { args, .. } => {
                args.iter().flat_map(Expression::referenced_paths).collect()
            }
        }
    }
}

/// Parse and evaluate `source` against `entity`.
pub fn evaluate(source: &str, entity: &Entity) -> Result<Value, ExpressionError> {
    tracing::debug!("Evaluating '{}' on schema '{}'", source, entity.schema().key());
    Expression::parse(source)?.evaluate(entity)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Identifier(String),
    String(String),
    Integer(i64),
    Dot,
    Comma,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    End,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Identifier(name) => write!(f, "identifier '{}'", name),
            Token::String(s) => write!(f, "string '{}'", s),
            Token::Integer(i) => write!(f, "integer {}", i),
            Token::Dot => write!(f, "'.'"),
            Token::Comma => write!(f, "','"),
            Token::OpenParen => write!(f, "'('"),
            Token::CloseParen => write!(f, "')'"),
            Token::OpenBracket => write!(f, "'['"),
            Token::CloseBracket => write!(f, "']'"),
            Token::End => write!(f, "end of expression"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '.' | ',' | '(' | ')' | '[' | ']' => {
                chars.next();
                let token = match c {
                    '.' => Token::Dot,
                    ',' => Token::Comma,
                    '(' => Token::OpenParen,
                    ')' => Token::CloseParen,
                    '[' => Token::OpenBracket,
                    _ => Token::CloseBracket,
                };
                tokens.push((token, offset));
            }
            '\'' | '"' => {
                chars.next();
                let mut literal = String::new();
                let mut closed = false;
                while let Some((_, next)) = chars.next() {
                    if next == c {
                        // a doubled quote is an escaped quote
                        if matches!(chars.peek(), Some(&(_, q)) if q == c) {
                            chars.next();
                            literal.push(c);
                            continue;
                        }
                        closed = true;
                        break;
                    }
                    literal.push(next);
                }
                if !closed {
                    return Err(ExpressionError::Syntax {
                        expression: source.to_string(),
                        offset,
                        reason: "unterminated string literal".to_string(),
                    });
                }
                tokens.push((Token::String(literal), offset));
            }
            c if c.is_ascii_digit() || c == '-' => {
                chars.next();
                let mut digits = c.to_string();
                while let Some(&(_, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                let value = digits.parse::<i64>().map_err(|_| ExpressionError::Syntax {
                    expression: source.to_string(),
                    offset,
                    reason: format!("'{}' is not an integer", digits),
                })?;
                tokens.push((Token::Integer(value), offset));
            }
            c if is_identifier_char(c) => {
                let mut name = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if !is_identifier_char(d) {
                        break;
                    }
                    name.push(d);
                    chars.next();
                }
                tokens.push((Token::Identifier(name), offset));
            }
            other => {
                return Err(ExpressionError::SandboxViolation {
                    expression: source.to_string(),
                    reason: format!("'{}' at offset {} is not part of the expression language", other, offset),
                });
            }
        }
    }

    tokens.push((Token::End, source.len()));
    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<(Token, usize)>,
    position: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> (Token, usize) {
        self.tokens
            .get(self.position)
            .cloned()
            .unwrap_or((Token::End, self.source.len()))
    }

    fn advance(&mut self) -> (Token, usize) {
        let token = self.peek();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    fn syntax(&self, offset: usize, reason: String) -> ExpressionError {
        ExpressionError::Syntax {
            expression: self.source.to_string(),
            offset,
            reason,
        }
    }

    fn violation(&self, reason: String) -> ExpressionError {
        ExpressionError::SandboxViolation {
            expression: self.source.to_string(),
            reason,
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        match self.advance() {
            (token, _) if token == expected => Ok(()),
            (token, offset) => Err(self.syntax(offset, format!("expected {}, found {}", expected, token))),
        }
    }

    fn expression(&mut self) -> Result<Expression, ExpressionError> {
        match self.advance() {
            (Token::String(s), _) => Ok(Expression::Literal(Value::String(s))),
            (Token::Integer(i), _) => Ok(Expression::Literal(Value::Integer(i))),
            (Token::Identifier(name), _) => {
                if self.peek().0 == Token::OpenParen {
                    return self.call(name);
                }
                match name.as_str() {
                    "null" => Ok(Expression::Literal(Value::Null)),
                    "true" => Ok(Expression::Literal(Value::Boolean(true))),
                    "false" => Ok(Expression::Literal(Value::Boolean(false))),
                    "new" => Err(self.violation("object construction is not permitted".to_string())),
                    _ => self.path(name),
                }
            }
            (token, offset) => Err(self.syntax(offset, format!("unexpected {}", token))),
        }
    }

    fn call(&mut self, name: String) -> Result<Expression, ExpressionError> {
        let function = Builtin::lookup(&name)
            .ok_or_else(|| self.violation(format!("'{}' is not a built-in function", name)))?;
        self.expect(Token::OpenParen)?;

        if self.depth == MAX_DEPTH {
            return Err(self.violation(format!(
                "function calls nest deeper than {} levels",
                MAX_DEPTH
            )));
        }
        self.depth += 1;

        let mut args = Vec::new();
        if self.peek().0 != Token::CloseParen {
            loop {
                args.push(self.expression()?);
                match self.advance() {
                    (Token::Comma, _) => continue,
                    (Token::CloseParen, _) => break,
                    (token, offset) => {
                        return Err(self.syntax(offset, format!("expected ',' or ')', found {}", token)))
                    }
                }
            }
        } else {
            self.advance();
        }
        self.depth -= 1;

        if matches!(self.peek().0, Token::Dot | Token::OpenBracket) {
            return Err(self.violation(format!(
                "member access on the result of {}() is not permitted",
                function.name()
            )));
        }

        Ok(Expression::Call { function, args })
    }

    fn path(&mut self, root: String) -> Result<Expression, ExpressionError> {
        let mut segments = vec![PathSegment::Attribute(root)];
        loop {
            match self.peek().0 {
                Token::Dot => {
                    self.advance();
                    match self.advance() {
                        (Token::Identifier(name), _) => {
                            if self.peek().0 == Token::OpenParen {
                                return Err(self.violation(format!(
                                    "method invocation '{}()' is not permitted",
                                    name
                                )));
                            }
                            segments.push(PathSegment::Attribute(name));
                        }
                        (token, offset) => {
                            return Err(self.syntax(offset, format!("expected an attribute name, found {}", token)))
                        }
                    }
                }
                Token::OpenBracket => {
                    self.advance();
                    match self.advance() {
                        (Token::Integer(i), offset) => {
                            let index = usize::try_from(i).map_err(|_| {
                                self.syntax(offset, format!("{} is not a list index", i))
                            })?;
                            segments.push(PathSegment::Index(index));
                        }
                        (token, offset) => {
                            return Err(self.syntax(offset, format!("expected a list index, found {}", token)))
                        }
                    }
                    self.expect(Token::CloseBracket)?;
                }
                Token::OpenParen => {
                    return Err(self.violation("method invocation is not permitted".to_string()));
                }
                _ => break,
            }
        }
        Ok(Expression::Path(AttributePath::from_segments(segments)))
    }
}
