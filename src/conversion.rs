//! Type conversion registry for turning loosely-typed JSON values into the
//! scalar types declared on schema attributes.
//!
//! Rules are keyed by a directed `(SourceKind, ScalarKind)` pair. When several
//! rules could handle a value, the one with the most specific source kind
//! wins (an `Integer` rule beats a `Number` rule, which beats an `Any` rule).

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::value::{DocumentReference, ScalarKind, Value};

/// Error type for conversion operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("no converter registered from {from} to {to}")]
    NoConverterFound { from: SourceKind, to: ScalarKind },

    #[error("cannot convert '{value}' to {to}: {reason}")]
    InvalidValue {
        value: String,
        to: ScalarKind,
        reason: String,
    },
}

/// Runtime type of a JSON source value, as seen by conversion rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Matches every non-null value
    Any,
    Boolean,
    /// Matches both integers and floats
    Number,
    Integer,
    Float,
    String,
    Array,
    Object,
}

impl SourceKind {
    /// Most specific kind of a JSON value; `None` for null.
    pub fn of(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Null => None,
            JsonValue::Bool(_) => Some(SourceKind::Boolean),
            JsonValue::Number(n) if n.is_i64() || n.is_u64() => Some(SourceKind::Integer),
            JsonValue::Number(_) => Some(SourceKind::Float),
            JsonValue::String(_) => Some(SourceKind::String),
            JsonValue::Array(_) => Some(SourceKind::Array),
            JsonValue::Object(_) => Some(SourceKind::Object),
        }
    }

    /// Whether a rule declared for `self` can take a value of kind `actual`.
    pub fn accepts(self, actual: SourceKind) -> bool {
        match self {
            SourceKind::Any => true,
            SourceKind::Number => matches!(
                actual,
                SourceKind::Number | SourceKind::Integer | SourceKind::Float
            ),
            kind => kind == actual,
        }
    }

    fn specificity(self) -> u8 {
        match self {
            SourceKind::Any => 0,
            SourceKind::Number => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Any => "any",
            SourceKind::Boolean => "boolean",
            SourceKind::Number => "number",
            SourceKind::Integer => "integer",
            SourceKind::Float => "float",
            SourceKind::String => "string",
            SourceKind::Array => "array",
            SourceKind::Object => "object",
        };
        write!(f, "{}", name)
    }
}

/// A single directed conversion.
pub trait Converter: Send + Sync {
    fn convert(&self, value: &JsonValue) -> Result<Value, ConversionError>;
}

impl<F> Converter for F
where
    F: Fn(&JsonValue) -> Result<Value, ConversionError> + Send + Sync,
{
    fn convert(&self, value: &JsonValue) -> Result<Value, ConversionError> {
        self(value)
    }
}

#[derive(Clone)]
struct ConversionRule {
    from: SourceKind,
    to: ScalarKind,
    converter: Arc<dyn Converter>,
}

/// Registry of conversion rules.
///
/// The registry is an ordinary value: build one, register rules on it and
/// hand it to an [`EntityMapper`](crate::EntityMapper).
#[derive(Clone)]
pub struct ConversionRegistry {
    rules: Vec<ConversionRule>,
}

impl ConversionRegistry {
    /// Create a registry without any rules
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Create a registry holding the builtin rules.
    pub fn with_builtin_rules() -> Self {
        let mut registry = Self::new();
        registry.register(SourceKind::Number, ScalarKind::Decimal, Box::new(number_to_decimal));
        registry.register(SourceKind::String, ScalarKind::Decimal, Box::new(string_to_decimal));
        registry.register(SourceKind::String, ScalarKind::Integer, Box::new(string_to_integer));
        registry.register(SourceKind::String, ScalarKind::Boolean, Box::new(string_to_boolean));
        registry.register(SourceKind::String, ScalarKind::Date, Box::new(string_to_date));
        registry.register(SourceKind::String, ScalarKind::Time, Box::new(string_to_time));
        registry.register(SourceKind::Object, ScalarKind::Document, Box::new(object_to_document));
        registry
    }

    /// Register a conversion rule, replacing any rule for the same pair.
    ///
    /// # Example
    ///
    /// ```
    /// use caseschema::{ConversionRegistry, ScalarKind, SourceKind, Value};
    /// use serde_json::json;
    ///
    /// let mut registry = ConversionRegistry::new();
    /// registry.register(
    ///     SourceKind::Number,
    ///     ScalarKind::String,
    ///     Box::new(|value: &serde_json::Value| Ok(Value::String(value.to_string()))),
    /// );
    /// assert_eq!(registry.convert(&json!(42), ScalarKind::String).unwrap(), Value::from("42"));
    /// ```
    pub fn register(&mut self, from: SourceKind, to: ScalarKind, converter: Box<dyn Converter>) {
        let rule = ConversionRule {
            from,
            to,
            converter: Arc::from(converter),
        };
        match self.rules.iter_mut().find(|r| r.from == from && r.to == to) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
    }

    /// Check if a rule is registered for exactly this pair
    pub fn has_rule(&self, from: SourceKind, to: ScalarKind) -> bool {
        self.rules.iter().any(|r| r.from == from && r.to == to)
    }

    /// Registered `(source, target)` pairs in registration order.
    pub fn rules(&self) -> Vec<(SourceKind, ScalarKind)> {
        self.rules.iter().map(|r| (r.from, r.to)).collect()
    }

    /// Convert `value` into the scalar type `target`.
    ///
    /// Null always converts to [`Value::Null`]. Values whose JSON type
    /// already is the target type are taken as they are.
    pub fn convert(&self, value: &JsonValue, target: ScalarKind) -> Result<Value, ConversionError> {
        let Some(kind) = SourceKind::of(value) else {
            return Ok(Value::Null);
        };

        if let Some(native) = native_value(value, target) {
            return Ok(native);
        }

        let rule = self
            .rules
            .iter()
            .filter(|r| r.to == target && r.from.accepts(kind))
            .max_by_key(|r| r.from.specificity())
            .ok_or(ConversionError::NoConverterFound {
                from: kind,
                to: target,
            })?;

        rule.converter.convert(value)
    }
}

impl Default for ConversionRegistry {
    fn default() -> Self {
        Self::with_builtin_rules()
    }
}

impl fmt::Debug for ConversionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionRegistry")
            .field("rules", &self.rules())
            .finish()
    }
}

fn native_value(value: &JsonValue, target: ScalarKind) -> Option<Value> {
    match (value, target) {
        (JsonValue::String(s), ScalarKind::String) => Some(Value::String(s.clone())),
        (JsonValue::Bool(b), ScalarKind::Boolean) => Some(Value::Boolean(*b)),
        (JsonValue::Number(n), ScalarKind::Integer) => n.as_i64().map(Value::Integer),
        _ => None,
    }
}

fn invalid(value: &str, to: ScalarKind, reason: impl fmt::Display) -> ConversionError {
    ConversionError::InvalidValue {
        value: value.to_string(),
        to,
        reason: reason.to_string(),
    }
}

/// Borrow the string of a JSON string value; rules registered for strings
/// never see anything else.
fn source_str(value: &JsonValue) -> &str {
    value.as_str().unwrap_or_default()
}

fn number_to_decimal(value: &JsonValue) -> Result<Value, ConversionError> {
    let text = value.to_string();
    let decimal = match value {
        JsonValue::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => Ok(Decimal::from(i)),
            (_, Some(u), _) => Ok(Decimal::from(u)),
            // the shortest repr of the double is the exact value it carries;
            // digits beyond the decimal's 28-digit scale are rejected, not rounded
            (_, _, Some(f)) => Decimal::from_str_exact(&f.to_string())
                .map_err(|e| invalid(&text, ScalarKind::Decimal, e)),
            _ => Err(invalid(&text, ScalarKind::Decimal, "not a finite number")),
        },
        _ => Err(invalid(&text, ScalarKind::Decimal, "not a number")),
    }?;
    Ok(Value::Decimal(decimal))
}

fn string_to_decimal(value: &JsonValue) -> Result<Value, ConversionError> {
    let s = source_str(value);
    if s.is_empty() {
        return Ok(Value::Null);
    }
    Decimal::from_str_exact(s)
        .or_else(|_| Decimal::from_scientific(s))
        .map(Value::Decimal)
        .map_err(|e| invalid(s, ScalarKind::Decimal, e))
}

fn string_to_integer(value: &JsonValue) -> Result<Value, ConversionError> {
    let s = source_str(value);
    if s.is_empty() {
        return Ok(Value::Null);
    }
    s.parse::<i64>()
        .map(Value::Integer)
        .map_err(|e| invalid(s, ScalarKind::Integer, e))
}

fn string_to_boolean(value: &JsonValue) -> Result<Value, ConversionError> {
    let s = source_str(value);
    if s.is_empty() {
        return Ok(Value::Null);
    }
    match s.to_ascii_lowercase().as_str() {
        "true" | "yes" => Ok(Value::Boolean(true)),
        "false" | "no" => Ok(Value::Boolean(false)),
        _ => {
            tracing::warn!("Cannot read '{}' as a boolean, using null", s);
            Ok(Value::Null)
        }
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.date())
        })
}

fn string_to_date(value: &JsonValue) -> Result<Value, ConversionError> {
    let s = source_str(value);
    if s.is_empty() {
        return Ok(Value::Null);
    }
    match parse_date(s) {
        Some(date) => Ok(Value::Date(date)),
        None => {
            tracing::warn!("Cannot read '{}' as a date, using null", s);
            Ok(Value::Null)
        }
    }
}

fn string_to_time(value: &JsonValue) -> Result<Value, ConversionError> {
    let s = source_str(value);
    if s.is_empty() {
        return Ok(Value::Null);
    }
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map(Value::Time)
        .map_err(|e| invalid(s, ScalarKind::Time, e))
}

fn object_to_document(value: &JsonValue) -> Result<Value, ConversionError> {
    let document_id = value
        .get("documentId")
        .and_then(JsonValue::as_str)
        .and_then(|id| Uuid::parse_str(id).ok());

    let Some(document_id) = document_id else {
        tracing::error!("Document reference without a valid documentId: {}", value);
        return Ok(Value::Null);
    };

    let mut reference = DocumentReference::new(document_id);
    if let Some(filename) = value.get("filename").and_then(JsonValue::as_str) {
        reference = reference.with_filename(filename);
    }
    Ok(Value::Document(reference))
}
