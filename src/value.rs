//! Attribute values and declared attribute types.
//!
//! A [`Value`] is what an [`Entity`](crate::Entity) stores per attribute: a
//! scalar, a list of values, or a nested entity. An [`AttributeType`] is what a
//! [`Schema`](crate::Schema) declares for an attribute, and decides which
//! values are acceptable and how they are converted at the persistence
//! boundary.

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as JsonValue};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::entity::Entity;

/// Scalar kinds an attribute can be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
    Time,
    Document,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 7] = [
        ScalarKind::String,
        ScalarKind::Integer,
        ScalarKind::Decimal,
        ScalarKind::Boolean,
        ScalarKind::Date,
        ScalarKind::Time,
        ScalarKind::Document,
    ];

    /// Name used in schema source documents.
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::String => "String",
            ScalarKind::Integer => "Integer",
            ScalarKind::Decimal => "Decimal",
            ScalarKind::Boolean => "Boolean",
            ScalarKind::Date => "Date",
            ScalarKind::Time => "Time",
            ScalarKind::Document => "Document",
        }
    }

    /// Look up a scalar kind by its source-document name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared type of an attribute.
///
/// Nested entity types refer to their schema by key, never by pointer, so
/// schemas that reference each other do not form ownership cycles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Scalar(ScalarKind),
    List(ScalarKind),
    Entity(String),
    EntityList(String),
}

impl AttributeType {
    pub fn is_list(&self) -> bool {
        matches!(self, AttributeType::List(_) | AttributeType::EntityList(_))
    }

    /// Key of the nested schema, for entity and list-of-entity attributes.
    pub fn schema_key(&self) -> Option<&str> {
        match self {
            AttributeType::Entity(key) | AttributeType::EntityList(key) => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::Scalar(kind) => write!(f, "{}", kind),
            AttributeType::List(kind) => write!(f, "List<{}>", kind),
            AttributeType::Entity(key) => write!(f, "Entity<{}>", key),
            AttributeType::EntityList(key) => write!(f, "List<Entity<{}>>", key),
        }
    }
}

/// Reference to a stored document, as attached to case data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReference {
    pub document_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl DocumentReference {
    pub fn new(document_id: Uuid) -> Self {
        Self {
            document_id,
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// A value held by an entity attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Integer(i64),
    Decimal(Decimal),
    Boolean(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    Document(DocumentReference),
    List(Vec<Value>),
    Entity(Box<Entity>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for everything except lists and nested entities.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::List(_) | Value::Entity(_))
    }

    /// Short name of the runtime variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::String(_) => "String",
            Value::Integer(_) => "Integer",
            Value::Decimal(_) => "Decimal",
            Value::Boolean(_) => "Boolean",
            Value::Date(_) => "Date",
            Value::Time(_) => "Time",
            Value::Document(_) => "Document",
            Value::List(_) => "List",
            Value::Entity(_) => "Entity",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Value::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// Render the value in its persisted JSON form.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Integer(i) => JsonValue::from(*i),
            Value::Decimal(d) => decimal_to_json(d),
            Value::Boolean(b) => JsonValue::Bool(*b),
            Value::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
            Value::Time(t) => JsonValue::String(t.to_string()),
            Value::Document(doc) => {
                let mut map = Map::new();
                map.insert(
                    "documentId".to_string(),
                    JsonValue::String(doc.document_id.to_string()),
                );
                if let Some(filename) = &doc.filename {
                    map.insert("filename".to_string(), JsonValue::String(filename.clone()));
                }
                JsonValue::Object(map)
            }
            Value::List(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Entity(entity) => JsonValue::Object(entity.to_json_map()),
        }
    }
}

/// Decimals are written as JSON numbers only when a double reproduces them
/// exactly; anything wider is written as a string so it reads back unchanged.
fn decimal_to_json(value: &Decimal) -> JsonValue {
    if value.fract().is_zero() {
        if let Some(i) = value.to_i64() {
            return JsonValue::from(i);
        }
    }

    let exact = value.to_f64().and_then(|f| {
        let reparsed = Decimal::from_str(&f.to_string()).ok()?;
        if reparsed == *value {
            Number::from_f64(f)
        } else {
            None
        }
    });

    match exact {
        Some(number) => JsonValue::Number(number),
        None => JsonValue::String(value.to_string()),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::String(s) => write!(f, "{}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Time(t) => write!(f, "{}", t),
            Value::Document(doc) => match &doc.filename {
                Some(filename) => write!(f, "{}", filename),
                None => write!(f, "{}", doc.document_id),
            },
            Value::List(_) | Value::Entity(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Decimal(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveTime> for Value {
    fn from(value: NaiveTime) -> Self {
        Value::Time(value)
    }
}

impl From<DocumentReference> for Value {
    fn from(value: DocumentReference) -> Self {
        Value::Document(value)
    }
}

impl From<Entity> for Value {
    fn from(value: Entity) -> Self {
        Value::Entity(Box::new(value))
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Typed extraction of a [`Value`], used by path lookups that name the type
/// they expect.
pub trait FromValue: Sized {
    /// Name reported when a value has the wrong runtime type.
    const TYPE_NAME: &'static str;

    /// Returns `None` when the value is not of this type.
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! impl_from_value {
    ($ty:ty, $name:literal, $variant:ident) => {
        impl FromValue for $ty {
            const TYPE_NAME: &'static str = $name;

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

impl_from_value!(String, "String", String);
impl_from_value!(i64, "Integer", Integer);
impl_from_value!(Decimal, "Decimal", Decimal);
impl_from_value!(bool, "Boolean", Boolean);
impl_from_value!(NaiveDate, "Date", Date);
impl_from_value!(NaiveTime, "Time", Time);
impl_from_value!(DocumentReference, "Document", Document);
impl_from_value!(Vec<Value>, "List", List);

impl FromValue for Entity {
    const TYPE_NAME: &'static str = "Entity";

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Entity(entity) => Some(*entity),
            _ => None,
        }
    }
}

impl FromValue for Value {
    const TYPE_NAME: &'static str = "Value";

    fn from_value(value: Value) -> Option<Self> {
        Some(value)
    }
}
