//! Entities: mutable instances of a schema.
//!
//! An [`Entity`] keeps one [`Value`] per stored attribute of its
//! [`Schema`]. List attributes always hold a list (empty after construction),
//! computed attributes are never stored and are evaluated on every read.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use crate::expression::{self, ExpressionError};
use crate::path::{AttributePath, PathSegment};
use crate::schema::{AttributeDefinition, ComputedAttributeDefinition, Schema};
use crate::value::{AttributeType, FromValue, Value};

/// Error type for entity operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum EntityError {
    #[error("attribute '{attribute}' is not declared on schema '{schema}'")]
    UnknownAttribute { schema: String, attribute: String },

    #[error("attribute '{attribute}' on schema '{schema}' is computed and cannot be written")]
    ComputedAttributeWrite { schema: String, attribute: String },

    #[error("attribute '{attribute}' on schema '{schema}' is declared as {declared}, which is not a list")]
    NotAList {
        schema: String,
        attribute: String,
        declared: String,
    },

    #[error("attribute '{attribute}' on schema '{schema}' is declared as {declared} but got {actual}")]
    InvalidShape {
        schema: String,
        attribute: String,
        declared: String,
        actual: String,
    },

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("failed to compute attribute '{attribute}': {source}")]
    Expression {
        attribute: String,
        source: ExpressionError,
    },
}

/// A mutable instance of a [`Schema`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use caseschema::{AttributeType, Entity, ScalarKind, Schema, Value};
///
/// let schema = Schema::builder("person")
///     .attribute("firstName", AttributeType::Scalar(ScalarKind::String))
///     .attribute("lastName", AttributeType::Scalar(ScalarKind::String))
///     .computed_attribute(
///         "fullName",
///         AttributeType::Scalar(ScalarKind::String),
///         "concat(' ', firstName, lastName)",
///     )
///     .build()
///     .unwrap();
///
/// let mut person = Entity::new(Arc::new(schema));
/// person.set("firstName", "Thomas").unwrap();
/// person.set("lastName", "Anderson").unwrap();
/// assert_eq!(person.get("fullName").unwrap(), Value::from("Thomas Anderson"));
/// ```
#[derive(Debug, Clone)]
pub struct Entity {
    schema: Arc<Schema>,
    values: HashMap<String, Value>,
}

impl Entity {
    /// Create an entity with every list attribute set to an empty list and
    /// everything else unset.
    pub fn new(schema: Arc<Schema>) -> Self {
        let values = schema
            .attributes()
            .filter(|definition| definition.attribute_type().is_list())
            .map(|definition| (definition.name().to_string(), Value::List(Vec::new())))
            .collect();
        Self { schema, values }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Read an attribute. Computed attributes are evaluated; unset attributes
    /// read as [`Value::Null`].
    pub fn get(&self, name: &str) -> Result<Value, EntityError> {
        if let Some(computed) = self.schema.computed_attribute(name) {
            return self.compute(computed);
        }
        if self.schema.attribute(name).is_none() {
            return Err(self.unknown(name));
        }
        Ok(self.values.get(name).cloned().unwrap_or(Value::Null))
    }

    /// Borrow the stored value of a non-computed attribute.
    pub fn get_stored(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Overwrite a stored attribute.
    ///
    /// The value must match the declared shape: a list for list attributes,
    /// an entity of the referenced schema for nested attributes, and a scalar
    /// otherwise. `Null` clears a scalar or nested attribute and empties a
    /// list attribute.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), EntityError> {
        let schema = Arc::clone(&self.schema);
        let definition = self.writable(&schema, name)?;
        let value = check_shape(&schema, definition, value.into())?;
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Append to a list attribute.
    pub fn add(&mut self, name: &str, value: impl Into<Value>) -> Result<(), EntityError> {
        let schema = Arc::clone(&self.schema);
        let definition = self.writable(&schema, name)?;
        if !definition.attribute_type().is_list() {
            return Err(EntityError::NotAList {
                schema: schema.key().to_string(),
                attribute: name.to_string(),
                declared: definition.attribute_type().to_string(),
            });
        }
        let element = check_element(&schema, definition, value.into())?;

        match self
            .values
            .entry(name.to_string())
            .or_insert_with(|| Value::List(Vec::new()))
        {
            Value::List(items) => items.push(element),
            other => *other = Value::List(vec![element]),
        }
        Ok(())
    }

    /// Clear a stored attribute; list attributes go back to empty.
    pub fn unset(&mut self, name: &str) -> Result<(), EntityError> {
        let schema = Arc::clone(&self.schema);
        let definition = self.writable(&schema, name)?;
        if definition.attribute_type().is_list() {
            self.values.insert(name.to_string(), Value::List(Vec::new()));
        } else {
            self.values.remove(name);
        }
        Ok(())
    }

    /// Resolve a path such as `emails[0].email` and cast the result.
    ///
    /// Returns `Ok(None)` when the path ends at (or passes through) an unset
    /// value.
    pub fn get_by_path<T: FromValue>(&self, path: &str) -> Result<Option<T>, EntityError> {
        let parsed = AttributePath::parse(path).map_err(|e| EntityError::InvalidPath {
            path: path.to_string(),
            reason: e.reason,
        })?;

        let value = self.resolve_path(&parsed)?.into_owned();
        if value.is_null() {
            return Ok(None);
        }

        let actual = value.type_name();
        T::from_value(value).map(Some).ok_or_else(|| EntityError::InvalidPath {
            path: path.to_string(),
            reason: format!("expected {}, found {}", T::TYPE_NAME, actual),
        })
    }

    /// Evaluate every computed attribute, in declaration order.
    pub fn computed_values(&self) -> Result<Vec<(String, Value)>, EntityError> {
        self.schema
            .computed_attributes()
            .map(|computed| Ok((computed.name().to_string(), self.compute(computed)?)))
            .collect()
    }

    /// Persisted form: stored attributes only, in declaration order.
    pub fn to_json_map(&self) -> Map<String, JsonValue> {
        self.schema
            .attributes()
            .filter_map(|definition| {
                self.values
                    .get(definition.name())
                    .map(|value| (definition.name().to_string(), value.to_json()))
            })
            .collect()
    }

    /// Walk a path through nested entities and lists.
    pub(crate) fn resolve_path(&self, path: &AttributePath) -> Result<Cow<'_, Value>, EntityError> {
        let mut segments = path.segments().iter();
        let mut current = match segments.next() {
            Some(PathSegment::Attribute(name)) => self.lookup(name, path)?,
            _ => return Err(invalid_path(path, "a path must start with an attribute name".to_string())),
        };

        for segment in segments {
            if current.is_null() {
                return Ok(Cow::Owned(Value::Null));
            }
            current = match segment {
                PathSegment::Attribute(name) => step_attribute(current, name, path)?,
                PathSegment::Index(index) => step_index(current, *index, path)?,
            };
        }
        Ok(current)
    }

    fn lookup(&self, name: &str, path: &AttributePath) -> Result<Cow<'_, Value>, EntityError> {
        if let Some(computed) = self.schema.computed_attribute(name) {
            return self.compute(computed).map(Cow::Owned);
        }
        if self.schema.attribute(name).is_none() {
            return Err(invalid_path(
                path,
                format!("'{}' is not declared on schema '{}'", name, self.schema.key()),
            ));
        }
        Ok(self
            .values
            .get(name)
            .map_or(Cow::Owned(Value::Null), Cow::Borrowed))
    }

    fn compute(&self, computed: &ComputedAttributeDefinition) -> Result<Value, EntityError> {
        expression::evaluate(computed.expression(), self).map_err(|source| {
            EntityError::Expression {
                attribute: computed.name().to_string(),
                source,
            }
        })
    }

    fn writable<'s>(&self, schema: &'s Schema, name: &str) -> Result<&'s AttributeDefinition, EntityError> {
        if schema.is_computed(name) {
            return Err(EntityError::ComputedAttributeWrite {
                schema: schema.key().to_string(),
                attribute: name.to_string(),
            });
        }
        schema.attribute(name).ok_or_else(|| self.unknown(name))
    }

    fn unknown(&self, name: &str) -> EntityError {
        EntityError::UnknownAttribute {
            schema: self.schema.key().to_string(),
            attribute: name.to_string(),
        }
    }
}

fn invalid_path(path: &AttributePath, reason: String) -> EntityError {
    EntityError::InvalidPath {
        path: path.to_string(),
        reason,
    }
}

fn step_attribute<'a>(
    current: Cow<'a, Value>,
    name: &str,
    path: &AttributePath,
) -> Result<Cow<'a, Value>, EntityError> {
    match current {
        Cow::Borrowed(Value::Entity(child)) => child.lookup(name, path),
        Cow::Owned(Value::Entity(child)) => Ok(Cow::Owned(child.lookup(name, path)?.into_owned())),
        other => Err(invalid_path(
            path,
            format!("cannot read '{}' from a {} value", name, other.type_name()),
        )),
    }
}

fn step_index<'a>(
    current: Cow<'a, Value>,
    index: usize,
    path: &AttributePath,
) -> Result<Cow<'a, Value>, EntityError> {
    let out_of_range = |len: usize| {
        invalid_path(
            path,
            format!("index {} is out of range for a list of {}", index, len),
        )
    };

    match current {
        Cow::Borrowed(Value::List(items)) => items
            .get(index)
            .map(Cow::Borrowed)
            .ok_or_else(|| out_of_range(items.len())),
        Cow::Owned(Value::List(mut items)) => {
            if index < items.len() {
                Ok(Cow::Owned(items.swap_remove(index)))
            } else {
                Err(out_of_range(items.len()))
            }
        }
        other => Err(invalid_path(
            path,
            format!("cannot index into a {} value", other.type_name()),
        )),
    }
}

fn shape_error(schema: &Schema, definition: &AttributeDefinition, actual: String) -> EntityError {
    EntityError::InvalidShape {
        schema: schema.key().to_string(),
        attribute: definition.name().to_string(),
        declared: definition.attribute_type().to_string(),
        actual,
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Entity(entity) => format!("Entity<{}>", entity.schema().key()),
        other => other.type_name().to_string(),
    }
}

fn check_shape(
    schema: &Schema,
    definition: &AttributeDefinition,
    value: Value,
) -> Result<Value, EntityError> {
    match (definition.attribute_type(), value) {
        (AttributeType::List(_) | AttributeType::EntityList(_), Value::Null) => Ok(Value::List(Vec::new())),
        (AttributeType::List(_) | AttributeType::EntityList(_), Value::List(items)) => {
            let items = items
                .into_iter()
                .map(|item| check_element(schema, definition, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::List(items))
        }
        (_, Value::Null) => Ok(Value::Null),
        (AttributeType::Entity(key), Value::Entity(entity)) if entity.schema().key() == key => {
            Ok(Value::Entity(entity))
        }
        (AttributeType::Scalar(_), value) if value.is_scalar() => Ok(value),
        (_, value) => Err(shape_error(schema, definition, describe(&value))),
    }
}

fn check_element(
    schema: &Schema,
    definition: &AttributeDefinition,
    element: Value,
) -> Result<Value, EntityError> {
    match (definition.attribute_type(), element) {
        (AttributeType::EntityList(key), Value::Entity(entity)) if entity.schema().key() == key => {
            Ok(Value::Entity(entity))
        }
        (AttributeType::List(_), value) if value.is_scalar() => Ok(value),
        (_, value) => Err(shape_error(
            schema,
            definition,
            format!("an element of type {}", describe(&value)),
        )),
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        (Arc::ptr_eq(&self.schema, &other.schema) || self.schema == other.schema)
            && self.values == other.values
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json_map().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ScalarKind;
    use serde_json::json;

    fn string() -> AttributeType {
        AttributeType::Scalar(ScalarKind::String)
    }

    fn person_schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder("person")
                .attribute("firstName", string())
                .attribute("lastName", string())
                .attribute("tags", AttributeType::List(ScalarKind::String))
                .computed_attribute("fullName", string(), "concat(' ', firstName, lastName)")
                .build()
                .unwrap(),
        )
    }

    fn address_schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder("address")
                .attribute("street", string())
                .attribute("city", string())
                .build()
                .unwrap(),
        )
    }

    fn email_schema() -> Arc<Schema> {
        Arc::new(Schema::builder("email").attribute("email", string()).build().unwrap())
    }

    fn contact_schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder("contact")
                .attribute("name", string())
                .attribute("address", AttributeType::Entity("address".to_string()))
                .attribute("emails", AttributeType::EntityList("email".to_string()))
                .computed_attribute(
                    "fullAddress",
                    string(),
                    "concat(', ', address.street, address.city)",
                )
                .build()
                .unwrap(),
        )
    }

    fn contact() -> Entity {
        let mut address = Entity::new(address_schema());
        address.set("city", "New York").unwrap();

        let mut first = Entity::new(email_schema());
        first.set("email", "neo@example.com").unwrap();
        let mut second = Entity::new(email_schema());
        second.set("email", "thomas@example.com").unwrap();

        let mut contact = Entity::new(contact_schema());
        contact.set("name", "Thomas").unwrap();
        contact.set("address", address).unwrap();
        contact.add("emails", first).unwrap();
        contact.add("emails", second).unwrap();
        contact
    }

    #[test]
    fn test_new_initializes_lists() {
        let person = Entity::new(person_schema());

        assert_eq!(person.get("tags").unwrap(), Value::List(vec![]));
        assert_eq!(person.get("firstName").unwrap(), Value::Null);
        assert!(!person.is_set("firstName"));
        assert!(person.is_set("tags"));
    }

    #[test]
    fn test_computed_attribute_recomputes_on_read() {
        let mut person = Entity::new(person_schema());
        person.set("firstName", "Thomas").unwrap();
        person.set("lastName", "Anderson").unwrap();
        assert_eq!(person.get("fullName").unwrap(), Value::from("Thomas Anderson"));

        person.set("lastName", Value::Null).unwrap();
        assert_eq!(person.get("fullName").unwrap(), Value::from("Thomas"));
    }

    #[test]
    fn test_computed_attribute_is_read_only() {
        let mut person = Entity::new(person_schema());

        for value in [Value::from("Neo"), Value::Null, Value::Integer(1)] {
            assert!(matches!(
                person.set("fullName", value),
                Err(EntityError::ComputedAttributeWrite { .. })
            ));
        }
        assert!(matches!(
            person.add("fullName", "x"),
            Err(EntityError::ComputedAttributeWrite { .. })
        ));
        assert!(!person.is_set("fullName"));
    }

    #[test]
    fn test_unknown_attribute() {
        let mut person = Entity::new(person_schema());

        assert!(matches!(
            person.set("nickname", "Neo"),
            Err(EntityError::UnknownAttribute { attribute, .. }) if attribute == "nickname"
        ));
        assert!(matches!(person.get("nickname"), Err(EntityError::UnknownAttribute { .. })));
    }

    #[test]
    fn test_add_requires_list_attribute() {
        let mut person = Entity::new(person_schema());

        person.add("tags", "vip").unwrap();
        person.add("tags", "pending").unwrap();
        assert_eq!(
            person.get("tags").unwrap(),
            Value::List(vec![Value::from("vip"), Value::from("pending")])
        );

        assert!(matches!(
            person.add("firstName", "x"),
            Err(EntityError::NotAList { .. })
        ));
    }

    #[test]
    fn test_set_checks_shape() {
        let mut person = Entity::new(person_schema());

        assert!(matches!(
            person.set("firstName", Value::List(vec![])),
            Err(EntityError::InvalidShape { .. })
        ));
        assert!(matches!(
            person.set("tags", "single"),
            Err(EntityError::InvalidShape { .. })
        ));

        let mut contact = Entity::new(contact_schema());
        let wrong = Entity::new(email_schema());
        assert!(matches!(
            contact.set("address", wrong),
            Err(EntityError::InvalidShape { actual, .. }) if actual == "Entity<email>"
        ));
    }

    #[test]
    fn test_set_null_on_list_empties_it() {
        let mut person = Entity::new(person_schema());
        person.add("tags", "vip").unwrap();
        person.set("tags", Value::Null).unwrap();

        assert_eq!(person.get("tags").unwrap(), Value::List(vec![]));
    }

    #[test]
    fn test_unset() {
        let mut person = Entity::new(person_schema());
        person.set("firstName", "Thomas").unwrap();
        person.add("tags", "vip").unwrap();

        person.unset("firstName").unwrap();
        person.unset("tags").unwrap();

        assert!(!person.is_set("firstName"));
        assert_eq!(person.get("tags").unwrap(), Value::List(vec![]));
    }

    #[test]
    fn test_get_by_path_through_nested_entities() {
        let contact = contact();

        assert_eq!(
            contact.get_by_path::<String>("address.city").unwrap(),
            Some("New York".to_string())
        );
        assert_eq!(
            contact.get_by_path::<String>("emails[0].email").unwrap(),
            Some("neo@example.com".to_string())
        );
        assert_eq!(
            contact.get_by_path::<String>("emails[1].email").unwrap(),
            Some("thomas@example.com".to_string())
        );
        assert_eq!(contact.get_by_path::<String>("address.street").unwrap(), None);
    }

    #[test]
    fn test_get_by_path_failures() {
        let contact = contact();

        for path in ["emails[5].email", "address.zip", "name.first", "name[0]", "emails.email", "bogus"] {
            assert!(
                matches!(contact.get_by_path::<Value>(path), Err(EntityError::InvalidPath { .. })),
                "expected '{}' to be an invalid path",
                path
            );
        }
        assert!(matches!(
            contact.get_by_path::<i64>("address.city"),
            Err(EntityError::InvalidPath { reason, .. }) if reason == "expected Integer, found String"
        ));
    }

    #[test]
    fn test_get_by_path_through_unset_entity() {
        let contact = Entity::new(contact_schema());
        assert_eq!(contact.get_by_path::<String>("address.city").unwrap(), None);
    }

    #[test]
    fn test_computed_attribute_reads_nested_entity() {
        let mut contact = contact();
        assert_eq!(contact.get("fullAddress").unwrap(), Value::from("New York"));

        let mut address = Entity::new(address_schema());
        address.set("street", "Main Street 1").unwrap();
        address.set("city", "Springfield").unwrap();
        contact.set("address", address).unwrap();

        assert_eq!(
            contact.get("fullAddress").unwrap(),
            Value::from("Main Street 1, Springfield")
        );
    }

    #[test]
    fn test_sandbox_violation_on_every_read() {
        let schema = Arc::new(
            Schema::builder("shady")
                .computed_attribute("x", string(), "T(some.arbitrary.Type).staticMethod()")
                .build()
                .unwrap(),
        );
        let entity = Entity::new(schema);

        for _ in 0..3 {
            assert!(matches!(
                entity.get("x"),
                Err(EntityError::Expression {
                    source: ExpressionError::SandboxViolation { .. },
                    ..
                })
            ));
        }
    }

    #[test]
    fn test_equality_ignores_computed_and_uses_stored_values() {
        let schema = person_schema();
        let mut a = Entity::new(Arc::clone(&schema));
        let mut b = Entity::new(Arc::clone(&schema));
        assert_eq!(a, b);

        a.set("firstName", "Thomas").unwrap();
        assert_ne!(a, b);
        b.set("firstName", "Thomas").unwrap();
        assert_eq!(a, b);

        let rebuilt = Entity::new(person_schema());
        assert_eq!(Entity::new(schema), rebuilt);
    }

    #[test]
    fn test_to_json_map_excludes_computed() {
        let contact = contact();

        assert_eq!(
            JsonValue::Object(contact.to_json_map()),
            json!({
                "name": "Thomas",
                "address": {"city": "New York"},
                "emails": [{"email": "neo@example.com"}, {"email": "thomas@example.com"}]
            })
        );
        assert_eq!(serde_json::to_value(&contact).unwrap()["name"], json!("Thomas"));
    }

    #[test]
    fn test_computed_values() {
        let mut person = Entity::new(person_schema());
        person.set("firstName", "Thomas").unwrap();

        let computed = person.computed_values().unwrap();
        assert_eq!(computed, vec![("fullName".to_string(), Value::from("Thomas"))]);
    }
}
