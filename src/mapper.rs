//! Conversion between entities and their generic (JSON map) form.
//!
//! The generic form holds one entry per stored attribute, nested entities as
//! nested maps and list attributes as arrays. Computed attributes never
//! appear in it.

use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

use crate::conversion::{ConversionError, ConversionRegistry};
use crate::entity::{Entity, EntityError};
use crate::schema::{AttributeDefinition, Schema};
use crate::value::{AttributeType, ScalarKind, Value};

/// Error type for mapping a generic map onto an entity
#[derive(Debug, Clone, thiserror::Error)]
pub enum MappingError {
    #[error("key '{key}' is not declared on schema '{schema}'")]
    UnknownKey { schema: String, key: String },

    #[error("attribute '{attribute}' on schema '{schema}' references schema '{key}', which could not be found")]
    MissingSchema {
        schema: String,
        attribute: String,
        key: String,
    },

    #[error("attribute '{attribute}' on schema '{schema}' is declared as {declared} but the source holds {actual}")]
    InvalidShape {
        schema: String,
        attribute: String,
        declared: String,
        actual: String,
    },

    #[error("attribute '{attribute}' on schema '{schema}': {source}")]
    Conversion {
        schema: String,
        attribute: String,
        source: ConversionError,
    },

    #[error("expected a JSON object for schema '{schema}', found {actual}")]
    NotAnObject { schema: String, actual: String },

    #[error(transparent)]
    Entity(#[from] EntityError),
}

/// Resolves nested schemas by key.
pub trait SchemaLookup {
    fn lookup_schema(&self, key: &str) -> Option<Arc<Schema>>;
}

impl<F> SchemaLookup for F
where
    F: Fn(&str) -> Option<Arc<Schema>>,
{
    fn lookup_schema(&self, key: &str) -> Option<Arc<Schema>> {
        self(key)
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// Maps entities to and from their generic form.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use caseschema::{AttributeType, EntityMapper, ScalarKind, Schema, Value};
/// use serde_json::json;
///
/// let schema = Arc::new(
///     Schema::builder("person")
///         .attribute("active", AttributeType::Scalar(ScalarKind::Boolean))
///         .build()
///         .unwrap(),
/// );
/// let map = json!({"active": "yes"});
///
/// let mapper = EntityMapper::default();
/// let no_nested = |_: &str| -> Option<Arc<Schema>> { None };
/// let entity = mapper
///     .from_generic_map(schema, map.as_object().unwrap(), &no_nested)
///     .unwrap();
/// assert_eq!(entity.get("active").unwrap(), Value::Boolean(true));
/// ```
#[derive(Debug, Clone, Default)]
pub struct EntityMapper {
    conversions: ConversionRegistry,
}

impl EntityMapper {
    pub fn new(conversions: ConversionRegistry) -> Self {
        Self { conversions }
    }

    pub fn conversions(&self) -> &ConversionRegistry {
        &self.conversions
    }

    /// Persisted form of `entity`.
    pub fn to_generic_map(&self, entity: &Entity) -> Map<String, JsonValue> {
        entity.to_json_map()
    }

    /// Build an entity of `schema` from a generic map, resolving nested
    /// schemas through `lookup`.
    pub fn from_generic_map<L: SchemaLookup + ?Sized>(
        &self,
        schema: Arc<Schema>,
        map: &Map<String, JsonValue>,
        lookup: &L,
    ) -> Result<Entity, MappingError> {
        let mut entity = Entity::new(Arc::clone(&schema));

        for (key, source) in map {
            let Some(definition) = schema.attribute(key) else {
                if schema.is_computed(key) {
                    tracing::debug!(
                        "Skipping computed attribute '{}' of schema '{}' in generic map",
                        key,
                        schema.key()
                    );
                    continue;
                }
                return Err(MappingError::UnknownKey {
                    schema: schema.key().to_string(),
                    key: key.clone(),
                });
            };

            let value = self.map_attribute(&schema, definition, source, lookup)?;
            entity.set(key, value)?;
        }

        Ok(entity)
    }

    /// Like [`EntityMapper::from_generic_map`] for any JSON value, which must
    /// be an object.
    pub fn from_json_value<L: SchemaLookup + ?Sized>(
        &self,
        schema: Arc<Schema>,
        value: &JsonValue,
        lookup: &L,
    ) -> Result<Entity, MappingError> {
        match value {
            JsonValue::Object(map) => self.from_generic_map(schema, map, lookup),
            other => Err(MappingError::NotAnObject {
                schema: schema.key().to_string(),
                actual: json_kind(other).to_string(),
            }),
        }
    }

    fn map_attribute<L: SchemaLookup + ?Sized>(
        &self,
        schema: &Schema,
        definition: &AttributeDefinition,
        source: &JsonValue,
        lookup: &L,
    ) -> Result<Value, MappingError> {
        let shape_error = |actual: &JsonValue| MappingError::InvalidShape {
            schema: schema.key().to_string(),
            attribute: definition.name().to_string(),
            declared: definition.attribute_type().to_string(),
            actual: json_kind(actual).to_string(),
        };

        match definition.attribute_type() {
            AttributeType::Scalar(kind) => match source {
                JsonValue::Array(_) => Err(shape_error(source)),
                _ => self.map_scalar(schema, definition, source, *kind),
            },
            AttributeType::Entity(key) => match source {
                JsonValue::Null => Ok(Value::Null),
                JsonValue::Object(map) => {
                    self.map_nested(schema, definition, key, map, lookup)
                }
                other => Err(shape_error(other)),
            },
            AttributeType::List(kind) => match source {
                JsonValue::Null => Ok(Value::List(Vec::new())),
                JsonValue::Array(items) => items
                    .iter()
                    .map(|item| match item {
                        JsonValue::Array(_) => Err(shape_error(item)),
                        _ => self.map_scalar(schema, definition, item, *kind),
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List),
                other => Err(shape_error(other)),
            },
            AttributeType::EntityList(key) => match source {
                JsonValue::Null => Ok(Value::List(Vec::new())),
                JsonValue::Array(items) => items
                    .iter()
                    .map(|item| match item {
                        JsonValue::Object(map) => {
                            self.map_nested(schema, definition, key, map, lookup)
                        }
                        other => Err(shape_error(other)),
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List),
                other => Err(shape_error(other)),
            },
        }
    }

    fn map_scalar(
        &self,
        schema: &Schema,
        definition: &AttributeDefinition,
        source: &JsonValue,
        kind: ScalarKind,
    ) -> Result<Value, MappingError> {
        self.conversions
            .convert(source, kind)
            .map_err(|source| MappingError::Conversion {
                schema: schema.key().to_string(),
                attribute: definition.name().to_string(),
                source,
            })
    }

    fn map_nested<L: SchemaLookup + ?Sized>(
        &self,
        schema: &Schema,
        definition: &AttributeDefinition,
        key: &str,
        map: &Map<String, JsonValue>,
        lookup: &L,
    ) -> Result<Value, MappingError> {
        let nested = lookup
            .lookup_schema(key)
            .ok_or_else(|| MappingError::MissingSchema {
                schema: schema.key().to_string(),
                attribute: definition.name().to_string(),
                key: key.to_string(),
            })?;
        let child = self.from_generic_map(nested, map, lookup)?;
        Ok(Value::Entity(Box::new(child)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::collections::HashMap;

    fn string() -> AttributeType {
        AttributeType::Scalar(ScalarKind::String)
    }

    struct Schemas(HashMap<String, Arc<Schema>>);

    impl SchemaLookup for Schemas {
        fn lookup_schema(&self, key: &str) -> Option<Arc<Schema>> {
            self.0.get(key).cloned()
        }
    }

    fn schemas() -> Schemas {
        let address = Schema::builder("address")
            .attribute("street", string())
            .attribute("city", string())
            .build()
            .unwrap();
        let email = Schema::builder("email")
            .attribute("email", string())
            .attribute("primary", AttributeType::Scalar(ScalarKind::Boolean))
            .build()
            .unwrap();
        let contact = Schema::builder("contact")
            .attribute("firstName", string())
            .attribute("lastName", string())
            .attribute("birthDate", AttributeType::Scalar(ScalarKind::Date))
            .attribute("income", AttributeType::Scalar(ScalarKind::Decimal))
            .attribute("tags", AttributeType::List(ScalarKind::String))
            .attribute("address", AttributeType::Entity("address".to_string()))
            .attribute("emails", AttributeType::EntityList("email".to_string()))
            .computed_attribute("fullName", string(), "concat(' ', firstName, lastName)")
            .build()
            .unwrap();

        Schemas(
            [address, email, contact]
                .into_iter()
                .map(|s| (s.key().to_string(), Arc::new(s)))
                .collect(),
        )
    }

    fn from_json(value: JsonValue) -> Result<Entity, MappingError> {
        let schemas = schemas();
        let contact = schemas.lookup_schema("contact").unwrap();
        EntityMapper::default().from_json_value(contact, &value, &schemas)
    }

    #[test]
    fn test_from_generic_map_converts_nested_values() {
        let entity = from_json(json!({
            "firstName": "Thomas",
            "lastName": "Anderson",
            "birthDate": "1971-09-13T00:00:00Z",
            "income": "1200.50",
            "tags": ["vip"],
            "address": {"street": "Main Street 1", "city": "Springfield"},
            "emails": [{"email": "neo@example.com", "primary": "yes"}]
        }))
        .unwrap();

        assert_eq!(entity.get("fullName").unwrap(), Value::from("Thomas Anderson"));
        assert_eq!(
            entity.get_by_path::<String>("address.city").unwrap(),
            Some("Springfield".to_string())
        );
        assert_eq!(entity.get_by_path::<bool>("emails[0].primary").unwrap(), Some(true));
        assert_eq!(
            entity.get("income").unwrap(),
            Value::Decimal(Decimal::new(120050, 2))
        );
    }

    #[test]
    fn test_unknown_key() {
        let result = from_json(json!({"firstName": "Thomas", "nickname": "Neo"}));
        assert!(matches!(
            result,
            Err(MappingError::UnknownKey { key, .. }) if key == "nickname"
        ));
    }

    #[test]
    fn test_computed_keys_are_skipped() {
        let entity = from_json(json!({"firstName": "Thomas", "fullName": "ignored"})).unwrap();
        assert_eq!(entity.get("fullName").unwrap(), Value::from("Thomas"));
    }

    #[test]
    fn test_missing_nested_schema() {
        let schemas = schemas();
        let contact = schemas.lookup_schema("contact").unwrap();
        let only_contact = |key: &str| (key == "contact").then(|| Arc::clone(&contact));

        let result = EntityMapper::default().from_json_value(
            Arc::clone(&contact),
            &json!({"address": {"city": "Springfield"}}),
            &only_contact,
        );
        assert!(matches!(
            result,
            Err(MappingError::MissingSchema { key, .. }) if key == "address"
        ));
    }

    #[test]
    fn test_shape_mismatches() {
        for source in [
            json!({"tags": "vip"}),
            json!({"firstName": ["Thomas"]}),
            json!({"address": ["Springfield"]}),
            json!({"emails": {"email": "neo@example.com"}}),
            json!({"emails": ["neo@example.com"]}),
            json!({"tags": [["nested"]]}),
        ] {
            assert!(
                matches!(from_json(source.clone()), Err(MappingError::InvalidShape { .. })),
                "expected {} to be rejected",
                source
            );
        }
    }

    #[test]
    fn test_conversion_errors_are_wrapped() {
        let result = from_json(json!({"income": "a lot"}));
        assert!(matches!(
            result,
            Err(MappingError::Conversion {
                source: ConversionError::InvalidValue { .. },
                ..
            })
        ));

        let result = from_json(json!({"birthDate": true}));
        assert!(matches!(
            result,
            Err(MappingError::Conversion {
                source: ConversionError::NoConverterFound { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_nulls() {
        let entity = from_json(json!({"tags": null, "address": null, "firstName": null})).unwrap();

        assert_eq!(entity.get("tags").unwrap(), Value::List(vec![]));
        assert_eq!(entity.get("address").unwrap(), Value::Null);
        assert!(entity.is_set("firstName"));
        assert_eq!(
            JsonValue::Object(EntityMapper::default().to_generic_map(&entity)),
            json!({"firstName": null, "tags": [], "address": null, "emails": []})
        );
    }

    #[test]
    fn test_not_an_object() {
        assert!(matches!(
            from_json(json!(["x"])),
            Err(MappingError::NotAnObject { .. })
        ));
    }

    #[test]
    fn test_round_trip_preserves_stored_values() {
        let source = json!({
            "firstName": "Thomas",
            "birthDate": "1971-09-13",
            "income": 1200.5,
            "tags": ["vip", "pending"],
            "address": {"city": "Springfield"},
            "emails": [{"email": "neo@example.com", "primary": false}]
        });
        let schemas = schemas();
        let contact = schemas.lookup_schema("contact").unwrap();
        let mapper = EntityMapper::default();

        let entity = mapper.from_json_value(Arc::clone(&contact), &source, &schemas).unwrap();
        let map = mapper.to_generic_map(&entity);
        let again = mapper.from_generic_map(contact, &map, &schemas).unwrap();

        assert_eq!(entity, again);
        assert!(!map.contains_key("fullName"));
    }
}
