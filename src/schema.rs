//! Schema definitions: the structural type of an entity.
//!
//! A [`Schema`] is built once (through [`SchemaBuilder`] or from a
//! [`SchemaDefinition`] document) and is immutable afterwards. Entities share
//! it through an `Arc`; no entity owns its schema.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use uuid::Uuid;

use crate::attribute_config::{
    AttributeConfiguration, AttributeConfigurationKind, ConfigurationVariant,
};
use crate::expression::Expression;
use crate::value::{AttributeType, ScalarKind};

/// Error raised while building a schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("schema key must not be empty")]
    EmptyKey,

    #[error("schema '{schema}' declares an attribute with an empty name")]
    EmptyAttributeName { schema: String },

    #[error("schema '{schema}' declares attribute '{attribute}' more than once")]
    DuplicateAttribute { schema: String, attribute: String },

    #[error("attribute '{attribute}' on schema '{schema}' is declared both as stored and as computed")]
    NameCollision { schema: String, attribute: String },

    #[error("attribute '{attribute}' on schema '{schema}' references a nested schema with an empty key")]
    EmptySchemaReference { schema: String, attribute: String },

    #[error("attribute '{attribute}' on schema '{schema}' has unsupported type '{type_name}'")]
    UnsupportedType {
        schema: String,
        attribute: String,
        type_name: String,
    },

    #[error("attribute '{attribute}' on schema '{schema}' of type '{type_name}' requires '{field}'")]
    MissingTypeParameter {
        schema: String,
        attribute: String,
        type_name: String,
        field: &'static str,
    },

    #[error("schema '{schema}' configures undeclared attribute '{attribute}'")]
    ConfigurationForUnknownAttribute { schema: String, attribute: String },

    #[error("computed attributes on schema '{schema}' form a cycle: {}", .cycle.join(" -> "))]
    ComputedCycle { schema: String, cycle: Vec<String> },
}

/// A stored (non-computed) attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeDefinition {
    name: String,
    attribute_type: AttributeType,
}

impl AttributeDefinition {
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute_type(&self) -> &AttributeType {
        &self.attribute_type
    }
}

/// A read-only attribute derived from an expression on every read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComputedAttributeDefinition {
    name: String,
    attribute_type: AttributeType,
    expression: String,
}

impl ComputedAttributeDefinition {
    pub fn new(
        name: impl Into<String>,
        attribute_type: AttributeType,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            attribute_type,
            expression: expression.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute_type(&self) -> &AttributeType {
        &self.attribute_type
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

/// Who created and last changed a schema, and when.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditInfo {
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub last_updated_by: Option<String>,
    #[serde(default)]
    pub created_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_updated_timestamp: Option<DateTime<Utc>>,
}

/// Immutable structural type of an entity.
#[derive(Debug, Clone)]
pub struct Schema {
    id: Option<Uuid>,
    key: String,
    name: String,
    description: Option<String>,
    attributes: IndexMap<String, AttributeDefinition>,
    computed_attributes: IndexMap<String, ComputedAttributeDefinition>,
    related_schemas: BTreeMap<String, String>,
    attribute_configurations: BTreeMap<String, Vec<AttributeConfiguration>>,
    audit: AuditInfo,
}

impl Schema {
    pub fn builder(key: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(key)
    }

    /// Build a schema from its source document.
    pub fn from_definition(definition: SchemaDefinition) -> Result<Self, SchemaError> {
        let key = definition.key;
        let mut builder = SchemaBuilder::new(key.clone()).audit(definition.audit);
        if let Some(id) = definition.id {
            builder = builder.id(id);
        }
        if let Some(name) = definition.name {
            builder = builder.name(name);
        }
        if let Some(description) = definition.description {
            builder = builder.description(description);
        }

        for spec in definition.attributes {
            let attribute_type = resolve_type(
                &key,
                &spec.name,
                &spec.type_name,
                spec.content_type.as_deref(),
                spec.entity_schema.as_deref(),
            )?;
            for config in spec.attribute_configurations {
                builder = builder.configuration(spec.name.clone(), config);
            }
            builder = builder.attribute(spec.name, attribute_type);
        }

        for spec in definition.computed_attributes {
            let attribute_type = resolve_type(
                &key,
                &spec.name,
                &spec.type_name,
                spec.content_type.as_deref(),
                spec.entity_schema.as_deref(),
            )?;
            builder = builder.computed_attribute(spec.name, attribute_type, spec.expression);
        }

        builder.build()
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn audit(&self) -> &AuditInfo {
        &self.audit
    }

    /// Stored attributes in declaration order.
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDefinition> {
        self.attributes.values()
    }

    pub fn computed_attributes(&self) -> impl Iterator<Item = &ComputedAttributeDefinition> {
        self.computed_attributes.values()
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDefinition> {
        self.attributes.get(name)
    }

    pub fn computed_attribute(&self, name: &str) -> Option<&ComputedAttributeDefinition> {
        self.computed_attributes.get(name)
    }

    /// Whether `name` is declared, either stored or computed.
    pub fn is_declared(&self, name: &str) -> bool {
        self.attributes.contains_key(name) || self.computed_attributes.contains_key(name)
    }

    pub fn is_computed(&self, name: &str) -> bool {
        self.computed_attributes.contains_key(name)
    }

    /// Nested-entity references: attribute name to schema key.
    pub fn related_schemas(&self) -> &BTreeMap<String, String> {
        &self.related_schemas
    }

    pub fn related_schema(&self, attribute: &str) -> Option<&str> {
        self.related_schemas.get(attribute).map(String::as_str)
    }

    pub fn attribute_configurations(&self) -> &BTreeMap<String, Vec<AttributeConfiguration>> {
        &self.attribute_configurations
    }

    /// Configurations of `attribute` that are of the requested kind.
    pub fn attribute_configurations_for(
        &self,
        attribute: &str,
        kind: AttributeConfigurationKind,
    ) -> Vec<&AttributeConfiguration> {
        self.attribute_configurations
            .get(attribute)
            .map(|configs| configs.iter().filter(|c| c.applies_to(kind)).collect())
            .unwrap_or_default()
    }

    /// Typed variant of [`Schema::attribute_configurations_for`].
    pub fn configurations_of<T: ConfigurationVariant>(&self, attribute: &str) -> Vec<&T> {
        self.attribute_configurations_for(attribute, T::KIND)
            .into_iter()
            .filter_map(T::from_configuration)
            .collect()
    }
}

// Structural equality over identity, declared attributes (order-sensitive),
// nested references, configurations and audit fields.
impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.key == other.key
            && self.description == other.description
            && self.attributes.iter().eq(other.attributes.iter())
            && self.related_schemas == other.related_schemas
            && self.attribute_configurations == other.attribute_configurations
            && self.audit == other.audit
    }
}

impl Eq for Schema {}

impl Hash for Schema {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.key.hash(state);
        self.description.hash(state);
        for definition in self.attributes.values() {
            definition.hash(state);
        }
        self.related_schemas.hash(state);
        self.attribute_configurations.hash(state);
        self.audit.hash(state);
    }
}

/// Builder for [`Schema`].
///
/// # Example
///
/// ```
/// use caseschema::{AttributeType, ScalarKind, Schema};
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
/// assert!(schema.is_computed("fullName"));
/// ```
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    id: Option<Uuid>,
    key: String,
    name: Option<String>,
    description: Option<String>,
    attributes: Vec<AttributeDefinition>,
    computed_attributes: Vec<ComputedAttributeDefinition>,
    configurations: Vec<(String, AttributeConfiguration)>,
    audit: AuditInfo,
}

impl SchemaBuilder {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            id: None,
            key: key.into(),
            name: None,
            description: None,
            attributes: Vec::new(),
            computed_attributes: Vec::new(),
            configurations: Vec::new(),
            audit: AuditInfo::default(),
        }
    }

    pub fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    /// Display name; defaults to the key.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn audit(mut self, audit: AuditInfo) -> Self {
        self.audit = audit;
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, attribute_type: AttributeType) -> Self {
        self.attributes.push(AttributeDefinition::new(name, attribute_type));
        self
    }

    pub fn computed_attribute(
        mut self,
        name: impl Into<String>,
        attribute_type: AttributeType,
        expression: impl Into<String>,
    ) -> Self {
        self.computed_attributes
            .push(ComputedAttributeDefinition::new(name, attribute_type, expression));
        self
    }

    pub fn configuration(
        mut self,
        attribute: impl Into<String>,
        configuration: impl Into<AttributeConfiguration>,
    ) -> Self {
        self.configurations.push((attribute.into(), configuration.into()));
        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        if self.key.is_empty() {
            return Err(SchemaError::EmptyKey);
        }
        let key = self.key;

        let mut attributes = IndexMap::new();
        let mut related_schemas = BTreeMap::new();
        for definition in self.attributes {
            check_name(&key, definition.name())?;
            check_reference(&key, definition.name(), definition.attribute_type())?;
            if let Some(target) = definition.attribute_type().schema_key() {
                related_schemas.insert(definition.name().to_string(), target.to_string());
            }
            if attributes.contains_key(definition.name()) {
                return Err(SchemaError::DuplicateAttribute {
                    schema: key,
                    attribute: definition.name().to_string(),
                });
            }
            attributes.insert(definition.name().to_string(), definition);
        }

        let mut computed_attributes = IndexMap::new();
        for definition in self.computed_attributes {
            check_name(&key, definition.name())?;
            check_reference(&key, definition.name(), definition.attribute_type())?;
            if attributes.contains_key(definition.name()) {
                return Err(SchemaError::NameCollision {
                    schema: key,
                    attribute: definition.name().to_string(),
                });
            }
            if computed_attributes.contains_key(definition.name()) {
                return Err(SchemaError::DuplicateAttribute {
                    schema: key,
                    attribute: definition.name().to_string(),
                });
            }
            computed_attributes.insert(definition.name().to_string(), definition);
        }

        let mut attribute_configurations: BTreeMap<String, Vec<AttributeConfiguration>> =
            BTreeMap::new();
        for (attribute, configuration) in self.configurations {
            if !attributes.contains_key(&attribute) && !computed_attributes.contains_key(&attribute)
            {
                return Err(SchemaError::ConfigurationForUnknownAttribute {
                    schema: key,
                    attribute,
                });
            }
            attribute_configurations
                .entry(attribute)
                .or_default()
                .push(configuration);
        }

        if let Some(cycle) = find_computed_cycle(&computed_attributes) {
            return Err(SchemaError::ComputedCycle { schema: key, cycle });
        }

        tracing::debug!(
            "Built schema '{}' with {} attributes and {} computed attributes",
            key,
            attributes.len(),
            computed_attributes.len()
        );

        Ok(Schema {
            id: self.id,
            name: self.name.unwrap_or_else(|| key.clone()),
            key,
            description: self.description,
            attributes,
            computed_attributes,
            related_schemas,
            attribute_configurations,
            audit: self.audit,
        })
    }
}

fn check_name(schema: &str, name: &str) -> Result<(), SchemaError> {
    if name.is_empty() {
        return Err(SchemaError::EmptyAttributeName {
            schema: schema.to_string(),
        });
    }
    Ok(())
}

fn check_reference(
    schema: &str,
    name: &str,
    attribute_type: &AttributeType,
) -> Result<(), SchemaError> {
    if attribute_type.schema_key() == Some("") {
        return Err(SchemaError::EmptySchemaReference {
            schema: schema.to_string(),
            attribute: name.to_string(),
        });
    }
    Ok(())
}

/// Depth-first search over computed attributes that read other computed
/// attributes of the same schema. Expressions that do not parse are skipped
/// here; they fail when evaluated.
fn find_computed_cycle(
    computed: &IndexMap<String, ComputedAttributeDefinition>,
) -> Option<Vec<String>> {
    let edges: HashMap<&str, Vec<&str>> = computed
        .iter()
        .map(|(name, definition)| {
            let targets = Expression::parse(definition.expression())
                .map(|expression| {
                    expression
                        .referenced_paths()
                        .into_iter()
                        .filter_map(|path| computed.get_key_value(path.root()))
                        .map(|(target, _)| target.as_str())
                        .collect()
                })
                .unwrap_or_default();
            (name.as_str(), targets)
        })
        .collect();

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        node: &'a str,
        edges: &HashMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        match marks.get(node) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(node.to_string());
                return Some(cycle);
            }
            None => {}
        }

        marks.insert(node, Mark::Visiting);
        stack.push(node);
        for &next in edges.get(node).map(Vec::as_slice).unwrap_or_default() {
            if let Some(cycle) = visit(next, edges, marks, stack) {
                return Some(cycle);
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    let mut stack = Vec::new();
    computed
        .keys()
        .find_map(|name| visit(name.as_str(), &edges, &mut marks, &mut stack))
}

/// Resolve an attribute's declared type from the fields of a source document.
fn resolve_type(
    schema: &str,
    attribute: &str,
    type_name: &str,
    content_type: Option<&str>,
    entity_schema: Option<&str>,
) -> Result<AttributeType, SchemaError> {
    let missing = |field: &'static str| SchemaError::MissingTypeParameter {
        schema: schema.to_string(),
        attribute: attribute.to_string(),
        type_name: type_name.to_string(),
        field,
    };
    let unsupported = |name: &str| SchemaError::UnsupportedType {
        schema: schema.to_string(),
        attribute: attribute.to_string(),
        type_name: name.to_string(),
    };

    match type_name {
        "Entity" => entity_schema
            .map(|key| AttributeType::Entity(key.to_string()))
            .ok_or_else(|| missing("entitySchema")),
        "List" => match (content_type, entity_schema) {
            (Some("Entity") | None, Some(key)) => Ok(AttributeType::EntityList(key.to_string())),
            (Some("Entity"), None) => Err(missing("entitySchema")),
            (Some(content), _) => ScalarKind::from_name(content)
                .map(AttributeType::List)
                .ok_or_else(|| unsupported(content)),
            (None, None) => Err(missing("contentType")),
        },
        other => ScalarKind::from_name(other)
            .map(AttributeType::Scalar)
            .ok_or_else(|| unsupported(other)),
    }
}

/// Source document of a schema, as stored outside the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDefinition {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeSpec>,
    #[serde(default)]
    pub computed_attributes: Vec<ComputedAttributeSpec>,
    #[serde(flatten)]
    pub audit: AuditInfo,
}

impl SchemaDefinition {
    /// Parse a YAML (or JSON) schema document.
    pub fn from_yaml_str(source: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(source)
    }
}

/// Stored attribute entry of a [`SchemaDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeSpec {
    pub name: String,
    /// Scalar type name, `List` or `Entity`
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub entity_schema: Option<String>,
    #[serde(default)]
    pub attribute_configurations: Vec<AttributeConfiguration>,
}

/// Computed attribute entry of a [`SchemaDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedAttributeSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub entity_schema: Option<String>,
    pub expression: String,
}
