//! # caseschema: Dynamic Schemas and Entities
//!
//! caseschema lets the shape of a business object be declared as data and
//! then works with instances of that shape at runtime.
//!
//! ## Features
//!
//! - **Schemas as data**: attributes, nested entity references, list attributes
//!   and computed attributes declared in YAML/JSON documents or through a builder
//! - **Entities**: mutable instances validated against their schema on every write
//! - **Computed attributes**: read-only, re-evaluated on each read by a sandboxed
//!   expression language (attribute paths plus a closed set of builtin functions)
//! - **Conversion registry**: pluggable rules turning loosely-typed JSON into
//!   typed scalar values
//! - **Generic maps**: lossless conversion of entities to and from nested JSON
//!   maps for persistence
//!
//! ## Example: Schema document
//!
//! ```yaml
//! key: person
//! attributes:
//!   - name: firstName
//!     type: String
//!   - name: lastName
//!     type: String
//!   - name: emails
//!     type: List
//!     entitySchema: email
//! computedAttributes:
//!   - name: fullName
//!     type: String
//!     expression: "concat(' ', firstName, lastName)"
//! ```
//!
//! ## Example: Reading a generic map
//!
//! ```
//! use caseschema::{EntityMapper, SchemaDefinition, Schema, SchemaRegistry, Value};
//! use serde_json::json;
//!
//! let definition = SchemaDefinition::from_yaml_str(
//!     "key: person\n\
//!      attributes:\n  - name: firstName\n    type: String\n  - name: lastName\n    type: String\n\
//!      computedAttributes:\n  - name: fullName\n    type: String\n    expression: \"concat(' ', firstName, lastName)\"\n",
//! )
//! .unwrap();
//!
//! let mut registry = SchemaRegistry::new();
//! let person = registry.register(Schema::from_definition(definition).unwrap()).unwrap();
//!
//! let entity = EntityMapper::default()
//!     .from_json_value(person, &json!({"firstName": "Thomas", "lastName": "Anderson"}), &registry)
//!     .unwrap();
//! assert_eq!(entity.get("fullName").unwrap(), Value::from("Thomas Anderson"));
//! ```

// Core model
pub mod value;
pub mod attribute_config;
pub mod schema;
pub mod path;
pub mod entity;
pub mod expression;

// Persistence boundary
pub mod conversion;
pub mod mapper;
pub mod registry;
pub mod serialization;

pub mod config;

pub use attribute_config::{
    AttributeConfiguration, AttributeConfigurationKind, ConfigurationVariant,
    DocumentClassifierConfig, DocumentProcessingConfig,
};
pub use config::{ConfigError, ModelConfig};
pub use conversion::{ConversionError, ConversionRegistry, Converter, SourceKind};
pub use entity::{Entity, EntityError};
pub use expression::{Builtin, Expression, ExpressionError};
pub use mapper::{EntityMapper, MappingError, SchemaLookup};
pub use path::{AttributePath, PathSegment, PathSyntaxError};
pub use registry::{RegistryError, SchemaRegistry, UnresolvedReference};
pub use schema::{
    AttributeDefinition, AttributeSpec, AuditInfo, ComputedAttributeDefinition,
    ComputedAttributeSpec, Schema, SchemaBuilder, SchemaDefinition, SchemaError,
};
pub use serialization::{JsonArrayWriter, NdjsonWriter, SerializationError};
pub use value::{AttributeType, DocumentReference, FromValue, ScalarKind, Value};
