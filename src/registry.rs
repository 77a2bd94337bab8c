//! In-memory schema registry.
//!
//! Holds built schemas by key and serves as the [`SchemaLookup`] handed to
//! the mapper. Schemas can be registered directly or loaded from a directory
//! of YAML/JSON schema documents.

use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::mapper::SchemaLookup;
use crate::schema::{Schema, SchemaDefinition, SchemaError};

/// Error type for registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid schema in {}: {source}", .path.display())]
    Schema { path: PathBuf, source: SchemaError },

    #[error("schema '{0}' is already registered")]
    Duplicate(String),

    #[error("schema directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),
}

/// A nested-entity reference whose schema is not registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    pub schema: String,
    pub attribute: String,
    pub missing: String,
}

/// Registry of schemas keyed by schema key.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: IndexMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema; keys must be unique.
    pub fn register(&mut self, schema: impl Into<Arc<Schema>>) -> Result<Arc<Schema>, RegistryError> {
        let schema = schema.into();
        if self.schemas.contains_key(schema.key()) {
            return Err(RegistryError::Duplicate(schema.key().to_string()));
        }
        tracing::debug!("Registered schema '{}'", schema.key());
        self.schemas.insert(schema.key().to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    pub fn get(&self, key: &str) -> Option<Arc<Schema>> {
        self.schemas.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.schemas.contains_key(key)
    }

    /// Registered keys in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Load one schema document. YAML and JSON are both accepted.
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<Arc<Schema>, RegistryError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).map_err(|e| RegistryError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let definition = SchemaDefinition::from_yaml_str(&content).map_err(|e| RegistryError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        let schema = Schema::from_definition(definition).map_err(|source| RegistryError::Schema {
            path: path.to_path_buf(),
            source,
        })?;

        self.register(schema)
    }

    /// Load every `*.yaml`, `*.yml` and `*.json` file in `dir`, in file name
    /// order. Returns the number of schemas loaded.
    pub fn load_dir<P: AsRef<Path>>(&mut self, dir: P) -> Result<usize, RegistryError> {
        let dir_path = dir.as_ref();

        if !dir_path.is_dir() {
            return Err(RegistryError::MissingDirectory(dir_path.to_path_buf()));
        }

        let io_error = |e: std::io::Error| RegistryError::Io {
            path: dir_path.to_path_buf(),
            source: e,
        };

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir_path).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            let is_schema = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| matches!(ext, "yaml" | "yml" | "json"));
            if is_schema && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        for path in &paths {
            self.load_file(path)?;
        }

        tracing::info!("Loaded {} schemas from {}", paths.len(), dir_path.display());
        Ok(paths.len())
    }

    /// Nested-entity references that point at schemas not in the registry.
    pub fn unresolved_references(&self) -> Vec<UnresolvedReference> {
        self.schemas
            .values()
            .flat_map(|schema| {
                schema
                    .related_schemas()
                    .iter()
                    .filter(|(_, target)| !self.schemas.contains_key(target.as_str()))
                    .map(|(attribute, target)| UnresolvedReference {
                        schema: schema.key().to_string(),
                        attribute: attribute.clone(),
                        missing: target.clone(),
                    })
            })
            .collect()
    }
}

impl SchemaLookup for SchemaRegistry {
    fn lookup_schema(&self, key: &str) -> Option<Arc<Schema>> {
        self.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{AttributeType, ScalarKind};
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = SchemaRegistry::new();
        let schema = Schema::builder("email")
            .attribute("email", AttributeType::Scalar(ScalarKind::String))
            .build()
            .unwrap();

        registry.register(schema.clone()).unwrap();

        assert!(registry.contains("email"));
        assert_eq!(registry.get("email").as_deref(), Some(&schema));
        assert!(registry.get("other").is_none());
        assert!(matches!(
            registry.register(schema),
            Err(RegistryError::Duplicate(key)) if key == "email"
        ));
    }

    #[test]
    fn test_load_dir_reads_yaml_and_json() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "contact.yaml",
            "key: contact\nattributes:\n  - name: address\n    type: Entity\n    entitySchema: address\n",
        );
        write(
            temp_dir.path(),
            "address.json",
            r#"{"key": "address", "attributes": [{"name": "city", "type": "String"}]}"#,
        );
        write(temp_dir.path(), "README.md", "not a schema");

        let mut registry = SchemaRegistry::new();
        let loaded = registry.load_dir(temp_dir.path()).unwrap();

        assert_eq!(loaded, 2);
        assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["address", "contact"]);
        assert!(registry.unresolved_references().is_empty());
    }

    #[test]
    fn test_unresolved_references() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "contact.yml",
            "key: contact\nattributes:\n  - name: emails\n    type: List\n    entitySchema: email\n",
        );

        let mut registry = SchemaRegistry::new();
        registry.load_dir(temp_dir.path()).unwrap();

        assert_eq!(
            registry.unresolved_references(),
            vec![UnresolvedReference {
                schema: "contact".to_string(),
                attribute: "emails".to_string(),
                missing: "email".to_string(),
            }]
        );
    }

    #[test]
    fn test_load_errors() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "broken.yaml", "key: [unclosed");
        let mut registry = SchemaRegistry::new();
        match registry.load_dir(temp_dir.path()) {
            Err(err @ RegistryError::Parse { .. }) => {
                let source = std::error::Error::source(&err);
                assert!(source.and_then(|s| s.downcast_ref::<serde_yaml::Error>()).is_some());
            }
            other => panic!("expected a parse error, got {:?}", other),
        }

        let err = SchemaRegistry::new()
            .load_file(temp_dir.path().join("absent.yaml"))
            .unwrap_err();
        let io = std::error::Error::source(&err)
            .and_then(|s| s.downcast_ref::<std::io::Error>())
            .unwrap();
        assert_eq!(io.kind(), std::io::ErrorKind::NotFound);

        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "money.yaml",
            "key: invoice\nattributes:\n  - name: total\n    type: Money\n",
        );
        assert!(matches!(
            SchemaRegistry::new().load_dir(temp_dir.path()),
            Err(RegistryError::Schema { source: SchemaError::UnsupportedType { .. }, .. })
        ));

        assert!(matches!(
            SchemaRegistry::new().load_dir(temp_dir.path().join("missing")),
            Err(RegistryError::MissingDirectory(_))
        ));
    }
}
