//! Per-attribute configuration attached to schema attributes.
//!
//! Configurations do not influence how values are stored. They are hints read
//! by consumers (e.g. which classifier processes an uploaded document) and
//! are looked up by kind.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Document classifier that should process values of the attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentClassifierConfig {
    pub classifier_name: String,
}

/// Document processor that should process values of the attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentProcessingConfig {
    pub processor_id: String,
}

/// Closed set of attribute configurations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AttributeConfiguration {
    DocumentClassifier(DocumentClassifierConfig),
    DocumentProcessing(DocumentProcessingConfig),
}

/// Discriminant of [`AttributeConfiguration`], used to filter by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeConfigurationKind {
    DocumentClassifier,
    DocumentProcessing,
}

impl fmt::Display for AttributeConfigurationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeConfigurationKind::DocumentClassifier => write!(f, "documentClassifier"),
            AttributeConfigurationKind::DocumentProcessing => write!(f, "documentProcessing"),
        }
    }
}

impl AttributeConfiguration {
    pub fn kind(&self) -> AttributeConfigurationKind {
        match self {
            AttributeConfiguration::DocumentClassifier(_) => {
                AttributeConfigurationKind::DocumentClassifier
            }
            AttributeConfiguration::DocumentProcessing(_) => {
                AttributeConfigurationKind::DocumentProcessing
            }
        }
    }

    /// Whether this configuration is of the requested kind.
    pub fn applies_to(&self, kind: AttributeConfigurationKind) -> bool {
        self.kind() == kind
    }
}

impl From<DocumentClassifierConfig> for AttributeConfiguration {
    fn from(config: DocumentClassifierConfig) -> Self {
        AttributeConfiguration::DocumentClassifier(config)
    }
}

impl From<DocumentProcessingConfig> for AttributeConfiguration {
    fn from(config: DocumentProcessingConfig) -> Self {
        AttributeConfiguration::DocumentProcessing(config)
    }
}

/// Typed view onto one variant of [`AttributeConfiguration`].
///
/// ```
/// use caseschema::{AttributeConfiguration, ConfigurationVariant, DocumentClassifierConfig};
///
/// let config = AttributeConfiguration::from(DocumentClassifierConfig {
///     classifier_name: "identity".to_string(),
/// });
/// let classifier = DocumentClassifierConfig::from_configuration(&config).unwrap();
/// assert_eq!(classifier.classifier_name, "identity");
/// ```
pub trait ConfigurationVariant {
    const KIND: AttributeConfigurationKind;

    fn from_configuration(config: &AttributeConfiguration) -> Option<&Self>;
}

impl ConfigurationVariant for DocumentClassifierConfig {
    const KIND: AttributeConfigurationKind = AttributeConfigurationKind::DocumentClassifier;

    fn from_configuration(config: &AttributeConfiguration) -> Option<&Self> {
        match config {
            AttributeConfiguration::DocumentClassifier(inner) => Some(inner),
            _ => None,
        }
    }
}

impl ConfigurationVariant for DocumentProcessingConfig {
    const KIND: AttributeConfigurationKind = AttributeConfigurationKind::DocumentProcessing;

    fn from_configuration(config: &AttributeConfiguration) -> Option<&Self> {
        match config {
            AttributeConfiguration::DocumentProcessing(inner) => Some(inner),
            _ => None,
        }
    }
}
