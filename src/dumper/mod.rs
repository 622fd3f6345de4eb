//! Rendering rule collections to cache artifacts and back.
//!
//! A [`RuleCollectionDumper`] turns a [`RuleCollection`] into bytes and
//! restores those bytes as a [`CachedCollection`], the factory that rebuilds
//! the collection without going back to the source files.

mod binary;
mod yaml;

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use binary::BinaryDumper;
pub use yaml::YamlDumper;

use crate::types::RuleError;
use crate::{Rule, RuleCollection, TagMap};

/// Default name of the generated collection.
pub const DEFAULT_CLASS_NAME: &str = "ProjectRuleCollection";

/// Default name recorded as the generated collection's base.
pub const DEFAULT_BASE_CLASS_NAME: &str = "RuleCollection";

/// Errors raised while writing or reading a cache artifact.
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("failed to encode rule collection: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode rule collection: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("not a rulebook artifact: invalid magic bytes")]
    BadMagic,

    #[error("incompatible format version: artifact is v{artifact}, this build supports v{supported}")]
    IncompatibleVersion { artifact: u16, supported: u16 },

    #[error("integrity check failed: BLAKE3 checksum mismatch")]
    ChecksumMismatch,

    #[error("payload length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: u32, actual: usize },

    #[error("artifact is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Naming options recorded in a generated artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpOptions {
    pub class_name: String,
    pub base_class_name: String,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            class_name: DEFAULT_CLASS_NAME.to_owned(),
            base_class_name: DEFAULT_BASE_CLASS_NAME.to_owned(),
        }
    }
}

impl DumpOptions {
    #[must_use]
    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }
}

/// Serializes a [`RuleCollection`] into an artifact that restores without
/// re-reading source files.
pub trait RuleCollectionDumper: Send + Sync {
    /// File extension of the artifacts this dumper writes, without the dot.
    fn extension(&self) -> &'static str;

    /// # Errors
    ///
    /// Fails when the collection cannot be encoded.
    fn dump(&self, rules: &RuleCollection, options: &DumpOptions) -> Result<Vec<u8>, DumpError>;

    /// # Errors
    ///
    /// Fails when the artifact is corrupt or was written by an incompatible version.
    fn restore(&self, artifact: &[u8]) -> Result<CachedCollection, DumpError>;
}

/// One rule as declared in an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredRule {
    pub expression: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub tags: TagMap,
}

/// A restored artifact: the declared rules plus the names it was generated
/// under. [`build`](Self::build) reconstructs the collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedCollection {
    class_name: String,
    base_class_name: String,
    declared: IndexMap<String, DeclaredRule>,
}

impl CachedCollection {
    /// Capture the rules of `rules` under the names in `options`.
    #[must_use]
    pub fn from_collection(rules: &RuleCollection, options: &DumpOptions) -> Self {
        let declared = rules
            .iter()
            .map(|(name, rule)| {
                (
                    name.to_owned(),
                    DeclaredRule {
                        expression: rule.expression().to_owned(),
                        tags: rule.tags().clone(),
                    },
                )
            })
            .collect();
        Self {
            class_name: options.class_name.clone(),
            base_class_name: options.base_class_name.clone(),
            declared,
        }
    }

    pub(crate) fn from_parts(
        class_name: String,
        base_class_name: String,
        declared: IndexMap<String, DeclaredRule>,
    ) -> Result<Self, DumpError> {
        if let Some((name, _)) = declared.iter().find(|(_, r)| r.expression.trim().is_empty()) {
            return Err(DumpError::Validation(format!(
                "rule \"{name}\" has an empty expression"
            )));
        }
        Ok(Self {
            class_name,
            base_class_name,
            declared,
        })
    }

    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    #[must_use]
    pub fn base_class_name(&self) -> &str {
        &self.base_class_name
    }

    #[must_use]
    pub fn declared_rules(&self) -> &IndexMap<String, DeclaredRule> {
        &self.declared
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.declared.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }

    /// Create a fresh [`RuleCollection`] holding every declared rule and tag.
    ///
    /// # Errors
    ///
    /// Fails if a declared expression is empty.
    pub fn build(&self) -> Result<RuleCollection, RuleError> {
        let mut collection = RuleCollection::new();
        for (name, declared) in &self.declared {
            let mut rule = Rule::new(declared.expression.clone())?;
            for (tag, instances) in &declared.tags {
                for attributes in instances {
                    rule.add_tag(tag.clone(), attributes.clone());
                }
            }
            collection.add(name.clone(), rule);
        }
        Ok(collection)
    }
}

/// Built-in dumper implementations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DumperKind {
    #[default]
    Binary,
    Yaml,
}

impl DumperKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DumperKind::Binary => "binary",
            DumperKind::Yaml => "yaml",
        }
    }

    #[must_use]
    pub fn dumper(self) -> Box<dyn RuleCollectionDumper> {
        match self {
            DumperKind::Binary => Box::new(BinaryDumper),
            DumperKind::Yaml => Box::new(YamlDumper),
        }
    }
}

impl fmt::Display for DumperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown dumper \"{0}\"; expected \"binary\" or \"yaml\"")]
pub struct UnknownDumperKind(pub String);

impl FromStr for DumperKind {
    type Err = UnknownDumperKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary" => Ok(DumperKind::Binary),
            "yaml" => Ok(DumperKind::Yaml),
            other => Err(UnknownDumperKind(other.to_owned())),
        }
    }
}
