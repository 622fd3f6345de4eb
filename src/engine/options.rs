use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dumper::{DumperKind, DEFAULT_CLASS_NAME};
use crate::Value;

pub const CACHE_DIR: &str = "cache_dir";
pub const DEBUG: &str = "debug";
pub const RULE_COLLECTION_DUMPER_CLASS: &str = "rule_collection_dumper_class";
pub const RULE_COLLECTION_CACHE_CLASS: &str = "rule_collection_cache_class";
pub const RESOURCE_TYPE: &str = "resource_type";

/// Every option key the engine recognises.
pub const OPTION_KEYS: [&str; 5] = [
    CACHE_DIR,
    DEBUG,
    RULE_COLLECTION_DUMPER_CLASS,
    RULE_COLLECTION_CACHE_CLASS,
    RESOURCE_TYPE,
];

/// Errors raised by engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("The Rule Engine does not support the following options: \"{}\".", .0.join("\", \""))]
    UnsupportedOptions(Vec<String>),

    #[error("invalid value for option \"{key}\": expected {expected}, got {found}")]
    InvalidValue {
        key: String,
        expected: &'static str,
        found: String,
    },

    #[error("invalid engine configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Engine options.
///
/// Caching is enabled when both `cache_dir` and `rule_collection_cache_class`
/// are set.
///
/// ```
/// use rulebook::{EngineOptions, Value};
///
/// let mut options = EngineOptions::default();
/// options.set_option("debug", Value::Bool(true)).unwrap();
/// assert!(options.set_option("cache", Value::Null).is_err());
/// assert_eq!(options.option("rule_collection_cache_class").unwrap(), Value::from("ProjectRuleCollection"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineOptions {
    /// Directory for compiled artifacts; `None` disables caching.
    pub cache_dir: Option<PathBuf>,
    /// Also compare source contents when checking artifact freshness.
    pub debug: bool,
    pub rule_collection_dumper_class: DumperKind,
    /// Artifact name and file stem; `None` disables caching.
    pub rule_collection_cache_class: Option<String>,
    /// Type hint passed to the loader.
    pub resource_type: Option<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            cache_dir: None,
            debug: false,
            rule_collection_dumper_class: DumperKind::default(),
            rule_collection_cache_class: Some(DEFAULT_CLASS_NAME.to_owned()),
            resource_type: None,
        }
    }
}

impl EngineOptions {
    /// Defaults overridden by `options`.
    ///
    /// # Errors
    ///
    /// Fails like [`set_options`](Self::set_options).
    pub fn from_pairs<I, K>(options: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut resolved = Self::default();
        resolved.set_options(options)?;
        Ok(resolved)
    }

    /// Parse options from a YAML mapping.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] on malformed input or unknown keys.
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Whether artifacts are written and reused.
    #[must_use]
    pub fn caching_enabled(&self) -> bool {
        self.cache_dir.is_some() && self.rule_collection_cache_class.is_some()
    }

    /// Apply several options at once. Nothing changes unless every key and
    /// value is valid; all unsupported keys are reported together.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnsupportedOptions`] or [`ConfigError::InvalidValue`].
    pub fn set_options<I, K>(&mut self, options: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let options: Vec<(K, Value)> = options.into_iter().collect();
        let invalid: Vec<String> = options
            .iter()
            .map(|(key, _)| key.as_ref())
            .filter(|key| !OPTION_KEYS.contains(key))
            .map(str::to_owned)
            .collect();
        if !invalid.is_empty() {
            return Err(ConfigError::UnsupportedOptions(invalid));
        }

        let mut updated = self.clone();
        for (key, value) in options {
            updated.set_option(key.as_ref(), value)?;
        }
        *self = updated;
        Ok(())
    }

    /// # Errors
    ///
    /// [`ConfigError::UnsupportedOptions`] naming `key`, or
    /// [`ConfigError::InvalidValue`] when `value` has the wrong type.
    pub fn set_option(&mut self, key: &str, value: Value) -> Result<(), ConfigError> {
        match key {
            CACHE_DIR => self.cache_dir = optional_string(key, value)?.map(PathBuf::from),
            DEBUG => {
                self.debug = value.as_bool().ok_or_else(|| invalid(key, "a boolean", &value))?;
            }
            RULE_COLLECTION_DUMPER_CLASS => {
                let kind = value
                    .as_str()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| invalid(key, "\"binary\" or \"yaml\"", &value))?;
                self.rule_collection_dumper_class = kind;
            }
            RULE_COLLECTION_CACHE_CLASS => {
                self.rule_collection_cache_class = optional_string(key, value)?;
            }
            RESOURCE_TYPE => self.resource_type = optional_string(key, value)?,
            _ => return Err(ConfigError::UnsupportedOptions(vec![key.to_owned()])),
        }
        Ok(())
    }

    /// # Errors
    ///
    /// [`ConfigError::UnsupportedOptions`] naming `key`.
    pub fn option(&self, key: &str) -> Result<Value, ConfigError> {
        let text = |s: Option<&str>| s.map_or(Value::Null, Value::from);
        Ok(match key {
            CACHE_DIR => self
                .cache_dir
                .as_ref()
                .map_or(Value::Null, |p| Value::String(p.display().to_string())),
            DEBUG => Value::Bool(self.debug),
            RULE_COLLECTION_DUMPER_CLASS => Value::from(self.rule_collection_dumper_class.as_str()),
            RULE_COLLECTION_CACHE_CLASS => text(self.rule_collection_cache_class.as_deref()),
            RESOURCE_TYPE => text(self.resource_type.as_deref()),
            _ => return Err(ConfigError::UnsupportedOptions(vec![key.to_owned()])),
        })
    }
}

fn optional_string(key: &str, value: Value) -> Result<Option<String>, ConfigError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if !s.is_empty() => Ok(Some(s)),
        other => Err(invalid(key, "a non-empty string or null", &other)),
    }
}

fn invalid(key: &str, expected: &'static str, found: &Value) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_owned(),
        expected,
        found: found.to_string(),
    }
}
