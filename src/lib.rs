//! A registry of named, tagged business rules with an extensible expression
//! evaluator and an on-disk cache of compiled rule collections.
//!
//! ```
//! use rulebook::{Context, Rule, RuleCollection, ExtensibleEvaluator, Value};
//!
//! let mut rules = RuleCollection::new();
//! rules.add("adult", Rule::new("user.age >= 18").unwrap());
//!
//! let evaluator = ExtensibleEvaluator::new();
//! let ctx = Context::new().set("user.age", 30_i64);
//! let rule = rules.get("adult").unwrap();
//! assert_eq!(evaluator.evaluate(rule.expression(), &ctx).unwrap(), Value::Bool(true));
//! ```

pub mod cache;
pub mod dumper;
pub mod engine;
mod error;
pub mod expression;
pub mod extension;
pub mod loader;
mod types;

pub use cache::{CacheError, ConfigCache};
pub use dumper::{
    BinaryDumper, CachedCollection, DumpError, DumpOptions, DumperKind, RuleCollectionDumper,
    YamlDumper,
};
pub use engine::{ConfigError, EngineOptions, Evaluable, RulesEngine, OPTION_KEYS};
pub use error::EngineError;
pub use expression::{ExpressionError, ExpressionFunction, ExpressionLanguage};
pub use extension::{ExtensibleEvaluator, Extension, ENGINE_GLOBAL};
pub use loader::{DelegatingLoader, FileLocator, LoadError, Loader, XmlFileLoader, YamlFileLoader};
pub use types::{
    Context, FileResource, ResourceStamp, Rule, RuleCollection, RuleError, TagAttributes, TagMap,
    Value,
};
