use thiserror::Error;

use crate::cache::CacheError;
use crate::dumper::DumpError;
use crate::engine::ConfigError;
use crate::expression::ExpressionError;
use crate::loader::LoadError;
use crate::types::RuleError;

/// Unified error type for [`RulesEngine`](crate::RulesEngine) operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("No rule named \"{name}\" found in rules")]
    Lookup { name: String },

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    Dump(#[from] DumpError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Rule(#[from] RuleError),
}
