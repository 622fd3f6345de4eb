//! The base expression language rules are written in.
//!
//! Expressions are parsed once per distinct `(expression, names)` pair and
//! the tree is kept in a [`ParserCache`]. A parsed tree can be evaluated
//! against a [`Context`] or compiled back to normalised source text.
//!
//! ```
//! use rulebook::{Context, ExpressionLanguage, Value};
//!
//! let language = ExpressionLanguage::new();
//! let ctx = Context::new().set("user.age", 20_i64);
//! assert_eq!(language.evaluate("user.age >= 18", &ctx).unwrap(), Value::Bool(true));
//! ```

mod ast;
mod cache;
mod compile;
mod error;
mod evaluate;
mod function;
mod grammar;

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

pub use ast::{BinaryOp, CompareOp, Node, UnaryOp};
use ast::Reference;
pub use cache::{ArrayParserCache, ParserCache};
pub use error::ExpressionError;
pub use function::{CompileFn, EvaluateFn, ExpressionFunction, Scope};

use crate::{Context, Value};

/// A parsed expression together with the names it was validated against.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExpression {
    source: String,
    node: Node,
    names: Vec<String>,
}

impl ParsedExpression {
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn node(&self) -> &Node {
        &self.node
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Parser, compiler and evaluator for rule expressions.
pub struct ExpressionLanguage {
    functions: IndexMap<String, ExpressionFunction>,
    cache: Box<dyn ParserCache>,
}

impl Default for ExpressionLanguage {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionLanguage {
    /// An expression language with no functions and an in-memory parse cache.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cache(ArrayParserCache::new())
    }

    #[must_use]
    pub fn with_cache(cache: impl ParserCache + 'static) -> Self {
        Self {
            functions: IndexMap::new(),
            cache: Box::new(cache),
        }
    }

    /// Register a function from its compile and evaluate callbacks.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        compiler: impl Fn(&[String]) -> String + Send + Sync + 'static,
        evaluator: impl Fn(&Scope<'_>, &[Value]) -> Result<Value, ExpressionError>
            + Send
            + Sync
            + 'static,
    ) {
        self.add_function(ExpressionFunction::new(name, compiler, evaluator));
    }

    /// Register a function. A later function with the same name replaces the earlier one.
    pub fn add_function(&mut self, function: ExpressionFunction) {
        trace!(function = function.name(), "registering expression function");
        self.functions.insert(function.name().to_owned(), function);
    }

    #[must_use]
    pub fn function(&self, name: &str) -> Option<&ExpressionFunction> {
        self.functions.get(name)
    }

    /// Parse and validate an expression.
    ///
    /// Every variable root must appear in `names` and every called function
    /// must be registered.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError::Syntax`], [`ExpressionError::UnknownVariable`]
    /// or [`ExpressionError::UnknownFunction`].
    pub fn parse(
        &self,
        expression: &str,
        names: &[&str],
    ) -> Result<Arc<ParsedExpression>, ExpressionError> {
        let key = cache::cache_key(expression, names);
        if let Some(parsed) = self.cache.fetch(&key) {
            return Ok(parsed);
        }

        let node = grammar::parse_expression(expression)?;
        self.validate(&node, names)?;

        let parsed = Arc::new(ParsedExpression {
            source: expression.to_owned(),
            node,
            names: names.iter().map(|n| (*n).to_owned()).collect(),
        });
        self.cache.save(&key, Arc::clone(&parsed));
        Ok(parsed)
    }

    /// Compile an expression to normalised source text.
    ///
    /// # Errors
    ///
    /// Fails like [`parse`](Self::parse).
    pub fn compile(&self, expression: &str, names: &[&str]) -> Result<String, ExpressionError> {
        let parsed = self.parse(expression, names)?;
        compile::compile(&parsed.node, &self.functions)
    }

    /// Evaluate an expression; the context's top-level names are the allowed variables.
    ///
    /// # Errors
    ///
    /// Fails like [`parse`](Self::parse), or with a runtime error such as a
    /// type mismatch or a failing function.
    pub fn evaluate(&self, expression: &str, values: &Context) -> Result<Value, ExpressionError> {
        let names: Vec<&str> = values.names().collect();
        let parsed = self.parse(expression, &names)?;
        evaluate::evaluate(&parsed.node, &Scope::new(values), &self.functions)
    }

    fn validate(&self, node: &Node, names: &[&str]) -> Result<(), ExpressionError> {
        let mut error = None;
        node.walk_references(&mut |reference| {
            if error.is_some() {
                return;
            }
            error = match reference {
                Reference::Name(name) if !names.contains(&name) => {
                    Some(ExpressionError::UnknownVariable {
                        name: name.to_owned(),
                    })
                }
                Reference::Call(function) if !self.functions.contains_key(function) => {
                    Some(ExpressionError::UnknownFunction {
                        name: function.to_owned(),
                    })
                }
                _ => None,
            };
        });
        error.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for ExpressionLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionLanguage")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
