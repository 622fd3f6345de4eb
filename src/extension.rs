//! Pluggable extensions layered over the base [`ExpressionLanguage`].
//!
//! An [`Extension`] contributes implicit global variables and named
//! functions. [`ExtensibleEvaluator`] registers each function as a pair of
//! hooks: the compile hook renders a call routed through [`ENGINE_GLOBAL`],
//! the evaluate hook forwards the call-site values straight to the extension.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::expression::{ExpressionError, ExpressionFunction, ExpressionLanguage, ParsedExpression};
use crate::{Context, Value};

/// Reserved global naming the evaluator itself in compiled output.
///
/// It is always the first global, so no extension can claim the name.
pub const ENGINE_GLOBAL: &str = "__rulebook";

/// A named bundle of globals and functions made visible to every expression.
pub trait Extension: Send + Sync {
    /// Registration key. A second extension with the same name is ignored.
    fn name(&self) -> &str;

    /// Variables injected into every evaluation.
    fn globals(&self) -> IndexMap<String, Value> {
        IndexMap::new()
    }

    /// Names of the functions this extension answers through [`call`](Self::call).
    fn functions(&self) -> Vec<String> {
        Vec::new()
    }

    /// Invoke one of the functions listed by [`functions`](Self::functions).
    ///
    /// # Errors
    ///
    /// Implementations report bad arguments with [`ExpressionError::function`].
    fn call(&self, function: &str, args: &[Value]) -> Result<Value, ExpressionError>;
}

/// Expression language that also sees the globals and functions of its
/// registered extensions.
#[derive(Default)]
pub struct ExtensibleEvaluator {
    language: ExpressionLanguage,
    extensions: IndexMap<String, Arc<dyn Extension>>,
}

impl ExtensibleEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing language, keeping its functions and parse cache.
    #[must_use]
    pub fn with_language(language: ExpressionLanguage) -> Self {
        Self {
            language,
            extensions: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn language(&self) -> &ExpressionLanguage {
        &self.language
    }

    pub fn language_mut(&mut self) -> &mut ExpressionLanguage {
        &mut self.language
    }

    /// Register an extension. Returns `false` and changes nothing when an
    /// extension with the same name is already registered.
    pub fn register_extension(&mut self, extension: Arc<dyn Extension>) -> bool {
        let name = extension.name().to_owned();
        if self.extensions.contains_key(&name) {
            trace!(extension = %name, "extension already registered");
            return false;
        }

        let functions = extension.functions();
        for function in &functions {
            self.language
                .add_function(extension_hook(&name, function, Arc::clone(&extension)));
        }

        debug!(extension = %name, functions = functions.len(), "registered extension");
        self.extensions.insert(name, extension);
        true
    }

    #[must_use]
    pub fn get_extension(&self, name: &str) -> Option<&Arc<dyn Extension>> {
        self.extensions.get(name)
    }

    /// Registered extensions in registration order.
    pub fn extensions(&self) -> impl Iterator<Item = (&str, &Arc<dyn Extension>)> {
        self.extensions.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Globals visible to every expression.
    ///
    /// [`ENGINE_GLOBAL`] comes first and describes the evaluator. Then each
    /// extension's globals in registration order; a name already present is
    /// never overwritten.
    #[must_use]
    pub fn extension_globals(&self) -> IndexMap<String, Value> {
        let mut globals = IndexMap::new();
        globals.insert(ENGINE_GLOBAL.to_owned(), self.self_value());

        for extension in self.extensions.values() {
            for (key, value) in extension.globals() {
                globals.entry(key).or_insert(value);
            }
        }
        globals
    }

    /// Evaluate with extension globals; caller values win on collisions.
    ///
    /// # Errors
    ///
    /// Errors from the expression language are returned unchanged.
    pub fn evaluate(&self, expression: &str, values: &Context) -> Result<Value, ExpressionError> {
        let merged = Context::from(self.extension_globals()).merged_with(values);
        self.language.evaluate(expression, &merged)
    }

    /// # Errors
    ///
    /// Errors from the expression language are returned unchanged.
    pub fn compile(&self, expression: &str, names: &[&str]) -> Result<String, ExpressionError> {
        let globals = self.extension_globals();
        self.language
            .compile(expression, &merge_names(&globals, names))
    }

    /// # Errors
    ///
    /// Errors from the expression language are returned unchanged.
    pub fn parse(
        &self,
        expression: &str,
        names: &[&str],
    ) -> Result<Arc<ParsedExpression>, ExpressionError> {
        let globals = self.extension_globals();
        self.language.parse(expression, &merge_names(&globals, names))
    }

    fn self_value(&self) -> Value {
        let names = self
            .extensions
            .keys()
            .map(|name| Value::String(name.clone()))
            .collect();
        let mut map = IndexMap::new();
        map.insert("extensions".to_owned(), Value::List(names));
        Value::Map(map)
    }
}

impl fmt::Debug for ExtensibleEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensibleEvaluator")
            .field("language", &self.language)
            .field("extensions", &self.extensions.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn extension_hook(
    extension_name: &str,
    function: &str,
    extension: Arc<dyn Extension>,
) -> ExpressionFunction {
    let target = Value::String(extension_name.to_owned()).to_string();
    let emitted = function.to_owned();
    let called = function.to_owned();
    ExpressionFunction::new(
        function,
        move |args| {
            format!(
                "{ENGINE_GLOBAL}.getExtension({target}).{emitted}({})",
                args.join(", ")
            )
        },
        move |_scope, args| extension.call(&called, args),
    )
}

fn merge_names<'a>(globals: &'a IndexMap<String, Value>, names: &[&'a str]) -> Vec<&'a str> {
    let mut merged: Vec<&str> = globals.keys().map(String::as_str).collect();
    for name in names {
        if !merged.contains(name) {
            merged.push(name);
        }
    }
    merged
}
