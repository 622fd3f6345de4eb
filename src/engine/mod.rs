//! The rules engine: one loader, one root resource, one evaluator.
//!
//! The rule collection is resolved lazily, at most once per engine. With
//! caching enabled the loaded collection is dumped to an artifact under
//! `cache_dir` and later engines restore it from there while every source
//! file it was built from is unchanged.

mod options;

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument};

pub use options::{
    ConfigError, EngineOptions, CACHE_DIR, DEBUG, OPTION_KEYS, RESOURCE_TYPE,
    RULE_COLLECTION_CACHE_CLASS, RULE_COLLECTION_DUMPER_CLASS,
};

use crate::cache::ConfigCache;
use crate::dumper::DumpOptions;
use crate::extension::{Extension, ExtensibleEvaluator};
use crate::loader::Loader;
use crate::{Context, EngineError, Rule, RuleCollection, Value};

/// Something the engine can evaluate: a raw expression or a rule.
#[derive(Debug, Clone, Copy)]
pub enum Evaluable<'a> {
    Expression(&'a str),
    Rule(&'a Rule),
}

impl<'a> Evaluable<'a> {
    #[must_use]
    pub fn expression(self) -> &'a str {
        match self {
            Evaluable::Expression(expression) => expression,
            Evaluable::Rule(rule) => rule.expression(),
        }
    }
}

impl<'a> From<&'a str> for Evaluable<'a> {
    fn from(expression: &'a str) -> Self {
        Evaluable::Expression(expression)
    }
}

impl<'a> From<&'a String> for Evaluable<'a> {
    fn from(expression: &'a String) -> Self {
        Evaluable::Expression(expression)
    }
}

impl<'a> From<&'a Rule> for Evaluable<'a> {
    fn from(rule: &'a Rule) -> Self {
        Evaluable::Rule(rule)
    }
}

/// Loads, caches and evaluates a set of named rules.
///
/// ```no_run
/// use rulebook::{Context, DelegatingLoader, EngineOptions, FileLocator, RulesEngine};
///
/// let loader = DelegatingLoader::new(FileLocator::new(["config"]));
/// let mut engine = RulesEngine::new(loader, "rules.yml").with_options(EngineOptions {
///     cache_dir: Some("var/cache".into()),
///     ..EngineOptions::default()
/// });
/// let ctx = Context::new().set("user.age", 20_i64);
/// let allowed = engine.evaluate_named_rule("is_adult", &ctx)?;
/// # Ok::<(), rulebook::EngineError>(())
/// ```
pub struct RulesEngine {
    loader: Box<dyn Loader>,
    resource: String,
    evaluator: ExtensibleEvaluator,
    options: EngineOptions,
    /// `None` until the first successful resolution.
    collection: Option<RuleCollection>,
}

impl RulesEngine {
    pub fn new(loader: impl Loader + 'static, resource: impl Into<String>) -> Self {
        Self {
            loader: Box::new(loader),
            resource: resource.into(),
            evaluator: ExtensibleEvaluator::new(),
            options: EngineOptions::default(),
            collection: None,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Use `evaluator` instead of a fresh one, e.g. to share a parse cache.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: ExtensibleEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// # Errors
    ///
    /// See [`EngineOptions::set_options`].
    pub fn set_options<I, K>(&mut self, options: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        Ok(self.options.set_options(options)?)
    }

    /// # Errors
    ///
    /// See [`EngineOptions::set_option`].
    pub fn set_option(&mut self, key: &str, value: Value) -> Result<(), EngineError> {
        Ok(self.options.set_option(key, value)?)
    }

    /// # Errors
    ///
    /// See [`EngineOptions::option`].
    pub fn option(&self, key: &str) -> Result<Value, EngineError> {
        Ok(self.options.option(key)?)
    }

    #[must_use]
    pub fn evaluator(&self) -> &ExtensibleEvaluator {
        &self.evaluator
    }

    pub fn evaluator_mut(&mut self) -> &mut ExtensibleEvaluator {
        &mut self.evaluator
    }

    /// See [`ExtensibleEvaluator::register_extension`].
    pub fn register_extension(&mut self, extension: Arc<dyn Extension>) -> bool {
        self.evaluator.register_extension(extension)
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.collection.is_some()
    }

    /// The rule collection, loaded or restored on first access.
    ///
    /// # Errors
    ///
    /// Load, dump and cache failures. A failed resolution leaves the engine
    /// unresolved, so the next call tries again.
    pub fn rule_collection(&mut self) -> Result<&RuleCollection, EngineError> {
        let rules = match self.collection.take() {
            Some(rules) => rules,
            None => self.resolve()?,
        };
        Ok(self.collection.insert(rules))
    }

    /// Evaluate an expression, or a rule's expression, with extension globals.
    ///
    /// # Errors
    ///
    /// [`EngineError::Expression`] carrying the evaluator's error.
    pub fn evaluate<'a>(
        &self,
        target: impl Into<Evaluable<'a>>,
        values: &Context,
    ) -> Result<Value, EngineError> {
        Ok(self.evaluator.evaluate(target.into().expression(), values)?)
    }

    /// Evaluate the rule called `name`.
    ///
    /// # Errors
    ///
    /// [`EngineError::Lookup`] when no such rule exists, otherwise as
    /// [`rule_collection`](Self::rule_collection) and [`evaluate`](Self::evaluate).
    pub fn evaluate_named_rule(&mut self, name: &str, values: &Context) -> Result<Value, EngineError> {
        let expression = self
            .rule_collection()?
            .get(name)
            .map(|rule| rule.expression().to_owned())
            .ok_or_else(|| EngineError::Lookup {
                name: name.to_owned(),
            })?;
        self.evaluate(expression.as_str(), values)
    }

    #[instrument(skip(self), fields(resource = %self.resource))]
    fn resolve(&self) -> Result<RuleCollection, EngineError> {
        let options = &self.options;
        let kind = options.resource_type.as_deref();
        let (Some(cache_dir), Some(class_name)) = (
            options.cache_dir.as_ref(),
            options.rule_collection_cache_class.as_ref(),
        ) else {
            debug!("caching disabled");
            return Ok(self.loader.load(&self.resource, kind)?);
        };

        let dumper = options.rule_collection_dumper_class.dumper();
        let artifact = cache_dir.join(format!("{class_name}.{}", dumper.extension()));
        let cache = ConfigCache::new(artifact, options.debug);

        if cache.is_fresh() {
            debug!(artifact = %cache.path().display(), "restoring cached rule collection");
        } else {
            let rules = self.loader.load(&self.resource, kind)?;
            let dump_options = DumpOptions::default().with_class_name(class_name.clone());
            let content = dumper.dump(&rules, &dump_options)?;
            cache.write(&content, rules.resources())?;
            info!(
                artifact = %cache.path().display(),
                rules = rules.len(),
                "rebuilt rule collection cache"
            );
        }

        let cached = dumper.restore(&cache.read()?)?;
        Ok(cached.build()?)
    }
}

impl fmt::Debug for RulesEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RulesEngine")
            .field("resource", &self.resource)
            .field("evaluator", &self.evaluator)
            .field("options", &self.options)
            .field("resolved", &self.is_resolved())
            .finish_non_exhaustive()
    }
}
