use indexmap::IndexMap;

use super::error::RuleError;
use super::value::Value;

/// Attributes attached to a single tag instance.
pub type TagAttributes = IndexMap<String, Value>;

/// Tag name to every attribute set added under that name, in insertion order.
pub type TagMap = IndexMap<String, Vec<TagAttributes>>;

/// A business rule: an expression plus tags used for grouping and lookup.
///
/// Rules are usually produced by a [`Loader`](crate::Loader) and owned by a
/// [`RuleCollection`](super::RuleCollection). Tags are repeatable: adding the
/// same tag name twice keeps both attribute sets.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    expression: String,
    tags: TagMap,
}

impl Rule {
    /// Create a rule for the given expression.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::EmptyExpression`] if the expression is blank.
    pub fn new(expression: impl Into<String>) -> Result<Self, RuleError> {
        let mut rule = Self {
            expression: String::new(),
            tags: TagMap::new(),
        };
        rule.set_expression(expression)?;
        Ok(rule)
    }

    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Replace the rule's expression.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::EmptyExpression`] if the expression is blank; the
    /// previous expression is kept.
    pub fn set_expression(&mut self, expression: impl Into<String>) -> Result<&mut Self, RuleError> {
        let expression = expression.into();
        if expression.trim().is_empty() {
            return Err(RuleError::EmptyExpression);
        }
        self.expression = expression;
        Ok(self)
    }

    #[must_use]
    pub fn tags(&self) -> &TagMap {
        &self.tags
    }

    /// Attribute sets recorded under `name`, or an empty slice.
    #[must_use]
    pub fn tag(&self, name: &str) -> &[TagAttributes] {
        self.tags.get(name).map_or(&[], Vec::as_slice)
    }

    /// Append a tag instance. Repeated calls with the same name accumulate.
    pub fn add_tag(&mut self, name: impl Into<String>, attributes: TagAttributes) -> &mut Self {
        self.tags.entry(name.into()).or_default().push(attributes);
        self
    }

    /// Builder-style [`add_tag`](Self::add_tag).
    #[must_use]
    pub fn with_tag(mut self, name: impl Into<String>, attributes: TagAttributes) -> Self {
        self.add_tag(name, attributes);
        self
    }

    #[must_use]
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    /// Remove every instance of a tag. No-op if absent.
    pub fn clear_tag(&mut self, name: &str) -> &mut Self {
        self.tags.shift_remove(name);
        self
    }

    pub fn clear_tags(&mut self) -> &mut Self {
        self.tags.clear();
        self
    }
}
