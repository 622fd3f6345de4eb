use indexmap::IndexMap;

use super::Value;

/// Evaluation variables, keyed by name.
///
/// Dot-separated paths like `"user.profile.age"` are stored as nested
/// [`Value::Map`]s under the first segment, so expressions can read them back
/// with the same dotted syntax.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    data: IndexMap<String, Value>,
}

impl Context {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value at a dot-separated path. Creates intermediate nested maps as needed.
    #[must_use]
    pub fn set(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.insert(path, value.into());
        self
    }

    /// Insert a value at a dot-separated path (mutable reference version).
    pub fn insert(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = path.split('.').collect();
        Self::insert_recursive(&mut self.data, &segments, value);
    }

    /// Bind a top-level name without interpreting dots.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.data.insert(name.into(), value);
    }

    /// Look up a value by dot-separated path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let segments: Vec<&str> = path.split('.').collect();
        self.lookup(&segments)
    }

    pub(crate) fn lookup(&self, segments: &[&str]) -> Option<&Value> {
        match segments {
            [] => None,
            [first, rest @ ..] => self.data.get(*first)?.get_path(rest),
        }
    }

    /// Whether a top-level name is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    /// Top-level names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Iterate over top-level bindings.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Overlay `other` on top of `self`: top-level names from `other` replace
    /// the ones already present.
    #[must_use]
    pub fn merged_with(mut self, other: &Context) -> Self {
        for (name, value) in &other.data {
            self.data.insert(name.clone(), value.clone());
        }
        self
    }

    fn insert_recursive(map: &mut IndexMap<String, Value>, segments: &[&str], value: Value) {
        match segments {
            [] => {}
            [last] => {
                map.insert((*last).to_owned(), value);
            }
            [first, rest @ ..] => {
                let entry = map
                    .entry((*first).to_owned())
                    .or_insert_with(|| Value::Map(IndexMap::new()));
                if let Value::Map(nested) = entry {
                    Self::insert_recursive(nested, rest, value);
                } else {
                    let mut nested = IndexMap::new();
                    Self::insert_recursive(&mut nested, rest, value);
                    *entry = Value::Map(nested);
                }
            }
        }
    }
}

impl From<IndexMap<String, Value>> for Context {
    fn from(data: IndexMap<String, Value>) -> Self {
        Self { data }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            data: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_simple() {
        let ctx = Context::new().set("name", "alice");
        assert_eq!(ctx.get("name"), Some(&Value::String("alice".to_owned())));
    }

    #[test]
    fn set_and_get_nested() {
        let ctx = Context::new().set("user.profile.age", 25_i64);
        assert_eq!(ctx.get("user.profile.age"), Some(&Value::Int(25)));
        assert!(ctx.get("user").unwrap().as_map().is_some());
    }

    #[test]
    fn get_missing_returns_none() {
        let ctx = Context::new().set("user.age", 25_i64);
        assert_eq!(ctx.get("user.name"), None);
        assert_eq!(ctx.get("nonexistent"), None);
    }

    #[test]
    fn overwrite_leaf_with_nested() {
        let ctx = Context::new()
            .set("user", "old_value")
            .set("user.age", 30_i64);
        assert_eq!(ctx.get("user.age"), Some(&Value::Int(30)));
    }

    #[test]
    fn overwrite_value() {
        let ctx = Context::new().set("score", 10_i64).set("score", 20_i64);
        assert_eq!(ctx.get("score"), Some(&Value::Int(20)));
    }

    #[test]
    fn bind_keeps_dots_literal() {
        let mut ctx = Context::new();
        ctx.bind("a.b", Value::Int(1));
        assert!(ctx.contains("a.b"));
        assert!(!ctx.contains("a"));
    }

    #[test]
    fn merged_with_prefers_overlay() {
        let base = Context::new().set("x", 1_i64).set("y", 2_i64);
        let overlay = Context::new().set("x", 5_i64);
        let merged = base.merged_with(&overlay);
        assert_eq!(merged.get("x"), Some(&Value::Int(5)));
        assert_eq!(merged.get("y"), Some(&Value::Int(2)));
        assert_eq!(merged.names().collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn from_iterator() {
        let ctx: Context = [("a", 1_i64), ("b", 2_i64)].into_iter().collect();
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.get("b"), Some(&Value::Int(2)));
    }
}
