use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::ParsedExpression;

/// Storage for parse results, keyed by expression text and allowed names.
pub trait ParserCache: Send + Sync {
    fn fetch(&self, key: &str) -> Option<Arc<ParsedExpression>>;

    fn save(&self, key: &str, expression: Arc<ParsedExpression>);
}

/// In-memory [`ParserCache`] that lives as long as the expression language.
#[derive(Debug, Default)]
pub struct ArrayParserCache {
    entries: Mutex<HashMap<String, Arc<ParsedExpression>>>,
}

impl ArrayParserCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl ParserCache for ArrayParserCache {
    fn fetch(&self, key: &str) -> Option<Arc<ParsedExpression>> {
        self.entries.lock().get(key).cloned()
    }

    fn save(&self, key: &str, expression: Arc<ParsedExpression>) {
        self.entries.lock().insert(key.to_owned(), expression);
    }
}

impl<T: ParserCache + ?Sized> ParserCache for Arc<T> {
    fn fetch(&self, key: &str) -> Option<Arc<ParsedExpression>> {
        (**self).fetch(key)
    }

    fn save(&self, key: &str, expression: Arc<ParsedExpression>) {
        (**self).save(key, expression);
    }
}

/// Cache key: the expression plus its sorted, de-duplicated name list.
pub(crate) fn cache_key(expression: &str, names: &[&str]) -> String {
    let mut sorted: Vec<&str> = names.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    format!("{expression}//{}", sorted.join(","))
}
