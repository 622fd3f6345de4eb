use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;

use super::resource::FileResource;
use super::rule::{Rule, TagAttributes};

/// An ordered, name-keyed set of [`Rule`]s plus the source files it was built from.
///
/// Insertion order is the iteration order. Re-adding an existing name moves
/// the rule to the end. Cloning a collection clones every rule, so tag edits
/// on the clone never reach the original.
///
/// # Example
///
/// ```
/// use rulebook::{Rule, RuleCollection};
///
/// let mut rules = RuleCollection::new();
/// rules.add("adult", Rule::new("age >= 18").unwrap());
/// rules.add("vip", Rule::new("tier == 'gold'").unwrap());
/// rules.add("adult", Rule::new("age >= 21").unwrap());
///
/// assert_eq!(rules.names().collect::<Vec<_>>(), vec!["vip", "adult"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleCollection {
    rules: IndexMap<String, Rule>,
    resources: Vec<FileResource>,
}

impl RuleCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule, replacing any rule with the same name and placing it last.
    pub fn add(&mut self, name: impl Into<String>, rule: Rule) {
        let name = name.into();
        self.rules.shift_remove(&name);
        self.rules.insert(name, rule);
    }

    /// All rules in insertion order.
    #[must_use]
    pub fn all(&self) -> &IndexMap<String, Rule> {
        &self.rules
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Rule> {
        self.rules.get_mut(name)
    }

    /// Remove a rule by name, keeping the relative order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<Rule> {
        self.rules.shift_remove(name)
    }

    /// Remove several rules by name. Unknown names are ignored.
    pub fn remove_all<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.rules.shift_remove(name.as_ref());
        }
    }

    /// Add a tag instance to every rule.
    pub fn add_tag(&mut self, name: &str, attributes: &TagAttributes) {
        for rule in self.rules.values_mut() {
            rule.add_tag(name, attributes.clone());
        }
    }

    /// Remove a tag from every rule.
    pub fn clear_tag(&mut self, name: &str) {
        for rule in self.rules.values_mut() {
            rule.clear_tag(name);
        }
    }

    pub fn clear_tags(&mut self) {
        for rule in self.rules.values_mut() {
            rule.clear_tags();
        }
    }

    /// Append every rule of `other` at the end of this collection, in `other`'s order.
    ///
    /// Names already present are removed first, so colliding rules end up in
    /// `other`'s position rather than being replaced in place. `other`'s
    /// resources are appended as-is.
    pub fn add_collection(&mut self, other: RuleCollection) {
        for (name, rule) in other.rules {
            self.rules.shift_remove(&name);
            self.rules.insert(name, rule);
        }
        self.resources.extend(other.resources);
    }

    /// A new collection holding independent copies of the rules tagged `tag`.
    ///
    /// Relative order is preserved. Resources are not copied.
    #[must_use]
    pub fn find_tagged_rules(&self, tag: &str) -> RuleCollection {
        let mut tagged = RuleCollection::new();
        for (name, rule) in &self.rules {
            if rule.has_tag(tag) {
                tagged.add(name.clone(), rule.clone());
            }
        }
        tagged
    }

    /// Source files this collection was built from, without duplicates,
    /// in first-seen order.
    #[must_use]
    pub fn resources(&self) -> Vec<&FileResource> {
        let mut seen = HashSet::new();
        self.resources
            .iter()
            .filter(|r| seen.insert(*r))
            .collect()
    }

    pub fn add_resource(&mut self, resource: FileResource) {
        self.resources.push(resource);
    }

    /// Rule names in iteration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<'a> IntoIterator for &'a RuleCollection {
    type Item = (&'a String, &'a Rule);
    type IntoIter = indexmap::map::Iter<'a, String, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

impl fmt::Display for RuleCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RuleCollection({} rules, {} resources)",
            self.rules.len(),
            self.resources().len(),
        )
    }
}
