use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{CachedCollection, DeclaredRule, DumpError, DumpOptions, RuleCollectionDumper};
use crate::RuleCollection;

const HEADER: &str = "# Generated by rulebook from the rule sources; do not edit.\n";

/// Writes readable YAML artifacts.
///
/// ```yaml
/// # Generated by rulebook from the rule sources; do not edit.
/// class: ProjectRuleCollection
/// base_class: RuleCollection
/// rules:
///   is_adult:
///     expression: user.age >= 18
///     tags:
///       audience:
///       - segment: adults
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlDumper;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Document {
    class: String,
    base_class: String,
    #[serde(default)]
    rules: IndexMap<String, DeclaredRule>,
}

impl RuleCollectionDumper for YamlDumper {
    fn extension(&self) -> &'static str {
        "yml"
    }

    fn dump(&self, rules: &RuleCollection, options: &DumpOptions) -> Result<Vec<u8>, DumpError> {
        let cached = CachedCollection::from_collection(rules, options);
        let document = Document {
            class: cached.class_name,
            base_class: cached.base_class_name,
            rules: cached.declared,
        };
        let body = serde_yaml::to_string(&document)?;
        Ok(format!("{HEADER}{body}").into_bytes())
    }

    fn restore(&self, artifact: &[u8]) -> Result<CachedCollection, DumpError> {
        let document: Document = serde_yaml::from_slice(artifact)?;
        if document.class.is_empty() {
            return Err(DumpError::Validation("empty class name".to_owned()));
        }
        CachedCollection::from_parts(document.class, document.base_class, document.rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dumper::tests::sample;
    use crate::Value;

    #[test]
    fn output_is_readable() {
        let bytes = YamlDumper.dump(&sample(), &DumpOptions::default()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with(HEADER));
        assert!(text.contains("class: ProjectRuleCollection"));
        assert!(text.contains("1+1"));
    }

    #[test]
    fn untagged_rules_omit_tags() {
        let bytes = YamlDumper.dump(&sample(), &DumpOptions::default()).unwrap();
        let restored = YamlDumper.restore(&bytes).unwrap();
        assert!(restored.declared_rules()["a"].tags.is_empty());
        let b = &restored.declared_rules()["b"].tags["tag1"];
        assert_eq!(b[1]["weight"], Value::Float(0.5));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = YamlDumper
            .restore(b"class: A\nbase_class: B\nrules: {}\nextra: 1\n")
            .unwrap_err();
        assert!(matches!(err, DumpError::Yaml(_)));
    }

    #[test]
    fn rejects_empty_expression() {
        let err = YamlDumper
            .restore(b"class: A\nbase_class: B\nrules:\n  a:\n    expression: ''\n")
            .unwrap_err();
        assert!(matches!(err, DumpError::Validation(_)));
    }
}
