use std::path::Path;

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value as Yaml};

use super::{has_extension, parent_dir, read_source, FormatLoader, Importer, LoadError};
use crate::types::FileResource;
use crate::{Rule, RuleCollection, TagAttributes, Value};

const AVAILABLE_KEYS: [&str; 4] = ["resource", "type", "expression", "tags"];

/// Loads rules from YAML files.
///
/// ```yaml
/// is_adult:
///   expression: "user.age >= 18"
///   tags:
///     - { name: audience, segment: adults }
/// shared:
///   resource: shared/rules.yml
///   tags:
///     - { name: imported }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlFileLoader;

impl FormatLoader for YamlFileLoader {
    fn supports(&self, resource: &str, kind: Option<&str>) -> bool {
        has_extension(resource, &["yml", "yaml"]) && kind.map_or(true, |k| k == "yaml")
    }

    fn load_file(
        &self,
        path: &Path,
        importer: &mut Importer<'_>,
    ) -> Result<RuleCollection, LoadError> {
        let source = read_source(path)?;
        let mut collection = RuleCollection::new();
        collection.add_resource(FileResource::new(path));

        if source.trim().is_empty() {
            return Ok(collection);
        }
        let document: Yaml = serde_yaml::from_str(&source).map_err(|source| LoadError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;

        let entries = match document {
            Yaml::Null => return Ok(collection),
            Yaml::Mapping(entries) => entries,
            _ => {
                return Err(LoadError::invalid(
                    path,
                    format!("the file \"{}\" must contain a YAML mapping", path.display()),
                ))
            }
        };

        for (key, definition) in entries {
            let name = scalar_key(&key).ok_or_else(|| {
                LoadError::invalid(
                    path,
                    format!("rule names in \"{}\" must be scalars", path.display()),
                )
            })?;
            let definition = validate(definition, &name, path)?;

            if definition.contains_key("resource") {
                parse_import(&mut collection, &definition, &name, path, importer)?;
            } else {
                parse_rule(&mut collection, &definition, name, path)?;
            }
        }

        Ok(collection)
    }
}

fn parse_rule(
    collection: &mut RuleCollection,
    definition: &Mapping,
    name: String,
    path: &Path,
) -> Result<(), LoadError> {
    let expression = string_field(definition, "expression", &name, path)?.unwrap_or_default();
    let mut rule = Rule::new(expression).map_err(|e| {
        LoadError::invalid(
            path,
            format!("invalid rule \"{name}\" in \"{}\": {e}", path.display()),
        )
    })?;
    for (tag, attributes) in parse_tags(definition, &name, path)? {
        rule.add_tag(tag, attributes);
    }
    collection.add(name, rule);
    Ok(())
}

fn parse_import(
    collection: &mut RuleCollection,
    definition: &Mapping,
    name: &str,
    path: &Path,
    importer: &mut Importer<'_>,
) -> Result<(), LoadError> {
    let resource = string_field(definition, "resource", name, path)?.unwrap_or_default();
    let kind = string_field(definition, "type", name, path)?;
    let tags = parse_tags(definition, name, path)?;

    let mut imported = importer.import(&resource, kind.as_deref(), parent_dir(path))?;
    for (tag, attributes) in &tags {
        imported.add_tag(tag, attributes);
    }
    collection.add_collection(imported);
    Ok(())
}

fn validate(definition: Yaml, name: &str, path: &Path) -> Result<Mapping, LoadError> {
    let Yaml::Mapping(definition) = definition else {
        return Err(LoadError::invalid(
            path,
            format!(
                "the definition of \"{name}\" in \"{}\" must be a YAML mapping",
                path.display()
            ),
        ));
    };

    let extra: Vec<String> = definition
        .keys()
        .filter(|k| !k.as_str().is_some_and(|k| AVAILABLE_KEYS.contains(&k)))
        .map(|k| scalar_key(k).unwrap_or_else(|| "<complex key>".to_owned()))
        .collect();
    if !extra.is_empty() {
        return Err(LoadError::invalid(
            path,
            format!(
                "the rules file \"{}\" contains unsupported keys for \"{name}\": \"{}\"; expected one of: \"{}\"",
                path.display(),
                extra.join("\", \""),
                AVAILABLE_KEYS.join("\", \""),
            ),
        ));
    }

    let has = |key: &str| definition.get(key).is_some_and(|v| !v.is_null());
    if has("resource") && has("expression") {
        return Err(LoadError::invalid(
            path,
            format!(
                "the rules file \"{}\" must not specify both \"resource\" and \"expression\" for \"{name}\"; choose between an import and a rule definition",
                path.display()
            ),
        ));
    }
    if !has("resource") && has("type") {
        return Err(LoadError::invalid(
            path,
            format!(
                "the \"type\" key for \"{name}\" in \"{}\" is only available for imports in combination with \"resource\"",
                path.display()
            ),
        ));
    }
    if !has("resource") && !has("expression") {
        return Err(LoadError::invalid(
            path,
            format!(
                "you must define an \"expression\" for the rule \"{name}\" in \"{}\"",
                path.display()
            ),
        ));
    }

    if let Some(tags) = definition.get("tags").filter(|v| !v.is_null()) {
        let well_formed = tags.as_sequence().is_some_and(|tags| {
            tags.iter()
                .all(|tag| tag.get("name").and_then(scalar_key).is_some())
        });
        if !well_formed {
            return Err(LoadError::invalid(
                path,
                format!(
                    "the \"tags\" key for \"{name}\" in \"{}\" must be a list of mappings, each with at least a \"name\"",
                    path.display()
                ),
            ));
        }
    }

    Ok(definition)
}

fn string_field(
    definition: &Mapping,
    key: &str,
    name: &str,
    path: &Path,
) -> Result<Option<String>, LoadError> {
    match definition.get(key) {
        None | Some(Yaml::Null) => Ok(None),
        Some(value) => scalar_key(value).map(Some).ok_or_else(|| {
            LoadError::invalid(
                path,
                format!(
                    "the \"{key}\" key for \"{name}\" in \"{}\" must be a string",
                    path.display()
                ),
            )
        }),
    }
}

fn parse_tags(
    definition: &Mapping,
    name: &str,
    path: &Path,
) -> Result<Vec<(String, TagAttributes)>, LoadError> {
    let Some(Yaml::Sequence(tags)) = definition.get("tags") else {
        return Ok(Vec::new());
    };

    let mut parsed = Vec::with_capacity(tags.len());
    for tag in tags {
        let Yaml::Mapping(tag) = tag else { continue };
        let mut tag_name = String::new();
        let mut attributes = IndexMap::new();
        for (key, value) in tag {
            let key = scalar_key(key).ok_or_else(|| {
                LoadError::invalid(
                    path,
                    format!(
                        "tag attribute names for \"{name}\" in \"{}\" must be scalars",
                        path.display()
                    ),
                )
            })?;
            if key == "name" {
                tag_name = scalar_key(value).unwrap_or_default();
            } else {
                attributes.insert(key, to_value(value, name, path)?);
            }
        }
        parsed.push((tag_name, attributes));
    }
    Ok(parsed)
}

fn scalar_key(value: &Yaml) -> Option<String> {
    match value {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Number(n) => Some(n.to_string()),
        Yaml::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Convert a YAML value into a tag attribute value.
pub(crate) fn to_value(value: &Yaml, name: &str, path: &Path) -> Result<Value, LoadError> {
    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(*b),
        Yaml::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Yaml::String(s) => Value::String(s.clone()),
        Yaml::Sequence(items) => Value::List(
            items
                .iter()
                .map(|item| to_value(item, name, path))
                .collect::<Result<_, _>>()?,
        ),
        Yaml::Mapping(entries) => {
            let mut map = IndexMap::with_capacity(entries.len());
            for (key, item) in entries {
                let key = scalar_key(key).ok_or_else(|| {
                    LoadError::invalid(
                        path,
                        format!(
                            "nested keys for \"{name}\" in \"{}\" must be scalars",
                            path.display()
                        ),
                    )
                })?;
                map.insert(key, to_value(item, name, path)?);
            }
            Value::Map(map)
        }
        Yaml::Tagged(tagged) => to_value(&tagged.value, name, path)?,
    })
}
