use std::path::Path;

use indexmap::IndexMap;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{has_extension, parent_dir, read_source, FormatLoader, Importer, LoadError};
use crate::types::FileResource;
use crate::{Rule, RuleCollection, TagAttributes, Value};

/// Loads rules from XML files.
///
/// ```xml
/// <rules>
///   <rule id="is_adult" expression="user.age &gt;= 18">
///     <tag name="audience" segment="adults"/>
///   </rule>
///   <import resource="shared/rules.xml">
///     <tag name="imported"/>
///   </import>
/// </rules>
/// ```
///
/// Tag attribute values are typed: `true`, `false`, `null` and numbers
/// become the matching [`Value`]. A hyphenated attribute name is also
/// exposed with underscores (`max-age` and `max_age`).
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlFileLoader;

/// A `<rule>` or `<import>` element whose children are still being read.
enum Pending {
    Rule {
        id: String,
        expression: String,
        tags: Vec<(String, TagAttributes)>,
    },
    Import {
        resource: String,
        kind: Option<String>,
        tags: Vec<(String, TagAttributes)>,
    },
}

impl Pending {
    fn tags_mut(&mut self) -> &mut Vec<(String, TagAttributes)> {
        match self {
            Pending::Rule { tags, .. } | Pending::Import { tags, .. } => tags,
        }
    }
}

impl FormatLoader for XmlFileLoader {
    fn supports(&self, resource: &str, kind: Option<&str>) -> bool {
        has_extension(resource, &["xml"]) && kind.map_or(true, |k| k == "xml")
    }

    fn load_file(
        &self,
        path: &Path,
        importer: &mut Importer<'_>,
    ) -> Result<RuleCollection, LoadError> {
        let source = read_source(path)?;
        let mut collection = RuleCollection::new();
        collection.add_resource(FileResource::new(path));

        let xml_error = |source| LoadError::Xml {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = Reader::from_str(&source);
        reader.config_mut().trim_text(true);

        let mut seen_root = false;
        let mut pending: Option<Pending> = None;

        loop {
            let event = reader.read_event().map_err(xml_error)?;
            match event {
                Event::Start(ref element) | Event::Empty(ref element) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    if !seen_root {
                        seen_root = true;
                        if is_empty {
                            break;
                        }
                        continue;
                    }

                    match pending.as_mut() {
                        None => {
                            let opened = open_element(element, path)
                                .map_err(|e| e.into_load_error(path))?;
                            if is_empty {
                                finish(&mut collection, opened, path, importer)?;
                            } else {
                                pending = Some(opened);
                            }
                        }
                        Some(open) => {
                            if element.local_name().as_ref() != b"tag" {
                                return Err(unknown_element(element, path, "\"tag\""));
                            }
                            let tag = parse_tag(element, path)
                                .map_err(|e| e.into_load_error(path))?;
                            open.tags_mut().push(tag);
                            if !is_empty {
                                reader.read_to_end(element.name()).map_err(xml_error)?;
                            }
                        }
                    }
                }
                Event::End(_) => match pending.take() {
                    Some(open) => finish(&mut collection, open, path, importer)?,
                    None => break,
                },
                Event::Eof => break,
                _ => {}
            }
        }

        if !seen_root {
            return Err(LoadError::invalid(
                path,
                format!("the file \"{}\" has no root element", path.display()),
            ));
        }
        Ok(collection)
    }
}

enum ElementError {
    Xml(quick_xml::Error),
    Load(LoadError),
}

impl ElementError {
    fn into_load_error(self, path: &Path) -> LoadError {
        match self {
            ElementError::Xml(source) => LoadError::Xml {
                path: path.to_path_buf(),
                source,
            },
            ElementError::Load(err) => err,
        }
    }
}

impl From<quick_xml::Error> for ElementError {
    fn from(err: quick_xml::Error) -> Self {
        ElementError::Xml(err)
    }
}

fn open_element(element: &BytesStart<'_>, path: &Path) -> Result<Pending, ElementError> {
    let attributes = raw_attributes(element)?;
    let attribute = |name: &str| {
        attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .filter(|v| !v.is_empty())
    };

    match element.local_name().as_ref() {
        b"rule" => {
            let id = attribute("id").ok_or_else(|| missing_attribute("rule", "id", path))?;
            let expression = attribute("expression")
                .ok_or_else(|| missing_attribute("rule", "expression", path))?;
            Ok(Pending::Rule {
                id,
                expression,
                tags: Vec::new(),
            })
        }
        b"import" => {
            let resource = attribute("resource")
                .ok_or_else(|| missing_attribute("import", "resource", path))?;
            Ok(Pending::Import {
                resource,
                kind: attribute("type"),
                tags: Vec::new(),
            })
        }
        _ => Err(ElementError::Load(unknown_element(
            element,
            path,
            "\"rule\" or \"import\"",
        ))),
    }
}

fn finish(
    collection: &mut RuleCollection,
    pending: Pending,
    path: &Path,
    importer: &mut Importer<'_>,
) -> Result<(), LoadError> {
    match pending {
        Pending::Rule {
            id,
            expression,
            tags,
        } => {
            let mut rule = Rule::new(expression).map_err(|e| {
                LoadError::invalid(
                    path,
                    format!("invalid rule \"{id}\" in \"{}\": {e}", path.display()),
                )
            })?;
            for (name, attributes) in tags {
                rule.add_tag(name, attributes);
            }
            collection.add(id, rule);
        }
        Pending::Import {
            resource,
            kind,
            tags,
        } => {
            let mut imported = importer.import(&resource, kind.as_deref(), parent_dir(path))?;
            for (name, attributes) in &tags {
                imported.add_tag(name, attributes);
            }
            collection.add_collection(imported);
        }
    }
    Ok(())
}

fn parse_tag(element: &BytesStart<'_>, path: &Path) -> Result<(String, TagAttributes), ElementError> {
    let mut name = String::new();
    let mut attributes = IndexMap::new();
    for (key, raw) in raw_attributes(element)? {
        if key == "name" {
            name = raw;
            continue;
        }
        if key.contains('-') && !key.contains('_') {
            let normalized = key.replace('-', "_");
            if !attributes.contains_key(&normalized) {
                attributes.insert(normalized, typed_value(&raw));
            }
        }
        attributes.insert(key, typed_value(&raw));
    }
    if name.is_empty() {
        return Err(missing_attribute("tag", "name", path));
    }
    Ok((name, attributes))
}

fn raw_attributes(element: &BytesStart<'_>) -> Result<Vec<(String, String)>, quick_xml::Error> {
    let mut attributes = Vec::new();
    for attribute in element.attributes() {
        let attribute = attribute?;
        let key = attribute.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let local = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        attributes.push((local, attribute.unescape_value()?.into_owned()));
    }
    Ok(attributes)
}

/// Interpret an attribute string as the scalar it spells.
fn typed_value(raw: &str) -> Value {
    match raw.to_ascii_lowercase().as_str() {
        "null" => return Value::Null,
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    let unsigned = raw.strip_prefix(['-', '+']).unwrap_or(raw);
    if !unsigned.is_empty() && unsigned.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(i) = raw.parse::<i64>() {
            return Value::Int(i);
        }
    }
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        if let Ok(i) = i64::from_str_radix(hex, 16) {
            return Value::Int(i);
        }
    }
    let numeric = unsigned.bytes().any(|b| b.is_ascii_digit())
        && unsigned
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'-' | b'+'));
    if numeric {
        if let Ok(f) = raw.parse::<f64>() {
            return Value::Float(f);
        }
    }
    Value::String(raw.to_owned())
}

fn missing_attribute(element: &str, attribute: &str, path: &Path) -> ElementError {
    ElementError::Load(LoadError::invalid(
        path,
        format!(
            "the <{element}> element in \"{}\" must have an \"{attribute}\" attribute",
            path.display()
        ),
    ))
}

fn unknown_element(element: &BytesStart<'_>, path: &Path, expected: &str) -> LoadError {
    LoadError::invalid(
        path,
        format!(
            "unknown element \"{}\" in \"{}\"; expected {expected}",
            String::from_utf8_lossy(element.local_name().as_ref()),
            path.display()
        ),
    )
}
