//! Binary cache artifacts.
//!
//! The format consists of a 32-byte fixed header followed by a
//! bincode-encoded payload.
//!
//! ## Wire Format
//!
//! ```text
//! Offset  Size  Field
//! 0       4     Magic bytes: b"RLBK"
//! 4       2     Format version (u16, little-endian)
//! 6       2     Engine version (u16, little-endian)
//! 8       4     Flags (u32, reserved)
//! 12      4     Payload length in bytes (u32, little-endian)
//! 16      16    BLAKE3 hash of the payload (truncated to 16 bytes)
//! 32..    var   Bincode-encoded payload
//! ```
//!
//! The format version must match exactly. The engine version is informational.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{CachedCollection, DeclaredRule, DumpError, DumpOptions, RuleCollectionDumper};
use crate::{RuleCollection, TagAttributes, TagMap, Value};

const MAGIC: &[u8; 4] = b"RLBK";
const FORMAT_VERSION: u16 = 1;
const ENGINE_VERSION: u16 = 1;
const HEADER_SIZE: usize = 32;

/// Writes checksummed bincode artifacts. The default dumper.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryDumper;

impl RuleCollectionDumper for BinaryDumper {
    fn extension(&self) -> &'static str {
        "bin"
    }

    fn dump(&self, rules: &RuleCollection, options: &DumpOptions) -> Result<Vec<u8>, DumpError> {
        encode(rules, options)
    }

    fn restore(&self, artifact: &[u8]) -> Result<CachedCollection, DumpError> {
        decode(artifact)
    }
}

// ---------------------------------------------------------------------------
// Serialized type hierarchy
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct SerializedCollection {
    metadata: CollectionMetadata,
    rules: Vec<SerializedRule>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CollectionMetadata {
    class_name: String,
    base_class_name: String,
    rule_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct SerializedRule {
    name: String,
    expression: String,
    tags: Vec<SerializedTag>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SerializedTag {
    name: String,
    instances: Vec<Vec<(String, SerializedValue)>>,
}

// `Value` is untagged, which bincode cannot decode; this mirror is tagged.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum SerializedValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<SerializedValue>),
    Map(Vec<(String, SerializedValue)>),
}

// ---------------------------------------------------------------------------
// Value conversion
// ---------------------------------------------------------------------------

fn serialize_value(value: &Value) -> SerializedValue {
    match value {
        Value::Null => SerializedValue::Null,
        Value::Bool(v) => SerializedValue::Bool(*v),
        Value::Int(v) => SerializedValue::Int(*v),
        Value::Float(v) => SerializedValue::Float(*v),
        Value::String(v) => SerializedValue::Str(v.clone()),
        Value::List(items) => SerializedValue::List(items.iter().map(serialize_value).collect()),
        Value::Map(entries) => SerializedValue::Map(serialize_entries(entries)),
    }
}

fn serialize_entries(entries: &IndexMap<String, Value>) -> Vec<(String, SerializedValue)> {
    entries
        .iter()
        .map(|(k, v)| (k.clone(), serialize_value(v)))
        .collect()
}

fn deserialize_value(value: SerializedValue) -> Value {
    match value {
        SerializedValue::Null => Value::Null,
        SerializedValue::Bool(v) => Value::Bool(v),
        SerializedValue::Int(v) => Value::Int(v),
        SerializedValue::Float(v) => Value::Float(v),
        SerializedValue::Str(v) => Value::String(v),
        SerializedValue::List(items) => {
            Value::List(items.into_iter().map(deserialize_value).collect())
        }
        SerializedValue::Map(entries) => Value::Map(deserialize_entries(entries)),
    }
}

fn deserialize_entries(entries: Vec<(String, SerializedValue)>) -> IndexMap<String, Value> {
    entries
        .into_iter()
        .map(|(k, v)| (k, deserialize_value(v)))
        .collect()
}

// ---------------------------------------------------------------------------
// RuleCollection <-> SerializedCollection
// ---------------------------------------------------------------------------

fn collection_to_serialized(rules: &RuleCollection, options: &DumpOptions) -> SerializedCollection {
    let serialized: Vec<SerializedRule> = rules
        .iter()
        .map(|(name, rule)| SerializedRule {
            name: name.to_owned(),
            expression: rule.expression().to_owned(),
            tags: rule
                .tags()
                .iter()
                .map(|(tag, instances)| SerializedTag {
                    name: tag.clone(),
                    instances: instances.iter().map(serialize_entries).collect(),
                })
                .collect(),
        })
        .collect();

    SerializedCollection {
        metadata: CollectionMetadata {
            class_name: options.class_name.clone(),
            base_class_name: options.base_class_name.clone(),
            rule_count: serialized.len(),
        },
        rules: serialized,
    }
}

fn serialized_to_cached(ser: SerializedCollection) -> Result<CachedCollection, DumpError> {
    validate(&ser)?;

    let declared = ser
        .rules
        .into_iter()
        .map(|rule| {
            let tags: TagMap = rule
                .tags
                .into_iter()
                .map(|tag| {
                    let instances: Vec<TagAttributes> =
                        tag.instances.into_iter().map(deserialize_entries).collect();
                    (tag.name, instances)
                })
                .collect();
            (
                rule.name,
                DeclaredRule {
                    expression: rule.expression,
                    tags,
                },
            )
        })
        .collect();

    CachedCollection::from_parts(ser.metadata.class_name, ser.metadata.base_class_name, declared)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(ser: &SerializedCollection) -> Result<(), DumpError> {
    if ser.metadata.rule_count != ser.rules.len() {
        return Err(DumpError::Validation(format!(
            "metadata says {} rules but payload has {}",
            ser.metadata.rule_count,
            ser.rules.len()
        )));
    }
    if ser.metadata.class_name.is_empty() {
        return Err(DumpError::Validation("empty class name".to_owned()));
    }

    let mut names = HashSet::with_capacity(ser.rules.len());
    for rule in &ser.rules {
        if !names.insert(rule.name.as_str()) {
            return Err(DumpError::Validation(format!(
                "rule \"{}\" declared twice",
                rule.name
            )));
        }
        let mut tags = HashSet::with_capacity(rule.tags.len());
        for tag in &rule.tags {
            if !tags.insert(tag.name.as_str()) {
                return Err(DumpError::Validation(format!(
                    "tag \"{}\" declared twice on rule \"{}\"",
                    tag.name, rule.name
                )));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Header I/O
// ---------------------------------------------------------------------------

fn write_header(buf: &mut Vec<u8>, payload: &[u8]) -> Result<(), DumpError> {
    let hash = blake3::hash(payload);
    let hash_bytes = hash.as_bytes();
    let payload_len = u32::try_from(payload.len()).map_err(|_| {
        DumpError::Validation(format!("payload of {} bytes exceeds 4 GiB", payload.len()))
    })?;

    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&ENGINE_VERSION.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // flags (reserved)
    buf.extend_from_slice(&payload_len.to_le_bytes());
    buf.extend_from_slice(&hash_bytes[..16]);
    Ok(())
}

#[allow(clippy::cast_possible_truncation)] // HEADER_SIZE is 32, always fits in u32
fn read_header(bytes: &[u8]) -> Result<(u16, u32, [u8; 16]), DumpError> {
    if bytes.len() < HEADER_SIZE {
        return Err(DumpError::LengthMismatch {
            expected: HEADER_SIZE as u32,
            actual: bytes.len(),
        });
    }

    if &bytes[0..4] != MAGIC {
        return Err(DumpError::BadMagic);
    }

    let format_version = u16::from_le_bytes([bytes[4], bytes[5]]);
    // bytes[6..8] is engine_version, bytes[8..12] is flags
    let payload_len = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);

    let mut hash = [0u8; 16];
    hash.copy_from_slice(&bytes[16..32]);

    Ok((format_version, payload_len, hash))
}

// ---------------------------------------------------------------------------
// Encode/decode
// ---------------------------------------------------------------------------

fn encode(rules: &RuleCollection, options: &DumpOptions) -> Result<Vec<u8>, DumpError> {
    let serialized = collection_to_serialized(rules, options);
    let payload = bincode::serde::encode_to_vec(&serialized, bincode::config::standard())?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    write_header(&mut buf, &payload)?;
    buf.extend_from_slice(&payload);
    Ok(buf)
}

fn decode(bytes: &[u8]) -> Result<CachedCollection, DumpError> {
    let (format_version, payload_len, stored_hash) = read_header(bytes)?;

    if format_version != FORMAT_VERSION {
        return Err(DumpError::IncompatibleVersion {
            artifact: format_version,
            supported: FORMAT_VERSION,
        });
    }

    let payload_end = HEADER_SIZE + payload_len as usize;
    if bytes.len() != payload_end {
        return Err(DumpError::LengthMismatch {
            expected: payload_len,
            actual: bytes.len() - HEADER_SIZE,
        });
    }
    let payload = &bytes[HEADER_SIZE..payload_end];

    if blake3::hash(payload).as_bytes()[..16] != stored_hash {
        return Err(DumpError::ChecksumMismatch);
    }

    let (serialized, _): (SerializedCollection, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard())?;

    serialized_to_cached(serialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dumper::tests::sample;

    fn artifact() -> Vec<u8> {
        BinaryDumper.dump(&sample(), &DumpOptions::default()).unwrap()
    }

    #[test]
    fn value_conversion_keeps_nesting() {
        let mut inner = IndexMap::new();
        inner.insert("k".to_owned(), Value::List(vec![Value::Int(1), Value::Null]));
        let v = Value::Map(inner);
        assert_eq!(deserialize_value(serialize_value(&v)), v);
    }

    #[test]
    fn header_layout() {
        let bytes = artifact();
        assert_eq!(&bytes[0..4], MAGIC);
        let (version, len, hash) = read_header(&bytes).unwrap();
        assert_eq!(version, FORMAT_VERSION);
        assert_eq!(len as usize, bytes.len() - HEADER_SIZE);
        assert_eq!(&hash, &blake3::hash(&bytes[HEADER_SIZE..]).as_bytes()[..16]);
    }

    #[test]
    fn bad_magic() {
        let mut bytes = artifact();
        bytes[0..4].copy_from_slice(b"BAAD");
        assert!(matches!(BinaryDumper.restore(&bytes), Err(DumpError::BadMagic)));
    }

    #[test]
    fn too_short() {
        assert!(matches!(
            BinaryDumper.restore(&[0u8; 10]),
            Err(DumpError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn truncated_payload() {
        let bytes = artifact();
        assert!(matches!(
            BinaryDumper.restore(&bytes[..bytes.len() - 1]),
            Err(DumpError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let mut bytes = artifact();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            BinaryDumper.restore(&bytes),
            Err(DumpError::ChecksumMismatch)
        ));
    }

    #[test]
    fn version_mismatch() {
        let mut bytes = artifact();
        bytes[4..6].copy_from_slice(&99u16.to_le_bytes());
        assert!(matches!(
            BinaryDumper.restore(&bytes),
            Err(DumpError::IncompatibleVersion { artifact: 99, supported: 1 })
        ));
    }

    #[test]
    fn validate_rejects_inconsistent_metadata() {
        let mut ser = collection_to_serialized(&sample(), &DumpOptions::default());
        ser.metadata.rule_count = 7;
        assert!(matches!(validate(&ser), Err(DumpError::Validation(_))));
    }

    #[test]
    fn validate_rejects_duplicate_rule_names() {
        let mut ser = collection_to_serialized(&sample(), &DumpOptions::default());
        ser.rules[1].name = ser.rules[0].name.clone();
        assert!(matches!(validate(&ser), Err(DumpError::Validation(_))));
    }

    #[test]
    fn restore_keeps_declared_order() {
        let restored = BinaryDumper.restore(&artifact()).unwrap();
        assert_eq!(
            restored.declared_rules().keys().collect::<Vec<_>>(),
            ["a", "b"]
        );
    }
}
