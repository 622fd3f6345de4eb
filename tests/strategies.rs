//! Shared proptest strategies for generating rules, collections and expressions.

#![allow(dead_code)]

use proptest::prelude::*;
use rulebook::{Rule, RuleCollection, TagAttributes, Value};

// --- Fixed name pools ---

const RULE_NAMES: &[&str] = &["adult", "minor", "vip", "gold", "retired", "blocked"];
const TAG_NAMES: &[&str] = &["audience", "billing", "experimental", "legacy"];
const ATTRIBUTE_KEYS: &[&str] = &["segment", "priority", "strict", "ratio"];
const EXPRESSIONS: &[&str] = &["age >= 18", "tier == 'gold'", "true", "1 + 1 == 2"];
const ARITH_OPS: &[&str] = &["+", "-", "*"];

pub fn arb_rule_name() -> impl Strategy<Value = String> {
    prop::sample::select(RULE_NAMES).prop_map(str::to_owned)
}

pub fn arb_tag_name() -> impl Strategy<Value = String> {
    prop::sample::select(TAG_NAMES).prop_map(str::to_owned)
}

// --- Values and tags ---

pub fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000_i64..1000).prop_map(Value::Int),
        "[a-z]{0,8}".prop_map(Value::String),
    ]
}

pub fn arb_tag_attributes() -> impl Strategy<Value = TagAttributes> {
    prop::collection::vec((prop::sample::select(ATTRIBUTE_KEYS), arb_scalar()), 0..3).prop_map(
        |pairs| {
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v))
                .collect()
        },
    )
}

/// One tag instance: a name and its attributes.
pub fn arb_tag() -> impl Strategy<Value = (String, TagAttributes)> {
    (arb_tag_name(), arb_tag_attributes())
}

// --- Rules and collections ---

pub fn arb_rule() -> impl Strategy<Value = Rule> {
    (
        prop::sample::select(EXPRESSIONS),
        prop::collection::vec(arb_tag(), 0..4),
    )
        .prop_map(|(expression, tags)| {
            let mut rule = Rule::new(expression).expect("non-empty expression");
            for (name, attributes) in tags {
                rule.add_tag(name, attributes);
            }
            rule
        })
}

/// Named rules in insertion order. Names come from a small pool so that
/// collisions are common.
pub fn arb_named_rules() -> impl Strategy<Value = Vec<(String, Rule)>> {
    prop::collection::vec((arb_rule_name(), arb_rule()), 0..8)
}

pub fn arb_collection() -> impl Strategy<Value = RuleCollection> {
    arb_named_rules().prop_map(|rules| {
        let mut collection = RuleCollection::new();
        for (name, rule) in rules {
            collection.add(name, rule);
        }
        collection
    })
}

// --- Arithmetic expressions with known results ---

/// An integer expression paired with the value it must evaluate to.
#[derive(Debug, Clone)]
pub struct GenArith {
    pub source: String,
    pub expected: i64,
}

pub fn arb_arith(depth: u32) -> impl Strategy<Value = GenArith> {
    let leaf = (-50_i64..50).prop_map(|n| GenArith {
        source: if n < 0 { format!("({n})") } else { n.to_string() },
        expected: n,
    });
    leaf.prop_recursive(depth, 16, 2, |inner| {
        (inner.clone(), prop::sample::select(ARITH_OPS), inner).prop_map(
            |(lhs, op, rhs)| {
                let expected = match op {
                    "+" => lhs.expected + rhs.expected,
                    "-" => lhs.expected - rhs.expected,
                    _ => lhs.expected * rhs.expected,
                };
                GenArith {
                    source: format!("({} {op} {})", lhs.source, rhs.source),
                    expected,
                }
            },
        )
    })
}
