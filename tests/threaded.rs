use std::sync::Arc;
use std::thread;

use indexmap::IndexMap;
use rulebook::{
    Context, ExpressionError, ExtensibleEvaluator, Extension, Rule, RuleCollection, Value,
};

struct Limits;

impl Extension for Limits {
    fn name(&self) -> &str {
        "limits"
    }

    fn globals(&self) -> IndexMap<String, Value> {
        let mut globals = IndexMap::new();
        globals.insert("min_age".to_owned(), Value::Int(18));
        globals
    }

    fn functions(&self) -> Vec<String> {
        vec!["is_active".to_owned()]
    }

    fn call(&self, function: &str, args: &[Value]) -> Result<Value, ExpressionError> {
        match args {
            [Value::String(status)] => Ok(Value::Bool(status == "active")),
            _ => Err(ExpressionError::function(function, "expected a status string")),
        }
    }
}

fn rules() -> RuleCollection {
    let mut rules = RuleCollection::new();
    rules.add("eligible_age", Rule::new("user.age >= min_age").unwrap());
    rules.add("active_account", Rule::new("is_active(user.status)").unwrap());
    rules.add(
        "can_proceed",
        Rule::new("user.age >= min_age and is_active(user.status) and not user.banned").unwrap(),
    );
    rules
}

#[test]
fn evaluate_across_threads() {
    let mut evaluator = ExtensibleEvaluator::new();
    evaluator.register_extension(Arc::new(Limits));
    let evaluator = Arc::new(evaluator);
    let rules = Arc::new(rules());

    let mut handles = vec![];

    // Thread 1: eligible, active, not banned
    let (ev, rs) = (Arc::clone(&evaluator), Arc::clone(&rules));
    handles.push(thread::spawn(move || {
        let ctx = Context::new()
            .set("user.age", 25_i64)
            .set("user.status", "active")
            .set("user.banned", false);
        ev.evaluate(rs.get("can_proceed").unwrap().expression(), &ctx)
    }));

    // Thread 2: banned user
    let (ev, rs) = (Arc::clone(&evaluator), Arc::clone(&rules));
    handles.push(thread::spawn(move || {
        let ctx = Context::new()
            .set("user.age", 30_i64)
            .set("user.status", "active")
            .set("user.banned", true);
        ev.evaluate(rs.get("can_proceed").unwrap().expression(), &ctx)
    }));

    // Thread 3: underage
    let (ev, rs) = (Arc::clone(&evaluator), Arc::clone(&rules));
    handles.push(thread::spawn(move || {
        let ctx = Context::new().set("user.age", 15_i64);
        ev.evaluate(rs.get("eligible_age").unwrap().expression(), &ctx)
    }));

    // Thread 4: inactive account
    let (ev, rs) = (Arc::clone(&evaluator), Arc::clone(&rules));
    handles.push(thread::spawn(move || {
        let ctx = Context::new().set("user.status", "inactive");
        ev.evaluate(rs.get("active_account").unwrap().expression(), &ctx)
    }));

    let results: Vec<Result<Value, ExpressionError>> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results[0], Ok(Value::Bool(true)));
    assert_eq!(results[1], Ok(Value::Bool(false)));
    assert_eq!(results[2], Ok(Value::Bool(false)));
    assert_eq!(results[3], Ok(Value::Bool(false)));
}

#[test]
fn shared_parse_cache_under_contention() {
    let evaluator = Arc::new(ExtensibleEvaluator::new());

    let handles: Vec<_> = (0..8_i64)
        .map(|i| {
            let ev = Arc::clone(&evaluator);
            thread::spawn(move || {
                (0..100_i64)
                    .map(|j| {
                        let ctx = Context::new().set("x", i).set("y", j);
                        ev.evaluate("x * 100 + y", &ctx).unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for (i, handle) in (0_i64..).zip(handles) {
        let values = handle.join().unwrap();
        for (j, value) in (0_i64..).zip(values) {
            assert_eq!(value, Value::Int(i * 100 + j));
        }
    }
}
