use indexmap::IndexMap;

use super::ast::{BinaryOp, Node, UnaryOp};
use super::error::ExpressionError;
use super::function::{ExpressionFunction, Scope};
use crate::Value;

pub(crate) fn evaluate(
    node: &Node,
    scope: &Scope<'_>,
    functions: &IndexMap<String, ExpressionFunction>,
) -> Result<Value, ExpressionError> {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Array(items) => items
            .iter()
            .map(|item| evaluate(item, scope, functions))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Node::Name(path) => {
            let segments: Vec<&str> = path.split('.').collect();
            scope
                .variables()
                .lookup(&segments)
                .cloned()
                .ok_or_else(|| ExpressionError::UnknownVariable { name: path.clone() })
        }
        Node::Unary { op, operand } => {
            let value = evaluate(operand, scope, functions)?;
            eval_unary(*op, value)
        }
        Node::Binary { op, left, right } => match op {
            BinaryOp::And => {
                let lhs = evaluate(left, scope, functions)?;
                if !lhs.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(evaluate(right, scope, functions)?.is_truthy()))
            }
            BinaryOp::Or => {
                let lhs = evaluate(left, scope, functions)?;
                if lhs.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(evaluate(right, scope, functions)?.is_truthy()))
            }
            _ => {
                let lhs = evaluate(left, scope, functions)?;
                let rhs = evaluate(right, scope, functions)?;
                eval_binary(*op, &lhs, &rhs)
            }
        },
        Node::Call { function, args } => {
            let f = functions
                .get(function)
                .ok_or_else(|| ExpressionError::UnknownFunction {
                    name: function.clone(),
                })?;
            let values = args
                .iter()
                .map(|arg| evaluate(arg, scope, functions))
                .collect::<Result<Vec<_>, _>>()?;
            f.call(scope, &values)
        }
    }
}

fn eval_unary(op: UnaryOp, value: Value) -> Result<Value, ExpressionError> {
    match (op, value) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| ExpressionError::Overflow { op: "-".into() }),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, other) => Err(ExpressionError::InvalidOperand {
            op: "-".into(),
            operand: other.type_name(),
        }),
    }
}

fn mismatch(op: BinaryOp, lhs: &Value, rhs: &Value) -> ExpressionError {
    ExpressionError::TypeMismatch {
        op: op.to_string(),
        left: lhs.type_name(),
        right: rhs.type_name(),
    }
}

fn eval_binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, ExpressionError> {
    match op {
        BinaryOp::Compare(cmp) => lhs
            .compare(cmp, rhs)
            .map(Value::Bool)
            .ok_or_else(|| mismatch(op, lhs, rhs)),
        BinaryOp::In => contains(rhs, lhs)
            .map(Value::Bool)
            .ok_or_else(|| mismatch(op, lhs, rhs)),
        BinaryOp::NotIn => contains(rhs, lhs)
            .map(|found| Value::Bool(!found))
            .ok_or_else(|| mismatch(op, lhs, rhs)),
        BinaryOp::Concat => Ok(Value::String(format!("{}{}", lhs.to_text(), rhs.to_text()))),
        BinaryOp::Add => arithmetic(op, lhs, rhs, i64::checked_add, |a, b| a + b),
        BinaryOp::Sub => arithmetic(op, lhs, rhs, i64::checked_sub, |a, b| a - b),
        BinaryOp::Mul => arithmetic(op, lhs, rhs, i64::checked_mul, |a, b| a * b),
        BinaryOp::Div => divide(lhs, rhs),
        BinaryOp::Mod => match (lhs, rhs) {
            (Value::Int(_), Value::Int(0)) => Err(ExpressionError::DivisionByZero),
            (Value::Int(a), Value::Int(b)) => a
                .checked_rem(*b)
                .map(Value::Int)
                .ok_or_else(|| ExpressionError::Overflow { op: "%".into() }),
            _ => Err(mismatch(op, lhs, rhs)),
        },
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuited by the caller"),
    }
}

fn contains(haystack: &Value, needle: &Value) -> Option<bool> {
    match haystack {
        Value::List(items) => Some(items.iter().any(|item| item.loose_eq(needle))),
        Value::Map(entries) => needle.as_str().map(|key| entries.contains_key(key)),
        _ => None,
    }
}

fn arithmetic(
    op: BinaryOp,
    lhs: &Value,
    rhs: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, ExpressionError> {
    if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
        return int_op(*a, *b)
            .map(Value::Int)
            .ok_or_else(|| ExpressionError::Overflow { op: op.to_string() });
    }
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(a), Some(b)) => Ok(Value::Float(float_op(a, b))),
        _ => Err(mismatch(op, lhs, rhs)),
    }
}

/// Integer division stays integral only when exact.
fn divide(lhs: &Value, rhs: &Value) -> Result<Value, ExpressionError> {
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(_), Some(b)) if b == 0.0 => Err(ExpressionError::DivisionByZero),
        (Some(a), Some(b)) => {
            if let (Value::Int(x), Value::Int(y)) = (lhs, rhs) {
                if x.checked_rem(*y) == Some(0) {
                    if let Some(q) = x.checked_div(*y) {
                        return Ok(Value::Int(q));
                    }
                }
            }
            Ok(Value::Float(a / b))
        }
        _ => Err(mismatch(BinaryOp::Div, lhs, rhs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::grammar::parse_expression;
    use crate::Context;

    fn eval(source: &str, ctx: &Context) -> Result<Value, ExpressionError> {
        let node = parse_expression(source).unwrap();
        evaluate(&node, &Scope::new(ctx), &IndexMap::new())
    }

    fn eval_ok(source: &str) -> Value {
        eval(source, &Context::new()).unwrap()
    }

    #[test]
    fn arithmetic_int_and_float() {
        assert_eq!(eval_ok("1 + 1"), Value::Int(2));
        assert_eq!(eval_ok("7 - 10"), Value::Int(-3));
        assert_eq!(eval_ok("2 * 3.5"), Value::Float(7.0));
        assert_eq!(eval_ok("7 % 3"), Value::Int(1));
        assert_eq!(eval_ok("-(2 + 3)"), Value::Int(-5));
    }

    #[test]
    fn division_stays_integral_when_exact() {
        assert_eq!(eval_ok("6 / 3"), Value::Int(2));
        assert_eq!(eval_ok("7 / 2"), Value::Float(3.5));
    }

    #[test]
    fn division_by_zero() {
        let ctx = Context::new();
        assert_eq!(eval("1 / 0", &ctx), Err(ExpressionError::DivisionByZero));
        assert_eq!(eval("1 % 0", &ctx), Err(ExpressionError::DivisionByZero));
    }

    #[test]
    fn overflow_is_reported() {
        let ctx = Context::new().set("big", i64::MAX);
        assert!(matches!(
            eval("big + 1", &ctx),
            Err(ExpressionError::Overflow { .. })
        ));
    }

    #[test]
    fn logic_short_circuits() {
        // `missing` would fail to resolve if evaluated.
        let ctx = Context::new();
        assert_eq!(eval("false and missing", &ctx), Ok(Value::Bool(false)));
        assert_eq!(eval("true or missing", &ctx), Ok(Value::Bool(true)));
        assert_eq!(eval_ok("not (1 > 2)"), Value::Bool(true));
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval_ok("2 >= 2"), Value::Bool(true));
        assert_eq!(eval_ok("'a' < 'b'"), Value::Bool(true));
        assert_eq!(eval_ok("1 == 1.0"), Value::Bool(true));
        assert_eq!(eval_ok("'1' != 1"), Value::Bool(true));
    }

    #[test]
    fn ordering_across_types_fails() {
        assert!(matches!(
            eval("'a' > 1", &Context::new()),
            Err(ExpressionError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn membership() {
        assert_eq!(eval_ok("2 in [1, 2, 3]"), Value::Bool(true));
        assert_eq!(eval_ok("4 not in [1, 2, 3]"), Value::Bool(true));
        let ctx = Context::new().set("user.name", "ann");
        assert_eq!(eval("'name' in user", &ctx), Ok(Value::Bool(true)));
    }

    #[test]
    fn concat_renders_text() {
        assert_eq!(eval_ok("'n=' ~ 3"), Value::from("n=3"));
    }

    #[test]
    fn nested_names() {
        let ctx = Context::new().set("user.profile.age", 30_i64);
        assert_eq!(eval("user.profile.age + 1", &ctx), Ok(Value::Int(31)));
        assert!(matches!(
            eval("user.profile.height", &ctx),
            Err(ExpressionError::UnknownVariable { name }) if name == "user.profile.height"
        ));
    }

    #[test]
    fn unknown_function_at_runtime() {
        assert!(matches!(
            eval("nope(1)", &Context::new()),
            Err(ExpressionError::UnknownFunction { name }) if name == "nope"
        ));
    }

    #[test]
    fn string_plus_int_is_mismatch() {
        assert!(matches!(
            eval("'a' + 1", &Context::new()),
            Err(ExpressionError::TypeMismatch { .. })
        ));
    }
}
