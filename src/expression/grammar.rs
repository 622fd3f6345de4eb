use winnow::ascii::digit1;
use winnow::combinator::{alt, cut_err, delimited, opt, repeat, separated};
use winnow::error::{ErrMode, ModalResult, ParserError as _, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{any, literal, take_while};

use super::ast::{BinaryOp, CompareOp, Node, UnaryOp};
use super::error::ExpressionError;
use crate::Value;

// -- Operator tables (longest symbol first) -----------------------------------

const OR_OPS: &[(&str, BinaryOp)] = &[("||", BinaryOp::Or), ("or", BinaryOp::Or)];

const AND_OPS: &[(&str, BinaryOp)] = &[("&&", BinaryOp::And), ("and", BinaryOp::And)];

const COMPARE_OPS: &[(&str, BinaryOp)] = &[
    ("==", BinaryOp::Compare(CompareOp::Eq)),
    ("!=", BinaryOp::Compare(CompareOp::Neq)),
    ("<=", BinaryOp::Compare(CompareOp::Lte)),
    (">=", BinaryOp::Compare(CompareOp::Gte)),
    ("<", BinaryOp::Compare(CompareOp::Lt)),
    (">", BinaryOp::Compare(CompareOp::Gt)),
    ("not in", BinaryOp::NotIn),
    ("in", BinaryOp::In),
];

const ADDITIVE_OPS: &[(&str, BinaryOp)] = &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)];

const CONCAT_OPS: &[(&str, BinaryOp)] = &[("~", BinaryOp::Concat)];

const MULTIPLICATIVE_OPS: &[(&str, BinaryOp)] = &[
    ("*", BinaryOp::Mul),
    ("/", BinaryOp::Div),
    ("%", BinaryOp::Mod),
];

const RESERVED: &[&str] = &["and", "or", "not", "in"];

// -- Whitespace & identifiers -------------------------------------------------

fn ws(input: &mut &str) -> ModalResult<()> {
    take_while(0.., |c: char| c.is_ascii_whitespace())
        .void()
        .parse_next(input)
}

fn ident<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        take_while(1.., |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

/// `user.profile.age`
fn path<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (ident, repeat::<_, _, (), _, _>(0.., ('.', ident)))
        .take()
        .parse_next(input)
}

/// A whole word, so `order` never matches `or`.
fn keyword(input: &mut &str, word: &str) -> ModalResult<()> {
    let checkpoint = input.checkpoint();
    let found = ident.parse_next(input)?;
    if found == word {
        Ok(())
    } else {
        input.reset(&checkpoint);
        Err(ErrMode::from_input(input))
    }
}

/// Space-separated keywords such as `not in`.
fn words(input: &mut &str, phrase: &str) -> ModalResult<()> {
    for (i, word) in phrase.split(' ').enumerate() {
        if i > 0 {
            ws.parse_next(input)?;
        }
        keyword(input, word)?;
    }
    Ok(())
}

/// Try each operator of a precedence level; leaves the input untouched when none matches.
fn operator(input: &mut &str, table: &[(&str, BinaryOp)]) -> ModalResult<Option<BinaryOp>> {
    let start = input.checkpoint();
    ws.parse_next(input)?;
    for &(symbol, op) in table {
        let checkpoint = input.checkpoint();
        let matched = if symbol.starts_with(|c: char| c.is_ascii_alphabetic()) {
            words(input, symbol).is_ok()
        } else {
            let found: ModalResult<&str> = literal(symbol).parse_next(input);
            found.is_ok()
        };
        if matched {
            return Ok(Some(op));
        }
        input.reset(&checkpoint);
    }
    input.reset(&start);
    Ok(None)
}

// -- Literals -----------------------------------------------------------------

fn string_literal(input: &mut &str) -> ModalResult<String> {
    let quote = alt(('"', '\'')).parse_next(input)?;
    let mut s = String::new();
    loop {
        let ch = cut_err(any).parse_next(input)?;
        match ch {
            c if c == quote => return Ok(s),
            '\\' => {
                let esc = cut_err(any).parse_next(input)?;
                match esc {
                    '"' => s.push('"'),
                    '\'' => s.push('\''),
                    '\\' => s.push('\\'),
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    other => {
                        s.push('\\');
                        s.push(other);
                    }
                }
            }
            c => s.push(c),
        }
    }
}

fn number(input: &mut &str) -> ModalResult<Value> {
    let text = (digit1, opt(('.', digit1))).take().parse_next(input)?;
    if text.contains('.') {
        text.parse::<f64>()
            .map(Value::Float)
            .map_err(|_| ErrMode::from_input(input).cut())
    } else {
        text.parse::<i64>()
            .map(Value::Int)
            .map_err(|_| ErrMode::from_input(input).cut())
    }
}

fn arguments(input: &mut &str, close: char) -> ModalResult<Vec<Node>> {
    let items: Vec<Node> = separated(0.., expr, (ws, ',')).parse_next(input)?;
    cut_err((ws, close)).parse_next(input)?;
    Ok(items)
}

fn array(input: &mut &str) -> ModalResult<Node> {
    '['.parse_next(input)?;
    arguments(input, ']').map(Node::Array)
}

// -- Primary ------------------------------------------------------------------

fn name_or_call(input: &mut &str) -> ModalResult<Node> {
    let checkpoint = input.checkpoint();
    let name = path.parse_next(input)?;
    match name {
        "true" => return Ok(Node::Literal(Value::Bool(true))),
        "false" => return Ok(Node::Literal(Value::Bool(false))),
        "null" => return Ok(Node::Literal(Value::Null)),
        reserved if RESERVED.contains(&reserved) => {
            input.reset(&checkpoint);
            return Err(ErrMode::from_input(input));
        }
        _ => {}
    }

    let after_name = input.checkpoint();
    ws.parse_next(input)?;
    if opt('(').parse_next(input)?.is_some() {
        if name.contains('.') {
            return Err(ErrMode::from_input(input).cut());
        }
        let args = arguments(input, ')')?;
        return Ok(Node::Call {
            function: name.to_owned(),
            args,
        });
    }
    input.reset(&after_name);
    Ok(Node::Name(name.to_owned()))
}

fn primary(input: &mut &str) -> ModalResult<Node> {
    ws.parse_next(input)?;
    alt((
        delimited('(', expr, cut_err((ws, ')'))),
        array,
        string_literal.map(|s| Node::Literal(Value::String(s))),
        number.map(Node::Literal),
        name_or_call,
    ))
    .context(StrContext::Expected(StrContextValue::Description(
        "expression",
    )))
    .parse_next(input)
}

// -- Operators (precedence: or < and < comparison < + - < ~ < * / % < unary) ---

fn unary(input: &mut &str) -> ModalResult<Node> {
    ws.parse_next(input)?;
    if keyword(input, "not").is_ok() || opt('!').parse_next(input)?.is_some() {
        let operand = cut_err(unary).parse_next(input)?;
        return Ok(Node::unary(UnaryOp::Not, operand));
    }
    if opt('-').parse_next(input)?.is_some() {
        let operand = cut_err(unary).parse_next(input)?;
        return Ok(Node::unary(UnaryOp::Neg, operand));
    }
    primary(input)
}

fn binary_level(
    input: &mut &str,
    table: &[(&str, BinaryOp)],
    next: fn(&mut &str) -> ModalResult<Node>,
) -> ModalResult<Node> {
    let mut left = next(input)?;
    while let Some(op) = operator(input, table)? {
        let right = cut_err(next).parse_next(input)?;
        left = Node::binary(op, left, right);
    }
    Ok(left)
}

fn multiplicative(input: &mut &str) -> ModalResult<Node> {
    binary_level(input, MULTIPLICATIVE_OPS, unary)
}

fn concat(input: &mut &str) -> ModalResult<Node> {
    binary_level(input, CONCAT_OPS, multiplicative)
}

fn additive(input: &mut &str) -> ModalResult<Node> {
    binary_level(input, ADDITIVE_OPS, concat)
}

fn comparison(input: &mut &str) -> ModalResult<Node> {
    binary_level(input, COMPARE_OPS, additive)
}

fn and_expr(input: &mut &str) -> ModalResult<Node> {
    binary_level(input, AND_OPS, comparison)
}

fn or_expr(input: &mut &str) -> ModalResult<Node> {
    binary_level(input, OR_OPS, and_expr)
}

fn expr(input: &mut &str) -> ModalResult<Node> {
    ws.parse_next(input)?;
    or_expr(input)
}

fn expression(input: &mut &str) -> ModalResult<Node> {
    let node = expr(input)?;
    ws.parse_next(input)?;
    Ok(node)
}

// -- Entry point --------------------------------------------------------------

/// Parse a complete expression string into a [`Node`] tree.
pub(crate) fn parse_expression(source: &str) -> Result<Node, ExpressionError> {
    expression.parse(source).map_err(|e| {
        let message = e.inner().to_string();
        ExpressionError::Syntax {
            expression: source.to_owned(),
            offset: e.offset(),
            message: if message.is_empty() {
                "unexpected input".to_owned()
            } else {
                message
            },
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Node {
        parse_expression(source).unwrap()
    }

    fn int(v: i64) -> Node {
        Node::Literal(Value::Int(v))
    }

    fn name(n: &str) -> Node {
        Node::Name(n.to_owned())
    }

    #[test]
    fn parse_literals() {
        assert_eq!(parse("42"), int(42));
        assert_eq!(parse("3.5"), Node::Literal(Value::Float(3.5)));
        assert_eq!(parse("true"), Node::Literal(Value::Bool(true)));
        assert_eq!(parse("null"), Node::Literal(Value::Null));
        assert_eq!(parse("'hi'"), Node::Literal(Value::from("hi")));
        assert_eq!(parse(r#""a\"b""#), Node::Literal(Value::from("a\"b")));
    }

    #[test]
    fn parse_dotted_name() {
        assert_eq!(parse("user.profile.age"), name("user.profile.age"));
    }

    #[test]
    fn parse_precedence_mul_before_add() {
        assert_eq!(
            parse("1 + 2 * 3"),
            Node::binary(
                BinaryOp::Add,
                int(1),
                Node::binary(BinaryOp::Mul, int(2), int(3))
            )
        );
    }

    #[test]
    fn concat_binds_tighter_than_add() {
        assert_eq!(
            parse("'a' ~ 1 + 2"),
            Node::binary(
                BinaryOp::Add,
                Node::binary(BinaryOp::Concat, Node::Literal(Value::from("a")), int(1)),
                int(2)
            )
        );
        assert_eq!(
            parse("1 + 2 ~ 'b'"),
            Node::binary(
                BinaryOp::Add,
                int(1),
                Node::binary(BinaryOp::Concat, int(2), Node::Literal(Value::from("b")))
            )
        );
    }

    #[test]
    fn parse_precedence_and_before_or() {
        let node = parse("a or b and c");
        match node {
            Node::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                assert_eq!(*left, name("a"));
                assert!(matches!(*right, Node::Binary { op: BinaryOp::And, .. }));
            }
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn parse_symbolic_logic_ops() {
        assert_eq!(parse("a && b"), parse("a and b"));
        assert_eq!(parse("a || b"), parse("a or b"));
        assert_eq!(parse("!a"), parse("not a"));
    }

    #[test]
    fn parse_all_comparison_ops() {
        let ops = [
            ("==", CompareOp::Eq),
            ("!=", CompareOp::Neq),
            (">", CompareOp::Gt),
            (">=", CompareOp::Gte),
            ("<", CompareOp::Lt),
            ("<=", CompareOp::Lte),
        ];
        for (sym, expected) in ops {
            let node = parse(&format!("x {sym} 1"));
            match node {
                Node::Binary {
                    op: BinaryOp::Compare(op),
                    ..
                } => assert_eq!(op, expected, "failed for {sym}"),
                other => panic!("expected comparison for {sym}, got {other:?}"),
            }
        }
    }

    #[test]
    fn parse_in_and_not_in() {
        assert!(matches!(
            parse("x in [1, 2]"),
            Node::Binary { op: BinaryOp::In, .. }
        ));
        assert!(matches!(
            parse("x not in [1, 2]"),
            Node::Binary { op: BinaryOp::NotIn, .. }
        ));
    }

    #[test]
    fn keywords_need_word_boundary() {
        assert_eq!(parse("order"), name("order"));
        assert_eq!(parse("notice"), name("notice"));
        assert_eq!(parse("index"), name("index"));
    }

    #[test]
    fn parse_function_call() {
        assert_eq!(
            parse("max(a, 2)"),
            Node::Call {
                function: "max".into(),
                args: vec![name("a"), int(2)],
            }
        );
        assert_eq!(
            parse("now()"),
            Node::Call {
                function: "now".into(),
                args: vec![],
            }
        );
    }

    #[test]
    fn parse_array() {
        assert_eq!(parse("[]"), Node::Array(vec![]));
        assert_eq!(parse("[ 1 , x ]"), Node::Array(vec![int(1), name("x")]));
    }

    #[test]
    fn parse_unary_minus() {
        assert_eq!(parse("-5"), Node::unary(UnaryOp::Neg, int(5)));
        assert_eq!(
            parse("3 - -2"),
            Node::binary(BinaryOp::Sub, int(3), Node::unary(UnaryOp::Neg, int(2)))
        );
    }

    #[test]
    fn parse_parentheses() {
        assert_eq!(
            parse("(1 + 2) * 3"),
            Node::binary(
                BinaryOp::Mul,
                Node::binary(BinaryOp::Add, int(1), int(2)),
                int(3)
            )
        );
    }

    #[test]
    fn syntax_errors() {
        for bad in ["", "1 +", "(1", "a b", "and", "'open", "f(1,", "a.b(1)"] {
            let err = parse_expression(bad).unwrap_err();
            assert!(
                matches!(err, ExpressionError::Syntax { .. }),
                "expected syntax error for {bad:?}, got {err:?}"
            );
        }
    }
}
