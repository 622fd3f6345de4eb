use std::fmt;

use crate::Value;

/// Comparison operators supported in expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Binary operators, from lowest to highest binding power.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Compare(CompareOp),
    In,
    NotIn,
    Add,
    Sub,
    Concat,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Parsed expression tree.
///
/// Names keep their dotted form (`user.age`); the first segment is the
/// variable, the rest walk nested maps at evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Literal(Value),
    Array(Vec<Node>),
    Name(String),
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Call {
        function: String,
        args: Vec<Node>,
    },
}

impl Node {
    pub(crate) fn binary(op: BinaryOp, left: Node, right: Node) -> Node {
        Node::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub(crate) fn unary(op: UnaryOp, operand: Node) -> Node {
        Node::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// Visit every variable root and function name referenced by the tree.
    pub(crate) fn walk_references<'a>(&'a self, visit: &mut impl FnMut(Reference<'a>)) {
        match self {
            Node::Literal(_) => {}
            Node::Array(items) => {
                for item in items {
                    item.walk_references(visit);
                }
            }
            Node::Name(path) => visit(Reference::Name(root_segment(path))),
            Node::Unary { operand, .. } => operand.walk_references(visit),
            Node::Binary { left, right, .. } => {
                left.walk_references(visit);
                right.walk_references(visit);
            }
            Node::Call { function, args } => {
                visit(Reference::Call(function));
                for arg in args {
                    arg.walk_references(visit);
                }
            }
        }
    }
}

/// A variable root or function name found while walking a [`Node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reference<'a> {
    Name(&'a str),
    Call(&'a str),
}

pub(crate) fn root_segment(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "=="),
            CompareOp::Neq => write!(f, "!="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Gte => write!(f, ">="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Lte => write!(f, "<="),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Or => write!(f, "or"),
            BinaryOp::And => write!(f, "and"),
            BinaryOp::Compare(op) => write!(f, "{op}"),
            BinaryOp::In => write!(f, "in"),
            BinaryOp::NotIn => write!(f, "not in"),
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Sub => write!(f, "-"),
            BinaryOp::Concat => write!(f, "~"),
            BinaryOp::Mul => write!(f, "*"),
            BinaryOp::Div => write!(f, "/"),
            BinaryOp::Mod => write!(f, "%"),
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "not "),
            UnaryOp::Neg => write!(f, "-"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_collects_roots_and_calls() {
        let node = Node::binary(
            BinaryOp::And,
            Node::Name("user.age".into()),
            Node::Call {
                function: "double".into(),
                args: vec![Node::Name("x".into()), Node::Literal(Value::Int(1))],
            },
        );
        let mut seen = Vec::new();
        node.walk_references(&mut |r| seen.push(r));
        assert_eq!(
            seen,
            vec![
                Reference::Name("user"),
                Reference::Call("double"),
                Reference::Name("x"),
            ]
        );
    }

    #[test]
    fn operator_display() {
        assert_eq!(BinaryOp::Compare(CompareOp::Gte).to_string(), ">=");
        assert_eq!(BinaryOp::NotIn.to_string(), "not in");
        assert_eq!(UnaryOp::Not.to_string(), "not ");
    }
}
