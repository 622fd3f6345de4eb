use indexmap::IndexMap;

use super::ast::Node;
use super::error::ExpressionError;
use super::function::ExpressionFunction;

/// Render a parsed tree back to source text.
///
/// Binary operations are fully parenthesised so the output does not depend
/// on precedence rules; calls are rendered by each function's compiler.
pub(crate) fn compile(
    node: &Node,
    functions: &IndexMap<String, ExpressionFunction>,
) -> Result<String, ExpressionError> {
    Ok(match node {
        Node::Literal(value) => value.to_string(),
        Node::Array(items) => {
            let parts = compile_all(items, functions)?;
            format!("[{}]", parts.join(", "))
        }
        Node::Name(path) => path.clone(),
        Node::Unary { op, operand } => format!("{op}{}", compile(operand, functions)?),
        Node::Binary { op, left, right } => format!(
            "({} {op} {})",
            compile(left, functions)?,
            compile(right, functions)?
        ),
        Node::Call { function, args } => {
            let f = functions
                .get(function)
                .ok_or_else(|| ExpressionError::UnknownFunction {
                    name: function.clone(),
                })?;
            f.compile(&compile_all(args, functions)?)
        }
    })
}

fn compile_all(
    nodes: &[Node],
    functions: &IndexMap<String, ExpressionFunction>,
) -> Result<Vec<String>, ExpressionError> {
    nodes.iter().map(|n| compile(n, functions)).collect()
}
