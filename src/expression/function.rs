use std::fmt;
use std::sync::Arc;

use super::error::ExpressionError;
use crate::{Context, Value};

/// Renders a call site to source text, given the already-compiled arguments.
pub type CompileFn = Arc<dyn Fn(&[String]) -> String + Send + Sync>;

/// Computes a call's result. Receives the call's [`Scope`] ahead of the
/// call-site argument values.
pub type EvaluateFn =
    Arc<dyn Fn(&Scope<'_>, &[Value]) -> Result<Value, ExpressionError> + Send + Sync>;

/// What a function sees of the evaluation it is called from.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    variables: &'a Context,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(variables: &'a Context) -> Self {
        Self { variables }
    }

    #[must_use]
    pub fn variables(&self) -> &'a Context {
        self.variables
    }
}

/// A named function callable from expressions.
///
/// The compile and evaluate callbacks are registered together so the
/// compiled and interpreted forms of a call cannot drift apart.
#[derive(Clone)]
pub struct ExpressionFunction {
    name: String,
    compiler: CompileFn,
    evaluator: EvaluateFn,
}

impl ExpressionFunction {
    pub fn new(
        name: impl Into<String>,
        compiler: impl Fn(&[String]) -> String + Send + Sync + 'static,
        evaluator: impl Fn(&Scope<'_>, &[Value]) -> Result<Value, ExpressionError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            compiler: Arc::new(compiler),
            evaluator: Arc::new(evaluator),
        }
    }

    /// A function compiled as a plain `name(args)` call.
    pub fn simple(
        name: impl Into<String>,
        evaluator: impl Fn(&[Value]) -> Result<Value, ExpressionError> + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        let call_name = name.clone();
        Self::new(
            name,
            move |args| format!("{call_name}({})", args.join(", ")),
            move |_, args| evaluator(args),
        )
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn compile(&self, args: &[String]) -> String {
        (self.compiler)(args)
    }

    /// Invoke the evaluation callback.
    ///
    /// # Errors
    ///
    /// Propagates whatever the callback returns.
    pub fn call(&self, scope: &Scope<'_>, args: &[Value]) -> Result<Value, ExpressionError> {
        (self.evaluator)(scope, args)
    }
}

impl fmt::Debug for ExpressionFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
