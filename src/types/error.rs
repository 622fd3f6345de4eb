use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule expression must not be empty")]
    EmptyExpression,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_expression_message() {
        assert_eq!(
            RuleError::EmptyExpression.to_string(),
            "rule expression must not be empty"
        );
    }
}
