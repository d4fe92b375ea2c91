use thiserror::Error;

/// Failure of a single evaluation call. None of these are recovered from.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Unrecognized character or unbalanced `)`, reported by the tokenizer.
    #[error("{0}")]
    Lexical(String),

    #[error("unknown operator: {0}")]
    UnknownOperator(char),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    /// Operand/operator stacks did not reduce to a single value.
    #[error("malformed expression: {0}")]
    MalformedExpression(String),

    #[error("invalid assignment target")]
    InvalidAssignmentTarget,
}

impl EvalError {
    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        EvalError::MalformedExpression(detail.into())
    }
}
