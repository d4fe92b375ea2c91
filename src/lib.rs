pub mod engine;
pub mod token;

mod error;

pub use engine::{Evaluation, Evaluator, Reduction, SharedVariables, Variables};
pub use error::EvalError;

/// Evaluates a single expression against `variables`, writing back any
/// assignments it makes.
pub fn evaluate_expression(
    expression: &str,
    variables: &mut impl Variables,
) -> Result<f64, EvalError> {
    Evaluator::new(variables).evaluate(expression)
}
