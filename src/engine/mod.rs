mod evaluator;
mod variables;

pub use evaluator::{Evaluation, Evaluator, Reduction};
pub use variables::{SharedVariables, Variables};
