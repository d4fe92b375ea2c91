use log::debug;
use prioeval::token::tokenize;
use prioeval::Evaluator;
use std::collections::HashMap;

fn main() {
    pretty_env_logger::init();

    let expr = "radius = 2.5";
    let tokens: Vec<String> = tokenize(expr).map(|token| token.to_string()).collect();
    debug!("tokens: {tokens:?}");

    let mut evaluator = Evaluator::new(HashMap::new());
    evaluator.evaluate(expr).unwrap();

    for expr in ["radius ^ 2 * 3.14159", "sin(30) * 2", "(1 + 2) * -(3 - 5)", "missing + 1"] {
        match evaluator.evaluate_traced(expr) {
            Ok(evaluation) => {
                println!("{expr} = {}", evaluation.value);
                for step in &evaluation.trace {
                    println!("    {} @ {}", step.operator, step.priority);
                }
            }
            Err(err) => println!("{expr}: {err}"),
        }
    }
}
