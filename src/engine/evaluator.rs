use crate::engine::Variables;
use crate::token::{tokenize, BinaryOp, Function, Punct, Token, UnaryOp};
use crate::EvalError;
use log::{debug, trace};
use std::collections::HashMap;

/// One reduction step: which operator was applied and the priority it was
/// resolved at.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub operator: String,
    pub priority: i32,
}

/// Result of [`Evaluator::evaluate_traced`].
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub value: f64,
    /// Reductions in the order they were performed.
    pub trace: Vec<Reduction>,
}

/// Priority-climbing evaluator over a token stream.
///
/// Operands and pending operators live on two stacks; no tree is built.
/// Token priorities already include the parenthesis nesting offset, so the
/// `(` marker only bounds how far a `)` reduces. `=` is the exception to
/// plain priority order: it stays pending until its whole right-hand side
/// has been reduced.
pub struct Evaluator<V: Variables> {
    variables: V,
}

impl Default for Evaluator<HashMap<String, f64>> {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl<V: Variables> Evaluator<V> {
    pub fn new(variables: V) -> Self {
        Self { variables }
    }

    pub fn variables(&self) -> &V {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut V {
        &mut self.variables
    }

    pub fn into_variables(self) -> V {
        self.variables
    }

    /// Evaluates `expression`, writing any `=` assignments to the store.
    pub fn evaluate(&mut self, expression: &str) -> Result<f64, EvalError> {
        self.evaluate_traced(expression)
            .map(|evaluation| evaluation.value)
    }

    /// Like [`evaluate`](Self::evaluate), also returning every reduction
    /// performed with its resolved priority.
    pub fn evaluate_traced(&mut self, expression: &str) -> Result<Evaluation, EvalError> {
        debug!("Evaluating expression: {}", expression);
        let mut stacks = Stacks::new(&mut self.variables);
        let mut expect_operand = true;
        let mut previous: Option<Token> = None;

        for token in tokenize(expression) {
            match &token {
                Token::Literal(value) => {
                    if !expect_operand {
                        return Err(EvalError::malformed(format!("unexpected {token}")));
                    }
                    stacks.operands.push(Operand::Number(*value));
                    expect_operand = false;
                }
                Token::Variable(name) => {
                    if !expect_operand {
                        return Err(EvalError::malformed(format!("unexpected {token}")));
                    }
                    stacks.operands.push(Operand::Variable(name.clone()));
                    expect_operand = false;
                }
                Token::Binary { op, offset } => {
                    if expect_operand {
                        return Err(EvalError::malformed(format!(
                            "missing operand before '{}'",
                            op.symbol()
                        )));
                    }
                    stacks.push_operator(Pending::Binary {
                        op: *op,
                        priority: op.base_priority().saturating_add(*offset),
                    })?;
                    expect_operand = true;
                }
                Token::Unary { op, offset } => {
                    stacks.push_operator(Pending::Unary {
                        op: *op,
                        priority: UnaryOp::PRIORITY.saturating_add(*offset),
                    })?;
                }
                Token::Function { func, offset } => {
                    if !expect_operand {
                        return Err(EvalError::malformed(format!("unexpected {token}")));
                    }
                    stacks.push_operator(Pending::Function {
                        func: *func,
                        priority: Function::PRIORITY.saturating_add(*offset),
                    })?;
                }
                Token::Punct(Punct::Open) => {
                    if !expect_operand {
                        return Err(match previous {
                            Some(Token::Variable(name)) => EvalError::UnknownFunction(name),
                            _ => EvalError::malformed("unexpected '('"),
                        });
                    }
                    stacks.pending.push(Pending::Open);
                }
                Token::Punct(Punct::Close) => {
                    if expect_operand {
                        return Err(EvalError::malformed("missing operand before ')'"));
                    }
                    stacks.close_group()?;
                }
                Token::Punct(Punct::Comma) => {
                    return Err(EvalError::malformed("unexpected ','"));
                }
                Token::End => {
                    if expect_operand {
                        return Err(EvalError::malformed("unexpected end of expression"));
                    }
                    let evaluation = stacks.finish()?;
                    debug!("Result: {}", evaluation.value);
                    return Ok(evaluation);
                }
                Token::Error(message) => return Err(EvalError::Lexical(message.clone())),
            }
            previous = Some(token);
        }

        Err(EvalError::malformed("unexpected end of expression"))
    }
}

/// Operand stack entry. Variables stay unresolved until consumed so that an
/// assignment target is never read.
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Number(f64),
    Variable(String),
}

/// Operator stack entry, carrying the priority it was resolved at.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Pending {
    Open,
    Binary { op: BinaryOp, priority: i32 },
    Unary { op: UnaryOp, priority: i32 },
    Function { func: Function, priority: i32 },
}

impl Pending {
    fn label(&self) -> String {
        match self {
            Pending::Open => "(".to_string(),
            Pending::Binary { op, .. } => op.symbol().to_string(),
            Pending::Unary { op, .. } => op.symbol().to_string(),
            Pending::Function { func, .. } => func.name().to_string(),
        }
    }

    /// Whether `self`, sitting on top of the operator stack, must be reduced
    /// before `incoming` is pushed.
    fn reduces_before(&self, incoming: &Pending) -> bool {
        match (self, incoming) {
            (Pending::Open, _) => false,
            // prefix operators have no left operand to claim
            (_, Pending::Open | Pending::Unary { .. } | Pending::Function { .. }) => false,
            // `=` waits for its whole right-hand side
            (Pending::Binary { op: BinaryOp::Assign, .. }, _) => false,
            (_, Pending::Binary { op: BinaryOp::Assign, .. }) => true,
            (
                Pending::Binary { priority: top, .. }
                | Pending::Unary { priority: top, .. }
                | Pending::Function { priority: top, .. },
                Pending::Binary { op, priority },
            ) => {
                if op.is_right_associative() {
                    top > priority
                } else {
                    top >= priority
                }
            }
        }
    }
}

/// Per-call state. Assignments are staged and only written to the store once
/// the whole expression has evaluated successfully.
struct Stacks<'v, V: Variables> {
    variables: &'v mut V,
    operands: Vec<Operand>,
    pending: Vec<Pending>,
    staged: Vec<(String, f64)>,
    trace: Vec<Reduction>,
}

impl<'v, V: Variables> Stacks<'v, V> {
    fn new(variables: &'v mut V) -> Self {
        Self {
            variables,
            operands: Vec::new(),
            pending: Vec::new(),
            staged: Vec::new(),
            trace: Vec::new(),
        }
    }

    fn push_operator(&mut self, incoming: Pending) -> Result<(), EvalError> {
        while let Some(top) = self.pending.last().copied() {
            if !top.reduces_before(&incoming) {
                break;
            }
            self.pending.pop();
            self.reduce(top)?;
        }
        self.pending.push(incoming);
        Ok(())
    }

    fn close_group(&mut self) -> Result<(), EvalError> {
        loop {
            match self.pending.pop() {
                Some(Pending::Open) => return Ok(()),
                Some(top) => self.reduce(top)?,
                None => return Err(EvalError::malformed("unbalanced ')'")),
            }
        }
    }

    fn finish(mut self) -> Result<Evaluation, EvalError> {
        while let Some(top) = self.pending.pop() {
            if top == Pending::Open {
                return Err(EvalError::malformed("unclosed '('"));
            }
            self.reduce(top)?;
        }

        let operand = match (self.operands.pop(), self.operands.is_empty()) {
            (Some(operand), true) => operand,
            _ => return Err(EvalError::malformed("operands left over")),
        };
        let value = self.resolve(operand)?;

        for (name, value) in self.staged.drain(..) {
            debug!("Assigning {} = {}", name, value);
            self.variables.set(&name, value);
        }

        Ok(Evaluation {
            value,
            trace: self.trace,
        })
    }

    fn reduce(&mut self, operator: Pending) -> Result<(), EvalError> {
        let value = match operator {
            Pending::Open => return Err(EvalError::malformed("unclosed '('")),
            Pending::Unary { op, .. } => {
                let operand = self.pop_operand(&operator)?;
                op.apply(self.resolve(operand)?)
            }
            Pending::Function { func, .. } => {
                let operand = self.pop_operand(&operator)?;
                func.apply(self.resolve(operand)?)
            }
            Pending::Binary {
                op: BinaryOp::Assign,
                ..
            } => {
                let right = self.pop_operand(&operator)?;
                let target = self.pop_operand(&operator)?;
                let value = self.resolve(right)?;
                match target {
                    Operand::Variable(name) => {
                        self.staged.push((name, value));
                        value
                    }
                    Operand::Number(_) => return Err(EvalError::InvalidAssignmentTarget),
                }
            }
            Pending::Binary { op, .. } => {
                let right = self.pop_operand(&operator)?;
                let left = self.pop_operand(&operator)?;
                let left = self.resolve(left)?;
                op.apply(left, self.resolve(right)?)
            }
        };

        let reduction = Reduction {
            operator: operator.label(),
            priority: match operator {
                Pending::Binary { priority, .. }
                | Pending::Unary { priority, .. }
                | Pending::Function { priority, .. } => priority,
                Pending::Open => 0,
            },
        };
        trace!(
            "Reduced '{}' at priority {} -> {}",
            reduction.operator,
            reduction.priority,
            value
        );
        self.trace.push(reduction);
        self.operands.push(Operand::Number(value));
        Ok(())
    }

    fn pop_operand(&mut self, operator: &Pending) -> Result<Operand, EvalError> {
        self.operands.pop().ok_or_else(|| {
            EvalError::malformed(format!("missing operand for '{}'", operator.label()))
        })
    }

    fn resolve(&self, operand: Operand) -> Result<f64, EvalError> {
        match operand {
            Operand::Number(value) => Ok(value),
            Operand::Variable(name) => {
                let staged = self.staged.iter().rev().find(|(staged, _)| *staged == name);
                match staged {
                    Some((_, value)) => Ok(*value),
                    None => self.variables.get(&name),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SharedVariables;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn eval(expression: &str) -> Result<f64, EvalError> {
        Evaluator::default().evaluate(expression)
    }

    fn reductions(expression: &str) -> Vec<(String, i32)> {
        Evaluator::default()
            .evaluate_traced(expression)
            .unwrap()
            .trace
            .into_iter()
            .map(|reduction| (reduction.operator, reduction.priority))
            .collect()
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-9 * expected.abs().max(1.0),
            "{actual} != {expected}"
        );
    }

    #[test]
    fn test_operator_precedence() {
        assert_eq!(eval("2+3*4").unwrap(), 14.0);
        assert_eq!(eval("2*3+4").unwrap(), 10.0);
        assert_eq!(eval("10 - 4 - 3").unwrap(), 3.0);
        assert_eq!(eval("100 / 10 / 5").unwrap(), 2.0);
    }

    #[test]
    fn test_power_is_right_associative() {
        assert_eq!(eval("2^3^2").unwrap(), 512.0);
        assert_eq!(reductions("2^3^2"), [("^".to_string(), 3), ("^".to_string(), 3)]);
    }

    #[test]
    fn test_parentheses_override_priority() {
        assert_eq!(eval("(2+3)*4").unwrap(), 20.0);
        assert_eq!(eval("2 * (3 + (4 - 1)) ^ 2").unwrap(), 72.0);
        assert_eq!(reductions("(2+3)*4"), [("+".to_string(), 101), ("*".to_string(), 2)]);
    }

    #[test]
    fn test_unary_operators() {
        assert_eq!(eval("-2^2").unwrap(), -4.0);
        assert_eq!(eval("(-2)^2").unwrap(), 4.0);
        assert_eq!(eval("2*-3").unwrap(), -6.0);
        assert_eq!(eval("2^-1").unwrap(), 0.5);
        assert_eq!(eval("--3").unwrap(), 3.0);
        assert_eq!(eval("+4 - -1").unwrap(), 5.0);
        assert_eq!(reductions("-2^2"), [("^".to_string(), 3), ("-".to_string(), 1)]);
    }

    #[test]
    fn test_unary_inside_parentheses_follows_nesting() {
        assert_eq!(eval("(-2+3)").unwrap(), 1.0);
        assert_eq!(eval("4*(-1+3)").unwrap(), 8.0);
        assert_eq!(
            reductions("(-2+3)"),
            [("-".to_string(), 101), ("+".to_string(), 101)]
        );
    }

    #[test]
    fn test_functions() {
        assert_close(eval("sin(90)+1").unwrap(), 2.0);
        assert_close(eval("sqrt(16) * (2 + 2)").unwrap(), 16.0);
        assert_close(eval("sqrt 16 * 2").unwrap(), 8.0);
        assert_close(eval("atan(1) + acos(0)").unwrap(), 135.0);
        assert_close(eval("log(exp(2))").unwrap(), 2.0);
        assert_close(eval("-cos(0)").unwrap(), -1.0);
        assert_eq!(reductions("sin(90)+1"), [("sin".to_string(), 4), ("+".to_string(), 1)]);
    }

    #[test]
    fn test_ieee_results() {
        assert_eq!(eval("1/0").unwrap(), f64::INFINITY);
        assert!(eval("0/0").unwrap().is_nan());
        assert!(eval("(-8)^0.5").unwrap().is_nan());
        assert!(eval("sqrt(-1)").unwrap().is_nan());
    }

    #[test]
    fn test_variables() {
        let mut evaluator = Evaluator::new(HashMap::from([
            ("rate".to_string(), 1.5),
            ("hours".to_string(), 8.0),
        ]));
        assert_eq!(evaluator.evaluate("rate * hours").unwrap(), 12.0);
        assert_eq!(evaluator.evaluate("(rate + 0.5) * hours").unwrap(), 16.0);
    }

    #[test]
    fn test_assignment_persists() {
        let mut evaluator = Evaluator::default();
        assert_eq!(evaluator.evaluate("x=5").unwrap(), 5.0);
        assert_eq!(evaluator.evaluate("x*2").unwrap(), 10.0);
        assert_eq!(evaluator.variables()["x"], 5.0);
    }

    #[test]
    fn test_assignment_takes_whole_right_side() {
        let mut evaluator = Evaluator::default();
        assert_eq!(evaluator.evaluate("x = 2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluator.variables()["x"], 14.0);
        assert_eq!(evaluator.evaluate("x = x + 1").unwrap(), 15.0);
        assert_eq!(evaluator.variables()["x"], 15.0);
    }

    #[test]
    fn test_assignment_chain() {
        let mut evaluator = Evaluator::default();
        assert_eq!(evaluator.evaluate("x = y = 5").unwrap(), 5.0);
        assert_eq!(evaluator.variables()["x"], 5.0);
        assert_eq!(evaluator.variables()["y"], 5.0);
    }

    #[test]
    fn test_assignment_inside_group() {
        let mut evaluator = Evaluator::default();
        assert_eq!(evaluator.evaluate("(y = 4) * 2").unwrap(), 8.0);
        assert_eq!(evaluator.variables()["y"], 4.0);
    }

    #[test]
    fn test_invalid_assignment_target() {
        let mut evaluator = Evaluator::new(HashMap::from([("x".to_string(), 1.0)]));
        assert_eq!(
            evaluator.evaluate("2 = 3"),
            Err(EvalError::InvalidAssignmentTarget)
        );
        assert_eq!(
            evaluator.evaluate("x + 1 = 3"),
            Err(EvalError::InvalidAssignmentTarget)
        );
        assert_eq!(evaluator.variables()["x"], 1.0);
    }

    #[test]
    fn test_assignment_visible_later_in_same_call() {
        let mut evaluator = Evaluator::default();
        assert_eq!(evaluator.evaluate("(x = 5) + x * 2").unwrap(), 15.0);
        assert_eq!(evaluator.evaluate("(x = 1) + (x = x + 1) + x").unwrap(), 5.0);
        assert_eq!(evaluator.variables()["x"], 2.0);
    }

    #[test]
    fn test_failed_call_leaves_store_untouched() {
        let mut evaluator = Evaluator::new(HashMap::from([("x".to_string(), 1.0)]));

        assert!(matches!(
            evaluator.evaluate("(x = 5) @"),
            Err(EvalError::Lexical(_))
        ));
        assert_eq!(
            evaluator.evaluate("(x = 5) + missing"),
            Err(EvalError::UndefinedVariable("missing".to_string()))
        );
        assert!(matches!(
            evaluator.evaluate("(y = 2) + (3"),
            Err(EvalError::MalformedExpression(_))
        ));

        assert_eq!(
            evaluator.into_variables(),
            HashMap::from([("x".to_string(), 1.0)])
        );
    }

    #[test]
    fn test_negated_assignment_target() {
        assert_eq!(
            eval("-x = 3"),
            Err(EvalError::UndefinedVariable("x".to_string()))
        );

        let mut evaluator = Evaluator::new(HashMap::from([("x".to_string(), 1.0)]));
        assert_eq!(
            evaluator.evaluate("-x = 3"),
            Err(EvalError::InvalidAssignmentTarget)
        );
        assert_eq!(evaluator.variables()["x"], 1.0);
    }

    #[test]
    fn test_undefined_variable() {
        assert_eq!(
            eval("y+1"),
            Err(EvalError::UndefinedVariable("y".to_string()))
        );
    }

    #[test]
    fn test_unbalanced_parentheses() {
        assert!(matches!(
            eval("(2+3"),
            Err(EvalError::MalformedExpression(_))
        ));
        assert_eq!(
            eval("2+3)"),
            Err(EvalError::Lexical("unbalanced ')' at position 3".to_string()))
        );
    }

    #[test]
    fn test_lexical_error() {
        let err = eval("price > 100").unwrap_err();
        assert_eq!(
            err,
            EvalError::Lexical("unexpected character '>' at position 6".to_string())
        );
    }

    #[test]
    fn test_unknown_function() {
        assert_eq!(
            eval("floor(2.5)"),
            Err(EvalError::UnknownFunction("floor".to_string()))
        );
    }

    #[test]
    fn test_malformed_expressions() {
        for expression in ["", "2 +", "2 3", "* 2", "()", "2 (3)", "1, 2", "1.2.3", "sin", "2 sin 3"] {
            assert!(
                matches!(eval(expression), Err(EvalError::MalformedExpression(_))),
                "{expression:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            eval("2 +").unwrap_err().to_string(),
            "malformed expression: unexpected end of expression"
        );
        assert_eq!(
            eval("2 = 3").unwrap_err().to_string(),
            "invalid assignment target"
        );
        assert_eq!(
            eval("q").unwrap_err().to_string(),
            "undefined variable: q"
        );
    }

    #[test]
    fn test_idempotent_evaluation() {
        let mut evaluator = Evaluator::new(HashMap::from([("a".to_string(), 3.0)]));
        let first = evaluator.evaluate("sin(a * 10) / (a + 1) ^ 2").unwrap();
        let second = evaluator.evaluate("sin(a * 10) / (a + 1) ^ 2").unwrap();
        assert_eq!(first.to_bits(), second.to_bits());
    }

    #[test]
    fn test_borrowed_store() {
        let mut store: HashMap<String, f64> = HashMap::new();
        {
            let mut evaluator = Evaluator::new(&mut store);
            evaluator.evaluate("total = 3 * 7").unwrap();
        }
        assert_eq!(store["total"], 21.0);
    }

    #[test]
    fn test_shared_store_between_evaluators() {
        let store = SharedVariables::new();
        let mut writer = Evaluator::new(store.clone());
        let mut reader = Evaluator::new(store.clone());

        writer.evaluate("limit = 40 + 2").unwrap();
        assert_eq!(reader.evaluate("limit / 2").unwrap(), 21.0);
        assert_eq!(store.snapshot()["limit"], 42.0);
    }

    fn random_expression(rng: &mut StdRng, depth: u32) -> String {
        let terms = rng.random_range(2..=5);
        let mut expression = String::new();
        for i in 0..terms {
            if i > 0 {
                expression.push(['+', '-', '*', '/'][rng.random_range(0..4)]);
            }
            if depth > 0 && rng.random_bool(0.3) {
                expression.push('(');
                expression.push_str(&random_expression(rng, depth - 1));
                expression.push(')');
            } else {
                expression.push_str(&rng.random_range(1..=9u32).to_string());
            }
        }
        expression
    }

    #[test]
    fn test_matches_meval_on_random_arithmetic() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut evaluator = Evaluator::default();

        for _ in 0..500 {
            let expression = random_expression(&mut rng, 3);
            let actual = evaluator.evaluate(&expression).unwrap();
            let expected = meval::eval_str(&expression).unwrap();

            if expected.is_nan() {
                assert!(actual.is_nan(), "{expression}: {actual} != NaN");
            } else if expected.is_infinite() {
                assert_eq!(actual, expected, "{expression}");
            } else {
                assert_close(actual, expected);
            }
        }
    }
}
