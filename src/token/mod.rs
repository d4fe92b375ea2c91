use crate::EvalError;
use std::fmt;
use std::str::FromStr;

mod tokenizer;

pub use tokenizer::{tokenize, Tokenizer};

/// Priority added to every operator per level of parenthesis nesting.
///
/// Must exceed the largest intrinsic priority so that any operator at depth
/// `n + 1` outranks every operator at depth `n`.
pub const NESTING_STEP: i32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Literal(f64),
    /// Looked up by name when the evaluator consumes it, not when scanned.
    Variable(String),
    Binary {
        op: BinaryOp,
        offset: i32,
    },
    Unary {
        op: UnaryOp,
        offset: i32,
    },
    Function {
        func: Function,
        offset: i32,
    },
    Punct(Punct),
    End,
    Error(String),
}

impl Token {
    /// Priority of an operator token, `None` for everything else.
    ///
    /// Binary operators and functions carry the nesting offset they were
    /// read at; unary operators always report `1`.
    pub fn priority(&self) -> Option<i32> {
        match self {
            Token::Binary { op, offset } => Some(op.base_priority().saturating_add(*offset)),
            Token::Unary { .. } => Some(UnaryOp::PRIORITY),
            Token::Function { offset, .. } => Some(Function::PRIORITY.saturating_add(*offset)),
            Token::Literal(_)
            | Token::Variable(_)
            | Token::Punct(_)
            | Token::End
            | Token::Error(_) => None,
        }
    }

    /// Whether a `+`/`-` following this token is a prefix sign rather than a
    /// binary operator.
    pub(crate) fn expects_operand(&self) -> bool {
        match self {
            Token::Binary { .. } | Token::Unary { .. } | Token::Function { .. } => true,
            Token::Punct(Punct::Open) | Token::Punct(Punct::Comma) => true,
            Token::Literal(_)
            | Token::Variable(_)
            | Token::Punct(Punct::Close)
            | Token::End
            | Token::Error(_) => false,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(value) => write!(f, "literal:{value}"),
            Token::Variable(name) => write!(f, "var:{name}"),
            Token::Binary { op, .. } => {
                write!(f, "op:{}:{}", op.symbol(), self.priority().unwrap_or_default())
            }
            Token::Unary { op, .. } => write!(f, "unary:{}", op.symbol()),
            Token::Function { func, .. } => {
                write!(f, "func:{}:{}", func.name(), self.priority().unwrap_or_default())
            }
            Token::Punct(punct) => write!(f, "punct:{}", punct.symbol()),
            Token::End => f.write_str("end"),
            Token::Error(message) => write!(f, "error:{message}"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Assign,
}

impl BinaryOp {
    pub fn base_priority(&self) -> i32 {
        match self {
            BinaryOp::Add | BinaryOp::Subtract => 1,
            BinaryOp::Multiply | BinaryOp::Divide => 2,
            BinaryOp::Power => 3,
            BinaryOp::Assign => 4,
        }
    }

    pub fn is_right_associative(&self) -> bool {
        matches!(self, BinaryOp::Power | BinaryOp::Assign)
    }

    pub fn symbol(&self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Subtract => '-',
            BinaryOp::Multiply => '*',
            BinaryOp::Divide => '/',
            BinaryOp::Power => '^',
            BinaryOp::Assign => '=',
        }
    }

    /// IEEE semantics throughout: no error for division by zero or for
    /// out-of-domain powers. `Assign` yields the assigned (right) value; the
    /// store write is the evaluator's job.
    pub fn apply(&self, left: f64, right: f64) -> f64 {
        match self {
            BinaryOp::Add => left + right,
            BinaryOp::Subtract => left - right,
            BinaryOp::Multiply => left * right,
            BinaryOp::Divide => left / right,
            BinaryOp::Power => left.powf(right),
            BinaryOp::Assign => right,
        }
    }
}

impl TryFrom<char> for BinaryOp {
    type Error = EvalError;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value {
            '+' => Ok(BinaryOp::Add),
            '-' => Ok(BinaryOp::Subtract),
            '*' => Ok(BinaryOp::Multiply),
            '/' => Ok(BinaryOp::Divide),
            '^' => Ok(BinaryOp::Power),
            '=' => Ok(BinaryOp::Assign),
            _ => Err(EvalError::UnknownOperator(value)),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    Identity,
}

impl UnaryOp {
    pub const PRIORITY: i32 = 1;

    pub fn symbol(&self) -> char {
        match self {
            UnaryOp::Negate => '-',
            UnaryOp::Identity => '+',
        }
    }

    pub fn apply(&self, value: f64) -> f64 {
        match self {
            UnaryOp::Negate => -value,
            UnaryOp::Identity => value,
        }
    }
}

/// Built-in single-argument functions. Trigonometry works in degrees.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Sqrt,
    Log,
    Exp,
    Asin,
    Acos,
    Atan,
}

impl Function {
    pub const PRIORITY: i32 = 4;

    pub fn name(&self) -> &'static str {
        match self {
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Sqrt => "sqrt",
            Function::Log => "log",
            Function::Exp => "exp",
            Function::Asin => "asin",
            Function::Acos => "acos",
            Function::Atan => "atan",
        }
    }

    pub fn apply(&self, value: f64) -> f64 {
        match self {
            Function::Sin => value.to_radians().sin(),
            Function::Cos => value.to_radians().cos(),
            Function::Tan => value.to_radians().tan(),
            Function::Sqrt => value.sqrt(),
            Function::Log => value.ln(),
            Function::Exp => value.exp(),
            Function::Asin => value.asin().to_degrees(),
            Function::Acos => value.acos().to_degrees(),
            Function::Atan => value.atan().to_degrees(),
        }
    }
}

impl FromStr for Function {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sin" => Ok(Function::Sin),
            "cos" => Ok(Function::Cos),
            "tan" => Ok(Function::Tan),
            "sqrt" => Ok(Function::Sqrt),
            "log" => Ok(Function::Log),
            "exp" => Ok(Function::Exp),
            "asin" => Ok(Function::Asin),
            "acos" => Ok(Function::Acos),
            "atan" => Ok(Function::Atan),
            _ => Err(EvalError::UnknownFunction(s.to_string())),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Punct {
    Open,
    Close,
    Comma,
}

impl Punct {
    pub fn symbol(&self) -> char {
        match self {
            Punct::Open => '(',
            Punct::Close => ')',
            Punct::Comma => ',',
        }
    }
}
