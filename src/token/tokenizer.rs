use crate::token::{BinaryOp, Function, Punct, Token, UnaryOp, NESTING_STEP};
use log::trace;
use std::iter::Peekable;
use std::str::Chars;

/// Starts a fresh scan of `source`.
pub fn tokenize(source: &str) -> Tokenizer<'_> {
    Tokenizer::new(source)
}

/// Lazy left-to-right scanner over an expression.
///
/// Yields tokens until it has produced either `Token::End` or a single
/// `Token::Error`, then stops. Each `(` raises the nesting offset stamped on
/// subsequent operators by [`NESTING_STEP`]; each `)` lowers it again. An
/// opening parenthesis that would push operator priorities past `i32::MAX`
/// is reported as an error.
pub struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
    position: usize,
    depth: usize,
    offset: i32,
    expect_operand: bool,
    finished: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            position: 0,
            depth: 0,
            offset: 0,
            expect_operand: true,
            finished: false,
        }
    }

    /// Current parenthesis depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Offset one level deeper, if every priority at that level still fits
    /// in an `i32`.
    fn deeper_offset(&self) -> Option<i32> {
        self.offset
            .checked_add(NESTING_STEP)
            .filter(|offset| offset.checked_add(Function::PRIORITY).is_some())
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        self.position += 1;
        Some(ch)
    }

    fn bump_if(&mut self, predicate: impl FnOnce(&char) -> bool) -> Option<char> {
        let ch = self.chars.next_if(predicate)?;
        self.position += 1;
        Some(ch)
    }

    fn scan(&mut self) -> Token {
        while self.bump_if(|c| c.is_whitespace()).is_some() {}

        let start = self.position;
        let Some(ch) = self.bump() else {
            return Token::End;
        };

        match ch {
            '0'..='9' | '.' => self.scan_number(ch, start),
            c if c.is_ascii_alphabetic() || c == '_' => self.scan_word(c),
            '(' => match self.deeper_offset() {
                Some(offset) => {
                    self.depth += 1;
                    self.offset = offset;
                    Token::Punct(Punct::Open)
                }
                None => Token::Error(format!("nesting too deep at position {start}")),
            },
            ')' => match self.depth.checked_sub(1) {
                Some(depth) => {
                    self.depth = depth;
                    self.offset -= NESTING_STEP;
                    Token::Punct(Punct::Close)
                }
                None => Token::Error(format!("unbalanced ')' at position {start}")),
            },
            ',' => Token::Punct(Punct::Comma),
            '-' | '+' if self.expect_operand => Token::Unary {
                op: if ch == '-' {
                    UnaryOp::Negate
                } else {
                    UnaryOp::Identity
                },
                offset: self.offset,
            },
            c => match BinaryOp::try_from(c) {
                Ok(op) => Token::Binary {
                    op,
                    offset: self.offset,
                },
                Err(_) => Token::Error(format!("unexpected character '{c}' at position {start}")),
            },
        }
    }

    fn scan_number(&mut self, first: char, start: usize) -> Token {
        let mut text = String::from(first);
        let mut seen_point = first == '.';
        while let Some(ch) = self.bump_if(|&c| c.is_ascii_digit() || (c == '.' && !seen_point)) {
            seen_point |= ch == '.';
            text.push(ch);
        }

        match text.parse::<f64>() {
            Ok(value) => Token::Literal(value),
            Err(_) => Token::Error(format!("invalid number '{text}' at position {start}")),
        }
    }

    fn scan_word(&mut self, first: char) -> Token {
        let mut name = String::from(first);
        while let Some(ch) = self.bump_if(|&c| c.is_ascii_alphanumeric() || c == '_') {
            name.push(ch);
        }

        match name.parse::<Function>() {
            Ok(func) => Token::Function {
                func,
                offset: self.offset,
            },
            Err(_) => Token::Variable(name),
        }
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.finished {
            return None;
        }

        let token = self.scan();
        trace!("Token: {token}");
        self.finished = matches!(token, Token::End | Token::Error(_));
        self.expect_operand = token.expects_operand();
        Some(token)
    }
}
