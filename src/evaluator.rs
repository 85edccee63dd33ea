use compact_str::{CompactString, ToCompactString};
use thiserror::Error;

use crate::source::SourceError;
use crate::tokenizer::{Bracket, Operator, Token};

/// Evaluates one infix expression straight off a token stream, without
/// building a postfix form or a tree. Pending operators wait on one stack,
/// values on the other; an operator is applied as soon as precedence says
/// nothing to its right can bind tighter.
pub struct Evaluator<I> {
    tokens: I,
    operands: Vec<f64>,
    pending: Vec<Pending>,
    // The last token cannot end an operand, so a `-` here is a sign
    was_not_number: bool,
    negate: bool,
    // A function name was just read; its argument list must open next
    awaiting_call: Option<Function>,
}

impl<I> Evaluator<I>
where
    I: Iterator<Item = Result<Token, SourceError>>,
{
    pub fn new(tokens: I) -> Self {
        Self {
            tokens,
            operands: Vec::new(),
            pending: Vec::new(),
            was_not_number: true,
            negate: false,
            awaiting_call: None,
        }
    }

    /// Pulls tokens up to the end of the line and returns the value of the
    /// expression they spell.
    pub fn evaluate(mut self) -> Result<f64, EvaluateError> {
        loop {
            let token = self.tokens.next().ok_or(SourceError::UnexpectedEof)??;
            log::trace!("token {:?}", token);
            if token == Token::Eol {
                break;
            }
            self.handle_token(token)?;
        }

        let value = self.finalize()?;
        log::debug!("expression value {}", value);
        Ok(value)
    }

    fn handle_token(&mut self, token: Token) -> Result<(), ExpressionError> {
        if let Some(func) = self.awaiting_call.take() {
            if !matches!(token, Token::Open(_)) {
                return Err(ExpressionError::MissingArgumentList(func.name()));
            }
        }

        match token {
            Token::Num(v) if !v.is_finite() => return Err(ExpressionError::NotFinite),
            Token::Num(v) => self.handle_operand(v),
            Token::Op(op) => self.handle_operator(op)?,
            Token::Open(bracket) => self.handle_open_bracket(bracket),
            Token::Close(bracket) => self.handle_close_bracket(bracket)?,
            Token::Comma => self.handle_comma()?,
            Token::Word(word) => self.handle_word(word)?,
            Token::Unrecognized(c) => {
                return Err(ExpressionError::UnrecognizedSymbol(c.to_compact_string()))
            }
            Token::Eol => {}
        }

        Ok(())
    }

    fn handle_operand(&mut self, mut v: f64) {
        if self.negate {
            v = -v;
            self.negate = false;
        }
        self.operands.push(v);
        self.was_not_number = false;
    }

    fn handle_operator(&mut self, op: Operator) -> Result<(), ExpressionError> {
        if self.was_not_number {
            match op {
                // Negative sign, a second one cancels the first
                Operator::Sub => {
                    self.negate = !self.negate;
                    return Ok(());
                }
                // Positive sign, do nothing
                Operator::Add => return Ok(()),
                _ => {}
            }
        }

        // Equal precedence folds too, so every operator is left-associative
        while let Some(Pending::Op(top)) = self.pending.last() {
            if op.precedence() > top.precedence() {
                break;
            }
            self.resolve()?;
        }
        self.pending.push(Pending::Op(op));
        self.was_not_number = true;

        Ok(())
    }

    fn handle_open_bracket(&mut self, bracket: Bracket) {
        self.push_negation();
        self.pending.push(Pending::Open {
            bracket,
            depth: self.operands.len(),
            commas: 0,
        });
        self.was_not_number = true;
    }

    fn handle_close_bracket(&mut self, bracket: Bracket) -> Result<(), ExpressionError> {
        if self.pending.is_empty() {
            return Err(ExpressionError::TooManyClosedBrackets);
        }

        let (depth, commas) = loop {
            match self.pending.last() {
                Some(&Pending::Open {
                    bracket: open,
                    depth,
                    commas,
                }) => {
                    if open != bracket {
                        return Err(ExpressionError::MismatchedBrackets);
                    }
                    break (depth, commas);
                }
                Some(_) => self.resolve()?,
                None => return Err(ExpressionError::TooManyClosedBrackets),
            }
        };
        self.pending.pop();
        self.check_group(depth + commas + 1)?;

        if let Some(&Pending::Func(func)) = self.pending.last() {
            if commas + 1 != func.arity() {
                return Err(ExpressionError::ArgumentCount {
                    function: func.name(),
                    expected: func.arity(),
                    found: commas + 1,
                });
            }
            self.resolve()?;
        } else if commas > 0 {
            return Err(ExpressionError::CommaOutsideCall);
        }
        if let Some(Pending::Negate) = self.pending.last() {
            self.resolve()?;
        }
        self.was_not_number = false;

        Ok(())
    }

    fn handle_comma(&mut self) -> Result<(), ExpressionError> {
        let index = loop {
            match self.pending.last() {
                Some(Pending::Open { .. }) => break self.pending.len() - 1,
                Some(_) => self.resolve()?,
                None => return Err(ExpressionError::CommaOutsideCall),
            }
        };

        // Only an argument list may hold more than one value
        if index == 0 || !matches!(self.pending[index - 1], Pending::Func(_)) {
            return Err(ExpressionError::CommaOutsideCall);
        }
        if let Pending::Open { depth, commas, .. } = &mut self.pending[index] {
            *commas += 1;
            let expected = *depth + *commas;
            self.check_group(expected)?;
        }
        self.was_not_number = true;

        Ok(())
    }

    fn handle_word(&mut self, word: CompactString) -> Result<(), ExpressionError> {
        if word.eq_ignore_ascii_case("pi") {
            self.handle_operand(std::f64::consts::PI);
            return Ok(());
        }

        let Some(func) = Function::from_name(&word) else {
            return Err(ExpressionError::UnrecognizedSymbol(word));
        };
        self.push_negation();
        self.pending.push(Pending::Func(func));
        self.awaiting_call = Some(func);
        self.was_not_number = true;

        Ok(())
    }

    /// A sign in front of a group or a call applies to its whole value, once
    /// the group is closed.
    fn push_negation(&mut self) {
        if self.negate {
            self.negate = false;
            self.pending.push(Pending::Negate);
        }
    }

    /// Checks that a finished bracket group or argument left exactly one value
    /// on top of what was there when the group opened.
    fn check_group(&self, expected: usize) -> Result<(), ExpressionError> {
        use std::cmp::Ordering;

        match self.operands.len().cmp(&expected) {
            Ordering::Less => Err(ExpressionError::NotEnoughOperands),
            Ordering::Greater => Err(ExpressionError::TooManyOperands),
            Ordering::Equal => Ok(()),
        }
    }

    /// Pops one pending operation, applies it to its operands and pushes the
    /// result.
    fn resolve(&mut self) -> Result<(), ExpressionError> {
        let pending = self
            .pending
            .pop()
            .ok_or(ExpressionError::NotEnoughOperators)?;
        let right = self.pop_operand()?;

        let value = match pending {
            Pending::Op(op) => {
                let left = self.pop_operand()?;
                op.apply(left, right)?
            }
            Pending::Func(func) if func.arity() == 2 => {
                let left = self.pop_operand()?;
                func.apply(&[left, right])?
            }
            Pending::Func(func) => func.apply(&[right])?,
            Pending::Negate => -right,
            Pending::Open { .. } => return Err(ExpressionError::MismatchedBrackets),
        };
        log::debug!("resolved {:?} to {}", pending, value);
        if !value.is_finite() {
            return Err(ExpressionError::NotFinite);
        }
        self.operands.push(value);

        Ok(())
    }

    fn pop_operand(&mut self) -> Result<f64, ExpressionError> {
        self.operands
            .pop()
            .ok_or(ExpressionError::TooManyOperators)
    }

    fn finalize(&mut self) -> Result<f64, ExpressionError> {
        if let Some(func) = self.awaiting_call {
            return Err(ExpressionError::MissingArgumentList(func.name()));
        }
        while let Some(top) = self.pending.last() {
            if matches!(top, Pending::Open { .. } | Pending::Func(_)) {
                return Err(ExpressionError::MismatchedBrackets);
            }
            self.resolve()?;
        }

        let result = self
            .operands
            .pop()
            .ok_or(ExpressionError::NotEnoughOperands)?;
        if !self.operands.is_empty() {
            return Err(ExpressionError::TooManyOperands);
        }
        Ok(result)
    }
}

/// An entry of the operator stack.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Pending {
    Op(Operator),
    Func(Function),
    Negate,
    Open {
        bracket: Bracket,
        // Operand count when the bracket was opened
        depth: usize,
        commas: usize,
    },
}

impl Operator {
    fn precedence(self) -> u8 {
        match self {
            Operator::Add | Operator::Sub => 2,
            Operator::Mul | Operator::Div => 3,
            Operator::Pow => 4,
        }
    }

    fn apply(self, l: f64, r: f64) -> Result<f64, ExpressionError> {
        Ok(match self {
            Operator::Add => l + r,
            Operator::Sub => l - r,
            Operator::Mul => l * r,
            Operator::Div if r == 0.0 => return Err(ExpressionError::DivisionByZero),
            Operator::Div => l / r,
            Operator::Pow => l.powf(r),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Sin,
    Cos,
    Tan,
    Ceil,
    Floor,
    Max,
    Min,
}

impl Function {
    fn from_name(name: &str) -> Option<Function> {
        let func = match name.to_ascii_lowercase().as_str() {
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            "ceil" => Function::Ceil,
            "floor" => Function::Floor,
            "max" => Function::Max,
            "min" => Function::Min,
            _ => return None,
        };
        Some(func)
    }

    fn name(self) -> &'static str {
        match self {
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Ceil => "ceil",
            Function::Floor => "floor",
            Function::Max => "max",
            Function::Min => "min",
        }
    }

    fn arity(self) -> usize {
        match self {
            Function::Max | Function::Min => 2,
            _ => 1,
        }
    }

    fn apply(self, args: &[f64]) -> Result<f64, ExpressionError> {
        Ok(match (self, args) {
            (Function::Sin, [x]) => x.sin(),
            (Function::Cos, [x]) => x.cos(),
            (Function::Tan, [x]) => x.tan(),
            (Function::Ceil, [x]) => x.ceil(),
            (Function::Floor, [x]) => x.floor(),
            (Function::Max, [a, b]) => a.max(*b),
            (Function::Min, [a, b]) => a.min(*b),
            _ => {
                return Err(ExpressionError::ArgumentCount {
                    function: self.name(),
                    expected: self.arity(),
                    found: args.len(),
                })
            }
        })
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ExpressionError {
    #[error("Unrecognized symbol: {0}")]
    UnrecognizedSymbol(CompactString),
    #[error("Too many closed brackets")]
    TooManyClosedBrackets,
    #[error("Mismatched brackets")]
    MismatchedBrackets,
    #[error("Not enough operators")]
    NotEnoughOperators,
    #[error("Too many operators")]
    TooManyOperators,
    #[error("Not enough operands")]
    NotEnoughOperands,
    #[error("Too many operands")]
    TooManyOperands,
    #[error("Cannot divide by 0")]
    DivisionByZero,
    #[error("Result is not a finite number")]
    NotFinite,
    #[error("Comma outside of a function call")]
    CommaOutsideCall,
    #[error("Function {0} must be followed by an open bracket")]
    MissingArgumentList(&'static str),
    #[error("Function {function} takes {expected} argument(s), got {found}")]
    ArgumentCount {
        function: &'static str,
        expected: usize,
        found: usize,
    },
}

#[derive(Error, Debug)]
pub enum EvaluateError {
    #[error("Invalid expression: {0}")]
    Expression(#[from] ExpressionError),
    #[error(transparent)]
    Source(#[from] SourceError),
}
