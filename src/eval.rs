use std::collections::HashSet;

use crate::ast::{BinaryOp, Expression, TextPart, UnaryOp};
use crate::functions::FunctionRegistry;
use crate::storage::VariableStorage;
use crate::value::{Value, ValueKind};

/// Failure while reducing an expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("variable ${0} is not defined")]
    UndefinedVariable(String),
    #[error("function \"{0}\" not found")]
    UnknownFunction(String),
    #[error("cannot apply '{op}' to {lhs} and {rhs}")]
    TypeMismatch {
        op: BinaryOp,
        lhs: ValueKind,
        rhs: ValueKind,
    },
    #[error("cannot apply '{op}' to {operand}")]
    InvalidOperand { op: UnaryOp, operand: ValueKind },
    #[error("function \"{name}\" failed: {message}")]
    Function { name: String, message: String },
}

/// Side-effect-free reducer over expressions and text parts.
pub struct Evaluator<'a> {
    variables: &'a dyn VariableStorage,
    functions: &'a FunctionRegistry,
    visited: &'a HashSet<String>,
    no_escape: bool,
}

impl<'a> Evaluator<'a> {
    #[must_use]
    pub fn new(
        variables: &'a dyn VariableStorage,
        functions: &'a FunctionRegistry,
        visited: &'a HashSet<String>,
    ) -> Self {
        Self {
            variables,
            functions,
            visited,
            no_escape: false,
        }
    }

    /// Keep escaped characters as `\c` in rendered text.
    #[must_use]
    pub const fn no_escape(mut self, no_escape: bool) -> Self {
        self.no_escape = no_escape;
        self
    }

    /// Reduce an expression to a value.
    ///
    /// # Errors
    ///
    /// Fails on undefined variables, unknown or failing functions, and
    /// operators applied to kinds they do not accept.
    pub fn evaluate(&self, expression: &Expression) -> Result<Value, EvalError> {
        match expression {
            Expression::Literal(literal) => Ok(Value::from(literal)),
            Expression::Variable(name) => self
                .variables
                .get(name)
                .ok_or_else(|| EvalError::UndefinedVariable(name.clone())),
            Expression::Unary { op, operand } => {
                let value = self.evaluate(operand)?;
                match (op, value) {
                    (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
                    (UnaryOp::Negate, Value::Number(n)) => Ok(Value::Number(-n)),
                    (UnaryOp::Negate, other) => Err(EvalError::InvalidOperand {
                        op: *op,
                        operand: other.kind(),
                    }),
                }
            }
            Expression::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs),
            Expression::Call(call) => {
                let args = call
                    .args
                    .iter()
                    .map(|arg| self.evaluate(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.functions.call(&call.name, &args, self.visited)
            }
        }
    }

    fn binary(&self, op: BinaryOp, lhs: &Expression, rhs: &Expression) -> Result<Value, EvalError> {
        // Logical operators short-circuit on truthiness.
        match op {
            BinaryOp::And => {
                let left = self.evaluate(lhs)?.is_truthy();
                return Ok(Value::Bool(left && self.evaluate(rhs)?.is_truthy()));
            }
            BinaryOp::Or => {
                let left = self.evaluate(lhs)?.is_truthy();
                return Ok(Value::Bool(left || self.evaluate(rhs)?.is_truthy()));
            }
            _ => {}
        }

        let left = self.evaluate(lhs)?;
        let right = self.evaluate(rhs)?;
        apply(op, left, right)
    }

    /// Render text parts to a single string.
    ///
    /// # Errors
    ///
    /// Fails when an interpolated expression fails.
    pub fn render(&self, parts: &[TextPart]) -> Result<String, EvalError> {
        let mut out = String::new();
        for part in parts {
            match part {
                TextPart::Text(text) => out.push_str(text),
                TextPart::Escaped(c) => {
                    if self.no_escape {
                        out.push('\\');
                    }
                    out.push_str(c);
                }
                TextPart::Expression(expression) => {
                    out.push_str(&self.evaluate(expression)?.to_string());
                }
            }
        }
        Ok(out)
    }
}

fn apply(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    let value = match (op, &left, &right) {
        (BinaryOp::Equal, ..) => Value::Bool(left == right),
        (BinaryOp::NotEqual, ..) => Value::Bool(left != right),
        (BinaryOp::Xor, ..) => Value::Bool(left.is_truthy() != right.is_truthy()),
        (BinaryOp::Add, Value::String(_), _) | (BinaryOp::Add, _, Value::String(_)) => {
            Value::String(format!("{left}{right}"))
        }
        (_, Value::Number(a), Value::Number(b)) => {
            let (a, b) = (*a, *b);
            match op {
                BinaryOp::Add => Value::Number(a + b),
                BinaryOp::Subtract => Value::Number(a - b),
                BinaryOp::Multiply => Value::Number(a * b),
                BinaryOp::Divide => Value::Number(a / b),
                BinaryOp::Modulo => Value::Number(a % b),
                BinaryOp::Exponent => Value::Number(a.powf(b)),
                BinaryOp::Greater => Value::Bool(a > b),
                BinaryOp::GreaterOrEqual => Value::Bool(a >= b),
                BinaryOp::Less => Value::Bool(a < b),
                BinaryOp::LessOrEqual => Value::Bool(a <= b),
                _ => return Err(mismatch(op, &left, &right)),
            }
        }
        (_, Value::String(a), Value::String(b)) => match op {
            BinaryOp::Greater => Value::Bool(a > b),
            BinaryOp::GreaterOrEqual => Value::Bool(a >= b),
            BinaryOp::Less => Value::Bool(a < b),
            BinaryOp::LessOrEqual => Value::Bool(a <= b),
            _ => return Err(mismatch(op, &left, &right)),
        },
        _ => return Err(mismatch(op, &left, &right)),
    };
    Ok(value)
}

const fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> EvalError {
    EvalError::TypeMismatch {
        op,
        lhs: left.kind(),
        rhs: right.kind(),
    }
}
