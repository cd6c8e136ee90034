use std::cmp::Ordering;

use regex::Regex;

use crate::{
    ast::{BinOp, Stage, UnaryOp},
    error::EvalError,
    parameters::Parameters,
    value::{Value, integral},
};

/// Walks a stage tree against one parameter source.
///
/// The evaluator holds nothing but a borrowed parameter source, so any number
/// of evaluators can read the same tree at once.
///
/// # Examples
///
/// ```
/// use valuate::{Evaluator, Lexer, MapParameters, Parser, Value};
///
/// let stage = Parser::new(Lexer::new("price * 2")).unwrap().parse().unwrap();
/// let params = MapParameters::new().with("price", 21);
///
/// let result = Evaluator::new(&params).eval(&stage).unwrap();
/// assert_eq!(result, Value::from(42));
/// ```
pub struct Evaluator<'p> {
    parameters: &'p dyn Parameters,
}

impl<'p> Evaluator<'p> {
    pub fn new(parameters: &'p dyn Parameters) -> Self {
        Evaluator { parameters }
    }

    /// Evaluates `stage` bottom-up. Only `&&`, `||`, `?:` and `??` skip a child.
    pub fn eval(&self, stage: &Stage) -> Result<Value, EvalError> {
        match stage {
            Stage::Literal(value) => Ok(value.clone()),
            Stage::Parameter(name) => self
                .parameters
                .get(name)
                .ok_or_else(|| EvalError::ParameterNotFound(name.clone())),
            Stage::Unary { op, operand } => {
                let value = self.eval(operand)?;
                apply_unary(*op, value)
            }
            Stage::Binary { op, left, right } if !left.is_chain_link() => {
                self.apply_link(Link::Binary(*op, &**right), self.eval(left))
            }
            Stage::Index { target, index } if !target.is_chain_link() => {
                self.apply_link(Link::Index(&**index), self.eval(target))
            }
            Stage::Binary { .. } | Stage::Index { .. } => self.eval_chain(stage),
            Stage::Ternary {
                condition,
                then,
                otherwise,
            } => match self.eval(condition)? {
                Value::Boolean(true) => self.eval(then),
                Value::Boolean(false) => self.eval(otherwise),
                other => Err(EvalError::type_error(format!(
                    "Ternary condition must be boolean, got {}",
                    other.type_name()
                ))),
            },
            Stage::Call { function, args } => {
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                function
                    .call(&values)
                    .map_err(|e| EvalError::function(function.name(), e))
            }
            Stage::Array(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
        }
    }

    /// Folds a left-nested run of binary and index stages in a loop, so a
    /// chain like `a || b || c || ...` costs no stack per operator.
    fn eval_chain(&self, stage: &Stage) -> Result<Value, EvalError> {
        let mut links = Vec::new();
        let mut base = stage;
        loop {
            match base {
                Stage::Binary { op, left, right } => {
                    links.push(Link::Binary(*op, &**right));
                    base = &**left;
                }
                Stage::Index { target, index } => {
                    links.push(Link::Index(&**index));
                    base = &**target;
                }
                _ => break,
            }
        }

        let mut acc = self.eval(base);
        for link in links.into_iter().rev() {
            acc = self.apply_link(link, acc);
        }
        acc
    }

    /// Applies one operator to an already evaluated left side. A failed left
    /// side skips the right one, except under `??`.
    fn apply_link(&self, link: Link<'_>, left: Result<Value, EvalError>) -> Result<Value, EvalError> {
        let (op, right) = match link {
            Link::Index(index) => {
                let target = left?;
                let index = self.eval(index)?;
                return apply_index(target, &index);
            }
            Link::Binary(op, right) => (op, right),
        };

        match op {
            BinOp::NullCoalesce => match left {
                Ok(Value::Nil) | Err(EvalError::ParameterNotFound(_)) => self.eval(right),
                other => other,
            },
            BinOp::And => {
                if !expect_bool(left?, op)? {
                    return Ok(Value::Boolean(false));
                }
                Ok(Value::Boolean(expect_bool(self.eval(right)?, op)?))
            }
            BinOp::Or => {
                if expect_bool(left?, op)? {
                    return Ok(Value::Boolean(true));
                }
                Ok(Value::Boolean(expect_bool(self.eval(right)?, op)?))
            }
            _ => {
                let left_val = left?;
                let right_val = self.eval(right)?;
                apply_binop(op, left_val, right_val)
            }
        }
    }
}

/// Pending operator on the left spine of a chain, with its right-hand child.
enum Link<'s> {
    Binary(BinOp, &'s Stage),
    Index(&'s Stage),
}

fn expect_bool(value: Value, op: BinOp) -> Result<bool, EvalError> {
    match value {
        Value::Boolean(b) => Ok(b),
        other => Err(EvalError::type_error(format!(
            "Logical '{}' requires boolean operands, got {}",
            op,
            other.type_name()
        ))),
    }
}

/// Kind name, flagging strings that arithmetic could not read as numbers.
fn operand_name(v: &Value) -> &'static str {
    match v {
        Value::String(_) => "non-numeric string",
        other => other.type_name(),
    }
}

fn apply_unary(op: UnaryOp, value: Value) -> Result<Value, EvalError> {
    match op {
        UnaryOp::Negate => value.coerce_number().map(|n| Value::Number(-n)).ok_or_else(|| {
            EvalError::type_error(format!("Cannot negate {}", operand_name(&value)))
        }),
        UnaryOp::Plus => value.coerce_number().map(Value::Number).ok_or_else(|| {
            EvalError::type_error(format!("Cannot convert {} to number", operand_name(&value)))
        }),
        UnaryOp::Not => match value {
            Value::Boolean(b) => Ok(Value::Boolean(!b)),
            other => Err(EvalError::type_error(format!(
                "Logical '!' requires boolean, got {}",
                other.type_name()
            ))),
        },
        UnaryOp::BitNot => match value.as_integral() {
            Some(n) => Ok(Value::Number(!n as f64)),
            None => Err(EvalError::type_error(format!(
                "Bitwise '~' requires an integral number, got {}",
                describe(&value)
            ))),
        },
    }
}

fn apply_binop(op: BinOp, left: Value, right: Value) -> Result<Value, EvalError> {
    match op {
        BinOp::Add => match (&left, &right) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                Ok(Value::String(format!("{}{}", left, right)))
            }
            _ => arithmetic(op, &left, &right, |a, b| a + b),
        },
        BinOp::Subtract => arithmetic(op, &left, &right, |a, b| a - b),
        BinOp::Multiply => arithmetic(op, &left, &right, |a, b| a * b),
        BinOp::Divide => arithmetic(op, &left, &right, |a, b| a / b),
        BinOp::Modulo => arithmetic(op, &left, &right, |a, b| a % b),
        BinOp::Power => arithmetic(op, &left, &right, f64::powf),
        BinOp::Equal => Ok(Value::Boolean(left == right)),
        BinOp::NotEqual => Ok(Value::Boolean(left != right)),
        BinOp::LessThan | BinOp::LessEqual | BinOp::GreaterThan | BinOp::GreaterEqual => {
            compare(op, &left, &right)
        }
        BinOp::Match | BinOp::NotMatch => regex_match(op, &left, &right),
        BinOp::In => match right {
            Value::Array(items) => Ok(Value::Boolean(items.contains(&left))),
            other => Err(EvalError::type_error(format!(
                "Right side of 'in' must be an array, got {}",
                other.type_name()
            ))),
        },
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::ShiftLeft | BinOp::ShiftRight => {
            bitwise(op, &left, &right)
        }
        BinOp::And | BinOp::Or | BinOp::NullCoalesce => {
            unreachable!("short-circuit operators are handled in apply_link")
        }
    }
}

fn arithmetic(
    op: BinOp,
    left: &Value,
    right: &Value,
    apply: fn(f64, f64) -> f64,
) -> Result<Value, EvalError> {
    match (left.coerce_number(), right.coerce_number()) {
        (Some(a), Some(b)) => Ok(Value::Number(apply(a, b))),
        _ => {
            let (a, b) = (operand_name(left), operand_name(right));
            let message = match op {
                BinOp::Add => format!("Cannot add {} and {}", a, b),
                BinOp::Subtract => format!("Cannot subtract {} from {}", b, a),
                BinOp::Multiply => format!("Cannot multiply {} by {}", a, b),
                BinOp::Divide => format!("Cannot divide {} by {}", a, b),
                BinOp::Modulo => format!("Cannot compute modulo of {} by {}", a, b),
                _ => format!("Cannot raise {} to the power of {}", a, b),
            };
            Err(EvalError::TypeError(message))
        }
    }
}

fn compare(op: BinOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
        (a, b) => {
            return Err(EvalError::type_error(format!(
                "Cannot compare {} {} {} (comparison requires two numbers, two strings or two times)",
                a.type_name(),
                op,
                b.type_name()
            )));
        }
    };

    // NaN is unordered: every relational comparison with it is false.
    let result = ordering.is_some_and(|ordering| match op {
        BinOp::LessThan => ordering == Ordering::Less,
        BinOp::LessEqual => ordering != Ordering::Greater,
        BinOp::GreaterThan => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    });
    Ok(Value::Boolean(result))
}

fn regex_match(op: BinOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let subject = left.as_str().ok_or_else(|| {
        EvalError::type_error(format!(
            "Left side of '{}' must be a string, got {}",
            op,
            left.type_name()
        ))
    })?;

    let matched = match right {
        Value::Pattern(re) => re.is_match(subject),
        Value::String(source) => Regex::new(source)
            .map_err(|e| EvalError::type_error(format!("Invalid pattern '{}': {}", source, e)))?
            .is_match(subject),
        other => {
            return Err(EvalError::type_error(format!(
                "Right side of '{}' must be a pattern or string, got {}",
                op,
                other.type_name()
            )));
        }
    };

    Ok(Value::Boolean(if op == BinOp::Match { matched } else { !matched }))
}

fn bitwise(op: BinOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let (Some(a), Some(b)) = (left.as_integral(), right.as_integral()) else {
        return Err(EvalError::type_error(format!(
            "Bitwise '{}' requires integral numbers, got {} and {}",
            op,
            describe(left),
            describe(right)
        )));
    };

    let result = match op {
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        _ => {
            let amount = u32::try_from(b).ok().filter(|n| *n < 64).ok_or_else(|| {
                EvalError::type_error(format!("Shift amount must be between 0 and 63, got {}", b))
            })?;
            if op == BinOp::ShiftLeft {
                a << amount
            } else {
                a >> amount
            }
        }
    };
    Ok(Value::Number(result as f64))
}

fn apply_index(target: Value, index: &Value) -> Result<Value, EvalError> {
    let items = match target {
        Value::Array(items) => items,
        other => {
            return Err(EvalError::type_error(format!(
                "Cannot index into {}; only arrays support indexing",
                other.type_name()
            )));
        }
    };

    let Some(i) = index.as_number().and_then(integral) else {
        return Err(EvalError::type_error(format!(
            "Array index must be an integral number, got {}",
            describe(index)
        )));
    };

    // Negative index counts from the end (-1 = last); out of range reads as nil.
    let len = items.len() as i64;
    let position = if i < 0 { len + i } else { i };
    if position < 0 || position >= len {
        return Ok(Value::Nil);
    }
    Ok(items.into_iter().nth(position as usize).unwrap_or(Value::Nil))
}

/// Kind name, with the value itself for numbers so fractional operands are visible.
fn describe(v: &Value) -> String {
    match v {
        Value::Number(n) => format!("number {}", n),
        other => other.type_name().to_string(),
    }
}
