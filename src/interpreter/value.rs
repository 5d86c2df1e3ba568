//! Typed Values
//!
//! The closed set of runtime values: text, 32-bit integers, 64-bit floats
//! and immutable arrays. Arithmetic and comparison are polymorphic over the
//! two numeric kinds; int op int stays int and fails on overflow, any float
//! operand promotes the result to float.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::ast::types::{BinaryOperator, DeclaredType, LiteralValue};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i32),
    Float(Float),
    Array(Vec<Value>),
}

/// A float and, when it came from source text, the spelling it was written in
#[derive(Debug, Clone)]
pub struct Float {
    pub value: f64,
    text: Option<Arc<str>>,
}

impl Float {
    pub fn new(value: f64) -> Self {
        Float { value, text: None }
    }

    /// Keep `text` as the display form; it must parse to `value`
    pub fn spelled(value: f64, text: &str) -> Self {
        Float {
            value,
            text: Some(Arc::from(text)),
        }
    }

    fn negate(&self) -> Self {
        let text = self.text.as_deref().map(|t| match t.strip_prefix('-') {
            Some(rest) => rest.to_string(),
            None => format!("-{}", t.strip_prefix('+').unwrap_or(t)),
        });
        Float {
            value: -self.value,
            text: text.map(Arc::from),
        }
    }
}

impl PartialEq for Float {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl fmt::Display for Float {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let x = self.value;
        match &self.text {
            Some(text) => f.write_str(text),
            None if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 => write!(f, "{:.1}", x),
            None => write!(f, "{}", x),
        }
    }
}

/// Failure of a value operation; the caller attaches the source span
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("{0}")]
    TypeMismatch(String),
    #[error("{0}")]
    Arithmetic(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Array(_) => "array",
        }
    }

    pub fn float(value: f64) -> Value {
        Value::Float(Float::new(value))
    }

    pub fn from_literal(literal: &LiteralValue) -> Value {
        match literal {
            LiteralValue::Int(n) => Value::Int(*n),
            LiteralValue::Float { value, text } => Value::Float(Float::spelled(*value, text)),
            LiteralValue::Str(s) => Value::Str(s.clone()),
        }
    }

    /// Boolean result of a comparison
    pub fn from_bool(b: bool) -> Value {
        Value::Int(i32::from(b))
    }

    /// Read-only indexed access; negative indices count from the end
    pub fn index(&self, index: i64) -> Result<Value, ValueError> {
        let Value::Array(items) = self else {
            return Err(ValueError::TypeMismatch(format!(
                "cannot index into a value of type {}",
                self.type_name()
            )));
        };
        let len = items.len() as i64;
        let resolved = if index < 0 { len + index } else { index };
        usize::try_from(resolved)
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .ok_or_else(|| {
                ValueError::TypeMismatch(format!(
                    "index {} out of bounds for array of length {}",
                    index, len
                ))
            })
    }

    /// Parse numeric text the way typed assignment does
    pub fn parse_number(text: &str) -> Option<Value> {
        let trimmed = text.trim();
        if let Ok(n) = trimmed.parse::<i32>() {
            return Some(Value::Int(n));
        }
        if trimmed.is_empty() || trimmed.parse::<i64>().is_ok() {
            return None;
        }
        trimmed
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| Value::Float(Float::spelled(f, trimmed)))
    }

    /// Coerce into a declared type, failing instead of truncating
    pub fn coerce_to(self, declared: DeclaredType) -> Result<Value, ValueError> {
        let mismatch = |value: &Value| {
            ValueError::TypeMismatch(format!(
                "cannot store {} value `{}` in `{}` variable",
                value.type_name(),
                value,
                declared
            ))
        };

        match (declared, self) {
            (DeclaredType::Int, v @ Value::Int(_)) => Ok(v),
            (DeclaredType::Int, Value::Str(s)) => match s.trim().parse::<i32>() {
                Ok(n) => Ok(Value::Int(n)),
                Err(_) if s.trim().parse::<i64>().is_ok() => Err(ValueError::Arithmetic(format!(
                    "integer `{}` does not fit in int",
                    s.trim()
                ))),
                Err(_) => Err(mismatch(&Value::Str(s))),
            },
            (DeclaredType::Float, Value::Int(n)) => Ok(Value::float(f64::from(n))),
            (DeclaredType::Float, v @ Value::Float(_)) => Ok(v),
            (DeclaredType::Float, Value::Str(s)) => match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Value::Float(Float::spelled(f, s.trim()))),
                _ => Err(mismatch(&Value::Str(s))),
            },
            (DeclaredType::Str, v @ Value::Str(_)) => Ok(v),
            (DeclaredType::Str, v @ (Value::Int(_) | Value::Float(_))) => Ok(Value::Str(v.to_string())),
            (DeclaredType::Array, v @ Value::Array(_)) => Ok(v),
            (_, other) => Err(mismatch(&other)),
        }
    }

    pub fn negate(&self) -> Result<Value, ValueError> {
        match self {
            Value::Int(n) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| ValueError::Arithmetic(format!("integer overflow: -({})", n))),
            Value::Float(f) => Ok(Value::Float(f.negate())),
            other => Err(ValueError::TypeMismatch(format!(
                "cannot negate a value of type {}",
                other.type_name()
            ))),
        }
    }

    /// Apply a binary operator
    pub fn binary(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Value, ValueError> {
        match op {
            BinaryOperator::Eq => Ok(Value::from_bool(lhs.loosely_equals(rhs))),
            BinaryOperator::Ne => Ok(Value::from_bool(!lhs.loosely_equals(rhs))),
            BinaryOperator::Lt => Ok(Value::from_bool(lhs.compare(rhs, op)? == Ordering::Less)),
            BinaryOperator::Gt => Ok(Value::from_bool(lhs.compare(rhs, op)? == Ordering::Greater)),
            BinaryOperator::Le => Ok(Value::from_bool(lhs.compare(rhs, op)? != Ordering::Greater)),
            BinaryOperator::Ge => Ok(Value::from_bool(lhs.compare(rhs, op)? != Ordering::Less)),
            _ => arithmetic(op, lhs, rhs),
        }
    }

    /// Numeric ordering; strings and arrays are not ordered
    pub fn compare(&self, other: &Value, op: BinaryOperator) -> Result<Ordering, ValueError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(|| {
                    ValueError::Arithmetic(format!("cannot compare {} {} {}", x, op, y))
                }),
                _ => Err(operand_mismatch(op, a, b)),
            },
        }
    }

    fn loosely_equals(&self, other: &Value) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => self == other,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(f64::from(*n)),
            Value::Float(f) => Some(f.value),
            _ => None,
        }
    }

    /// Text as used for export to child processes and `test`
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

fn operand_mismatch(op: BinaryOperator, lhs: &Value, rhs: &Value) -> ValueError {
    ValueError::TypeMismatch(format!(
        "unsupported operand types for `{}`: {} and {}",
        op,
        lhs.type_name(),
        rhs.type_name()
    ))
}

fn arithmetic(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Value, ValueError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            if matches!(op, BinaryOperator::Div | BinaryOperator::Rem) && b == 0 {
                return Err(ValueError::Arithmetic("division by zero".to_string()));
            }
            let result = match op {
                BinaryOperator::Add => a.checked_add(b),
                BinaryOperator::Sub => a.checked_sub(b),
                BinaryOperator::Mul => a.checked_mul(b),
                BinaryOperator::Div => a.checked_div(b),
                _ => a.checked_rem(b),
            };
            result.map(Value::Int).ok_or_else(|| {
                ValueError::Arithmetic(format!("integer overflow: {} {} {} does not fit in int", a, op, b))
            })
        }
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => {
                if matches!(op, BinaryOperator::Div | BinaryOperator::Rem) && y == 0.0 {
                    return Err(ValueError::Arithmetic("division by zero".to_string()));
                }
                Ok(Value::float(match op {
                    BinaryOperator::Add => x + y,
                    BinaryOperator::Sub => x - y,
                    BinaryOperator::Mul => x * y,
                    BinaryOperator::Div => x / y,
                    _ => x % y,
                }))
            }
            _ => Err(operand_mismatch(op, a, b)),
        },
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_display() {
        let array = Value::Array(vec![
            Value::Int(1),
            Value::Str("foo".into()),
            Value::float(3.5),
        ]);
        assert_eq!(array.to_string(), "1 foo 3.5");
    }

    #[test]
    fn test_float_display_keeps_point() {
        assert_eq!(Value::float(3.0).to_string(), "3.0");
        assert_eq!(Value::float(0.25).to_string(), "0.25");
    }

    #[test]
    fn test_float_keeps_source_spelling() {
        let literal = LiteralValue::Float {
            value: 1000.0,
            text: "1e3".into(),
        };
        assert_eq!(Value::from_literal(&literal).to_string(), "1e3");
        assert_eq!(Value::from_literal(&literal).negate().unwrap().to_string(), "-1e3");
        assert_eq!(Value::from_literal(&literal), Value::float(1000.0));
        let sum = Value::binary(BinaryOperator::Add, &Value::from_literal(&literal), &Value::Int(1)).unwrap();
        assert_eq!(sum.to_string(), "1001.0");
        let array = Value::Array(vec![Value::Int(1), Value::Str("foo".into()), Value::from_literal(&literal)]);
        assert_eq!(array.to_string(), "1 foo 1e3");
    }

    #[test]
    fn test_non_finite_text_is_not_a_float() {
        for text in ["nan", "inf", "-infinity", "NaN"] {
            assert!(matches!(
                Value::Str(text.into()).coerce_to(DeclaredType::Float),
                Err(ValueError::TypeMismatch(_))
            ));
        }
        assert_eq!(
            Value::Str(" 2.50 ".into()).coerce_to(DeclaredType::Float).unwrap().to_string(),
            "2.50"
        );
    }

    #[test]
    fn test_int_overflow() {
        let err = Value::binary(BinaryOperator::Add, &Value::Int(i32::MAX), &Value::Int(1)).unwrap_err();
        assert!(matches!(err, ValueError::Arithmetic(_)));
        assert!(Value::Int(i32::MIN).negate().is_err());
    }

    #[test]
    fn test_division_by_zero() {
        for (a, b) in [(Value::Int(1), Value::Int(0)), (Value::float(1.0), Value::Int(0))] {
            let err = Value::binary(BinaryOperator::Div, &a, &b).unwrap_err();
            assert_eq!(err, ValueError::Arithmetic("division by zero".into()));
        }
    }

    #[test]
    fn test_float_promotion() {
        assert_eq!(
            Value::binary(BinaryOperator::Mul, &Value::Int(2), &Value::float(1.5)).unwrap(),
            Value::float(3.0)
        );
        assert_eq!(
            Value::binary(BinaryOperator::Div, &Value::Int(7), &Value::Int(2)).unwrap(),
            Value::Int(3)
        );
    }

    #[test]
    fn test_string_arithmetic_fails() {
        let err = Value::binary(BinaryOperator::Add, &Value::Str("a".into()), &Value::Int(1)).unwrap_err();
        assert!(matches!(err, ValueError::TypeMismatch(_)));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(
            Value::binary(BinaryOperator::Lt, &Value::Int(1), &Value::float(1.5)).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            Value::binary(BinaryOperator::Eq, &Value::Int(2), &Value::float(2.0)).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            Value::binary(BinaryOperator::Eq, &Value::Str("a".into()), &Value::Str("a".into())).unwrap(),
            Value::Int(1)
        );
        assert!(Value::binary(BinaryOperator::Gt, &Value::Str("b".into()), &Value::Str("a".into())).is_err());
    }

    #[test]
    fn test_coercion() {
        assert_eq!(Value::Str("42".into()).coerce_to(DeclaredType::Int).unwrap(), Value::Int(42));
        assert_eq!(Value::Int(3).coerce_to(DeclaredType::Float).unwrap(), Value::float(3.0));
        assert_eq!(Value::float(2.5).coerce_to(DeclaredType::Str).unwrap(), Value::Str("2.5".into()));
        assert!(matches!(
            Value::Str("abc".into()).coerce_to(DeclaredType::Float),
            Err(ValueError::TypeMismatch(_))
        ));
        assert!(matches!(
            Value::float(2.5).coerce_to(DeclaredType::Int),
            Err(ValueError::TypeMismatch(_))
        ));
        assert!(matches!(
            Value::Str("3000000000".into()).coerce_to(DeclaredType::Int),
            Err(ValueError::Arithmetic(_))
        ));
        assert!(Value::Int(1).coerce_to(DeclaredType::Array).is_err());
    }

    #[test]
    fn test_indexing() {
        let array = Value::Array(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(array.index(1).unwrap(), Value::Int(2));
        assert_eq!(array.index(-1).unwrap(), Value::Int(2));
        assert!(array.index(2).is_err());
        assert!(Value::Int(1).index(0).is_err());
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(Value::parse_number(" 7 "), Some(Value::Int(7)));
        assert_eq!(Value::parse_number("2.5"), Some(Value::float(2.5)));
        assert_eq!(Value::parse_number("abc"), None);
        assert_eq!(Value::parse_number("9999999999"), None);
    }
}
