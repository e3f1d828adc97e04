//! Typed parameter values
//!
//! A [`Value`] packs into a `u64` so endpoints can hold it in an atomic.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{EndpointError, EndpointResult};

/// Storage type of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValType {
    Float,
    Double,
    Int,
    Bool,
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValType::Float => "float",
            ValType::Double => "double",
            ValType::Int => "int",
            ValType::Bool => "bool",
        };
        f.write_str(name)
    }
}

/// A parameter value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Float(f32),
    Double(f64),
    Int(i32),
    Bool(bool),
}

impl Value {
    pub fn val_type(&self) -> ValType {
        match self {
            Value::Float(_) => ValType::Float,
            Value::Double(_) => ValType::Double,
            Value::Int(_) => ValType::Int,
            Value::Bool(_) => ValType::Bool,
        }
    }

    /// Bit pattern for atomic storage
    #[inline]
    pub fn to_bits(self) -> u64 {
        match self {
            Value::Float(v) => v.to_bits() as u64,
            Value::Double(v) => v.to_bits(),
            Value::Int(v) => v as u32 as u64,
            Value::Bool(v) => v as u64,
        }
    }

    /// Inverse of [`Value::to_bits`]
    #[inline]
    pub fn from_bits(ty: ValType, bits: u64) -> Self {
        match ty {
            ValType::Float => Value::Float(f32::from_bits(bits as u32)),
            ValType::Double => Value::Double(f64::from_bits(bits)),
            ValType::Int => Value::Int(bits as u32 as i32),
            ValType::Bool => Value::Bool(bits != 0),
        }
    }

    /// Numeric view; booleans are 0 or 1
    pub fn to_f64(self) -> f64 {
        match self {
            Value::Float(v) => v as f64,
            Value::Double(v) => v,
            Value::Int(v) => v as f64,
            Value::Bool(v) => {
                if v {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Build a value of `ty` from a number (ints round, bools threshold at 0.5)
    pub fn from_f64(ty: ValType, v: f64) -> Self {
        match ty {
            ValType::Float => Value::Float(v as f32),
            ValType::Double => Value::Double(v),
            ValType::Int => Value::Int(v.round() as i32),
            ValType::Bool => Value::Bool(v >= 0.5),
        }
    }

    /// Convert to `ty`, going through `f64` when the types differ
    pub fn cast(self, ty: ValType) -> Self {
        if self.val_type() == ty {
            self
        } else {
            Value::from_f64(ty, self.to_f64())
        }
    }

    pub fn as_f32(self) -> f32 {
        match self {
            Value::Float(v) => v,
            other => other.to_f64() as f32,
        }
    }

    pub fn as_f64(self) -> f64 {
        self.to_f64()
    }

    pub fn as_i32(self) -> i32 {
        match self {
            Value::Int(v) => v,
            other => other.to_f64().round() as i32,
        }
    }

    pub fn as_bool(self) -> bool {
        match self {
            Value::Bool(v) => v,
            other => other.to_f64() != 0.0,
        }
    }

    /// Parse text as `ty`
    ///
    /// Booleans accept `true`/`false`/`1`/`0`.
    pub fn parse(ty: ValType, input: &str) -> EndpointResult<Self> {
        let text = input.trim();
        let err = || EndpointError::ParseValue {
            ty,
            input: input.to_string(),
        };
        match ty {
            ValType::Float => text.parse().map(Value::Float).map_err(|_| err()),
            ValType::Double => text.parse().map(Value::Double).map_err(|_| err()),
            ValType::Int => text.parse().map(Value::Int).map_err(|_| err()),
            ValType::Bool => match text {
                "1" | "true" => Ok(Value::Bool(true)),
                "0" | "false" => Ok(Value::Bool(false)),
                _ => Err(err()),
            },
        }
    }

    /// `self < other` in `self`'s type
    pub fn less_than(self, other: Value) -> bool {
        match (self, other.cast(self.val_type())) {
            (Value::Float(a), Value::Float(b)) => a < b,
            (Value::Double(a), Value::Double(b)) => a < b,
            (Value::Int(a), Value::Int(b)) => a < b,
            (Value::Bool(a), Value::Bool(b)) => !a & b,
            _ => false,
        }
    }

    /// Sum in `self`'s type; booleans toggle on a true increment
    pub fn add(self, incr: Value) -> Value {
        match (self, incr.cast(self.val_type())) {
            (Value::Float(a), Value::Float(b)) => Value::Float(a + b),
            (Value::Double(a), Value::Double(b)) => Value::Double(a + b),
            (Value::Int(a), Value::Int(b)) => Value::Int(a.saturating_add(b)),
            (Value::Bool(a), Value::Bool(b)) => Value::Bool(a ^ b),
            (a, _) => a,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
