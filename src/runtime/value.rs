//! Runtime values.
//!
//! Values have value semantics: assigning an array copies it, and
//! mutating one binding never affects another. Objects are the
//! exception; they are weak handles into host-owned state.

use std::fmt;

use crate::error::RuntimeError;

use super::object::ObjectRef;

/// Type ordinals. These are stable: the wire format and hosts rely on
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TypeId {
    Void = 0,
    Number = 1,
    String = 2,
    Object = 3,
    Boolean = 4,
    Array = 5,
    Enumerator = 6,
}

impl TypeId {
    pub fn name(&self) -> &'static str {
        match self {
            TypeId::Void => "void",
            TypeId::Number => "number",
            TypeId::String => "string",
            TypeId::Object => "object",
            TypeId::Boolean => "boolean",
            TypeId::Array => "array",
            TypeId::Enumerator => "enumerator",
        }
    }
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The unit value.
    Void,
    /// IEEE-754 binary64.
    Number(f64),
    /// Immutable text.
    String(String),
    /// Weak handle to a host-provided object.
    Object(ObjectRef),
    Boolean(bool),
    /// Ordered sequence of values, owned by value.
    Array(Vec<Value>),
    /// Cursor over a snapshot of an array.
    Enumerator(Box<Enumerator>),
}

impl Value {
    pub fn type_of(&self) -> TypeId {
        match self {
            Value::Void => TypeId::Void,
            Value::Number(_) => TypeId::Number,
            Value::String(_) => TypeId::String,
            Value::Object(_) => TypeId::Object,
            Value::Boolean(_) => TypeId::Boolean,
            Value::Array(_) => TypeId::Array,
            Value::Enumerator(_) => TypeId::Enumerator,
        }
    }

    // --- Conversions. These never coerce: the variant must match. ---

    pub fn as_number(&self) -> Result<f64, RuntimeError> {
        match self {
            Value::Number(value) => Ok(*value),
            _ => Err(RuntimeError::TypeMismatch),
        }
    }

    pub fn as_boolean(&self) -> Result<bool, RuntimeError> {
        match self {
            Value::Boolean(value) => Ok(*value),
            _ => Err(RuntimeError::TypeMismatch),
        }
    }

    pub fn into_string(self) -> Result<String, RuntimeError> {
        match self {
            Value::String(value) => Ok(value),
            _ => Err(RuntimeError::TypeMismatch),
        }
    }

    pub fn into_array(self) -> Result<Vec<Value>, RuntimeError> {
        match self {
            Value::Array(value) => Ok(value),
            _ => Err(RuntimeError::TypeMismatch),
        }
    }

    pub fn into_object(self) -> Result<ObjectRef, RuntimeError> {
        match self {
            Value::Object(value) => Ok(value),
            _ => Err(RuntimeError::TypeMismatch),
        }
    }

    /// Variant-exact equality. Different variants compare unequal;
    /// enumerators may not be compared at all.
    pub fn equals(&self, other: &Value) -> Result<bool, RuntimeError> {
        match (self, other) {
            (Value::Enumerator(_), Value::Enumerator(_)) => Err(RuntimeError::InvalidOperator),
            (Value::Void, Value::Void) => Ok(true),
            (Value::Number(a), Value::Number(b)) => Ok(a == b),
            (Value::String(a), Value::String(b)) => Ok(a == b),
            (Value::Boolean(a), Value::Boolean(b)) => Ok(a == b),
            (Value::Object(a), Value::Object(b)) => Ok(a == b),
            (Value::Array(a), Value::Array(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (lhs, rhs) in a.iter().zip(b.iter()) {
                    if !lhs.equals(rhs)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// The `+` operator, overloaded on the left operand: numeric sum,
    /// string concatenation or array concatenation.
    pub fn add(self, rhs: Value) -> Result<Value, RuntimeError> {
        match self {
            Value::Number(lhs) => Ok(Value::Number(lhs + rhs.as_number()?)),
            Value::String(lhs) => Ok(Value::String(lhs + &rhs.into_string()?)),
            Value::Array(mut lhs) => {
                lhs.extend(rhs.into_array()?);
                Ok(Value::Array(lhs))
            }
            _ => Err(RuntimeError::InvalidOperator),
        }
    }
}

/// A cursor over a snapshot of an array. The cursor starts before the
/// first element; once exhausted it stays exhausted. Mutating the
/// original array after the enumerator was created has no effect on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Enumerator {
    array: Vec<Value>,
    index: usize,
}

impl Enumerator {
    pub fn new(array: Vec<Value>) -> Self {
        Self { array, index: 0 }
    }

    /// Advance and yield the next element, or `None` once exhausted.
    pub fn next(&mut self) -> Option<Value> {
        let value = self.array.get(self.index).cloned()?;
        self.index += 1;
        Some(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Number(value) => write!(f, "{}", value),
            Value::String(value) => write!(f, "{}", value),
            Value::Object(_) => write!(f, "object"),
            Value::Boolean(value) => write!(f, "{}", value),
            Value::Array(values) => {
                write!(f, "[")?;
                for value in values {
                    write!(f, " {}", value)?;
                }
                write!(f, " ]")
            }
            Value::Enumerator(_) => write!(f, "enumerator"),
        }
    }
}
