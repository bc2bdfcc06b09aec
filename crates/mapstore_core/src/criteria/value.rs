//! Operand values of criteria leaves.

use super::ValueKind;
use std::fmt;

/// A single operand value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// String operand.
    Str(String),
    /// Integer operand.
    Int(i64),
    /// Boolean operand.
    Bool(bool),
}

impl Value {
    /// The kind of this value.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Str(_) => ValueKind::Str,
            Self::Int(_) => ValueKind::Int,
            Self::Bool(_) => ValueKind::Bool,
        }
    }

    /// Returns the string, if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// The operand of a criteria leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// No operand (`EXISTS`, `NOT_EXISTS`).
    None,
    /// One value.
    One(Value),
    /// A set of values (`IN`, `NOT_IN`).
    Many(Vec<Value>),
}

impl Operand {
    /// Iterates over the contained values.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        let slice: &[Value] = match self {
            Self::None => &[],
            Self::One(v) => std::slice::from_ref(v),
            Self::Many(vs) => vs,
        };
        slice.iter()
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::One(v) => write!(f, " {v}"),
            Self::Many(vs) => {
                f.write_str(" [")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(Value::from("a"), Value::Str("a".into()));
        assert_eq!(Value::from(3), Value::Int(3));
        assert_eq!(Value::from(true).kind(), ValueKind::Bool);
    }

    #[test]
    fn operand_values() {
        assert_eq!(Operand::None.values().count(), 0);
        assert_eq!(Operand::One(Value::Int(1)).values().count(), 1);
        let many = Operand::Many(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(many.to_string(), " [1, 2]");
    }
}
