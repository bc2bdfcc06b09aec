//! Criteria: composable predicates over searchable fields.
//!
//! A [`CriteriaBuilder`] is built against one entity kind's field enum and
//! can only be evaluated against entities of that kind; the field type
//! parameter enforces it. Leaves are validated as they are added, so an
//! unsupported field/operator/operand combination fails at build time with
//! [`crate::CoreError::UnsupportedFilter`] instead of silently matching
//! nothing during a query.
//!
//! ```rust,ignore
//! let criteria = storage
//!     .create_criteria_builder()
//!     .compare(ResourceField::ResourceServerId, Operator::Eq, "rs-1")?
//!     .compare(ResourceField::Name, Operator::ILike, "%photo%")?;
//! let count = tx.get_count(&criteria)?;
//! ```

mod builder;
mod predicate;
mod value;

pub use builder::CriteriaBuilder;
pub use predicate::{Leaf, Predicate};
pub use value::{Operand, Value};

use std::fmt;

/// Comparison operator of a criteria leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Equal.
    Eq,
    /// Not equal. Also matches entities where the field is absent.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Member of the operand set.
    In,
    /// Not a member of the operand set. Also matches absent fields.
    NotIn,
    /// The field has a value.
    Exists,
    /// The field has no value.
    NotExists,
    /// Case-sensitive pattern match, `%` matches any run of characters.
    Like,
    /// Case-insensitive pattern match, `%` matches any run of characters.
    ILike,
}

/// How many operand values an operator takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// No operand.
    Nullary,
    /// Exactly one value.
    Unary,
    /// A set of values.
    Set,
}

impl Operator {
    /// Returns the operand arity of this operator.
    #[must_use]
    pub const fn arity(self) -> Arity {
        match self {
            Self::Exists | Self::NotExists => Arity::Nullary,
            Self::In | Self::NotIn => Arity::Set,
            _ => Arity::Unary,
        }
    }

    /// Whether the operator is meaningful for fields of the given kind.
    #[must_use]
    pub const fn applies_to(self, kind: ValueKind) -> bool {
        match kind {
            ValueKind::Str => true,
            ValueKind::StrSet => !matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge),
            ValueKind::Int => !matches!(self, Self::Like | Self::ILike),
            ValueKind::Bool => matches!(
                self,
                Self::Eq | Self::Ne | Self::Exists | Self::NotExists
            ),
        }
    }

    /// Upper-case mnemonic.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Lt => "LT",
            Self::Le => "LE",
            Self::Gt => "GT",
            Self::Ge => "GE",
            Self::In => "IN",
            Self::NotIn => "NOT_IN",
            Self::Exists => "EXISTS",
            Self::NotExists => "NOT_EXISTS",
            Self::Like => "LIKE",
            Self::ILike => "ILIKE",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of a searchable field's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Single string.
    Str,
    /// Collection of strings; a comparison matches if any element matches.
    StrSet,
    /// Integer.
    Int,
    /// Boolean.
    Bool,
}

impl ValueKind {
    /// The kind of operand values compared against a field of this kind.
    #[must_use]
    pub const fn operand_kind(self) -> Self {
        match self {
            Self::StrSet => Self::Str,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity() {
        assert_eq!(Operator::Exists.arity(), Arity::Nullary);
        assert_eq!(Operator::NotIn.arity(), Arity::Set);
        assert_eq!(Operator::ILike.arity(), Arity::Unary);
    }

    #[test]
    fn operator_applicability() {
        assert!(Operator::Lt.applies_to(ValueKind::Int));
        assert!(!Operator::Lt.applies_to(ValueKind::StrSet));
        assert!(!Operator::ILike.applies_to(ValueKind::Int));
        assert!(!Operator::In.applies_to(ValueKind::Bool));
        assert!(Operator::Eq.applies_to(ValueKind::Bool));
    }

    #[test]
    fn display() {
        assert_eq!(Operator::NotExists.to_string(), "NOT_EXISTS");
    }
}
