//! Predicate trees and their evaluation.

use super::value::{Operand, Value};
use super::Operator;
use crate::entity::{FieldValue, MapEntity, SearchableField};
use std::cmp::Ordering;
use std::fmt;

/// A validated comparison of one field against an operand.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf<F> {
    pub(crate) field: F,
    pub(crate) op: Operator,
    pub(crate) operand: Operand,
}

impl<F: SearchableField> Leaf<F> {
    /// The compared field.
    pub fn field(&self) -> F {
        self.field
    }

    /// The operator.
    pub fn operator(&self) -> Operator {
        self.op
    }

    /// The operand.
    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    /// Evaluates the leaf against one field value.
    #[must_use]
    pub fn test(&self, value: &FieldValue<'_>) -> bool {
        match self.op {
            Operator::Exists => value.is_present(),
            Operator::NotExists => !value.is_present(),
            Operator::Ne => !any_scalar(value, |s| self.operand.values().any(|v| s.equals(v))),
            Operator::NotIn => !any_scalar(value, |s| self.operand.values().any(|v| s.equals(v))),
            Operator::Eq | Operator::In => {
                any_scalar(value, |s| self.operand.values().any(|v| s.equals(v)))
            }
            Operator::Lt => self.ordered(value, |o| o == Ordering::Less),
            Operator::Le => self.ordered(value, |o| o != Ordering::Greater),
            Operator::Gt => self.ordered(value, |o| o == Ordering::Greater),
            Operator::Ge => self.ordered(value, |o| o != Ordering::Less),
            Operator::Like => self.pattern(value, false),
            Operator::ILike => self.pattern(value, true),
        }
    }

    fn ordered(&self, value: &FieldValue<'_>, accept: impl Fn(Ordering) -> bool) -> bool {
        let Operand::One(expected) = &self.operand else {
            return false;
        };
        any_scalar(value, |s| s.compare(expected).is_some_and(&accept))
    }

    fn pattern(&self, value: &FieldValue<'_>, ignore_case: bool) -> bool {
        let Some(pattern) = self.operand.values().next().and_then(Value::as_str) else {
            return false;
        };
        if ignore_case {
            let pattern = pattern.to_lowercase();
            any_scalar(value, |s| match s {
                Scalar::Str(text) => like_match(&text.to_lowercase(), &pattern),
                _ => false,
            })
        } else {
            any_scalar(value, |s| match s {
                Scalar::Str(text) => like_match(text, pattern),
                _ => false,
            })
        }
    }
}

impl<F: SearchableField> fmt::Display for Leaf<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}{}", self.field.name(), self.op, self.operand)
    }
}

/// A node of a boolean expression tree over searchable fields.
///
/// `And(vec![])` is the always-true tree and `Or(vec![])` the always-false
/// one.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate<F> {
    /// A single comparison.
    Leaf(Leaf<F>),
    /// All children must hold.
    And(Vec<Predicate<F>>),
    /// At least one child must hold.
    Or(Vec<Predicate<F>>),
    /// The child must not hold.
    Not(Box<Predicate<F>>),
}

impl<F: SearchableField> Predicate<F> {
    /// The always-true predicate.
    #[must_use]
    pub const fn always() -> Self {
        Self::And(Vec::new())
    }

    /// Returns true if this is the always-true predicate.
    #[must_use]
    pub fn is_always(&self) -> bool {
        matches!(self, Self::And(children) if children.is_empty())
    }

    /// Evaluates the tree against an entity, short-circuiting AND and OR.
    pub fn test<E>(&self, entity: &E) -> bool
    where
        E: MapEntity<Field = F>,
    {
        match self {
            Self::Leaf(leaf) => leaf.test(&entity.field_value(leaf.field)),
            Self::And(children) => children.iter().all(|p| p.test(entity)),
            Self::Or(children) => children.iter().any(|p| p.test(entity)),
            Self::Not(child) => !child.test(entity),
        }
    }
}

impl<F: SearchableField> fmt::Display for Predicate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<F: SearchableField>(
            f: &mut fmt::Formatter<'_>,
            children: &[Predicate<F>],
            sep: &str,
            empty: &str,
        ) -> fmt::Result {
            if children.is_empty() {
                return f.write_str(empty);
            }
            f.write_str("(")?;
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{child}")?;
            }
            f.write_str(")")
        }

        match self {
            Self::Leaf(leaf) => write!(f, "{leaf}"),
            Self::And(children) => join(f, children, " AND ", "TRUE"),
            Self::Or(children) => join(f, children, " OR ", "FALSE"),
            Self::Not(child) => write!(f, "NOT {child}"),
        }
    }
}

/// One scalar of a field value.
#[derive(Debug, Clone, Copy)]
enum Scalar<'v> {
    Str(&'v str),
    Int(i64),
    Bool(bool),
}

impl Scalar<'_> {
    fn compare(self, value: &Value) -> Option<Ordering> {
        match (self, value) {
            (Self::Str(a), Value::Str(b)) => Some(a.cmp(b.as_str())),
            (Self::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn equals(self, value: &Value) -> bool {
        self.compare(value) == Some(Ordering::Equal)
    }
}

/// Returns true if any scalar of `value` satisfies `f`. Absent values have
/// no scalars.
fn any_scalar(value: &FieldValue<'_>, f: impl Fn(Scalar<'_>) -> bool) -> bool {
    match value {
        FieldValue::Absent => false,
        FieldValue::Str(s) => f(Scalar::Str(s)),
        FieldValue::Int(i) => f(Scalar::Int(*i)),
        FieldValue::Bool(b) => f(Scalar::Bool(*b)),
        FieldValue::Many(values) => values.iter().any(|s| f(Scalar::Str(s))),
    }
}

/// SQL-style LIKE matching where `%` matches any run of characters.
pub(crate) fn like_match(text: &str, pattern: &str) -> bool {
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return text == pattern;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }

    rest.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn like_exact() {
        assert!(like_match("photo", "photo"));
        assert!(!like_match("photos", "photo"));
    }

    #[test]
    fn like_wildcards() {
        assert!(like_match("my photo album", "%photo%"));
        assert!(like_match("photo album", "photo%"));
        assert!(like_match("album photo", "%photo"));
        assert!(!like_match("album photo", "photo%"));
        assert!(like_match("a-b-c", "a%b%c"));
        assert!(!like_match("a-c-b", "a%b%c"));
        assert!(like_match("anything", "%"));
        assert!(like_match("", "%"));
        assert!(like_match("abc", "a%%c"));
    }

    #[test]
    fn like_does_not_overlap_prefix_and_suffix() {
        assert!(!like_match("ab", "ab%ab"));
        assert!(like_match("abab", "ab%ab"));
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct Name;

    impl SearchableField for Name {
        fn name(&self) -> &'static str {
            "NAME"
        }

        fn kind(&self) -> super::super::ValueKind {
            super::super::ValueKind::StrSet
        }
    }

    fn leaf(op: Operator, operand: Operand) -> Leaf<Name> {
        Leaf {
            field: Name,
            op,
            operand,
        }
    }

    #[test]
    fn negations_match_absent() {
        let ne = leaf(Operator::Ne, Operand::One(Value::from("x")));
        let not_in = leaf(Operator::NotIn, Operand::Many(vec![Value::from("x")]));
        assert!(ne.test(&FieldValue::Absent));
        assert!(not_in.test(&FieldValue::Absent));
        assert!(!ne.test(&FieldValue::str("x")));
    }

    #[test]
    fn collections_match_any_element() {
        let value = FieldValue::Many(vec![Cow::Borrowed("s1"), Cow::Borrowed("s2")]);
        assert!(leaf(Operator::Eq, Operand::One(Value::from("s2"))).test(&value));
        assert!(leaf(Operator::In, Operand::Many(vec![Value::from("s9"), Value::from("s1")]))
            .test(&value));
        assert!(!leaf(Operator::Ne, Operand::One(Value::from("s1"))).test(&value));
        assert!(leaf(Operator::ILike, Operand::One(Value::from("S%"))).test(&value));
    }

    #[test]
    fn mismatched_types_never_match() {
        let eq = leaf(Operator::Eq, Operand::One(Value::Int(1)));
        assert!(!eq.test(&FieldValue::str("1")));
    }

    #[test]
    fn display() {
        let p: Predicate<Name> = Predicate::And(vec![
            Predicate::Leaf(leaf(Operator::Eq, Operand::One(Value::from("a")))),
            Predicate::Not(Box::new(Predicate::Leaf(leaf(Operator::Exists, Operand::None)))),
        ]);
        assert_eq!(p.to_string(), "(NAME EQ \"a\" AND NOT NAME EXISTS)");
        assert_eq!(Predicate::<Name>::always().to_string(), "TRUE");
    }
}
