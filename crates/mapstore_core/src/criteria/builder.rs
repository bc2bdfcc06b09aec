//! Immutable criteria builder.

use super::predicate::{Leaf, Predicate};
use super::value::{Operand, Value};
use super::{Arity, Operator};
use crate::entity::{MapEntity, SearchableField};
use crate::error::{CoreError, CoreResult};
use std::fmt;

/// Builds a predicate tree over the fields `F` of one entity kind.
///
/// Builders are values: every method consumes the builder and returns a new
/// one, so a partially built criteria can be cloned and extended in
/// different directions. A fresh builder matches every entity.
#[derive(Debug, Clone, PartialEq)]
pub struct CriteriaBuilder<F> {
    root: Predicate<F>,
}

impl<F: SearchableField> CriteriaBuilder<F> {
    /// Creates a builder that matches every entity.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            root: Predicate::always(),
        }
    }

    /// ANDs a single-value comparison onto the criteria.
    ///
    /// For `IN`/`NOT_IN` the value is treated as a one-element set.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnsupportedFilter`] if the field does not
    /// support `op`, `op` takes no operand, or the value has the wrong type.
    pub fn compare(self, field: F, op: Operator, value: impl Into<Value>) -> CoreResult<Self> {
        let operand = match op.arity() {
            Arity::Set => Operand::Many(vec![value.into()]),
            _ => Operand::One(value.into()),
        };
        self.leaf(field, op, operand)
    }

    /// ANDs a set comparison (`IN` / `NOT_IN`) onto the criteria.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnsupportedFilter`] if `op` does not take a set
    /// or any value has the wrong type.
    pub fn compare_any<I, V>(self, field: F, op: Operator, values: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let operand = Operand::Many(values.into_iter().map(Into::into).collect());
        self.leaf(field, op, operand)
    }

    /// ANDs an `EXISTS` check onto the criteria.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnsupportedFilter`] if the field cannot be
    /// checked for existence.
    pub fn exists(self, field: F) -> CoreResult<Self> {
        self.leaf(field, Operator::Exists, Operand::None)
    }

    /// ANDs a `NOT_EXISTS` check onto the criteria.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnsupportedFilter`] if the field cannot be
    /// checked for existence.
    pub fn not_exists(self, field: F) -> CoreResult<Self> {
        self.leaf(field, Operator::NotExists, Operand::None)
    }

    /// Returns `self AND b1 AND b2 ...`.
    #[must_use]
    pub fn and(self, builders: impl IntoIterator<Item = Self>) -> Self {
        builders
            .into_iter()
            .fold(self, |acc, b| acc.push_and(b.root))
    }

    /// Returns `self AND (b1 OR b2 ...)`. An empty list matches nothing.
    #[must_use]
    pub fn or(self, builders: impl IntoIterator<Item = Self>) -> Self {
        let mut children = Vec::new();
        for builder in builders {
            if builder.root.is_always() {
                return self;
            }
            children.push(builder.root);
        }
        let alternative = if children.len() == 1 {
            children.pop().unwrap_or_else(Predicate::always)
        } else {
            Predicate::Or(children)
        };
        self.push_and(alternative)
    }

    /// Returns `self AND NOT builder`.
    #[must_use]
    pub fn not(self, builder: Self) -> Self {
        self.push_and(Predicate::Not(Box::new(builder.root)))
    }

    /// Evaluates the criteria against an entity of the matching kind.
    pub fn matches<E>(&self, entity: &E) -> bool
    where
        E: MapEntity<Field = F>,
    {
        self.root.test(entity)
    }

    /// Returns true if the criteria matches every entity.
    #[must_use]
    pub fn is_match_all(&self) -> bool {
        self.root.is_always()
    }

    /// The predicate tree built so far.
    #[must_use]
    pub fn predicate(&self) -> &Predicate<F> {
        &self.root
    }

    fn leaf(self, field: F, op: Operator, operand: Operand) -> CoreResult<Self> {
        validate(field, op, &operand)?;
        Ok(self.push_and(Predicate::Leaf(Leaf { field, op, operand })))
    }

    fn push_and(self, node: Predicate<F>) -> Self {
        if node.is_always() {
            return self;
        }
        let root = match self.root {
            Predicate::And(mut children) => {
                match node {
                    Predicate::And(more) => children.extend(more),
                    other => children.push(other),
                }
                if children.len() == 1 {
                    children.pop().unwrap_or_else(Predicate::always)
                } else {
                    Predicate::And(children)
                }
            }
            existing => match node {
                Predicate::And(mut more) => {
                    more.insert(0, existing);
                    Predicate::And(more)
                }
                other => Predicate::And(vec![existing, other]),
            },
        };
        Self { root }
    }
}

impl<F: SearchableField> Default for CriteriaBuilder<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: SearchableField> fmt::Display for CriteriaBuilder<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

fn validate<F: SearchableField>(field: F, op: Operator, operand: &Operand) -> CoreResult<()> {
    let reject = |reason: String| Err(CoreError::unsupported_filter(field.name(), op, reason));

    if !field.supports(op) {
        return reject(format!("field of kind {:?} does not support it", field.kind()));
    }

    match (op.arity(), operand) {
        (Arity::Nullary, Operand::None)
        | (Arity::Unary, Operand::One(_))
        | (Arity::Set, Operand::Many(_)) => {}
        (Arity::Nullary, _) => return reject("operator takes no operand".into()),
        (Arity::Unary, _) => return reject("operator takes exactly one value".into()),
        (Arity::Set, _) => return reject("operator takes a set of values".into()),
    }

    let expected = field.kind().operand_kind();
    if let Some(bad) = operand.values().find(|v| v.kind() != expected) {
        return reject(format!("operand {bad} is not of kind {expected:?}"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::ValueKind;
    use crate::entity::FieldValue;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Field {
        Name,
        Age,
        Active,
        Tags,
    }

    impl SearchableField for Field {
        fn name(&self) -> &'static str {
            match self {
                Self::Name => "NAME",
                Self::Age => "AGE",
                Self::Active => "ACTIVE",
                Self::Tags => "TAGS",
            }
        }

        fn kind(&self) -> ValueKind {
            match self {
                Self::Name => ValueKind::Str,
                Self::Age => ValueKind::Int,
                Self::Active => ValueKind::Bool,
                Self::Tags => ValueKind::StrSet,
            }
        }
    }

    #[derive(Debug, Clone)]
    struct Person {
        id: u32,
        name: String,
        age: Option<i64>,
        active: bool,
        tags: Vec<String>,
    }

    impl MapEntity for Person {
        type Key = u32;
        type Field = Field;

        fn id(&self) -> &u32 {
            &self.id
        }

        fn field_value(&self, field: Field) -> FieldValue<'_> {
            match field {
                Field::Name => FieldValue::str(&self.name),
                Field::Age => self.age.map_or(FieldValue::Absent, FieldValue::Int),
                Field::Active => FieldValue::Bool(self.active),
                Field::Tags => FieldValue::many(&self.tags),
            }
        }
    }

    fn alice() -> Person {
        Person {
            id: 1,
            name: "Alice".into(),
            age: Some(30),
            active: true,
            tags: vec!["admin".into(), "ops".into()],
        }
    }

    fn bob() -> Person {
        Person {
            id: 2,
            name: "Bob".into(),
            age: None,
            active: false,
            tags: vec![],
        }
    }

    fn builder() -> CriteriaBuilder<Field> {
        CriteriaBuilder::new()
    }

    #[test]
    fn empty_matches_everything() {
        let c = builder();
        assert!(c.is_match_all());
        assert!(c.matches(&alice()));
        assert!(c.matches(&bob()));
    }

    #[test]
    fn compare_chains_with_and() {
        let c = builder()
            .compare(Field::Name, Operator::Eq, "Alice")
            .unwrap()
            .compare(Field::Age, Operator::Ge, 18)
            .unwrap();
        assert!(c.matches(&alice()));
        assert!(!c.matches(&bob()));
        assert_eq!(c.to_string(), "(NAME EQ \"Alice\" AND AGE GE 18)");
    }

    #[test]
    fn ordering_on_absent_field_is_false() {
        let c = builder().compare(Field::Age, Operator::Lt, 100).unwrap();
        assert!(!c.matches(&bob()));
    }

    #[test]
    fn exists_and_not_exists() {
        let has_age = builder().exists(Field::Age).unwrap();
        let no_tags = builder().not_exists(Field::Tags).unwrap();
        assert!(has_age.matches(&alice()));
        assert!(!has_age.matches(&bob()));
        assert!(no_tags.matches(&bob()));
        assert!(!no_tags.matches(&alice()));
    }

    #[test]
    fn ilike_is_case_insensitive_substring() {
        let c = builder().compare(Field::Name, Operator::ILike, "%LIC%").unwrap();
        assert!(c.matches(&alice()));
        let c = builder().compare(Field::Name, Operator::Like, "%LIC%").unwrap();
        assert!(!c.matches(&alice()));
    }

    #[test]
    fn in_and_not_in() {
        let c = builder()
            .compare_any(Field::Name, Operator::In, ["Bob", "Carol"])
            .unwrap();
        assert!(c.matches(&bob()));
        assert!(!c.matches(&alice()));

        let c = builder()
            .compare_any(Field::Tags, Operator::NotIn, ["admin"])
            .unwrap();
        assert!(c.matches(&bob()));
        assert!(!c.matches(&alice()));

        let single = builder().compare(Field::Name, Operator::In, "Bob").unwrap();
        assert!(single.matches(&bob()));
    }

    #[test]
    fn or_and_not() {
        let alice_or_bob = builder().or([
            builder().compare(Field::Name, Operator::Eq, "Alice").unwrap(),
            builder().compare(Field::Name, Operator::Eq, "Bob").unwrap(),
        ]);
        assert!(alice_or_bob.matches(&alice()));
        assert!(alice_or_bob.matches(&bob()));

        let not_active = builder().not(builder().compare(Field::Active, Operator::Eq, true).unwrap());
        assert!(!not_active.matches(&alice()));
        assert!(not_active.matches(&bob()));
    }

    #[test]
    fn or_of_nothing_matches_nothing() {
        let c = builder().or(std::iter::empty());
        assert!(!c.matches(&alice()));
    }

    #[test]
    fn or_with_match_all_member_is_identity() {
        let base = builder().compare(Field::Active, Operator::Eq, true).unwrap();
        let c = base.clone().or([builder()]);
        assert_eq!(c, base);
    }

    #[test]
    fn and_flattens() {
        let a = builder().compare(Field::Name, Operator::Eq, "Alice").unwrap();
        let b = builder()
            .compare(Field::Active, Operator::Eq, true)
            .unwrap()
            .compare(Field::Age, Operator::Gt, 1)
            .unwrap();
        let c = a.and([b, builder()]);
        match c.predicate() {
            Predicate::And(children) => assert_eq!(children.len(), 3),
            other => panic!("expected flat AND, got {other}"),
        }
        assert!(c.matches(&alice()));
    }

    #[test]
    fn builders_are_values() {
        let base = builder().compare(Field::Active, Operator::Eq, true).unwrap();
        let narrowed = base.clone().compare(Field::Name, Operator::Eq, "Zed").unwrap();
        assert!(base.matches(&alice()));
        assert!(!narrowed.matches(&alice()));
    }

    #[test]
    fn rejects_unsupported_operator_for_kind() {
        let err = builder().compare(Field::Active, Operator::Lt, true).unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnsupportedFilter { field: "ACTIVE", operator: Operator::Lt, .. }
        ));
        assert!(builder().compare(Field::Age, Operator::ILike, "1%").is_err());
        assert!(builder().compare(Field::Tags, Operator::Gt, "a").is_err());
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!(builder().compare(Field::Name, Operator::Exists, "x").is_err());
        assert!(builder()
            .compare_any(Field::Name, Operator::Eq, ["a", "b"])
            .is_err());
    }

    #[test]
    fn rejects_wrong_operand_type() {
        let err = builder().compare(Field::Age, Operator::Eq, "thirty").unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedFilter { field: "AGE", .. }));
        assert!(builder()
            .compare_any(Field::Name, Operator::In, [Value::from("a"), Value::from(1)])
            .is_err());
    }
}
