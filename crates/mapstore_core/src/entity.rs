//! Entity kinds and their searchable fields.

use crate::criteria::{Operator, ValueKind};
use crate::key::MapKey;
use std::borrow::Cow;
use std::fmt::Debug;
use std::hash::Hash;

/// A logical, queryable field of an entity kind.
///
/// Each entity kind publishes its fields as a closed enum. The field
/// declares which operators and operand types it accepts; criteria leaves
/// that violate this are rejected when they are built.
pub trait SearchableField: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Stable upper-case name, used in diagnostics.
    fn name(&self) -> &'static str;

    /// The operand type comparisons against this field take.
    fn kind(&self) -> ValueKind;

    /// Whether the field can be used with `op`.
    ///
    /// The default accepts every operator that makes sense for the field's
    /// [`ValueKind`].
    fn supports(&self, op: Operator) -> bool {
        op.applies_to(self.kind())
    }
}

/// A record stored by the engine.
///
/// Entities are cloned at the engine boundary: the backend keeps its own
/// copies and each transaction hands out working copies, so `Clone` must
/// produce a fully independent value.
pub trait MapEntity: Clone + Send + Sync + 'static {
    /// Identity key type.
    type Key: MapKey;

    /// Field set of this entity kind.
    type Field: SearchableField;

    /// The entity's identity key. Never changes after creation.
    fn id(&self) -> &Self::Key;

    /// Resolves a searchable field to this entity's current value.
    fn field_value(&self, field: Self::Field) -> FieldValue<'_>;
}

/// The value of a searchable field on one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    /// The field has no value (unset optional attribute).
    Absent,
    /// A string value.
    Str(Cow<'a, str>),
    /// An integer value (timestamps, counters).
    Int(i64),
    /// A boolean flag.
    Bool(bool),
    /// A multi-valued string field (scope ids, uris, role ids).
    Many(Vec<Cow<'a, str>>),
}

impl<'a> FieldValue<'a> {
    /// Borrows a string value.
    #[must_use]
    pub fn str(value: &'a str) -> Self {
        Self::Str(Cow::Borrowed(value))
    }

    /// Borrows an optional string value, mapping `None` to `Absent`.
    #[must_use]
    pub fn opt_str(value: Option<&'a str>) -> Self {
        value.map_or(Self::Absent, Self::str)
    }

    /// Borrows every string of a collection.
    #[must_use]
    pub fn many<I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        Self::Many(values.into_iter().map(|s| Cow::Borrowed(s.as_str())).collect())
    }

    /// Returns true unless the value is `Absent` or an empty collection.
    #[must_use]
    pub fn is_present(&self) -> bool {
        match self {
            Self::Absent => false,
            Self::Many(values) => !values.is_empty(),
            _ => true,
        }
    }
}

impl From<String> for FieldValue<'_> {
    fn from(value: String) -> Self {
        Self::Str(Cow::Owned(value))
    }
}

impl From<i64> for FieldValue<'_> {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for FieldValue<'_> {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
