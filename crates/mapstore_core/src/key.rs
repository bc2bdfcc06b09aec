//! Keys and key conversion.
//!
//! The engine works with an opaque key type `K`; callers work with string
//! identifiers. A [`KeyConverter`] translates between the two and mints new
//! keys. Each [`crate::MapStorage`] owns exactly one converter.

use crate::error::{CoreError, CoreResult};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Capabilities the engine needs from a key type.
///
/// Implemented automatically for every type with the required bounds.
pub trait MapKey: Clone + Eq + Ord + Hash + Debug + Send + Sync + 'static {}

impl<T> MapKey for T where T: Clone + Eq + Ord + Hash + Debug + Send + Sync + 'static {}

/// Converts between keys and external string identifiers.
pub trait KeyConverter<K>: Send + Sync {
    /// Parses an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidKey`] if `id` is not a valid key.
    fn from_string(&self, id: &str) -> CoreResult<K>;

    /// Parses an identifier, returning `None` on malformed input.
    ///
    /// Lookups use this so that a bad id behaves as "not found".
    fn from_string_safe(&self, id: &str) -> Option<K> {
        self.from_string(id).ok()
    }

    /// Renders a key as an identifier.
    fn key_to_string(&self, key: &K) -> String;

    /// Produces a fresh key that collides with no other key from this
    /// converter.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::KeysExhausted`] if the converter has no fresh
    /// key left.
    fn yield_new_unique_key(&self) -> CoreResult<K>;
}

/// Random v4 UUID keys.
///
/// Only the canonical lowercase hyphenated form is accepted, so
/// `key_to_string(from_string(s)) == s` for every accepted `s`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidKeyConverter;

impl KeyConverter<Uuid> for UuidKeyConverter {
    fn from_string(&self, id: &str) -> CoreResult<Uuid> {
        let uuid = Uuid::try_parse(id).map_err(|e| CoreError::invalid_key(id, e.to_string()))?;
        if uuid.hyphenated().to_string() != id {
            return Err(CoreError::invalid_key(
                id,
                "expected canonical lowercase hyphenated form",
            ));
        }
        Ok(uuid)
    }

    fn key_to_string(&self, key: &Uuid) -> String {
        key.hyphenated().to_string()
    }

    fn yield_new_unique_key(&self) -> CoreResult<Uuid> {
        Ok(Uuid::new_v4())
    }
}

/// Plain string keys.
///
/// Any non-empty identifier is a valid key. New keys are random UUID
/// strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringKeyConverter;

impl KeyConverter<String> for StringKeyConverter {
    fn from_string(&self, id: &str) -> CoreResult<String> {
        if id.is_empty() {
            return Err(CoreError::invalid_key(id, "empty identifier"));
        }
        Ok(id.to_string())
    }

    fn key_to_string(&self, key: &String) -> String {
        key.clone()
    }

    fn yield_new_unique_key(&self) -> CoreResult<String> {
        Ok(Uuid::new_v4().to_string())
    }
}

/// Monotonic integer keys.
///
/// Accepts canonical decimal ids only (no sign, no leading zeros). Parsing
/// an id with [`KeyConverter::from_string`] at or above the next sequence
/// value bumps the sequence past it, so explicitly supplied ids never
/// collide with later generated ones. Lookups through
/// [`KeyConverter::from_string_safe`] leave the sequence alone.
///
/// `u64::MAX` is never generated; once the sequence reaches it, generation
/// fails instead of wrapping.
#[derive(Debug)]
pub struct SequenceKeyConverter {
    next: AtomicU64,
}

impl SequenceKeyConverter {
    /// Creates a converter whose first generated key is `start`.
    #[must_use]
    pub const fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }
}

impl Default for SequenceKeyConverter {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl KeyConverter<u64> for SequenceKeyConverter {
    fn from_string(&self, id: &str) -> CoreResult<u64> {
        let value = parse_canonical(id)?;
        if let Some(after) = value.checked_add(1) {
            self.next.fetch_max(after, Ordering::SeqCst);
        }
        Ok(value)
    }

    fn from_string_safe(&self, id: &str) -> Option<u64> {
        parse_canonical(id).ok()
    }

    fn key_to_string(&self, key: &u64) -> String {
        key.to_string()
    }

    fn yield_new_unique_key(&self) -> CoreResult<u64> {
        self.next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map_err(|_| CoreError::keys_exhausted("integer key sequence reached u64::MAX"))
    }
}

fn parse_canonical(id: &str) -> CoreResult<u64> {
    let value: u64 = id
        .parse()
        .map_err(|e: std::num::ParseIntError| CoreError::invalid_key(id, e.to_string()))?;
    if value.to_string() != id {
        return Err(CoreError::invalid_key(id, "expected canonical decimal form"));
    }
    Ok(value)
}
