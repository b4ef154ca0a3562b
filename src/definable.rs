//! A value that is either defined or unset, with layered resolution.
//!
//! Every optional field of a [`Destination`](crate::destination::Destination)
//! role is a `Definable<T>`. Merging a derived role onto a base role is a
//! pure per-field function: a defined field in the derived role wins, an
//! unset field falls back to the base, and a field unset in both layers
//! stays unset until the consumer applies a hard default at the point of
//! use. Stored configuration is never mutated by resolution.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wrapper for a configuration value that may be unset.
///
/// Serializes transparently as an optional value, so a key simply absent
/// from a TOML table deserializes as `Definable::undefined()`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Definable<T>(Option<T>);

impl<T> Definable<T> {
    /// An unset value.
    pub const fn undefined() -> Self {
        Self(None)
    }

    /// A defined value.
    pub const fn defined(value: T) -> Self {
        Self(Some(value))
    }

    pub fn is_defined(&self) -> bool {
        self.0.is_some()
    }

    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub fn into_option(self) -> Option<T> {
        self.0
    }

    /// Layered merge: `self` (derived) wins over `base` when defined.
    #[must_use]
    pub fn or(self, base: Self) -> Self {
        match self.0 {
            Some(v) => Self(Some(v)),
            None => base,
        }
    }

    /// Final resolution at the point of use: the defined value, or `default`.
    pub fn resolve(self, default: T) -> T {
        self.0.unwrap_or(default)
    }
}

impl<T: Clone> Definable<T> {
    /// Non-consuming variant of [`Definable::or`], used when merging whole
    /// role structs field by field.
    #[must_use]
    pub fn or_ref(&self, base: &Self) -> Self {
        match &self.0 {
            Some(v) => Self(Some(v.clone())),
            None => base.clone(),
        }
    }
}

impl<T> Default for Definable<T> {
    fn default() -> Self {
        Self::undefined()
    }
}

impl<T> From<T> for Definable<T> {
    fn from(value: T) -> Self {
        Self::defined(value)
    }
}

impl<T> From<Option<T>> for Definable<T> {
    fn from(value: Option<T>) -> Self {
        Self(value)
    }
}

impl<T: fmt::Display> fmt::Display for Definable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(v) => v.fmt(f),
            None => f.write_str("[undefined]"),
        }
    }
}
