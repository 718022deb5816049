//! Value Interner
//!
//! Deduplicates repeated attribute values process-wide. Millions of objects
//! share a handful of distinct values (object classes, data source names,
//! domain suffixes), so every string and byte value goes through here and
//! equal values end up sharing one allocation.
//!
//! The tables are `DashMap`s, which shard their locks: two threads interning
//! unrelated values almost never contend.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Serialize, Serializer};

static GLOBAL: Lazy<Interner> = Lazy::new(Interner::new);

/// The process-wide interner backing [`AttributeValue`] construction.
pub fn global() -> &'static Interner {
    &GLOBAL
}

/// Sharded string and byte-string interner.
#[derive(Debug, Default)]
pub struct Interner {
    strings: DashMap<Arc<str>, ()>,
    bytes: DashMap<Arc<[u8]>, ()>,
}

impl Interner {
    /// Create an empty interner with the default shard count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty interner with an explicit shard count (power of two).
    pub fn with_shards(shards: usize) -> Self {
        Self {
            strings: DashMap::with_shard_amount(shards),
            bytes: DashMap::with_shard_amount(shards),
        }
    }

    /// Intern a string, returning the shared handle for it.
    ///
    /// Equal inputs always return pointer-identical handles.
    pub fn intern_str(&self, value: &str) -> Arc<str> {
        if let Some(existing) = self.strings.get(value) {
            return existing.key().clone();
        }
        // Entry keeps the already-stored key if another thread won the race.
        self.strings
            .entry(Arc::from(value))
            .or_insert(())
            .key()
            .clone()
    }

    /// Intern a byte string, returning the shared handle for it.
    pub fn intern_bytes(&self, value: &[u8]) -> Arc<[u8]> {
        if let Some(existing) = self.bytes.get(value) {
            return existing.key().clone();
        }
        self.bytes
            .entry(Arc::from(value))
            .or_insert(())
            .key()
            .clone()
    }

    /// Number of distinct values currently held.
    pub fn len(&self) -> usize {
        self.strings.len() + self.bytes.len()
    }

    /// Whether the interner holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every value that nothing outside the interner references.
    ///
    /// Returns the number of values removed.
    pub fn purge_unused(&self) -> usize {
        let before = self.len();
        self.strings.retain(|k, _| Arc::strong_count(k) > 1);
        self.bytes.retain(|k, _| Arc::strong_count(k) > 1);
        before - self.len()
    }

    /// Release spare table capacity.
    pub fn shrink(&self) {
        self.strings.shrink_to_fit();
        self.bytes.shrink_to_fit();
    }
}

// ============================================================================
// Attribute Values
// ============================================================================

/// An immutable attribute value.
///
/// String and byte values are interned: two equal values built through the
/// same interner share a handle, so equality usually resolves on the pointer.
/// Scalars are stored inline and compare by value.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    /// UTF-8 string
    String(Arc<str>),
    /// Raw bytes (GUIDs, binary SIDs, security descriptors)
    Bytes(Arc<[u8]>),
    /// Signed integer
    Int(i64),
    /// Boolean flag
    Bool(bool),
}

impl AttributeValue {
    /// Build an interned string value using the global interner.
    pub fn string(value: &str) -> Self {
        Self::String(global().intern_str(value))
    }

    /// Build an interned byte value using the global interner.
    pub fn bytes(value: &[u8]) -> Self {
        Self::Bytes(global().intern_bytes(value))
    }

    /// Build an integer value.
    pub fn int(value: i64) -> Self {
        Self::Int(value)
    }

    /// Build a boolean value.
    pub fn bool(value: bool) -> Self {
        Self::Bool(value)
    }

    /// String view of the value, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(&**s),
            _ => None,
        }
    }

    /// Whether both values share the same interned handle.
    ///
    /// Scalars have no handle and are identical when they are equal.
    pub fn same_handle(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::String(a), Self::String(b)) => Arc::ptr_eq(a, b),
            (Self::Bytes(a), Self::Bytes(b)) => Arc::ptr_eq(a, b),
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::String(a), Self::String(b)) => Arc::ptr_eq(a, b) || a == b,
            (Self::Bytes(a), Self::Bytes(b)) => Arc::ptr_eq(a, b) || a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AttributeValue {}

impl AttributeValue {
    fn rank(&self) -> u8 {
        match self {
            Self::String(_) => 0,
            Self::Bytes(_) => 1,
            Self::Int(_) => 2,
            Self::Bool(_) => 3,
        }
    }
}

impl Ord for AttributeValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self, other) {
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for AttributeValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::hash::Hash for AttributeValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::String(s) => s.hash(state),
            Self::Bytes(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Bool(b) => b.hash(state),
        }
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Bytes(b) => {
                for byte in b.iter() {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Self::Int(i) => write!(f, "{}", i),
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::String(s) => serializer.serialize_str(s),
            Self::Bytes(_) => serializer.serialize_str(&self.to_string()),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::string(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
