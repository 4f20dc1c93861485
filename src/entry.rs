//! Core entry types for the nsforge engine.
//!
//! Entries are the atomic identity-bearing units stored in namespaces. Every
//! entry is identified by an [`EntryId`] that never changes for its lifetime,
//! even when the entry moves to another home namespace. The
//! [`EntryAllocator`] hands out identities.

use std::collections::BTreeSet;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

use crate::error::{EntryError, NsResult};
use crate::namespace::NamespaceId;

/// Unique, niche-optimized identity token for an entry.
///
/// Two entries with the same name in different namespaces, or in different
/// generations of the same namespace, always carry different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct EntryId(NonZeroU64);

impl EntryId {
    /// Create an `EntryId` from a raw `u64`.
    ///
    /// Returns `None` if `raw` is zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(EntryId)
    }

    /// Get the underlying `u64` value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entry:{}", self.0)
    }
}

/// A binding attached to an entry, cleared by `remove-binding` and
/// `remove-setf-binding` clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BindingKind {
    /// The entry's ordinary (value or function) binding.
    Value,
    /// The entry's setter binding.
    Setf,
}

impl std::fmt::Display for BindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingKind::Value => write!(f, "value"),
            BindingKind::Setf => write!(f, "setf"),
        }
    }
}

/// An identity-bearing named unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Stable identity.
    pub id: EntryId,
    /// Name the entry was created under.
    pub name: String,
    /// Namespace the entry is currently interned in. `None` once orphaned.
    pub home: Option<NamespaceId>,
    /// Bindings currently attached.
    pub bindings: BTreeSet<BindingKind>,
}

impl Entry {
    /// Create an entry homed in `home` with no bindings.
    pub fn new(id: EntryId, name: impl Into<String>, home: NamespaceId) -> Self {
        Self {
            id,
            name: name.into(),
            home: Some(home),
            bindings: BTreeSet::new(),
        }
    }

    /// Whether the entry has lost its home namespace.
    pub fn is_orphaned(&self) -> bool {
        self.home.is_none()
    }
}

/// Entry identity allocator owned by a [`Registry`](crate::registry::Registry).
///
/// Ids increase monotonically and are never reused. Exhaustion is an error,
/// not a wraparound.
#[derive(Debug, Clone)]
pub struct EntryAllocator {
    next: Option<u64>,
}

impl EntryAllocator {
    /// Create a new allocator that starts from id 1.
    pub fn new() -> Self {
        Self::starting_from(1)
    }

    /// Create an allocator that resumes from a given id (0 is treated as 1).
    pub fn starting_from(start: u64) -> Self {
        Self {
            next: Some(start.max(1)),
        }
    }

    /// Allocate the next entry id.
    pub fn next_id(&mut self) -> NsResult<EntryId> {
        let raw = self.next.ok_or(EntryError::AllocatorExhausted)?;
        self.next = raw.checked_add(1);
        EntryId::new(raw).ok_or_else(|| EntryError::AllocatorExhausted.into())
    }
}

impl Default for EntryAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_id_niche_optimization() {
        assert_eq!(
            std::mem::size_of::<Option<EntryId>>(),
            std::mem::size_of::<EntryId>()
        );
    }

    #[test]
    fn entry_id_zero_is_none() {
        assert!(EntryId::new(0).is_none());
        assert_eq!(EntryId::new(42).unwrap().get(), 42);
    }

    #[test]
    fn allocator_produces_sequential_ids() {
        let mut alloc = EntryAllocator::new();
        assert_eq!(alloc.next_id().unwrap().get(), 1);
        assert_eq!(alloc.next_id().unwrap().get(), 2);
    }

    #[test]
    fn allocator_starting_from_clamps_zero() {
        let mut alloc = EntryAllocator::starting_from(0);
        assert_eq!(alloc.next_id().unwrap().get(), 1);
        let mut alloc = EntryAllocator::starting_from(100);
        assert_eq!(alloc.next_id().unwrap().get(), 100);
    }

    #[test]
    fn allocator_exhaustion_is_an_error() {
        let mut alloc = EntryAllocator::starting_from(u64::MAX);
        assert_eq!(alloc.next_id().unwrap().get(), u64::MAX);
        assert!(matches!(
            alloc.next_id(),
            Err(crate::error::NsError::Entry(EntryError::AllocatorExhausted))
        ));
    }

    #[test]
    fn new_entry_is_homed_and_unbound() {
        let home = NamespaceId::new(3).unwrap();
        let entry = Entry::new(EntryId::new(1).unwrap(), "find", home);
        assert_eq!(entry.home, Some(home));
        assert!(!entry.is_orphaned());
        assert!(entry.bindings.is_empty());
    }

    #[test]
    fn entry_id_display() {
        assert_eq!(EntryId::new(7).unwrap().to_string(), "entry:7");
        assert_eq!(BindingKind::Setf.to_string(), "setf");
    }
}
