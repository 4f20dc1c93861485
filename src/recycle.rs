//! Recycling resolver: decides when an existing entry may be reused.
//!
//! Reconciling a namespace that survives from a previous generation should not
//! mint new identities for names it still defines, because external state may
//! hold on to the old ones. The [`Recycler`] looks names up in an ordered list
//! of donor namespaces and reports the first donor that still owns an entry of
//! that name.

use std::collections::BTreeSet;

use crate::entry::EntryId;
use crate::namespace::NamespaceId;
use crate::registry::Registry;

/// An entry found in a donor namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recycled {
    pub entry: EntryId,
    pub donor: NamespaceId,
}

/// Ordered donor list plus the lineage set of the namespace being reconciled.
///
/// Lineage is the target itself and every namespace that was merged into it
/// during identity consolidation. Entries recycled from a lineage donor have
/// their ownership transferred; entries from any other donor are only imported.
#[derive(Debug, Clone, Default)]
pub struct Recycler {
    donors: Vec<NamespaceId>,
    lineage: BTreeSet<NamespaceId>,
}

impl Recycler {
    /// Create a resolver over `donors`, searched in the given order.
    pub fn new(donors: Vec<NamespaceId>) -> Self {
        let mut seen = BTreeSet::new();
        let donors = donors.into_iter().filter(|d| seen.insert(*d)).collect();
        Self {
            donors,
            lineage: BTreeSet::new(),
        }
    }

    /// Record namespaces belonging to the target's own lineage.
    pub fn with_lineage(mut self, lineage: impl IntoIterator<Item = NamespaceId>) -> Self {
        self.lineage.extend(lineage);
        self
    }

    pub fn donors(&self) -> &[NamespaceId] {
        &self.donors
    }

    /// Whether `ns` is the target or one of its prior generations.
    pub fn is_lineage(&self, ns: NamespaceId) -> bool {
        self.lineage.contains(&ns)
    }

    /// First donor holding a present entry of `name` that it also owns.
    pub fn find(&self, registry: &Registry, name: &str) -> Option<Recycled> {
        self.donors.iter().find_map(|donor| {
            let entry = registry.get(*donor)?.present(name)?;
            (registry.home_of(entry) == Some(*donor)).then_some(Recycled {
                entry,
                donor: *donor,
            })
        })
    }

    /// Whether `entry` belongs to a generation being phased out: orphaned, or
    /// still homed in one of the donors.
    pub fn is_recycled(&self, registry: &Registry, entry: EntryId) -> bool {
        match registry.entry(entry) {
            None => false,
            Some(e) => match e.home {
                None => true,
                Some(home) => self.donors.contains(&home),
            },
        }
    }
}
