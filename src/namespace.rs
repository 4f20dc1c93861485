//! Namespace data model.
//!
//! A [`Namespace`] is a named, aliasable container of entries. Each name that
//! is accessible in a namespace is reachable through exactly one channel:
//! it is either *present* (bound locally, with an Internal, External or
//! Shadowed visibility) or *inherited* from exactly one member of the `uses`
//! list. Cross-namespace invariants (the `uses`/`used-by` inverse, inherited
//! records pointing at live exports) are maintained by
//! [`Registry`](crate::registry::Registry); this type only guards its own
//! local invariants.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

use crate::entry::EntryId;

/// Unique, niche-optimized identifier for a namespace instance.
///
/// Ids are never reused within a registry, so a stale id held after
/// destruction can be detected rather than silently aliasing a new namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NamespaceId(NonZeroU64);

impl NamespaceId {
    /// Create a `NamespaceId` from a raw `u64`. Returns `None` if `raw` is zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(NamespaceId)
    }

    /// Get the underlying `u64` value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ns:{}", self.0)
    }
}

/// How a name is visible in a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    /// Present locally, not exported.
    Internal,
    /// Present locally and exported to dependents.
    External,
    /// Not present; resolved through a `uses` dependency.
    Inherited(NamespaceId),
    /// Present locally and pinned, overriding anything it would otherwise inherit.
    Shadowed,
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Visibility::Internal => write!(f, "internal"),
            Visibility::External => write!(f, "external"),
            Visibility::Inherited(origin) => write!(f, "inherited({origin})"),
            Visibility::Shadowed => write!(f, "shadowed"),
        }
    }
}

/// A named container of uniquely-named entries.
#[derive(Debug, Clone)]
pub struct Namespace {
    id: NamespaceId,
    name: String,
    aliases: BTreeSet<String>,
    documentation: Option<String>,
    /// Entries bound locally: name → identity.
    present: BTreeMap<String, EntryId>,
    /// Subset of `present` that is exported.
    external: BTreeSet<String>,
    /// Subset of `present` that is pinned as shadowing.
    shadowing: BTreeSet<String>,
    /// Names resolved through a dependency: name → origin. Disjoint from `present`.
    inherited: BTreeMap<String, NamespaceId>,
    /// Ordered dependency list.
    uses: Vec<NamespaceId>,
    /// Inverse of `uses`.
    used_by: BTreeSet<NamespaceId>,
}

impl Namespace {
    /// Create an empty namespace with no aliases.
    pub fn new(id: NamespaceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            aliases: BTreeSet::new(),
            documentation: None,
            present: BTreeMap::new(),
            external: BTreeSet::new(),
            shadowing: BTreeSet::new(),
            inherited: BTreeMap::new(),
            uses: Vec::new(),
            used_by: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> NamespaceId {
        self.id
    }

    /// Primary name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &BTreeSet<String> {
        &self.aliases
    }

    /// Primary name followed by every alias.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    pub fn documentation(&self) -> Option<&str> {
        self.documentation.as_deref()
    }

    pub fn set_documentation(&mut self, documentation: Option<String>) {
        self.documentation = documentation;
    }

    /// Identity of the entry bound locally under `name`, if any.
    pub fn present(&self, name: &str) -> Option<EntryId> {
        self.present.get(name).copied()
    }

    /// All locally bound entries, sorted by name.
    pub fn present_entries(&self) -> &BTreeMap<String, EntryId> {
        &self.present
    }

    /// Origin namespace a name is inherited from, if it is inherited.
    pub fn inherited_from(&self, name: &str) -> Option<NamespaceId> {
        self.inherited.get(name).copied()
    }

    /// All inherited names with their origins.
    pub fn inherited(&self) -> &BTreeMap<String, NamespaceId> {
        &self.inherited
    }

    pub fn is_external(&self, name: &str) -> bool {
        self.external.contains(name)
    }

    pub fn is_shadowing(&self, name: &str) -> bool {
        self.shadowing.contains(name)
    }

    /// Exported names, sorted.
    pub fn external_names(&self) -> impl Iterator<Item = &str> {
        self.external.iter().map(String::as_str)
    }

    /// Shadowing pin set, sorted.
    pub fn shadowing_names(&self) -> impl Iterator<Item = &str> {
        self.shadowing.iter().map(String::as_str)
    }

    /// Visibility of `name`, or `None` if it is not accessible at all.
    ///
    /// A name that is both exported and pinned reports `External`.
    pub fn visibility(&self, name: &str) -> Option<Visibility> {
        if let Some(origin) = self.inherited.get(name) {
            return Some(Visibility::Inherited(*origin));
        }
        if !self.present.contains_key(name) {
            return None;
        }
        Some(if self.external.contains(name) {
            Visibility::External
        } else if self.shadowing.contains(name) {
            Visibility::Shadowed
        } else {
            Visibility::Internal
        })
    }

    pub fn uses(&self) -> &[NamespaceId] {
        &self.uses
    }

    pub fn used_by(&self) -> &BTreeSet<NamespaceId> {
        &self.used_by
    }

    /// Whether `self` lists `other` among its dependencies.
    pub fn is_using(&self, other: NamespaceId) -> bool {
        self.uses.contains(&other)
    }

    // -----------------------------------------------------------------------
    // Local mutation (cross-namespace consistency is the registry's job)
    // -----------------------------------------------------------------------

    pub(crate) fn set_names(&mut self, name: String, aliases: BTreeSet<String>) {
        self.name = name;
        self.aliases = aliases;
    }

    /// Bind `entry` locally, dropping any inherited record for the name.
    ///
    /// Returns the previously present entry, if a different one was bound.
    pub(crate) fn put_present(&mut self, name: &str, entry: EntryId) -> Option<EntryId> {
        self.inherited.remove(name);
        match self.present.insert(name.to_string(), entry) {
            Some(previous) if previous != entry => Some(previous),
            _ => None,
        }
    }

    /// Remove the local binding of `name`, with its export and pin flags.
    pub(crate) fn take_present(&mut self, name: &str) -> Option<EntryId> {
        self.external.remove(name);
        self.shadowing.remove(name);
        self.present.remove(name)
    }

    /// Record `name` as inherited from `origin`. The name must not be present.
    pub(crate) fn set_inherited(&mut self, name: &str, origin: NamespaceId) {
        debug_assert!(!self.present.contains_key(name), "inherited name {name} is present");
        self.inherited.insert(name.to_string(), origin);
    }

    pub(crate) fn clear_inherited(&mut self, name: &str) -> Option<NamespaceId> {
        self.inherited.remove(name)
    }

    /// Drop every inherited record whose origin is `origin`, returning the names.
    pub(crate) fn clear_inherited_from(&mut self, origin: NamespaceId) -> Vec<String> {
        let names: Vec<String> = self
            .inherited
            .iter()
            .filter(|(_, o)| **o == origin)
            .map(|(n, _)| n.clone())
            .collect();
        for name in &names {
            self.inherited.remove(name);
        }
        names
    }

    /// Mark a present name as exported. Returns `false` if the name is not present.
    pub(crate) fn set_external(&mut self, name: &str) -> bool {
        if !self.present.contains_key(name) {
            return false;
        }
        self.external.insert(name.to_string());
        true
    }

    pub(crate) fn clear_external(&mut self, name: &str) -> bool {
        self.external.remove(name)
    }

    /// Pin a present name as shadowing. Returns `false` if the name is not present.
    pub(crate) fn set_shadowing(&mut self, name: &str) -> bool {
        if !self.present.contains_key(name) {
            return false;
        }
        self.shadowing.insert(name.to_string());
        true
    }

    pub(crate) fn push_use(&mut self, other: NamespaceId) -> bool {
        if self.uses.contains(&other) {
            return false;
        }
        self.uses.push(other);
        true
    }

    pub(crate) fn remove_use(&mut self, other: NamespaceId) -> bool {
        let before = self.uses.len();
        self.uses.retain(|u| *u != other);
        before != self.uses.len()
    }

    pub(crate) fn add_used_by(&mut self, other: NamespaceId) {
        self.used_by.insert(other);
    }

    pub(crate) fn remove_used_by(&mut self, other: NamespaceId) {
        self.used_by.remove(&other);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns_id(raw: u64) -> NamespaceId {
        NamespaceId::new(raw).unwrap()
    }

    fn entry(raw: u64) -> EntryId {
        EntryId::new(raw).unwrap()
    }

    #[test]
    fn names_lists_primary_first() {
        let mut ns = Namespace::new(ns_id(1), "pkg/alpha");
        ns.set_names("pkg/alpha".into(), ["b".to_string(), "a".to_string()].into());
        let names: Vec<&str> = ns.names().collect();
        assert_eq!(names, vec!["pkg/alpha", "a", "b"]);
    }

    #[test]
    fn visibility_channels_are_exclusive() {
        let mut ns = Namespace::new(ns_id(1), "n");
        ns.set_inherited("x", ns_id(2));
        assert_eq!(ns.visibility("x"), Some(Visibility::Inherited(ns_id(2))));

        ns.put_present("x", entry(5));
        assert_eq!(ns.visibility("x"), Some(Visibility::Internal));
        assert_eq!(ns.inherited_from("x"), None);
    }

    #[test]
    fn external_wins_over_shadowed_in_visibility() {
        let mut ns = Namespace::new(ns_id(1), "n");
        ns.put_present("x", entry(1));
        assert!(ns.set_shadowing("x"));
        assert_eq!(ns.visibility("x"), Some(Visibility::Shadowed));
        assert!(ns.set_external("x"));
        assert_eq!(ns.visibility("x"), Some(Visibility::External));
        assert!(ns.is_shadowing("x"));
    }

    #[test]
    fn flags_require_presence() {
        let mut ns = Namespace::new(ns_id(1), "n");
        assert!(!ns.set_external("ghost"));
        assert!(!ns.set_shadowing("ghost"));
        assert_eq!(ns.visibility("ghost"), None);
    }

    #[test]
    fn take_present_clears_flags() {
        let mut ns = Namespace::new(ns_id(1), "n");
        ns.put_present("x", entry(1));
        ns.set_external("x");
        ns.set_shadowing("x");
        assert_eq!(ns.take_present("x"), Some(entry(1)));
        assert!(!ns.is_external("x"));
        assert!(!ns.is_shadowing("x"));
    }

    #[test]
    fn put_present_reports_displaced_entry() {
        let mut ns = Namespace::new(ns_id(1), "n");
        assert_eq!(ns.put_present("x", entry(1)), None);
        assert_eq!(ns.put_present("x", entry(1)), None);
        assert_eq!(ns.put_present("x", entry(2)), Some(entry(1)));
    }

    #[test]
    fn clear_inherited_from_only_drops_that_origin() {
        let mut ns = Namespace::new(ns_id(1), "n");
        ns.set_inherited("a", ns_id(2));
        ns.set_inherited("b", ns_id(3));
        ns.set_inherited("c", ns_id(2));
        assert_eq!(ns.clear_inherited_from(ns_id(2)), vec!["a", "c"]);
        assert_eq!(ns.inherited_from("b"), Some(ns_id(3)));
    }

    #[test]
    fn uses_are_ordered_and_deduplicated() {
        let mut ns = Namespace::new(ns_id(1), "n");
        assert!(ns.push_use(ns_id(3)));
        assert!(ns.push_use(ns_id(2)));
        assert!(!ns.push_use(ns_id(3)));
        assert_eq!(ns.uses(), &[ns_id(3), ns_id(2)]);
        assert!(ns.remove_use(ns_id(3)));
        assert!(!ns.remove_use(ns_id(3)));
    }
}
