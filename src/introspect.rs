//! Introspection: read-only, deterministic views of a namespace.
//!
//! Every list in a [`NamespaceSnapshot`] is sorted lexicographically so that
//! snapshots compare equal across runs and serialize stably.

use serde::Serialize;

use crate::error::NsResult;
use crate::namespace::{NamespaceId, Visibility};
use crate::registry::Registry;

/// An inherited name together with the primary name of its origin.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct InheritedName {
    pub name: String,
    pub from: String,
}

/// Sorted view of one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceSnapshot {
    pub name: String,
    pub aliases: Vec<String>,
    pub documentation: Option<String>,
    pub internal: Vec<String>,
    pub external: Vec<String>,
    pub inherited: Vec<InheritedName>,
    /// Present names pinned as shadowing and not exported.
    pub shadowed: Vec<String>,
    /// Every shadowing pin, exported or not.
    pub shadowing: Vec<String>,
    pub uses: Vec<String>,
    pub used_by: Vec<String>,
}

impl NamespaceSnapshot {
    /// Number of names accessible in the namespace.
    pub fn accessible_count(&self) -> usize {
        self.internal.len() + self.external.len() + self.inherited.len() + self.shadowed.len()
    }
}

/// Visibility category for [`list_by_category`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Internal,
    External,
    Inherited,
    Shadowed,
}

impl Category {
    fn of(visibility: Visibility) -> Self {
        match visibility {
            Visibility::Internal => Category::Internal,
            Visibility::External => Category::External,
            Visibility::Inherited(_) => Category::Inherited,
            Visibility::Shadowed => Category::Shadowed,
        }
    }
}

/// Snapshot a namespace.
pub fn snapshot(registry: &Registry, id: NamespaceId) -> NsResult<NamespaceSnapshot> {
    let ns = registry.namespace(id)?;

    let mut internal = Vec::new();
    let mut external = Vec::new();
    let mut shadowed = Vec::new();
    for name in ns.present_entries().keys() {
        match ns.visibility(name) {
            Some(Visibility::External) => external.push(name.clone()),
            Some(Visibility::Shadowed) => shadowed.push(name.clone()),
            Some(_) => internal.push(name.clone()),
            None => {}
        }
    }

    let mut inherited: Vec<InheritedName> = ns
        .inherited()
        .iter()
        .map(|(name, origin)| InheritedName {
            name: name.clone(),
            from: registry.display_name(*origin),
        })
        .collect();
    inherited.sort();

    Ok(NamespaceSnapshot {
        name: ns.name().to_string(),
        aliases: ns.aliases().iter().cloned().collect(),
        documentation: ns.documentation().map(str::to_string),
        internal,
        external,
        inherited,
        shadowed,
        shadowing: ns.shadowing_names().map(str::to_string).collect(),
        uses: sorted_names(registry, ns.uses().iter().copied()),
        used_by: sorted_names(registry, ns.used_by().iter().copied()),
    })
}

fn sorted_names(registry: &Registry, ids: impl Iterator<Item = NamespaceId>) -> Vec<String> {
    let mut names: Vec<String> = ids.map(|id| registry.display_name(id)).collect();
    names.sort();
    names
}

/// Sorted names of one visibility category.
pub fn list_by_category(registry: &Registry, id: NamespaceId, category: Category) -> NsResult<Vec<String>> {
    let ns = registry.namespace(id)?;
    let mut names: Vec<String> = ns
        .present_entries()
        .keys()
        .chain(ns.inherited().keys())
        .filter(|n| ns.visibility(n).map(Category::of) == Some(category))
        .cloned()
        .collect();
    names.sort();
    Ok(names)
}
