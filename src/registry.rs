//! Namespace registry: the owned name → namespace table.
//!
//! The [`Registry`] maps every primary name and alias to exactly one live
//! [`Namespace`], owns the entry arena, and is the only place names are
//! resolved. It also maintains the cross-namespace invariants: the
//! `uses`/`used-by` inverse and inherited records that point at live exports.
//!
//! The registry is an ordinary value, so tests can build as many independent
//! registries as they like. Hosts that share one across threads wrap it in a
//! [`SharedRegistry`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::entry::{BindingKind, Entry, EntryAllocator, EntryId};
use crate::error::{EntryError, NsResult, RegistryError};
use crate::namespace::{Namespace, NamespaceId};

/// Owned namespace registry.
pub struct Registry {
    /// Arena of every namespace not yet destroyed, attached or not.
    namespaces: HashMap<NamespaceId, Namespace>,
    /// Primary names and aliases of attached namespaces.
    names: HashMap<String, NamespaceId>,
    /// Entry arena (source of truth for names, homes and bindings).
    entries: HashMap<EntryId, Entry>,
    next_namespace: u64,
    allocator: EntryAllocator,
}

impl Registry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::with_allocator(EntryAllocator::new())
    }

    /// Create an empty registry drawing entry ids from `allocator`.
    pub fn with_allocator(allocator: EntryAllocator) -> Self {
        Self {
            namespaces: HashMap::new(),
            names: HashMap::new(),
            entries: HashMap::new(),
            next_namespace: 1,
            allocator,
        }
    }

    // -----------------------------------------------------------------------
    // Names
    // -----------------------------------------------------------------------

    /// Resolve a primary name or alias to a namespace.
    pub fn resolve(&self, name: &str) -> Option<NamespaceId> {
        self.names.get(name).copied()
    }

    /// Look up a namespace by id. Detached namespaces are still reachable here
    /// until destroyed.
    pub fn get(&self, id: NamespaceId) -> Option<&Namespace> {
        self.namespaces.get(&id)
    }

    /// Like [`get`](Self::get) but errors on a dead id.
    pub fn namespace(&self, id: NamespaceId) -> NsResult<&Namespace> {
        self.namespaces
            .get(&id)
            .ok_or_else(|| RegistryError::DeadNamespace { namespace_id: id.get() }.into())
    }

    fn namespace_mut(&mut self, id: NamespaceId) -> NsResult<&mut Namespace> {
        self.namespaces
            .get_mut(&id)
            .ok_or_else(|| RegistryError::DeadNamespace { namespace_id: id.get() }.into())
    }

    /// Primary name of a namespace, or its id when it is gone.
    pub fn display_name(&self, id: NamespaceId) -> String {
        self.get(id)
            .map(|ns| ns.name().to_string())
            .unwrap_or_else(|| id.to_string())
    }

    /// Whether the namespace is attached (resolvable under at least one name).
    pub fn is_attached(&self, id: NamespaceId) -> bool {
        self.get(id)
            .is_some_and(|ns| self.names.get(ns.name()) == Some(&id))
    }

    fn check_claim(&self, name: &str, claimant: Option<NamespaceId>) -> NsResult<()> {
        match self.names.get(name) {
            Some(holder) if Some(*holder) != claimant => Err(RegistryError::NameConflict {
                name: name.to_string(),
                holder: self.display_name(*holder),
            }
            .into()),
            _ => Ok(()),
        }
    }

    /// Create an empty namespace. Errors if any live namespace claims `name`.
    pub fn create(&mut self, name: &str) -> NsResult<NamespaceId> {
        self.check_claim(name, None)?;
        let id = NamespaceId::new(self.next_namespace).ok_or(RegistryError::NamespaceIdsExhausted)?;
        self.next_namespace = self
            .next_namespace
            .checked_add(1)
            .ok_or(RegistryError::NamespaceIdsExhausted)?;
        self.namespaces.insert(id, Namespace::new(id, name));
        self.names.insert(name.to_string(), id);
        tracing::debug!(namespace = name, %id, "created namespace");
        Ok(id)
    }

    /// Atomically replace a namespace's primary name and alias set.
    ///
    /// Either every new name is claimed or none is: conflicts are detected
    /// before any key is touched. An alias equal to the primary name is dropped.
    pub fn rename<I, S>(&mut self, id: NamespaceId, primary: &str, aliases: I) -> NsResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let aliases: std::collections::BTreeSet<String> = aliases
            .into_iter()
            .map(Into::into)
            .filter(|a| a != primary)
            .collect();
        self.namespace(id)?;
        self.check_claim(primary, Some(id))?;
        for alias in &aliases {
            self.check_claim(alias, Some(id))?;
        }

        self.names.retain(|_, holder| *holder != id);
        self.names.insert(primary.to_string(), id);
        for alias in &aliases {
            self.names.insert(alias.clone(), id);
        }
        self.namespace_mut(id)?.set_names(primary.to_string(), aliases);
        Ok(())
    }

    pub fn set_documentation(&mut self, id: NamespaceId, documentation: Option<String>) -> NsResult<()> {
        self.namespace_mut(id)?.set_documentation(documentation);
        Ok(())
    }

    /// Unlink every dependency edge and drop every name, keeping the arena slot.
    ///
    /// A detached namespace no longer resolves but can still be read through
    /// its id, which lets it act as a recycling donor until it is destroyed.
    pub fn detach(&mut self, id: NamespaceId) -> NsResult<()> {
        let (uses, used_by) = {
            let ns = self.namespace(id)?;
            (ns.uses().to_vec(), ns.used_by().iter().copied().collect::<Vec<_>>())
        };
        for dependent in used_by {
            self.remove_use(dependent, id)?;
        }
        for dependency in uses {
            self.remove_use(id, dependency)?;
        }
        self.names.retain(|_, holder| *holder != id);
        tracing::debug!(%id, "detached namespace");
        Ok(())
    }

    /// Destroy a namespace: drain its edges, drop its names, orphan its entries.
    pub fn destroy(&mut self, id: NamespaceId) -> NsResult<()> {
        self.detach(id)?;
        if let Some(ns) = self.namespaces.remove(&id) {
            for entry in ns.present_entries().values() {
                if let Some(e) = self.entries.get_mut(entry) {
                    if e.home == Some(id) {
                        e.home = None;
                    }
                }
            }
            tracing::debug!(namespace = ns.name(), %id, "destroyed namespace");
        }
        Ok(())
    }

    /// Attached namespaces sorted by primary name.
    pub fn namespaces(&self) -> Vec<&Namespace> {
        let mut all: Vec<&Namespace> = self
            .namespaces
            .values()
            .filter(|ns| self.is_attached(ns.id()))
            .collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    /// Number of distinct registered names (primary names plus aliases).
    pub fn name_count(&self) -> usize {
        self.names.len()
    }

    /// Number of attached namespaces.
    pub fn len(&self) -> usize {
        self.namespaces().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    // -----------------------------------------------------------------------
    // Dependency edges
    // -----------------------------------------------------------------------

    /// Make `user` depend on `used`, maintaining the inverse edge.
    pub fn add_use(&mut self, user: NamespaceId, used: NamespaceId) -> NsResult<bool> {
        self.namespace(used)?;
        let added = self.namespace_mut(user)?.push_use(used);
        self.namespace_mut(used)?.add_used_by(user);
        Ok(added)
    }

    /// Drop the `user → used` edge, its inverse, and every name `user`
    /// inherited through it.
    pub fn remove_use(&mut self, user: NamespaceId, used: NamespaceId) -> NsResult<bool> {
        let ns = self.namespace_mut(user)?;
        let removed = ns.remove_use(used);
        ns.clear_inherited_from(used);
        if let Some(other) = self.namespaces.get_mut(&used) {
            other.remove_used_by(user);
        }
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Entries
    // -----------------------------------------------------------------------

    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.entries.get(&id)
    }

    fn entry_mut(&mut self, id: EntryId) -> NsResult<&mut Entry> {
        self.entries
            .get_mut(&id)
            .ok_or_else(|| EntryError::Unknown { entry_id: id.get() }.into())
    }

    /// Home namespace of an entry.
    pub fn home_of(&self, id: EntryId) -> Option<NamespaceId> {
        self.entry(id).and_then(|e| e.home)
    }

    /// Resolve `name` as seen from `ns`: the present entry, or the origin's
    /// entry when the name is inherited.
    pub fn find_entry(&self, ns: NamespaceId, name: &str) -> Option<EntryId> {
        let namespace = self.get(ns)?;
        if let Some(entry) = namespace.present(name) {
            return Some(entry);
        }
        let origin = namespace.inherited_from(name)?;
        self.get(origin)?.present(name)
    }

    /// Mint a fresh entry homed in `ns` and bind it, displacing any previous binding.
    pub fn fresh_entry(&mut self, ns: NamespaceId, name: &str) -> NsResult<EntryId> {
        self.namespace(ns)?;
        let id = self.allocator.next_id()?;
        self.entries.insert(id, Entry::new(id, name, ns));
        self.install(ns, name, id)?;
        tracing::debug!(namespace = %self.display_name(ns), name, entry = %id, "fresh entry");
        Ok(id)
    }

    /// Ensure `name` is present in `ns`, minting an entry only if nothing is bound.
    pub fn intern(&mut self, ns: NamespaceId, name: &str) -> NsResult<EntryId> {
        match self.namespace(ns)?.present(name) {
            Some(existing) => Ok(existing),
            None => self.fresh_entry(ns, name),
        }
    }

    /// Bind `entry` under `name` in `ns`.
    ///
    /// A displaced entry homed in `ns` is orphaned. An orphaned `entry` is
    /// adopted by `ns`. Returns the displaced entry.
    pub fn install(&mut self, ns: NamespaceId, name: &str, entry: EntryId) -> NsResult<Option<EntryId>> {
        if self.entry(entry).is_none() {
            return Err(EntryError::Unknown { entry_id: entry.get() }.into());
        }
        let displaced = self.namespace_mut(ns)?.put_present(name, entry);
        if let Some(old) = displaced {
            self.orphan_if_homed(old, ns)?;
        }
        let e = self.entry_mut(entry)?;
        if e.home.is_none() {
            e.home = Some(ns);
        }
        Ok(displaced)
    }

    /// Bind an existing entry under its own name.
    pub fn import(&mut self, ns: NamespaceId, entry: EntryId) -> NsResult<Option<EntryId>> {
        let name = self.entry_mut(entry)?.name.clone();
        self.install(ns, &name, entry)
    }

    /// Move an entry's home to `ns`, removing it from the namespace it left.
    pub fn rehome(&mut self, entry: EntryId, ns: NamespaceId) -> NsResult<()> {
        self.namespace(ns)?;
        let (name, previous) = {
            let e = self.entry_mut(entry)?;
            (e.name.clone(), e.home.replace(ns))
        };
        let Some(old_home) = previous.filter(|h| *h != ns) else {
            return Ok(());
        };
        if self.get(old_home).and_then(|o| o.present(&name)) == Some(entry) {
            self.withdraw_inherited(old_home, &name);
            if let Some(o) = self.namespaces.get_mut(&old_home) {
                o.take_present(&name);
            }
        }
        Ok(())
    }

    /// Remove `name` from `ns` entirely, whether present or inherited.
    ///
    /// Dependents inheriting the name from `ns` lose it too.
    pub fn unintern(&mut self, ns: NamespaceId, name: &str) -> NsResult<Option<EntryId>> {
        self.withdraw_inherited(ns, name);
        let namespace = self.namespace_mut(ns)?;
        namespace.clear_inherited(name);
        let removed = namespace.take_present(name);
        if let Some(old) = removed {
            self.orphan_if_homed(old, ns)?;
        }
        Ok(removed)
    }

    /// Export a present name. Returns `false` if it is not present.
    pub fn export(&mut self, ns: NamespaceId, name: &str) -> NsResult<bool> {
        Ok(self.namespace_mut(ns)?.set_external(name))
    }

    /// Down-level an exported name to internal; dependents inheriting it lose it.
    pub fn unexport(&mut self, ns: NamespaceId, name: &str) -> NsResult<bool> {
        let was = self.namespace_mut(ns)?.clear_external(name);
        if was {
            self.withdraw_inherited(ns, name);
        }
        Ok(was)
    }

    /// Pin a present name as shadowing.
    pub fn shadow(&mut self, ns: NamespaceId, name: &str) -> NsResult<bool> {
        Ok(self.namespace_mut(ns)?.set_shadowing(name))
    }

    /// Record `name` in `ns` as inherited from `origin`, displacing a present binding.
    pub fn inherit(&mut self, ns: NamespaceId, name: &str, origin: NamespaceId) -> NsResult<Option<EntryId>> {
        let namespace = self.namespace_mut(ns)?;
        let displaced = namespace.take_present(name);
        namespace.set_inherited(name, origin);
        if let Some(old) = displaced {
            self.orphan_if_homed(old, ns)?;
        }
        Ok(displaced)
    }

    /// Attach a binding to an entry.
    pub fn bind(&mut self, entry: EntryId, kind: BindingKind) -> NsResult<bool> {
        Ok(self.entry_mut(entry)?.bindings.insert(kind))
    }

    /// Detach a binding from an entry. Returns whether it was attached.
    pub fn unbind(&mut self, entry: EntryId, kind: BindingKind) -> NsResult<bool> {
        Ok(self.entry_mut(entry)?.bindings.remove(&kind))
    }

    fn orphan_if_homed(&mut self, entry: EntryId, ns: NamespaceId) -> NsResult<()> {
        let e = self.entry_mut(entry)?;
        if e.home == Some(ns) {
            e.home = None;
        }
        Ok(())
    }

    /// Drop `name` from every dependent of `origin` that inherits it from `origin`.
    fn withdraw_inherited(&mut self, origin: NamespaceId, name: &str) {
        let dependents: Vec<NamespaceId> = match self.get(origin) {
            Some(ns) => ns.used_by().iter().copied().collect(),
            None => return,
        };
        for dependent in dependents {
            if let Some(d) = self.namespaces.get_mut(&dependent) {
                if d.inherited_from(name) == Some(origin) {
                    d.clear_inherited(name);
                }
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("namespaces", &self.namespaces.len())
            .field("names", &self.names.len())
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Registry handle for hosts that are otherwise multi-threaded.
///
/// Every call holds the lock for exactly one closure, so a reconciliation pass
/// run inside [`with`](Self::with) is a single mutation from the outside.
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl SharedRegistry {
    pub fn new(registry: Registry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(registry)),
        }
    }

    /// Run `f` with exclusive access to the registry.
    pub fn with<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}
