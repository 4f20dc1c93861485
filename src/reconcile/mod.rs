//! Reconciliation: apply a [`NamespaceSpec`] to a live namespace in place.
//!
//! The pass runs a fixed sequence of steps. Later steps rely on what earlier
//! ones established, so the order below is part of the contract:
//!
//! 1. identity consolidation (merge every namespace holding an intended name)
//! 2. rename to the final primary name and aliases
//! 3. documentation
//! 4. dependency pruning
//! 5. unintern
//! 6. compute the export set
//! 7. down-level stale exports
//! 8. shadow
//! 9. shadowing-import-from
//! 10. mix
//! 11. import-from
//! 12. use
//! 13. materialize the export set
//! 14. materialize intern and binding-removal names
//! 15. sweep the remaining local names through recycling
//! 16. export and propagate to dependents
//! 17. binding removal
//!
//! Any conflict aborts the pass with the namespace left as the failing step
//! found it. There is no rollback.

pub mod propagate;

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::entry::{BindingKind, EntryId};
use crate::error::{NsResult, ReconcileError};
use crate::namespace::NamespaceId;
use crate::recycle::Recycler;
use crate::registry::Registry;
use crate::spec::{ImportClause, NamespaceSpec, UpgradeMode};

pub use propagate::{PropagationAction, PropagationStep};

/// Knobs for a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Fail on an ambiguous double inheritance through `mix` instead of
    /// promoting the later source to a shadowing import.
    pub strict_mix: bool,
    /// When a spec gives no `recycle` list, use the namespaces currently
    /// holding its name and aliases as donors.
    pub recycle_own_names: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            strict_mix: false,
            recycle_own_names: true,
        }
    }
}

/// Summary of one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// The reconciled namespace.
    pub namespace: NamespaceId,
    /// Whether the namespace had to be created.
    pub created: bool,
    /// Merged duplicates that survived under their remaining names.
    pub renamed: Vec<String>,
    /// Merged duplicates with no remaining name, destroyed at the end.
    pub destroyed: Vec<String>,
    /// Names that received a freshly minted entry.
    pub fresh: Vec<String>,
    /// Names whose entry was taken from another donor namespace.
    pub recycled: Vec<String>,
    /// Exports down-leveled to internal.
    pub unexported: Vec<String>,
    /// Export propagation visit log.
    pub propagation: Vec<PropagationStep>,
}

impl ReconcileReport {
    fn new(namespace: NamespaceId, created: bool) -> Self {
        Self {
            namespace,
            created,
            renamed: Vec::new(),
            destroyed: Vec::new(),
            fresh: Vec::new(),
            recycled: Vec::new(),
            unexported: Vec::new(),
            propagation: Vec::new(),
        }
    }
}

/// Reconcile the namespace named by `spec` against the registry.
pub fn reconcile(
    registry: &mut Registry,
    spec: &NamespaceSpec,
    options: &ReconcileOptions,
) -> NsResult<ReconcileReport> {
    if spec.upgrade_mode == UpgradeMode::Hard {
        return Err(ReconcileError::UnsupportedUpgradeMode {
            namespace: spec.name.clone(),
        }
        .into());
    }
    spec.validate()?;
    for (clause, name) in spec.referenced_namespaces() {
        if registry.resolve(name).is_none() {
            tracing::debug!(clause, name, "unresolved namespace reference");
            return Err(ReconcileError::UnknownNamespace { name: name.to_string() }.into());
        }
    }

    tracing::info!(namespace = %spec.name, "reconciling namespace");
    let mut pass = Pass::begin(registry, spec, options)?;
    if let Err(err) = pass.run(spec) {
        // Merged duplicates are already unnamed; fold them in rather than
        // leaving them unreachable.
        if let Err(cleanup) = pass.release_discarded() {
            tracing::warn!(namespace = %spec.name, error = %cleanup, "failed to release merged duplicates");
        }
        return Err(err);
    }
    let report = pass.finish()?;
    tracing::info!(
        namespace = %spec.name,
        created = report.created,
        fresh = report.fresh.len(),
        recycled = report.recycled.len(),
        propagated = report.propagation.len(),
        "reconciled namespace"
    );
    Ok(report)
}

/// Where a name bound during this pass came from.
#[derive(Debug, Clone, Copy)]
struct Source {
    origin: NamespaceId,
    entry: EntryId,
}

/// Per-pass bookkeeping.
struct Pass<'r> {
    registry: &'r mut Registry,
    options: ReconcileOptions,
    ns: NamespaceId,
    recycler: Recycler,
    discarded: Vec<NamespaceId>,
    /// Names pinned this pass, with the namespace the pinned entry came from.
    shadowed: BTreeMap<String, Source>,
    /// Names imported this pass by `import-from` or a promoted inheritance.
    imported: BTreeMap<String, Source>,
    /// Names inherited this pass.
    inherited: BTreeMap<String, Source>,
    /// Names already ensured by steps 13 to 15.
    ensured: BTreeSet<String>,
    /// Export set; reexported names carry their source.
    exports: BTreeMap<String, Option<Source>>,
    report: ReconcileReport,
}

impl<'r> Pass<'r> {
    /// Resolve donors and perform identity consolidation (step 1).
    fn begin(
        registry: &'r mut Registry,
        spec: &NamespaceSpec,
        options: &ReconcileOptions,
    ) -> NsResult<Self> {
        let intended = spec.intended_names();

        // Donors are resolved before anything is renamed so that merged
        // duplicates can still donate entries.
        let donor_names: Vec<&str> = match &spec.recycle {
            Some(names) => names.iter().map(String::as_str).collect(),
            None if options.recycle_own_names => intended.clone(),
            None => Vec::new(),
        };
        let donors: Vec<NamespaceId> = donor_names
            .iter()
            .filter_map(|n| registry.resolve(n))
            .collect();

        let mut previous: Vec<NamespaceId> = Vec::new();
        for name in &intended {
            if let Some(id) = registry.resolve(name) {
                if !previous.contains(&id) {
                    previous.push(id);
                }
            }
        }

        let (ns, created) = match previous.first() {
            Some(id) => (*id, false),
            None => (registry.create(&spec.name)?, true),
        };
        let discarded: Vec<NamespaceId> = previous.iter().skip(1).copied().collect();
        let mut report = ReconcileReport::new(ns, created);

        for &dup in &discarded {
            let remaining: Vec<String> = registry
                .namespace(dup)?
                .names()
                .filter(|n| !intended.contains(n))
                .map(str::to_string)
                .collect();
            match remaining.split_first() {
                Some((primary, aliases)) => {
                    tracing::warn!(
                        namespace = %spec.name,
                        duplicate = %primary,
                        "duplicate namespace keeps its remaining names"
                    );
                    registry.rename(dup, primary, aliases.iter().cloned())?;
                    report.renamed.push(primary.clone());
                }
                None => {
                    let former = registry.display_name(dup);
                    tracing::warn!(namespace = %spec.name, duplicate = %former, "merging duplicate namespace");
                    registry.detach(dup)?;
                    report.destroyed.push(former);
                }
            }
        }

        let recycler =
            Recycler::new(donors).with_lineage(std::iter::once(ns).chain(discarded.iter().copied()));

        Ok(Self {
            registry,
            options: *options,
            ns,
            recycler,
            discarded,
            shadowed: BTreeMap::new(),
            imported: BTreeMap::new(),
            inherited: BTreeMap::new(),
            ensured: BTreeSet::new(),
            exports: BTreeMap::new(),
            report,
        })
    }

    fn run(&mut self, spec: &NamespaceSpec) -> NsResult<()> {
        // 2. rename
        self.registry
            .rename(self.ns, &spec.name, spec.final_aliases())?;

        // 3. documentation
        self.registry
            .set_documentation(self.ns, spec.documentation.clone())?;

        self.prune_dependencies(spec)?;

        // 5. unintern
        for name in &spec.unintern {
            if self.registry.unintern(self.ns, name)?.is_some() {
                tracing::debug!(namespace = %spec.name, name = %name, "uninterned");
            }
        }

        self.compute_exports(spec)?;
        self.down_level()?;

        // 8. shadow
        for name in &spec.shadow {
            self.shadow(name)?;
        }

        // 9. shadowing-import-from
        for clause in &spec.shadowing_import_from {
            self.shadowing_import_from(clause)?;
        }

        // 10. mix
        for name in &spec.mix {
            let p = self.lookup(name)?;
            self.inherit_all(p, self.options.strict_mix)?;
            self.registry.add_use(self.ns, p)?;
        }

        // 11. import-from
        for clause in &spec.import_from {
            self.import_from(clause)?;
        }

        // 12. use
        for name in &spec.uses {
            let p = self.lookup(name)?;
            self.inherit_all(p, false)?;
            self.registry.add_use(self.ns, p)?;
        }

        self.materialize_exports()?;

        // 14. intern and binding-removal names
        for name in spec
            .intern
            .iter()
            .chain(&spec.remove_binding)
            .chain(&spec.remove_setf_binding)
        {
            self.ensure_local(name, true)?;
        }

        // 15. sweep, including names left behind in merged duplicates
        let mut local: BTreeSet<String> = self
            .registry
            .namespace(self.ns)?
            .present_entries()
            .keys()
            .cloned()
            .collect();
        for dup in &self.discarded {
            if !self.registry.is_attached(*dup) {
                local.extend(self.registry.namespace(*dup)?.present_entries().keys().cloned());
            }
        }
        for name in &local {
            self.ensure_local(name, false)?;
        }

        self.export_and_propagate()?;

        // 17. binding removal
        for (names, kind) in [
            (&spec.remove_binding, BindingKind::Value),
            (&spec.remove_setf_binding, BindingKind::Setf),
        ] {
            for name in names {
                if let Some(entry) = self.registry.find_entry(self.ns, name) {
                    self.registry.unbind(entry, kind)?;
                }
            }
        }
        Ok(())
    }

    fn finish(mut self) -> NsResult<ReconcileReport> {
        self.release_discarded()?;
        Ok(self.report)
    }

    /// Destroy every merged duplicate left without a name.
    ///
    /// Entries still homed in such a duplicate move to the namespace of record
    /// unless that name is already accessible there.
    fn release_discarded(&mut self) -> NsResult<()> {
        for dup in self.discarded.clone() {
            if self.registry.is_attached(dup) || self.registry.get(dup).is_none() {
                continue;
            }
            let registry = &*self.registry;
            let leftovers: Vec<(String, EntryId)> = registry
                .namespace(dup)?
                .present_entries()
                .iter()
                .filter(|(_, e)| registry.home_of(**e) == Some(dup))
                .map(|(n, e)| (n.clone(), *e))
                .collect();
            for (name, entry) in leftovers {
                if self.registry.find_entry(self.ns, &name).is_none() {
                    self.registry.install(self.ns, &name, entry)?;
                    self.registry.rehome(entry, self.ns)?;
                }
            }
            self.registry.destroy(dup)?;
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> NsResult<NamespaceId> {
        self.registry
            .resolve(name)
            .ok_or_else(|| ReconcileError::UnknownNamespace { name: name.to_string() }.into())
    }

    fn conflict(&self, name: &str, first: NamespaceId, second: NamespaceId) -> ReconcileError {
        ReconcileError::NamespaceConflict {
            name: name.to_string(),
            first: self.registry.display_name(first),
            second: self.registry.display_name(second),
        }
    }

    /// Step 4: drop `uses` edges to anything not in `mix ∪ use`.
    fn prune_dependencies(&mut self, spec: &NamespaceSpec) -> NsResult<()> {
        let keep: BTreeSet<NamespaceId> = spec
            .mix
            .iter()
            .chain(&spec.uses)
            .filter_map(|n| self.registry.resolve(n))
            .collect();
        let current = self.registry.namespace(self.ns)?.uses().to_vec();
        for used in current.into_iter().filter(|u| !keep.contains(u)) {
            tracing::warn!(
                namespace = %self.registry.display_name(self.ns),
                dependency = %self.registry.display_name(used),
                "dropping dependency no longer declared"
            );
            self.registry.remove_use(self.ns, used)?;
        }
        Ok(())
    }

    /// Step 6: `export` ∪ every external name of each `reexport` namespace.
    fn compute_exports(&mut self, spec: &NamespaceSpec) -> NsResult<()> {
        for name in &spec.export {
            self.exports.insert(name.clone(), None);
        }
        for name in &spec.reexport {
            let p = self.lookup(name)?;
            let source = self.registry.namespace(p)?;
            let external: Vec<(String, EntryId)> = source
                .external_names()
                .filter_map(|n| source.present(n).map(|e| (n.to_string(), e)))
                .collect();
            for (n, entry) in external {
                let previous = self.exports.insert(n.clone(), Some(Source { origin: p, entry }));
                if let Some(Some(earlier)) = previous {
                    if earlier.entry != entry {
                        tracing::warn!(
                            name = %n,
                            loser = %self.registry.display_name(earlier.origin),
                            winner = %self.registry.display_name(p),
                            "reexport sources disagree; later source wins"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Step 7: every current export outside the export set becomes internal.
    fn down_level(&mut self) -> NsResult<()> {
        let stale: Vec<String> = self
            .registry
            .namespace(self.ns)?
            .external_names()
            .filter(|n| !self.exports.contains_key(*n))
            .map(str::to_string)
            .collect();
        for name in stale {
            tracing::warn!(
                namespace = %self.registry.display_name(self.ns),
                name = %name,
                "down-leveling export no longer declared"
            );
            self.registry.unexport(self.ns, &name)?;
            self.report.unexported.push(name);
        }
        Ok(())
    }

    /// Step 8 for one name.
    fn shadow(&mut self, name: &str) -> NsResult<()> {
        let registry = &*self.registry;
        let own = registry
            .namespace(self.ns)?
            .present(name)
            .filter(|e| registry.home_of(*e) == Some(self.ns));
        let recycled = self
            .recycler
            .find(registry, name)
            .filter(|r| self.recycler.is_lineage(r.donor));

        let entry = match (own, recycled) {
            (Some(entry), _) => entry,
            (None, Some(r)) => {
                self.registry.install(self.ns, name, r.entry)?;
                if r.donor != self.ns {
                    self.registry.rehome(r.entry, self.ns)?;
                    self.report.recycled.push(name.to_string());
                }
                r.entry
            }
            (None, None) => {
                self.report.fresh.push(name.to_string());
                self.registry.fresh_entry(self.ns, name)?
            }
        };

        if let Some(existing) = self.shadowed.get(name) {
            if existing.entry != entry {
                return Err(self.conflict(name, existing.origin, self.ns).into());
            }
        }
        self.registry.shadow(self.ns, name)?;
        self.shadowed.insert(
            name.to_string(),
            Source {
                origin: self.ns,
                entry,
            },
        );
        Ok(())
    }

    /// Step 9 for one clause.
    fn shadowing_import_from(&mut self, clause: &ImportClause) -> NsResult<()> {
        let from = self.lookup(&clause.from)?;
        for name in &clause.names {
            let entry = self.accessible(from, name)?;
            self.force_shadowing_import(name, Source { origin: from, entry })?;
        }
        Ok(())
    }

    fn force_shadowing_import(&mut self, name: &str, source: Source) -> NsResult<()> {
        if let Some(existing) = self.shadowed.get(name) {
            if existing.entry != source.entry {
                return Err(self.conflict(name, existing.origin, source.origin).into());
            }
            return Ok(());
        }
        self.registry.install(self.ns, name, source.entry)?;
        self.registry.shadow(self.ns, name)?;
        self.shadowed.insert(name.to_string(), source);
        self.imported.insert(name.to_string(), source);
        self.inherited.remove(name);
        Ok(())
    }

    /// Step 11 for one clause.
    fn import_from(&mut self, clause: &ImportClause) -> NsResult<()> {
        let from = self.lookup(&clause.from)?;
        for name in &clause.names {
            let entry = self.accessible(from, name)?;
            if let Some(existing) = self.shadowed.get(name) {
                if existing.entry != entry {
                    return Err(self.conflict(name, existing.origin, from).into());
                }
                continue;
            }
            if let Some(existing) = self.imported.get(name) {
                if existing.entry != entry {
                    return Err(self.conflict(name, existing.origin, from).into());
                }
                continue;
            }
            let displaced = self.registry.install(self.ns, name, entry)?;
            if let Some(old) = displaced {
                tracing::debug!(name = %name, displaced = %old, "import displaced stale binding");
            }
            self.inherited.remove(name);
            self.imported
                .insert(name.clone(), Source { origin: from, entry });
        }
        Ok(())
    }

    /// Steps 10 and 12: inherit every external entry of `from`.
    fn inherit_all(&mut self, from: NamespaceId, strict: bool) -> NsResult<()> {
        let source = self.registry.namespace(from)?;
        let external: Vec<(String, EntryId)> = source
            .external_names()
            .filter_map(|n| source.present(n).map(|e| (n.to_string(), e)))
            .collect();

        for (name, entry) in external {
            if self.shadowed.contains_key(&name) || self.imported.contains_key(&name) {
                continue;
            }
            let incoming = Source { origin: from, entry };
            match self.inherited.get(&name).copied() {
                Some(existing) if existing.entry == entry => {}
                Some(existing) if strict => {
                    return Err(self.conflict(&name, existing.origin, from).into());
                }
                Some(existing) => {
                    tracing::debug!(
                        name = %name,
                        loser = %self.registry.display_name(existing.origin),
                        winner = %self.registry.display_name(from),
                        "promoting ambiguous inheritance to shadowing import"
                    );
                    self.inherited.remove(&name);
                    self.force_shadowing_import(&name, incoming)?;
                }
                None => {
                    let present = self.registry.namespace(self.ns)?.present(&name);
                    if present != Some(entry) {
                        self.registry.inherit(self.ns, &name, from)?;
                    }
                    self.inherited.insert(name, incoming);
                }
            }
        }
        Ok(())
    }

    /// Step 13: every exported name gets a local binding.
    fn materialize_exports(&mut self) -> NsResult<()> {
        let exports: Vec<(String, Option<Source>)> = self
            .exports
            .iter()
            .map(|(n, s)| (n.clone(), *s))
            .collect();
        for (name, reexported) in exports {
            if self.shadowed.contains_key(&name) || self.imported.contains_key(&name) {
                continue;
            }
            let carried = reexported.or_else(|| self.inherited.get(&name).copied());
            match carried {
                Some(source) => {
                    self.registry.install(self.ns, &name, source.entry)?;
                    self.inherited.remove(&name);
                    self.imported.insert(name, source);
                }
                None => self.ensure_local(&name, true)?,
            }
        }
        Ok(())
    }

    /// Make sure `name` has a local binding, preferring a recycled entry.
    ///
    /// With `intern` unset nothing new is minted; an existing binding is only
    /// swapped for a donor's entry.
    fn ensure_local(&mut self, name: &str, intern: bool) -> NsResult<()> {
        if self.shadowed.contains_key(name)
            || self.imported.contains_key(name)
            || self.inherited.contains_key(name)
            || !self.ensured.insert(name.to_string())
        {
            return Ok(());
        }

        let present = self.registry.namespace(self.ns)?.present(name);
        match self.recycler.find(self.registry, name) {
            Some(r) => {
                if present != Some(r.entry) {
                    self.registry.install(self.ns, name, r.entry)?;
                }
                if r.donor != self.ns {
                    if self.recycler.is_lineage(r.donor) {
                        self.registry.rehome(r.entry, self.ns)?;
                    }
                    tracing::debug!(
                        name = %name,
                        donor = %self.registry.display_name(r.donor),
                        entry = %r.entry,
                        "recycled entry"
                    );
                    self.report.recycled.push(name.to_string());
                }
            }
            None if present.is_none() && intern => {
                self.registry.fresh_entry(self.ns, name)?;
                self.report.fresh.push(name.to_string());
            }
            None => {}
        }
        Ok(())
    }

    /// Step 16.
    fn export_and_propagate(&mut self) -> NsResult<()> {
        let names: Vec<String> = self.exports.keys().cloned().collect();
        for name in &names {
            if !self.registry.export(self.ns, name)? {
                tracing::warn!(name = %name, "export set name has no local binding");
            }
        }
        let log = propagate::propagate_exports(self.registry, &self.recycler, self.ns, names)?;
        self.report.propagation = log;
        Ok(())
    }

    /// Entry accessible as `name` in `from`.
    fn accessible(&self, from: NamespaceId, name: &str) -> NsResult<EntryId> {
        self.registry.find_entry(from, name).ok_or_else(|| {
            ReconcileError::EntryNotFound {
                name: name.to_string(),
                namespace: self.registry.display_name(from),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NsError;
    use crate::namespace::Visibility;

    fn apply(reg: &mut Registry, spec: NamespaceSpec) -> NsResult<ReconcileReport> {
        reconcile(reg, &spec, &ReconcileOptions::default())
    }

    fn exporting(name: &str, names: &[&str]) -> NamespaceSpec {
        NamespaceSpec::builder(name)
            .export(names.iter().copied())
            .build()
            .unwrap()
    }

    #[test]
    fn creates_missing_namespace() {
        let mut reg = Registry::new();
        let report = apply(&mut reg, exporting("a", &["x"])).unwrap();
        assert!(report.created);
        assert_eq!(report.fresh, vec!["x"]);
        let a = reg.resolve("a").unwrap();
        assert_eq!(reg.get(a).unwrap().visibility("x"), Some(Visibility::External));
    }

    #[test]
    fn hard_upgrade_fails_before_touching_anything() {
        let mut reg = Registry::new();
        let spec = NamespaceSpec::builder("a")
            .upgrade_mode(UpgradeMode::Hard)
            .build()
            .unwrap();
        let err = apply(&mut reg, spec).unwrap_err();
        assert!(matches!(
            err,
            NsError::Reconcile(ReconcileError::UnsupportedUpgradeMode { .. })
        ));
        assert!(reg.is_empty());
    }

    #[test]
    fn unknown_dependency_fails_before_touching_anything() {
        let mut reg = Registry::new();
        let spec = NamespaceSpec::builder("a").uses(["missing"]).build().unwrap();
        let err = apply(&mut reg, spec).unwrap_err();
        assert!(matches!(
            err,
            NsError::Reconcile(ReconcileError::UnknownNamespace { ref name }) if name == "missing"
        ));
        assert_eq!(reg.resolve("a"), None);
    }

    #[test]
    fn unintern_ignores_absent_names() {
        let mut reg = Registry::new();
        apply(&mut reg, exporting("a", &["x"])).unwrap();
        let spec = NamespaceSpec::builder("a").unintern(["x", "nope"]).build().unwrap();
        apply(&mut reg, spec).unwrap();
        let a = reg.resolve("a").unwrap();
        assert_eq!(reg.get(a).unwrap().visibility("x"), None);
    }

    #[test]
    fn stale_export_is_down_leveled() {
        let mut reg = Registry::new();
        apply(&mut reg, exporting("a", &["x", "y"])).unwrap();
        let report = apply(&mut reg, exporting("a", &["x"])).unwrap();
        assert_eq!(report.unexported, vec!["y"]);
        let a = reg.resolve("a").unwrap();
        assert_eq!(reg.get(a).unwrap().visibility("y"), Some(Visibility::Internal));
    }

    #[test]
    fn shadow_pins_a_local_entry_over_inheritance() {
        let mut reg = Registry::new();
        apply(&mut reg, exporting("base", &["x"])).unwrap();
        let spec = NamespaceSpec::builder("user")
            .uses(["base"])
            .shadow(["x"])
            .build()
            .unwrap();
        apply(&mut reg, spec).unwrap();

        let base = reg.resolve("base").unwrap();
        let user = reg.resolve("user").unwrap();
        assert_eq!(reg.get(user).unwrap().visibility("x"), Some(Visibility::Shadowed));
        assert_ne!(reg.find_entry(user, "x"), reg.find_entry(base, "x"));
    }

    #[test]
    fn shadowing_import_of_same_entry_twice_is_fine() {
        let mut reg = Registry::new();
        apply(&mut reg, exporting("a", &["x"])).unwrap();
        let spec = NamespaceSpec::builder("b")
            .shadowing_import_from("a", ["x"])
            .shadowing_import_from("a", ["x"])
            .build()
            .unwrap();
        apply(&mut reg, spec).unwrap();
        let a = reg.resolve("a").unwrap();
        let b = reg.resolve("b").unwrap();
        assert_eq!(reg.find_entry(b, "x"), reg.find_entry(a, "x"));
        assert_eq!(reg.get(b).unwrap().visibility("x"), Some(Visibility::Shadowed));
    }

    #[test]
    fn import_conflicting_with_shadow_fails() {
        let mut reg = Registry::new();
        apply(&mut reg, exporting("a", &["x"])).unwrap();
        let spec = NamespaceSpec::builder("b")
            .shadow(["x"])
            .import_from("a", ["x"])
            .build()
            .unwrap();
        let err = apply(&mut reg, spec).unwrap_err();
        assert!(matches!(
            err,
            NsError::Reconcile(ReconcileError::NamespaceConflict { ref name, .. }) if name == "x"
        ));
    }

    #[test]
    fn import_from_two_sources_fails() {
        let mut reg = Registry::new();
        apply(&mut reg, exporting("a", &["x"])).unwrap();
        apply(&mut reg, exporting("c", &["x"])).unwrap();
        let spec = NamespaceSpec::builder("b")
            .import_from("a", ["x"])
            .import_from("c", ["x"])
            .build()
            .unwrap();
        let err = apply(&mut reg, spec).unwrap_err();
        assert!(matches!(
            err,
            NsError::Reconcile(ReconcileError::NamespaceConflict { ref name, .. }) if name == "x"
        ));
    }

    #[test]
    fn import_of_missing_entry_fails() {
        let mut reg = Registry::new();
        apply(&mut reg, NamespaceSpec::new("a")).unwrap();
        let spec = NamespaceSpec::builder("b")
            .import_from("a", ["ghost"])
            .build()
            .unwrap();
        let err = apply(&mut reg, spec).unwrap_err();
        assert!(matches!(
            err,
            NsError::Reconcile(ReconcileError::EntryNotFound { .. })
        ));
    }

    #[test]
    fn mix_promotes_double_inheritance_last_writer_wins() {
        let mut reg = Registry::new();
        apply(&mut reg, exporting("p1", &["x", "only1"])).unwrap();
        apply(&mut reg, exporting("p2", &["x"])).unwrap();
        let spec = NamespaceSpec::builder("m").mix(["p1", "p2"]).build().unwrap();
        apply(&mut reg, spec).unwrap();

        let p1 = reg.resolve("p1").unwrap();
        let p2 = reg.resolve("p2").unwrap();
        let m = reg.resolve("m").unwrap();
        assert_eq!(reg.get(m).unwrap().visibility("x"), Some(Visibility::Shadowed));
        assert_eq!(reg.find_entry(m, "x"), reg.find_entry(p2, "x"));
        assert_eq!(reg.get(m).unwrap().visibility("only1"), Some(Visibility::Inherited(p1)));
        assert_eq!(reg.get(m).unwrap().uses(), &[p1, p2]);
    }

    #[test]
    fn strict_mix_rejects_double_inheritance() {
        let mut reg = Registry::new();
        apply(&mut reg, exporting("p1", &["x"])).unwrap();
        apply(&mut reg, exporting("p2", &["x"])).unwrap();
        let spec = NamespaceSpec::builder("m").mix(["p1", "p2"]).build().unwrap();
        let options = ReconcileOptions {
            strict_mix: true,
            ..Default::default()
        };
        let err = reconcile(&mut reg, &spec, &options).unwrap_err();
        assert!(matches!(
            err,
            NsError::Reconcile(ReconcileError::NamespaceConflict { ref name, .. }) if name == "x"
        ));
    }

    #[test]
    fn conflicting_reexport_sources_take_the_later_one() {
        let mut reg = Registry::new();
        apply(&mut reg, exporting("r1", &["x"])).unwrap();
        apply(&mut reg, exporting("r2", &["x"])).unwrap();
        let spec = NamespaceSpec::builder("outer")
            .reexport(["r1", "r2"])
            .build()
            .unwrap();
        apply(&mut reg, spec).unwrap();

        let r2 = reg.resolve("r2").unwrap();
        let outer = reg.resolve("outer").unwrap();
        assert_eq!(reg.find_entry(outer, "x"), reg.find_entry(r2, "x"));
        assert_eq!(reg.get(outer).unwrap().visibility("x"), Some(Visibility::External));
    }

    #[test]
    fn failed_merge_releases_the_duplicate() {
        let mut reg = Registry::new();
        let old_spec = NamespaceSpec::builder("old").intern(["kept"]).build().unwrap();
        apply(&mut reg, old_spec).unwrap();
        apply(&mut reg, NamespaceSpec::new("new")).unwrap();
        apply(&mut reg, exporting("s1", &["x"])).unwrap();
        apply(&mut reg, exporting("s2", &["x"])).unwrap();
        let old = reg.resolve("old").unwrap();
        let kept = reg.find_entry(old, "kept").unwrap();

        let failing = NamespaceSpec::builder("new")
            .aliases(["old"])
            .shadowing_import_from("s1", ["x"])
            .shadowing_import_from("s2", ["x"])
            .build()
            .unwrap();
        assert!(apply(&mut reg, failing).is_err());
        assert!(reg.get(old).is_none());

        let fixed = NamespaceSpec::builder("new").aliases(["old"]).build().unwrap();
        apply(&mut reg, fixed).unwrap();
        let merged = reg.resolve("new").unwrap();
        assert_eq!(reg.resolve("old"), Some(merged));
        assert_eq!(reg.find_entry(merged, "kept"), Some(kept));
        assert_eq!(reg.home_of(kept), Some(merged));
    }

    #[test]
    fn reexport_exports_the_source_entries() {
        let mut reg = Registry::new();
        apply(&mut reg, exporting("inner", &["x", "y"])).unwrap();
        let spec = NamespaceSpec::builder("outer")
            .reexport(["inner"])
            .build()
            .unwrap();
        apply(&mut reg, spec).unwrap();

        let inner = reg.resolve("inner").unwrap();
        let outer = reg.resolve("outer").unwrap();
        let ns = reg.get(outer).unwrap();
        assert_eq!(ns.visibility("x"), Some(Visibility::External));
        assert_eq!(ns.present("x"), reg.get(inner).unwrap().present("x"));
        assert_eq!(reg.home_of(ns.present("y").unwrap()), Some(inner));
    }

    #[test]
    fn exporting_an_inherited_name_imports_it() {
        let mut reg = Registry::new();
        apply(&mut reg, exporting("base", &["x"])).unwrap();
        let spec = NamespaceSpec::builder("mid")
            .uses(["base"])
            .export(["x"])
            .build()
            .unwrap();
        let report = apply(&mut reg, spec).unwrap();
        assert!(report.fresh.is_empty());

        let base = reg.resolve("base").unwrap();
        let mid = reg.resolve("mid").unwrap();
        assert_eq!(reg.get(mid).unwrap().visibility("x"), Some(Visibility::External));
        assert_eq!(reg.home_of(reg.find_entry(mid, "x").unwrap()), Some(base));
    }

    #[test]
    fn binding_removal_clears_attached_bindings() {
        let mut reg = Registry::new();
        apply(&mut reg, exporting("a", &["f"])).unwrap();
        let a = reg.resolve("a").unwrap();
        let f = reg.find_entry(a, "f").unwrap();
        reg.bind(f, BindingKind::Value).unwrap();
        reg.bind(f, BindingKind::Setf).unwrap();

        let spec = NamespaceSpec::builder("a")
            .export(["f"])
            .remove_setf_binding(["f"])
            .remove_binding(["g"])
            .build()
            .unwrap();
        apply(&mut reg, spec).unwrap();
        let entry = reg.entry(f).unwrap();
        assert!(entry.bindings.contains(&BindingKind::Value));
        assert!(!entry.bindings.contains(&BindingKind::Setf));
        assert_eq!(reg.get(a).unwrap().visibility("g"), Some(Visibility::Internal));
    }

    #[test]
    fn sweep_keeps_unmentioned_legacy_entries() {
        let mut reg = Registry::new();
        let spec = NamespaceSpec::builder("a").intern(["legacy"]).build().unwrap();
        apply(&mut reg, spec).unwrap();
        let a = reg.resolve("a").unwrap();
        let legacy = reg.find_entry(a, "legacy").unwrap();

        apply(&mut reg, NamespaceSpec::new("a")).unwrap();
        assert_eq!(reg.find_entry(a, "legacy"), Some(legacy));
    }

    #[test]
    fn explicit_empty_recycle_still_keeps_own_entries() {
        let mut reg = Registry::new();
        apply(&mut reg, exporting("a", &["x"])).unwrap();
        let a = reg.resolve("a").unwrap();
        let x = reg.find_entry(a, "x").unwrap();

        let spec = NamespaceSpec::builder("a")
            .export(["x"])
            .recycle(Vec::<String>::new())
            .build()
            .unwrap();
        apply(&mut reg, spec).unwrap();
        assert_eq!(reg.find_entry(a, "x"), Some(x));
    }
}
