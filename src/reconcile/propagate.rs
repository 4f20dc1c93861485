//! Export propagation through `used-by` edges.
//!
//! When a namespace exports an entry, every dependent must end up seeing that
//! entry under the exported name unless it pinned its own. Dependents that
//! re-export the name pass the change on to their own dependents, so the walk
//! is transitive. It runs breadth-first over an explicit queue of
//! `(namespace, name)` pairs with a visited set, so long dependency chains
//! cost no stack and mutual `uses` edges terminate.

use std::collections::{HashSet, VecDeque};

use crate::error::NsResult;
use crate::namespace::NamespaceId;
use crate::recycle::Recycler;
use crate::registry::Registry;

/// What happened to one dependent during propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PropagationAction {
    /// Already bound to the exported entry.
    Unchanged,
    /// Pinned by an explicit shadow; left alone.
    KeptShadow,
    /// Stale recycled binding replaced by a forced shadowing import.
    ShadowingImport,
    /// Re-exported binding rebound to the new entry; walk continues.
    Reexported,
    /// Binding replaced by inheritance from the exporter.
    Inherited,
}

/// One visited `(dependent, name)` pair.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PropagationStep {
    pub from: NamespaceId,
    pub namespace: NamespaceId,
    pub name: String,
    pub action: PropagationAction,
}

/// Push exported `names` of `origin` into every transitive dependent.
///
/// Returns the visit log in queue order.
pub fn propagate_exports(
    registry: &mut Registry,
    recycler: &Recycler,
    origin: NamespaceId,
    names: impl IntoIterator<Item = String>,
) -> NsResult<Vec<PropagationStep>> {
    let mut queue: VecDeque<(NamespaceId, String)> = VecDeque::new();
    let mut visited: HashSet<(NamespaceId, String)> = HashSet::new();
    for name in names {
        if visited.insert((origin, name.clone())) {
            queue.push_back((origin, name));
        }
    }

    let mut log = Vec::new();
    while let Some((from, name)) = queue.pop_front() {
        let Some(entry) = registry.get(from).and_then(|ns| ns.present(&name)) else {
            continue;
        };
        let dependents: Vec<NamespaceId> = registry
            .namespace(from)?
            .used_by()
            .iter()
            .copied()
            .filter(|d| *d != from)
            .collect();

        for dependent in dependents {
            let ns = registry.namespace(dependent)?;
            let reexports = ns.is_external(&name);
            let action = match ns.present(&name) {
                Some(bound) if bound == entry => PropagationAction::Unchanged,
                Some(bound) => {
                    let stale = recycler.is_recycled(registry, bound);
                    if ns.is_shadowing(&name) && !stale {
                        PropagationAction::KeptShadow
                    } else if stale {
                        registry.install(dependent, &name, entry)?;
                        registry.shadow(dependent, &name)?;
                        PropagationAction::ShadowingImport
                    } else if reexports {
                        registry.install(dependent, &name, entry)?;
                        PropagationAction::Reexported
                    } else {
                        registry.inherit(dependent, &name, from)?;
                        PropagationAction::Inherited
                    }
                }
                None if ns.inherited_from(&name) == Some(from) => PropagationAction::Unchanged,
                None => {
                    registry.inherit(dependent, &name, from)?;
                    PropagationAction::Inherited
                }
            };

            tracing::debug!(
                from = %registry.display_name(from),
                namespace = %registry.display_name(dependent),
                name = %name,
                ?action,
                "propagated export"
            );

            let continues = matches!(
                action,
                PropagationAction::Unchanged
                    | PropagationAction::ShadowingImport
                    | PropagationAction::Reexported
            ) && reexports;
            if continues && visited.insert((dependent, name.clone())) {
                queue.push_back((dependent, name.clone()));
            }

            log.push(PropagationStep {
                from,
                namespace: dependent,
                name: name.clone(),
                action,
            });
        }
    }
    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Visibility;

    /// a ← b ← c, where b re-exports `x`.
    fn chain(reg: &mut Registry) -> (NamespaceId, NamespaceId, NamespaceId) {
        let a = reg.create("a").unwrap();
        let b = reg.create("b").unwrap();
        let c = reg.create("c").unwrap();
        reg.add_use(b, a).unwrap();
        reg.add_use(c, b).unwrap();
        (a, b, c)
    }

    #[test]
    fn new_export_becomes_inherited() {
        let mut reg = Registry::new();
        let (a, b, c) = chain(&mut reg);
        reg.intern(a, "y").unwrap();
        reg.export(a, "y").unwrap();

        let log = propagate_exports(&mut reg, &Recycler::default(), a, ["y".to_string()]).unwrap();
        assert_eq!(reg.get(b).unwrap().visibility("y"), Some(Visibility::Inherited(a)));
        assert_eq!(reg.get(c).unwrap().visibility("y"), None);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, PropagationAction::Inherited);
    }

    #[test]
    fn explicit_shadow_is_kept() {
        let mut reg = Registry::new();
        let (a, b, _c) = chain(&mut reg);
        reg.intern(a, "y").unwrap();
        reg.export(a, "y").unwrap();
        let own = reg.intern(b, "y").unwrap();
        reg.shadow(b, "y").unwrap();

        let log = propagate_exports(&mut reg, &Recycler::default(), a, ["y".to_string()]).unwrap();
        assert_eq!(reg.get(b).unwrap().present("y"), Some(own));
        assert_eq!(log[0].action, PropagationAction::KeptShadow);
    }

    #[test]
    fn reexport_walks_transitively() {
        let mut reg = Registry::new();
        let (a, b, c) = chain(&mut reg);
        let stale = reg.intern(b, "y").unwrap();
        reg.export(b, "y").unwrap();
        let fresh = reg.intern(a, "y").unwrap();
        reg.export(a, "y").unwrap();

        let log = propagate_exports(&mut reg, &Recycler::default(), a, ["y".to_string()]).unwrap();
        assert_eq!(reg.get(b).unwrap().present("y"), Some(fresh));
        assert!(reg.get(b).unwrap().is_external("y"));
        assert!(reg.entry(stale).unwrap().is_orphaned());
        assert_eq!(reg.get(c).unwrap().visibility("y"), Some(Visibility::Inherited(b)));
        let order: Vec<NamespaceId> = log.iter().map(|s| s.namespace).collect();
        assert_eq!(order, vec![b, c]);
    }

    #[test]
    fn stale_recycled_binding_gets_shadowing_import() {
        let mut reg = Registry::new();
        let (a, b, _c) = chain(&mut reg);
        let old = reg.create("old").unwrap();
        let legacy = reg.intern(old, "y").unwrap();
        reg.import(b, legacy).unwrap();
        reg.shadow(b, "y").unwrap();
        let fresh = reg.intern(a, "y").unwrap();
        reg.export(a, "y").unwrap();

        let recycler = Recycler::new(vec![old]);
        let log = propagate_exports(&mut reg, &recycler, a, ["y".to_string()]).unwrap();
        assert_eq!(reg.get(b).unwrap().present("y"), Some(fresh));
        assert_eq!(reg.get(b).unwrap().visibility("y"), Some(Visibility::Shadowed));
        assert_eq!(log[0].action, PropagationAction::ShadowingImport);
    }

    #[test]
    fn mutual_use_terminates() {
        let mut reg = Registry::new();
        let a = reg.create("a").unwrap();
        let b = reg.create("b").unwrap();
        reg.add_use(a, b).unwrap();
        reg.add_use(b, a).unwrap();
        let y = reg.intern(a, "y").unwrap();
        reg.export(a, "y").unwrap();
        reg.import(b, y).unwrap();
        reg.export(b, "y").unwrap();

        let log = propagate_exports(&mut reg, &Recycler::default(), a, ["y".to_string()]).unwrap();
        assert!(log.len() <= 2);
        assert_eq!(reg.get(a).unwrap().present("y"), Some(y));
    }
}
