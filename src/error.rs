//! Rich diagnostic error types for the nsforge engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so callers know exactly
//! which clause of a namespace definition went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the nsforge engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum NsError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Entry(#[from] EntryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),
}

// ---------------------------------------------------------------------------
// Entry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EntryError {
    #[error("entry allocator exhausted: cannot allocate more than u64::MAX entries")]
    #[diagnostic(
        code(nsforge::entry::exhausted),
        help(
            "The entry identity space is exhausted. This requires 2^64 allocations; \
             check for a reconciliation loop minting fresh entries on every pass."
        )
    )]
    AllocatorExhausted,

    #[error("entry {entry_id} is not known to the registry")]
    #[diagnostic(
        code(nsforge::entry::unknown),
        help("The entry was never allocated by this registry. Entry ids are not portable between registries.")
    )]
    Unknown { entry_id: u64 },
}

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("name conflict: \"{name}\" is already claimed by namespace \"{holder}\"")]
    #[diagnostic(
        code(nsforge::registry::name_conflict),
        help(
            "Every primary name and alias must be unique across the registry. \
             Rename or destroy \"{holder}\" first, or pick a different name."
        )
    )]
    NameConflict { name: String, holder: String },

    #[error("namespace {namespace_id} is not live in this registry")]
    #[diagnostic(
        code(nsforge::registry::dead_namespace),
        help("The namespace was destroyed, or the id belongs to a different registry.")
    )]
    DeadNamespace { namespace_id: u64 },

    #[error("namespace id space exhausted: cannot create more than u64::MAX namespaces")]
    #[diagnostic(
        code(nsforge::registry::exhausted),
        help(
            "Namespace ids are never reused. This requires 2^64 creations; \
             check for a loop creating namespaces under fresh names."
        )
    )]
    NamespaceIdsExhausted,
}

// ---------------------------------------------------------------------------
// Specification errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SpecError {
    #[error("invalid namespace specification: {message}")]
    #[diagnostic(
        code(nsforge::spec::invalid),
        help(
            "Known clauses are: aliases, documentation, upgrade-mode, use, shadow, \
             shadowing-import-from, import-from, export, intern, recycle, mix, \
             reexport, unintern, remove-binding, remove-setf-binding. \
             documentation and upgrade-mode may appear at most once."
        )
    )]
    InvalidSpecification { message: String },
}

// ---------------------------------------------------------------------------
// Reconciliation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ReconcileError {
    #[error("unsupported upgrade mode for \"{namespace}\": hard upgrades are not implemented")]
    #[diagnostic(
        code(nsforge::reconcile::unsupported_upgrade),
        help("Only `upgrade-mode = \"soft\"` is supported. Remove the clause or set it to soft.")
    )]
    UnsupportedUpgradeMode { namespace: String },

    #[error("unknown namespace \"{name}\"")]
    #[diagnostic(
        code(nsforge::reconcile::unknown_namespace),
        help(
            "A use, mix, reexport, import-from or shadowing-import-from clause names \
             a namespace that does not exist yet. Define \"{name}\" before this one."
        )
    )]
    UnknownNamespace { name: String },

    #[error("namespace conflict on \"{name}\": {first} vs {second}")]
    #[diagnostic(
        code(nsforge::reconcile::namespace_conflict),
        help(
            "Two clauses bind \"{name}\" to different entries. Keep only one source, \
             or list the name under `shadow` to pin a local entry."
        )
    )]
    NamespaceConflict {
        name: String,
        first: String,
        second: String,
    },

    #[error("no entry named \"{name}\" is accessible in namespace \"{namespace}\"")]
    #[diagnostic(
        code(nsforge::reconcile::entry_not_found),
        help("Import sources must already make the named entry accessible. Export it from \"{namespace}\" first.")
    )]
    EntryNotFound { name: String, namespace: String },
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(nsforge::engine::invalid_config),
        help("Check the EngineConfig fields. {message}")
    )]
    InvalidConfig { message: String },

    #[error("failed to read {path}")]
    #[diagnostic(
        code(nsforge::engine::read),
        help("Ensure the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for functions returning nsforge results.
pub type NsResult<T> = std::result::Result<T, NsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_error_converts_to_ns_error() {
        let err = ReconcileError::UnknownNamespace {
            name: "pkg/missing".into(),
        };
        let ns: NsError = err.into();
        assert!(matches!(
            ns,
            NsError::Reconcile(ReconcileError::UnknownNamespace { .. })
        ));
    }

    #[test]
    fn registry_error_converts_to_ns_error() {
        let err = RegistryError::NameConflict {
            name: "a".into(),
            holder: "b".into(),
        };
        let ns: NsError = err.into();
        assert!(matches!(ns, NsError::Registry(RegistryError::NameConflict { .. })));
    }

    #[test]
    fn conflict_message_names_both_origins() {
        let err = ReconcileError::NamespaceConflict {
            name: "X".into(),
            first: "pkg/a".into(),
            second: "pkg/b".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("\"X\""));
        assert!(msg.contains("pkg/a"));
        assert!(msg.contains("pkg/b"));
    }
}
