//! Engine facade: top-level API for the nsforge system.
//!
//! The `Engine` owns the configuration and a shared registry, and is the
//! single entry point used by the CLI and by hosts embedding the library.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::entry::EntryAllocator;
use crate::error::{EngineError, NsResult, SpecError};
use crate::introspect::{self, NamespaceSnapshot};
use crate::namespace::NamespaceId;
use crate::reconcile::{self, ReconcileOptions, ReconcileReport};
use crate::registry::{Registry, SharedRegistry};
use crate::spec::{self, NamespaceSpec};

/// Configuration for the nsforge engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Fail on ambiguous `mix` inheritance instead of letting the later
    /// source win.
    #[serde(default)]
    pub strict_mix: bool,
    /// Use a namespace's own current names as recycling donors when its
    /// definition has no `recycle` clause.
    #[serde(default = "default_recycle_own_names")]
    pub recycle_own_names: bool,
    /// First entry id handed out by the allocator (must be > 0).
    #[serde(default = "default_first_entry_id")]
    pub first_entry_id: u64,
}

fn default_recycle_own_names() -> bool {
    true
}

fn default_first_entry_id() -> u64 {
    1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_mix: false,
            recycle_own_names: default_recycle_own_names(),
            first_entry_id: default_first_entry_id(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> NsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| EngineError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(text: &str) -> NsResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| EngineError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> NsResult<()> {
        if self.first_entry_id == 0 {
            return Err(EngineError::InvalidConfig {
                message: "first_entry_id must be > 0".into(),
            }
            .into());
        }
        Ok(())
    }

    fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            strict_mix: self.strict_mix,
            recycle_own_names: self.recycle_own_names,
        }
    }
}

/// The nsforge engine.
pub struct Engine {
    config: EngineConfig,
    registry: SharedRegistry,
}

impl Engine {
    /// Create an engine with an empty registry.
    pub fn new(config: EngineConfig) -> NsResult<Self> {
        config.validate()?;
        let allocator = EntryAllocator::starting_from(config.first_entry_id);
        tracing::info!(
            strict_mix = config.strict_mix,
            recycle_own_names = config.recycle_own_names,
            "initializing nsforge engine"
        );
        Ok(Self {
            config,
            registry: SharedRegistry::new(Registry::with_allocator(allocator)),
        })
    }

    /// Reconcile one namespace definition against the registry.
    pub fn define(&self, spec: &NamespaceSpec) -> NsResult<ReconcileReport> {
        let options = self.config.reconcile_options();
        self.registry
            .with(|registry| reconcile::reconcile(registry, spec, &options))
    }

    /// Parse a TOML document of `[[namespace]]` tables and reconcile each in order.
    ///
    /// Stops at the first failing definition.
    pub fn define_all(&self, text: &str) -> NsResult<Vec<ReconcileReport>> {
        let specs = spec::parse_spec_file(text)?;
        if specs.is_empty() {
            return Err(SpecError::InvalidSpecification {
                message: "no [[namespace]] tables found".into(),
            }
            .into());
        }
        specs.iter().map(|s| self.define(s)).collect()
    }

    /// Resolve a name to a namespace id.
    pub fn resolve(&self, name: &str) -> Option<NamespaceId> {
        self.registry.with(|registry| registry.resolve(name))
    }

    /// Snapshot the namespace currently resolving `name`.
    pub fn snapshot(&self, name: &str) -> NsResult<Option<NamespaceSnapshot>> {
        self.registry.with(|registry| match registry.resolve(name) {
            Some(id) => introspect::snapshot(registry, id).map(Some),
            None => Ok(None),
        })
    }

    /// Snapshots of every attached namespace, sorted by primary name.
    pub fn snapshots(&self) -> NsResult<Vec<NamespaceSnapshot>> {
        self.registry.with(|registry| {
            registry
                .namespaces()
                .iter()
                .map(|ns| introspect::snapshot(registry, ns.id()))
                .collect()
        })
    }

    /// Shared handle to the underlying registry.
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn info(&self) -> EngineInfo {
        self.registry.with(|registry| EngineInfo {
            namespaces: registry.len(),
            names: registry.name_count(),
            strict_mix: self.config.strict_mix,
        })
    }
}

/// Summary information about the engine state.
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub namespaces: usize,
    pub names: usize,
    pub strict_mix: bool,
}

impl std::fmt::Display for EngineInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "nsforge engine info")?;
        writeln!(f, "  namespaces:   {}", self.namespaces)?;
        writeln!(f, "  names:        {}", self.names)?;
        writeln!(f, "  strict mix:   {}", self.strict_mix)?;
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}
