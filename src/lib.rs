// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # nsforge
//!
//! A namespace reconciliation engine: given a live namespace populated by
//! earlier state and a declarative definition of what it should look like,
//! mutate it in place while preserving entry identity, rejecting conflicting
//! visibility requests, and propagating export changes to every dependent.
//!
//! ## Architecture
//!
//! - **Entries** (`entry`): identity-bearing names with a home namespace
//! - **Namespaces** (`namespace`): present/external/shadowing/inherited tables
//! - **Registry** (`registry`): owned name → namespace table and entry arena
//! - **Recycling** (`recycle`): donor lookup deciding when identities are reused
//! - **Reconciliation** (`reconcile`): the ordered in-place upgrade protocol
//! - **Introspection** (`introspect`): sorted, serializable snapshots
//!
//! ## Library usage
//!
//! ```
//! use nsforge::engine::{Engine, EngineConfig};
//! use nsforge::spec::NamespaceSpec;
//!
//! let engine = Engine::new(EngineConfig::default()).unwrap();
//! let base = NamespaceSpec::builder("pkg/base").export(["find"]).build().unwrap();
//! let user = NamespaceSpec::builder("pkg/user").uses(["pkg/base"]).build().unwrap();
//! engine.define(&base).unwrap();
//! engine.define(&user).unwrap();
//!
//! let snapshot = engine.snapshot("pkg/user").unwrap().unwrap();
//! assert_eq!(snapshot.inherited[0].name, "find");
//! ```

pub mod engine;
pub mod entry;
pub mod error;
pub mod introspect;
pub mod namespace;
pub mod reconcile;
pub mod recycle;
pub mod registry;
pub mod spec;
