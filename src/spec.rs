//! Declarative namespace specifications.
//!
//! A [`NamespaceSpec`] is the already-validated target shape the reconciler
//! applies. Three construction paths exist, all validating before any
//! namespace is touched:
//!
//! - [`SpecBuilder`], a typed fluent builder for Rust callers;
//! - [`NamespaceSpec::from_clauses`], a keyword-clause API for hosts that
//!   forward user-written definitions clause by clause;
//! - [`NamespaceSpec::from_toml`] / [`parse_spec_file`], for files.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{NsResult, SpecError};

/// How an existing namespace may be upgraded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpgradeMode {
    /// Mutate the live namespace in place, preserving identities.
    #[default]
    Soft,
    /// Tear down and rebuild. Accepted by the parser, rejected by the reconciler.
    Hard,
}

impl FromStr for UpgradeMode {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "soft" => Ok(UpgradeMode::Soft),
            "hard" => Ok(UpgradeMode::Hard),
            other => Err(SpecError::InvalidSpecification {
                message: format!("bad upgrade-mode value \"{other}\" (expected soft or hard)"),
            }),
        }
    }
}

impl std::fmt::Display for UpgradeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpgradeMode::Soft => write!(f, "soft"),
            UpgradeMode::Hard => write!(f, "hard"),
        }
    }
}

/// `(source, names)` pair used by import clauses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportClause {
    /// Namespace the names are taken from.
    pub from: String,
    /// Names to import.
    pub names: Vec<String>,
}

impl ImportClause {
    pub fn new<I, S>(from: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            from: from.into(),
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

/// Target shape of one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct NamespaceSpec {
    /// Intended primary name.
    pub name: String,
    pub aliases: Vec<String>,
    pub documentation: Option<String>,
    pub upgrade_mode: UpgradeMode,
    /// Namespaces to inherit exported names from.
    #[serde(rename = "use")]
    pub uses: Vec<String>,
    pub shadow: Vec<String>,
    pub shadowing_import_from: Vec<ImportClause>,
    pub import_from: Vec<ImportClause>,
    pub export: Vec<String>,
    pub intern: Vec<String>,
    /// Donor namespaces for identity recycling. `None` means "the namespaces
    /// currently holding this spec's name and aliases".
    pub recycle: Option<Vec<String>>,
    pub mix: Vec<String>,
    pub reexport: Vec<String>,
    pub unintern: Vec<String>,
    pub remove_binding: Vec<String>,
    pub remove_setf_binding: Vec<String>,
}

impl NamespaceSpec {
    /// Minimal spec: just a name, everything else empty.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Start a fluent builder.
    pub fn builder(name: impl Into<String>) -> SpecBuilder {
        SpecBuilder {
            spec: Self::new(name),
        }
    }

    /// Primary name followed by aliases, deduplicated, in declaration order.
    pub fn intended_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::with_capacity(1 + self.aliases.len());
        for n in std::iter::once(&self.name).chain(&self.aliases) {
            if !names.contains(&n.as_str()) {
                names.push(n);
            }
        }
        names
    }

    /// Aliases with the primary name removed.
    pub fn final_aliases(&self) -> Vec<&str> {
        self.intended_names().into_iter().skip(1).collect()
    }

    /// Every namespace name that must resolve before reconciliation, paired with
    /// the clause that references it.
    pub fn referenced_namespaces(&self) -> Vec<(&'static str, &str)> {
        let mut refs = Vec::new();
        refs.extend(self.uses.iter().map(|n| ("use", n.as_str())));
        refs.extend(self.mix.iter().map(|n| ("mix", n.as_str())));
        refs.extend(self.reexport.iter().map(|n| ("reexport", n.as_str())));
        refs.extend(self.import_from.iter().map(|c| ("import-from", c.from.as_str())));
        refs.extend(
            self.shadowing_import_from
                .iter()
                .map(|c| ("shadowing-import-from", c.from.as_str())),
        );
        refs
    }

    /// Check structural well-formedness.
    pub fn validate(&self) -> NsResult<()> {
        let invalid = |message: String| SpecError::InvalidSpecification { message };
        if self.name.trim().is_empty() {
            return Err(invalid("namespace name must not be empty".into()).into());
        }
        let lists: [(&str, &Vec<String>); 10] = [
            ("aliases", &self.aliases),
            ("use", &self.uses),
            ("shadow", &self.shadow),
            ("export", &self.export),
            ("intern", &self.intern),
            ("mix", &self.mix),
            ("reexport", &self.reexport),
            ("unintern", &self.unintern),
            ("remove-binding", &self.remove_binding),
            ("remove-setf-binding", &self.remove_setf_binding),
        ];
        for (clause, names) in lists {
            if names.iter().any(|n| n.is_empty()) {
                return Err(invalid(format!("empty name in `{clause}`")).into());
            }
        }
        if let Some(recycle) = &self.recycle {
            if recycle.iter().any(|n| n.is_empty()) {
                return Err(invalid("empty name in `recycle`".into()).into());
            }
        }
        for (clause, imports) in [
            ("import-from", &self.import_from),
            ("shadowing-import-from", &self.shadowing_import_from),
        ] {
            for import in imports {
                if import.from.is_empty() || import.names.iter().any(|n| n.is_empty()) {
                    return Err(invalid(format!("empty name in `{clause}`")).into());
                }
            }
        }
        Ok(())
    }

    /// Parse a single spec from a TOML table.
    ///
    /// Unknown fields, duplicate keys and bad upgrade-mode values all surface
    /// as [`SpecError::InvalidSpecification`].
    pub fn from_toml(text: &str) -> NsResult<Self> {
        let spec: Self = toml::from_str(text).map_err(|e| SpecError::InvalidSpecification {
            message: e.to_string(),
        })?;
        spec.validate()?;
        Ok(spec)
    }

    /// Build a spec from keyword clauses.
    ///
    /// List-valued clauses accumulate across repeats; `documentation` and
    /// `upgrade-mode` may appear at most once.
    pub fn from_clauses(
        name: impl Into<String>,
        clauses: impl IntoIterator<Item = Clause>,
    ) -> NsResult<Self> {
        let mut spec = Self::new(name);
        let mut seen_documentation = false;
        let mut seen_upgrade = false;
        let mut recycle: Option<Vec<String>> = None;

        for Clause { key, value } in clauses {
            let invalid = |message: String| SpecError::InvalidSpecification { message };
            match (key.as_str(), value) {
                ("documentation", ClauseValue::Text(text)) => {
                    if std::mem::replace(&mut seen_documentation, true) {
                        return Err(invalid("duplicate clause `documentation`".into()).into());
                    }
                    spec.documentation = Some(text);
                }
                ("upgrade-mode", ClauseValue::Text(text)) => {
                    if std::mem::replace(&mut seen_upgrade, true) {
                        return Err(invalid("duplicate clause `upgrade-mode`".into()).into());
                    }
                    spec.upgrade_mode = text.parse()?;
                }
                ("import-from", ClauseValue::Import(clause)) => spec.import_from.push(clause),
                ("shadowing-import-from", ClauseValue::Import(clause)) => {
                    spec.shadowing_import_from.push(clause)
                }
                ("recycle", ClauseValue::Names(names)) => {
                    recycle.get_or_insert_with(Vec::new).extend(names)
                }
                (key, _) if !KNOWN_CLAUSES.contains(&key) => {
                    return Err(invalid(format!("unrecognized clause `{key}`")).into());
                }
                (key, ClauseValue::Names(names)) => match spec.list_mut(key) {
                    Some(list) => list.extend(names),
                    None => {
                        return Err(invalid(format!(
                            "clause `{key}` does not accept a name list value"
                        ))
                        .into());
                    }
                },
                (key, value) => {
                    return Err(invalid(format!(
                        "clause `{key}` does not accept a {} value",
                        value.kind()
                    ))
                    .into());
                }
            }
        }

        spec.recycle = recycle;
        spec.validate()?;
        Ok(spec)
    }

    fn list_mut(&mut self, key: &str) -> Option<&mut Vec<String>> {
        Some(match key {
            "aliases" => &mut self.aliases,
            "use" => &mut self.uses,
            "shadow" => &mut self.shadow,
            "export" => &mut self.export,
            "intern" => &mut self.intern,
            "mix" => &mut self.mix,
            "reexport" => &mut self.reexport,
            "unintern" => &mut self.unintern,
            "remove-binding" => &mut self.remove_binding,
            "remove-setf-binding" => &mut self.remove_setf_binding,
            _ => return None,
        })
    }
}

const KNOWN_CLAUSES: &[&str] = &[
    "aliases",
    "documentation",
    "upgrade-mode",
    "use",
    "shadow",
    "shadowing-import-from",
    "import-from",
    "export",
    "intern",
    "recycle",
    "mix",
    "reexport",
    "unintern",
    "remove-binding",
    "remove-setf-binding",
];

/// One keyword clause of a namespace definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub key: String,
    pub value: ClauseValue,
}

impl Clause {
    pub fn text(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: ClauseValue::Text(text.into()),
        }
    }

    pub fn names<I, S>(key: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.into(),
            value: ClauseValue::Names(names.into_iter().map(Into::into).collect()),
        }
    }

    pub fn import<I, S>(key: impl Into<String>, from: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.into(),
            value: ClauseValue::Import(ImportClause::new(from, names)),
        }
    }
}

/// Payload of a keyword clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClauseValue {
    Text(String),
    Names(Vec<String>),
    Import(ImportClause),
}

impl ClauseValue {
    fn kind(&self) -> &'static str {
        match self {
            ClauseValue::Text(_) => "text",
            ClauseValue::Names(_) => "name list",
            ClauseValue::Import(_) => "import",
        }
    }
}

/// Fluent builder over [`NamespaceSpec`].
#[derive(Debug, Clone)]
pub struct SpecBuilder {
    spec: NamespaceSpec,
}

macro_rules! list_setters {
    ($($(#[$doc:meta])* $method:ident => $field:ident;)*) => {
        $(
            $(#[$doc])*
            pub fn $method<I, S>(mut self, names: I) -> Self
            where
                I: IntoIterator<Item = S>,
                S: Into<String>,
            {
                self.spec.$field.extend(names.into_iter().map(Into::into));
                self
            }
        )*
    };
}

impl SpecBuilder {
    list_setters! {
        aliases => aliases;
        /// Inherit every exported name of these namespaces.
        uses => uses;
        shadow => shadow;
        export => export;
        intern => intern;
        /// Inherit with conflict promotion instead of conflict errors.
        mix => mix;
        /// Re-export the full external surface of these namespaces.
        reexport => reexport;
        unintern => unintern;
        remove_binding => remove_binding;
        remove_setf_binding => remove_setf_binding;
    }

    pub fn documentation(mut self, text: impl Into<String>) -> Self {
        self.spec.documentation = Some(text.into());
        self
    }

    pub fn upgrade_mode(mut self, mode: UpgradeMode) -> Self {
        self.spec.upgrade_mode = mode;
        self
    }

    pub fn import_from<I, S>(mut self, from: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.import_from.push(ImportClause::new(from, names));
        self
    }

    pub fn shadowing_import_from<I, S>(mut self, from: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec
            .shadowing_import_from
            .push(ImportClause::new(from, names));
        self
    }

    /// Set the donor list explicitly. An empty list disables recycling.
    pub fn recycle<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec
            .recycle
            .get_or_insert_with(Vec::new)
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Validate and return the spec.
    pub fn build(self) -> NsResult<NamespaceSpec> {
        self.spec.validate()?;
        Ok(self.spec)
    }
}

/// A file of specs, one `[[namespace]]` table each, applied in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SpecFile {
    #[serde(default)]
    namespace: Vec<NamespaceSpec>,
}

/// Parse a TOML document containing `[[namespace]]` tables.
pub fn parse_spec_file(text: &str) -> NsResult<Vec<NamespaceSpec>> {
    let file: SpecFile = toml::from_str(text).map_err(|e| SpecError::InvalidSpecification {
        message: e.to_string(),
    })?;
    for spec in &file.namespace {
        spec.validate()?;
    }
    Ok(file.namespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NsError;

    fn is_invalid(result: NsResult<NamespaceSpec>) -> bool {
        matches!(
            result,
            Err(NsError::Spec(SpecError::InvalidSpecification { .. }))
        )
    }

    #[test]
    fn builder_collects_clauses() {
        let spec = NamespaceSpec::builder("pkg/alpha")
            .aliases(["alpha2"])
            .uses(["pkg/base"])
            .export(["find", "make"])
            .import_from("pkg/util", ["helper"])
            .build()
            .unwrap();
        assert_eq!(spec.intended_names(), vec!["pkg/alpha", "alpha2"]);
        assert_eq!(spec.uses, vec!["pkg/base"]);
        assert_eq!(spec.import_from[0].from, "pkg/util");
        assert!(spec.recycle.is_none());
    }

    #[test]
    fn builder_rejects_empty_name() {
        assert!(is_invalid(NamespaceSpec::builder("").build()));
        assert!(is_invalid(NamespaceSpec::builder("a").export([""]).build()));
    }

    #[test]
    fn intended_names_deduplicates_primary() {
        let spec = NamespaceSpec::builder("a").aliases(["a", "b", "b"]).build().unwrap();
        assert_eq!(spec.intended_names(), vec!["a", "b"]);
        assert_eq!(spec.final_aliases(), vec!["b"]);
    }

    #[test]
    fn clauses_accumulate_lists() {
        let spec = NamespaceSpec::from_clauses(
            "a",
            [
                Clause::names("export", ["x"]),
                Clause::names("export", ["y"]),
                Clause::import("import-from", "b", ["z"]),
                Clause::text("upgrade-mode", "SOFT"),
                Clause::names("recycle", Vec::<String>::new()),
            ],
        )
        .unwrap();
        assert_eq!(spec.export, vec!["x", "y"]);
        assert_eq!(spec.import_from.len(), 1);
        assert_eq!(spec.upgrade_mode, UpgradeMode::Soft);
        assert_eq!(spec.recycle, Some(vec![]));
    }

    #[test]
    fn clauses_reject_duplicates_unknowns_and_bad_modes() {
        assert!(is_invalid(NamespaceSpec::from_clauses(
            "a",
            [Clause::text("documentation", "x"), Clause::text("documentation", "y")],
        )));
        assert!(is_invalid(NamespaceSpec::from_clauses(
            "a",
            [Clause::names("size", ["10"])],
        )));
        assert!(is_invalid(NamespaceSpec::from_clauses(
            "a",
            [Clause::text("upgrade-mode", "medium")],
        )));
        assert!(is_invalid(NamespaceSpec::from_clauses(
            "a",
            [Clause::text("export", "x")],
        )));
    }

    #[test]
    fn hard_mode_parses() {
        let spec =
            NamespaceSpec::from_clauses("a", [Clause::text("upgrade-mode", "hard")]).unwrap();
        assert_eq!(spec.upgrade_mode, UpgradeMode::Hard);
    }

    #[test]
    fn toml_round_trip_of_fields() {
        let spec = NamespaceSpec::from_toml(
            r#"
            name = "pkg/alpha"
            aliases = ["alpha2"]
            use = ["pkg/base"]
            export = ["find"]
            upgrade-mode = "soft"

            [[import-from]]
            from = "pkg/util"
            names = ["helper"]
            "#,
        )
        .unwrap();
        assert_eq!(spec.name, "pkg/alpha");
        assert_eq!(spec.uses, vec!["pkg/base"]);
        assert_eq!(spec.import_from[0].names, vec!["helper"]);
    }

    #[test]
    fn toml_rejects_unknown_and_duplicate_fields() {
        assert!(is_invalid(NamespaceSpec::from_toml("name = \"a\"\nsize = 3\n")));
        assert!(is_invalid(NamespaceSpec::from_toml(
            "name = \"a\"\nexport = []\nexport = []\n"
        )));
        assert!(is_invalid(NamespaceSpec::from_toml(
            "name = \"a\"\nupgrade-mode = \"sideways\"\n"
        )));
    }

    #[test]
    fn spec_file_holds_many() {
        let specs = parse_spec_file(
            r#"
            [[namespace]]
            name = "a"
            export = ["x"]

            [[namespace]]
            name = "b"
            use = ["a"]
            "#,
        )
        .unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].referenced_namespaces(), vec![("use", "a")]);
    }
}
