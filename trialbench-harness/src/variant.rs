//! Variants and the Capability Table
//!
//! A [`CapabilityTable`] maps each toggleable capability to the workspace
//! artifact that implements it and to the way that artifact is neutralised
//! when the capability is disabled. A [`VariantConfig`] is a name plus the
//! set of capabilities it keeps enabled.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Script written in place of a disabled executable
pub const NOOP_SCRIPT: &str = "#!/bin/sh\nexit 0\n";

/// Name of the variant with every capability enabled
pub const FULL_VARIANT: &str = "full";

/// Name of the variant with every capability disabled
pub const MINIMAL_VARIANT: &str = "minimal";

/// Errors in variant or capability declarations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VariantError {
    #[error("invalid name '{0}': use letters, digits, '-' or '_'")]
    InvalidName(String),

    #[error("capability '{0}' is declared more than once")]
    DuplicateCapability(String),

    #[error("capability '{capability}' path '{path}' must be relative and stay inside the workspace")]
    InvalidPath { capability: String, path: String },

    #[error("variant '{variant}' enables unknown capability '{capability}'")]
    UnknownCapability { variant: String, capability: String },
}

/// How a disabled capability's artifact is replaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Neutralization {
    /// Executable shell script that exits 0 (mode 0755)
    NoopExecutable,
    /// Document with the given literal content, e.g. an empty registry
    EmptyDocument { content: String },
}

impl Neutralization {
    /// Bytes written for the neutralised artifact
    pub fn contents(&self) -> &[u8] {
        match self {
            Neutralization::NoopExecutable => NOOP_SCRIPT.as_bytes(),
            Neutralization::EmptyDocument { content } => content.as_bytes(),
        }
    }

    pub fn is_executable(&self) -> bool {
        matches!(self, Neutralization::NoopExecutable)
    }
}

/// One toggleable capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub name: String,
    /// Artifact path relative to the workspace root
    pub path: PathBuf,
    pub neutralization: Neutralization,
}

impl Capability {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        neutralization: Neutralization,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            neutralization,
        }
    }
}

/// Explicit capability → artifact mapping handed to a provisioner.
///
/// Entries keep their declaration order; neutralisation is applied in that
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityTable {
    entries: Vec<Capability>,
}

impl CapabilityTable {
    /// Build a table, rejecting duplicate names and paths that escape the workspace
    pub fn new(entries: Vec<Capability>) -> Result<Self, VariantError> {
        let mut seen = BTreeSet::new();
        for entry in &entries {
            validate_name(&entry.name)?;
            if !seen.insert(entry.name.as_str()) {
                return Err(VariantError::DuplicateCapability(entry.name.clone()));
            }
            if !is_contained(&entry.path) {
                return Err(VariantError::InvalidPath {
                    capability: entry.name.clone(),
                    path: entry.path.display().to_string(),
                });
            }
        }
        Ok(Self { entries })
    }

    /// Checkpoint hook, agent registry and skill catalog
    pub fn standard() -> Self {
        Self {
            entries: vec![
                Capability::new(
                    "checkpoint_logging",
                    "hooks/checkpoint.sh",
                    Neutralization::NoopExecutable,
                ),
                Capability::new(
                    "agent_registry",
                    "agents/registry.json",
                    Neutralization::EmptyDocument {
                        content: "{\"agents\": []}\n".to_string(),
                    },
                ),
                Capability::new(
                    "skill_catalog",
                    "skills/catalog.json",
                    Neutralization::EmptyDocument {
                        content: "{\"skills\": []}\n".to_string(),
                    },
                ),
            ],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.entries.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.entries.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Capability names in declaration order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reject variants that enable capabilities this table does not know
    pub fn validate(&self, variant: &VariantConfig) -> Result<(), VariantError> {
        for capability in &variant.enabled {
            if !self.contains(capability) {
                return Err(VariantError::UnknownCapability {
                    variant: variant.name.clone(),
                    capability: capability.clone(),
                });
            }
        }
        Ok(())
    }

    /// `full`, `minimal`, and one `no_<capability>` per entry
    pub fn ablation_variants(&self) -> Vec<VariantConfig> {
        let mut variants = vec![VariantConfig::full(self), VariantConfig::minimal()];
        for removed in &self.entries {
            variants.push(VariantConfig {
                name: format!("no_{}", removed.name),
                enabled: self
                    .entries
                    .iter()
                    .filter(|c| c.name != removed.name)
                    .map(|c| c.name.clone())
                    .collect(),
            });
        }
        variants
    }
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// A named capability profile. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantConfig {
    name: String,
    enabled: BTreeSet<String>,
}

impl VariantConfig {
    pub fn new<I, S>(name: impl Into<String>, enabled: I) -> Result<Self, VariantError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            enabled: enabled.into_iter().map(Into::into).collect(),
        })
    }

    /// Every capability in `table` enabled
    pub fn full(table: &CapabilityTable) -> Self {
        Self {
            name: FULL_VARIANT.to_string(),
            enabled: table.entries.iter().map(|c| c.name.clone()).collect(),
        }
    }

    /// Every capability disabled
    pub fn minimal() -> Self {
        Self {
            name: MINIMAL_VARIANT.to_string(),
            enabled: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self, capability: &str) -> bool {
        self.enabled.contains(capability)
    }

    /// Enabled capabilities, sorted
    pub fn enabled(&self) -> impl Iterator<Item = &str> {
        self.enabled.iter().map(String::as_str)
    }
}

fn validate_name(name: &str) -> Result<(), VariantError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(VariantError::InvalidName(name.to_string()))
    }
}

fn is_contained(path: &Path) -> bool {
    path.components().next().is_some()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table() {
        let table = CapabilityTable::standard();
        assert_eq!(
            table.names(),
            vec!["checkpoint_logging", "agent_registry", "skill_catalog"]
        );
        assert!(
            table
                .get("checkpoint_logging")
                .unwrap()
                .neutralization
                .is_executable()
        );
        assert_eq!(
            table.get("agent_registry").unwrap().neutralization.contents(),
            b"{\"agents\": []}\n"
        );
    }

    #[test]
    fn test_full_and_minimal() {
        let table = CapabilityTable::standard();
        let full = VariantConfig::full(&table);
        let minimal = VariantConfig::minimal();

        assert_eq!(full.name(), "full");
        assert!(table.names().iter().all(|c| full.is_enabled(c)));
        assert_eq!(minimal.enabled().count(), 0);
        assert!(table.validate(&full).is_ok());
        assert!(table.validate(&minimal).is_ok());
    }

    #[test]
    fn test_ablation_variants() {
        let table = CapabilityTable::standard();
        let variants = table.ablation_variants();
        let names: Vec<_> = variants.iter().map(|v| v.name()).collect();

        assert_eq!(
            names,
            vec![
                "full",
                "minimal",
                "no_checkpoint_logging",
                "no_agent_registry",
                "no_skill_catalog"
            ]
        );
        let no_checkpoint = &variants[2];
        assert!(!no_checkpoint.is_enabled("checkpoint_logging"));
        assert!(no_checkpoint.is_enabled("agent_registry"));
        assert!(no_checkpoint.is_enabled("skill_catalog"));
    }

    #[test]
    fn test_table_rejects_bad_entries() {
        let dup = CapabilityTable::new(vec![
            Capability::new("a", "a.sh", Neutralization::NoopExecutable),
            Capability::new("a", "b.sh", Neutralization::NoopExecutable),
        ]);
        assert_eq!(dup, Err(VariantError::DuplicateCapability("a".to_string())));

        let escaping = CapabilityTable::new(vec![Capability::new(
            "a",
            "../outside.sh",
            Neutralization::NoopExecutable,
        )]);
        assert!(matches!(escaping, Err(VariantError::InvalidPath { .. })));

        let absolute = CapabilityTable::new(vec![Capability::new(
            "a",
            "/etc/passwd",
            Neutralization::NoopExecutable,
        )]);
        assert!(matches!(absolute, Err(VariantError::InvalidPath { .. })));
    }

    #[test]
    fn test_variant_validation() {
        assert!(VariantConfig::new("bad name", Vec::<String>::new()).is_err());
        assert!(VariantConfig::new("", Vec::<String>::new()).is_err());

        let table = CapabilityTable::standard();
        let variant = VariantConfig::new("custom", ["telemetry"]).unwrap();
        assert_eq!(
            table.validate(&variant),
            Err(VariantError::UnknownCapability {
                variant: "custom".to_string(),
                capability: "telemetry".to_string(),
            })
        );
    }
}
