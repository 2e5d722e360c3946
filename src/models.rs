// src/models.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// --- CONFIGURATION MODELS (What is read from config.json) ---

/// The full configuration tree as loaded from `config.json`.
///
/// Every section is optional so that a partial file still parses; structural
/// problems are reported by the `config_validator` instead of by serde.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct AliasConfig {
    #[serde(rename = "nxPackages", default)]
    pub nx_packages: BTreeMap<String, PackageEntry>,
    #[serde(default)]
    pub targets: Option<TargetsConfig>,
    #[serde(rename = "feature-nxTargets", default)]
    pub feature_nx_targets: BTreeMap<String, FeatureTarget>,
    #[serde(rename = "expandable-flags", default)]
    pub expandable_flags: BTreeMap<String, FlagDefinition>,
    #[serde(rename = "context-aware-flags", default)]
    pub context_aware_flags: BTreeMap<String, FlagDefinition>,
    #[serde(rename = "internal-flags", default)]
    pub internal_flags: BTreeMap<String, FlagDefinition>,
    #[serde(rename = "env-setting-flags", default)]
    pub env_setting_flags: BTreeMap<String, FlagDefinition>,
    #[serde(rename = "expandable-commands", default)]
    pub expandable_commands: BTreeMap<String, String>,
}

/// A value under `nxPackages`. Uses `untagged` for the three accepted shapes.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum PackageEntry {
    /// A structured package with aliases and build variants.
    Definition(PackageDefinition),
    /// `"alias": "some-project"`: the alias maps verbatim to a project name.
    Direct(String),
    /// A bucket of direct aliases, e.g. a `"tools"` section.
    Bucket(BTreeMap<String, String>),
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct PackageDefinition {
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub variants: BTreeMap<String, String>,
    #[serde(default)]
    pub default: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct TargetsConfig {
    #[serde(rename = "nx-targets", default)]
    pub nx_targets: Option<BTreeMap<String, String>>,
    #[serde(rename = "not-nx-target", default)]
    pub not_nx_target: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FeatureTarget {
    #[serde(rename = "run-target")]
    pub run_target: String,
    /// The variant a feature-level target runs against when the user typed a
    /// base alias rather than a variant alias.
    #[serde(rename = "run-from", default, skip_serializing_if = "Option::is_none")]
    pub run_from: Option<String>,
}

/// A flag entry in any of the four flag sections.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum FlagDefinition {
    Literal(String),
    Template(TemplateFlag),
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct TemplateFlag {
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub position: Option<TemplatePosition>,
    /// Default variable values, in declaration order. A value passed as
    /// `--flag=value` overrides the first entry.
    #[serde(default)]
    pub defaults: serde_json::Map<String, serde_json::Value>,
    #[serde(rename = "pwsh-template", default)]
    pub pwsh_template: Option<OneOrMany<PositionedTemplate>>,
    #[serde(rename = "linux-template", default)]
    pub linux_template: Option<OneOrMany<PositionedTemplate>>,
    #[serde(rename = "cmd-template", default)]
    pub cmd_template: Option<OneOrMany<PositionedTemplate>>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item.clone()],
            OneOrMany::Many(items) => items.clone(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PositionedTemplate {
    pub template: String,
    #[serde(default)]
    pub position: Option<TemplatePosition>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TemplatePosition {
    Start,
    Prefix,
    PreArgs,
    Suffix,
    End,
}

impl TemplatePosition {
    /// `start`, `prefix` and `pre-args` go before the base command.
    pub fn is_leading(self) -> bool {
        matches!(self, Self::Start | Self::Prefix | Self::PreArgs)
    }
}

// --- RESOLUTION MODELS (Derived values, recomputed per call) ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageResolution {
    pub package_name: String,
    pub alias: String,
    pub variant: Option<String>,
    pub full_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetTier {
    Feature,
    Nx,
    External,
    Unknown,
}

impl fmt::Display for TargetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TargetTier::Feature => "feature",
            TargetTier::Nx => "nx",
            TargetTier::External => "external",
            TargetTier::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub target: String,
    pub tier: TargetTier,
}

/// Ordered argv fragments to splice around a base command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateExpansion {
    pub start: Vec<String>,
    pub end: Vec<String>,
}

impl TemplateExpansion {
    pub fn extend(&mut self, other: TemplateExpansion) {
        self.start.extend(other.start);
        self.end.extend(other.end);
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_empty() && self.end.is_empty()
    }
}

// --- SHELL MODELS ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellType {
    Pwsh,
    Linux,
    Cmd,
    /// Nothing in the environment identified the shell.
    Unknown,
}

impl fmt::Display for ShellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ShellType::Pwsh => "pwsh",
            ShellType::Linux => "linux",
            ShellType::Cmd => "cmd",
            ShellType::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

// --- EXECUTION MODELS ---

/// Which variants a `run-many` fan-out covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunType {
    Ext,
    Core,
    All,
}

impl RunType {
    pub fn from_command(name: &str) -> Option<Self> {
        match name {
            "ext" => Some(Self::Ext),
            "core" => Some(Self::Core),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    /// The variant name selected by this run type, if it narrows to one.
    pub fn variant(self) -> Option<&'static str> {
        match self {
            Self::Ext => Some("ext"),
            Self::Core => Some("core"),
            Self::All => None,
        }
    }
}
