// src/core/flag_expander.rs

//! # Flag Expansion
//!
//! Expands the short flags a developer types into argv fragments placed before
//! (`start`) or after (`end`) the base command.
//!
//! The four flag sections of the config (`expandable-flags`,
//! `context-aware-flags`, `env-setting-flags`, `internal-flags`) are
//! normalized once, when the service is built, into `NormalizedFlag` values.
//! Expansion then never has to look at the raw config shapes again.
//!
//! ## Lookup
//!
//! A token is matched against the table by its key (`-f`, `--fix`,
//! `--sto=5`). A single-dash token that is not itself a key is treated as a
//! bundle of single-character flags (`-fs` = `-f -s`) when every character is
//! known. Anything unrecognized is passed through literally; this layer does
//! not validate flags against Nx.

use crate::core::arg_parser::{parse_expandable_flag, split_passthrough};
use crate::core::interpolator;
use crate::models::{
    AliasConfig, FlagDefinition, PackageResolution, PositionedTemplate, ShellType,
    TemplateExpansion, TemplatePosition,
};
use crate::system::shell::ShellDetector;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagKind {
    Expandable,
    ContextAware,
    EnvSetting,
    Internal,
}

impl FlagKind {
    /// Where a template lands when neither it nor its flag names a position.
    fn default_position(self) -> TemplatePosition {
        match self {
            FlagKind::EnvSetting => TemplatePosition::Start,
            FlagKind::Expandable | FlagKind::ContextAware | FlagKind::Internal => {
                TemplatePosition::End
            }
        }
    }

    pub fn section_name(self) -> &'static str {
        match self {
            FlagKind::Expandable => "expandable-flags",
            FlagKind::ContextAware => "context-aware-flags",
            FlagKind::EnvSetting => "env-setting-flags",
            FlagKind::Internal => "internal-flags",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTemplate {
    pub template: String,
    pub position: TemplatePosition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedFlag {
    pub key: String,
    pub kind: FlagKind,
    pub default_templates: Vec<NormalizedTemplate>,
    pub shell_templates: HashMap<ShellType, Vec<NormalizedTemplate>>,
    /// Default variables in declaration order.
    pub defaults: Vec<(String, String)>,
}

impl NormalizedFlag {
    fn from_definition(key: &str, kind: FlagKind, definition: &FlagDefinition) -> Self {
        match definition {
            FlagDefinition::Literal(text) => Self {
                key: key.to_string(),
                kind,
                default_templates: vec![NormalizedTemplate {
                    template: text.clone(),
                    position: kind.default_position(),
                }],
                shell_templates: HashMap::new(),
                defaults: Vec::new(),
            },
            FlagDefinition::Template(template_def) => {
                let fallback = template_def.position.unwrap_or_else(|| kind.default_position());
                let normalize = |templates: Vec<PositionedTemplate>| -> Vec<NormalizedTemplate> {
                    templates
                        .into_iter()
                        .map(|t| NormalizedTemplate {
                            template: t.template,
                            position: t.position.unwrap_or(fallback),
                        })
                        .collect()
                };

                let mut shell_templates = HashMap::new();
                for (shell, variant) in [
                    (ShellType::Pwsh, &template_def.pwsh_template),
                    (ShellType::Linux, &template_def.linux_template),
                    (ShellType::Cmd, &template_def.cmd_template),
                ] {
                    if let Some(variant) = variant {
                        shell_templates.insert(shell, normalize(variant.to_vec()));
                    }
                }

                let default_templates = template_def
                    .template
                    .iter()
                    .map(|template| NormalizedTemplate {
                        template: template.clone(),
                        position: fallback,
                    })
                    .collect();

                let defaults = template_def
                    .defaults
                    .iter()
                    .map(|(name, value)| {
                        let value = match value {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (name.clone(), value)
                    })
                    .collect();

                Self {
                    key: key.to_string(),
                    kind,
                    default_templates,
                    shell_templates,
                    defaults,
                }
            }
        }
    }

    /// Whether the flag consumes a value (`--flag=value` or `--flag value`).
    pub fn takes_value(&self) -> bool {
        !self.defaults.is_empty()
    }
}

/// Variables describing the invocation a flag is expanded for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionContext {
    pub alias: Option<String>,
    pub package: Option<String>,
    pub project: Option<String>,
    pub variant: Option<String>,
    pub target: Option<String>,
}

impl ExpansionContext {
    pub fn for_invocation(resolution: &PackageResolution, target: &str) -> Self {
        Self {
            alias: Some(resolution.alias.clone()),
            package: Some(resolution.package_name.clone()),
            project: Some(resolution.full_name.clone()),
            variant: resolution.variant.clone(),
            target: Some(target.to_string()),
        }
    }

    fn variables(&self) -> BTreeMap<String, String> {
        [
            ("alias", &self.alias),
            ("package", &self.package),
            ("project", &self.project),
            ("variant", &self.variant),
            ("target", &self.target),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_ref().map(|v| (name.to_string(), v.clone())))
        .collect()
    }
}

/// The combined result of expanding an argument list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagExpansion {
    pub start: Vec<String>,
    pub end: Vec<String>,
    /// Every variable set while expanding, for reporting; later flags override
    /// earlier ones. Each flag renders only against its own variables.
    pub variables: BTreeMap<String, String>,
    /// Tokens that were not recognized, in their original order.
    pub passthrough: Vec<String>,
    /// Internal switches (without leading dashes) such as `pae-echo`.
    pub internal: Vec<String>,
    /// Keys of the flags that were expanded, in order.
    pub applied: Vec<String>,
}

impl FlagExpansion {
    pub fn has_internal(&self, name: &str) -> bool {
        self.internal.iter().any(|flag| flag == name)
    }
}

#[derive(Debug, Clone)]
pub struct ExpandableProcessorService {
    flags: HashMap<String, NormalizedFlag>,
    shell: Arc<ShellDetector>,
}

impl ExpandableProcessorService {
    pub fn new(config: &AliasConfig, shell: Arc<ShellDetector>) -> Self {
        let mut flags = HashMap::new();

        // Later sections take precedence when the same key appears twice.
        let sections = [
            (FlagKind::Expandable, &config.expandable_flags),
            (FlagKind::ContextAware, &config.context_aware_flags),
            (FlagKind::EnvSetting, &config.env_setting_flags),
            (FlagKind::Internal, &config.internal_flags),
        ];
        for (kind, section) in sections {
            for (key, definition) in section {
                let flag = NormalizedFlag::from_definition(key, kind, definition);
                if let Some(previous) = flags.insert(key.clone(), flag) {
                    log::debug!(
                        "Flag '{}' from '{}' is shadowed by '{}'.",
                        key,
                        previous.kind.section_name(),
                        kind.section_name()
                    );
                }
            }
        }

        Self { flags, shell }
    }

    pub fn flag(&self, key: &str) -> Option<&NormalizedFlag> {
        self.flags.get(key)
    }

    /// All flags, sorted by key.
    pub fn flags(&self) -> Vec<&NormalizedFlag> {
        let mut flags: Vec<_> = self.flags.values().collect();
        flags.sort_by(|a, b| a.key.cmp(&b.key));
        flags
    }

    pub fn shell_detector(&self) -> &Arc<ShellDetector> {
        &self.shell
    }

    /// Expands every recognized flag in `args`.
    pub fn expand_flags(&self, args: &[String], context: &ExpansionContext) -> FlagExpansion {
        let (head, tail) = split_passthrough(args);
        let mut expansion = FlagExpansion::default();
        let mut tokens = head.iter().peekable();

        while let Some(arg) = tokens.next() {
            let Some(parsed) = parse_expandable_flag(arg) else {
                expansion.passthrough.push(arg.clone());
                continue;
            };

            if let Some(flag) = self.flags.get(&parsed.key) {
                let mut value = parsed.value;
                if value.is_none() && flag.takes_value() {
                    value = tokens
                        .next_if(|next| !next.starts_with('-'))
                        .map(|next| next.to_string());
                }
                let mut scope = BTreeMap::new();
                self.apply_flag(flag, value.as_deref(), context, &mut scope, &mut expansion);
                continue;
            }

            if parsed.bundle_candidate && parsed.value.is_none() {
                if let Some(bundle) = self.bundle_members(&parsed.key) {
                    log::debug!("Expanding bundled flag '{}'.", arg);
                    // Members of one bundle share variables, left to right.
                    let mut scope = BTreeMap::new();
                    for flag in bundle {
                        self.apply_flag(flag, None, context, &mut scope, &mut expansion);
                    }
                    continue;
                }
            }

            log::debug!("Flag '{}' is not configured; passing it through.", arg);
            expansion.passthrough.push(arg.clone());
        }

        if !tail.is_empty() {
            expansion.passthrough.push("--".to_string());
            expansion.passthrough.extend(tail.iter().cloned());
        }
        expansion
    }

    /// Every character of `key` as a single-character flag, in order, or
    /// `None` if any character is unknown.
    fn bundle_members(&self, key: &str) -> Option<Vec<&NormalizedFlag>> {
        key.chars()
            .map(|c| self.flags.get(&c.to_string()))
            .collect()
    }

    /// Renders one flag against `scope`, which holds only the variables of
    /// the current flag or bundle.
    fn apply_flag(
        &self,
        flag: &NormalizedFlag,
        value: Option<&str>,
        context: &ExpansionContext,
        scope: &mut BTreeMap<String, String>,
        expansion: &mut FlagExpansion,
    ) {
        if flag.kind == FlagKind::ContextAware {
            scope.extend(context.variables());
        }
        for (name, default) in &flag.defaults {
            scope.insert(name.clone(), default.clone());
        }
        if let Some(value) = value {
            if let Some((first, _)) = flag.defaults.first() {
                scope.insert(first.clone(), value.to_string());
            }
            scope.insert("value".to_string(), value.to_string());
        }

        let rendered = self.process_shell_specific_template(flag, scope);
        expansion
            .variables
            .extend(scope.iter().map(|(k, v)| (k.clone(), v.clone())));
        expansion.applied.push(flag.key.clone());

        if flag.kind == FlagKind::Internal {
            let mut names: Vec<String> = rendered
                .start
                .into_iter()
                .chain(rendered.end)
                .map(|s| s.trim_start_matches('-').to_string())
                .collect();
            if names.is_empty() {
                names.push(flag.key.clone());
            }
            expansion.internal.extend(names);
            return;
        }

        expansion.start.extend(rendered.start);
        expansion.end.extend(rendered.end);
    }

    /// Renders a list of positioned templates, bucketing each result into
    /// `start` or `end`. Templates that render empty are dropped.
    pub fn process_template_array(
        &self,
        templates: &[NormalizedTemplate],
        variables: &BTreeMap<String, String>,
    ) -> TemplateExpansion {
        let mut expansion = TemplateExpansion::default();
        for template in templates {
            let rendered = interpolator::render(&template.template, variables);
            let rendered = rendered.trim();
            if rendered.is_empty() {
                continue;
            }
            if template.position.is_leading() {
                expansion.start.push(rendered.to_string());
            } else {
                expansion.end.push(rendered.to_string());
            }
        }
        expansion
    }

    /// Renders the template variant registered for the detected shell, or the
    /// default variant when the shell has none.
    pub fn process_shell_specific_template(
        &self,
        flag: &NormalizedFlag,
        variables: &BTreeMap<String, String>,
    ) -> TemplateExpansion {
        let shell = self.shell.detect_shell_type_cached();
        let templates = flag
            .shell_templates
            .get(&shell)
            .unwrap_or(&flag.default_templates);
        self.process_template_array(templates, variables)
    }
}

/// Splices start and end fragments around a base command: `[...start, ...base,
/// ...end]`. Empty tokens are omitted.
pub fn construct_wrapped_command(
    base: &[String],
    start_templates: &[String],
    end_templates: &[String],
) -> Vec<String> {
    start_templates
        .iter()
        .chain(base)
        .chain(end_templates)
        .filter(|token| !token.trim().is_empty())
        .cloned()
        .collect()
}
