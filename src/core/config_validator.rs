// src/core/config_validator.rs

//! # Configuration Validator
//!
//! Cross-checks the whole configuration before any resolution is trusted. All
//! checks run and every problem is reported; nothing short-circuits. A config
//! with errors must not be executed.

use crate::core::package_resolver::PackageResolutionService;
use crate::core::target_resolver::TargetResolutionService;
use crate::models::{AliasConfig, FlagDefinition};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

lazy_static! {
    // Matches a double brace first so that a lone `{` is only reported when it
    // is not part of a `{{` pair.
    static ref BRACE_RE: Regex = Regex::new(r"\{\{|\{").expect("brace pattern is valid");
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigurationValidator;

impl ConfigurationValidator {
    pub fn validate(&self, config: &AliasConfig) -> ValidationReport {
        let packages = PackageResolutionService::new(config);
        let targets = TargetResolutionService::new(config);

        let mut errors = Vec::new();
        errors.extend(check_command_alias_collisions(config, &packages));
        errors.extend(packages.validate_package_structure());
        errors.extend(targets.validate_target_structure());
        errors.extend(check_template_syntax(config));

        if errors.is_empty() {
            log::debug!("Configuration passed validation.");
        } else {
            log::debug!("Configuration has {} problem(s).", errors.len());
        }

        ValidationReport {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

fn check_command_alias_collisions(
    config: &AliasConfig,
    packages: &PackageResolutionService,
) -> Vec<String> {
    config
        .expandable_commands
        .keys()
        .filter(|name| packages.has_alias(name))
        .map(|name| {
            format!(
                "'{}' is both an expandable command and a package alias; the CLI cannot tell them apart.",
                name
            )
        })
        .collect()
}

fn check_template_syntax(config: &AliasConfig) -> Vec<String> {
    let sections: [(&str, &BTreeMap<String, FlagDefinition>); 4] = [
        ("expandable-flags", &config.expandable_flags),
        ("context-aware-flags", &config.context_aware_flags),
        ("internal-flags", &config.internal_flags),
        ("env-setting-flags", &config.env_setting_flags),
    ];

    let mut errors = Vec::new();
    for (section, flags) in sections {
        for (key, definition) in flags {
            for template in definition_templates(definition) {
                if uses_single_brace(template) {
                    errors.push(format!(
                        "{}.{}: template '{}' uses deprecated single-brace syntax; use '{{{{name}}}}'.",
                        section, key, template
                    ));
                }
            }
        }
    }
    errors
}

/// Every template string a flag definition carries.
fn definition_templates(definition: &FlagDefinition) -> Vec<&str> {
    match definition {
        FlagDefinition::Literal(text) => vec![text.as_str()],
        FlagDefinition::Template(template_def) => {
            let mut templates: Vec<&str> =
                template_def.template.iter().map(String::as_str).collect();
            let variants = [
                &template_def.pwsh_template,
                &template_def.linux_template,
                &template_def.cmd_template,
            ];
            for variant in variants.into_iter().flatten() {
                match variant {
                    crate::models::OneOrMany::One(t) => templates.push(&t.template),
                    crate::models::OneOrMany::Many(ts) => {
                        templates.extend(ts.iter().map(|t| t.template.as_str()));
                    }
                }
            }
            templates
        }
    }
}

fn uses_single_brace(template: &str) -> bool {
    BRACE_RE.find_iter(template).any(|m| m.as_str() == "{")
}
