// src/core/target_resolver.rs

//! # Target Resolution
//!
//! Turns a target shortcut (`b`, `l`, `tc`) into the concrete target name. Three
//! tiers are consulted, highest precedence first:
//!
//! 1. `feature-nxTargets[t].run-target`
//! 2. `targets.nx-targets[t]`
//! 3. `targets.not-nx-target[t]`
//!
//! Anything else passes through unchanged so raw Nx target names keep working.

use crate::models::{AliasConfig, FeatureTarget, ResolvedTarget, TargetTier};
use std::collections::BTreeMap;

/// Every configured shortcut, partitioned by tier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetCatalog {
    pub nx: BTreeMap<String, String>,
    pub external: BTreeMap<String, String>,
    pub feature: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct TargetResolutionService {
    feature: BTreeMap<String, FeatureTarget>,
    nx: Option<BTreeMap<String, String>>,
    external: Option<BTreeMap<String, String>>,
    has_targets_section: bool,
}

impl TargetResolutionService {
    pub fn new(config: &AliasConfig) -> Self {
        let (nx, external) = match &config.targets {
            Some(targets) => (targets.nx_targets.clone(), targets.not_nx_target.clone()),
            None => (None, None),
        };
        Self {
            feature: config.feature_nx_targets.clone(),
            nx,
            external,
            has_targets_section: config.targets.is_some(),
        }
    }

    /// Resolves a shortcut to its target string and tier.
    pub fn resolve(&self, target: &str) -> ResolvedTarget {
        if let Some(feature) = self.feature.get(target) {
            return ResolvedTarget {
                target: feature.run_target.clone(),
                tier: TargetTier::Feature,
            };
        }
        if let Some(resolved) = self.nx.as_ref().and_then(|map| map.get(target)) {
            return ResolvedTarget {
                target: resolved.clone(),
                tier: TargetTier::Nx,
            };
        }
        if let Some(resolved) = self.external.as_ref().and_then(|map| map.get(target)) {
            return ResolvedTarget {
                target: resolved.clone(),
                tier: TargetTier::External,
            };
        }
        log::debug!("Target '{}' is not a shortcut; passing it through.", target);
        ResolvedTarget {
            target: target.to_string(),
            tier: TargetTier::Unknown,
        }
    }

    pub fn resolve_target(&self, target: &str) -> String {
        self.resolve(target).target
    }

    pub fn has_target(&self, target: &str) -> bool {
        self.get_target_type(target) != TargetTier::Unknown
    }

    pub fn get_target_type(&self, target: &str) -> TargetTier {
        self.resolve(target).tier
    }

    /// The `run-from` variant of a feature-tier target, if one is declared.
    pub fn feature_run_from(&self, target: &str) -> Option<&str> {
        self.feature
            .get(target)
            .and_then(|feature| feature.run_from.as_deref())
    }

    pub fn get_all_targets(&self) -> TargetCatalog {
        TargetCatalog {
            nx: self.nx.clone().unwrap_or_default(),
            external: self.external.clone().unwrap_or_default(),
            feature: self
                .feature
                .iter()
                .map(|(shortcut, feature)| (shortcut.clone(), feature.run_target.clone()))
                .collect(),
        }
    }

    /// Returns every structural problem in the `targets` section.
    pub fn validate_target_structure(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !self.has_targets_section {
            return errors;
        }

        let (Some(nx), Some(external)) = (&self.nx, &self.external) else {
            if self.nx.is_none() && self.external.is_none() {
                errors.push(
                    "The 'targets' section must define 'nx-targets' or 'not-nx-target'.".to_string(),
                );
            }
            return errors;
        };

        for shortcut in nx.keys().filter(|key| external.contains_key(*key)) {
            errors.push(format!(
                "Target shortcut '{}' is defined in both 'nx-targets' and 'not-nx-target'.",
                shortcut
            ));
        }
        errors
    }
}
