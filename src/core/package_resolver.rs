// src/core/package_resolver.rs

//! # Package Resolution
//!
//! Maps the aliases a developer types (`dc`, `dce`, `aka`) to package
//! identities. The two lookup maps are built once from `nxPackages` when the
//! service is constructed; resolving is a pure lookup afterwards.

use crate::constants::PACKAGE_SCOPE;
use crate::models::{AliasConfig, PackageDefinition, PackageEntry, PackageResolution, RunType};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Unknown alias '{0}'. Run `pae help` to list the configured aliases.")]
    UnknownAlias(String),
    #[error("Package '{package}' has no variant named '{variant}'.")]
    UnknownVariant { package: String, variant: String },
}

/// What an alias points at inside the index.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AliasTarget {
    /// An alias of a structured package, keyed by package name.
    Package(String),
    /// A direct alias to an opaque project name.
    Direct(String),
}

#[derive(Debug, Clone)]
pub struct PackageResolutionService {
    package_map: BTreeMap<String, PackageDefinition>,
    alias_map: HashMap<String, AliasTarget>,
    /// Aliases claimed by more than one package, recorded at construction.
    duplicate_aliases: Vec<(String, String, String)>,
}

impl PackageResolutionService {
    pub fn new(config: &AliasConfig) -> Self {
        let mut package_map = BTreeMap::new();
        let mut alias_map = HashMap::new();
        let mut duplicate_aliases = Vec::new();

        let mut register = |alias: &str, target: AliasTarget, owner: &str| {
            if let Some(existing) = alias_map.get(alias) {
                let existing_owner = match existing {
                    AliasTarget::Package(name) | AliasTarget::Direct(name) => name.clone(),
                };
                if existing != &target {
                    duplicate_aliases.push((alias.to_string(), existing_owner, owner.to_string()));
                }
                return;
            }
            alias_map.insert(alias.to_string(), target);
        };

        for (key, entry) in &config.nx_packages {
            match entry {
                PackageEntry::Definition(definition) => {
                    for alias in &definition.aliases {
                        register(alias, AliasTarget::Package(key.clone()), key);
                    }
                    for variant_alias in definition.variants.values() {
                        register(variant_alias, AliasTarget::Package(key.clone()), key);
                    }
                    package_map.insert(key.clone(), definition.clone());
                }
                PackageEntry::Direct(project) => {
                    register(key, AliasTarget::Direct(project.clone()), project);
                }
                PackageEntry::Bucket(bucket) => {
                    for (alias, project) in bucket {
                        register(alias, AliasTarget::Direct(project.clone()), project);
                    }
                }
            }
        }

        log::debug!(
            "Package index built: {} packages, {} aliases.",
            package_map.len(),
            alias_map.len()
        );

        Self {
            package_map,
            alias_map,
            duplicate_aliases,
        }
    }

    /// Resolves an alias to its package identity.
    ///
    /// A variant alias selects that variant; a base alias selects the
    /// package's `default` variant. Direct aliases resolve verbatim.
    pub fn resolve_package(&self, alias: &str) -> Result<PackageResolution, ResolveError> {
        match self.alias_map.get(alias) {
            Some(AliasTarget::Direct(project)) => Ok(PackageResolution {
                package_name: project.clone(),
                alias: alias.to_string(),
                variant: None,
                full_name: project.clone(),
            }),
            Some(AliasTarget::Package(package_name)) => {
                let definition = self
                    .package_map
                    .get(package_name)
                    .ok_or_else(|| ResolveError::UnknownAlias(alias.to_string()))?;

                let variant = definition
                    .variants
                    .iter()
                    .find(|(_, variant_alias)| variant_alias.as_str() == alias)
                    .map(|(name, _)| name.clone())
                    .or_else(|| {
                        (!definition.default.is_empty()).then(|| definition.default.clone())
                    });

                Ok(build_resolution(package_name, alias, variant))
            }
            None => Err(ResolveError::UnknownAlias(alias.to_string())),
        }
    }

    /// Resolves an alias and forces a specific variant on structured packages.
    pub fn resolve_with_variant(
        &self,
        alias: &str,
        variant: &str,
    ) -> Result<PackageResolution, ResolveError> {
        let resolution = self.resolve_package(alias)?;
        let Some(definition) = self.package_map.get(&resolution.package_name) else {
            // Direct aliases have no variants; they resolve as-is.
            return Ok(resolution);
        };
        if !definition.variants.contains_key(variant) {
            return Err(ResolveError::UnknownVariant {
                package: resolution.package_name,
                variant: variant.to_string(),
            });
        }
        Ok(build_resolution(
            &resolution.package_name,
            alias,
            Some(variant.to_string()),
        ))
    }

    /// Lists the resolutions a `run-many` of the given type covers.
    ///
    /// `core`/`ext` pick every structured package that declares that variant;
    /// `all` picks every variant of every package plus the direct aliases.
    pub fn packages_for_run_type(&self, run_type: RunType) -> Vec<PackageResolution> {
        let mut resolutions = Vec::new();
        for (package_name, definition) in &self.package_map {
            for (variant, variant_alias) in &definition.variants {
                let selected = match run_type.variant() {
                    Some(wanted) => wanted == variant,
                    None => true,
                };
                if selected {
                    resolutions.push(build_resolution(
                        package_name,
                        variant_alias,
                        Some(variant.clone()),
                    ));
                }
            }
        }

        if run_type == RunType::All {
            let mut direct: Vec<_> = self
                .alias_map
                .iter()
                .filter_map(|(alias, target)| match target {
                    AliasTarget::Direct(project) => Some((alias, project)),
                    AliasTarget::Package(_) => None,
                })
                .collect();
            direct.sort();
            for (alias, project) in direct {
                resolutions.push(PackageResolution {
                    package_name: project.clone(),
                    alias: alias.clone(),
                    variant: None,
                    full_name: project.clone(),
                });
            }
        }
        resolutions
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        self.alias_map.contains_key(alias)
    }

    /// Whether `alias` is listed in a package's `aliases` (as opposed to being
    /// only a variant alias or a direct alias).
    pub fn is_base_alias(&self, alias: &str) -> bool {
        match self.alias_map.get(alias) {
            Some(AliasTarget::Package(name)) => self
                .package_map
                .get(name)
                .is_some_and(|definition| definition.aliases.iter().any(|a| a == alias)),
            Some(AliasTarget::Direct(_)) | None => false,
        }
    }

    /// All known aliases, sorted.
    pub fn aliases(&self) -> Vec<&str> {
        let mut aliases: Vec<&str> = self.alias_map.keys().map(String::as_str).collect();
        aliases.sort_unstable();
        aliases
    }

    pub fn package_names(&self) -> Vec<&str> {
        self.package_map.keys().map(String::as_str).collect()
    }

    /// Checks every structured package and returns all problems found.
    pub fn validate_package_structure(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (name, definition) in &self.package_map {
            if definition.aliases.is_empty() {
                errors.push(format!(
                    "Package '{}' must declare at least one alias in 'aliases'.",
                    name
                ));
            }
            if definition.variants.is_empty() {
                errors.push(format!(
                    "Package '{}' must declare at least one entry in 'variants'.",
                    name
                ));
            } else if !definition.default.is_empty()
                && !definition.variants.contains_key(&definition.default)
            {
                errors.push(format!(
                    "Package '{}' has default variant '{}', which is not declared in 'variants'.",
                    name, definition.default
                ));
            }
        }

        for (alias, first, second) in &self.duplicate_aliases {
            errors.push(format!(
                "Alias '{}' is claimed by both '{}' and '{}'.",
                alias, first, second
            ));
        }

        errors
    }
}

fn build_resolution(package_name: &str, alias: &str, variant: Option<String>) -> PackageResolution {
    let full_name = match &variant {
        Some(variant) => format!("{}/{}-{}", PACKAGE_SCOPE, package_name, variant),
        None => format!("{}/{}", PACKAGE_SCOPE, package_name),
    };
    PackageResolution {
        package_name: package_name.to_string(),
        alias: alias.to_string(),
        variant,
        full_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(raw: &str) -> AliasConfig {
        serde_json::from_str(raw).unwrap()
    }

    fn sample_config() -> AliasConfig {
        config_from(
            r#"{
                "nxPackages": {
                    "dc": { "aliases": ["dc"], "variants": { "core": "dc", "ext": "dce" }, "default": "core" },
                    "gw": { "aliases": ["gw", "ghost"], "variants": { "core": "gwc", "ext": "gwe" }, "default": "ext" },
                    "aka": "@fux/aka-tool",
                    "tools": { "mh": "@fux/mockly", "sb": "storybook-host" }
                }
            }"#,
        )
    }

    #[test]
    fn test_variant_alias_selects_variant() {
        let service = PackageResolutionService::new(&sample_config());
        let resolution = service.resolve_package("dce").unwrap();

        assert_eq!(resolution.package_name, "dc");
        assert_eq!(resolution.variant.as_deref(), Some("ext"));
        assert_eq!(resolution.full_name, "@fux/dc-ext");
    }

    #[test]
    fn test_every_variant_alias_maps_to_its_package() {
        let config = sample_config();
        let service = PackageResolutionService::new(&config);
        for (package, entry) in &config.nx_packages {
            if let PackageEntry::Definition(definition) = entry {
                for (variant, alias) in &definition.variants {
                    let resolution = service.resolve_package(alias).unwrap();
                    assert_eq!(&resolution.package_name, package);
                    assert_eq!(resolution.variant.as_ref(), Some(variant));
                }
            }
        }
    }

    #[test]
    fn test_base_alias_uses_default_variant() {
        let service = PackageResolutionService::new(&sample_config());
        let resolution = service.resolve_package("ghost").unwrap();

        assert_eq!(resolution.package_name, "gw");
        assert_eq!(resolution.variant.as_deref(), Some("ext"));
        assert_eq!(resolution.full_name, "@fux/gw-ext");
    }

    #[test]
    fn test_is_base_alias() {
        let service = PackageResolutionService::new(&sample_config());
        assert!(service.is_base_alias("dc"));
        assert!(service.is_base_alias("ghost"));
        assert!(!service.is_base_alias("gwe"));
        assert!(!service.is_base_alias("aka"));
        assert!(!service.is_base_alias("nope"));
    }

    #[test]
    fn test_direct_and_bucket_aliases_resolve_verbatim() {
        let service = PackageResolutionService::new(&sample_config());

        let direct = service.resolve_package("aka").unwrap();
        assert_eq!(direct.full_name, "@fux/aka-tool");
        assert_eq!(direct.variant, None);

        let bucket = service.resolve_package("sb").unwrap();
        assert_eq!(bucket.full_name, "storybook-host");
        assert_eq!(bucket.package_name, "storybook-host");
    }

    #[test]
    fn test_unknown_alias_is_an_error() {
        let service = PackageResolutionService::new(&sample_config());
        assert_eq!(
            service.resolve_package("nope"),
            Err(ResolveError::UnknownAlias("nope".to_string()))
        );
    }

    #[test]
    fn test_resolve_with_variant_forces_suffix() {
        let service = PackageResolutionService::new(&sample_config());
        let resolution = service.resolve_with_variant("dc", "ext").unwrap();
        assert_eq!(resolution.full_name, "@fux/dc-ext");

        assert!(matches!(
            service.resolve_with_variant("dc", "web"),
            Err(ResolveError::UnknownVariant { .. })
        ));
    }

    #[test]
    fn test_packages_for_run_type() {
        let service = PackageResolutionService::new(&sample_config());

        let core: Vec<String> = service
            .packages_for_run_type(RunType::Core)
            .into_iter()
            .map(|r| r.full_name)
            .collect();
        assert_eq!(core, vec!["@fux/dc-core", "@fux/gw-core"]);

        let all = service.packages_for_run_type(RunType::All);
        assert_eq!(all.len(), 7);
    }

    #[test]
    fn test_validate_package_structure_collects_every_problem() {
        let config = config_from(
            r#"{
                "nxPackages": {
                    "empty": { "aliases": [], "variants": {}, "default": "" },
                    "bad-default": { "aliases": ["bd"], "variants": { "core": "bdc" }, "default": "ext" },
                    "dup": { "aliases": ["bd"], "variants": { "core": "dupc" }, "default": "core" }
                }
            }"#,
        );
        let service = PackageResolutionService::new(&config);
        let errors = service.validate_package_structure();

        assert_eq!(errors.len(), 4, "{:#?}", errors);
        assert!(errors.iter().any(|e| e.contains("'empty'") && e.contains("alias")));
        assert!(errors.iter().any(|e| e.contains("'empty'") && e.contains("variants")));
        assert!(errors.iter().any(|e| e.contains("default variant 'ext'")));
        assert!(errors.iter().any(|e| e.contains("Alias 'bd'")));
    }
}
