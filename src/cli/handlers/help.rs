// src/cli/handlers/help.rs

use crate::cli::dispatcher::AppContext;
use crate::core::flag_expander::NormalizedFlag;
use anyhow::Result;
use colored::*;
use std::collections::BTreeMap;

/// The handler for `pae help`: usage plus everything the loaded config defines.
pub fn handle(_args: Vec<String>, ctx: &AppContext) -> Result<i32> {
    print_usage();
    println!("  {:<15} {}", "config".blue(), ctx.config_path.display());

    print_aliases(ctx);
    print_targets(ctx);
    print_flags(ctx);
    print_commands(ctx);

    if !ctx.report.is_valid {
        println!(
            "\n{}",
            format!(
                "The configuration has {} problem(s). Run `pae validate` for details.",
                ctx.report.errors.len()
            )
            .red()
        );
    }
    println!("\n---------------------------------");
    Ok(0)
}

const USAGE: &[(&str, &str)] = &[
    ("pae <alias> <target> [flags...]", "Run a target for one package"),
    ("pae <alias>", "Show what an alias resolves to"),
    (
        "pae ext|core|all <target> [aliases...] [flags...]",
        "Run a target across packages",
    ),
    ("pae <command> [args...]", "Run an expandable command"),
    ("pae validate", "Check the configuration"),
    ("pae -d ...", "Enable debug logging"),
];

fn print_usage() {
    println!("\n--- {} ---", "pae".yellow().bold());
    for (usage, description) in USAGE {
        println!("  {:<50} {}", usage.cyan(), description.dimmed());
    }
    println!();
}

fn print_aliases(ctx: &AppContext) {
    println!("\n{}", "Aliases:".green().bold());
    let aliases = ctx.packages.aliases();
    if aliases.is_empty() {
        println!("  {}", "(none)".dimmed());
        return;
    }
    for alias in aliases {
        match ctx.packages.resolve_package(alias) {
            Ok(resolution) => println!("  {:<15} {}", alias.cyan(), resolution.full_name),
            Err(e) => println!("  {:<15} {}", alias.cyan(), e.to_string().red()),
        }
    }
}

pub(crate) fn print_targets(ctx: &AppContext) {
    let catalog = ctx.targets.get_all_targets();
    println!("\n{}", "Targets:".green().bold());
    if catalog.feature.is_empty() && catalog.nx.is_empty() && catalog.external.is_empty() {
        println!("  {}", "(none)".dimmed());
        return;
    }
    print_target_group("feature", &catalog.feature);
    print_target_group("nx", &catalog.nx);
    print_target_group("external", &catalog.external);
}

fn print_target_group(tier: &str, targets: &BTreeMap<String, String>) {
    for (shortcut, target) in targets {
        println!(
            "  {:<15} {} {}",
            shortcut.cyan(),
            target,
            format!("[{}]", tier).dimmed()
        );
    }
}

fn print_flags(ctx: &AppContext) {
    println!("\n{}", "Flags:".green().bold());
    let flags = ctx.expander.flags();
    if flags.is_empty() {
        println!("  {}", "(none)".dimmed());
        return;
    }
    for flag in flags {
        println!(
            "  {:<15} {} {}",
            flag_label(flag).cyan(),
            describe_flag(flag),
            format!("[{}]", flag.kind.section_name()).dimmed()
        );
    }
}

fn flag_label(flag: &NormalizedFlag) -> String {
    if flag.key.chars().count() == 1 {
        format!("-{}", flag.key)
    } else {
        format!("--{}", flag.key)
    }
}

fn describe_flag(flag: &NormalizedFlag) -> String {
    let mut description = flag
        .default_templates
        .iter()
        .map(|t| t.template.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    if description.is_empty() && !flag.shell_templates.is_empty() {
        description = "(shell-specific)".to_string();
    }
    if !flag.defaults.is_empty() {
        let defaults = flag
            .defaults
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join(", ");
        description.push_str(&format!(" (defaults: {})", defaults));
    }
    description
}

fn print_commands(ctx: &AppContext) {
    if ctx.config.expandable_commands.is_empty() {
        return;
    }
    println!("\n{}", "Commands:".green().bold());
    for (name, line) in &ctx.config.expandable_commands {
        println!("  {:<15} {}", name.cyan(), line);
    }
}
