// src/cli/handlers/run.rs

use crate::cli::dispatcher::AppContext;
use crate::cli::handlers::help;
use crate::models::PackageResolution;
use anyhow::Result;
use colored::*;

/// `pae <alias> [target] [flags...]`. Without a target, shows what the alias
/// resolves to and which targets are available.
pub fn handle_alias(alias: &str, mut args: Vec<String>, ctx: &AppContext) -> Result<i32> {
    let Some(target) = take_target(&mut args) else {
        if !args.is_empty() {
            log::warn!("Ignoring flags without a target: {}", args.join(" "));
        }
        return describe_alias(alias, ctx);
    };
    ctx.block_on(ctx.executor.run_alias(alias, &target, &args))
}

fn describe_alias(alias: &str, ctx: &AppContext) -> Result<i32> {
    let resolution = ctx.packages.resolve_package(alias)?;
    println!("\n--- {} {} ---", "Alias".yellow().bold(), alias.cyan());
    for (label, value) in alias_details(&resolution) {
        println!("  {:<15} {}", label.blue(), value);
    }
    help::print_targets(ctx);
    println!(
        "\nUsage: {}",
        format!("pae {} <target> [flags...]", alias).bold()
    );
    Ok(0)
}

fn alias_details(resolution: &PackageResolution) -> Vec<(&'static str, String)> {
    vec![
        ("package", resolution.package_name.clone()),
        (
            "variant",
            resolution
                .variant
                .clone()
                .unwrap_or_else(|| "(none)".to_string()),
        ),
        ("project", resolution.full_name.clone()),
    ]
}

/// `pae <expandable-command> [args...]`.
pub fn handle_command(name: &str, args: Vec<String>, ctx: &AppContext) -> Result<i32> {
    ctx.block_on(ctx.executor.run_expandable_command(name, &args))
}

/// Removes and returns the first word if it is a target rather than a flag.
pub(crate) fn take_target(args: &mut Vec<String>) -> Option<String> {
    match args.first() {
        Some(first) if !first.starts_with('-') => Some(args.remove(0)),
        _ => None,
    }
}
