// src/cli/handlers/many.rs

use crate::cli::dispatcher::AppContext;
use crate::cli::handlers::run::take_target;
use crate::core::package_resolver::PackageResolutionService;
use crate::models::RunType;
use anyhow::{Result, anyhow};
use colored::*;

pub fn handle_ext(args: Vec<String>, ctx: &AppContext) -> Result<i32> {
    handle(RunType::Ext, args, ctx)
}

pub fn handle_core(args: Vec<String>, ctx: &AppContext) -> Result<i32> {
    handle(RunType::Core, args, ctx)
}

pub fn handle_all(args: Vec<String>, ctx: &AppContext) -> Result<i32> {
    handle(RunType::All, args, ctx)
}

/// `pae ext|core|all <target> [aliases...] [flags...]`.
///
/// Known aliases right after the target narrow the run to those packages;
/// without any, every matching package is covered.
fn handle(run_type: RunType, mut args: Vec<String>, ctx: &AppContext) -> Result<i32> {
    let target = take_target(&mut args).ok_or_else(|| {
        anyhow!(
            "A target is required. Usage: {}",
            "pae ext|core|all <target> [aliases...] [flags...]".bold()
        )
    })?;
    let (packages, flags) = split_packages(args, &ctx.packages);
    ctx.block_on(ctx.executor.run_many(run_type, &packages, &target, &flags))
}

/// Splits leading alias words from the flags that follow them.
fn split_packages(
    args: Vec<String>,
    packages: &PackageResolutionService,
) -> (Vec<String>, Vec<String>) {
    let count = args
        .iter()
        .take_while(|arg| packages.has_alias(arg))
        .count();
    let mut selected = args;
    let flags = selected.split_off(count);
    (selected, flags)
}
