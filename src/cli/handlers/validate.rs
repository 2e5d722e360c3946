// src/cli/handlers/validate.rs

use crate::cli::dispatcher::AppContext;
use crate::core::config_validator::ValidationReport;
use anyhow::Result;
use colored::*;
use std::path::Path;

/// The handler for `pae validate`. Exits 1 when the configuration has errors.
pub fn handle(_args: Vec<String>, ctx: &AppContext) -> Result<i32> {
    if ctx.report.is_valid {
        println!(
            "{} Configuration '{}' is valid.",
            "✓".green(),
            ctx.config_path.display()
        );
        return Ok(0);
    }
    print_errors(&ctx.report, &ctx.config_path);
    Ok(1)
}

/// Prints every validation error, in red, to stderr.
pub fn print_errors(report: &ValidationReport, config_path: &Path) {
    eprintln!(
        "{} {}",
        "Invalid configuration:".red().bold(),
        config_path.display()
    );
    for error in &report.errors {
        eprintln!("  {} {}", "✗".red(), error.red());
    }
}
