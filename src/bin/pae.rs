// src/bin/pae.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use pae::cli::Cli;
use pae::cli::dispatcher::{self, AppContext, Interrupted};
use pae::core::config_loader::ConfigLoader;
use pae::core::settings::Settings;
use pae::system::shell::ProcessEnv;
use std::env;

/// The main entry point of `pae`.
/// It sets up logging, loads the configuration, dispatches to the correct
/// handler, and performs centralized error handling.
fn main() {
    let mut cli = Cli::parse();
    let debug = cli.take_debug_switch();
    // Logging comes first so that warnings about ignored settings are shown.
    init_logging(debug || Settings::debug_requested(&ProcessEnv));
    let settings = Settings::from_env();

    match run_cli(cli, settings) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            // --- Centralized Error Handling ---
            if e.downcast_ref::<Interrupted>().is_some() {
                // Exit like a shell would after Ctrl+C.
                std::process::exit(130);
            }
            eprintln!("\n{}: {:#}", "Error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// `RUST_LOG` wins when set; otherwise warnings only, or debug output for
/// this crate when debugging was requested.
fn init_logging(debug: bool) {
    let default_filter = if debug { "warn,pae=debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn run_cli(cli: Cli, settings: Settings) -> Result<i32> {
    log::debug!("CLI args parsed: {:?}", cli);
    log::debug!("Settings: {:?}", settings);

    let working_dir = env::current_dir().context("Could not read the current directory")?;
    let loaded = ConfigLoader::new(working_dir, settings.config_path.clone()).load()?;
    let ctx = AppContext::new(loaded, settings)?;

    let result = dispatcher::dispatch(cli.args, &ctx);
    ctx.shutdown();
    result
}
