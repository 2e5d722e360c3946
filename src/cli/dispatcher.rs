// src/cli/dispatcher.rs

use crate::cli::handlers;
use crate::core::command_execution::{CommandError, CommandExecutionService};
use crate::core::config_loader::LoadedConfig;
use crate::core::config_validator::{ConfigurationValidator, ValidationReport};
use crate::core::flag_expander::ExpandableProcessorService;
use crate::core::package_resolver::PackageResolutionService;
use crate::core::settings::Settings;
use crate::core::target_resolver::TargetResolutionService;
use crate::models::AliasConfig;
use crate::system::process_pool::ProcessPool;
use crate::system::shell::ShellDetector;
use anyhow::{Context, Result, anyhow};
use colored::*;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Runtime;

/// Returned when the user interrupts a running command with Ctrl+C.
#[derive(Error, Debug)]
#[error("Interrupted by user.")]
pub struct Interrupted;

/// Everything a handler needs, constructed once per process.
pub struct AppContext {
    pub config: Arc<AliasConfig>,
    pub config_path: PathBuf,
    pub settings: Settings,
    pub packages: Arc<PackageResolutionService>,
    pub targets: Arc<TargetResolutionService>,
    pub expander: Arc<ExpandableProcessorService>,
    pub executor: CommandExecutionService,
    pub report: ValidationReport,
    runtime: Runtime,
}

impl AppContext {
    pub fn new(loaded: LoadedConfig, settings: Settings) -> Result<Self> {
        let config = Arc::new(loaded.config);
        let report = ConfigurationValidator.validate(&config);

        let shell = Arc::new(ShellDetector::from_process_env());
        let packages = Arc::new(PackageResolutionService::new(&config));
        let targets = Arc::new(TargetResolutionService::new(&config));
        let expander = Arc::new(ExpandableProcessorService::new(&config, shell));
        let pool = Arc::new(ProcessPool::new(settings.pool_size));
        let executor = CommandExecutionService::new(
            Arc::clone(&config),
            Arc::clone(&packages),
            Arc::clone(&targets),
            Arc::clone(&expander),
            pool,
            settings.clone(),
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to start the async runtime")?;

        Ok(Self {
            config,
            config_path: loaded.path,
            settings,
            packages,
            targets,
            expander,
            executor,
            report,
            runtime,
        })
    }

    /// Drives an execution future to completion. Ctrl+C aborts the wait with
    /// [`Interrupted`]; the children receive the signal themselves.
    pub fn block_on<F>(&self, future: F) -> Result<i32>
    where
        F: Future<Output = Result<i32, CommandError>>,
    {
        self.runtime.block_on(async {
            tokio::select! {
                result = future => result.map_err(anyhow::Error::from),
                _ = tokio::signal::ctrl_c() => Err(anyhow::Error::new(Interrupted)),
            }
        })
    }

    /// Waits for queued and running commands, then releases the pool.
    pub fn shutdown(&self) {
        self.runtime.block_on(self.executor.shutdown_process_pool());
    }
}

// --- Command Definition and Registry ---

/// A built-in command, its aliases, and its handler.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    /// Built-ins that still run when the configuration has errors.
    runs_on_invalid_config: bool,
    handler: fn(Vec<String>, &AppContext) -> Result<i32>,
}

/// The single source of truth for built-in commands. Anything else is looked
/// up as an expandable command, then as a package alias.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "help",
        aliases: &["h"],
        runs_on_invalid_config: true,
        handler: handlers::help::handle,
    },
    CommandDefinition {
        name: "validate",
        aliases: &[],
        runs_on_invalid_config: true,
        handler: handlers::validate::handle,
    },
    CommandDefinition {
        name: "ext",
        aliases: &[],
        runs_on_invalid_config: false,
        handler: handlers::many::handle_ext,
    },
    CommandDefinition {
        name: "core",
        aliases: &[],
        runs_on_invalid_config: false,
        handler: handlers::many::handle_core,
    },
    CommandDefinition {
        name: "all",
        aliases: &[],
        runs_on_invalid_config: false,
        handler: handlers::many::handle_all,
    },
];

/// Finds a built-in command by its name or alias.
fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

/// What the first CLI word refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Builtin(&'static str),
    ExpandableCommand,
    Alias,
    Unknown,
}

/// Classifies the first word. Built-ins win, then expandable commands, then
/// package aliases; the validator guarantees the last two never collide.
pub fn route(word: &str, config: &AliasConfig, packages: &PackageResolutionService) -> Route {
    if let Some(command) = find_command(word) {
        Route::Builtin(command.name)
    } else if config.expandable_commands.contains_key(word) {
        Route::ExpandableCommand
    } else if packages.has_alias(word) {
        Route::Alias
    } else {
        Route::Unknown
    }
}

/// Routes the CLI words to a handler and returns the process exit code.
pub fn dispatch(mut args: Vec<String>, ctx: &AppContext) -> Result<i32> {
    log::debug!("Dispatching: {:?}", args);
    if args.is_empty() {
        return handlers::help::handle(args, ctx);
    }
    let first = args.remove(0);
    let route = route(&first, &ctx.config, &ctx.packages);

    let builtin = match route {
        Route::Builtin(name) => find_command(name),
        Route::ExpandableCommand | Route::Alias | Route::Unknown => None,
    };

    // An invalid configuration is never executed.
    let allowed_when_invalid = builtin.is_some_and(|cmd| cmd.runs_on_invalid_config);
    if !ctx.report.is_valid && !allowed_when_invalid {
        handlers::validate::print_errors(&ctx.report, &ctx.config_path);
        return Ok(1);
    }

    match route {
        Route::Builtin(_) => match builtin {
            Some(command) => (command.handler)(args, ctx),
            None => Err(anyhow!("Internal error: unregistered command '{}'.", first)),
        },
        Route::ExpandableCommand => handlers::run::handle_command(&first, args, ctx),
        Route::Alias => handlers::run::handle_alias(&first, args, ctx),
        Route::Unknown => Err(anyhow!(
            "'{}' is neither a command nor a configured alias. Run {} to list them.",
            first.cyan(),
            "pae help".bold()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AliasConfig {
        serde_json::from_str(
            r#"{
                "nxPackages": {
                    "dc": { "aliases": ["dc"], "variants": { "core": "dc", "ext": "dce" }, "default": "core" }
                },
                "expandable-commands": { "build-all": "nx run-many -t build" }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_route_precedence() {
        let config = config();
        let packages = PackageResolutionService::new(&config);

        assert_eq!(route("help", &config, &packages), Route::Builtin("help"));
        assert_eq!(route("h", &config, &packages), Route::Builtin("help"));
        assert_eq!(route("core", &config, &packages), Route::Builtin("core"));
        assert_eq!(route("build-all", &config, &packages), Route::ExpandableCommand);
        assert_eq!(route("dce", &config, &packages), Route::Alias);
        assert_eq!(route("nope", &config, &packages), Route::Unknown);
    }

    #[test]
    fn test_registry_names_are_unique() {
        let mut names: Vec<&str> = COMMAND_REGISTRY
            .iter()
            .flat_map(|cmd| std::iter::once(cmd.name).chain(cmd.aliases.iter().copied()))
            .collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
