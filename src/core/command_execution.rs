// src/core/command_execution.rs

//! # Command Execution
//!
//! Turns a resolved alias into the final program, argv and environment, then
//! runs it through the process pool.
//!
//! ## Invocation assembly
//!
//! `start` fragments produced by flag expansion must precede the base
//! command. Fragments that are plain environment assignments (`NAME=value`,
//! `$env:NAME='value';`, `set NAME=value &&`) are lifted into the child's
//! environment, and the command is spawned directly. Any other `start`
//! fragment needs a shell to interpret it, so the whole line is handed to the
//! detected shell (`pwsh -NoProfile -Command`, `sh -c` or `cmd /C`).

use crate::constants::{INTERNAL_DEBUG, INTERNAL_ECHO};
use crate::core::flag_expander::{
    ExpandableProcessorService, ExpansionContext, FlagExpansion, construct_wrapped_command,
};
use crate::core::package_resolver::{PackageResolutionService, ResolveError};
use crate::core::settings::Settings;
use crate::core::target_resolver::TargetResolutionService;
use crate::models::{AliasConfig, PackageResolution, RunType, ShellType, TargetTier};
use crate::system::executor::{
    self, ChildProcessTracker, ExecutionError, ExecutionOptions, ExecutionResult,
};
use crate::system::process_pool::{ProcessMetrics, ProcessPool};
use colored::*;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;

lazy_static! {
    static ref PWSH_ASSIGNMENT_RE: Regex =
        Regex::new(r"^\$env:([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.*?)\s*;?\s*$")
            .expect("pwsh assignment pattern is valid");
    static ref CMD_ASSIGNMENT_RE: Regex =
        Regex::new(r#"^(?i:set)\s+"?([A-Za-z_][A-Za-z0-9_]*)=([^"&]*)"?\s*(?:&&?)?\s*$"#)
            .expect("cmd assignment pattern is valid");
    static ref POSIX_NAME_RE: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("variable name pattern is valid");
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("Unknown expandable command '{0}'.")]
    UnknownCommand(String),
    #[error("The command line for '{0}' is empty or could not be parsed.")]
    InvalidCommandLine(String),
}

/// The fully assembled process to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment for the child, in the order it was declared.
    pub env: Vec<(String, String)>,
}

impl Invocation {
    /// A copy-pasteable rendering: `NAME=value program args...`.
    pub fn display(&self) -> String {
        let mut parts: Vec<String> = self
            .env
            .iter()
            .map(|(name, value)| {
                let value = shlex::try_quote(value)
                    .map(|quoted| quoted.into_owned())
                    .unwrap_or_else(|_| value.clone());
                format!("{}={}", name, value)
            })
            .collect();
        parts.push(executor::display_command(&self.program, &self.args));
        parts.join(" ")
    }

    fn options(&self, capture_output: bool) -> ExecutionOptions {
        ExecutionOptions {
            capture_output,
            cwd: None,
            env: self.env.clone(),
        }
    }
}

/// One fully planned invocation, ready to run or echo.
#[derive(Debug, Clone)]
struct PlannedCommand {
    label: String,
    invocation: Invocation,
    echo: bool,
    debug: bool,
}

pub struct CommandExecutionService {
    config: Arc<AliasConfig>,
    packages: Arc<PackageResolutionService>,
    targets: Arc<TargetResolutionService>,
    expander: Arc<ExpandableProcessorService>,
    pool: Arc<ProcessPool>,
    settings: Settings,
}

impl CommandExecutionService {
    pub fn new(
        config: Arc<AliasConfig>,
        packages: Arc<PackageResolutionService>,
        targets: Arc<TargetResolutionService>,
        expander: Arc<ExpandableProcessorService>,
        pool: Arc<ProcessPool>,
        settings: Settings,
    ) -> Self {
        Self {
            config,
            packages,
            targets,
            expander,
            pool,
            settings,
        }
    }

    /// Runs a command with inherited stdio and returns its exit code.
    pub async fn run_command(&self, command: &str, args: &[String]) -> Result<i32, ExecutionError> {
        let invocation = Invocation {
            program: command.to_string(),
            args: args.to_vec(),
            env: Vec::new(),
        };
        self.run_invocation(&invocation).await
    }

    pub async fn execute_with_pool(
        &self,
        command: &str,
        args: &[String],
        options: &ExecutionOptions,
    ) -> Result<ExecutionResult, ExecutionError> {
        self.pool.submit(command, args, options).await
    }

    /// `pae <alias> <target> [flags...]`.
    pub async fn run_alias(
        &self,
        alias: &str,
        target: &str,
        flags: &[String],
    ) -> Result<i32, CommandError> {
        let planned = self.plan_alias(alias, target, flags)?;
        self.run_planned(&planned).await
    }

    /// `pae <expandable-command> [args...]`. Flags in `args` are expanded;
    /// everything else is appended to the configured command line.
    pub async fn run_expandable_command(
        &self,
        name: &str,
        args: &[String],
    ) -> Result<i32, CommandError> {
        let line = self
            .config
            .expandable_commands
            .get(name)
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))?;
        let base = shlex::split(line)
            .filter(|parts| !parts.is_empty())
            .ok_or_else(|| CommandError::InvalidCommandLine(name.to_string()))?;

        let expansion = self.expander.expand_flags(args, &ExpansionContext::default());
        let planned = PlannedCommand {
            label: name.to_string(),
            invocation: self.build_invocation(&base, &expansion)?,
            echo: self.settings.echo || expansion.has_internal(INTERNAL_ECHO),
            debug: expansion.has_internal(INTERNAL_DEBUG),
        };
        self.run_planned(&planned).await
    }

    /// Runs `target` for many packages at once through the pool.
    ///
    /// With no explicit `packages`, every package matching `run_type` is
    /// covered. Every invocation runs to completion; the aggregate exit code is
    /// 1 when any of them failed.
    pub async fn run_many(
        &self,
        run_type: RunType,
        packages: &[String],
        target: &str,
        flags: &[String],
    ) -> Result<i32, CommandError> {
        let resolutions = if packages.is_empty() {
            self.packages.packages_for_run_type(run_type)
        } else {
            packages
                .iter()
                .map(|alias| match run_type.variant() {
                    Some(variant) => self.packages.resolve_with_variant(alias, variant),
                    None => self.packages.resolve_package(alias),
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        if resolutions.is_empty() {
            println!(
                "{}",
                format!(
                    "No packages match '{}'. Nothing to run.",
                    run_type.variant().unwrap_or("all")
                )
                .yellow()
            );
            return Ok(0);
        }

        let plans = resolutions
            .into_iter()
            .map(|resolution| self.plan_for(resolution, target, flags))
            .collect::<Result<Vec<_>, _>>()?;

        if plans.iter().any(|plan| plan.echo) {
            for plan in &plans {
                println!("{}", plan.invocation.display());
            }
            return Ok(0);
        }

        println!(
            "{}",
            format!("┌─ Running '{}' for {} packages...", target, plans.len()).dimmed()
        );
        let mut handles = Vec::with_capacity(plans.len());
        for plan in plans {
            println!("{} {}", "├─>".dimmed(), plan.invocation.display().green());
            let pool = Arc::clone(&self.pool);
            let label = plan.label.clone();
            handles.push((
                label,
                tokio::spawn(async move {
                    let options = plan.invocation.options(true);
                    pool.submit(&plan.invocation.program, &plan.invocation.args, &options)
                        .await
                }),
            ));
        }

        let total = handles.len();
        let mut failures = Vec::new();
        for (label, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    eprintln!("{} {}: {}", "✗".red(), label.bold(), join_error);
                    failures.push(label);
                    continue;
                }
            };
            match outcome {
                Ok(result) => {
                    print_result(&label, &result);
                    if !result.success() {
                        failures.push(label);
                    }
                }
                Err(e) => {
                    eprintln!("{} {}: {}", "✗".red(), label.bold(), e);
                    failures.push(label);
                }
            }
        }

        if failures.is_empty() {
            println!(
                "{}",
                format!("└─ All {} packages succeeded.", total).dimmed()
            );
            Ok(0)
        } else {
            println!(
                "{} {}",
                format!("└─ {} of {} packages failed:", failures.len(), total).red(),
                failures.join(", ").bold()
            );
            Ok(1)
        }
    }

    /// Assembles the final program, argv and environment for `base` wrapped
    /// by `expansion`.
    pub fn build_invocation(
        &self,
        base: &[String],
        expansion: &FlagExpansion,
    ) -> Result<Invocation, ExecutionError> {
        let mut end = Vec::new();
        for fragment in &expansion.end {
            end.extend(split_fragment(fragment));
        }
        let mut command = construct_wrapped_command(base, &[], &end);
        command.extend(expansion.passthrough.iter().cloned());

        let shell = self.expander.shell_detector().detect_shell_type_cached();
        assemble_invocation(shell, &expansion.start, command)
    }

    pub fn get_process_metrics(&self) -> ProcessMetrics {
        self.pool.metrics()
    }

    pub async fn shutdown_process_pool(&self) {
        self.pool.shutdown().await;
    }

    pub fn set_child_process_tracker(&self, tracker: Arc<dyn ChildProcessTracker>) {
        self.pool.set_child_process_tracker(tracker);
    }

    // --- Planning ---

    fn plan_alias(
        &self,
        alias: &str,
        target: &str,
        flags: &[String],
    ) -> Result<PlannedCommand, CommandError> {
        let mut resolution = self.packages.resolve_package(alias)?;

        // A feature target may pin the variant it runs against, unless the
        // user already picked one by typing a variant alias.
        if self.targets.get_target_type(target) == TargetTier::Feature
            && self.packages.is_base_alias(alias)
        {
            if let Some(run_from) = self.targets.feature_run_from(target) {
                resolution = self.packages.resolve_with_variant(alias, run_from)?;
            }
        }
        self.plan_for(resolution, target, flags)
    }

    fn plan_for(
        &self,
        resolution: PackageResolution,
        target: &str,
        flags: &[String],
    ) -> Result<PlannedCommand, CommandError> {
        let resolved = self.targets.resolve(target);
        log::debug!(
            "'{}' -> {} | '{}' -> '{}' ({})",
            resolution.alias,
            resolution.full_name,
            target,
            resolved.target,
            resolved.tier
        );

        let base = match resolved.tier {
            TargetTier::External => shlex::split(&resolved.target)
                .filter(|parts| !parts.is_empty())
                .ok_or_else(|| CommandError::InvalidCommandLine(target.to_string()))?,
            TargetTier::Feature | TargetTier::Nx | TargetTier::Unknown => {
                let mut base = self.settings.nx_command.clone();
                base.push("run".to_string());
                base.push(format!("{}:{}", resolution.full_name, resolved.target));
                base
            }
        };

        let context = ExpansionContext::for_invocation(&resolution, &resolved.target);
        let expansion = self.expander.expand_flags(flags, &context);

        Ok(PlannedCommand {
            label: resolution.full_name,
            invocation: self.build_invocation(&base, &expansion)?,
            echo: self.settings.echo || expansion.has_internal(INTERNAL_ECHO),
            debug: expansion.has_internal(INTERNAL_DEBUG),
        })
    }

    async fn run_planned(&self, planned: &PlannedCommand) -> Result<i32, CommandError> {
        let rendered = planned.invocation.display();
        if planned.echo {
            println!("{}", rendered);
            return Ok(0);
        }
        if planned.debug {
            eprintln!(
                "{} {} (shell: {}, nx task: {})",
                "[pae]".dimmed(),
                planned.label,
                self.expander.shell_detector().detect_shell_type_cached(),
                self.expander.shell_detector().is_nx_task_context()
            );
        }
        println!("{} {}", "→".blue(), rendered.green());
        Ok(self.run_invocation(&planned.invocation).await?)
    }

    async fn run_invocation(&self, invocation: &Invocation) -> Result<i32, ExecutionError> {
        let result = self
            .pool
            .submit(&invocation.program, &invocation.args, &invocation.options(false))
            .await?;
        Ok(result.exit_code)
    }
}

/// Builds the invocation for an already wrapped `command` and its leading
/// fragments.
pub fn assemble_invocation(
    shell: ShellType,
    start: &[String],
    command: Vec<String>,
) -> Result<Invocation, ExecutionError> {
    let mut env = Vec::new();
    let mut prefix = Vec::new();
    for fragment in start {
        match parse_env_assignment(fragment) {
            Some(assignment) => env.push(assignment),
            None => prefix.push(fragment.trim().to_string()),
        }
    }

    if prefix.is_empty() {
        let mut tokens = command.into_iter();
        let program = tokens.next().ok_or(ExecutionError::EmptyCommand)?;
        return Ok(Invocation {
            program,
            args: tokens.collect(),
            env,
        });
    }

    if command.is_empty() {
        return Err(ExecutionError::EmptyCommand);
    }
    let quoted = quote_for_shell(shell, &command)?;
    let script = format!("{} {}", prefix.join(" "), quoted);

    let (program, leading) = shell_wrapper(shell);
    let mut args: Vec<String> = leading.iter().map(|arg| arg.to_string()).collect();
    args.push(script);
    Ok(Invocation {
        program: program.to_string(),
        args,
        env,
    })
}

/// Joins `command` into one script line using the quoting rules of the
/// shell that will run it.
fn quote_for_shell(shell: ShellType, command: &[String]) -> Result<String, ExecutionError> {
    if command.iter().any(|arg| arg.contains('\0')) {
        return Err(ExecutionError::CommandParse(
            "command contains a nul byte".to_string(),
        ));
    }
    let shell = match shell {
        ShellType::Unknown if cfg!(target_os = "windows") => ShellType::Cmd,
        ShellType::Unknown => ShellType::Linux,
        other => other,
    };
    match shell {
        ShellType::Cmd => Ok(command
            .iter()
            .map(String::as_str)
            .map(quote_cmd)
            .collect::<Vec<_>>()
            .join(" ")),
        ShellType::Pwsh => {
            let mut words = command.iter().map(String::as_str).map(quote_pwsh);
            let Some(program) = words.next() else {
                return Ok(String::new());
            };
            // A quoted program is a string to pwsh unless it is invoked with `&`.
            let program = if program.starts_with('\'') {
                format!("& {}", program)
            } else {
                program
            };
            Ok(std::iter::once(program)
                .chain(words)
                .collect::<Vec<_>>()
                .join(" "))
        }
        _ => shlex::try_join(command.iter().map(String::as_str))
            .map_err(|e| ExecutionError::CommandParse(e.to_string())),
    }
}

/// Double-quotes an argument for `cmd /C` when it holds whitespace or a
/// cmd metacharacter. Embedded quotes are escaped for the child's parser.
fn quote_cmd(arg: &str) -> String {
    let needs_quotes = arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || "&|<>^()\"%!".contains(c));
    if needs_quotes {
        format!("\"{}\"", arg.replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

/// Single-quotes an argument for pwsh when it holds whitespace or a pwsh
/// metacharacter. Embedded single quotes are doubled.
fn quote_pwsh(arg: &str) -> String {
    let needs_quotes = arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || "$`;&|(){}@,'\"<>#".contains(c));
    if needs_quotes {
        format!("'{}'", arg.replace('\'', "''"))
    } else {
        arg.to_string()
    }
}

/// The interpreter and leading arguments used to run a script line.
fn shell_wrapper(shell: ShellType) -> (&'static str, &'static [&'static str]) {
    match shell {
        ShellType::Pwsh => ("pwsh", &["-NoProfile", "-Command"]),
        ShellType::Linux => ("sh", &["-c"]),
        ShellType::Cmd => ("cmd", &["/C"]),
        ShellType::Unknown if cfg!(target_os = "windows") => ("cmd", &["/C"]),
        ShellType::Unknown => ("sh", &["-c"]),
    }
}

/// Recognizes a leading fragment that only sets an environment variable.
fn parse_env_assignment(fragment: &str) -> Option<(String, String)> {
    let fragment = fragment.trim();

    if let Some(caps) = PWSH_ASSIGNMENT_RE.captures(fragment) {
        let name = caps.get(1)?.as_str().to_string();
        let value = unquote(caps.get(2)?.as_str());
        return Some((name, value));
    }
    if let Some(caps) = CMD_ASSIGNMENT_RE.captures(fragment) {
        let name = caps.get(1)?.as_str().to_string();
        let value = caps.get(2)?.as_str().trim_end().to_string();
        return Some((name, value));
    }

    // POSIX: exactly one word of the form NAME=value.
    let words = shlex::split(fragment)?;
    let [word] = words.as_slice() else {
        return None;
    };
    let (name, value) = word.split_once('=')?;
    POSIX_NAME_RE
        .is_match(name)
        .then(|| (name.to_string(), value.to_string()))
}

fn unquote(value: &str) -> String {
    for quote in ['\'', '"'] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.to_string();
        }
    }
    value.to_string()
}

/// A trailing fragment such as `--a --b=1` becomes separate argv words.
fn split_fragment(fragment: &str) -> Vec<String> {
    if !fragment.contains(char::is_whitespace) {
        return vec![fragment.to_string()];
    }
    shlex::split(fragment)
        .filter(|words| !words.is_empty())
        .unwrap_or_else(|| vec![fragment.to_string()])
}

fn print_result(label: &str, result: &ExecutionResult) {
    if result.success() {
        println!(
            "{} {} {}",
            "✓".green(),
            label.bold(),
            format!("({:.1?})", result.duration).dimmed()
        );
    } else {
        println!(
            "{} {} {}",
            "✗".red(),
            label.bold(),
            format!("(exit code {})", result.exit_code).red()
        );
    }
    if !result.stdout.trim().is_empty() {
        print!("{}", result.stdout);
        if !result.stdout.ends_with('\n') {
            println!();
        }
    }
    if !result.success() && !result.stderr.is_empty() {
        eprint!("{}", result.stderr);
        if !result.stderr.ends_with('\n') {
            eprintln!();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::shell::ShellDetector;
    use std::collections::HashMap;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    const CONFIG: &str = r#"{
        "nxPackages": {
            "dc": { "aliases": ["dc"], "variants": { "core": "dc", "ext": "dce" }, "default": "core" },
            "gw": { "aliases": ["gw"], "variants": { "core": "gwc", "ext": "gwe" }, "default": "ext" },
            "aka": "@fux/aka-tool"
        },
        "targets": {
            "nx-targets": { "b": "build", "l": "lint" },
            "not-nx-target": { "hi": "sh -c 'exit 4'" }
        },
        "feature-nxTargets": {
            "tsc": { "run-target": "check-types", "run-from": "ext" }
        },
        "expandable-flags": {
            "f": "--fix",
            "s": "--skip-nx-cache",
            "c": { "template": "--configuration={{config}}", "defaults": { "config": "dev" } }
        },
        "context-aware-flags": {
            "p": { "template": "--projects={{project}}" }
        },
        "env-setting-flags": {
            "sto": { "template": "PAE_TIMEOUT={{duration}}", "defaults": { "duration": "30" } },
            "pre": { "template": "cd . &&" }
        },
        "internal-flags": {
            "echo": "--pae-echo",
            "pae-debug": "--pae-debug"
        },
        "expandable-commands": {
            "greet": "sh -c 'exit 7'"
        }
    }"#;

    fn service_with(nx_command: &[&str], shell_env: &[(&str, &str)]) -> CommandExecutionService {
        let config: AliasConfig = serde_json::from_str(CONFIG).unwrap();
        let env: HashMap<String, String> = shell_env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let shell = Arc::new(ShellDetector::new(Box::new(env)));
        let settings = Settings {
            nx_command: strings(nx_command),
            pool_size: 2,
            ..Settings::default()
        };
        CommandExecutionService::new(
            Arc::new(config.clone()),
            Arc::new(PackageResolutionService::new(&config)),
            Arc::new(TargetResolutionService::new(&config)),
            Arc::new(ExpandableProcessorService::new(&config, shell)),
            Arc::new(ProcessPool::new(settings.pool_size)),
            settings,
        )
    }

    fn service() -> CommandExecutionService {
        service_with(&["npx", "nx"], &[("SHELL", "/bin/bash")])
    }

    #[test]
    fn test_plan_alias_builds_nx_run() {
        let planned = service()
            .plan_alias("dce", "b", &strings(&["-f"]))
            .unwrap();
        assert_eq!(planned.label, "@fux/dc-ext");
        assert_eq!(planned.invocation.program, "npx");
        assert_eq!(
            planned.invocation.args,
            strings(&["nx", "run", "@fux/dc-ext:build", "--fix"])
        );
        assert!(planned.invocation.env.is_empty());
        assert!(!planned.echo);
    }

    #[test]
    fn test_feature_target_uses_run_from_for_base_alias_only() {
        let service = service();

        let base = service.plan_alias("dc", "tsc", &[]).unwrap();
        assert_eq!(base.label, "@fux/dc-ext");
        assert!(base.invocation.args.contains(&"@fux/dc-ext:check-types".to_string()));

        let pinned = service.plan_alias("gwc", "tsc", &[]).unwrap();
        assert_eq!(pinned.label, "@fux/gw-core");
    }

    #[test]
    fn test_env_setting_flags_are_lifted_into_the_environment() {
        let planned = service()
            .plan_alias("dc", "l", &strings(&["--sto=90", "-c"]))
            .unwrap();
        assert_eq!(planned.invocation.program, "npx");
        assert_eq!(
            planned.invocation.env,
            vec![("PAE_TIMEOUT".to_string(), "90".to_string())]
        );
        assert_eq!(
            planned.invocation.args,
            strings(&["nx", "run", "@fux/dc-core:lint", "--configuration=dev"])
        );

        let planned = service()
            .plan_alias("dc", "l", &strings(&["--sto=90", "-f"]))
            .unwrap();
        assert_eq!(
            planned.invocation.display(),
            "PAE_TIMEOUT=90 npx nx run @fux/dc-core:lint --fix"
        );
    }

    #[test]
    fn test_non_assignment_prefix_uses_shell_wrapper() {
        let planned = service()
            .plan_alias("dc", "b", &strings(&["--pre", "-s"]))
            .unwrap();
        assert_eq!(planned.invocation.program, "sh");
        assert_eq!(
            planned.invocation.args,
            strings(&[
                "-c",
                "cd . && npx nx run @fux/dc-core:build --skip-nx-cache"
            ])
        );
    }

    #[test]
    fn test_context_aware_and_passthrough_ordering() {
        let planned = service()
            .plan_alias("aka", "b", &strings(&["-p", "--verbose", "--", "--watch"]))
            .unwrap();
        assert_eq!(
            planned.invocation.args,
            strings(&[
                "nx",
                "run",
                "@fux/aka-tool:build",
                "--projects=@fux/aka-tool",
                "--verbose",
                "--",
                "--watch"
            ])
        );
    }

    #[test]
    fn test_internal_echo_flag_is_not_spliced() {
        let planned = service()
            .plan_alias("dc", "b", &strings(&["--echo"]))
            .unwrap();
        assert!(planned.echo);
        assert!(!planned.invocation.args.iter().any(|a| a.contains("pae-echo")));
    }

    #[test]
    fn test_unknown_alias_is_an_error() {
        assert!(matches!(
            service().plan_alias("nope", "b", &[]),
            Err(CommandError::Resolve(ResolveError::UnknownAlias(_)))
        ));
    }

    #[test]
    fn test_assemble_invocation_shell_wrappers() {
        let command = strings(&["nx", "run", "a:b"]);
        let start = strings(&["Write-Host hi;"]);

        let pwsh = assemble_invocation(ShellType::Pwsh, &start, command.clone()).unwrap();
        assert_eq!(pwsh.program, "pwsh");
        assert_eq!(
            pwsh.args,
            strings(&["-NoProfile", "-Command", "Write-Host hi; nx run a:b"])
        );

        let cmd = assemble_invocation(ShellType::Cmd, &start, command.clone()).unwrap();
        assert_eq!(cmd.program, "cmd");
        assert_eq!(cmd.args.first().map(String::as_str), Some("/C"));

        let nx_build = strings(&["npx", "nx", "run", "@fux/dc-core:build", "--configuration=dev"]);
        let cmd = assemble_invocation(ShellType::Cmd, &strings(&["cd . &&"]), nx_build.clone())
            .unwrap();
        assert_eq!(
            cmd.args,
            strings(&["/C", "cd . && npx nx run @fux/dc-core:build --configuration=dev"])
        );

        let pwsh = assemble_invocation(ShellType::Pwsh, &start, nx_build.clone()).unwrap();
        assert_eq!(
            pwsh.args.last().map(String::as_str),
            Some("Write-Host hi; npx nx run '@fux/dc-core:build' --configuration=dev")
        );

        let linux = assemble_invocation(ShellType::Linux, &strings(&["cd . &&"]), nx_build)
            .unwrap();
        assert_eq!(
            linux.args,
            strings(&["-c", "cd . && npx nx run @fux/dc-core:build '--configuration=dev'"])
        );

        assert!(matches!(
            assemble_invocation(ShellType::Linux, &[], Vec::new()),
            Err(ExecutionError::EmptyCommand)
        ));
    }

    #[test]
    fn test_shell_quoting_of_special_arguments() {
        let args = strings(&["my tool", "a&b", "say \"hi\"", "it's"]);
        assert_eq!(
            quote_for_shell(ShellType::Cmd, &args).unwrap(),
            r#""my tool" "a&b" "say \"hi\"" it's"#
        );
        assert_eq!(
            quote_for_shell(ShellType::Pwsh, &args).unwrap(),
            r#"& 'my tool' 'a&b' 'say "hi"' 'it''s'"#
        );
    }

    #[test]
    fn test_parse_env_assignment_styles() {
        assert_eq!(
            parse_env_assignment("$env:NX_DAEMON='false';"),
            Some(("NX_DAEMON".to_string(), "false".to_string()))
        );
        assert_eq!(
            parse_env_assignment("set NX_DAEMON=false &&"),
            Some(("NX_DAEMON".to_string(), "false".to_string()))
        );
        assert_eq!(
            parse_env_assignment("NX_DAEMON='not false'"),
            Some(("NX_DAEMON".to_string(), "not false".to_string()))
        );
        assert_eq!(parse_env_assignment("cd . &&"), None);
        assert_eq!(parse_env_assignment("--flag=value"), None);
        assert_eq!(parse_env_assignment("A=1 B=2"), None);
    }

    #[test]
    fn test_split_fragment() {
        assert_eq!(split_fragment("--a=1"), strings(&["--a=1"]));
        assert_eq!(split_fragment("--a --b='x y'"), strings(&["--a", "--b=x y"]));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::sync::Mutex;

        /// Fails every project whose name contains `dc`.
        const FAKE_NX: &[&str] = &[
            "sh",
            "-c",
            "case \"$2\" in *dc*) echo broken >&2; exit 3;; *) exit 0;; esac",
            "sh",
        ];

        #[derive(Default)]
        struct SpawnLog {
            spawned: Mutex<Vec<String>>,
        }

        impl ChildProcessTracker for SpawnLog {
            fn on_spawn(&self, _pid: Option<u32>, _command: &str, args: &[String]) {
                self.spawned.lock().unwrap().push(args.join(" "));
            }

            fn on_exit(&self, _pid: Option<u32>, _command: &str, _exit_code: i32) {}
        }

        #[tokio::test]
        async fn test_run_alias_returns_child_exit_code() {
            let service = service_with(FAKE_NX, &[("SHELL", "/bin/sh")]);
            assert_eq!(service.run_alias("dc", "b", &[]).await.unwrap(), 3);
            assert_eq!(service.run_alias("gw", "b", &[]).await.unwrap(), 0);
            assert_eq!(service.run_alias("dc", "hi", &[]).await.unwrap(), 4);
        }

        #[tokio::test]
        async fn test_env_assignment_reaches_child() {
            let service = service_with(
                &["sh", "-c", "test \"$PAE_TIMEOUT\" = 45", "sh"],
                &[("SHELL", "/bin/sh")],
            );
            let code = service
                .run_alias("gw", "b", &strings(&["--sto", "45"]))
                .await
                .unwrap();
            assert_eq!(code, 0);
        }

        #[tokio::test]
        async fn test_run_expandable_command() {
            let service = service();
            assert_eq!(service.run_expandable_command("greet", &[]).await.unwrap(), 7);
            assert!(matches!(
                service.run_expandable_command("missing", &[]).await,
                Err(CommandError::UnknownCommand(_))
            ));
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn test_run_many_is_fail_visible() {
            let service = service_with(FAKE_NX, &[("SHELL", "/bin/sh")]);
            let tracker = Arc::new(SpawnLog::default());
            service.set_child_process_tracker(tracker.clone());

            let code = service
                .run_many(RunType::Core, &[], "b", &[])
                .await
                .unwrap();

            // dc fails, gw still runs to completion.
            assert_eq!(code, 1);
            let spawned = tracker.spawned.lock().unwrap();
            assert_eq!(spawned.len(), 2);
            assert!(spawned.iter().any(|args| args.contains("@fux/dc-core:build")));
            assert!(spawned.iter().any(|args| args.contains("@fux/gw-core:build")));

            let metrics = service.get_process_metrics();
            assert_eq!(metrics.completed, 1);
            assert_eq!(metrics.failed, 1);
            assert_eq!(metrics.active + metrics.queued, 0);
        }

        #[tokio::test]
        async fn test_run_many_with_explicit_packages_forces_variant() {
            let service = service_with(FAKE_NX, &[("SHELL", "/bin/sh")]);
            let tracker = Arc::new(SpawnLog::default());
            service.set_child_process_tracker(tracker.clone());

            let code = service
                .run_many(RunType::Ext, &strings(&["gw"]), "l", &[])
                .await
                .unwrap();

            assert_eq!(code, 0);
            let spawned = tracker.spawned.lock().unwrap();
            assert_eq!(spawned.len(), 1);
            assert!(spawned[0].contains("@fux/gw-ext:lint"));
        }

        #[tokio::test]
        async fn test_shutdown_process_pool_is_idempotent() {
            let service = service_with(FAKE_NX, &[("SHELL", "/bin/sh")]);
            service.run_alias("gw", "b", &[]).await.unwrap();

            service.shutdown_process_pool().await;
            service.shutdown_process_pool().await;

            assert_eq!(service.get_process_metrics(), ProcessMetrics::default());
            assert!(matches!(
                service.run_alias("gw", "b", &[]).await,
                Err(CommandError::Execution(ExecutionError::PoolShutDown(_)))
            ));
        }
    }
}
