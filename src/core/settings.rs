// src/core/settings.rs

use crate::constants::{
    DEFAULT_NX_COMMAND, ENV_CONFIG, ENV_DEBUG, ENV_ECHO, ENV_NX_COMMAND, ENV_POOL_SIZE,
};
use crate::system::shell::{EnvSource, ProcessEnv};
use std::num::NonZeroUsize;
use std::thread;

/// Runtime settings taken from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub debug: bool,
    pub echo: bool,
    pub pool_size: usize,
    /// Program and leading arguments used to invoke Nx.
    pub nx_command: Vec<String>,
    pub config_path: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            echo: false,
            pool_size: default_pool_size(),
            nx_command: DEFAULT_NX_COMMAND.iter().map(|s| s.to_string()).collect(),
            config_path: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_source(&ProcessEnv)
    }

    /// Whether `PAE_DEBUG` asks for debug output. Readable before logging is
    /// set up, so the logger can be configured first.
    pub fn debug_requested(env: &dyn EnvSource) -> bool {
        env.var(ENV_DEBUG).is_some_and(|v| is_truthy(&v))
    }

    pub fn from_source(env: &dyn EnvSource) -> Self {
        let mut settings = Self::default();
        settings.debug = Self::debug_requested(env);
        settings.echo = env.var(ENV_ECHO).is_some_and(|v| is_truthy(&v));
        settings.config_path = env.var(ENV_CONFIG).filter(|v| !v.trim().is_empty());

        if let Some(raw) = env.var(ENV_POOL_SIZE) {
            match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => settings.pool_size = size,
                _ => log::warn!(
                    "Ignoring {}='{}': expected a positive integer.",
                    ENV_POOL_SIZE,
                    raw
                ),
            }
        }

        if let Some(raw) = env.var(ENV_NX_COMMAND) {
            match shlex::split(&raw) {
                Some(parts) if !parts.is_empty() => settings.nx_command = parts,
                _ => log::warn!("Ignoring {}: could not parse '{}'.", ENV_NX_COMMAND, raw),
            }
        }
        settings
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn default_pool_size() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}
