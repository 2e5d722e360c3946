// src/constants.rs

/// Scope prefix applied to every structured package name.
pub const PACKAGE_SCOPE: &str = "@fux";

/// Config file locations tried in order, relative to the working directory.
pub const CONFIG_CANDIDATES: &[&str] = &[
    "pae.config.json",
    "libs/project-alias-expander/config.json",
    ".pae/config.json",
];

/// Name of the per-user config directory (under the system config dir).
pub const USER_CONFIG_DIRNAME: &str = "pae";

/// File name of the config inside the per-user config directory.
pub const USER_CONFIG_FILENAME: &str = "config.json";

/// Default command used to reach the Nx CLI.
pub const DEFAULT_NX_COMMAND: &[&str] = &["npx", "nx"];

// --- Environment variables ---

pub const ENV_DEBUG: &str = "PAE_DEBUG";
pub const ENV_ECHO: &str = "PAE_ECHO";
pub const ENV_CONFIG: &str = "PAE_CONFIG";
pub const ENV_POOL_SIZE: &str = "PAE_POOL_SIZE";
pub const ENV_NX_COMMAND: &str = "PAE_NX_COMMAND";

// --- Internal flag names understood by the engine itself ---

/// Print the final command line instead of running it.
pub const INTERNAL_ECHO: &str = "pae-echo";

/// Print the detected shell and Nx task context before running.
pub const INTERNAL_DEBUG: &str = "pae-debug";
