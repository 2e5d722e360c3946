//! # Config Loader
//!
//! Locates and parses the alias configuration. The file is JSON with comments
//! (`//` line comments and `/* */` block comments), as edited by hand in the
//! workspace. Candidate locations are tried in order and the first file that
//! parses wins; if none parse, loading fails and the CLI exits.

use crate::constants::{CONFIG_CANDIDATES, USER_CONFIG_DIRNAME, USER_CONFIG_FILENAME};
use crate::models::AliasConfig;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("Filesystem Error reading '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Error parsing JSON in '{path}': {source}")]
    JsonParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Could not expand config path '{0}'.")]
    PathExpansion(String),
    #[error("No usable configuration found. Tried:\n{tried}")]
    NotFound { tried: String },
}

/// A loaded configuration together with the file it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AliasConfig,
    pub path: PathBuf,
}

/// Orchestrates discovery of the configuration file.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    working_dir: PathBuf,
    explicit_path: Option<String>,
}

impl ConfigLoader {
    /// Creates a loader rooted at `working_dir`.
    ///
    /// # Arguments
    ///
    /// * `working_dir` - Directory the relative candidates are resolved against.
    /// * `explicit_path` - A path from `PAE_CONFIG`; `~` and `$VARS` are expanded.
    pub fn new(working_dir: impl Into<PathBuf>, explicit_path: Option<String>) -> Self {
        Self {
            working_dir: working_dir.into(),
            explicit_path,
        }
    }

    /// Candidate paths, in the order they are tried.
    pub fn candidates(&self) -> Result<Vec<PathBuf>, ConfigLoadError> {
        let mut candidates = Vec::new();

        if let Some(explicit) = &self.explicit_path {
            let expanded = shellexpand::full(explicit)
                .map_err(|_| ConfigLoadError::PathExpansion(explicit.clone()))?;
            let path = PathBuf::from(expanded.as_ref());
            candidates.push(if path.is_absolute() {
                path
            } else {
                self.working_dir.join(path)
            });
        }

        candidates.extend(
            CONFIG_CANDIDATES
                .iter()
                .map(|relative| self.working_dir.join(relative)),
        );

        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(
                config_dir
                    .join(USER_CONFIG_DIRNAME)
                    .join(USER_CONFIG_FILENAME),
            );
        }
        Ok(candidates)
    }

    /// Loads the first candidate that exists and parses.
    ///
    /// A candidate that exists but fails to parse is logged and skipped, so a
    /// broken per-user file never hides a valid workspace file.
    pub fn load(&self) -> Result<LoadedConfig, ConfigLoadError> {
        let candidates = self.candidates()?;
        for path in &candidates {
            if !path.is_file() {
                log::trace!("Config candidate '{}' does not exist.", path.display());
                continue;
            }
            match load_from_path(path) {
                Ok(config) => {
                    let path = dunce::canonicalize(path).unwrap_or_else(|_| path.clone());
                    log::debug!("Loaded configuration from '{}'.", path.display());
                    return Ok(LoadedConfig { config, path });
                }
                Err(e) => log::warn!("Skipping config candidate: {}", e),
            }
        }

        let tried = candidates
            .iter()
            .map(|p| format!("  - {}", p.display()))
            .collect::<Vec<_>>()
            .join("\n");
        Err(ConfigLoadError::NotFound { tried })
    }
}

/// Reads and parses a single JSON-with-comments config file.
pub fn load_from_path(path: &Path) -> Result<AliasConfig, ConfigLoadError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigLoadError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_config(&content).map_err(|e| ConfigLoadError::JsonParse {
        path: path.display().to_string(),
        source: e,
    })
}

pub fn parse_config(content: &str) -> Result<AliasConfig, serde_json::Error> {
    serde_json::from_str(&strip_json_comments(content))
}

/// Removes `//` and `/* */` comments outside of string literals.
///
/// Newlines inside comments are kept so that parse errors still point at the
/// right line.
pub fn strip_json_comments(input: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        String,
        StringEscape,
        LineComment,
        BlockComment,
    }

    let mut output = String::with_capacity(input.len());
    let mut state = State::Code;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        state = match state {
            State::Code => match c {
                '"' => {
                    output.push(c);
                    State::String
                }
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    State::LineComment
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    State::BlockComment
                }
                _ => {
                    output.push(c);
                    State::Code
                }
            },
            State::String => {
                output.push(c);
                match c {
                    '\\' => State::StringEscape,
                    '"' => State::Code,
                    _ => State::String,
                }
            }
            State::StringEscape => {
                output.push(c);
                State::String
            }
            State::LineComment => {
                if c == '\n' {
                    output.push(c);
                    State::Code
                } else {
                    State::LineComment
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    State::Code
                } else {
                    if c == '\n' {
                        output.push(c);
                    }
                    State::BlockComment
                }
            }
        };
    }
    output
}
