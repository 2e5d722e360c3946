// src/core/mod.rs

pub mod arg_parser;
pub mod command_execution;
pub mod config_loader;
pub mod config_validator;
pub mod flag_expander;
pub mod interpolator;
pub mod package_resolver;
pub mod settings;
pub mod target_resolver;
