// src/cli/handlers/mod.rs

// One module per CLI action.

pub mod help;
pub mod many;
pub mod run;
pub mod validate;
