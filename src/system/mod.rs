//! # System Interaction Layer
//!
//! Abstractions over the operating system: the boundary between the expansion
//! logic and the specifics of child processes and shell environments.
//!
//! ## Modules
//!
//! - **`executor`**: Spawns a single child process, either inheriting the terminal or
//!   capturing its output, and reports its exit code. Handles the `cmd /C` fallback on
//!   Windows.
//! - **`process_pool`**: Bounded, FIFO admission control over `executor` runs, with
//!   metrics derived from the live entries and an idempotent shutdown.
//! - **`shell`**: Detects the user's shell flavor from the environment and caches the
//!   result against an environment fingerprint.

pub mod executor;
pub mod process_pool;
pub mod shell;
