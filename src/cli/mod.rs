use clap::Parser;

pub mod dispatcher;
pub mod handlers;

/// pae: expands short workspace aliases into Nx invocations and runs them.
///
/// Usage:
///   - `pae <alias> <target> [flags...]`       (e.g. `pae dc b -f`)
///   - `pae ext|core|all <target> [aliases...] [flags...]`
///   - `pae <expandable-command> [args...]`
///   - `pae help` | `pae validate`
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
// `pae help` is handled by the dispatcher, which knows the loaded config.
#[command(disable_help_subcommand = true)]
#[command(trailing_var_arg = true)]
pub struct Cli {
    /// Enable debug logging (same as `PAE_DEBUG=1`).
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// The alias or command, followed by its target, flags and arguments.
    /// Everything after the first word is forwarded untouched.
    #[arg(allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Cli {
    /// Removes `-d`/`--debug` from anywhere before a `--` separator and turns
    /// debugging on if one was found. Returns the resulting debug state.
    pub fn take_debug_switch(&mut self) -> bool {
        let separator = self
            .args
            .iter()
            .position(|arg| arg == "--")
            .unwrap_or(self.args.len());
        let tail = self.args.split_off(separator);
        let before = self.args.len();
        self.args.retain(|arg| arg != "-d" && arg != "--debug");
        self.debug |= self.args.len() != before;
        self.args.extend(tail);
        self.debug
    }
}
