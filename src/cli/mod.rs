// EN: src/cli/mod.rs

//! Command-line surface: the `Cli` definition and the grammar of its arguments.

use crate::constants::{DEFAULT_LISTEN, STDOUT_SINK};
use clap::Parser;

pub mod args;

/// relay: serve command interpreters over TCP.
///
/// Each SHELL[:ADDR][:PORT] argument gets its own listener. A client sends a marker
/// line, the script, and the marker again; relay runs the script with that shell and
/// writes back its stdout, then its stderr.
///
/// Omitted ADDR/PORT use the defaults from -l. Unspecified ports auto-increment for
/// each service, e.g. `relay bash zsh` listens on 50135 and 50136.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Examples:\n  \
    relay bash                       (default addr:port)\n  \
    relay bash:192.168.0.1           (default port)\n  \
    relay bash::8080                 (default addr)\n  \
    relay bash:192.168.0.1:8080 zsh")]
pub struct Cli {
    /// Default listen address for shells.
    #[arg(short = 'l', long = "listen", value_name = "[ADDR]:PORT", default_value = DEFAULT_LISTEN)]
    pub listen: String,

    /// Export a variable to every shell. May be repeated. Shells see only these variables.
    #[arg(short = 'e', long = "export", value_name = "IDENT=VALUE", value_parser = args::parse_export)]
    pub exports: Vec<(String, String)>,

    /// Append log output to FILE ("-" is stdout).
    #[arg(short = 'o', long = "output", value_name = "FILE", default_value = STDOUT_SINK)]
    pub output: String,

    /// Use JSON structured logging.
    #[arg(short = 'j', long = "json")]
    pub json: bool,

    /// Shell name or path, optional listen address, optional port.
    #[arg(required = true, value_name = "SHELL[:ADDR][:PORT]")]
    pub services: Vec<String>,
}
