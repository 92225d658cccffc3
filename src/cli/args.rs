// EN: src/cli/args.rs

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ArgError {
    #[error("invalid export format: {0:?} (expected IDENT=VALUE)")]
    Export(String),
    #[error("shell name is required")]
    MissingShell,
    #[error("invalid format {0:?}: too many colons")]
    TooManyColons(String),
    #[error("invalid port {0:?}")]
    Port(String),
    #[error("port {0} out of range (1-65535)")]
    PortRange(u32),
    #[error("invalid default listen port {0:?}")]
    DefaultPort(String),
    #[error("invalid default listen format {0:?}")]
    DefaultListen(String),
}

/// One `shell[:addr][:port]` argument with the defaults applied.
///
/// The shell is still the name the user typed; resolving it to a path is the
/// service's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub shell: String,
    pub addr: String,
    pub port: u16,
}

/// Parses `IDENT=VALUE` for `-e`. Only the first `=` splits; the value may be empty.
pub fn parse_export(s: &str) -> Result<(String, String), ArgError> {
    s.split_once('=')
        .map(|(ident, value)| (ident.to_string(), value.to_string()))
        .ok_or_else(|| ArgError::Export(s.to_string()))
}

/// Folds repeated `-e` values into the export set. Later duplicates win.
pub fn collect_exports(pairs: &[(String, String)]) -> BTreeMap<String, String> {
    pairs.iter().cloned().collect()
}

fn parse_port(s: &str, err: fn(String) -> ArgError) -> Result<u32, ArgError> {
    s.parse::<u32>().map_err(|_| err(s.to_string()))
}

/// Parses the `-l` value into a default address and port.
///
/// Accepted forms: `PORT`, `ADDR:PORT`, `:PORT`, and `ADDR:`. Missing parts keep
/// the built-in defaults.
pub fn parse_listen_default(
    listen: &str,
    default_addr: &str,
    default_port: u16,
) -> Result<(String, u32), ArgError> {
    let mut addr = default_addr.to_string();
    let mut port = u32::from(default_port);

    if listen.is_empty() {
        return Ok((addr, port));
    }

    let parts: Vec<&str> = listen.split(':').collect();
    match parts.as_slice() {
        [only] => {
            port = parse_port(only, ArgError::DefaultPort)?;
        }
        [a, p] => {
            if !a.is_empty() {
                addr = (*a).to_string();
            }
            if !p.is_empty() {
                port = parse_port(p, ArgError::DefaultPort)?;
            }
        }
        _ => return Err(ArgError::DefaultListen(listen.to_string())),
    }

    Ok((addr, port))
}

/// Parses one `shell[:addr][:port]` argument.
///
/// Empty or zero parts fall back to `default_addr` / `default_port`. The resulting
/// port must be in `1..=65535`.
pub fn parse_service_arg(
    arg: &str,
    default_addr: &str,
    default_port: u32,
) -> Result<ServiceSpec, ArgError> {
    let parts: Vec<&str> = arg.split(':').collect();

    let (shell, addr, port) = match parts.as_slice() {
        [shell] => (*shell, "", 0),
        [shell, addr] => (*shell, *addr, 0),
        [shell, addr, port] => {
            let port = if port.is_empty() {
                0
            } else {
                parse_port(port, ArgError::Port)?
            };
            (*shell, *addr, port)
        }
        _ => return Err(ArgError::TooManyColons(arg.to_string())),
    };

    if shell.is_empty() {
        return Err(ArgError::MissingShell);
    }

    let addr = if addr.is_empty() { default_addr } else { addr };
    let port = if port == 0 { default_port } else { port };
    let port = u16::try_from(port)
        .ok()
        .filter(|p| *p != 0)
        .ok_or(ArgError::PortRange(port))?;

    Ok(ServiceSpec {
        shell: shell.to_string(),
        addr: addr.to_string(),
        port,
    })
}

/// Parses every service argument, handing out default ports in sequence.
///
/// Each time a service lands on the current default port, the next service's default
/// moves up by one. So `bash zsh` gets 50135 and 50136, while `bash::9000 zsh` gets
/// 9000 and 50135.
pub fn plan_services(
    args: &[String],
    default_addr: &str,
    default_port: u32,
) -> Result<Vec<ServiceSpec>, (String, ArgError)> {
    let mut offset = 0u32;
    let mut specs = Vec::with_capacity(args.len());

    for arg in args {
        let current_default = default_port.saturating_add(offset);
        let spec = parse_service_arg(arg, default_addr, current_default)
            .map_err(|e| (arg.clone(), e))?;
        if u32::from(spec.port) == current_default {
            offset += 1;
        }
        specs.push(spec);
    }

    Ok(specs)
}
