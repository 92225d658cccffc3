// src/core/service.rs

use crate::{
    constants::PROTOCOL,
    core::logging::ServiceLogger,
    system::shell::{self, ShellError},
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// One interpreter bound to one network endpoint and one export set.
///
/// Built once at startup and never mutated; listener and connection tasks share it
/// through an `Arc` without any locking.
#[derive(Debug)]
pub struct Service {
    executable: PathBuf,
    addr: String,
    port: u16,
    protocol: &'static str,
    exports: BTreeMap<String, String>,
    pub(crate) log: ServiceLogger,
}

impl Service {
    /// Resolves `shell` and builds a service for `addr:port`.
    ///
    /// `logger` is the base handle; the service binds its own identity onto it
    /// (`shell`, `addr`, `port`, `proto`, and one `exports.<NAME>` per export).
    ///
    /// # Errors
    /// Returns a `ShellError` if the shell cannot be resolved. Callers treat this as
    /// fatal for the whole program.
    pub fn new(
        shell: &str,
        addr: &str,
        port: u16,
        exports: BTreeMap<String, String>,
        logger: &ServiceLogger,
    ) -> Result<Self, ShellError> {
        let mut log = logger
            .with("shell", shell)
            .with("addr", addr)
            .with("port", port)
            .with("proto", PROTOCOL);
        for (name, value) in &exports {
            log = log.with(format!("exports.{name}"), value);
        }

        let executable = shell::resolve_shell(shell)?;
        log.info("shell registered", &[("path", &executable.display())]);

        Ok(Self {
            executable,
            addr: addr.to_string(),
            port,
            protocol: PROTOCOL,
            exports,
            log,
        })
    }

    /// The resolved absolute path of the interpreter.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn protocol(&self) -> &'static str {
        self.protocol
    }

    /// The complete environment given to every script this service runs.
    pub fn exports(&self) -> &BTreeMap<String, String> {
        &self.exports
    }

    pub fn logger(&self) -> &ServiceLogger {
        &self.log
    }

    /// `addr:port` in a form `TcpListener::bind` accepts, bracketing IPv6 literals.
    pub fn endpoint(&self) -> String {
        if self.addr.contains(':') && !self.addr.starts_with('[') {
            format!("[{}]:{}", self.addr, self.port)
        } else {
            format!("{}:{}", self.addr, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_resolves_shell_and_binds_identity() {
        let mut exports = BTreeMap::new();
        exports.insert("FOO".to_string(), "bar".to_string());

        let service =
            Service::new("/bin/sh", "127.0.0.1", 50135, exports, &ServiceLogger::new()).unwrap();

        assert_eq!(service.executable(), Path::new("/bin/sh"));
        assert_eq!(service.protocol(), "tcp");
        assert_eq!(service.endpoint(), "127.0.0.1:50135");
        assert_eq!(service.exports().get("FOO").map(String::as_str), Some("bar"));

        let keys: Vec<_> = service.logger().fields().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["shell", "addr", "port", "proto", "exports.FOO"]);
    }

    #[test]
    fn test_new_fails_for_unknown_shell() {
        let result = Service::new(
            "relay-test-no-such-shell-8d1f",
            "127.0.0.1",
            50135,
            BTreeMap::new(),
            &ServiceLogger::new(),
        );
        assert!(matches!(result, Err(ShellError::NotFound(_))));
    }

    #[test]
    fn test_endpoint_brackets_ipv6_literals() {
        let service =
            Service::new("/bin/sh", "::1", 8080, BTreeMap::new(), &ServiceLogger::new()).unwrap();
        assert_eq!(service.endpoint(), "[::1]:8080");
    }
}
