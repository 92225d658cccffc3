// src/constants.rs

/// The only transport a service listens on.
pub const PROTOCOL: &str = "tcp";

/// The address used when neither `-l` nor the service argument names one.
pub const DEFAULT_ADDR: &str = "127.0.0.1";

/// The first port handed out to services without an explicit port.
pub const DEFAULT_PORT: u16 = 50135;

/// The default value of the `-l` flag.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:50135";

/// The `-o` value that sends log output to stdout instead of a file.
pub const STDOUT_SINK: &str = "-";

/// Prefix for spooled script files in the system temp directory.
pub const SPOOL_PREFIX: &str = "relay-script-";

/// Flag passed to the interpreter ahead of the spooled script path.
pub const SCRIPT_FLAG: &str = "-l";
