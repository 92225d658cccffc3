//! relay: exposes command interpreters over TCP.
//!
//! A client connects to a shell's port, uploads a script between two marker lines,
//! and gets back the interpreter's stdout followed by its stderr.

pub use tokio_util::sync::CancellationToken;

pub mod cli;
pub mod constants;
pub mod core;
pub mod system;
