//! # System Interaction Layer
//!
//! The boundary between the network service and the operating system.
//!
//! ## Modules
//!
//! - **`executor`**: Launches an interpreter against a spooled script with a controlled
//!   environment, captures stdout and stderr, and honours service-wide cancellation.
//! - **`shell`**: Resolves a shell name or path to an absolute executable path.
//! - **`spool`**: Uniquely named temporary files that hold one script per transfer cycle.

pub mod executor;
pub mod shell;
pub mod spool;
