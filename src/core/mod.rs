// src/core/mod.rs

//! The per-shell network service: the `Service` value, its listener loop, the
//! script-transfer protocol run on each connection, and service-bound logging.

pub mod connection;
pub mod listener;
pub mod logging;
pub mod service;
