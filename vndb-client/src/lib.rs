//! # vndb-client
//!
//! Client library for the VNDB TCP API.
//!
//! This crate provides:
//! - A single-flight connection: many callers, one request on the wire at a time
//! - FIFO pairing of replies with requests
//! - High-level typed API for `login`, `dbstats`, `get` and `set`
//! - TLS connection setup and file/env configuration

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod queue;
pub mod tls;

pub use client::Client;
pub use config::{ConfigError, ConnectionConfig, TlsConfig};
pub use connection::{Connection, Outcome};
pub use error::ClientError;
pub use queue::PendingReply;
