//! # vndb-protocol
//!
//! Wire protocol implementation for the VNDB TCP API.
//!
//! This crate provides:
//! - Command line building with argument validation (`login`, `dbstats`, `get`, `set`)
//! - Reply parsing and classification (`ok`, `dbstats`, `results`, `error`)
//! - Sentinel framing and incremental frame reassembly
//! - Argument and protocol error types

pub mod codec;
pub mod command;
pub mod error;
pub mod frame;
pub mod reply;

pub use codec::{Decoder, Encoder};
pub use command::{Command, CommandKind, Flags, GetQuery, LoginRequest, SetRequest};
pub use error::{ArgumentError, ProtocolError};
pub use frame::SENTINEL;
pub use reply::{
    Classification, DbStats, ErrorDetail, ParsedResponse, Payload, Results, StatusWord,
};

/// Protocol version sent in the login body by default.
pub const PROTOCOL_VERSION: u32 = 1;

/// Default host of the public API.
pub const DEFAULT_HOST: &str = "api.vndb.org";

/// Default TLS port of the public API.
pub const DEFAULT_PORT: u16 = 19535;

/// Maximum size of a single unterminated frame (32 MiB).
pub const MAX_FRAME_SIZE: usize = 32 * 1024 * 1024;
