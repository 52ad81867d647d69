//! # emberkv - An In-Memory Key-Value Server
//!
//! emberkv is a small in-memory key-value database reachable over TCP.
//! It speaks a minimal Redis dialect: strings with optional per-key TTL,
//! multi-key batch operations, glob-pattern key enumeration, and an
//! administrative flush.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          emberkv                            │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ TCP Server  │───>│   Session   │───>│  Command    │      │
//! │  │ (acceptor)  │    │  (per conn) │    │  Handler    │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │                            │                  │             │
//! │                            ▼                  ▼             │
//! │                     ┌─────────────┐    ┌─────────────┐      │
//! │                     │ Wire codec  │    │  Keyspace   │      │
//! │                     │ (frames)    │    │ (mutex map) │      │
//! │                     └─────────────┘    └──────┬──────┘      │
//! │                                               ▲             │
//! │                                   ┌───────────┴───────────┐ │
//! │                                   │        Sweeper        │ │
//! │                                   │  (background expiry)  │ │
//! │                                   └───────────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Bytes flow in from the socket, are decoded into [`wire::Frame`]
//! requests, dispatched through [`commands::CommandHandler`] onto the
//! [`keyspace::Keyspace`], and the resulting reply frame is encoded back
//! onto the wire. One tokio task per connection; a background sweeper
//! reclaims expired keys that clients never touch again.
//!
//! ## Supported Commands
//!
//! - `GET key` / `SET key value`
//! - `MGET key [key ...]` / `MSET key value [key value ...]`
//! - `DELETE key [key ...]` (alias `DEL`)
//! - `EXISTS key [key ...]`
//! - `EXPIRE key seconds` / `PEXPIRE key milliseconds`
//! - `TTL key` / `PTTL key`
//! - `KEYS pattern`
//! - `FLUSH` (alias `FLUSHDB`)
//! - `PING [message]`, `QUIT`, `SHUTDOWN`
//!
//! ## Guarantees
//!
//! The keyspace is guarded by a single coarse mutex, so every operation
//! is linearizable with respect to every other: `MSET` is never observed
//! half-applied, and a reader sees either the pre-write or the post-write
//! entry, never a torn state. TTL deadlines are absolute monotonic
//! timestamps, checked lazily on every read and reclaimed eventually by
//! the sweeper. Within one connection, commands are executed and answered
//! in strict receipt order.

pub mod commands;
pub mod connection;
pub mod keyspace;
pub mod shutdown;
pub mod wire;

// Re-export the types most callers need
pub use commands::CommandHandler;
pub use connection::{handle_connection, ConnectionStats};
pub use keyspace::{start_sweeper, Keyspace, SweeperConfig};
pub use shutdown::Shutdown;
pub use wire::{DecodeError, Decoder, Frame};

/// The default port emberkv listens on
pub const DEFAULT_PORT: u16 = 31337;

/// The default host emberkv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of emberkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
