//! Connection Server
//!
//! Owns the sockets. The acceptor (in the binary) hands every accepted
//! stream to [`handle_connection`], which drives one [`Session`] per
//! client on its own task until the peer goes away, a protocol fault
//! ends the connection, the client sends `QUIT`, or the process-wide
//! shutdown signal fires.
//!
//! Buffers, decoder state and reply scratch space are all per-session;
//! the only shared state is the keyspace (through the command handler),
//! the shutdown signal, and the [`ConnectionStats`] counters.

pub mod session;

pub use session::{handle_connection, ConnectionStats, Session, SessionError};
