//! Command Layer
//!
//! Sits between the wire codec and the keyspace:
//!
//! ```text
//! request frame ──> registry lookup ──> arity check ──> handler ──> reply frame
//! ```
//!
//! - `registry`: the table of command descriptors (names, arity bounds,
//!   handlers)
//! - `handler`: dispatch, argument coercion, keyspace calls, and reply
//!   shaping, plus the [`Control`] verdict that drives `QUIT` and
//!   `SHUTDOWN`
//!
//! The keyspace never sees an invalid command: everything is validated
//! here first, and a rejected command leaves state untouched.

pub mod handler;
mod registry;

pub use handler::{CommandHandler, Control};
