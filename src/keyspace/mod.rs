//! Keyspace Engine
//!
//! Owns the key-to-entry mapping and all TTL bookkeeping:
//!
//! - `store`: the [`Keyspace`] itself, a coarse-mutex map whose
//!   operations are each linearizable and never suspend
//! - `glob`: byte-wise glob matching for `KEYS`
//! - `sweeper`: the background task that reclaims expired keys nobody
//!   reads again
//!
//! The command layer performs all argument validation before calling in;
//! keyspace operations only return result values (values, counts, nils),
//! never command-level errors.

pub mod glob;
pub mod store;
pub mod sweeper;

pub use glob::glob_match;
pub use store::{Entry, Keyspace, Ttl};
pub use sweeper::{start_sweeper, SweeperConfig};
