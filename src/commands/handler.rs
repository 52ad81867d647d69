//! Command Dispatch and Result Shaping
//!
//! [`CommandHandler::execute`] takes an already-decoded request frame,
//! validates its shape and arity against the registry, coerces the
//! arguments, runs the keyspace operation, and shapes the reply frame.
//! All validation happens here, before the keyspace is touched, so a
//! rejected command never mutates state. The keyspace itself only
//! returns result values; every command-level error originates in this
//! module with the exact wire strings clients match on:
//!
//! - `ERR unknown command '<name>'`
//! - `ERR wrong number of arguments for '<cmd>'`
//! - `ERR value is not an integer or out of range`
//! - `ERR syntax error`
//!
//! Besides the reply, `execute` returns a [`Control`] verdict telling
//! the session whether to keep going, close after the reply (`QUIT`),
//! or bring the whole server down (`SHUTDOWN`).

use crate::commands::registry;
use crate::keyspace::{Keyspace, Ttl};
use crate::wire::Frame;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

const ERR_SYNTAX: &str = "ERR syntax error";
const ERR_NOT_INT: &str = "ERR value is not an integer or out of range";

/// What the session should do after writing the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Keep reading requests
    Continue,
    /// Close this session
    Quit,
    /// Stop the whole server
    Shutdown,
}

/// Executes requests against a shared [`Keyspace`].
#[derive(Clone)]
pub struct CommandHandler {
    keyspace: Arc<Keyspace>,
}

impl CommandHandler {
    pub fn new(keyspace: Arc<Keyspace>) -> Self {
        Self { keyspace }
    }

    /// Runs one request and shapes its reply.
    ///
    /// The request must be an array whose first element names a command;
    /// the decoder produces that shape for both tagged and inline input.
    pub fn execute(&self, request: Frame) -> (Frame, Control) {
        let args = match request {
            Frame::Array(args) => args,
            _ => return (Frame::error(ERR_SYNTAX), Control::Continue),
        };
        let Some((head, rest)) = args.split_first() else {
            return (Frame::error(ERR_SYNTAX), Control::Continue);
        };

        let name = match head {
            Frame::Bulk(raw) => String::from_utf8_lossy(raw).to_ascii_uppercase(),
            Frame::Simple(s) => s.to_ascii_uppercase(),
            _ => return (Frame::error(ERR_SYNTAX), Control::Continue),
        };

        let Some(spec) = registry::lookup(&name) else {
            let reply = Frame::error(format!("ERR unknown command '{}'", name));
            return (reply, Control::Continue);
        };
        if !spec.arity_ok(rest.len()) {
            return (wrong_args(spec.name), Control::Continue);
        }

        (spec.run)(self, rest)
    }

    pub(crate) fn get(&self, args: &[Frame]) -> Frame {
        let Some(key) = arg_bytes(&args[0]) else {
            return Frame::error(ERR_SYNTAX);
        };
        match self.keyspace.get(&key) {
            Some(value) => Frame::Bulk(value),
            None => Frame::Null,
        }
    }

    pub(crate) fn set(&self, args: &[Frame]) -> Frame {
        let (Some(key), Some(value)) = (arg_bytes(&args[0]), arg_bytes(&args[1])) else {
            return Frame::error(ERR_SYNTAX);
        };
        self.keyspace.set(key, value, None);
        Frame::ok()
    }

    pub(crate) fn mget(&self, args: &[Frame]) -> Frame {
        let Some(keys) = collect_bytes(args) else {
            return Frame::error(ERR_SYNTAX);
        };
        let replies = self
            .keyspace
            .mget(&keys)
            .into_iter()
            .map(|hit| hit.map_or(Frame::Null, Frame::Bulk))
            .collect();
        Frame::Array(replies)
    }

    pub(crate) fn mset(&self, args: &[Frame]) -> Frame {
        if args.len() % 2 != 0 {
            return wrong_args("MSET");
        }
        let mut pairs = Vec::with_capacity(args.len() / 2);
        for pair in args.chunks_exact(2) {
            let (Some(key), Some(value)) = (arg_bytes(&pair[0]), arg_bytes(&pair[1])) else {
                return Frame::error(ERR_SYNTAX);
            };
            pairs.push((key, value));
        }
        self.keyspace.mset(pairs);
        Frame::ok()
    }

    pub(crate) fn delete(&self, args: &[Frame]) -> Frame {
        let Some(keys) = collect_bytes(args) else {
            return Frame::error(ERR_SYNTAX);
        };
        Frame::integer(self.keyspace.delete(&keys) as i64)
    }

    pub(crate) fn exists(&self, args: &[Frame]) -> Frame {
        let Some(keys) = collect_bytes(args) else {
            return Frame::error(ERR_SYNTAX);
        };
        Frame::integer(self.keyspace.exists(&keys) as i64)
    }

    pub(crate) fn expire(&self, args: &[Frame]) -> Frame {
        self.apply_expire(args, 1000)
    }

    pub(crate) fn pexpire(&self, args: &[Frame]) -> Frame {
        self.apply_expire(args, 1)
    }

    /// Shared body of `EXPIRE`/`PEXPIRE`. TTLs are kept in milliseconds;
    /// the second-granularity command scales by 1000.
    fn apply_expire(&self, args: &[Frame], unit_ms: u64) -> Frame {
        let Some(key) = arg_bytes(&args[0]) else {
            return Frame::error(ERR_SYNTAX);
        };
        let Some(raw) = arg_int(&args[1]) else {
            return Frame::error(ERR_NOT_INT);
        };
        // Zero and negative TTLs are rejected outright.
        if raw <= 0 {
            return Frame::error(ERR_NOT_INT);
        }
        let Some(millis) = (raw as u64).checked_mul(unit_ms) else {
            return Frame::error(ERR_NOT_INT);
        };

        let applied = self.keyspace.expire(&key, Duration::from_millis(millis));
        Frame::integer(applied as i64)
    }

    pub(crate) fn ttl(&self, args: &[Frame]) -> Frame {
        self.report_ttl(args, false)
    }

    pub(crate) fn pttl(&self, args: &[Frame]) -> Frame {
        self.report_ttl(args, true)
    }

    fn report_ttl(&self, args: &[Frame], in_millis: bool) -> Frame {
        let Some(key) = arg_bytes(&args[0]) else {
            return Frame::error(ERR_SYNTAX);
        };
        let reply = match self.keyspace.ttl(&key) {
            Ttl::Missing => -2,
            Ttl::NoExpiry => -1,
            // Truncation rounds the remainder toward zero.
            Ttl::Remaining(left) if in_millis => left.as_millis() as i64,
            Ttl::Remaining(left) => left.as_secs() as i64,
        };
        Frame::integer(reply)
    }

    pub(crate) fn keys(&self, args: &[Frame]) -> Frame {
        let Some(pattern) = arg_bytes(&args[0]) else {
            return Frame::error(ERR_SYNTAX);
        };
        let matched = self
            .keyspace
            .keys(&pattern)
            .into_iter()
            .map(Frame::Bulk)
            .collect();
        Frame::Array(matched)
    }

    pub(crate) fn flush(&self, _args: &[Frame]) -> Frame {
        self.keyspace.flush();
        Frame::ok()
    }

    pub(crate) fn ping(&self, args: &[Frame]) -> Frame {
        match args.first() {
            None => Frame::pong(),
            Some(msg) => match arg_bytes(msg) {
                Some(payload) => Frame::Bulk(payload),
                None => Frame::error(ERR_SYNTAX),
            },
        }
    }
}

fn wrong_args(name: &str) -> Frame {
    Frame::error(format!("ERR wrong number of arguments for '{}'", name))
}

/// Coerces one argument to raw bytes. Integer arguments become their
/// decimal text; nested frames are rejected.
fn arg_bytes(arg: &Frame) -> Option<Bytes> {
    match arg {
        Frame::Bulk(raw) => Some(raw.clone()),
        Frame::Simple(s) => Some(Bytes::copy_from_slice(s.as_bytes())),
        Frame::Integer(n) => Some(Bytes::from(n.to_string())),
        _ => None,
    }
}

/// Coerces every argument to raw bytes, failing if any one fails.
fn collect_bytes(args: &[Frame]) -> Option<Vec<Bytes>> {
    args.iter().map(arg_bytes).collect()
}

/// Coerces one argument to a signed integer.
fn arg_int(arg: &Frame) -> Option<i64> {
    match arg {
        Frame::Integer(n) => Some(*n),
        Frame::Bulk(raw) => std::str::from_utf8(raw).ok()?.parse().ok(),
        Frame::Simple(s) => s.parse().ok(),
        _ => None,
    }
}
