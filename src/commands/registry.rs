//! Command Registry
//!
//! Maps command names to descriptors: arity bounds plus the handler to
//! run once the argument vector has passed the shape checks. Lookup is
//! case-insensitive ASCII. Aliases get their own entries so an arity
//! error echoes the name the client actually sent.

use crate::commands::handler::{CommandHandler, Control};
use crate::wire::Frame;

/// Descriptor for one command name.
pub(crate) struct CommandSpec {
    /// Canonical (uppercase) name, echoed in arity errors
    pub name: &'static str,
    /// Fewest arguments accepted, not counting the name itself
    pub min_args: usize,
    /// Most arguments accepted; `None` means variadic
    pub max_args: Option<usize>,
    /// Handler invoked with the argument vector (name stripped)
    pub run: fn(&CommandHandler, &[Frame]) -> (Frame, Control),
}

impl CommandSpec {
    pub fn arity_ok(&self, given: usize) -> bool {
        given >= self.min_args && self.max_args.map_or(true, |max| given <= max)
    }
}

macro_rules! reply {
    ($method:ident) => {
        |handler, args| (handler.$method(args), Control::Continue)
    };
}

pub(crate) static COMMANDS: &[CommandSpec] = &[
    CommandSpec { name: "GET", min_args: 1, max_args: Some(1), run: reply!(get) },
    CommandSpec { name: "SET", min_args: 2, max_args: Some(2), run: reply!(set) },
    CommandSpec { name: "MGET", min_args: 1, max_args: None, run: reply!(mget) },
    CommandSpec { name: "MSET", min_args: 2, max_args: None, run: reply!(mset) },
    CommandSpec { name: "DELETE", min_args: 1, max_args: None, run: reply!(delete) },
    CommandSpec { name: "DEL", min_args: 1, max_args: None, run: reply!(delete) },
    CommandSpec { name: "EXISTS", min_args: 1, max_args: None, run: reply!(exists) },
    CommandSpec { name: "EXPIRE", min_args: 2, max_args: Some(2), run: reply!(expire) },
    CommandSpec { name: "PEXPIRE", min_args: 2, max_args: Some(2), run: reply!(pexpire) },
    CommandSpec { name: "TTL", min_args: 1, max_args: Some(1), run: reply!(ttl) },
    CommandSpec { name: "PTTL", min_args: 1, max_args: Some(1), run: reply!(pttl) },
    CommandSpec { name: "KEYS", min_args: 1, max_args: Some(1), run: reply!(keys) },
    CommandSpec { name: "FLUSH", min_args: 0, max_args: Some(0), run: reply!(flush) },
    CommandSpec { name: "FLUSHDB", min_args: 0, max_args: Some(0), run: reply!(flush) },
    CommandSpec { name: "PING", min_args: 0, max_args: Some(1), run: reply!(ping) },
    CommandSpec {
        name: "QUIT",
        min_args: 0,
        max_args: Some(0),
        run: |_, _| (Frame::ok(), Control::Quit),
    },
    CommandSpec {
        name: "SHUTDOWN",
        min_args: 0,
        max_args: Some(0),
        run: |_, _| (Frame::ok(), Control::Shutdown),
    },
];

/// Finds the descriptor for `name`, matching case-insensitively.
pub(crate) fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.name.eq_ignore_ascii_case(name))
}
