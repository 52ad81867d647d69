//! Wire Frame Type and Canonical Encoding
//!
//! A frame is one complete tagged value on the wire. Each frame starts
//! with a single tag byte and is framed with CRLF:
//!
//! - `+` simple string, e.g. `+OK\r\n`
//! - `-` error, e.g. `-ERR unknown command 'FOO'\r\n`
//! - `:` integer, e.g. `:1000\r\n`
//! - `$` bulk string, e.g. `$5\r\nhello\r\n`; nil is `$-1\r\n`
//! - `*` array, e.g. `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`; nil is `*-1\r\n`
//!
//! Encoding is total: every frame variant has exactly one canonical byte
//! form, and a conforming decoder reproduces the original frame from it.

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used between frame parts
pub const CRLF: &[u8] = b"\r\n";

/// Frame tag bytes
pub mod tag {
    pub const SIMPLE: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// One tagged value on the wire.
///
/// Requests arrive as arrays of bulk strings (or the inline shorthand,
/// which the decoder normalizes to the same shape); replies are built
/// from the full set of variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Non-binary-safe string without embedded CRLF. `+<string>\r\n`
    Simple(String),

    /// Error reply. `-<message>\r\n`
    Error(String),

    /// 64-bit signed integer. `:<n>\r\n`
    Integer(i64),

    /// Binary-safe byte string. `$<len>\r\n<bytes>\r\n`
    Bulk(Bytes),

    /// Nil (absent value). Encoded as the nil bulk `$-1\r\n`.
    Null,

    /// Heterogeneous sequence of frames. `*<count>\r\n<frames...>`
    Array(Vec<Frame>),
}

impl Frame {
    pub fn simple(s: impl Into<String>) -> Self {
        Frame::Simple(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        Frame::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Frame::Integer(n)
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Frame::Bulk(data.into())
    }

    pub fn array(frames: Vec<Frame>) -> Self {
        Frame::Array(frames)
    }

    /// The canonical `+OK` reply.
    pub fn ok() -> Self {
        Frame::Simple("OK".to_string())
    }

    /// The canonical `+PONG` reply.
    pub fn pong() -> Self {
        Frame::Simple("PONG".to_string())
    }

    /// Encodes this frame into its canonical wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Encodes this frame into an existing buffer, for callers that reuse
    /// a per-connection reply buffer.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Frame::Simple(s) => {
                buf.push(tag::SIMPLE);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Frame::Error(s) => {
                buf.push(tag::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Frame::Integer(n) => {
                buf.push(tag::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Frame::Bulk(data) => {
                buf.push(tag::BULK);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            Frame::Null => {
                buf.extend_from_slice(b"$-1");
                buf.extend_from_slice(CRLF);
            }
            Frame::Array(frames) => {
                buf.push(tag::ARRAY);
                buf.extend_from_slice(frames.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for frame in frames {
                    frame.encode_into(buf);
                }
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }

    /// The inner bytes of a bulk frame, if this is one.
    pub fn as_bulk(&self) -> Option<&Bytes> {
        match self {
            Frame::Bulk(b) => Some(b),
            _ => None,
        }
    }

    /// The inner integer, if this is an integer frame.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Frame::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Borrows the elements of an array frame.
    pub fn as_array(&self) -> Option<&[Frame]> {
        match self {
            Frame::Array(frames) => Some(frames),
            _ => None,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "{}", s),
            Frame::Error(s) => write!(f, "(error) {}", s),
            Frame::Integer(n) => write!(f, "(integer) {}", n),
            Frame::Bulk(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary, {} bytes)", data.len()),
            },
            Frame::Null => write!(f, "(nil)"),
            Frame::Array(frames) => {
                if frames.is_empty() {
                    return write!(f, "(empty array)");
                }
                writeln!(f)?;
                for (i, frame) in frames.iter().enumerate() {
                    writeln!(f, "{}) {}", i + 1, frame)?;
                }
                Ok(())
            }
        }
    }
}
