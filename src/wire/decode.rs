//! Resumable Wire Decoder
//!
//! The decoder turns a byte stream into [`Frame`] values without ever
//! corrupting its own state on a short read. The contract mirrors how the
//! session loop drives it:
//!
//! - `Ok(Some((frame, consumed)))` - a full frame was decoded; the caller
//!   advances its buffer by `consumed` bytes
//! - `Ok(None)` - the buffer holds a prefix of a frame; read more bytes
//!   and try again
//! - `Err(DecodeError)` - the bytes violate the protocol; the connection
//!   must be closed after reporting the fault
//!
//! A line of text that does not start with a recognized tag byte is
//! accepted at the top level as the inline form: whitespace-split tokens
//! become a bulk-string array, so line-oriented clients can drive the
//! server. Inside an array, an unrecognized tag is a protocol error.
//!
//! Nesting depth, array counts and bulk payload sizes are capped to keep
//! adversarial inputs from exhausting memory.

use crate::wire::frame::{tag, Frame, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Maximum size of a single bulk payload (512 MB, same as Redis)
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Maximum number of elements in one array frame
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Maximum array nesting depth
pub const MAX_DEPTH: usize = 32;

/// Protocol faults. All of these are fatal to the connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Integer frame body is not a valid signed decimal
    #[error("invalid integer")]
    BadInteger,

    /// Bulk length header is not a valid length
    #[error("invalid bulk length")]
    BadBulkLength,

    /// Array count header is not a valid count
    #[error("invalid multibulk length")]
    BadArrayLength,

    /// A nested frame started with a byte that is not a tag
    #[error("unexpected byte {0:#04x} inside frame")]
    UnexpectedByte(u8),

    /// A frame part was terminated by something other than CRLF
    #[error("expected CRLF terminator")]
    MissingCrlf,

    /// Simple string, error or inline line is not valid UTF-8
    #[error("invalid UTF-8 in line")]
    BadUtf8,

    /// Bulk payload larger than [`MAX_BULK_LEN`]
    #[error("bulk payload exceeds {} bytes", MAX_BULK_LEN)]
    BulkTooLarge,

    /// Array with more than [`MAX_ARRAY_LEN`] elements
    #[error("array exceeds {} elements", MAX_ARRAY_LEN)]
    ArrayTooLarge,

    /// Arrays nested deeper than [`MAX_DEPTH`]
    #[error("nesting exceeds {} levels", MAX_DEPTH)]
    TooDeep,
}

/// Result type for decoding operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// A resumable frame decoder.
///
/// The decoder is stateless between top-level calls; it only tracks
/// nesting depth while descending into arrays, so a short read can be
/// retried with a longer buffer at any time.
#[derive(Debug, Default)]
pub struct Decoder {
    depth: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to decode the next top-level frame from `buf`.
    pub fn decode(&mut self, buf: &[u8]) -> DecodeResult<Option<(Frame, usize)>> {
        self.depth = 0;
        self.decode_frame(buf)
    }

    fn decode_frame(&mut self, buf: &[u8]) -> DecodeResult<Option<(Frame, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if self.depth > MAX_DEPTH {
            return Err(DecodeError::TooDeep);
        }

        match buf[0] {
            tag::SIMPLE => Ok(self.decode_line(buf)?.map(|(s, n)| (Frame::Simple(s), n))),
            tag::ERROR => Ok(self.decode_line(buf)?.map(|(s, n)| (Frame::Error(s), n))),
            tag::INTEGER => self.decode_integer(buf),
            tag::BULK => self.decode_bulk(buf),
            tag::ARRAY => self.decode_array(buf),
            // Inline form is only valid for a top-level request line.
            _ if self.depth == 0 => self.decode_inline(buf),
            other => Err(DecodeError::UnexpectedByte(other)),
        }
    }

    /// Decodes the CRLF-terminated UTF-8 body of a `+` or `-` frame.
    fn decode_line(&mut self, buf: &[u8]) -> DecodeResult<Option<(String, usize)>> {
        let Some(pos) = find_crlf(&buf[1..]) else {
            return Ok(None);
        };
        let body = std::str::from_utf8(&buf[1..1 + pos]).map_err(|_| DecodeError::BadUtf8)?;
        // 1 for the tag, 2 for the CRLF
        Ok(Some((body.to_string(), 1 + pos + 2)))
    }

    fn decode_integer(&mut self, buf: &[u8]) -> DecodeResult<Option<(Frame, usize)>> {
        let Some(pos) = find_crlf(&buf[1..]) else {
            return Ok(None);
        };
        let n = parse_decimal(&buf[1..1 + pos]).ok_or(DecodeError::BadInteger)?;
        Ok(Some((Frame::Integer(n), 1 + pos + 2)))
    }

    /// Decodes `$<len>\r\n<payload>\r\n`. `$-1\r\n` is nil.
    fn decode_bulk(&mut self, buf: &[u8]) -> DecodeResult<Option<(Frame, usize)>> {
        let Some(header_end) = find_crlf(&buf[1..]) else {
            return Ok(None);
        };
        let len = parse_decimal(&buf[1..1 + header_end]).ok_or(DecodeError::BadBulkLength)?;

        if len == -1 {
            return Ok(Some((Frame::Null, 1 + header_end + 2)));
        }
        if len < 0 {
            return Err(DecodeError::BadBulkLength);
        }
        let len = len as usize;
        if len > MAX_BULK_LEN {
            return Err(DecodeError::BulkTooLarge);
        }

        let payload_start = 1 + header_end + 2;
        let total = payload_start + len + 2;
        if buf.len() < total {
            return Ok(None);
        }

        // The payload must be followed by exactly CRLF; any other
        // terminator is a protocol fault.
        if &buf[payload_start + len..total] != CRLF {
            return Err(DecodeError::MissingCrlf);
        }

        let payload = Bytes::copy_from_slice(&buf[payload_start..payload_start + len]);
        Ok(Some((Frame::Bulk(payload), total)))
    }

    /// Decodes `*<count>\r\n` followed by `count` nested frames.
    fn decode_array(&mut self, buf: &[u8]) -> DecodeResult<Option<(Frame, usize)>> {
        let Some(header_end) = find_crlf(&buf[1..]) else {
            return Ok(None);
        };
        let count = parse_decimal(&buf[1..1 + header_end]).ok_or(DecodeError::BadArrayLength)?;

        if count == -1 {
            return Ok(Some((Frame::Null, 1 + header_end + 2)));
        }
        if count < 0 {
            return Err(DecodeError::BadArrayLength);
        }
        let count = count as usize;
        if count > MAX_ARRAY_LEN {
            return Err(DecodeError::ArrayTooLarge);
        }

        let mut consumed = 1 + header_end + 2;
        let mut frames = Vec::with_capacity(count.min(1024));

        self.depth += 1;
        for _ in 0..count {
            match self.decode_frame(&buf[consumed..])? {
                Some((frame, n)) => {
                    frames.push(frame);
                    consumed += n;
                }
                None => return Ok(None),
            }
        }
        self.depth -= 1;

        Ok(Some((Frame::Array(frames), consumed)))
    }

    /// Decodes a plain text line into a bulk-string array. A blank line
    /// yields an empty array, which the session ignores.
    fn decode_inline(&mut self, buf: &[u8]) -> DecodeResult<Option<(Frame, usize)>> {
        let Some(pos) = find_crlf(buf) else {
            return Ok(None);
        };
        let line = std::str::from_utf8(&buf[..pos]).map_err(|_| DecodeError::BadUtf8)?;

        let frames: Vec<Frame> = line
            .split_ascii_whitespace()
            .map(|token| Frame::Bulk(Bytes::copy_from_slice(token.as_bytes())))
            .collect();

        Ok(Some((Frame::Array(frames), pos + 2)))
    }
}

/// Finds the first CRLF pair, returning the index of the `\r`.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|pair| pair == CRLF)
}

/// Parses an ASCII signed decimal without going through a String.
fn parse_decimal(digits: &[u8]) -> Option<i64> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Decodes a single frame from a byte slice, for one-shot callers.
pub fn decode_frame(buf: &[u8]) -> DecodeResult<Option<(Frame, usize)>> {
    Decoder::new().decode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_string() {
        let (frame, consumed) = decode_frame(b"+OK\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::simple("OK"));
        assert_eq!(consumed, 5);
    }

    #[test]
    fn simple_string_short_read() {
        assert!(decode_frame(b"+OK").unwrap().is_none());
        assert!(decode_frame(b"+OK\r").unwrap().is_none());
    }

    #[test]
    fn error_frame() {
        let (frame, consumed) = decode_frame(b"-ERR syntax error\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::error("ERR syntax error"));
        assert_eq!(consumed, 19);
    }

    #[test]
    fn integers() {
        let (frame, consumed) = decode_frame(b":1000\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::integer(1000));
        assert_eq!(consumed, 7);

        let (frame, _) = decode_frame(b":-42\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::integer(-42));
    }

    #[test]
    fn bad_integer() {
        assert_eq!(
            decode_frame(b":not_a_number\r\n"),
            Err(DecodeError::BadInteger)
        );
    }

    #[test]
    fn bulk_string() {
        let (frame, consumed) = decode_frame(b"$5\r\nhello\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::bulk(Bytes::from("hello")));
        assert_eq!(consumed, 11);
    }

    #[test]
    fn empty_bulk() {
        let (frame, consumed) = decode_frame(b"$0\r\n\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::bulk(Bytes::new()));
        assert_eq!(consumed, 6);
    }

    #[test]
    fn nil_bulk() {
        let (frame, consumed) = decode_frame(b"$-1\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::Null);
        assert_eq!(consumed, 5);
    }

    #[test]
    fn bulk_short_read_then_complete() {
        let mut decoder = Decoder::new();
        assert!(decoder.decode(b"$5\r\nhel").unwrap().is_none());
        let (frame, consumed) = decoder.decode(b"$5\r\nhello\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::bulk(Bytes::from("hello")));
        assert_eq!(consumed, 11);
    }

    #[test]
    fn bulk_bad_terminator() {
        assert_eq!(decode_frame(b"$3\r\nGETxx"), Err(DecodeError::MissingCrlf));
    }

    #[test]
    fn bulk_negative_length() {
        assert_eq!(decode_frame(b"$-7\r\n"), Err(DecodeError::BadBulkLength));
    }

    #[test]
    fn binary_safe_bulk() {
        let (frame, _) = decode_frame(b"$5\r\nhe\x00\xffo\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::bulk(Bytes::from_static(b"he\x00\xffo")));
    }

    #[test]
    fn request_array() {
        let (frame, consumed) = decode_frame(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(
            frame,
            Frame::array(vec![
                Frame::bulk(Bytes::from("GET")),
                Frame::bulk(Bytes::from("name")),
            ])
        );
        assert_eq!(consumed, 23);
    }

    #[test]
    fn nil_array() {
        let (frame, _) = decode_frame(b"*-1\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::Null);
    }

    #[test]
    fn empty_array() {
        let (frame, _) = decode_frame(b"*0\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::array(vec![]));
    }

    #[test]
    fn nested_array() {
        let (frame, _) = decode_frame(b"*2\r\n:1\r\n*2\r\n:2\r\n:3\r\n").unwrap().unwrap();
        assert_eq!(
            frame,
            Frame::array(vec![
                Frame::integer(1),
                Frame::array(vec![Frame::integer(2), Frame::integer(3)]),
            ])
        );
    }

    #[test]
    fn array_short_read() {
        assert!(decode_frame(b"*2\r\n$3\r\nGET\r\n").unwrap().is_none());
        assert!(decode_frame(b"*2\r\n$3\r\nGET\r\n$4\r\nna").unwrap().is_none());
    }

    #[test]
    fn untagged_array_element_is_fatal() {
        // A bare token where a bulk header belongs must not be treated as
        // inline form; only top-level lines get that shorthand.
        assert_eq!(
            decode_frame(b"*2\r\n$3\r\nGET\r\nXYZ"),
            Err(DecodeError::UnexpectedByte(b'X'))
        );
    }

    #[test]
    fn nesting_cap() {
        let deep = b"*1\r\n".repeat(MAX_DEPTH + 2);
        assert_eq!(decode_frame(&deep), Err(DecodeError::TooDeep));
    }

    #[test]
    fn inline_command() {
        let (frame, consumed) = decode_frame(b"SET name Alice\r\n").unwrap().unwrap();
        assert_eq!(
            frame,
            Frame::array(vec![
                Frame::bulk(Bytes::from("SET")),
                Frame::bulk(Bytes::from("name")),
                Frame::bulk(Bytes::from("Alice")),
            ])
        );
        assert_eq!(consumed, 16);
    }

    #[test]
    fn inline_collapses_whitespace() {
        let (frame, _) = decode_frame(b"  PING   \r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::array(vec![Frame::bulk(Bytes::from("PING"))]));
    }

    #[test]
    fn blank_inline_line_is_empty_request() {
        let (frame, consumed) = decode_frame(b"\r\n").unwrap().unwrap();
        assert_eq!(frame, Frame::array(vec![]));
        assert_eq!(consumed, 2);
    }

    #[test]
    fn roundtrip() {
        let original = Frame::array(vec![
            Frame::bulk(Bytes::from("MSET")),
            Frame::bulk(Bytes::from("k")),
            Frame::bulk(Bytes::from_static(b"\x00\x01\x02")),
        ]);
        let encoded = original.encode();
        let (decoded, consumed) = decode_frame(&encoded).unwrap().unwrap();
        assert_eq!(decoded, original);
        assert_eq!(consumed, encoded.len());
        // And the re-encoding is byte-identical.
        assert_eq!(decoded.encode(), encoded);
    }

    #[test]
    fn pipelined_frames_consume_exactly_one() {
        let buf = b"+OK\r\n:1\r\n";
        let (frame, consumed) = decode_frame(buf).unwrap().unwrap();
        assert_eq!(frame, Frame::simple("OK"));
        assert_eq!(consumed, 5);
        let (frame, _) = decode_frame(&buf[consumed..]).unwrap().unwrap();
        assert_eq!(frame, Frame::integer(1));
    }
}
