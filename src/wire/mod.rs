//! Wire Codec
//!
//! Framed tagged values over a byte stream. The codec is the only layer
//! that touches raw protocol bytes:
//!
//! - `frame`: the [`Frame`] value type and its canonical encoding
//! - `decode`: the resumable [`Decoder`] for incoming bytes, including
//!   the inline (plain text line) ingress form
//!
//! Encoding is total and canonical; decoding either yields a frame, asks
//! for more bytes, or reports a protocol fault that ends the connection.

pub mod decode;
pub mod frame;

pub use decode::{decode_frame, DecodeError, DecodeResult, Decoder};
pub use frame::Frame;
