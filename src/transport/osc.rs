//! OSC message framing
//!
//! A [`Datagram`] maps onto the smallest useful OSC 1.0 message:
//! - address pattern (OSC-string)
//! - type tag string, first tag `s`
//! - the payload as an OSC-string argument
//!
//! OSC-strings are null terminated and padded with nulls to a 4 byte boundary.
//! Arguments after the first are ignored on decode.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::Datagram;

/// Prefix that marks an OSC bundle rather than a message
const BUNDLE_TAG: &[u8] = b"#bundle";

/// OSC framing errors
#[derive(Error, Debug)]
pub enum OscError {
    #[error("Empty datagram")]
    Empty,

    #[error("OSC bundles are not supported")]
    Bundle,

    #[error("Invalid address pattern: {0:?}")]
    InvalidAddress(String),

    #[error("Unterminated OSC string")]
    Unterminated,

    #[error("Truncated datagram")]
    Truncated,

    #[error("Missing type tag string")]
    MissingTypeTags,

    #[error("Message has no arguments")]
    NoArguments,

    #[error("Expected a string argument, found type tag '{0}'")]
    UnexpectedType(char),

    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type OscResult<T> = Result<T, OscError>;

/// Padded on-wire length of an OSC-string holding `len` bytes
fn padded_len(len: usize) -> usize {
    (len / 4 + 1) * 4
}

fn put_osc_string(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_bytes(0, padded_len(s.len()) - s.len());
}

fn read_osc_string(buf: &mut &[u8]) -> OscResult<String> {
    let end = buf
        .iter()
        .position(|b| *b == 0)
        .ok_or(OscError::Unterminated)?;
    let padded = padded_len(end);
    if buf.len() < padded {
        return Err(OscError::Truncated);
    }

    let s = String::from_utf8(buf[..end].to_vec())?;
    buf.advance(padded);
    Ok(s)
}

/// Encode a datagram as an OSC message
pub fn encode(datagram: &Datagram) -> Bytes {
    let mut buf = BytesMut::with_capacity(
        padded_len(datagram.address.len()) + 4 + padded_len(datagram.payload.len()),
    );
    put_osc_string(&mut buf, &datagram.address);
    put_osc_string(&mut buf, ",s");
    put_osc_string(&mut buf, &datagram.payload);
    buf.freeze()
}

/// Decode an OSC message into a datagram
pub fn decode(mut buf: &[u8]) -> OscResult<Datagram> {
    if buf.is_empty() {
        return Err(OscError::Empty);
    }
    if buf.starts_with(BUNDLE_TAG) {
        return Err(OscError::Bundle);
    }

    let address = read_osc_string(&mut buf)?;
    if !address.starts_with('/') {
        return Err(OscError::InvalidAddress(address));
    }

    if !buf.has_remaining() {
        return Err(OscError::MissingTypeTags);
    }
    let tags = read_osc_string(&mut buf)?;
    let mut tags = tags.chars();
    if tags.next() != Some(',') {
        return Err(OscError::MissingTypeTags);
    }

    match tags.next() {
        Some('s') => {
            let payload = read_osc_string(&mut buf)?;
            Ok(Datagram { address, payload })
        }
        Some(other) => Err(OscError::UnexpectedType(other)),
        None => Err(OscError::NoArguments),
    }
}
