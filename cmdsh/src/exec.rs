//! Payload of an `exec` channel request.
//!
//! The command travels as an SSH `string`: a big-endian `u32` length
//! followed by exactly that many bytes.

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, Result};

/// Decode the command carried by an `exec` payload.
///
/// Payloads shorter than the length field, announcing an empty
/// command, or announcing more bytes than they carry are rejected.
/// Bytes after the announced command are ignored. Invalid UTF-8 is
/// replaced rather than rejected.
pub fn decode(payload: &[u8]) -> Result<String> {
    let (len, rest) = match (payload.get(..4), payload.get(4..)) {
        (Some(len), Some(rest)) => (BigEndian::read_u32(len) as usize, rest),
        _ => return Err(Error::MalformedRequest("exec payload too short")),
    };
    if len == 0 {
        return Err(Error::MalformedRequest("empty exec command"));
    }
    match rest.get(..len) {
        Some(command) => Ok(String::from_utf8_lossy(command).into_owned()),
        None => Err(Error::MalformedRequest("invalid exec command length")),
    }
}

/// Frame `command` the way an `exec` request carries it.
pub fn encode(command: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + command.len());
    buf.put_u32(command.len() as u32);
    buf.put_slice(command);
    buf.freeze()
}
