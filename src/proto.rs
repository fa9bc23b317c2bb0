// Author: Lukas Bower

//! Wire-format helpers for the GDB remote serial protocol.
//!
//! Everything here is a pure function over byte/text payloads; sockets and
//! retries live in [`crate::transport`]. A request travels as `$payload#cs`
//! where `cs` is the modulo-256 sum of the payload bytes in two hex digits,
//! and replies use the same framing after a one-byte `+`/`-` acknowledgement.

use thiserror::Error;

/// Framing or payload decode failure for a single stub reply.
#[derive(Debug, Error)]
pub enum WireError {
    /// Checksum trailer disagreed with the received payload.
    #[error("checksum mismatch: expected {expected:02x}, got {actual:02x}")]
    Checksum {
        /// Checksum computed over the received payload.
        expected: u8,
        /// Checksum carried in the packet trailer.
        actual: u8,
    },
    /// Payload was not valid hex where hex was required.
    #[error("invalid hex payload `{0}`")]
    Hex(String),
    /// Run-length marker without a preceding character or repeat count.
    #[error("malformed run-length encoding")]
    Rle,
    /// Reply shape did not match the request that was issued.
    #[error("unexpected reply `{0}`")]
    Unexpected(String),
    /// Reply bytes were not valid UTF-8.
    #[error("non-text reply from stub")]
    NonText,
}

/// Classified stub reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Bare `OK`.
    Ok,
    /// Hex or free-form data payload.
    Data(String),
    /// `Exx` error reply with the stub's error code.
    Error(u8),
    /// Empty packet: the stub does not implement the request.
    Empty,
    /// Stop reply (`S`/`T`/`W`/`X`) delivered after a resume.
    Stop(StopReason),
}

/// Why a resumed target stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Stopped with a signal number (breakpoint hits arrive as SIGTRAP).
    Signal(u8),
    /// Target process exited with a status code.
    Exited(u8),
    /// Target was terminated by a signal.
    Terminated(u8),
    /// Stop reply we do not model further; kept verbatim for diagnostics.
    Other(String),
}

/// Modulo-256 checksum over a packet payload.
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte))
}

/// Frame a payload as a `$payload#cs` packet ready to write to the stub.
pub fn frame(payload: &str) -> Vec<u8> {
    format!("${payload}#{:02x}", checksum(payload.as_bytes())).into_bytes()
}

/// Expand the protocol's run-length encoding (`c*N` repeats `c` N-29 times).
pub fn expand_rle(raw: &str) -> Result<String, WireError> {
    let bytes = raw.as_bytes();
    let mut out = String::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'*' {
            let prev = out.as_bytes().last().copied().ok_or(WireError::Rle)?;
            let count = bytes.get(index + 1).copied().ok_or(WireError::Rle)?;
            if count < b' ' {
                return Err(WireError::Rle);
            }
            for _ in 0..(count - 29) {
                out.push(char::from(prev));
            }
            index += 2;
        } else {
            out.push(char::from(bytes[index]));
            index += 1;
        }
    }
    Ok(out)
}

/// Classify a decoded reply payload.
pub fn classify(payload: &str) -> Reply {
    if payload.is_empty() {
        return Reply::Empty;
    }
    if payload == "OK" {
        return Reply::Ok;
    }
    if let Some(code) = payload.strip_prefix('E') {
        if code.len() == 2 {
            if let Ok(code) = u8::from_str_radix(code, 16) {
                return Reply::Error(code);
            }
        }
    }
    if matches!(payload.as_bytes()[0], b'S' | b'T' | b'W' | b'X') {
        return Reply::Stop(parse_stop(payload));
    }
    Reply::Data(payload.to_owned())
}

/// Parse a stop reply payload into a [`StopReason`].
pub fn parse_stop(payload: &str) -> StopReason {
    let code = payload.get(1..3).and_then(|text| u8::from_str_radix(text, 16).ok());
    match (payload.as_bytes().first(), code) {
        (Some(b'S') | Some(b'T'), Some(signal)) => StopReason::Signal(signal),
        (Some(b'W'), Some(status)) => StopReason::Exited(status),
        (Some(b'X'), Some(signal)) => StopReason::Terminated(signal),
        _ => StopReason::Other(payload.to_owned()),
    }
}

/// Decode a hex payload carrying a little-endian scalar of up to eight bytes.
pub fn decode_hex_le(text: &str) -> Result<u64, WireError> {
    let bytes = hex::decode(text).map_err(|_| WireError::Hex(text.to_owned()))?;
    if bytes.is_empty() || bytes.len() > 8 {
        return Err(WireError::Hex(text.to_owned()));
    }
    let mut value = 0u64;
    for (index, byte) in bytes.iter().enumerate() {
        value |= u64::from(*byte) << (8 * index);
    }
    Ok(value)
}
