// Author: Lukas Bower

//! Transport backends speaking to the target's remote debug stub.

use std::io;

use thiserror::Error;

use crate::proto::{StopReason, WireError};

pub mod tcp;

/// Default TCP port exposed by QEMU's debug stub (`qemu-system-* -s`).
pub const QEMU_GDB_PORT: u16 = 1234;

/// Failure establishing the control channel. Always fatal to the run.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Endpoint string did not resolve to a socket address.
    #[error("cannot resolve endpoint {0}")]
    Resolve(String),
    /// TCP connection could not be established or configured.
    #[error("cannot reach debug stub at {endpoint}: {source}")]
    Unreachable {
        /// Endpoint that was dialled.
        endpoint: String,
        /// Underlying socket error.
        source: io::Error,
    },
    /// The stub accepted the connection but failed the initial probe.
    #[error("stub probe failed: {0}")]
    Probe(#[from] TransportError),
}

/// Failure of a single stub round trip.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Peer closed the connection.
    #[error("connection closed by stub")]
    Closed,
    /// Stub rejected our packet with a `-` acknowledgement.
    #[error("stub rejected packet")]
    Nak,
    /// Stub answered with an `Exx` error reply.
    #[error("stub error reply E{0:02x}")]
    Stub(u8),
    /// Stub answered with an empty packet: request not implemented.
    #[error("stub does not support `{0}`")]
    Unsupported(String),
    /// Reply could not be decoded.
    #[error("malformed reply: {0}")]
    Wire(#[from] WireError),
    /// Socket-level failure, including read timeouts.
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),
}

/// One attached debug target. Every call is a single blocking round trip;
/// nothing here mutates target memory.
pub trait Target {
    /// Read `len` bytes of target memory starting at `addr`.
    fn read_mem(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, TransportError>;

    /// Read one general-purpose register by stub register number.
    fn read_register(&mut self, regno: u8) -> Result<u64, TransportError>;

    /// Insert a software breakpoint at `addr`.
    fn insert_breakpoint(&mut self, addr: u64) -> Result<(), TransportError>;

    /// Remove the software breakpoint at `addr`.
    fn remove_breakpoint(&mut self, addr: u64) -> Result<(), TransportError>;

    /// Resume execution and block until the target stops again.
    fn resume(&mut self) -> Result<StopReason, TransportError>;

    /// Kill the target. Best-effort: errors are logged, not returned.
    fn kill(&mut self);

    /// Detach from the target, leaving it running. Best-effort.
    fn detach(&mut self);
}
