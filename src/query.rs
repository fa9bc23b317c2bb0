// Author: Lukas Bower

//! Typed scalar reads against a paused target.
//!
//! The kernel under inspection may be arbitrarily corrupt, so every read can
//! fail; failures come back as [`QueryError`] values for the caller to fold
//! into its report. Nothing here panics on target state and nothing escapes
//! this boundary as an unwind.

use thiserror::Error;

use crate::symbols::SymbolTable;
use crate::transport::{Target, TransportError};

/// Scalar width understood by the query layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    /// One byte.
    U8,
    /// 32-bit little-endian word.
    U32,
    /// 64-bit little-endian word.
    U64,
}

impl Width {
    /// Number of bytes fetched for this width.
    pub fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }

    fn mask(self) -> u64 {
        match self {
            Self::U8 => 0xff,
            Self::U32 => 0xffff_ffff,
            Self::U64 => u64::MAX,
        }
    }
}

/// Outcome of one target query.
pub type QueryResult<T> = Result<T, QueryError>;

/// Why a target query failed.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The stub refused the read, typically an unmapped address.
    #[error("address {0:#x} unreachable")]
    Unreachable(u64),
    /// The name is absent from the loaded symbol table (or none is loaded).
    #[error("symbol `{0}` not found")]
    SymbolNotFound(String),
    /// Channel-level failure: closed socket, timeout, framing error.
    #[error("protocol failure: {0}")]
    Protocol(String),
}

/// Borrowed view over a session's target and symbols issuing typed reads.
pub struct QueryChannel<'a, T: Target> {
    target: &'a mut T,
    symbols: &'a SymbolTable,
}

impl<'a, T: Target> QueryChannel<'a, T> {
    pub(crate) fn new(target: &'a mut T, symbols: &'a SymbolTable) -> Self {
        Self { target, symbols }
    }

    /// Read one scalar of the given width, masked to that width.
    pub fn read_scalar(&mut self, addr: u64, width: Width) -> QueryResult<u64> {
        let bytes = self.target.read_mem(addr, width.bytes()).map_err(|err| match err {
            TransportError::Stub(_) => QueryError::Unreachable(addr),
            other => QueryError::Protocol(other.to_string()),
        })?;
        if bytes.len() != width.bytes() {
            return Err(QueryError::Protocol(format!(
                "short read at {addr:#x}: {} of {} bytes",
                bytes.len(),
                width.bytes()
            )));
        }
        let mut value = 0u64;
        for (index, byte) in bytes.iter().enumerate() {
            value |= u64::from(*byte) << (8 * index);
        }
        Ok(value & width.mask())
    }

    /// Read a byte.
    pub fn read_u8(&mut self, addr: u64) -> QueryResult<u8> {
        self.read_scalar(addr, Width::U8).map(|value| value as u8)
    }

    /// Read a 32-bit word.
    pub fn read_u32(&mut self, addr: u64) -> QueryResult<u32> {
        self.read_scalar(addr, Width::U32).map(|value| value as u32)
    }

    /// Read a 64-bit word.
    pub fn read_u64(&mut self, addr: u64) -> QueryResult<u64> {
        self.read_scalar(addr, Width::U64)
    }

    /// Resolve `name` and read a scalar of the given width at its address.
    pub fn read_symbol(&mut self, name: &str, width: Width) -> QueryResult<u64> {
        let addr = self
            .symbols
            .address(name)
            .ok_or_else(|| QueryError::SymbolNotFound(name.to_owned()))?;
        self.read_scalar(addr, width)
    }
}
