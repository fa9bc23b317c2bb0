// Author: Lukas Bower

//! Attach/terminate lifecycle for one inspected target.

use std::path::Path;

use log::{debug, warn};
use thiserror::Error;

use crate::query::QueryChannel;
use crate::symbols::{SymbolError, SymbolTable};
use crate::transport::{Target, TransportError};

/// Stub register number of `esp` on i386 targets.
const ESP_REGNO: u8 = 4;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No control channel yet.
    Disconnected,
    /// Channel established, no symbols loaded.
    Connected,
    /// Kernel image symbols available.
    SymbolsLoaded,
    /// Resumed towards the checkpoint breakpoint.
    RunningToCheckpoint,
    /// Stopped with the target inspectable.
    Paused,
    /// Target killed or released; no further transition is valid.
    Terminated,
}

/// How the target is released at the end of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Kill the target outright (the default; matches a scripted QEMU run).
    Kill,
    /// Detach and leave the target running.
    Detach,
}

/// Failure of a session control operation.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Operation is not legal in the current lifecycle state.
    #[error("operation invalid in session state {0:?}")]
    InvalidState(SessionState),
    /// The checkpoint symbol is missing from the loaded table.
    #[error("checkpoint symbol `{0}` not found in image")]
    CheckpointNotFound(String),
    /// The return-address read during step-out came back short.
    #[error("could not read return address at {0:#x}")]
    BadReturnAddress(u64),
    /// Underlying stub round trip failed.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}

/// One attached debug session, exclusively owning its transport.
///
/// The session is the only holder of the control channel for the run, and
/// releasing the target is tied to scope: dropping the session terminates it
/// if the caller has not already done so.
pub struct DebugSession<T: Target> {
    target: T,
    symbols: SymbolTable,
    state: SessionState,
    teardown: Teardown,
}

impl<T: Target> DebugSession<T> {
    /// Wrap an established control channel into a session.
    pub fn attach(target: T, teardown: Teardown) -> Self {
        Self {
            target,
            symbols: SymbolTable::default(),
            state: SessionState::Connected,
            teardown,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Symbols currently installed.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Load symbols from the kernel ELF image. Best-effort at the call site:
    /// a failure leaves the session usable and later symbol queries fail
    /// individually instead.
    pub fn load_symbols(&mut self, path: &Path) -> Result<(), SymbolError> {
        let table = SymbolTable::load(path)?;
        self.install_symbols(table);
        Ok(())
    }

    /// Install an already-built symbol table.
    pub fn install_symbols(&mut self, table: SymbolTable) {
        self.symbols = table;
        if self.state == SessionState::Connected {
            self.state = SessionState::SymbolsLoaded;
        }
    }

    /// Break at `symbol` and resume until the target reaches it.
    ///
    /// The checkpoint is chosen so that kernel bootstrap is complete when it
    /// is hit; reaching it leaves the target paused and inspectable.
    pub fn run_to_checkpoint(&mut self, symbol: &str) -> Result<(), SessionError> {
        match self.state {
            SessionState::Connected | SessionState::SymbolsLoaded => {}
            state => return Err(SessionError::InvalidState(state)),
        }
        let addr = self
            .symbols
            .address(symbol)
            .ok_or_else(|| SessionError::CheckpointNotFound(symbol.to_owned()))?;
        self.state = SessionState::RunningToCheckpoint;
        self.target.insert_breakpoint(addr)?;
        let stop = self.target.resume()?;
        debug!("checkpoint {symbol} reached: {stop:?}");
        if let Err(err) = self.target.remove_breakpoint(addr) {
            warn!("could not remove checkpoint breakpoint: {err}");
        }
        self.state = SessionState::Paused;
        Ok(())
    }

    /// Run the checkpoint function to completion.
    ///
    /// Valid only while paused at the checkpoint's first instruction: the
    /// return address is the word at `[esp]`, so break there and resume.
    pub fn step_out(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Paused {
            return Err(SessionError::InvalidState(self.state));
        }
        let sp = self.target.read_register(ESP_REGNO)?;
        let bytes = self.target.read_mem(sp, 4)?;
        if bytes.len() < 4 {
            return Err(SessionError::BadReturnAddress(sp));
        }
        let ra = u64::from(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));
        self.target.insert_breakpoint(ra)?;
        let stop = self.target.resume()?;
        debug!("stepped out to {ra:#x}: {stop:?}");
        if let Err(err) = self.target.remove_breakpoint(ra) {
            warn!("could not remove step-out breakpoint: {err}");
        }
        Ok(())
    }

    /// Open a typed query channel over the paused target.
    pub fn query(&mut self) -> QueryChannel<'_, T> {
        QueryChannel::new(&mut self.target, &self.symbols)
    }

    /// Release the target. Idempotent; runs at most once per session.
    pub fn terminate(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }
        match self.teardown {
            Teardown::Kill => self.target.kill(),
            Teardown::Detach => self.target.detach(),
        }
        self.state = SessionState::Terminated;
    }
}

impl<T: Target> Drop for DebugSession<T> {
    fn drop(&mut self) {
        self.terminate();
    }
}
