// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Post-boot integrity checking for AdrOS kernel images.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Remote integrity checks for a freshly booted AdrOS kernel.
//!
//! `adroscheck` attaches to the debug stub of a paused QEMU instance, runs
//! the kernel to a checkpoint past subsystem initialization, and validates
//! structural invariants of the heap allocator, the physical memory manager
//! bitmap, and the fixed VGA mapping. Every check lands in one run-scoped
//! [`report::CheckRunner`]; the summary it folds out of the recorded
//! sequence decides the process exit status.
//!
//! The crate splits along the round-trip boundary: [`proto`] is the pure
//! wire format, [`transport`] owns the socket, [`query`] turns raw reads
//! into typed scalars, [`session`] sequences the lifecycle, and [`checks`]
//! holds the kernel-specific invariants driven by the binary in
//! `src/main.rs`.

pub mod checks;
pub mod layout;
pub mod proto;
pub mod query;
pub mod report;
pub mod session;
pub mod symbols;
pub mod transport;

pub use checks::run_suite;
pub use layout::{load_layout, KernelLayout, LayoutError};
pub use proto::StopReason;
pub use query::{QueryChannel, QueryError, QueryResult, Width};
pub use report::{Check, CheckRunner, Summary};
pub use session::{DebugSession, SessionError, SessionState, Teardown};
pub use symbols::{SymbolError, SymbolTable};
pub use transport::tcp::GdbRemote;
pub use transport::{ConnectError, Target, TransportError, QEMU_GDB_PORT};
