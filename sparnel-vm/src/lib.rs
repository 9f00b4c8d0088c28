//! Register virtual machine for Sparnel bytecode.
//!
//! The VM executes instruction words over a contiguous register file
//! sliced into per-call windows by a frame stack. Globals resolve lazily
//! through the owning [`Context`], closures capture by value at creation,
//! and every runtime fault carries a call-stack snapshot.
//!
//! Hosts interact through [`Context`]: load source or compiled bytecode,
//! register native functions, call script functions with values and read
//! back results or the last error.

#![warn(missing_docs)]

mod backtrace;
mod consts;
mod context;
mod error;
mod fault;
mod frame;
mod globals;
mod vm;

pub use backtrace::Backtrace;
pub use consts::{DEFAULT_CALL_DEPTH, DEFAULT_REGISTER_FILE_CAPACITY};
pub use context::Context;
pub use error::{Error, ErrorKind, RuntimeError};
pub use fault::Fault;
pub use frame::Frame;
pub use globals::GlobalTable;
pub use vm::{Vm, VmParams};
