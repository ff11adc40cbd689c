//! Error types for the execution core.
//!
//! `CoreError` serves a dual purpose: it is the Rust error type returned
//! from fallible engine operations, and it is what `ExecutionCore::die`
//! logs when a core terminates abnormally. Storage failures never reach
//! this type directly — the virtual-interrupt layer translates them into
//! the R0 success/failure convention before they can propagate.

use thiserror::Error;

/// Errors raised during VM execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Fetch encountered an opcode with no registered handler.
    #[error("invalid opcode 0x{opcode:02X} at IP 0x{ip:04X}")]
    InvalidOpcode { opcode: u8, ip: u16 },

    /// A protected instruction, register, page, or port was touched
    /// outside privileged mode.
    #[error("access violation: {reason}")]
    AccessViolation { reason: &'static str },

    /// A port or other addressed resource has no registered handler.
    #[error("invalid resource: {kind} {id}")]
    InvalidResource { kind: &'static str, id: u32 },

    /// A self-consistency failure in the core: frame mismatch at RET/
    /// RETINT, a second suspend requested while one is already current,
    /// or similar invariant violation.
    #[error("CPU exception: {message}")]
    CpuException { message: String },
}

impl CoreError {
    pub fn access_violation(reason: &'static str) -> Self {
        CoreError::AccessViolation { reason }
    }

    pub fn cpu_exception(message: impl Into<String>) -> Self {
        CoreError::CpuException {
            message: message.into(),
        }
    }
}

/// Convenience result alias for core operations.
pub type Result<T> = core::result::Result<T, CoreError>;

/// Error raised by block-storage I/O. Never leaves the virtual-interrupt
/// handler — it is caught there and translated to R0=0xFFFF.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("storage access error: {0}")]
pub struct StorageAccessError(pub String);
