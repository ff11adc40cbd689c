//! The execution core: registers, stack frames, the fetch/execute loop, and
//! its per-opcode-group handlers.

pub mod engine;
pub mod frame;
pub mod handlers;

pub use engine::{BootState, CoreId, ExecutionCore};
pub use frame::StackFrame;
