//! The virtual-interrupt table: synchronous `INT` handlers that run inline
//! against core state instead of going through vector-table dispatch and
//! full register save/restore. Block storage (`devices::block_storage`) is
//! the one concrete handler this crate ships.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::core::engine::ExecutionCore;
use crate::error::Result;

/// A virtual interrupt handler, invoked synchronously by `INT` when its
/// index is registered in the table. Unlike real interrupt entry, `run`
/// sees and mutates the calling core's register file directly.
pub trait VirtualInterruptHandler: Send {
    fn run(&self, core: &mut ExecutionCore) -> Result<()>;
}

pub struct VirtualInterruptTable {
    handlers: Mutex<HashMap<u8, Box<dyn VirtualInterruptHandler>>>,
}

impl VirtualInterruptTable {
    pub fn new() -> Self {
        VirtualInterruptTable { handlers: Mutex::new(HashMap::new()) }
    }

    pub fn register(&self, index: u8, handler: Box<dyn VirtualInterruptHandler>) {
        self.handlers.lock().unwrap().insert(index, handler);
    }

    pub fn is_virtual(&self, index: u8) -> bool {
        self.handlers.lock().unwrap().contains_key(&index)
    }

    /// Run the handler registered for `index` against `core`. Caller must
    /// have already confirmed `is_virtual(index)`.
    pub fn dispatch(&self, index: u8, core: &mut ExecutionCore) -> Result<()> {
        // The handler is removed for the duration of the call so a handler
        // that itself triggers `INT` reentrantly cannot deadlock on this
        // lock; it is reinserted immediately after.
        let handler = self.handlers.lock().unwrap().remove(&index);
        let result = match &handler {
            Some(h) => h.run(core),
            None => Ok(()),
        };
        if let Some(h) = handler {
            self.handlers.lock().unwrap().insert(index, h);
        }
        result
    }
}

impl Default for VirtualInterruptTable {
    fn default() -> Self {
        Self::new()
    }
}
