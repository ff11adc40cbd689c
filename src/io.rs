//! The I/O port bus. Grounded on the teacher's `IoHandler`/`IoDispatch`
//! pair, but with two deliberate behavioral changes the spec requires:
//! an unmapped port is `InvalidResource` rather than a silent bus-float,
//! and a protected port rejects unprivileged access with `AccessViolation`
//! rather than being served anyway.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{CoreError, Result};

/// A device reachable through the port bus.
pub trait PortHandler: Send {
    fn read_u8(&mut self, port: u16) -> Result<u8>;
    fn read_u16(&mut self, port: u16) -> Result<u16>;
    fn write_u8(&mut self, port: u16, value: u8) -> Result<()>;
    fn write_u16(&mut self, port: u16, value: u16) -> Result<()>;

    /// Whether this port requires the caller to be privileged. Defaults to
    /// unprotected; devices that need isolation override it.
    fn is_protected(&self, _port: u16) -> bool {
        false
    }
}

pub struct PortBus {
    handlers: Mutex<HashMap<u16, Box<dyn PortHandler>>>,
}

impl PortBus {
    pub fn new() -> Self {
        PortBus { handlers: Mutex::new(HashMap::new()) }
    }

    pub fn register(&self, port: u16, handler: Box<dyn PortHandler>) {
        self.handlers.lock().unwrap().insert(port, handler);
    }

    fn with_handler<T>(
        &self,
        port: u16,
        privileged: bool,
        f: impl FnOnce(&mut dyn PortHandler) -> Result<T>,
    ) -> Result<T> {
        let mut handlers = self.handlers.lock().unwrap();
        let handler = handlers
            .get_mut(&port)
            .ok_or(CoreError::InvalidResource { kind: "port", id: port as u32 })?;
        if handler.is_protected(port) && !privileged {
            return Err(CoreError::access_violation("access to protected port outside privileged mode"));
        }
        f(handler.as_mut())
    }

    pub fn read_u8(&self, port: u16, privileged: bool) -> Result<u8> {
        self.with_handler(port, privileged, |h| h.read_u8(port))
    }

    pub fn read_u16(&self, port: u16, privileged: bool) -> Result<u16> {
        self.with_handler(port, privileged, |h| h.read_u16(port))
    }

    pub fn write_u8(&self, port: u16, value: u8, privileged: bool) -> Result<()> {
        self.with_handler(port, privileged, |h| h.write_u8(port, value))
    }

    pub fn write_u16(&self, port: u16, value: u16, privileged: bool) -> Result<()> {
        self.with_handler(port, privileged, |h| h.write_u16(port, value))
    }
}

impl Default for PortBus {
    fn default() -> Self {
        Self::new()
    }
}
