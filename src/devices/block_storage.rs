//! Block storage: the one concrete storage device this crate ships, reached
//! through the virtual-interrupt convention described in the interrupt
//! registration (`BlockIoVirtualInterrupt`). `FileBackedStorage` backs a
//! device by a real file opened on boot and closed on halt, grounded on the
//! teacher's IDE device but translated from 512-byte ATA sectors and an
//! in-memory disk image to a real file and 1024-byte blocks.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use log::{debug, warn};

use crate::core::engine::ExecutionCore;
use crate::error::{Result, StorageAccessError};
use crate::interrupts::VirtualInterruptHandler;
use crate::memory::segment::segment_addr_to_addr;

pub const BLOCK_SIZE: usize = 1024;

/// A device reachable by block id/count through `INT BLOCKIO`.
pub trait BlockStorage: Send {
    /// Total device size in bytes.
    fn size(&self) -> u64;
    fn read_block(&mut self, block: u16, buf: &mut [u8]) -> std::result::Result<(), StorageAccessError>;
    fn write_block(&mut self, block: u16, buf: &[u8]) -> std::result::Result<(), StorageAccessError>;

    /// Flush any buffered writes. Called on machine halt.
    fn flush(&mut self) -> std::result::Result<(), StorageAccessError> {
        Ok(())
    }
}

/// A block device backed by a real file, opened read/write on construction
/// and closed when dropped.
pub struct FileBackedStorage {
    file: File,
    size: u64,
}

impl FileBackedStorage {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();
        Ok(FileBackedStorage { file, size })
    }

    fn bounds_check(&self, block: u16, count: u64) -> std::result::Result<(), StorageAccessError> {
        let end = (block as u64 + count) * BLOCK_SIZE as u64;
        if end > self.size {
            return Err(StorageAccessError(format!(
                "block range {block}..{} exceeds device size {}",
                block as u64 + count,
                self.size
            )));
        }
        Ok(())
    }
}

impl BlockStorage for FileBackedStorage {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_block(&mut self, block: u16, buf: &mut [u8]) -> std::result::Result<(), StorageAccessError> {
        let count = (buf.len() / BLOCK_SIZE).max(1) as u64;
        self.bounds_check(block, count)?;
        self.file
            .seek(SeekFrom::Start(block as u64 * BLOCK_SIZE as u64))
            .and_then(|_| self.file.read_exact(buf))
            .map_err(|e| StorageAccessError(e.to_string()))
    }

    fn write_block(&mut self, block: u16, buf: &[u8]) -> std::result::Result<(), StorageAccessError> {
        let count = (buf.len() / BLOCK_SIZE).max(1) as u64;
        self.bounds_check(block, count)?;
        self.file
            .seek(SeekFrom::Start(block as u64 * BLOCK_SIZE as u64))
            .and_then(|_| self.file.write_all(buf))
            .map_err(|e| StorageAccessError(e.to_string()))
    }

    fn flush(&mut self) -> std::result::Result<(), StorageAccessError> {
        self.file.flush().map_err(|e| StorageAccessError(e.to_string()))
    }
}

/// Dispatches `INT BLOCKIO` calls to one of several registered devices by
/// id. Register layout on entry:
/// `R0` = device id, `R1` = 0 for read / 1 for write, `R4` low byte = block
/// count, `DS` low byte = segment for the memory side of the transfer.
/// Read: `R2` = source block id, `R3` = destination offset.
/// Write: `R2` = source offset, `R3` = destination block id.
/// `R0` is overwritten with 0 on success or 0xFFFF on any failure.
pub struct BlockIoVirtualInterrupt {
    devices: Mutex<HashMap<u16, Box<dyn BlockStorage>>>,
}

impl BlockIoVirtualInterrupt {
    pub fn new() -> Self {
        BlockIoVirtualInterrupt { devices: Mutex::new(HashMap::new()) }
    }

    pub fn register_device(&self, id: u16, device: Box<dyn BlockStorage>) {
        self.devices.lock().unwrap().insert(id, device);
    }

    /// Flush every registered device. Called on machine halt so pending
    /// writes reach disk before the process exits.
    pub fn flush_all(&self) {
        for (id, device) in self.devices.lock().unwrap().iter_mut() {
            if let Err(e) = device.flush() {
                warn!("storage device {id} failed to flush on halt: {e}");
            }
        }
    }

    fn fail(core: &mut ExecutionCore) -> Result<()> {
        core.regs_mut().set(0, 0xFFFF);
        Ok(())
    }

    fn ok(core: &mut ExecutionCore) -> Result<()> {
        core.regs_mut().set(0, 0);
        Ok(())
    }
}

impl Default for BlockIoVirtualInterrupt {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualInterruptHandler for BlockIoVirtualInterrupt {
    fn run(&self, core: &mut ExecutionCore) -> Result<()> {
        let (device_id, is_write, r2, r3, count) = {
            let regs = core.regs();
            (regs.get(0), regs.get(1) != 0, regs.get(2), regs.get(3), (regs.get(4) & 0xFF) as u8)
        };

        let mut devices = self.devices.lock().unwrap();
        let device = match devices.get_mut(&device_id) {
            Some(d) => d,
            None => {
                drop(devices);
                warn!("blockio: unknown device {device_id}");
                return Self::fail(core);
            }
        };

        let count = count.max(1) as usize;
        let mut buf = vec![0u8; BLOCK_SIZE * count];

        if !is_write {
            let (src_block, dst_offset) = (r2, r3);
            if device.read_block(src_block, &mut buf).is_err() {
                drop(devices);
                return Self::fail(core);
            }
            drop(devices);
            let ds = core.regs().ds();
            for (i, b) in buf.iter().enumerate() {
                let addr = segment_addr_to_addr(ds, dst_offset.wrapping_add(i as u16));
                if core.memory().write_u8(addr, *b, true).is_err() {
                    return Self::fail(core);
                }
            }
            debug!("blockio: read {count} block(s) from device {device_id} block {src_block}");
            Self::ok(core)
        } else {
            let (src_offset, dst_block) = (r2, r3);
            let ds = core.regs().ds();
            for (i, b) in buf.iter_mut().enumerate() {
                let addr = segment_addr_to_addr(ds, src_offset.wrapping_add(i as u16));
                match core.memory().read_u8(addr, true) {
                    Ok(v) => *b = v,
                    Err(_) => return Self::fail(core),
                }
            }
            if device.write_block(dst_block, &buf).is_err() {
                drop(devices);
                return Self::fail(core);
            }
            drop(devices);
            debug!("blockio: wrote {count} block(s) to device {device_id} block {dst_block}");
            Self::ok(core)
        }
    }
}
