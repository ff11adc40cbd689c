//! The execution core: registers, call-frame stack, instruction cache, and
//! the fetch/execute loop. One `ExecutionCore` runs on its own OS thread;
//! memory, the port bus, and the virtual-interrupt table are shared via
//! `Arc` with every other core on the machine.

use std::sync::Arc;

use log::{error, info, trace};

use crate::bus::{Message, MessageBus, WakeEvent};
use crate::cache::InstructionCache;
use crate::core::frame::StackFrame;
use crate::core::handlers;
use crate::error::{CoreError, Result};
use crate::instruction::decode_at;
use crate::interrupts::VirtualInterruptTable;
use crate::io::PortBus;
use crate::memory::page::PageFlags;
use crate::memory::segment::segment_addr_to_addr;
use crate::memory::MemoryController;
use crate::registers::{flag_bits, RegisterFile, REGISTER_SPECIAL};

/// Identifies a core within a machine; doubles as its message-bus endpoint
/// id (`(cpu_id << 16) | core_id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoreId {
    pub cpu_id: u16,
    pub core_id: u16,
}

impl CoreId {
    pub fn endpoint_id(self) -> u32 {
        ((self.cpu_id as u32) << 16) | self.core_id as u32
    }
}

/// The initial architectural state a core boots into.
#[derive(Debug, Clone, Copy)]
pub struct BootState {
    pub cs: u8,
    pub ds: u8,
    pub sp: u16,
    pub ip: u16,
    pub privileged: bool,
}

pub struct ExecutionCore {
    pub id: CoreId,
    regs: RegisterFile,
    memory: Arc<MemoryController>,
    port_bus: Arc<PortBus>,
    virtual_interrupts: Arc<VirtualInterruptTable>,
    bus: Arc<MessageBus>,
    cache: InstructionCache,
    frames: Vec<StackFrame>,
    /// Page index of each currently-active interrupt stack, innermost last.
    /// Pushed by `enter_interrupt`, popped and freed by `retint`.
    interrupt_stack_pages: Vec<u32>,

    pub interrupt_table_base: u32,
    pub irq_table_base: u32,

    keep_running: bool,
    idle: bool,
    exit_code: i32,
    planned_suspend: Option<WakeEvent>,
}

impl ExecutionCore {
    pub fn new(
        id: CoreId,
        memory: Arc<MemoryController>,
        port_bus: Arc<PortBus>,
        virtual_interrupts: Arc<VirtualInterruptTable>,
        bus: Arc<MessageBus>,
        interrupt_table_base: u32,
        irq_table_base: u32,
    ) -> Self {
        bus.register(id.endpoint_id());
        ExecutionCore {
            id,
            regs: RegisterFile::new(),
            memory,
            port_bus,
            virtual_interrupts,
            bus,
            cache: InstructionCache::new(),
            frames: Vec::new(),
            interrupt_stack_pages: Vec::new(),
            interrupt_table_base,
            irq_table_base,
            keep_running: true,
            idle: false,
            exit_code: 0,
            planned_suspend: None,
        }
    }

    pub fn regs(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn regs_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    pub fn memory(&self) -> &MemoryController {
        &self.memory
    }

    pub fn port_bus(&self) -> &PortBus {
        &self.port_bus
    }

    pub fn is_running(&self) -> bool {
        self.keep_running
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// Boot this core into `state`, clearing every resettable register
    /// first per `reset()`.
    pub fn boot(&mut self, state: BootState) {
        self.reset();
        self.regs.set_cs(state.cs);
        self.regs.set_ds(state.ds);
        self.regs.set_sp(state.sp);
        self.regs.set_ip(state.ip);
        self.regs.set_flag(flag_bits::PRIVILEGED, state.privileged);
        self.keep_running = true;
    }

    /// Clear resettable registers, the call-frame stack, and the
    /// instruction cache. `CS`/`IP` survive and must be set explicitly
    /// (normally by `boot`).
    pub fn reset(&mut self) {
        self.regs.reset();
        self.frames.clear();
        self.cache.clear();
        self.idle = false;
    }

    // --- stack discipline -------------------------------------------------

    /// `__push`: write `value` at `DS:SP`, then predecrement `SP` by 2.
    pub fn push(&mut self, value: u16) -> Result<()> {
        let ds = self.regs.ds();
        let sp = self.regs.sp();
        let addr = segment_addr_to_addr(ds, sp.wrapping_sub(2));
        self.memory.write_u16(addr, value, self.regs.privileged())?;
        self.regs.set_sp(sp.wrapping_sub(2));
        Ok(())
    }

    /// `__pop`: postincrement `SP` by 2, then read the value at `DS:SP`.
    pub fn pop(&mut self) -> Result<u16> {
        let ds = self.regs.ds();
        let sp = self.regs.sp();
        let addr = segment_addr_to_addr(ds, sp);
        let value = self.memory.read_u16(addr, self.regs.privileged())?;
        self.regs.set_sp(sp.wrapping_add(2));
        Ok(value)
    }

    /// `CALL`: push return `IP` and the old `FP`, set `FP = SP`, and record
    /// a new stack frame.
    pub fn call(&mut self, target_ip: u16) -> Result<()> {
        let return_ip = self.regs.ip();
        let old_fp = self.regs.fp();
        self.push(return_ip)?;
        self.push(old_fp)?;
        self.regs.set_fp(self.regs.sp());
        self.frames.push(StackFrame { cs: self.regs.cs(), ds: self.regs.ds(), fp: self.regs.fp() });
        self.regs.set_ip(target_ip);
        Ok(())
    }

    /// `RET`: require `SP == frame.fp`, pop `FP` then `IP`, and destroy the
    /// top frame.
    pub fn ret(&mut self) -> Result<()> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| CoreError::cpu_exception("RET with no active call frame"))?;
        if self.regs.sp() != frame.fp {
            self.frames.push(frame);
            return Err(CoreError::cpu_exception("RET: stack pointer does not match frame pointer"));
        }
        let old_fp = self.pop()?;
        let return_ip = self.pop()?;
        self.regs.set_fp(old_fp);
        self.regs.set_ip(return_ip);
        Ok(())
    }

    // --- interrupt entry/exit ----------------------------------------------

    /// Common entry sequence for both `INT` (real, non-virtual index) and
    /// hardware IRQ delivery: load the vector, switch onto a fresh
    /// privileged stack, save the full register file, and jump to the
    /// handler.
    fn enter_interrupt(&mut self, table_base: u32, index: u8) -> Result<()> {
        let vector = self.memory.load_interrupt_vector(table_base, index)?;

        let old_ds = self.regs.ds();
        let old_sp = self.regs.sp();
        let old_cs = self.regs.cs();
        let old_flags = self.regs.flags();

        let (stack_page, stack_top) = self.memory.alloc_stack(vector.ds)?;
        self.interrupt_stack_pages.push(stack_page);
        self.regs.set_ds(vector.ds);
        self.regs.set_sp(stack_top);

        self.push(old_ds)?;
        self.push(old_sp)?;
        self.push(old_cs)?;
        self.push(old_flags)?;
        for idx in 0..REGISTER_SPECIAL {
            let v = self.regs.get(idx);
            self.push(v)?;
        }

        let entry_ip = vector.ip;
        self.call(entry_ip)?;

        self.regs.set_flag(flag_bits::PRIVILEGED, true);
        self.regs.set_cs(vector.cs);
        self.regs.set_ip(entry_ip);
        Ok(())
    }

    /// `INT k`: dispatch synchronously to a registered virtual-interrupt
    /// handler if `k` is virtual, otherwise go through real vector-table
    /// entry.
    pub fn int(&mut self, index: u8) -> Result<()> {
        let table = self.virtual_interrupts.clone();
        if table.is_virtual(index) {
            table.dispatch(index, self)
        } else {
            self.interrupt(index)
        }
    }

    /// Real (non-virtual) `INT k` vector-table entry.
    fn interrupt(&mut self, index: u8) -> Result<()> {
        self.enter_interrupt(self.interrupt_table_base, index)
    }

    /// Hardware IRQ delivery from the message bus.
    pub fn irq(&mut self, source: u8) -> Result<()> {
        self.enter_interrupt(self.irq_table_base, source)?;
        self.regs.set_flag(flag_bits::HWINT, false);
        self.idle = false;
        Ok(())
    }

    /// `RETINT`: tear down the interrupt frame, restore every general
    /// register, `FLAGS`, `CS`, then the caller's stack, freeing the
    /// privileged stack page along the way.
    pub fn retint(&mut self) -> Result<()> {
        if !self.regs.privileged() {
            return Err(CoreError::access_violation("RETINT outside privileged mode"));
        }
        self.ret()?;

        for idx in (0..REGISTER_SPECIAL).rev() {
            let v = self.pop()?;
            self.regs.set(idx, v);
        }
        let flags = self.pop()?;
        let cs = self.pop()?;
        let old_sp = self.pop()?;
        let old_ds = self.pop()?;

        let stack_page = self
            .interrupt_stack_pages
            .pop()
            .ok_or_else(|| CoreError::cpu_exception("RETINT with no active interrupt stack"))?;
        self.memory.free_page(stack_page);

        self.regs.set_cs(cs as u8);
        self.regs.set_flags(flags);
        self.regs.set_sp(old_sp);
        self.regs.set_ds(old_ds as u8);
        Ok(())
    }

    // --- privilege helpers --------------------------------------------------

    pub fn require_privileged(&self, reason: &'static str) -> Result<()> {
        if self.regs.privileged() {
            Ok(())
        } else {
            Err(CoreError::access_violation(reason))
        }
    }

    pub fn planned_suspend(&self) -> Option<&WakeEvent> {
        self.planned_suspend.as_ref()
    }

    pub fn arm_suspend(&mut self, wake: WakeEvent) {
        self.planned_suspend = Some(wake);
    }

    // --- event handling -----------------------------------------------------

    /// Drain at most one pending bus message. Blocks if the core is idle;
    /// otherwise polls without blocking unless `hwint` is set, in which
    /// case IRQs are still delivered promptly but the core never blocks
    /// while running.
    fn check_for_events(&mut self) -> Result<()> {
        let endpoint = self.id.endpoint_id();

        if let Some(wake) = self.planned_suspend.take() {
            crate::bus::wait(&wake);
        }

        let delivery = if self.idle {
            Some(self.bus.recv_blocking(endpoint))
        } else {
            self.bus.poll(endpoint)
        };

        let Some(delivery) = delivery else {
            return Ok(());
        };

        // IRQ delivery is gated by hwint: while masked, leave the message
        // queued (at the front, preserving FIFO order) instead of acking it.
        if matches!(delivery.message, Message::HandleIrq { .. }) && !self.regs.flag(flag_bits::HWINT) {
            self.bus.requeue_front(endpoint, delivery);
            return Ok(());
        }

        let result = match &delivery.message {
            Message::HaltCore => {
                self.keep_running = false;
                Ok(())
            }
            Message::HandleIrq { source } => self.irq(*source),
            Message::SuspendCore { wake } => {
                self.planned_suspend = Some(wake.clone());
                Ok(())
            }
        };
        delivery.delivered();
        result
    }

    /// Run a single fetch/execute cycle. Returns `Ok(false)` once the core
    /// has stopped running (after `die()` or a `HaltCore` message), `Ok(true)`
    /// to keep going.
    pub fn step(&mut self) -> Result<bool> {
        if let Err(e) = self.check_for_events() {
            self.die(e);
            return Ok(false);
        }
        if !self.keep_running {
            return Ok(false);
        }
        if self.idle {
            return Ok(true);
        }

        let phys = segment_addr_to_addr(self.regs.cs(), self.regs.ip());
        let instr = match self.cache.get(phys) {
            Some(i) => i,
            None => {
                let word = match self.memory.read_u32(phys, true) {
                    Ok(w) => w,
                    Err(e) => {
                        self.die(e);
                        return Ok(false);
                    }
                };
                let decoded = match decode_at(word, self.regs.ip()) {
                    Ok(d) => d,
                    Err(e) => {
                        self.die(e);
                        return Ok(false);
                    }
                };
                self.cache.insert(phys, decoded);
                decoded
            }
        };

        self.regs.set_ip(self.regs.ip().wrapping_add(4));

        trace!("core {:?}: exec {:?} at ip={:#06x}", self.id, instr.opcode, self.regs.ip().wrapping_sub(4));

        if let Err(e) = handlers::dispatch(self, &instr) {
            self.die(e);
            return Ok(false);
        }

        Ok(true)
    }

    /// Terminate the core after an unrecoverable `CoreError`: log the full
    /// state, set exit code 1, stop the loop, and wake any pending
    /// suspension so joiners do not hang.
    pub fn die(&mut self, err: CoreError) {
        error!(
            "core {:?} died: {err}; ip={:#06x} cs={:#04x} ds={:#04x} sp={:#06x} flags={:#06x}",
            self.id,
            self.regs.ip(),
            self.regs.cs(),
            self.regs.ds(),
            self.regs.sp(),
            self.regs.flags()
        );
        self.keep_running = false;
        self.exit_code = 1;
        if let Some(wake) = self.planned_suspend.take() {
            crate::bus::signal(&wake);
        }
    }

    pub fn halt(&mut self, exit_code: i32) {
        info!("core {:?} halted with exit code {exit_code}", self.id);
        self.keep_running = false;
        self.exit_code = exit_code;
        if let Some(wake) = self.planned_suspend.take() {
            crate::bus::signal(&wake);
        }
    }

    pub fn set_idle(&mut self, idle: bool) {
        self.idle = idle;
    }

    pub fn alloc_privileged_page(&self) -> u32 {
        self.memory.alloc_page(PageFlags::privileged_rw())
    }

    /// Run the fetch/execute loop to completion on the current thread.
    pub fn run(&mut self) {
        while self.keep_running {
            match self.step() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(_) => unreachable!("step() reports failures through die(), not Err"),
            }
        }
    }
}
