//! Shared scaffolding for the integration tests: a tiny machine with a code
//! and a data segment pre-allocated, plus helpers to assemble the handful
//! of instruction words each scenario needs.

use std::sync::Arc;

use segvm_core::bus::MessageBus;
use segvm_core::core::{BootState, CoreId, ExecutionCore};
use segvm_core::instruction::{encode, Opcode};
use segvm_core::interrupts::VirtualInterruptTable;
use segvm_core::io::PortBus;
use segvm_core::memory::page::PageFlags;
use segvm_core::memory::MemoryController;

pub const CODE_SEGMENT: u8 = 0;
pub const DATA_SEGMENT: u8 = 1;

/// Shared resources a machine's cores all hold handles to, without the
/// full `Machine`/`BootConfig` boot ceremony the tests don't need.
pub struct TestMachine {
    pub memory: Arc<MemoryController>,
    pub bus: Arc<MessageBus>,
    pub port_bus: Arc<PortBus>,
    pub virtual_interrupts: Arc<VirtualInterruptTable>,
}

impl TestMachine {
    pub fn new() -> Self {
        let memory = Arc::new(MemoryController::new());
        memory.alloc_page_at(page_index(CODE_SEGMENT, 0), PageFlags::rwx()).unwrap();
        memory.alloc_page_at(page_index(DATA_SEGMENT, 0), PageFlags::rw()).unwrap();
        TestMachine {
            memory,
            bus: Arc::new(MessageBus::new()),
            port_bus: Arc::new(PortBus::new()),
            virtual_interrupts: Arc::new(VirtualInterruptTable::new()),
        }
    }

    /// Write `words` into the code segment starting at IP 0.
    pub fn load_program(&self, words: &[u32]) {
        for (i, word) in words.iter().enumerate() {
            let addr = segvm_core::memory::segment::segment_addr_to_addr(CODE_SEGMENT, (i * 4) as u16);
            self.memory.write_u32(addr, *word, true).unwrap();
        }
    }

    /// Write `words` into `segment` starting at IP 0. Used for a second
    /// code segment (e.g. an interrupt handler) distinct from the main
    /// program's.
    pub fn load_program_at(&self, segment: u8, words: &[u32]) {
        for (i, word) in words.iter().enumerate() {
            let addr = segvm_core::memory::segment::segment_addr_to_addr(segment, (i * 4) as u16);
            self.memory.write_u32(addr, *word, true).unwrap();
        }
    }

    pub fn new_core(&self, core_id: u16, interrupt_table_base: u32, irq_table_base: u32) -> ExecutionCore {
        ExecutionCore::new(
            CoreId { cpu_id: 0, core_id },
            self.memory.clone(),
            self.port_bus.clone(),
            self.virtual_interrupts.clone(),
            self.bus.clone(),
            interrupt_table_base,
            irq_table_base,
        )
    }
}

/// Physical page index backing the first page of `segment`'s logical
/// address space, offset by `extra_pages` (each 256 bytes) within it.
pub fn page_index(segment: u8, extra_pages: u32) -> u32 {
    (segment as u32) * 256 + extra_pages
}

pub fn boot_state(ds: u8, sp: u16, privileged: bool) -> BootState {
    BootState { cs: CODE_SEGMENT, ds, sp, ip: 0, privileged }
}

// --- instruction assembly helpers ------------------------------------------

pub fn nop() -> u32 {
    encode(Opcode::Nop, 0, 0, false, 0, 0)
}

pub fn hlt(exit_code_reg: usize) -> u32 {
    encode(Opcode::Hlt, exit_code_reg, 0, false, 0, 0)
}

pub fn li(reg: usize, immediate: i16) -> u32 {
    encode(Opcode::Li, reg, 0, false, 0, immediate)
}

/// `LW dest, [base_reg + offset]` (DS-relative).
pub fn lw(dest: usize, base_reg: usize, offset: i16) -> u32 {
    encode(Opcode::Lw, dest, 0, false, base_reg, offset)
}

/// `IN dest, port_reg` (port number taken from a register).
pub fn in_reg(dest: usize, port_reg: usize) -> u32 {
    encode(Opcode::In, dest, 0, true, port_reg, 0)
}

pub fn cli() -> u32 {
    encode(Opcode::Cli, 0, 0, false, 0, 0)
}

/// `ADD dest, src` (register form): `regs[dest] += regs[src]`.
pub fn add_reg(dest: usize, src: usize) -> u32 {
    encode(Opcode::Add, dest, 0, true, src, 0)
}

/// `PUSH` a register's value (the source register is `ireg`, not `reg`).
pub fn push_reg(src: usize) -> u32 {
    encode(Opcode::Push, 0, 0, true, src, 0)
}

/// `POP` into `dest`.
pub fn pop_reg(dest: usize) -> u32 {
    encode(Opcode::Pop, dest, 0, false, 0, 0)
}

/// `CALL` to the address held in `target_reg`.
pub fn call_reg(target_reg: usize) -> u32 {
    encode(Opcode::Call, 0, 0, true, target_reg, 0)
}

pub fn ret() -> u32 {
    encode(Opcode::Ret, 0, 0, false, 0, 0)
}

pub fn int(index_reg: usize) -> u32 {
    encode(Opcode::Int, 0, 0, true, index_reg, 0)
}

pub fn retint() -> u32 {
    encode(Opcode::Retint, 0, 0, false, 0, 0)
}

pub fn sti() -> u32 {
    encode(Opcode::Sti, 0, 0, false, 0, 0)
}

pub fn idle() -> u32 {
    encode(Opcode::Idle, 0, 0, false, 0, 0)
}

/// `CAS ptr_reg, expected_reg, replacement_reg` (register-operand
/// replacement form).
pub fn cas_reg(ptr_reg: usize, expected_reg: usize, replacement_reg: usize) -> u32 {
    encode(Opcode::Cas, ptr_reg, expected_reg, true, replacement_reg, 0)
}
