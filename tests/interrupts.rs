//! Interrupt entry/exit: full register-file restore across INT/RETINT, and
//! hardware IRQ delivery waking an idle core.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use segvm_core::bus::Message;
use segvm_core::memory::page::PageFlags;
use segvm_core::primitives::InterruptVector;

/// Segment holding the interrupt/IRQ vector tables for these tests, distinct
/// from `CODE_SEGMENT`/`DATA_SEGMENT`.
const VECTOR_TABLE_SEGMENT: u8 = 8;
const ISR_SEGMENT: u8 = 9;
const ISR_STACK_SEGMENT: u8 = 10;

fn vector_table_base(machine: &TestMachine) -> u32 {
    let page = page_index(VECTOR_TABLE_SEGMENT, 0);
    machine.memory.alloc_page_at(page, PageFlags::rw()).unwrap();
    page * 256
}

fn write_vector(machine: &TestMachine, table_base: u32, index: u8, vector: InterruptVector) {
    let addr = table_base + (index as u32) * 4;
    machine.memory.write_u32(addr, vector.to_bits(), true).unwrap();
}

#[test]
fn int_retint_restores_full_register_file() {
    let machine = TestMachine::new();
    machine.memory.alloc_page_at(page_index(ISR_SEGMENT, 0), PageFlags::rwx()).unwrap();

    // Main program: INT through the register holding the vector index, then
    // HLT with R0 (clobbered by the handler) as the exit code.
    const IRQ_INDEX_REG: usize = 5;
    machine.load_program(&[int(IRQ_INDEX_REG), hlt(0)]);

    // Handler: stomp R0, then return. A faithful RETINT must undo this.
    machine.load_program_at(ISR_SEGMENT, &[li(0, 42), retint()]);

    let table_base = vector_table_base(&machine);
    write_vector(&machine, table_base, 1, InterruptVector { cs: ISR_SEGMENT, ds: ISR_STACK_SEGMENT, ip: 0 });

    let mut core = machine.new_core(0, table_base, 0x400);
    let initial_sp = 0x00F0;
    core.boot(boot_state(DATA_SEGMENT, initial_sp, true));
    core.regs_mut().set(0, 0x1111);
    core.regs_mut().set(IRQ_INDEX_REG, 1);
    core.run();

    assert_eq!(core.exit_code(), 0x1111);
    assert_eq!(core.regs().ds() as u8, DATA_SEGMENT);
    assert_eq!(core.regs().sp(), initial_sp);
}

#[test]
fn s6_masked_irq_stays_queued_then_wakes_idle_core() {
    let machine = TestMachine::new();
    machine.memory.alloc_page_at(page_index(ISR_SEGMENT, 0), PageFlags::rwx()).unwrap();

    // hwint is already raised by reset()/boot(); STI here is a no-op
    // re-assertion. IDLE blocks until a message arrives, HLT runs only
    // after the handler's RETINT hands control back.
    machine.load_program(&[sti(), idle(), hlt(0)]);
    machine.load_program_at(ISR_SEGMENT, &[retint()]);

    let table_base = vector_table_base(&machine);
    const IRQ_SOURCE: u8 = 3;
    write_vector(&machine, table_base, IRQ_SOURCE, InterruptVector { cs: ISR_SEGMENT, ds: ISR_STACK_SEGMENT, ip: 0 });

    let mut core = machine.new_core(1, 0x500, table_base);
    core.boot(boot_state(DATA_SEGMENT, 0x00F0, true));
    let endpoint = core.id.endpoint_id();

    let bus = Arc::clone(&machine.bus);
    let handle = std::thread::spawn(move || {
        let mut core = core;
        core.run();
        core
    });

    std::thread::sleep(Duration::from_millis(50));
    bus.send(endpoint, Message::HandleIrq { source: IRQ_SOURCE });

    let core = handle.join().expect("core thread panicked");
    assert!(!core.is_running());
    assert_eq!(core.exit_code(), 0);
    assert!(!core.is_idle());
}
