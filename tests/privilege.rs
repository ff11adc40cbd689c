//! Invariant 6: in unprivileged mode, every protected instruction, register
//! write, privileged-page access, and protected port access is rejected
//! with no side effect beyond the core dying.

mod common;

use common::*;
use segvm_core::error::Result;
use segvm_core::io::PortHandler;
use segvm_core::memory::page::PageFlags;
use segvm_core::registers::{flag_bits, R_CS};

const PRIVILEGED_DATA_SEGMENT: u8 = 12;

#[test]
fn protected_instruction_fails_outside_privileged_mode() {
    let machine = TestMachine::new();
    machine.load_program(&[cli(), hlt(0)]);

    let mut core = machine.new_core(0, 0, 0x400);
    core.boot(boot_state(DATA_SEGMENT, 0x00F0, false));
    let hwint_before = core.regs().flag(flag_bits::HWINT);
    core.run();

    assert!(!core.is_running());
    assert_eq!(core.exit_code(), 1);
    assert_eq!(core.regs().flag(flag_bits::HWINT), hwint_before, "CLI must leave hwint untouched when rejected");
}

#[test]
fn protected_register_write_fails_outside_privileged_mode() {
    let machine = TestMachine::new();
    machine.load_program(&[li(R_CS, 5), hlt(0)]);

    let mut core = machine.new_core(0, 0, 0x400);
    core.boot(boot_state(DATA_SEGMENT, 0x00F0, false));
    let cs_before = core.regs().cs();
    core.run();

    assert!(!core.is_running());
    assert_eq!(core.exit_code(), 1);
    assert_eq!(core.regs().cs(), cs_before, "a rejected write must not land");
}

#[test]
fn privileged_page_access_fails_outside_privileged_mode() {
    let machine = TestMachine::new();
    machine.memory.alloc_page_at(page_index(PRIVILEGED_DATA_SEGMENT, 0), PageFlags::privileged_rw()).unwrap();
    machine.load_program(&[lw(0, 1, 0), hlt(0)]);

    let mut core = machine.new_core(0, 0, 0x400);
    core.boot(boot_state(PRIVILEGED_DATA_SEGMENT, 0x00F0, false));
    core.regs_mut().set(1, 0);
    core.run();

    assert!(!core.is_running());
    assert_eq!(core.exit_code(), 1);
}

#[test]
fn privileged_page_access_succeeds_in_privileged_mode() {
    let machine = TestMachine::new();
    machine.memory.alloc_page_at(page_index(PRIVILEGED_DATA_SEGMENT, 0), PageFlags::privileged_rw()).unwrap();
    let addr = segvm_core::memory::segment::segment_addr_to_addr(PRIVILEGED_DATA_SEGMENT, 0);
    machine.memory.write_u16(addr, 0xBEEF, true).unwrap();
    machine.load_program(&[lw(0, 1, 0), hlt(0)]);

    let mut core = machine.new_core(0, 0, 0x400);
    core.boot(boot_state(PRIVILEGED_DATA_SEGMENT, 0x00F0, true));
    core.regs_mut().set(1, 0);
    core.run();

    assert!(!core.is_running());
    assert_eq!(core.exit_code(), 0xBEEF);
    assert_eq!(core.regs().get(0), 0xBEEF);
}

struct ProtectedPort;

impl PortHandler for ProtectedPort {
    fn read_u8(&mut self, _port: u16) -> Result<u8> {
        Ok(0)
    }
    fn read_u16(&mut self, _port: u16) -> Result<u16> {
        Ok(0x7777)
    }
    fn write_u8(&mut self, _port: u16, _value: u8) -> Result<()> {
        Ok(())
    }
    fn write_u16(&mut self, _port: u16, _value: u16) -> Result<()> {
        Ok(())
    }
    fn is_protected(&self, _port: u16) -> bool {
        true
    }
}

const PROTECTED_PORT: u16 = 7;

#[test]
fn protected_port_fails_outside_privileged_mode() {
    let machine = TestMachine::new();
    machine.port_bus.register(PROTECTED_PORT, Box::new(ProtectedPort));
    machine.load_program(&[in_reg(0, 1), hlt(0)]);

    let mut core = machine.new_core(0, 0, 0x400);
    core.boot(boot_state(DATA_SEGMENT, 0x00F0, false));
    core.regs_mut().set(1, PROTECTED_PORT);
    core.run();

    assert!(!core.is_running());
    assert_eq!(core.exit_code(), 1);
    assert_eq!(core.regs().get(0), 0, "the read must not have reached the handler");
}

#[test]
fn protected_port_succeeds_in_privileged_mode() {
    let machine = TestMachine::new();
    machine.port_bus.register(PROTECTED_PORT, Box::new(ProtectedPort));
    machine.load_program(&[in_reg(0, 1), hlt(0)]);

    let mut core = machine.new_core(0, 0, 0x400);
    core.boot(boot_state(DATA_SEGMENT, 0x00F0, true));
    core.regs_mut().set(1, PROTECTED_PORT);
    core.run();

    assert!(!core.is_running());
    assert_eq!(core.exit_code(), 0x7777);
    assert_eq!(core.regs().get(0), 0x7777);
}
