//! Stack-discipline invariants: PUSH/POP and CALL/RET both leave SP exactly
//! where a balanced pair should.

mod common;

use common::*;

#[test]
fn push_then_pop_round_trips_value_and_stack_pointer() {
    let machine = TestMachine::new();
    machine.load_program(&[push_reg(0), pop_reg(1), hlt(1)]);

    let mut core = machine.new_core(0, 0, 0x400);
    let initial_sp = 0x00F0;
    core.boot(boot_state(DATA_SEGMENT, initial_sp, true));
    core.regs_mut().set(0, 0x1234);
    core.run();

    assert_eq!(core.regs().get(1), 0x1234);
    assert_eq!(core.regs().sp(), initial_sp);
}

#[test]
fn call_then_ret_leaves_stack_pointer_unchanged() {
    let machine = TestMachine::new();
    // word 0: CALL reg(2)        -> jumps to the subroutine at word 2 (offset 8)
    // word 1: HLT reg(0)         -> only reached after the subroutine returns
    // word 2: RET                -> subroutine body
    machine.load_program(&[call_reg(2), hlt(0), ret()]);

    let mut core = machine.new_core(0, 0, 0x400);
    let initial_sp = 0x00F0;
    core.boot(boot_state(DATA_SEGMENT, initial_sp, true));
    core.regs_mut().set(2, 8);
    core.run();

    assert_eq!(core.regs().sp(), initial_sp);
    assert_eq!(core.regs().ip(), 4);
}

#[test]
fn call_without_matching_ret_count_leaves_unbalanced_frame() {
    // A lone RET with no matching CALL has no frame to pop and must die
    // rather than silently underflowing the stack.
    let machine = TestMachine::new();
    machine.load_program(&[ret(), hlt(0)]);

    let mut core = machine.new_core(0, 0, 0x400);
    core.boot(boot_state(DATA_SEGMENT, 0x00F0, true));
    core.run();

    assert!(!core.is_running());
    assert_eq!(core.exit_code(), 1);
}
