//! Stack and call opcodes: PUSH, POP, CALL, RET.

use crate::core::engine::ExecutionCore;
use crate::error::Result;
use crate::instruction::DecodedInstruction;

pub fn push(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let value = instr.ri_val(core.regs());
    core.push(value)
}

pub fn pop(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let value = core.pop()?;
    let privileged = core.regs().privileged();
    core.regs_mut().write(instr.reg, value, privileged)
}

pub fn call(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let target = instr.ri_val(core.regs());
    core.call(target)
}

pub fn ret(core: &mut ExecutionCore, _instr: &DecodedInstruction) -> Result<()> {
    core.ret()
}
