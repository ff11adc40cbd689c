//! Bitwise logic opcodes: AND, OR, XOR, NOT, SHIFTL, SHIFTR.

use crate::core::engine::ExecutionCore;
use crate::error::Result;
use crate::flags;
use crate::instruction::DecodedInstruction;
use crate::registers::flag_bits;

fn write_dest(core: &mut ExecutionCore, reg: usize, value: u16) -> Result<()> {
    let privileged = core.regs().privileged();
    core.regs_mut().write(reg, value, privileged)
}

fn apply(core: &mut ExecutionCore, result: u16) {
    let (_, f) = flags::plain(result);
    let regs = core.regs_mut();
    regs.set_flag(flag_bits::Z, f.zero);
    regs.set_flag(flag_bits::O, f.overflow);
    regs.set_flag(flag_bits::S, f.sign);
}

pub fn and(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let dest = core.regs().get(instr.reg);
    let rhs = instr.ri_val(core.regs());
    let result = dest & rhs;
    apply(core, result);
    write_dest(core, instr.reg, result)
}

pub fn or(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let dest = core.regs().get(instr.reg);
    let rhs = instr.ri_val(core.regs());
    let result = dest | rhs;
    apply(core, result);
    write_dest(core, instr.reg, result)
}

pub fn xor(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let dest = core.regs().get(instr.reg);
    let rhs = instr.ri_val(core.regs());
    let result = dest ^ rhs;
    apply(core, result);
    write_dest(core, instr.reg, result)
}

pub fn not(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let dest = core.regs().get(instr.reg);
    let result = !dest;
    apply(core, result);
    write_dest(core, instr.reg, result)
}

pub fn shiftl(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let dest = core.regs().get(instr.reg);
    let amount = instr.ri_val(core.regs()) & 0xF;
    let result = dest.wrapping_shl(amount as u32);
    apply(core, result);
    write_dest(core, instr.reg, result)
}

pub fn shiftr(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let dest = core.regs().get(instr.reg);
    let amount = instr.ri_val(core.regs()) & 0xF;
    let result = dest.wrapping_shr(amount as u32);
    apply(core, result);
    write_dest(core, instr.reg, result)
}
