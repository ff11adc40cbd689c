//! 16-bit and paired-32-bit arithmetic opcodes.

use crate::core::engine::ExecutionCore;
use crate::error::Result;
use crate::flags::{self, ArithFlags};
use crate::instruction::DecodedInstruction;
use crate::primitives::{pack_u32, split_u32};
use crate::registers::flag_bits;

fn apply_flags(core: &mut ExecutionCore, f: ArithFlags) {
    let regs = core.regs_mut();
    regs.set_flag(flag_bits::Z, f.zero);
    regs.set_flag(flag_bits::O, f.overflow);
    regs.set_flag(flag_bits::S, f.sign);
}

fn write_dest(core: &mut ExecutionCore, reg: usize, value: u16) -> Result<()> {
    let privileged = core.regs().privileged();
    core.regs_mut().write(reg, value, privileged)
}

pub fn inc(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let cur = core.regs().get(instr.reg);
    let result = cur.wrapping_add(1);
    let (_, f) = flags::plain(result);
    apply_flags(core, f);
    write_dest(core, instr.reg, result)
}

pub fn dec(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let cur = core.regs().get(instr.reg);
    let result = cur.wrapping_sub(1);
    let (_, f) = flags::plain(result);
    apply_flags(core, f);
    write_dest(core, instr.reg, result)
}

pub fn add(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let dest = core.regs().get(instr.reg);
    let rhs = instr.ri_val(core.regs());
    let (result, f) = flags::add(dest, rhs);
    apply_flags(core, f);
    write_dest(core, instr.reg, result)
}

pub fn sub(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let dest = core.regs().get(instr.reg);
    let rhs = instr.ri_val(core.regs());
    let (result, f) = flags::sub(dest, rhs);
    apply_flags(core, f);
    write_dest(core, instr.reg, result)
}

pub fn mul(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let dest = core.regs().get(instr.reg);
    let rhs = instr.ri_val(core.regs());
    let result = dest.wrapping_mul(rhs);
    let (_, f) = flags::plain(result);
    apply_flags(core, f);
    write_dest(core, instr.reg, result)
}

pub fn div(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let dest = core.regs().get(instr.reg);
    let rhs = instr.ri_val(core.regs());
    let result = if rhs == 0 { 0 } else { dest / rhs };
    let (_, f) = flags::plain(result);
    apply_flags(core, f);
    write_dest(core, instr.reg, result)
}

pub fn modulo(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let dest = core.regs().get(instr.reg);
    let rhs = instr.ri_val(core.regs());
    let result = if rhs == 0 { 0 } else { dest % rhs };
    let (_, f) = flags::plain(result);
    apply_flags(core, f);
    write_dest(core, instr.reg, result)
}

/// Read the 32-bit value packed across `reg` (low) and `reg+1` (high).
fn read_pair(core: &ExecutionCore, reg: usize) -> u32 {
    pack_u32(core.regs().get(reg), core.regs().get(reg + 1))
}

fn write_pair(core: &mut ExecutionCore, reg: usize, value: u32) -> Result<()> {
    let (lo, hi) = split_u32(value);
    write_dest(core, reg, lo)?;
    write_dest(core, reg + 1, hi)
}

/// The right-hand operand for paired ops: a register-pair when
/// `instr.is_reg`, otherwise the sign-extended immediate zero-extended to
/// 32 bits (there is no 32-bit immediate form).
fn rhs_pair(core: &ExecutionCore, instr: &DecodedInstruction) -> u32 {
    if instr.is_reg {
        read_pair(core, instr.ireg)
    } else {
        instr.immediate as i32 as u32
    }
}

fn apply_flags32(core: &mut ExecutionCore, result: u32, overflow: bool) {
    let regs = core.regs_mut();
    regs.set_flag(flag_bits::Z, result == 0);
    regs.set_flag(flag_bits::O, overflow);
    regs.set_flag(flag_bits::S, false);
}

pub fn incl(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let cur = read_pair(core, instr.reg);
    let result = cur.wrapping_add(1);
    apply_flags32(core, result, false);
    write_pair(core, instr.reg, result)
}

pub fn decl(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let cur = read_pair(core, instr.reg);
    let result = cur.wrapping_sub(1);
    apply_flags32(core, result, false);
    write_pair(core, instr.reg, result)
}

pub fn addl(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let dest = read_pair(core, instr.reg);
    let rhs = rhs_pair(core, instr);
    let (result, overflowed) = dest.overflowing_add(rhs);
    apply_flags32(core, result, overflowed);
    write_pair(core, instr.reg, result)
}

pub fn subl(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let dest = read_pair(core, instr.reg);
    let rhs = rhs_pair(core, instr);
    let (result, underflowed) = dest.overflowing_sub(rhs);
    let regs = core.regs_mut();
    regs.set_flag(flag_bits::Z, result == 0);
    regs.set_flag(flag_bits::O, false);
    regs.set_flag(flag_bits::S, underflowed);
    write_pair(core, instr.reg, result)
}

pub fn mull(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let dest = read_pair(core, instr.reg);
    let rhs = rhs_pair(core, instr);
    let result = dest.wrapping_mul(rhs);
    apply_flags32(core, result, false);
    write_pair(core, instr.reg, result)
}

pub fn divl(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let dest = read_pair(core, instr.reg);
    let rhs = rhs_pair(core, instr);
    let result = if rhs == 0 { 0 } else { dest / rhs };
    apply_flags32(core, result, false);
    write_pair(core, instr.reg, result)
}

pub fn modl(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let dest = read_pair(core, instr.reg);
    let rhs = rhs_pair(core, instr);
    let result = if rhs == 0 { 0 } else { dest % rhs };
    apply_flags32(core, result, false);
    write_pair(core, instr.reg, result)
}
