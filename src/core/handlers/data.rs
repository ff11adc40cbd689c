//! Move and load/store opcodes: NOP, LW, LB, LI, STW, STB, MOV, SWP.

use crate::core::engine::ExecutionCore;
use crate::error::Result;
use crate::instruction::DecodedInstruction;
use crate::memory::segment::segment_addr_to_addr;

fn write_dest(core: &mut ExecutionCore, reg: usize, value: u16) -> Result<()> {
    let privileged = core.regs().privileged();
    core.regs_mut().write(reg, value, privileged)
}

pub fn nop(_core: &mut ExecutionCore, _instr: &DecodedInstruction) -> Result<()> {
    Ok(())
}

pub fn lw(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let (ds, addr) = instr.offset_addr(core.regs());
    let privileged = core.regs().privileged();
    let value = core.memory().read_u16(segment_addr_to_addr(ds, addr), privileged)?;
    write_dest(core, instr.reg, value)
}

pub fn lb(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let (ds, addr) = instr.offset_addr(core.regs());
    let privileged = core.regs().privileged();
    let value = core.memory().read_u8(segment_addr_to_addr(ds, addr), privileged)?;
    write_dest(core, instr.reg, value as u16)
}

pub fn li(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    write_dest(core, instr.reg, instr.immediate as u16)
}

pub fn stw(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let (ds, addr) = instr.offset_addr(core.regs());
    let value = core.regs().get(instr.reg);
    let privileged = core.regs().privileged();
    core.memory().write_u16(segment_addr_to_addr(ds, addr), value, privileged)
}

pub fn stb(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let (ds, addr) = instr.offset_addr(core.regs());
    let value = core.regs().get(instr.reg) as u8;
    let privileged = core.regs().privileged();
    core.memory().write_u8(segment_addr_to_addr(ds, addr), value, privileged)
}

pub fn mov(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let value = instr.ri_val(core.regs());
    write_dest(core, instr.reg, value)
}

pub fn swp(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let a = core.regs().get(instr.reg);
    let b = core.regs().get(instr.ireg);
    write_dest(core, instr.reg, b)?;
    write_dest(core, instr.ireg, a)
}
