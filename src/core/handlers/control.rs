//! Compare/branch, interrupt, I/O, and machine-control opcodes: CMP, CMPU,
//! J, B*, INT, RETINT, CLI, STI, IN, INB, OUT, OUTB, HLT, RST, IDLE, CAS.

use crate::core::engine::ExecutionCore;
use crate::error::Result;
use crate::instruction::DecodedInstruction;
use crate::memory::segment::segment_addr_to_addr;
use crate::registers::flag_bits;

pub fn cmp(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let left = core.regs().get(instr.reg);
    let right = instr.ri_val(core.regs());
    let f = crate::flags::cmp(left, right);
    let regs = core.regs_mut();
    regs.set_flag(flag_bits::E, f.equal);
    regs.set_flag(flag_bits::Z, f.zero);
    regs.set_flag(flag_bits::O, false);
    regs.set_flag(flag_bits::S, f.sign);
    Ok(())
}

pub fn cmpu(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let left = core.regs().get(instr.reg);
    let right = instr.ri_val(core.regs());
    let f = crate::flags::cmpu(left, right);
    let regs = core.regs_mut();
    regs.set_flag(flag_bits::E, f.equal);
    regs.set_flag(flag_bits::Z, f.zero);
    regs.set_flag(flag_bits::O, false);
    regs.set_flag(flag_bits::S, f.sign);
    Ok(())
}

fn jump_to(core: &mut ExecutionCore, target: u16) {
    core.regs_mut().set_ip(target);
}

pub fn j(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let target = instr.ri_val(core.regs());
    jump_to(core, target);
    Ok(())
}

fn branch_if(core: &mut ExecutionCore, instr: &DecodedInstruction, cond: bool) -> Result<()> {
    if cond {
        let target = instr.ri_val(core.regs());
        jump_to(core, target);
    }
    Ok(())
}

pub fn be(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let e = core.regs().flag(flag_bits::E);
    branch_if(core, instr, e)
}

pub fn bne(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let e = core.regs().flag(flag_bits::E);
    branch_if(core, instr, !e)
}

pub fn bz(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let z = core.regs().flag(flag_bits::Z);
    branch_if(core, instr, z)
}

pub fn bnz(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let z = core.regs().flag(flag_bits::Z);
    branch_if(core, instr, !z)
}

pub fn bs(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let s = core.regs().flag(flag_bits::S);
    branch_if(core, instr, s)
}

pub fn bns(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let s = core.regs().flag(flag_bits::S);
    branch_if(core, instr, !s)
}

pub fn bg(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let (s, e) = (core.regs().flag(flag_bits::S), core.regs().flag(flag_bits::E));
    branch_if(core, instr, !s && !e)
}

pub fn bl(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let (s, e) = (core.regs().flag(flag_bits::S), core.regs().flag(flag_bits::E));
    branch_if(core, instr, s && !e)
}

pub fn bge(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let (s, e) = (core.regs().flag(flag_bits::S), core.regs().flag(flag_bits::E));
    branch_if(core, instr, !s || e)
}

pub fn ble(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let (s, e) = (core.regs().flag(flag_bits::S), core.regs().flag(flag_bits::E));
    branch_if(core, instr, s || e)
}

pub fn int(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let index = (instr.ri_val(core.regs()) & 0xFF) as u8;
    core.int(index)
}

pub fn retint(core: &mut ExecutionCore, _instr: &DecodedInstruction) -> Result<()> {
    core.retint()
}

pub fn cli(core: &mut ExecutionCore, _instr: &DecodedInstruction) -> Result<()> {
    core.require_privileged("CLI outside privileged mode")?;
    core.regs_mut().set_flag(flag_bits::HWINT, false);
    Ok(())
}

pub fn sti(core: &mut ExecutionCore, _instr: &DecodedInstruction) -> Result<()> {
    core.require_privileged("STI outside privileged mode")?;
    core.regs_mut().set_flag(flag_bits::HWINT, true);
    Ok(())
}

pub fn r#in(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let port = instr.ri_val(core.regs());
    let privileged = core.regs().privileged();
    let value = core.port_bus().read_u16(port, privileged)?;
    let privileged = core.regs().privileged();
    core.regs_mut().write(instr.reg, value, privileged)
}

pub fn inb(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let port = instr.ri_val(core.regs());
    let privileged = core.regs().privileged();
    let value = core.port_bus().read_u8(port, privileged)?;
    let privileged = core.regs().privileged();
    core.regs_mut().write(instr.reg, value as u16, privileged)
}

pub fn out(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let port = instr.ri_val(core.regs());
    let value = core.regs().get(instr.reg);
    let privileged = core.regs().privileged();
    core.port_bus().write_u16(port, value, privileged)
}

pub fn outb(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let port = instr.ri_val(core.regs());
    let value = core.regs().get(instr.reg) as u8;
    let privileged = core.regs().privileged();
    core.port_bus().write_u8(port, value, privileged)
}

pub fn hlt(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let exit_code = core.regs().get(instr.reg) as i32;
    core.halt(exit_code);
    Ok(())
}

pub fn rst(core: &mut ExecutionCore, _instr: &DecodedInstruction) -> Result<()> {
    core.require_privileged("RST outside privileged mode")?;
    core.reset();
    Ok(())
}

pub fn idle(core: &mut ExecutionCore, _instr: &DecodedInstruction) -> Result<()> {
    core.set_idle(true);
    Ok(())
}

/// `CAS dest_ptr, expected_reg` with the replacement in the immediate/
/// register right-hand operand: the address is `DS:regs[reg]`, the expected
/// value is `regs[reg2]`, and the replacement is `RI_VAL`. On success
/// `FLAGS.E` is set; on failure it is cleared and `reg2` is updated with
/// the value actually found in memory, so a guest retry loop can re-read
/// the comparison operand without a second memory access.
pub fn cas(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    let ds = core.regs().ds();
    let ptr = core.regs().get(instr.reg);
    let addr = segment_addr_to_addr(ds, ptr);
    let expected = core.regs().get(instr.reg2);
    let replacement = instr.ri_val(core.regs());
    let privileged = core.regs().privileged();

    let won = core.memory().cas_u16(addr, expected, replacement, privileged)?;
    core.regs_mut().set_flag(flag_bits::E, won);
    if !won {
        let current = core.memory().read_u16(addr, privileged)?;
        let privileged = core.regs().privileged();
        core.regs_mut().write(instr.reg2, current, privileged)?;
    }
    Ok(())
}
