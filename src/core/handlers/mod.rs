//! Per-opcode-group handlers, mirroring the execution core's division into
//! data movement, arithmetic, logic, stack, and control concerns.

pub mod arith;
pub mod control;
pub mod data;
pub mod logic;
pub mod stack;

use crate::core::engine::ExecutionCore;
use crate::error::Result;
use crate::instruction::{DecodedInstruction, Opcode};

/// Dispatch a decoded instruction to its opcode handler. Every `Opcode`
/// variant must appear here; an opcode byte with no enum variant is
/// rejected earlier, at decode time, as `InvalidOpcode`.
pub fn dispatch(core: &mut ExecutionCore, instr: &DecodedInstruction) -> Result<()> {
    use Opcode::*;
    match instr.opcode {
        Nop => data::nop(core, instr),
        Lw => data::lw(core, instr),
        Lb => data::lb(core, instr),
        Li => data::li(core, instr),
        Stw => data::stw(core, instr),
        Stb => data::stb(core, instr),
        Mov => data::mov(core, instr),
        Swp => data::swp(core, instr),

        Inc => arith::inc(core, instr),
        Dec => arith::dec(core, instr),
        Add => arith::add(core, instr),
        Sub => arith::sub(core, instr),
        Mul => arith::mul(core, instr),
        Div => arith::div(core, instr),
        Mod => arith::modulo(core, instr),

        Incl => arith::incl(core, instr),
        Decl => arith::decl(core, instr),
        Addl => arith::addl(core, instr),
        Subl => arith::subl(core, instr),
        Mull => arith::mull(core, instr),
        Divl => arith::divl(core, instr),
        Modl => arith::modl(core, instr),

        And => logic::and(core, instr),
        Or => logic::or(core, instr),
        Xor => logic::xor(core, instr),
        Not => logic::not(core, instr),
        Shiftl => logic::shiftl(core, instr),
        Shiftr => logic::shiftr(core, instr),

        Cmp => control::cmp(core, instr),
        Cmpu => control::cmpu(core, instr),
        J => control::j(core, instr),
        Be => control::be(core, instr),
        Bne => control::bne(core, instr),
        Bz => control::bz(core, instr),
        Bnz => control::bnz(core, instr),
        Bs => control::bs(core, instr),
        Bns => control::bns(core, instr),
        Bg => control::bg(core, instr),
        Bl => control::bl(core, instr),
        Bge => control::bge(core, instr),
        Ble => control::ble(core, instr),

        Push => stack::push(core, instr),
        Pop => stack::pop(core, instr),
        Call => stack::call(core, instr),
        Ret => stack::ret(core, instr),

        Int => control::int(core, instr),
        Retint => control::retint(core, instr),
        Cli => control::cli(core, instr),
        Sti => control::sti(core, instr),

        In => control::r#in(core, instr),
        Inb => control::inb(core, instr),
        Out => control::out(core, instr),
        Outb => control::outb(core, instr),

        Hlt => control::hlt(core, instr),
        Rst => control::rst(core, instr),
        Idle => control::idle(core, instr),
        Cas => control::cas(core, instr),
    }
}
