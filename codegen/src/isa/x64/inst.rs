//! x86-64 opcodes and their descriptors.
//!
//! Operand widths are not encoded in the opcode; register operands carry
//! `FORCE_*` width flags that select the sub-register name at print and
//! encode time. Memory-touching instructions take an address as a
//! `(base, displacement)` operand pair where the base is a register,
//! frame index or symbol.

use crate::isa::registers::{InstDesc, OperandDesc};
use crate::isa::x64::regs;
use crate::mir::{MachOpcode, Reg};

const DEF: OperandDesc = OperandDesc::DEF;
const USE: OperandDesc = OperandDesc::USE;
const DEF_USE: OperandDesc = OperandDesc::DEF_USE;

/// x86-64 machine opcodes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum X64Op {
    /// `mov dst, src` between registers.
    MovRR,
    /// `mov dst, imm`.
    MovRI,
    /// `mov dst, [base + disp]`.
    MovRM,
    /// `mov [base + disp], src`.
    MovMR,
    /// `mov [base + disp], imm`.
    MovMI,
    /// `lea dst, [base + disp]`.
    Lea,
    /// `lea dst, [base + index*scale + disp]`.
    LeaIndex,
    /// `movzx dst, src`.
    Movzx,
    /// `movsx dst, src`.
    Movsx,
    Add,
    AddI,
    Sub,
    SubI,
    IMul,
    Cdq,
    Cqo,
    Idiv,
    Div,
    And,
    AndI,
    Or,
    OrI,
    Xor,
    XorI,
    /// Shift left by CL.
    Shl,
    /// Shift left by an immediate.
    ShlI,
    Shr,
    ShrI,
    Sar,
    SarI,
    Cmp,
    CmpI,
    /// `set<cc> dst8`; the condition code is an immediate operand with
    /// the `COND` flag.
    Setcc,
    /// `j<cc> label`.
    Jcc,
    Jmp,
    /// `call sym`.
    CallSym,
    /// `call reg`.
    CallReg,
    Ret,
    Push,
    Pop,
    /// SSE register move (`movaps`).
    FMovRR,
    /// SSE load (`movss`/`movsd` picked by the width flag).
    FMovRM,
    /// SSE store.
    FMovMR,
    Addss,
    Addsd,
    Subss,
    Subsd,
    Mulss,
    Mulsd,
    Divss,
    Divsd,
    Ucomiss,
    Ucomisd,
    Cvtsi2ss,
    Cvtsi2sd,
    Cvttss2si,
    Cvttsd2si,
    Cvtss2sd,
    Cvtsd2ss,
    Xorps,
}

impl From<X64Op> for MachOpcode {
    fn from(op: X64Op) -> Self {
        MachOpcode(op as u16)
    }
}

static DIV_CLOBBERS: [Reg; 2] = [regs::RAX, regs::RDX];
static SIGN_EXTEND_CLOBBERS: [Reg; 1] = [regs::RDX];

/// Everything the callee is allowed to clobber; attached to calls so the
/// allocator sees definitions of the whole volatile set at each call
/// site.
static CALL_CLOBBERS: [Reg; 25] = [
    regs::RAX,
    regs::RCX,
    regs::RDX,
    regs::RSI,
    regs::RDI,
    regs::R8,
    regs::R9,
    regs::R10,
    regs::R11,
    regs::xmm(0),
    regs::xmm(1),
    regs::xmm(2),
    regs::xmm(3),
    regs::xmm(4),
    regs::xmm(5),
    regs::xmm(6),
    regs::xmm(7),
    regs::xmm(8),
    regs::xmm(9),
    regs::xmm(10),
    regs::xmm(11),
    regs::xmm(12),
    regs::xmm(13),
    regs::xmm(14),
    regs::xmm(15),
];

macro_rules! desc {
    ($name:expr, [$($op:expr),*]) => {
        InstDesc {
            name: $name,
            operands: &[$($op),*],
            clobbers: &[],
            may_load: false,
            may_store: false,
            is_call: false,
            is_ret: false,
            is_terminator: false,
        }
    };
}

static DESCS: [InstDesc; 60] = [
    desc!("mov", [DEF, USE]),  // MovRR
    desc!("mov", [DEF, USE]),  // MovRI
    InstDesc {
        may_load: true,
        ..desc!("mov", [DEF, USE, USE])
    }, // MovRM
    InstDesc {
        may_store: true,
        ..desc!("mov", [USE, USE, USE])
    }, // MovMR
    InstDesc {
        may_store: true,
        ..desc!("mov", [USE, USE, USE])
    }, // MovMI
    desc!("lea", [DEF, USE, USE]), // Lea
    desc!("lea", [DEF, USE, USE, USE, USE]), // LeaIndex
    desc!("movzx", [DEF, USE]),
    desc!("movsx", [DEF, USE]),
    desc!("add", [DEF_USE, USE]),
    desc!("add", [DEF_USE, USE]),
    desc!("sub", [DEF_USE, USE]),
    desc!("sub", [DEF_USE, USE]),
    desc!("imul", [DEF_USE, USE]),
    InstDesc {
        clobbers: &SIGN_EXTEND_CLOBBERS,
        ..desc!("cdq", [])
    },
    InstDesc {
        clobbers: &SIGN_EXTEND_CLOBBERS,
        ..desc!("cqo", [])
    },
    InstDesc {
        clobbers: &DIV_CLOBBERS,
        ..desc!("idiv", [USE])
    },
    InstDesc {
        clobbers: &DIV_CLOBBERS,
        ..desc!("div", [USE])
    },
    desc!("and", [DEF_USE, USE]),
    desc!("and", [DEF_USE, USE]),
    desc!("or", [DEF_USE, USE]),
    desc!("or", [DEF_USE, USE]),
    desc!("xor", [DEF_USE, USE]),
    desc!("xor", [DEF_USE, USE]),
    desc!("shl", [DEF_USE, USE]),
    desc!("shl", [DEF_USE, USE]),
    desc!("shr", [DEF_USE, USE]),
    desc!("shr", [DEF_USE, USE]),
    desc!("sar", [DEF_USE, USE]),
    desc!("sar", [DEF_USE, USE]),
    desc!("cmp", [USE, USE]),
    desc!("cmp", [USE, USE]),
    desc!("set", [DEF, USE]),
    InstDesc {
        is_terminator: true,
        ..desc!("j", [USE, USE])
    }, // Jcc
    InstDesc {
        is_terminator: true,
        ..desc!("jmp", [USE])
    },
    InstDesc {
        is_call: true,
        clobbers: &CALL_CLOBBERS,
        ..desc!("call", [USE])
    }, // CallSym
    InstDesc {
        is_call: true,
        clobbers: &CALL_CLOBBERS,
        ..desc!("call", [USE])
    }, // CallReg
    InstDesc {
        is_ret: true,
        is_terminator: true,
        ..desc!("ret", [])
    },
    InstDesc {
        may_store: true,
        ..desc!("push", [USE])
    },
    InstDesc {
        may_load: true,
        ..desc!("pop", [DEF])
    },
    desc!("movaps", [DEF, USE]), // FMovRR
    InstDesc {
        may_load: true,
        ..desc!("movs", [DEF, USE, USE])
    }, // FMovRM
    InstDesc {
        may_store: true,
        ..desc!("movs", [USE, USE, USE])
    }, // FMovMR
    desc!("addss", [DEF_USE, USE]),
    desc!("addsd", [DEF_USE, USE]),
    desc!("subss", [DEF_USE, USE]),
    desc!("subsd", [DEF_USE, USE]),
    desc!("mulss", [DEF_USE, USE]),
    desc!("mulsd", [DEF_USE, USE]),
    desc!("divss", [DEF_USE, USE]),
    desc!("divsd", [DEF_USE, USE]),
    desc!("ucomiss", [USE, USE]),
    desc!("ucomisd", [USE, USE]),
    desc!("cvtsi2ss", [DEF, USE]),
    desc!("cvtsi2sd", [DEF, USE]),
    desc!("cvttss2si", [DEF, USE]),
    desc!("cvttsd2si", [DEF, USE]),
    desc!("cvtss2sd", [DEF, USE]),
    desc!("cvtsd2ss", [DEF, USE]),
    desc!("xorps", [DEF_USE, USE]),
];

/// The descriptor for an opcode.
pub fn desc(opcode: MachOpcode) -> &'static InstDesc {
    &DESCS[opcode.0 as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_aligned_with_the_enum() {
        assert_eq!(desc(X64Op::MovRR.into()).name, "mov");
        assert_eq!(desc(X64Op::Lea.into()).name, "lea");
        assert!(desc(X64Op::Idiv.into())
            .clobbers
            .contains(&regs::RAX));
        assert!(desc(X64Op::CallSym.into()).is_call);
        assert!(desc(X64Op::Ret.into()).is_terminator);
        assert!(desc(X64Op::Jcc.into()).is_terminator);
        assert_eq!(desc(X64Op::Xorps.into()).name, "xorps");
        assert!(desc(X64Op::Add.into()).operand(0).def);
        assert!(desc(X64Op::Add.into()).operand(0).read);
        assert!(!desc(X64Op::MovRR.into()).operand(0).read);
    }
}
