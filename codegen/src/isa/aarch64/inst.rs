//! AArch64 opcodes and their descriptors.
//!
//! Three-address throughout; register widths (`x` vs `w`, `d` vs `s`)
//! come from the `FORCE_*` operand flags. Memory operands are a
//! `(base, displacement)` pair where the base is a register, frame index
//! or symbol.

use crate::isa::registers::{InstDesc, OperandDesc};
use crate::mir::{MachOpcode, Reg};

const DEF: OperandDesc = OperandDesc::DEF;
const USE: OperandDesc = OperandDesc::USE;

/// AArch64 machine opcodes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum A64Op {
    /// `mov dst, src`.
    MovRR,
    /// Materialise an immediate (expanded to `mov`/`movk` downstream).
    MovImm,
    /// `ldr dst, [base, #disp]` (width by flag; `ldrb`/`ldrh` for small).
    Ldr,
    Ldrb,
    Ldrh,
    /// `str src, [base, #disp]`.
    Str,
    Strb,
    Strh,
    /// SIMD/FP load and store.
    LdrF,
    StrF,
    /// `str reg, [sp, #-16]!`.
    StrPre,
    /// `ldr reg, [sp], #16`.
    LdrPost,
    /// `stp x29, x30, [sp, #-16]!`.
    StpPre,
    /// `ldp x29, x30, [sp], #16`.
    LdpPost,
    /// `add dst, base, #disp` computing a frame or symbol address.
    AddAddr,
    Add,
    AddI,
    /// `add dst, base, idx, lsl #shift`.
    AddShifted,
    Sub,
    SubI,
    Mul,
    SDiv,
    UDiv,
    /// `msub dst, a, b, c` = c - a*b; remainders use it.
    Msub,
    And,
    AndI,
    Orr,
    Eor,
    Lsl,
    LslI,
    Lsr,
    LsrI,
    Asr,
    AsrI,
    Cmp,
    CmpI,
    /// `cset dst, <cc>`; the condition is a `COND` immediate.
    Cset,
    /// `b.<cc> label`.
    BCond,
    B,
    Bl,
    Blr,
    Ret,
    Sxtb,
    Sxth,
    Sxtw,
    Uxtb,
    Uxth,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FCmp,
    FMovRR,
    /// Integer to float.
    Scvtf,
    Ucvtf,
    /// Float to integer, truncating.
    Fcvtzs,
    Fcvtzu,
    /// Float precision change.
    Fcvt,
}

impl From<A64Op> for MachOpcode {
    fn from(op: A64Op) -> Self {
        MachOpcode(op as u16)
    }
}

static CALL_CLOBBERS: [Reg; 40] = {
    use super::regs::{v, x};
    [
        x(0),
        x(1),
        x(2),
        x(3),
        x(4),
        x(5),
        x(6),
        x(7),
        x(8),
        x(9),
        x(10),
        x(11),
        x(12),
        x(13),
        x(14),
        x(15),
        v(0),
        v(1),
        v(2),
        v(3),
        v(4),
        v(5),
        v(6),
        v(7),
        v(16),
        v(17),
        v(18),
        v(19),
        v(20),
        v(21),
        v(22),
        v(23),
        v(24),
        v(25),
        v(26),
        v(27),
        v(28),
        v(29),
        v(30),
        v(31),
    ]
};

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

static DESCS: [InstDesc; 58] = [
    desc!("mov", [DEF, USE]),   // MovRR
    desc!("mov", [DEF, USE]),   // MovImm
    InstDesc {
        may_load: true,
        ..desc!("ldr", [DEF, USE, USE])
    },
    InstDesc {
        may_load: true,
        ..desc!("ldrb", [DEF, USE, USE])
    },
    InstDesc {
        may_load: true,
        ..desc!("ldrh", [DEF, USE, USE])
    },
    InstDesc {
        may_store: true,
        ..desc!("str", [USE, USE, USE])
    },
    InstDesc {
        may_store: true,
        ..desc!("strb", [USE, USE, USE])
    },
    InstDesc {
        may_store: true,
        ..desc!("strh", [USE, USE, USE])
    },
    InstDesc {
        may_load: true,
        ..desc!("ldr", [DEF, USE, USE])
    }, // LdrF
    InstDesc {
        may_store: true,
        ..desc!("str", [USE, USE, USE])
    }, // StrF
    InstDesc {
        may_store: true,
        ..desc!("str", [USE])
    }, // StrPre
    InstDesc {
        may_load: true,
        ..desc!("ldr", [DEF])
    }, // LdrPost
    InstDesc {
        may_store: true,
        ..desc!("stp", [USE, USE])
    }, // StpPre
    InstDesc {
        may_load: true,
        ..desc!("ldp", [DEF, DEF])
    }, // LdpPost
    desc!("add", [DEF, USE, USE]), // AddAddr
    desc!("add", [DEF, USE, USE]),
    desc!("add", [DEF, USE, USE]), // AddI
    desc!("add", [DEF, USE, USE, USE]), // AddShifted
    desc!("sub", [DEF, USE, USE]),
    desc!("sub", [DEF, USE, USE]), // SubI
    desc!("mul", [DEF, USE, USE]),
    desc!("sdiv", [DEF, USE, USE]),
    desc!("udiv", [DEF, USE, USE]),
    desc!("msub", [DEF, USE, USE, USE]),
    desc!("and", [DEF, USE, USE]),
    desc!("and", [DEF, USE, USE]), // AndI
    desc!("orr", [DEF, USE, USE]),
    desc!("eor", [DEF, USE, USE]),
    desc!("lsl", [DEF, USE, USE]),
    desc!("lsl", [DEF, USE, USE]), // LslI
    desc!("lsr", [DEF, USE, USE]),
    desc!("lsr", [DEF, USE, USE]), // LsrI
    desc!("asr", [DEF, USE, USE]),
    desc!("asr", [DEF, USE, USE]), // AsrI
    desc!("cmp", [USE, USE]),
    desc!("cmp", [USE, USE]), // CmpI
    desc!("cset", [DEF, USE]),
    InstDesc {
        is_terminator: true,
        ..desc!("b", [USE, USE])
    }, // BCond
    InstDesc {
        is_terminator: true,
        ..desc!("b", [USE])
    },
    InstDesc {
        is_call: true,
        clobbers: &CALL_CLOBBERS,
        ..desc!("bl", [USE])
    },
    InstDesc {
        is_call: true,
        clobbers: &CALL_CLOBBERS,
        ..desc!("blr", [USE])
    },
    InstDesc {
        is_ret: true,
        is_terminator: true,
        ..desc!("ret", [])
    },
    desc!("sxtb", [DEF, USE]),
    desc!("sxth", [DEF, USE]),
    desc!("sxtw", [DEF, USE]),
    desc!("uxtb", [DEF, USE]),
    desc!("uxth", [DEF, USE]),
    desc!("fadd", [DEF, USE, USE]),
    desc!("fsub", [DEF, USE, USE]),
    desc!("fmul", [DEF, USE, USE]),
    desc!("fdiv", [DEF, USE, USE]),
    desc!("fcmp", [USE, USE]),
    desc!("fmov", [DEF, USE]),
    desc!("scvtf", [DEF, USE]),
    desc!("ucvtf", [DEF, USE]),
    desc!("fcvtzs", [DEF, USE]),
    desc!("fcvtzu", [DEF, USE]),
    desc!("fcvt", [DEF, USE]),
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
        assert_eq!(desc(A64Op::MovRR.into()).name, "mov");
        assert_eq!(desc(A64Op::Msub.into()).name, "msub");
        assert_eq!(desc(A64Op::Fcvt.into()).name, "fcvt");
        assert!(desc(A64Op::Bl.into()).is_call);
        assert!(desc(A64Op::Ret.into()).is_terminator);
        assert!(desc(A64Op::Str.into()).may_store);
    }
}
