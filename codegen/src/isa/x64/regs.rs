//! x86-64 register definitions.
//!
//! Every size alias has its own id: GPR group `g` occupies ids
//! `4g .. 4g+3` for its 64/32/16/8-bit names, XMM registers sit at
//! `64 .. 79` (one id for all widths). `is_same_register` relates ids of
//! the same group.

use crate::isa::registers::RegisterInfo;
use crate::mir::{Reg, RegClass};

macro_rules! gpr {
    ($name:ident, $group:expr) => {
        /// The 64-bit id of this register.
        pub const $name: Reg = Reg::phys($group * 4);
    };
}

gpr!(RAX, 0);
gpr!(RCX, 1);
gpr!(RDX, 2);
gpr!(RBX, 3);
gpr!(RSP, 4);
gpr!(RBP, 5);
gpr!(RSI, 6);
gpr!(RDI, 7);
gpr!(R8, 8);
gpr!(R9, 9);
gpr!(R10, 10);
gpr!(R11, 11);
gpr!(R12, 12);
gpr!(R13, 13);
gpr!(R14, 14);
gpr!(R15, 15);

/// XMM register `i`.
pub const fn xmm(i: u32) -> Reg {
    Reg::phys(64 + i)
}

/// XMM0.
pub const XMM0: Reg = xmm(0);
/// XMM1.
pub const XMM1: Reg = xmm(1);

#[rustfmt::skip]
static GPR_NAMES: [[&str; 4]; 16] = [
    ["rax", "eax",  "ax",   "al"],
    ["rcx", "ecx",  "cx",   "cl"],
    ["rdx", "edx",  "dx",   "dl"],
    ["rbx", "ebx",  "bx",   "bl"],
    ["rsp", "esp",  "sp",   "spl"],
    ["rbp", "ebp",  "bp",   "bpl"],
    ["rsi", "esi",  "si",   "sil"],
    ["rdi", "edi",  "di",   "dil"],
    ["r8",  "r8d",  "r8w",  "r8b"],
    ["r9",  "r9d",  "r9w",  "r9b"],
    ["r10", "r10d", "r10w", "r10b"],
    ["r11", "r11d", "r11w", "r11b"],
    ["r12", "r12d", "r12w", "r12b"],
    ["r13", "r13d", "r13w", "r13b"],
    ["r14", "r14d", "r14w", "r14b"],
    ["r15", "r15d", "r15w", "r15b"],
];

static XMM_NAMES: [&str; 16] = [
    "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7", "xmm8", "xmm9", "xmm10",
    "xmm11", "xmm12", "xmm13", "xmm14", "xmm15",
];

/// Integer registers handed out by the allocator, in preference order.
/// The stack and frame pointers are reserved.
static ALLOCATABLE_INT: [Reg; 14] = [
    RAX, RCX, RDX, RSI, RDI, R8, R9, R10, R11, RBX, R12, R13, R14, R15,
];

static ALLOCATABLE_FLOAT: [Reg; 16] = [
    xmm(0),
    xmm(1),
    xmm(2),
    xmm(3),
    xmm(4),
    xmm(5),
    xmm(6),
    xmm(7),
    xmm(8),
    xmm(9),
    xmm(10),
    xmm(11),
    xmm(12),
    xmm(13),
    xmm(14),
    xmm(15),
];

/// The System V volatile set.
static CALLER_SAVED: [Reg; 25] = [
    RAX,
    RCX,
    RDX,
    RSI,
    RDI,
    R8,
    R9,
    R10,
    R11,
    xmm(0),
    xmm(1),
    xmm(2),
    xmm(3),
    xmm(4),
    xmm(5),
    xmm(6),
    xmm(7),
    xmm(8),
    xmm(9),
    xmm(10),
    xmm(11),
    xmm(12),
    xmm(13),
    xmm(14),
    xmm(15),
];

static CALLEE_SAVED: [Reg; 6] = [RBX, RBP, R12, R13, R14, R15];

/// System V integer argument registers.
pub static INT_ARGS: [Reg; 6] = [RDI, RSI, RDX, RCX, R8, R9];

/// System V float argument registers.
pub static FLOAT_ARGS: [Reg; 8] = [
    xmm(0),
    xmm(1),
    xmm(2),
    xmm(3),
    xmm(4),
    xmm(5),
    xmm(6),
    xmm(7),
];

/// Integer return registers (two for small struct returns).
pub static INT_RETS: [Reg; 2] = [RAX, RDX];

/// Float return registers.
pub static FLOAT_RETS: [Reg; 2] = [xmm(0), xmm(1)];

/// The x86-64 register file.
pub struct X64RegInfo;

impl RegisterInfo for X64RegInfo {
    fn name(&self, reg: Reg) -> &'static str {
        let i = reg.index() as usize;
        if i < 64 {
            GPR_NAMES[i / 4][i % 4]
        } else {
            XMM_NAMES[i - 64]
        }
    }

    fn class(&self, reg: Reg) -> RegClass {
        if reg.index() < 64 {
            RegClass::Int
        } else {
            RegClass::Float
        }
    }

    fn allocatable(&self, class: RegClass) -> &'static [Reg] {
        match class {
            RegClass::Int => &ALLOCATABLE_INT,
            RegClass::Float => &ALLOCATABLE_FLOAT,
        }
    }

    fn caller_saved(&self) -> &'static [Reg] {
        &CALLER_SAVED
    }

    fn callee_saved(&self) -> &'static [Reg] {
        &CALLEE_SAVED
    }

    fn is_same_register(&self, a: Reg, b: Reg) -> bool {
        let (a, b) = (a.index(), b.index());
        if a < 64 && b < 64 {
            a / 4 == b / 4
        } else {
            a == b
        }
    }

    fn register_with_size(&self, reg: Reg, size: u8) -> Reg {
        let i = reg.index();
        if i >= 64 {
            return reg;
        }
        let slot = match size {
            8 => 0,
            4 => 1,
            2 => 2,
            _ => 3,
        };
        Reg::phys((i / 4) * 4 + slot)
    }

    fn frame_pointer(&self) -> Reg {
        RBP
    }

    fn stack_pointer(&self) -> Reg {
        RSP
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliasing_and_sizes() {
        let ri = X64RegInfo;
        assert_eq!(ri.name(RAX), "rax");
        let eax = ri.register_with_size(RAX, 4);
        assert_eq!(ri.name(eax), "eax");
        assert!(ri.is_same_register(RAX, eax));
        assert!(!ri.is_same_register(RAX, RCX));
        assert_eq!(ri.register_with_size(eax, 8), RAX);
        assert_eq!(ri.class(xmm(3)), RegClass::Float);
        assert!(ri.is_same_register(xmm(3), xmm(3)));
        assert!(!ri.is_same_register(xmm(3), xmm(4)));
    }
}
