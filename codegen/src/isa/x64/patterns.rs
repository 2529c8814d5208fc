//! x86-64 instruction-selection patterns.
//!
//! Per node kind, an ordered pattern list: immediate-absorbing forms
//! first, then the general register forms. Ties in tile cost go to the
//! earlier pattern, so the cheap address-generation tiles (`lea`) are
//! declared before the plain ALU forms they compete with.
//!
//! Small integers (i1/i8/i16) are widened to 32 bits on load (sign
//! extension preserves both signed and unsigned order) and all ALU work
//! happens at 32 or 64 bits; byte/word width flags appear only on loads,
//! stores and `setcc`.

use crate::ir::{Type, TypeData};
use crate::isel::{NodeId, NodeKind, NodePayload, Pattern, Selector};
use crate::isa::x64::inst::X64Op;
use crate::isa::x64::regs;
use crate::mir::{CallInfo, MachInst, MachOperand, OperandFlags, Reg, RegClass};
use crate::OptLevel;
use smallvec::{smallvec, SmallVec};

const O0: OptLevel = OptLevel::None;
const O1: OptLevel = OptLevel::Speed;

/// The working width for integer ALU operations: 32 bits for small
/// types, 64 for pointer-sized ones.
fn wf(size: u8) -> OperandFlags {
    if size <= 4 {
        OperandFlags::FORCE_32
    } else {
        OperandFlags::FORCE_64
    }
}

fn exact_wf(size: u8) -> OperandFlags {
    OperandFlags::for_size(size)
}

fn rop(reg: Reg, flags: OperandFlags) -> MachOperand {
    MachOperand::Reg { reg, flags }
}

fn is_int(s: &Selector, n: NodeId) -> bool {
    let ty = s.node(n).ty;
    !s.is_float(ty)
}

fn fits_i32(v: i64) -> bool {
    i32::try_from(v).is_ok()
}

/// Move an arbitrary emitted operand into a register of the given class.
fn to_reg(s: &mut Selector, op: MachOperand, class: RegClass, size: u8) -> Reg {
    match op {
        MachOperand::Reg { reg, .. } => reg,
        MachOperand::Imm { value, .. } => {
            let r = s.mf.new_vreg(class, size.max(4));
            s.push(MachInst::new(X64Op::MovRI, [rop(r, wf(size)), MachOperand::imm(value)]));
            r
        }
        MachOperand::FrameIndex { index } => {
            let r = s.mf.new_vreg(RegClass::Int, 8);
            s.push(MachInst::new(
                X64Op::Lea,
                [
                    rop(r, OperandFlags::FORCE_64),
                    MachOperand::FrameIndex { index },
                    MachOperand::imm(0),
                ],
            ));
            r
        }
        MachOperand::Global { .. } | MachOperand::ExtSym { .. } => {
            let r = s.mf.new_vreg(RegClass::Int, 8);
            s.push(MachInst::new(
                X64Op::Lea,
                [rop(r, OperandFlags::FORCE_64), op, MachOperand::imm(0)],
            ));
            r
        }
        MachOperand::ConstPool { index } => {
            let (_, size) = s.mf.constants[index as usize];
            let r = s.mf.new_vreg(RegClass::Float, size);
            s.push(MachInst::new(
                X64Op::FMovRM,
                [
                    rop(r, exact_wf(size)),
                    MachOperand::ConstPool { index },
                    MachOperand::imm(0),
                ],
            ));
            r
        }
        MachOperand::Label { .. } => panic!("label used as a value"),
    }
}

/// Emit operand `i` of `n` and put it in a register.
fn operand_reg(s: &mut Selector, n: NodeId, i: usize) -> Reg {
    let op_node = s.operand(n, i);
    let ty = s.node(op_node).ty;
    let class = s.class_of(ty);
    let size = s.type_size(ty);
    let op = s.emit_or_get(op_node);
    to_reg(s, op, class, size)
}

/// The destination register of an instruction node's result.
fn result_reg(s: &mut Selector, n: NodeId) -> Reg {
    let result = s.result_node(n);
    s.vreg(result)
}

// Value nodes.

static REGISTER: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 0,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| {
        let ty = s.node(n).ty;
        let size = s.type_size(ty);
        let reg = s.vreg(n);
        rop(reg, if s.is_float(ty) { exact_wf(size) } else { wf(size) })
    },
}];

static CONST_INT: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 0,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| MachOperand::imm(s.node(n).imm().unwrap()),
}];

static CONST_FLOAT: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| {
        let NodePayload::FloatBits(bits) = s.node(n).payload else {
            unreachable!()
        };
        let size = s.type_size(s.node(n).ty);
        if bits == 0 {
            // xorps zeroes without touching memory.
            let r = s.mf.new_vreg(RegClass::Float, size);
            let op = rop(r, exact_wf(size));
            s.push(MachInst::new(X64Op::Xorps, [op.clone(), op.clone()]));
            return op;
        }
        let index = s.float_pool_index(bits, size);
        let r = s.mf.new_vreg(RegClass::Float, size);
        s.push(MachInst::new(
            X64Op::FMovRM,
            [
                rop(r, exact_wf(size)),
                MachOperand::ConstPool { index },
                MachOperand::imm(0),
            ],
        ));
        rop(r, exact_wf(size))
    },
}];

static FRAME_INDEX: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 0,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| {
        let NodePayload::Frame(index) = s.node(n).payload else {
            unreachable!()
        };
        MachOperand::FrameIndex { index }
    },
}];

static GLOBAL_ADDR: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 0,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| match &s.node(n).payload {
        NodePayload::Global(gv) => MachOperand::Global {
            global: *gv,
            flags: OperandFlags::empty(),
        },
        NodePayload::Func(f) => MachOperand::ExtSym {
            name: s.func_name(*f),
            flags: OperandFlags::empty(),
        },
        _ => unreachable!(),
    },
}];

static FUNC_ARG: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| {
        let NodePayload::Arg(index) = s.node(n).payload else {
            unreachable!()
        };
        let ty = s.node(n).ty;
        let size = s.type_size(ty);
        let class = s.class_of(ty);
        let dst = s.mf.new_vreg(class, size);
        match s.arg_reg(index) {
            Some(phys) => {
                let (op, fl) = if class == RegClass::Float {
                    (X64Op::FMovRR, exact_wf(size))
                } else {
                    (X64Op::MovRR, wf(size))
                };
                s.push(MachInst::new(op, [rop(dst, fl), rop(phys, fl)]));
                rop(dst, fl)
            }
            None => {
                let slot = s.stack_arg_slot(index);
                let fl = if class == RegClass::Float {
                    exact_wf(size)
                } else {
                    wf(size)
                };
                let op = if class == RegClass::Float {
                    X64Op::FMovRM
                } else {
                    X64Op::MovRM
                };
                s.push(MachInst::new(
                    op,
                    [
                        rop(dst, fl),
                        MachOperand::FrameIndex { index: slot },
                        MachOperand::imm(0),
                    ],
                ));
                rop(dst, fl)
            }
        }
    },
}];

static MULTI_VALUE: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 0,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |_, _| MachOperand::imm(0),
}];

// Integer ALU.

/// `mov dst, lhs; <op> dst, rhs` with rhs in a register.
fn two_address(s: &mut Selector, n: NodeId, opcode: X64Op) -> MachOperand {
    let size = s.type_size(s.node(n).ty);
    let fl = wf(size);
    let dst = result_reg(s, n);
    let lhs = operand_reg(s, n, 0);
    let rhs = operand_reg(s, n, 1);
    s.push(MachInst::new(X64Op::MovRR, [rop(dst, fl), rop(lhs, fl)]));
    s.push(MachInst::new(opcode, [rop(dst, fl), rop(rhs, fl)]));
    rop(dst, fl)
}

/// `mov dst, lhs; <op> dst, imm` absorbing a constant rhs.
fn two_address_imm(s: &mut Selector, n: NodeId, opcode: X64Op) -> MachOperand {
    let size = s.type_size(s.node(n).ty);
    let fl = wf(size);
    let imm = s.const_int(s.operand(n, 1)).unwrap();
    let dst = result_reg(s, n);
    let lhs = operand_reg(s, n, 0);
    s.push(MachInst::new(X64Op::MovRR, [rop(dst, fl), rop(lhs, fl)]));
    s.push(MachInst::new(opcode, [rop(dst, fl), MachOperand::imm(imm)]));
    rop(dst, fl)
}

fn float_two_address(s: &mut Selector, n: NodeId, op32: X64Op, op64: X64Op) -> MachOperand {
    let size = s.type_size(s.node(n).ty);
    let fl = exact_wf(size);
    let opcode = if size == 4 { op32 } else { op64 };
    let dst = result_reg(s, n);
    let lhs = operand_reg(s, n, 0);
    let rhs = operand_reg(s, n, 1);
    s.push(MachInst::new(X64Op::FMovRR, [rop(dst, fl), rop(lhs, fl)]));
    s.push(MachInst::new(opcode, [rop(dst, fl), rop(rhs, fl)]));
    rop(dst, fl)
}

fn rhs_is_small_imm(s: &Selector, n: NodeId) -> bool {
    is_int(s, n)
        && s.const_int(s.operand(n, 1)).map_or(false, fits_i32)
}

static ADD: [Pattern; 4] = [
    Pattern {
        min_opt: O0,
        cost: 1,
        covered: &[1],
        matches: rhs_is_small_imm,
        emit: |s, n| two_address_imm(s, n, X64Op::AddI),
    },
    // Address generation adds both operands in one tile.
    Pattern {
        min_opt: O0,
        cost: 1,
        covered: &[],
        matches: |s, n| is_int(s, n) && s.type_size(s.node(n).ty) >= 4,
        emit: |s, n| {
            let size = s.type_size(s.node(n).ty);
            let fl = wf(size);
            let dst = result_reg(s, n);
            let lhs = operand_reg(s, n, 0);
            let rhs = operand_reg(s, n, 1);
            s.push(MachInst::new(
                X64Op::LeaIndex,
                [
                    rop(dst, fl),
                    rop(lhs, OperandFlags::FORCE_64),
                    rop(rhs, OperandFlags::FORCE_64),
                    MachOperand::imm(1),
                    MachOperand::imm(0),
                ],
            ));
            rop(dst, fl)
        },
    },
    Pattern {
        min_opt: O0,
        cost: 2,
        covered: &[],
        matches: is_int,
        emit: |s, n| two_address(s, n, X64Op::Add),
    },
    Pattern {
        min_opt: O0,
        cost: 2,
        covered: &[],
        matches: |s, n| !is_int(s, n),
        emit: |s, n| float_two_address(s, n, X64Op::Addss, X64Op::Addsd),
    },
];

static SUB: [Pattern; 3] = [
    Pattern {
        min_opt: O0,
        cost: 1,
        covered: &[1],
        matches: rhs_is_small_imm,
        emit: |s, n| two_address_imm(s, n, X64Op::SubI),
    },
    Pattern {
        min_opt: O0,
        cost: 2,
        covered: &[],
        matches: is_int,
        emit: |s, n| two_address(s, n, X64Op::Sub),
    },
    Pattern {
        min_opt: O0,
        cost: 2,
        covered: &[],
        matches: |s, n| !is_int(s, n),
        emit: |s, n| float_two_address(s, n, X64Op::Subss, X64Op::Subsd),
    },
];

static IMUL: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 3,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| two_address(s, n, X64Op::IMul),
}];

static FMUL: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 4,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| float_two_address(s, n, X64Op::Mulss, X64Op::Mulsd),
}];

static FDIV: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 10,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| float_two_address(s, n, X64Op::Divss, X64Op::Divsd),
}];

/// Signed or unsigned division and remainder through rax/rdx.
fn div_like(s: &mut Selector, n: NodeId, signed: bool, want_rem: bool) -> MachOperand {
    let size = s.type_size(s.node(n).ty);
    let fl = wf(size);
    let dst = result_reg(s, n);
    let lhs = operand_reg(s, n, 0);
    let rhs = operand_reg(s, n, 1);
    s.push(MachInst::new(
        X64Op::MovRR,
        [rop(regs::RAX, fl), rop(lhs, fl)],
    ));
    if signed {
        let ext = if size <= 4 { X64Op::Cdq } else { X64Op::Cqo };
        s.push(MachInst::new(ext, []));
        s.push(MachInst::new(X64Op::Idiv, [rop(rhs, fl)]));
    } else {
        s.push(MachInst::new(
            X64Op::MovRI,
            [rop(regs::RDX, fl), MachOperand::imm(0)],
        ));
        s.push(MachInst::new(X64Op::Div, [rop(rhs, fl)]));
    }
    let src = if want_rem { regs::RDX } else { regs::RAX };
    s.push(MachInst::new(X64Op::MovRR, [rop(dst, fl), rop(src, fl)]));
    rop(dst, fl)
}

static IDIV: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 20,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| div_like(s, n, true, false),
}];

static UDIV: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 20,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| div_like(s, n, false, false),
}];

static IREM: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 20,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| div_like(s, n, true, true),
}];

static UREM: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 20,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| div_like(s, n, false, true),
}];

static AND: [Pattern; 2] = [
    Pattern {
        min_opt: O0,
        cost: 1,
        covered: &[1],
        matches: rhs_is_small_imm,
        emit: |s, n| two_address_imm(s, n, X64Op::AndI),
    },
    Pattern {
        min_opt: O0,
        cost: 2,
        covered: &[],
        matches: crate::isel::pattern::match_any,
        emit: |s, n| two_address(s, n, X64Op::And),
    },
];

static OR: [Pattern; 2] = [
    Pattern {
        min_opt: O0,
        cost: 1,
        covered: &[1],
        matches: rhs_is_small_imm,
        emit: |s, n| two_address_imm(s, n, X64Op::OrI),
    },
    Pattern {
        min_opt: O0,
        cost: 2,
        covered: &[],
        matches: crate::isel::pattern::match_any,
        emit: |s, n| two_address(s, n, X64Op::Or),
    },
];

static XOR: [Pattern; 2] = [
    Pattern {
        min_opt: O0,
        cost: 1,
        covered: &[1],
        matches: rhs_is_small_imm,
        emit: |s, n| two_address_imm(s, n, X64Op::XorI),
    },
    Pattern {
        min_opt: O0,
        cost: 2,
        covered: &[],
        matches: crate::isel::pattern::match_any,
        emit: |s, n| two_address(s, n, X64Op::Xor),
    },
];

fn shift(s: &mut Selector, n: NodeId, reg_op_code: X64Op, imm_op: X64Op) -> MachOperand {
    let size = s.type_size(s.node(n).ty);
    let fl = wf(size);
    let dst = result_reg(s, n);
    let lhs = operand_reg(s, n, 0);
    s.push(MachInst::new(X64Op::MovRR, [rop(dst, fl), rop(lhs, fl)]));
    if let Some(v) = s.const_int(s.operand(n, 1)) {
        s.push(MachInst::new(imm_op, [rop(dst, fl), MachOperand::imm(v)]));
    } else {
        let rhs = operand_reg(s, n, 1);
        s.push(MachInst::new(
            X64Op::MovRR,
            [rop(regs::RCX, OperandFlags::FORCE_32), rop(rhs, OperandFlags::FORCE_32)],
        ));
        s.push(MachInst::new(
            reg_op_code,
            [rop(dst, fl), rop(regs::RCX, OperandFlags::FORCE_8)],
        ));
    }
    rop(dst, fl)
}

static SHL: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| shift(s, n, X64Op::Shl, X64Op::ShlI),
}];

static LSHR: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| shift(s, n, X64Op::Shr, X64Op::ShrI),
}];

static ASHR: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| shift(s, n, X64Op::Sar, X64Op::SarI),
}];

// Comparisons.

/// x86 condition-code numbers as used in the `COND` immediate.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(i64)]
#[allow(missing_docs)]
pub enum CondCode {
    E = 0,
    Ne = 1,
    L = 2,
    Le = 3,
    G = 4,
    Ge = 5,
    B = 6,
    Be = 7,
    A = 8,
    Ae = 9,
}

/// The condition code of an integer comparison.
pub fn int_cc(cc: crate::ir::IntCC) -> CondCode {
    use crate::ir::IntCC::*;
    match cc {
        Equal => CondCode::E,
        NotEqual => CondCode::Ne,
        SignedLessThan => CondCode::L,
        SignedLessThanOrEqual => CondCode::Le,
        SignedGreaterThan => CondCode::G,
        SignedGreaterThanOrEqual => CondCode::Ge,
        UnsignedLessThan => CondCode::B,
        UnsignedLessThanOrEqual => CondCode::Be,
        UnsignedGreaterThan => CondCode::A,
        UnsignedGreaterThanOrEqual => CondCode::Ae,
    }
}

/// The condition code of a float comparison (`ucomis*` sets the unsigned
/// flags).
pub fn float_cc(cc: crate::ir::FloatCC) -> CondCode {
    use crate::ir::FloatCC::*;
    match cc {
        Equal => CondCode::E,
        NotEqual => CondCode::Ne,
        LessThan => CondCode::B,
        LessThanOrEqual => CondCode::Be,
        GreaterThan => CondCode::A,
        GreaterThanOrEqual => CondCode::Ae,
    }
}

fn cc_operand(cc: CondCode) -> MachOperand {
    MachOperand::Imm {
        value: cc as i64,
        flags: OperandFlags::COND,
    }
}

/// Emit the flag-setting comparison for a compare node (not the setcc).
fn emit_compare(s: &mut Selector, n: NodeId) {
    let lhs_node = s.operand(n, 0);
    let lhs_ty = s.node(lhs_node).ty;
    let size = s.type_size(lhs_ty);
    if s.is_float(lhs_ty) {
        let opcode = if size == 4 {
            X64Op::Ucomiss
        } else {
            X64Op::Ucomisd
        };
        let lhs = operand_reg(s, n, 0);
        let rhs = operand_reg(s, n, 1);
        s.push(MachInst::new(
            opcode,
            [rop(lhs, exact_wf(size)), rop(rhs, exact_wf(size))],
        ));
        return;
    }
    let fl = wf(size);
    let lhs = operand_reg(s, n, 0);
    if let Some(v) = s.const_int(s.operand(n, 1)).filter(|&v| fits_i32(v)) {
        s.push(MachInst::new(X64Op::CmpI, [rop(lhs, fl), MachOperand::imm(v)]));
    } else {
        let rhs = operand_reg(s, n, 1);
        s.push(MachInst::new(X64Op::Cmp, [rop(lhs, fl), rop(rhs, fl)]));
    }
}

fn compare_value(s: &mut Selector, n: NodeId, cc: CondCode) -> MachOperand {
    emit_compare(s, n);
    let dst = result_reg(s, n);
    s.push(MachInst::new(
        X64Op::Setcc,
        [rop(dst, OperandFlags::FORCE_8), cc_operand(cc)],
    ));
    s.push(MachInst::new(
        X64Op::Movzx,
        [rop(dst, OperandFlags::FORCE_32), rop(dst, OperandFlags::FORCE_8)],
    ));
    rop(dst, OperandFlags::FORCE_8)
}

static ICMP: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 2,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| {
        let NodeKind::Icmp(cc) = s.node(n).kind else {
            unreachable!()
        };
        compare_value(s, n, int_cc(cc))
    },
}];

static FCMP: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 2,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| {
        let NodeKind::Fcmp(cc) = s.node(n).kind else {
            unreachable!()
        };
        compare_value(s, n, float_cc(cc))
    },
}];

// Casts.

static ZEXT: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| {
        let from_size = s.type_size(s.node(s.operand(n, 0)).ty);
        let to_size = s.type_size(s.node(n).ty);
        let dst = result_reg(s, n);
        let src = operand_reg(s, n, 0);
        match from_size {
            1 | 2 => s.push(MachInst::new(
                X64Op::Movzx,
                [rop(dst, wf(to_size)), rop(src, exact_wf(from_size))],
            )),
            // A 32-bit move zero-extends to 64 bits by itself.
            _ => s.push(MachInst::new(
                X64Op::MovRR,
                [rop(dst, OperandFlags::FORCE_32), rop(src, OperandFlags::FORCE_32)],
            )),
        }
        rop(dst, wf(to_size))
    },
}];

static SEXT: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| {
        let from_size = s.type_size(s.node(s.operand(n, 0)).ty);
        let to_size = s.type_size(s.node(n).ty);
        let dst = result_reg(s, n);
        let src = operand_reg(s, n, 0);
        s.push(MachInst::new(
            X64Op::Movsx,
            [rop(dst, wf(to_size)), rop(src, exact_wf(from_size))],
        ));
        rop(dst, wf(to_size))
    },
}];

static TRUNC: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| {
        // Keep the low bits; narrower names appear at use sites.
        let to_size = s.type_size(s.node(n).ty);
        let dst = result_reg(s, n);
        let src = operand_reg(s, n, 0);
        let fl = wf(to_size);
        s.push(MachInst::new(X64Op::MovRR, [rop(dst, fl), rop(src, fl)]));
        rop(dst, fl)
    },
}];

static GENERIC_CAST: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| {
        let dst = result_reg(s, n);
        let op_node = s.operand(n, 0);
        let op = s.emit_or_get(op_node);
        let src = to_reg(s, op, RegClass::Int, 8);
        s.push(MachInst::new(
            X64Op::MovRR,
            [rop(dst, OperandFlags::FORCE_64), rop(src, OperandFlags::FORCE_64)],
        ));
        rop(dst, OperandFlags::FORCE_64)
    },
}];

static FPTRUNC: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| {
        let dst = result_reg(s, n);
        let src = operand_reg(s, n, 0);
        s.push(MachInst::new(
            X64Op::Cvtsd2ss,
            [rop(dst, OperandFlags::FORCE_32), rop(src, OperandFlags::FORCE_64)],
        ));
        rop(dst, OperandFlags::FORCE_32)
    },
}];

static FPEXT: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| {
        let dst = result_reg(s, n);
        let src = operand_reg(s, n, 0);
        s.push(MachInst::new(
            X64Op::Cvtss2sd,
            [rop(dst, OperandFlags::FORCE_64), rop(src, OperandFlags::FORCE_32)],
        ));
        rop(dst, OperandFlags::FORCE_64)
    },
}];

static FPTOSI: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 2,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| fp_to_int(s, n, /* via_64 = */ false),
}];

/// `fptoui` for widths the legalizer left intact (≤ 32 bits): convert
/// through the 64-bit signed form and keep the low bits.
static FPTOUI: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 2,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| fp_to_int(s, n, true),
}];

fn fp_to_int(s: &mut Selector, n: NodeId, via_64: bool) -> MachOperand {
    let from = s.operand(n, 0);
    let from_size = s.type_size(s.node(from).ty);
    let to_size = s.type_size(s.node(n).ty);
    let opcode = if from_size == 4 {
        X64Op::Cvttss2si
    } else {
        X64Op::Cvttsd2si
    };
    let dst = result_reg(s, n);
    let src = operand_reg(s, n, 0);
    let dst_fl = if via_64 || to_size > 4 {
        OperandFlags::FORCE_64
    } else {
        OperandFlags::FORCE_32
    };
    s.push(MachInst::new(
        opcode,
        [rop(dst, dst_fl), rop(src, exact_wf(from_size))],
    ));
    rop(dst, wf(to_size))
}

static SITOFP: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 2,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| int_to_fp(s, n, true),
}];

/// `uitofp` for widths the legalizer left intact (< 64 bits):
/// zero-extend into 64 bits and convert signed.
static UITOFP: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 2,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| int_to_fp(s, n, false),
}];

fn int_to_fp(s: &mut Selector, n: NodeId, signed: bool) -> MachOperand {
    let from = s.operand(n, 0);
    let from_size = s.type_size(s.node(from).ty);
    let to_size = s.type_size(s.node(n).ty);
    let opcode = if to_size == 4 {
        X64Op::Cvtsi2ss
    } else {
        X64Op::Cvtsi2sd
    };
    let dst = result_reg(s, n);
    let src = operand_reg(s, n, 0);
    // Widen the source to a full register first.
    let wide = s.mf.new_vreg(RegClass::Int, 8);
    if signed {
        match from_size {
            8 => s.push(MachInst::new(
                X64Op::MovRR,
                [rop(wide, OperandFlags::FORCE_64), rop(src, OperandFlags::FORCE_64)],
            )),
            4 => s.push(MachInst::new(
                X64Op::Movsx,
                [rop(wide, OperandFlags::FORCE_64), rop(src, OperandFlags::FORCE_32)],
            )),
            sz => s.push(MachInst::new(
                X64Op::Movsx,
                [rop(wide, OperandFlags::FORCE_64), rop(src, exact_wf(sz))],
            )),
        }
    } else {
        match from_size {
            4 => s.push(MachInst::new(
                X64Op::MovRR,
                [rop(wide, OperandFlags::FORCE_32), rop(src, OperandFlags::FORCE_32)],
            )),
            sz => s.push(MachInst::new(
                X64Op::Movzx,
                [rop(wide, OperandFlags::FORCE_32), rop(src, exact_wf(sz.min(2)))],
            )),
        }
    }
    s.push(MachInst::new(
        opcode,
        [rop(dst, exact_wf(to_size)), rop(wide, OperandFlags::FORCE_64)],
    ));
    rop(dst, exact_wf(to_size))
}

// Memory.

/// Decompose a GEP node into `(base operand, constant offset, optional
/// scaled index)`.
struct GepParts {
    base: MachOperand,
    offset: i64,
    index: Option<(Reg, u8)>,
}

fn gep_parts(s: &mut Selector, n: NodeId) -> GepParts {
    let base_node = s.operand(n, 0);
    let base_ty = s.node(base_node).ty;
    let mut cur: Type = s.ctx.types.pointee(base_ty).expect("gep base not a pointer");
    let dl = s.isa.data_layout();

    let mut offset: i64 = 0;
    let mut index: Option<(Reg, u8)> = None;

    let num_ops = s.num_operands(n);
    for i in 1..num_ops {
        let idx = s.operand(n, i);
        // The first index scales by the whole pointee; later ones walk
        // into the aggregate.
        let (elem_ty, elem_size) = if i == 1 {
            (cur, dl.size(&s.ctx.types, cur) as i64)
        } else {
            match s.ctx.types.resolve(cur).clone() {
                TypeData::Array { elem, .. } => (elem, dl.size(&s.ctx.types, elem) as i64),
                TypeData::Ptr(p) => (p, dl.size(&s.ctx.types, p) as i64),
                TypeData::Struct(fields) => {
                    let fi = s.const_int(idx).expect("struct index is constant") as usize;
                    let mut field_off = 0i64;
                    for &f in &fields[..fi] {
                        field_off += dl.size(&s.ctx.types, f) as i64;
                    }
                    offset += field_off;
                    cur = fields[fi];
                    continue;
                }
                _ => panic!("gep walks into a scalar"),
            }
        };
        cur = elem_ty;
        match s.const_int(idx) {
            Some(c) => offset += c * elem_size,
            None => {
                let r = operand_reg(s, n, i);
                if matches!(elem_size, 1 | 2 | 4 | 8) && index.is_none() {
                    index = Some((r, elem_size as u8));
                } else {
                    // Scale by hand and fold into the running index.
                    let scaled = s.mf.new_vreg(RegClass::Int, 8);
                    let t = s.mf.new_vreg(RegClass::Int, 8);
                    s.push(MachInst::new(
                        X64Op::MovRR,
                        [rop(scaled, OperandFlags::FORCE_64), rop(r, OperandFlags::FORCE_64)],
                    ));
                    s.push(MachInst::new(
                        X64Op::MovRI,
                        [rop(t, OperandFlags::FORCE_64), MachOperand::imm(elem_size)],
                    ));
                    s.push(MachInst::new(
                        X64Op::IMul,
                        [rop(scaled, OperandFlags::FORCE_64), rop(t, OperandFlags::FORCE_64)],
                    ));
                    index = match index {
                        None => Some((scaled, 1)),
                        Some((prev, sc)) => {
                            let sum = s.mf.new_vreg(RegClass::Int, 8);
                            s.push(MachInst::new(
                                X64Op::LeaIndex,
                                [
                                    rop(sum, OperandFlags::FORCE_64),
                                    rop(prev, OperandFlags::FORCE_64),
                                    rop(scaled, OperandFlags::FORCE_64),
                                    MachOperand::imm(sc as i64),
                                    MachOperand::imm(0),
                                ],
                            ));
                            Some((sum, 1))
                        }
                    };
                }
            }
        }
    }

    let base = s.emit_or_get(base_node);
    GepParts {
        base,
        offset,
        index,
    }
}

/// Materialise an address computation into a register.
fn gep_address(s: &mut Selector, n: NodeId) -> MachOperand {
    let parts = gep_parts(s, n);
    let dst = result_reg(s, n);
    let base = match parts.base {
        MachOperand::Reg { reg, .. } => rop(reg, OperandFlags::FORCE_64),
        other @ (MachOperand::FrameIndex { .. }
        | MachOperand::Global { .. }
        | MachOperand::ExtSym { .. }) => other,
        other => rop(to_reg(s, other, RegClass::Int, 8), OperandFlags::FORCE_64),
    };
    match parts.index {
        None => {
            s.push(MachInst::new(
                X64Op::Lea,
                [rop(dst, OperandFlags::FORCE_64), base, MachOperand::imm(parts.offset)],
            ));
        }
        Some((idx, scale)) => {
            s.push(MachInst::new(
                X64Op::LeaIndex,
                [
                    rop(dst, OperandFlags::FORCE_64),
                    base,
                    rop(idx, OperandFlags::FORCE_64),
                    MachOperand::imm(scale as i64),
                    MachOperand::imm(parts.offset),
                ],
            ));
        }
    }
    rop(dst, OperandFlags::FORCE_64)
}

static GEP: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: gep_address,
}];

/// The `(base, disp)` address pair for a pointer operand already emitted.
fn mem_operands(s: &mut Selector, ptr: MachOperand) -> (MachOperand, i64) {
    match ptr {
        MachOperand::FrameIndex { .. } | MachOperand::Global { .. } | MachOperand::ExtSym { .. } => {
            (ptr, 0)
        }
        MachOperand::Reg { reg, .. } => (rop(reg, OperandFlags::FORCE_64), 0),
        other => {
            let r = to_reg(s, other, RegClass::Int, 8);
            (rop(r, OperandFlags::FORCE_64), 0)
        }
    }
}

fn load_scalar(s: &mut Selector, n: NodeId, base: MachOperand, disp: i64) -> MachOperand {
    let ty = s.node(n).ty;
    let size = s.type_size(ty);
    let dst = result_reg(s, n);
    if s.is_float(ty) {
        let fl = exact_wf(size);
        s.push(MachInst::new(
            X64Op::FMovRM,
            [rop(dst, fl), base, MachOperand::imm(disp)],
        ));
        return rop(dst, fl);
    }
    match size {
        1 | 2 => {
            // Widen on load; see the module comment.
            s.push(MachInst::new(
                X64Op::MovRM,
                [rop(dst, exact_wf(size)), base, MachOperand::imm(disp)],
            ));
            s.push(MachInst::new(
                X64Op::Movsx,
                [rop(dst, OperandFlags::FORCE_32), rop(dst, exact_wf(size))],
            ));
            rop(dst, OperandFlags::FORCE_32)
        }
        _ => {
            let fl = wf(size);
            s.push(MachInst::new(
                X64Op::MovRM,
                [rop(dst, fl), base, MachOperand::imm(disp)],
            ));
            rop(dst, fl)
        }
    }
}

static LOAD: [Pattern; 3] = [
    // Fold an address computation into the load.
    Pattern {
        min_opt: O1,
        cost: 1,
        covered: &[0],
        matches: |s, n| {
            !s.ctx.types.is_struct(s.node(n).ty)
                && s.node(s.operand(n, 0)).kind == NodeKind::Gep
                && s.node(s.operand(n, 0)).root == s.node(n).root
        },
        emit: |s, n| {
            let gep = s.operand(n, 0);
            let parts = gep_parts(s, gep);
            match parts.index {
                None => {
                    let (base, extra) = mem_operands(s, parts.base);
                    load_scalar(s, n, base, parts.offset + extra)
                }
                Some((idx, scale)) => {
                    // Compute the address, then load through it.
                    let addr = s.mf.new_vreg(RegClass::Int, 8);
                    let (base, _) = mem_operands(s, parts.base);
                    s.push(MachInst::new(
                        X64Op::LeaIndex,
                        [
                            rop(addr, OperandFlags::FORCE_64),
                            base,
                            rop(idx, OperandFlags::FORCE_64),
                            MachOperand::imm(scale as i64),
                            MachOperand::imm(parts.offset),
                        ],
                    ));
                    load_scalar(s, n, rop(addr, OperandFlags::FORCE_64), 0)
                }
            }
        },
    },
    // Struct load into a multi-value bundle.
    Pattern {
        min_opt: O0,
        cost: 2,
        covered: &[],
        matches: |s, n| s.ctx.types.is_struct(s.node(n).ty),
        emit: |s, n| {
            let ptr = s.emit_or_get(s.operand(n, 0));
            let (base, disp) = mem_operands(s, ptr);
            let multi = s.result_node(n);
            let fields = s.multi_fields(multi);
            let dl = s.isa.data_layout();
            let mut off = disp;
            for field in fields {
                let fty = s.node(field).ty;
                let size = s.type_size(fty);
                let dst = s.vreg(field);
                let (op, fl) = if s.is_float(fty) {
                    (X64Op::FMovRM, exact_wf(size))
                } else {
                    (X64Op::MovRM, wf(size))
                };
                s.push(MachInst::new(
                    op,
                    [rop(dst, fl), base.clone(), MachOperand::imm(off)],
                ));
                off += dl.size(&s.ctx.types, fty) as i64;
            }
            MachOperand::imm(0)
        },
    },
    Pattern {
        min_opt: O0,
        cost: 2,
        covered: &[],
        matches: crate::isel::pattern::match_any,
        emit: |s, n| {
            let ptr = s.emit_or_get(s.operand(n, 0));
            let (base, disp) = mem_operands(s, ptr);
            load_scalar(s, n, base, disp)
        },
    },
];

static STORE: [Pattern; 2] = [
    // Small-immediate store.
    Pattern {
        min_opt: O0,
        cost: 1,
        covered: &[1],
        matches: |s, n| {
            s.const_int(s.operand(n, 1)).map_or(false, fits_i32)
        },
        emit: |s, n| {
            let value = s.const_int(s.operand(n, 1)).unwrap();
            let size = s.type_size(s.node(s.operand(n, 1)).ty);
            let ptr = s.emit_or_get(s.operand(n, 0));
            let (base, disp) = mem_operands(s, ptr);
            s.push(MachInst::new(
                X64Op::MovMI,
                [
                    base,
                    MachOperand::imm(disp),
                    MachOperand::Imm {
                        value,
                        flags: exact_wf(size),
                    },
                ],
            ));
            MachOperand::imm(0)
        },
    },
    Pattern {
        min_opt: O0,
        cost: 2,
        covered: &[],
        matches: crate::isel::pattern::match_any,
        emit: |s, n| {
            let val_node = s.operand(n, 1);
            let vty = s.node(val_node).ty;
            let size = s.type_size(vty);
            let src = operand_reg(s, n, 1);
            let ptr = s.emit_or_get(s.operand(n, 0));
            let (base, disp) = mem_operands(s, ptr);
            let (op, fl) = if s.is_float(vty) {
                (X64Op::FMovMR, exact_wf(size))
            } else {
                (X64Op::MovMR, exact_wf(size))
            };
            s.push(MachInst::new(
                op,
                [base, MachOperand::imm(disp), rop(src, fl)],
            ));
            MachOperand::imm(0)
        },
    },
];

// Calls, returns, branches.

static CALL: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 5,
    covered: &[0],
    matches: crate::isel::pattern::match_any,
    emit: emit_call,
}];

fn emit_call(s: &mut Selector, n: NodeId) -> MachOperand {
    let num_args = s.num_operands(n) - 1;
    let mut int_next = 0usize;
    let mut float_next = 0usize;
    let mut setup = 0u32;
    let mut stack_args: SmallVec<[usize; 4]> = smallvec![];

    for i in 1..=num_args {
        let arg = s.operand(n, i);
        let ty = s.node(arg).ty;
        if s.is_float(ty) {
            if float_next < regs::FLOAT_ARGS.len() {
                let phys = regs::FLOAT_ARGS[float_next];
                float_next += 1;
                let size = s.type_size(ty);
                let src = operand_reg(s, n, i);
                s.push(MachInst::new(
                    X64Op::FMovRR,
                    [rop(phys, exact_wf(size)), rop(src, exact_wf(size))],
                ));
                setup += 1;
            } else {
                stack_args.push(i);
            }
        } else if int_next < regs::INT_ARGS.len() {
            let phys = regs::INT_ARGS[int_next];
            int_next += 1;
            let size = s.type_size(ty);
            let op = s.emit_or_get(arg);
            match op {
                MachOperand::Imm { value, .. } => s.push(MachInst::new(
                    X64Op::MovRI,
                    [rop(phys, wf(size)), MachOperand::imm(value)],
                )),
                other => {
                    let src = to_reg(s, other, RegClass::Int, size);
                    s.push(MachInst::new(
                        X64Op::MovRR,
                        [rop(phys, wf(size)), rop(src, wf(size))],
                    ));
                }
            }
            setup += 1;
        } else {
            stack_args.push(i);
        }
    }

    // Overflow arguments go on the stack right to left, with an 8-byte
    // pad to keep 16-byte alignment when the count is odd.
    let padded = stack_args.len() % 2 == 1;
    if padded {
        s.push(MachInst::new(
            X64Op::SubI,
            [rop(regs::RSP, OperandFlags::FORCE_64), MachOperand::imm(8)],
        ));
        setup += 1;
    }
    for &i in stack_args.iter().rev() {
        let r = operand_reg(s, n, i);
        s.push(MachInst::new(X64Op::Push, [rop(r, OperandFlags::FORCE_64)]));
        setup += 1;
    }

    // The callee: direct symbol when it is a known address, otherwise an
    // indirect call through a register.
    let callee = s.operand(n, 0);
    let mut info = CallInfo {
        ret_regs: smallvec![],
        arg_setup: setup,
    };
    let ret_ty = s.node(n).ty;
    if !s.ctx.types.is_void(ret_ty) {
        if s.ctx.types.is_struct(ret_ty) {
            let mut int_rets = regs::INT_RETS.iter();
            let mut float_rets = regs::FLOAT_RETS.iter();
            let fields = s.multi_fields(s.result_node(n));
            for field in &fields {
                let fty = s.node(*field).ty;
                let r = if s.is_float(fty) {
                    *float_rets.next().expect("too many float return fields")
                } else {
                    *int_rets.next().expect("too many int return fields")
                };
                info.ret_regs.push(r);
            }
        } else if s.is_float(ret_ty) {
            info.ret_regs.push(regs::FLOAT_RETS[0]);
        } else {
            info.ret_regs.push(regs::INT_RETS[0]);
        }
    }

    let callee_op = s.emit_or_get(callee);
    let mut call = match callee_op {
        MachOperand::ExtSym { .. } | MachOperand::Global { .. } => {
            MachInst::new(X64Op::CallSym, [callee_op])
        }
        other => {
            let r = to_reg(s, other, RegClass::Int, 8);
            MachInst::new(X64Op::CallReg, [rop(r, OperandFlags::FORCE_64)])
        }
    };
    call.call_info = Some(Box::new(info));
    s.push(call);

    // Free the stack-argument area.
    let stack_bytes = (stack_args.len() + usize::from(padded)) * 8;
    if stack_bytes > 0 {
        s.push(MachInst::new(
            X64Op::AddI,
            [
                rop(regs::RSP, OperandFlags::FORCE_64),
                MachOperand::imm(stack_bytes as i64),
            ],
        ));
    }

    // Bind results.
    if s.ctx.types.is_void(ret_ty) {
        return MachOperand::imm(0);
    }
    if s.ctx.types.is_struct(ret_ty) {
        let fields = s.multi_fields(s.result_node(n));
        let mut int_rets = regs::INT_RETS.iter();
        let mut float_rets = regs::FLOAT_RETS.iter();
        for field in fields {
            let fty = s.node(field).ty;
            let size = s.type_size(fty);
            let dst = s.vreg(field);
            if s.is_float(fty) {
                let r = *float_rets.next().unwrap();
                s.push(MachInst::new(
                    X64Op::FMovRR,
                    [rop(dst, exact_wf(size)), rop(r, exact_wf(size))],
                ));
            } else {
                let r = *int_rets.next().unwrap();
                s.push(MachInst::new(
                    X64Op::MovRR,
                    [rop(dst, wf(size)), rop(r, wf(size))],
                ));
            }
        }
        MachOperand::imm(0)
    } else {
        let size = s.type_size(ret_ty);
        let dst = result_reg(s, n);
        if s.is_float(ret_ty) {
            s.push(MachInst::new(
                X64Op::FMovRR,
                [rop(dst, exact_wf(size)), rop(regs::FLOAT_RETS[0], exact_wf(size))],
            ));
            rop(dst, exact_wf(size))
        } else {
            s.push(MachInst::new(
                X64Op::MovRR,
                [rop(dst, wf(size)), rop(regs::INT_RETS[0], wf(size))],
            ));
            rop(dst, wf(size))
        }
    }
}

static RET: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| {
        if s.num_operands(n) == 1 {
            let val = s.operand(n, 0);
            let ty = s.node(val).ty;
            if s.ctx.types.is_struct(ty) {
                // Struct fields travel in the return register pair.
                let agg = s.node(val).result.expand().unwrap_or(val);
                let fields = s.multi_fields(agg);
                let mut int_rets = regs::INT_RETS.iter();
                let mut float_rets = regs::FLOAT_RETS.iter();
                for field in fields {
                    let fty = s.node(field).ty;
                    let size = s.type_size(fty);
                    let src = s.vreg(field);
                    if s.is_float(fty) {
                        let r = *float_rets.next().unwrap();
                        s.push(MachInst::new(
                            X64Op::FMovRR,
                            [rop(r, exact_wf(size)), rop(src, exact_wf(size))],
                        ));
                    } else {
                        let r = *int_rets.next().unwrap();
                        s.push(MachInst::new(
                            X64Op::MovRR,
                            [rop(r, wf(size)), rop(src, wf(size))],
                        ));
                    }
                }
            } else {
                let size = s.type_size(ty);
                if s.is_float(ty) {
                    let src = operand_reg(s, n, 0);
                    s.push(MachInst::new(
                        X64Op::FMovRR,
                        [rop(regs::FLOAT_RETS[0], exact_wf(size)), rop(src, exact_wf(size))],
                    ));
                } else {
                    let op = s.emit_or_get(val);
                    match op {
                        MachOperand::Imm { value, .. } => s.push(MachInst::new(
                            X64Op::MovRI,
                            [rop(regs::INT_RETS[0], wf(size)), MachOperand::imm(value)],
                        )),
                        other => {
                            let src = to_reg(s, other, RegClass::Int, size);
                            s.push(MachInst::new(
                                X64Op::MovRR,
                                [rop(regs::INT_RETS[0], wf(size)), rop(src, wf(size))],
                            ));
                        }
                    }
                }
            }
        }
        s.push(MachInst::new(X64Op::Ret, []));
        MachOperand::imm(0)
    },
}];

static JUMP: [Pattern; 2] = [
    // Fused compare-and-branch: the condition is a compare in the same
    // block, absorbed into this tile.
    Pattern {
        min_opt: O0,
        cost: 1,
        covered: &[0],
        matches: |s, n| {
            s.blocks(n).len() == 2
                && s.num_operands(n) == 1
                && matches!(
                    s.node(s.operand(n, 0)).kind,
                    NodeKind::Icmp(_) | NodeKind::Fcmp(_)
                )
                && s.node(s.operand(n, 0)).root == s.node(n).root
        },
        emit: |s, n| {
            let cond = s.operand(n, 0);
            let cc = match s.node(cond).kind {
                NodeKind::Icmp(cc) => int_cc(cc),
                NodeKind::Fcmp(cc) => float_cc(cc),
                _ => unreachable!(),
            };
            emit_compare(s, cond);
            let dests = s.blocks(n);
            let (then_b, else_b) = (dests[0], dests[1]);
            let then_l = s.label(then_b);
            let else_l = s.label(else_b);
            s.push(MachInst::new(
                X64Op::Jcc,
                [MachOperand::Label { block: then_l }, cc_operand(cc)],
            ));
            s.push(MachInst::new(X64Op::Jmp, [MachOperand::Label { block: else_l }]));
            MachOperand::imm(0)
        },
    },
    Pattern {
        min_opt: O0,
        cost: 1,
        covered: &[],
        matches: crate::isel::pattern::match_any,
        emit: |s, n| {
            let dests: SmallVec<[crate::ir::Block; 2]> = s.blocks(n).iter().copied().collect();
            if dests.len() == 1 {
                let l = s.label(dests[0]);
                s.push(MachInst::new(X64Op::Jmp, [MachOperand::Label { block: l }]));
                return MachOperand::imm(0);
            }
            let cond = operand_reg(s, n, 0);
            s.push(MachInst::new(
                X64Op::CmpI,
                [rop(cond, OperandFlags::FORCE_8), MachOperand::imm(0)],
            ));
            let then_l = s.label(dests[0]);
            let else_l = s.label(dests[1]);
            s.push(MachInst::new(
                X64Op::Jcc,
                [MachOperand::Label { block: then_l }, cc_operand(CondCode::Ne)],
            ));
            s.push(MachInst::new(X64Op::Jmp, [MachOperand::Label { block: else_l }]));
            MachOperand::imm(0)
        },
    },
];

static SWITCH: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 3,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| {
        // Linear compare-and-branch chain, default last.
        let dests: SmallVec<[crate::ir::Block; 2]> = s.blocks(n).iter().copied().collect();
        let default = dests[0];
        let cond_node = s.operand(n, 0);
        let size = s.type_size(s.node(cond_node).ty);
        let fl = wf(size);
        let cond = operand_reg(s, n, 0);
        for (k, &case_block) in dests[1..].iter().enumerate() {
            let case_val = s
                .const_int(s.operand(n, 1 + k))
                .expect("switch case is a constant int");
            s.push(MachInst::new(
                X64Op::CmpI,
                [rop(cond, fl), MachOperand::imm(case_val)],
            ));
            let l = s.label(case_block);
            s.push(MachInst::new(
                X64Op::Jcc,
                [MachOperand::Label { block: l }, cc_operand(CondCode::E)],
            ));
        }
        let l = s.label(default);
        s.push(MachInst::new(X64Op::Jmp, [MachOperand::Label { block: l }]));
        MachOperand::imm(0)
    },
}];

static PHI: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 0,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| {
        // The φ itself is just its register; predecessors fill it in with
        // the moves inserted after emission.
        let result = s.result_node(n);
        s.emit_or_get(result)
    },
}];

static EXTRACT_VALUE: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 0,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| {
        let NodePayload::Index(index) = s.node(n).payload else {
            unreachable!()
        };
        let agg = s.operand(n, 0);
        let multi = s
            .node(agg)
            .result
            .expand()
            .expect("extractvalue over a node without results");
        let field = s.multi_fields(multi)[index as usize];
        s.emit_or_get(field)
    },
}];

/// The pattern table for a node kind.
pub fn patterns(kind: NodeKind) -> &'static [Pattern] {
    match kind {
        NodeKind::Add => &ADD,
        NodeKind::Sub => &SUB,
        NodeKind::IMul | NodeKind::UMul => &IMUL,
        NodeKind::FMul => &FMUL,
        NodeKind::IDiv => &IDIV,
        NodeKind::UDiv => &UDIV,
        NodeKind::FDiv => &FDIV,
        NodeKind::IRem => &IREM,
        NodeKind::URem => &UREM,
        NodeKind::Icmp(_) => &ICMP,
        NodeKind::Fcmp(_) => &FCMP,
        NodeKind::Shl => &SHL,
        NodeKind::LShr => &LSHR,
        NodeKind::AShr => &ASHR,
        NodeKind::And => &AND,
        NodeKind::Or => &OR,
        NodeKind::Xor => &XOR,
        NodeKind::Zext => &ZEXT,
        NodeKind::Sext => &SEXT,
        NodeKind::Trunc => &TRUNC,
        NodeKind::FpTrunc => &FPTRUNC,
        NodeKind::FpExt => &FPEXT,
        NodeKind::FpToSi => &FPTOSI,
        NodeKind::FpToUi => &FPTOUI,
        NodeKind::SiToFp => &SITOFP,
        NodeKind::UiToFp => &UITOFP,
        NodeKind::GenericCast => &GENERIC_CAST,
        NodeKind::Gep => &GEP,
        NodeKind::Load => &LOAD,
        NodeKind::Store => &STORE,
        NodeKind::Call => &CALL,
        NodeKind::Jump => &JUMP,
        NodeKind::Switch => &SWITCH,
        NodeKind::Ret => &RET,
        NodeKind::Phi => &PHI,
        NodeKind::ExtractValue => &EXTRACT_VALUE,
        NodeKind::Register => &REGISTER,
        NodeKind::ConstInt => &CONST_INT,
        NodeKind::ConstFloat => &CONST_FLOAT,
        NodeKind::FrameIndex => &FRAME_INDEX,
        NodeKind::GlobalAddr => &GLOBAL_ADDR,
        NodeKind::FuncArg => &FUNC_ARG,
        NodeKind::MultiValue => &MULTI_VALUE,
    }
}
