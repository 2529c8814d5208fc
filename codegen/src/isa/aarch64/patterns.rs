//! AArch64 instruction-selection patterns.
//!
//! Three-address forms make these tiles simpler than their x64
//! counterparts: no copy into the destination, and remainders go through
//! `msub` rather than fixed divider registers.

use crate::isel::{NodeId, NodeKind, NodePayload, Pattern, Selector};
use crate::isa::aarch64::inst::A64Op;
use crate::isa::aarch64::regs;
use crate::mir::{CallInfo, MachInst, MachOperand, OperandFlags, Reg, RegClass};
use crate::OptLevel;
use smallvec::{smallvec, SmallVec};

const O0: OptLevel = OptLevel::None;

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
    !s.is_float(s.node(n).ty)
}

/// AArch64 condition codes carried in `COND` immediates.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(i64)]
#[allow(missing_docs)]
pub enum CondCode {
    Eq = 0,
    Ne = 1,
    Lt = 2,
    Le = 3,
    Gt = 4,
    Ge = 5,
    Lo = 6,
    Ls = 7,
    Hi = 8,
    Hs = 9,
    Mi = 10,
}

/// Condition code for an integer compare.
pub fn int_cc(cc: crate::ir::IntCC) -> CondCode {
    use crate::ir::IntCC::*;
    match cc {
        Equal => CondCode::Eq,
        NotEqual => CondCode::Ne,
        SignedLessThan => CondCode::Lt,
        SignedLessThanOrEqual => CondCode::Le,
        SignedGreaterThan => CondCode::Gt,
        SignedGreaterThanOrEqual => CondCode::Ge,
        UnsignedLessThan => CondCode::Lo,
        UnsignedLessThanOrEqual => CondCode::Ls,
        UnsignedGreaterThan => CondCode::Hi,
        UnsignedGreaterThanOrEqual => CondCode::Hs,
    }
}

/// Condition code for a float compare.
pub fn float_cc(cc: crate::ir::FloatCC) -> CondCode {
    use crate::ir::FloatCC::*;
    match cc {
        Equal => CondCode::Eq,
        NotEqual => CondCode::Ne,
        LessThan => CondCode::Mi,
        LessThanOrEqual => CondCode::Ls,
        GreaterThan => CondCode::Gt,
        GreaterThanOrEqual => CondCode::Ge,
    }
}

fn cc_operand(cc: CondCode) -> MachOperand {
    MachOperand::Imm {
        value: cc as i64,
        flags: OperandFlags::COND,
    }
}

fn to_reg(s: &mut Selector, op: MachOperand, class: RegClass, size: u8) -> Reg {
    match op {
        MachOperand::Reg { reg, .. } => reg,
        MachOperand::Imm { value, .. } => {
            let r = s.mf.new_vreg(class, size.max(4));
            s.push(MachInst::new(
                A64Op::MovImm,
                [rop(r, wf(size)), MachOperand::imm(value)],
            ));
            r
        }
        MachOperand::FrameIndex { index } => {
            let r = s.mf.new_vreg(RegClass::Int, 8);
            s.push(MachInst::new(
                A64Op::AddAddr,
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
                A64Op::AddAddr,
                [rop(r, OperandFlags::FORCE_64), op, MachOperand::imm(0)],
            ));
            r
        }
        MachOperand::ConstPool { index } => {
            let (_, size) = s.mf.constants[index as usize];
            let r = s.mf.new_vreg(RegClass::Float, size);
            s.push(MachInst::new(
                A64Op::LdrF,
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

fn operand_reg(s: &mut Selector, n: NodeId, i: usize) -> Reg {
    let op_node = s.operand(n, i);
    let ty = s.node(op_node).ty;
    let class = s.class_of(ty);
    let size = s.type_size(ty);
    let op = s.emit_or_get(op_node);
    to_reg(s, op, class, size)
}

fn result_reg(s: &mut Selector, n: NodeId) -> Reg {
    let result = s.result_node(n);
    s.vreg(result)
}

fn three_address(s: &mut Selector, n: NodeId, opcode: A64Op) -> MachOperand {
    let size = s.type_size(s.node(n).ty);
    let fl = if s.is_float(s.node(n).ty) {
        exact_wf(size)
    } else {
        wf(size)
    };
    let dst = result_reg(s, n);
    let lhs = operand_reg(s, n, 0);
    let rhs = operand_reg(s, n, 1);
    s.push(MachInst::new(opcode, [rop(dst, fl), rop(lhs, fl), rop(rhs, fl)]));
    rop(dst, fl)
}

fn three_address_imm(s: &mut Selector, n: NodeId, opcode: A64Op) -> MachOperand {
    let size = s.type_size(s.node(n).ty);
    let fl = wf(size);
    let imm = s.const_int(s.operand(n, 1)).unwrap();
    let dst = result_reg(s, n);
    let lhs = operand_reg(s, n, 0);
    s.push(MachInst::new(
        opcode,
        [rop(dst, fl), rop(lhs, fl), MachOperand::imm(imm)],
    ));
    rop(dst, fl)
}

fn rhs_is_arith_imm(s: &Selector, n: NodeId) -> bool {
    is_int(s, n)
        && s.const_int(s.operand(n, 1))
            .map_or(false, |v| (0..4096).contains(&v))
}

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
        let index = s.float_pool_index(bits, size);
        let r = s.mf.new_vreg(RegClass::Float, size);
        s.push(MachInst::new(
            A64Op::LdrF,
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
        let fl = if class == RegClass::Float {
            exact_wf(size)
        } else {
            wf(size)
        };
        match s.arg_reg(index) {
            Some(phys) => {
                let op = if class == RegClass::Float {
                    A64Op::FMovRR
                } else {
                    A64Op::MovRR
                };
                s.push(MachInst::new(op, [rop(dst, fl), rop(phys, fl)]));
            }
            None => {
                let slot = s.stack_arg_slot(index);
                let op = if class == RegClass::Float {
                    A64Op::LdrF
                } else {
                    A64Op::Ldr
                };
                s.push(MachInst::new(
                    op,
                    [
                        rop(dst, fl),
                        MachOperand::FrameIndex { index: slot },
                        MachOperand::imm(0),
                    ],
                ));
            }
        }
        rop(dst, fl)
    },
}];

static MULTI_VALUE: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 0,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |_, _| MachOperand::imm(0),
}];

static ADD: [Pattern; 3] = [
    Pattern {
        min_opt: O0,
        cost: 1,
        covered: &[1],
        matches: rhs_is_arith_imm,
        emit: |s, n| three_address_imm(s, n, A64Op::AddI),
    },
    Pattern {
        min_opt: O0,
        cost: 1,
        covered: &[],
        matches: is_int,
        emit: |s, n| three_address(s, n, A64Op::Add),
    },
    Pattern {
        min_opt: O0,
        cost: 2,
        covered: &[],
        matches: |s, n| !is_int(s, n),
        emit: |s, n| three_address(s, n, A64Op::FAdd),
    },
];

static SUB: [Pattern; 3] = [
    Pattern {
        min_opt: O0,
        cost: 1,
        covered: &[1],
        matches: rhs_is_arith_imm,
        emit: |s, n| three_address_imm(s, n, A64Op::SubI),
    },
    Pattern {
        min_opt: O0,
        cost: 1,
        covered: &[],
        matches: is_int,
        emit: |s, n| three_address(s, n, A64Op::Sub),
    },
    Pattern {
        min_opt: O0,
        cost: 2,
        covered: &[],
        matches: |s, n| !is_int(s, n),
        emit: |s, n| three_address(s, n, A64Op::FSub),
    },
];

static MUL: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 3,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| three_address(s, n, A64Op::Mul),
}];

static FMUL: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 3,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| three_address(s, n, A64Op::FMul),
}];

static SDIV: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 12,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| three_address(s, n, A64Op::SDiv),
}];

static UDIVP: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 12,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| three_address(s, n, A64Op::UDiv),
}];

static FDIVP: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 12,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| three_address(s, n, A64Op::FDiv),
}];

/// `rem = a - (a / b) * b` via `sdiv`/`udiv` + `msub`.
fn rem(s: &mut Selector, n: NodeId, div: A64Op) -> MachOperand {
    let size = s.type_size(s.node(n).ty);
    let fl = wf(size);
    let dst = result_reg(s, n);
    let lhs = operand_reg(s, n, 0);
    let rhs = operand_reg(s, n, 1);
    let quot = s.mf.new_vreg(RegClass::Int, size);
    s.push(MachInst::new(div, [rop(quot, fl), rop(lhs, fl), rop(rhs, fl)]));
    s.push(MachInst::new(
        A64Op::Msub,
        [rop(dst, fl), rop(quot, fl), rop(rhs, fl), rop(lhs, fl)],
    ));
    rop(dst, fl)
}

static IREM: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 14,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| rem(s, n, A64Op::SDiv),
}];

static UREM: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 14,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| rem(s, n, A64Op::UDiv),
}];

static AND: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| three_address(s, n, A64Op::And),
}];

static OR: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| three_address(s, n, A64Op::Orr),
}];

static XOR: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| three_address(s, n, A64Op::Eor),
}];

fn shift(s: &mut Selector, n: NodeId, reg_form: A64Op, imm_form: A64Op) -> MachOperand {
    if s.const_int(s.operand(n, 1)).is_some() {
        three_address_imm(s, n, imm_form)
    } else {
        three_address(s, n, reg_form)
    }
}

static SHL: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| shift(s, n, A64Op::Lsl, A64Op::LslI),
}];

static LSHR: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| shift(s, n, A64Op::Lsr, A64Op::LsrI),
}];

static ASHR: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| shift(s, n, A64Op::Asr, A64Op::AsrI),
}];

fn emit_compare(s: &mut Selector, n: NodeId) {
    let lhs_node = s.operand(n, 0);
    let lhs_ty = s.node(lhs_node).ty;
    let size = s.type_size(lhs_ty);
    if s.is_float(lhs_ty) {
        let lhs = operand_reg(s, n, 0);
        let rhs = operand_reg(s, n, 1);
        s.push(MachInst::new(
            A64Op::FCmp,
            [rop(lhs, exact_wf(size)), rop(rhs, exact_wf(size))],
        ));
        return;
    }
    let fl = wf(size);
    let lhs = operand_reg(s, n, 0);
    match s.const_int(s.operand(n, 1)).filter(|v| (0..4096).contains(v)) {
        Some(v) => s.push(MachInst::new(A64Op::CmpI, [rop(lhs, fl), MachOperand::imm(v)])),
        None => {
            let rhs = operand_reg(s, n, 1);
            s.push(MachInst::new(A64Op::Cmp, [rop(lhs, fl), rop(rhs, fl)]));
        }
    }
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
        emit_compare(s, n);
        let dst = result_reg(s, n);
        s.push(MachInst::new(
            A64Op::Cset,
            [rop(dst, OperandFlags::FORCE_32), cc_operand(int_cc(cc))],
        ));
        rop(dst, OperandFlags::FORCE_32)
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
        emit_compare(s, n);
        let dst = result_reg(s, n);
        s.push(MachInst::new(
            A64Op::Cset,
            [rop(dst, OperandFlags::FORCE_32), cc_operand(float_cc(cc))],
        ));
        rop(dst, OperandFlags::FORCE_32)
    },
}];

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
        let op = match from_size {
            1 => A64Op::Uxtb,
            2 => A64Op::Uxth,
            // A 32-bit move zero-extends.
            _ => A64Op::MovRR,
        };
        let src_fl = if from_size <= 4 {
            OperandFlags::FORCE_32
        } else {
            OperandFlags::FORCE_64
        };
        s.push(MachInst::new(op, [rop(dst, wf(to_size)), rop(src, src_fl)]));
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
        let op = match from_size {
            1 => A64Op::Sxtb,
            2 => A64Op::Sxth,
            4 => A64Op::Sxtw,
            _ => A64Op::MovRR,
        };
        s.push(MachInst::new(
            op,
            [rop(dst, wf(to_size)), rop(src, OperandFlags::FORCE_32)],
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
        let to_size = s.type_size(s.node(n).ty);
        let dst = result_reg(s, n);
        let src = operand_reg(s, n, 0);
        let fl = wf(to_size);
        s.push(MachInst::new(A64Op::MovRR, [rop(dst, fl), rop(src, fl)]));
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
            A64Op::MovRR,
            [rop(dst, OperandFlags::FORCE_64), rop(src, OperandFlags::FORCE_64)],
        ));
        rop(dst, OperandFlags::FORCE_64)
    },
}];

fn float_precision(s: &mut Selector, n: NodeId) -> MachOperand {
    let from_size = s.type_size(s.node(s.operand(n, 0)).ty);
    let to_size = s.type_size(s.node(n).ty);
    let dst = result_reg(s, n);
    let src = operand_reg(s, n, 0);
    s.push(MachInst::new(
        A64Op::Fcvt,
        [rop(dst, exact_wf(to_size)), rop(src, exact_wf(from_size))],
    ));
    rop(dst, exact_wf(to_size))
}

static FPTRUNC: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: float_precision,
}];

static FPEXT: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: float_precision,
}];

fn fp_int(s: &mut Selector, n: NodeId, op: A64Op) -> MachOperand {
    let from_size = s.type_size(s.node(s.operand(n, 0)).ty);
    let to_size = s.type_size(s.node(n).ty);
    let dst = result_reg(s, n);
    let src = operand_reg(s, n, 0);
    s.push(MachInst::new(
        op,
        [rop(dst, wf(to_size)), rop(src, exact_wf(from_size))],
    ));
    rop(dst, wf(to_size))
}

fn int_fp(s: &mut Selector, n: NodeId, op: A64Op) -> MachOperand {
    let from_size = s.type_size(s.node(s.operand(n, 0)).ty);
    let to_size = s.type_size(s.node(n).ty);
    let dst = result_reg(s, n);
    let src = operand_reg(s, n, 0);
    s.push(MachInst::new(
        op,
        [rop(dst, exact_wf(to_size)), rop(src, wf(from_size))],
    ));
    rop(dst, exact_wf(to_size))
}

static FPTOSI: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 2,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| fp_int(s, n, A64Op::Fcvtzs),
}];

/// AArch64 converts unsigned natively; the legalizer leaves these alone.
static FPTOUI: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 2,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| fp_int(s, n, A64Op::Fcvtzu),
}];

static SITOFP: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 2,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| int_fp(s, n, A64Op::Scvtf),
}];

static UITOFP: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 2,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| int_fp(s, n, A64Op::Ucvtf),
}];

// Memory.

fn gep_address(s: &mut Selector, n: NodeId) -> MachOperand {
    let dl = s.isa.data_layout();
    let base_node = s.operand(n, 0);
    let base_ty = s.node(base_node).ty;
    let mut cur = s.ctx.types.pointee(base_ty).expect("gep base not a pointer");

    let dst = result_reg(s, n);
    let base_op = s.emit_or_get(base_node);
    let base = to_reg(s, base_op, RegClass::Int, 8);
    let mut acc = base;
    let mut offset: i64 = 0;

    let num_ops = s.num_operands(n);
    for i in 1..num_ops {
        let idx = s.operand(n, i);
        let (elem_ty, elem_size) = if i == 1 {
            (cur, dl.size(&s.ctx.types, cur) as i64)
        } else {
            match s.ctx.types.resolve(cur).clone() {
                crate::ir::TypeData::Array { elem, .. } => {
                    (elem, dl.size(&s.ctx.types, elem) as i64)
                }
                crate::ir::TypeData::Ptr(p) => (p, dl.size(&s.ctx.types, p) as i64),
                crate::ir::TypeData::Struct(fields) => {
                    let fi = s.const_int(idx).expect("struct index is constant") as usize;
                    for &f in &fields[..fi] {
                        offset += dl.size(&s.ctx.types, f) as i64;
                    }
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
                let shift = match elem_size {
                    1 => 0,
                    2 => 1,
                    4 => 2,
                    8 => 3,
                    other => {
                        // Scale by hand.
                        let scaled = s.mf.new_vreg(RegClass::Int, 8);
                        let t = s.mf.new_vreg(RegClass::Int, 8);
                        s.push(MachInst::new(
                            A64Op::MovImm,
                            [rop(t, OperandFlags::FORCE_64), MachOperand::imm(other)],
                        ));
                        s.push(MachInst::new(
                            A64Op::Mul,
                            [
                                rop(scaled, OperandFlags::FORCE_64),
                                rop(r, OperandFlags::FORCE_64),
                                rop(t, OperandFlags::FORCE_64),
                            ],
                        ));
                        let sum = s.mf.new_vreg(RegClass::Int, 8);
                        s.push(MachInst::new(
                            A64Op::Add,
                            [
                                rop(sum, OperandFlags::FORCE_64),
                                rop(acc, OperandFlags::FORCE_64),
                                rop(scaled, OperandFlags::FORCE_64),
                            ],
                        ));
                        acc = sum;
                        continue;
                    }
                };
                let sum = s.mf.new_vreg(RegClass::Int, 8);
                s.push(MachInst::new(
                    A64Op::AddShifted,
                    [
                        rop(sum, OperandFlags::FORCE_64),
                        rop(acc, OperandFlags::FORCE_64),
                        rop(r, OperandFlags::FORCE_64),
                        MachOperand::imm(shift),
                    ],
                ));
                acc = sum;
            }
        }
    }

    s.push(MachInst::new(
        A64Op::AddI,
        [
            rop(dst, OperandFlags::FORCE_64),
            rop(acc, OperandFlags::FORCE_64),
            MachOperand::imm(offset),
        ],
    ));
    rop(dst, OperandFlags::FORCE_64)
}

static GEP: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 1,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: gep_address,
}];

fn mem_base(s: &mut Selector, ptr: MachOperand) -> MachOperand {
    match ptr {
        MachOperand::FrameIndex { .. } => ptr,
        MachOperand::Reg { reg, .. } => rop(reg, OperandFlags::FORCE_64),
        other => {
            let r = to_reg(s, other, RegClass::Int, 8);
            rop(r, OperandFlags::FORCE_64)
        }
    }
}

fn load_scalar(s: &mut Selector, n: NodeId, base: MachOperand, disp: i64) -> MachOperand {
    let ty = s.node(n).ty;
    let size = s.type_size(ty);
    let dst = result_reg(s, n);
    if s.is_float(ty) {
        s.push(MachInst::new(
            A64Op::LdrF,
            [rop(dst, exact_wf(size)), base, MachOperand::imm(disp)],
        ));
        return rop(dst, exact_wf(size));
    }
    let (op, needs_sext) = match size {
        1 => (A64Op::Ldrb, Some(A64Op::Sxtb)),
        2 => (A64Op::Ldrh, Some(A64Op::Sxth)),
        _ => (A64Op::Ldr, None),
    };
    s.push(MachInst::new(
        op,
        [rop(dst, wf(size)), base, MachOperand::imm(disp)],
    ));
    if let Some(ext) = needs_sext {
        s.push(MachInst::new(
            ext,
            [rop(dst, OperandFlags::FORCE_32), rop(dst, OperandFlags::FORCE_32)],
        ));
    }
    rop(dst, wf(size))
}

static LOAD: [Pattern; 2] = [
    Pattern {
        min_opt: O0,
        cost: 2,
        covered: &[],
        matches: |s, n| s.ctx.types.is_struct(s.node(n).ty),
        emit: |s, n| {
            let ptr = s.emit_or_get(s.operand(n, 0));
            let base = mem_base(s, ptr);
            let multi = s.result_node(n);
            let fields = s.multi_fields(multi);
            let dl = s.isa.data_layout();
            let mut off = 0i64;
            for field in fields {
                let fty = s.node(field).ty;
                let size = s.type_size(fty);
                let dst = s.vreg(field);
                let (op, fl) = if s.is_float(fty) {
                    (A64Op::LdrF, exact_wf(size))
                } else {
                    (A64Op::Ldr, wf(size))
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
            let base = mem_base(s, ptr);
            load_scalar(s, n, base, 0)
        },
    },
];

static STORE: [Pattern; 1] = [Pattern {
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
        let base = mem_base(s, ptr);
        let (op, fl) = if s.is_float(vty) {
            (A64Op::StrF, exact_wf(size))
        } else {
            match size {
                1 => (A64Op::Strb, OperandFlags::FORCE_32),
                2 => (A64Op::Strh, OperandFlags::FORCE_32),
                _ => (A64Op::Str, wf(size)),
            }
        };
        s.push(MachInst::new(
            op,
            [rop(src, fl), base, MachOperand::imm(0)],
        ));
        MachOperand::imm(0)
    },
}];

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

    for i in 1..=num_args {
        let arg = s.operand(n, i);
        let ty = s.node(arg).ty;
        let size = s.type_size(ty);
        if s.is_float(ty) {
            let phys = *regs::FLOAT_ARGS
                .get(float_next)
                .expect("float stack arguments not supported on aarch64 yet");
            float_next += 1;
            let src = operand_reg(s, n, i);
            s.push(MachInst::new(
                A64Op::FMovRR,
                [rop(phys, exact_wf(size)), rop(src, exact_wf(size))],
            ));
            setup += 1;
        } else {
            let phys = *regs::INT_ARGS
                .get(int_next)
                .expect("integer stack arguments not supported on aarch64 yet");
            int_next += 1;
            let op = s.emit_or_get(arg);
            match op {
                MachOperand::Imm { value, .. } => s.push(MachInst::new(
                    A64Op::MovImm,
                    [rop(phys, wf(size)), MachOperand::imm(value)],
                )),
                other => {
                    let src = to_reg(s, other, RegClass::Int, size);
                    s.push(MachInst::new(
                        A64Op::MovRR,
                        [rop(phys, wf(size)), rop(src, wf(size))],
                    ));
                }
            }
            setup += 1;
        }
    }

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
            for field in &s.multi_fields(s.result_node(n)) {
                let fty = s.node(*field).ty;
                info.ret_regs.push(if s.is_float(fty) {
                    *float_rets.next().expect("too many float return fields")
                } else {
                    *int_rets.next().expect("too many int return fields")
                });
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
            MachInst::new(A64Op::Bl, [callee_op])
        }
        other => {
            let r = to_reg(s, other, RegClass::Int, 8);
            MachInst::new(A64Op::Blr, [rop(r, OperandFlags::FORCE_64)])
        }
    };
    call.call_info = Some(Box::new(info));
    s.push(call);

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
                    A64Op::FMovRR,
                    [rop(dst, exact_wf(size)), rop(r, exact_wf(size))],
                ));
            } else {
                let r = *int_rets.next().unwrap();
                s.push(MachInst::new(
                    A64Op::MovRR,
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
                A64Op::FMovRR,
                [rop(dst, exact_wf(size)), rop(regs::FLOAT_RETS[0], exact_wf(size))],
            ));
            rop(dst, exact_wf(size))
        } else {
            s.push(MachInst::new(
                A64Op::MovRR,
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
                            A64Op::FMovRR,
                            [rop(r, exact_wf(size)), rop(src, exact_wf(size))],
                        ));
                    } else {
                        let r = *int_rets.next().unwrap();
                        s.push(MachInst::new(
                            A64Op::MovRR,
                            [rop(r, wf(size)), rop(src, wf(size))],
                        ));
                    }
                }
            } else {
                let size = s.type_size(ty);
                if s.is_float(ty) {
                    let src = operand_reg(s, n, 0);
                    s.push(MachInst::new(
                        A64Op::FMovRR,
                        [rop(regs::FLOAT_RETS[0], exact_wf(size)), rop(src, exact_wf(size))],
                    ));
                } else {
                    let op = s.emit_or_get(val);
                    match op {
                        MachOperand::Imm { value, .. } => s.push(MachInst::new(
                            A64Op::MovImm,
                            [rop(regs::INT_RETS[0], wf(size)), MachOperand::imm(value)],
                        )),
                        other => {
                            let src = to_reg(s, other, RegClass::Int, size);
                            s.push(MachInst::new(
                                A64Op::MovRR,
                                [rop(regs::INT_RETS[0], wf(size)), rop(src, wf(size))],
                            ));
                        }
                    }
                }
            }
        }
        s.push(MachInst::new(A64Op::Ret, []));
        MachOperand::imm(0)
    },
}];

static JUMP: [Pattern; 2] = [
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
                A64Op::BCond,
                [MachOperand::Label { block: then_l }, cc_operand(cc)],
            ));
            s.push(MachInst::new(A64Op::B, [MachOperand::Label { block: else_l }]));
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
                s.push(MachInst::new(A64Op::B, [MachOperand::Label { block: l }]));
                return MachOperand::imm(0);
            }
            let cond = operand_reg(s, n, 0);
            s.push(MachInst::new(
                A64Op::CmpI,
                [rop(cond, OperandFlags::FORCE_32), MachOperand::imm(0)],
            ));
            let then_l = s.label(dests[0]);
            let else_l = s.label(dests[1]);
            s.push(MachInst::new(
                A64Op::BCond,
                [MachOperand::Label { block: then_l }, cc_operand(CondCode::Ne)],
            ));
            s.push(MachInst::new(A64Op::B, [MachOperand::Label { block: else_l }]));
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
            if (0..4096).contains(&case_val) {
                s.push(MachInst::new(
                    A64Op::CmpI,
                    [rop(cond, fl), MachOperand::imm(case_val)],
                ));
            } else {
                let t = s.mf.new_vreg(RegClass::Int, size);
                s.push(MachInst::new(
                    A64Op::MovImm,
                    [rop(t, fl), MachOperand::imm(case_val)],
                ));
                s.push(MachInst::new(A64Op::Cmp, [rop(cond, fl), rop(t, fl)]));
            }
            let l = s.label(case_block);
            s.push(MachInst::new(
                A64Op::BCond,
                [MachOperand::Label { block: l }, cc_operand(CondCode::Eq)],
            ));
        }
        let l = s.label(default);
        s.push(MachInst::new(A64Op::B, [MachOperand::Label { block: l }]));
        MachOperand::imm(0)
    },
}];

static PHI: [Pattern; 1] = [Pattern {
    min_opt: O0,
    cost: 0,
    covered: &[],
    matches: crate::isel::pattern::match_any,
    emit: |s, n| {
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
        NodeKind::IMul | NodeKind::UMul => &MUL,
        NodeKind::FMul => &FMUL,
        NodeKind::IDiv => &SDIV,
        NodeKind::UDiv => &UDIVP,
        NodeKind::FDiv => &FDIVP,
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
