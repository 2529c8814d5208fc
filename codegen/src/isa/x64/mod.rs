//! x86-64 target definition.

pub mod inst;
pub mod legalize;
pub mod patterns;
pub mod regs;

pub use self::inst::X64Op;
pub use self::regs::X64RegInfo;

use crate::ir::{Context, Function, Inst};
use crate::isa::registers::{InstDesc, RegisterInfo};
use crate::isa::{CallConv, InstructionInfo, TargetIsa};
use crate::isel::{NodeKind, Pattern};
use crate::mir::{
    MachFunction, MachInst, MachOpcode, MachOperand, OperandFlags, Reg, RegClass,
};
use target_lexicon::Triple;

/// Instruction descriptors and patterns for x86-64.
pub struct X64InstInfo;

impl InstructionInfo for X64InstInfo {
    fn desc(&self, opcode: MachOpcode) -> &'static InstDesc {
        inst::desc(opcode)
    }

    fn patterns(&self, kind: NodeKind) -> &'static [Pattern] {
        patterns::patterns(kind)
    }
}

/// The x86-64 target.
pub struct X64Target {
    triple: Triple,
    reg_info: X64RegInfo,
    inst_info: X64InstInfo,
}

impl X64Target {
    /// Create the target for a concrete triple.
    pub fn new(triple: Triple) -> Self {
        Self {
            triple,
            reg_info: X64RegInfo,
            inst_info: X64InstInfo,
        }
    }

    /// The triple this target was created for.
    pub fn triple(&self) -> &Triple {
        &self.triple
    }
}

fn r64(reg: Reg) -> MachOperand {
    MachOperand::Reg {
        reg,
        flags: OperandFlags::FORCE_64,
    }
}

fn rf(reg: Reg, size: u8) -> MachOperand {
    MachOperand::Reg {
        reg,
        flags: OperandFlags::for_size(if size <= 4 { 4 } else { 8 }),
    }
}

impl TargetIsa for X64Target {
    fn name(&self) -> &'static str {
        "x64"
    }

    fn register_info(&self) -> &dyn RegisterInfo {
        &self.reg_info
    }

    fn instruction_info(&self) -> &dyn InstructionInfo {
        &self.inst_info
    }

    fn default_call_conv(&self) -> CallConv {
        CallConv::SystemV
    }

    fn prepare_function(&self, func: &mut Function, ctx: &mut Context) {
        legalize::prepare_function(func, ctx);
    }

    fn legalize_inst(&self, func: &mut Function, ctx: &mut Context, inst: Inst) -> bool {
        legalize::legalize_inst(func, ctx, inst)
    }

    fn int_arg_regs(&self) -> &'static [Reg] {
        &regs::INT_ARGS
    }

    fn float_arg_regs(&self) -> &'static [Reg] {
        &regs::FLOAT_ARGS
    }

    fn int_ret_regs(&self) -> &'static [Reg] {
        &regs::INT_RETS
    }

    fn float_ret_regs(&self) -> &'static [Reg] {
        &regs::FLOAT_RETS
    }

    fn spill_load(&self, class: RegClass, size: u8, dst: Reg, slot: u32) -> MachInst {
        let (op, dst_op) = match class {
            RegClass::Int => (X64Op::MovRM, rf(dst, size)),
            RegClass::Float => (
                X64Op::FMovRM,
                MachOperand::Reg {
                    reg: dst,
                    flags: OperandFlags::for_size(size),
                },
            ),
        };
        MachInst::new(
            op,
            [dst_op, MachOperand::FrameIndex { index: slot }, MachOperand::imm(0)],
        )
    }

    fn spill_store(&self, class: RegClass, size: u8, slot: u32, src: Reg) -> MachInst {
        let (op, src_op) = match class {
            RegClass::Int => (X64Op::MovMR, rf(src, size)),
            RegClass::Float => (
                X64Op::FMovMR,
                MachOperand::Reg {
                    reg: src,
                    flags: OperandFlags::for_size(size),
                },
            ),
        };
        MachInst::new(
            op,
            [MachOperand::FrameIndex { index: slot }, MachOperand::imm(0), src_op],
        )
    }

    fn push_reg(&self, reg: Reg) -> MachInst {
        MachInst::new(X64Op::Push, [r64(reg)])
    }

    fn pop_reg(&self, reg: Reg) -> MachInst {
        MachInst::new(X64Op::Pop, [r64(reg)])
    }

    fn stack_adjust(&self, bytes: i32) -> MachInst {
        if bytes < 0 {
            MachInst::new(
                X64Op::SubI,
                [r64(regs::RSP), MachOperand::imm(i64::from(-bytes))],
            )
        } else {
            MachInst::new(
                X64Op::AddI,
                [r64(regs::RSP), MachOperand::imm(i64::from(bytes))],
            )
        }
    }

    fn reg_move(&self, class: RegClass, size: u8, dst: Reg, src: Reg) -> MachInst {
        match class {
            RegClass::Int => MachInst::new(X64Op::MovRR, [rf(dst, size), rf(src, size)]),
            RegClass::Float => MachInst::new(
                X64Op::FMovRR,
                [
                    MachOperand::Reg {
                        reg: dst,
                        flags: OperandFlags::for_size(size),
                    },
                    MachOperand::Reg {
                        reg: src,
                        flags: OperandFlags::for_size(size),
                    },
                ],
            ),
        }
    }

    fn imm_move(&self, size: u8, dst: Reg, value: i64) -> MachInst {
        MachInst::new(X64Op::MovRI, [rf(dst, size), MachOperand::imm(value)])
    }

    fn frame_addr(&self, dst: Reg, slot: u32) -> MachInst {
        MachInst::new(
            X64Op::Lea,
            [r64(dst), MachOperand::FrameIndex { index: slot }, MachOperand::imm(0)],
        )
    }

    /// `push rbp; mov rbp, rsp; sub rsp, size` up front, the mirror
    /// teardown before every `ret`.
    fn insert_prologue_epilogue(&self, mf: &mut MachFunction) {
        mf.frame.finalize();
        let frame_size = mf.frame.frame_size;

        let mut prologue = vec![
            MachInst::new(X64Op::Push, [r64(regs::RBP)]),
            MachInst::new(X64Op::MovRR, [r64(regs::RBP), r64(regs::RSP)]),
        ];
        if frame_size > 0 {
            prologue.push(MachInst::new(
                X64Op::SubI,
                [r64(regs::RSP), MachOperand::imm(i64::from(frame_size))],
            ));
        }
        mf.prologue_len = prologue.len() as u32;
        let entry = mf.entry();
        mf.blocks[entry].insts.splice(0..0, prologue);

        let epilogue = [
            MachInst::new(X64Op::MovRR, [r64(regs::RSP), r64(regs::RBP)]),
            MachInst::new(X64Op::Pop, [r64(regs::RBP)]),
        ];
        mf.epilogue_len = epilogue.len() as u32;
        for block in mf.blocks.values_mut() {
            let Some(ret_pos) = block
                .insts
                .iter()
                .position(|i| inst::desc(i.opcode).is_ret)
            else {
                continue;
            };
            block
                .insts
                .splice(ret_pos..ret_pos, epilogue.iter().cloned());
        }
    }
}
