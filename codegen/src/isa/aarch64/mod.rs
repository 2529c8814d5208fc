//! AArch64 target definition.

pub mod inst;
pub mod patterns;
pub mod regs;

pub use self::inst::A64Op;
pub use self::regs::Aarch64RegInfo;

use crate::ir::{Context, Function, Inst};
use crate::isa::registers::{InstDesc, RegisterInfo};
use crate::isa::{CallConv, InstructionInfo, TargetIsa};
use crate::isel::{NodeKind, Pattern};
use crate::mir::{
    MachFunction, MachInst, MachOpcode, MachOperand, OperandFlags, Reg, RegClass,
};
use target_lexicon::Triple;

/// Instruction descriptors and patterns for AArch64.
pub struct Aarch64InstInfo;

impl InstructionInfo for Aarch64InstInfo {
    fn desc(&self, opcode: MachOpcode) -> &'static InstDesc {
        inst::desc(opcode)
    }

    fn patterns(&self, kind: NodeKind) -> &'static [Pattern] {
        patterns::patterns(kind)
    }
}

/// The AArch64 target.
pub struct Aarch64Target {
    triple: Triple,
    reg_info: Aarch64RegInfo,
    inst_info: Aarch64InstInfo,
}

impl Aarch64Target {
    /// Create the target for a concrete triple.
    pub fn new(triple: Triple) -> Self {
        Self {
            triple,
            reg_info: Aarch64RegInfo,
            inst_info: Aarch64InstInfo,
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

impl TargetIsa for Aarch64Target {
    fn name(&self) -> &'static str {
        "aarch64"
    }

    fn register_info(&self) -> &dyn RegisterInfo {
        &self.reg_info
    }

    fn instruction_info(&self) -> &dyn InstructionInfo {
        &self.inst_info
    }

    fn default_call_conv(&self) -> CallConv {
        CallConv::Aapcs64
    }

    fn prepare_function(&self, _func: &mut Function, _ctx: &mut Context) {}

    /// Everything the IR expresses has a direct AArch64 lowering
    /// (including the unsigned float conversions), so nothing rewrites.
    fn legalize_inst(&self, _func: &mut Function, _ctx: &mut Context, _inst: Inst) -> bool {
        false
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
            RegClass::Int => (A64Op::Ldr, rf(dst, size)),
            RegClass::Float => (
                A64Op::LdrF,
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
            RegClass::Int => (A64Op::Str, rf(src, size)),
            RegClass::Float => (
                A64Op::StrF,
                MachOperand::Reg {
                    reg: src,
                    flags: OperandFlags::for_size(size),
                },
            ),
        };
        MachInst::new(
            op,
            [src_op, MachOperand::FrameIndex { index: slot }, MachOperand::imm(0)],
        )
    }

    fn push_reg(&self, reg: Reg) -> MachInst {
        MachInst::new(A64Op::StrPre, [r64(reg)])
    }

    fn pop_reg(&self, reg: Reg) -> MachInst {
        MachInst::new(A64Op::LdrPost, [r64(reg)])
    }

    fn stack_adjust(&self, bytes: i32) -> MachInst {
        if bytes < 0 {
            MachInst::new(
                A64Op::SubI,
                [
                    r64(regs::SP),
                    r64(regs::SP),
                    MachOperand::imm(i64::from(-bytes)),
                ],
            )
        } else {
            MachInst::new(
                A64Op::AddI,
                [
                    r64(regs::SP),
                    r64(regs::SP),
                    MachOperand::imm(i64::from(bytes)),
                ],
            )
        }
    }

    fn reg_move(&self, class: RegClass, size: u8, dst: Reg, src: Reg) -> MachInst {
        match class {
            RegClass::Int => MachInst::new(A64Op::MovRR, [rf(dst, size), rf(src, size)]),
            RegClass::Float => MachInst::new(
                A64Op::FMovRR,
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
        MachInst::new(A64Op::MovImm, [rf(dst, size), MachOperand::imm(value)])
    }

    fn frame_addr(&self, dst: Reg, slot: u32) -> MachInst {
        MachInst::new(
            A64Op::AddAddr,
            [r64(dst), MachOperand::FrameIndex { index: slot }, MachOperand::imm(0)],
        )
    }

    /// `stp x29, x30, [sp, #-16]!; mov x29, sp; sub sp, sp, #size`, the
    /// mirror teardown before every `ret`.
    fn insert_prologue_epilogue(&self, mf: &mut MachFunction) {
        mf.frame.finalize();
        let frame_size = mf.frame.frame_size;

        let mut prologue = vec![
            MachInst::new(A64Op::StpPre, [r64(regs::FP), r64(regs::LR)]),
            MachInst::new(A64Op::MovRR, [r64(regs::FP), r64(regs::SP)]),
        ];
        if frame_size > 0 {
            prologue.push(MachInst::new(
                A64Op::SubI,
                [
                    r64(regs::SP),
                    r64(regs::SP),
                    MachOperand::imm(i64::from(frame_size)),
                ],
            ));
        }
        mf.prologue_len = prologue.len() as u32;
        let entry = mf.entry();
        mf.blocks[entry].insts.splice(0..0, prologue);

        let epilogue = [
            MachInst::new(A64Op::MovRR, [r64(regs::SP), r64(regs::FP)]),
            MachInst::new(A64Op::LdpPost, [r64(regs::FP), r64(regs::LR)]),
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
