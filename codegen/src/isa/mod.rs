//! Target descriptions.
//!
//! A target is the triple the rest of the backend sees: a
//! [`RegisterInfo`] describing the register file, an [`InstructionInfo`]
//! giving per-opcode descriptors and the instruction-selection patterns,
//! and the calling-convention queries on [`TargetIsa`] itself. Use
//! [`lookup`] to obtain a target for a triple.

pub mod call_conv;
pub mod registers;

pub mod aarch64;
pub mod x64;

pub use self::call_conv::CallConv;
pub use self::registers::{InstDesc, OperandDesc, RegisterInfo};

use crate::ir::{Context, DataLayout, Function, Inst};
use crate::isel::{NodeKind, Pattern};
use crate::mir::{MachFunction, MachInst, MachOpcode, Reg, RegClass};
use crate::result::CodegenError;
use target_lexicon::{Architecture, Triple};

/// Per-opcode descriptors and selection patterns for one target.
pub trait InstructionInfo {
    /// The descriptor of `opcode`.
    fn desc(&self, opcode: MachOpcode) -> &'static InstDesc;

    /// The ordered pattern list for a node kind. An empty list for an
    /// instruction node kind is a target-description bug that selection
    /// reports fatally.
    fn patterns(&self, kind: NodeKind) -> &'static [Pattern];
}

/// Methods that define a target.
pub trait TargetIsa {
    /// Short name of this ISA.
    fn name(&self) -> &'static str;

    /// The register file.
    fn register_info(&self) -> &dyn RegisterInfo;

    /// Opcode descriptors and selection patterns.
    fn instruction_info(&self) -> &dyn InstructionInfo;

    /// Size and alignment rules.
    fn data_layout(&self) -> DataLayout {
        DataLayout
    }

    /// The calling convention assumed for functions that don't declare
    /// one.
    fn default_call_conv(&self) -> CallConv;

    // Legalization hooks (see `legalizer`).

    /// Per-function preparation before legalization proper (for example
    /// the var-arg prologue block on x64).
    fn prepare_function(&self, func: &mut Function, ctx: &mut Context);

    /// Rewrite one instruction the target cannot match directly. Returns
    /// `true` if the containing block's instruction list changed; the
    /// driver restarts its walk of the block.
    fn legalize_inst(&self, func: &mut Function, ctx: &mut Context, inst: Inst) -> bool;

    // Calling convention.

    /// Integer argument registers in order.
    fn int_arg_regs(&self) -> &'static [Reg];

    /// Float argument registers in order.
    fn float_arg_regs(&self) -> &'static [Reg];

    /// Integer return registers in order (two for small struct returns).
    fn int_ret_regs(&self) -> &'static [Reg];

    /// Float return registers in order.
    fn float_ret_regs(&self) -> &'static [Reg];

    // Instruction builders used by the generic register allocator and
    // save/restore passes.

    /// A reload of a spilled register from a frame slot.
    fn spill_load(&self, class: RegClass, size: u8, dst: Reg, slot: u32) -> MachInst;

    /// A store of a spilled register to a frame slot.
    fn spill_store(&self, class: RegClass, size: u8, slot: u32, src: Reg) -> MachInst;

    /// Push a register on the stack.
    fn push_reg(&self, reg: Reg) -> MachInst;

    /// Pop a register off the stack.
    fn pop_reg(&self, reg: Reg) -> MachInst;

    /// Adjust the stack pointer by `bytes` (negative grows the stack).
    fn stack_adjust(&self, bytes: i32) -> MachInst;

    /// A register-to-register move.
    fn reg_move(&self, class: RegClass, size: u8, dst: Reg, src: Reg) -> MachInst;

    /// Materialise an integer immediate into a register.
    fn imm_move(&self, size: u8, dst: Reg, value: i64) -> MachInst;

    /// Materialise the address of a frame slot into a register.
    fn frame_addr(&self, dst: Reg, slot: u32) -> MachInst;

    /// Insert the prologue and the epilogues, finalizing the stack frame.
    /// Records the prologue/epilogue lengths on the function.
    fn insert_prologue_epilogue(&self, mf: &mut MachFunction);
}

/// Look up the target for `triple`.
pub fn lookup(triple: Triple) -> Result<Box<dyn TargetIsa>, CodegenError> {
    match triple.architecture {
        Architecture::X86_64 => Ok(Box::new(x64::X64Target::new(triple))),
        Architecture::Aarch64(_) => Ok(Box::new(aarch64::Aarch64Target::new(triple))),
        other => Err(CodegenError::UnsupportedTarget(other.to_string())),
    }
}
