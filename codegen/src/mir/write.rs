//! Textual form of machine functions, for logs and test expectations.
//!
//! This is not the external assembly printer (that lives outside the
//! crate, behind `binemit`); it is a faithful dump of MIR with register
//! names resolved through the target's register table.

use crate::isa::TargetIsa;
use crate::mir::{MachFunction, MachOperand, OperandFlags};
use core::fmt;

/// A machine function bundled with its target for display.
pub struct DisplayMachFunction<'a> {
    /// The function.
    pub mf: &'a MachFunction,
    /// Its target.
    pub isa: &'a dyn TargetIsa,
}

impl MachFunction {
    /// Return an object that can display this function.
    pub fn display<'a>(&'a self, isa: &'a dyn TargetIsa) -> DisplayMachFunction<'a> {
        DisplayMachFunction { mf: self, isa }
    }
}

impl fmt::Display for DisplayMachFunction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}:", self.mf.name)?;
        let reg_info = self.isa.register_info();
        let info = self.isa.instruction_info();
        for (label, block) in self.mf.blocks.iter() {
            writeln!(f, "{label}:")?;
            for inst in &block.insts {
                write!(f, "    {}", info.desc(inst.opcode).name)?;
                for (i, op) in inst.operands.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    match op {
                        MachOperand::Reg { reg, flags } => {
                            if reg.is_virtual() {
                                write!(f, "{sep}%{}", reg.virt_num())?;
                            } else {
                                let named = match flags.forced_size() {
                                    Some(size) => reg_info.register_with_size(*reg, size),
                                    None => *reg,
                                };
                                write!(f, "{sep}{}", reg_info.name(named))?;
                            }
                        }
                        MachOperand::Imm { value, flags } => {
                            if flags.contains(OperandFlags::COND) {
                                write!(f, "{sep}cc{value}")?;
                            } else {
                                write!(f, "{sep}{value}")?;
                            }
                        }
                        MachOperand::Label { block } => write!(f, "{sep}{block}")?,
                        MachOperand::Global { global, .. } => write!(f, "{sep}@{global}")?,
                        MachOperand::ExtSym { name, .. } => write!(f, "{sep}@{name}")?,
                        MachOperand::ConstPool { index } => write!(f, "{sep}$pool{index}")?,
                        MachOperand::FrameIndex { index } => write!(f, "{sep}[frame{index}]")?,
                    }
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
