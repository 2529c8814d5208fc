//! Converting functions to text, mostly for logs and test expectations.

use crate::ir::dfg::ValueData;
use crate::ir::entities::Value;
use crate::ir::function::Function;
use crate::ir::instructions::InstructionData;
use crate::ir::unit::Context;
use core::fmt;

/// A function bundled with its context so it can be displayed.
pub struct DisplayFunction<'a> {
    /// The function to print.
    pub func: &'a Function,
    /// The unit's context, for types and constants.
    pub ctx: &'a Context,
}

impl Function {
    /// Return an object that can display this function.
    pub fn display<'a>(&'a self, ctx: &'a Context) -> DisplayFunction<'a> {
        DisplayFunction { func: self, ctx }
    }
}

impl fmt::Display for DisplayFunction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let func = self.func;
        writeln!(f, "function {}({} params) {{", func.name, func.params.len())?;
        for block in func.layout.blocks() {
            writeln!(f, "{block}:")?;
            for &inst in func.layout.block_insts(block) {
                write!(f, "    ")?;
                if let Some(result) = func.dfg.inst_result(inst) {
                    write!(f, "{result} = ")?;
                }
                write!(f, "{}", func.dfg.inst(inst).opcode())?;
                if !matches!(func.dfg.inst(inst), InstructionData::Phi { .. }) {
                    let mut first = true;
                    for arg in func.dfg.inst(inst).arguments() {
                        write!(f, "{} {}", if first { "" } else { "," }, self.value(arg))?;
                        first = false;
                    }
                }
                match func.dfg.inst(inst) {
                    InstructionData::Jump { dest } => write!(f, " {dest}")?,
                    InstructionData::CondJump {
                        then_dest,
                        else_dest,
                        ..
                    } => write!(f, ", {then_dest}, {else_dest}")?,
                    InstructionData::Phi { pairs } => {
                        for (v, b) in pairs {
                            write!(f, " [{}, {b}]", self.value(*v))?;
                        }
                    }
                    _ => {}
                }
                writeln!(f)?;
            }
        }
        writeln!(f, "}}")
    }
}

impl DisplayFunction<'_> {
    fn value(&self, v: Value) -> String {
        match *self.func.dfg.value_def(v) {
            ValueData::Const { constant, ty } => {
                if let Some(i) = self.ctx.constants.int_value(constant) {
                    format!("{i}")
                } else if let Some(bits) = self.ctx.types.bits(ty) {
                    match self.ctx.constants.float_value(constant, bits) {
                        Some(x) => format!("{x}"),
                        None => format!("{v}"),
                    }
                } else {
                    format!("{v}")
                }
            }
            ValueData::Param { index, .. } => format!("arg{index}"),
            ValueData::Undef { .. } => "undef".to_string(),
            _ => format!("{v}"),
        }
    }
}
