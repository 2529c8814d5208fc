//! A simple dead-code elimination pass.

use crate::ir::{Function, InstructionData, Opcode};

/// Delete side-effect-free instructions whose result has no uses,
/// iterating so transitively dead operands are collected too. Returns
/// `true` if anything was removed.
pub fn run(func: &mut Function) -> bool {
    let mut any_change = false;
    loop {
        let mut changed = false;
        for (_, inst) in func.collect_insts() {
            let opcode = func.dfg.inst(inst).opcode();
            if !opcode.is_side_effect_free() || opcode == Opcode::Phi {
                continue;
            }
            match func.dfg.inst_result(inst) {
                Some(result) if func.dfg.uses(result).is_empty() => {
                    func.remove_inst(inst);
                    changed = true;
                }
                _ => {}
            }
        }
        // φs die too, but only when nothing besides the φ itself
        // references the result (a loop φ can feed its own operand list).
        for (_, inst) in func.collect_insts() {
            if let InstructionData::Phi { .. } = func.dfg.inst(inst) {
                let result = func.dfg.inst_result(inst).unwrap();
                if func.dfg.uses(result).iter().all(|&u| u == inst) {
                    func.remove_inst(inst);
                    changed = true;
                }
            }
        }
        if !changed {
            return any_change;
        }
        any_change = true;
    }
}
