//! Spill rewriting.
//!
//! Every spilled virtual register gets a stack slot. Each reading
//! occurrence is rewritten as a reload into a fresh, narrowly-live
//! virtual register; each writing occurrence writes a fresh register that
//! is stored back right after the instruction. Because every rewrite
//! strictly narrows live ranges, the colour/spill loop terminates.

use crate::isa::TargetIsa;
use crate::mir::{MachFunction, MachOperand, Reg};

/// Rewrite all `spills` (raw virtual register ids) in `mf`.
pub fn spill_all(mf: &mut MachFunction, isa: &dyn TargetIsa, spills: &[u32]) {
    for &raw in spills {
        spill_one(mf, isa, Reg::from_index(raw));
    }
}

fn spill_one(mf: &mut MachFunction, isa: &dyn TargetIsa, victim: Reg) {
    let data = mf.vreg_data(victim);
    let size = u32::from(data.size).max(1);
    let slot = mf.frame.add_slot(size, size);
    log::debug!(
        "spilling {victim:?} ({} bytes) to frame slot {slot}",
        size
    );

    let labels: Vec<_> = mf.blocks.keys().collect();
    let info = isa.instruction_info();
    for label in labels {
        let mut rewritten = Vec::with_capacity(mf.blocks[label].insts.len());
        for mut inst in core::mem::take(&mut mf.blocks[label].insts) {
            let desc = info.desc(inst.opcode);
            let mut reads = false;
            let mut writes = false;
            for (j, op) in inst.operands.iter().enumerate() {
                if op.as_reg() == Some(victim) {
                    let role = desc.operand(j);
                    reads |= role.read;
                    writes |= role.def;
                }
            }
            if !reads && !writes {
                rewritten.push(inst);
                continue;
            }

            let fresh = mf.vregs.len() as u32;
            mf.vregs.push(data);
            let fresh = Reg::virt(fresh);
            for op in &mut inst.operands {
                if let MachOperand::Reg { reg, .. } = op {
                    if *reg == victim {
                        *reg = fresh;
                    }
                }
            }
            if reads {
                rewritten.push(isa.spill_load(data.class, data.size, fresh, slot));
            }
            rewritten.push(inst);
            if writes {
                rewritten.push(isa.spill_store(data.class, data.size, slot, fresh));
            }
        }
        mf.blocks[label].insts = rewritten;
    }
}
