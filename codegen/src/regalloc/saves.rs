//! Caller- and callee-save insertion.
//!
//! Runs after colouring and prologue insertion, on code whose operands
//! are all physical registers.
//!
//! Around every call: push each caller-saved register that is live across
//! the call and is not part of the call's return-value set, before the
//! call's argument setup; pad with an 8-byte stack adjust when the count
//! is odd; pop in reverse after the call.
//!
//! At function entry: push every callee-saved register the function ever
//! uses (the frame pointer is already saved by the prologue); mirror the
//! pops into every return block just before the epilogue.

use crate::isa::TargetIsa;
use crate::mir::{MachFunction, MachLabel, Reg};
use crate::regalloc::liveness::Liveness;

/// Insert the save/restore code for `mf`.
pub fn run(mf: &mut MachFunction, isa: &dyn TargetIsa) {
    let liveness = Liveness::compute(mf, isa);
    save_callee_saved(mf, isa, &liveness);
    // Callee-save pushes shifted every instruction index; recompute
    // before reasoning about call sites.
    let liveness = Liveness::compute(mf, isa);
    save_around_calls(mf, isa, &liveness);
}

fn save_callee_saved(mf: &mut MachFunction, isa: &dyn TargetIsa, liveness: &Liveness) {
    let reg_info = isa.register_info();
    let fp = reg_info.frame_pointer();

    let mut pushed: Vec<Reg> = Vec::new();
    for &reg in reg_info.callee_saved() {
        if reg_info.is_same_register(reg, fp) {
            // Already pushed in the prologue.
            continue;
        }
        if liveness.ever_live(reg_info, reg) {
            pushed.push(reg);
        }
    }
    if pushed.is_empty() {
        return;
    }

    let mut insert_at = mf.prologue_len as usize;
    let entry = mf.entry();
    for &reg in &pushed {
        mf.blocks[entry]
            .insts
            .insert(insert_at, isa.push_reg(reg));
        insert_at += 1;
    }
    if pushed.len() % 2 != 0 {
        mf.blocks[entry]
            .insts
            .insert(insert_at, isa.stack_adjust(-8));
    }

    let labels: Vec<MachLabel> = mf.blocks.keys().collect();
    let info = isa.instruction_info();
    for label in labels {
        let Some(ret_pos) = mf.blocks[label]
            .insts
            .iter()
            .position(|i| info.desc(i.opcode).is_ret)
        else {
            continue;
        };
        let mut pos = ret_pos - mf.epilogue_len as usize;
        if pushed.len() % 2 != 0 {
            mf.blocks[label].insts.insert(pos, isa.stack_adjust(8));
            pos += 1;
        }
        for &reg in pushed.iter().rev() {
            mf.blocks[label].insts.insert(pos, isa.pop_reg(reg));
            pos += 1;
        }
    }
}

fn save_around_calls(mf: &mut MachFunction, isa: &dyn TargetIsa, liveness: &Liveness) {
    let reg_info = isa.register_info();
    let info = isa.instruction_info();

    // Collect the call sites with their function-wide indices first, then
    // rewrite back to front so earlier positions stay valid.
    let mut calls: Vec<(MachLabel, usize, u32)> = Vec::new();
    for (label, data) in mf.blocks.iter() {
        let block_first = mf.block_start_index(label);
        for (pos, inst) in data.insts.iter().enumerate() {
            if info.desc(inst.opcode).is_call {
                calls.push((label, pos, block_first + pos as u32));
            }
        }
    }

    for (label, call_pos, call_idx) in calls.into_iter().rev() {
        let call_info = mf.blocks[label].insts[call_pos]
            .call_info
            .clone()
            .unwrap_or_default();

        let mut pushed: Vec<Reg> = Vec::new();
        for &reg in reg_info.caller_saved() {
            if call_info
                .ret_regs
                .iter()
                .any(|&r| reg_info.is_same_register(r, reg))
            {
                continue;
            }
            if liveness.live_across(reg_info, reg, call_idx) {
                pushed.push(reg);
            }
        }
        if pushed.is_empty() {
            continue;
        }

        // Pops first (they sit after the call and don't disturb the push
        // position), in reverse push order.
        let mut after = call_pos + 1;
        if pushed.len() % 2 != 0 {
            mf.blocks[label].insts.insert(after, isa.stack_adjust(8));
            after += 1;
        }
        for &reg in pushed.iter().rev() {
            mf.blocks[label].insts.insert(after, isa.pop_reg(reg));
            after += 1;
        }

        // Pushes go before the argument setup so the ABI registers keep
        // their values.
        let mut at = call_pos - call_info.arg_setup as usize;
        for &reg in &pushed {
            mf.blocks[label].insts.insert(at, isa.push_reg(reg));
            at += 1;
        }
        if pushed.len() % 2 != 0 {
            mf.blocks[label].insts.insert(at, isa.stack_adjust(-8));
        }
    }
}
