//! CFG simplification.
//!
//! Three rewrites, run to a fixpoint since each can enable the others:
//!
//! 1. remove blocks unreachable from the entry;
//! 2. merge a block into its sole predecessor when that predecessor has
//!    exactly one successor;
//! 3. thread jumps whose target contains only an unconditional jump.
//!
//! φ nodes are kept consistent: pairs from removed or redirected
//! predecessors are dropped or rewritten.

use crate::flowgraph::ControlFlowGraph;
use crate::fx::FxHashSet;
use crate::ir::{Block, Function, InstructionData};

/// Run CFG simplification on `func`. Returns `true` if anything changed.
pub fn run(func: &mut Function) -> bool {
    let mut any_change = prune_stale_phi_pairs(func);
    loop {
        let mut changed = false;
        changed |= remove_unreachable_blocks(func);
        changed |= merge_into_sole_predecessor(func);
        changed |= thread_trivial_jumps(func);
        if !changed {
            return any_change;
        }
        any_change = true;
    }
}

/// Constant-branch folding can leave φ pairs naming blocks that no longer
/// branch here; drop them.
fn prune_stale_phi_pairs(func: &mut Function) -> bool {
    let cfg = ControlFlowGraph::with_function(func);
    let mut changed = false;
    for (block, inst) in func.collect_insts() {
        let InstructionData::Phi { pairs } = func.dfg.inst(inst) else {
            continue;
        };
        let stale: Vec<Block> = pairs
            .iter()
            .map(|&(_, b)| b)
            .filter(|&b| !cfg.preds(block).iter().any(|p| p.block == b))
            .collect();
        for b in stale {
            func.dfg.remove_phi_pred(inst, b);
            changed = true;
        }
    }
    changed
}

fn remove_unreachable_blocks(func: &mut Function) -> bool {
    let Some(entry) = func.layout.entry_block() else {
        return false;
    };
    let mut reachable: FxHashSet<Block> = FxHashSet::default();
    let mut stack = vec![entry];
    while let Some(block) = stack.pop() {
        if !reachable.insert(block) {
            continue;
        }
        if let Some(term) = func.terminator(block) {
            stack.extend(func.dfg.inst(term).branch_destinations());
        }
    }

    let dead: Vec<Block> = func
        .layout
        .blocks()
        .filter(|b| !reachable.contains(b))
        .collect();
    if dead.is_empty() {
        return false;
    }

    // Remove φ pairs fed from dying blocks first, then the blocks.
    for &block in &dead {
        let phis: Vec<_> = func
            .collect_insts()
            .into_iter()
            .filter(|&(b, i)| {
                !dead.contains(&b) && matches!(func.dfg.inst(i), InstructionData::Phi { .. })
            })
            .map(|(_, i)| i)
            .collect();
        for phi in phis {
            func.dfg.remove_phi_pred(phi, block);
        }
    }
    for block in dead {
        log::trace!("removing unreachable {block}");
        for inst in func.layout.block_insts(block).to_vec() {
            func.remove_inst(inst);
        }
        func.layout.remove_block(block);
    }
    true
}

/// Merge `block` into `pred` when `pred` is the only predecessor and
/// `block` is its only successor.
fn merge_into_sole_predecessor(func: &mut Function) -> bool {
    let cfg = ControlFlowGraph::with_function(func);
    for block in func.layout.blocks().collect::<Vec<_>>() {
        if Some(block) == func.layout.entry_block() {
            continue;
        }
        let preds = cfg.preds(block);
        if preds.len() != 1 {
            continue;
        }
        let pred = preds[0].block;
        if pred == block || cfg.succs(pred).len() != 1 {
            continue;
        }

        // Any φ here has a single incoming value; forward it.
        for inst in func.layout.block_insts(block).to_vec() {
            if let InstructionData::Phi { pairs } = func.dfg.inst(inst).clone() {
                debug_assert!(pairs.len() <= 1);
                let result = func.dfg.inst_result(inst).unwrap();
                if let Some(&(value, _)) = pairs.first() {
                    func.dfg.replace_uses(result, value);
                }
                func.remove_inst(inst);
            }
        }

        // Drop the predecessor's jump, move everything over, fix φ labels
        // downstream.
        let term = func.terminator(pred).expect("predecessor has a terminator");
        func.remove_inst(term);
        for inst in func.layout.block_insts(block).to_vec() {
            func.layout.remove_inst(inst);
            func.layout.append_inst(inst, pred);
        }
        if let Some(new_term) = func.terminator(pred) {
            for succ in func.dfg.inst(new_term).branch_destinations() {
                for &phi in func.layout.block_insts(succ).to_vec().iter() {
                    if matches!(func.dfg.inst(phi), InstructionData::Phi { .. }) {
                        func.dfg.rewrite_phi_pred(phi, block, pred);
                    }
                }
            }
        }
        func.layout.remove_block(block);
        log::trace!("merged {block} into {pred}");
        return true;
    }
    false
}

/// Redirect edges whose target block contains only `jump other`, unless
/// the final target has φs (the retargeted edge would need new pairs).
fn thread_trivial_jumps(func: &mut Function) -> bool {
    let mut changed = false;
    for block in func.layout.blocks().collect::<Vec<_>>() {
        let Some(term) = func.terminator(block) else {
            continue;
        };
        let mut data = func.dfg.inst(term).clone();
        let mut redirected = false;
        data.map_blocks(|dest| {
            if let Some(target) = trivial_jump_target(func, dest) {
                if func.phi_count(target) == 0 && target != dest {
                    redirected = true;
                    return target;
                }
            }
            dest
        });
        if redirected {
            func.dfg.replace_inst_data(term, data);
            changed = true;
        }
    }
    changed
}

fn trivial_jump_target(func: &Function, block: Block) -> Option<Block> {
    let insts = func.layout.block_insts(block);
    if insts.len() != 1 {
        return None;
    }
    match func.dfg.inst(insts[0]) {
        InstructionData::Jump { dest } => Some(*dest),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, Unit};
    use crate::isa::CallConv;

    fn new_func(unit: &mut Unit) -> crate::ir::FuncId {
        let i32t = unit.ctx.types.int(32);
        let sig = unit.ctx.types.func(i32t, vec![i32t], false);
        unit.add_function("f", sig, CallConv::SystemV)
    }

    #[test]
    fn unreachable_blocks_are_removed_and_phis_pruned() {
        let mut unit = Unit::new("test");
        let id = new_func(&mut unit);
        let i32t = unit.ctx.types.int(32);
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        let dead = b.create_block();
        let merge = b.create_block();
        b.switch_to_block(entry);
        b.jump(merge);
        b.switch_to_block(dead);
        b.jump(merge);
        b.switch_to_block(merge);
        let p = b.func.params[0];
        let one = b.iconst(i32t, 1);
        let phi = b.phi(i32t);
        let phi_inst = b.func.dfg.value_inst(phi).unwrap();
        b.ret(Some(phi));
        b.func.dfg.append_phi_pair(phi_inst, p, entry);
        b.func.dfg.append_phi_pair(phi_inst, one, dead);

        assert!(run(func));
        assert!(!func.layout.is_block_inserted(dead));
        // The φ lost its `dead` pair; with one pred left the whole merge
        // block was folded into entry and the φ forwarded.
        let mut errors = crate::verifier::VerifierErrors::default();
        assert!(
            crate::verifier::verify_function(func, &unit.ctx, &mut errors).is_ok(),
            "{errors}"
        );
        // Idempotence.
        assert!(!run(func));
    }

    #[test]
    fn trivial_jump_is_threaded() {
        let mut unit = Unit::new("test");
        let id = new_func(&mut unit);
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        let hop = b.create_block();
        let target = b.create_block();
        let other = b.create_block();
        let cond_src = b.func.params[0];
        b.switch_to_block(entry);
        let i1 = b.ctx.types.int(1);
        let i32t = b.ctx.types.int(32);
        let zero = b.iconst(i32t, 0);
        let cond = b.icmp(crate::ir::IntCC::NotEqual, cond_src, zero);
        assert_eq!(b.func.dfg.value_type(cond), i1);
        b.cond_jump(cond, hop, other);
        b.switch_to_block(hop);
        b.jump(target);
        b.switch_to_block(target);
        b.ret(Some(cond_src));
        b.switch_to_block(other);
        b.ret(Some(cond_src));

        assert!(run(func));
        // entry now branches straight to target; hop is unreachable and
        // was removed.
        assert!(!func.layout.is_block_inserted(hop));
        let term = func.terminator(entry).unwrap();
        assert!(func
            .dfg
            .inst(term)
            .branch_destinations()
            .contains(&target));
    }

    #[test]
    fn dce_removes_transitively_dead_code() {
        let mut unit = Unit::new("test");
        let id = new_func(&mut unit);
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let p = b.func.params[0];
        let a = b.add(p, p);
        let _dead2 = b.imul(a, p);
        b.ret(Some(p));

        assert!(crate::dce::run(func));
        assert_eq!(func.instruction_count(), 1);
        assert!(!crate::dce::run(func));
    }
}
