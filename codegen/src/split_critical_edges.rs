//! Critical-edge splitting.
//!
//! An edge `u -> v` is critical when `u` has more than one successor, `v`
//! has more than one predecessor, and `v` contains at least one φ. Each
//! such edge gets a fresh block holding a single jump to `v`; `u`'s
//! terminator is retargeted at the new block and every φ in `v` naming
//! `u` is rewritten to name it instead. Register allocation and φ-move
//! insertion both rely on this running first.

use crate::flowgraph::ControlFlowGraph;
use crate::ir::{Block, Function, InstructionData};

/// Split every critical edge in `func`. Returns `true` if any edge was
/// split.
pub fn run(func: &mut Function) -> bool {
    let mut changed = false;
    loop {
        let cfg = ControlFlowGraph::with_function(func);
        let Some((pred, block)) = find_critical_edge(func, &cfg) else {
            return changed;
        };

        let split = func.layout.make_block();
        func.layout.insert_block_before(split, block);
        let jump = func
            .dfg
            .make_inst(InstructionData::Jump { dest: block }, None);
        func.layout.append_inst(jump, split);

        // Retarget only the edges into `block`; other successors of the
        // predecessor stay put.
        let term = func.terminator(pred).expect("predecessor has terminator");
        let mut data = func.dfg.inst(term).clone();
        data.map_blocks(|dest| if dest == block { split } else { dest });
        func.dfg.replace_inst_data(term, data);

        for &inst in func.layout.block_insts(block).to_vec().iter() {
            if matches!(func.dfg.inst(inst), InstructionData::Phi { .. }) {
                func.dfg.rewrite_phi_pred(inst, pred, split);
            }
        }

        log::trace!("split critical edge {pred} -> {block} via {split}");
        changed = true;
    }
}

fn find_critical_edge(func: &Function, cfg: &ControlFlowGraph) -> Option<(Block, Block)> {
    for block in func.layout.blocks() {
        if cfg.preds(block).len() <= 1 || func.phi_count(block) == 0 {
            continue;
        }
        for pred in cfg.preds(block) {
            if cfg.succs(pred.block).len() > 1 {
                return Some((pred.block, block));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, Unit};
    use crate::isa::CallConv;
    use crate::verifier::{verify_function, VerifierErrors};

    /// A -> B, A -> C, B -> D, C -> D with a φ in D, plus the extra edge
    /// A -> D making A's edges critical.
    #[test]
    fn splits_all_critical_entries() {
        let mut unit = Unit::new("test");
        let i32t = unit.ctx.types.int(32);
        let i1 = unit.ctx.types.int(1);
        let sig = unit.ctx.types.func(i32t, vec![i1, i1], false);
        let id = unit.add_function("f", sig, CallConv::SystemV);
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);

        let a = b.create_block();
        let bb = b.create_block();
        let c = b.create_block();
        let d = b.create_block();
        let cond0 = b.func.params[0];
        let cond1 = b.func.params[1];

        b.switch_to_block(a);
        let side = b.create_block();
        b.cond_jump(cond0, side, d);
        b.switch_to_block(side);
        b.cond_jump(cond1, bb, c);
        b.switch_to_block(bb);
        let va = b.iconst(i32t, 1);
        b.jump(d);
        b.switch_to_block(c);
        let vc = b.iconst(i32t, 2);
        b.jump(d);
        b.switch_to_block(d);
        let vd = b.iconst(i32t, 3);
        let phi = b.phi(i32t);
        let phi_inst = b.func.dfg.value_inst(phi).unwrap();
        b.ret(Some(phi));
        b.func.dfg.append_phi_pair(phi_inst, va, bb);
        b.func.dfg.append_phi_pair(phi_inst, vc, c);
        b.func.dfg.append_phi_pair(phi_inst, vd, a);

        assert!(run(func));

        // Only A -> D was critical (A has two successors, D many preds);
        // B and C end in unconditional jumps. The φ still has three
        // distinct predecessor blocks, none of them A.
        let cfg = ControlFlowGraph::with_function(func);
        let InstructionData::Phi { pairs } = func.dfg.inst(phi_inst) else {
            unreachable!()
        };
        assert_eq!(pairs.len(), 3);
        for &(_, pred) in pairs {
            assert_ne!(pred, a);
            assert!(cfg.preds(d).iter().any(|p| p.block == pred));
        }
        // No critical edges remain and the function still verifies.
        assert!(!run(func));
        let mut errors = VerifierErrors::default();
        assert!(verify_function(func, &unit.ctx, &mut errors).is_ok(), "{errors}");
    }
}
