//! A control flow graph represented as mappings of basic blocks to their
//! predecessors and successors.
//!
//! Multiplicity matters: a conditional jump with both edges into the same
//! block contributes two predecessor entries, one per branch slot. Each
//! predecessor is recorded as the block together with its terminator, so
//! consumers that need the branch instruction have it at hand.

use crate::ir::{Block, Function, Inst};
use sable_entity::SecondaryMap;
use smallvec::SmallVec;

/// A predecessor edge: the predecessor block and its terminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockPredecessor {
    /// The predecessor block.
    pub block: Block,
    /// The branch instruction creating the edge.
    pub inst: Inst,
}

impl BlockPredecessor {
    /// Construct a new predecessor edge.
    pub fn new(block: Block, inst: Inst) -> Self {
        Self { block, inst }
    }
}

#[derive(Clone, Default)]
struct CFGNode {
    predecessors: SmallVec<[BlockPredecessor; 4]>,
    successors: SmallVec<[Block; 2]>,
}

/// The control flow graph of a function.
pub struct ControlFlowGraph {
    data: SecondaryMap<Block, CFGNode>,
    valid: bool,
}

impl ControlFlowGraph {
    /// Allocate a new blank control flow graph.
    pub fn new() -> Self {
        Self {
            data: SecondaryMap::new(),
            valid: false,
        }
    }

    /// Clear all data structures in this control flow graph.
    pub fn clear(&mut self) {
        self.data.clear();
        self.valid = false;
    }

    /// Allocate and compute the control flow graph for `func`.
    pub fn with_function(func: &Function) -> Self {
        let mut cfg = Self::new();
        cfg.compute(func);
        cfg
    }

    /// Compute the control flow graph of `func`, overwriting any previous
    /// state.
    pub fn compute(&mut self, func: &Function) {
        self.clear();
        self.data.resize(func.layout.num_blocks());
        for block in func.layout.blocks() {
            self.compute_block(func, block);
        }
        self.valid = true;
    }

    fn compute_block(&mut self, func: &Function, block: Block) {
        if let Some(term) = func.terminator(block) {
            for dest in func.dfg.inst(term).branch_destinations() {
                self.add_edge(block, term, dest);
            }
        }
    }

    /// Recompute the edges out of `block` only.
    ///
    /// For use after editing the terminator of a single block, when a full
    /// recompute would be wasteful. Edges into `block` are left intact.
    pub fn recompute_block(&mut self, func: &Function, block: Block) {
        debug_assert!(self.valid);
        let successors = core::mem::take(&mut self.data[block].successors);
        for succ in successors {
            self.data[succ].predecessors.retain(|p| p.block != block);
        }
        self.compute_block(func, block);
    }

    fn add_edge(&mut self, from: Block, from_inst: Inst, to: Block) {
        self.data[from].successors.push(to);
        self.data[to]
            .predecessors
            .push(BlockPredecessor::new(from, from_inst));
    }

    /// The predecessor edges of `block`, one entry per incoming branch
    /// slot.
    pub fn preds(&self, block: Block) -> &[BlockPredecessor] {
        &self.data[block].predecessors
    }

    /// The successors of `block` in branch order, duplicates included.
    pub fn succs(&self, block: Block) -> &[Block] {
        &self.data[block].successors
    }

    /// Number of distinct predecessor blocks.
    pub fn num_distinct_preds(&self, block: Block) -> usize {
        let mut seen: SmallVec<[Block; 8]> = SmallVec::new();
        for p in self.preds(block) {
            if !seen.contains(&p.block) {
                seen.push(p.block);
            }
        }
        seen.len()
    }

    /// Check if the CFG is in a valid state.
    ///
    /// This doesn't perform any validity checking against the function; it
    /// only tells whether `compute` ran since the last `clear`.
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl Default for ControlFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, Unit};
    use crate::isa::CallConv;

    #[test]
    fn branches_and_jumps() {
        let mut unit = Unit::new("test");
        let i1 = unit.ctx.types.int(1);
        let void = unit.ctx.types.void();
        let sig = unit.ctx.types.func(void, vec![i1], false);
        let id = unit.add_function("f", sig, CallConv::SystemV);
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);

        let block0 = b.create_block();
        let block1 = b.create_block();
        let block2 = b.create_block();
        let cond = b.func.params[0];

        b.switch_to_block(block0);
        let br0 = b.cond_jump(cond, block2, block1);
        b.switch_to_block(block1);
        let br1 = b.cond_jump(cond, block1, block2);
        b.switch_to_block(block2);
        b.ret(None);

        let mut cfg = ControlFlowGraph::with_function(func);
        assert_eq!(cfg.preds(block0), &[]);
        assert_eq!(
            cfg.preds(block1),
            &[
                BlockPredecessor::new(block0, br0),
                BlockPredecessor::new(block1, br1)
            ]
        );
        assert_eq!(
            cfg.preds(block2),
            &[
                BlockPredecessor::new(block0, br0),
                BlockPredecessor::new(block1, br1)
            ]
        );
        assert_eq!(cfg.succs(block0), &[block2, block1]);
        assert_eq!(cfg.succs(block1), &[block1, block2]);
        assert_eq!(cfg.succs(block2), &[]);

        // Rewrite block0's terminator and recompute just that block.
        let term = func.terminator(block0).unwrap();
        func.dfg.replace_inst_data(
            term,
            crate::ir::InstructionData::Jump { dest: block1 },
        );
        cfg.recompute_block(func, block0);
        assert_eq!(cfg.succs(block0), &[block1]);
        assert_eq!(cfg.preds(block2).len(), 1);
        assert_eq!(cfg.num_distinct_preds(block1), 2);
    }
}
