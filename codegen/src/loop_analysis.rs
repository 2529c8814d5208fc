//! Loop nest analysis.
//!
//! A back edge is an edge `u -> h` where `h` dominates `u`; `h` is then a
//! loop header. The loop body is the set of blocks that can reach `u`
//! without leaving the region dominated by `h`. Loops sharing a header are
//! merged; nesting depth follows header containment.

use crate::dominator_tree::DominatorTree;
use crate::flowgraph::ControlFlowGraph;
use crate::fx::FxHashSet;
use crate::ir::{Block, Function};

/// One natural loop.
pub struct Loop {
    /// The header block, target of the back edges.
    pub header: Block,
    /// All blocks in the loop, the header included.
    pub body: FxHashSet<Block>,
    /// Nesting depth; an outermost loop has depth 1.
    pub depth: u32,
}

impl Loop {
    /// Does the loop contain `block`?
    pub fn contains(&self, block: Block) -> bool {
        self.body.contains(&block)
    }
}

/// Loop information for a function.
pub struct LoopAnalysis {
    loops: Vec<Loop>,
    valid: bool,
}

impl LoopAnalysis {
    /// Allocate a new blank analysis.
    pub fn new() -> Self {
        Self {
            loops: Vec::new(),
            valid: false,
        }
    }

    /// Forget everything; `is_valid` becomes false.
    pub fn clear(&mut self) {
        self.loops.clear();
        self.valid = false;
    }

    /// Has `compute` run since the last `clear`?
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The loops of the function, unordered.
    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    /// The innermost loop containing `block`, if any.
    pub fn innermost_loop(&self, block: Block) -> Option<&Loop> {
        self.loops
            .iter()
            .filter(|l| l.contains(block))
            .max_by_key(|l| l.depth)
    }

    /// Loop nesting depth of `block`; 0 outside any loop.
    pub fn loop_depth(&self, block: Block) -> u32 {
        self.innermost_loop(block).map_or(0, |l| l.depth)
    }

    /// Detect loops from back edges and compute nesting depths.
    pub fn compute(&mut self, func: &Function, cfg: &ControlFlowGraph, domtree: &DominatorTree) {
        self.clear();
        debug_assert!(domtree.is_valid());

        for u in func.layout.blocks() {
            if !domtree.is_reachable(u) {
                continue;
            }
            for &h in cfg.succs(u) {
                if !domtree.dominates(h, u) {
                    continue;
                }
                let body = self.collect_body(cfg, domtree, h, u);
                match self.loops.iter_mut().find(|l| l.header == h) {
                    Some(existing) => existing.body.extend(body),
                    None => self.loops.push(Loop {
                        header: h,
                        body,
                        depth: 0,
                    }),
                }
            }
        }

        // Depth is the number of loops containing the header, itself
        // included.
        let depths: Vec<u32> = self
            .loops
            .iter()
            .map(|l| self.loops.iter().filter(|o| o.contains(l.header)).count() as u32)
            .collect();
        for (l, d) in self.loops.iter_mut().zip(depths) {
            l.depth = d;
        }
        self.valid = true;
    }

    /// Walk backwards from the latch `u`, staying inside the region
    /// dominated by `h`.
    fn collect_body(
        &self,
        cfg: &ControlFlowGraph,
        domtree: &DominatorTree,
        h: Block,
        u: Block,
    ) -> FxHashSet<Block> {
        let mut body: FxHashSet<Block> = FxHashSet::default();
        body.insert(h);
        let mut stack = vec![u];
        while let Some(block) = stack.pop() {
            if !body.insert(block) {
                continue;
            }
            for pred in cfg.preds(block) {
                if domtree.dominates(h, pred.block) {
                    stack.push(pred.block);
                }
            }
        }
        body
    }
}

impl Default for LoopAnalysis {
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
    fn nested_loops_have_increasing_depth() {
        let mut unit = Unit::new("test");
        let i1 = unit.ctx.types.int(1);
        let void = unit.ctx.types.void();
        let sig = unit.ctx.types.func(void, vec![i1], false);
        let id = unit.add_function("f", sig, CallConv::SystemV);
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);

        let entry = b.create_block();
        let outer = b.create_block();
        let inner = b.create_block();
        let inner_latch = b.create_block();
        let outer_latch = b.create_block();
        let exit = b.create_block();
        let cond = b.func.params[0];

        b.switch_to_block(entry);
        b.jump(outer);
        b.switch_to_block(outer);
        b.jump(inner);
        b.switch_to_block(inner);
        b.cond_jump(cond, inner_latch, outer_latch);
        b.switch_to_block(inner_latch);
        b.cond_jump(cond, inner, outer_latch);
        b.switch_to_block(outer_latch);
        b.cond_jump(cond, outer, exit);
        b.switch_to_block(exit);
        b.ret(None);

        let cfg = ControlFlowGraph::with_function(func);
        let domtree = DominatorTree::with_function(func, &cfg);
        let mut loops = LoopAnalysis::new();
        loops.compute(func, &cfg, &domtree);

        assert_eq!(loops.loops().len(), 2);
        assert_eq!(loops.loop_depth(entry), 0);
        assert_eq!(loops.loop_depth(exit), 0);
        assert_eq!(loops.loop_depth(outer_latch), 1);
        assert_eq!(loops.loop_depth(inner), 2);
        assert_eq!(loops.loop_depth(inner_latch), 2);
        let innermost = loops.innermost_loop(inner).unwrap();
        assert_eq!(innermost.header, inner);
    }
}
