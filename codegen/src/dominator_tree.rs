//! A dominator tree computed with the Lengauer–Tarjan algorithm.
//!
//! The tree stores, per block: the immediate dominator, the dominator-tree
//! children (ordered by DFS discovery), the dominance frontier, and
//! pre-order numbers that answer `dominates` in constant time. The entry
//! block has no immediate dominator; unreachable blocks are not in the
//! tree at all.

use crate::flowgraph::ControlFlowGraph;
use crate::ir::{Block, Function};
use sable_entity::{PackedOption, SecondaryMap};

#[derive(Clone, Default)]
struct DomNode {
    idom: PackedOption<Block>,
    /// Pre-order number in a DFS of the dominator tree; 0 = unreachable,
    /// the entry gets 1.
    pre_number: u32,
    /// Maximum `pre_number` in the subtree rooted here.
    pre_max: u32,
}

/// The dominator tree for a single function.
pub struct DominatorTree {
    nodes: SecondaryMap<Block, DomNode>,
    children: SecondaryMap<Block, Vec<Block>>,
    frontiers: SecondaryMap<Block, Vec<Block>>,
    /// Reachable blocks in CFG depth-first discovery order.
    dfs_order: Vec<Block>,
    valid: bool,
}

impl DominatorTree {
    /// Allocate a new blank dominator tree. Use `compute` to fill it in.
    pub fn new() -> Self {
        Self {
            nodes: SecondaryMap::new(),
            children: SecondaryMap::new(),
            frontiers: SecondaryMap::new(),
            dfs_order: Vec::new(),
            valid: false,
        }
    }

    /// Allocate and compute a dominator tree for `func`.
    pub fn with_function(func: &Function, cfg: &ControlFlowGraph) -> Self {
        let mut domtree = Self::new();
        domtree.compute(func, cfg);
        domtree
    }

    /// Clear the data structures, leaving `is_valid()` false.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.children.clear();
        self.frontiers.clear();
        self.dfs_order.clear();
        self.valid = false;
    }

    /// Check if the tree has been computed since the last `clear`.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Is `block` reachable from the entry block?
    pub fn is_reachable(&self, block: Block) -> bool {
        self.nodes[block].pre_number != 0
    }

    /// The immediate dominator of `block`; `None` for the entry block and
    /// for unreachable blocks.
    pub fn idom(&self, block: Block) -> Option<Block> {
        self.nodes[block].idom.expand()
    }

    /// The dominator-tree children of `block`.
    pub fn children(&self, block: Block) -> &[Block] {
        &self.children[block]
    }

    /// The dominance frontier of `block`.
    pub fn frontier(&self, block: Block) -> &[Block] {
        &self.frontiers[block]
    }

    /// Reachable blocks in CFG depth-first discovery order; the entry
    /// block first.
    pub fn dfs_order(&self) -> &[Block] {
        &self.dfs_order
    }

    /// Returns `true` if `a` dominates `b`: `a == b`, or `a` is a proper
    /// ancestor of `b` in the dominator tree. Constant time via pre-order
    /// intervals. Ill-defined for unreachable blocks, which return false.
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        let na = &self.nodes[a];
        let nb = &self.nodes[b];
        na.pre_number != 0 && na.pre_number <= nb.pre_number && na.pre_max >= nb.pre_number
    }

    /// Reset and compute the dominator tree, frontiers and pre-order.
    pub fn compute(&mut self, func: &Function, cfg: &ControlFlowGraph) {
        debug_assert!(cfg.is_valid());
        self.clear();
        self.nodes.resize(func.layout.num_blocks());
        self.children.resize(func.layout.num_blocks());
        self.frontiers.resize(func.layout.num_blocks());

        let Some(entry) = func.layout.entry_block() else {
            self.valid = true;
            return;
        };

        self.compute_idoms(entry, cfg);
        self.compute_children();
        self.compute_preorder(entry);
        self.compute_frontiers(cfg);
        self.valid = true;
    }

    /// Lengauer–Tarjan with path compression over DFS numbers.
    fn compute_idoms(&mut self, entry: Block, cfg: &ControlFlowGraph) {
        // DFS numbering. `dfs_num[block]` is the discovery index + 1 so 0
        // can mean "not visited".
        let mut dfs_num: SecondaryMap<Block, u32> = SecondaryMap::new();
        let mut vertex: Vec<Block> = Vec::new();
        let mut parent: Vec<usize> = Vec::new();
        let mut stack = vec![(entry, usize::MAX)];
        while let Some((block, par)) = stack.pop() {
            if dfs_num[block] != 0 {
                continue;
            }
            let n = vertex.len();
            dfs_num[block] = n as u32 + 1;
            vertex.push(block);
            parent.push(par);
            self.dfs_order.push(block);
            // Push in reverse so the first successor is visited first.
            for &succ in cfg.succs(block).iter().rev() {
                if dfs_num[succ] == 0 {
                    stack.push((succ, n));
                }
            }
        }

        let n = vertex.len();
        let mut semi: Vec<usize> = (0..n).collect();
        let mut ancestor: Vec<usize> = vec![usize::MAX; n];
        let mut label: Vec<usize> = (0..n).collect();
        let mut bucket: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut idom: Vec<usize> = vec![usize::MAX; n];

        // Path-compressing eval.
        fn eval(
            v: usize,
            ancestor: &mut [usize],
            label: &mut [usize],
            semi: &[usize],
        ) -> usize {
            if ancestor[v] == usize::MAX {
                return label[v];
            }
            // Collect the path to the tree root, then compress top-down.
            let mut path = vec![v];
            let mut x = v;
            while ancestor[ancestor[x]] != usize::MAX {
                x = ancestor[x];
                path.push(x);
            }
            for &y in path.iter().rev() {
                let a = ancestor[y];
                if ancestor[a] != usize::MAX {
                    if semi[label[a]] < semi[label[y]] {
                        label[y] = label[a];
                    }
                    ancestor[y] = ancestor[a];
                }
            }
            label[v]
        }

        for w in (1..n).rev() {
            // Semi-dominator: minimum semi over evaluated predecessors.
            for pred in cfg.preds(vertex[w]) {
                if dfs_num[pred.block] == 0 {
                    continue; // unreachable predecessor
                }
                let u = eval(
                    dfs_num[pred.block] as usize - 1,
                    &mut ancestor,
                    &mut label,
                    &semi,
                );
                if semi[u] < semi[w] {
                    semi[w] = semi[u];
                }
            }
            bucket[semi[w]].push(w);
            let p = parent[w];
            ancestor[w] = p;
            for v in core::mem::take(&mut bucket[p]) {
                let u = eval(v, &mut ancestor, &mut label, &semi);
                idom[v] = if semi[u] < semi[v] { u } else { p };
            }
        }

        for w in 1..n {
            if idom[w] != semi[w] {
                idom[w] = idom[idom[w]];
            }
        }

        for w in 1..n {
            self.nodes[vertex[w]].idom = vertex[idom[w]].into();
        }
    }

    fn compute_children(&mut self) {
        for &block in &self.dfs_order {
            if let Some(idom) = self.nodes[block].idom.expand() {
                self.children[idom].push(block);
            }
        }
    }

    /// Number the dominator tree in pre-order so subtree membership (and
    /// hence dominance) is an interval check.
    fn compute_preorder(&mut self, entry: Block) {
        let mut counter = 0u32;
        // (block, child cursor) stack for a manual post-order.
        let mut stack = vec![(entry, 0usize)];
        self.nodes[entry].pre_number = {
            counter += 1;
            counter
        };
        while let Some(&mut (block, ref mut cursor)) = stack.last_mut() {
            if *cursor < self.children[block].len() {
                let child = self.children[block][*cursor];
                *cursor += 1;
                counter += 1;
                self.nodes[child].pre_number = counter;
                stack.push((child, 0));
            } else {
                self.nodes[block].pre_max = counter;
                stack.pop();
            }
        }
    }

    /// Dominance frontiers: walk each join block's predecessors up through
    /// the idom chain until the join's own idom, marking every visited
    /// block's frontier.
    fn compute_frontiers(&mut self, cfg: &ControlFlowGraph) {
        for &block in &self.dfs_order.clone() {
            if cfg.num_distinct_preds(block) < 2 {
                continue;
            }
            let idom = self.nodes[block].idom.expand();
            let mut seen: Vec<Block> = Vec::new();
            for pred in cfg.preds(block) {
                if seen.contains(&pred.block) {
                    continue;
                }
                seen.push(pred.block);
                let mut runner = Some(pred.block);
                while let Some(r) = runner {
                    if Some(r) == idom || !self.is_reachable(r) {
                        break;
                    }
                    if !self.frontiers[r].contains(&block) {
                        self.frontiers[r].push(block);
                    }
                    runner = self.nodes[r].idom.expand();
                }
            }
        }
    }
}

impl Default for DominatorTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, Unit};
    use crate::isa::CallConv;

    fn test_unit() -> (Unit, crate::ir::FuncId) {
        let mut unit = Unit::new("test");
        let i1 = unit.ctx.types.int(1);
        let void = unit.ctx.types.void();
        let sig = unit.ctx.types.func(void, vec![i1], false);
        let id = unit.add_function("f", sig, CallConv::SystemV);
        (unit, id)
    }

    #[test]
    fn empty_function() {
        let (unit, id) = test_unit();
        let func = &unit.functions[id];
        let cfg = ControlFlowGraph::with_function(func);
        let dt = DominatorTree::with_function(func, &cfg);
        assert!(dt.is_valid());
        assert!(dt.dfs_order().is_empty());
    }

    #[test]
    fn diamond() {
        let (mut unit, id) = test_unit();
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        let then_b = b.create_block();
        let else_b = b.create_block();
        let merge = b.create_block();
        let cond = b.func.params[0];

        b.switch_to_block(entry);
        b.cond_jump(cond, then_b, else_b);
        b.switch_to_block(then_b);
        b.jump(merge);
        b.switch_to_block(else_b);
        b.jump(merge);
        b.switch_to_block(merge);
        b.ret(None);

        let cfg = ControlFlowGraph::with_function(func);
        let dt = DominatorTree::with_function(func, &cfg);

        assert_eq!(dt.idom(entry), None);
        assert_eq!(dt.idom(then_b), Some(entry));
        assert_eq!(dt.idom(else_b), Some(entry));
        assert_eq!(dt.idom(merge), Some(entry));

        for &block in &[entry, then_b, else_b, merge] {
            assert!(dt.dominates(block, block));
            assert!(dt.dominates(entry, block));
        }
        assert!(!dt.dominates(then_b, merge));
        assert!(!dt.dominates(merge, entry));

        // The frontier of each branch arm is the merge block.
        assert_eq!(dt.frontier(then_b), &[merge]);
        assert_eq!(dt.frontier(else_b), &[merge]);
        assert_eq!(dt.frontier(entry), &[]);
    }

    #[test]
    fn loop_back_edge() {
        let (mut unit, id) = test_unit();
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        let header = b.create_block();
        let body = b.create_block();
        let exit = b.create_block();
        let cond = b.func.params[0];

        b.switch_to_block(entry);
        b.jump(header);
        b.switch_to_block(header);
        b.cond_jump(cond, body, exit);
        b.switch_to_block(body);
        b.jump(header);
        b.switch_to_block(exit);
        b.ret(None);

        let cfg = ControlFlowGraph::with_function(func);
        let dt = DominatorTree::with_function(func, &cfg);

        assert_eq!(dt.idom(header), Some(entry));
        assert_eq!(dt.idom(body), Some(header));
        assert_eq!(dt.idom(exit), Some(header));
        assert!(dt.dominates(header, body));
        assert!(!dt.dominates(body, header));
        // The loop latch's frontier is the header it jumps back to.
        assert_eq!(dt.frontier(body), &[header]);

        // Transitivity: entry dom header dom body.
        assert!(dt.dominates(entry, body));
    }

    #[test]
    fn unreachable_block() {
        let (mut unit, id) = test_unit();
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        let dead = b.create_block();
        b.switch_to_block(entry);
        b.ret(None);
        b.switch_to_block(dead);
        b.ret(None);

        let cfg = ControlFlowGraph::with_function(func);
        let dt = DominatorTree::with_function(func, &cfg);
        assert!(dt.is_reachable(entry));
        assert!(!dt.is_reachable(dead));
        assert!(!dt.dominates(dead, entry));
        assert!(!dt.dominates(entry, dead));
        assert_eq!(dt.dfs_order(), &[entry]);
    }
}
