//! Interference graph construction and Chaitin-style colouring.
//!
//! One graph node per virtual register; physical registers appear only in
//! the edge sets. Simplification removes any node whose *virtual* degree
//! is below the number of allocatable registers of its class; when none
//! qualifies, the node with the fewest neighbours is removed and marked
//! for spilling. Selection pops in reverse and assigns the first register
//! of the class that no neighbour holds, alias-aware through
//! `is_same_register`.

use crate::fx::{FxHashMap, FxHashSet};
use crate::isa::TargetIsa;
use crate::mir::{MachFunction, Reg};
use crate::regalloc::liveness::{BlockLiveness, Liveness};

struct GraphNode {
    id: u32,
    phys: Option<Reg>,
    connections: FxHashSet<u32>,
}

/// The outcome of one colouring attempt.
pub struct Coloring {
    /// Virtual register number -> physical register (canonical id).
    pub assignments: FxHashMap<u32, Reg>,
    /// Virtual registers that could not be coloured.
    pub spills: Vec<u32>,
}

/// Colour the virtual registers of `mf` given its live ranges.
pub fn color(mf: &MachFunction, isa: &dyn TargetIsa, liveness: &Liveness) -> Coloring {
    let reg_info = isa.register_info();

    // Build one node per virtual register; every block a register is
    // live in contributes its overlaps.
    let mut nodes: Vec<GraphNode> = Vec::new();
    let mut node_of: FxHashMap<u32, usize> = FxHashMap::default();
    for block in &liveness.blocks {
        for &ri in &block.order {
            let id = liveness.ranges[ri].reg;
            if id < Reg::VREG_BASE {
                continue;
            }
            let overlaps = overlaps(liveness, block, id);
            match node_of.get(&id) {
                Some(&ni) => {
                    nodes[ni].connections.extend(overlaps);
                }
                None => {
                    node_of.insert(id, nodes.len());
                    nodes.push(GraphNode {
                        id,
                        phys: None,
                        connections: overlaps,
                    });
                }
            }
        }
    }

    // Simplify.
    let mut in_graph: FxHashSet<u32> = nodes.iter().map(|n| n.id).collect();
    let mut stack: Vec<u32> = Vec::new();
    let mut spills: Vec<u32> = Vec::new();
    while !in_graph.is_empty() {
        let mut removed = None;
        for node in nodes.iter() {
            if !in_graph.contains(&node.id) {
                continue;
            }
            let class = mf.vreg_data(Reg::from_index(node.id)).class;
            let k = reg_info.allocatable(class).len();
            let virtual_degree = node
                .connections
                .iter()
                .filter(|&&c| c >= Reg::VREG_BASE && in_graph.contains(&c))
                .count();
            if virtual_degree < k {
                removed = Some(node.id);
                break;
            }
        }
        match removed {
            Some(id) => {
                in_graph.remove(&id);
                stack.push(id);
            }
            None => {
                // Nothing is trivially colourable; give up on the node
                // with the fewest neighbours.
                let &id = in_graph
                    .iter()
                    .min_by_key(|&&id| {
                        let n = &nodes[node_of[&id]];
                        (n.connections.len(), id)
                    })
                    .unwrap();
                in_graph.remove(&id);
                spills.push(id);
            }
        }
    }

    // Select, in reverse simplification order.
    while let Some(id) = stack.pop() {
        let ni = node_of[&id];
        let class = mf.vreg_data(Reg::from_index(id)).class;
        let mut chosen = None;
        'regs: for &phys in reg_info.allocatable(class) {
            for &conn in &nodes[ni].connections {
                if conn < Reg::VREG_BASE {
                    if reg_info.is_same_register(Reg::phys(conn), phys) {
                        continue 'regs;
                    }
                } else if let Some(&ci) = node_of.get(&conn) {
                    if let Some(assigned) = nodes[ci].phys {
                        if reg_info.is_same_register(assigned, phys) {
                            continue 'regs;
                        }
                    }
                }
            }
            chosen = Some(phys);
            break;
        }
        nodes[ni].phys = chosen;
        in_graph.insert(id);
    }

    let mut assignments = FxHashMap::default();
    for node in &nodes {
        if spills.contains(&node.id) {
            continue;
        }
        match node.phys {
            Some(phys) => {
                assignments.insert(node.id - Reg::VREG_BASE, phys);
            }
            // An impossible colour state after simplification succeeded
            // means the class ran dry; spill and retry.
            None => spills.push(node.id),
        }
    }

    Coloring {
        assignments,
        spills,
    }
}

/// All registers whose ranges overlap any of `id`'s ranges within
/// `block` (closed-interval intersection on function-wide indices).
fn overlaps(liveness: &Liveness, block: &BlockLiveness, id: u32) -> FxHashSet<u32> {
    let mut out = FxHashSet::default();
    let Some(mine) = block.per_reg.get(&id) else {
        return out;
    };
    for &ri in mine {
        let my = liveness.ranges[ri];
        for (&other, list) in &block.per_reg {
            if other == id {
                continue;
            }
            for &oi in list {
                let theirs = liveness.ranges[oi];
                if my.start <= theirs.end && theirs.start <= my.end {
                    out.insert(other);
                    break;
                }
            }
        }
    }
    out
}
