//! Live-range discovery over machine IR.
//!
//! Ranges are intervals of function-wide instruction indices, discovered
//! per block: a definition (destination operand, declared clobber, or
//! call return register) starts a new range, any other occurrence extends
//! the current one. Definitions in the assigned role are processed after
//! the other operands of the same instruction so they don't split a range
//! at that instruction. Two conservative post-passes stitch the per-block
//! ranges together: hole filling synthesises full-block ranges for blocks
//! that lie on a path between a use and a re-use, and edge propagation
//! extends ranges to the block boundary on edges where both ends are
//! live.

use crate::fx::{FxHashMap, FxHashSet};
use crate::isa::{RegisterInfo, TargetIsa};
use crate::mir::{MachFunction, MachLabel, Reg};

/// One live range of a register within a block.
#[derive(Clone, Copy, Debug)]
pub struct LiveRange {
    /// The register (virtual or physical id).
    pub reg: u32,
    /// First covered instruction, function-wide index.
    pub start: u32,
    /// Last covered instruction, inclusive.
    pub end: u32,
    /// The range began at a definition in the assigned role.
    pub assigned_first: bool,
}

/// Per-block live ranges.
pub struct BlockLiveness {
    /// The block.
    pub label: MachLabel,
    /// Function-wide index of the first instruction.
    pub first: u32,
    /// Function-wide index of the last instruction (inclusive).
    pub last: u32,
    /// Ranges per register, in discovery order, as indices into
    /// [`Liveness::ranges`].
    pub per_reg: FxHashMap<u32, Vec<usize>>,
    /// All range indices of this block in discovery order.
    pub order: Vec<usize>,
}

/// The result of live-range discovery for one function.
pub struct Liveness {
    /// All ranges.
    pub ranges: Vec<LiveRange>,
    /// Per-block structure, in layout order.
    pub blocks: Vec<BlockLiveness>,
}

impl Liveness {
    /// Discover live ranges for `mf`.
    pub fn compute(mf: &MachFunction, isa: &dyn TargetIsa) -> Self {
        let mut lv = Self {
            ranges: Vec::new(),
            blocks: Vec::new(),
        };

        let mut first = 0u32;
        for (label, data) in mf.blocks.iter() {
            let len = data.insts.len() as u32;
            lv.blocks.push(BlockLiveness {
                label,
                first,
                last: first + len.saturating_sub(1),
                per_reg: FxHashMap::default(),
                order: Vec::new(),
            });
            first += len;
        }

        if lv.blocks.is_empty() {
            return lv;
        }
        for bi in 0..lv.blocks.len() {
            lv.fill_block(mf, isa, bi);
        }

        // Argument registers are live from the function entry.
        for &live_in in &mf.live_ins {
            let first = lv.blocks.first().map_or(0, |b| b.first);
            lv.range_for(0, live_in.index(), first, false);
        }

        lv.fill_holes_from_entry(mf);
        lv.propagate(mf);
        lv
    }

    /// Start or extend a range for `reg` at instruction `pos` in block
    /// `bi`.
    fn range_for(&mut self, bi: usize, reg: u32, pos: u32, assigned: bool) {
        let block = &mut self.blocks[bi];
        let list = block.per_reg.entry(reg).or_default();
        if assigned || list.is_empty() {
            let idx = self.ranges.len();
            self.ranges.push(LiveRange {
                reg,
                start: pos,
                end: pos,
                assigned_first: assigned,
            });
            list.push(idx);
            block.order.push(idx);
        }
        let &last = block.per_reg[&reg].last().unwrap();
        self.ranges[last].end = self.ranges[last].end.max(pos);
    }

    fn fill_block(&mut self, mf: &MachFunction, isa: &dyn TargetIsa, bi: usize) {
        let label = self.blocks[bi].label;
        let base = self.blocks[bi].first;
        let info = isa.instruction_info();

        for (i, inst) in mf.blocks[label].insts.iter().enumerate() {
            let pos = base + i as u32;
            let desc = info.desc(inst.opcode);

            // Call return registers are definitions at the call site.
            if let Some(call) = &inst.call_info {
                for &ret in &call.ret_regs {
                    self.range_for(bi, ret.index(), pos, true);
                }
            }

            let mut assigned: Vec<u32> = Vec::new();
            for (j, op) in inst.operands.iter().enumerate() {
                let Some(reg) = op.as_reg() else { continue };
                let role = desc.operand(j);
                if role.def && !role.read {
                    assigned.push(reg.index());
                    continue;
                }
                self.range_for(bi, reg.index(), pos, false);
                if role.def {
                    assigned.push(reg.index());
                }
            }
            for &clobber in desc.clobbers {
                self.range_for(bi, clobber.index(), pos, false);
            }
            // Assigned definitions last, so they don't split a range that
            // the same instruction also reads.
            for reg in assigned {
                self.range_for(bi, reg, pos, true);
            }
        }
    }

    /// DFS from the entry; for every start block, walk simple paths and
    /// synthesise full-block ranges in intermediate blocks that lie
    /// between a live range and a block where the same register is live
    /// again.
    fn fill_holes_from_entry(&mut self, mf: &MachFunction) {
        let succs = block_succ_indices(mf);
        let mut visited = FxHashSet::default();
        let mut stack = vec![0usize];
        while let Some(bi) = stack.pop() {
            if !visited.insert(bi) {
                continue;
            }
            let mut path = Vec::new();
            let mut seen = FxHashSet::default();
            self.fill_holes(&succs, bi, bi, &mut path, &mut seen);
            for &s in &succs[bi] {
                stack.push(s);
            }
        }
    }

    fn fill_holes(
        &mut self,
        succs: &[Vec<usize>],
        from: usize,
        current: usize,
        path: &mut Vec<usize>,
        seen: &mut FxHashSet<usize>,
    ) {
        path.push(current);

        if path.len() > 2 {
            let from_ranges: Vec<(u32, bool)> = self.blocks[from]
                .order
                .iter()
                .map(|&ri| (self.ranges[ri].reg, self.ranges[ri].assigned_first))
                .collect();
            for (reg, assigned) in from_ranges {
                if assigned || !self.blocks[current].per_reg.contains_key(&reg) {
                    continue;
                }
                for &mid in &path[1..path.len() - 1] {
                    if self.blocks[mid].per_reg.contains_key(&reg) {
                        continue;
                    }
                    let (first, last) = (self.blocks[mid].first, self.blocks[mid].last);
                    let idx = self.ranges.len();
                    self.ranges.push(LiveRange {
                        reg,
                        start: first,
                        end: last,
                        assigned_first: false,
                    });
                    let block = &mut self.blocks[mid];
                    block.per_reg.entry(reg).or_default().push(idx);
                    block.order.push(idx);
                }
            }
        }

        if !seen.insert(current) {
            path.pop();
            return;
        }
        for &s in &succs[current] {
            self.fill_holes(succs, from, s, path, seen);
        }
        path.pop();
    }

    /// For every edge where a register is live on both sides, extend the
    /// predecessor's range to its block end and the successor's to its
    /// block start.
    fn propagate(&mut self, mf: &MachFunction) {
        let succs = block_succ_indices(mf);
        let mut visited = FxHashSet::default();
        let mut stack = vec![0usize];
        while let Some(bi) = stack.pop() {
            if !visited.insert(bi) {
                continue;
            }
            for oi in 0..self.blocks[bi].order.len() {
                let ri = self.blocks[bi].order[oi];
                let reg = self.ranges[ri].reg;
                for &s in &succs[bi] {
                    let Some(list) = self.blocks[s].per_reg.get(&reg) else {
                        continue;
                    };
                    let &succ_ri = list.last().unwrap();
                    let pred_end = self.blocks[bi].last;
                    let succ_start = self.blocks[s].first;
                    self.ranges[ri].end = self.ranges[ri].end.max(pred_end);
                    self.ranges[succ_ri].start = self.ranges[succ_ri].start.min(succ_start);
                }
            }
            for &s in &succs[bi] {
                stack.push(s);
            }
        }
    }

    /// Is `reg` (alias-aware) live at function-wide instruction index
    /// `pos`, strictly inside one of its ranges?
    pub fn live_across(&self, reg_info: &dyn RegisterInfo, reg: Reg, pos: u32) -> bool {
        self.ranges.iter().any(|r| {
            r.start < pos
                && pos < r.end
                && same_phys(reg_info, r.reg, reg)
        })
    }

    /// Does any range belong to `reg` (alias-aware)?
    pub fn ever_live(&self, reg_info: &dyn RegisterInfo, reg: Reg) -> bool {
        self.ranges
            .iter()
            .any(|r| same_phys(reg_info, r.reg, reg))
    }
}

fn same_phys(reg_info: &dyn RegisterInfo, id: u32, reg: Reg) -> bool {
    let r = Reg::phys(id);
    id < Reg::VREG_BASE && reg_info.is_same_register(r, reg)
}

/// Successor lists as positional indices into the layout order.
pub fn block_succ_indices(mf: &MachFunction) -> Vec<Vec<usize>> {
    let index_of: FxHashMap<MachLabel, usize> = mf
        .blocks
        .keys()
        .enumerate()
        .map(|(i, l)| (l, i))
        .collect();
    mf.blocks
        .values()
        .map(|b| b.succs.iter().map(|s| index_of[s]).collect())
        .collect()
}
