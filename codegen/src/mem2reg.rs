//! SSA construction: promote stack slots to SSA values.
//!
//! A stack allocation is promotable when its pointee is a scalar (integer,
//! float or pointer) and every use is a direct load or store with the
//! allocation as the *pointer* operand — an allocation whose address
//! escapes stays in memory. Promotion places φs on the iterated dominance
//! frontier of the storing blocks, then renames loads and stores in a
//! depth-first walk of the dominator tree with one value stack per
//! allocation. A load with nothing on the stack yields `undef`.
//!
//! Non-promotable allocations simply remain; the pass never fails.

use crate::dominator_tree::DominatorTree;
use crate::flowgraph::ControlFlowGraph;
use crate::fx::{FxHashMap, FxHashSet};
use crate::ir::{Block, Context, Function, Inst, InstructionData, Value};
use std::collections::VecDeque;

/// Run Mem2Reg on `func`. Returns `true` if any allocation was promoted.
pub fn run(
    func: &mut Function,
    ctx: &mut Context,
    cfg: &ControlFlowGraph,
    domtree: &DominatorTree,
) -> bool {
    let promoted: Vec<Inst> = func
        .allocations()
        .into_iter()
        .filter(|&a| is_promotable(func, ctx, a))
        .collect();
    if promoted.is_empty() {
        return false;
    }
    log::debug!(
        "mem2reg: promoting {} allocation(s) in {}",
        promoted.len(),
        func.name
    );

    // φ placement on the iterated dominance frontier of the storing
    // blocks, one allocation at a time.
    let mut phi_for_alloca: FxHashMap<(Block, Inst), Inst> = FxHashMap::default();
    let mut alloca_for_phi: FxHashMap<Inst, Inst> = FxHashMap::default();
    for &alloca in &promoted {
        let pointee = pointee_type(func, ctx, alloca);
        let mut idf: FxHashSet<Block> = FxHashSet::default();
        let mut queue: VecDeque<Block> = defining_blocks(func, alloca).into_iter().collect();
        while let Some(block) = queue.pop_front() {
            for &fb in domtree.frontier(block) {
                if idf.insert(fb) {
                    queue.push_back(fb);
                }
            }
        }
        for block in idf {
            let phi = func
                .dfg
                .make_inst(InstructionData::Phi { pairs: Vec::new() }, Some(pointee));
            // After any φs already there.
            let pos = func.phi_count(block);
            func.layout.insert_inst(phi, block, pos);
            phi_for_alloca.insert((block, alloca), phi);
            alloca_for_phi.insert(phi, alloca);
        }
    }

    // Renaming walk.
    let mut renamer = Renamer {
        func,
        ctx,
        cfg,
        domtree,
        promoted: promoted.iter().copied().collect(),
        phi_for_alloca,
        alloca_for_phi,
        stacks: FxHashMap::default(),
    };
    if let Some(entry) = renamer.func.layout.entry_block() {
        renamer.rename(entry);
    }

    for alloca in promoted {
        func.remove_inst(alloca);
    }
    true
}

fn pointee_type(func: &Function, ctx: &Context, alloca: Inst) -> crate::ir::Type {
    let result = func.dfg.inst_result(alloca).unwrap();
    ctx.types
        .pointee(func.dfg.value_type(result))
        .expect("allocation result is always a pointer")
}

fn is_promotable(func: &Function, ctx: &Context, alloca: Inst) -> bool {
    let result = func.dfg.inst_result(alloca).unwrap();
    let pointee = pointee_type(func, ctx, alloca);
    if !(ctx.types.is_int(pointee) || ctx.types.is_float(pointee) || ctx.types.is_ptr(pointee)) {
        return false;
    }

    let mut has_load = false;
    let mut has_store = false;
    for &user in func.dfg.uses(result) {
        match func.dfg.inst(user) {
            InstructionData::Load { .. } => has_load = true,
            InstructionData::Store { args } if args[0] == result && args[1] != result => {
                has_store = true
            }
            _ => return false,
        }
    }
    has_load && has_store
}

fn defining_blocks(func: &Function, alloca: Inst) -> FxHashSet<Block> {
    let result = func.dfg.inst_result(alloca).unwrap();
    func.dfg
        .uses(result)
        .iter()
        .filter(|&&user| matches!(func.dfg.inst(user), InstructionData::Store { .. }))
        .filter_map(|&user| func.layout.inst_block(user))
        .collect()
}

struct Renamer<'a> {
    func: &'a mut Function,
    ctx: &'a mut Context,
    cfg: &'a ControlFlowGraph,
    domtree: &'a DominatorTree,
    promoted: FxHashSet<Inst>,
    phi_for_alloca: FxHashMap<(Block, Inst), Inst>,
    alloca_for_phi: FxHashMap<Inst, Inst>,
    /// Per-allocation stack of reaching definitions.
    stacks: FxHashMap<Inst, Vec<Value>>,
}

impl Renamer<'_> {
    fn rename(&mut self, block: Block) {
        // Remember stack depths so everything pushed here pops on the way
        // out.
        let saved: FxHashMap<Inst, usize> = self
            .promoted
            .iter()
            .map(|&a| (a, self.stacks.get(&a).map_or(0, Vec::len)))
            .collect();

        for inst in self.func.layout.block_insts(block).to_vec() {
            match self.func.dfg.inst(inst).clone() {
                InstructionData::Store { args } => {
                    if let Some(alloca) = self.promoted_alloca(args[0]) {
                        self.stacks.entry(alloca).or_default().push(args[1]);
                        self.func.remove_inst(inst);
                    }
                }
                InstructionData::Load { arg } => {
                    if let Some(alloca) = self.promoted_alloca(arg) {
                        let replacement = match self.stacks.get(&alloca).and_then(|s| s.last()) {
                            Some(&top) => top,
                            None => {
                                let pointee = pointee_type(self.func, self.ctx, alloca);
                                self.func.dfg.undef(pointee)
                            }
                        };
                        let result = self.func.dfg.inst_result(inst).unwrap();
                        self.func.dfg.replace_uses(result, replacement);
                        self.func.remove_inst(inst);
                    }
                }
                InstructionData::Phi { .. } => {
                    if let Some(&alloca) = self.alloca_for_phi.get(&inst) {
                        let value = self.func.dfg.inst_result(inst).unwrap();
                        self.stacks.entry(alloca).or_default().push(value);
                    }
                }
                _ => {}
            }
        }

        // Feed the φs of every successor with the value reaching the end
        // of this block.
        let mut succs: Vec<Block> = Vec::new();
        for &s in self.cfg.succs(block) {
            if !succs.contains(&s) {
                succs.push(s);
            }
        }
        for succ in succs {
            for &alloca in self.promoted.clone().iter() {
                let Some(&phi) = self.phi_for_alloca.get(&(succ, alloca)) else {
                    continue;
                };
                let value = match self.stacks.get(&alloca).and_then(|s| s.last()) {
                    Some(&top) => top,
                    None => {
                        let pointee = pointee_type(self.func, self.ctx, alloca);
                        self.func.dfg.undef(pointee)
                    }
                };
                self.func.dfg.append_phi_pair(phi, value, block);
            }
        }

        for child in self.domtree.children(block).to_vec() {
            self.rename(child);
        }

        for (alloca, depth) in saved {
            if let Some(stack) = self.stacks.get_mut(&alloca) {
                stack.truncate(depth);
            }
        }
    }

    fn promoted_alloca(&self, ptr: Value) -> Option<Inst> {
        let inst = self.func.dfg.value_inst(ptr)?;
        self.promoted.contains(&inst).then_some(inst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, IntCC, Opcode, Unit};
    use crate::isa::CallConv;

    /// `int i = 0; for (; i < 10; i++); return i;`
    #[test]
    fn loop_counter_gets_a_phi() {
        let mut unit = Unit::new("test");
        let i32t = unit.ctx.types.int(32);
        let sig = unit.ctx.types.func(i32t, vec![], false);
        let id = unit.add_function("count", sig, CallConv::SystemV);
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);

        let entry = b.create_block();
        let header = b.create_block();
        let latch = b.create_block();
        let exit = b.create_block();

        b.switch_to_block(entry);
        let slot = b.alloca(i32t);
        let zero = b.iconst(i32t, 0);
        b.store(slot, zero);
        b.jump(header);

        b.switch_to_block(header);
        let i = b.load(slot);
        let ten = b.iconst(i32t, 10);
        let cmp = b.icmp(IntCC::SignedLessThan, i, ten);
        b.cond_jump(cmp, latch, exit);

        b.switch_to_block(latch);
        let i2 = b.load(slot);
        let one = b.iconst(i32t, 1);
        let next = b.add(i2, one);
        b.store(slot, next);
        b.jump(header);

        b.switch_to_block(exit);
        let out = b.load(slot);
        b.ret(Some(out));

        let cfg = ControlFlowGraph::with_function(func);
        let domtree = DominatorTree::with_function(func, &cfg);
        assert!(run(func, &mut unit.ctx, &cfg, &domtree));

        // The allocation and all its loads/stores are gone.
        assert!(func.allocations().is_empty());
        for (_, inst) in func.collect_insts() {
            assert!(!matches!(
                func.dfg.inst(inst).opcode(),
                Opcode::Load | Opcode::Store
            ));
        }

        // The loop header got a φ with incoming (0, entry) and (add,
        // latch).
        let phis: Vec<_> = func
            .layout
            .block_insts(header)
            .iter()
            .filter(|&&i| func.dfg.inst(i).opcode() == Opcode::Phi)
            .collect();
        assert_eq!(phis.len(), 1);
        let InstructionData::Phi { pairs } = func.dfg.inst(*phis[0]) else {
            unreachable!()
        };
        let mut preds: Vec<Block> = pairs.iter().map(|&(_, b)| b).collect();
        preds.sort();
        let mut want = vec![entry, latch];
        want.sort();
        assert_eq!(preds, want);
        assert!(pairs.iter().any(|&(v, b)| b == entry && v == zero));
        assert!(pairs.iter().any(|&(v, b)| b == latch && v == next));

        // Verify and check idempotence: a second run changes nothing.
        let mut errors = crate::verifier::VerifierErrors::default();
        assert!(crate::verifier::verify_function(func, &unit.ctx, &mut errors).is_ok());
        let cfg = ControlFlowGraph::with_function(func);
        let domtree = DominatorTree::with_function(func, &cfg);
        assert!(!run(func, &mut unit.ctx, &cfg, &domtree));
    }

    #[test]
    fn escaping_allocation_stays() {
        let mut unit = Unit::new("test");
        let i64t = unit.ctx.types.int(64);
        let sig = unit.ctx.types.func(i64t, vec![], false);
        let id = unit.add_function("f", sig, CallConv::SystemV);
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let slot = b.alloca(i64t);
        let v = b.iconst(i64t, 3);
        b.store(slot, v);
        // The address itself is observed, so no promotion.
        let addr = b.ptrtoint(slot, i64t);
        let x = b.load(slot);
        let sum = b.add(addr, x);
        b.ret(Some(sum));

        let cfg = ControlFlowGraph::with_function(func);
        let domtree = DominatorTree::with_function(func, &cfg);
        assert!(!run(func, &mut unit.ctx, &cfg, &domtree));
        assert_eq!(func.allocations().len(), 1);
    }
}
