//! Function inlining.
//!
//! A greedy, score-driven inliner. For every call site with a direct,
//! non-recursive, defined callee it weighs the eliminated call overhead,
//! the call's loop depth, constant and global arguments and a small-callee
//! bonus against the callee's size, and inlines while the score is
//! non-negative and a unit-wide growth budget remains.
//!
//! Mechanically, the caller block is split at the call; callee blocks are
//! cloned between the split point and the merge block with a value map
//! built in two phases (clone first, rewrite operands second); every
//! cloned `ret v` becomes a store to a return slot followed by a jump to
//! the merge block, and the call is replaced by a load of that slot.

use crate::call_analysis::CallAnalysis;
use crate::dominator_tree::DominatorTree;
use crate::flowgraph::ControlFlowGraph;
use crate::fx::FxHashMap;
use crate::ir::{Block, FuncId, Inst, InstructionData, Unit, Value, ValueData};
use crate::loop_analysis::LoopAnalysis;

const CALL_OVERHEAD_BENEFIT: f64 = 8.0;
const LOOP_DEPTH_WEIGHT: f64 = 6.0;
const CONST_ARG_BONUS: f64 = 3.0;
const GLOBAL_ARG_BONUS: f64 = 1.5;
const TINY_FUNC_THRESHOLD: usize = 6;
const TINY_FUNC_BONUS: f64 = 10.0;

/// Run the inliner over the whole unit until no call site is worth
/// inlining or the growth budget is exhausted. Returns `true` if anything
/// was inlined.
pub fn run(unit: &mut Unit) -> bool {
    let mut inlined_any = false;
    let mut total_added: usize = 0;

    for caller in unit.defined_functions() {
        loop {
            let calls = CallAnalysis::compute(unit);
            let func = &unit.functions[caller];
            let cfg = ControlFlowGraph::with_function(func);
            let domtree = DominatorTree::with_function(func, &cfg);
            let mut loops = LoopAnalysis::new();
            loops.compute(func, &cfg, &domtree);

            let mut did_inline = false;
            for site in calls.sites(caller) {
                let callee = site.callee;
                if callee == caller {
                    continue;
                }
                let callee_func = &unit.functions[callee];
                if !callee_func.has_body() || calls.is_recursive(callee) {
                    continue;
                }

                let callee_size = callee_func.instruction_count();
                let mut benefit = CALL_OVERHEAD_BENEFIT;
                benefit += f64::from(loops.loop_depth(site.block)) * LOOP_DEPTH_WEIGHT;
                if let InstructionData::Call { args, .. } = func.dfg.inst(site.inst) {
                    for &arg in &args[1..] {
                        match func.dfg.value_def(arg) {
                            ValueData::Const { .. } => benefit += CONST_ARG_BONUS,
                            ValueData::Global { .. } => benefit += GLOBAL_ARG_BONUS,
                            _ => {}
                        }
                    }
                }
                if callee_size <= TINY_FUNC_THRESHOLD {
                    benefit += TINY_FUNC_BONUS;
                }
                let score = benefit - callee_size as f64;
                let budget = (unit.instruction_count() as f64 * 0.2).max(100.0) as usize;
                if score < 0.0 || total_added + callee_size > budget {
                    continue;
                }

                log::debug!(
                    "inlining {} into {} (score {:.1}, size {})",
                    unit.functions[callee].name,
                    unit.functions[caller].name,
                    score,
                    callee_size
                );

                let before = unit.functions[caller].instruction_count();
                inline_site(unit, caller, site.inst, site.block, callee);
                total_added += unit.functions[caller].instruction_count() - before;
                did_inline = true;
                inlined_any = true;
                // The CFG changed under the site list; rescan the caller.
                break;
            }
            if !did_inline {
                break;
            }
        }
    }
    inlined_any
}

/// Splice one callee body into `caller` at `call`.
fn inline_site(unit: &mut Unit, caller: FuncId, call: Inst, call_block: Block, callee: FuncId) {
    let callee_copy = unit.functions[callee].clone();
    let (func, ctx) = unit.parts_mut(caller);

    // φs in the successor blocks of the call block still name it as their
    // incoming edge; after the split, that edge leaves the merge block.
    let succ_phis: Vec<Inst> = func
        .terminator(call_block)
        .map(|term| {
            func.dfg
                .inst(term)
                .branch_destinations()
                .iter()
                .flat_map(|&succ| {
                    func.layout
                        .block_insts(succ)
                        .iter()
                        .copied()
                        .filter(|&i| matches!(func.dfg.inst(i), InstructionData::Phi { .. }))
                        .collect::<Vec<_>>()
                })
                .collect()
        })
        .unwrap_or_default();

    let call_pos = func.layout.inst_pos(call);
    let merge = func.layout.split_block(call_block, call_pos);

    let InstructionData::Call { args, .. } = func.dfg.inst(call).clone() else {
        panic!("inline_site on a non-call");
    };
    let call_args = &args[1..];

    // Return slot in the caller's entry, when the callee returns a value.
    let ret_ty = callee_copy.return_type(&ctx.types);
    let ret_slot: Option<Value> = if ctx.types.is_void(ret_ty) {
        None
    } else {
        let ptr_ty = ctx.types.ptr(ret_ty);
        let slot = func
            .dfg
            .make_inst(InstructionData::StackAlloc { ty: ret_ty }, Some(ptr_ty));
        let entry = func.entry_block();
        func.layout.insert_inst(slot, entry, 0);
        func.dfg.inst_result(slot)
    };

    // Phase 1: clone blocks and instructions without wiring operands.
    let mut value_map: FxHashMap<Value, Value> = FxHashMap::default();
    for (i, &param) in callee_copy.params.iter().enumerate() {
        value_map.insert(param, call_args[i]);
    }
    let mut block_map: FxHashMap<Block, Block> = FxHashMap::default();
    let mut clones: Vec<(Block, Vec<Inst>)> = Vec::new();
    let mut insert_after = call_block;
    for callee_block in callee_copy.layout.blocks() {
        let new_block = func.layout.make_block();
        func.layout.insert_block_after(new_block, insert_after);
        insert_after = new_block;
        block_map.insert(callee_block, new_block);

        let mut cloned_insts = Vec::new();
        for &inst in callee_copy.layout.block_insts(callee_block) {
            let data = callee_copy.dfg.inst(inst).clone();
            let result_ty = callee_copy
                .dfg
                .inst_result(inst)
                .map(|r| callee_copy.dfg.value_type(r));
            let clone = func.dfg.make_inst_deferred(data, result_ty);
            if let (Some(old), Some(new)) =
                (callee_copy.dfg.inst_result(inst), func.dfg.inst_result(clone))
            {
                value_map.insert(old, new);
            }
            func.layout.append_inst(clone, new_block);
            cloned_insts.push(clone);
        }
        clones.push((new_block, cloned_insts));
    }

    // Phase 2: rewrite operands through the value map. Values that are
    // not instruction results or parameters are re-materialised in the
    // caller's graph; types and constants are unit-level entities, so they
    // carry over unchanged.
    for (_, insts) in &clones {
        for &clone in insts {
            let dfg = &mut func.dfg;
            let mut pending: Vec<(Value, Value)> = Vec::new();
            {
                let args = dfg.inst(clone).arguments();
                for arg in args {
                    if value_map.contains_key(&arg) {
                        continue;
                    }
                    let new = match *callee_copy.dfg.value_def(arg) {
                        ValueData::Const { constant, .. } => {
                            dfg.constant_value(&ctx.constants, constant)
                        }
                        ValueData::Undef { ty } => dfg.undef(ty),
                        ValueData::Global { ty, global } => dfg.global_addr(ty, global),
                        ValueData::FuncAddr { ty, func: f } => dfg.func_addr(ty, f),
                        ValueData::Inst { .. } | ValueData::Param { .. } => {
                            panic!("callee value escaped the clone map")
                        }
                    };
                    pending.push((arg, new));
                }
            }
            value_map.extend(pending);
            func.dfg.finalize_operands(
                clone,
                |v| *value_map.get(&v).unwrap_or(&v),
                |b| *block_map.get(&b).unwrap_or(&b),
            );
        }
    }

    // Rewrite every cloned `ret v` into `store v -> slot; jump merge`.
    for (block, insts) in &clones {
        for &clone in insts {
            let InstructionData::Ret { arg } = func.dfg.inst(clone).clone() else {
                continue;
            };
            func.remove_inst(clone);
            if let (Some(slot), Some(v)) = (ret_slot, arg) {
                let store = func
                    .dfg
                    .make_inst(InstructionData::Store { args: [slot, v] }, None);
                func.layout.append_inst(store, *block);
            }
            let jump = func
                .dfg
                .make_inst(InstructionData::Jump { dest: merge }, None);
            func.layout.append_inst(jump, *block);
        }
    }

    // The call becomes a load of the return slot at the top of the merge
    // block.
    if let Some(result) = func.dfg.inst_result(call) {
        let slot = ret_slot.expect("non-void call needs a return slot");
        let load = func
            .dfg
            .make_inst(InstructionData::Load { arg: slot }, Some(ret_ty));
        func.layout.insert_inst(load, merge, 0);
        let load_result = func.dfg.inst_result(load).unwrap();
        func.dfg.replace_uses(result, load_result);
    }
    func.remove_inst(call);

    // Jump from the split point into the cloned entry.
    let cloned_entry = clones.first().expect("callee has a body").0;
    let jump = func
        .dfg
        .make_inst(InstructionData::Jump { dest: cloned_entry }, None);
    func.layout.append_inst(jump, call_block);

    // Successor φs now receive their value through the merge block.
    for phi in succ_phis {
        func.dfg.rewrite_phi_pred(phi, call_block, merge);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, IntCC, Opcode};
    use crate::isa::CallConv;
    use crate::verifier::{verify_function, VerifierErrors};

    /// `int f(int x) { if (x) return 1; return 2; }` inlined into a caller
    /// passing a constant.
    #[test]
    fn inlines_small_branchy_callee() {
        let mut unit = Unit::new("test");
        let i32t = unit.ctx.types.int(32);
        let sig = unit.ctx.types.func(i32t, vec![i32t], false);

        let callee = unit.add_function("f", sig, CallConv::SystemV);
        {
            let func = &mut unit.functions[callee];
            let mut b = Builder::new(func, &mut unit.ctx);
            let entry = b.create_block();
            let then_b = b.create_block();
            let else_b = b.create_block();
            b.switch_to_block(entry);
            let x = b.func.params[0];
            let zero = b.iconst(i32t, 0);
            let cond = b.icmp(IntCC::NotEqual, x, zero);
            b.cond_jump(cond, then_b, else_b);
            b.switch_to_block(then_b);
            let one = b.iconst(i32t, 1);
            b.ret(Some(one));
            b.switch_to_block(else_b);
            let two = b.iconst(i32t, 2);
            b.ret(Some(two));
        }

        let caller = unit.add_function("main", sig, CallConv::SystemV);
        let fsig = unit.functions[callee].sig;
        {
            let func = &mut unit.functions[caller];
            let mut b = Builder::new(func, &mut unit.ctx);
            let entry = b.create_block();
            b.switch_to_block(entry);
            let faddr = b.func_addr(callee, fsig);
            let zero = b.iconst(i32t, 0);
            let r = b.call(faddr, &[zero]).unwrap();
            b.ret(Some(r));
        }

        assert!(run(&mut unit));

        // The call is gone from the caller.
        let func = &unit.functions[caller];
        for (_, inst) in func.collect_insts() {
            assert_ne!(func.dfg.inst(inst).opcode(), Opcode::Call);
        }
        let mut errors = VerifierErrors::default();
        assert!(
            verify_function(func, &unit.ctx, &mut errors).is_ok(),
            "{errors}"
        );
    }

    /// A recursive factorial is never inlined.
    #[test]
    fn recursion_blocks_inlining() {
        let mut unit = Unit::new("test");
        let i32t = unit.ctx.types.int(32);
        let sig = unit.ctx.types.func(i32t, vec![i32t], false);
        let fac = unit.add_function("fac", sig, CallConv::SystemV);
        {
            let func = &mut unit.functions[fac];
            let mut b = Builder::new(func, &mut unit.ctx);
            let entry = b.create_block();
            let rec = b.create_block();
            let base = b.create_block();
            b.switch_to_block(entry);
            let n = b.func.params[0];
            let one = b.iconst(i32t, 1);
            let stop = b.icmp(IntCC::SignedLessThanOrEqual, n, one);
            b.cond_jump(stop, base, rec);
            b.switch_to_block(rec);
            let fsig = b.func.sig;
            let me = b.func_addr(fac, fsig);
            let nm1 = b.sub(n, one);
            let sub_result = b.call(me, &[nm1]).unwrap();
            let prod = b.imul(n, sub_result);
            b.ret(Some(prod));
            b.switch_to_block(base);
            b.ret(Some(one));
        }

        let caller = unit.add_function("main", sig, CallConv::SystemV);
        let fsig = unit.functions[fac].sig;
        {
            let func = &mut unit.functions[caller];
            let mut b = Builder::new(func, &mut unit.ctx);
            let entry = b.create_block();
            b.switch_to_block(entry);
            let faddr = b.func_addr(fac, fsig);
            let five = b.iconst(i32t, 5);
            let r = b.call(faddr, &[five]).unwrap();
            b.ret(Some(r));
        }

        assert!(!run(&mut unit));
        let func = &unit.functions[caller];
        let calls = func
            .collect_insts()
            .iter()
            .filter(|&&(_, i)| func.dfg.inst(i).opcode() == Opcode::Call)
            .count();
        assert_eq!(calls, 1);
    }
}
