//! Call-site inventory.
//!
//! Collects every call site with a directly-known callee and marks
//! functions that contain a direct self-call as recursive. The inliner
//! consumes both.

use crate::fx::{FxHashMap, FxHashSet};
use crate::ir::{Block, FuncId, Inst, InstructionData, Unit, ValueData};

/// One call site with a direct callee.
#[derive(Clone, Copy, Debug)]
pub struct CallSite {
    /// The call instruction.
    pub inst: Inst,
    /// The block containing it.
    pub block: Block,
    /// The called function.
    pub callee: FuncId,
}

/// Call sites and recursion flags for a whole unit.
pub struct CallAnalysis {
    sites: FxHashMap<FuncId, Vec<CallSite>>,
    recursive: FxHashSet<FuncId>,
}

impl CallAnalysis {
    /// Scan `unit`.
    pub fn compute(unit: &Unit) -> Self {
        let mut sites: FxHashMap<FuncId, Vec<CallSite>> = FxHashMap::default();
        let mut recursive = FxHashSet::default();
        for (id, func) in unit.functions.iter() {
            let mut list = Vec::new();
            for block in func.layout.blocks() {
                for &inst in func.layout.block_insts(block) {
                    let InstructionData::Call { args, .. } = func.dfg.inst(inst) else {
                        continue;
                    };
                    let ValueData::FuncAddr { func: callee, .. } = *func.dfg.value_def(args[0])
                    else {
                        continue;
                    };
                    if callee == id {
                        recursive.insert(id);
                    }
                    list.push(CallSite {
                        inst,
                        block,
                        callee,
                    });
                }
            }
            sites.insert(id, list);
        }
        Self { sites, recursive }
    }

    /// The direct call sites inside `func`.
    pub fn sites(&self, func: FuncId) -> &[CallSite] {
        self.sites.get(&func).map_or(&[], Vec::as_slice)
    }

    /// Does `func` call itself directly?
    pub fn is_recursive(&self, func: FuncId) -> bool {
        self.recursive.contains(&func)
    }
}
