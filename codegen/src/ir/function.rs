//! Intermediate representation of a function.
//!
//! The `Function` struct owns all of its basic blocks and instructions
//! through its data flow graph and layout.

use crate::ir::dfg::{DataFlowGraph, ParamFlags};
use crate::ir::entities::{Block, Inst, Type, Value};
use crate::ir::instructions::{InstructionData, Opcode};
use crate::ir::types::{TypeData, TypeStore};
use crate::isa::CallConv;

/// A function: a name, a signature, and (for definitions) a body.
///
/// A function with no blocks in its layout is a declaration; calls to it
/// lower to external symbol references.
///
/// Functions can be cloned; the clone shares no mutable state with the
/// original. The inliner clones callees to work around the single-borrow
/// rule on the unit's function table.
#[derive(Clone)]
pub struct Function {
    /// Symbol name of this function.
    pub name: String,

    /// The function's type (a `TypeData::Func`).
    pub sig: Type,

    /// Calling convention.
    pub call_conv: CallConv,

    /// Data flow graph with the definitions of all instructions and values.
    pub dfg: DataFlowGraph,

    /// Layout of blocks and instructions in the function body.
    pub layout: Layout,

    /// The parameter values, one per declared parameter.
    pub params: Vec<Value>,
}

pub use crate::ir::layout::Layout;

impl Function {
    /// Create a function with the given name and signature. The parameter
    /// values are created eagerly so the frontend can reference them.
    pub fn with_signature(
        name: impl Into<String>,
        sig: Type,
        types: &TypeStore,
        call_conv: CallConv,
    ) -> Self {
        let mut dfg = DataFlowGraph::new();
        let params = match types.resolve(sig) {
            TypeData::Func { params, .. } => params
                .iter()
                .enumerate()
                .map(|(i, &ty)| dfg.make_param(ty, i as u16, ParamFlags::default()))
                .collect(),
            _ => panic!("function signature is not a function type"),
        };
        Self {
            name: name.into(),
            sig,
            call_conv,
            dfg,
            layout: Layout::new(),
            params,
        }
    }

    /// Does this function have a body, or is it only a declaration?
    pub fn has_body(&self) -> bool {
        self.layout.entry_block().is_some()
    }

    /// The entry block. Panics on declarations.
    pub fn entry_block(&self) -> Block {
        self.layout.entry_block().expect("function has no body")
    }

    /// The declared return type.
    pub fn return_type(&self, types: &TypeStore) -> Type {
        types.func_ret(self.sig).expect("bad signature")
    }

    /// Is the signature var-arg?
    pub fn is_var_arg(&self, types: &TypeStore) -> bool {
        match types.resolve(self.sig) {
            TypeData::Func { var_arg, .. } => *var_arg,
            _ => false,
        }
    }

    /// Mark parameter `index` as passed by value on the stack.
    pub fn set_param_by_val(&mut self, index: usize) {
        let v = self.params[index];
        self.dfg.set_param_flags(v, ParamFlags { by_val: true });
    }

    /// Number of instructions currently inserted in the layout.
    pub fn instruction_count(&self) -> usize {
        self.layout
            .blocks()
            .map(|b| self.layout.block_insts(b).len())
            .sum()
    }

    /// Count of φ instructions at the head of `block`.
    pub fn phi_count(&self, block: Block) -> usize {
        self.layout
            .block_insts(block)
            .iter()
            .take_while(|&&i| self.dfg.inst(i).opcode() == Opcode::Phi)
            .count()
    }

    /// The terminator of `block`, if the block is non-empty and ends in
    /// one.
    pub fn terminator(&self, block: Block) -> Option<Inst> {
        self.layout
            .last_inst(block)
            .filter(|&i| self.dfg.inst(i).opcode().is_terminator())
    }

    /// Remove `inst` from the function: scrub it from every use list, then
    /// from the layout. The caller must have replaced or abandoned its
    /// result value first.
    pub fn remove_inst(&mut self, inst: Inst) {
        self.dfg.detach_operands(inst);
        self.layout.remove_inst(inst);
    }

    /// Iterate over all `(block, inst)` pairs in layout order, collecting
    /// them first so the function can be mutated while walking.
    pub fn collect_insts(&self) -> Vec<(Block, Inst)> {
        let mut out = Vec::with_capacity(self.instruction_count());
        for block in self.layout.blocks() {
            for &inst in self.layout.block_insts(block) {
                out.push((block, inst));
            }
        }
        out
    }

    /// All stack allocations in the function.
    pub fn allocations(&self) -> Vec<Inst> {
        let mut out = Vec::new();
        for block in self.layout.blocks() {
            for &inst in self.layout.block_insts(block) {
                if let InstructionData::StackAlloc { .. } = self.dfg.inst(inst) {
                    out.push(inst);
                }
            }
        }
        out
    }
}
