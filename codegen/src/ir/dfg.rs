//! Data flow graph tracking instructions, values and their uses.
//!
//! The DFG owns every instruction and value in a function. Program order is
//! tracked separately by the [`Layout`](crate::ir::Layout).
//!
//! Use-def and def-use links are kept consistent on every mutation: all
//! operand changes go through the helpers here, which update the operand
//! list and the operand's use list together. A value's use list holds its
//! users once *per occurrence*, so an instruction using the same value
//! twice appears twice.

use crate::fx::FxHashMap;
use crate::ir::constants::{ConstantData, ConstantPool};
use crate::ir::entities::{Block, Constant, FuncId, GlobalVar, Inst, Type, Value};
use crate::ir::instructions::InstructionData;
use sable_entity::{PackedOption, PrimaryMap, SecondaryMap};

/// Flags attached to function parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParamFlags {
    /// The parameter is passed by value on the stack (a pointer to a
    /// caller-side spill slot with a fixed frame offset).
    pub by_val: bool,
}

/// The definition of a value.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueData {
    /// The result of an instruction.
    Inst {
        /// The value's type.
        ty: Type,
        /// The defining instruction.
        inst: Inst,
    },
    /// Function parameter number `index`.
    Param {
        /// The value's type.
        ty: Type,
        /// Zero-based parameter position.
        index: u16,
        /// ABI flags.
        flags: ParamFlags,
    },
    /// An interned constant.
    Const {
        /// The value's type.
        ty: Type,
        /// Reference into the unit's constant pool.
        constant: Constant,
    },
    /// The address of a global variable.
    Global {
        /// The value's type (a pointer).
        ty: Type,
        /// The referenced global.
        global: GlobalVar,
    },
    /// The address of a function.
    FuncAddr {
        /// The value's type (a pointer to the function type).
        ty: Type,
        /// The referenced function.
        func: FuncId,
    },
    /// An undefined value.
    Undef {
        /// The value's type.
        ty: Type,
    },
}

impl ValueData {
    fn ty(&self) -> Type {
        match *self {
            Self::Inst { ty, .. }
            | Self::Param { ty, .. }
            | Self::Const { ty, .. }
            | Self::Global { ty, .. }
            | Self::FuncAddr { ty, .. }
            | Self::Undef { ty } => ty,
        }
    }
}

/// A data flow graph defines all instructions and values in a function and
/// the data flow dependencies between them.
#[derive(Clone)]
pub struct DataFlowGraph {
    /// Data about all of the instructions in the function. Not in program
    /// order; that is tracked by `Layout`.
    insts: PrimaryMap<Inst, InstructionData>,

    /// The result value of each instruction, if it produces one.
    results: SecondaryMap<Inst, PackedOption<Value>>,

    /// Primary value table.
    values: PrimaryMap<Value, ValueData>,

    /// Users of each value, one entry per operand occurrence.
    uses: SecondaryMap<Value, Vec<Inst>>,

    /// Canonical value per pooled constant, so a constant used many times is
    /// a single value node.
    const_values: FxHashMap<Constant, Value>,

    /// Canonical undef value per type.
    undef_values: FxHashMap<Type, Value>,
}

impl DataFlowGraph {
    /// Create a new empty `DataFlowGraph`.
    pub fn new() -> Self {
        Self {
            insts: PrimaryMap::new(),
            results: SecondaryMap::new(),
            values: PrimaryMap::new(),
            uses: SecondaryMap::new(),
            const_values: FxHashMap::default(),
            undef_values: FxHashMap::default(),
        }
    }

    /// Number of instructions ever created, inserted in the layout or not.
    pub fn num_insts(&self) -> usize {
        self.insts.len()
    }

    /// Number of values ever created.
    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    /// Get the instruction data for `inst`.
    pub fn inst(&self, inst: Inst) -> &InstructionData {
        &self.insts[inst]
    }

    /// Mutable access to the instruction data for `inst`.
    ///
    /// Prefer the mutation helpers below; direct edits must not change the
    /// operand multiset, or use lists go stale.
    pub fn inst_mut(&mut self, inst: Inst) -> &mut InstructionData {
        &mut self.insts[inst]
    }

    /// Get the type of a value.
    pub fn value_type(&self, v: Value) -> Type {
        self.values[v].ty()
    }

    /// Get the definition of a value.
    pub fn value_def(&self, v: Value) -> &ValueData {
        &self.values[v]
    }

    /// The instruction defining `v`, if `v` is an instruction result.
    pub fn value_inst(&self, v: Value) -> Option<Inst> {
        match self.values[v] {
            ValueData::Inst { inst, .. } => Some(inst),
            _ => None,
        }
    }

    /// Is `v` a constant value?
    pub fn value_constant(&self, v: Value) -> Option<Constant> {
        match self.values[v] {
            ValueData::Const { constant, .. } => Some(constant),
            _ => None,
        }
    }

    /// The users of `v`, one entry per operand occurrence.
    pub fn uses(&self, v: Value) -> &[Inst] {
        &self.uses[v]
    }

    /// The result value of `inst`, if any.
    pub fn inst_result(&self, inst: Inst) -> Option<Value> {
        self.results[inst].expand()
    }

    // Value creation.

    /// Create a function parameter value.
    pub fn make_param(&mut self, ty: Type, index: u16, flags: ParamFlags) -> Value {
        self.values.push(ValueData::Param { ty, index, flags })
    }

    /// Get the canonical value for a pooled constant.
    pub fn constant_value(&mut self, pool: &ConstantPool, constant: Constant) -> Value {
        if let Some(&v) = self.const_values.get(&constant) {
            return v;
        }
        let ty = pool.resolve(constant).ty;
        let v = self.values.push(ValueData::Const { ty, constant });
        self.const_values.insert(constant, v);
        v
    }

    /// Shorthand: intern an integer constant and return its value.
    pub fn iconst(&mut self, pool: &mut ConstantPool, ty: Type, imm: i64) -> Value {
        let c = pool.intern(ConstantData::Int(imm), ty);
        self.constant_value(pool, c)
    }

    /// Shorthand: intern a float constant (by bit pattern) and return its
    /// value.
    pub fn fconst(&mut self, pool: &mut ConstantPool, ty: Type, bits: u64) -> Value {
        let c = pool.intern(ConstantData::Float(bits), ty);
        self.constant_value(pool, c)
    }

    /// Get the canonical undef value of the given type.
    pub fn undef(&mut self, ty: Type) -> Value {
        if let Some(&v) = self.undef_values.get(&ty) {
            return v;
        }
        let v = self.values.push(ValueData::Undef { ty });
        self.undef_values.insert(ty, v);
        v
    }

    /// Update the ABI flags of a parameter value.
    pub fn set_param_flags(&mut self, v: Value, new: ParamFlags) {
        match &mut self.values[v] {
            ValueData::Param { flags, .. } => *flags = new,
            _ => panic!("set_param_flags on non-parameter"),
        }
    }

    /// The ABI flags of a parameter value.
    pub fn param_flags(&self, v: Value) -> ParamFlags {
        match self.values[v] {
            ValueData::Param { flags, .. } => flags,
            _ => ParamFlags::default(),
        }
    }

    /// Create a value for the address of a global.
    pub fn global_addr(&mut self, ty: Type, global: GlobalVar) -> Value {
        self.values.push(ValueData::Global { ty, global })
    }

    /// Create a value for the address of a function.
    pub fn func_addr(&mut self, ty: Type, func: FuncId) -> Value {
        self.values.push(ValueData::FuncAddr { ty, func })
    }

    // Instruction creation and mutation.

    /// Create an instruction, registering this instruction as a user of
    /// every operand. `result_ty` attaches a result value of that type.
    pub fn make_inst(&mut self, data: InstructionData, result_ty: Option<Type>) -> Inst {
        let inst = self.insts.push(data);
        for arg in self.insts[inst].arguments() {
            self.uses[arg].push(inst);
        }
        if let Some(ty) = result_ty {
            let v = self.values.push(ValueData::Inst { ty, inst });
            self.results[inst] = v.into();
        }
        inst
    }

    /// Replace all uses of `old` with `new`, updating both use lists.
    ///
    /// `old`'s use list is drained; the operand slots in each user are
    /// rewritten in place.
    pub fn replace_uses(&mut self, old: Value, new: Value) {
        debug_assert_ne!(old, new);
        let users = core::mem::take(&mut self.uses[old]);
        for &user in &users {
            self.insts[user].map_arguments(|a| if a == old { new } else { a });
        }
        self.uses[new].extend(users);
    }

    /// Remove `inst` from the use lists of all its operands. Call before
    /// deleting the instruction from the layout.
    pub fn detach_operands(&mut self, inst: Inst) {
        for arg in self.insts[inst].arguments() {
            let list = &mut self.uses[arg];
            if let Some(pos) = list.iter().position(|&u| u == inst) {
                list.swap_remove(pos);
            }
        }
    }

    /// Append an incoming `(value, block)` pair to a φ instruction.
    pub fn append_phi_pair(&mut self, phi: Inst, value: Value, block: Block) {
        match &mut self.insts[phi] {
            InstructionData::Phi { pairs } => pairs.push((value, block)),
            _ => panic!("append_phi_pair on non-phi"),
        }
        self.uses[value].push(phi);
    }

    /// Remove the incoming pair for `pred` from a φ instruction.
    pub fn remove_phi_pred(&mut self, phi: Inst, pred: Block) {
        let removed: Vec<Value> = match &mut self.insts[phi] {
            InstructionData::Phi { pairs } => {
                let mut removed = Vec::new();
                pairs.retain(|&(v, b)| {
                    if b == pred {
                        removed.push(v);
                        false
                    } else {
                        true
                    }
                });
                removed
            }
            _ => panic!("remove_phi_pred on non-phi"),
        };
        for v in removed {
            let list = &mut self.uses[v];
            if let Some(pos) = list.iter().position(|&u| u == phi) {
                list.swap_remove(pos);
            }
        }
    }

    /// Rewrite the incoming block of every φ pair naming `old` to `new`.
    pub fn rewrite_phi_pred(&mut self, phi: Inst, old: Block, new: Block) {
        if let InstructionData::Phi { pairs } = &mut self.insts[phi] {
            for (_, b) in pairs.iter_mut() {
                if *b == old {
                    *b = new;
                }
            }
        }
    }

    /// Create an instruction whose operands are *not* yet valid in this
    /// graph and must not be registered as uses. The inliner clones callee
    /// instructions this way: clone first, then rewrite operands — wiring
    /// in one pass would bind CFG back edges to the wrong blocks.
    ///
    /// Every deferred instruction must be completed with
    /// [`finalize_operands`](Self::finalize_operands) before any other
    /// mutation helper touches it.
    pub fn make_inst_deferred(&mut self, data: InstructionData, result_ty: Option<Type>) -> Inst {
        let inst = self.insts.push(data);
        if let Some(ty) = result_ty {
            let v = self.values.push(ValueData::Inst { ty, inst });
            self.results[inst] = v.into();
        }
        inst
    }

    /// Rewrite the operands and block references of a deferred instruction
    /// and register its uses.
    pub fn finalize_operands(
        &mut self,
        inst: Inst,
        mut value_map: impl FnMut(Value) -> Value,
        mut block_map: impl FnMut(Block) -> Block,
    ) {
        self.insts[inst].map_arguments(&mut value_map);
        self.insts[inst].map_blocks(&mut block_map);
        for arg in self.insts[inst].arguments() {
            self.uses[arg].push(inst);
        }
    }

    /// Replace the full instruction data of `inst`, keeping use lists
    /// consistent. The result value (if any) is preserved.
    pub fn replace_inst_data(&mut self, inst: Inst, data: InstructionData) {
        self.detach_operands(inst);
        self.insts[inst] = data;
        for arg in self.insts[inst].arguments() {
            self.uses[arg].push(inst);
        }
    }
}

impl Default for DataFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instructions::Opcode;
    use crate::ir::types::TypeStore;

    #[test]
    fn use_lists_track_occurrences() {
        let mut types = TypeStore::new();
        let mut pool = ConstantPool::new();
        let mut dfg = DataFlowGraph::new();
        let i32t = types.int(32);

        let a = dfg.iconst(&mut pool, i32t, 1);
        // a + a: the use list of `a` must hold the adder twice.
        let add = dfg.make_inst(
            InstructionData::Binary {
                opcode: Opcode::Add,
                args: [a, a],
            },
            Some(i32t),
        );
        assert_eq!(dfg.uses(a), &[add, add]);

        let b = dfg.iconst(&mut pool, i32t, 2);
        dfg.replace_uses(a, b);
        assert!(dfg.uses(a).is_empty());
        assert_eq!(dfg.uses(b), &[add, add]);
        assert_eq!(dfg.inst(add).arguments().as_slice(), &[b, b]);

        dfg.detach_operands(add);
        assert_eq!(dfg.uses(b), &[add]);
        dfg.detach_operands(add);
        assert!(dfg.uses(b).is_empty());
    }

    #[test]
    fn constants_are_canonical() {
        let mut types = TypeStore::new();
        let mut pool = ConstantPool::new();
        let mut dfg = DataFlowGraph::new();
        let i32t = types.int(32);
        let a = dfg.iconst(&mut pool, i32t, 5);
        let b = dfg.iconst(&mut pool, i32t, 5);
        assert_eq!(a, b);
        assert_eq!(dfg.value_type(a), i32t);
    }
}
