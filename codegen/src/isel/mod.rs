//! Instruction selection.
//!
//! Lowers an IR function to machine IR through a pattern-matched DAG.
//! Construction is two-phase — create every node first, patch operands
//! second — because the graph is cyclic across blocks (branches, φ).
//! Selection is a memoized minimum-cost tiling: each node's candidate
//! patterns pay their own cost plus the best cost of every operand the
//! tile does not absorb; absorbed operands are evicted from the cache so
//! they are only ever emitted inside the winning tile. Emission walks
//! each root in original instruction order with an idempotent
//! `emit_or_get`.
//!
//! φs lower to a virtual register plus one move per incoming edge,
//! inserted before the predecessor's terminator; critical-edge splitting
//! has run before this pass, so every such move spot is safe.

pub mod node;
pub mod pattern;

pub use self::node::{Node, NodeId, NodeKind, NodePayload};
pub use self::pattern::{MatchResult, Pattern};

use crate::flowgraph::ControlFlowGraph;
use crate::fx::FxHashMap;
use crate::ir::{
    Block, Constant, ConstantData, Context, FuncId, Function, Inst, InstructionData, Opcode,
    Type, Unit, Value, ValueData,
};
use crate::isa::TargetIsa;
use crate::mir::{
    MachFunction, MachInst, MachLabel, MachOperand, Reg, RegClass,
};
use crate::OptLevel;
use sable_entity::PrimaryMap;
use smallvec::{smallvec, SmallVec};

/// Run instruction selection on one function of `unit`.
pub fn run(unit: &Unit, id: FuncId, isa: &dyn TargetIsa, opt: OptLevel) -> MachFunction {
    let mut selector = Selector::new(unit, id, isa, opt);
    selector.build();
    selector.select_all();
    selector.emit_all();
    selector.insert_phi_moves();
    selector.mf
}

/// All the state of one instruction-selection run. Pattern callbacks see
/// this type directly.
pub struct Selector<'a> {
    /// The whole unit, for callee and global symbol names.
    pub unit: &'a Unit,
    /// The function being lowered.
    pub func: &'a Function,
    /// The unit's interning context (read-only here).
    pub ctx: &'a Context,
    /// The target.
    pub isa: &'a dyn TargetIsa,
    /// The optimisation level patterns are filtered by.
    pub opt: OptLevel,
    /// The machine function under construction.
    pub mf: MachFunction,

    graph: PrimaryMap<NodeId, Node>,
    /// Ordered instruction nodes per IR block.
    roots: FxHashMap<Block, Vec<NodeId>>,
    /// IR block -> machine block.
    block_map: FxHashMap<Block, MachLabel>,

    // Interning tables for value nodes.
    inst_nodes: FxHashMap<Inst, NodeId>,
    register_nodes: FxHashMap<Value, NodeId>,
    const_int_nodes: FxHashMap<(i64, Type), NodeId>,
    const_float_nodes: FxHashMap<(u64, Type), NodeId>,
    frame_nodes: FxHashMap<(u32, Type), NodeId>,
    global_nodes: FxHashMap<Value, NodeId>,
    arg_nodes: FxHashMap<u16, NodeId>,

    /// Memoized pattern choice; `None` is the in-progress sentinel that
    /// breaks recursion.
    best: FxHashMap<NodeId, Option<MatchResult>>,
    /// Idempotent emission cache.
    emitted: FxHashMap<NodeId, MachOperand>,
    /// Virtual registers backing Register nodes.
    node_vregs: FxHashMap<NodeId, Reg>,

    /// Argument register per parameter index (`None` = on the stack).
    arg_regs: Vec<Option<Reg>>,
    /// Frame slots for stack-passed parameters, created on demand.
    stack_arg_slots: FxHashMap<u16, u32>,

    /// Emission cursor: the current machine block and an optional
    /// insertion index (append when `None`).
    cur_block: MachLabel,
    insert_at: Option<usize>,
    /// The root whose tile is currently being built.
    cur_root: Option<Block>,
}

impl<'a> Selector<'a> {
    fn new(unit: &'a Unit, id: FuncId, isa: &'a dyn TargetIsa, opt: OptLevel) -> Self {
        let func = &unit.functions[id];
        let ctx = &unit.ctx;
        let mut mf = MachFunction::new(func.name.clone());

        // Parallel machine blocks with the IR CFG's edges.
        let cfg = ControlFlowGraph::with_function(func);
        let mut block_map = FxHashMap::default();
        for block in func.layout.blocks() {
            block_map.insert(block, mf.add_block());
        }
        for block in func.layout.blocks() {
            let label = block_map[&block];
            for &succ in cfg.succs(block) {
                let sl = block_map[&succ];
                mf.blocks[label].succs.push(sl);
                mf.blocks[sl].preds.push(label);
            }
        }

        // Assign argument registers in declaration order; leftovers live
        // on the stack. By-value parameters always live on the stack.
        let mut int_next = 0;
        let mut float_next = 0;
        let mut arg_regs = Vec::with_capacity(func.params.len());
        for &param in &func.params {
            let by_val = func.dfg.param_flags(param).by_val;
            let ty = func.dfg.value_type(param);
            let reg = if by_val {
                None
            } else if ctx.types.is_float(ty) {
                let r = isa.float_arg_regs().get(float_next).copied();
                float_next += 1;
                r
            } else {
                let r = isa.int_arg_regs().get(int_next).copied();
                int_next += 1;
                r
            };
            if let Some(r) = reg {
                mf.live_ins.push(r);
            }
            arg_regs.push(reg);
        }

        let entry = MachLabel::from_u32(0);
        Self {
            unit,
            func,
            ctx,
            isa,
            opt,
            mf,
            graph: PrimaryMap::new(),
            roots: FxHashMap::default(),
            block_map,
            inst_nodes: FxHashMap::default(),
            register_nodes: FxHashMap::default(),
            const_int_nodes: FxHashMap::default(),
            const_float_nodes: FxHashMap::default(),
            frame_nodes: FxHashMap::default(),
            global_nodes: FxHashMap::default(),
            arg_nodes: FxHashMap::default(),
            best: FxHashMap::default(),
            emitted: FxHashMap::default(),
            node_vregs: FxHashMap::default(),
            arg_regs,
            stack_arg_slots: FxHashMap::default(),
            cur_block: entry,
            insert_at: None,
            cur_root: None,
        }
    }

    // Queries used by pattern callbacks.

    /// The node table entry for `n`.
    pub fn node(&self, n: NodeId) -> &Node {
        &self.graph[n]
    }

    /// Operand `i` of `n`.
    pub fn operand(&self, n: NodeId, i: usize) -> NodeId {
        self.graph[n].operands[i]
    }

    /// Number of operands of `n`.
    pub fn num_operands(&self, n: NodeId) -> usize {
        self.graph[n].operands.len()
    }

    /// The constant payload of `n` when it is a `ConstInt` node.
    pub fn const_int(&self, n: NodeId) -> Option<i64> {
        match self.graph[n].kind {
            NodeKind::ConstInt => self.graph[n].imm(),
            _ => None,
        }
    }

    /// The block-target payload of a branch or φ node.
    pub fn blocks(&self, n: NodeId) -> &[Block] {
        match &self.graph[n].payload {
            NodePayload::Blocks(blocks) => blocks,
            _ => &[],
        }
    }

    /// The field register nodes of a `MultiValue` node.
    pub fn multi_fields(&self, n: NodeId) -> SmallVec<[NodeId; 4]> {
        match &self.graph[n].payload {
            NodePayload::Multi(fields) => fields.clone(),
            _ => panic!("multi_fields on a non-multi node"),
        }
    }

    /// Size in bytes of a type.
    pub fn type_size(&self, ty: Type) -> u8 {
        self.isa.data_layout().size(&self.ctx.types, ty).max(1) as u8
    }

    /// Is `ty` a float type?
    pub fn is_float(&self, ty: Type) -> bool {
        self.ctx.types.is_float(ty)
    }

    /// Register class for a type.
    pub fn class_of(&self, ty: Type) -> RegClass {
        if self.is_float(ty) {
            RegClass::Float
        } else {
            RegClass::Int
        }
    }

    /// The machine label of an IR block.
    pub fn label(&self, block: Block) -> MachLabel {
        self.block_map[&block]
    }

    /// The argument register of parameter `index`, if it has one.
    pub fn arg_reg(&self, index: u16) -> Option<Reg> {
        self.arg_regs.get(index as usize).copied().flatten()
    }

    /// The frame slot of stack-passed parameter `index`, created on
    /// first use at its fixed positive offset.
    pub fn stack_arg_slot(&mut self, index: u16) -> u32 {
        if let Some(&slot) = self.stack_arg_slots.get(&index) {
            return slot;
        }
        // Stack parameters sit above the saved frame pointer and return
        // address, 8 bytes each in declaration order.
        let position = self
            .arg_regs
            .iter()
            .take(index as usize)
            .filter(|r| r.is_none())
            .count() as i32;
        let slot = self.mf.frame.add_slot_at(8, 8, 16 + 8 * position);
        self.stack_arg_slots.insert(index, slot);
        slot
    }

    /// The fixed frame offset of by-value parameter `index`: a base of
    /// `-16`, lowered by the size of every preceding by-value argument,
    /// so all callees see a uniform layout.
    pub fn byval_stack_offset(&self, index: u16) -> i32 {
        let dl = self.isa.data_layout();
        let mut offset = -16i32;
        for &p in self.func.params.iter().take(index as usize) {
            if !self.func.dfg.param_flags(p).by_val {
                continue;
            }
            let pty = self.func.dfg.value_type(p);
            let pointee = self.ctx.types.pointee(pty).unwrap_or(pty);
            offset -= dl.size(&self.ctx.types, pointee) as i32;
        }
        offset
    }

    /// The virtual register backing a `Register` node (allocated on first
    /// request).
    pub fn vreg(&mut self, n: NodeId) -> Reg {
        if let Some(&r) = self.node_vregs.get(&n) {
            return r;
        }
        let ty = self.graph[n].ty;
        let class = self.class_of(ty);
        let size = self.type_size(ty);
        let r = self.mf.new_vreg(class, size);
        self.node_vregs.insert(n, r);
        r
    }

    /// The result register node of an instruction node.
    pub fn result_node(&self, n: NodeId) -> NodeId {
        self.graph[n].result.expect("node has no result")
    }

    /// Append (or insert at the cursor) one machine instruction.
    pub fn push(&mut self, inst: MachInst) {
        let block = &mut self.mf.blocks[self.cur_block];
        match &mut self.insert_at {
            None => block.insts.push(inst),
            Some(i) => {
                block.insts.insert(*i, inst);
                *i += 1;
            }
        }
    }

    /// The symbol name of a function in the unit.
    pub fn func_name(&self, f: FuncId) -> String {
        self.unit.functions[f].name.clone()
    }

    /// The symbol name of a global in the unit.
    pub fn global_name(&self, g: crate::ir::GlobalVar) -> String {
        self.unit.globals[g].name.clone()
    }

    /// Emit the machine code for `n` (through its selected pattern) or
    /// return the cached operand from a previous emission.
    ///
    /// A node that was evicted from the selection cache because a tile
    /// absorbed it, but that another user still asks for, is re-selected
    /// here and emitted standalone.
    pub fn emit_or_get(&mut self, n: NodeId) -> MachOperand {
        if let Some(op) = self.emitted.get(&n) {
            return op.clone();
        }
        if !self.best.contains_key(&n) {
            self.select(n);
        }
        let Some(Some(mr)) = self.best.get(&n).copied() else {
            panic!(
                "no pattern selected for node kind {:?} in {}",
                self.graph[n].kind, self.mf.name
            );
        };
        let op = (mr.pattern.emit)(self, n);
        self.emitted.insert(n, op.clone());
        op
    }

    /// Intern a float literal in the machine function's constant pool.
    pub fn float_pool_index(&mut self, bits: u64, size: u8) -> u32 {
        self.mf.add_constant(bits, size)
    }

    // Construction.

    fn build(&mut self) {
        for block in self.func.layout.blocks() {
            self.roots.insert(block, Vec::new());
        }
        for block in self.func.layout.blocks() {
            self.cur_root = Some(block);
            for &inst in self.func.layout.block_insts(block) {
                self.build_inst(block, inst);
            }
        }
        self.cur_root = None;
        for block in self.func.layout.blocks() {
            for &inst in self.func.layout.block_insts(block).to_vec().iter() {
                self.patch_inst(inst);
            }
        }
    }

    fn add_root_inst(&mut self, block: Block, mut node: Node) -> NodeId {
        node.root = block.into();
        let id = self.graph.push(node);
        self.roots.get_mut(&block).unwrap().push(id);
        id
    }

    /// Phase 1: create the node for one IR instruction, with no operands
    /// wired yet.
    fn build_inst(&mut self, block: Block, inst: Inst) {
        let data = self.func.dfg.inst(inst);
        let result = self.func.dfg.inst_result(inst);
        let void = {
            // Terminators and stores carry no meaningful type.
            result.map_or_else(|| self.ctx.types.lookup_void(), |r| self.func.dfg.value_type(r))
        };

        let kind = match data {
            InstructionData::Binary { opcode, .. } => match opcode {
                Opcode::Add => NodeKind::Add,
                Opcode::Sub => NodeKind::Sub,
                Opcode::IMul => NodeKind::IMul,
                Opcode::UMul => NodeKind::UMul,
                Opcode::FMul => NodeKind::FMul,
                Opcode::IDiv => NodeKind::IDiv,
                Opcode::UDiv => NodeKind::UDiv,
                Opcode::FDiv => NodeKind::FDiv,
                Opcode::IRem => NodeKind::IRem,
                Opcode::URem => NodeKind::URem,
                Opcode::Shl => NodeKind::Shl,
                Opcode::LShr => NodeKind::LShr,
                Opcode::AShr => NodeKind::AShr,
                Opcode::And => NodeKind::And,
                Opcode::Or => NodeKind::Or,
                Opcode::Xor => NodeKind::Xor,
                other => unreachable!("{other} in Binary format"),
            },
            InstructionData::IntCompare { cond, .. } => NodeKind::Icmp(*cond),
            InstructionData::FloatCompare { cond, .. } => NodeKind::Fcmp(*cond),
            InstructionData::Cast { opcode, .. } => match opcode {
                Opcode::Zext => NodeKind::Zext,
                Opcode::Sext => NodeKind::Sext,
                Opcode::Trunc => NodeKind::Trunc,
                Opcode::FpTrunc => NodeKind::FpTrunc,
                Opcode::FpExt => NodeKind::FpExt,
                Opcode::FpToSi => NodeKind::FpToSi,
                Opcode::FpToUi => NodeKind::FpToUi,
                Opcode::SiToFp => NodeKind::SiToFp,
                Opcode::UiToFp => NodeKind::UiToFp,
                // Only a type cast at this level.
                Opcode::PtrToInt | Opcode::IntToPtr | Opcode::Bitcast => NodeKind::GenericCast,
                other => unreachable!("{other} in Cast format"),
            },
            InstructionData::StackAlloc { ty } => {
                // Allocations become frame indices at construction.
                let dl = self.isa.data_layout();
                let size = dl.size(&self.ctx.types, *ty);
                let align = dl.alignment(&self.ctx.types, *ty);
                let slot = self.mf.frame.add_slot(size.max(1), align.max(1));
                let result_ty = self.func.dfg.value_type(result.unwrap());
                let node = self.frame_node(slot, result_ty);
                self.inst_nodes.insert(inst, node);
                return;
            }
            InstructionData::Load { .. } => NodeKind::Load,
            InstructionData::Store { .. } => NodeKind::Store,
            InstructionData::GetElementPtr { .. } => NodeKind::Gep,
            InstructionData::ExtractValue { index, .. } => {
                let node = Node::new(NodeKind::ExtractValue, void)
                    .with_payload(NodePayload::Index(*index));
                let id = self.add_root_inst(block, node);
                self.inst_nodes.insert(inst, id);
                return;
            }
            InstructionData::Call { .. } => NodeKind::Call,
            InstructionData::Ret { .. } => NodeKind::Ret,
            InstructionData::Jump { dest } => {
                let node = Node::new(NodeKind::Jump, void)
                    .with_payload(NodePayload::Blocks(smallvec![*dest]));
                let id = self.add_root_inst(block, node);
                self.inst_nodes.insert(inst, id);
                return;
            }
            InstructionData::CondJump {
                then_dest,
                else_dest,
                ..
            } => {
                let node = Node::new(NodeKind::Jump, void)
                    .with_payload(NodePayload::Blocks(smallvec![*then_dest, *else_dest]));
                let id = self.add_root_inst(block, node);
                self.inst_nodes.insert(inst, id);
                return;
            }
            InstructionData::Switch {
                default, cases, ..
            } => {
                let mut blocks: SmallVec<[Block; 2]> = smallvec![*default];
                blocks.extend(cases.iter().map(|&(_, b)| b));
                let node = Node::new(NodeKind::Switch, void)
                    .with_payload(NodePayload::Blocks(blocks));
                let id = self.add_root_inst(block, node);
                self.inst_nodes.insert(inst, id);
                return;
            }
            InstructionData::Phi { pairs } => {
                let blocks: SmallVec<[Block; 2]> =
                    pairs.iter().map(|&(_, b)| b).collect();
                let mut node = Node::new(NodeKind::Phi, void)
                    .with_payload(NodePayload::Blocks(blocks));
                node.result = self.register_node(result.unwrap()).into();
                let id = self.add_root_inst(block, node);
                self.inst_nodes.insert(inst, id);
                return;
            }
        };

        let mut node = Node::new(kind, void);
        if let Some(result) = result {
            let ty = self.func.dfg.value_type(result);
            if self.ctx.types.is_struct(ty) {
                node.result = self.multi_value_node(result, ty).into();
            } else {
                node.result = self.register_node(result).into();
            }
        }
        let id = self.add_root_inst(block, node);
        self.inst_nodes.insert(inst, id);
    }

    /// Phase 2: wire the operands of one IR instruction's node from the
    /// value mapping.
    fn patch_inst(&mut self, inst: Inst) {
        let Some(&id) = self.inst_nodes.get(&inst) else {
            return; // allocations have no instruction node
        };
        if self.graph[id].kind == NodeKind::FrameIndex {
            return;
        }
        self.cur_root = self.func.layout.inst_block(inst);

        let data = self.func.dfg.inst(inst).clone();
        let args: Vec<Value> = match &data {
            // φ operands are the incoming values; blocks live in the
            // payload.
            InstructionData::Phi { pairs } => pairs.iter().map(|&(v, _)| v).collect(),
            InstructionData::Switch { cond, cases, .. } => {
                let mut v = vec![*cond];
                v.extend(cases.iter().map(|&(c, _)| c));
                v
            }
            other => other.arguments().to_vec(),
        };
        let nodes: SmallVec<[NodeId; 4]> =
            args.iter().map(|&v| self.build_value(v)).collect();
        self.graph[id].operands = nodes;
        self.cur_root = None;
    }

    /// The node standing for an IR value, created on first use.
    fn build_value(&mut self, value: Value) -> NodeId {
        match *self.func.dfg.value_def(value) {
            ValueData::Inst { inst, .. } => self.inst_nodes[&inst],
            ValueData::Param { ty, index, flags } => {
                if let Some(&n) = self.arg_nodes.get(&index) {
                    return n;
                }
                let n = if flags.by_val {
                    // By-value parameters see a caller-created slot at a
                    // fixed offset below the frame pointer.
                    let dl = self.isa.data_layout();
                    let pointee = self.ctx.types.pointee(ty).unwrap_or(ty);
                    let size = dl.size(&self.ctx.types, pointee);
                    let align = dl.alignment(&self.ctx.types, pointee);
                    let offset = self.byval_stack_offset(index);
                    let slot = self.mf.frame.add_slot_at(size, align.max(1), offset);
                    self.frame_node(slot, ty)
                } else {
                    let node = Node::new(NodeKind::FuncArg, ty)
                        .with_payload(NodePayload::Arg(index));
                    self.add_value_node(node)
                };
                self.arg_nodes.insert(index, n);
                n
            }
            ValueData::Const { ty, constant } => self.constant_node(constant, ty),
            ValueData::Global { ty, global } => {
                if let Some(&n) = self.global_nodes.get(&value) {
                    return n;
                }
                let node = Node::new(NodeKind::GlobalAddr, ty)
                    .with_payload(NodePayload::Global(global));
                let n = self.add_value_node(node);
                self.global_nodes.insert(value, n);
                n
            }
            ValueData::FuncAddr { ty, func } => {
                if let Some(&n) = self.global_nodes.get(&value) {
                    return n;
                }
                let node =
                    Node::new(NodeKind::GlobalAddr, ty).with_payload(NodePayload::Func(func));
                let n = self.add_value_node(node);
                self.global_nodes.insert(value, n);
                n
            }
            ValueData::Undef { ty } => {
                // Undef lowers to zero.
                if self.ctx.types.is_float(ty) {
                    self.const_float_node(0, ty)
                } else {
                    self.const_int_node(0, ty)
                }
            }
        }
    }

    fn constant_node(&mut self, constant: Constant, ty: Type) -> NodeId {
        let pooled = self.ctx.constants.resolve(constant);
        match pooled.data {
            ConstantData::Int(v) => self.const_int_node(v, ty),
            ConstantData::Float(bits) => self.const_float_node(bits, ty),
            ConstantData::Null => self.const_int_node(0, ty),
            ConstantData::Undef => self.const_int_node(0, ty),
            ConstantData::GlobalAddr { global, .. } => {
                let node = Node::new(NodeKind::GlobalAddr, ty)
                    .with_payload(NodePayload::Global(global));
                self.add_value_node(node)
            }
            ConstantData::Bytes(_) | ConstantData::Aggregate(_) => {
                panic!("aggregate constant used as an operand")
            }
        }
    }

    fn add_value_node(&mut self, mut node: Node) -> NodeId {
        node.root = self.cur_root.into();
        self.graph.push(node)
    }

    fn const_int_node(&mut self, v: i64, ty: Type) -> NodeId {
        if let Some(&n) = self.const_int_nodes.get(&(v, ty)) {
            return n;
        }
        let node = Node::new(NodeKind::ConstInt, ty).with_payload(NodePayload::Imm(v));
        let n = self.add_value_node(node);
        self.const_int_nodes.insert((v, ty), n);
        n
    }

    fn const_float_node(&mut self, bits: u64, ty: Type) -> NodeId {
        if let Some(&n) = self.const_float_nodes.get(&(bits, ty)) {
            return n;
        }
        let node = Node::new(NodeKind::ConstFloat, ty).with_payload(NodePayload::FloatBits(bits));
        let n = self.add_value_node(node);
        self.const_float_nodes.insert((bits, ty), n);
        n
    }

    fn frame_node(&mut self, slot: u32, ty: Type) -> NodeId {
        if let Some(&n) = self.frame_nodes.get(&(slot, ty)) {
            return n;
        }
        let node = Node::new(NodeKind::FrameIndex, ty).with_payload(NodePayload::Frame(slot));
        let n = self.add_value_node(node);
        self.frame_nodes.insert((slot, ty), n);
        n
    }

    fn register_node(&mut self, value: Value) -> NodeId {
        if let Some(&n) = self.register_nodes.get(&value) {
            return n;
        }
        let ty = self.func.dfg.value_type(value);
        let node = Node::new(NodeKind::Register, ty);
        let n = self.add_value_node(node);
        self.register_nodes.insert(value, n);
        n
    }

    fn multi_value_node(&mut self, value: Value, ty: Type) -> NodeId {
        if let Some(&n) = self.register_nodes.get(&value) {
            return n;
        }
        let fields: Vec<Type> = self
            .ctx
            .types
            .struct_fields(ty)
            .expect("multi-value over non-struct")
            .to_vec();
        let field_nodes: SmallVec<[NodeId; 4]> = fields
            .iter()
            .map(|&f| {
                assert!(
                    !self.ctx.types.is_aggregate(f),
                    "nested aggregate in multi-value result"
                );
                self.add_value_node(Node::new(NodeKind::Register, f))
            })
            .collect();
        let node = Node::new(NodeKind::MultiValue, ty).with_payload(NodePayload::Multi(field_nodes));
        let n = self.add_value_node(node);
        self.register_nodes.insert(value, n);
        n
    }

    // Selection.

    fn select_all(&mut self) {
        for block in self.func.layout.blocks().collect::<Vec<_>>() {
            for n in self.roots[&block].clone() {
                if let Some(result) = self.graph[n].result.expand() {
                    self.select(result);
                }
                self.select(n);
            }
        }
    }

    fn select(&mut self, n: NodeId) {
        if self.best.contains_key(&n) {
            return;
        }
        // Sentinel breaks recursion through cyclic operands.
        self.best.insert(n, None);

        let patterns = self.isa.instruction_info().patterns(self.graph[n].kind);
        if patterns.is_empty() {
            self.best.remove(&n);
            return;
        }

        let mut candidates: SmallVec<[(usize, u32); 4]> = SmallVec::new();
        for (pi, pattern) in patterns.iter().enumerate() {
            if self.opt < pattern.min_opt || !(pattern.matches)(self, n) {
                continue;
            }
            let mut cost = pattern.cost;
            for i in 0..self.graph[n].operands.len() {
                let op = self.graph[n].operands[i];
                if pattern.covered.contains(&i) && self.graph[op].root == self.graph[n].root {
                    // Absorbed into the tile, no extra cost.
                    continue;
                }
                self.select(op);
                if let Some(Some(mr)) = self.best.get(&op) {
                    cost += mr.cost;
                }
            }
            candidates.push((pi, cost));
        }

        let Some(&(pi, cost)) = candidates.iter().min_by_key(|&&(_, c)| c) else {
            panic!(
                "no pattern matched node kind {:?} for {}",
                self.graph[n].kind, self.mf.name
            );
        };
        let pattern = &patterns[pi];

        // Evict absorbed operands so they are only emitted inside this
        // tile.
        for &i in pattern.covered {
            if let Some(&op) = self.graph[n].operands.get(i) {
                if self.graph[op].root == self.graph[n].root {
                    self.best.remove(&op);
                }
            }
        }

        self.best.insert(n, Some(MatchResult { pattern, cost }));
    }

    // Emission.

    fn emit_all(&mut self) {
        for block in self.func.layout.blocks().collect::<Vec<_>>() {
            self.cur_block = self.block_map[&block];
            self.insert_at = None;
            for n in self.roots[&block].clone() {
                if matches!(self.best.get(&n), Some(Some(_))) {
                    self.emit_or_get(n);
                }
            }
        }
    }

    /// Lower every φ to moves in its predecessors, before their
    /// terminators. Constants that need materialisation are re-emitted per
    /// edge rather than pulled from the cross-block cache.
    fn insert_phi_moves(&mut self) {
        for block in self.func.layout.blocks().collect::<Vec<_>>() {
            for &inst in self.func.layout.block_insts(block).to_vec().iter() {
                let InstructionData::Phi { pairs } = self.func.dfg.inst(inst).clone() else {
                    continue;
                };
                let phi_node = self.inst_nodes[&inst];
                let dst_node = self.result_node(phi_node);
                let dst = self.vreg(dst_node);
                let ty = self.graph[dst_node].ty;
                let class = self.class_of(ty);
                let size = self.type_size(ty);

                for (value, pred) in pairs {
                    let pred_label = self.block_map[&pred];
                    self.cur_block = pred_label;
                    self.insert_at = Some(self.before_terminator_index(pred_label));

                    let src_node = self.build_value(value);
                    let src = match self.graph[src_node].kind {
                        // Materialising kinds are re-emitted inside this
                        // predecessor: a cached emission could live in a
                        // block that doesn't dominate this edge.
                        NodeKind::ConstFloat | NodeKind::GlobalAddr | NodeKind::FuncArg => {
                            self.emit_fresh(src_node)
                        }
                        _ => self.emit_or_get(src_node),
                    };

                    match src {
                        MachOperand::Reg { reg, .. } if reg == dst => {}
                        MachOperand::Reg { reg, .. } => {
                            let mv = self.isa.reg_move(class, size, dst, reg);
                            self.push(mv);
                        }
                        MachOperand::Imm { value, .. } => {
                            let mv = self.isa.imm_move(size, dst, value);
                            self.push(mv);
                        }
                        MachOperand::FrameIndex { index } => {
                            let mv = self.isa.frame_addr(dst, index);
                            self.push(mv);
                        }
                        other => panic!("unexpected phi move source {other:?}"),
                    }
                    self.insert_at = None;
                }
            }
        }
    }

    /// Emit a node through its pattern without consulting or filling the
    /// cross-block emission cache.
    fn emit_fresh(&mut self, n: NodeId) -> MachOperand {
        if self.best.get(&n).is_none() {
            self.select(n);
        }
        let Some(Some(mr)) = self.best.get(&n).copied() else {
            panic!("no pattern selected for phi operand");
        };
        (mr.pattern.emit)(self, n)
    }

    fn before_terminator_index(&self, label: MachLabel) -> usize {
        let info = self.isa.instruction_info();
        let insts = &self.mf.blocks[label].insts;
        let mut idx = insts.len();
        while idx > 0 && info.desc(insts[idx - 1].opcode).is_terminator {
            idx -= 1;
        }
        idx
    }
}
