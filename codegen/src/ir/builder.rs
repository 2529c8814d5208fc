//! Instruction builder.
//!
//! The builder holds a mutable insertion cursor into one function. Every
//! `create`-style method either returns a folded constant — in which case
//! the cursor does *not* move — or appends a new instruction at the cursor
//! and advances past it, so chained calls build a straight-line sequence.

use crate::constant_folder;
use crate::ir::condcodes::{FloatCC, IntCC};
use crate::ir::constants::ConstantData;
use crate::ir::dfg::ValueData;
use crate::ir::entities::{Block, FuncId, GlobalVar, Inst, Type, Value};
use crate::ir::function::Function;
use crate::ir::instructions::{InstructionData, Opcode};
use crate::ir::unit::Context;
use crate::ir::TypeData;

/// Where the next instruction will be inserted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Position {
    /// Not pointing anywhere; no instructions can be inserted.
    Nowhere,
    /// Insert into `block` at instruction index `index`.
    At {
        /// Target block.
        block: Block,
        /// Index the next instruction is inserted at.
        index: usize,
    },
}

/// An instruction builder positioned inside a function.
pub struct Builder<'a> {
    /// The function being built.
    pub func: &'a mut Function,
    /// The unit's interning context.
    pub ctx: &'a mut Context,
    pos: Position,
}

impl<'a> Builder<'a> {
    /// Create a builder for `func` with an unset cursor.
    pub fn new(func: &'a mut Function, ctx: &'a mut Context) -> Self {
        Self {
            func,
            ctx,
            pos: Position::Nowhere,
        }
    }

    // Cursor control.

    /// The block the cursor points into, if any.
    pub fn current_block(&self) -> Option<Block> {
        match self.pos {
            Position::Nowhere => None,
            Position::At { block, .. } => Some(block),
        }
    }

    /// Position the cursor at the end of `block`.
    pub fn switch_to_block(&mut self, block: Block) {
        debug_assert!(self.func.layout.is_block_inserted(block));
        self.pos = Position::At {
            block,
            index: self.func.layout.block_insts(block).len(),
        };
    }

    /// Position the cursor so the next instruction is inserted immediately
    /// before `inst`.
    pub fn goto_before(&mut self, inst: Inst) {
        let block = self
            .func
            .layout
            .inst_block(inst)
            .expect("instruction not inserted");
        self.pos = Position::At {
            block,
            index: self.func.layout.inst_pos(inst),
        };
    }

    /// Position the cursor so the next instruction is inserted immediately
    /// after `inst`.
    pub fn goto_after(&mut self, inst: Inst) {
        self.goto_before(inst);
        if let Position::At { index, .. } = &mut self.pos {
            *index += 1;
        }
    }

    /// Mint a new block and append it at the end of the function.
    pub fn create_block(&mut self) -> Block {
        let block = self.func.layout.make_block();
        self.func.layout.append_block(block);
        block
    }

    /// Mint a new block and place it right after `after`.
    pub fn create_block_after(&mut self, after: Block) -> Block {
        let block = self.func.layout.make_block();
        self.func.layout.insert_block_after(block, after);
        block
    }

    /// Mint a new block and place it right before `before`.
    pub fn create_block_before(&mut self, before: Block) -> Block {
        let block = self.func.layout.make_block();
        self.func.layout.insert_block_before(block, before);
        block
    }

    fn build(&mut self, data: InstructionData, result_ty: Option<Type>) -> Inst {
        let Position::At { block, index } = self.pos else {
            panic!("builder cursor is not positioned in a block");
        };
        let inst = self.func.dfg.make_inst(data, result_ty);
        self.func.layout.insert_inst(inst, block, index);
        self.pos = Position::At {
            block,
            index: index + 1,
        };
        inst
    }

    fn build_value(&mut self, data: InstructionData, result_ty: Type) -> Value {
        let inst = self.build(data, Some(result_ty));
        self.func.dfg.inst_result(inst).unwrap()
    }

    // Constants and other materialised values. These never touch the
    // cursor.

    /// An integer constant of type `ty`.
    pub fn iconst(&mut self, ty: Type, imm: i64) -> Value {
        self.func.dfg.iconst(&mut self.ctx.constants, ty, imm)
    }

    /// A float constant of type `ty`.
    pub fn fconst(&mut self, ty: Type, imm: f64) -> Value {
        let bits = self.ctx.types.bits(ty).expect("fconst on non-float type");
        let pattern = if bits == 32 {
            u64::from((imm as f32).to_bits())
        } else {
            imm.to_bits()
        };
        self.func.dfg.fconst(&mut self.ctx.constants, ty, pattern)
    }

    /// The null pointer of type `ty`.
    pub fn null(&mut self, ty: Type) -> Value {
        debug_assert!(self.ctx.types.is_ptr(ty));
        let c = self.ctx.constants.intern(ConstantData::Null, ty);
        self.func.dfg.constant_value(&self.ctx.constants, c)
    }

    /// An undefined value of type `ty`.
    pub fn undef(&mut self, ty: Type) -> Value {
        self.func.dfg.undef(ty)
    }

    /// The address of global `gv` (a pointer to its pointee type).
    pub fn global_addr(&mut self, gv: GlobalVar, pointee: Type) -> Value {
        let ty = self.ctx.types.ptr(pointee);
        self.func.dfg.global_addr(ty, gv)
    }

    /// The address of function `func` with signature type `sig`.
    pub fn func_addr(&mut self, func: FuncId, sig: Type) -> Value {
        let ty = self.ctx.types.ptr(sig);
        self.func.dfg.func_addr(ty, func)
    }

    // Arithmetic. Each folds when both operands are constants.

    fn binary(&mut self, opcode: Opcode, lhs: Value, rhs: Value) -> Value {
        if let Some(v) = constant_folder::binary(self.ctx, &mut self.func.dfg, opcode, lhs, rhs) {
            return v;
        }
        let ty = self.func.dfg.value_type(lhs);
        self.build_value(
            InstructionData::Binary {
                opcode,
                args: [lhs, rhs],
            },
            ty,
        )
    }

    /// Integer or float addition.
    pub fn add(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::Add, lhs, rhs)
    }

    /// Integer or float subtraction.
    pub fn sub(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::Sub, lhs, rhs)
    }

    /// Signed integer multiplication.
    pub fn imul(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::IMul, lhs, rhs)
    }

    /// Unsigned integer multiplication.
    pub fn umul(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::UMul, lhs, rhs)
    }

    /// Float multiplication.
    pub fn fmul(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::FMul, lhs, rhs)
    }

    /// Signed integer division.
    pub fn idiv(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::IDiv, lhs, rhs)
    }

    /// Unsigned integer division.
    pub fn udiv(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::UDiv, lhs, rhs)
    }

    /// Float division.
    pub fn fdiv(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::FDiv, lhs, rhs)
    }

    /// Signed integer remainder.
    pub fn irem(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::IRem, lhs, rhs)
    }

    /// Unsigned integer remainder.
    pub fn urem(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::URem, lhs, rhs)
    }

    /// Left shift.
    pub fn shl(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::Shl, lhs, rhs)
    }

    /// Logical right shift.
    pub fn lshr(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::LShr, lhs, rhs)
    }

    /// Arithmetic right shift.
    pub fn ashr(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::AShr, lhs, rhs)
    }

    /// Bitwise and.
    pub fn band(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::And, lhs, rhs)
    }

    /// Bitwise or.
    pub fn bor(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::Or, lhs, rhs)
    }

    /// Bitwise exclusive or.
    pub fn bxor(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::Xor, lhs, rhs)
    }

    /// Integer comparison producing an `i1`.
    pub fn icmp(&mut self, cond: IntCC, lhs: Value, rhs: Value) -> Value {
        if let Some(v) = constant_folder::icmp(self.ctx, &mut self.func.dfg, cond, lhs, rhs) {
            return v;
        }
        let i1 = self.ctx.types.int(1);
        self.build_value(
            InstructionData::IntCompare {
                cond,
                args: [lhs, rhs],
            },
            i1,
        )
    }

    /// Float comparison producing an `i1`.
    pub fn fcmp(&mut self, cond: FloatCC, lhs: Value, rhs: Value) -> Value {
        if let Some(v) = constant_folder::fcmp(self.ctx, &mut self.func.dfg, cond, lhs, rhs) {
            return v;
        }
        let i1 = self.ctx.types.int(1);
        self.build_value(
            InstructionData::FloatCompare {
                cond,
                args: [lhs, rhs],
            },
            i1,
        )
    }

    // Casts.

    fn cast(&mut self, opcode: Opcode, arg: Value, ty: Type) -> Value {
        if let Some(v) = constant_folder::cast(self.ctx, &mut self.func.dfg, opcode, arg, ty) {
            return v;
        }
        self.build_value(InstructionData::Cast { opcode, arg, ty }, ty)
    }

    /// Zero-extend to a strictly wider integer type.
    pub fn zext(&mut self, arg: Value, ty: Type) -> Value {
        self.cast(Opcode::Zext, arg, ty)
    }

    /// Sign-extend to a strictly wider integer type.
    pub fn sext(&mut self, arg: Value, ty: Type) -> Value {
        self.cast(Opcode::Sext, arg, ty)
    }

    /// Truncate to a strictly narrower integer type.
    pub fn trunc(&mut self, arg: Value, ty: Type) -> Value {
        self.cast(Opcode::Trunc, arg, ty)
    }

    /// Demote a float.
    pub fn fptrunc(&mut self, arg: Value, ty: Type) -> Value {
        self.cast(Opcode::FpTrunc, arg, ty)
    }

    /// Promote a float.
    pub fn fpext(&mut self, arg: Value, ty: Type) -> Value {
        self.cast(Opcode::FpExt, arg, ty)
    }

    /// Float to signed integer.
    pub fn fptosi(&mut self, arg: Value, ty: Type) -> Value {
        self.cast(Opcode::FpToSi, arg, ty)
    }

    /// Float to unsigned integer.
    pub fn fptoui(&mut self, arg: Value, ty: Type) -> Value {
        self.cast(Opcode::FpToUi, arg, ty)
    }

    /// Signed integer to float.
    pub fn sitofp(&mut self, arg: Value, ty: Type) -> Value {
        self.cast(Opcode::SiToFp, arg, ty)
    }

    /// Unsigned integer to float.
    pub fn uitofp(&mut self, arg: Value, ty: Type) -> Value {
        self.cast(Opcode::UiToFp, arg, ty)
    }

    /// Pointer to integer.
    pub fn ptrtoint(&mut self, arg: Value, ty: Type) -> Value {
        self.cast(Opcode::PtrToInt, arg, ty)
    }

    /// Integer to pointer.
    pub fn inttoptr(&mut self, arg: Value, ty: Type) -> Value {
        self.cast(Opcode::IntToPtr, arg, ty)
    }

    /// Same-size reinterpretation.
    pub fn bitcast(&mut self, arg: Value, ty: Type) -> Value {
        self.cast(Opcode::Bitcast, arg, ty)
    }

    // Memory.

    /// Allocate a stack slot of type `ty`; the result is a pointer to it.
    pub fn alloca(&mut self, ty: Type) -> Value {
        let ptr = self.ctx.types.ptr(ty);
        self.build_value(InstructionData::StackAlloc { ty }, ptr)
    }

    /// Load through a pointer; the result has the pointee type.
    pub fn load(&mut self, ptr: Value) -> Value {
        let ty = self.func.dfg.value_type(ptr);
        let pointee = self.ctx.types.pointee(ty).expect("load from non-pointer");
        self.build_value(InstructionData::Load { arg: ptr }, pointee)
    }

    /// Store `value` through `ptr`.
    pub fn store(&mut self, ptr: Value, value: Value) -> Inst {
        self.build(
            InstructionData::Store {
                args: [ptr, value],
            },
            None,
        )
    }

    /// Address arithmetic: walk from `base` through `indices`.
    ///
    /// The first index steps through the pointer; later indices select
    /// array elements or (with a constant index) struct fields. The result
    /// is a pointer to the reached type.
    pub fn gep(&mut self, base: Value, indices: &[Value]) -> Value {
        let base_ty = self.func.dfg.value_type(base);
        let reached = self.gep_walk(base_ty, indices);
        let result_ty = self.ctx.types.ptr(reached);
        let mut args = Vec::with_capacity(1 + indices.len());
        args.push(base);
        args.extend_from_slice(indices);
        self.build_value(
            InstructionData::GetElementPtr {
                args,
                ty: result_ty,
            },
            result_ty,
        )
    }

    fn gep_walk(&mut self, base_ty: Type, indices: &[Value]) -> Type {
        let mut cur = self
            .ctx
            .types
            .pointee(base_ty)
            .expect("gep base is not a pointer");
        for &idx in &indices[1..] {
            cur = match self.ctx.types.resolve(cur).clone() {
                TypeData::Array { elem, .. } => elem,
                TypeData::Ptr(p) => p,
                TypeData::Struct(fields) => {
                    let c = self
                        .func
                        .dfg
                        .value_constant(idx)
                        .and_then(|c| self.ctx.constants.int_value(c))
                        .expect("struct gep index must be a constant int");
                    fields[c as usize]
                }
                _ => panic!("gep walks into a non-aggregate type"),
            };
        }
        cur
    }

    /// Read field `index` from a struct-typed value.
    pub fn extract_value(&mut self, agg: Value, index: u32) -> Value {
        let agg_ty = self.func.dfg.value_type(agg);
        let field_ty = self
            .ctx
            .types
            .struct_fields(agg_ty)
            .map(|fields| fields[index as usize])
            .expect("extract_value from non-struct");
        self.build_value(InstructionData::ExtractValue { arg: agg, index }, field_ty)
    }

    // Calls and terminators.

    /// Call `callee` with `args`. The callee is any value of
    /// pointer-to-function type: a `func_addr`, a loaded function pointer,
    /// or a parameter.
    pub fn call(&mut self, callee: Value, args: &[Value]) -> Option<Value> {
        let callee_ty = self.func.dfg.value_type(callee);
        let func_ty = self
            .ctx
            .types
            .pointee(callee_ty)
            .expect("callee is not a pointer to function");
        let ret = self.ctx.types.func_ret(func_ty).expect("bad callee type");
        let mut all = Vec::with_capacity(1 + args.len());
        all.push(callee);
        all.extend_from_slice(args);
        let data = InstructionData::Call {
            args: all,
            func_ty,
        };
        if self.ctx.types.is_void(ret) {
            self.build(data, None);
            None
        } else {
            Some(self.build_value(data, ret))
        }
    }

    /// Return, with an optional value.
    pub fn ret(&mut self, arg: Option<Value>) -> Inst {
        self.build(InstructionData::Ret { arg }, None)
    }

    /// Unconditional jump.
    pub fn jump(&mut self, dest: Block) -> Inst {
        self.build(InstructionData::Jump { dest }, None)
    }

    /// Conditional jump: a non-zero condition takes `then_dest`.
    ///
    /// Collapses to an unconditional jump when the condition is a constant
    /// or both targets agree.
    pub fn cond_jump(&mut self, cond: Value, then_dest: Block, else_dest: Block) -> Inst {
        if then_dest == else_dest {
            return self.jump(then_dest);
        }
        if let Some(v) = self
            .func
            .dfg
            .value_constant(cond)
            .and_then(|c| self.ctx.constants.int_value(c))
        {
            return self.jump(if v != 0 { then_dest } else { else_dest });
        }
        self.build(
            InstructionData::CondJump {
                cond,
                then_dest,
                else_dest,
            },
            None,
        )
    }

    /// Multi-way jump. Case values must be constant integers.
    pub fn switch(&mut self, cond: Value, default: Block, cases: &[(Value, Block)]) -> Inst {
        self.build(
            InstructionData::Switch {
                cond,
                default,
                cases: cases.to_vec(),
            },
            None,
        )
    }

    /// An empty φ of type `ty`; incoming pairs are appended later with
    /// [`DataFlowGraph::append_phi_pair`](crate::ir::DataFlowGraph::append_phi_pair).
    pub fn phi(&mut self, ty: Type) -> Value {
        self.build_value(InstructionData::Phi { pairs: Vec::new() }, ty)
    }

    /// Look through a value for a directly-known callee function.
    pub fn as_direct_callee(&self, v: Value) -> Option<FuncId> {
        match *self.func.dfg.value_def(v) {
            ValueData::FuncAddr { func, .. } => Some(func),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::CallConv;
    use crate::ir::Unit;

    fn unit_with_func() -> (Unit, FuncId) {
        let mut unit = Unit::new("test");
        let i32t = unit.ctx.types.int(32);
        let sig = unit.ctx.types.func(i32t, vec![i32t, i32t], false);
        let id = unit.add_function("f", sig, CallConv::SystemV);
        (unit, id)
    }

    #[test]
    fn folded_returns_do_not_advance_cursor() {
        let (mut unit, id) = unit_with_func();
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);
        let block = b.create_block();
        b.switch_to_block(block);

        let i32t = b.ctx.types.int(32);
        let one = b.iconst(i32t, 1);
        let two = b.iconst(i32t, 2);
        // Folds; nothing inserted, cursor still at index 0.
        let three = b.add(one, two);
        assert!(b.func.dfg.value_constant(three).is_some());
        assert!(b.func.layout.block_insts(block).is_empty());

        // A real instruction lands at the cursor and advances it.
        let p0 = b.func.params[0];
        let p1 = b.func.params[1];
        let sum = b.add(p0, p1);
        let sum2 = b.add(sum, three);
        b.ret(Some(sum2));
        assert_eq!(b.func.layout.block_insts(block).len(), 3);
    }

    #[test]
    fn cond_jump_collapses_on_constant() {
        let (mut unit, id) = unit_with_func();
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        let t = b.create_block();
        let e = b.create_block();
        b.switch_to_block(entry);
        let i1 = b.ctx.types.int(1);
        let yes = b.iconst(i1, 1);
        b.cond_jump(yes, t, e);
        let term = b.func.terminator(entry).unwrap();
        assert_eq!(
            *b.func.dfg.inst(term),
            InstructionData::Jump { dest: t }
        );
    }

    #[test]
    fn gep_walks_struct_fields() {
        let (mut unit, id) = unit_with_func();
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);
        let block = b.create_block();
        b.switch_to_block(block);

        let i32t = b.ctx.types.int(32);
        let i64t = b.ctx.types.int(64);
        let st = b.ctx.types.struct_(vec![i64t, i32t]);
        let slot = b.alloca(st);
        let zero = b.iconst(i64t, 0);
        let one = b.iconst(i32t, 1);
        let field = b.gep(slot, &[zero, one]);
        let expect = b.ctx.types.ptr(i32t);
        assert_eq!(b.func.dfg.value_type(field), expect);
    }
}
