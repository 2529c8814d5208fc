//! Verifier for the structural and typing invariants of the IR.
//!
//! The verifier reports findings instead of aborting: all problems found
//! in a function are collected into a [`VerifierErrors`] list so several
//! can be reported at once. The pipeline runs it after every pass when
//! verification is enabled.
//!
//! Checked invariants:
//!
//! - every block is non-empty and has exactly one terminator, at the end;
//! - use-def symmetry: an instruction appears in the use list of each of
//!   its operands exactly once per occurrence, and every use-list entry
//!   names an instruction that really has the value as an operand;
//! - φ pairs name distinct blocks which are real predecessors, and the
//!   incoming values share the φ's type;
//! - per-opcode operand typing, including cast directionality and the
//!   `gep` type walk.

use crate::flowgraph::ControlFlowGraph;
use crate::ir::{
    Block, Context, Function, Inst, InstructionData, Opcode, Type, TypeData, Value,
};

/// A single verifier finding.
#[derive(Debug, Clone)]
pub struct VerifierError {
    /// The function the problem was found in.
    pub func: String,
    /// The instruction at fault, if the problem is instruction-level.
    pub inst: Option<Inst>,
    /// Explanation of the violated invariant.
    pub message: String,
}

impl core::fmt::Display for VerifierError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self.inst {
            Some(inst) => write!(f, "{}: {}: {}", self.func, inst, self.message),
            None => write!(f, "{}: {}", self.func, self.message),
        }
    }
}

/// A collection of verifier findings.
#[derive(Debug, Clone, Default)]
pub struct VerifierErrors(pub Vec<VerifierError>);

impl std::error::Error for VerifierErrors {}

impl VerifierErrors {
    /// True if no problems were found.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn report(&mut self, func: &Function, inst: Option<Inst>, message: String) {
        self.0.push(VerifierError {
            func: func.name.clone(),
            inst,
            message,
        });
    }
}

impl core::fmt::Display for VerifierErrors {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        for e in &self.0 {
            writeln!(f, "{e}")?;
        }
        Ok(())
    }
}

/// Verify one function, appending findings to `errors`. Returns `Ok` if
/// nothing was found for this function.
pub fn verify_function(
    func: &Function,
    ctx: &Context,
    errors: &mut VerifierErrors,
) -> Result<(), ()> {
    let before = errors.0.len();
    let cfg = ControlFlowGraph::with_function(func);
    let verifier = Verifier { func, ctx, cfg };
    verifier.run(errors);
    if errors.0.len() == before {
        Ok(())
    } else {
        Err(())
    }
}

struct Verifier<'a> {
    func: &'a Function,
    ctx: &'a Context,
    cfg: ControlFlowGraph,
}

impl Verifier<'_> {
    fn run(&self, errors: &mut VerifierErrors) {
        for block in self.func.layout.blocks() {
            self.verify_block(block, errors);
        }
    }

    fn verify_block(&self, block: Block, errors: &mut VerifierErrors) {
        let insts = self.func.layout.block_insts(block);
        match insts.last() {
            None => {
                errors.report(self.func, None, format!("{block} has no instructions"));
                return;
            }
            Some(&last) => {
                if !self.func.dfg.inst(last).opcode().is_terminator() {
                    errors.report(self.func, None, format!("{block} has no terminator"));
                }
            }
        }
        for (pos, &inst) in insts.iter().enumerate() {
            let opcode = self.func.dfg.inst(inst).opcode();
            if opcode.is_terminator() && pos != insts.len() - 1 {
                errors.report(
                    self.func,
                    Some(inst),
                    format!("terminator in the middle of {block}"),
                );
            }
            self.verify_uses(inst, errors);
            self.verify_typing(block, inst, errors);
        }
    }

    /// Use-def symmetry for one instruction.
    fn verify_uses(&self, inst: Inst, errors: &mut VerifierErrors) {
        let args = self.func.dfg.inst(inst).arguments();
        for &arg in &args {
            let occurrences = args.iter().filter(|&&a| a == arg).count();
            let in_uses = self
                .func
                .dfg
                .uses(arg)
                .iter()
                .filter(|&&u| u == inst)
                .count();
            if occurrences != in_uses {
                errors.report(
                    self.func,
                    Some(inst),
                    format!(
                        "operand {arg} occurs {occurrences} times but its use list has {in_uses} entries for this user"
                    ),
                );
            }
        }
    }

    fn ty(&self, v: Value) -> Type {
        self.func.dfg.value_type(v)
    }

    fn is_int(&self, v: Value) -> bool {
        self.ctx.types.is_int(self.ty(v))
    }

    fn is_float(&self, v: Value) -> bool {
        self.ctx.types.is_float(self.ty(v))
    }

    fn verify_typing(&self, block: Block, inst: Inst, errors: &mut VerifierErrors) {
        let data = self.func.dfg.inst(inst);
        match data {
            InstructionData::Binary { opcode, args } => {
                let opcode = *opcode;
                if self.ty(args[0]) != self.ty(args[1]) {
                    errors.report(
                        self.func,
                        Some(inst),
                        format!("{opcode} has mismatched operand types"),
                    );
                }
                let float_ok = matches!(
                    opcode,
                    Opcode::Add | Opcode::Sub | Opcode::FMul | Opcode::FDiv
                );
                let int_ok = !matches!(opcode, Opcode::FMul | Opcode::FDiv);
                let ok = (self.is_int(args[0]) && int_ok) || (self.is_float(args[0]) && float_ok);
                if !ok {
                    errors.report(
                        self.func,
                        Some(inst),
                        format!("{opcode} has unsupported operand types"),
                    );
                }
            }
            InstructionData::IntCompare { args, .. } => {
                if self.ty(args[0]) != self.ty(args[1]) {
                    errors.report(self.func, Some(inst), "icmp operand types differ".into());
                }
                if !self.is_int(args[0]) && !self.ctx.types.is_ptr(self.ty(args[0])) {
                    errors.report(self.func, Some(inst), "icmp on non-integer".into());
                }
            }
            InstructionData::FloatCompare { args, .. } => {
                if self.ty(args[0]) != self.ty(args[1]) {
                    errors.report(self.func, Some(inst), "fcmp operand types differ".into());
                }
                if !self.is_float(args[0]) {
                    errors.report(self.func, Some(inst), "fcmp on non-float".into());
                }
            }
            InstructionData::Cast { opcode, arg, ty } => {
                self.verify_cast(inst, *opcode, *arg, *ty, errors);
            }
            InstructionData::StackAlloc { .. } => {}
            InstructionData::Load { arg } => {
                match self.ctx.types.pointee(self.ty(*arg)) {
                    None => errors.report(
                        self.func,
                        Some(inst),
                        "load does not reference a pointer".into(),
                    ),
                    Some(pointee) => {
                        let result = self.func.dfg.inst_result(inst).unwrap();
                        if self.ty(result) != pointee {
                            errors.report(
                                self.func,
                                Some(inst),
                                "load result type is not the pointee".into(),
                            );
                        }
                    }
                }
            }
            InstructionData::Store { args } => {
                match self.ctx.types.pointee(self.ty(args[0])) {
                    None => errors.report(
                        self.func,
                        Some(inst),
                        "store does not reference a pointer".into(),
                    ),
                    Some(pointee) => {
                        if pointee != self.ty(args[1]) {
                            errors.report(
                                self.func,
                                Some(inst),
                                "store value type does not match pointee".into(),
                            );
                        }
                    }
                }
            }
            InstructionData::GetElementPtr { args, ty } => {
                self.verify_gep(inst, args, *ty, errors);
            }
            InstructionData::ExtractValue { arg, index } => {
                match self.ctx.types.struct_fields(self.ty(*arg)) {
                    None => errors.report(
                        self.func,
                        Some(inst),
                        "extractvalue on non-struct".into(),
                    ),
                    Some(fields) => {
                        if *index as usize >= fields.len() {
                            errors.report(
                                self.func,
                                Some(inst),
                                "extractvalue index out of range".into(),
                            );
                        }
                    }
                }
            }
            InstructionData::Call { args, func_ty } => {
                self.verify_call(inst, args, *func_ty, errors);
            }
            InstructionData::Ret { arg } => {
                let ret_ty = self.func.return_type(&self.ctx.types);
                match arg {
                    None => {
                        if !self.ctx.types.is_void(ret_ty) {
                            errors.report(
                                self.func,
                                Some(inst),
                                "ret without value in non-void function".into(),
                            );
                        }
                    }
                    Some(v) => {
                        if self.ty(*v) != ret_ty {
                            errors.report(
                                self.func,
                                Some(inst),
                                "ret value type does not match the signature".into(),
                            );
                        }
                    }
                }
            }
            InstructionData::Jump { .. } => {}
            InstructionData::CondJump { cond, .. } => {
                if self.ctx.types.bits(self.ty(*cond)) != Some(1) {
                    errors.report(self.func, Some(inst), "condjump condition is not i1".into());
                }
            }
            InstructionData::Switch { cond, cases, .. } => {
                if !self.is_int(*cond) {
                    errors.report(self.func, Some(inst), "switch on non-integer".into());
                }
                for (v, _) in cases {
                    if self.func.dfg.value_constant(*v).is_none() {
                        errors.report(
                            self.func,
                            Some(inst),
                            "switch case is not a constant".into(),
                        );
                    }
                }
            }
            InstructionData::Phi { pairs } => {
                self.verify_phi(block, inst, pairs, errors);
            }
        }
    }

    fn verify_cast(
        &self,
        inst: Inst,
        opcode: Opcode,
        arg: Value,
        ty: Type,
        errors: &mut VerifierErrors,
    ) {
        let from = self.ty(arg);
        let fb = self.ctx.types.bits(from);
        let tb = self.ctx.types.bits(ty);
        let bad = |msg: &str, errors: &mut VerifierErrors| {
            errors.report(self.func, Some(inst), format!("{opcode}: {msg}"));
        };
        match opcode {
            Opcode::Trunc => {
                if !(self.ctx.types.is_int(from) && self.ctx.types.is_int(ty) && fb > tb) {
                    bad("must strictly narrow an integer", errors);
                }
            }
            Opcode::Zext | Opcode::Sext => {
                if !(self.ctx.types.is_int(from) && self.ctx.types.is_int(ty) && fb < tb) {
                    bad("must strictly widen an integer", errors);
                }
            }
            Opcode::FpTrunc => {
                if !(self.ctx.types.is_float(from) && self.ctx.types.is_float(ty) && fb > tb) {
                    bad("must strictly narrow a float", errors);
                }
            }
            Opcode::FpExt => {
                if !(self.ctx.types.is_float(from) && self.ctx.types.is_float(ty) && fb < tb) {
                    bad("must strictly widen a float", errors);
                }
            }
            Opcode::FpToSi | Opcode::FpToUi => {
                if !(self.ctx.types.is_float(from) && self.ctx.types.is_int(ty)) {
                    bad("must convert float to integer", errors);
                }
            }
            Opcode::SiToFp | Opcode::UiToFp => {
                if !(self.ctx.types.is_int(from) && self.ctx.types.is_float(ty)) {
                    bad("must convert integer to float", errors);
                }
            }
            Opcode::PtrToInt => {
                if !(self.ctx.types.is_ptr(from) && self.ctx.types.is_int(ty)) {
                    bad("must convert pointer to integer", errors);
                }
            }
            Opcode::IntToPtr => {
                if !(self.ctx.types.is_int(from) && self.ctx.types.is_ptr(ty)) {
                    bad("must convert integer to pointer", errors);
                }
            }
            Opcode::Bitcast => {}
            _ => unreachable!("non-cast opcode in Cast format"),
        }
    }

    fn verify_gep(&self, inst: Inst, args: &[Value], declared: Type, errors: &mut VerifierErrors) {
        if args.len() < 2 {
            errors.report(self.func, Some(inst), "gep needs a base and indices".into());
            return;
        }
        let base_ty = self.ty(args[0]);
        let Some(mut cur) = self.ctx.types.pointee(base_ty) else {
            errors.report(self.func, Some(inst), "gep base is not a pointer".into());
            return;
        };
        for &idx in &args[1..] {
            if !self.is_int(idx) {
                errors.report(self.func, Some(inst), "gep index is not an integer".into());
                return;
            }
        }
        for &idx in &args[2..] {
            cur = match self.ctx.types.resolve(cur) {
                TypeData::Array { elem, .. } => *elem,
                TypeData::Ptr(p) => *p,
                TypeData::Struct(fields) => {
                    let field = self
                        .func
                        .dfg
                        .value_constant(idx)
                        .and_then(|c| self.ctx.constants.int_value(c))
                        .and_then(|i| fields.get(i as usize).copied());
                    match field {
                        Some(f) => f,
                        None => {
                            errors.report(
                                self.func,
                                Some(inst),
                                "gep struct index is not a constant in range".into(),
                            );
                            return;
                        }
                    }
                }
                _ => {
                    errors.report(
                        self.func,
                        Some(inst),
                        "gep walks into a non-aggregate type".into(),
                    );
                    return;
                }
            };
        }
        let reached = self.ctx.types.lookup_ptr(cur);
        if reached != Some(declared) {
            errors.report(
                self.func,
                Some(inst),
                "gep declared type does not match the walked type".into(),
            );
        }
    }

    fn verify_call(&self, inst: Inst, args: &[Value], func_ty: Type, errors: &mut VerifierErrors) {
        let callee_ty = self.ty(args[0]);
        if self.ctx.types.pointee(callee_ty) != Some(func_ty) {
            errors.report(
                self.func,
                Some(inst),
                "callee is not a pointer to the declared function type".into(),
            );
            return;
        }
        if let TypeData::Func {
            params, var_arg, ..
        } = self.ctx.types.resolve(func_ty)
        {
            let fixed = params.len();
            let actual = args.len() - 1;
            if actual < fixed || (!var_arg && actual > fixed) {
                errors.report(
                    self.func,
                    Some(inst),
                    format!("call passes {actual} arguments, callee declares {fixed}"),
                );
                return;
            }
            for (i, (&arg, &want)) in args[1..].iter().zip(params.iter()).enumerate() {
                if self.ty(arg) != want {
                    errors.report(
                        self.func,
                        Some(inst),
                        format!("call argument {i} has the wrong type"),
                    );
                }
            }
        }
    }

    fn verify_phi(
        &self,
        block: Block,
        inst: Inst,
        pairs: &[(Value, Block)],
        errors: &mut VerifierErrors,
    ) {
        let result_ty = self
            .func
            .dfg
            .inst_result(inst)
            .map(|r| self.ty(r))
            .expect("phi always has a result");
        for (i, &(v, pred)) in pairs.iter().enumerate() {
            if self.ty(v) != result_ty {
                errors.report(
                    self.func,
                    Some(inst),
                    format!("phi incoming value {i} does not share the phi's type"),
                );
            }
            if !self.cfg.preds(block).iter().any(|p| p.block == pred) {
                errors.report(
                    self.func,
                    Some(inst),
                    format!("phi names {pred}, which is not a predecessor of {block}"),
                );
            }
            if pairs[..i].iter().any(|&(_, b)| b == pred) {
                errors.report(
                    self.func,
                    Some(inst),
                    format!("phi names {pred} more than once"),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, Unit};
    use crate::isa::CallConv;

    #[test]
    fn accepts_well_formed_function() {
        let mut unit = Unit::new("test");
        let i32t = unit.ctx.types.int(32);
        let sig = unit.ctx.types.func(i32t, vec![i32t, i32t], false);
        let id = unit.add_function("add", sig, CallConv::SystemV);
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let p0 = b.func.params[0];
        let p1 = b.func.params[1];
        let sum = b.add(p0, p1);
        b.ret(Some(sum));

        let mut errors = VerifierErrors::default();
        assert!(verify_function(func, &unit.ctx, &mut errors).is_ok());
        assert!(errors.is_empty());
    }

    #[test]
    fn rejects_missing_terminator_and_bad_store() {
        let mut unit = Unit::new("test");
        let i32t = unit.ctx.types.int(32);
        let i64t = unit.ctx.types.int(64);
        let void = unit.ctx.types.void();
        let sig = unit.ctx.types.func(void, vec![i32t], false);
        let id = unit.add_function("f", sig, CallConv::SystemV);
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let slot = b.alloca(i64t);
        let p0 = b.func.params[0];
        // i32 stored through an i64 pointer: type mismatch.
        b.store(slot, p0);
        // No terminator either.

        let mut errors = VerifierErrors::default();
        assert!(verify_function(func, &unit.ctx, &mut errors).is_err());
        let text = errors.to_string();
        assert!(text.contains("no terminator"), "{text}");
        assert!(text.contains("store value type"), "{text}");
    }

    #[test]
    fn rejects_phi_with_non_predecessor() {
        let mut unit = Unit::new("test");
        let i32t = unit.ctx.types.int(32);
        let sig = unit.ctx.types.func(i32t, vec![i32t], false);
        let id = unit.add_function("f", sig, CallConv::SystemV);
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        let other = b.create_block();
        let merge = b.create_block();
        b.switch_to_block(entry);
        b.jump(merge);
        b.switch_to_block(other);
        b.jump(merge);
        // `other` is unreachable but still a CFG predecessor; a phi naming
        // a completely unrelated block must be flagged.
        b.switch_to_block(merge);
        let p0 = b.func.params[0];
        let phi = b.phi(i32t);
        let phi_inst = b.func.dfg.value_inst(phi).unwrap();
        b.ret(Some(phi));

        let bogus = b.func.layout.make_block();
        b.func.dfg.append_phi_pair(phi_inst, p0, entry);
        b.func.dfg.append_phi_pair(phi_inst, p0, bogus);

        let mut errors = VerifierErrors::default();
        assert!(verify_function(func, &unit.ctx, &mut errors).is_err());
        assert!(errors.to_string().contains("not a predecessor"));
    }
}
