//! x86-64 legalization rules.
//!
//! SSE has no 64-bit unsigned conversions, so `uitofp i64 -> fN` and
//! `fptoui fN -> i64` expand into branchy sequences through a stack slot.
//! Var-arg SysV functions get an empty `vaheader` block prepended so
//! later lowering can fill in the register save area without disturbing
//! the original entry block.

use crate::ir::{Builder, Context, FloatCC, Function, Inst, InstructionData, IntCC, Opcode};
use crate::isa::CallConv;

/// Prepend the var-arg header block to SysV var-arg functions.
pub fn prepare_function(func: &mut Function, ctx: &mut Context) {
    if !func.has_body() || !func.is_var_arg(&ctx.types) || func.call_conv != CallConv::SystemV {
        return;
    }
    let entry = func.entry_block();
    // A lone-jump entry means the header is already in place.
    if func.layout.block_insts(entry).len() == 1 {
        if let InstructionData::Jump { .. } = func.dfg.inst(func.layout.block_insts(entry)[0]) {
            return;
        }
    }
    let mut b = Builder::new(func, ctx);
    let header = b.create_block_before(entry);
    b.switch_to_block(header);
    b.jump(entry);
    log::trace!("prepended vaheader block to {}", func.name);
}

/// Expand one instruction if x64 cannot match it directly. Returns `true`
/// when the block's instruction list changed.
pub fn legalize_inst(func: &mut Function, ctx: &mut Context, inst: Inst) -> bool {
    match func.dfg.inst(inst).clone() {
        InstructionData::Cast {
            opcode: Opcode::UiToFp,
            arg,
            ty,
        } => {
            let from = func.dfg.value_type(arg);
            if ctx.types.bits(from) != Some(64) {
                return false;
            }
            expand_uitofp64(func, ctx, inst, arg, ty);
            true
        }
        InstructionData::Cast {
            opcode: Opcode::FpToUi,
            arg,
            ty,
        } => {
            if ctx.types.bits(ty) != Some(64) {
                return false;
            }
            expand_fptoui64(func, ctx, inst, arg, ty);
            true
        }
        _ => false,
    }
}

/// `uitofp i64 -> fN`: non-negative inputs convert signed directly; the
/// high-bit half shifts right, ORs the low bit back, converts, and
/// doubles.
fn expand_uitofp64(
    func: &mut Function,
    ctx: &mut Context,
    inst: Inst,
    arg: crate::ir::Value,
    to_ty: crate::ir::Type,
) {
    let block = func.layout.inst_block(inst).expect("instruction in layout");
    let pos = func.layout.inst_pos(inst);

    let mut b = Builder::new(func, ctx);
    let i64t = b.ctx.types.int(64);
    b.goto_before(inst);
    let slot = b.alloca(to_ty);

    // Everything from the cast on moves into the merge block.
    let merge = b.func.layout.split_block(block, pos + 1);
    let fast = b.create_block_after(block);
    let slow = b.create_block_after(fast);

    b.switch_to_block(block);
    let zero = b.iconst(i64t, 0);
    let one = b.iconst(i64t, 1);
    let is_negative = b.icmp(IntCC::SignedLessThan, arg, zero);
    b.cond_jump(is_negative, slow, fast);

    b.switch_to_block(fast);
    let direct = b.sitofp(arg, to_ty);
    b.store(slot, direct);
    b.jump(merge);

    b.switch_to_block(slow);
    let half = b.lshr(arg, one);
    let lsb = b.band(arg, one);
    let rounded = b.bor(half, lsb);
    let as_signed = b.sitofp(rounded, to_ty);
    let doubled = b.add(as_signed, as_signed);
    b.store(slot, doubled);
    b.jump(merge);

    b.switch_to_block(merge);
    let first = b.func.layout.first_inst(merge).expect("merge holds the cast");
    b.goto_before(first);
    let result = b.load(slot);
    let old = b.func.dfg.inst_result(inst).unwrap();
    b.func.dfg.replace_uses(old, result);
    func.remove_inst(inst);
}

/// `fptoui fN -> i64`: inputs under 2^63 convert signed; larger ones
/// subtract 2^63, convert, and OR the sign bit back in.
fn expand_fptoui64(
    func: &mut Function,
    ctx: &mut Context,
    inst: Inst,
    arg: crate::ir::Value,
    to_ty: crate::ir::Type,
) {
    let block = func.layout.inst_block(inst).expect("instruction in layout");
    let pos = func.layout.inst_pos(inst);
    let from_ty = func.dfg.value_type(arg);
    let from_bits = ctx.types.bits(from_ty).expect("float source");

    let mut b = Builder::new(func, ctx);
    b.goto_before(inst);
    let slot = b.alloca(to_ty);

    let merge = b.func.layout.split_block(block, pos + 1);
    let fast = b.create_block_after(block);
    let slow = b.create_block_after(fast);

    b.switch_to_block(block);
    let limit = if from_bits == 32 {
        b.fconst(from_ty, 9.223372e18)
    } else {
        b.fconst(from_ty, 9223372036854775808.0)
    };
    let sign_bit = b.iconst(to_ty, i64::MIN);
    let in_range = b.fcmp(FloatCC::LessThan, arg, limit);
    b.cond_jump(in_range, fast, slow);

    b.switch_to_block(fast);
    let direct = b.fptosi(arg, to_ty);
    b.store(slot, direct);
    b.jump(merge);

    b.switch_to_block(slow);
    let shifted = b.sub(arg, limit);
    let as_signed = b.fptosi(shifted, to_ty);
    let with_sign = b.bor(as_signed, sign_bit);
    b.store(slot, with_sign);
    b.jump(merge);

    b.switch_to_block(merge);
    let first = b.func.layout.first_inst(merge).expect("merge holds the cast");
    b.goto_before(first);
    let result = b.load(slot);
    let old = b.func.dfg.inst_result(inst).unwrap();
    b.func.dfg.replace_uses(old, result);
    func.remove_inst(inst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Unit;
    use crate::verifier::{verify_function, VerifierErrors};

    #[test]
    fn uitofp64_expands_to_a_diamond() {
        let mut unit = Unit::new("test");
        let i64t = unit.ctx.types.int(64);
        let f64t = unit.ctx.types.float(64);
        let sig = unit.ctx.types.func(f64t, vec![i64t], false);
        let id = unit.add_function("conv", sig, CallConv::SystemV);
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let x = b.func.params[0];
        let f = b.uitofp(x, f64t);
        b.ret(Some(f));

        let inst = func.dfg.value_inst(f).unwrap();
        assert!(legalize_inst(func, &mut unit.ctx, inst));

        // Four blocks now: entry, fast, slow, merge; no uitofp left.
        assert_eq!(func.layout.blocks().count(), 4);
        for (_, i) in func.collect_insts() {
            assert_ne!(func.dfg.inst(i).opcode(), Opcode::UiToFp);
        }
        let mut errors = VerifierErrors::default();
        assert!(
            verify_function(func, &unit.ctx, &mut errors).is_ok(),
            "{errors}"
        );
    }

    #[test]
    fn narrow_uitofp_is_left_alone() {
        let mut unit = Unit::new("test");
        let i32t = unit.ctx.types.int(32);
        let f32t = unit.ctx.types.float(32);
        let sig = unit.ctx.types.func(f32t, vec![i32t], false);
        let id = unit.add_function("conv", sig, CallConv::SystemV);
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let x = b.func.params[0];
        let f = b.uitofp(x, f32t);
        b.ret(Some(f));

        let inst = func.dfg.value_inst(f).unwrap();
        assert!(!legalize_inst(func, &mut unit.ctx, inst));
    }

    #[test]
    fn vararg_function_gets_a_header_block() {
        let mut unit = Unit::new("test");
        let i32t = unit.ctx.types.int(32);
        let sig = unit.ctx.types.func(i32t, vec![i32t], true);
        let id = unit.add_function("printfish", sig, CallConv::SystemV);
        let func = &mut unit.functions[id];
        {
            let mut b = Builder::new(func, &mut unit.ctx);
            let entry = b.create_block();
            b.switch_to_block(entry);
            let p = b.func.params[0];
            b.ret(Some(p));
        }
        let old_entry = func.entry_block();
        prepare_function(func, &mut unit.ctx);
        let new_entry = func.entry_block();
        assert_ne!(old_entry, new_entry);
        assert_eq!(func.layout.block_insts(new_entry).len(), 1);
        assert_eq!(
            *func.dfg.inst(func.layout.block_insts(new_entry)[0]),
            InstructionData::Jump { dest: old_entry }
        );
    }
}
