//! Peephole constant folding.
//!
//! The pure fold rules live here and are shared by the [`Builder`] (which
//! folds at creation time) and the [`ConstantFolder`] pass (which folds
//! instructions already in a function, collapsing constant conditional
//! jumps as it goes).
//!
//! Integer arithmetic wraps in two's complement at the operand width;
//! float arithmetic rounds to nearest-even via the host's IEEE-754
//! operations. Division or remainder by zero never folds; it is left as a
//! runtime instruction.
//!
//! [`Builder`]: crate::ir::Builder

use crate::ir::{
    Context, DataFlowGraph, FloatCC, Inst, InstructionData, IntCC, Opcode, Type, Value,
};

/// Sign-extend `v` from `bits` to the canonical i64 representation.
fn wrap(v: i64, bits: u8) -> i64 {
    if bits >= 64 {
        v
    } else {
        let shift = 64 - u32::from(bits);
        (v << shift) >> shift
    }
}

/// The unsigned interpretation of `v` at `bits` width.
fn unsigned(v: i64, bits: u8) -> u64 {
    if bits >= 64 {
        v as u64
    } else {
        (v as u64) & ((1u64 << bits) - 1)
    }
}

fn int_operands(
    ctx: &Context,
    dfg: &DataFlowGraph,
    lhs: Value,
    rhs: Value,
) -> Option<(i64, i64, Type, u8)> {
    let lc = dfg.value_constant(lhs)?;
    let rc = dfg.value_constant(rhs)?;
    let a = ctx.constants.int_value(lc)?;
    let b = ctx.constants.int_value(rc)?;
    let ty = dfg.value_type(lhs);
    let bits = ctx.types.bits(ty)?;
    Some((a, b, ty, bits))
}

fn float_operands(
    ctx: &Context,
    dfg: &DataFlowGraph,
    lhs: Value,
    rhs: Value,
) -> Option<(f64, f64, Type, u8)> {
    let lc = dfg.value_constant(lhs)?;
    let rc = dfg.value_constant(rhs)?;
    let ty = dfg.value_type(lhs);
    let bits = ctx.types.bits(ty)?;
    let a = ctx.constants.float_value(lc, bits)?;
    let b = ctx.constants.float_value(rc, bits)?;
    Some((a, b, ty, bits))
}

fn make_float(ctx: &mut Context, dfg: &mut DataFlowGraph, ty: Type, bits: u8, v: f64) -> Value {
    let pattern = if bits == 32 {
        u64::from((v as f32).to_bits())
    } else {
        v.to_bits()
    };
    dfg.fconst(&mut ctx.constants, ty, pattern)
}

/// Try to fold a binary arithmetic, bitwise or shift instruction over
/// constant operands.
pub fn binary(
    ctx: &mut Context,
    dfg: &mut DataFlowGraph,
    opcode: Opcode,
    lhs: Value,
    rhs: Value,
) -> Option<Value> {
    // Integer rules first; `Add`/`Sub` cover floats as well.
    if let Some((a, b, ty, bits)) = int_operands(ctx, dfg, lhs, rhs) {
        let v = match opcode {
            Opcode::Add => a.wrapping_add(b),
            Opcode::Sub => a.wrapping_sub(b),
            Opcode::IMul | Opcode::UMul => a.wrapping_mul(b),
            Opcode::IDiv => {
                if b == 0 {
                    return None;
                }
                a.wrapping_div(b)
            }
            Opcode::UDiv => {
                if b == 0 {
                    return None;
                }
                (unsigned(a, bits) / unsigned(b, bits)) as i64
            }
            Opcode::IRem => {
                if b == 0 {
                    return None;
                }
                a.wrapping_rem(b)
            }
            Opcode::URem => {
                if b == 0 {
                    return None;
                }
                (unsigned(a, bits) % unsigned(b, bits)) as i64
            }
            Opcode::Shl => a.wrapping_shl(unsigned(b, bits) as u32),
            Opcode::LShr => (unsigned(a, bits) >> (unsigned(b, bits) % u64::from(bits))) as i64,
            Opcode::AShr => a.wrapping_shr(unsigned(b, bits) as u32),
            Opcode::And => a & b,
            Opcode::Or => a | b,
            Opcode::Xor => a ^ b,
            _ => return None,
        };
        return Some(dfg.iconst(&mut ctx.constants, ty, wrap(v, bits)));
    }

    if let Some((a, b, ty, bits)) = float_operands(ctx, dfg, lhs, rhs) {
        let v = match opcode {
            Opcode::Add => a + b,
            Opcode::Sub => a - b,
            Opcode::FMul => a * b,
            Opcode::FDiv => {
                if b == 0.0 {
                    return None;
                }
                a / b
            }
            _ => return None,
        };
        return Some(make_float(ctx, dfg, ty, bits, v));
    }

    None
}

/// Try to fold an integer comparison over constant operands.
pub fn icmp(
    ctx: &mut Context,
    dfg: &mut DataFlowGraph,
    cond: IntCC,
    lhs: Value,
    rhs: Value,
) -> Option<Value> {
    let (a, b, _, bits) = int_operands(ctx, dfg, lhs, rhs)?;
    let result = cond.evaluate(wrap(a, bits), wrap(b, bits));
    let i1 = ctx.types.int(1);
    Some(dfg.iconst(&mut ctx.constants, i1, i64::from(result)))
}

/// Try to fold a float comparison over constant operands.
pub fn fcmp(
    ctx: &mut Context,
    dfg: &mut DataFlowGraph,
    cond: FloatCC,
    lhs: Value,
    rhs: Value,
) -> Option<Value> {
    let (a, b, _, _) = float_operands(ctx, dfg, lhs, rhs)?;
    let result = cond.evaluate(a, b);
    let i1 = ctx.types.int(1);
    Some(dfg.iconst(&mut ctx.constants, i1, i64::from(result)))
}

/// Try to fold a cast of a constant.
pub fn cast(
    ctx: &mut Context,
    dfg: &mut DataFlowGraph,
    opcode: Opcode,
    arg: Value,
    to_ty: Type,
) -> Option<Value> {
    let c = dfg.value_constant(arg)?;
    let from_ty = dfg.value_type(arg);
    let to_bits = ctx.types.bits(to_ty);

    if let Some(v) = ctx.constants.int_value(c) {
        let from_bits = ctx.types.bits(from_ty)?;
        return match opcode {
            Opcode::Trunc | Opcode::Bitcast | Opcode::PtrToInt | Opcode::IntToPtr => {
                Some(dfg.iconst(&mut ctx.constants, to_ty, wrap(v, to_bits?)))
            }
            Opcode::Zext => Some(dfg.iconst(
                &mut ctx.constants,
                to_ty,
                wrap(unsigned(v, from_bits) as i64, to_bits?),
            )),
            Opcode::Sext => Some(dfg.iconst(&mut ctx.constants, to_ty, wrap(v, from_bits))),
            Opcode::SiToFp => {
                let b = to_bits?;
                Some(make_float(ctx, dfg, to_ty, b, wrap(v, from_bits) as f64))
            }
            Opcode::UiToFp => {
                let b = to_bits?;
                Some(make_float(ctx, dfg, to_ty, b, unsigned(v, from_bits) as f64))
            }
            _ => None,
        };
    }

    let from_bits = ctx.types.bits(from_ty)?;
    if let Some(v) = ctx.constants.float_value(c, from_bits) {
        return match opcode {
            Opcode::FpTrunc | Opcode::FpExt => {
                Some(make_float(ctx, dfg, to_ty, to_bits?, v))
            }
            Opcode::FpToSi => Some(dfg.iconst(
                &mut ctx.constants,
                to_ty,
                wrap(v as i64, to_bits?),
            )),
            Opcode::FpToUi => Some(dfg.iconst(
                &mut ctx.constants,
                to_ty,
                wrap(v as u64 as i64, to_bits?),
            )),
            _ => None,
        };
    }

    None
}

/// The folding pass: folds already-inserted instructions and collapses
/// conditional jumps whose condition is constant, keeping only the taken
/// edge.
///
/// Returns `true` if anything changed. The caller must recompute the CFG
/// afterwards when jumps were collapsed.
pub struct ConstantFolder;

impl ConstantFolder {
    /// Run over one function until no instruction folds.
    pub fn run(func: &mut crate::ir::Function, ctx: &mut Context) -> bool {
        let mut any_change = false;
        loop {
            let mut changed = false;
            'blocks: for block in func.layout.blocks().collect::<Vec<_>>() {
                for &inst in func.layout.block_insts(block).to_vec().iter() {
                    if Self::fold_inst(func, ctx, inst) {
                        changed = true;
                        any_change = true;
                        // The block's instruction list changed under us;
                        // restart iteration.
                        continue 'blocks;
                    }
                }
            }
            if !changed {
                return any_change;
            }
        }
    }

    fn fold_inst(func: &mut crate::ir::Function, ctx: &mut Context, inst: Inst) -> bool {
        let folded = match func.dfg.inst(inst).clone() {
            InstructionData::Binary { opcode, args } => {
                binary(ctx, &mut func.dfg, opcode, args[0], args[1])
            }
            InstructionData::IntCompare { cond, args } => {
                icmp(ctx, &mut func.dfg, cond, args[0], args[1])
            }
            InstructionData::FloatCompare { cond, args } => {
                fcmp(ctx, &mut func.dfg, cond, args[0], args[1])
            }
            InstructionData::Cast { opcode, arg, ty } => {
                cast(ctx, &mut func.dfg, opcode, arg, ty)
            }
            InstructionData::CondJump {
                cond,
                then_dest,
                else_dest,
            } => {
                let taken = if then_dest == else_dest {
                    Some(then_dest)
                } else {
                    func.dfg
                        .value_constant(cond)
                        .and_then(|c| ctx.constants.int_value(c))
                        .map(|v| if v != 0 { then_dest } else { else_dest })
                };
                if let Some(dest) = taken {
                    log::trace!("folding constant branch {} -> {}", inst, dest);
                    func.dfg
                        .replace_inst_data(inst, InstructionData::Jump { dest });
                    return true;
                }
                return false;
            }
            _ => None,
        };

        match folded {
            Some(value) => {
                if let Some(result) = func.dfg.inst_result(inst) {
                    func.dfg.replace_uses(result, value);
                }
                func.remove_inst(inst);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Context;

    fn setup() -> (Context, DataFlowGraph) {
        (Context::new(), DataFlowGraph::new())
    }

    #[test]
    fn int_add_wraps() {
        let (mut ctx, mut dfg) = setup();
        let i8t = ctx.types.int(8);
        let a = dfg.iconst(&mut ctx.constants, i8t, 120);
        let b = dfg.iconst(&mut ctx.constants, i8t, 10);
        let r = binary(&mut ctx, &mut dfg, Opcode::Add, a, b).unwrap();
        let c = dfg.value_constant(r).unwrap();
        // 130 wraps to -126 in 8 bits.
        assert_eq!(ctx.constants.int_value(c), Some(-126));
    }

    #[test]
    fn division_by_zero_does_not_fold() {
        let (mut ctx, mut dfg) = setup();
        let i32t = ctx.types.int(32);
        let a = dfg.iconst(&mut ctx.constants, i32t, 42);
        let z = dfg.iconst(&mut ctx.constants, i32t, 0);
        assert!(binary(&mut ctx, &mut dfg, Opcode::IDiv, a, z).is_none());
        assert!(binary(&mut ctx, &mut dfg, Opcode::URem, a, z).is_none());
    }

    #[test]
    fn unsigned_compare_uses_unsigned_order() {
        let (mut ctx, mut dfg) = setup();
        let i32t = ctx.types.int(32);
        let a = dfg.iconst(&mut ctx.constants, i32t, -1); // 0xFFFF_FFFF
        let b = dfg.iconst(&mut ctx.constants, i32t, 1);
        let r = icmp(&mut ctx, &mut dfg, IntCC::UnsignedGreaterThan, a, b).unwrap();
        let c = dfg.value_constant(r).unwrap();
        assert_eq!(ctx.constants.int_value(c), Some(1));
        let r = icmp(&mut ctx, &mut dfg, IntCC::SignedGreaterThan, a, b).unwrap();
        let c = dfg.value_constant(r).unwrap();
        assert_eq!(ctx.constants.int_value(c), Some(0));
    }

    #[test]
    fn cast_folds() {
        let (mut ctx, mut dfg) = setup();
        let i8t = ctx.types.int(8);
        let i32t = ctx.types.int(32);
        let m1 = dfg.iconst(&mut ctx.constants, i8t, -1);
        let z = cast(&mut ctx, &mut dfg, Opcode::Zext, m1, i32t).unwrap();
        let s = cast(&mut ctx, &mut dfg, Opcode::Sext, m1, i32t).unwrap();
        assert_eq!(
            ctx.constants.int_value(dfg.value_constant(z).unwrap()),
            Some(255)
        );
        assert_eq!(
            ctx.constants.int_value(dfg.value_constant(s).unwrap()),
            Some(-1)
        );
    }

    #[test]
    fn float_mul_rounds() {
        let (mut ctx, mut dfg) = setup();
        let f64t = ctx.types.float(64);
        let a = dfg.fconst(&mut ctx.constants, f64t, (1.5f64).to_bits());
        let b = dfg.fconst(&mut ctx.constants, f64t, (2.0f64).to_bits());
        let r = binary(&mut ctx, &mut dfg, Opcode::FMul, a, b).unwrap();
        let c = dfg.value_constant(r).unwrap();
        assert_eq!(ctx.constants.float_value(c, 64), Some(3.0));
    }
}
