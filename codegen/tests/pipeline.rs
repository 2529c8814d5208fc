//! End-to-end pipeline tests: build small units through the public
//! builder API, compile them for x86-64 (and once for AArch64), and check
//! the shape of the machine code that comes out.

use sable_codegen::context::Context;
use sable_codegen::ir::{Builder, FuncId, IntCC, Unit};
use sable_codegen::isa::x64::X64Op;
use sable_codegen::isa::{self, CallConv};
use sable_codegen::mir::{MachFunction, MachOpcode, MachOperand};
use sable_codegen::OptLevel;
use std::str::FromStr;
use target_lexicon::Triple;

fn x64() -> Box<dyn isa::TargetIsa> {
    isa::lookup(Triple::from_str("x86_64-unknown-linux-gnu").unwrap()).unwrap()
}

fn aarch64() -> Box<dyn isa::TargetIsa> {
    isa::lookup(Triple::from_str("aarch64-unknown-linux-gnu").unwrap()).unwrap()
}

fn compile(unit: Unit, opt: OptLevel) -> Vec<MachFunction> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut ctx = Context::new(unit);
    ctx.set_verify(true);
    ctx.compile(x64().as_ref(), opt).expect("compilation failed")
}

fn has_opcode(mf: &MachFunction, opcode: impl Into<MachOpcode>) -> bool {
    let opcode = opcode.into();
    mf.blocks
        .values()
        .any(|b| b.insts.iter().any(|i| i.opcode == opcode))
}

fn count_opcode(mf: &MachFunction, opcode: impl Into<MachOpcode>) -> usize {
    let opcode = opcode.into();
    mf.blocks
        .values()
        .flat_map(|b| b.insts.iter())
        .filter(|i| i.opcode == opcode)
        .count()
}

fn assert_all_physical(mf: &MachFunction) {
    for block in mf.blocks.values() {
        for inst in &block.insts {
            for op in &inst.operands {
                if let MachOperand::Reg { reg, .. } = op {
                    assert!(
                        reg.is_physical(),
                        "{} still holds virtual register {reg:?}",
                        mf.name
                    );
                }
            }
        }
    }
}

/// `int add(int a, int b) { return a + b; }` compiles to a single-block
/// function whose addition is one address-generation tile.
#[test]
fn scalar_add_uses_lea() {
    let mut unit = Unit::new("t");
    let i32t = unit.ctx.types.int(32);
    let sig = unit.ctx.types.func(i32t, vec![i32t, i32t], false);
    let id = unit.add_function("add", sig, CallConv::SystemV);
    {
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let a = b.func.params[0];
        let bb = b.func.params[1];
        let sum = b.add(a, bb);
        b.ret(Some(sum));
    }

    let mfs = compile(unit, OptLevel::Speed);
    let mf = &mfs[0];
    assert_eq!(mf.blocks.len(), 1);
    assert!(has_opcode(mf, X64Op::LeaIndex), "\n{}", mf.display(x64().as_ref()));
    assert_eq!(count_opcode(mf, X64Op::Ret), 1);
    assert_all_physical(mf);
}

/// A counting loop's stack slot is promoted: the compiled function needs
/// no frame slots at all.
#[test]
fn loop_counter_is_promoted() {
    let mut unit = Unit::new("t");
    let i32t = unit.ctx.types.int(32);
    let sig = unit.ctx.types.func(i32t, vec![], false);
    let id = unit.add_function("count", sig, CallConv::SystemV);
    {
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
        let c = b.icmp(IntCC::SignedLessThan, i, ten);
        b.cond_jump(c, latch, exit);
        b.switch_to_block(latch);
        let i2 = b.load(slot);
        let one = b.iconst(i32t, 1);
        let next = b.add(i2, one);
        b.store(slot, next);
        b.jump(header);
        b.switch_to_block(exit);
        let out = b.load(slot);
        b.ret(Some(out));
    }

    let mfs = compile(unit, OptLevel::Speed);
    let mf = &mfs[0];
    assert_eq!(mf.frame.num_slots(), 0, "\n{}", mf.display(x64().as_ref()));
    assert!(!has_opcode(mf, X64Op::MovRM));
    assert!(!has_opcode(mf, X64Op::MovMR));
    assert_all_physical(mf);
}

fn branchy_callee(unit: &mut Unit) -> FuncId {
    let i32t = unit.ctx.types.int(32);
    let sig = unit.ctx.types.func(i32t, vec![i32t], false);
    let id = unit.add_function("f", sig, CallConv::SystemV);
    let func = &mut unit.functions[id];
    let mut b = Builder::new(func, &mut unit.ctx);
    let entry = b.create_block();
    let then_b = b.create_block();
    let else_b = b.create_block();
    b.switch_to_block(entry);
    let x = b.func.params[0];
    let zero = b.iconst(i32t, 0);
    let c = b.icmp(IntCC::NotEqual, x, zero);
    b.cond_jump(c, then_b, else_b);
    b.switch_to_block(then_b);
    let one = b.iconst(i32t, 1);
    b.ret(Some(one));
    b.switch_to_block(else_b);
    let two = b.iconst(i32t, 2);
    b.ret(Some(two));
    id
}

/// After inlining `f(0)` and folding, the caller returns the literal 2
/// with no call left.
#[test]
fn constant_argument_folds_through_the_inliner() {
    let mut unit = Unit::new("t");
    let i32t = unit.ctx.types.int(32);
    let callee = branchy_callee(&mut unit);
    let sig = unit.ctx.types.func(i32t, vec![], false);
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

    let mfs = compile(unit, OptLevel::Speed);
    let mf = mfs.iter().find(|m| m.name == "main").unwrap();
    assert!(!has_opcode(mf, X64Op::CallSym));
    assert!(!has_opcode(mf, X64Op::CallReg));
    // The returned value is the folded literal 2.
    let ret_imm = mf.blocks.values().flat_map(|b| b.insts.iter()).any(|i| {
        i.opcode == X64Op::MovRI.into()
            && matches!(i.operands.get(1), Some(MachOperand::Imm { value: 2, .. }))
    });
    assert!(ret_imm, "\n{}", mf.display(x64().as_ref()));
}

/// A recursive factorial is not inlined, and colouring terminates with a
/// direct call remaining.
#[test]
fn recursive_factorial_keeps_its_call() {
    let mut unit = Unit::new("t");
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
        let me = b.func_addr(fac, sig);
        let nm1 = b.sub(n, one);
        let sub_result = b.call(me, &[nm1]).unwrap();
        let prod = b.imul(n, sub_result);
        b.ret(Some(prod));
        b.switch_to_block(base);
        b.ret(Some(one));
    }

    let mfs = compile(unit, OptLevel::Speed);
    let mf = &mfs[0];
    assert_eq!(count_opcode(mf, X64Op::CallSym), 1);
    assert_all_physical(mf);
    // `n` is live across the recursive call, so beyond the prologue's
    // frame-pointer push the allocator parked it in a register that
    // needs saving (callee-saved at entry or caller-saved at the call).
    assert!(
        count_opcode(mf, X64Op::Push) >= 2,
        "\n{}",
        mf.display(x64().as_ref())
    );
}

/// A struct-returning call binds both fields to registers;
/// `extractvalue` adds no memory traffic.
#[test]
fn struct_return_stays_in_registers() {
    let mut unit = Unit::new("t");
    let i64t = unit.ctx.types.int(64);
    let pair = unit.ctx.types.struct_(vec![i64t, i64t]);
    let make_sig = unit.ctx.types.func(pair, vec![], false);
    let maker = unit.add_function("make_pair", make_sig, CallConv::SystemV);
    {
        let func = &mut unit.functions[maker];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        b.switch_to_block(entry);
        // A body that materialises the pair out of a slot; only the
        // *caller* is checked for memory traffic.
        let slot = b.alloca(pair);
        let loaded = b.load(slot);
        b.ret(Some(loaded));
    }
    let sum_sig = unit.ctx.types.func(i64t, vec![], false);
    let caller = unit.add_function("sum", sum_sig, CallConv::SystemV);
    {
        let func = &mut unit.functions[caller];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let faddr = b.func_addr(maker, make_sig);
        let r = b.call(faddr, &[]).unwrap();
        let a = b.extract_value(r, 0);
        let bfield = b.extract_value(r, 1);
        let sum = b.add(a, bfield);
        b.ret(Some(sum));
    }

    // O0 keeps the call (the inliner doesn't run).
    let mfs = compile(unit, OptLevel::None);
    let mf = mfs.iter().find(|m| m.name == "sum").unwrap();
    assert_eq!(count_opcode(mf, X64Op::CallSym), 1);
    assert!(!has_opcode(mf, X64Op::MovRM), "\n{}", mf.display(x64().as_ref()));
    assert!(!has_opcode(mf, X64Op::MovMR));
    assert_eq!(mf.frame.num_slots(), 0);
    assert_all_physical(mf);
}

/// The full pipeline is idempotent: compiling the already-compiled IR a
/// second time produces the same machine code.
#[test]
fn pipeline_is_idempotent() {
    let mut unit = Unit::new("t");
    let i32t = unit.ctx.types.int(32);
    let _callee = branchy_callee(&mut unit);
    let sig = unit.ctx.types.func(i32t, vec![i32t], false);
    let caller = unit.add_function("main", sig, CallConv::SystemV);
    let fsig = unit.functions[_callee].sig;
    {
        let func = &mut unit.functions[caller];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let arg = b.func.params[0];
        let faddr = b.func_addr(_callee, fsig);
        let r = b.call(faddr, &[arg]).unwrap();
        b.ret(Some(r));
    }

    let mut ctx = Context::new(unit);
    ctx.set_verify(true);
    let isa = x64();
    let first = ctx.compile(isa.as_ref(), OptLevel::Speed).unwrap();
    let second = ctx.compile(isa.as_ref(), OptLevel::Speed).unwrap();
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.num_insts(), b.num_insts(), "{} changed shape", a.name);
    }
}

/// The same scalar-add unit lowers through the AArch64 backend.
#[test]
fn aarch64_backend_compiles_scalar_add() {
    let mut unit = Unit::new("t");
    let i32t = unit.ctx.types.int(32);
    let sig = unit.ctx.types.func(i32t, vec![i32t, i32t], false);
    let id = unit.add_function("add", sig, CallConv::Aapcs64);
    {
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let a = b.func.params[0];
        let bb = b.func.params[1];
        let sum = b.add(a, bb);
        b.ret(Some(sum));
    }

    let isa = aarch64();
    let mut ctx = Context::new(unit);
    ctx.set_verify(true);
    let mfs = ctx.compile(isa.as_ref(), OptLevel::Speed).unwrap();
    let mf = &mfs[0];
    use sable_codegen::isa::aarch64::A64Op;
    assert!(has_opcode(mf, A64Op::Add));
    assert!(has_opcode(mf, A64Op::Ret));
    assert_all_physical(mf);
}

/// A switch lowers to a compare-and-branch chain ending in the default.
#[test]
fn switch_lowers_to_compare_chain() {
    let mut unit = Unit::new("t");
    let i32t = unit.ctx.types.int(32);
    let sig = unit.ctx.types.func(i32t, vec![i32t], false);
    let id = unit.add_function("pick", sig, CallConv::SystemV);
    {
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        let c1 = b.create_block();
        let c2 = b.create_block();
        let fallback = b.create_block();
        b.switch_to_block(entry);
        let x = b.func.params[0];
        let k1 = b.iconst(i32t, 1);
        let k4 = b.iconst(i32t, 4);
        b.switch(x, fallback, &[(k1, c1), (k4, c2)]);
        b.switch_to_block(c1);
        let ten = b.iconst(i32t, 10);
        b.ret(Some(ten));
        b.switch_to_block(c2);
        let twenty = b.iconst(i32t, 20);
        b.ret(Some(twenty));
        b.switch_to_block(fallback);
        let zero = b.iconst(i32t, 0);
        b.ret(Some(zero));
    }

    let mfs = compile(unit, OptLevel::Speed);
    let mf = &mfs[0];
    // One comparison and one conditional jump per case.
    assert_eq!(count_opcode(mf, X64Op::CmpI), 2);
    assert_eq!(count_opcode(mf, X64Op::Jcc), 2);
    assert_eq!(count_opcode(mf, X64Op::Ret), 3);
    assert_all_physical(mf);
}

/// Loads and stores through a global resolve to symbol-based addresses.
#[test]
fn global_counter_round_trip() {
    let mut unit = Unit::new("t");
    let i64t = unit.ctx.types.int(64);
    let init = unit
        .ctx
        .constants
        .intern(sable_codegen::ir::ConstantData::Int(0), i64t);
    let counter = unit.add_global(
        "counter",
        i64t,
        Some(init),
        sable_codegen::ir::Linkage::Export,
    );

    let void = unit.ctx.types.void();
    let sig = unit.ctx.types.func(void, vec![], false);
    let id = unit.add_function("bump", sig, CallConv::SystemV);
    {
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let addr = b.global_addr(counter, i64t);
        let old = b.load(addr);
        let one = b.iconst(i64t, 1);
        let new = b.add(old, one);
        b.store(addr, new);
        b.ret(None);
    }

    let mfs = compile(unit, OptLevel::Speed);
    let mf = &mfs[0];
    let mentions_global = mf.blocks.values().flat_map(|b| b.insts.iter()).any(|i| {
        i.operands
            .iter()
            .any(|op| matches!(op, MachOperand::Global { global, .. } if *global == counter))
    });
    assert!(mentions_global, "\n{}", mf.display(x64().as_ref()));
    assert!(has_opcode(mf, X64Op::MovRM));
    assert!(has_opcode(mf, X64Op::MovMR));
    assert_all_physical(mf);
}

/// Float arithmetic: constants come from the literal pool and the SSE
/// two-address forms are used.
#[test]
fn float_scale_and_offset() {
    let mut unit = Unit::new("t");
    let f64t = unit.ctx.types.float(64);
    let sig = unit.ctx.types.func(f64t, vec![f64t], false);
    let id = unit.add_function("scale", sig, CallConv::SystemV);
    {
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let x = b.func.params[0];
        let k = b.fconst(f64t, 2.5);
        let scaled = b.fmul(x, k);
        let one = b.fconst(f64t, 1.0);
        let out = b.add(scaled, one);
        b.ret(Some(out));
    }

    let mfs = compile(unit, OptLevel::Speed);
    let mf = &mfs[0];
    assert!(has_opcode(mf, X64Op::Mulsd));
    assert!(has_opcode(mf, X64Op::Addsd));
    assert_eq!(mf.constants.len(), 2);
    assert!(has_opcode(mf, X64Op::FMovRM));
    assert_all_physical(mf);
}

/// Division keeps its fixed-register discipline: rax/rdx are respected
/// and the result lands wherever the allocator chose.
#[test]
fn division_through_fixed_registers() {
    let mut unit = Unit::new("t");
    let i32t = unit.ctx.types.int(32);
    let sig = unit.ctx.types.func(i32t, vec![i32t, i32t], false);
    let id = unit.add_function("quot", sig, CallConv::SystemV);
    {
        let func = &mut unit.functions[id];
        let mut b = Builder::new(func, &mut unit.ctx);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let a = b.func.params[0];
        let d = b.func.params[1];
        let q = b.idiv(a, d);
        let r = b.irem(a, d);
        let sum = b.add(q, r);
        b.ret(Some(sum));
    }

    let mfs = compile(unit, OptLevel::Speed);
    let mf = &mfs[0];
    assert_eq!(count_opcode(mf, X64Op::Idiv), 2);
    assert_all_physical(mf);
}
