//! Graph-colouring register allocation.
//!
//! A Chaitin-style allocator with iterated spills: discover live ranges,
//! build the interference graph, colour; when colouring fails, rewrite
//! the spilled registers through stack slots and run the whole pipeline
//! again. Every spill strictly narrows live ranges, so the loop
//! terminates.
//!
//! After colouring, operands carrying a forced-width flag are rewritten
//! to the sub-register of that width through the target's register table.

pub mod coloring;
pub mod liveness;
pub mod saves;
pub mod spilling;

pub use self::liveness::{LiveRange, Liveness};

use crate::isa::TargetIsa;
use crate::mir::{MachFunction, MachOperand};

/// Allocate registers for `mf`, rewriting every virtual register to a
/// physical one.
pub fn run(mf: &mut MachFunction, isa: &dyn TargetIsa) {
    let assignments = loop {
        let liveness = Liveness::compute(mf, isa);
        let result = coloring::color(mf, isa, &liveness);
        if result.spills.is_empty() {
            break result.assignments;
        }
        log::debug!(
            "regalloc: {} spill(s) in {}, retrying",
            result.spills.len(),
            mf.name
        );
        spilling::spill_all(mf, isa, &result.spills);
    };

    let reg_info = isa.register_info();
    mf.map_operands(|op| {
        let MachOperand::Reg { reg, flags } = op else {
            return;
        };
        if !reg.is_virtual() {
            if let Some(size) = flags.forced_size() {
                *reg = reg_info.register_with_size(*reg, size);
            }
            return;
        }
        let phys = *assignments
            .get(&reg.virt_num())
            .expect("virtual register left unallocated");
        *reg = match flags.forced_size() {
            Some(size) => reg_info.register_with_size(phys, size),
            None => phys,
        };
    });
}
