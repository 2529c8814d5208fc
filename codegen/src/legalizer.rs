//! Legalization driver.
//!
//! Rewrites IR operations the target cannot match directly. The rules are
//! target-specific ([`TargetIsa::legalize_inst`]); the scheme is
//! universal: walk every block, and whenever a rule fires (and thereby
//! edits the instruction list under the cursor) restart that block. New
//! blocks produced by an expansion are picked up by rescanning the
//! function until a full pass makes no change.

use crate::ir::Unit;
use crate::isa::TargetIsa;

/// Legalize every defined function in `unit` for `isa`. Returns `true`
/// if anything was rewritten.
pub fn run(unit: &mut Unit, isa: &dyn TargetIsa) -> bool {
    let mut changed = false;
    for id in unit.defined_functions() {
        let (func, ctx) = unit.parts_mut(id);
        isa.prepare_function(func, ctx);

        loop {
            let mut any = false;
            for block in func.layout.blocks().collect::<Vec<_>>() {
                if !func.layout.is_block_inserted(block) {
                    continue;
                }
                loop {
                    let mut restart = false;
                    for &inst in func.layout.block_insts(block).to_vec().iter() {
                        if isa.legalize_inst(func, ctx, inst) {
                            restart = true;
                            any = true;
                            changed = true;
                            break;
                        }
                    }
                    if !restart {
                        break;
                    }
                }
            }
            if !any {
                break;
            }
        }
    }
    changed
}
