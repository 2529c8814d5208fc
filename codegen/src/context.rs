//! Compilation context and main entry point.
//!
//! The `Context` owns a unit and the per-function analyses (control flow
//! graph, dominator tree, loop nest) with explicit recomputation: any
//! pass that mutates the CFG invalidates them, and the next consumer
//! recomputes. `compile` drives the pass pipeline:
//!
//! ```text
//! [inline -> mem2reg -> fold -> dce -> simplify-cfg]*   (repeat while changing)
//! -> split critical edges -> legalize
//! -> instruction selection -> prologue/epilogue
//! -> register allocation -> caller/callee saves
//! ```
//!
//! The verifier runs after every IR pass when verification is enabled;
//! all findings of a run are collected before compilation gives up so
//! several problems surface at once.

use crate::dominator_tree::DominatorTree;
use crate::flowgraph::ControlFlowGraph;
use crate::ir::{FuncId, Unit};
use crate::isa::TargetIsa;
use crate::loop_analysis::LoopAnalysis;
use crate::mir::MachFunction;
use crate::result::CodegenResult;
use crate::verifier::VerifierErrors;
use crate::{constant_folder, dce, inline, isel, legalizer, mem2reg, regalloc, simplify_cfg,
    split_critical_edges, OptLevel};

/// Persistent data structures and the compilation pipeline.
pub struct Context {
    /// The unit being compiled.
    pub unit: Unit,
    /// Control flow graph of the function currently being worked on.
    pub cfg: ControlFlowGraph,
    /// Dominator tree of the function currently being worked on.
    pub domtree: DominatorTree,
    /// Loop analysis of the function currently being worked on.
    pub loops: LoopAnalysis,
    verify: bool,
}

impl Context {
    /// Create a context around a unit.
    pub fn new(unit: Unit) -> Self {
        Self {
            unit,
            cfg: ControlFlowGraph::new(),
            domtree: DominatorTree::new(),
            loops: LoopAnalysis::new(),
            verify: cfg!(debug_assertions),
        }
    }

    /// Force verification on or off (defaults to on in debug builds).
    pub fn set_verify(&mut self, verify: bool) {
        self.verify = verify;
    }

    /// Recompute the CFG and dominator tree for `func`.
    pub fn compute_analyses(&mut self, func: FuncId) {
        let f = &self.unit.functions[func];
        self.cfg.compute(f);
        self.domtree.compute(f, &self.cfg);
        self.loops.compute(f, &self.cfg, &self.domtree);
    }

    /// Mark every cached analysis stale.
    pub fn invalidate_analyses(&mut self) {
        self.cfg.clear();
        self.domtree.clear();
        self.loops.clear();
    }

    /// Run the verifier over every defined function.
    pub fn verify(&self) -> CodegenResult<()> {
        let mut errors = VerifierErrors::default();
        for func in self.unit.functions.values() {
            if func.has_body() {
                let _ = crate::verifier::verify_function(func, &self.unit.ctx, &mut errors);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }

    fn verify_if(&self, pass: &str) -> CodegenResult<()> {
        if self.verify {
            self.verify().map_err(|e| {
                log::error!("verifier failed after {pass}:\n{e}");
                e
            })
        } else {
            Ok(())
        }
    }

    /// Compile the whole unit for `isa`, producing one machine function
    /// per defined IR function, in function-id order.
    pub fn compile(
        &mut self,
        isa: &dyn TargetIsa,
        opt: OptLevel,
    ) -> CodegenResult<Vec<MachFunction>> {
        log::debug!(
            "compiling unit {} for {} at {:?}",
            self.unit.name,
            isa.name(),
            opt
        );
        self.verify_if("input")?;

        if opt >= OptLevel::Speed {
            self.optimize()?;
        }

        for id in self.unit.defined_functions() {
            let changed = {
                let func = &mut self.unit.functions[id];
                split_critical_edges::run(func)
            };
            if changed {
                self.invalidate_analyses();
            }
        }
        self.verify_if("split-critical-edges")?;

        legalizer::run(&mut self.unit, isa);
        self.invalidate_analyses();
        self.verify_if("legalize")?;

        let mut out = Vec::new();
        for id in self.unit.defined_functions() {
            {
                let func = &self.unit.functions[id];
                log::trace!("lowering {}:\n{}", func.name, func.display(&self.unit.ctx));
            }
            let mut mf = isel::run(&self.unit, id, isa, opt);
            regalloc::run(&mut mf, isa);
            // The frame is complete only after the colour/spill loop has
            // added its slots, so the prologue (which finalizes slot
            // offsets and reserves the frame) goes in afterwards.
            isa.insert_prologue_epilogue(&mut mf);
            regalloc::saves::run(&mut mf, isa);
            out.push(mf);
        }
        Ok(out)
    }

    /// The scalar optimisation group, repeated until a full round changes
    /// nothing. Each member has a monotone termination argument of its
    /// own (the inliner's growth budget, shrinking instruction counts for
    /// the rest), so the fixpoint is reached.
    fn optimize(&mut self) -> CodegenResult<()> {
        loop {
            let mut changed = false;

            changed |= inline::run(&mut self.unit);
            self.verify_if("inline")?;

            for id in self.unit.defined_functions() {
                self.compute_analyses(id);
                let (func, ctx) = self.unit.parts_mut(id);
                changed |= mem2reg::run(func, ctx, &self.cfg, &self.domtree);
            }
            self.verify_if("mem2reg")?;

            for id in self.unit.defined_functions() {
                let (func, ctx) = self.unit.parts_mut(id);
                changed |= constant_folder::ConstantFolder::run(func, ctx);
                changed |= dce::run(func);
                changed |= simplify_cfg::run(func);
            }
            self.invalidate_analyses();
            self.verify_if("fold/dce/simplify-cfg")?;

            if !changed {
                return Ok(());
            }
        }
    }
}
