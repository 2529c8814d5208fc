//! Sable code generation library.
//!
//! This crate lowers a typed SSA intermediate representation to machine IR
//! for x86-64 and AArch64 and hands the result to an assembly printer or
//! object emitter through the interfaces in [`binemit`].
//!
//! A frontend builds a [`ir::Unit`] through [`ir::Builder`], then drives the
//! pipeline with a [`Context`] and a target obtained from [`isa::lookup`]:
//! SSA construction (`mem2reg`), the scalar optimisations, legalization,
//! DAG instruction selection (`isel`) and graph-coloring register
//! allocation (`regalloc`).

#![deny(missing_docs)]

pub use crate::context::Context;
pub use crate::result::{CodegenError, CodegenResult};

pub mod binemit;
pub mod call_analysis;
pub mod constant_folder;
pub mod context;
pub mod dce;
pub mod dominator_tree;
pub mod flowgraph;
pub mod inline;
pub mod ir;
pub mod isa;
pub mod isel;
pub mod legalizer;
pub mod loop_analysis;
pub mod mem2reg;
pub mod mir;
pub mod regalloc;
pub mod simplify_cfg;
pub mod split_critical_edges;
pub mod verifier;

mod fx;
mod result;

/// Optimisation level selected by the embedder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum OptLevel {
    /// No optimisation: straight lowering.
    None,
    /// Standard optimisation: inlining, SSA construction, folding, CFG
    /// cleanup, and the richer instruction-selection tiles.
    Speed,
}

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
