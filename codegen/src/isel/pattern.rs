//! Selection patterns.
//!
//! A target supplies, per node kind, an ordered list of patterns. Each
//! declares the minimum optimisation level it applies at, a structural
//! matcher, the operand indices it absorbs into its tile, a cost, and an
//! emit function producing the machine operand that represents the node's
//! result.

use crate::isel::node::NodeId;
use crate::isel::Selector;
use crate::mir::MachOperand;
use crate::OptLevel;

/// A matcher callback: does this pattern structurally apply to `node`?
pub type MatchFn = for<'a, 'b> fn(&'b Selector<'a>, NodeId) -> bool;

/// An emit callback: append machine instructions for `node` and return
/// the operand standing for its result.
pub type EmitFn = for<'a, 'b> fn(&'b mut Selector<'a>, NodeId) -> MachOperand;

/// One tile pattern.
pub struct Pattern {
    /// Lowest optimisation level at which the pattern applies.
    pub min_opt: OptLevel,
    /// Latency/size proxy for this tile.
    pub cost: u32,
    /// Operand indices absorbed into the tile: they are emitted inside
    /// this pattern's `emit` and never as standalone instructions.
    pub covered: &'static [usize],
    /// Structural matcher.
    pub matches: MatchFn,
    /// Code emission.
    pub emit: EmitFn,
}

/// A pattern that always matches.
pub fn match_any(_: &Selector, _: NodeId) -> bool {
    true
}

/// The outcome of pattern selection for one node.
#[derive(Clone, Copy)]
pub struct MatchResult {
    /// The winning pattern.
    pub pattern: &'static Pattern,
    /// Accumulated cost of the tile plus its uncovered operands.
    pub cost: u32,
}
