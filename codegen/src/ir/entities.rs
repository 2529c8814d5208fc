//! IR entity references.
//!
//! Instructions, blocks, values, types, constants, globals and functions
//! are all referred to by small typed indices. The container that owns the
//! underlying data is the `DataFlowGraph` for instructions and values, the
//! `Context` for types and constants, and the `Unit` for globals and
//! functions. Clearing a dying entity out of every use list before the
//! reference goes stale is the responsibility of the mutation helpers on
//! those containers.

use sable_entity::entity_impl;

/// An opaque reference to a basic block in a function.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// An opaque reference to an instruction in a function.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// An opaque reference to an SSA value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");

/// An opaque reference to an interned type.
///
/// Types are interned in the unit's `Context`: constructing the same type
/// twice yields the same reference, so type equality is entity equality.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Type(u32);
entity_impl!(Type, "ty");

/// An opaque reference to an interned constant.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Constant(u32);
entity_impl!(Constant, "const");

/// An opaque reference to a global variable in a unit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalVar(u32);
entity_impl!(GlobalVar, "gv");

/// An opaque reference to a function in a unit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(u32);
entity_impl!(FuncId, "fn");
