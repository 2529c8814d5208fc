//! Representation of sable IR: a typed SSA intermediate representation.
//!
//! The `ir` module defines the containers (`Unit`, `Function`,
//! `DataFlowGraph`, `Layout`), the interned types and constants, the
//! instruction formats, and the [`Builder`] used by frontends.

mod builder;
pub mod condcodes;
pub mod constants;
mod dfg;
pub mod entities;
mod function;
pub mod instructions;
mod layout;
pub mod types;
mod unit;
mod write;

pub use self::builder::Builder;
pub use self::condcodes::{FloatCC, IntCC};
pub use self::constants::{ConstantData, ConstantPool};
pub use self::dfg::{DataFlowGraph, ParamFlags, ValueData};
pub use self::entities::{Block, Constant, FuncId, GlobalVar, Inst, Type, Value};
pub use self::function::Function;
pub use self::instructions::{InstructionData, Opcode};
pub use self::layout::Layout;
pub use self::types::{DataLayout, TypeData, TypeStore};
pub use self::unit::{Context, GlobalVarData, Linkage, Unit};
pub use self::write::DisplayFunction;
