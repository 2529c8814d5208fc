//! Selection graph nodes.
//!
//! Each IR block becomes a *root* owning an ordered list of instruction
//! nodes; operands point at other instruction nodes or at value nodes
//! (registers, constants, frame indices, globals, arguments). Value nodes
//! are interned per function so one register node models every use of an
//! SSA value.

use crate::ir::condcodes::{FloatCC, IntCC};
use crate::ir::{Block, FuncId, GlobalVar, Type};
use sable_entity::{entity_impl, PackedOption};
use smallvec::SmallVec;

/// An opaque reference to a selection node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);
entity_impl!(NodeId, "n");

/// The kind of a selection node. Instruction kinds mirror IR opcodes;
/// value kinds represent operands.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[allow(missing_docs)]
pub enum NodeKind {
    // Instruction nodes.
    Add,
    Sub,
    IMul,
    UMul,
    FMul,
    IDiv,
    UDiv,
    FDiv,
    IRem,
    URem,
    Icmp(IntCC),
    Fcmp(FloatCC),
    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,
    Zext,
    Sext,
    Trunc,
    FpTrunc,
    FpExt,
    FpToSi,
    FpToUi,
    SiToFp,
    UiToFp,
    /// ptrtoint / inttoptr / bitcast: a pure register copy.
    GenericCast,
    Gep,
    Load,
    Store,
    Call,
    /// Unconditional (1 operand) or conditional (3 operands: then-root,
    /// else-root, condition) jump.
    Jump,
    Switch,
    Ret,
    Phi,
    ExtractValue,
    // Value nodes.
    Register,
    ConstInt,
    ConstFloat,
    FrameIndex,
    GlobalAddr,
    FuncArg,
    /// Bundle of registers for struct-typed loads and calls.
    MultiValue,
}

impl NodeKind {
    /// Is this a value node (as opposed to an instruction node)?
    pub fn is_value(self) -> bool {
        matches!(
            self,
            Self::Register
                | Self::ConstInt
                | Self::ConstFloat
                | Self::FrameIndex
                | Self::GlobalAddr
                | Self::FuncArg
                | Self::MultiValue
        )
    }
}

/// Extra payload carried by some node kinds.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum NodePayload {
    /// Nothing.
    #[default]
    None,
    /// `ConstInt` value.
    Imm(i64),
    /// `ConstFloat` bit pattern.
    FloatBits(u64),
    /// `FrameIndex` slot.
    Frame(u32),
    /// `GlobalAddr` naming a global variable.
    Global(GlobalVar),
    /// `GlobalAddr` naming a function.
    Func(FuncId),
    /// `FuncArg` position.
    Arg(u16),
    /// `MultiValue` field register nodes.
    Multi(SmallVec<[NodeId; 4]>),
    /// `ExtractValue` field index.
    Index(u32),
    /// Branch targets: `[dest]` for a plain jump, `[then, else]` for a
    /// conditional one, `[default, cases...]` for a switch, and the
    /// per-pair incoming blocks for a φ.
    Blocks(SmallVec<[Block; 2]>),
}

/// One selection node.
#[derive(Clone, Debug)]
pub struct Node {
    /// What the node is.
    pub kind: NodeKind,
    /// The value/result type, or void for pure effects.
    pub ty: Type,
    /// Operand nodes, patched in after all nodes exist.
    pub operands: SmallVec<[NodeId; 4]>,
    /// For instruction nodes with a result: the register or multi-value
    /// node holding it.
    pub result: PackedOption<NodeId>,
    /// The IR block whose root owns this node, when it has one. Value
    /// nodes interned per function have no root; a pattern may only
    /// absorb an operand that shares its root.
    pub root: PackedOption<Block>,
    /// Kind-specific payload.
    pub payload: NodePayload,
}

impl Node {
    /// A new node with no operands wired.
    pub fn new(kind: NodeKind, ty: Type) -> Self {
        Self {
            kind,
            ty,
            operands: SmallVec::new(),
            result: None.into(),
            root: None.into(),
            payload: NodePayload::None,
        }
    }

    /// Builder-style payload attachment.
    pub fn with_payload(mut self, payload: NodePayload) -> Self {
        self.payload = payload;
        self
    }

    /// The integer payload of a `ConstInt` node.
    pub fn imm(&self) -> Option<i64> {
        match self.payload {
            NodePayload::Imm(v) => Some(v),
            _ => None,
        }
    }
}
