//! Instruction formats and opcodes.
//!
//! Instructions are a tagged union over opcode families with per-family
//! operand layouts. Adding an opcode means updating every `match` over
//! [`InstructionData`]; passes are written to match exhaustively so the
//! compiler finds all of them.

use crate::ir::condcodes::{FloatCC, IntCC};
use crate::ir::entities::{Block, Type, Value};
use core::fmt;
use smallvec::SmallVec;

/// The opcode of an instruction, without its operands.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[allow(missing_docs)]
pub enum Opcode {
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
    Icmp,
    Fcmp,
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
    PtrToInt,
    IntToPtr,
    Bitcast,
    StackAlloc,
    Load,
    Store,
    GetElementPtr,
    ExtractValue,
    Call,
    Ret,
    Jump,
    CondJump,
    Switch,
    Phi,
}

impl Opcode {
    /// Is this a block terminator?
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Self::Ret | Self::Jump | Self::CondJump | Self::Switch
        )
    }

    /// Can this instruction be removed when its result is unused?
    ///
    /// Loads are considered removable: this IR has no volatile memory.
    pub fn is_side_effect_free(self) -> bool {
        !matches!(
            self,
            Self::Store | Self::Call | Self::Ret | Self::Jump | Self::CondJump | Self::Switch
        )
    }

    /// Is this one of the cast opcodes?
    pub fn is_cast(self) -> bool {
        matches!(
            self,
            Self::Zext
                | Self::Sext
                | Self::Trunc
                | Self::FpTrunc
                | Self::FpExt
                | Self::FpToSi
                | Self::FpToUi
                | Self::SiToFp
                | Self::UiToFp
                | Self::PtrToInt
                | Self::IntToPtr
                | Self::Bitcast
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::IMul => "imul",
            Self::UMul => "umul",
            Self::FMul => "fmul",
            Self::IDiv => "idiv",
            Self::UDiv => "udiv",
            Self::FDiv => "fdiv",
            Self::IRem => "irem",
            Self::URem => "urem",
            Self::Icmp => "icmp",
            Self::Fcmp => "fcmp",
            Self::Shl => "shl",
            Self::LShr => "lshr",
            Self::AShr => "ashr",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Zext => "zext",
            Self::Sext => "sext",
            Self::Trunc => "trunc",
            Self::FpTrunc => "fptrunc",
            Self::FpExt => "fpext",
            Self::FpToSi => "fptosi",
            Self::FpToUi => "fptoui",
            Self::SiToFp => "sitofp",
            Self::UiToFp => "uitofp",
            Self::PtrToInt => "ptrtoint",
            Self::IntToPtr => "inttoptr",
            Self::Bitcast => "bitcast",
            Self::StackAlloc => "alloca",
            Self::Load => "load",
            Self::Store => "store",
            Self::GetElementPtr => "gep",
            Self::ExtractValue => "extractvalue",
            Self::Call => "call",
            Self::Ret => "ret",
            Self::Jump => "jump",
            Self::CondJump => "condjump",
            Self::Switch => "switch",
            Self::Phi => "phi",
        };
        f.write_str(name)
    }
}

/// An instruction and its operands.
#[derive(Clone, Debug, PartialEq)]
pub enum InstructionData {
    /// A two-operand arithmetic, bitwise or shift instruction.
    Binary {
        /// The operation.
        opcode: Opcode,
        /// Left and right operands.
        args: [Value; 2],
    },
    /// An integer comparison producing an `i1`.
    IntCompare {
        /// The condition.
        cond: IntCC,
        /// Left and right operands.
        args: [Value; 2],
    },
    /// A float comparison producing an `i1`.
    FloatCompare {
        /// The condition.
        cond: FloatCC,
        /// Left and right operands.
        args: [Value; 2],
    },
    /// A cast; the target type is also the result type.
    Cast {
        /// Which cast.
        opcode: Opcode,
        /// The value being converted.
        arg: Value,
        /// Target type.
        ty: Type,
    },
    /// A stack allocation; the result is a pointer to `ty`.
    StackAlloc {
        /// Allocated (pointee) type.
        ty: Type,
    },
    /// A load through a pointer.
    Load {
        /// The pointer.
        arg: Value,
    },
    /// A store through a pointer: `store ptr, value`.
    Store {
        /// Pointer and stored value.
        args: [Value; 2],
    },
    /// Address arithmetic over a pointer or array base.
    GetElementPtr {
        /// The base followed by the indices.
        args: Vec<Value>,
        /// Declared result type (a pointer to the reached type).
        ty: Type,
    },
    /// Read field `index` out of a struct-typed value.
    ExtractValue {
        /// The aggregate.
        arg: Value,
        /// Field index.
        index: u32,
    },
    /// A call: `args[0]` is the callee, the rest the arguments.
    Call {
        /// Callee followed by arguments.
        args: Vec<Value>,
        /// The callee's function type.
        func_ty: Type,
    },
    /// Return, with an optional value.
    Ret {
        /// The returned value if the function returns one.
        arg: Option<Value>,
    },
    /// Unconditional jump.
    Jump {
        /// The target.
        dest: Block,
    },
    /// Two-way conditional jump; a true condition takes `then_dest`.
    CondJump {
        /// The `i1` condition.
        cond: Value,
        /// Target when the condition is non-zero.
        then_dest: Block,
        /// Target when the condition is zero.
        else_dest: Block,
    },
    /// Multi-way jump on an integer value.
    Switch {
        /// The discriminant.
        cond: Value,
        /// Target when no case matches.
        default: Block,
        /// `(case value, target)` pairs; case values are constant ints.
        cases: Vec<(Value, Block)>,
    },
    /// SSA join: pairs of `(incoming value, predecessor block)`.
    Phi {
        /// One pair per predecessor.
        pairs: Vec<(Value, Block)>,
    },
}

impl InstructionData {
    /// The opcode of this instruction.
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Binary { opcode, .. } | Self::Cast { opcode, .. } => *opcode,
            Self::IntCompare { .. } => Opcode::Icmp,
            Self::FloatCompare { .. } => Opcode::Fcmp,
            Self::StackAlloc { .. } => Opcode::StackAlloc,
            Self::Load { .. } => Opcode::Load,
            Self::Store { .. } => Opcode::Store,
            Self::GetElementPtr { .. } => Opcode::GetElementPtr,
            Self::ExtractValue { .. } => Opcode::ExtractValue,
            Self::Call { .. } => Opcode::Call,
            Self::Ret { .. } => Opcode::Ret,
            Self::Jump { .. } => Opcode::Jump,
            Self::CondJump { .. } => Opcode::CondJump,
            Self::Switch { .. } => Opcode::Switch,
            Self::Phi { .. } => Opcode::Phi,
        }
    }

    /// Collect all value operands in order.
    pub fn arguments(&self) -> SmallVec<[Value; 4]> {
        let mut out = SmallVec::new();
        match self {
            Self::Binary { args, .. }
            | Self::IntCompare { args, .. }
            | Self::FloatCompare { args, .. }
            | Self::Store { args } => out.extend_from_slice(args),
            Self::Cast { arg, .. } | Self::Load { arg } | Self::ExtractValue { arg, .. } => {
                out.push(*arg)
            }
            Self::GetElementPtr { args, .. } | Self::Call { args, .. } => {
                out.extend_from_slice(args)
            }
            Self::StackAlloc { .. } => {}
            Self::Ret { arg } => out.extend(arg.iter().copied()),
            Self::Jump { .. } => {}
            Self::CondJump { cond, .. } => out.push(*cond),
            Self::Switch { cond, cases, .. } => {
                out.push(*cond);
                out.extend(cases.iter().map(|&(v, _)| v));
            }
            Self::Phi { pairs } => out.extend(pairs.iter().map(|&(v, _)| v)),
        }
        out
    }

    /// Rewrite every value operand with `f`.
    pub fn map_arguments(&mut self, mut f: impl FnMut(Value) -> Value) {
        match self {
            Self::Binary { args, .. }
            | Self::IntCompare { args, .. }
            | Self::FloatCompare { args, .. }
            | Self::Store { args } => {
                for a in args.iter_mut() {
                    *a = f(*a);
                }
            }
            Self::Cast { arg, .. } | Self::Load { arg } | Self::ExtractValue { arg, .. } => {
                *arg = f(*arg)
            }
            Self::GetElementPtr { args, .. } | Self::Call { args, .. } => {
                for a in args.iter_mut() {
                    *a = f(*a);
                }
            }
            Self::StackAlloc { .. } => {}
            Self::Ret { arg } => {
                if let Some(a) = arg {
                    *a = f(*a);
                }
            }
            Self::Jump { .. } => {}
            Self::CondJump { cond, .. } => *cond = f(*cond),
            Self::Switch { cond, cases, .. } => {
                *cond = f(*cond);
                for (v, _) in cases.iter_mut() {
                    *v = f(*v);
                }
            }
            Self::Phi { pairs } => {
                for (v, _) in pairs.iter_mut() {
                    *v = f(*v);
                }
            }
        }
    }

    /// Collect the blocks this instruction can transfer control to.
    pub fn branch_destinations(&self) -> SmallVec<[Block; 2]> {
        let mut out = SmallVec::new();
        match self {
            Self::Jump { dest } => out.push(*dest),
            Self::CondJump {
                then_dest,
                else_dest,
                ..
            } => {
                out.push(*then_dest);
                out.push(*else_dest);
            }
            Self::Switch {
                default, cases, ..
            } => {
                out.push(*default);
                out.extend(cases.iter().map(|&(_, b)| b));
            }
            _ => {}
        }
        out
    }

    /// Rewrite every block reference (branch targets and φ incoming blocks)
    /// with `f`.
    pub fn map_blocks(&mut self, mut f: impl FnMut(Block) -> Block) {
        match self {
            Self::Jump { dest } => *dest = f(*dest),
            Self::CondJump {
                then_dest,
                else_dest,
                ..
            } => {
                *then_dest = f(*then_dest);
                *else_dest = f(*else_dest);
            }
            Self::Switch {
                default, cases, ..
            } => {
                *default = f(*default);
                for (_, b) in cases.iter_mut() {
                    *b = f(*b);
                }
            }
            Self::Phi { pairs } => {
                for (_, b) in pairs.iter_mut() {
                    *b = f(*b);
                }
            }
            _ => {}
        }
    }
}
