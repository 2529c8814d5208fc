//! Machine-level IR.
//!
//! The instruction selector lowers each IR function into a
//! [`MachFunction`]: machine blocks holding machine instructions whose
//! operands are virtual or physical registers, immediates, block labels,
//! symbol references, constant-pool indices or frame indices. Opcodes are
//! indices into the target's instruction descriptor table; everything the
//! generic passes need to know about an opcode comes from its
//! [`InstDesc`](crate::isa::InstDesc).

mod frame;
mod write;

pub use self::frame::{FrameSlot, StackFrame};
pub use self::write::DisplayMachFunction;

use crate::ir::GlobalVar;
use bitflags::bitflags;
use sable_entity::{entity_impl, PrimaryMap};
use smallvec::SmallVec;

/// An opaque reference to a machine block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MachLabel(u32);
entity_impl!(MachLabel, "mb");

/// A machine opcode: an index into the target's descriptor table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct MachOpcode(pub u16);

/// Register classes shared by all targets.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum RegClass {
    /// General purpose integer registers.
    Int,
    /// Floating point / vector registers.
    Float,
}

/// A register id. Physical registers index the target's register table;
/// virtual registers live at `VREG_BASE` and up.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(u32);

impl Reg {
    /// First virtual register id.
    pub const VREG_BASE: u32 = 1 << 20;

    /// A physical register from its table index.
    pub const fn phys(index: u32) -> Self {
        Self(index)
    }

    /// A virtual register from its number.
    pub const fn virt(num: u32) -> Self {
        Self(Self::VREG_BASE + num)
    }

    /// A register from a raw id, virtual or physical.
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// Is this a virtual register?
    pub fn is_virtual(self) -> bool {
        self.0 >= Self::VREG_BASE
    }

    /// Is this a physical register?
    pub fn is_physical(self) -> bool {
        !self.is_virtual()
    }

    /// The raw id.
    pub fn index(self) -> u32 {
        self.0
    }

    /// The virtual register number; panics on physical registers.
    pub fn virt_num(self) -> u32 {
        debug_assert!(self.is_virtual());
        self.0 - Self::VREG_BASE
    }
}

impl core::fmt::Debug for Reg {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        if self.is_virtual() {
            write!(f, "%{}", self.virt_num())
        } else {
            write!(f, "$p{}", self.0)
        }
    }
}

bitflags! {
    /// Per-operand flags consumed by the register rewriter, printer and
    /// encoder.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct OperandFlags: u16 {
        /// Print/encode the 8-bit name of the register.
        const FORCE_8 = 1 << 0;
        /// Print/encode the 16-bit name of the register.
        const FORCE_16 = 1 << 1;
        /// Print/encode the 32-bit name of the register.
        const FORCE_32 = 1 << 2;
        /// Print/encode the 64-bit name of the register.
        const FORCE_64 = 1 << 3;
        /// The immediate holds a condition code, not a number.
        const COND = 1 << 4;
        /// Symbol reference goes through the GOT (PC-relative).
        const GOT_PCREL = 1 << 5;
        /// Symbol reference goes through the PLT.
        const PLT = 1 << 6;
    }
}

impl OperandFlags {
    /// The forced sub-register width in bytes, if any width flag is set.
    pub fn forced_size(self) -> Option<u8> {
        if self.contains(Self::FORCE_8) {
            Some(1)
        } else if self.contains(Self::FORCE_16) {
            Some(2)
        } else if self.contains(Self::FORCE_32) {
            Some(4)
        } else if self.contains(Self::FORCE_64) {
            Some(8)
        } else {
            None
        }
    }

    /// The width flag for a size in bytes.
    pub fn for_size(size: u8) -> Self {
        match size {
            1 => Self::FORCE_8,
            2 => Self::FORCE_16,
            4 => Self::FORCE_32,
            _ => Self::FORCE_64,
        }
    }
}

/// A machine operand.
#[derive(Clone, Debug, PartialEq)]
pub enum MachOperand {
    /// A virtual or physical register.
    Reg {
        /// The register.
        reg: Reg,
        /// Width/condition flags.
        flags: OperandFlags,
    },
    /// An integer immediate.
    Imm {
        /// The value (or a condition code when `COND` is set).
        value: i64,
        /// Flags.
        flags: OperandFlags,
    },
    /// A machine block label.
    Label {
        /// The target block.
        block: MachLabel,
    },
    /// The address of a global variable.
    Global {
        /// The referenced global.
        global: GlobalVar,
        /// Relocation flavour flags.
        flags: OperandFlags,
    },
    /// A named external symbol.
    ExtSym {
        /// Symbol name.
        name: String,
        /// Relocation flavour flags.
        flags: OperandFlags,
    },
    /// An entry in the function's constant pool (float literals).
    ConstPool {
        /// Pool index.
        index: u32,
    },
    /// A slot in the function's stack frame, resolved to an offset at
    /// print/encode time.
    FrameIndex {
        /// Slot index.
        index: u32,
    },
}

impl MachOperand {
    /// A register operand with no flags.
    pub fn reg(reg: Reg) -> Self {
        Self::Reg {
            reg,
            flags: OperandFlags::empty(),
        }
    }

    /// An immediate operand with no flags.
    pub fn imm(value: i64) -> Self {
        Self::Imm {
            value,
            flags: OperandFlags::empty(),
        }
    }

    /// The register inside, if this is a register operand.
    pub fn as_reg(&self) -> Option<Reg> {
        match self {
            Self::Reg { reg, .. } => Some(*reg),
            _ => None,
        }
    }
}

/// Side information carried by call instructions.
#[derive(Clone, Debug, Default)]
pub struct CallInfo {
    /// Physical registers holding the return value(s).
    pub ret_regs: SmallVec<[Reg; 2]>,
    /// How many of the immediately preceding instructions set up argument
    /// registers; caller-save pushes go before them.
    pub arg_setup: u32,
}

/// One machine instruction.
#[derive(Clone, Debug)]
pub struct MachInst {
    /// Opcode, an index into the target's descriptor table.
    pub opcode: MachOpcode,
    /// Ordered operand list.
    pub operands: SmallVec<[MachOperand; 4]>,
    /// Present on call instructions only.
    pub call_info: Option<Box<CallInfo>>,
}

impl MachInst {
    /// Build an instruction from opcode and operands.
    pub fn new(opcode: impl Into<MachOpcode>, operands: impl IntoIterator<Item = MachOperand>) -> Self {
        Self {
            opcode: opcode.into(),
            operands: operands.into_iter().collect(),
            call_info: None,
        }
    }
}

/// A machine basic block.
#[derive(Clone, Default)]
pub struct MachBlockData {
    /// Instructions in order.
    pub insts: Vec<MachInst>,
    /// Successor labels.
    pub succs: SmallVec<[MachLabel; 2]>,
    /// Predecessor labels.
    pub preds: SmallVec<[MachLabel; 4]>,
}

/// Per-virtual-register information.
#[derive(Clone, Copy, Debug)]
pub struct VRegData {
    /// Register class.
    pub class: RegClass,
    /// Natural width in bytes.
    pub size: u8,
}

/// A function at the machine level.
pub struct MachFunction {
    /// Symbol name.
    pub name: String,
    /// Blocks in layout order (labels are minted in layout order).
    pub blocks: PrimaryMap<MachLabel, MachBlockData>,
    /// The stack frame.
    pub frame: StackFrame,
    /// Virtual register table, indexed by virtual register number.
    pub vregs: Vec<VRegData>,
    /// Float literals referenced through `MachOperand::ConstPool`.
    pub constants: Vec<(u64, u8)>,
    /// Physical registers live on entry (ABI argument registers).
    pub live_ins: Vec<Reg>,
    /// Number of prologue instructions at the head of the entry block.
    pub prologue_len: u32,
    /// Number of epilogue instructions preceding each return.
    pub epilogue_len: u32,
}

impl MachFunction {
    /// Create an empty machine function.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: PrimaryMap::new(),
            frame: StackFrame::new(),
            vregs: Vec::new(),
            constants: Vec::new(),
            live_ins: Vec::new(),
            prologue_len: 0,
            epilogue_len: 0,
        }
    }

    /// Add an empty block.
    pub fn add_block(&mut self) -> MachLabel {
        self.blocks.push(MachBlockData::default())
    }

    /// The entry block.
    pub fn entry(&self) -> MachLabel {
        MachLabel::from_u32(0)
    }

    /// Allocate a fresh virtual register.
    pub fn new_vreg(&mut self, class: RegClass, size: u8) -> Reg {
        let num = self.vregs.len() as u32;
        self.vregs.push(VRegData { class, size });
        Reg::virt(num)
    }

    /// Information about a virtual register.
    pub fn vreg_data(&self, reg: Reg) -> VRegData {
        self.vregs[reg.virt_num() as usize]
    }

    /// Intern a float literal in the constant pool.
    pub fn add_constant(&mut self, bits: u64, size: u8) -> u32 {
        if let Some(i) = self
            .constants
            .iter()
            .position(|&(b, s)| b == bits && s == size)
        {
            return i as u32;
        }
        self.constants.push((bits, size));
        self.constants.len() as u32 - 1
    }

    /// The function-wide instruction index of the first instruction of
    /// `block`.
    pub fn block_start_index(&self, block: MachLabel) -> u32 {
        let mut idx = 0;
        for (label, data) in self.blocks.iter() {
            if label == block {
                break;
            }
            idx += data.insts.len() as u32;
        }
        idx
    }

    /// Total number of instructions.
    pub fn num_insts(&self) -> u32 {
        self.blocks.values().map(|b| b.insts.len() as u32).sum()
    }

    /// Rewrite every operand with `f`.
    pub fn map_operands(&mut self, mut f: impl FnMut(&mut MachOperand)) {
        for block in self.blocks.values_mut() {
            for inst in &mut block.insts {
                for op in &mut inst.operands {
                    f(op);
                }
            }
        }
    }
}
