//! Target register table interfaces.

use crate::mir::{Reg, RegClass};

/// Description of a target's register file.
///
/// Every size alias of a register has its own id in the table (so `rax`
/// and `eax` are distinct entries); `is_same_register` relates aliases of
/// the same underlying register, and `register_with_size` moves between
/// them. The allocatable sets list one canonical (full-width) id per
/// register.
pub trait RegisterInfo {
    /// Printable name of a physical register.
    fn name(&self, reg: Reg) -> &'static str;

    /// Class of a physical register.
    fn class(&self, reg: Reg) -> RegClass;

    /// The physical registers the allocator may hand out for a class, in
    /// preference order.
    fn allocatable(&self, class: RegClass) -> &'static [Reg];

    /// Registers the callee may clobber (the ABI's volatile set).
    fn caller_saved(&self) -> &'static [Reg];

    /// Registers the callee must preserve.
    fn callee_saved(&self) -> &'static [Reg];

    /// Alias-aware equality: do `a` and `b` name (parts of) the same
    /// underlying register?
    fn is_same_register(&self, a: Reg, b: Reg) -> bool;

    /// The id naming `reg` at `size` bytes.
    fn register_with_size(&self, reg: Reg, size: u8) -> Reg;

    /// The frame pointer.
    fn frame_pointer(&self) -> Reg;

    /// The stack pointer.
    fn stack_pointer(&self) -> Reg;
}

/// Per-operand constraints declared by an instruction descriptor.
#[derive(Clone, Copy, Debug)]
pub struct OperandDesc {
    /// The operand is written (the assigned role); the register allocator
    /// starts a live range here.
    pub def: bool,
    /// The operand is also read. Two-address instructions declare their
    /// destination as both.
    pub read: bool,
}

impl OperandDesc {
    /// A written operand.
    pub const DEF: Self = Self {
        def: true,
        read: false,
    };
    /// A read operand.
    pub const USE: Self = Self {
        def: false,
        read: true,
    };
    /// A read-modify-write operand (two-address destination).
    pub const DEF_USE: Self = Self {
        def: true,
        read: true,
    };
}

impl Default for OperandDesc {
    fn default() -> Self {
        Self::USE
    }
}

/// Static description of one machine opcode.
#[derive(Clone, Copy, Debug)]
pub struct InstDesc {
    /// Mnemonic, for printing and diagnostics.
    pub name: &'static str,
    /// Declared operand roles; operands beyond this prefix are reads.
    pub operands: &'static [OperandDesc],
    /// Physical registers clobbered by the instruction.
    pub clobbers: &'static [Reg],
    /// The instruction may read memory.
    pub may_load: bool,
    /// The instruction may write memory.
    pub may_store: bool,
    /// The instruction is a call.
    pub is_call: bool,
    /// The instruction is a return.
    pub is_ret: bool,
    /// The instruction transfers control (branch, jump, return).
    pub is_terminator: bool,
}

impl InstDesc {
    /// Role of operand `i`; operands past the declared prefix are reads.
    pub fn operand(&self, i: usize) -> OperandDesc {
        self.operands.get(i).copied().unwrap_or(OperandDesc::USE)
    }
}
