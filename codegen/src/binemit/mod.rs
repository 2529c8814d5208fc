//! Interfaces to the back end: assembly printers, instruction encoders
//! and object-file writers.
//!
//! The printer and encoder are machine-function passes maintained outside
//! this crate; they read MIR only. An encoder walks the blocks appending
//! bytes to a [`CodeSink`], builds a symbol table of text-section offsets,
//! and records a [`Fixup`] for every reference it cannot resolve while
//! encoding. The object-file writer consumes
//! `(code bytes, data bytes, symbols, fixups)` and emits a relocatable
//! object: x86-64 PC-relative references within one section are patched
//! in place, everything else becomes a relocation of the appropriate
//! [`Reloc`] kind. Whether a symbol reference needs the GOT-PC-relative
//! flavour depends on its linkage, so that decision lives with the
//! encoder, keyed by per-symbol [`Linkage`](crate::ir::Linkage) — not in
//! the instruction selector.

use crate::fx::FxHashMap;
use crate::mir::MachFunction;

/// Offset in bytes from the beginning of a section.
///
/// The compiler may run as a cross compiler, so this is a fixed-width
/// type rather than `usize`.
pub type CodeOffset = u32;

/// Addend to add to a symbol value.
pub type Addend = i64;

/// The section a fixup location lives in.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Section {
    /// Executable code.
    Text,
    /// Initialised data.
    Data,
}

/// Relocation kinds the encoders produce.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Reloc {
    /// Absolute 8-byte (`R_X86_64_64` / COFF `ADDR64`).
    Abs8,
    /// PC-relative 4-byte (`R_X86_64_PC32` / COFF `REL32`).
    PCRel4,
    /// Call to a possibly-external symbol (`R_X86_64_PLT32`).
    PLTRel4,
    /// GOT-PC-relative 4-byte (`R_X86_64_REX_GOTPCRELX`).
    GOTPCRel4,
    /// AArch64 call target (`R_AARCH64_CALL26`).
    Aarch64Call26,
    /// AArch64 ADR/ADRP page-relative pair.
    Aarch64AdrPage21,
}

/// One unresolved reference recorded while encoding.
#[derive(Clone, Debug, PartialEq)]
pub struct Fixup {
    /// Name of the referenced symbol.
    pub symbol: String,
    /// Byte offset of the reference within its section.
    pub location: CodeOffset,
    /// Size in bytes of the instruction containing the reference.
    pub instr_size: u8,
    /// The section the location is in.
    pub section: Section,
    /// Constant addend.
    pub addend: Addend,
    /// Relocation flavour.
    pub reloc: Reloc,
}

/// Symbol table built across blocks while encoding: name to text-section
/// offset.
#[derive(Default)]
pub struct SymbolTable {
    offsets: FxHashMap<String, CodeOffset>,
}

impl SymbolTable {
    /// Record `name` at `offset`.
    pub fn define(&mut self, name: impl Into<String>, offset: CodeOffset) {
        self.offsets.insert(name.into(), offset);
    }

    /// Look up a defined symbol.
    pub fn get(&self, name: &str) -> Option<CodeOffset> {
        self.offsets.get(name).copied()
    }

    /// Iterate over all defined symbols.
    pub fn iter(&self) -> impl Iterator<Item = (&str, CodeOffset)> {
        self.offsets.iter().map(|(n, &o)| (n.as_str(), o))
    }
}

/// Abstract interface for appending encoded bytes.
pub trait CodeSink {
    /// Current offset in the section.
    fn offset(&self) -> CodeOffset;

    /// Append one byte.
    fn put1(&mut self, byte: u8);

    /// Append two bytes, little-endian.
    fn put2(&mut self, half: u16);

    /// Append four bytes, little-endian.
    fn put4(&mut self, word: u32);

    /// Append eight bytes, little-endian.
    fn put8(&mut self, quad: u64);

    /// Record a fixup at the current offset.
    fn fixup(&mut self, fixup: Fixup);
}

/// A growable in-memory code sink.
#[derive(Default)]
pub struct MemSink {
    /// The bytes emitted so far.
    pub bytes: Vec<u8>,
    /// The fixups recorded so far.
    pub fixups: Vec<Fixup>,
}

impl CodeSink for MemSink {
    fn offset(&self) -> CodeOffset {
        self.bytes.len() as CodeOffset
    }

    fn put1(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    fn put2(&mut self, half: u16) {
        self.bytes.extend_from_slice(&half.to_le_bytes());
    }

    fn put4(&mut self, word: u32) {
        self.bytes.extend_from_slice(&word.to_le_bytes());
    }

    fn put8(&mut self, quad: u64) {
        self.bytes.extend_from_slice(&quad.to_le_bytes());
    }

    fn fixup(&mut self, fixup: Fixup) {
        self.fixups.push(fixup);
    }
}

/// A pass over finished machine functions: the printer and the encoder
/// implement this on the other side of the crate boundary.
pub trait MachFunctionPass {
    /// Process one machine function.
    fn run(&mut self, mf: &MachFunction);
}
