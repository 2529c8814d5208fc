//! Layout of blocks in a function and of instructions in blocks.
//!
//! The layout is the other half of the function representation: the DFG
//! owns the instructions, the layout gives them program order. The first
//! block in the layout is the entry block.

use crate::ir::entities::{Block, Inst};
use sable_entity::{PackedOption, SecondaryMap};

/// Block order and per-block instruction sequences.
#[derive(Clone)]
pub struct Layout {
    blocks: Vec<Block>,
    insts: SecondaryMap<Block, Vec<Inst>>,
    inst_block: SecondaryMap<Inst, PackedOption<Block>>,
    next_block: u32,
}

impl Layout {
    /// Create a new empty layout.
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            insts: SecondaryMap::new(),
            inst_block: SecondaryMap::new(),
            next_block: 0,
        }
    }

    /// Mint a new block, not yet placed in the layout.
    pub fn make_block(&mut self) -> Block {
        let block = Block::from_u32(self.next_block);
        self.next_block += 1;
        block
    }

    /// Total number of blocks ever created.
    pub fn num_blocks(&self) -> usize {
        self.next_block as usize
    }

    /// Append `block` at the end of the layout.
    pub fn append_block(&mut self, block: Block) {
        debug_assert!(!self.blocks.contains(&block));
        self.blocks.push(block);
    }

    /// Insert `block` immediately after `after`.
    pub fn insert_block_after(&mut self, block: Block, after: Block) {
        debug_assert!(!self.blocks.contains(&block));
        let pos = self.block_pos(after) + 1;
        self.blocks.insert(pos, block);
    }

    /// Insert `block` immediately before `before`.
    pub fn insert_block_before(&mut self, block: Block, before: Block) {
        debug_assert!(!self.blocks.contains(&block));
        let pos = self.block_pos(before);
        self.blocks.insert(pos, block);
    }

    /// Remove `block` and all its instructions from the layout.
    pub fn remove_block(&mut self, block: Block) {
        let pos = self.block_pos(block);
        self.blocks.remove(pos);
        for inst in self.insts[block].clone() {
            self.inst_block[inst] = None.into();
        }
        self.insts[block].clear();
    }

    fn block_pos(&self, block: Block) -> usize {
        self.blocks
            .iter()
            .position(|&b| b == block)
            .expect("block not in layout")
    }

    /// Is `block` placed in the layout?
    pub fn is_block_inserted(&self, block: Block) -> bool {
        self.blocks.contains(&block)
    }

    /// The entry block, if the function has a body.
    pub fn entry_block(&self) -> Option<Block> {
        self.blocks.first().copied()
    }

    /// Iterate over blocks in layout order.
    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.blocks.iter().copied()
    }

    /// The instructions of `block` in order.
    pub fn block_insts(&self, block: Block) -> &[Inst] {
        &self.insts[block]
    }

    /// The last instruction of `block`, which is its terminator in a
    /// well-formed function.
    pub fn last_inst(&self, block: Block) -> Option<Inst> {
        self.insts[block].last().copied()
    }

    /// The first instruction of `block`.
    pub fn first_inst(&self, block: Block) -> Option<Inst> {
        self.insts[block].first().copied()
    }

    /// The block containing `inst`, if it is inserted.
    pub fn inst_block(&self, inst: Inst) -> Option<Block> {
        self.inst_block[inst].expand()
    }

    /// Position of `inst` within its block.
    pub fn inst_pos(&self, inst: Inst) -> usize {
        let block = self.inst_block(inst).expect("instruction not in layout");
        self.insts[block]
            .iter()
            .position(|&i| i == inst)
            .expect("instruction not in its block")
    }

    /// Append `inst` at the end of `block`.
    pub fn append_inst(&mut self, inst: Inst, block: Block) {
        debug_assert!(self.inst_block[inst].is_none());
        self.insts[block].push(inst);
        self.inst_block[inst] = block.into();
    }

    /// Insert `inst` at position `pos` in `block`.
    pub fn insert_inst(&mut self, inst: Inst, block: Block, pos: usize) {
        debug_assert!(self.inst_block[inst].is_none());
        self.insts[block].insert(pos, inst);
        self.inst_block[inst] = block.into();
    }

    /// Remove `inst` from its block.
    pub fn remove_inst(&mut self, inst: Inst) {
        let block = self.inst_block(inst).expect("instruction not in layout");
        let pos = self.inst_pos(inst);
        self.insts[block].remove(pos);
        self.inst_block[inst] = None.into();
    }

    /// Split `block` in two before position `pos`: the instructions from
    /// `pos` on move into a fresh block, which is inserted right after
    /// `block` in the layout and returned.
    pub fn split_block(&mut self, block: Block, pos: usize) -> Block {
        let new_block = self.make_block();
        self.insert_block_after(new_block, block);
        let moved: Vec<Inst> = self.insts[block].split_off(pos);
        for &inst in &moved {
            self.inst_block[inst] = new_block.into();
        }
        self.insts[new_block] = moved;
        new_block
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_and_inst_order() {
        let mut layout = Layout::new();
        let b0 = layout.make_block();
        let b1 = layout.make_block();
        layout.append_block(b0);
        layout.append_block(b1);
        assert_eq!(layout.entry_block(), Some(b0));

        let i0 = Inst::from_u32(0);
        let i1 = Inst::from_u32(1);
        let i2 = Inst::from_u32(2);
        layout.append_inst(i0, b0);
        layout.append_inst(i2, b0);
        layout.insert_inst(i1, b0, 1);
        assert_eq!(layout.block_insts(b0), &[i0, i1, i2]);
        assert_eq!(layout.inst_block(i1), Some(b0));

        let tail = layout.split_block(b0, 1);
        assert_eq!(layout.block_insts(b0), &[i0]);
        assert_eq!(layout.block_insts(tail), &[i1, i2]);
        assert_eq!(layout.inst_block(i2), Some(tail));
        assert_eq!(layout.blocks().collect::<Vec<_>>(), vec![b0, tail, b1]);
    }
}
