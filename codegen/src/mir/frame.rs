//! Stack frame layout.
//!
//! A function's frame is a list of slots. Most slots get an offset
//! assigned when the prologue is inserted; by-value argument slots carry
//! an explicit offset fixed by the calling convention so that all callees
//! see a uniform layout.

/// One stack slot.
#[derive(Clone, Copy, Debug)]
pub struct FrameSlot {
    /// Size in bytes.
    pub size: u32,
    /// Alignment in bytes.
    pub align: u32,
    /// Byte offset from the frame pointer; negative grows downward.
    /// `None` until the frame is finalized, unless explicitly placed.
    pub offset: Option<i32>,
}

/// The stack frame of a machine function.
#[derive(Clone, Default)]
pub struct StackFrame {
    slots: Vec<FrameSlot>,
    /// Total size of the auto-placed region, 16-byte aligned. Zero until
    /// `finalize`.
    pub frame_size: u32,
}

impl StackFrame {
    /// An empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a slot whose offset is assigned at finalization. Returns its
    /// index.
    pub fn add_slot(&mut self, size: u32, align: u32) -> u32 {
        self.slots.push(FrameSlot {
            size,
            align,
            offset: None,
        });
        self.slots.len() as u32 - 1
    }

    /// Add a slot at a fixed offset (by-value arguments spilled by the
    /// caller).
    pub fn add_slot_at(&mut self, size: u32, align: u32, offset: i32) -> u32 {
        self.slots.push(FrameSlot {
            size,
            align,
            offset: Some(offset),
        });
        self.slots.len() as u32 - 1
    }

    /// Number of slots.
    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Look at a slot.
    pub fn slot(&self, index: u32) -> FrameSlot {
        self.slots[index as usize]
    }

    /// Assign offsets to all auto-placed slots, growing downward from the
    /// frame pointer, and compute the 16-byte aligned frame size.
    pub fn finalize(&mut self) {
        let mut running: u32 = 0;
        for slot in &mut self.slots {
            if slot.offset.is_some() {
                continue;
            }
            let align = slot.align.max(1);
            running = (running + slot.size).next_multiple_of(align);
            slot.offset = Some(-(running as i32));
        }
        self.frame_size = running.next_multiple_of(16);
    }

    /// Offset of a slot; panics when the frame was not finalized.
    pub fn offset(&self, index: u32) -> i32 {
        self.slots[index as usize]
            .offset
            .expect("frame not finalized")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_grow_down_and_respect_alignment() {
        let mut frame = StackFrame::new();
        let a = frame.add_slot(4, 4);
        let b = frame.add_slot(8, 8);
        let arg = frame.add_slot_at(8, 8, -64);
        frame.finalize();
        assert_eq!(frame.offset(a), -4);
        assert_eq!(frame.offset(b), -16);
        assert_eq!(frame.offset(arg), -64);
        assert_eq!(frame.frame_size, 16);
    }
}
