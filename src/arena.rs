//! BB Scratch Arena (§4.3).
//!
//! A single contiguous, append-only buffer of emitted Tier-2 instruction
//! words for one code object. Per the §9 decision, BB starts and cursors
//! are tracked as `usize` offsets from the arena base, never as raw
//! pointers -- a grow reallocates the backing `Vec`, which would invalidate
//! any pointer stored across the boundary, but never invalidates an offset.

use crate::code_object::InstructionWord;
use crate::error::{SpecializeError, SpecializeResult};

/// Append-only scratch buffer holding every Tier-2 instruction word emitted
/// for one code object.
#[derive(Debug)]
pub struct BbScratch {
    buffer: Vec<InstructionWord>,
    capacity: usize,
}

impl BbScratch {
    /// A new arena sized at `initial_arena_factor * tier1_len` words,
    /// matching the original's `space_to_alloc = NBYTES * 3` (§4.3, §12).
    pub fn with_capacity_factor(tier1_len: usize, initial_arena_factor: usize) -> Self {
        let capacity = (tier1_len * initial_arena_factor).max(4);
        Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Current append cursor: the offset the next write will land at.
    #[inline]
    pub fn water_level(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Read a word already written to the arena, by offset.
    pub fn word(&self, offset: usize) -> Option<InstructionWord> {
        self.buffer.get(offset).copied()
    }

    /// Slice of already-written words, for tests and the interpreter
    /// harness that need to read back emitted BBs.
    pub fn words(&self) -> &[InstructionWord] {
        &self.buffer
    }

    /// Overwrite an already-written word in place. Used only by the
    /// Branch Rewriter (§4.9), which is the sole component permitted to
    /// mutate already-emitted Tier-2 instructions.
    pub fn patch(&mut self, offset: usize, word: InstructionWord) {
        if let Some(slot) = self.buffer.get_mut(offset) {
            *slot = word;
        }
    }

    /// The check-and-reallocate operation (§4.3): ensure at least
    /// `requested` more words can be appended without reallocating more
    /// than necessary, growing to `2 * (water_level + requested)` if not.
    ///
    /// Because BB starts are offsets, not pointers, a grow here never
    /// violates Invariant 5 -- only a caller holding a raw pointer into
    /// the old buffer would be affected, and this crate never hands one
    /// out.
    fn check_and_reallocate(&mut self, requested: usize) -> SpecializeResult<()> {
        let needed = self.buffer.len() + requested;
        if needed <= self.capacity {
            return Ok(());
        }
        let new_capacity = 2 * needed;
        let mut grown = Vec::with_capacity(new_capacity);
        grown.extend_from_slice(&self.buffer);
        self.buffer = grown;
        self.capacity = new_capacity;
        if self.buffer.capacity() < new_capacity {
            return Err(SpecializeError::OutOfScratchMemory {
                requested,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Append one instruction word, growing the arena first if needed.
    pub fn append(&mut self, word: InstructionWord) -> SpecializeResult<usize> {
        self.check_and_reallocate(1)?;
        let offset = self.buffer.len();
        self.buffer.push(word);
        Ok(offset)
    }

    /// Append several words as a unit (e.g. an opcode plus its cache
    /// tail), returning the offset of the first.
    pub fn append_many(&mut self, words: &[InstructionWord]) -> SpecializeResult<usize> {
        self.check_and_reallocate(words.len())?;
        let offset = self.buffer.len();
        self.buffer.extend_from_slice(words);
        Ok(offset)
    }
}
