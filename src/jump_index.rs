//! Jump Target Index and loop-header version resolution (§4.7).
//!
//! For every backward-jump target offset in the original Tier-1 bytecode,
//! tracks up to `K` specialized BB ids versioning that target, densely
//! packed from index 0.

use smallvec::SmallVec;

use crate::code_object::CodeObject;
use crate::error::{SpecializeError, SpecializeResult};
use crate::opcode::Opcode;

/// Sentinel marking an unfilled version slot.
const SENTINEL: i32 = -1;

/// One backward-jump target's version array.
#[derive(Debug, Clone)]
struct TargetVersions {
    tier1_offset: usize,
    /// Densely packed from index 0; trailing entries are `SENTINEL`.
    versions: SmallVec<[i32; 5]>,
}

/// Maps backward-jump target offsets to their specialized BB versions.
#[derive(Debug)]
pub struct JumpTargetIndex {
    targets: Vec<TargetVersions>,
    max_versions: usize,
}

impl JumpTargetIndex {
    /// Scan `code` once to collect every backward-jump source; the target
    /// offset of each is `source_offset + 1 - displacement` (§4.7).
    /// `linear_scan_threshold` is accepted here only to be handed back on
    /// queries -- the index itself always builds a sorted, deduplicated
    /// array regardless of how lookups will later traverse it.
    pub fn build(code: &CodeObject, max_versions: usize) -> Self {
        let mut offsets: Vec<usize> = Vec::new();
        for (offset, word) in code.words().iter().enumerate() {
            if word.opcode.is_backward_jump() {
                let displacement = word.oparg as usize;
                let target = (offset + 1).saturating_sub(displacement);
                offsets.push(target);
            }
        }
        offsets.sort_unstable();
        offsets.dedup();

        let targets = offsets
            .into_iter()
            .map(|tier1_offset| TargetVersions {
                tier1_offset,
                versions: SmallVec::from_elem(SENTINEL, max_versions),
            })
            .collect();

        Self {
            targets,
            max_versions,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Sorted, deduplicated backward-jump target offsets.
    pub fn offsets(&self) -> impl Iterator<Item = usize> + '_ {
        self.targets.iter().map(|t| t.tier1_offset)
    }

    /// Whether `offset` is a registered backward-jump target, using a
    /// linear scan below `threshold` entries and a binary search above it,
    /// matching the original's documented crossover (§4.7, §12).
    pub fn is_target(&self, offset: usize, threshold: usize) -> Option<usize> {
        if self.targets.len() <= threshold {
            self.targets.iter().position(|t| t.tier1_offset == offset)
        } else {
            self.targets
                .binary_search_by_key(&offset, |t| t.tier1_offset)
                .ok()
        }
    }

    /// Append `bb_id` to the version array for the target at index `i`
    /// (found via [`Self::is_target`]). Fails if all `K` slots are filled
    /// (§7, "too many versions").
    pub fn register_version(&mut self, index: usize, bb_id: u16) -> SpecializeResult<()> {
        let target = &mut self.targets[index];
        match target.versions.iter().position(|&v| v == SENTINEL) {
            Some(slot) => {
                target.versions[slot] = bb_id as i32;
                Ok(())
            }
            None => Err(SpecializeError::TooManyVersions {
                target_offset: target.tier1_offset,
            }),
        }
    }

    /// All non-sentinel versions registered for the target at index `i`,
    /// in registration order.
    pub fn versions(&self, index: usize) -> impl Iterator<Item = u16> + '_ {
        self.targets[index]
            .versions
            .iter()
            .take_while(|&&v| v != SENTINEL)
            .map(|&v| v as u16)
    }

    /// The first non-sentinel version for the target at index `i`: the
    /// baseline's "pick any" policy (§4.7, §9).
    pub fn first_version(&self, index: usize) -> Option<u16> {
        self.versions(index).next()
    }

    pub fn tier1_offset(&self, index: usize) -> usize {
        self.targets[index].tier1_offset
    }

    pub fn max_versions(&self) -> usize {
        self.max_versions
    }
}
