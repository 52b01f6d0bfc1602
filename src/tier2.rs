//! Tier2Info: the per-code-object aggregate (§3) gluing together the
//! scratch arena, metadata table, jump target index, and the extra
//! bookkeeping the Successor Protocol needs to pair up a conditional
//! branch's two successors before the Branch Rewriter can collapse its
//! stub (§4.9).
//!
//! All mutable state lives behind one `parking_lot::Mutex` (§5, "Lock
//! strategy"): scratch growth, metadata append, jump-version insertion and
//! branch-stub rewriting all happen while holding it, matching the
//! concurrency model's four named critical sections. Concurrent reads of
//! already-published Tier-2 bytecode need no lock at all.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::arena::BbScratch;
use crate::code_object::CodeObject;
use crate::config::SpecializerConfig;
use crate::jump_index::JumpTargetIndex;
use crate::metadata::MetadataTable;
use crate::stats::Stats;
use crate::type_context::TypeSystem;

/// Tracks the two successors of one conditional branch (or for-iter) stub
/// as they're lazily generated, so the Branch Rewriter can be invoked the
/// instant both are known (§4.9).
#[derive(Debug, Clone, Copy, Default)]
pub struct PendingBranch {
    pub fallthrough_bb: Option<u16>,
    pub taken_bb: Option<u16>,
    pub rewritten: bool,
}

/// Everything mutated under `Tier2Info`'s lock.
#[derive(Debug)]
pub struct Tier2Inner {
    pub arena: BbScratch,
    pub metadata: MetadataTable,
    pub jump_index: JumpTargetIndex,
    /// Keyed by the id of the BB whose Tier-2 stream ends in a branch
    /// stub. Absent entries are created lazily on first resolution.
    pub pending_branches: HashMap<u16, PendingBranch>,
}

/// One code object's complete Tier-2 state (§3, "Tier2Info"). Lives from
/// the first successful bootstrap until the code object is released.
#[derive(Debug)]
pub struct Tier2Info {
    pub code: CodeObject,
    pub type_system: TypeSystem,
    pub config: SpecializerConfig,
    pub stats: Stats,
    pub entry_bb_id: u16,
    inner: Mutex<Tier2Inner>,
}

impl Tier2Info {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        code: CodeObject,
        type_system: TypeSystem,
        config: SpecializerConfig,
        stats: Stats,
        arena: BbScratch,
        metadata: MetadataTable,
        jump_index: JumpTargetIndex,
        entry_bb_id: u16,
    ) -> Self {
        Self {
            code,
            type_system,
            config,
            stats,
            entry_bb_id,
            inner: Mutex::new(Tier2Inner {
                arena,
                metadata,
                jump_index,
                pending_branches: HashMap::new(),
            }),
        }
    }

    /// Acquire the lock guarding scratch growth, metadata append,
    /// jump-version insertion and branch-stub rewriting (§5).
    pub fn lock(&self) -> parking_lot::MutexGuard<'_, Tier2Inner> {
        self.inner.lock()
    }

    /// The entry BB's arena offset, the pointer `warmup` hands back to the
    /// frame on success (§6).
    pub fn entry_tier2_start(&self) -> usize {
        self.inner
            .lock()
            .metadata
            .get(self.entry_bb_id)
            .map(|m| m.tier2_start)
            .unwrap_or(0)
    }
}
