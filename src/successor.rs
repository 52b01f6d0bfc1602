//! Lazy Successor Protocol (§4.4 bootstrap flow, §4.7, §6): on-demand
//! generation of fall-through and branch-target BBs triggered by the
//! interpreter at branch points, and backward-jump target resolution
//! triggered by a taken loop edge.
//!
//! Both entry points mirror the external interfaces `generate_next_bb`
//! and `locate_backward_bb` of §6: on success they hand back the
//! resolved BB's `tier2_start` (a scratch-arena offset, playing the role
//! of the pointer the design names); on failure they carry the Tier-1
//! resume offset the frame should fall back to.

use tracing::debug;

use crate::branch_rewriter::{rewrite_backward_jump, rewrite_forward_branch};
use crate::discovery::discover_bb;
use crate::emitter::Emitter;
use crate::error::SpecializeError;
use crate::metadata::Terminator;
use crate::tier2::{PendingBranch, Tier2Info};

/// Outcome of a Successor Protocol request.
#[derive(Debug, Clone, Copy)]
pub enum SuccessorOutcome {
    /// The resolved BB's id and scratch-arena start offset.
    Resolved { bb_id: u16, tier2_start: usize },
    /// Specialization of this successor was abandoned; the frame should
    /// resume Tier-1 execution at `tier1_offset` (§7).
    Fallback {
        tier1_offset: usize,
        error: SpecializeError,
    },
}

/// Resolve an unresolved conditional-branch (or for-iter) stub's
/// successor in direction `jumpby` (0 for fall-through, the test's
/// recorded displacement for the taken direction) (§4.4, §4.5, §6).
///
/// Once both directions of the same stub have been generated at least
/// once, the stub is rewritten into a direct jump to the taken
/// direction (§4.9); the non-taken direction needs no rewrite because it
/// was appended immediately following the stub.
pub fn generate_next_bb(tier2: &Tier2Info, bb_id: u16, jumpby: u16) -> SuccessorOutcome {
    let mut inner = tier2.lock();

    let Some(meta) = inner.metadata.get(bb_id) else {
        debug_assert!(false, "generate_next_bb: unknown bb_id {bb_id}");
        return SuccessorOutcome::Fallback {
            tier1_offset: 0,
            error: SpecializeError::UninterestingProgram,
        };
    };
    let Terminator::Branch {
        stub_offset,
        polarity_set,
        taken_jumpby,
    } = meta.terminator
    else {
        debug_assert!(false, "generate_next_bb: bb {bb_id} has no branch stub");
        return SuccessorOutcome::Fallback {
            tier1_offset: meta.tier1_end,
            error: SpecializeError::UninterestingProgram,
        };
    };
    let tier1_end = meta.tier1_end;
    let incoming = meta.owning_type_context.clone();
    let tier1_start = tier1_end + jumpby as usize;
    let is_taken = jumpby != 0;
    debug_assert!(!is_taken || jumpby == taken_jumpby);

    // A direction already generated earlier is looked up, not re-discovered:
    // a hot conditional reached many times from the interpreter must not
    // grow a fresh BB on every pass (§9, "cyclic references" applies to the
    // per-direction cache the same way it does to the metadata table).
    let cached = inner.pending_branches.get(&bb_id).and_then(|p| {
        if is_taken {
            p.taken_bb
        } else {
            p.fallthrough_bb
        }
    });
    if let Some(existing_id) = cached {
        let tier2_start = inner
            .metadata
            .get(existing_id)
            .map(|m| m.tier2_start)
            .unwrap_or(0);
        return SuccessorOutcome::Resolved {
            bb_id: existing_id,
            tier2_start,
        };
    }

    let emitter = Emitter::new(&tier2.type_system);
    let outcome = discover_bb(
        &tier2.code,
        &mut inner.arena,
        &mut inner.metadata,
        &mut inner.jump_index,
        &tier2.config,
        &emitter,
        &tier2.stats,
        tier1_start,
        &incoming,
    );

    match outcome {
        Ok(discovered) => {
            let new_bb_id = discovered.bb_id;
            let new_target = inner
                .metadata
                .get(new_bb_id)
                .map(|m| m.tier2_start)
                .unwrap_or(0);

            let entry = inner.pending_branches.entry(bb_id).or_insert_with(PendingBranch::default);
            if is_taken {
                entry.taken_bb = Some(new_bb_id);
            } else {
                entry.fallthrough_bb = Some(new_bb_id);
            }
            let entry = *entry;

            if let (Some(taken_bb), false) = (entry.taken_bb, entry.rewritten) {
                if entry.fallthrough_bb.is_some() {
                    let taken_target = inner
                        .metadata
                        .get(taken_bb)
                        .map(|m| m.tier2_start)
                        .unwrap_or(new_target);
                    rewrite_forward_branch(&mut inner.arena, stub_offset, polarity_set, taken_target);
                    if let Some(pending) = inner.pending_branches.get_mut(&bb_id) {
                        pending.rewritten = true;
                    }
                    tier2.stats.record_rewrite();
                    debug!(bb_id, stub_offset, taken_target, "branch stub rewritten to direct jump");
                }
            }

            SuccessorOutcome::Resolved {
                bb_id: new_bb_id,
                tier2_start: new_target,
            }
        }
        Err(err) => {
            tier2.stats.record_abandon(&err);
            debug!(bb_id, tier1_start, %err, "successor generation abandoned");
            SuccessorOutcome::Fallback {
                tier1_offset: tier1_start,
                error: err,
            }
        }
    }
}

/// Resolve a lazy backward-jump stub owned by BB `bb_id` (§4.7).
///
/// If the loop header already has a specialized version registered in the
/// Jump Target Index, the baseline "pick any" policy selects its first
/// version (§4.7, §9); otherwise the header is discovered fresh, which
/// registers the first version as a side effect of `discover_bb` itself.
pub fn locate_backward_bb(tier2: &Tier2Info, bb_id: u16) -> SuccessorOutcome {
    let mut inner = tier2.lock();

    let Some(meta) = inner.metadata.get(bb_id) else {
        debug_assert!(false, "locate_backward_bb: unknown bb_id {bb_id}");
        return SuccessorOutcome::Fallback {
            tier1_offset: 0,
            error: SpecializeError::UninterestingProgram,
        };
    };
    let Terminator::BackwardJump {
        stub_offset,
        target_tier1_offset,
    } = meta.terminator
    else {
        debug_assert!(false, "locate_backward_bb: bb {bb_id} has no backward-jump stub");
        return SuccessorOutcome::Fallback {
            tier1_offset: meta.tier1_end,
            error: SpecializeError::UninterestingProgram,
        };
    };
    let incoming = meta.owning_type_context.clone();

    let existing = inner
        .jump_index
        .is_target(target_tier1_offset, tier2.config.backward_jump_linear_scan_threshold)
        .and_then(|idx| inner.jump_index.first_version(idx));

    if let Some(existing_id) = existing {
        let target = inner
            .metadata
            .get(existing_id)
            .map(|m| m.tier2_start)
            .unwrap_or(0);
        rewrite_backward_jump(&mut inner.arena, stub_offset, target);
        tier2.stats.record_rewrite();
        tier2.stats.record_backward_resolution();
        debug!(bb_id, version = existing_id, target, "backward jump resolved to existing version");
        return SuccessorOutcome::Resolved {
            bb_id: existing_id,
            tier2_start: target,
        };
    }

    let emitter = Emitter::new(&tier2.type_system);
    let outcome = discover_bb(
        &tier2.code,
        &mut inner.arena,
        &mut inner.metadata,
        &mut inner.jump_index,
        &tier2.config,
        &emitter,
        &tier2.stats,
        target_tier1_offset,
        &incoming,
    );

    match outcome {
        Ok(discovered) => {
            let target = inner
                .metadata
                .get(discovered.bb_id)
                .map(|m| m.tier2_start)
                .unwrap_or(0);
            rewrite_backward_jump(&mut inner.arena, stub_offset, target);
            tier2.stats.record_rewrite();
            tier2.stats.record_backward_resolution();
            debug!(bb_id, version = discovered.bb_id, target, "backward jump resolved to freshly discovered version");
            SuccessorOutcome::Resolved {
                bb_id: discovered.bb_id,
                tier2_start: target,
            }
        }
        Err(err) => {
            tier2.stats.record_abandon(&err);
            debug!(bb_id, target_tier1_offset, %err, "backward jump resolution abandoned");
            SuccessorOutcome::Fallback {
                tier1_offset: target_tier1_offset,
                error: err,
            }
        }
    }
}
