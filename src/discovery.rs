//! BB Discovery (§4.4): scans Tier-1 bytecode from a start offset and
//! drives the Emitter until a BB-terminating condition, producing one
//! (sometimes two) BB metadata records.

use tracing::{debug, trace};

use crate::arena::BbScratch;
use crate::code_object::{CodeObject, InstructionWord};
use crate::config::SpecializerConfig;
use crate::emitter::Emitter;
use crate::error::SpecializeResult;
use crate::jump_index::JumpTargetIndex;
use crate::metadata::{MetadataTable, Terminator};
use crate::opcode::Opcode;
use crate::stats::Stats;
use crate::type_context::TypeContext;

/// Result of one `discover_bb` call.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryOutcome {
    /// The BB this call returns, per the design: when a fall-through into
    /// a loop header splits one call into two BBs, this is the *second*.
    pub bb_id: u16,
    /// The id of the first BB registered during this call, only present
    /// when the loop-header split occurred.
    pub preceding_bb_id: Option<u16>,
}

/// Scan Tier-1 instructions starting at `tier1_start` with incoming type
/// context `incoming`, emitting Tier-2 instructions into `arena` and
/// registering one or two fresh [`crate::metadata::BbMetadata`] entries.
#[allow(clippy::too_many_arguments)]
pub fn discover_bb(
    code: &CodeObject,
    arena: &mut BbScratch,
    metadata: &mut MetadataTable,
    jump_index: &mut JumpTargetIndex,
    config: &SpecializerConfig,
    emitter: &Emitter<'_>,
    stats: &Stats,
    tier1_start: usize,
    incoming: &TypeContext,
) -> SpecializeResult<DiscoveryOutcome> {
    let mut cursor = tier1_start;
    let mut ctx = incoming.clone();
    let mut tier2_start = arena.water_level();
    let mut at_bb_start = true;
    let mut starts_at_jump_target: Option<usize> = None;
    let mut preceding_bb_id: Option<u16> = None;
    let mut terminator = Terminator::ScopeExit;

    loop {
        // Backward-jump target check (§4.4, bullet 1).
        if jump_index
            .is_target(cursor, config.backward_jump_linear_scan_threshold)
            .is_some()
        {
            if at_bb_start {
                starts_at_jump_target = Some(cursor);
            } else {
                let tier2_end = arena.water_level();
                let id = metadata.register(
                    tier2_start,
                    tier2_end,
                    cursor,
                    None,
                    ctx.clone(),
                    Terminator::FallthroughSplit,
                );
                stats.record_bb_emitted(tier2_end.saturating_sub(tier2_start));
                debug!(bb_id = id, tier1_end = cursor, tier2_start, tier2_end, "bb registered (loop-header fall-through split)");
                preceding_bb_id = Some(id);

                tier2_start = arena.water_level();
                starts_at_jump_target = None;
                at_bb_start = true;
                continue;
            }
        }

        let Some(word) = code.word(cursor) else {
            // Malformed program: ran off the end without a scope-exit.
            // Treat as a scope-exit boundary so we still terminate cleanly.
            terminator = Terminator::ScopeExit;
            break;
        };

        if word.opcode.is_scope_exit() {
            arena.append(word)?;
            cursor += 1;
            at_bb_start = false;
            terminator = Terminator::ScopeExit;
            trace!(tier1_offset = cursor - 1, opcode = ?word.opcode, "emitted scope-exit");
            break;
        }

        if word.opcode.is_forward_jump() {
            // Fused away: skip across it, emit nothing (§4.6).
            cursor += 1 + word.oparg as usize;
            at_bb_start = false;
            trace!(tier1_offset = cursor, "erased unconditional forward jump");
            continue;
        }

        if word.opcode.is_backward_jump() {
            let jumpby = word.oparg as u16;
            let source_offset = cursor;
            let target_tier1_offset = (source_offset + 1).saturating_sub(jumpby as usize);
            let stub_offset = emitter.emit_backward_jump_stub(arena, jumpby)?;
            cursor += 1 + word.opcode.cache_entry_count();
            at_bb_start = false;
            terminator = Terminator::BackwardJump {
                stub_offset,
                target_tier1_offset,
            };
            trace!(tier1_offset = cursor, jumpby, target_tier1_offset, "emitted lazy backward-jump stub");
            break;
        }

        if word.opcode.is_branch() {
            let next_bb_id = metadata.next_id();
            let (test_start, polarity_set) = if word.opcode == Opcode::ForIter {
                (emitter.emit_for_iter_stub(arena, word.oparg, next_bb_id)?, false)
            } else {
                let polarity_set = word.opcode == Opcode::PopJumpIfTrue;
                (
                    emitter.emit_branch_stub(arena, word, polarity_set, next_bb_id)?,
                    polarity_set,
                )
            };
            cursor += 1 + word.opcode.cache_entry_count();
            at_bb_start = false;
            terminator = Terminator::Branch {
                stub_offset: test_start + 1,
                polarity_set,
                taken_jumpby: word.oparg as u16,
            };
            trace!(tier1_offset = cursor, next_bb_id, "emitted branch stub");
            break;
        }

        if matches!(word.opcode, Opcode::Resume | Opcode::ResumeQuick) {
            // Already-quick forms reach here when discovery runs on bytecode
            // that bootstrap has pre-rewritten (§4.8); re-emitting through
            // the same path keeps this idempotent either way. `Resume` has
            // no operand-stack effect, so `ctx` is untouched.
            emitter.emit_resume_quick(arena, word.oparg)?;
            cursor += 1;
            at_bb_start = false;
            continue;
        }

        if word.opcode == Opcode::CompareAndBranch {
            emitter.reduce_compare_and_branch(arena, &mut ctx, word.oparg)?;
            cursor += 1 + word.opcode.cache_entry_count();
            at_bb_start = false;
            continue;
        }

        if word.opcode == Opcode::EndFor {
            arena.append(word)?;
            if at_bb_start {
                // Pop a dead iterator only; execution begins after it.
                tier2_start = arena.water_level();
            }
            cursor += 1;
            at_bb_start = false;
            continue;
        }

        emitter.emit_other(arena, code, cursor, word, &mut ctx)?;
        cursor += 1 + word.opcode.cache_entry_count();
        at_bb_start = false;
    }

    let tier2_end = arena.water_level();
    let id = metadata.register(
        tier2_start,
        tier2_end,
        cursor,
        starts_at_jump_target,
        ctx.clone(),
        terminator,
    );
    stats.record_bb_emitted(tier2_end.saturating_sub(tier2_start));
    debug!(bb_id = id, tier1_end = cursor, tier2_start, tier2_end, "bb registered");

    if let Some(offset) = starts_at_jump_target {
        if let Some(idx) =
            jump_index.is_target(offset, config.backward_jump_linear_scan_threshold)
        {
            if let Err(err) = jump_index.register_version(idx, id) {
                debug!(tier1_offset = offset, "version array exhausted");
                return Err(err);
            }
        }
    }

    Ok(DiscoveryOutcome {
        bb_id: id,
        preceding_bb_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_context::{TypeId, TypeSystem};

    const INT: TypeId = TypeId(1);

    fn ts() -> TypeSystem {
        TypeSystem { int_type: INT }
    }

    fn code(words: Vec<InstructionWord>) -> CodeObject {
        let len = words.len();
        CodeObject::new(1, words, 2.max(len))
    }

    #[test]
    fn s1_straight_line_integer_add() {
        let code_obj = code(vec![
            InstructionWord::new(Opcode::LoadFast, 0),
            InstructionWord::new(Opcode::LoadFast, 1),
            InstructionWord::new(Opcode::BinaryOp, crate::emitter::NB_ADD),
            InstructionWord::new(Opcode::ReturnValue, 0),
        ]);
        let mut arena = BbScratch::with_capacity_factor(code_obj.len(), 3);
        let mut metadata = MetadataTable::new();
        let mut jump_index = JumpTargetIndex::build(&code_obj, 5);
        let config = SpecializerConfig::default();
        let type_system = ts();
        let emitter = Emitter::new(&type_system);
        let stats = Stats::new();

        let mut incoming = TypeContext::unknown(2);
        incoming.set_local(0, Some(INT));
        incoming.set_local(1, Some(INT));

        let outcome = discover_bb(
            &code_obj,
            &mut arena,
            &mut metadata,
            &mut jump_index,
            &config,
            &emitter,
            &stats,
            0,
            &incoming,
        )
        .unwrap();

        assert_eq!(outcome.preceding_bb_id, None);
        assert_eq!(metadata.len(), 1);
        let words = arena.words();
        assert_eq!(words[0].opcode, Opcode::LoadFast);
        assert_eq!(words[1].opcode, Opcode::LoadFast);
        assert_eq!(words[2].opcode, Opcode::BinaryOpAddIntRest);
        assert_eq!(words[3].opcode, Opcode::ReturnValue);
        assert_eq!(words.len(), 4);
    }

    #[test]
    fn s2_unconditional_forward_jump_is_erased() {
        let code_obj = code(vec![
            InstructionWord::new(Opcode::LoadConst, 0),
            InstructionWord::new(Opcode::JumpForward, 1),
            InstructionWord::new(Opcode::LoadConst, 1),
            InstructionWord::new(Opcode::ReturnValue, 0),
        ]);
        let mut arena = BbScratch::with_capacity_factor(code_obj.len(), 3);
        let mut metadata = MetadataTable::new();
        let mut jump_index = JumpTargetIndex::build(&code_obj, 5);
        let config = SpecializerConfig::default();
        let type_system = ts();
        let emitter = Emitter::new(&type_system);
        let stats = Stats::new();
        let incoming = TypeContext::unknown(0);

        discover_bb(
            &code_obj,
            &mut arena,
            &mut metadata,
            &mut jump_index,
            &config,
            &emitter,
            &stats,
            0,
            &incoming,
        )
        .unwrap();

        let words = arena.words();
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].opcode, Opcode::LoadConst);
        assert_eq!(words[0].oparg, 0);
        assert_eq!(words[1].opcode, Opcode::ReturnValue);
    }

    #[test]
    fn loop_header_fallthrough_splits_into_two_bbs() {
        // offset0: LOAD_CONST (setup), offset1: FOR_ITER (loop header,
        // also the backward-jump target), offset2: RETURN_VALUE,
        // offset3: JUMP_BACKWARD -> target offset1.
        let code_obj = code(vec![
            InstructionWord::new(Opcode::LoadConst, 0),
            InstructionWord::new(Opcode::ForIter, 0),
            InstructionWord::new(Opcode::ReturnValue, 0),
            InstructionWord::new(Opcode::JumpBackward, 3),
        ]);
        let mut arena = BbScratch::with_capacity_factor(code_obj.len(), 3);
        let mut metadata = MetadataTable::new();
        let mut jump_index = JumpTargetIndex::build(&code_obj, 5);
        assert_eq!(jump_index.len(), 1);
        assert_eq!(jump_index.tier1_offset(0), 1);

        let config = SpecializerConfig::default();
        let type_system = ts();
        let emitter = Emitter::new(&type_system);
        let stats = Stats::new();
        let incoming = TypeContext::unknown(0);

        let outcome = discover_bb(
            &code_obj,
            &mut arena,
            &mut metadata,
            &mut jump_index,
            &config,
            &emitter,
            &stats,
            0,
            &incoming,
        )
        .unwrap();

        assert_eq!(metadata.len(), 2);
        assert!(outcome.preceding_bb_id.is_some());
        assert_eq!(outcome.bb_id, 1);
        assert_eq!(jump_index.first_version(0), Some(1));

        let header = metadata.get(1).unwrap();
        assert_eq!(header.tier1_start_if_jump_target, Some(1));
    }
}
