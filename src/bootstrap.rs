//! Bootstrap (§4.8): first-time initialization when a code object's
//! warm-up counter reaches threshold.
//!
//! Steps: scan for a Forbidden opcode (abort); scan for an Optimizable
//! opcode (abort if none); install the quick forms in place; allocate the
//! scratch arena, metadata table and Jump Target Index; discover the
//! entry BB at offset 0. A second call for a code object that already has
//! an entry in the [`Registry`] is a no-op (Testable Property 2) -- this
//! is checked before any scanning happens at all, matching the host's
//! `_tier2_info == NULL` assertion in the original.

use std::sync::Arc;

use tracing::debug;

use crate::code_object::CodeObject;
use crate::config::SpecializerConfig;
use crate::discovery::discover_bb;
use crate::emitter::Emitter;
use crate::error::SpecializeError;
use crate::jump_index::JumpTargetIndex;
use crate::metadata::MetadataTable;
use crate::registry::{BootstrapState, Registry};
use crate::stats::Stats;
use crate::tier2::Tier2Info;
use crate::type_context::{TypeContext, TypeSystem};

/// Attempt to specialize `code`, or return the previously recorded
/// outcome if this code object has already been through bootstrap once.
///
/// This is the `warmup` external interface of §6 in spirit: real hosts
/// call it from the interpreter's warm-up opcode and redirect the frame's
/// instruction pointer to [`Tier2Info::entry_tier2_start`] on
/// [`BootstrapState::Ready`]; this crate's own test harness (§12) does
/// exactly that in `src/interpreter.rs`.
pub fn bootstrap(
    registry: &Registry,
    code: CodeObject,
    type_system: TypeSystem,
    config: SpecializerConfig,
) -> BootstrapState {
    if let Some(existing) = registry.get(code.id()) {
        debug!(code_object_id = code.id(), "bootstrap no-op, already attempted");
        return existing;
    }

    for (offset, word) in code.words().iter().enumerate() {
        if word.opcode.is_forbidden() {
            let err = SpecializeError::UnsupportedProgram {
                opcode: word.opcode as u8,
                offset,
            };
            debug!(code_object_id = code.id(), %err, "bootstrap abandoned");
            return registry.record_if_absent(code.id(), BootstrapState::Abandoned(err));
        }
    }

    if !code.words().iter().any(|w| w.opcode.is_optimizable()) {
        let err = SpecializeError::UninterestingProgram;
        debug!(code_object_id = code.id(), %err, "bootstrap abandoned");
        return registry.record_if_absent(code.id(), BootstrapState::Abandoned(err));
    }

    let mut code = code;
    for offset in 0..code.len() {
        if let Some(quick) = code.word(offset).and_then(|w| w.opcode.quick_form()) {
            code.replace_opcode_in_place(offset, quick);
        }
    }

    let mut arena = crate::arena::BbScratch::with_capacity_factor(code.len(), config.initial_arena_factor);
    let mut metadata = MetadataTable::new();
    let mut jump_index = JumpTargetIndex::build(&code, config.max_bb_versions as usize);
    debug!(
        code_object_id = code.id(),
        jump_targets = jump_index.len(),
        "jump target index built"
    );
    let stats = Stats::new();
    stats.record_bootstrap_attempt();

    let initial_ctx = TypeContext::unknown(code.nlocals());
    let outcome = {
        let emitter = Emitter::new(&type_system);
        discover_bb(
            &code,
            &mut arena,
            &mut metadata,
            &mut jump_index,
            &config,
            &emitter,
            &stats,
            0,
            &initial_ctx,
        )
    };

    match outcome {
        Ok(outcome) => {
            // If the entry scan's very first offset fell inside a backward-jump
            // target that gets discovered later in the same call, `discover_bb`
            // splits it into two BBs and returns the *second* (the loop header).
            // The frame must still be redirected to the *first* one -- it holds
            // whatever Tier-1 instructions preceded the loop header at offset 0
            // and falls straight through into the header in the arena, so it is
            // always the true entry point when present.
            let entry_bb_id = outcome.preceding_bb_id.unwrap_or(outcome.bb_id);
            stats.record_bootstrap_success();
            debug!(code_object_id = code.id(), entry_bb = entry_bb_id, "bootstrap succeeded");
            let info = Tier2Info::new(
                code,
                type_system,
                config,
                stats,
                arena,
                metadata,
                jump_index,
                entry_bb_id,
            );
            registry.record_if_absent(code.id(), BootstrapState::Ready(Arc::new(info)))
        }
        Err(err) => {
            stats.record_abandon(&err);
            debug!(code_object_id = code.id(), %err, "bootstrap abandoned during entry BB discovery");
            registry.record_if_absent(code.id(), BootstrapState::Abandoned(err))
        }
    }
}
