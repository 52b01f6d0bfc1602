//! Branch Rewriter (§4.9): in-place patching of emitted branch stubs once
//! both successors exist, and of lazy backward-jump stubs once their
//! target BB is resolved.
//!
//! Both rewrites are a single aligned-word (or two-word, with an
//! `EXTENDED_ARG` prefix) publish: readers racing the rewrite observe
//! either the stub (and harmlessly re-enter the specializer) or the
//! rewritten direct jump (§5).

use crate::arena::BbScratch;
use crate::code_object::InstructionWord;
use crate::opcode::Opcode;

fn split_u16(v: u16) -> (u8, u8) {
    (v as u8, (v >> 8) as u8)
}

/// Patch a conditional-branch stub at `stub_offset` (the arena offset of
/// the `BB_BRANCH_IF_FLAG_{SET,UNSET}` word, i.e. one past the test
/// instruction) into a direct jump to `taken_target`, the *taken*
/// direction's `tier2_start` (§4.9). The non-taken direction needs no
/// rewrite: its successor was appended immediately following the stub, so
/// falling through already reaches it.
///
/// Displacement is `taken_target - stub_offset - 1`; values over 8 bits
/// consume the reserved `EXTENDED_ARG` word, otherwise that word becomes a
/// `NOP`.
pub fn rewrite_forward_branch(
    arena: &mut BbScratch,
    stub_offset: usize,
    polarity_set: bool,
    taken_target: usize,
) {
    let displacement = (taken_target.saturating_sub(stub_offset + 1)) as u16;
    let (low, high) = split_u16(displacement);
    let op = if polarity_set {
        Opcode::BbJumpIfFlagSet
    } else {
        Opcode::BbJumpIfFlagUnset
    };
    if high != 0 {
        arena.patch(stub_offset, InstructionWord::new(Opcode::ExtendedArg, high));
    } else {
        arena.patch(stub_offset, InstructionWord::new(Opcode::Nop, 0));
    }
    arena.patch(stub_offset + 1, InstructionWord::new(op, low));
}

/// Patch a resolved lazy backward-jump stub at `stub_offset` (the arena
/// offset of the `EXTENDED_ARG` word opening the stub) into a direct
/// `JUMP_BACKWARD_QUICK` to `target`, followed by an `END_FOR` occupying
/// the stub's third, reserved word (§4.9). The displacement is negated
/// relative to the forward case: `(stub_offset + 1) - target`.
pub fn rewrite_backward_jump(arena: &mut BbScratch, stub_offset: usize, target: usize) {
    let displacement = ((stub_offset + 1).saturating_sub(target)) as u16;
    let (low, high) = split_u16(displacement);
    if high != 0 {
        arena.patch(stub_offset, InstructionWord::new(Opcode::ExtendedArg, high));
    } else {
        arena.patch(stub_offset, InstructionWord::new(Opcode::Nop, 0));
    }
    arena.patch(
        stub_offset + 1,
        InstructionWord::new(Opcode::JumpBackwardQuick, low),
    );
    arena.patch(stub_offset + 2, InstructionWord::new(Opcode::EndFor, 0));
}

/// Whether the word at `offset` is still an unresolved stub opcode (used
/// by Testable Property 5: after both successors are reached, no
/// `BB_BRANCH`/`BB_JUMP_BACKWARD_LAZY` opcode remains).
pub fn is_unresolved_stub(arena: &BbScratch, offset: usize) -> bool {
    matches!(
        arena.word(offset).map(|w| w.opcode),
        Some(Opcode::BbBranchIfFlagSet)
            | Some(Opcode::BbBranchIfFlagUnset)
            | Some(Opcode::BbJumpBackwardLazy)
    )
}
