//! Emitter: converts one Tier-1 instruction into zero or more Tier-2
//! instructions (§4.5). BB Discovery drives this module one instruction at
//! a time; the Emitter never advances the Tier-1 cursor itself and never
//! decides BB termination -- those are Discovery's job.

use crate::arena::BbScratch;
use crate::code_object::{CodeObject, InstructionWord};
use crate::error::SpecializeResult;
use crate::opcode::Opcode;
use crate::type_context::{TypeContext, TypeSystem};

/// Binary-op "kind" oparg naming integer addition, the only specialized
/// pattern this specification's Optimizable set recognizes (§4.1).
pub const NB_ADD: u8 = 0;

fn split_u16(v: u16) -> (u8, u8) {
    (v as u8, (v >> 8) as u8)
}

/// Copy the Tier-1 inline-cache tail trailing the instruction at `offset`
/// verbatim, so existing specialization information is preserved (§4.4).
fn cache_tail(code: &CodeObject, offset: usize, opcode: Opcode) -> Vec<InstructionWord> {
    (1..=opcode.cache_entry_count())
        .map(|i| {
            code.word(offset + i)
                .unwrap_or(InstructionWord::new(Opcode::Nop, 0))
        })
        .collect()
}

/// Outcome of attempting to specialize a `BinaryOp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOpDecision {
    /// Both operand types known and matched a recognized pattern: emit the
    /// zero-guard specialized variant.
    AddIntRest,
    /// At least one operand type is unknown, or the pattern wasn't
    /// recognized. The single-guard path is scaffolded but not chosen by
    /// this emitter (§9, "Guarded specialization") -- it always falls back
    /// here rather than ever emitting `GuardType`.
    Unspecialized,
}

pub struct Emitter<'a> {
    pub type_system: &'a TypeSystem,
}

impl<'a> Emitter<'a> {
    pub fn new(type_system: &'a TypeSystem) -> Self {
        Self { type_system }
    }

    /// Inspect the working type context's top two stack-shadow entries --
    /// the two most recent local/const loads -- and decide how to
    /// specialize a `BinaryOp` with the given kind oparg (§4.5).
    fn decide_binary_op(&self, oparg: u8, ctx: &TypeContext) -> BinaryOpDecision {
        if oparg != NB_ADD {
            return BinaryOpDecision::Unspecialized;
        }
        let rhs = ctx.peek(0);
        let lhs = ctx.peek(1);
        match (lhs, rhs) {
            (Some(l), Some(r)) if l == self.type_system.int_type && r == self.type_system.int_type => {
                BinaryOpDecision::AddIntRest
            }
            _ => BinaryOpDecision::Unspecialized,
        }
    }

    /// Emit the Tier-2 instruction(s) for one "other" Tier-1 instruction:
    /// anything that isn't a scope-exit, a jump, a branch, `Resume`, or the
    /// end-for marker, all of which Discovery handles directly (§4.4).
    ///
    /// Updates `ctx` in place and returns the arena offset the instruction
    /// was written at.
    pub fn emit_other(
        &self,
        arena: &mut BbScratch,
        code: &CodeObject,
        offset: usize,
        word: InstructionWord,
        ctx: &mut TypeContext,
    ) -> SpecializeResult<usize> {
        match word.opcode {
            Opcode::BinaryOp => {
                let decision = self.decide_binary_op(word.oparg, ctx);
                ctx.pop();
                ctx.pop();
                let tail = cache_tail(code, offset, word.opcode);
                let start = match decision {
                    BinaryOpDecision::AddIntRest => {
                        let s = arena.append(InstructionWord::new(
                            Opcode::BinaryOpAddIntRest,
                            word.oparg,
                        ))?;
                        arena.append_many(&tail)?;
                        ctx.push(Some(self.type_system.int_type));
                        s
                    }
                    BinaryOpDecision::Unspecialized => {
                        let s = arena.append(word)?;
                        arena.append_many(&tail)?;
                        ctx.push(None);
                        s
                    }
                };
                Ok(start)
            }
            Opcode::LoadFast => {
                let ty = ctx.local(word.oparg as usize);
                let start = arena.append(word)?;
                ctx.push(ty);
                Ok(start)
            }
            Opcode::LoadConst => {
                let start = arena.append(word)?;
                ctx.push(None);
                Ok(start)
            }
            Opcode::StoreFast => {
                let ty = ctx.pop();
                ctx.set_local(word.oparg as usize, ty);
                let start = arena.append(word)?;
                Ok(start)
            }
            Opcode::CompareOp => {
                let tail = cache_tail(code, offset, word.opcode);
                let start = arena.append(word)?;
                arena.append_many(&tail)?;
                ctx.pop();
                ctx.pop();
                ctx.push(None);
                Ok(start)
            }
            _ => {
                // Conservative fallback for any opcode not named above:
                // pass through unchanged, result type unknown. Reachable
                // only if the classifier's Optimizable/jump/scope-exit
                // tables are extended without a matching Emitter case.
                let start = arena.append(word)?;
                ctx.push(None);
                Ok(start)
            }
        }
    }

    /// Reduce a `CompareAndBranch` pseudo-opcode to a plain compare-op
    /// write; the branch half is handled separately by the branch-stub
    /// path (§4.1, §4.4).
    pub fn reduce_compare_and_branch(
        &self,
        arena: &mut BbScratch,
        ctx: &mut TypeContext,
        oparg: u8,
    ) -> SpecializeResult<usize> {
        let start = arena.append(InstructionWord::new(Opcode::CompareOp, oparg))?;
        ctx.pop();
        ctx.pop();
        ctx.push(None);
        Ok(start)
    }

    /// Rewrite a `Resume` to its quick form verbatim (§4.4); this is an
    /// in-stream rewrite distinct from the in-place bootstrap substitution
    /// of §4.8, applied when `Resume` shows up mid-scan rather than at
    /// the bootstrap pre-pass.
    pub fn emit_resume_quick(&self, arena: &mut BbScratch, oparg: u8) -> SpecializeResult<usize> {
        arena.append(InstructionWord::new(Opcode::ResumeQuick, oparg))
    }

    /// Emit a conditional-branch stub: the test opcode verbatim, followed
    /// by a `BB_BRANCH` stub word whose cache overlay stores `next_bb_id`,
    /// split across the stub's own oparg (low byte) and the original
    /// cache tail's first word, repurposed to carry the high byte (§4.5,
    /// §6). `polarity_set` selects `BbBranchIfFlagSet` (branch taken when
    /// the predicate is true, e.g. `PopJumpIfTrue`) vs.
    /// `BbBranchIfFlagUnset` (`PopJumpIfFalse`).
    pub fn emit_branch_stub(
        &self,
        arena: &mut BbScratch,
        test_word: InstructionWord,
        polarity_set: bool,
        next_bb_id: u16,
    ) -> SpecializeResult<usize> {
        let start = arena.append(test_word)?;
        let stub_opcode = if polarity_set {
            Opcode::BbBranchIfFlagSet
        } else {
            Opcode::BbBranchIfFlagUnset
        };
        let (low, high) = split_u16(next_bb_id);
        arena.append(InstructionWord::new(stub_opcode, low))?;
        arena.append(InstructionWord::new(Opcode::CacheData, high))?;
        Ok(start)
    }

    /// Emit a `for-iter` stub: `{BB_TEST_ITER, oparg}` followed by the
    /// `BB_BRANCH` stub sequence, biased so existing jump arithmetic lands
    /// past the stub tail (§4.5). In this instruction set `oparg` carries
    /// no displacement of its own (the stub fully owns control transfer),
    /// so the bias is always zero; the parameter exists so a richer
    /// decode table could thread one through.
    pub fn emit_for_iter_stub(
        &self,
        arena: &mut BbScratch,
        oparg: u8,
        next_bb_id: u16,
    ) -> SpecializeResult<usize> {
        let start = arena.append(InstructionWord::new(Opcode::BbTestIter, oparg))?;
        let (low, high) = split_u16(next_bb_id);
        arena.append(InstructionWord::new(Opcode::BbBranchIfFlagUnset, low))?;
        arena.append(InstructionWord::new(Opcode::CacheData, high))?;
        Ok(start)
    }

    /// Emit a lazy backward-jump stub: `{EXTENDED_ARG, high(jumpby)}
    /// {BB_JUMP_BACKWARD_LAZY, low(jumpby)}` plus one reserved cache word
    /// (§4.5). `ExtendedArg` is constructed here directly rather than
    /// through any classifier check -- Forbidden-opcode classification
    /// applies only to *incoming* Tier-1 bytecode (§9, "extended-arg
    /// handling"). The reserved word is overwritten with `END_FOR` in
    /// place once the Branch Rewriter resolves this stub (§4.9); it is
    /// never read before then.
    pub fn emit_backward_jump_stub(
        &self,
        arena: &mut BbScratch,
        jumpby: u16,
    ) -> SpecializeResult<usize> {
        let (low, high) = split_u16(jumpby);
        let start = arena.append(InstructionWord::new(Opcode::ExtendedArg, high))?;
        arena.append(InstructionWord::new(Opcode::BbJumpBackwardLazy, low))?;
        arena.append(InstructionWord::new(Opcode::CacheData, 0))?;
        Ok(start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_context::TypeId;

    const INT: TypeId = TypeId(1);

    fn type_system() -> TypeSystem {
        TypeSystem { int_type: INT }
    }

    fn empty_code() -> CodeObject {
        CodeObject::new(1, vec![InstructionWord::new(Opcode::Nop, 0); 8], 2)
    }

    #[test]
    fn binary_op_specializes_when_both_operands_are_known_int() {
        let ts = type_system();
        let emitter = Emitter::new(&ts);
        let code = empty_code();
        let mut arena = BbScratch::with_capacity_factor(8, 3);
        let mut ctx = TypeContext::unknown(2);
        ctx.push(Some(INT));
        ctx.push(Some(INT));

        let word = InstructionWord::new(Opcode::BinaryOp, NB_ADD);
        emitter
            .emit_other(&mut arena, &code, 0, word, &mut ctx)
            .unwrap();

        assert_eq!(arena.word(0).unwrap().opcode, Opcode::BinaryOpAddIntRest);
        assert_eq!(ctx.peek(0), Some(INT));
    }

    #[test]
    fn binary_op_falls_back_when_an_operand_is_unknown() {
        let ts = type_system();
        let emitter = Emitter::new(&ts);
        let code = empty_code();
        let mut arena = BbScratch::with_capacity_factor(8, 3);
        let mut ctx = TypeContext::unknown(2);
        ctx.push(None);
        ctx.push(Some(INT));

        let word = InstructionWord::new(Opcode::BinaryOp, NB_ADD);
        emitter
            .emit_other(&mut arena, &code, 0, word, &mut ctx)
            .unwrap();

        assert_eq!(arena.word(0).unwrap().opcode, Opcode::BinaryOp);
        assert_eq!(ctx.peek(0), None);
    }

    #[test]
    fn load_fast_pushes_the_locals_known_type() {
        let ts = type_system();
        let emitter = Emitter::new(&ts);
        let code = empty_code();
        let mut arena = BbScratch::with_capacity_factor(8, 3);
        let mut ctx = TypeContext::unknown(2);
        ctx.set_local(0, Some(INT));

        let word = InstructionWord::new(Opcode::LoadFast, 0);
        emitter
            .emit_other(&mut arena, &code, 0, word, &mut ctx)
            .unwrap();
        assert_eq!(ctx.peek(0), Some(INT));
    }

    #[test]
    fn branch_stub_overlays_bb_id_across_stub_and_cache_word() {
        let ts = type_system();
        let emitter = Emitter::new(&ts);
        let mut arena = BbScratch::with_capacity_factor(8, 3);
        let test_word = InstructionWord::new(Opcode::PopJumpIfFalse, 0);
        let start = emitter
            .emit_branch_stub(&mut arena, test_word, false, 0x0102)
            .unwrap();
        assert_eq!(arena.word(start).unwrap(), test_word);
        assert_eq!(arena.word(start + 1).unwrap().opcode, Opcode::BbBranchIfFlagUnset);
        assert_eq!(arena.word(start + 1).unwrap().oparg, 0x02);
        assert_eq!(arena.word(start + 2).unwrap().opcode, Opcode::CacheData);
        assert_eq!(arena.word(start + 2).unwrap().oparg, 0x01);
    }

    #[test]
    fn backward_jump_stub_splits_displacement_across_extended_arg() {
        let ts = type_system();
        let emitter = Emitter::new(&ts);
        let mut arena = BbScratch::with_capacity_factor(8, 3);
        let start = emitter.emit_backward_jump_stub(&mut arena, 0x0304).unwrap();
        assert_eq!(arena.word(start).unwrap().opcode, Opcode::ExtendedArg);
        assert_eq!(arena.word(start).unwrap().oparg, 0x03);
        assert_eq!(arena.word(start + 1).unwrap().opcode, Opcode::BbJumpBackwardLazy);
        assert_eq!(arena.word(start + 1).unwrap().oparg, 0x04);
    }
}
