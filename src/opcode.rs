//! Opcode classifier.
//!
//! Pure, constant-time predicates over the instruction set, table-driven so
//! that new specializable opcodes can be added without touching call sites
//! (§4.1). The same `Opcode` space is shared by Tier-1 (source) and Tier-2
//! (emitted) instruction words, matching the host's "same layout" convention
//! for persisted bytecode.

/// One opcode in the shared Tier-1/Tier-2 instruction set.
///
/// Discriminants are stable and fit in a `u8`; `oparg` is carried alongside
/// in [`crate::code_object::InstructionWord`], never here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // -- Tier-1 source opcodes --------------------------------------------
    Resume = 0,
    LoadFast = 1,
    LoadConst = 2,
    StoreFast = 3,
    BinaryOp = 4,
    CompareOp = 5,
    CompareAndBranch = 6,
    PopJumpIfFalse = 7,
    PopJumpIfTrue = 8,
    ForIter = 9,
    EndFor = 10,
    JumpForward = 11,
    JumpBackward = 12,
    ReturnValue = 13,
    ReturnConst = 14,
    ExtendedArg = 15,

    // -- Forbidden opcodes (disqualify the whole code object) ------------
    YieldValue = 16,
    Send = 17,
    RaiseVarargs = 18,
    ReRaise = 19,
    PushExcInfo = 20,
    PopExcept = 21,
    MakeCell = 22,
    CopyFreeVars = 23,
    DeleteFast = 24,
    MatchClass = 25,
    MatchMapping = 26,
    MatchSequence = 27,
    InterpreterExit = 28,

    // -- Quick forms installed in place at bootstrap (§4.8) ---------------
    ResumeQuick = 29,
    JumpBackwardQuick = 30,

    // -- Specialized (type-stamped) variants --------------------------
    BinaryOpAddIntRest = 31,

    // -- Tier-2-only emitted opcodes --------------------------------------
    BbBranchIfFlagSet = 32,
    BbBranchIfFlagUnset = 33,
    BbTestIter = 34,
    BbJumpBackwardLazy = 35,
    BbJumpIfFlagSet = 36,
    BbJumpIfFlagUnset = 37,
    GuardType = 38,
    Nop = 39,

    /// Raw-data placeholder word. Used to overlay cache-tail storage with
    /// specializer-private payload (e.g. the high byte of a `bb_id`) --
    /// never executed, never decoded as a real operation (§6, "a BB_BRANCH
    /// stub's cache overlays a 16-bit bb_id; no other new persistence
    /// formats are introduced").
    CacheData = 40,
}

impl Opcode {
    /// Total number of distinct opcodes, for table sizing.
    pub const COUNT: usize = 41;

    /// Decode a raw byte back into an `Opcode`, if it names one.
    pub fn from_u8(byte: u8) -> Option<Self> {
        use Opcode::*;
        Some(match byte {
            0 => Resume,
            1 => LoadFast,
            2 => LoadConst,
            3 => StoreFast,
            4 => BinaryOp,
            5 => CompareOp,
            6 => CompareAndBranch,
            7 => PopJumpIfFalse,
            8 => PopJumpIfTrue,
            9 => ForIter,
            10 => EndFor,
            11 => JumpForward,
            12 => JumpBackward,
            13 => ReturnValue,
            14 => ReturnConst,
            15 => ExtendedArg,
            16 => YieldValue,
            17 => Send,
            18 => RaiseVarargs,
            19 => ReRaise,
            20 => PushExcInfo,
            21 => PopExcept,
            22 => MakeCell,
            23 => CopyFreeVars,
            24 => DeleteFast,
            25 => MatchClass,
            26 => MatchMapping,
            27 => MatchSequence,
            28 => InterpreterExit,
            29 => ResumeQuick,
            30 => JumpBackwardQuick,
            31 => BinaryOpAddIntRest,
            32 => BbBranchIfFlagSet,
            33 => BbBranchIfFlagUnset,
            34 => BbTestIter,
            35 => BbJumpBackwardLazy,
            36 => BbJumpIfFlagSet,
            37 => BbJumpIfFlagUnset,
            38 => GuardType,
            39 => Nop,
            40 => CacheData,
            _ => return None,
        })
    }

    /// Forbidden: presence anywhere in a code object disqualifies bootstrap.
    pub fn is_forbidden(self) -> bool {
        matches!(
            self,
            Opcode::YieldValue
                | Opcode::Send
                | Opcode::RaiseVarargs
                | Opcode::ReRaise
                | Opcode::PushExcInfo
                | Opcode::PopExcept
                | Opcode::MakeCell
                | Opcode::CopyFreeVars
                | Opcode::DeleteFast
                | Opcode::MatchClass
                | Opcode::MatchMapping
                | Opcode::MatchSequence
                | Opcode::ExtendedArg
        )
    }

    /// Scope-exit: always terminates a BB, emitted verbatim.
    pub fn is_scope_exit(self) -> bool {
        matches!(
            self,
            Opcode::ReturnValue
                | Opcode::ReturnConst
                | Opcode::RaiseVarargs
                | Opcode::ReRaise
                | Opcode::InterpreterExit
        )
    }

    /// Unconditional forward jump: erased at emission (§4.6).
    pub fn is_forward_jump(self) -> bool {
        matches!(self, Opcode::JumpForward)
    }

    /// Loop-edge opcode, conditional or not: a `BB_JUMP_BACKWARD_LAZY` stub
    /// is emitted and the target resolved through the Jump Target Index.
    pub fn is_backward_jump(self) -> bool {
        matches!(self, Opcode::JumpBackward | Opcode::JumpBackwardQuick)
    }

    /// Conditional branch family: terminates a BB with a branch stub.
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Opcode::PopJumpIfFalse | Opcode::PopJumpIfTrue | Opcode::ForIter
        )
    }

    /// Compiler-fused comparison + conditional jump (mirrors
    /// `dis.hascompare` / `IS_COMPARE_OPCODE` in the original source).
    pub fn is_compare(self) -> bool {
        matches!(self, Opcode::CompareOp | Opcode::CompareAndBranch)
    }

    /// Opcode for which the Emitter may attempt type specialization.
    pub fn is_optimizable(self) -> bool {
        matches!(self, Opcode::BinaryOp)
    }

    /// Number of cache (inline-cache) words trailing this instruction in
    /// the Tier-1 stream. A real embedder supplies this from its own decode
    /// table; this crate hardcodes a small table for its own opcode set.
    pub fn cache_entry_count(self) -> usize {
        match self {
            Opcode::BinaryOp | Opcode::CompareOp | Opcode::CompareAndBranch => 1,
            Opcode::ForIter => 1,
            Opcode::PopJumpIfFalse | Opcode::PopJumpIfTrue => 1,
            // One reserved word, overwritten with an `END_FOR` marker once
            // the lazy stub resolves (§4.9).
            Opcode::JumpBackward | Opcode::JumpBackwardQuick => 1,
            Opcode::LoadFast | Opcode::StoreFast => 0,
            _ => 0,
        }
    }

    /// The already-quick-form opcode this one is rewritten to in place at
    /// bootstrap (§4.8), or `None` if this opcode has no quick form.
    pub fn quick_form(self) -> Option<Opcode> {
        match self {
            Opcode::Resume => Some(Opcode::ResumeQuick),
            Opcode::JumpBackward => Some(Opcode::JumpBackwardQuick),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_and_scope_exit_are_populated() {
        assert!(Opcode::YieldValue.is_forbidden());
        assert!(Opcode::MatchClass.is_forbidden());
        assert!(Opcode::ExtendedArg.is_forbidden());
        assert!(!Opcode::LoadFast.is_forbidden());
    }

    #[test]
    fn scope_exit_includes_raise_and_rereaise_per_classifier_contract() {
        // These are also Forbidden, so a code object containing them never
        // reaches a point where is_scope_exit matters in practice -- but the
        // predicate itself must still classify them correctly if asked.
        assert!(Opcode::RaiseVarargs.is_scope_exit());
        assert!(Opcode::ReRaise.is_scope_exit());
        assert!(Opcode::ReturnValue.is_scope_exit());
        assert!(!Opcode::LoadFast.is_scope_exit());
    }

    #[test]
    fn forward_and_backward_jumps_are_disjoint() {
        assert!(Opcode::JumpForward.is_forward_jump());
        assert!(!Opcode::JumpForward.is_backward_jump());
        assert!(Opcode::JumpBackward.is_backward_jump());
        assert!(!Opcode::JumpBackward.is_forward_jump());
    }

    #[test]
    fn compare_and_branch_is_compare_but_not_plain_branch() {
        assert!(Opcode::CompareAndBranch.is_compare());
        assert!(!Opcode::CompareAndBranch.is_branch());
        assert!(Opcode::ForIter.is_branch());
        assert!(!Opcode::ForIter.is_compare());
    }

    #[test]
    fn quick_forms_round_trip() {
        assert_eq!(Opcode::Resume.quick_form(), Some(Opcode::ResumeQuick));
        assert_eq!(
            Opcode::JumpBackward.quick_form(),
            Some(Opcode::JumpBackwardQuick)
        );
        assert_eq!(Opcode::LoadFast.quick_form(), None);
    }

    #[test]
    fn from_u8_round_trips_every_discriminant() {
        for byte in 0..Opcode::COUNT as u8 {
            assert_eq!(Opcode::from_u8(byte).map(|op| op as u8), Some(byte));
        }
        assert_eq!(Opcode::from_u8(Opcode::COUNT as u8), None);
    }
}
