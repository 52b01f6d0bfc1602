//! Integration tests for the Testable Properties' named scenarios (S1-S6),
//! driven end to end through the test-harness interpreter (§12,
//! SUPPLEMENT). Unit tests closer to each component already exercise the
//! emitted bytecode shape in isolation; these confirm the whole pipeline
//! -- bootstrap, lazy successor generation, backward-edge resolution, and
//! branch rewriting -- produces the same answer a Tier-1-only run would.

use tier2_specializer::code_object::{CodeObject, InstructionWord};
use tier2_specializer::config::SpecializerConfig;
use tier2_specializer::discovery::discover_bb;
use tier2_specializer::emitter::{Emitter, NB_ADD};
use tier2_specializer::error::SpecializeError;
use tier2_specializer::interpreter::{run_specialized, Frame};
use tier2_specializer::jump_index::JumpTargetIndex;
use tier2_specializer::metadata::MetadataTable;
use tier2_specializer::opcode::Opcode;
use tier2_specializer::registry::{BootstrapState, Registry};
use tier2_specializer::stats::Stats;
use tier2_specializer::type_context::{TypeContext, TypeId, TypeSystem};
use tier2_specializer::value::Value;

const INT: TypeId = TypeId(1);

fn type_system() -> TypeSystem {
    TypeSystem { int_type: INT }
}

/// S1: a straight-line function that only adds two locals together.
#[test]
fn s1_straight_line_addition_matches_tier1_semantics() {
    let code = CodeObject::new(
        1,
        vec![
            InstructionWord::new(Opcode::Resume, 0),
            InstructionWord::new(Opcode::LoadFast, 0),
            InstructionWord::new(Opcode::LoadFast, 1),
            InstructionWord::new(Opcode::BinaryOp, NB_ADD),
            InstructionWord::new(Opcode::Nop, 0),
            InstructionWord::new(Opcode::ReturnValue, 0),
        ],
        2,
    );
    let registry = Registry::new();
    let mut frame = Frame::new(2, vec![]);
    frame.locals[0] = Value::Int(3);
    frame.locals[1] = Value::Int(4);

    let (result, state) = run_specialized(&registry, code, type_system(), SpecializerConfig::default(), &mut frame);

    assert_eq!(result, Value::Int(7));
    assert!(matches!(state, BootstrapState::Ready(_)));
}

/// S2: an unconditional forward jump over dead code must be erased, not
/// executed, and the remaining instructions must still run correctly.
#[test]
fn s2_forward_jump_is_erased_and_dead_code_never_runs() {
    let code = CodeObject::new(
        1,
        vec![
            InstructionWord::new(Opcode::Resume, 0),       // 0
            InstructionWord::new(Opcode::LoadConst, 0),    // 1  push 100
            InstructionWord::new(Opcode::JumpForward, 2),  // 2  -> offset 5
            InstructionWord::new(Opcode::LoadConst, 1),    // 3  dead
            InstructionWord::new(Opcode::LoadConst, 2),    // 4  dead
            InstructionWord::new(Opcode::LoadFast, 0),     // 5
            InstructionWord::new(Opcode::BinaryOp, NB_ADD),// 6
            InstructionWord::new(Opcode::Nop, 0),           // 7  cache
            InstructionWord::new(Opcode::ReturnValue, 0),  // 8
        ],
        1,
    );
    let registry = Registry::new();
    let mut frame = Frame::new(1, vec![Value::Int(100), Value::Int(999), Value::Int(999)]);
    frame.locals[0] = Value::Int(1);

    let (result, state) = run_specialized(&registry, code, type_system(), SpecializerConfig::default(), &mut frame);
    assert_eq!(result, Value::Int(101));

    let info = match state {
        BootstrapState::Ready(info) => info,
        other => panic!("expected Ready, got {other:?}"),
    };
    let words = info.lock().arena.words().to_vec();
    assert!(
        !words.iter().any(|w| w.opcode == Opcode::LoadConst && (w.oparg == 1 || w.oparg == 2)),
        "erased dead code must never reach the scratch arena: {words:?}"
    );
}

/// S3: a counted loop exercises lazy successor generation for both the
/// loop body and the exit edge, and backward-jump resolution against an
/// already-registered version.
#[test]
fn s3_counted_loop_sums_a_range_through_successor_and_backward_resolution() {
    let code = CodeObject::new(
        1,
        vec![
            InstructionWord::new(Opcode::Resume, 0),        // 0
            InstructionWord::new(Opcode::LoadFast, 0),       // 1  push iterator
            InstructionWord::new(Opcode::ForIter, 6),        // 2  (+cache) taken -> offset 10
            InstructionWord::new(Opcode::Nop, 0),            // 3  cache
            InstructionWord::new(Opcode::LoadFast, 1),       // 4  push acc
            InstructionWord::new(Opcode::BinaryOp, NB_ADD),  // 5
            InstructionWord::new(Opcode::Nop, 0),            // 6  cache
            InstructionWord::new(Opcode::StoreFast, 1),      // 7
            InstructionWord::new(Opcode::JumpBackward, 7),   // 8  -> offset 2
            InstructionWord::new(Opcode::Nop, 0),            // 9  cache
            InstructionWord::new(Opcode::EndFor, 0),         // 10 pop dead iterator
            InstructionWord::new(Opcode::LoadFast, 1),       // 11
            InstructionWord::new(Opcode::ReturnValue, 0),    // 12
        ],
        2,
    );
    let registry = Registry::new();
    let mut frame = Frame::new(2, vec![]);
    frame.locals[0] = Value::range(0, 4);
    frame.locals[1] = Value::Int(0);

    let (result, state) = run_specialized(&registry, code, type_system(), SpecializerConfig::default(), &mut frame);
    assert_eq!(result, Value::Int(0 + 1 + 2 + 3));

    let info = match state {
        BootstrapState::Ready(info) => info,
        other => panic!("expected Ready, got {other:?}"),
    };
    let snap = info.stats.snapshot();
    assert_eq!(snap.bbs_emitted, 4, "preceding, header, body and exit BBs");
    assert_eq!(snap.backward_resolutions, 1);
    assert_eq!(snap.rewrites, 2, "one backward-jump rewrite, one forward-branch rewrite");
}

/// S4: a forbidden opcode anywhere in the code object abandons bootstrap
/// even when it sits in dead code, and execution falls back to Tier-1
/// entirely with no change in observable behavior.
#[test]
fn s4_forbidden_opcode_in_dead_code_still_abandons_bootstrap() {
    let code = CodeObject::new(
        1,
        vec![
            InstructionWord::new(Opcode::Resume, 0),        // 0
            InstructionWord::new(Opcode::LoadConst, 0),     // 1  push 100
            InstructionWord::new(Opcode::JumpForward, 1),   // 2  -> offset 4
            InstructionWord::new(Opcode::YieldValue, 0),    // 3  dead, forbidden
            InstructionWord::new(Opcode::LoadConst, 1),     // 4  push 23
            InstructionWord::new(Opcode::BinaryOp, NB_ADD), // 5
            InstructionWord::new(Opcode::Nop, 0),            // 6  cache
            InstructionWord::new(Opcode::ReturnValue, 0),   // 7
        ],
        0,
    );
    let registry = Registry::new();
    let mut frame = Frame::new(0, vec![Value::Int(100), Value::Int(23)]);

    let (result, state) = run_specialized(&registry, code, type_system(), SpecializerConfig::default(), &mut frame);

    assert_eq!(result, Value::Int(123));
    match state {
        BootstrapState::Abandoned(SpecializeError::UnsupportedProgram { offset, .. }) => {
            assert_eq!(offset, 3);
        }
        other => panic!("expected UnsupportedProgram, got {other:?}"),
    }
}

/// S5: a conditional branch's two directions are each generated lazily on
/// first use; once both have been visited the stub collapses into a
/// direct jump (§4.9), verified here by running both directions across
/// two calls that share one registry entry.
#[test]
fn s5_conditional_branch_resolves_both_directions_and_rewrites() {
    let code_words = vec![
        InstructionWord::new(Opcode::Resume, 0),           // 0
        InstructionWord::new(Opcode::LoadFast, 0),         // 1  push flag
        InstructionWord::new(Opcode::PopJumpIfFalse, 2),   // 2  (+cache) -> offset 6 if false
        InstructionWord::new(Opcode::Nop, 0),              // 3  cache
        InstructionWord::new(Opcode::LoadConst, 0),        // 4  THEN: push 100
        InstructionWord::new(Opcode::JumpForward, 1),      // 5  -> offset 7
        InstructionWord::new(Opcode::LoadConst, 1),        // 6  ELSE: push 200
        InstructionWord::new(Opcode::LoadFast, 1),         // 7  MERGE: push addend
        InstructionWord::new(Opcode::BinaryOp, NB_ADD),    // 8
        InstructionWord::new(Opcode::Nop, 0),               // 9  cache
        InstructionWord::new(Opcode::ReturnValue, 0),      // 10
    ];
    let registry = Registry::new();

    let mut then_frame = Frame::new(2, vec![Value::Int(100), Value::Int(200)]);
    then_frame.locals[0] = Value::Int(1);
    then_frame.locals[1] = Value::Int(5);
    let (then_result, _) = run_specialized(
        &registry,
        CodeObject::new(1, code_words.clone(), 2),
        type_system(),
        SpecializerConfig::default(),
        &mut then_frame,
    );
    assert_eq!(then_result, Value::Int(105));

    let mut else_frame = Frame::new(2, vec![Value::Int(100), Value::Int(200)]);
    else_frame.locals[0] = Value::Int(0);
    else_frame.locals[1] = Value::Int(5);
    let (else_result, state) = run_specialized(
        &registry,
        CodeObject::new(1, code_words, 2),
        type_system(),
        SpecializerConfig::default(),
        &mut else_frame,
    );
    assert_eq!(else_result, Value::Int(205));

    let info = match state {
        BootstrapState::Ready(info) => info,
        other => panic!("expected Ready, got {other:?}"),
    };
    assert!(
        info.stats.snapshot().rewrites >= 1,
        "both directions visited, the branch stub should have collapsed to a direct jump"
    );
}

/// S6: once a loop header has `max_bb_versions` specialized versions
/// registered, a further request for a new version at the same target
/// is abandoned rather than silently growing past the configured cap.
#[test]
fn s6_version_exhaustion_abandons_a_new_version_request() {
    let code = CodeObject::new(
        1,
        vec![
            InstructionWord::new(Opcode::LoadConst, 0),
            InstructionWord::new(Opcode::ForIter, 0),
            InstructionWord::new(Opcode::ReturnValue, 0),
            InstructionWord::new(Opcode::JumpBackward, 3),
        ],
        0,
    );
    let mut arena = tier2_specializer::arena::BbScratch::with_capacity_factor(code.len(), 3);
    let mut metadata = MetadataTable::new();
    let mut jump_index = JumpTargetIndex::build(&code, 1);
    assert_eq!(jump_index.len(), 1);
    assert_eq!(jump_index.tier1_offset(0), 1);

    let config = SpecializerConfig::default();
    let ts = type_system();
    let emitter = Emitter::new(&ts);
    let stats = Stats::new();

    let first = discover_bb(
        &code,
        &mut arena,
        &mut metadata,
        &mut jump_index,
        &config,
        &emitter,
        &stats,
        1,
        &TypeContext::unknown(0),
    );
    assert!(first.is_ok());
    assert_eq!(jump_index.first_version(0), Some(0));

    let second = discover_bb(
        &code,
        &mut arena,
        &mut metadata,
        &mut jump_index,
        &config,
        &emitter,
        &stats,
        1,
        &TypeContext::unknown(0),
    );
    match second {
        Err(SpecializeError::TooManyVersions { target_offset }) => assert_eq!(target_offset, 1),
        other => panic!("expected TooManyVersions, got {other:?}"),
    }
}
