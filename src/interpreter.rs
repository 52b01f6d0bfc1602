//! Test-harness execution loop (§12, SUPPLEMENT).
//!
//! The specializer's design treats the Tier-1 interpreter loop, its decode
//! tables, and the type system as external collaborators it never owns.
//! To drive Testable Property 1 (semantic equivalence) to an observable
//! result rather than only inspecting emitted bytecode shape, this module
//! stands in for all three: a tree-walking Tier-1 executor over a raw
//! [`CodeObject`], and a Tier-2 executor that walks the scratch arena the
//! same way a real `ceval` loop would, re-entering [`generate_next_bb`] and
//! [`locate_backward_bb`] exactly at the points a live frame would.
//!
//! Not part of the public API: gated the same way as [`crate::value`].

use crate::branch_rewriter::is_unresolved_stub;
use crate::bootstrap::bootstrap;
use crate::code_object::{CodeObject, InstructionWord};
use crate::config::SpecializerConfig;
use crate::metadata::{MetadataTable, Terminator};
use crate::opcode::Opcode;
use crate::registry::{BootstrapState, Registry};
use crate::successor::{generate_next_bb, locate_backward_bb, SuccessorOutcome};
use crate::tier2::Tier2Info;
use crate::type_context::TypeSystem;
use crate::value::Value;

/// `CompareOp`/`CompareAndBranch` kind oparg values this harness decodes.
pub const CMP_LT: u8 = 0;
pub const CMP_LE: u8 = 1;
pub const CMP_EQ: u8 = 2;
pub const CMP_NE: u8 = 3;
pub const CMP_GT: u8 = 4;
pub const CMP_GE: u8 = 5;

fn compare(oparg: u8, a: i64, b: i64) -> bool {
    match oparg {
        CMP_LT => a < b,
        CMP_LE => a <= b,
        CMP_EQ => a == b,
        CMP_NE => a != b,
        CMP_GT => a > b,
        CMP_GE => a >= b,
        _ => false,
    }
}

/// A running frame's mutable state: locals, constants, and the operand
/// stack. Shared verbatim between the Tier-1 and Tier-2 executors, the way
/// a real frame's value stack survives a mid-function tier transition.
#[derive(Debug, Clone)]
pub struct Frame {
    pub locals: Vec<Value>,
    pub consts: Vec<Value>,
    pub stack: Vec<Value>,
}

impl Frame {
    pub fn new(nlocals: usize, consts: Vec<Value>) -> Self {
        Self {
            locals: vec![Value::Int(0); nlocals],
            consts,
            stack: Vec::new(),
        }
    }
}

/// Outcome of decoding and executing one Tier-1 instruction.
enum Step {
    Continue(usize),
    Return(Value),
}

fn step_tier1(code: &CodeObject, frame: &mut Frame, cursor: usize) -> Step {
    let word = code
        .word(cursor)
        .expect("tier-1 cursor must stay within the code object");
    let next = cursor + 1 + word.opcode.cache_entry_count();
    match word.opcode {
        Opcode::Resume | Opcode::ResumeQuick => Step::Continue(next),
        Opcode::LoadFast => {
            frame.stack.push(frame.locals[word.oparg as usize]);
            Step::Continue(next)
        }
        Opcode::LoadConst => {
            frame.stack.push(frame.consts[word.oparg as usize]);
            Step::Continue(next)
        }
        Opcode::StoreFast => {
            let v = frame.stack.pop().expect("store-fast needs an operand");
            frame.locals[word.oparg as usize] = v;
            Step::Continue(next)
        }
        Opcode::BinaryOp => {
            let b = frame.stack.pop().expect("binary-op rhs").as_int();
            let a = frame.stack.pop().expect("binary-op lhs").as_int();
            frame.stack.push(Value::Int(a + b));
            Step::Continue(next)
        }
        Opcode::CompareOp => {
            let b = frame.stack.pop().expect("compare rhs").as_int();
            let a = frame.stack.pop().expect("compare lhs").as_int();
            frame.stack.push(Value::Bool(compare(word.oparg, a, b)));
            Step::Continue(next)
        }
        Opcode::PopJumpIfFalse => {
            let cond = frame.stack.pop().expect("branch condition").as_bool();
            if cond {
                Step::Continue(next)
            } else {
                Step::Continue(next + word.oparg as usize)
            }
        }
        Opcode::PopJumpIfTrue => {
            let cond = frame.stack.pop().expect("branch condition").as_bool();
            if cond {
                Step::Continue(next + word.oparg as usize)
            } else {
                Step::Continue(next)
            }
        }
        Opcode::ForIter => {
            let top = frame.stack.last_mut().expect("for-iter needs an iterator");
            match top.next_iter() {
                Some(v) => {
                    frame.stack.push(v);
                    Step::Continue(next)
                }
                None => Step::Continue(next + word.oparg as usize),
            }
        }
        Opcode::EndFor => {
            frame.stack.pop();
            Step::Continue(next)
        }
        Opcode::JumpForward => Step::Continue(next + word.oparg as usize),
        Opcode::JumpBackward | Opcode::JumpBackwardQuick => {
            Step::Continue((cursor + 1).saturating_sub(word.oparg as usize))
        }
        Opcode::ReturnValue => Step::Return(frame.stack.pop().expect("return value")),
        Opcode::ReturnConst => Step::Return(frame.consts[word.oparg as usize]),
        other => panic!("test-harness tier-1 executor does not model {other:?}"),
    }
}

/// Run the naive tree-walking Tier-1 executor from Tier-1 offset `start`.
/// Used both as the top-level entry point and as the fallback resume point
/// when a Tier-2 successor request is abandoned (§7).
pub fn run_tier1_from(code: &CodeObject, frame: &mut Frame, start: usize) -> Value {
    let mut cursor = start;
    loop {
        match step_tier1(code, frame, cursor) {
            Step::Continue(next) => cursor = next,
            Step::Return(v) => return v,
        }
    }
}

pub fn run_tier1(code: &CodeObject, frame: &mut Frame) -> Value {
    run_tier1_from(code, frame, 0)
}

/// Outcome of running the Tier-2 arena generically up to a known stop
/// offset (a BB's scope-exit is the only way to leave without reaching
/// one).
enum RunOutcome {
    Returned(Value),
    ReachedStop,
}

fn read_word(tier2: &Tier2Info, offset: usize) -> InstructionWord {
    tier2
        .lock()
        .arena
        .word(offset)
        .unwrap_or_else(|| panic!("tier-2 arena read out of bounds at {offset}"))
}

/// The id of the BB whose `[tier2_start, tier2_end)` range contains
/// `offset`. BBs are registered in increasing `tier2_start` order (the
/// arena is append-only), so the last entry starting at or before `offset`
/// is the containing one.
fn find_bb_containing(metadata: &MetadataTable, offset: usize) -> u16 {
    let mut best = 0u16;
    for m in metadata.iter() {
        if m.tier2_start <= offset {
            best = m.id;
        } else {
            break;
        }
    }
    best
}

/// Run generic (non-terminating) Tier-2 instructions from `*cursor`,
/// mutating `frame`, until either a scope-exit opcode returns a value or
/// `stop` is reached. `stop = None` only for a BB whose terminator is
/// itself a scope-exit.
fn run_generic(tier2: &Tier2Info, frame: &mut Frame, cursor: &mut usize, stop: Option<usize>) -> RunOutcome {
    loop {
        if let Some(stop) = stop {
            if *cursor >= stop {
                return RunOutcome::ReachedStop;
            }
        }
        let word = read_word(tier2, *cursor);
        match word.opcode {
            Opcode::Resume | Opcode::ResumeQuick | Opcode::Nop => *cursor += 1,
            Opcode::LoadFast => {
                frame.stack.push(frame.locals[word.oparg as usize]);
                *cursor += 1;
            }
            Opcode::LoadConst => {
                frame.stack.push(frame.consts[word.oparg as usize]);
                *cursor += 1;
            }
            Opcode::StoreFast => {
                let v = frame.stack.pop().expect("store-fast needs an operand");
                frame.locals[word.oparg as usize] = v;
                *cursor += 1;
            }
            Opcode::BinaryOp | Opcode::BinaryOpAddIntRest => {
                let b = frame.stack.pop().expect("binary-op rhs").as_int();
                let a = frame.stack.pop().expect("binary-op lhs").as_int();
                frame.stack.push(Value::Int(a + b));
                *cursor += 2;
            }
            Opcode::CompareOp => {
                let b = frame.stack.pop().expect("compare rhs").as_int();
                let a = frame.stack.pop().expect("compare lhs").as_int();
                frame.stack.push(Value::Bool(compare(word.oparg, a, b)));
                *cursor += 2;
            }
            Opcode::EndFor => {
                frame.stack.pop();
                *cursor += 1;
            }
            Opcode::ReturnValue => return RunOutcome::Returned(frame.stack.pop().expect("return value")),
            Opcode::ReturnConst => return RunOutcome::Returned(frame.consts[word.oparg as usize]),
            other => panic!("run_tier2_driven: unexpected opcode {other:?} at offset {}", *cursor),
        }
    }
}

/// Decode a resolved direct jump's target, whichever of the two forms the
/// Branch Rewriter installed (§4.9): `{NOP, low}` for a small displacement
/// or `{EXTENDED_ARG(high), low}` for a large one. `base` is the arena
/// offset the displacement is measured from (`stub_offset + 1` in both the
/// forward and backward rewrite formulas).
fn decode_displacement(word_a: InstructionWord, word_b: InstructionWord) -> u16 {
    if word_a.opcode == Opcode::ExtendedArg {
        ((word_a.oparg as u16) << 8) | word_b.oparg as u16
    } else {
        word_b.oparg as u16
    }
}

/// Execute the emitted Tier-2 form of a bootstrapped code object, falling
/// back to Tier-1 execution from wherever a successor request is
/// abandoned (§6, §7). This is the harness's analogue of a real
/// interpreter's `ceval` loop running specialized bytecode.
pub fn run_tier2_driven(tier2: &Tier2Info, frame: &mut Frame) -> Value {
    let mut bb_id = tier2.entry_bb_id;
    let mut cursor = tier2.entry_tier2_start();

    loop {
        let terminator = tier2
            .lock()
            .metadata
            .get(bb_id)
            .expect("bb_id always names a registered bb")
            .terminator;

        match terminator {
            Terminator::ScopeExit => match run_generic(tier2, frame, &mut cursor, None) {
                RunOutcome::Returned(v) => return v,
                RunOutcome::ReachedStop => unreachable!("a scope-exit bb always returns"),
            },

            Terminator::FallthroughSplit => {
                let tier2_end = tier2.lock().metadata.get(bb_id).unwrap().tier2_end;
                match run_generic(tier2, frame, &mut cursor, Some(tier2_end)) {
                    RunOutcome::Returned(v) => return v,
                    RunOutcome::ReachedStop => bb_id += 1,
                }
            }

            Terminator::Branch {
                stub_offset,
                taken_jumpby,
                ..
            } => {
                let tail_start = stub_offset - 1;
                match run_generic(tier2, frame, &mut cursor, Some(tail_start)) {
                    RunOutcome::Returned(v) => return v,
                    RunOutcome::ReachedStop => {}
                }

                let test_word = read_word(tier2, tail_start);
                let taken = if test_word.opcode == Opcode::BbTestIter {
                    let top = frame.stack.last_mut().expect("for-iter operand");
                    match top.next_iter() {
                        Some(v) => {
                            frame.stack.push(v);
                            false
                        }
                        None => true,
                    }
                } else {
                    let cond = frame.stack.pop().expect("branch condition").as_bool();
                    cond == (test_word.opcode == Opcode::PopJumpIfTrue)
                };

                let still_stub = { is_unresolved_stub(&tier2.lock().arena, stub_offset) };
                if still_stub {
                    let jumpby = if taken { taken_jumpby } else { 0 };
                    match generate_next_bb(tier2, bb_id, jumpby) {
                        SuccessorOutcome::Resolved { bb_id: next_id, tier2_start } => {
                            bb_id = next_id;
                            cursor = tier2_start;
                        }
                        SuccessorOutcome::Fallback { tier1_offset, .. } => {
                            return run_tier1_from(&tier2.code, frame, tier1_offset);
                        }
                    }
                } else if taken {
                    let word_a = read_word(tier2, stub_offset);
                    let word_b = read_word(tier2, stub_offset + 1);
                    let displacement = decode_displacement(word_a, word_b);
                    let target = stub_offset + 1 + displacement as usize;
                    cursor = target;
                    bb_id = find_bb_containing(&tier2.lock().metadata, target);
                } else {
                    // The fall-through successor was appended directly
                    // after the stub and never needs a rewrite (§4.9).
                    cursor = stub_offset + 2;
                    bb_id = find_bb_containing(&tier2.lock().metadata, cursor);
                }
            }

            Terminator::BackwardJump { stub_offset, .. } => {
                match run_generic(tier2, frame, &mut cursor, Some(stub_offset)) {
                    RunOutcome::Returned(v) => return v,
                    RunOutcome::ReachedStop => {}
                }

                // The lazy-stub marker opcode for a backward jump sits one
                // word past `stub_offset` (the `EXTENDED_ARG` prefix word
                // never changes opcode across resolution); `EXTENDED_ARG`
                // itself is never a member of the unresolved-stub set.
                let still_stub = { is_unresolved_stub(&tier2.lock().arena, stub_offset + 1) };
                if still_stub {
                    match locate_backward_bb(tier2, bb_id) {
                        SuccessorOutcome::Resolved { bb_id: next_id, tier2_start } => {
                            bb_id = next_id;
                            cursor = tier2_start;
                        }
                        SuccessorOutcome::Fallback { tier1_offset, .. } => {
                            return run_tier1_from(&tier2.code, frame, tier1_offset);
                        }
                    }
                } else {
                    let word_a = read_word(tier2, stub_offset);
                    let word_b = read_word(tier2, stub_offset + 1);
                    let displacement = decode_displacement(word_a, word_b);
                    let target = (stub_offset + 1).saturating_sub(displacement as usize);
                    cursor = target;
                    bb_id = find_bb_containing(&tier2.lock().metadata, target);
                }
            }
        }
    }
}

/// Bootstrap `code` and run it to completion, falling back to Tier-1
/// execution entirely if bootstrap abandons. Returns the resulting value
/// together with the recorded [`BootstrapState`] so a test can assert on
/// both the observable result and the specializer's own diagnosis.
pub fn run_specialized(
    registry: &Registry,
    code: CodeObject,
    type_system: TypeSystem,
    config: SpecializerConfig,
    frame: &mut Frame,
) -> (Value, BootstrapState) {
    let fallback_code = code.clone();
    let state = bootstrap(registry, code, type_system, config);
    let value = match &state {
        BootstrapState::Ready(info) => run_tier2_driven(info, frame),
        BootstrapState::Abandoned(_) => run_tier1(&fallback_code, frame),
    };
    (value, state)
}
