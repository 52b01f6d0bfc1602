/// tier2-specializer - Lazy Basic-Block Specializer
///
/// Implements a Tier-2 adaptive specializer for a bytecode VM that already
/// has a generic, inline-cached Tier-1 execution tier. Tier 2 specializes
/// hot code objects basic-block by basic-block, on demand, rather than
/// compiling a whole function up front: a BB's Tier-2 form does not exist
/// until control actually reaches its Tier-1 start offset.
///
/// # Architecture
///
/// 1. **Bootstrap** (`bootstrap` module)
///    - Runs once per code object, the first time its warm-up counter fires
///    - Scans for opcodes the specializer cannot handle and abandons early
///    - Installs quick-form opcodes in place and discovers the entry BB
///
/// 2. **BB Discovery** (`discovery` module)
///    - Scans Tier-1 instructions from a start offset, emitting Tier-2
///      instructions into a per-code-object scratch arena until a BB
///      boundary: a scope-exit, a conditional branch, or a backward jump
///    - Unconditional forward jumps are fused away rather than emitted
///
/// 3. **Successor Protocol** (`successor` module)
///    - Lazily generates a branch stub's fall-through and taken BBs the
///      first time each is reached
///    - Resolves backward-jump stubs against the Jump Target Index,
///      reusing or creating one of up to `max_bb_versions` specializations
///      of a loop header
///
/// 4. **Branch Rewriting** (`branch_rewriter` module)
///    - Collapses a branch stub into a direct jump once both successors
///      exist, and a backward-jump stub into a direct jump once its target
///      is resolved
///
/// # Concurrency
///
/// Every code object's mutable Tier-2 state (scratch arena, metadata table,
/// jump target index, pending-branch bookkeeping) lives behind one
/// `parking_lot::Mutex` in [`tier2::Tier2Info`]. A multi-threaded embedder
/// looks up a code object's `Tier2Info` through a [`registry::Registry`]
/// keyed by code object id, backed by `dashmap::DashMap` so lookups never
/// contend with each other.
///
/// # Example
///
/// ```ignore
/// use tier2_specializer::{bootstrap, BootstrapState, Registry, SpecializerConfig};
///
/// let registry = Registry::new();
/// match bootstrap(&registry, code, type_system, SpecializerConfig::default()) {
///     BootstrapState::Ready(info) => {
///         // redirect the frame's instruction pointer to info.entry_tier2_start()
///     }
///     BootstrapState::Abandoned(err) => {
///         // keep running the Tier-1 interpreter, this code object never retries
///     }
/// }
/// ```
pub mod arena;
pub mod bootstrap;
pub mod branch_rewriter;
pub mod code_object;
pub mod config;
pub mod discovery;
pub mod emitter;
pub mod error;
pub mod jump_index;
pub mod metadata;
pub mod opcode;
pub mod registry;
pub mod stats;
pub mod successor;
pub mod tier2;
pub mod type_context;

#[cfg(any(test, feature = "test-harness"))]
pub mod interpreter;
#[cfg(any(test, feature = "test-harness"))]
pub mod value;

pub use bootstrap::bootstrap;
pub use code_object::{CodeObject, InstructionWord};
pub use config::SpecializerConfig;
pub use error::{SpecializeError, SpecializeResult};
pub use metadata::{BbMetadata, Terminator};
pub use registry::{BootstrapState, Registry};
pub use stats::{Stats, StatsSnapshot};
pub use successor::{generate_next_bb, locate_backward_bb, SuccessorOutcome};
pub use tier2::Tier2Info;
pub use type_context::{TypeContext, TypeId, TypeSystem};
