//! Error type for the Tier-2 specializer.
//!
//! All internal failures collapse to a single "specialization abandoned"
//! signal (see the design doc's error handling section). None of these are
//! fatal: callers fall back to Tier-1 execution.

use std::fmt;

/// Reason a specialization attempt (bootstrap or a successor/backward-edge
/// resolution request) was abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecializeError {
    /// A forbidden opcode was found anywhere in the code object.
    UnsupportedProgram { opcode: u8, offset: usize },
    /// No optimizable opcode was found; not worth specializing.
    UninterestingProgram,
    /// An allocator or arena-grow request could not be satisfied.
    OutOfMemory,
    /// A backward-jump target already has `max_bb_versions` specialized
    /// versions registered.
    TooManyVersions { target_offset: usize },
    /// The scratch arena refused to grow to the requested capacity.
    OutOfScratchMemory { requested: usize, capacity: usize },
}

impl fmt::Display for SpecializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedProgram { opcode, offset } => {
                write!(f, "forbidden opcode {opcode:#04x} at offset {offset}")
            }
            Self::UninterestingProgram => {
                write!(f, "no optimizable opcode found, not worth specializing")
            }
            Self::OutOfMemory => write!(f, "allocation failed"),
            Self::TooManyVersions { target_offset } => {
                write!(f, "too many specialized versions for loop header at offset {target_offset}")
            }
            Self::OutOfScratchMemory { requested, capacity } => {
                write!(f, "scratch arena refused to grow to {requested} bytes (capacity {capacity})")
            }
        }
    }
}

impl std::error::Error for SpecializeError {}

/// Result type for all fallible specializer operations.
pub type SpecializeResult<T> = Result<T, SpecializeError>;
