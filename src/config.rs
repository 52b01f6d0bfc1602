//! Numeric knobs the original source hardcodes as C preprocessor constants
//! (§12 [AMBIENT]). A plain struct, constructed programmatically by the
//! embedder -- no external config-parsing crate is warranted for four
//! tuning constants.

/// Tunables for a [`crate::tier2::Tier2Info`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecializerConfig {
    /// Maximum number of specialized versions of a single loop header
    /// (the original's `MAX_BB_VERSIONS`).
    pub max_bb_versions: u8,

    /// Initial scratch arena size as a multiple of the Tier-1 byte length
    /// (the original's `space_to_alloc = NBYTES * 3`).
    pub initial_arena_factor: usize,

    /// Extra words reserved at the tail of every emitted BB. The original
    /// defines `BB_EPILOG` and reserves space for it but never emits a
    /// nonzero epilog; kept here for embedders that append cleanup
    /// instructions to a BB tail.
    pub bb_epilog_words: usize,

    /// Crossover below which `locate_backward_bb` linear-scans
    /// `backward_jump_offsets` rather than binary-searching it (the
    /// original's comment in `IS_BACKWARDS_JUMP_TARGET` /
    /// `_PyTier2_LocateJumpBackwardsBB`).
    pub backward_jump_linear_scan_threshold: usize,
}

impl Default for SpecializerConfig {
    fn default() -> Self {
        Self {
            max_bb_versions: 5,
            initial_arena_factor: 3,
            bb_epilog_words: 0,
            backward_jump_linear_scan_threshold: 40,
        }
    }
}
