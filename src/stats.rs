//! Lightweight atomic counters summarizing one code object's specialization
//! history (§2 [AMBIENT]). Queryable without locking: every field is a
//! plain atomic, updated alongside (but independently of) the
//! `parking_lot::Mutex`-guarded `Tier2Info` mutation.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Per-code-object specialization statistics.
///
/// Snapshotting (`snapshot()`) is racy with respect to concurrent updates
/// (individual fields may be read at slightly different instants) by
/// design: these are diagnostics, not a consistency boundary.
#[derive(Debug, Default)]
pub struct Stats {
    bootstrap_attempts: AtomicU32,
    bootstrap_successes: AtomicU32,
    bbs_emitted: AtomicU32,
    rewrites: AtomicU32,
    backward_resolutions: AtomicU32,
    version_exhaustions: AtomicU32,
    abandon_forbidden: AtomicU32,
    abandon_uninteresting: AtomicU32,
    abandon_oom: AtomicU32,
    tier2_bytes_written: AtomicU64,
}

/// A point-in-time copy of [`Stats`], cheap to log or assert on in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub bootstrap_attempts: u32,
    pub bootstrap_successes: u32,
    pub bbs_emitted: u32,
    pub rewrites: u32,
    pub backward_resolutions: u32,
    pub version_exhaustions: u32,
    pub abandon_forbidden: u32,
    pub abandon_uninteresting: u32,
    pub abandon_oom: u32,
    pub tier2_bytes_written: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_bootstrap_attempt(&self) {
        self.bootstrap_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bootstrap_success(&self) {
        self.bootstrap_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bb_emitted(&self, tier2_bytes: usize) {
        self.bbs_emitted.fetch_add(1, Ordering::Relaxed);
        self.tier2_bytes_written
            .fetch_add(tier2_bytes as u64, Ordering::Relaxed);
    }

    pub fn record_rewrite(&self) {
        self.rewrites.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backward_resolution(&self) {
        self.backward_resolutions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_version_exhaustion(&self) {
        self.version_exhaustions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandon(&self, reason: &crate::error::SpecializeError) {
        use crate::error::SpecializeError::*;
        match reason {
            UnsupportedProgram { .. } => self.abandon_forbidden.fetch_add(1, Ordering::Relaxed),
            UninterestingProgram => self.abandon_uninteresting.fetch_add(1, Ordering::Relaxed),
            OutOfMemory | OutOfScratchMemory { .. } => {
                self.abandon_oom.fetch_add(1, Ordering::Relaxed)
            }
            TooManyVersions { .. } => self.version_exhaustions.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bootstrap_attempts: self.bootstrap_attempts.load(Ordering::Relaxed),
            bootstrap_successes: self.bootstrap_successes.load(Ordering::Relaxed),
            bbs_emitted: self.bbs_emitted.load(Ordering::Relaxed),
            rewrites: self.rewrites.load(Ordering::Relaxed),
            backward_resolutions: self.backward_resolutions.load(Ordering::Relaxed),
            version_exhaustions: self.version_exhaustions.load(Ordering::Relaxed),
            abandon_forbidden: self.abandon_forbidden.load(Ordering::Relaxed),
            abandon_uninteresting: self.abandon_uninteresting.load(Ordering::Relaxed),
            abandon_oom: self.abandon_oom.load(Ordering::Relaxed),
            tier2_bytes_written: self.tier2_bytes_written.load(Ordering::Relaxed),
        }
    }
}
