//! Multi-code-object registry (§2 [AMBIENT]): lets a multi-threaded host
//! look up the [`Tier2Info`] for a given code object id without a single
//! global lock, and gives [`crate::bootstrap::warmup`] the "does this code
//! object already have one" check that makes bootstrap idempotent
//! (Testable Property 2) and stops a failed bootstrap's warm-up counter
//! from re-firing (§7).

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::SpecializeError;
use crate::tier2::Tier2Info;

/// What the registry remembers about one code object's specialization
/// history: either a live `Tier2Info`, or the reason a prior bootstrap
/// attempt was abandoned (kept so a second attempt is a guaranteed no-op
/// rather than a second scan of the bytecode).
#[derive(Clone)]
pub enum BootstrapState {
    Ready(Arc<Tier2Info>),
    Abandoned(SpecializeError),
}

/// Lock-free concurrent map from code object id to its [`BootstrapState`].
#[derive(Debug, Default)]
pub struct Registry {
    entries: DashMap<u64, BootstrapState>,
}

impl std::fmt::Debug for BootstrapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(info) => f
                .debug_tuple("Ready")
                .field(&info.code.id())
                .finish(),
            Self::Abandoned(err) => f.debug_tuple("Abandoned").field(err).finish(),
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// The state already on record for `code_id`, if any.
    pub fn get(&self, code_id: u64) -> Option<BootstrapState> {
        self.entries.get(&code_id).map(|e| e.value().clone())
    }

    /// Record the outcome of a bootstrap attempt. Overwrites only if no
    /// entry exists yet -- a second `warmup` call on an already-recorded
    /// code object is a no-op by construction (§4.8).
    pub fn record_if_absent(&self, code_id: u64, state: BootstrapState) -> BootstrapState {
        self.entries.entry(code_id).or_insert(state).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
