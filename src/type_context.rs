//! Per-BB abstract type state (§3, §4.2).
//!
//! A `TypeContext` maps each local slot and each live operand-stack entry to
//! either a known type identity or "unknown" (`None`). Values are opaque
//! identities supplied by the external type system; equality is identity,
//! matching the design's "pointers to canonical type descriptors" framing.

use smallvec::SmallVec;

/// Opaque identity for a canonical type descriptor. The specializer never
/// inspects what a `TypeId` names, only whether two are the same one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

/// Inline capacity for the common small-arity case: most functions have a
/// handful of locals and a shallow operand stack.
const INLINE_SLOTS: usize = 8;

/// Abstract interpretation state owned by a single BB.
///
/// Each BB owns its own copy (§9, "Type context sharing"): there is no
/// shared ownership between BBs, so mutating a working context during
/// discovery never aliases another BB's finalized one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeContext {
    locals: SmallVec<[Option<TypeId>; INLINE_SLOTS]>,
    stack_shadow: SmallVec<[Option<TypeId>; INLINE_SLOTS]>,
}

impl TypeContext {
    /// A context with `nlocals` slots, all unknown, and an empty stack
    /// shadow -- the initial context built at bootstrap (§4.8).
    pub fn unknown(nlocals: usize) -> Self {
        Self {
            locals: SmallVec::from_elem(None, nlocals),
            stack_shadow: SmallVec::new(),
        }
    }

    #[inline]
    pub fn nlocals(&self) -> usize {
        self.locals.len()
    }

    #[inline]
    pub fn local(&self, slot: usize) -> Option<TypeId> {
        self.locals.get(slot).copied().flatten()
    }

    /// A local store updates `locals[slot]` (§4.2).
    pub fn set_local(&mut self, slot: usize, ty: Option<TypeId>) {
        if let Some(entry) = self.locals.get_mut(slot) {
            *entry = ty;
        }
    }

    #[inline]
    pub fn stack_depth(&self) -> usize {
        self.stack_shadow.len()
    }

    /// A load pushes onto the stack shadow (§4.2).
    pub fn push(&mut self, ty: Option<TypeId>) {
        self.stack_shadow.push(ty);
    }

    pub fn pop(&mut self) -> Option<TypeId> {
        self.stack_shadow.pop().flatten()
    }

    /// The type of the `n`-th most recently pushed value (0 = top), without
    /// popping it. Used by the Emitter's lookbehind for binary-op operand
    /// types (§4.5).
    pub fn peek(&self, n: usize) -> Option<TypeId> {
        let len = self.stack_shadow.len();
        if n >= len {
            return None;
        }
        self.stack_shadow[len - 1 - n]
    }

    /// Whether this context is bitwise identical to `other`: the baseline
    /// backward-jump version matcher compares working vs. stored contexts
    /// this way before falling back to "pick any" (§4.7, §9).
    pub fn matches(&self, other: &TypeContext) -> bool {
        self == other
    }
}

/// The canonical type identities the Emitter needs to recognize in order to
/// make specialization decisions (§4.5, §6: "the type system's canonical
/// type-descriptor identity" is consumed from the host). A real embedder
/// hands the specializer its own registry's int descriptor; this crate's
/// test harness constructs one directly.
#[derive(Debug, Clone, Copy)]
pub struct TypeSystem {
    pub int_type: TypeId,
}
