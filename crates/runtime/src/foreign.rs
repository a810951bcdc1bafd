//! The foreign-call frame (spec §4.6, component C7): the contract a native
//! Rust extension predicate is called through.
//!
//! Grounded on the teacher's FFI manifest idea (`compiler/src/ffi.rs`) but
//! inverted: foreign predicates here are registered Rust closures living
//! in-process, not C functions reached through a generated manifest and
//! LLVM linkage, since the engine embeds its extensions directly.

use crate::error::Exception;
use crate::unify;
use std::collections::HashMap;
use std::sync::Arc;
use wam_core::{AtomId, AtomTable, FunctorTable, GlobalIdx, GlobalStack, TrailStack, Word};

/// What a foreign predicate returns: deterministic success/failure, or a
/// request for more solutions later. `context` is opaque state stashed in
/// the calling choicepoint (`ChoiceKind::Foreign`) and handed back on redo.
pub enum ForeignOutcome {
    Success,
    Failure,
    Nondet { context: u64 },
}

pub type ForeignFn =
    dyn Fn(&mut ForeignCallContext) -> Result<ForeignOutcome, Exception> + Send + Sync;

/// Everything a foreign predicate needs: read/bind its arguments and
/// allocate fresh terms, through the same heap/trail the interpreter uses
/// for ordinary clauses, so a foreign predicate's bindings backtrack
/// exactly like any other.
pub struct ForeignCallContext<'a> {
    pub heap: &'a mut GlobalStack,
    pub trail: &'a mut TrailStack,
    pub functors: &'a FunctorTable,
    pub atoms: &'a AtomTable,
    /// Addresses of this call's arguments on the global stack, in order.
    pub args: &'a [GlobalIdx],
    /// Set on redo (nondet resumption); `None` on first call.
    pub redo_context: Option<u64>,
    /// Attributed variables bound by this call's unifications, drained by
    /// the caller at the next safe point (spec §4.2 wake-up list).
    pub woken: &'a mut Vec<GlobalIdx>,
}

impl ForeignCallContext<'_> {
    /// Unify argument `index` with `value`, exactly as `H_*` head
    /// unification would against an ordinary clause argument.
    pub fn unify_arg(&mut self, index: usize, value: Word) -> bool {
        let addr = self.args[index];
        let target = unify::deref(self.heap, addr);
        if matches!(self.heap.get(target), Word::Var(_)) {
            unify::bind(self.heap, self.trail, target, value);
            true
        } else {
            let scratch = self.heap.push(value);
            unify::unify(self.heap, self.trail, self.functors, self.woken, target, scratch)
        }
    }

    pub fn deref_arg(&self, index: usize) -> GlobalIdx {
        unify::deref(self.heap, self.args[index])
    }
}

/// Registry of foreign predicates, keyed by `(name, arity)`, mirroring the
/// `FOREIGN` procedure flag (spec §3): a procedure marked foreign has no
/// clauses, only an entry here that `interp::dispatch_call` reaches for
/// instead of `Procedure::candidates`.
#[derive(Default, Clone)]
pub struct ForeignTable {
    fns: HashMap<(AtomId, u16), Arc<ForeignFn>>,
}

impl ForeignTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: AtomId,
        arity: u16,
        f: impl Fn(&mut ForeignCallContext) -> Result<ForeignOutcome, Exception> + Send + Sync + 'static,
    ) {
        self.fns.insert((name, arity), Arc::new(f));
    }

    pub fn lookup(&self, name: AtomId, arity: u16) -> Option<Arc<ForeignFn>> {
        self.fns.get(&(name, arity)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_predicate_is_found_by_name_and_arity() {
        let atoms = AtomTable::new();
        let mut table = ForeignTable::new();
        let succ = atoms.intern("succ_or_fail");
        table.register(succ, 2, |_ctx| Ok(ForeignOutcome::Success));
        assert!(table.lookup(succ, 2).is_some());
        assert!(table.lookup(succ, 3).is_none());
    }

    #[test]
    fn foreign_call_unifies_unbound_argument() {
        let atoms = AtomTable::new();
        let functors = FunctorTable::new();
        let mut heap = GlobalStack::new();
        let mut trail = TrailStack::new();
        let v = heap.push(Word::Var(0));
        let mut woken = Vec::new();
        let mut ctx = ForeignCallContext {
            heap: &mut heap,
            trail: &mut trail,
            functors: &functors,
            atoms: &atoms,
            args: &[v],
            redo_context: None,
            woken: &mut woken,
        };
        assert!(ctx.unify_arg(0, Word::Integer(42)));
    }
}
