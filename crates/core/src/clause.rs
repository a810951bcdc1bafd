//! Clauses and generations (spec §3, §4.1, §4.2).
//!
//! `Clause: {procedure, index-key, generation{created,erased}, code[]}`,
//! immutable once installed. The logical-update view makes `created`/`erased`
//! the only mutable fields, and even those only ever move forward.

use crate::procedure::{IndexKey, ProcedureKey};
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing global counter (spec §4.2, §6 "Generations").
/// `statistics(generation, N)` reads the current value; `assertz`/`retract`
/// each consume the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl Generation {
    pub const NEVER: Generation = Generation(u64::MAX);
}

#[derive(Debug, Default)]
pub struct GenerationCounter(AtomicU64);

impl GenerationCounter {
    pub fn new() -> Self {
        GenerationCounter(AtomicU64::new(1))
    }

    /// Snapshot the current generation without advancing it (taken by a
    /// query at entry; spec §4.2 "Logical update view").
    pub fn current(&self) -> Generation {
        Generation(self.0.load(Ordering::Acquire))
    }

    /// Advance and return the new generation (taken by `assertz`/`retract`).
    pub fn advance(&self) -> Generation {
        Generation(self.0.fetch_add(1, Ordering::AcqRel) + 1)
    }
}

/// A compiled bytecode instruction stream. Opcodes themselves are defined in
/// `wam-compiler` (the compiler is the only producer); core only needs to
/// store and address them, so the code array is an opaque `u32` stream that
/// the compiler encodes into and the interpreter decodes out of.
pub type Code = Vec<u32>;

#[derive(Debug)]
pub struct Clause {
    pub procedure: ProcedureKey,
    pub index_key: IndexKey,
    pub num_vars: u32,
    pub code: Code,
    created: Generation,
    erased: AtomicU64,
    /// Body ends in a cut (`!`), enabling tighter LCO (spec §4.1).
    pub committing: bool,
}

impl Clause {
    pub fn new(
        procedure: ProcedureKey,
        index_key: IndexKey,
        num_vars: u32,
        code: Code,
        committing: bool,
        created: Generation,
    ) -> Self {
        Clause {
            procedure,
            index_key,
            num_vars,
            code,
            created,
            erased: AtomicU64::new(Generation::NEVER.0),
            committing,
        }
    }

    pub fn created(&self) -> Generation {
        self.created
    }

    pub fn erased(&self) -> Generation {
        Generation(self.erased.load(Ordering::Acquire))
    }

    pub fn erase(&self, at: Generation) {
        self.erased.store(at.0, Ordering::Release);
    }

    /// Visibility test for a query whose snapshot is `snapshot`:
    /// `created <= snapshot < erased`.
    pub fn visible_at(&self, snapshot: Generation) -> bool {
        self.created <= snapshot && snapshot < self.erased()
    }

    /// True once no currently-running query's snapshot could ever see this
    /// clause again, so `garbage_collect_clauses/0` may reclaim it.
    pub fn is_dead(&self, oldest_active: Generation) -> bool {
        self.erased() <= oldest_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functor::FunctorId;
    use crate::module::ModuleId;

    fn key() -> ProcedureKey {
        ProcedureKey {
            module: ModuleId(0),
            functor: FunctorId(0),
        }
    }

    #[test]
    fn logical_update_view() {
        let counter = GenerationCounter::new();
        let before = counter.current();
        let clause = Clause::new(key(), IndexKey::Any, 0, vec![], false, before);
        let after_assert = counter.advance();
        assert!(clause.visible_at(after_assert));

        clause.erase(counter.advance());
        let snapshot_before_retract = after_assert;
        assert!(clause.visible_at(snapshot_before_retract));

        let snapshot_after_retract = counter.current();
        assert!(!clause.visible_at(snapshot_after_retract));
    }
}
