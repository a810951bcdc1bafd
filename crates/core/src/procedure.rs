//! Procedures and clauses (spec §3).
//!
//! `Procedure: {functor, flags, clause-list, clause-hash|none, indexing
//! pattern, ref-count}`. The clause list implements the *logical update
//! view*: clauses carry create/erase generations and a query only ever sees
//! `created <= snapshot < erased` (spec §4.2).

use crate::clause::{Clause, Generation};
use crate::functor::FunctorId;
use crate::module::ModuleId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcedureKey {
    pub module: ModuleId,
    pub functor: FunctorId,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProcedureFlags: u16 {
        const DYNAMIC      = 0b0000_0001;
        const MULTIFILE    = 0b0000_0010;
        const FOREIGN      = 0b0000_0100;
        const THREAD_LOCAL = 0b0000_1000;
        const META         = 0b0001_0000;
        const HIDE_CHILDS  = 0b0010_0000;
    }
}

/// A first-argument index bucket: a canonical key to the set of clause
/// indices that might match it (spec §4.1 "Indexing key").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKey {
    /// First argument unbound or unindexable structure.
    Any,
    Atom(crate::atom::AtomId),
    Integer(i64),
    Functor(FunctorId),
}

#[derive(Default)]
pub struct ClauseIndex {
    /// Maps an index key to the ordinal positions (into `Procedure::clauses`)
    /// of clauses whose first-argument key matches it, in clause order.
    buckets: std::collections::HashMap<IndexKey, Vec<usize>>,
}

impl ClauseIndex {
    pub fn rebuild(&mut self, clauses: &[Arc<Clause>]) {
        self.buckets.clear();
        for (i, clause) in clauses.iter().enumerate() {
            self.buckets.entry(clause.index_key).or_default().push(i);
        }
    }

    /// Candidate clause ordinals for `key`, in original clause order. A
    /// caller asking with `Any` (its own first argument is unbound) must see
    /// every clause, since any head might unify.
    pub fn candidates(&self, key: IndexKey, total_clauses: usize) -> Vec<usize> {
        if key == IndexKey::Any {
            return (0..total_clauses).collect();
        }
        let mut out = self.buckets.get(&IndexKey::Any).cloned().unwrap_or_default();
        out.extend(self.buckets.get(&key).cloned().unwrap_or_default());
        out.sort_unstable();
        out.dedup();
        out
    }
}

/// A procedure record: the functor it implements plus its clause chain.
pub struct Procedure {
    pub key: ProcedureKey,
    pub flags: ProcedureFlags,
    clauses: Mutex<Vec<Arc<Clause>>>,
    index: Mutex<ClauseIndex>,
    ref_count: AtomicU32,
    generation_created: AtomicU64,
}

impl Procedure {
    pub fn new(key: ProcedureKey, flags: ProcedureFlags, created: Generation) -> Self {
        Procedure {
            key,
            flags,
            clauses: Mutex::new(Vec::new()),
            index: Mutex::new(ClauseIndex::default()),
            ref_count: AtomicU32::new(0),
            generation_created: AtomicU64::new(created.0),
        }
    }

    /// `assertz/1`: append a clause and reindex.
    pub fn assert_clause(&self, clause: Clause) {
        let mut clauses = self.clauses.lock();
        clauses.push(Arc::new(clause));
        self.index.lock().rebuild(&clauses);
    }

    /// `retract/1`: mark the clause erased at `generation`. The clause
    /// object itself stays in the vector (and reachable to older queries)
    /// until its ref-count drops to zero and `erased <= oldest active
    /// generation`, per spec §3 lifecycle.
    pub fn retract_at(&self, ordinal: usize, generation: Generation) {
        let clauses = self.clauses.lock();
        if let Some(clause) = clauses.get(ordinal) {
            clause.erase(generation);
        }
    }

    /// Reap clauses erased before `oldest_active` with no referencing
    /// choicepoint (ref-count zero). Rebuilds the index if anything was
    /// removed (`garbage_collect_clauses/0`).
    pub fn reap(&self, oldest_active: Generation) {
        let mut clauses = self.clauses.lock();
        let before = clauses.len();
        clauses.retain(|c| !c.is_dead(oldest_active));
        if clauses.len() != before {
            self.index.lock().rebuild(&clauses);
        }
    }

    pub fn clauses(&self) -> Vec<Arc<Clause>> {
        self.clauses.lock().clone()
    }

    pub fn clause_count(&self) -> usize {
        self.clauses.lock().len()
    }

    pub fn candidates(&self, key: IndexKey) -> Vec<Arc<Clause>> {
        let clauses = self.clauses.lock();
        self.index
            .lock()
            .candidates(key, clauses.len())
            .into_iter()
            .filter_map(|i| clauses.get(i).cloned())
            .collect()
    }

    pub fn incref(&self) {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn decref(&self) {
        self.ref_count.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    pub fn is_dynamic(&self) -> bool {
        self.flags.contains(ProcedureFlags::DYNAMIC)
    }
}
