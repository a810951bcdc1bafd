//! Atom interning (spec §3: "interned, reference-counted object with UTF-8
//! name; subject to atom-GC").
//!
//! The source keeps a single process-wide hash table guarded by a mutex
//! named for its role (`L_ATOM` in `pl-thread.c`). We follow the Design
//! Notes' consolidation: one `parking_lot::RwLock`-guarded table shared via
//! `Arc<RuntimeGlobals>`, read-heavy (interning is rare relative to lookups
//! by id) so a reader/writer lock beats a plain mutex.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Stable handle to an interned atom. Indices are never reused while the
/// owning [`AtomTable`] is alive; atom-GC (§4.7/C11) reclaims *table slots*
/// but an `AtomId` already observed by a live term always still resolves
/// (the mark phase is what keeps it alive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(pub u32);

struct AtomEntry {
    name: Arc<str>,
    /// Cleared by atom-GC sweep when no mark touched this slot this cycle.
    marked: bool,
    /// True once swept; the slot is free and its `name` entry in
    /// `by_name` has been removed, but the index itself is not reused so
    /// that stale `AtomId`s fail lookups instead of aliasing.
    freed: bool,
}

/// The process-wide interned-atom table.
pub struct AtomTable {
    inner: RwLock<AtomTableInner>,
}

struct AtomTableInner {
    entries: Vec<AtomEntry>,
    by_name: HashMap<Arc<str>, AtomId>,
}

impl AtomTable {
    pub fn new() -> Self {
        AtomTable {
            inner: RwLock::new(AtomTableInner {
                entries: Vec::new(),
                by_name: HashMap::new(),
            }),
        }
    }

    /// Intern `name`, returning the existing id if already present.
    pub fn intern(&self, name: &str) -> AtomId {
        if let Some(id) = self.inner.read().by_name.get(name) {
            return *id;
        }
        let mut inner = self.inner.write();
        if let Some(id) = inner.by_name.get(name) {
            return *id;
        }
        let arc: Arc<str> = Arc::from(name);
        let id = AtomId(inner.entries.len() as u32);
        inner.entries.push(AtomEntry {
            name: arc.clone(),
            marked: false,
            freed: false,
        });
        inner.by_name.insert(arc, id);
        id
    }

    pub fn name(&self, id: AtomId) -> Arc<str> {
        let inner = self.inner.read();
        let entry = &inner.entries[id.0 as usize];
        assert!(!entry.freed, "use of atom id {:?} after atom-GC swept it", id);
        entry.name.clone()
    }

    /// Mark phase of atom-GC (C11): called once per reachable atom found
    /// while scanning every engine's stacks.
    pub fn mark(&self, id: AtomId) {
        let mut inner = self.inner.write();
        if let Some(entry) = inner.entries.get_mut(id.0 as usize) {
            entry.marked = true;
        }
    }

    /// Sweep phase: free every unmarked, non-static entry and clear marks
    /// for the next cycle. Returns the number of atoms collected.
    pub fn sweep(&self) -> usize {
        let mut inner = self.inner.write();
        let mut freed = 0;
        let len = inner.entries.len();
        for idx in 0..len {
            let should_free = {
                let e = &inner.entries[idx];
                !e.marked && !e.freed
            };
            if should_free {
                let name = inner.entries[idx].name.clone();
                inner.by_name.remove(&name);
                inner.entries[idx].freed = true;
                freed += 1;
            }
            inner.entries[idx].marked = false;
        }
        freed
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let table = AtomTable::new();
        let a = table.intern("foo");
        let b = table.intern("foo");
        assert_eq!(a, b);
        assert_eq!(&*table.name(a), "foo");
    }

    #[test]
    fn sweep_frees_unmarked_atoms() {
        let table = AtomTable::new();
        let kept = table.intern("kept");
        let _doomed = table.intern("doomed");
        table.mark(kept);
        let freed = table.sweep();
        assert_eq!(freed, 1);
        assert_eq!(&*table.name(kept), "kept");
    }
}
