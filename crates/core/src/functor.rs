//! Functor interning (spec §3: `(name atom, arity)` pair, interned).

use crate::atom::AtomId;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctorId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctorKey {
    pub name: AtomId,
    pub arity: u16,
}

pub struct FunctorTable {
    inner: RwLock<FunctorTableInner>,
}

struct FunctorTableInner {
    keys: Vec<FunctorKey>,
    by_key: HashMap<FunctorKey, FunctorId>,
}

impl FunctorTable {
    pub fn new() -> Self {
        FunctorTable {
            inner: RwLock::new(FunctorTableInner {
                keys: Vec::new(),
                by_key: HashMap::new(),
            }),
        }
    }

    pub fn intern(&self, name: AtomId, arity: u16) -> FunctorId {
        let key = FunctorKey { name, arity };
        if let Some(id) = self.inner.read().by_key.get(&key) {
            return *id;
        }
        let mut inner = self.inner.write();
        if let Some(id) = inner.by_key.get(&key) {
            return *id;
        }
        let id = FunctorId(inner.keys.len() as u32);
        inner.keys.push(key);
        inner.by_key.insert(key, id);
        id
    }

    pub fn key(&self, id: FunctorId) -> FunctorKey {
        self.inner.read().keys[id.0 as usize]
    }

    pub fn arity(&self, id: FunctorId) -> u16 {
        self.key(id).arity
    }

    pub fn name(&self, id: FunctorId) -> AtomId {
        self.key(id).name
    }
}

impl Default for FunctorTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::AtomTable;

    #[test]
    fn interning_distinguishes_arity() {
        let atoms = AtomTable::new();
        let functors = FunctorTable::new();
        let foo = atoms.intern("foo");
        let f1 = functors.intern(foo, 1);
        let f2 = functors.intern(foo, 2);
        assert_ne!(f1, f2);
        assert_eq!(functors.arity(f1), 1);
        assert_eq!(functors.arity(f2), 2);
    }
}
