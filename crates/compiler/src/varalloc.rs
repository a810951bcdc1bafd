//! Variable analysis and slot allocation (spec §4.1 "Variable analysis":
//! each source variable becomes either a first-occurrence allocation or a
//! reference to an already-allocated slot; singletons get a diagnostic,
//! voids get `H_VOID`/no binding at all).

use crate::term::{SourceVar, Term};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot(pub u32);

/// Per-clause variable table built by walking the head then the body in
/// source order, exactly the order the source's compiler assigns frame
/// offsets in (first occurrence wins the slot).
#[derive(Debug, Default)]
pub struct VarTable {
    slots: Vec<SourceVar>,
    by_name: HashMap<SourceVar, Slot>,
    occurrences: HashMap<SourceVar, u32>,
    seen: std::collections::HashSet<SourceVar>,
}

impl VarTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every variable occurrence in `term`, allocating a fresh slot
    /// the first time a name is seen and counting occurrences for
    /// singleton/void analysis.
    pub fn scan(&mut self, term: &Term) {
        term.for_each_var(&mut |v| {
            *self.occurrences.entry(v.clone()).or_insert(0) += 1;
            self.by_name.entry(v.clone()).or_insert_with(|| {
                let slot = Slot(self.slots.len() as u32);
                self.slots.push(v.clone());
                slot
            });
        });
    }

    /// `true` the first time `v` is looked up during emission (drives the
    /// `H_FIRSTVAR`/`B_FIRSTVAR` vs. `H_VAR`/`B_VAR` choice); subsequent
    /// lookups of the same name return `false`.
    pub fn first_occurrence(&mut self, v: &SourceVar) -> bool {
        self.seen.insert(v.clone())
    }

    pub fn slot_of(&self, v: &SourceVar) -> Slot {
        *self
            .by_name
            .get(v)
            .expect("variable scanned before slot lookup")
    }

    pub fn num_vars(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Named, non-anonymous (doesn't start with `_`) variables that occur
    /// exactly once: the `singleton_variable` diagnostic (spec §4.1 "warn
    /// on named singletons unless the name starts with `_`").
    pub fn singletons(&self) -> Vec<SourceVar> {
        self.occurrences
            .iter()
            .filter(|(v, &count)| count == 1 && !v.0.starts_with('_'))
            .map(|(v, _)| v.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wam_core::AtomId;

    fn var(name: &str) -> Term {
        Term::Var(SourceVar(name.to_string()))
    }

    #[test]
    fn repeated_variable_shares_one_slot() {
        let mut table = VarTable::new();
        let head = Term::Compound(AtomId(0), vec![var("X"), var("X")]);
        table.scan(&head);
        assert_eq!(table.num_vars(), 1);
        let x = SourceVar("X".to_string());
        assert!(table.first_occurrence(&x));
        assert!(!table.first_occurrence(&x));
    }

    #[test]
    fn singleton_detection_ignores_underscore_names() {
        let mut table = VarTable::new();
        let head = Term::Compound(
            AtomId(0),
            vec![var("Once"), var("_Ignored"), var("Twice"), var("Twice")],
        );
        table.scan(&head);
        let singles: Vec<_> = table.singletons().into_iter().map(|v| v.0).collect();
        assert_eq!(singles, vec!["Once".to_string()]);
    }
}
