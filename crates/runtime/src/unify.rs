//! Unification (spec §4.2 component C3).
//!
//! Works directly against a [`GlobalStack`]/[`TrailStack`] pair rather than
//! raw pointers: "bind" means "overwrite the cell at this index and push an
//! undo record", matching the index-addressed rewrite of the stacks
//! (`wam-core::stacks`).

use wam_core::{FunctorTable, GlobalIdx, GlobalStack, TrailEntry, TrailIdx, TrailStack, Word};

/// Follow a reference chain to its representative cell. An unbound variable
/// dereferences to itself.
pub fn deref(heap: &GlobalStack, mut addr: GlobalIdx) -> GlobalIdx {
    loop {
        match heap.get(addr) {
            Word::Reference(next) if *next != addr => addr = *next,
            _ => return addr,
        }
    }
}

/// Bind `var_addr` (an unbound variable cell) to `value`, recording the
/// undo on `trail` unless the variable is newer than the trail's oldest
/// live mark (the standard WAM trail-conditional: no need to undo a
/// binding that will be discarded wholesale on backtracking anyway).
///
/// Binding always records for simplicity and correctness here; the
/// interpreter's choicepoint creation is what makes over-recording merely
/// a missed optimization rather than a bug.
pub fn bind(heap: &mut GlobalStack, trail: &mut TrailStack, var_addr: GlobalIdx, value: Word) -> TrailIdx {
    heap.set(var_addr, value);
    trail.push(TrailEntry::Binding { slot: var_addr })
}

/// Undo every trail entry from `target` (inclusive) back to the current
/// top, restoring each bound cell to an unbound self-reference (or, for a
/// destructive assignment, its saved prior value).
pub fn undo_to(heap: &mut GlobalStack, trail: &mut TrailStack, target: TrailIdx) {
    while trail.top() > target {
        let top = trail.top() - 1;
        match trail.get(top) {
            TrailEntry::Binding { slot } => {
                let slot = *slot;
                heap.set(slot, Word::Var(slot));
            }
            TrailEntry::Assignment { target: addr, saved } => {
                let (addr, saved) = (*addr, *saved);
                let restored = heap.get(saved).clone();
                heap.set(addr, restored);
            }
        }
        trail.truncate(top);
    }
}

/// Unify the cells at `a` and `b`, binding whichever variables are needed
/// and trailing each binding. Returns `false` (leaving partial bindings in
/// place — the caller is expected to backtrack via `undo_to` on failure)
/// on mismatch.
///
/// `woken` collects the address of every attributed variable bound during
/// this call (spec §4.2 "attributed variables and wake-up"): the caller is
/// responsible for running the wake-up predicate over it at the next safe
/// point and clearing it first.
pub fn unify(
    heap: &mut GlobalStack,
    trail: &mut TrailStack,
    functors: &FunctorTable,
    woken: &mut Vec<GlobalIdx>,
    a: GlobalIdx,
    b: GlobalIdx,
) -> bool {
    let a = deref(heap, a);
    let b = deref(heap, b);
    if a == b {
        return true;
    }
    let wa = heap.get(a).clone();
    let wb = heap.get(b).clone();
    match (&wa, &wb) {
        (Word::Var(_), Word::Var(_)) => {
            // Bind the newer (higher-addressed) variable to the older one so
            // the trail only ever needs to undo toward the stack's base.
            if a < b {
                bind(heap, trail, b, Word::Reference(a));
            } else {
                bind(heap, trail, a, Word::Reference(b));
            }
            true
        }
        (Word::Var(_), _) => {
            bind(heap, trail, a, Word::Reference(b));
            true
        }
        (_, Word::Var(_)) => {
            bind(heap, trail, b, Word::Reference(a));
            true
        }
        (Word::AttVar(_), Word::AttVar(_)) => {
            if a < b {
                bind(heap, trail, b, Word::Reference(a));
                woken.push(b);
            } else {
                bind(heap, trail, a, Word::Reference(b));
                woken.push(a);
            }
            true
        }
        (Word::AttVar(_), _) => {
            bind(heap, trail, a, Word::Reference(b));
            woken.push(a);
            true
        }
        (_, Word::AttVar(_)) => {
            bind(heap, trail, b, Word::Reference(a));
            woken.push(b);
            true
        }
        (Word::Nil, Word::Nil) => true,
        (Word::Atom(x), Word::Atom(y)) => x == y,
        (Word::Integer(x), Word::Integer(y)) => x == y,
        (Word::FloatRef(fa), Word::FloatRef(fb)) => match (heap.indirect(*fa), heap.indirect(*fb)) {
            (Some(wam_core::Indirect::Float(x)), Some(wam_core::Indirect::Float(y))) => x == y,
            _ => false,
        },
        (Word::StringRef(sa), Word::StringRef(sb)) => match (heap.indirect(*sa), heap.indirect(*sb)) {
            (Some(wam_core::Indirect::Str(x)), Some(wam_core::Indirect::Str(y))) => x == y,
            _ => false,
        },
        (Word::Compound(fa, argsa), Word::Compound(fb, argsb)) => {
            if fa != fb {
                return false;
            }
            let (argsa, argsb) = (*argsa, *argsb);
            let arity = functors.arity(*fa) as u32;
            for i in 0..arity {
                if !unify(heap, trail, functors, woken, argsa + i, argsb + i) {
                    return false;
                }
            }
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wam_core::AtomId;

    #[test]
    fn unbound_variable_binds_to_atom() {
        let mut heap = GlobalStack::new();
        let mut trail = TrailStack::new();
        let functors = FunctorTable::new();
        let mut woken = Vec::new();
        let v = heap.push(Word::Var(0));
        let a = heap.push(Word::Atom(AtomId(1)));
        assert!(unify(&mut heap, &mut trail, &functors, &mut woken, v, a));
        assert_eq!(deref(&heap, v), a);
    }

    #[test]
    fn mismatched_atoms_fail_without_binding() {
        let mut heap = GlobalStack::new();
        let mut trail = TrailStack::new();
        let functors = FunctorTable::new();
        let mut woken = Vec::new();
        let a = heap.push(Word::Atom(AtomId(1)));
        let b = heap.push(Word::Atom(AtomId(2)));
        assert!(!unify(&mut heap, &mut trail, &functors, &mut woken, a, b));
        assert_eq!(trail.len(), 0);
    }

    #[test]
    fn backtracking_restores_unbound_state() {
        let mut heap = GlobalStack::new();
        let mut trail = TrailStack::new();
        let functors = FunctorTable::new();
        let mut woken = Vec::new();
        let v = heap.push(Word::Var(0));
        let mark = trail.top();
        let a = heap.push(Word::Atom(AtomId(7)));
        assert!(unify(&mut heap, &mut trail, &functors, &mut woken, v, a));
        undo_to(&mut heap, &mut trail, mark);
        assert_eq!(*heap.get(v), Word::Var(v));
    }

    #[test]
    fn two_unbound_variables_bind_older_to_newer_consistently() {
        let mut heap = GlobalStack::new();
        let mut trail = TrailStack::new();
        let functors = FunctorTable::new();
        let mut woken = Vec::new();
        let v1 = heap.push(Word::Var(0));
        let v2 = heap.push(Word::Var(1));
        assert!(unify(&mut heap, &mut trail, &functors, &mut woken, v1, v2));
        assert_eq!(deref(&heap, v2), v1);
    }

    #[test]
    fn attributed_variable_binds_like_a_plain_var_and_is_queued_for_wakeup() {
        let mut heap = GlobalStack::new();
        let mut trail = TrailStack::new();
        let functors = FunctorTable::new();
        let mut woken = Vec::new();
        let attrs = heap.push(Word::Nil);
        let v = heap.push(Word::AttVar(attrs));
        let a = heap.push(Word::Atom(AtomId(9)));
        assert!(unify(&mut heap, &mut trail, &functors, &mut woken, v, a));
        assert_eq!(deref(&heap, v), a);
        assert_eq!(woken, vec![v]);
    }

    #[test]
    fn compound_terms_unify_argument_by_argument() {
        let mut heap = GlobalStack::new();
        let mut trail = TrailStack::new();
        let functors = FunctorTable::new();
        let atoms = wam_core::AtomTable::new();
        let name = atoms.intern("f");
        let functor = functors.intern(name, 2);
        let a1 = heap.push(Word::Integer(1));
        let a2 = heap.push(Word::Integer(2));
        let ca = heap.push(Word::Compound(functor, a1));
        let _ = a2;
        let b1 = heap.push(Word::Var(0));
        let b2 = heap.push(Word::Integer(2));
        let cb = heap.push(Word::Compound(functor, b1));
        let _ = b2;
        let mut woken = Vec::new();
        assert!(unify(&mut heap, &mut trail, &functors, &mut woken, ca, cb));
    }
}
