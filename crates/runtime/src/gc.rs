//! Mark-sweep-compact garbage collection of the global stack (spec §4.3,
//! component C9), following `pl-gc.c`'s two-pass shape: mark every cell
//! reachable from the local stack's frames/choicepoints/FLI handles and the
//! trail, then compute each surviving cell's new address and rewrite every
//! reference to it.
//!
//! The source reverses pointers in place during marking to avoid an
//! auxiliary stack; since `wam-core::GlobalStack` already carries a
//! parallel mark bitmap (Design Notes: "a parallel bitmap when the target
//! language objects to bit-stealing"), this implementation walks an
//! explicit worklist instead — same two-pass structure, no unsafe pointer
//! reversal trick needed.

use wam_core::{
    FunctorTable, GlobalIdx, GlobalStack, LocalEntry, LocalStack, TrailIdx, TrailStack, Word,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct GcStats {
    pub cells_before: usize,
    pub cells_after: usize,
    pub trail_entries_reset: usize,
}

/// Phase 1: mark every global cell reachable from the local stack (frame
/// slots, choicepoint marks bound a frame but carry no roots of their own,
/// FLI handles) and from the trail (a trailed slot is always live, since
/// backtracking must still be able to read its prior binding chain).
fn mark(heap: &mut GlobalStack, locals: &LocalStack, trail: &TrailStack, functors: &FunctorTable) {
    heap.clear_marks();
    let mut worklist: Vec<GlobalIdx> = Vec::new();

    for entry in locals.iter() {
        match entry {
            LocalEntry::Frame(frame) => worklist.extend(frame.slots.iter().copied()),
            LocalEntry::Fli(fli) => worklist.extend(fli.handles.iter().copied()),
            LocalEntry::Choice(_) => {}
        }
    }
    for trail_entry in trail.iter() {
        worklist.push(trail_entry.target());
    }

    while let Some(addr) = worklist.pop() {
        mark_from(heap, functors, addr, &mut worklist);
    }
}

fn mark_from(heap: &mut GlobalStack, functors: &FunctorTable, addr: GlobalIdx, worklist: &mut Vec<GlobalIdx>) {
    if heap.is_marked(addr) {
        return;
    }
    heap.mark(addr);
    match heap.get(addr).clone() {
        Word::Reference(next) if next != addr => worklist.push(next),
        Word::AttVar(attrs) => worklist.push(attrs),
        Word::Compound(functor, args) => {
            let arity = functors.arity(functor) as u32;
            for i in 0..arity {
                worklist.push(args + i);
            }
        }
        Word::FloatRef(header) | Word::StringRef(header) => {
            if let Some(indirect) = heap.indirect(header) {
                let len = indirect.cell_len() as u32;
                for i in 1..len {
                    heap.mark(header + i);
                }
            }
        }
        _ => {}
    }
}

/// Phase 2: the trail's "early reset" optimization — a trailed binding
/// whose variable cell did not survive marking (it was created and
/// abandoned entirely within the current choicepoint span, with no other
/// live reference) can be dropped from the trail outright instead of
/// waiting to be undone on backtracking, per `pl-gc.c`. Returns the dead
/// indices in ascending order so the caller can reconcile any stored
/// `Mark::trail_top` against the positions `TrailStack::remove` shifted.
fn early_reset(heap: &GlobalStack, trail: &mut TrailStack) -> Vec<TrailIdx> {
    let mut dead: Vec<TrailIdx> = Vec::new();
    for (idx, entry) in trail.iter_from(0) {
        if !heap.is_marked(entry.target()) {
            dead.push(idx);
        }
    }
    for &idx in dead.iter().rev() {
        trail.remove(idx);
    }
    dead
}

/// `TrailStack::remove` shifts every later entry's position down by one.
/// A choicepoint's `mark.trail_top` is a plain position, recorded before
/// any of `removed` existed, so each one strictly below it must shift the
/// mark down by one too or the next `undo_to(mark.trail_top)` rewinds to
/// the wrong place.
fn reconcile_choice_marks(locals: &mut LocalStack, removed: &[TrailIdx]) {
    if removed.is_empty() {
        return;
    }
    for entry in locals.iter_mut() {
        if let LocalEntry::Choice(choice) = entry {
            let shift = removed.iter().filter(|&&r| r < choice.mark.trail_top).count() as TrailIdx;
            choice.mark.trail_top -= shift;
        }
    }
}

/// Phase 3: compute each marked cell's new (compacted) address, in
/// original order, then rewrite every pointer-shaped cell and every root
/// to its relocated value.
fn compact(heap: &mut GlobalStack, locals: &mut LocalStack) {
    let old_len = heap.len();
    let mut relocation: Vec<Option<GlobalIdx>> = vec![None; old_len];
    let mut next: GlobalIdx = 0;
    for (idx, _) in heap.iter() {
        if heap.is_marked(idx) {
            relocation[idx as usize] = Some(next);
            next += 1;
        }
    }

    let relocate = |addr: GlobalIdx| -> GlobalIdx {
        relocation[addr as usize].unwrap_or(addr)
    };

    let mut compacted: Vec<Word> = Vec::with_capacity(next as usize);
    for (idx, word) in heap.iter() {
        if !heap.is_marked(idx) {
            continue;
        }
        let relocated = match word.clone() {
            Word::Reference(target) => Word::Reference(relocate(target)),
            Word::AttVar(attrs) => Word::AttVar(relocate(attrs)),
            Word::Compound(functor, args) => Word::Compound(functor, relocate(args)),
            Word::FloatRef(header) => Word::FloatRef(relocate(header)),
            Word::StringRef(header) => Word::StringRef(relocate(header)),
            other => other,
        };
        compacted.push(relocated);
    }
    heap.replace_all(compacted);

    for entry in locals.iter_mut() {
        match entry {
            LocalEntry::Frame(frame) => {
                for slot in &mut frame.slots {
                    *slot = relocate(*slot);
                }
            }
            LocalEntry::Fli(fli) => {
                for handle in &mut fli.handles {
                    *handle = relocate(*handle);
                }
            }
            LocalEntry::Choice(choice) => {
                // `global_top` is a high-water size, not a live cell
                // reference, so it isn't in `relocation` at all. `trail_top`
                // is reconciled separately, in `reconcile_choice_marks`,
                // before this pass runs.
                let _ = choice;
            }
        }
    }
}

/// Run a full mark/early-reset/compact cycle (spec §4.3's three
/// contentful phases; "unsweep" in `pl-gc.c` is the pointer-reversal
/// undo step, made unnecessary by the explicit worklist above).
pub fn collect(
    heap: &mut GlobalStack,
    locals: &mut LocalStack,
    trail: &mut TrailStack,
    functors: &FunctorTable,
) -> GcStats {
    let cells_before = heap.len();
    mark(heap, locals, trail, functors);
    let removed = early_reset(heap, trail);
    let trail_entries_reset = removed.len();
    reconcile_choice_marks(locals, &removed);
    compact(heap, locals);
    let cells_after = heap.len();
    heap.clear_marks();
    GcStats { cells_before, cells_after, trail_entries_reset }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wam_core::{AtomTable, FrameFlags, Generation, LocalFrame, ModuleId};

    fn frame(slots: Vec<GlobalIdx>) -> LocalEntry {
        LocalEntry::Frame(LocalFrame {
            pc_in_parent: 0,
            parent: None,
            clause_ref: None,
            predicate: wam_core::ProcedureKey { module: ModuleId(0), functor: wam_core::FunctorId(0) },
            context_module: ModuleId(0),
            generation: Generation(0),
            flags: FrameFlags::empty(),
            level: 0,
            slots,
        })
    }

    #[test]
    fn unreachable_cells_are_reclaimed() {
        let mut heap = GlobalStack::new();
        let mut locals = LocalStack::new();
        let mut trail = TrailStack::new();
        let functors = FunctorTable::new();
        let atoms = AtomTable::new();

        let garbage = heap.push(Word::Atom(atoms.intern("garbage")));
        let kept = heap.push(Word::Atom(atoms.intern("kept")));
        let _ = garbage;
        locals.push(frame(vec![kept]));

        let stats = collect(&mut heap, &mut locals, &mut trail, &functors);
        assert_eq!(stats.cells_before, 2);
        assert_eq!(stats.cells_after, 1);
    }

    #[test]
    fn live_choicepoint_trail_mark_shifts_by_the_entries_early_reset_removes() {
        use wam_core::{Choice, ChoiceKind, Mark, TrailEntry};

        let mut heap = GlobalStack::new();
        let mut locals = LocalStack::new();
        let mut trail = TrailStack::new();
        let atoms = AtomTable::new();

        let dead = heap.push(Word::Atom(atoms.intern("dead")));
        trail.push(TrailEntry::Binding { slot: dead });
        let kept = heap.push(Word::Atom(atoms.intern("kept")));
        trail.push(TrailEntry::Binding { slot: kept });

        // Simulate the outcome of `mark`: `kept` survived, `dead` didn't.
        heap.clear_marks();
        heap.mark(kept);

        let mark_before = Mark { trail_top: trail.top(), global_top: heap.top() };
        locals.push(LocalEntry::Choice(Choice { kind: ChoiceKind::Catch, parent: None, frame: 0, mark: mark_before }));

        let removed = early_reset(&heap, &mut trail);
        assert_eq!(removed, vec![0]);
        assert_eq!(trail.top(), mark_before.trail_top - 1);

        reconcile_choice_marks(&mut locals, &removed);
        match locals.get(0) {
            LocalEntry::Choice(c) => assert_eq!(c.mark.trail_top, trail.top()),
            other => panic!("expected the choicepoint to survive at index 0, got {other:?}"),
        }
    }

    #[test]
    fn reachable_references_are_relocated_consistently() {
        let mut heap = GlobalStack::new();
        let mut locals = LocalStack::new();
        let mut trail = TrailStack::new();
        let functors = FunctorTable::new();
        let atoms = AtomTable::new();

        let _pad = heap.push(Word::Atom(atoms.intern("pad")));
        let target = heap.push(Word::Atom(atoms.intern("target")));
        let reference = heap.push(Word::Reference(target));
        locals.push(frame(vec![reference]));

        collect(&mut heap, &mut locals, &mut trail, &functors);
        if let LocalEntry::Frame(f) = locals.get(0) {
            let relocated_ref = f.slots[0];
            if let Word::Reference(new_target) = heap.get(relocated_ref) {
                assert_eq!(*heap.get(*new_target), Word::Atom(atoms.intern("target")));
            } else {
                panic!("expected relocated reference cell");
            }
        }
    }
}
