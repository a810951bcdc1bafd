//! The four execution stacks (spec §1 C1): local (frames/choices/termrefs),
//! global (heap terms), trail (bindings to undo), argument (parser/term
//! construction scratch).
//!
//! Per the Design Notes, each is a plain growable `Vec` addressed by index
//! rather than raw pointer. Growing one is then "extend the `Vec`"; the
//! stack shifter (`wam-runtime::shifter`) becomes the bookkeeping that keeps
//! every *other* index-valued field consistent when a `Vec` reallocates, not
//! a manual memmove.

use crate::frame::{Choice, FliFrame, LocalFrame, TrailEntry};
use crate::word::{GlobalIdx, Indirect, LocalIdx, TrailIdx, Word};

/// A local-stack entry: a frame, a choicepoint, or a foreign term-ref frame,
/// interleaved in call order exactly as the source interleaves them on one
/// stack.
#[derive(Debug, Clone)]
pub enum LocalEntry {
    Frame(LocalFrame),
    Choice(Choice),
    Fli(FliFrame),
}

/// The local stack: frames, choicepoints and FLI frames.
#[derive(Debug, Default)]
pub struct LocalStack {
    entries: Vec<LocalEntry>,
}

impl LocalStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn top(&self) -> LocalIdx {
        self.entries.len() as LocalIdx
    }

    pub fn push(&mut self, entry: LocalEntry) -> LocalIdx {
        let idx = self.top();
        self.entries.push(entry);
        idx
    }

    pub fn get(&self, idx: LocalIdx) -> &LocalEntry {
        &self.entries[idx as usize]
    }

    pub fn get_mut(&mut self, idx: LocalIdx) -> &mut LocalEntry {
        &mut self.entries[idx as usize]
    }

    /// Discard every entry from `new_top` onward (failure, cut).
    pub fn truncate(&mut self, new_top: LocalIdx) {
        self.entries.truncate(new_top as usize);
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LocalEntry> {
        self.entries.iter_mut()
    }
}

/// The global stack: the term heap. Inline `Word`s sit directly in the
/// vector; indirects (floats/bignums/strings) occupy a contiguous
/// header-payload-trailer run so the stack stays scannable both directions
/// (spec §3 invariant).
#[derive(Debug, Default)]
pub struct GlobalStack {
    cells: Vec<Word>,
    /// Out-of-line payloads for indirect runs, addressed by the global
    /// index of their header cell.
    indirects: std::collections::HashMap<GlobalIdx, Indirect>,
    /// GC mark bits, parallel to `cells` rather than stolen from the
    /// payload (Design Notes: "a parallel bitmap ... when the target
    /// language objects to bit-stealing").
    marks: Vec<bool>,
}

impl GlobalStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn top(&self) -> GlobalIdx {
        self.cells.len() as GlobalIdx
    }

    pub fn push(&mut self, word: Word) -> GlobalIdx {
        let idx = self.top();
        self.cells.push(word);
        self.marks.push(false);
        idx
    }

    pub fn push_indirect(&mut self, indirect: Indirect) -> GlobalIdx {
        let header = self.top();
        let len = indirect.cell_len();
        self.indirects.insert(header, indirect);
        for _ in 0..len {
            self.cells.push(Word::Reference(header));
            self.marks.push(false);
        }
        header
    }

    pub fn get(&self, idx: GlobalIdx) -> &Word {
        &self.cells[idx as usize]
    }

    pub fn set(&mut self, idx: GlobalIdx, word: Word) {
        self.cells[idx as usize] = word;
    }

    pub fn indirect(&self, header: GlobalIdx) -> Option<&Indirect> {
        self.indirects.get(&header)
    }

    pub fn truncate(&mut self, new_top: GlobalIdx) {
        self.cells.truncate(new_top as usize);
        self.marks.truncate(new_top as usize);
        self.indirects.retain(|&addr, _| addr < new_top);
    }

    pub fn mark(&mut self, idx: GlobalIdx) {
        self.marks[idx as usize] = true;
    }

    pub fn is_marked(&self, idx: GlobalIdx) -> bool {
        self.marks[idx as usize]
    }

    pub fn clear_marks(&mut self) {
        for m in &mut self.marks {
            *m = false;
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cells.capacity()
    }

    pub fn iter(&self) -> impl Iterator<Item = (GlobalIdx, &Word)> {
        self.cells
            .iter()
            .enumerate()
            .map(|(i, w)| (i as GlobalIdx, w))
    }

    /// Overwrite the entire cell vector in place, as the GC compactor does
    /// once it has computed every surviving cell's new address.
    pub fn replace_all(&mut self, cells: Vec<Word>) {
        self.marks.resize(cells.len(), false);
        self.cells = cells;
    }
}

/// The trail: bindings to undo on backtracking.
#[derive(Debug, Default)]
pub struct TrailStack {
    entries: Vec<TrailEntry>,
}

impl TrailStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn top(&self) -> TrailIdx {
        self.entries.len() as TrailIdx
    }

    pub fn push(&mut self, entry: TrailEntry) -> TrailIdx {
        let idx = self.top();
        self.entries.push(entry);
        idx
    }

    pub fn get(&self, idx: TrailIdx) -> &TrailEntry {
        &self.entries[idx as usize]
    }

    pub fn truncate(&mut self, new_top: TrailIdx) {
        self.entries.truncate(new_top as usize);
    }

    /// Remove the entry at `idx`, shifting later entries down by one. Used
    /// by GC's early-reset sweep (spec §4.3 Phase 2), which deletes
    /// individual dead entries rather than only ever truncating from the
    /// top.
    pub fn remove(&mut self, idx: TrailIdx) -> TrailEntry {
        self.entries.remove(idx as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrailEntry> {
        self.entries.iter()
    }

    pub fn iter_from(&self, start: TrailIdx) -> impl Iterator<Item = (TrailIdx, &TrailEntry)> {
        self.entries[start as usize..]
            .iter()
            .enumerate()
            .map(move |(i, e)| (start + i as TrailIdx, e))
    }
}

/// The argument stack: a LIFO of saved `ARGP` positions across nested
/// `H_FUNCTOR`/`B_FUNCTOR` construction (spec §4.2).
#[derive(Debug, Default)]
pub struct ArgStack {
    saved: Vec<GlobalIdx>,
}

impl ArgStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, addr: GlobalIdx) {
        self.saved.push(addr);
    }

    pub fn pop(&mut self) -> Option<GlobalIdx> {
        self.saved.pop()
    }

    pub fn len(&self) -> usize {
        self.saved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }
}
