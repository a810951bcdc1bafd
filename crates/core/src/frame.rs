//! Local-stack records (spec §3): `LocalFrame`, `Choice`, `FliFrame`,
//! `TrailEntry`. Pure data — the behavior that creates, walks and discards
//! them lives in `wam-runtime::interp`/`wam-runtime::gc`.

use crate::clause::{Clause, Generation};
use crate::procedure::ProcedureKey;
use crate::word::{GlobalIdx, LocalIdx, TrailIdx};
use std::sync::Arc;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FrameFlags: u8 {
        /// Has a `setup_and_call_cleanup/3` or catcher depending on it; cut
        /// past this frame must run its cleanup handler (spec §4.2 "Cut").
        const WATCHED = 0b0000_0001;
        const DEBUG    = 0b0000_0010;
    }
}

/// An activation record for a predicate call.
#[derive(Debug, Clone)]
pub struct LocalFrame {
    /// Return PC in the parent frame's code.
    pub pc_in_parent: u32,
    /// Index of the parent frame on the local stack, or `None` at the query
    /// root.
    pub parent: Option<LocalIdx>,
    /// The clause currently executing in this frame, if any (facts created
    /// via `I_ENTER`-less code have no clause object to point at).
    pub clause_ref: Option<Arc<Clause>>,
    pub predicate: ProcedureKey,
    pub context_module: crate::module::ModuleId,
    /// Snapshot generation this frame's query was opened with.
    pub generation: Generation,
    pub flags: FrameFlags,
    /// Call depth, purely diagnostic (matches spec's `level`).
    pub level: u32,
    /// Argument and clause-local variable slots, indices into the global
    /// stack (a frame slot is itself a [`crate::word::Word::Reference`] or a
    /// concrete value relocated in place by GC/shifter).
    pub slots: Vec<GlobalIdx>,
}

impl LocalFrame {
    pub fn arity(&self) -> usize {
        self.clause_ref
            .as_ref()
            .map(|_| self.slots.len())
            .unwrap_or(self.slots.len())
    }
}

/// A mark of the two stacks a choicepoint can rewind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    pub trail_top: TrailIdx,
    pub global_top: GlobalIdx,
}

/// What a choicepoint resumes into on backtracking.
#[derive(Debug, Clone)]
pub enum ChoiceKind {
    /// `;/2`: resume at a fixed PC.
    Jump(u32),
    /// Multi-clause call: try the next candidate clause, if any.
    Clause(Option<Arc<Clause>>),
    /// Foreign predicate signalled more solutions; opaque context word.
    Foreign(u64),
    Catch,
    Cleanup,
    Debug,
    Top,
    /// Placeholder used by local-cut bookkeeping; never actually resumed.
    None,
}

#[derive(Debug, Clone)]
pub struct Choice {
    pub kind: ChoiceKind,
    pub parent: Option<LocalIdx>,
    pub frame: LocalIdx,
    pub mark: Mark,
}

/// A foreign term-reference frame (spec §3, §4.6): `{parent, mark, size}`
/// followed by `size` words used as term handles.
#[derive(Debug, Clone)]
pub struct FliFrame {
    pub parent: Option<LocalIdx>,
    pub mark: Mark,
    pub handles: Vec<GlobalIdx>,
}

/// A trail entry: either an ordinary binding to undo, or a destructive
/// assignment pair (`target`, saved old value address).
#[derive(Debug, Clone, Copy)]
pub enum TrailEntry {
    Binding { slot: GlobalIdx },
    Assignment { target: GlobalIdx, saved: GlobalIdx },
}

impl TrailEntry {
    pub fn target(&self) -> GlobalIdx {
        match self {
            TrailEntry::Binding { slot } => *slot,
            TrailEntry::Assignment { target, .. } => *target,
        }
    }
}
