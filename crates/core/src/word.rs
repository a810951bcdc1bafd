//! The tagged-word data model (spec §3, Design Notes).
//!
//! The reference implementation packs a 3-bit tag and a 2-bit storage class
//! into the low bits of a machine word and steals two more bits for GC's
//! mark/first flags. Rust has no good reason to fight the borrow checker
//! over stolen payload bits, so `Word` is a plain sum type: addresses are
//! indices into the owning stack's backing `Vec`, not raw pointers. A stack
//! shift or GC compaction becomes "write new indices", not "relocate bytes".

use crate::atom::AtomId;
use crate::functor::FunctorId;

/// Index of a cell on the global stack (the term heap).
pub type GlobalIdx = u32;

/// Index of a cell on the local stack (frames, choicepoints, term refs).
pub type LocalIdx = u32;

/// Index of an entry on the trail.
pub type TrailIdx = u32;

/// Which stack a [`Word`] is allocated on, mirroring spec §3's `Storage`
/// classification (`INLINE, STATIC, GLOBAL, LOCAL, TRAIL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Storage {
    /// Fits entirely inline in the word (atoms, small integers).
    Inline,
    /// Never moves: interned data shared across engines.
    Static,
    /// Lives on the global (term) stack.
    Global,
    /// Lives on the local (frame/choicepoint) stack.
    Local,
    /// Lives on the trail.
    Trail,
}

/// The tag half of spec §3's `Word`: `VAR, ATTVAR, INTEGER, ATOM, STRING,
/// FLOAT, COMPOUND, REFERENCE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    Var = 0,
    AttVar = 1,
    Integer = 2,
    Atom = 3,
    String = 4,
    Float = 5,
    Compound = 6,
    Reference = 7,
}

/// A single tagged machine word.
///
/// A variable is a word whose payload is a self-reference (unbound, i.e.
/// `Reference(self_address)`) or forwards to another word (bound). Compounds,
/// floats, bignums and strings live on the global stack as an
/// [`Indirect`](crate::indirect::Indirect) run rather than inline, matching
/// spec §3's "contiguous runs preceded by a functor/indirect header".
#[derive(Debug, Clone, PartialEq)]
pub enum Word {
    /// Unbound variable; self-reference back to its own global slot.
    Var(GlobalIdx),
    /// Bound variable with an attribute list (the list lives in an indirect
    /// run on the global stack, referenced by `attrs`).
    AttVar(GlobalIdx),
    /// A reference chain link: bound to another global cell.
    Reference(GlobalIdx),
    /// A machine integer (small-int fast path; bignums use `Indirect`).
    Integer(i64),
    /// An interned atom.
    Atom(AtomId),
    /// Header word for an indirect string run; payload is the run's start.
    StringRef(GlobalIdx),
    /// A 64-bit float, boxed on the global stack so it is scannable by GC
    /// like any other indirect (spec §3: "followed by a matching trailer").
    FloatRef(GlobalIdx),
    /// Header word for a compound term: `functor` plus the start of its
    /// argument run (always immediately following the header on the global
    /// stack in the reference layout).
    Compound(FunctorId, GlobalIdx),
    /// `[]`, kept distinct from a zero-arity atom only for readability; it
    /// compiles and unifies exactly like the atom `'[]'`.
    Nil,
}

impl Word {
    pub fn tag(&self) -> Tag {
        match self {
            Word::Var(_) => Tag::Var,
            Word::AttVar(_) => Tag::AttVar,
            Word::Reference(_) => Tag::Reference,
            Word::Integer(_) => Tag::Integer,
            Word::Atom(_) | Word::Nil => Tag::Atom,
            Word::StringRef(_) => Tag::String,
            Word::FloatRef(_) => Tag::Float,
            Word::Compound(..) => Tag::Compound,
        }
    }

    pub fn storage(&self) -> Storage {
        match self {
            Word::Integer(_) | Word::Atom(_) | Word::Nil => Storage::Inline,
            _ => Storage::Global,
        }
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Word::Var(_) | Word::AttVar(_))
    }

    pub fn is_atomic(&self) -> bool {
        matches!(
            self,
            Word::Integer(_) | Word::Atom(_) | Word::Nil | Word::StringRef(_) | Word::FloatRef(_)
        )
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Word::Atom(_) | Word::Nil | Word::Compound(..))
    }
}

/// A multi-word indirect run on the global stack: a float, bignum or string,
/// bracketed by identical header/trailer size words so the global stack
/// "is scannable in both directions" (spec §3 invariant).
#[derive(Debug, Clone, PartialEq)]
pub enum Indirect {
    Float(f64),
    Big(Vec<u64>),
    Str(String),
}

impl Indirect {
    /// Number of `Word`-sized cells this indirect occupies once boxed,
    /// including the header and trailer size words.
    pub fn cell_len(&self) -> usize {
        let payload_words = match self {
            Indirect::Float(_) => 1,
            Indirect::Big(limbs) => limbs.len(),
            Indirect::Str(s) => s.len().div_ceil(8).max(1),
        };
        payload_words + 2
    }
}
