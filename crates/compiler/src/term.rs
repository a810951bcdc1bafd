//! Source terms (spec §4.1 input: "head-term + body-term").
//!
//! The reader/parser is out of scope (spec §1) — this is the tree the
//! compiler receives, already built by that external collaborator. It
//! mirrors the teacher's `ast.rs` AST shape (a plain recursive enum with a
//! source-variable name at the leaves) rather than anything tag-bit-packed;
//! packing happens only once compiled, in `wam_core::Word`.

use wam_core::AtomId;

/// A variable as the reader names it, before slot allocation assigns it a
/// frame offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceVar(pub String);

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Var(SourceVar),
    Atom(AtomId),
    Integer(i64),
    Float(f64),
    Str(String),
    Nil,
    /// `f(A1, ..., An)`, n >= 1. Lists `[H|T]` are sugar for `'.'(H, T)` and
    /// are represented the same way; the compiler special-cases `'.'/2` and
    /// `[]` only for the `H_LIST`/`B_LIST` opcode choice, not in this tree.
    Compound(AtomId, Vec<Term>),
}

impl Term {
    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }

    pub fn functor_arity(&self) -> Option<(AtomId, usize)> {
        match self {
            Term::Compound(name, args) => Some((*name, args.len())),
            _ => None,
        }
    }

    /// Walk every variable occurrence in source order (head then body use
    /// this to build the occurrence table for singleton/void analysis).
    pub fn for_each_var(&self, f: &mut impl FnMut(&SourceVar)) {
        match self {
            Term::Var(v) => f(v),
            Term::Compound(_, args) => {
                for a in args {
                    a.for_each_var(f);
                }
            }
            _ => {}
        }
    }
}

/// A clause as the reader hands it to the compiler: a head term and an
/// optional body (facts have no body).
#[derive(Debug, Clone)]
pub struct SourceClause {
    pub head: Term,
    pub body: Option<Term>,
}

/// A fully-qualified control/body goal shape the compiler lowers
/// specially (spec §4.1 "Body emission"). Recognized by functor/arity on an
/// already-parsed `Term`; everything else is an ordinary call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlShape {
    Conjunction,  // ','/2
    Disjunction,  // ';'/2 (or if-then-else when lhs is '->'/2 or '*->'/2)
    IfThen,       // '->'/2
    SoftIfThen,   // '*->'/2
    Negation,     // '\\+'/1
    Cut,          // '!'/0
    Catch,        // 'catch'/3
}
