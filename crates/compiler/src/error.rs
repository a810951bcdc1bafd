//! Compile-time errors (spec §7, same hand-rolled-enum idiom as the
//! runtime's exception type: no `thiserror`/`anyhow`, a plain `Display` and
//! `std::error::Error` impl).

use crate::term::SourceVar;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// The head of a clause is a variable or a number, which cannot name a
    /// procedure.
    InvalidHead,
    /// A body goal occurred where a callable term was required.
    NotCallable,
    /// `!` used where it's meaningless to this compiler (kept permissive:
    /// currently unused, reserved for a future strictness flag).
    MisplacedCut,
    /// A variable used in an arithmetic context could not be resolved to a
    /// number at compile time and the expression shape requires one
    /// (`is/2`'s right-hand side is not a closed arithmetic expression).
    NotArithmetic(SourceVar),
    /// An unrecognized arithmetic function/arity combination.
    UnknownFunction { name: String, arity: u16 },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::InvalidHead => write!(f, "clause head is not callable"),
            CompileError::NotCallable => write!(f, "body goal is not callable"),
            CompileError::MisplacedCut => write!(f, "cut used outside a clause body"),
            CompileError::NotArithmetic(v) => {
                write!(f, "variable {} is not bound to an arithmetic expression", v.0)
            }
            CompileError::UnknownFunction { name, arity } => {
                write!(f, "unknown arithmetic function {}/{}", name, arity)
            }
        }
    }
}

impl std::error::Error for CompileError {}
