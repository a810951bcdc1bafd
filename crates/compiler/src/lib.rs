//! Clause compiler: turns an already-parsed [`term::Term`] tree into a
//! `wam_core::Clause` (spec §4.1). The reader/parser that produces `Term`
//! values is out of scope; this crate starts from the term tree onward.

pub mod arith;
pub mod clause_compiler;
pub mod emit;
pub mod error;
pub mod opcode;
pub mod term;
pub mod varalloc;

pub use arith::{ArithFuncId, ArithTable};
pub use clause_compiler::{compile_clause, CompileOptions};
pub use error::CompileError;
pub use opcode::{Opcode, OperandKind, ReverseTable};
pub use term::{ControlShape, SourceClause, SourceVar, Term};
