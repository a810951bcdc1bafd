//! wam-runtime: unification, the bytecode interpreter, garbage collection,
//! stack growth, foreign calls, thread engines and the embedding API for a
//! WAM-style logic engine.
//!
//! `wam-core` defines the data shapes (stacks, frames, clauses, tables);
//! this crate is the behavior driving them, split the way the teacher
//! splits "what a value is" from "what happens to it": `unify` and `interp`
//! are the hot path, `gc`/`shifter` are the two resource-management
//! systems that keep the hot path's stacks healthy, `engine`/`atom_gc`
//! are the multi-thread shell around one interpreter, and `query` is the
//! public entry point embedding code calls through.

pub mod atom_gc;
pub mod config;
pub mod engine;
pub mod error;
pub mod foreign;
pub mod gc;
pub mod interp;
pub mod query;
pub mod shifter;
pub mod unify;

pub use config::{DoubleQuotes, EngineConfig, OccursCheck, UnknownAction};
pub use engine::Engine;
pub use error::{Ball, Exception, PrologResult};
pub use foreign::{ForeignCallContext, ForeignFn, ForeignOutcome, ForeignTable};
pub use interp::Machine;
pub use query::{Query, QueryFlags};
