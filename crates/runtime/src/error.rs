//! Exception handling (spec §4.5, §7): `throw/1` carries an arbitrary term
//! through Rust's own call stack up to the nearest enclosing `catch/3`.
//!
//! Matches the teacher's error-handling idiom — a hand-rolled enum with a
//! manual `Display`/`std::error::Error` impl, no `thiserror`/`anyhow` —
//! generalized from "thread-local last-error string" to "typed ball
//! carrying a heap term", since a logic engine's exceptions are terms, not
//! strings.

use std::fmt;
use wam_core::GlobalIdx;

/// The thrown term lives on the global stack like any other term; `ball`
/// is its root address. Rust's own `Result`/`?` carries this out of
/// `interp::run` to the nearest `catch/3` frame, exactly as the source
/// unwinds the local stack on a longjmp-style throw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ball(pub GlobalIdx);

#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// `throw/1`: an arbitrary term propagating to the nearest catcher.
    Thrown(Ball),
    /// No clause exists for this predicate and `unknown` is `error` (the
    /// ISO default) rather than `fail`.
    ExistenceErrorProcedure { name: String, arity: u16 },
    TypeError { expected: &'static str, culprit: String },
    InstantiationError,
    DomainError { domain: &'static str, culprit: String },
    EvaluationError(&'static str),
    PermissionError { operation: &'static str, kind: &'static str, culprit: String },
    /// A resource limit was exceeded (stack exhausted before the shifter
    /// could grow it further, e.g. `max_global_size` hit).
    ResourceError(&'static str),
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exception::Thrown(ball) => write!(f, "uncaught exception (ball at {:?})", ball.0),
            Exception::ExistenceErrorProcedure { name, arity } => {
                write!(f, "unknown procedure {}/{}", name, arity)
            }
            Exception::TypeError { expected, culprit } => {
                write!(f, "type_error({}, {})", expected, culprit)
            }
            Exception::InstantiationError => write!(f, "instantiation_error"),
            Exception::DomainError { domain, culprit } => {
                write!(f, "domain_error({}, {})", domain, culprit)
            }
            Exception::EvaluationError(kind) => write!(f, "evaluation_error({})", kind),
            Exception::PermissionError { operation, kind, culprit } => {
                write!(f, "permission_error({}, {}, {})", operation, kind, culprit)
            }
            Exception::ResourceError(what) => write!(f, "resource_error({})", what),
        }
    }
}

impl std::error::Error for Exception {}

pub type PrologResult<T> = Result<T, Exception>;
