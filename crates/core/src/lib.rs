//! Tagged-word data model and interned symbol tables for a WAM-style logic
//! engine (spec §3, components C1/C2).
//!
//! This crate owns the *shapes*: `Word`, the four execution stacks, atoms,
//! functors, modules, procedures and clauses. The behavior that walks them —
//! unification, the bytecode dispatch loop, GC, the stack shifter — lives in
//! `wam-runtime`; the behavior that produces clause bytecode lives in
//! `wam-compiler`.

pub mod atom;
pub mod clause;
pub mod frame;
pub mod functor;
pub mod module;
pub mod procedure;
pub mod stacks;
pub mod word;

pub use atom::{AtomId, AtomTable};
pub use clause::{Clause, Code, Generation, GenerationCounter};
pub use frame::{Choice, ChoiceKind, FliFrame, FrameFlags, LocalFrame, Mark, TrailEntry};
pub use functor::{FunctorId, FunctorKey, FunctorTable};
pub use module::{Module, ModuleFlags, ModuleId, ModuleTable, OpDef, OpType};
pub use procedure::{ClauseIndex, IndexKey, Procedure, ProcedureFlags, ProcedureKey};
pub use stacks::{ArgStack, GlobalStack, LocalEntry, LocalStack, TrailStack};
pub use word::{GlobalIdx, Indirect, LocalIdx, Storage, Tag, TrailIdx, Word};

/// The process-wide symbol tables shared by every engine (Design Notes:
/// "consolidated into one process-wide `Arc<RuntimeGlobals>`"). Each table
/// guards its own interior mutability; there is deliberately no single lock
/// covering all of them, matching `pl-thread.c`'s per-role mutex naming
/// (`L_ATOM, L_FUNCTOR, L_MODULE, L_PREDICATE`, ...).
pub struct RuntimeGlobals {
    pub atoms: AtomTable,
    pub functors: FunctorTable,
    pub modules: parking_lot::RwLock<ModuleTable>,
    pub procedures: parking_lot::RwLock<std::collections::HashMap<ProcedureKey, std::sync::Arc<Procedure>>>,
    pub generation: GenerationCounter,
}

impl RuntimeGlobals {
    pub fn new() -> std::sync::Arc<Self> {
        let mut modules = ModuleTable::new();
        let atoms = AtomTable::new();
        let user = atoms.intern("user");
        modules.intern(user);
        std::sync::Arc::new(RuntimeGlobals {
            atoms,
            functors: FunctorTable::new(),
            modules: parking_lot::RwLock::new(modules),
            procedures: parking_lot::RwLock::new(std::collections::HashMap::new()),
            generation: GenerationCounter::new(),
        })
    }

    /// Look up (or lazily create) the procedure record for `key`.
    pub fn procedure(&self, key: ProcedureKey) -> std::sync::Arc<Procedure> {
        if let Some(p) = self.procedures.read().get(&key) {
            return p.clone();
        }
        let mut procs = self.procedures.write();
        procs
            .entry(key)
            .or_insert_with(|| {
                std::sync::Arc::new(Procedure::new(
                    key,
                    ProcedureFlags::empty(),
                    self.generation.current(),
                ))
            })
            .clone()
    }

    pub fn user_module(&self) -> ModuleId {
        let user = self.atoms.intern("user");
        self.modules
            .read()
            .find(user)
            .expect("user module interned at RuntimeGlobals::new")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globals_bootstrap_user_module() {
        let globals = RuntimeGlobals::new();
        let user = globals.user_module();
        let name = globals.atoms.name(globals.modules.read().get(user).name);
        assert_eq!(&*name, "user");
    }
}
