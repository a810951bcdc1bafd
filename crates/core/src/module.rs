//! Modules (spec §3): `{name, public/export table, operator table,
//! import-from list, flags}`.
//!
//! The reader/operator parser itself is out of scope (spec §1); the operator
//! table is still part of the module record because `clause/3`,
//! `current_op/3`-style introspection and the compiler's pretty-printer (used
//! only in diagnostics) need somewhere to look it up.

use crate::atom::AtomId;
use crate::procedure::ProcedureKey;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    Xfx,
    Xfy,
    Yfx,
    Fy,
    Fx,
    Xf,
    Yf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpDef {
    pub priority: u16,
    pub op_type: OpType,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModuleFlags: u8 {
        const SYSTEM = 0b0000_0001;
    }
}

#[derive(Debug, Clone)]
pub struct Module {
    pub name: AtomId,
    pub flags: ModuleFlags,
    /// Procedures exported from this module, visible unqualified to importers.
    pub exports: HashSet<ProcedureKey>,
    /// Modules this module imports from, in import order (first wins ties).
    pub imports_from: Vec<ModuleId>,
    /// Prefix/infix/postfix operator table, keyed by atom name.
    pub operators: HashMap<AtomId, Vec<OpDef>>,
}

impl Module {
    pub fn new(name: AtomId) -> Self {
        Module {
            name,
            flags: ModuleFlags::empty(),
            exports: HashSet::new(),
            imports_from: Vec::new(),
            operators: HashMap::new(),
        }
    }

    pub fn export(&mut self, key: ProcedureKey) {
        self.exports.insert(key);
    }

    pub fn is_exported(&self, key: &ProcedureKey) -> bool {
        self.exports.contains(key)
    }

    pub fn define_op(&mut self, name: AtomId, def: OpDef) {
        self.operators.entry(name).or_default().push(def);
    }
}

/// The process-wide module table, one entry per loaded module plus the
/// always-present `user` module.
pub struct ModuleTable {
    modules: Vec<Module>,
    by_name: HashMap<AtomId, ModuleId>,
}

impl ModuleTable {
    pub fn new() -> Self {
        ModuleTable {
            modules: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn intern(&mut self, name: AtomId) -> ModuleId {
        if let Some(id) = self.by_name.get(&name) {
            return *id;
        }
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(Module::new(name));
        self.by_name.insert(name, id);
        id
    }

    pub fn get(&self, id: ModuleId) -> &Module {
        &self.modules[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id.0 as usize]
    }

    pub fn find(&self, name: AtomId) -> Option<ModuleId> {
        self.by_name.get(&name).copied()
    }
}

impl Default for ModuleTable {
    fn default() -> Self {
        Self::new()
    }
}
