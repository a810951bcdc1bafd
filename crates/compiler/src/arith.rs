//! The arithmetic function table (spec §4.2a, grounded on `pl-comp.c`'s
//! function registry keyed by `(name, arity)`).
//!
//! `A_FUNC0`/`A_FUNC1`/`A_FUNC2`/`A_FUNCN` operands are indices into this
//! table rather than re-encoding the functor on every call; `wam-runtime`
//! evaluates against the same index space by rebuilding the table from the
//! same name list at engine start.

use wam_core::AtomId;

/// Every arithmetic function/operator name, in table-index order. Both the
/// compiler (to resolve a call site's index) and the runtime (to dispatch
/// on it) build their table by interning this exact list in this exact
/// order, so the two tables always agree without sharing a type.
pub const FUNCTION_NAMES: &[(&str, u16)] = &[
    ("+", 2),
    ("-", 2),
    ("*", 2),
    ("/", 2),
    ("//", 2),
    ("mod", 2),
    ("rem", 2),
    ("div", 2),
    ("abs", 1),
    ("sign", 1),
    ("min", 2),
    ("max", 2),
    ("sqrt", 1),
    ("sin", 1),
    ("cos", 1),
    ("tan", 1),
    ("atan", 1),
    ("atan2", 2),
    ("exp", 1),
    ("log", 1),
    ("**", 2),
    ("^", 2),
    (">>", 2),
    ("<<", 2),
    ("/\\", 2),
    ("\\/", 2),
    ("xor", 2),
    ("\\", 1),
    ("-", 1),
    ("+", 1),
    ("float", 1),
    ("integer", 1),
    ("truncate", 1),
    ("round", 1),
    ("ceiling", 1),
    ("floor", 1),
    ("float_integer_part", 1),
    ("float_fractional_part", 1),
    ("pi", 0),
    ("e", 0),
    ("random", 1),
    ("msb", 1),
    ("gcd", 2),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArithFuncId(pub u16);

#[derive(Debug, Default)]
pub struct ArithTable {
    by_key: std::collections::HashMap<(AtomId, u16), ArithFuncId>,
}

impl ArithTable {
    /// Build the table by interning [`FUNCTION_NAMES`] through `intern` (an
    /// atom table lookup), in list order, so index == `ArithFuncId`.
    pub fn build(mut intern: impl FnMut(&str) -> AtomId) -> Self {
        let mut by_key = std::collections::HashMap::new();
        for (i, (name, arity)) in FUNCTION_NAMES.iter().enumerate() {
            let atom = intern(name);
            by_key.insert((atom, *arity), ArithFuncId(i as u16));
        }
        ArithTable { by_key }
    }

    pub fn lookup(&self, name: AtomId, arity: u16) -> Option<ArithFuncId> {
        self.by_key.get(&(name, arity)).copied()
    }

    /// Name and arity `id` was registered under, for the runtime's
    /// evaluator to dispatch on (`A_FUNCN`'s operand carries no arity of
    /// its own, since it was already fixed when the index was assigned).
    pub fn name_and_arity(&self, id: ArithFuncId) -> (&'static str, u16) {
        FUNCTION_NAMES[id.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wam_core::AtomTable;

    #[test]
    fn distinguishes_unary_and_binary_minus() {
        let atoms = AtomTable::new();
        let table = ArithTable::build(|s| atoms.intern(s));
        let minus = atoms.intern("-");
        let unary = table.lookup(minus, 1).unwrap();
        let binary = table.lookup(minus, 2).unwrap();
        assert_ne!(unary, binary);
    }

    #[test]
    fn unknown_function_is_absent() {
        let atoms = AtomTable::new();
        let table = ArithTable::build(|s| atoms.intern(s));
        let nope = atoms.intern("not_an_arith_fn");
        assert!(table.lookup(nope, 3).is_none());
    }
}
