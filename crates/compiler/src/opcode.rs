//! The bytecode instruction set (spec §4.1, §4.2, §6).
//!
//! The source's threaded-dispatch table (`wam_table`/`dewam_table`) becomes,
//! per the Design Notes, an ordinary array indexed by a `#[repr(u16)]`
//! `Opcode` and a dense `match` in the interpreter rather than computed
//! goto. `Opcode::REVERSE` is that array, built once at program start, used
//! only by the disassembler/tracer (spec §4.2 "reverse map ... built lazily
//! for tracing").

/// Operand shapes an opcode's encoded argument can take, used by the
/// disassembler and the bytecode validator (spec §6 "argument-type
/// metadata").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    Proc,
    Func,
    Data,
    Integer,
    Int64,
    Float,
    Str,
    Module,
    Var,
    Mpz,
    Addr,
}

macro_rules! opcodes {
    ($($name:ident = $operand:expr),+ $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum Opcode {
            $($name),+
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name),+];

            pub fn operand(self) -> OperandKind {
                match self {
                    $(Opcode::$name => $operand),+
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(Opcode::$name => stringify!($name)),+
                }
            }
        }
    };
}

opcodes! {
    // --- Head unification (spec §4.1 "Head emission") ---
    HConst = OperandKind::Data,
    HNil = OperandKind::None,
    HInteger = OperandKind::Integer,
    HInt64 = OperandKind::Int64,
    HFloat = OperandKind::Float,
    HString = OperandKind::Str,
    HMpz = OperandKind::Mpz,
    HFirstVar = OperandKind::Var,
    HVoid = OperandKind::None,
    HVar = OperandKind::Var,
    HFunctor = OperandKind::Func,
    HList = OperandKind::None,
    HRFunctor = OperandKind::Func,
    HRList = OperandKind::None,
    IPopf = OperandKind::None,

    // --- Body construction (spec §4.1 "Body emission") ---
    BConst = OperandKind::Data,
    BNil = OperandKind::None,
    BInteger = OperandKind::Integer,
    BInt64 = OperandKind::Int64,
    BFloat = OperandKind::Float,
    BString = OperandKind::Str,
    BMpz = OperandKind::Mpz,
    BFirstVar = OperandKind::Var,
    BVar = OperandKind::Var,
    BFunctor = OperandKind::Func,
    BList = OperandKind::None,
    BPopf = OperandKind::None,

    // --- Control flow (spec §4.1) ---
    COr = OperandKind::Addr,
    CJmp = OperandKind::Addr,
    CVar = OperandKind::Var,
    CIfThenElse = OperandKind::Addr,
    CCut = OperandKind::Var,
    CSoftIf = OperandKind::Addr,
    CSoftCut = OperandKind::Var,
    CNot = OperandKind::Addr,
    CLCut = OperandKind::Var,
    CFail = OperandKind::None,

    // --- Calls, cut, enter/exit (spec §4.1, §4.2) ---
    ICall = OperandKind::Proc,
    IDepart = OperandKind::Proc,
    IEnter = OperandKind::None,
    IExit = OperandKind::None,
    IExitFact = OperandKind::None,
    ICut = OperandKind::None,
    IUserCall0 = OperandKind::None,
    IUserCallN = OperandKind::Integer,
    IApply = OperandKind::None,

    // --- Arithmetic (spec §4.1 "Arithmetic") ---
    AEnter = OperandKind::None,
    AInteger = OperandKind::Integer,
    AInt64 = OperandKind::Int64,
    ADouble = OperandKind::Float,
    AMpz = OperandKind::Mpz,
    AVar0 = OperandKind::None,
    AVar1 = OperandKind::None,
    AVar2 = OperandKind::None,
    AVarN = OperandKind::Var,
    AFunc0 = OperandKind::Integer,
    AFunc1 = OperandKind::Integer,
    AFunc2 = OperandKind::Integer,
    AFuncN = OperandKind::Integer,
    AIs = OperandKind::None,
    AFirstVarIs = OperandKind::Var,
    ALt = OperandKind::None,
    ALe = OperandKind::None,
    AGt = OperandKind::None,
    AGe = OperandKind::None,
    AEq = OperandKind::None,
    ANe = OperandKind::None,

    // --- Exceptions (spec §4.5) ---
    BThrow = OperandKind::None,
    ICatch = OperandKind::Addr,
}

/// Lazily-built reverse map from raw opcode value to [`Opcode`], used only
/// by the disassembler/tracer, never by the hot dispatch loop (which
/// indexes a dense `match` over `Opcode` directly).
pub struct ReverseTable(Vec<Option<Opcode>>);

impl ReverseTable {
    pub fn build() -> Self {
        let max = Opcode::ALL.iter().map(|o| *o as u16).max().unwrap_or(0);
        let mut table = vec![None; max as usize + 1];
        for op in Opcode::ALL {
            table[*op as u16 as usize] = Some(*op);
        }
        ReverseTable(table)
    }

    pub fn lookup(&self, raw: u16) -> Option<Opcode> {
        self.0.get(raw as usize).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_table_roundtrips_every_opcode() {
        let table = ReverseTable::build();
        for op in Opcode::ALL {
            assert_eq!(table.lookup(*op as u16), Some(*op));
        }
    }
}
