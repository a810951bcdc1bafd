//! Top-level clause compilation: head unification plus body emission with
//! control-flow and arithmetic lowering (spec §4.1 "Head emission", "Body
//! emission", §4.1a, §4.2a).

use crate::arith::ArithTable;
use crate::emit::Emitter;
use crate::error::CompileError;
use crate::opcode::Opcode;
use crate::term::{ControlShape, SourceClause, SourceVar, Term};
use crate::varalloc::VarTable;
use wam_core::{AtomId, Clause, Generation, IndexKey, ProcedureKey, RuntimeGlobals};

/// Flags threaded from `EngineConfig` into codegen (spec §4.1a).
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub occurs_check: bool,
}

pub fn compile_clause(
    globals: &RuntimeGlobals,
    key: ProcedureKey,
    clause: &SourceClause,
    arith: &ArithTable,
    opts: CompileOptions,
    created: Generation,
) -> Result<Clause, CompileError> {
    let mut vars = VarTable::new();
    vars.scan(&clause.head);
    if let Some(body) = &clause.body {
        vars.scan(body);
    }

    let index_key = match &clause.head {
        Term::Atom(_) | Term::Nil => IndexKey::Any,
        Term::Compound(_, args) => match args.first() {
            Some(first) => index_key_of(first, globals),
            None => IndexKey::Any,
        },
        Term::Var(_) | Term::Integer(_) | Term::Float(_) | Term::Str(_) => {
            return Err(CompileError::InvalidHead);
        }
    };

    let mut em = Emitter::new();
    if let Term::Compound(_, args) = &clause.head {
        for a in args {
            emit_head_term(&mut em, &mut vars, globals, opts, a);
        }
    }

    let committing = match &clause.body {
        None => {
            em.op(Opcode::IExitFact);
            false
        }
        Some(body) => {
            em.op(Opcode::IEnter);
            emit_goal(&mut em, &mut vars, globals, arith, body, true)?;
            em.op(Opcode::IExit);
            ends_in_cut(body, globals)
        }
    };

    let code = em.finish();
    Ok(Clause::new(key, index_key, vars.num_vars(), code, committing, created))
}

fn index_key_of(term: &Term, globals: &RuntimeGlobals) -> IndexKey {
    match term {
        Term::Var(_) => IndexKey::Any,
        Term::Atom(a) => IndexKey::Atom(*a),
        Term::Nil => IndexKey::Atom(globals.atoms.intern("[]")),
        Term::Integer(i) => IndexKey::Integer(*i),
        Term::Float(_) | Term::Str(_) => IndexKey::Any,
        Term::Compound(name, args) => {
            IndexKey::Functor(globals.functors.intern(*name, args.len() as u16))
        }
    }
}

fn dot_atom(globals: &RuntimeGlobals) -> AtomId {
    globals.atoms.intern(".")
}

fn classify_control(term: &Term, globals: &RuntimeGlobals) -> Option<ControlShape> {
    match term {
        Term::Compound(name, args) => {
            let n = globals.atoms.name(*name);
            match (&*n, args.len()) {
                (",", 2) => Some(ControlShape::Conjunction),
                (";", 2) => Some(ControlShape::Disjunction),
                ("->", 2) => Some(ControlShape::IfThen),
                ("*->", 2) => Some(ControlShape::SoftIfThen),
                ("\\+", 1) => Some(ControlShape::Negation),
                ("catch", 3) => Some(ControlShape::Catch),
                _ => None,
            }
        }
        Term::Atom(a) if &*globals.atoms.name(*a) == "!" => Some(ControlShape::Cut),
        _ => None,
    }
}

fn is_cut(term: &Term, globals: &RuntimeGlobals) -> bool {
    matches!(classify_control(term, globals), Some(ControlShape::Cut))
}

fn ends_in_cut(term: &Term, globals: &RuntimeGlobals) -> bool {
    match (classify_control(term, globals), term) {
        (Some(ControlShape::Conjunction), Term::Compound(_, args)) => {
            ends_in_cut(&args[1], globals)
        }
        _ => is_cut(term, globals),
    }
}

fn arith_relation_opcode(name: &str) -> Option<Opcode> {
    match name {
        "<" => Some(Opcode::ALt),
        "=<" => Some(Opcode::ALe),
        ">" => Some(Opcode::AGt),
        ">=" => Some(Opcode::AGe),
        "=:=" => Some(Opcode::AEq),
        "=\\=" => Some(Opcode::ANe),
        _ => None,
    }
}

fn emit_head_term(
    em: &mut Emitter,
    vars: &mut VarTable,
    globals: &RuntimeGlobals,
    opts: CompileOptions,
    term: &Term,
) {
    match term {
        Term::Var(v) => {
            let slot = vars.slot_of(v);
            if vars.first_occurrence(v) {
                em.op(Opcode::HFirstVar).operand_var_slot(slot.0);
            } else {
                em.op(Opcode::HVar).operand_var_slot(slot.0);
            }
        }
        Term::Nil => {
            em.op(Opcode::HNil);
        }
        Term::Atom(a) => {
            em.op(Opcode::HConst).operand_atom(*a);
        }
        Term::Integer(i) => {
            if let Ok(small) = i32::try_from(*i) {
                em.op(Opcode::HInteger).operand_u32(small as u32);
            } else {
                em.op(Opcode::HInt64).operand_i64(*i);
            }
        }
        Term::Float(f) => {
            em.op(Opcode::HFloat).operand_f64(*f);
        }
        Term::Str(s) => {
            em.op(Opcode::HString).operand_str(s);
        }
        Term::Compound(name, args) if *name == dot_atom(globals) && args.len() == 2 => {
            em.op(if opts.occurs_check { Opcode::HRList } else { Opcode::HList });
            emit_head_term(em, vars, globals, opts, &args[0]);
            emit_head_term(em, vars, globals, opts, &args[1]);
        }
        Term::Compound(name, args) => {
            let functor = globals.functors.intern(*name, args.len() as u16);
            em.op(if opts.occurs_check { Opcode::HRFunctor } else { Opcode::HFunctor })
                .operand_functor(functor);
            for a in args {
                emit_head_term(em, vars, globals, opts, a);
            }
            em.op(Opcode::IPopf);
        }
    }
}

fn emit_body_term(em: &mut Emitter, vars: &mut VarTable, globals: &RuntimeGlobals, term: &Term) {
    match term {
        Term::Var(v) => {
            let slot = vars.slot_of(v);
            if vars.first_occurrence(v) {
                em.op(Opcode::BFirstVar).operand_var_slot(slot.0);
            } else {
                em.op(Opcode::BVar).operand_var_slot(slot.0);
            }
        }
        Term::Nil => {
            em.op(Opcode::BNil);
        }
        Term::Atom(a) => {
            em.op(Opcode::BConst).operand_atom(*a);
        }
        Term::Integer(i) => {
            if let Ok(small) = i32::try_from(*i) {
                em.op(Opcode::BInteger).operand_u32(small as u32);
            } else {
                em.op(Opcode::BInt64).operand_i64(*i);
            }
        }
        Term::Float(f) => {
            em.op(Opcode::BFloat).operand_f64(*f);
        }
        Term::Str(s) => {
            em.op(Opcode::BString).operand_str(s);
        }
        Term::Compound(name, args) if *name == dot_atom(globals) && args.len() == 2 => {
            em.op(Opcode::BList);
            emit_body_term(em, vars, globals, &args[0]);
            emit_body_term(em, vars, globals, &args[1]);
        }
        Term::Compound(name, args) => {
            let functor = globals.functors.intern(*name, args.len() as u16);
            em.op(Opcode::BFunctor).operand_functor(functor);
            for a in args {
                emit_body_term(em, vars, globals, a);
            }
            em.op(Opcode::BPopf);
        }
    }
}

fn emit_arith_expr(
    em: &mut Emitter,
    vars: &mut VarTable,
    globals: &RuntimeGlobals,
    arith: &ArithTable,
    term: &Term,
) -> Result<(), CompileError> {
    match term {
        Term::Integer(i) => {
            if let Ok(small) = i32::try_from(*i) {
                em.op(Opcode::AInteger).operand_u32(small as u32);
            } else {
                em.op(Opcode::AInt64).operand_i64(*i);
            }
        }
        Term::Float(f) => {
            em.op(Opcode::ADouble).operand_f64(*f);
        }
        Term::Var(v) => {
            let slot = vars.slot_of(v);
            match slot.0 {
                0 => {
                    em.op(Opcode::AVar0);
                }
                1 => {
                    em.op(Opcode::AVar1);
                }
                2 => {
                    em.op(Opcode::AVar2);
                }
                n => {
                    em.op(Opcode::AVarN).operand_var_slot(n);
                }
            }
        }
        Term::Atom(a) => {
            let fid = arith.lookup(*a, 0).ok_or_else(|| CompileError::UnknownFunction {
                name: globals.atoms.name(*a).to_string(),
                arity: 0,
            })?;
            em.op(Opcode::AFunc0).operand_u32(fid.0 as u32);
        }
        Term::Compound(name, args) => {
            for a in args {
                emit_arith_expr(em, vars, globals, arith, a)?;
            }
            let arity = args.len() as u16;
            let fid = arith.lookup(*name, arity).ok_or_else(|| CompileError::UnknownFunction {
                name: globals.atoms.name(*name).to_string(),
                arity,
            })?;
            let op = match arity {
                0 => Opcode::AFunc0,
                1 => Opcode::AFunc1,
                2 => Opcode::AFunc2,
                _ => Opcode::AFuncN,
            };
            em.op(op).operand_u32(fid.0 as u32);
        }
        Term::Nil | Term::Str(_) => {
            return Err(CompileError::NotArithmetic(SourceVar("(non-numeric term)".to_string())));
        }
    }
    Ok(())
}

fn emit_is(
    em: &mut Emitter,
    vars: &mut VarTable,
    globals: &RuntimeGlobals,
    arith: &ArithTable,
    lhs: &Term,
    rhs: &Term,
) -> Result<(), CompileError> {
    em.op(Opcode::AEnter);
    emit_arith_expr(em, vars, globals, arith, rhs)?;
    if let Term::Var(v) = lhs {
        if vars.first_occurrence(v) {
            let slot = vars.slot_of(v);
            em.op(Opcode::AFirstVarIs).operand_var_slot(slot.0);
            return Ok(());
        }
    }
    emit_body_term(em, vars, globals, lhs);
    em.op(Opcode::AIs);
    Ok(())
}

fn emit_arith_relation(
    em: &mut Emitter,
    vars: &mut VarTable,
    globals: &RuntimeGlobals,
    arith: &ArithTable,
    op: Opcode,
    lhs: &Term,
    rhs: &Term,
) -> Result<(), CompileError> {
    em.op(Opcode::AEnter);
    emit_arith_expr(em, vars, globals, arith, lhs)?;
    emit_arith_expr(em, vars, globals, arith, rhs)?;
    em.op(op);
    Ok(())
}

fn emit_call(
    em: &mut Emitter,
    vars: &mut VarTable,
    globals: &RuntimeGlobals,
    goal: &Term,
    is_last: bool,
) -> Result<(), CompileError> {
    let (name, args): (AtomId, &[Term]) = match goal {
        Term::Atom(a) => (*a, &[][..]),
        Term::Compound(name, args) => (*name, args.as_slice()),
        _ => return Err(CompileError::NotCallable),
    };
    for a in args {
        emit_body_term(em, vars, globals, a);
    }
    let functor = globals.functors.intern(name, args.len() as u16);
    em.op(if is_last { Opcode::IDepart } else { Opcode::ICall })
        .operand_functor(functor);
    Ok(())
}

fn emit_plain_disjunction(
    em: &mut Emitter,
    vars: &mut VarTable,
    globals: &RuntimeGlobals,
    arith: &ArithTable,
    lhs: &Term,
    rhs: &Term,
    is_last: bool,
) -> Result<(), CompileError> {
    let else_label = em.new_label();
    let end_label = em.new_label();
    em.op(Opcode::COr).operand_label(else_label);
    emit_goal(em, vars, globals, arith, lhs, is_last)?;
    em.op(Opcode::CJmp).operand_label(end_label);
    em.resolve_label(else_label);
    emit_goal(em, vars, globals, arith, rhs, is_last)?;
    em.resolve_label(end_label);
    Ok(())
}

fn emit_if_then(
    em: &mut Emitter,
    vars: &mut VarTable,
    globals: &RuntimeGlobals,
    arith: &ArithTable,
    cond: &Term,
    then_: &Term,
    is_last: bool,
) -> Result<(), CompileError> {
    let fail_label = em.new_label();
    let end_label = em.new_label();
    em.op(Opcode::CIfThenElse).operand_label(fail_label);
    emit_goal(em, vars, globals, arith, cond, false)?;
    em.op(Opcode::CCut).operand_var_slot(0);
    emit_goal(em, vars, globals, arith, then_, is_last)?;
    em.op(Opcode::CJmp).operand_label(end_label);
    em.resolve_label(fail_label);
    em.op(Opcode::CFail);
    em.resolve_label(end_label);
    Ok(())
}

fn emit_if_then_else(
    em: &mut Emitter,
    vars: &mut VarTable,
    globals: &RuntimeGlobals,
    arith: &ArithTable,
    if_then_term: &Term,
    else_: &Term,
    is_last: bool,
) -> Result<(), CompileError> {
    let (cond, then_) = match if_then_term {
        Term::Compound(_, args) => (&args[0], &args[1]),
        _ => unreachable!("classify_control guarantees IfThen is a Compound/2"),
    };
    let else_label = em.new_label();
    let end_label = em.new_label();
    em.op(Opcode::CIfThenElse).operand_label(else_label);
    emit_goal(em, vars, globals, arith, cond, false)?;
    em.op(Opcode::CCut).operand_var_slot(0);
    emit_goal(em, vars, globals, arith, then_, is_last)?;
    em.op(Opcode::CJmp).operand_label(end_label);
    em.resolve_label(else_label);
    emit_goal(em, vars, globals, arith, else_, is_last)?;
    em.resolve_label(end_label);
    Ok(())
}

fn emit_soft_if_then(
    em: &mut Emitter,
    vars: &mut VarTable,
    globals: &RuntimeGlobals,
    arith: &ArithTable,
    cond: &Term,
    then_: &Term,
    is_last: bool,
) -> Result<(), CompileError> {
    let fail_label = em.new_label();
    let end_label = em.new_label();
    em.op(Opcode::CSoftIf).operand_label(fail_label);
    emit_goal(em, vars, globals, arith, cond, false)?;
    em.op(Opcode::CSoftCut).operand_var_slot(0);
    emit_goal(em, vars, globals, arith, then_, is_last)?;
    em.op(Opcode::CJmp).operand_label(end_label);
    em.resolve_label(fail_label);
    em.op(Opcode::CFail);
    em.resolve_label(end_label);
    Ok(())
}

fn emit_soft_if_then_else(
    em: &mut Emitter,
    vars: &mut VarTable,
    globals: &RuntimeGlobals,
    arith: &ArithTable,
    if_then_term: &Term,
    else_: &Term,
    is_last: bool,
) -> Result<(), CompileError> {
    let (cond, then_) = match if_then_term {
        Term::Compound(_, args) => (&args[0], &args[1]),
        _ => unreachable!("classify_control guarantees SoftIfThen is a Compound/2"),
    };
    let else_label = em.new_label();
    let end_label = em.new_label();
    em.op(Opcode::CSoftIf).operand_label(else_label);
    emit_goal(em, vars, globals, arith, cond, false)?;
    em.op(Opcode::CSoftCut).operand_var_slot(0);
    emit_goal(em, vars, globals, arith, then_, is_last)?;
    em.op(Opcode::CJmp).operand_label(end_label);
    em.resolve_label(else_label);
    emit_goal(em, vars, globals, arith, else_, is_last)?;
    em.resolve_label(end_label);
    Ok(())
}

/// `catch(Goal, Catcher, Recovery)` (spec §4.5): build `Catcher` before the
/// choicepoint so its cells sit below the mark the interpreter rewinds to
/// on a throw, push `I_CATCH` with the recovery pc as its address operand,
/// then emit `Goal` falling through past `Recovery` on ordinary success —
/// the same else-branch shape as `emit_if_then_else`, but the "else" here
/// is reached by an exception unwind rather than a failed condition.
fn emit_catch(
    em: &mut Emitter,
    vars: &mut VarTable,
    globals: &RuntimeGlobals,
    arith: &ArithTable,
    goal: &Term,
    catcher: &Term,
    recovery: &Term,
    is_last: bool,
) -> Result<(), CompileError> {
    emit_body_term(em, vars, globals, catcher);
    let recovery_label = em.new_label();
    let end_label = em.new_label();
    em.op(Opcode::ICatch).operand_label(recovery_label);
    emit_goal(em, vars, globals, arith, goal, false)?;
    em.op(Opcode::CJmp).operand_label(end_label);
    em.resolve_label(recovery_label);
    emit_goal(em, vars, globals, arith, recovery, is_last)?;
    em.resolve_label(end_label);
    Ok(())
}

fn emit_negation(
    em: &mut Emitter,
    vars: &mut VarTable,
    globals: &RuntimeGlobals,
    arith: &ArithTable,
    inner: &Term,
) -> Result<(), CompileError> {
    let end_label = em.new_label();
    em.op(Opcode::CNot).operand_label(end_label);
    emit_goal(em, vars, globals, arith, inner, false)?;
    em.op(Opcode::CCut).operand_var_slot(0);
    em.op(Opcode::CFail);
    em.resolve_label(end_label);
    Ok(())
}

fn emit_goal(
    em: &mut Emitter,
    vars: &mut VarTable,
    globals: &RuntimeGlobals,
    arith: &ArithTable,
    goal: &Term,
    is_last: bool,
) -> Result<(), CompileError> {
    match (classify_control(goal, globals), goal) {
        (Some(ControlShape::Conjunction), Term::Compound(_, args)) => {
            emit_goal(em, vars, globals, arith, &args[0], false)?;
            emit_goal(em, vars, globals, arith, &args[1], is_last)
        }
        (Some(ControlShape::Disjunction), Term::Compound(_, args)) => {
            match classify_control(&args[0], globals) {
                Some(ControlShape::IfThen) => {
                    emit_if_then_else(em, vars, globals, arith, &args[0], &args[1], is_last)
                }
                Some(ControlShape::SoftIfThen) => {
                    emit_soft_if_then_else(em, vars, globals, arith, &args[0], &args[1], is_last)
                }
                _ => emit_plain_disjunction(em, vars, globals, arith, &args[0], &args[1], is_last),
            }
        }
        (Some(ControlShape::IfThen), Term::Compound(_, args)) => {
            emit_if_then(em, vars, globals, arith, &args[0], &args[1], is_last)
        }
        (Some(ControlShape::SoftIfThen), Term::Compound(_, args)) => {
            emit_soft_if_then(em, vars, globals, arith, &args[0], &args[1], is_last)
        }
        (Some(ControlShape::Negation), Term::Compound(_, args)) => {
            emit_negation(em, vars, globals, arith, &args[0])
        }
        (Some(ControlShape::Cut), _) => {
            em.op(Opcode::ICut);
            Ok(())
        }
        (Some(ControlShape::Catch), Term::Compound(_, args)) => {
            emit_catch(em, vars, globals, arith, &args[0], &args[1], &args[2], is_last)
        }
        _ => {
            if let Term::Compound(name, args) = goal {
                if args.len() == 2 && &*globals.atoms.name(*name) == "is" {
                    return emit_is(em, vars, globals, arith, &args[0], &args[1]);
                }
                if args.len() == 2 {
                    if let Some(op) = arith_relation_opcode(&globals.atoms.name(*name)) {
                        return emit_arith_relation(em, vars, globals, arith, op, &args[0], &args[1]);
                    }
                }
                if args.len() == 1 && &*globals.atoms.name(*name) == "throw" {
                    emit_body_term(em, vars, globals, &args[0]);
                    em.op(Opcode::BThrow);
                    return Ok(());
                }
            }
            emit_call(em, vars, globals, goal, is_last)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::SourceClause;

    struct Fixture {
        globals: std::sync::Arc<RuntimeGlobals>,
        arith: ArithTable,
        key: ProcedureKey,
    }

    fn fixture() -> Fixture {
        let globals = RuntimeGlobals::new();
        let arith = ArithTable::build(|s| globals.atoms.intern(s));
        let foo = globals.atoms.intern("foo");
        let functor = globals.functors.intern(foo, 1);
        let key = ProcedureKey { module: globals.user_module(), functor };
        Fixture { globals, arith, key }
    }

    #[test]
    fn fact_compiles_to_exit_fact() {
        let f = fixture();
        let x = Term::Var(SourceVar("X".into()));
        let clause = SourceClause { head: Term::Compound(f.globals.atoms.intern("foo"), vec![x]), body: None };
        let compiled = compile_clause(&f.globals, f.key, &clause, &f.arith, CompileOptions::default(), Generation(1)).unwrap();
        assert!(!compiled.committing);
        assert!(!compiled.code.is_empty());
    }

    #[test]
    fn rule_with_cut_tail_is_committing() {
        let f = fixture();
        let x = Term::Var(SourceVar("X".into()));
        let comma = f.globals.atoms.intern(",");
        let cut = Term::Atom(f.globals.atoms.intern("!"));
        let true_goal = Term::Atom(f.globals.atoms.intern("true"));
        let body = Term::Compound(comma, vec![true_goal, cut]);
        let clause = SourceClause {
            head: Term::Compound(f.globals.atoms.intern("foo"), vec![x]),
            body: Some(body),
        };
        let compiled = compile_clause(&f.globals, f.key, &clause, &f.arith, CompileOptions::default(), Generation(1)).unwrap();
        assert!(compiled.committing);
    }

    #[test]
    fn integer_head_argument_indexes_by_value() {
        let f = fixture();
        let clause = SourceClause {
            head: Term::Compound(f.globals.atoms.intern("foo"), vec![Term::Integer(42)]),
            body: None,
        };
        let compiled = compile_clause(&f.globals, f.key, &clause, &f.arith, CompileOptions::default(), Generation(1)).unwrap();
        assert_eq!(compiled.index_key, IndexKey::Integer(42));
    }

    #[test]
    fn var_head_argument_is_not_indexable() {
        let f = fixture();
        let clause = SourceClause {
            head: Term::Compound(f.globals.atoms.intern("foo"), vec![Term::Var(SourceVar("X".into()))]),
            body: None,
        };
        let compiled = compile_clause(&f.globals, f.key, &clause, &f.arith, CompileOptions::default(), Generation(1)).unwrap();
        assert_eq!(compiled.index_key, IndexKey::Any);
    }

    #[test]
    fn is_goal_compiles_with_arithmetic_opcodes() {
        let f = fixture();
        let is_atom = f.globals.atoms.intern("is");
        let plus = f.globals.atoms.intern("+");
        let x = Term::Var(SourceVar("X".into()));
        let expr = Term::Compound(plus, vec![Term::Integer(1), Term::Integer(2)]);
        let body = Term::Compound(is_atom, vec![x, expr]);
        let clause = SourceClause {
            head: Term::Compound(f.globals.atoms.intern("foo"), vec![Term::Var(SourceVar("X".into()))]),
            body: Some(body),
        };
        let compiled = compile_clause(&f.globals, f.key, &clause, &f.arith, CompileOptions::default(), Generation(1)).unwrap();
        assert!(compiled.code.contains(&(Opcode::AEnter as u32)));
        assert!(compiled.code.contains(&(Opcode::AFunc2 as u32)));
    }

    #[test]
    fn catch_goal_compiles_catcher_then_icatch() {
        let f = fixture();
        let catch_atom = f.globals.atoms.intern("catch");
        let err = f.globals.atoms.intern("err");
        let caught = f.globals.atoms.intern("caught");
        let r = Term::Var(SourceVar("R".into()));
        let e = Term::Var(SourceVar("E".into()));
        let eq = f.globals.atoms.intern("=");
        let recovery = Term::Compound(eq, vec![r, Term::Compound(caught, vec![e.clone()])]);
        let goal = Term::Compound(f.globals.atoms.intern("throw"), vec![Term::Atom(err)]);
        let body = Term::Compound(catch_atom, vec![goal, e, recovery]);
        let clause = SourceClause {
            head: Term::Compound(f.globals.atoms.intern("foo"), vec![Term::Var(SourceVar("R".into()))]),
            body: Some(body),
        };
        let compiled = compile_clause(&f.globals, f.key, &clause, &f.arith, CompileOptions::default(), Generation(1)).unwrap();
        assert!(compiled.code.contains(&(Opcode::ICatch as u32)));
        assert!(compiled.code.contains(&(Opcode::BThrow as u32)));
    }

    #[test]
    fn unknown_arithmetic_function_is_rejected() {
        let f = fixture();
        let is_atom = f.globals.atoms.intern("is");
        let bogus = f.globals.atoms.intern("not_a_function");
        let x = Term::Var(SourceVar("X".into()));
        let expr = Term::Compound(bogus, vec![Term::Integer(1)]);
        let body = Term::Compound(is_atom, vec![x, expr]);
        let clause = SourceClause {
            head: Term::Compound(f.globals.atoms.intern("foo"), vec![Term::Var(SourceVar("X".into()))]),
            body: Some(body),
        };
        let err = compile_clause(&f.globals, f.key, &clause, &f.arith, CompileOptions::default(), Generation(1)).unwrap_err();
        assert!(matches!(err, CompileError::UnknownFunction { .. }));
    }
}
