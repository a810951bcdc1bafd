//! The bytecode dispatch loop (spec §4.2, component C5): decode
//! [`Opcode`](wam_compiler::opcode::Opcode), drive unification against
//! compiled clause heads, manage frames and choicepoints, and backtrack
//! on failure.
//!
//! `wam-core` owns the frame/choicepoint *shapes*; this module is the
//! behavior that creates, walks and discards them. Two pieces of
//! per-choicepoint bookkeeping don't fit `wam_core::Choice` (the original
//! call's argument addresses, needed to rebuild a frame on retry, and the
//! cut barrier a frame's `!` should restore) and live in side tables here
//! instead of growing the core type, matching the crate split's own stated
//! boundary: core owns shapes, runtime owns behavior.

use crate::config::EngineConfig;
use crate::error::{Ball, Exception, PrologResult};
use crate::foreign::{ForeignCallContext, ForeignOutcome, ForeignTable};
use crate::gc;
use crate::shifter::{self, StackKind};
use crate::unify;
use std::collections::HashMap;
use std::sync::Arc;
use wam_compiler::arith::{ArithFuncId, ArithTable};
use wam_compiler::opcode::{Opcode, ReverseTable};
use wam_core::{
    AtomId, Choice, ChoiceKind, Clause, FrameFlags, FunctorId, GlobalIdx, GlobalStack, Indirect,
    IndexKey, LocalEntry, LocalFrame, LocalIdx, LocalStack, Mark, ModuleId, ProcedureFlags, ProcedureKey,
    RuntimeGlobals, TrailStack, Word,
};

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

/// Per-choicepoint data that has no place on `wam_core::Choice`: the
/// clauses still untried after the one the choicepoint names, and what the
/// eventual retry frame needs to be rebuilt with.
#[derive(Clone)]
struct ChoiceContext {
    args: Vec<GlobalIdx>,
    context_module: ModuleId,
    remaining: Vec<Arc<Clause>>,
    parent: Option<LocalIdx>,
    pc_in_parent: u32,
    level: u32,
}

/// What a `Catch` choicepoint needs that `ChoiceKind::Catch` has no room
/// for: the address of the already-built catcher pattern and where to
/// resume if a thrown ball unifies against it (spec §4.5).
#[derive(Clone, Copy)]
struct CatchContext {
    catcher: GlobalIdx,
    recovery_pc: u32,
    frame: LocalIdx,
}

/// What one pass of the per-frame dispatch loop produced.
enum Step {
    Continue(usize),
    Enter(LocalIdx),
    ExitFrame,
    Fail,
}

pub struct Machine {
    pub globals: Arc<RuntimeGlobals>,
    pub config: EngineConfig,
    pub arith: Arc<ArithTable>,
    pub foreign: Arc<ForeignTable>,
    pub heap: GlobalStack,
    pub locals: LocalStack,
    pub trail: TrailStack,
    /// Current choicepoint, mirroring the WAM `B` register; `None` means no
    /// alternative remains anywhere in this engine's search.
    b: Option<LocalIdx>,
    choice_ctx: HashMap<LocalIdx, ChoiceContext>,
    /// Cut barrier captured for each live frame: the value of `b` in effect
    /// just before that frame's own clause was selected, i.e. what `!`
    /// inside it restores.
    cut_barrier: HashMap<LocalIdx, Option<LocalIdx>>,
    /// Side table for live `Catch` choicepoints, keyed the same way
    /// `choice_ctx` is.
    catch_ctx: HashMap<LocalIdx, CatchContext>,
    /// Attributed variables bound since the last wake-up dispatch (spec
    /// §4.2), engine-local state drained at the next safe point.
    woken: Vec<GlobalIdx>,
    reverse: ReverseTable,
}

impl Machine {
    pub fn new(
        globals: Arc<RuntimeGlobals>,
        arith: Arc<ArithTable>,
        foreign: Arc<ForeignTable>,
        config: EngineConfig,
    ) -> Self {
        Machine {
            globals,
            config,
            arith,
            foreign,
            heap: GlobalStack::new(),
            locals: LocalStack::new(),
            trail: TrailStack::new(),
            b: None,
            choice_ctx: HashMap::new(),
            cut_barrier: HashMap::new(),
            catch_ctx: HashMap::new(),
            woken: Vec::new(),
            reverse: ReverseTable::build(),
        }
    }

    fn decode(&self, word: u32) -> Opcode {
        self.reverse
            .lookup(word as u16)
            .unwrap_or_else(|| panic!("corrupt bytecode: unknown opcode {word}"))
    }

    fn read_i64(code: &[u32], pc: &mut usize) -> i64 {
        let low = code[*pc] as u64;
        let high = code[*pc + 1] as u64;
        *pc += 2;
        ((high << 32) | low) as i64
    }

    fn read_str(code: &[u32], pc: &mut usize) -> String {
        let len = code[*pc] as usize;
        *pc += 1;
        let words = len.div_ceil(4);
        let mut bytes = Vec::with_capacity(words * 4);
        for i in 0..words {
            bytes.extend_from_slice(&code[*pc + i].to_le_bytes());
        }
        *pc += words;
        bytes.truncate(len);
        String::from_utf8(bytes).unwrap_or_default()
    }

    fn read_mpz(code: &[u32], pc: &mut usize) -> Vec<u64> {
        let count = code[*pc] as usize;
        *pc += 1;
        (0..count).map(|_| Self::read_i64(code, pc) as u64).collect()
    }

    fn dot_functor(&self) -> FunctorId {
        let dot = self.globals.atoms.intern(".");
        self.globals.functors.intern(dot, 2)
    }

    /// Construct a term from a `H_*`/`B_*` opcode subtree starting at `pc`,
    /// returning its root address and the pc just past it. `H_FIRSTVAR`
    /// writes the new cell's address into `slots`; `H_VAR`/`B_VAR` read an
    /// already-bound slot.
    fn build_term(&mut self, slots: &mut [GlobalIdx], code: &[u32], pc: usize) -> (GlobalIdx, usize) {
        let op = self.decode(code[pc]);
        let mut pc = pc + 1;
        let addr = match op {
            Opcode::HConst | Opcode::BConst => {
                let atom = AtomId(code[pc]);
                pc += 1;
                self.heap.push(Word::Atom(atom))
            }
            Opcode::HNil | Opcode::BNil => self.heap.push(Word::Nil),
            Opcode::HInteger | Opcode::BInteger => {
                let v = code[pc] as i32 as i64;
                pc += 1;
                self.heap.push(Word::Integer(v))
            }
            Opcode::HInt64 | Opcode::BInt64 => {
                let v = Self::read_i64(code, &mut pc);
                self.heap.push(Word::Integer(v))
            }
            Opcode::HFloat | Opcode::BFloat => {
                let bits = Self::read_i64(code, &mut pc) as u64;
                let header = self.heap.push_indirect(Indirect::Float(f64::from_bits(bits)));
                self.heap.set(header, Word::FloatRef(header));
                header
            }
            Opcode::HString | Opcode::BString => {
                let s = Self::read_str(code, &mut pc);
                let header = self.heap.push_indirect(Indirect::Str(s));
                self.heap.set(header, Word::StringRef(header));
                header
            }
            Opcode::HMpz | Opcode::BMpz => {
                // No dedicated `Word` tag exists yet for an out-of-line
                // bignum; approximate with the low limb as a machine
                // integer rather than reject the clause outright.
                let limbs = Self::read_mpz(code, &mut pc);
                let v = limbs.first().copied().unwrap_or(0) as i64;
                self.heap.push(Word::Integer(v))
            }
            Opcode::HVoid => {
                let addr = self.heap.top();
                self.heap.push(Word::Var(addr));
                addr
            }
            Opcode::HFirstVar | Opcode::BFirstVar => {
                let slot = code[pc] as usize;
                pc += 1;
                let addr = self.heap.top();
                self.heap.push(Word::Var(addr));
                slots[slot] = addr;
                addr
            }
            Opcode::HVar | Opcode::BVar => {
                let slot = code[pc] as usize;
                pc += 1;
                slots[slot]
            }
            Opcode::HFunctor | Opcode::HRFunctor | Opcode::BFunctor => {
                let functor = FunctorId(code[pc]);
                pc += 1;
                let arity = self.globals.functors.arity(functor);
                let header = self.heap.top();
                self.heap.push(Word::Compound(functor, header + 1));
                for i in 0..arity as u32 {
                    self.heap.push(Word::Reference(header + 1 + i));
                }
                for i in 0..arity as u32 {
                    let (child, next_pc) = self.build_term(slots, code, pc);
                    pc = next_pc;
                    self.heap.set(header + 1 + i, Word::Reference(child));
                }
                pc += 1; // trailing I_POPF / B_POPF, no operand of its own
                header
            }
            Opcode::HList | Opcode::HRList | Opcode::BList => {
                let functor = self.dot_functor();
                let header = self.heap.top();
                self.heap.push(Word::Compound(functor, header + 1));
                self.heap.push(Word::Reference(header + 1));
                self.heap.push(Word::Reference(header + 2));
                let (head_addr, next_pc) = self.build_term(slots, code, pc);
                pc = next_pc;
                self.heap.set(header + 1, Word::Reference(head_addr));
                let (tail_addr, next_pc) = self.build_term(slots, code, pc);
                pc = next_pc;
                self.heap.set(header + 2, Word::Reference(tail_addr));
                header
            }
            other => panic!("{other:?} is not a term-construction opcode"),
        };
        (addr, pc)
    }

    fn take_slots(&mut self, fp: LocalIdx) -> Vec<GlobalIdx> {
        match self.locals.get_mut(fp) {
            LocalEntry::Frame(f) => std::mem::take(&mut f.slots),
            _ => panic!("frame index does not hold a LocalFrame"),
        }
    }

    fn restore_slots(&mut self, fp: LocalIdx, slots: Vec<GlobalIdx>) {
        if let LocalEntry::Frame(f) = self.locals.get_mut(fp) {
            f.slots = slots;
        }
    }

    fn frame_clause(&self, fp: LocalIdx) -> Option<Arc<Clause>> {
        match self.locals.get(fp) {
            LocalEntry::Frame(f) => f.clause_ref.clone(),
            _ => None,
        }
    }

    fn runtime_index_key(&self, addr: GlobalIdx) -> IndexKey {
        let addr = unify::deref(&self.heap, addr);
        match self.heap.get(addr) {
            Word::Var(_) | Word::AttVar(_) => IndexKey::Any,
            Word::Atom(a) => IndexKey::Atom(*a),
            Word::Nil => IndexKey::Atom(self.globals.atoms.intern("[]")),
            Word::Integer(i) => IndexKey::Integer(*i),
            Word::Compound(f, _) => IndexKey::Functor(*f),
            Word::FloatRef(_) | Word::StringRef(_) | Word::Reference(_) => IndexKey::Any,
        }
    }

    fn push_choice(&mut self, kind: ChoiceKind, frame: LocalIdx) -> LocalIdx {
        let mark = Mark { trail_top: self.trail.top(), global_top: self.heap.top() };
        let idx = self.locals.push(LocalEntry::Choice(Choice { kind, parent: self.b, frame, mark }));
        self.b = Some(idx);
        idx
    }

    /// Walk `self.b`'s parent chain for the nearest `Jump` choicepoint: the
    /// one a `C_OR`/`C_IFTHENELSE`/`C_SOFTIF`/`C_NOT` pushed on entry to the
    /// construct a matching `C_CUT`/`C_SOFTCUT` now closes.
    fn nearest_jump(&self) -> Option<LocalIdx> {
        let mut cur = self.b;
        while let Some(idx) = cur {
            match self.locals.get(idx) {
                LocalEntry::Choice(c) => {
                    if matches!(c.kind, ChoiceKind::Jump(_)) {
                        return Some(idx);
                    }
                    cur = c.parent;
                }
                _ => unreachable!("choicepoint chain must only reference Choice entries"),
            }
        }
        None
    }

    /// `C_CUT`/`C_LCUT`: commit to the branch just taken, discarding the
    /// construct's own else-choicepoint and anything pushed while finding
    /// its solution (if-then takes only `Cond`'s first solution).
    fn hard_local_cut(&mut self) {
        if let Some(j) = self.nearest_jump() {
            let parent = match self.locals.get(j) {
                LocalEntry::Choice(c) => c.parent,
                _ => unreachable!(),
            };
            self.b = parent;
            self.locals.truncate(j);
        }
    }

    /// `C_SOFTCUT`: commit to the branch taken but splice the construct's
    /// own choicepoint out of the chain rather than discarding it, so
    /// `Cond`'s own alternatives (soft-cut's whole point) stay reachable.
    fn soft_local_cut(&mut self) {
        let Some(j) = self.nearest_jump() else { return };
        let parent = match self.locals.get(j) {
            LocalEntry::Choice(c) => c.parent,
            _ => unreachable!(),
        };
        if self.b == Some(j) {
            self.b = parent;
            return;
        }
        let mut cur = self.b;
        while let Some(idx) = cur {
            let next = match self.locals.get(idx) {
                LocalEntry::Choice(c) => c.parent,
                _ => unreachable!(),
            };
            if next == Some(j) {
                if let LocalEntry::Choice(c) = self.locals.get_mut(idx) {
                    c.parent = parent;
                }
                return;
            }
            cur = next;
        }
    }

    /// Unify each of `clause`'s head arguments against `args`; `Some(pc)`
    /// on success (the body's starting pc), `None` if the head fails.
    fn match_head(&mut self, fp: LocalIdx, clause: &Clause, args: &[GlobalIdx]) -> Option<usize> {
        let mut slots = self.take_slots(fp);
        let mut pc = 0usize;
        let mut ok = true;
        for &incoming in args {
            if matches!(self.decode(clause.code[pc]), Opcode::HVoid) {
                pc += 1;
                continue;
            }
            let (term_addr, next_pc) = self.build_term(&mut slots, &clause.code, pc);
            pc = next_pc;
            if !unify::unify(&mut self.heap, &mut self.trail, &self.globals.functors, &mut self.woken, term_addr, incoming) {
                ok = false;
                break;
            }
        }
        self.restore_slots(fp, slots);
        ok.then_some(pc)
    }

    fn push_frame(
        &mut self,
        key: ProcedureKey,
        clause: Arc<Clause>,
        args: &[GlobalIdx],
        parent: Option<LocalIdx>,
        pc_in_parent: u32,
        level: u32,
    ) -> LocalIdx {
        let mut slots = vec![0u32; clause.num_vars as usize];
        slots[..args.len()].copy_from_slice(args);
        let frame = LocalFrame {
            pc_in_parent,
            parent,
            clause_ref: Some(clause),
            predicate: key,
            context_module: key.module,
            generation: self.globals.generation.current(),
            flags: FrameFlags::empty(),
            level,
            slots,
        };
        self.locals.push(LocalEntry::Frame(frame))
    }

    /// Pick a candidate clause for `key`/`args` and either rebuild `reuse`
    /// in place (last-call optimization: nothing else live was pushed
    /// since the calling frame, so its slot can be recycled for the
    /// callee) or push a fresh frame. Pushes a `Clause` choicepoint first
    /// when more than one candidate matches.
    fn select_clause(
        &mut self,
        key: ProcedureKey,
        args: Vec<GlobalIdx>,
        reuse: Option<LocalIdx>,
        parent: Option<LocalIdx>,
        pc_in_parent: u32,
        level: u32,
    ) -> PrologResult<Step> {
        let procedure = self.globals.procedure(key);
        if procedure.flags.contains(ProcedureFlags::FOREIGN) {
            return self.dispatch_foreign(key, &args, reuse, parent, pc_in_parent);
        }

        let snapshot = self.globals.generation.current();
        let index_key = args.first().map(|a| self.runtime_index_key(*a)).unwrap_or(IndexKey::Any);
        let mut candidates: Vec<Arc<Clause>> =
            procedure.candidates(index_key).into_iter().filter(|c| c.visible_at(snapshot)).collect();

        if candidates.is_empty() {
            if procedure.clause_count() == 0 && !procedure.is_dynamic() {
                return match self.config.unknown {
                    crate::config::UnknownAction::Error => {
                        let functor_key = self.globals.functors.key(key.functor);
                        Err(Exception::ExistenceErrorProcedure {
                            name: self.globals.atoms.name(functor_key.name).to_string(),
                            arity: functor_key.arity,
                        })
                    }
                    crate::config::UnknownAction::Fail | crate::config::UnknownAction::Warning => {
                        Ok(Step::Fail)
                    }
                };
            }
            return Ok(Step::Fail);
        }

        let first = candidates.remove(0);
        let barrier = self.b;
        let reuse_allowed = reuse.is_some() && candidates.is_empty();
        let caller_frame = reuse.unwrap_or(0);
        if !candidates.is_empty() {
            let next = candidates.remove(0);
            let choice_idx = self.push_choice(ChoiceKind::Clause(Some(next)), caller_frame);
            self.choice_ctx.insert(
                choice_idx,
                ChoiceContext {
                    args: args.clone(),
                    context_module: key.module,
                    remaining: candidates,
                    parent,
                    pc_in_parent,
                    level,
                },
            );
        }

        let new_fp = match reuse {
            Some(fp) if reuse_allowed => {
                if let LocalEntry::Frame(f) = self.locals.get_mut(fp) {
                    let mut slots = vec![0u32; first.num_vars as usize];
                    slots[..args.len()].copy_from_slice(&args);
                    f.clause_ref = Some(first.clone());
                    f.slots = slots;
                    f.predicate = key;
                    f.context_module = key.module;
                    f.parent = parent;
                    f.pc_in_parent = pc_in_parent;
                    f.level = level;
                }
                fp
            }
            _ => self.push_frame(key, first.clone(), &args, parent, pc_in_parent, level),
        };
        self.cut_barrier.insert(new_fp, barrier);

        match self.match_head(new_fp, &first, &args) {
            Some(_) => Ok(Step::Enter(new_fp)),
            None => Ok(Step::Fail),
        }
    }

    fn dispatch_foreign(
        &mut self,
        key: ProcedureKey,
        args: &[GlobalIdx],
        reuse: Option<LocalIdx>,
        parent: Option<LocalIdx>,
        pc_in_parent: u32,
    ) -> PrologResult<Step> {
        let functor_key = self.globals.functors.key(key.functor);
        let f = self.foreign.lookup(functor_key.name, functor_key.arity).ok_or_else(|| {
            Exception::ExistenceErrorProcedure {
                name: self.globals.atoms.name(functor_key.name).to_string(),
                arity: functor_key.arity,
            }
        })?;
        let mut ctx = ForeignCallContext {
            heap: &mut self.heap,
            trail: &mut self.trail,
            functors: &self.globals.functors,
            atoms: &self.globals.atoms,
            args,
            redo_context: None,
            woken: &mut self.woken,
        };
        let outcome = f(&mut ctx)?;
        self.dispatch_woken()?;
        self.resume_from_foreign(outcome, key, reuse, parent, pc_in_parent)
    }

    fn resume_from_foreign(
        &mut self,
        outcome: ForeignOutcome,
        key: ProcedureKey,
        reuse: Option<LocalIdx>,
        parent: Option<LocalIdx>,
        pc_in_parent: u32,
    ) -> PrologResult<Step> {
        match outcome {
            ForeignOutcome::Success => match reuse.or(parent) {
                Some(fp) => {
                    if let LocalEntry::Frame(frame) = self.locals.get_mut(fp) {
                        frame.parent = parent.filter(|_| reuse.is_some());
                        frame.pc_in_parent = pc_in_parent;
                        frame.predicate = key;
                    }
                    Ok(Step::ExitFrame)
                }
                None => Ok(Step::ExitFrame),
            },
            ForeignOutcome::Failure => Ok(Step::Fail),
            ForeignOutcome::Nondet { context } => {
                let host = reuse.or(parent).unwrap_or(0);
                self.push_choice(ChoiceKind::Foreign(context), host);
                Ok(Step::ExitFrame)
            }
        }
    }

    /// Run the wake-up predicate over every attributed variable bound since
    /// the last dispatch (spec §4.2). Drains `self.woken` first so bindings
    /// the hook itself triggers accumulate for the next safe point rather
    /// than looping back into this call.
    fn dispatch_woken(&mut self) -> PrologResult<()> {
        if self.woken.is_empty() {
            return Ok(());
        }
        let woken = std::mem::take(&mut self.woken);
        let hook_name = self.globals.atoms.intern("$wakeup");
        let Some(hook) = self.foreign.lookup(hook_name, 1) else { return Ok(()) };
        for addr in woken {
            let args = [addr];
            let mut ctx = ForeignCallContext {
                heap: &mut self.heap,
                trail: &mut self.trail,
                functors: &self.globals.functors,
                atoms: &self.globals.atoms,
                args: &args,
                redo_context: None,
                woken: &mut self.woken,
            };
            hook(&mut ctx)?;
        }
        Ok(())
    }

    fn maybe_collect(&mut self) {
        if !self.config.gc_enabled {
            return;
        }
        if self.heap.len() * 4 < self.heap.capacity().max(1) * 3 {
            return;
        }
        gc::collect(&mut self.heap, &mut self.locals, &mut self.trail, &self.globals.functors);
    }

    fn check_global_budget(&self) -> PrologResult<()> {
        shifter::next_capacity(StackKind::Global, self.heap.len(), self.heap.capacity(), &self.config).map(|_| ())
    }

    /// Undo to the next choicepoint and resume its alternative, looping
    /// past any choicepoint whose own retry immediately fails (exhausted
    /// candidates, a failed head match, an exhausted foreign redo).
    /// `Ok(None)` means the whole search space is exhausted.
    fn backtrack(&mut self) -> PrologResult<Option<Step>> {
        loop {
            let Some(idx) = self.b else { return Ok(None) };
            let choice = match self.locals.get(idx) {
                LocalEntry::Choice(c) => c.clone(),
                _ => unreachable!(),
            };
            self.heap.truncate(choice.mark.global_top);
            unify::undo_to(&mut self.heap, &mut self.trail, choice.mark.trail_top);
            self.b = choice.parent;
            self.locals.truncate(idx);

            match choice.kind {
                ChoiceKind::Clause(Some(clause)) => {
                    let ctx = self.choice_ctx.remove(&idx).expect("clause choicepoint missing its context");
                    if !ctx.remaining.is_empty() {
                        let mut rest = ctx.remaining.clone();
                        let next = rest.remove(0);
                        let choice_idx = self.push_choice(ChoiceKind::Clause(Some(next)), choice.frame);
                        self.choice_ctx.insert(
                            choice_idx,
                            ChoiceContext {
                                args: ctx.args.clone(),
                                context_module: ctx.context_module,
                                remaining: rest,
                                parent: ctx.parent,
                                pc_in_parent: ctx.pc_in_parent,
                                level: ctx.level,
                            },
                        );
                    }
                    let key = ProcedureKey { module: ctx.context_module, functor: clause.procedure.functor };
                    let barrier = self.b;
                    let fp = self.push_frame(key, clause.clone(), &ctx.args, ctx.parent, ctx.pc_in_parent, ctx.level);
                    self.cut_barrier.insert(fp, barrier);
                    match self.match_head(fp, &clause, &ctx.args) {
                        Some(_) => return Ok(Some(Step::Enter(fp))),
                        None => continue,
                    }
                }
                ChoiceKind::Clause(None) | ChoiceKind::None => continue,
                ChoiceKind::Jump(addr) => return Ok(Some(Step::Continue(addr as usize))),
                ChoiceKind::Foreign(context) => {
                    let frame = choice.frame;
                    let key = match self.locals.get(frame) {
                        LocalEntry::Frame(f) => f.predicate,
                        _ => unreachable!(),
                    };
                    let functor_key = self.globals.functors.key(key.functor);
                    let f = self.foreign.lookup(functor_key.name, functor_key.arity).ok_or(
                        Exception::ExistenceErrorProcedure {
                            name: self.globals.atoms.name(functor_key.name).to_string(),
                            arity: functor_key.arity,
                        },
                    )?;
                    let mut ctx = ForeignCallContext {
                        heap: &mut self.heap,
                        trail: &mut self.trail,
                        functors: &self.globals.functors,
                        atoms: &self.globals.atoms,
                        args: &[],
                        redo_context: Some(context),
                        woken: &mut self.woken,
                    };
                    let outcome = f(&mut ctx)?;
                    self.dispatch_woken()?;
                    match outcome {
                        ForeignOutcome::Success => return Ok(Some(Step::ExitFrame)),
                        ForeignOutcome::Failure => continue,
                        ForeignOutcome::Nondet { context } => {
                            self.push_choice(ChoiceKind::Foreign(context), frame);
                            return Ok(Some(Step::ExitFrame));
                        }
                    }
                }
                ChoiceKind::Catch => {
                    self.catch_ctx.remove(&idx);
                    continue;
                }
                ChoiceKind::Cleanup | ChoiceKind::Debug | ChoiceKind::Top => continue,
            }
        }
    }

    /// Unwind to the nearest enclosing `catch/3` whose catcher unifies with
    /// the thrown ball (spec §4.5). Only `Exception::Thrown` is catchable;
    /// every other variant re-raises immediately.
    ///
    /// The ball's cells sit above any outer catchpoint's heap mark, so
    /// truncating to that mark before testing unification would destroy
    /// them. `Message::capture` snapshots the ball into an owned, heap-free
    /// value first; after rewinding to each candidate's mark the snapshot
    /// is rematerialized fresh, above the now-truncated heap, for the trial
    /// unification against that catcher.
    fn unwind(&mut self, exception: Exception) -> PrologResult<(LocalIdx, usize)> {
        let ball = match &exception {
            Exception::Thrown(b) => b.0,
            _ => return Err(exception),
        };
        let snapshot = match crate::engine::Message::capture(&self.heap, &self.globals.functors, ball) {
            Ok(m) => m,
            Err(_) => return Err(exception),
        };

        let mut cur = self.b;
        while let Some(idx) = cur {
            let choice = match self.locals.get(idx) {
                LocalEntry::Choice(c) => c.clone(),
                _ => unreachable!("choicepoint chain must only reference Choice entries"),
            };
            cur = choice.parent;
            if !matches!(choice.kind, ChoiceKind::Catch) {
                continue;
            }
            let Some(ctx) = self.catch_ctx.remove(&idx) else { continue };

            self.heap.truncate(choice.mark.global_top);
            unify::undo_to(&mut self.heap, &mut self.trail, choice.mark.trail_top);
            let ball_addr = snapshot.materialize(&mut self.heap, &self.globals.functors);
            if unify::unify(
                &mut self.heap,
                &mut self.trail,
                &self.globals.functors,
                &mut self.woken,
                ctx.catcher,
                ball_addr,
            ) {
                self.b = choice.parent;
                self.locals.truncate(idx);
                return Ok((ctx.frame, ctx.recovery_pc as usize));
            }
            unify::undo_to(&mut self.heap, &mut self.trail, choice.mark.trail_top);
        }
        Err(exception)
    }

    /// Run a query: `key`/`args` is the top-level goal, with `args` already
    /// built on the heap. Returns `true` for the first solution (bindings
    /// are left in place on the stacks for the caller to read back, then
    /// discard by backtracking), `false` once the search space is
    /// exhausted.
    pub fn solve(&mut self, key: ProcedureKey, args: Vec<GlobalIdx>) -> PrologResult<bool> {
        match self.select_clause(key, args, None, None, 0, 0)? {
            Step::Enter(fp) => self.run(fp),
            Step::Fail => self.resolve_fail(),
            Step::ExitFrame => Ok(true),
            Step::Continue(_) => unreachable!("a fresh top-level call never resumes mid-clause"),
        }
    }

    /// Ask for the next solution after a prior `solve`/`redo` returned
    /// `true`, backtracking into whatever choicepoint remains.
    pub fn redo(&mut self) -> PrologResult<bool> {
        self.resolve_fail()
    }

    fn resolve_fail(&mut self) -> PrologResult<bool> {
        match self.backtrack()? {
            None => Ok(false),
            Some(Step::Enter(fp)) => self.run(fp),
            Some(Step::ExitFrame) => Ok(true),
            Some(Step::Continue(_)) | Some(Step::Fail) => {
                unreachable!("backtrack only ever resolves to Enter, ExitFrame, or None")
            }
        }
    }

    fn run(&mut self, fp: LocalIdx) -> PrologResult<bool> {
        let mut fp = fp;
        let mut pc = 0usize;
        let mut pending_args: Vec<GlobalIdx> = Vec::new();
        let mut arith_stack: Vec<Number> = Vec::new();

        loop {
            self.check_global_budget()?;
            // A GC pass only sees roots on the local stack and trail; mid-body
            // `pending_args`/`arith_stack` hold heap addresses GC can't see,
            // so only collect between clauses, when both are empty.
            if pending_args.is_empty() && arith_stack.is_empty() {
                self.maybe_collect();
            }
            let Some(code) = self.frame_clause(fp) else { return Ok(true) };

            let mut step = match self.step_body(fp, pc, &code.code, &mut pending_args, &mut arith_stack) {
                Ok(step) => step,
                Err(exception) => {
                    let (new_fp, new_pc) = self.unwind(exception)?;
                    fp = new_fp;
                    pc = new_pc;
                    pending_args.clear();
                    arith_stack.clear();
                    continue;
                }
            };
            while matches!(step, Step::Fail) {
                match self.backtrack()? {
                    None => return Ok(false),
                    Some(resumed) => step = resumed,
                }
            }
            match step {
                Step::Continue(next_pc) => pc = next_pc,
                Step::Enter(new_fp) => {
                    fp = new_fp;
                    pc = 0;
                    pending_args.clear();
                    arith_stack.clear();
                }
                Step::ExitFrame => {
                    let (parent, pc_in_parent) = match self.locals.get(fp) {
                        LocalEntry::Frame(f) => (f.parent, f.pc_in_parent),
                        _ => unreachable!(),
                    };
                    match parent {
                        None => return Ok(true),
                        Some(p) => {
                            fp = p;
                            pc = pc_in_parent as usize;
                            pending_args.clear();
                            arith_stack.clear();
                        }
                    }
                }
                Step::Fail => unreachable!("the loop above only exits once step is not Fail"),
            }
        }
    }

    /// Decode and execute one body-level opcode: everything past head
    /// unification (calls, control flow, arithmetic, cut, exceptions).
    fn step_body(
        &mut self,
        fp: LocalIdx,
        pc: usize,
        code: &[u32],
        pending_args: &mut Vec<GlobalIdx>,
        arith_stack: &mut Vec<Number>,
    ) -> PrologResult<Step> {
        let op = self.decode(code[pc]);
        match op {
            Opcode::IEnter => {
                self.dispatch_woken()?;
                Ok(Step::Continue(pc + 1))
            }
            Opcode::IExit | Opcode::IExitFact => Ok(Step::ExitFrame),
            Opcode::ICut => {
                self.b = self.cut_barrier.get(&fp).copied().flatten();
                Ok(Step::Continue(pc + 1))
            }
            Opcode::CCut | Opcode::CLCut => {
                self.hard_local_cut();
                Ok(Step::Continue(pc + 2))
            }
            Opcode::CSoftCut => {
                self.soft_local_cut();
                Ok(Step::Continue(pc + 2))
            }
            Opcode::CFail => Ok(Step::Fail),
            Opcode::CJmp => Ok(Step::Continue(code[pc + 1] as usize)),
            Opcode::COr | Opcode::CIfThenElse | Opcode::CSoftIf | Opcode::CNot => {
                let target = code[pc + 1];
                self.push_choice(ChoiceKind::Jump(target), fp);
                Ok(Step::Continue(pc + 2))
            }
            Opcode::CVar => Ok(Step::Continue(pc + 2)),

            Opcode::BConst
            | Opcode::BNil
            | Opcode::BInteger
            | Opcode::BInt64
            | Opcode::BFloat
            | Opcode::BString
            | Opcode::BMpz
            | Opcode::BFirstVar
            | Opcode::BVar
            | Opcode::BFunctor
            | Opcode::BList => {
                let mut slots = self.take_slots(fp);
                let (addr, next_pc) = self.build_term(&mut slots, code, pc);
                self.restore_slots(fp, slots);
                pending_args.push(addr);
                Ok(Step::Continue(next_pc))
            }

            Opcode::ICall | Opcode::IDepart => {
                let functor = FunctorId(code[pc + 1]);
                let arity = self.globals.functors.arity(functor) as usize;
                let start = pending_args.len().saturating_sub(arity);
                let args: Vec<GlobalIdx> = pending_args.split_off(start);
                let (parent, pc_in_parent, level, context_module) = match self.locals.get(fp) {
                    LocalEntry::Frame(f) => (f.parent, f.pc_in_parent, f.level, f.context_module),
                    _ => unreachable!(),
                };
                let key = ProcedureKey { module: context_module, functor };
                if op == Opcode::IDepart && self.config.last_call_optimisation {
                    self.select_clause(key, args, Some(fp), parent, pc_in_parent, level)
                } else {
                    self.select_clause(key, args, None, Some(fp), (pc + 2) as u32, level + 1)
                }
            }

            Opcode::IUserCall0 | Opcode::IUserCallN => {
                let extra = if op == Opcode::IUserCallN { code[pc + 1] as usize } else { 0 };
                let next_pc = pc + if op == Opcode::IUserCallN { 2 } else { 1 };
                let built: Vec<GlobalIdx> = pending_args.split_off(pending_args.len().saturating_sub(extra + 1));
                let (goal, extras) = built.split_first().expect("call/N needs a goal argument");
                let (name, mut args) = self.decompose_callable(*goal)?;
                args.extend_from_slice(extras);
                self.call_built_goal(fp, name, args, next_pc as u32)
            }
            Opcode::IApply => {
                let built: Vec<GlobalIdx> = pending_args.split_off(pending_args.len().saturating_sub(2));
                let (goal, extra_list) = (built[0], built[1]);
                let (name, mut args) = self.decompose_callable(goal)?;
                args.extend(self.list_to_vec(extra_list)?);
                self.call_built_goal(fp, name, args, (pc + 1) as u32)
            }

            Opcode::AEnter => {
                arith_stack.clear();
                Ok(Step::Continue(pc + 1))
            }
            Opcode::AInteger => {
                let v = code[pc + 1] as i32 as i64;
                arith_stack.push(Number::Int(v));
                Ok(Step::Continue(pc + 2))
            }
            Opcode::AInt64 => {
                let mut cursor = pc + 1;
                let v = Self::read_i64(code, &mut cursor);
                arith_stack.push(Number::Int(v));
                Ok(Step::Continue(cursor))
            }
            Opcode::ADouble => {
                let mut cursor = pc + 1;
                let bits = Self::read_i64(code, &mut cursor) as u64;
                arith_stack.push(Number::Float(f64::from_bits(bits)));
                Ok(Step::Continue(cursor))
            }
            Opcode::AMpz => {
                let mut cursor = pc + 1;
                let limbs = Self::read_mpz(code, &mut cursor);
                arith_stack.push(Number::Int(limbs.first().copied().unwrap_or(0) as i64));
                Ok(Step::Continue(cursor))
            }
            Opcode::AVar0 | Opcode::AVar1 | Opcode::AVar2 => {
                let slot = match op {
                    Opcode::AVar0 => 0,
                    Opcode::AVar1 => 1,
                    _ => 2,
                };
                arith_stack.push(self.eval_slot(fp, slot)?);
                Ok(Step::Continue(pc + 1))
            }
            Opcode::AVarN => {
                let slot = code[pc + 1] as usize;
                arith_stack.push(self.eval_slot(fp, slot)?);
                Ok(Step::Continue(pc + 2))
            }
            Opcode::AFunc0 | Opcode::AFunc1 | Opcode::AFunc2 | Opcode::AFuncN => {
                let id = ArithFuncId(code[pc + 1] as u16);
                let (name, arity) = self.arith.name_and_arity(id);
                let start = arith_stack.len().saturating_sub(arity as usize);
                let args: Vec<Number> = arith_stack.split_off(start);
                arith_stack.push(eval_arith(name, &args)?);
                Ok(Step::Continue(pc + 2))
            }
            Opcode::AIs => {
                let rhs = arith_stack.pop().expect("A_IS needs one arithmetic value");
                let target = pending_args.pop().expect("A_IS needs a built lhs term");
                let value = number_to_word(&mut self.heap, rhs);
                if unify::unify(&mut self.heap, &mut self.trail, &self.globals.functors, &mut self.woken, target, value) {
                    Ok(Step::Continue(pc + 1))
                } else {
                    Ok(Step::Fail)
                }
            }
            Opcode::AFirstVarIs => {
                let rhs = arith_stack.pop().expect("A_FIRSTVAR_IS needs one arithmetic value");
                let slot = code[pc + 1] as usize;
                let value = number_to_word(&mut self.heap, rhs);
                let mut slots = self.take_slots(fp);
                slots[slot] = value;
                self.restore_slots(fp, slots);
                Ok(Step::Continue(pc + 2))
            }
            Opcode::ALt | Opcode::ALe | Opcode::AGt | Opcode::AGe | Opcode::AEq | Opcode::ANe => {
                let rhs = arith_stack.pop().expect("arithmetic relation needs rhs");
                let lhs = arith_stack.pop().expect("arithmetic relation needs lhs");
                if compare(lhs, rhs, op) {
                    Ok(Step::Continue(pc + 1))
                } else {
                    Ok(Step::Fail)
                }
            }

            Opcode::BThrow => {
                let ball = pending_args.pop().expect("throw/1 needs a built term");
                Err(Exception::Thrown(Ball(ball)))
            }
            Opcode::ICatch => {
                let recovery_pc = code[pc + 1];
                let catcher = pending_args.pop().expect("catch/3 needs a built catcher term");
                let idx = self.push_choice(ChoiceKind::Catch, fp);
                self.catch_ctx.insert(idx, CatchContext { catcher, recovery_pc, frame: fp });
                Ok(Step::Continue(pc + 2))
            }

            Opcode::HConst
            | Opcode::HNil
            | Opcode::HInteger
            | Opcode::HInt64
            | Opcode::HFloat
            | Opcode::HString
            | Opcode::HMpz
            | Opcode::HFirstVar
            | Opcode::HVoid
            | Opcode::HVar
            | Opcode::HFunctor
            | Opcode::HList
            | Opcode::HRFunctor
            | Opcode::HRList
            | Opcode::IPopf
            | Opcode::BPopf => {
                panic!("{op:?} only ever appears inside build_term's own subtree walk")
            }
        }
    }

    /// `call/N`/`apply/2`'s resolved goal, continuing at `next_pc` in the
    /// calling frame once it returns (never last-call optimized: a
    /// dynamically resolved goal cannot be statically proven to be in tail
    /// position the way a compiled `I_DEPART` is).
    fn call_built_goal(&mut self, fp: LocalIdx, name: AtomId, args: Vec<GlobalIdx>, next_pc: u32) -> PrologResult<Step> {
        let (parent, level, context_module) = match self.locals.get(fp) {
            LocalEntry::Frame(f) => (f.parent, f.level, f.context_module),
            _ => unreachable!(),
        };
        let functor = self.globals.functors.intern(name, args.len() as u16);
        let key = ProcedureKey { module: context_module, functor };
        let _ = parent;
        self.select_clause(key, args, None, Some(fp), next_pc, level)
    }

    fn eval_slot(&self, fp: LocalIdx, slot: usize) -> PrologResult<Number> {
        let addr = match self.locals.get(fp) {
            LocalEntry::Frame(f) => f.slots[slot],
            _ => unreachable!(),
        };
        word_to_number(&self.heap, unify::deref(&self.heap, addr))
    }

    fn decompose_callable(&self, addr: GlobalIdx) -> PrologResult<(AtomId, Vec<GlobalIdx>)> {
        let addr = unify::deref(&self.heap, addr);
        match self.heap.get(addr) {
            Word::Atom(a) => Ok((*a, Vec::new())),
            Word::Var(_) | Word::AttVar(_) => Err(Exception::InstantiationError),
            Word::Compound(functor, args_start) => {
                let key = self.globals.functors.key(*functor);
                let args = (0..key.arity as u32).map(|i| *args_start + i).collect();
                Ok((key.name, args))
            }
            other => Err(Exception::TypeError { expected: "callable", culprit: format!("{other:?}") }),
        }
    }

    fn list_to_vec(&self, mut addr: GlobalIdx) -> PrologResult<Vec<GlobalIdx>> {
        let dot = self.dot_functor();
        let mut out = Vec::new();
        loop {
            addr = unify::deref(&self.heap, addr);
            match self.heap.get(addr) {
                Word::Nil => return Ok(out),
                Word::Compound(f, args_start) if *f == dot => {
                    out.push(*args_start);
                    addr = *args_start + 1;
                }
                Word::Var(_) => return Err(Exception::InstantiationError),
                other => return Err(Exception::TypeError { expected: "list", culprit: format!("{other:?}") }),
            }
        }
    }
}

fn word_to_number(heap: &GlobalStack, addr: GlobalIdx) -> PrologResult<Number> {
    match heap.get(addr) {
        Word::Integer(i) => Ok(Number::Int(*i)),
        Word::FloatRef(header) => match heap.indirect(*header) {
            Some(Indirect::Float(f)) => Ok(Number::Float(*f)),
            _ => Err(Exception::TypeError { expected: "evaluable", culprit: "float".into() }),
        },
        Word::Var(_) | Word::AttVar(_) => Err(Exception::InstantiationError),
        other => Err(Exception::TypeError { expected: "evaluable", culprit: format!("{other:?}") }),
    }
}

fn number_to_word(heap: &mut GlobalStack, n: Number) -> GlobalIdx {
    match n {
        Number::Int(i) => heap.push(Word::Integer(i)),
        Number::Float(f) => {
            let header = heap.push_indirect(Indirect::Float(f));
            heap.set(header, Word::FloatRef(header));
            header
        }
    }
}

/// Evaluate one arithmetic function by name (spec §4.1a), dispatched from
/// the index `A_FUNC0`/`A_FUNC1`/`A_FUNC2`/`A_FUNCN`'s operand resolves to.
/// `random/1` is deliberately not implemented: it needs an RNG source this
/// evaluator has no access to, and isn't reachable from any clause that
/// compiles without one.
fn eval_arith(name: &str, args: &[Number]) -> PrologResult<Number> {
    use Number::{Float, Int};
    let r = match (name, args) {
        ("+", [Int(a), Int(b)]) => Int(a.wrapping_add(*b)),
        ("+", [a, b]) => Float(a.as_f64() + b.as_f64()),
        ("+", [Int(a)]) => Int(*a),
        ("+", [Float(a)]) => Float(*a),
        ("-", [Int(a), Int(b)]) => Int(a.wrapping_sub(*b)),
        ("-", [a, b]) => Float(a.as_f64() - b.as_f64()),
        ("-", [Int(a)]) => Int(-a),
        ("-", [Float(a)]) => Float(-a),
        ("*", [Int(a), Int(b)]) => Int(a.wrapping_mul(*b)),
        ("*", [a, b]) => Float(a.as_f64() * b.as_f64()),
        ("/", [Int(a), Int(b)]) if *b != 0 && a % b == 0 => Int(a / b),
        ("/", [a, b]) => Float(a.as_f64() / b.as_f64()),
        ("//", [Int(a), Int(b)]) if *b != 0 => Int(a.div_euclid(*b)),
        ("mod", [Int(a), Int(b)]) if *b != 0 => Int(a.rem_euclid(*b)),
        ("rem", [Int(a), Int(b)]) if *b != 0 => Int(a % b),
        ("div", [Int(a), Int(b)]) if *b != 0 => Int(a.div_euclid(*b)),
        ("abs", [Int(a)]) => Int(a.abs()),
        ("abs", [Float(a)]) => Float(a.abs()),
        ("sign", [Int(a)]) => Int(a.signum()),
        ("sign", [Float(a)]) => Float(a.signum()),
        ("min", [a, b]) => {
            if a.as_f64() <= b.as_f64() {
                *a
            } else {
                *b
            }
        }
        ("max", [a, b]) => {
            if a.as_f64() >= b.as_f64() {
                *a
            } else {
                *b
            }
        }
        ("sqrt", [a]) => Float(a.as_f64().sqrt()),
        ("sin", [a]) => Float(a.as_f64().sin()),
        ("cos", [a]) => Float(a.as_f64().cos()),
        ("tan", [a]) => Float(a.as_f64().tan()),
        ("atan", [a]) => Float(a.as_f64().atan()),
        ("atan2", [a, b]) => Float(a.as_f64().atan2(b.as_f64())),
        ("exp", [a]) => Float(a.as_f64().exp()),
        ("log", [a]) => Float(a.as_f64().ln()),
        ("**", [a, b]) => Float(a.as_f64().powf(b.as_f64())),
        ("^", [Int(a), Int(b)]) if *b >= 0 => Int(a.pow(*b as u32)),
        ("^", [a, b]) => Float(a.as_f64().powf(b.as_f64())),
        (">>", [Int(a), Int(b)]) => Int(a >> b),
        ("<<", [Int(a), Int(b)]) => Int(a << b),
        ("/\\", [Int(a), Int(b)]) => Int(a & b),
        ("\\/", [Int(a), Int(b)]) => Int(a | b),
        ("xor", [Int(a), Int(b)]) => Int(a ^ b),
        ("\\", [Int(a)]) => Int(!a),
        ("float", [a]) => Float(a.as_f64()),
        ("integer", [Int(a)]) => Int(*a),
        ("integer", [Float(a)]) => Int(a.round() as i64),
        ("truncate", [a]) => Int(a.as_f64().trunc() as i64),
        ("round", [a]) => Int(a.as_f64().round() as i64),
        ("ceiling", [a]) => Int(a.as_f64().ceil() as i64),
        ("floor", [a]) => Int(a.as_f64().floor() as i64),
        ("float_integer_part", [a]) => Float(a.as_f64().trunc()),
        ("float_fractional_part", [a]) => Float(a.as_f64().fract()),
        ("pi", []) => Float(std::f64::consts::PI),
        ("e", []) => Float(std::f64::consts::E),
        ("msb", [Int(a)]) => Int(63 - a.leading_zeros() as i64),
        ("gcd", [Int(a), Int(b)]) => Int(gcd(a.abs(), b.abs())),
        _ => return Err(Exception::TypeError { expected: "evaluable", culprit: format!("{name}/{}", args.len()) }),
    };
    Ok(r)
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn compare(lhs: Number, rhs: Number, op: Opcode) -> bool {
    let (a, b) = (lhs.as_f64(), rhs.as_f64());
    match op {
        Opcode::ALt => a < b,
        Opcode::ALe => a <= b,
        Opcode::AGt => a > b,
        Opcode::AGe => a >= b,
        Opcode::AEq => a == b,
        Opcode::ANe => a != b,
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wam_compiler::clause_compiler::{compile_clause, CompileOptions};
    use wam_compiler::term::{SourceClause, SourceVar, Term};

    fn env() -> (Arc<RuntimeGlobals>, Arc<ArithTable>, Arc<ForeignTable>) {
        let globals = RuntimeGlobals::new();
        let atoms_ref = &globals.atoms;
        let arith = Arc::new(ArithTable::build(|s| atoms_ref.intern(s)));
        (globals, arith, Arc::new(ForeignTable::new()))
    }

    #[test]
    fn fact_call_succeeds_and_binds_argument() {
        let (globals, arith, foreign) = env();
        let greet = globals.atoms.intern("greet");
        let functor = globals.functors.intern(greet, 1);
        let key = ProcedureKey { module: globals.user_module(), functor };
        let world = globals.atoms.intern("world");
        let clause = SourceClause { head: Term::Compound(greet, vec![Term::Atom(world)]), body: None };
        let compiled = compile_clause(
            &globals,
            key,
            &clause,
            &arith,
            CompileOptions::default(),
            globals.generation.current(),
        )
        .unwrap();
        globals.procedure(key).assert_clause(compiled);

        let mut m = Machine::new(globals.clone(), arith, foreign, EngineConfig::new());
        let query_var = m.heap.top();
        m.heap.push(Word::Var(query_var));
        let ok = m.solve(key, vec![query_var]).unwrap();
        assert!(ok);
        assert_eq!(*m.heap.get(unify::deref(&m.heap, query_var)), Word::Atom(world));
    }

    #[test]
    fn missing_procedure_raises_existence_error_by_default() {
        let (globals, arith, foreign) = env();
        let ghost = globals.atoms.intern("ghost");
        let functor = globals.functors.intern(ghost, 0);
        let key = ProcedureKey { module: globals.user_module(), functor };
        let mut m = Machine::new(globals, arith, foreign, EngineConfig::new());
        let err = m.solve(key, vec![]).unwrap_err();
        assert!(matches!(err, Exception::ExistenceErrorProcedure { .. }));
    }

    #[test]
    fn backtracking_into_a_second_clause_finds_the_next_solution() {
        let (globals, arith, foreign) = env();
        let color = globals.atoms.intern("color");
        let functor = globals.functors.intern(color, 1);
        let key = ProcedureKey { module: globals.user_module(), functor };
        for name in ["red", "green"] {
            let atom = globals.atoms.intern(name);
            let clause = SourceClause { head: Term::Compound(color, vec![Term::Atom(atom)]), body: None };
            let compiled = compile_clause(
                &globals,
                key,
                &clause,
                &arith,
                CompileOptions::default(),
                globals.generation.current(),
            )
            .unwrap();
            globals.procedure(key).assert_clause(compiled);
        }

        let mut m = Machine::new(globals.clone(), arith, foreign, EngineConfig::new());
        let v = m.heap.top();
        m.heap.push(Word::Var(v));
        assert!(m.solve(key, vec![v]).unwrap());
        let red = globals.atoms.intern("red");
        assert_eq!(*m.heap.get(unify::deref(&m.heap, v)), Word::Atom(red));

        assert!(m.redo().unwrap());
        let green = globals.atoms.intern("green");
        assert_eq!(*m.heap.get(unify::deref(&m.heap, v)), Word::Atom(green));

        assert!(!m.redo().unwrap());
    }

    #[test]
    fn catch_recovers_from_a_thrown_ball_and_binds_the_catcher() {
        let (globals, arith, foreign) = env();

        // `true.` as a fact, so `Recovery` has something to call into.
        let true_atom = globals.atoms.intern("true");
        let true_functor = globals.functors.intern(true_atom, 0);
        let true_key = ProcedureKey { module: globals.user_module(), functor: true_functor };
        let true_clause = SourceClause { head: Term::Atom(true_atom), body: None };
        let compiled_true = compile_clause(
            &globals,
            true_key,
            &true_clause,
            &arith,
            CompileOptions::default(),
            globals.generation.current(),
        )
        .unwrap();
        globals.procedure(true_key).assert_clause(compiled_true);

        let catch_atom = globals.atoms.intern("catch");
        let throw_atom = globals.atoms.intern("throw");
        let err = globals.atoms.intern("err");
        let e_var = SourceVar("E".into());

        let goal = Term::Compound(throw_atom, vec![Term::Atom(err)]);
        let body =
            Term::Compound(catch_atom, vec![goal, Term::Var(e_var.clone()), Term::Atom(true_atom)]);

        let test_pred = globals.atoms.intern("test_catch");
        let functor = globals.functors.intern(test_pred, 1);
        let key = ProcedureKey { module: globals.user_module(), functor };
        let clause = SourceClause { head: Term::Compound(test_pred, vec![Term::Var(e_var)]), body: Some(body) };
        let compiled = compile_clause(
            &globals,
            key,
            &clause,
            &arith,
            CompileOptions::default(),
            globals.generation.current(),
        )
        .unwrap();
        globals.procedure(key).assert_clause(compiled);

        let mut m = Machine::new(globals.clone(), arith, foreign, EngineConfig::new());
        let v = m.heap.top();
        m.heap.push(Word::Var(v));
        assert!(m.solve(key, vec![v]).unwrap());

        assert_eq!(*m.heap.get(unify::deref(&m.heap, v)), Word::Atom(err));
    }

    #[test]
    fn uncaught_exception_propagates_past_an_unrelated_catcher() {
        let (globals, arith, foreign) = env();
        let catch_atom = globals.atoms.intern("catch");
        let throw_atom = globals.atoms.intern("throw");
        let oops = globals.atoms.intern("oops");
        let wrong_pattern = globals.atoms.intern("never_matches");

        let goal = Term::Compound(throw_atom, vec![Term::Atom(oops)]);
        let recovery = Term::Atom(globals.atoms.intern("unused"));
        let body = Term::Compound(catch_atom, vec![goal, Term::Atom(wrong_pattern), recovery]);

        let test_pred = globals.atoms.intern("test_uncaught");
        let functor = globals.functors.intern(test_pred, 0);
        let key = ProcedureKey { module: globals.user_module(), functor };
        let clause = SourceClause { head: Term::Atom(test_pred), body: Some(body) };
        let compiled = compile_clause(
            &globals,
            key,
            &clause,
            &arith,
            CompileOptions::default(),
            globals.generation.current(),
        )
        .unwrap();
        globals.procedure(key).assert_clause(compiled);

        let mut m = Machine::new(globals, arith, foreign, EngineConfig::new());
        let err = m.solve(key, vec![]).unwrap_err();
        assert!(matches!(err, Exception::Thrown(_)));
    }

    #[test]
    fn arithmetic_evaluates_integer_addition() {
        match eval_arith("+", &[Number::Int(2), Number::Int(3)]).unwrap() {
            Number::Int(5) => {}
            other => panic!("expected Int(5), got {other:?}"),
        }
    }

    #[test]
    fn comparison_opcodes_compare_numerically() {
        assert!(compare(Number::Int(1), Number::Int(2), Opcode::ALt));
        assert!(!compare(Number::Float(2.0), Number::Int(2), Opcode::ANe));
    }

    #[test]
    fn gcd_matches_euclidean_definition() {
        assert_eq!(gcd(12, 18), 6);
    }
}
