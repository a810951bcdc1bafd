//! Thread engines (spec §4.7, component C12): one VM state per OS thread,
//! sharing the process-wide symbol tables and talking to each other only
//! through bounded, guarded message queues.
//!
//! Grounded on the teacher's `channel.rs` (an MPMC registry of typed
//! channels moving `Value`) generalized from "channel id -> queue" to
//! "engine id -> mailbox", and ported from `may::sync::mpmc` to
//! `crossbeam::channel` (a bounded channel blocks a real OS thread rather
//! than cooperatively yielding a green thread, matching this crate's
//! one-engine-per-OS-thread scheduling model instead of the teacher's
//! coroutine one).

use crate::atom_gc::AtomGcCoordinator;
use crate::config::EngineConfig;
use crate::error::PrologResult;
use crate::foreign::ForeignTable;
use crate::interp::Machine;
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wam_compiler::arith::ArithTable;
use wam_core::{AtomId, FunctorId, GlobalIdx, Indirect, ProcedureKey, RuntimeGlobals, Word};

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// A message is a self-contained ground term: engines don't share a heap,
/// so a `GlobalIdx` from the sender is meaningless to the receiver. This
/// mirrors the teacher's channel payload being an owned `Value`, not a
/// pointer into the sending strand's stack.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Atom(AtomId),
    Integer(i64),
    Float(f64),
    Str(String),
    Nil,
    Compound(AtomId, Vec<Message>),
}

impl Message {
    /// Snapshot a term rooted at `addr` on `heap` into an owned `Message`,
    /// the way `thread_send_message/2` must copy its argument before
    /// handing it to another engine's queue.
    pub fn capture(
        heap: &wam_core::GlobalStack,
        functors: &wam_core::FunctorTable,
        addr: GlobalIdx,
    ) -> PrologResult<Message> {
        let addr = crate::unify::deref(heap, addr);
        match heap.get(addr) {
            Word::Atom(a) => Ok(Message::Atom(*a)),
            Word::Integer(i) => Ok(Message::Integer(*i)),
            Word::Nil => Ok(Message::Nil),
            Word::FloatRef(header) => match heap.indirect(*header) {
                Some(Indirect::Float(f)) => Ok(Message::Float(*f)),
                _ => Err(crate::error::Exception::InstantiationError),
            },
            Word::StringRef(header) => match heap.indirect(*header) {
                Some(Indirect::Str(s)) => Ok(Message::Str(s.clone())),
                _ => Err(crate::error::Exception::InstantiationError),
            },
            Word::Compound(functor, args_start) => {
                let key = functors.key(*functor);
                let mut captured = Vec::with_capacity(key.arity as usize);
                for i in 0..key.arity as u32 {
                    captured.push(Message::capture(heap, functors, *args_start + i)?);
                }
                Ok(Message::Compound(key.name, captured))
            }
            Word::Var(_) | Word::AttVar(_) => Err(crate::error::Exception::InstantiationError),
            Word::Reference(_) => unreachable!("deref always resolves past Reference"),
        }
    }

    /// Rebuild this message as a fresh term on `heap`, the way a received
    /// message is materialized in the receiving engine's own stacks.
    pub fn materialize(
        &self,
        heap: &mut wam_core::GlobalStack,
        functors: &wam_core::FunctorTable,
    ) -> GlobalIdx {
        match self {
            Message::Atom(a) => heap.push(Word::Atom(*a)),
            Message::Integer(i) => heap.push(Word::Integer(*i)),
            Message::Nil => heap.push(Word::Nil),
            Message::Float(f) => {
                let header = heap.push_indirect(Indirect::Float(*f));
                heap.set(header, Word::FloatRef(header));
                header
            }
            Message::Str(s) => {
                let header = heap.push_indirect(Indirect::Str(s.clone()));
                heap.set(header, Word::StringRef(header));
                header
            }
            Message::Compound(name, args) => {
                let functor = functors.intern(*name, args.len() as u16);
                let header = heap.top();
                heap.push(Word::Compound(functor, header + 1));
                for _ in args {
                    heap.push(Word::Reference(header)); // placeholder, overwritten below
                }
                for (i, arg) in args.iter().enumerate() {
                    let child = arg.materialize(heap, functors);
                    heap.set(header + 1 + i as u32, Word::Reference(child));
                }
                header
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineId(pub u64);

/// One engine's mailbox: a bounded, guarded queue (spec §4.7's "bounded,
/// guarded message queues"). Bounded so a producer outrunning its consumer
/// blocks rather than growing memory without limit — the guard is the
/// channel's own capacity.
struct Mailbox {
    sender: Sender<Message>,
    receiver: Receiver<Message>,
}

/// Shared engine registry: lets `thread_send_message/2` address an engine
/// by id without the sender needing a direct reference to it.
pub struct EngineDirectory {
    mailboxes: parking_lot::RwLock<std::collections::HashMap<EngineId, Sender<Message>>>,
}

impl EngineDirectory {
    pub fn new() -> Self {
        EngineDirectory { mailboxes: parking_lot::RwLock::new(std::collections::HashMap::new()) }
    }

    fn register(&self, id: EngineId, sender: Sender<Message>) {
        self.mailboxes.write().insert(id, sender);
    }

    fn unregister(&self, id: EngineId) {
        self.mailboxes.write().remove(&id);
    }

    /// `thread_send_message(Id, Term)`: deliver a captured message to
    /// `id`'s mailbox, blocking if the channel is at capacity.
    pub fn send(&self, id: EngineId, message: Message) -> Result<(), Message> {
        let sender = self.mailboxes.read().get(&id).cloned();
        match sender {
            Some(sender) => sender.send(message).map_err(|e| e.0),
            None => Err(message),
        }
    }
}

impl Default for EngineDirectory {
    fn default() -> Self {
        Self::new()
    }
}

const MAILBOX_CAPACITY: usize = 256;

/// One VM state per engine (spec §4.7): its own `Machine` (stacks, cut
/// bookkeeping), mailbox, and atom-GC participation handle, plus a shared
/// reference to the process-wide symbol tables every engine has a copy of
/// this type for.
pub struct Engine {
    pub id: EngineId,
    pub machine: Machine,
    mailbox: Mailbox,
    directory: Arc<EngineDirectory>,
}

impl Engine {
    /// Create a new engine attached to `globals`, registering its mailbox
    /// in `directory` so other engines can address it by id (mirroring
    /// `PL_thread_attach_engine`, SUPPLEMENT §6a).
    pub fn create(
        globals: Arc<RuntimeGlobals>,
        arith: Arc<ArithTable>,
        foreign: Arc<ForeignTable>,
        config: EngineConfig,
        directory: Arc<EngineDirectory>,
    ) -> Self {
        let id = EngineId(NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = crossbeam::channel::bounded(MAILBOX_CAPACITY);
        directory.register(id, sender.clone());
        tracing::debug!(engine_id = id.0, "engine attached");
        Engine { id, machine: Machine::new(globals, arith, foreign, config), mailbox: Mailbox { sender, receiver }, directory }
    }

    /// `thread_send_message/2`, addressed to this engine's own mailbox.
    pub fn send_to(&self, target: EngineId, addr: GlobalIdx) -> PrologResult<()> {
        let message = Message::capture(&self.machine.heap, &self.machine.globals.functors, addr)?;
        if self.directory.send(target, message).is_err() {
            return Err(crate::error::Exception::PermissionError {
                operation: "send_message",
                kind: "engine",
                culprit: format!("engine {} has no mailbox", target.0),
            });
        }
        Ok(())
    }

    /// `thread_get_message/2`: block until a message matching `pattern`
    /// arrives, returning it materialized on this engine's own heap.
    /// Non-matching messages already pulled off the channel are held in
    /// front of the mailbox for the next call, giving `get_message` its
    /// predicate-pattern selectivity without losing messages it skips.
    pub fn get_message(&mut self, pattern: impl Fn(&Message) -> bool, pending: &mut Vec<Message>) -> GlobalIdx {
        if let Some(pos) = pending.iter().position(&pattern) {
            let message = pending.remove(pos);
            return message.materialize(&mut self.machine.heap, &self.machine.globals.functors);
        }
        loop {
            let message = self.mailbox.receiver.recv().expect("mailbox sender half never dropped while registered");
            if pattern(&message) {
                return message.materialize(&mut self.machine.heap, &self.machine.globals.functors);
            }
            pending.push(message);
        }
    }

    /// Non-blocking poll, used by a safe-point loop that also needs to
    /// check the atom-GC epoch between messages.
    pub fn try_get_message(&mut self) -> Option<Message> {
        match self.mailbox.receiver.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Message> {
        match self.mailbox.receiver.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Resolve the runtime procedure key for `name/arity` in `module`,
    /// the entry point a freshly-spawned engine's initial goal needs.
    pub fn procedure_key(&self, module: wam_core::ModuleId, name: AtomId, arity: u16) -> ProcedureKey {
        let functor: FunctorId = self.machine.globals.functors.intern(name, arity);
        ProcedureKey { module, functor }
    }

    /// Check the shared atom-GC epoch and run this engine's own mark pass
    /// if a cycle is pending (spec §4.7's cooperative checkpoint). Called
    /// at the same suspension points `interp::run` already has
    /// (`CALL`/`DEPART`/`REDO`/`EXIT`/`FAIL`/`THROW`, foreign entry/exit).
    pub fn atom_gc_checkpoint(&self, gc: &AtomGcCoordinator, handle: &crate::atom_gc::EngineGcHandle<'_>) {
        if !handle.cycle_pending() {
            return;
        }
        let roots = self.live_atom_roots();
        handle.mark_and_ack(&self.machine.globals.atoms, roots.into_iter());
        if gc.cycle_complete() {
            crate::atom_gc::sweep(&self.machine.globals.atoms);
        }
    }

    fn live_atom_roots(&self) -> Vec<AtomId> {
        let mut roots = Vec::new();
        for (_, word) in self.machine.heap.iter() {
            if let Word::Atom(a) = word {
                roots.push(*a);
            }
        }
        roots
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.directory.unregister(self.id);
        tracing::debug!(engine_id = self.id.0, "engine detached");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foreign::ForeignTable;

    fn setup() -> (Arc<RuntimeGlobals>, Arc<ArithTable>) {
        let globals = RuntimeGlobals::new();
        let atoms_ref = &globals.atoms;
        let arith = Arc::new(ArithTable::build(|s| atoms_ref.intern(s)));
        (globals, arith)
    }

    #[test]
    fn message_round_trips_through_capture_and_materialize() {
        let (globals, _arith) = setup();
        let mut heap = wam_core::GlobalStack::new();
        let hello = globals.atoms.intern("hello");
        let addr = heap.push(Word::Atom(hello));
        let message = Message::capture(&heap, &globals.functors, addr).unwrap();
        assert_eq!(message, Message::Atom(hello));

        let mut other_heap = wam_core::GlobalStack::new();
        let rebuilt = message.materialize(&mut other_heap, &globals.functors);
        assert_eq!(*other_heap.get(rebuilt), Word::Atom(hello));
    }

    #[test]
    fn send_and_get_message_round_trip_across_engines() {
        let (globals, arith) = setup();
        let foreign = Arc::new(ForeignTable::new());
        let directory = Arc::new(EngineDirectory::new());
        let mut sender_engine =
            Engine::create(globals.clone(), arith.clone(), foreign.clone(), EngineConfig::new(), directory.clone());
        let mut receiver_engine = Engine::create(globals.clone(), arith, foreign, EngineConfig::new(), directory);

        let greeting = globals.atoms.intern("hi");
        let addr = sender_engine.machine.heap.push(Word::Atom(greeting));
        sender_engine.send_to(receiver_engine.id, addr).unwrap();

        let mut pending = Vec::new();
        let received = receiver_engine.get_message(|_| true, &mut pending);
        assert_eq!(*receiver_engine.machine.heap.get(received), Word::Atom(greeting));
    }
}
