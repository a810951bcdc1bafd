//! Cooperative atom-GC checkpoint (spec §4.7, component C11).
//!
//! The source pauses every thread with an async signal and marks atom
//! references in its stacks from the signal handler. That only works
//! inside a VM whose safe points are the signal's own async-signal-safety
//! contract; since nothing here requires marking atoms mid-instruction, the
//! Design Notes' redesign is followed instead: a shared epoch counter each
//! engine polls at its own safe points (matching `interp::run`'s
//! suspension points — `CALL`/`DEPART`/`REDO`/`EXIT`/`FAIL`/`THROW` and
//! foreign-call entry/exit), with no signal handler at all.
//!
//! Engine registration reuses the teacher's lock-free slot-registry shape
//! (`scheduler::StrandRegistry`): a fixed array of `AtomicU64` slots, CAS'd
//! from zero to claim, zeroed to release, sized generously so registration
//! never blocks the hot path it's tracking.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use wam_core::AtomTable;

const DEFAULT_REGISTRY_SIZE: usize = 256;

/// One slot per live engine: 0 means free, otherwise the engine's id.
/// `acked_epoch` records the last cycle this engine has finished marking;
/// a cycle is complete once every occupied slot's `acked_epoch` has caught
/// up to the coordinator's `epoch`.
struct EngineSlot {
    engine_id: AtomicU64,
    acked_epoch: AtomicU64,
}

/// Registry of engines participating in atom-GC, plus the shared epoch a
/// cycle is driven by. One instance lives alongside the atom table it
/// guards (in practice, owned by whatever holds the `RuntimeGlobals` this
/// engine set shares).
pub struct AtomGcCoordinator {
    slots: Vec<EngineSlot>,
    epoch: AtomicU64,
    overflow_count: AtomicUsize,
}

impl AtomGcCoordinator {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REGISTRY_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| EngineSlot { engine_id: AtomicU64::new(0), acked_epoch: AtomicU64::new(0) })
            .collect();
        AtomGcCoordinator { slots, epoch: AtomicU64::new(0), overflow_count: AtomicUsize::new(0) }
    }

    /// Register an engine as a GC participant, returning a handle it polls
    /// from its own thread. Returns `None` if the registry is full; the
    /// engine still runs, it just isn't paused for or counted toward a
    /// cycle (matching the teacher's "registry full, strand still runs"
    /// overflow policy).
    pub fn register(&self, engine_id: u64) -> Option<EngineGcHandle<'_>> {
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.engine_id.compare_exchange(0, engine_id, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                slot.acked_epoch.store(self.epoch.load(Ordering::Acquire), Ordering::Release);
                return Some(EngineGcHandle { coordinator: self, index });
            }
        }
        self.overflow_count.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn unregister(&self, index: usize) {
        self.slots[index].engine_id.store(0, Ordering::Release);
    }

    /// Request a new atom-GC cycle. Does not block; engines observe the
    /// bumped epoch the next time they poll at a safe point.
    pub fn request_cycle(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(epoch = self.epoch.load(Ordering::Acquire), "atom-gc cycle requested");
    }

    /// True once every currently-registered engine has acked the current
    /// epoch (i.e. has run its own mark pass for this cycle).
    pub fn cycle_complete(&self) -> bool {
        let target = self.epoch.load(Ordering::Acquire);
        self.slots.iter().all(|slot| {
            slot.engine_id.load(Ordering::Acquire) == 0 || slot.acked_epoch.load(Ordering::Acquire) >= target
        })
    }

    pub fn active_engines(&self) -> usize {
        self.slots.iter().filter(|s| s.engine_id.load(Ordering::Acquire) != 0).count()
    }
}

impl Default for AtomGcCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-engine view onto the coordinator, held for the engine's lifetime.
pub struct EngineGcHandle<'a> {
    coordinator: &'a AtomGcCoordinator,
    index: usize,
}

impl EngineGcHandle<'_> {
    /// Poll the shared epoch; `true` means a cycle is pending and the
    /// caller should mark its own roots and call [`Self::ack`]. Call this
    /// at every suspension point, matching §4.7's "polls a shared epoch
    /// counter at every VM-safe point".
    pub fn cycle_pending(&self) -> bool {
        let target = self.coordinator.epoch.load(Ordering::Acquire);
        self.coordinator.slots[self.index].acked_epoch.load(Ordering::Acquire) < target
    }

    /// Mark every atom this engine's own stacks reference, then ack the
    /// current epoch. `roots` yields each `AtomId` found live in a frame
    /// slot, the trail, or an FLI handle on this engine's stacks.
    pub fn mark_and_ack(&self, atoms: &AtomTable, roots: impl Iterator<Item = wam_core::AtomId>) {
        for atom in roots {
            atoms.mark(atom);
        }
        let target = self.coordinator.epoch.load(Ordering::Acquire);
        self.coordinator.slots[self.index].acked_epoch.store(target, Ordering::Release);
    }
}

impl Drop for EngineGcHandle<'_> {
    fn drop(&mut self) {
        self.coordinator.unregister(self.index);
    }
}

/// Run the sweep once every registered engine has acked the current
/// cycle. The caller (typically whichever engine initiated the cycle, or a
/// dedicated maintenance thread) is responsible for waiting on
/// [`AtomGcCoordinator::cycle_complete`] first; this just performs the
/// actual sweep against the shared table.
pub fn sweep(atoms: &AtomTable) -> usize {
    let freed = atoms.sweep();
    tracing::debug!(freed, "atom-gc sweep complete");
    freed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_claims_and_releases_a_slot() {
        let coordinator = AtomGcCoordinator::with_capacity(2);
        assert_eq!(coordinator.active_engines(), 0);
        let handle = coordinator.register(1).unwrap();
        assert_eq!(coordinator.active_engines(), 1);
        drop(handle);
        assert_eq!(coordinator.active_engines(), 0);
    }

    #[test]
    fn cycle_is_pending_until_every_engine_acks() {
        let coordinator = AtomGcCoordinator::with_capacity(4);
        let a = coordinator.register(1).unwrap();
        let b = coordinator.register(2).unwrap();
        coordinator.request_cycle();
        assert!(a.cycle_pending());
        assert!(b.cycle_pending());
        assert!(!coordinator.cycle_complete());

        let atoms = AtomTable::new();
        a.mark_and_ack(&atoms, std::iter::empty());
        assert!(!coordinator.cycle_complete());
        b.mark_and_ack(&atoms, std::iter::empty());
        assert!(coordinator.cycle_complete());
        assert!(!a.cycle_pending());
    }

    #[test]
    fn registry_overflow_does_not_panic() {
        let coordinator = AtomGcCoordinator::with_capacity(1);
        let _first = coordinator.register(1).unwrap();
        assert!(coordinator.register(2).is_none());
    }
}
