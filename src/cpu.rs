//! Per-CPU state.

use array_macro::array;
use core::cell::Cell;

use crate::param::NCPU;
use crate::proc::SlotId;

pub(crate) struct Cpus {
    cpus: [Cpu; NCPU],
}

/// Per-CPU state. Each scheduler instance owns one of these for the
/// lifetime of its loop.
pub(crate) struct Cpu {
    /// The slot running on this CPU, if any.
    proc: Cell<Option<SlotId>>,
}

// SAFETY: a `Cpu` is only ever touched by the thread driving that CPU's
// scheduler loop; the array itself is shared read-only.
unsafe impl Sync for Cpus {}

impl Cpus {
    pub(crate) const fn new() -> Self {
        Self {
            cpus: array![_ => Cpu::new(); NCPU],
        }
    }

    /// Returns the cpu struct for `id`.
    pub(crate) fn get(&self, id: usize) -> &Cpu {
        assert!(id < NCPU, "unknown cpu {}", id);
        &self.cpus[id]
    }
}

impl Cpu {
    const fn new() -> Self {
        Self {
            proc: Cell::new(None),
        }
    }

    pub(crate) fn set_proc(&self, slot: Option<SlotId>) {
        self.proc.set(slot);
    }

    pub(crate) fn current_proc(&self) -> Option<SlotId> {
        self.proc.get()
    }
}
