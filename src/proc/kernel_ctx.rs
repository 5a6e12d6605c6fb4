//! The running process's view of the kernel.

use core::sync::atomic::Ordering;

use super::{Channel, Pid, ProcData, ProcState, SlotId};
use crate::kernel::Kernel;

/// The identity of the process currently executing on a CPU, created by
/// the scheduler for the span of one dispatch. System calls run against
/// one of these.
pub struct KernelCtx<'s> {
    kernel: &'s Kernel,
    cpu_id: usize,
    slot: SlotId,
}

impl<'s> KernelCtx<'s> {
    pub(crate) fn new(kernel: &'s Kernel, cpu_id: usize, slot: SlotId) -> Self {
        Self {
            kernel,
            cpu_id,
            slot,
        }
    }

    pub(crate) fn kernel(&self) -> &'s Kernel {
        self.kernel
    }

    pub(crate) fn slot(&self) -> SlotId {
        self.slot
    }

    pub(crate) fn cpu_id(&self) -> usize {
        self.cpu_id
    }

    pub(crate) fn pid(&self) -> Pid {
        self.kernel.procs().pool().slot(self.slot).pid
    }

    pub(crate) fn killed(&self) -> bool {
        self.kernel
            .procs()
            .killed_flag(self.slot)
            .load(Ordering::Acquire)
    }

    /// Returns the process's private data.
    ///
    /// # Safety
    ///
    /// The caller must not hold another reference to this slot's data.
    /// The dispatching CPU is the only context that creates a
    /// `KernelCtx` for the slot, so calls from the dispatch path never
    /// race; the caller only has to keep its own borrows disjoint.
    pub(crate) unsafe fn data_mut(&self) -> &mut ProcData {
        unsafe { &mut *self.kernel.procs().data_ptr(self.slot) }
    }

    /// Shared-reference form of [`Self::data_mut`].
    ///
    /// # Safety
    ///
    /// Same as [`Self::data_mut`].
    pub(crate) unsafe fn data(&self) -> &ProcData {
        unsafe { &*self.kernel.procs().data_ptr(self.slot) }
    }

    /// Atomically puts the calling process to sleep on `chan` and
    /// returns control toward the scheduler.
    ///
    /// Taking the table lock before the state change is what makes the
    /// transition atomic with respect to any concurrent `wakeup`: a
    /// wakeup must also take the table lock, so it either sees the
    /// process already sleeping or runs after the sleeper's condition
    /// recheck.
    pub(crate) fn sleep_on(&self, chan: Channel) {
        let procs = self.kernel.procs();
        let mut pool = procs.pool();
        let info = pool.slot_mut(self.slot);
        assert_eq!(info.state, ProcState::Running, "sleep");
        info.state = ProcState::Sleeping { chan };
        self.kernel.sched_return(&mut pool, self.cpu_id, self.slot);
    }
}
