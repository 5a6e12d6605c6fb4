//! Counting semaphores.
//!
//! Six globally indexed semaphores, each a sleepable lock: a spin lock
//! over the count, wired to the channel `Channel::Sem(i)`. A process
//! that finds the count empty sleeps on that channel and re-runs the
//! acquire when woken; since every waiter rechecks the count, wakeups
//! may be spurious and `release` can simply wake everyone.

use crate::error::{KernelError, Result};
use crate::kernel::Kernel;
use crate::param::NSEM;
use crate::proc::{KernelCtx, Pid};

/// One semaphore's state, protected by its own spin lock.
pub(crate) struct Semaphore {
    value: i64,
    initialized: bool,
    /// The last successful acquirer, for diagnostics.
    owner: Option<Pid>,
}

/// What a successful acquire attempt did; a killed waiter fails with
/// [`KernelError::Killed`] instead.
pub(crate) enum SemOutcome {
    Acquired,
    /// The caller went to sleep on the semaphore's channel.
    Blocked,
}

/// Snapshot of one semaphore, as reported by
/// [`Kernel::semaphore_status`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SemStatus {
    pub value: i64,
    pub initialized: bool,
    pub owner: Option<Pid>,
}

impl Semaphore {
    pub(crate) const fn new() -> Self {
        Self {
            value: 0,
            initialized: false,
            owner: None,
        }
    }
}

impl Kernel {
    /// Initializes semaphore `index` to `value`. Fails if it was
    /// already initialized.
    pub fn sem_init(&self, index: usize, value: i64) -> Result<()> {
        let sem = self.sems().get(index).ok_or(KernelError::BadArg)?;
        let mut guard = sem.lock();
        if guard.initialized {
            return Err(KernelError::AlreadyInitialized);
        }
        guard.initialized = true;
        guard.value = value;
        guard.owner = None;
        Ok(())
    }

    /// One attempt at taking semaphore `index` for the calling process.
    ///
    /// The dispatcher re-runs a blocked acquire at every wakeup, which
    /// is exactly the `while (count < 1) sleep(...)` loop of the
    /// classical version — with one addition: a killed waiter gives up
    /// instead of going back to sleep, so the kill can take effect at
    /// the return to user space.
    pub(crate) fn sem_acquire(&self, ctx: &KernelCtx<'_>, index: usize) -> Result<SemOutcome> {
        let sem = self.sems().get(index).ok_or(KernelError::BadArg)?;
        let pid = ctx.pid();
        let mut guard = sem.lock();
        if guard.value >= 1 {
            guard.value -= 1;
            guard.owner = Some(pid);
            log::trace!("pid {} acquired sem {}", pid, index);
            return Ok(SemOutcome::Acquired);
        }
        if ctx.killed() {
            return Err(KernelError::Killed);
        }
        // The table lock is taken while the semaphore lock is still
        // held, so a release cannot slip between the check above and
        // the state change; the semaphore lock itself is released
        // across the blocking window when `guard` drops.
        guard.sleep(ctx);
        Ok(SemOutcome::Blocked)
    }

    /// Gives semaphore `index` back and wakes its waiters.
    pub fn sem_release(&self, index: usize) -> Result<()> {
        let sem = self.sems().get(index).ok_or(KernelError::BadArg)?;
        let mut guard = sem.lock();
        guard.value += 1;
        guard.owner = None;
        guard.wakeup(self.procs());
        log::trace!("released sem {}", index);
        Ok(())
    }

    /// Snapshot of semaphore `index`, or `None` for a bad index.
    pub fn semaphore_status(&self, index: usize) -> Option<SemStatus> {
        let sem = self.sems().get(index)?;
        let guard = sem.lock();
        Some(SemStatus {
            value: guard.value,
            initialized: guard.initialized,
            owner: guard.owner,
        })
    }
}

// NSEM is small and fixed; a bad index is a bad argument, not a fault.
pub(crate) fn valid_index(raw: i32) -> Option<usize> {
    let index = usize::try_from(raw).ok()?;
    (index < NSEM).then_some(index)
}
