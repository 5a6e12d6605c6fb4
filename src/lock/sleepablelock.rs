//! Sleepable locks: a spin lock paired with a wakeup channel, so that a
//! guard holder can block on the condition the lock protects.

use super::{spinlock::RawSpinLock, Guard, Lock, RawLock};
use crate::proc::{Channel, KernelCtx, Procs};

/// Mutual exclusion spin lock whose guards can sleep.
pub struct RawSleepableLock {
    lock: RawSpinLock,
    /// Channel used to sleep/wakeup the lock's guards.
    chan: Channel,
}

/// Similar to `SpinLock`, but guards of this lock can sleep.
pub type SleepableLock<T> = Lock<RawSleepableLock, T>;
/// Guards of `SleepableLock<T>`. These guards can `sleep()`/`wakeup()`.
pub type SleepableLockGuard<'s, T> = Guard<'s, RawSleepableLock, T>;

impl RawSleepableLock {
    const fn new(name: &'static str, chan: Channel) -> Self {
        Self {
            lock: RawSpinLock::new(name),
            chan,
        }
    }
}

impl RawLock for RawSleepableLock {
    fn acquire(&self) {
        self.lock.acquire();
    }

    fn release(&self) {
        self.lock.release();
    }
}

impl<T> SleepableLock<T> {
    /// Returns a new `SleepableLock` waking sleepers on `chan`.
    pub const fn new(name: &'static str, chan: Channel, data: T) -> Self {
        Self::from_parts(RawSleepableLock::new(name, chan), data)
    }
}

impl<T> SleepableLockGuard<'_, T> {
    /// Puts the calling process to sleep on this lock's channel.
    ///
    /// The process table lock is taken *while this guard is still held*,
    /// so a concurrent `wakeup` (which must also take the table lock)
    /// cannot slip between the condition check and the state change.
    /// This guard is then released across the blocking window — the
    /// caller drops it on its way back to the scheduler and re-acquires
    /// the lock when the pending call is re-executed.
    pub(crate) fn sleep(&mut self, ctx: &KernelCtx<'_>) {
        ctx.sleep_on(self.raw().chan);
    }

    /// Wakes every process sleeping on this lock's channel.
    pub(crate) fn wakeup(&self, procs: &Procs) {
        procs.wakeup(self.raw().chan);
    }
}
