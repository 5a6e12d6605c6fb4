//! Spin locks.

use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, Ordering};

use super::{Guard, Lock, RawLock};

/// Mutual exclusion lock that busy waits (spins).
pub struct RawSpinLock {
    /// Name of lock, for panic messages.
    name: &'static str,

    locked: AtomicBool,
}

/// Locks that busy wait (spin).
pub type SpinLock<T> = Lock<RawSpinLock, T>;
/// Guards of `SpinLock<T>`.
pub type SpinLockGuard<'s, T> = Guard<'s, RawSpinLock, T>;

impl RawSpinLock {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            locked: AtomicBool::new(false),
        }
    }
}

impl RawLock for RawSpinLock {
    /// Acquires the lock, spinning until it is free.
    ///
    /// The `Acquire` exchange pairs with the `Release` store in
    /// `release()`, so all stores done in one critical section are
    /// visible to the loads of the next.
    fn acquire(&self) {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spin_loop();
        }
    }

    fn release(&self) {
        assert!(
            self.locked.swap(false, Ordering::Release),
            "release {}",
            self.name
        );
    }
}

impl<T> SpinLock<T> {
    /// Returns a new `SpinLock` with name `name` and data `data`.
    pub const fn new(name: &'static str, data: T) -> Self {
        Self::from_parts(RawSpinLock::new(name), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn guard_gives_exclusive_access() {
        let lock = SpinLock::new("test", 0usize);
        *lock.lock() += 1;
        *lock.lock() += 1;
        assert_eq!(*lock.lock(), 2);
    }

    #[test]
    fn serializes_across_threads() {
        let lock = Arc::new(SpinLock::new("count", 0u64));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    *lock.lock() += 1;
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(), 4000);
    }

    #[test]
    #[should_panic(expected = "release")]
    fn double_release_panics() {
        let lock = RawSpinLock::new("bad");
        lock.acquire();
        lock.release();
        lock.release();
    }
}
