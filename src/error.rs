//! Kernel error kinds.
//!
//! Every failure surfaces to the immediate syscall caller as `-1`; the
//! kinds below exist so kernel-internal callers can tell resource
//! exhaustion from bad arguments. Invariant violations are not errors —
//! they panic.

use core::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum KernelError {
    /// No free slot in the process table.
    OutOfSlots,
    /// The page pool is exhausted.
    OutOfPages,
    /// A syscall argument is out of range.
    BadArg,
    /// No process with the given pid.
    NotFound,
    /// The semaphore was already initialized.
    AlreadyInitialized,
    /// `wait` with no children to reap.
    NoChildren,
    /// The caller has been killed.
    Killed,
}

pub type Result<T> = core::result::Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KernelError::OutOfSlots => "out of process slots",
            KernelError::OutOfPages => "out of pages",
            KernelError::BadArg => "bad argument",
            KernelError::NotFound => "no such process",
            KernelError::AlreadyInitialized => "already initialized",
            KernelError::NoChildren => "no children",
            KernelError::Killed => "killed",
        };
        f.write_str(msg)
    }
}
