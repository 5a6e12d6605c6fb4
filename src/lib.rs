//! A teaching-kernel core: a multi-level process scheduler with counting
//! semaphores on top of a classical Unix-style process table.
//!
//! The process table is a fixed arena of slots guarded by a single spin
//! lock. Three scheduling disciplines share it — round-robin, lottery,
//! and Best-Job-First — consulted strictly in that order, with an aging
//! pass that promotes starved processes toward the front of the line.
//! Processes block and resume through channel-based sleep/wakeup, and
//! counting semaphores are layered on top of that primitive.
//!
//! There is no real hardware underneath: a user program is an opaque
//! state machine that yields one system call per quantum, and the
//! dispatch of that call stands in for the context switch. Everything
//! else — lock ordering, state transitions, wakeup rules — behaves as it
//! would on the metal, which is the point.

#![cfg_attr(not(test), no_std)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(unused_import_braces)]
#![deny(unused_qualifications)]

extern crate alloc;

mod console;
mod cpu;
mod error;
mod kalloc;
mod kernel;
pub mod lock;
pub mod param;
mod proc;
mod sched;
mod sem;
mod syscall;

pub use error::{KernelError, Result};
pub use kernel::Kernel;
pub use proc::{
    Channel, Pid, ProcState, ProcStatus, Program, QueueLevel, RcFile, RcInode, SlotId, TrapFrame,
};
pub use sem::SemStatus;
pub use syscall::Syscall;
