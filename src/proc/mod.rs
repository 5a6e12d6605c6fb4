//! Process descriptors.
//!
//! Each slot's bookkeeping is split the same way the table's lock
//! discipline is: everything the scheduler or another process may look
//! at ([`ProcInfo`]) lives inside the table and is reached only under
//! the table lock; everything private to the process itself
//! ([`ProcData`]) sits beside the table in a per-slot cell that only the
//! CPU running (or creating, or reaping) the slot may touch.

use alloc::boxed::Box;
use alloc::sync::Arc;
use arrayvec::ArrayString;

use crate::kalloc::{Kmem, Page};
use crate::param::{MAXPROCNAME, NOFILE};
use crate::syscall::Syscall;

mod kernel_ctx;
mod procs;
mod wait_channel;

pub use kernel_ctx::KernelCtx;
pub(crate) use procs::{Pool, WaitOutcome};
pub use procs::{ProcStatus, Procs};
pub use wait_channel::Channel;

pub type Pid = i32;

/// A fixed index into the process table. A process's identity is its
/// slot for the lifetime of its pid.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SlotId(pub(crate) usize);

impl SlotId {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// Process lifecycle state. A sleeping process always carries the
/// channel it sleeps on; no other state has one.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProcState {
    Unused,
    Embryo,
    Runnable,
    Running,
    Sleeping { chan: Channel },
    Zombie,
}

impl ProcState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcState::Unused => "UNUSED",
            ProcState::Embryo => "EMBRYO",
            ProcState::Runnable => "RUNNABLE",
            ProcState::Running => "RUNNING",
            ProcState::Sleeping { .. } => "SLEEPING",
            ProcState::Zombie => "ZOMBIE",
        }
    }

    pub fn is_sleeping(&self) -> bool {
        matches!(self, ProcState::Sleeping { .. })
    }
}

/// The three scheduling queues, from highest priority to lowest.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum QueueLevel {
    RoundRobin = 1,
    Lottery = 2,
    Bjf = 3,
}

impl QueueLevel {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(QueueLevel::RoundRobin),
            2 => Some(QueueLevel::Lottery),
            3 => Some(QueueLevel::Bjf),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// Saved user registers. `a0` carries syscall return values, and is the
/// register `fork` clears so the call returns 0 in the child.
#[derive(Clone, Copy, Default, Debug)]
pub struct TrapFrame {
    pub a0: i64,
}

/// A process's user-space image: an opaque state machine that yields one
/// system call per quantum.
///
/// Programs see syscall results through the trap frame on their next
/// step; a program that issued `fork` finds the child pid (or 0, in the
/// child) in `frame.a0`.
pub trait Program: Send {
    /// Produces the process's next system call.
    fn step(&mut self, frame: &mut TrapFrame) -> Syscall;

    /// Duplicates the image, as `fork` duplicates an address space.
    fn duplicate(&self) -> Box<dyn Program>;
}

/// Reference-counted open-file handle. Cloning is `filedup`, dropping is
/// `fileclose`.
#[derive(Clone)]
pub struct RcFile(Arc<str>);

impl RcFile {
    pub fn open(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

/// Reference-counted in-core inode handle; used here only for a
/// process's current directory.
#[derive(Clone)]
pub struct RcInode(Arc<str>);

impl RcInode {
    pub fn root() -> Self {
        Self(Arc::from("/"))
    }

    pub fn path(&self) -> &str {
        &self.0
    }
}

/// A user address space: one page from the pool plus whatever the image
/// itself occupies. Held until the owning slot is reaped.
pub(crate) struct UserMemory {
    page: Page,
}

impl UserMemory {
    pub(crate) fn new(kmem: &mut Kmem) -> Option<Self> {
        Some(Self {
            page: kmem.alloc()?,
        })
    }

    /// Allocates a copy's worth of fresh pages.
    pub(crate) fn duplicate(&self, kmem: &mut Kmem) -> Option<Self> {
        Self::new(kmem)
    }

    pub(crate) fn free(self, kmem: &mut Kmem) {
        kmem.free(self.page);
    }
}

/// Per-slot bookkeeping shared with the scheduler and other processes.
/// The process table's spin lock must be held when using these.
pub(crate) struct ProcInfo {
    pub(crate) state: ProcState,

    /// Process ID. 0 means the slot is free.
    pub(crate) pid: Pid,

    /// Parent slot. Only init has none.
    pub(crate) parent: Option<SlotId>,

    pub(crate) queue_lvl: QueueLevel,

    /// Tick at slot allocation.
    pub(crate) creation_time: u64,

    /// Tick of last dispatch; round-robin prefers the stalest.
    pub(crate) last_cpu_time: u64,

    /// Bumped each time some other process is dispatched; zeroed when
    /// this one runs or is promoted.
    pub(crate) waiting_in_queue_cycle: u64,

    /// Completed quanta.
    pub(crate) exec_cycle: u64,

    /// Lottery ticket interval, inclusive on both ends.
    pub(crate) first_tick: i32,
    pub(crate) last_tick: i32,

    /// Best-Job-First inputs and weights.
    pub(crate) priority: i64,
    pub(crate) arrival: i64,
    pub(crate) priority_ratio: i64,
    pub(crate) arrival_ratio: i64,
    pub(crate) exec_cycle_ratio: i64,

    /// Tracer bookkeeping, consulted only by parent-pid lookup.
    pub(crate) is_tracer: bool,
    pub(crate) tracer_parent: Option<SlotId>,
}

impl ProcInfo {
    pub(crate) const fn unused() -> Self {
        Self {
            state: ProcState::Unused,
            pid: 0,
            parent: None,
            queue_lvl: QueueLevel::Lottery,
            creation_time: 0,
            last_cpu_time: 0,
            waiting_in_queue_cycle: 0,
            exec_cycle: 0,
            first_tick: 0,
            last_tick: 0,
            priority: 0,
            arrival: 0,
            priority_ratio: 0,
            arrival_ratio: 0,
            exec_cycle_ratio: 0,
            is_tracer: false,
            tracer_parent: None,
        }
    }

    /// The Best-Job-First score; lower runs sooner. Integer arithmetic
    /// throughout — the same computation serves selection and the
    /// console dump.
    pub(crate) fn rank(&self) -> i64 {
        (self.priority * self.priority_ratio
            + self.arrival * self.arrival_ratio
            + self.exec_cycle as i64 * self.exec_cycle_ratio)
            / 10
    }
}

/// Data private to the process. The table lock need not be held; the
/// slot's runner (or its creator before first run, or its reaper after
/// death) is the only context that touches it.
pub(crate) struct ProcData {
    /// Process name (debugging).
    pub(crate) name: ArrayString<MAXPROCNAME>,

    pub(crate) frame: TrapFrame,

    /// Kernel stack page, held until reaped.
    pub(crate) kstack: Option<Page>,

    /// User address space, held until reaped.
    pub(crate) memory: Option<UserMemory>,

    /// The user image. `None` only while the slot is unused.
    pub(crate) image: Option<Box<dyn Program>>,

    /// A blocking call to re-execute at next dispatch.
    pub(crate) pending: Option<Syscall>,

    /// Open files.
    pub(crate) open_files: [Option<RcFile>; NOFILE],

    /// Current directory.
    pub(crate) cwd: Option<RcInode>,
}

impl ProcData {
    pub(crate) const fn new() -> Self {
        const NONE: Option<RcFile> = None;
        Self {
            name: ArrayString::new_const(),
            frame: TrapFrame { a0: 0 },
            kstack: None,
            memory: None,
            image: None,
            pending: None,
            open_files: [NONE; NOFILE],
            cwd: None,
        }
    }
}
