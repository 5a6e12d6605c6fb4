//! The process table and its operations.
//!
//! One spin lock guards the whole table; every state transition happens
//! under it, which is what gives the scheduler a consistent snapshot
//! and makes sleep/wakeup airtight. Per-slot private data sits outside
//! the lock and is only ever touched by the slot's runner, creator, or
//! reaper.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use array_macro::array;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use itertools::izip;

use super::{
    Channel, Pid, ProcData, ProcInfo, ProcState, Program, QueueLevel, RcFile, RcInode, SlotId,
    TrapFrame, UserMemory,
};
use crate::error::{KernelError, Result};
use crate::kernel::Kernel;
use crate::lock::{SpinLock, SpinLockGuard};
use crate::param::{MAXPROCNAME, NPROC};
use crate::proc::KernelCtx;
use arrayvec::ArrayString;

/// The locked face of the process table.
pub(crate) struct Pool {
    slots: [ProcInfo; NPROC],

    /// The init process. Set once, at `user_init`.
    pub(crate) initial: Option<SlotId>,

    /// Completed returns into the scheduler.
    pub(crate) nswitch: u64,
}

struct ProcShared {
    /// Set by `kill`; the process is destroyed at its next return to
    /// user space.
    killed: AtomicBool,

    /// The slot's private data. See the module comment for the access
    /// discipline.
    data: UnsafeCell<ProcData>,
}

/// Process system containing and managing all processes.
pub struct Procs {
    nextpid: AtomicI32,
    pool: SpinLock<Pool>,
    shared: [ProcShared; NPROC],
}

// SAFETY: `pool` is behind its lock; `shared[i].data` follows the
// single-runner discipline documented on `ProcData`.
unsafe impl Sync for Procs {}

impl Pool {
    const fn new() -> Self {
        Self {
            slots: array![_ => ProcInfo::unused(); NPROC],
            initial: None,
            nswitch: 0,
        }
    }

    pub(crate) fn ids() -> impl Iterator<Item = SlotId> {
        (0..NPROC).map(SlotId)
    }

    pub(crate) fn slot(&self, id: SlotId) -> &ProcInfo {
        &self.slots[id.index()]
    }

    pub(crate) fn slot_mut(&mut self, id: SlotId) -> &mut ProcInfo {
        &mut self.slots[id.index()]
    }

    pub(crate) fn find_by_pid(&self, pid: Pid) -> Option<SlotId> {
        if pid == 0 {
            return None;
        }
        Pool::ids().find(|&id| self.slot(id).pid == pid)
    }
}

impl ProcShared {
    const fn new() -> Self {
        Self {
            killed: AtomicBool::new(false),
            data: UnsafeCell::new(ProcData::new()),
        }
    }
}

impl Procs {
    pub(crate) const fn new() -> Self {
        Self {
            nextpid: AtomicI32::new(1),
            pool: SpinLock::new("ptable", Pool::new()),
            shared: array![_ => ProcShared::new(); NPROC],
        }
    }

    /// Acquires the table lock.
    pub(crate) fn pool(&self) -> SpinLockGuard<'_, Pool> {
        self.pool.lock()
    }

    pub(crate) fn killed_flag(&self, slot: SlotId) -> &AtomicBool {
        &self.shared[slot.index()].killed
    }

    /// Raw pointer to a slot's private data. Callers take on the
    /// single-runner discipline.
    pub(crate) fn data_ptr(&self, slot: SlotId) -> *mut ProcData {
        self.shared[slot.index()].data.get()
    }

    fn allocpid(&self) -> Pid {
        self.nextpid.fetch_add(1, Ordering::Relaxed)
    }

    /// Looks for an UNUSED slot and turns it into an embryo: pid
    /// assigned, counters cleared, queue chosen. The caller provisions
    /// the kernel stack and address space afterwards, outside the lock.
    ///
    /// The first two pids land in the round-robin queue; everyone else
    /// starts in the lottery.
    pub(crate) fn alloc(&self, now: u64) -> Result<SlotId> {
        let mut pool = self.pool();
        let slot = Pool::ids()
            .find(|&id| pool.slot(id).state == ProcState::Unused)
            .ok_or(KernelError::OutOfSlots)?;

        let pid = self.allocpid();
        let info = pool.slot_mut(slot);
        *info = ProcInfo::unused();
        info.state = ProcState::Embryo;
        info.pid = pid;
        info.creation_time = now;
        info.arrival = now as i64;
        info.queue_lvl = match pid {
            1 | 2 => QueueLevel::RoundRobin,
            _ => QueueLevel::Lottery,
        };
        Ok(slot)
    }

    /// Returns an embryo that could not be provisioned to the free pool.
    pub(crate) fn free_embryo(&self, slot: SlotId) {
        let mut pool = self.pool();
        let info = pool.slot_mut(slot);
        assert_eq!(info.state, ProcState::Embryo, "free_embryo");
        *info = ProcInfo::unused();
    }
}

/// What a successful `wait` call did; the syscall layer turns `Sleep`
/// into a pending call that is retried at next dispatch. Childlessness
/// and cancellation surface as errors.
pub(crate) enum WaitOutcome {
    Reaped(Pid),
    Sleep,
}

/// A process snapshot for callers outside the kernel — the programmatic
/// face of `print_processes`.
#[derive(Clone, Debug)]
pub struct ProcStatus {
    pub pid: Pid,
    pub name: String,
    pub state: ProcState,
    pub queue_lvl: QueueLevel,
    pub parent: Option<Pid>,
    pub creation_time: u64,
    pub waiting_in_queue_cycle: u64,
    pub exec_cycle: u64,
    pub first_tick: i32,
    pub last_tick: i32,
    pub rank: i64,
}

fn short_name(name: &str) -> ArrayString<MAXPROCNAME> {
    let mut out = ArrayString::new();
    for c in name.chars() {
        if out.try_push(c).is_err() {
            break;
        }
    }
    out
}

/// Standard descriptors 0..2, all aliased to the console, the way init
/// sets up every process's file table.
fn attach_console(data: &mut ProcData) {
    let console = RcFile::open("console");
    data.open_files[0] = Some(console.clone());
    data.open_files[1] = Some(console.clone());
    data.open_files[2] = Some(console);
}

impl Kernel {
    /// Sets up the first user process. Must be called exactly once,
    /// before anything is scheduled.
    pub fn user_init(&self, image: Box<dyn Program>) -> Pid {
        let now = self.uptime();
        let procs = self.procs();
        let slot = procs.alloc(now).expect("user_init: out of slots");

        let kstack = self.kmem().lock().alloc().expect("user_init: alloc");
        let memory =
            UserMemory::new(&mut self.kmem().lock()).expect("user_init: alloc");

        // SAFETY: an embryo's data is private to its creator.
        let data = unsafe { &mut *procs.data_ptr(slot) };
        data.image = Some(image);
        data.kstack = Some(kstack);
        data.memory = Some(memory);
        data.name = short_name("initcode");
        data.cwd = Some(RcInode::root());
        attach_console(data);

        let mut pool = procs.pool();
        assert!(pool.initial.is_none(), "user_init: already running");
        pool.initial = Some(slot);
        let info = pool.slot_mut(slot);
        info.state = ProcState::Runnable;
        info.pid
    }

    /// Loads a fresh image as a new process parented to init. This is
    /// the loader path; processes themselves multiply through `fork`.
    pub fn spawn(&self, name: &str, image: Box<dyn Program>) -> Result<Pid> {
        let procs = self.procs();
        let parent = procs.pool().initial.expect("spawn before user_init");
        let now = self.uptime();
        let child = procs.alloc(now)?;

        match self.spawn_attach(child, parent, name, image) {
            Ok(pid) => Ok(pid),
            Err(e) => {
                procs.free_embryo(child);
                Err(e)
            }
        }
    }

    fn spawn_attach(
        &self,
        child: SlotId,
        parent: SlotId,
        name: &str,
        image: Box<dyn Program>,
    ) -> Result<Pid> {
        let kstack = self.kmem().lock().alloc().ok_or(KernelError::OutOfPages)?;
        let kstack = scopeguard::guard(kstack, |page| self.kmem().lock().free(page));
        let memory = {
            let mut kmem = self.kmem().lock();
            UserMemory::new(&mut kmem)
        }
        .ok_or(KernelError::OutOfPages)?;

        // SAFETY: an embryo's data is private to its creator.
        let data = unsafe { &mut *self.procs().data_ptr(child) };
        data.image = Some(image);
        data.frame = TrapFrame::default();
        data.pending = None;
        data.name = short_name(name);
        data.cwd = Some(RcInode::root());
        attach_console(data);
        data.kstack = Some(scopeguard::ScopeGuard::into_inner(kstack));
        data.memory = Some(memory);

        let mut pool = self.procs().pool();
        let info = pool.slot_mut(child);
        info.parent = Some(parent);
        info.state = ProcState::Runnable;
        Ok(info.pid)
    }

    /// Creates a new process copying the caller. The child re-enters
    /// user space with 0 in its return register; the parent gets the
    /// child's pid.
    pub(crate) fn fork(&self, ctx: &KernelCtx<'_>) -> Result<Pid> {
        let procs = self.procs();
        let now = self.uptime();
        let child = procs.alloc(now)?;

        match self.fork_attach(ctx, child) {
            Ok(pid) => Ok(pid),
            Err(e) => {
                procs.free_embryo(child);
                Err(e)
            }
        }
    }

    fn fork_attach(&self, ctx: &KernelCtx<'_>, child: SlotId) -> Result<Pid> {
        // Allocate kernel stack; freed again if the address-space copy
        // fails below.
        let kstack = self.kmem().lock().alloc().ok_or(KernelError::OutOfPages)?;
        let kstack = scopeguard::guard(kstack, |page| self.kmem().lock().free(page));

        // SAFETY: the caller runs its own slot; `child` is an embryo
        // reachable only from here.
        let pdata = unsafe { ctx.data() };
        let cdata = unsafe { &mut *self.procs().data_ptr(child) };

        // Copy user memory from parent to child.
        let memory = {
            let mut kmem = self.kmem().lock();
            pdata
                .memory
                .as_ref()
                .expect("fork: no memory")
                .duplicate(&mut kmem)
        }
        .ok_or(KernelError::OutOfPages)?;

        cdata.image = Some(pdata.image.as_ref().expect("fork: no image").duplicate());

        // Copy saved user registers, then clear a0 so that fork returns
        // 0 in the child.
        cdata.frame = pdata.frame;
        cdata.frame.a0 = 0;

        // Increment reference counts on open file descriptors.
        for (nf, f) in izip!(cdata.open_files.iter_mut(), pdata.open_files.iter()) {
            if let Some(file) = f {
                *nf = Some(file.clone());
            }
        }
        cdata.cwd = pdata.cwd.clone();
        cdata.name = pdata.name;
        cdata.pending = None;
        cdata.kstack = Some(scopeguard::ScopeGuard::into_inner(kstack));
        cdata.memory = Some(memory);

        let mut pool = self.procs().pool();
        let info = pool.slot_mut(child);
        info.parent = Some(ctx.slot());
        info.state = ProcState::Runnable;
        Ok(info.pid)
    }

    /// Exits the current process. The slot stays a zombie until the
    /// parent reaps it; the pages it holds are not released here.
    ///
    /// On real hardware this never returns; here it returns to the
    /// dispatcher, which drops the process on the floor the same way.
    pub(crate) fn exit_current(&self, ctx: &KernelCtx<'_>) {
        let procs = self.procs();
        let me = ctx.slot();
        let pid = ctx.pid();
        assert!(procs.pool().initial != Some(me), "init exiting");

        // Close all open files, outside the table lock.
        // SAFETY: we are the slot's runner.
        let data = unsafe { ctx.data_mut() };
        for file in data.open_files.iter_mut() {
            if let Some(file) = file.take() {
                log::trace!("pid {} closed {}", pid, file.name());
            }
        }
        data.cwd = None;

        let mut pool = procs.pool();

        // Parent might be sleeping in wait().
        let parent = pool.slot(me).parent.expect("exit: no parent");
        pool.wakeup1(Channel::Proc(parent));

        // Pass abandoned children to init.
        let init = pool.initial.expect("exit: no init");
        for id in Pool::ids() {
            if pool.slot(id).parent == Some(me) {
                pool.slot_mut(id).parent = Some(init);
                if pool.slot(id).state == ProcState::Zombie {
                    pool.wakeup1(Channel::Proc(init));
                }
            }
        }

        // Into the scheduler, never to run again.
        pool.slot_mut(me).state = ProcState::Zombie;
        self.sched_return(&mut pool, ctx.cpu_id(), me);
        drop(pool);
        log::debug!("pid {} exited", pid);
    }

    /// Scans for an exited child; reaps one if found, fails if there is
    /// nothing to wait for, or puts the caller to sleep on its own
    /// slot's channel — with the table lock as the sleep lock — until
    /// some child's exit wakes it.
    pub(crate) fn wait(&self, ctx: &KernelCtx<'_>) -> Result<WaitOutcome> {
        let procs = self.procs();
        let me = ctx.slot();
        let mut pool = procs.pool();

        let mut havekids = false;
        for id in Pool::ids() {
            if pool.slot(id).parent != Some(me) {
                continue;
            }
            havekids = true;
            if pool.slot(id).state != ProcState::Zombie {
                continue;
            }

            // Found one. Release its pages and recycle the slot.
            let pid = pool.slot(id).pid;
            // SAFETY: a zombie has no runner; its reaper is the only
            // context touching its data.
            let cdata = unsafe { &mut *procs.data_ptr(id) };
            {
                let mut kmem = self.kmem().lock();
                if let Some(page) = cdata.kstack.take() {
                    kmem.free(page);
                }
                if let Some(memory) = cdata.memory.take() {
                    memory.free(&mut kmem);
                }
            }
            cdata.image = None;
            cdata.pending = None;
            cdata.name.clear();
            cdata.frame = TrapFrame::default();
            for file in cdata.open_files.iter_mut() {
                let _ = file.take();
            }
            cdata.cwd = None;
            procs.killed_flag(id).store(false, Ordering::Release);
            *pool.slot_mut(id) = ProcInfo::unused();
            return Ok(WaitOutcome::Reaped(pid));
        }

        // No point waiting if we don't have any children.
        if !havekids {
            return Err(KernelError::NoChildren);
        }
        if ctx.killed() {
            return Err(KernelError::Killed);
        }

        let info = pool.slot_mut(me);
        info.state = ProcState::Sleeping {
            chan: Channel::Proc(me),
        };
        self.sched_return(&mut pool, ctx.cpu_id(), me);
        Ok(WaitOutcome::Sleep)
    }

    /// Kills the process with the given pid. The victim exits at its
    /// next return to user space; a sleeping victim is made runnable so
    /// its sleep returns.
    pub fn kill(&self, pid: Pid) -> Result<()> {
        let procs = self.procs();
        let mut pool = procs.pool();
        let slot = pool.find_by_pid(pid).ok_or(KernelError::NotFound)?;
        procs.killed_flag(slot).store(true, Ordering::Release);
        let info = pool.slot_mut(slot);
        if info.state.is_sleeping() {
            info.state = ProcState::Runnable;
        }
        log::debug!("kill pid {}", pid);
        Ok(())
    }

    /// Returns the caller's parent pid, skipping any tracer-parent
    /// intermediaries.
    pub(crate) fn parent_pid(&self, ctx: &KernelCtx<'_>) -> Result<Pid> {
        let procs = self.procs();
        let pool = procs.pool();
        let mut p = pool.slot(ctx.slot()).parent.ok_or(KernelError::NotFound)?;
        let mut hops = 0;
        while pool.slot(p).is_tracer {
            p = pool.slot(p).tracer_parent.ok_or(KernelError::NotFound)?;
            hops += 1;
            if hops > NPROC {
                return Err(KernelError::NotFound);
            }
        }
        Ok(pool.slot(p).pid)
    }

    /// Marks `pid` as a tracer intermediary whose real parent is
    /// `parent_pid`; parent-pid lookup skips over it.
    pub fn mark_tracer(&self, pid: Pid, parent_pid: Pid) -> Result<()> {
        let mut pool = self.procs().pool();
        let slot = pool.find_by_pid(pid).ok_or(KernelError::NotFound)?;
        let parent = pool.find_by_pid(parent_pid).ok_or(KernelError::NotFound)?;
        let info = pool.slot_mut(slot);
        info.is_tracer = true;
        info.tracer_parent = Some(parent);
        Ok(())
    }

    /// Reassigns a process's queue level directly.
    pub fn change_queue(&self, pid: Pid, queue: i32) -> Result<()> {
        let level = QueueLevel::from_raw(queue).ok_or(KernelError::BadArg)?;
        let mut pool = self.procs().pool();
        let slot = pool.find_by_pid(pid).ok_or(KernelError::NotFound)?;
        pool.slot_mut(slot).queue_lvl = level;
        Ok(())
    }

    /// Sets a process's lottery ticket interval (inclusive both ends).
    pub fn set_ticket(&self, pid: Pid, first: i32, last: i32) -> Result<Pid> {
        let mut pool = self.procs().pool();
        let slot = pool.find_by_pid(pid).ok_or(KernelError::NotFound)?;
        let info = pool.slot_mut(slot);
        info.first_tick = first;
        info.last_tick = last;
        Ok(pid)
    }

    /// Sets the Best-Job-First weights of every process present.
    pub fn set_bjf(&self, priority_ratio: i32, arrival_ratio: i32, exec_cycle_ratio: i32) {
        let mut pool = self.procs().pool();
        for id in Pool::ids() {
            if pool.slot(id).pid == 0 {
                continue;
            }
            let info = pool.slot_mut(id);
            info.priority_ratio = priority_ratio as i64;
            info.arrival_ratio = arrival_ratio as i64;
            info.exec_cycle_ratio = exec_cycle_ratio as i64;
        }
    }

    /// Sets one process's Best-Job-First weights.
    pub fn set_bjf_process(
        &self,
        pid: Pid,
        priority_ratio: i32,
        arrival_ratio: i32,
        exec_cycle_ratio: i32,
    ) -> Result<()> {
        let mut pool = self.procs().pool();
        let slot = pool.find_by_pid(pid).ok_or(KernelError::NotFound)?;
        let info = pool.slot_mut(slot);
        info.priority_ratio = priority_ratio as i64;
        info.arrival_ratio = arrival_ratio as i64;
        info.exec_cycle_ratio = exec_cycle_ratio as i64;
        Ok(())
    }

    /// Prints a process listing to the console: one header line, then
    /// one line per used slot.
    pub fn print_processes(&self) {
        let procs = self.procs();
        let pool = procs.pool();
        let mut printer = self.printer().lock();
        printer.line(format_args!(
            "name pid state queue ctime ratios rank cycles tickets"
        ));
        for id in Pool::ids() {
            let info = pool.slot(id);
            if info.pid == 0 {
                continue;
            }
            // SAFETY: names are written only at creation and reap; a
            // read here can at worst see a stale name, which is fine
            // for a console listing.
            let name = unsafe { &(*procs.data_ptr(id)).name };
            let span = info.last_tick - info.first_tick;
            printer.line(format_args!(
                "{} {} {} {} {} {}/{}/{} {} {} {}",
                name,
                info.pid,
                info.state.as_str(),
                info.queue_lvl.as_raw(),
                info.creation_time,
                info.arrival_ratio,
                info.priority_ratio,
                info.exec_cycle_ratio,
                info.rank(),
                info.exec_cycle,
                span,
            ));
        }
    }

    /// Snapshot of one process, or `None` for an unknown pid.
    pub fn process_status(&self, pid: Pid) -> Option<ProcStatus> {
        let procs = self.procs();
        let pool = procs.pool();
        let slot = pool.find_by_pid(pid)?;
        Some(snapshot(procs, &pool, slot))
    }

    /// Snapshots of every used slot.
    pub fn processes(&self) -> Vec<ProcStatus> {
        let procs = self.procs();
        let pool = procs.pool();
        Pool::ids()
            .filter(|&id| pool.slot(id).pid != 0)
            .map(|id| snapshot(procs, &pool, id))
            .collect()
    }
}

fn snapshot(procs: &Procs, pool: &Pool, id: SlotId) -> ProcStatus {
    let info = pool.slot(id);
    // SAFETY: see `print_processes`.
    let name = unsafe { String::from((*procs.data_ptr(id)).name.as_str()) };
    ProcStatus {
        pid: info.pid,
        name,
        state: info.state,
        queue_lvl: info.queue_lvl,
        parent: info.parent.map(|p| pool.slot(p).pid),
        creation_time: info.creation_time,
        waiting_in_queue_cycle: info.waiting_in_queue_cycle,
        exec_cycle: info.exec_cycle,
        first_tick: info.first_tick,
        last_tick: info.last_tick,
        rank: info.rank(),
    }
}
