//! The kernel object.

use alloc::boxed::Box;
use array_macro::array;
use core::fmt;

use crate::console::Printer;
use crate::cpu::Cpus;
use crate::kalloc::Kmem;
use crate::lock::{SleepableLock, SpinLock};
use crate::param::{NPAGE, NSEM};
use crate::proc::{Channel, Procs};
use crate::sched::Scheduler;
use crate::sem::Semaphore;

/// Everything the scheduler, the process table, and the semaphores
/// share. There is no global kernel — callers own one and pass it by
/// reference into every entry point.
pub struct Kernel {
    /// The clock, in timer ticks. Bounded sleeps wait on its channel.
    ticks: SleepableLock<u64>,

    printer: SpinLock<Printer>,

    /// The page pool backing kernel stacks and user images.
    kmem: SpinLock<Kmem>,

    /// Current process system.
    procs: Procs,

    cpus: Cpus,

    sems: [SleepableLock<Semaphore>; NSEM],

    sched: Scheduler,
}

impl Kernel {
    pub fn new() -> Self {
        Self {
            ticks: SleepableLock::new("time", Channel::Ticks, 0),
            printer: SpinLock::new("console", Printer::new()),
            kmem: SpinLock::new("kmem", Kmem::new(NPAGE)),
            procs: Procs::new(),
            cpus: Cpus::new(),
            sems: array![i => SleepableLock::new("sem", Channel::Sem(i), Semaphore::new()); NSEM],
            sched: Scheduler::new(),
        }
    }

    pub(crate) fn procs(&self) -> &Procs {
        &self.procs
    }

    pub(crate) fn cpus(&self) -> &Cpus {
        &self.cpus
    }

    pub(crate) fn kmem(&self) -> &SpinLock<Kmem> {
        &self.kmem
    }

    pub(crate) fn printer(&self) -> &SpinLock<Printer> {
        &self.printer
    }

    pub(crate) fn sems(&self) -> &[SleepableLock<Semaphore>; NSEM] {
        &self.sems
    }

    pub(crate) fn sched(&self) -> &Scheduler {
        &self.sched
    }

    pub(crate) fn ticks(&self) -> &SleepableLock<u64> {
        &self.ticks
    }

    /// Advances the clock one timer tick and wakes bounded sleepers so
    /// they can recheck their deadlines.
    pub fn tick(&self) {
        let mut ticks = self.ticks.lock();
        *ticks += 1;
        ticks.wakeup(&self.procs);
    }

    /// Ticks since boot.
    pub fn uptime(&self) -> u64 {
        *self.ticks.lock()
    }

    /// Installs the console sink; until one is installed, console
    /// output is dropped.
    pub fn set_console(&self, sink: Box<dyn fmt::Write + Send>) {
        self.printer.lock().set_sink(sink);
    }

    pub(crate) fn console_print(&self, line: &str) {
        self.printer.lock().line(format_args!("{}", line));
    }

    /// Pages left in the pool.
    pub fn free_pages(&self) -> usize {
        self.kmem.lock().free_pages()
    }

    /// Completed returns into the scheduler since boot.
    pub fn context_switches(&self) -> u64 {
        self.procs.pool().nswitch
    }

    /// Drives one CPU for `steps` timer ticks, scheduling after each
    /// tick. Returns how many of those rounds dispatched a process.
    pub fn run(&self, cpu_id: usize, steps: u64) -> u64 {
        let mut dispatched = 0;
        for _ in 0..steps {
            self.tick();
            if self.scheduler_step(cpu_id).is_some() {
                dispatched += 1;
            }
        }
        dispatched
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}
