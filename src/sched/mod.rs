//! The per-CPU scheduler.
//!
//! Each CPU loops: consult the policies strictly in priority order —
//! round-robin, then lottery, then Best-Job-First — run the aging pass,
//! dispatch the winner, and take the CPU back when the process returns
//! it through `sched`. The whole decision happens under the table lock;
//! the lock is handed over across the dispatch the same way the
//! classical design hands it across the context switch.

mod policy;
mod rng;

use crate::kernel::Kernel;
use crate::lock::SpinLockGuard;
use crate::param::AGE_THRESHOLD;
use crate::proc::{KernelCtx, Pid, Pool, ProcData, ProcState, QueueLevel, SlotId};
use crate::syscall::Outcome;
use policy::{Bjf, Lottery, RoundRobin, SchedPolicy};

pub(crate) struct Scheduler {
    round_robin: RoundRobin,
    lottery: Lottery,
    bjf: Bjf,
}

impl Scheduler {
    pub(crate) const fn new() -> Self {
        Self {
            round_robin: RoundRobin,
            lottery: Lottery::new(),
            bjf: Bjf,
        }
    }

    /// The fixed priority list. The first policy with a candidate wins.
    fn policies(&self) -> [&dyn SchedPolicy; 3] {
        [&self.round_robin, &self.lottery, &self.bjf]
    }

    pub(crate) fn pick(&self, pool: &mut Pool, now: u64) -> Option<SlotId> {
        for policy in self.policies() {
            if let Some(slot) = policy.select(pool, now) {
                log::trace!("{:?} queue served", policy.queue());
                return Some(slot);
            }
        }
        None
    }
}

/// Promotes runnable processes that have been passed over more than
/// [`AGE_THRESHOLD`] rounds in a row: lottery to round-robin, BJF to
/// lottery. Round-robin is terminal. The counter resets whenever the
/// threshold is crossed, promoted or not.
pub(crate) fn age(pool: &mut Pool) {
    for id in Pool::ids() {
        let info = pool.slot_mut(id);
        if info.state != ProcState::Runnable {
            continue;
        }
        if info.waiting_in_queue_cycle > AGE_THRESHOLD {
            match info.queue_lvl {
                QueueLevel::Lottery => {
                    info.queue_lvl = QueueLevel::RoundRobin;
                    log::debug!("pid {} aged into round-robin", info.pid);
                }
                QueueLevel::Bjf => {
                    info.queue_lvl = QueueLevel::Lottery;
                    log::debug!("pid {} aged into lottery", info.pid);
                }
                QueueLevel::RoundRobin => {}
            }
            info.waiting_in_queue_cycle = 0;
        }
    }
}

impl Kernel {
    /// One iteration of a CPU's scheduler loop: pick a process, age the
    /// table, dispatch, and take the CPU back when the process returns
    /// it. `None` means no queue had a runnable process and the caller
    /// should simply try again.
    pub fn scheduler_step(&self, cpu_id: usize) -> Option<Pid> {
        let cpu = self.cpus().get(cpu_id);
        let now = self.uptime();

        let slot = {
            let mut pool = self.procs().pool();
            let slot = self.sched().pick(&mut pool, now)?;
            age(&mut pool);

            let info = pool.slot_mut(slot);
            info.state = ProcState::Running;
            info.waiting_in_queue_cycle = 0;
            let pid = info.pid;

            // Everyone we passed over just lost one more round.
            for other in Pool::ids() {
                if other == slot || pool.slot(other).pid == 0 {
                    continue;
                }
                pool.slot_mut(other).waiting_in_queue_cycle += 1;
            }

            cpu.set_proc(Some(slot));
            log::trace!("cpu{} dispatch pid {}", cpu_id, pid);
            slot
        };
        // The table lock drops here — released on the way into user
        // context, as the first act of a freshly dispatched process.

        let pid = self.run_current(cpu_id, slot);
        cpu.set_proc(None);
        Some(pid)
    }

    /// Runs the dispatched process for one quantum: resume the call it
    /// blocked in, or let the image take its next step.
    fn run_current(&self, cpu_id: usize, slot: SlotId) -> Pid {
        let ctx = KernelCtx::new(self, cpu_id, slot);
        let pid = ctx.pid();

        // SAFETY: this CPU is the slot's runner, and the borrow ends
        // before the syscall below takes its own.
        let call = {
            let data = unsafe { ctx.data_mut() };
            match data.pending.take() {
                Some(call) => call,
                None => {
                    let ProcData {
                        ref mut image,
                        ref mut frame,
                        ..
                    } = *data;
                    image.as_mut().expect("dispatch: no image").step(frame)
                }
            }
        };

        match ctx.syscall(call) {
            Outcome::Done(ret) => {
                // SAFETY: as above.
                unsafe { ctx.data_mut() }.frame.a0 = ret;
                if ctx.killed() {
                    // A killed process is destroyed on its way back to
                    // user space.
                    self.exit_current(&ctx);
                } else {
                    // End of quantum; back to the runnable crowd.
                    let mut pool = self.procs().pool();
                    let info = pool.slot_mut(slot);
                    info.state = ProcState::Runnable;
                    info.exec_cycle += 1;
                    self.sched_return(&mut pool, cpu_id, slot);
                }
            }
            Outcome::Blocked(call) => {
                // The process went to sleep inside the call; park the
                // call so the next dispatch re-executes it.
                // SAFETY: as above.
                unsafe { ctx.data_mut() }.pending = Some(call);
            }
            Outcome::Exited => {}
        }
        pid
    }

    /// The moment a process hands its CPU back to the scheduler. The
    /// caller must hold the table lock — and nothing else — and must
    /// already have moved the process out of `Running`.
    pub(crate) fn sched_return(
        &self,
        pool: &mut SpinLockGuard<'_, Pool>,
        cpu_id: usize,
        slot: SlotId,
    ) {
        assert_ne!(pool.slot(slot).state, ProcState::Running, "sched running");
        assert_eq!(
            self.cpus().get(cpu_id).current_proc(),
            Some(slot),
            "sched proc"
        );
        pool.nswitch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::Procs;

    fn runnable_waiting(pool: &mut Pool, id: SlotId, queue: QueueLevel, waited: u64) {
        let info = pool.slot_mut(id);
        info.state = ProcState::Runnable;
        info.pid = id.index() as i32 + 1;
        info.queue_lvl = queue;
        info.waiting_in_queue_cycle = waited;
    }

    #[test]
    fn aging_threshold_is_strict() {
        let procs = Procs::new();
        let mut pool = procs.pool();
        runnable_waiting(&mut pool, SlotId(0), QueueLevel::Bjf, AGE_THRESHOLD);
        runnable_waiting(&mut pool, SlotId(1), QueueLevel::Bjf, AGE_THRESHOLD + 1);

        age(&mut pool);

        // Exactly 8000 skips is not starvation yet; 8001 is.
        assert_eq!(pool.slot(SlotId(0)).queue_lvl, QueueLevel::Bjf);
        assert_eq!(pool.slot(SlotId(0)).waiting_in_queue_cycle, AGE_THRESHOLD);
        assert_eq!(pool.slot(SlotId(1)).queue_lvl, QueueLevel::Lottery);
        assert_eq!(pool.slot(SlotId(1)).waiting_in_queue_cycle, 0);
    }

    #[test]
    fn aging_promotes_one_tier_at_a_time() {
        let procs = Procs::new();
        let mut pool = procs.pool();
        runnable_waiting(&mut pool, SlotId(0), QueueLevel::Lottery, AGE_THRESHOLD + 1);
        age(&mut pool);
        assert_eq!(pool.slot(SlotId(0)).queue_lvl, QueueLevel::RoundRobin);

        // Round-robin is terminal: the counter resets, the queue stays.
        runnable_waiting(&mut pool, SlotId(0), QueueLevel::RoundRobin, AGE_THRESHOLD + 1);
        age(&mut pool);
        assert_eq!(pool.slot(SlotId(0)).queue_lvl, QueueLevel::RoundRobin);
        assert_eq!(pool.slot(SlotId(0)).waiting_in_queue_cycle, 0);
    }

    #[test]
    fn aging_ignores_sleepers() {
        let procs = Procs::new();
        let mut pool = procs.pool();
        runnable_waiting(&mut pool, SlotId(0), QueueLevel::Bjf, AGE_THRESHOLD + 100);
        pool.slot_mut(SlotId(0)).state = ProcState::Sleeping {
            chan: crate::proc::Channel::Ticks,
        };
        age(&mut pool);
        assert_eq!(pool.slot(SlotId(0)).queue_lvl, QueueLevel::Bjf);
    }
}
