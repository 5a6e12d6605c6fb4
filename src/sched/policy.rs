//! The three selection policies.
//!
//! Each policy is a pure choice over the table, called with the table
//! lock held, and only ever considers runnable slots in its own queue.
//! The scheduler composes them in a fixed priority list, so adding a
//! fourth discipline is a local change.

use super::rng::Lfsr;
use crate::param::{LFSR_SEED, LOTTERY_MOD};
use crate::proc::{Pool, ProcState, QueueLevel, SlotId};

pub(crate) trait SchedPolicy {
    fn queue(&self) -> QueueLevel;

    /// Picks one runnable slot from this policy's queue, or `None`.
    fn select(&self, pool: &mut Pool, now: u64) -> Option<SlotId>;
}

fn in_queue(pool: &Pool, id: SlotId, queue: QueueLevel) -> bool {
    let info = pool.slot(id);
    info.state == ProcState::Runnable && info.queue_lvl == queue
}

/// Picks the slot that has waited longest since its last dispatch; ties
/// go to scan order. The winner's timestamp is refreshed on the spot.
pub(crate) struct RoundRobin;

impl SchedPolicy for RoundRobin {
    fn queue(&self) -> QueueLevel {
        QueueLevel::RoundRobin
    }

    fn select(&self, pool: &mut Pool, now: u64) -> Option<SlotId> {
        let mut chosen: Option<(u64, SlotId)> = None;
        for id in Pool::ids() {
            if !in_queue(pool, id, QueueLevel::RoundRobin) {
                continue;
            }
            let waited = now.saturating_sub(pool.slot(id).last_cpu_time);
            match chosen {
                Some((best, _)) if waited <= best => {}
                _ => chosen = Some((waited, id)),
            }
        }
        let (_, id) = chosen?;
        pool.slot_mut(id).last_cpu_time = now;
        Some(id)
    }
}

/// Draws one ticket per scheduling round and hands the quantum to the
/// first runnable slot whose interval holds the ticket. Nobody holding
/// the ticket means nobody runs from this queue.
pub(crate) struct Lottery {
    rng: Lfsr,
}

impl Lottery {
    pub(crate) const fn new() -> Self {
        Self {
            rng: Lfsr::new(LFSR_SEED),
        }
    }

    fn pick_by_ticket(pool: &Pool, ticket: i32) -> Option<SlotId> {
        Pool::ids().find(|&id| {
            if !in_queue(pool, id, QueueLevel::Lottery) {
                return false;
            }
            let info = pool.slot(id);
            ticket >= info.first_tick && ticket <= info.last_tick
        })
    }
}

impl SchedPolicy for Lottery {
    fn queue(&self) -> QueueLevel {
        QueueLevel::Lottery
    }

    fn select(&self, pool: &mut Pool, _now: u64) -> Option<SlotId> {
        let ticket = (self.rng.next() % LOTTERY_MOD) as i32;
        Self::pick_by_ticket(pool, ticket)
    }
}

/// Best-Job-First: minimal weighted rank wins, ties to scan order.
pub(crate) struct Bjf;

impl SchedPolicy for Bjf {
    fn queue(&self) -> QueueLevel {
        QueueLevel::Bjf
    }

    fn select(&self, pool: &mut Pool, _now: u64) -> Option<SlotId> {
        let mut chosen: Option<(i64, SlotId)> = None;
        for id in Pool::ids() {
            if !in_queue(pool, id, QueueLevel::Bjf) {
                continue;
            }
            let rank = pool.slot(id).rank();
            match chosen {
                Some((best, _)) if rank >= best => {}
                _ => chosen = Some((rank, id)),
            }
        }
        chosen.map(|(_, id)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::Procs;

    fn make_runnable(pool: &mut Pool, id: SlotId, pid: i32, queue: QueueLevel) {
        let info = pool.slot_mut(id);
        info.state = ProcState::Runnable;
        info.pid = pid;
        info.queue_lvl = queue;
    }

    #[test]
    fn round_robin_prefers_the_stalest() {
        let procs = Procs::new();
        let mut pool = procs.pool();
        let a = SlotId(0);
        let b = SlotId(1);
        make_runnable(&mut pool, a, 1, QueueLevel::RoundRobin);
        make_runnable(&mut pool, b, 2, QueueLevel::RoundRobin);
        pool.slot_mut(a).last_cpu_time = 90;
        pool.slot_mut(b).last_cpu_time = 50;

        assert_eq!(RoundRobin.select(&mut pool, 100), Some(b));
        // The winner was stamped with `now`, so the other is next.
        assert_eq!(pool.slot(b).last_cpu_time, 100);
        assert_eq!(RoundRobin.select(&mut pool, 100), Some(a));
    }

    #[test]
    fn round_robin_breaks_ties_by_scan_order() {
        let procs = Procs::new();
        let mut pool = procs.pool();
        make_runnable(&mut pool, SlotId(2), 1, QueueLevel::RoundRobin);
        make_runnable(&mut pool, SlotId(5), 2, QueueLevel::RoundRobin);
        assert_eq!(RoundRobin.select(&mut pool, 10), Some(SlotId(2)));
    }

    #[test]
    fn round_robin_ignores_other_queues_and_sleepers() {
        let procs = Procs::new();
        let mut pool = procs.pool();
        make_runnable(&mut pool, SlotId(0), 1, QueueLevel::Lottery);
        make_runnable(&mut pool, SlotId(1), 2, QueueLevel::RoundRobin);
        pool.slot_mut(SlotId(1)).state = ProcState::Zombie;
        assert_eq!(RoundRobin.select(&mut pool, 10), None);
    }

    #[test]
    fn lottery_matches_inclusive_interval() {
        let procs = Procs::new();
        let mut pool = procs.pool();
        let a = SlotId(0);
        let b = SlotId(1);
        make_runnable(&mut pool, a, 1, QueueLevel::Lottery);
        make_runnable(&mut pool, b, 2, QueueLevel::Lottery);
        pool.slot_mut(a).first_tick = 0;
        pool.slot_mut(a).last_tick = 99;
        pool.slot_mut(b).first_tick = 100;
        pool.slot_mut(b).last_tick = 199;

        // Ticket 0 matches an interval that starts at 0.
        assert_eq!(Lottery::pick_by_ticket(&pool, 0), Some(a));
        assert_eq!(Lottery::pick_by_ticket(&pool, 99), Some(a));
        assert_eq!(Lottery::pick_by_ticket(&pool, 100), Some(b));
        assert_eq!(Lottery::pick_by_ticket(&pool, 199), Some(b));
    }

    #[test]
    fn lottery_with_no_holder_returns_none() {
        let procs = Procs::new();
        let mut pool = procs.pool();
        let a = SlotId(0);
        make_runnable(&mut pool, a, 1, QueueLevel::Lottery);
        pool.slot_mut(a).first_tick = 10;
        pool.slot_mut(a).last_tick = 20;
        assert_eq!(Lottery::pick_by_ticket(&pool, 21), None);
    }

    #[test]
    fn bjf_picks_minimal_rank() {
        let procs = Procs::new();
        let mut pool = procs.pool();
        let a = SlotId(0);
        let b = SlotId(1);
        make_runnable(&mut pool, a, 1, QueueLevel::Bjf);
        make_runnable(&mut pool, b, 2, QueueLevel::Bjf);
        for &id in &[a, b] {
            let info = pool.slot_mut(id);
            info.priority_ratio = 10;
            info.arrival_ratio = 0;
            info.exec_cycle_ratio = 0;
        }
        pool.slot_mut(a).priority = 7;
        pool.slot_mut(b).priority = 3;
        assert_eq!(Bjf.select(&mut pool, 0), Some(b));
        // Equal ranks fall back to scan order.
        pool.slot_mut(a).priority = 3;
        assert_eq!(Bjf.select(&mut pool, 0), Some(a));
    }

    #[test]
    fn rank_uses_integer_division_by_ten() {
        let procs = Procs::new();
        let mut pool = procs.pool();
        let a = SlotId(0);
        make_runnable(&mut pool, a, 1, QueueLevel::Bjf);
        let info = pool.slot_mut(a);
        info.priority = 3;
        info.priority_ratio = 5;
        info.arrival = 2;
        info.arrival_ratio = 2;
        info.exec_cycle = 0;
        info.exec_cycle_ratio = 9;
        // (3*5 + 2*2 + 0*9) / 10 = 19 / 10 = 1.
        assert_eq!(info.rank(), 1);
    }
}
