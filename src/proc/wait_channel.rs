//! Wakeup channels.
//!
//! A channel pairs a sleeping process with the `wakeup` that will get it
//! moving again. Channels are stable identities — a slot index for
//! processes, a fixed index for semaphores — never transient addresses.

use super::{Pool, Procs, SlotId};
use crate::proc::ProcState;

/// An opaque identifier matching a `sleep` caller with a later `wakeup`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Channel {
    /// A process slot's own channel; `wait` sleeps here and `exit` wakes
    /// the parent through it.
    Proc(SlotId),
    /// A semaphore's channel.
    Sem(usize),
    /// The clock; bounded sleeps wait here for the next tick.
    Ticks,
}

impl Pool {
    /// Wakes every process sleeping on `chan`. The table lock must be
    /// held, which is guaranteed by going through a `Pool` borrow.
    ///
    /// A wakeup with no sleeper is a no-op, and a woken process must
    /// recheck its condition: spurious wakeups are part of the contract.
    pub(crate) fn wakeup1(&mut self, chan: Channel) {
        for id in Pool::ids() {
            let info = self.slot_mut(id);
            if info.state == (ProcState::Sleeping { chan }) {
                info.state = ProcState::Runnable;
            }
        }
    }
}

impl Procs {
    /// Wakes every process sleeping on `chan`.
    pub(crate) fn wakeup(&self, chan: Channel) {
        self.pool().wakeup1(chan);
    }
}
