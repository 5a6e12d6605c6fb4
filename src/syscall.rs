//! System calls.
//!
//! User programs issue calls as typed values; the classical numeric
//! table is kept alongside for the wire-level contract, with every
//! argument travelling through the ordinary decode path. A call that
//! must block comes back as `Outcome::Blocked` carrying the call to
//! re-execute at the next dispatch.

use alloc::string::String;

use crate::error::Result;
use crate::proc::{KernelCtx, Pid, WaitOutcome};
use crate::sem::{self, SemOutcome};

pub const SYS_FORK: i32 = 1;
pub const SYS_EXIT: i32 = 2;
pub const SYS_WAIT: i32 = 3;
pub const SYS_KILL: i32 = 6;
pub const SYS_GETPID: i32 = 11;
pub const SYS_SLEEP: i32 = 13;
pub const SYS_UPTIME: i32 = 14;
pub const SYS_LARGEST_PRIME_FACTOR: i32 = 22;
pub const SYS_GET_PARENT_PID: i32 = 23;
pub const SYS_PRINT_PROCESSES: i32 = 24;
pub const SYS_CHANGE_QUEUE: i32 = 25;
pub const SYS_SET_BJF_PROCESS: i32 = 26;
pub const SYS_SET_BJF: i32 = 27;
pub const SYS_SET_TICKET: i32 = 28;
pub const SYS_SEM_INIT: i32 = 29;
pub const SYS_SEM_ACQUIRE: i32 = 30;
pub const SYS_SEM_RELEASE: i32 = 31;

/// One system call, arguments included.
#[derive(Clone, Debug, PartialEq)]
pub enum Syscall {
    Fork,
    Exit,
    Wait,
    Kill(Pid),
    GetPid,
    GetParentPid,
    /// Bounded sleep for `n` ticks.
    Sleep(i64),
    Uptime,
    /// Give up the CPU for one scheduling round.
    Yield,
    /// Write one line to the console.
    Print(String),
    LargestPrimeFactor(i64),
    PrintProcesses,
    ChangeQueue {
        pid: Pid,
        queue: i32,
    },
    SetBjfProcess {
        pid: Pid,
        priority_ratio: i32,
        arrival_ratio: i32,
        exec_cycle_ratio: i32,
    },
    SetBjf {
        priority_ratio: i32,
        arrival_ratio: i32,
        exec_cycle_ratio: i32,
    },
    SetTicket {
        pid: Pid,
        first: i32,
        last: i32,
    },
    SemInit {
        index: i32,
        value: i32,
    },
    SemAcquire {
        index: i32,
    },
    SemRelease {
        index: i32,
    },
    /// Resumption point of a bounded sleep; produced by the kernel,
    /// never by a program.
    SleepUntil {
        end: u64,
    },
}

impl Syscall {
    /// Decodes a numbered call and its raw arguments. Unknown numbers
    /// decode to `None` and surface to the caller as `-1`.
    pub fn from_raw(num: i32, arg: [i64; 4]) -> Option<Self> {
        let call = match num {
            SYS_FORK => Syscall::Fork,
            SYS_EXIT => Syscall::Exit,
            SYS_WAIT => Syscall::Wait,
            SYS_KILL => Syscall::Kill(arg[0] as Pid),
            SYS_GETPID => Syscall::GetPid,
            SYS_SLEEP => Syscall::Sleep(arg[0]),
            SYS_UPTIME => Syscall::Uptime,
            SYS_LARGEST_PRIME_FACTOR => Syscall::LargestPrimeFactor(arg[0]),
            SYS_GET_PARENT_PID => Syscall::GetParentPid,
            SYS_PRINT_PROCESSES => Syscall::PrintProcesses,
            SYS_CHANGE_QUEUE => Syscall::ChangeQueue {
                pid: arg[0] as Pid,
                queue: arg[1] as i32,
            },
            SYS_SET_BJF_PROCESS => Syscall::SetBjfProcess {
                pid: arg[0] as Pid,
                priority_ratio: arg[1] as i32,
                arrival_ratio: arg[2] as i32,
                exec_cycle_ratio: arg[3] as i32,
            },
            SYS_SET_BJF => Syscall::SetBjf {
                priority_ratio: arg[0] as i32,
                arrival_ratio: arg[1] as i32,
                exec_cycle_ratio: arg[2] as i32,
            },
            SYS_SET_TICKET => Syscall::SetTicket {
                pid: arg[0] as Pid,
                first: arg[1] as i32,
                last: arg[2] as i32,
            },
            SYS_SEM_INIT => Syscall::SemInit {
                index: arg[0] as i32,
                value: arg[1] as i32,
            },
            SYS_SEM_ACQUIRE => Syscall::SemAcquire {
                index: arg[0] as i32,
            },
            SYS_SEM_RELEASE => Syscall::SemRelease {
                index: arg[0] as i32,
            },
            _ => return None,
        };
        Some(call)
    }
}

/// What executing a call did, from the dispatcher's point of view.
pub(crate) enum Outcome {
    /// The call completed with this return value.
    Done(i64),
    /// The process went to sleep inside the call; re-execute the
    /// carried call at next dispatch.
    Blocked(Syscall),
    /// The process is a zombie now.
    Exited,
}

fn done_pid(r: Result<Pid>) -> Outcome {
    Outcome::Done(r.map_or(-1, |pid| pid as i64))
}

fn done_zero(r: Result<()>) -> Outcome {
    Outcome::Done(r.map_or(-1, |_| 0))
}

impl KernelCtx<'_> {
    pub(crate) fn syscall(&self, call: Syscall) -> Outcome {
        let kernel = self.kernel();
        match call {
            Syscall::Fork => done_pid(kernel.fork(self)),
            Syscall::Exit => {
                kernel.exit_current(self);
                Outcome::Exited
            }
            Syscall::Wait => match kernel.wait(self) {
                Ok(WaitOutcome::Reaped(pid)) => Outcome::Done(pid as i64),
                Ok(WaitOutcome::Sleep) => Outcome::Blocked(Syscall::Wait),
                Err(_) => Outcome::Done(-1),
            },
            Syscall::Kill(pid) => done_zero(kernel.kill(pid)),
            Syscall::GetPid => Outcome::Done(self.pid() as i64),
            Syscall::GetParentPid => done_pid(kernel.parent_pid(self)),
            Syscall::Sleep(n) => {
                let end = kernel.uptime().saturating_add(n.max(0) as u64);
                self.sleep_until(end)
            }
            Syscall::SleepUntil { end } => self.sleep_until(end),
            Syscall::Uptime => Outcome::Done(kernel.uptime() as i64),
            Syscall::Yield => Outcome::Done(0),
            Syscall::Print(line) => {
                let len = line.len();
                kernel.console_print(&line);
                Outcome::Done(len as i64)
            }
            Syscall::LargestPrimeFactor(n) => Outcome::Done(largest_prime_factor(n)),
            Syscall::PrintProcesses => {
                kernel.print_processes();
                Outcome::Done(0)
            }
            Syscall::ChangeQueue { pid, queue } => done_zero(kernel.change_queue(pid, queue)),
            Syscall::SetBjfProcess {
                pid,
                priority_ratio,
                arrival_ratio,
                exec_cycle_ratio,
            } => done_zero(kernel.set_bjf_process(
                pid,
                priority_ratio,
                arrival_ratio,
                exec_cycle_ratio,
            )),
            Syscall::SetBjf {
                priority_ratio,
                arrival_ratio,
                exec_cycle_ratio,
            } => {
                kernel.set_bjf(priority_ratio, arrival_ratio, exec_cycle_ratio);
                Outcome::Done(0)
            }
            Syscall::SetTicket { pid, first, last } => {
                done_pid(kernel.set_ticket(pid, first, last))
            }
            Syscall::SemInit { index, value } => match sem::valid_index(index) {
                Some(i) => done_zero(kernel.sem_init(i, value as i64)),
                None => Outcome::Done(-1),
            },
            Syscall::SemAcquire { index } => match sem::valid_index(index) {
                Some(i) => match kernel.sem_acquire(self, i) {
                    Ok(SemOutcome::Acquired) => Outcome::Done(0),
                    Ok(SemOutcome::Blocked) => Outcome::Blocked(Syscall::SemAcquire { index }),
                    Err(_) => Outcome::Done(-1),
                },
                None => Outcome::Done(-1),
            },
            Syscall::SemRelease { index } => match sem::valid_index(index) {
                Some(i) => done_zero(kernel.sem_release(i)),
                None => Outcome::Done(-1),
            },
        }
    }

    /// The bounded sleep: wait on the ticks channel until the clock
    /// reaches `end`, giving up if killed. Re-entered once per wakeup.
    fn sleep_until(&self, end: u64) -> Outcome {
        let kernel = self.kernel();
        let mut ticks = kernel.ticks().lock();
        if *ticks >= end {
            return Outcome::Done(0);
        }
        if self.killed() {
            return Outcome::Done(-1);
        }
        ticks.sleep(self);
        Outcome::Blocked(Syscall::SleepUntil { end })
    }
}

/// The demo computation behind [`Syscall::LargestPrimeFactor`]: trial
/// division, factors of two peeled off first.
fn largest_prime_factor(mut n: i64) -> i64 {
    if n < 2 {
        return -1;
    }
    let mut max = -1;
    while n % 2 == 0 {
        max = 2;
        n /= 2;
    }
    let mut i = 3;
    while i * i <= n {
        while n % i == 0 {
            max = i;
            n /= i;
        }
        i += 2;
    }
    if n > 2 {
        max = n;
    }
    max
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prime_factors() {
        assert_eq!(largest_prime_factor(1), -1);
        assert_eq!(largest_prime_factor(2), 2);
        assert_eq!(largest_prime_factor(8), 2);
        assert_eq!(largest_prime_factor(13195), 29);
        assert_eq!(largest_prime_factor(97), 97);
        assert_eq!(largest_prime_factor(600_851_475_143), 6857);
        assert_eq!(largest_prime_factor(0), -1);
        assert_eq!(largest_prime_factor(-12), -1);
    }

    #[test]
    fn decodes_numbered_calls() {
        assert_eq!(Syscall::from_raw(SYS_FORK, [0; 4]), Some(Syscall::Fork));
        assert_eq!(
            Syscall::from_raw(SYS_KILL, [7, 0, 0, 0]),
            Some(Syscall::Kill(7))
        );
        assert_eq!(
            Syscall::from_raw(SYS_SET_TICKET, [4, 0, 99, 0]),
            Some(Syscall::SetTicket {
                pid: 4,
                first: 0,
                last: 99
            })
        );
        assert_eq!(
            Syscall::from_raw(SYS_SEM_INIT, [5, 1, 0, 0]),
            Some(Syscall::SemInit { index: 5, value: 1 })
        );
        // A bad syscall number decodes to nothing.
        assert_eq!(Syscall::from_raw(99, [0; 4]), None);
        assert_eq!(Syscall::from_raw(4, [0; 4]), None);
    }
}
