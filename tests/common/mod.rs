//! Shared fixtures: a capturable console, canned user programs, and a
//! single-CPU driver loop.

#![allow(dead_code)]

use std::fmt;
use std::sync::{Arc, Mutex};

use mlq_kernel::{Kernel, Program, Syscall, TrapFrame};

/// A console sink the test can read back.
pub struct SharedConsole(Arc<Mutex<String>>);

impl fmt::Write for SharedConsole {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.lock().unwrap().push_str(s);
        Ok(())
    }
}

/// Installs a capturable console and returns the capture handle.
pub fn capture_console(kernel: &Kernel) -> Arc<Mutex<String>> {
    let buf = Arc::new(Mutex::new(String::new()));
    kernel.set_console(Box::new(SharedConsole(buf.clone())));
    buf
}

pub fn console_contains(buf: &Arc<Mutex<String>>, needle: &str) -> bool {
    buf.lock().unwrap().contains(needle)
}

/// A kernel with an init that reaps children forever.
pub fn boot() -> Kernel {
    let kernel = Kernel::new();
    kernel.user_init(Box::new(InitLoop));
    kernel
}

/// Drives cpu 0, one tick then one scheduler round per iteration, until
/// `pred` holds or `max` rounds pass. Returns whether `pred` held.
pub fn drive_until(kernel: &Kernel, max: u64, pred: impl Fn(&Kernel) -> bool) -> bool {
    for _ in 0..max {
        if pred(kernel) {
            return true;
        }
        kernel.tick();
        kernel.scheduler_step(0);
    }
    pred(kernel)
}

pub fn init_asleep(kernel: &Kernel) -> bool {
    kernel
        .process_status(1)
        .is_some_and(|s| s.state.is_sleeping())
}

/// Runs until init has blocked in wait, so the round-robin queue is
/// clear for whatever the test stages next.
pub fn settle(kernel: &Kernel) {
    assert!(drive_until(kernel, 64, init_asleep), "init never settled");
}

/// Init: reap forever.
#[derive(Clone)]
pub struct InitLoop;

impl Program for InitLoop {
    fn step(&mut self, _frame: &mut TrapFrame) -> Syscall {
        Syscall::Wait
    }

    fn duplicate(&self) -> Box<dyn Program> {
        Box::new(self.clone())
    }
}

/// Burns quanta without ever blocking or exiting.
#[derive(Clone)]
pub struct Spinner;

impl Program for Spinner {
    fn step(&mut self, _frame: &mut TrapFrame) -> Syscall {
        Syscall::Yield
    }

    fn duplicate(&self) -> Box<dyn Program> {
        Box::new(self.clone())
    }
}

/// Issues a fixed list of calls in order, then exits.
#[derive(Clone)]
pub struct Script {
    calls: Vec<Syscall>,
    pc: usize,
}

impl Script {
    pub fn new(calls: Vec<Syscall>) -> Self {
        Self { calls, pc: 0 }
    }
}

impl Program for Script {
    fn step(&mut self, _frame: &mut TrapFrame) -> Syscall {
        let call = self.calls.get(self.pc).cloned().unwrap_or(Syscall::Exit);
        self.pc += 1;
        call
    }

    fn duplicate(&self) -> Box<dyn Program> {
        Box::new(self.clone())
    }
}

/// Only init is left alive.
pub fn only_init_left(kernel: &Kernel) -> bool {
    let procs = kernel.processes();
    procs.len() == 1 && procs[0].pid == 1
}
