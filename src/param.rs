//! Tunable kernel constants.

use static_assertions::const_assert;

/// Maximum number of processes.
pub const NPROC: usize = 64;

/// Maximum number of CPUs.
pub const NCPU: usize = 8;

/// Open files per process.
pub const NOFILE: usize = 16;

/// Number of globally indexed semaphores.
pub const NSEM: usize = 6;

/// Pages in the physical page pool. Each live process holds one page of
/// kernel stack and one page of user image, so the pool must cover a
/// full process table.
pub const NPAGE: usize = 256;

/// Maximum length of process name.
pub const MAXPROCNAME: usize = 16;

/// A runnable process skipped this many times in a row is promoted to
/// the next higher queue. The threshold is strict: promotion happens at
/// 8001, not at 8000.
pub const AGE_THRESHOLD: u64 = 8000;

/// Lottery tickets are drawn modulo this value.
pub const LOTTERY_MOD: u16 = 200;

/// Seed of the 16-bit lottery LFSR.
pub const LFSR_SEED: u16 = 0xACE1;

const_assert!(NPROC >= 2);
const_assert!(NPAGE >= 2 * NPROC);
const_assert!(NCPU >= 1);
const_assert!(NSEM >= 1);
