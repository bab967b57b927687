/*
 * fairthread - Cooperative Fair-Scheduling Thread Runtime
 *
 * A user-space thread package providing creation, exit, yield, sleep, join,
 * mutexes and monitors. Runnable threads are ordered by accumulated virtual
 * runtime in a red-black tree; a periodic timer tick drives accounting and
 * preemption. A fixed-size write-back block cache with clock-variant eviction
 * sits between callers and a block device, aged by a background sweeper
 * thread that is itself scheduled by the runtime.
 *
 * Key components:
 * - runtime: thread control blocks, the runnable tree, the tick dispatcher,
 *   sleep/join/zombie bookkeeping and the synchronization primitives
 * - cache: the block cache, the backing device abstraction and the sweeper
 * - utils: logging backend shared by both subsystems
 */

pub mod cache;
pub mod runtime;
pub mod utils;

#[cfg(test)]
mod tests;
