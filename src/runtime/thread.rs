/*
 * Thread Control Blocks
 *
 * This module defines the Thread structure and related types for the
 * cooperative scheduler. A thread is always in exactly one place: running
 * (the single active thread), the runnable tree, the sleep queue, the join
 * queue, a mutex/monitor waiter queue, the zombie set or the dead set.
 */

use core::fmt;

use super::context::Context;

/// Thread identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub usize);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thread({})", self.0)
    }
}

/// Thread state
///
/// Mirrors the container the thread currently lives in. `Running` is the
/// single active thread; `Runnable` threads sit in the vruntime tree;
/// `Blocked` covers mutex and monitor waiter queues. `Zombie` threads have
/// exited with an uncollected return value, `Dead` ones have been joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Runnable,
    Sleeping,
    Joining,
    Blocked,
    Zombie,
    Dead,
}

/// Thread structure
///
/// Holds the backing execution context and the scheduling counters. All four
/// monotonic counters are signed 64-bit; `vruntime` is additionally bounded
/// by the 32-bit overflow guard in the tick dispatcher, which renormalizes
/// every live thread when the active one approaches the trigger.
pub struct Thread {
    pub id: ThreadId,
    pub state: ThreadState,

    /// Saved execution context, switched to when the thread is dispatched
    pub context: Context,

    /// Static priority in [1, 10]; larger means faster vruntime growth
    pub priority: i64,
    /// Nice adjustment in [0, 10], added to priority per tick
    pub nice: i64,

    // Scheduling counters, all in ticks
    pub vruntime: i64,
    pub runtime: i64,
    pub waittime: i64,
    pub sleeptime: i64,

    /// Tick at which a sleeping thread becomes runnable (0 when not sleeping)
    pub wake_time: u64,

    /// Thread this one is waiting to join, if any
    pub join_tid: Option<ThreadId>,
    /// Exit value deposited by a joined thread, or this thread's own exit
    /// value while it is a zombie
    pub join_ret: Option<i64>,

    /// Tick at which the thread last blocked on a mutex or monitor
    pub block_start: u64,
}

impl Thread {
    pub fn new(id: ThreadId, context: Context, priority: i64) -> Self {
        Self {
            id,
            state: ThreadState::Runnable,
            context,
            priority,
            nice: 0,
            vruntime: 0,
            runtime: 0,
            waittime: 0,
            sleeptime: 0,
            wake_time: 0,
            join_tid: None,
            join_ret: None,
            block_start: 0,
        }
    }

    /// Effective scheduling weight: the per-tick vruntime increment.
    pub fn weight(&self) -> i64 {
        self.priority + self.nice
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("priority", &self.priority)
            .field("nice", &self.nice)
            .field("vruntime", &self.vruntime)
            .finish()
    }
}

/// Thread statistics for display
#[derive(Debug, Clone)]
pub struct ThreadStats {
    pub id: ThreadId,
    pub state: ThreadState,
    pub priority: i64,
    pub nice: i64,
    pub vruntime: i64,
    pub runtime: i64,
    pub waittime: i64,
    pub sleeptime: i64,
}

impl ThreadStats {
    pub fn of(thread: &Thread) -> Self {
        Self {
            id: thread.id,
            state: thread.state,
            priority: thread.priority,
            nice: thread.nice,
            vruntime: thread.vruntime,
            runtime: thread.runtime,
            waittime: thread.waittime,
            sleeptime: thread.sleeptime,
        }
    }
}

impl fmt::Display for ThreadStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id: {} state: {:?} priority: {} nice: {} vruntime: {} runtime: {} waittime: {} sleeptime: {}",
            self.id.0,
            self.state,
            self.priority,
            self.nice,
            self.vruntime,
            self.runtime,
            self.waittime,
            self.sleeptime
        )
    }
}
