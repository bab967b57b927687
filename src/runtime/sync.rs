/*
 * Synchronization Primitives
 *
 * Mutexes and monitors built on the scheduler. Handles are slab indices
 * into the runtime, and all operations are free functions over the global
 * singleton.
 *
 * A mutex is an owner plus a FIFO waiter queue protected by its own tiny
 * spin guard. Unlock transfers ownership: the head waiter becomes the new
 * owner and is made runnable, so no thread can slip in between release and
 * acquisition.
 *
 * A monitor is a mutex plus a condition queue. wait parks the caller on the
 * condition queue and releases the mutex; signal moves the head of the
 * condition queue to the tail of the mutex waiter queue, where ownership
 * transfer will eventually resume it. Signalled threads never race for the
 * lock.
 *
 * The spin on a mutex guard is bounded: only the tick handler can preempt,
 * and the tick handler never touches a guard.
 */

use std::sync::atomic::{AtomicBool, Ordering};

use super::thread::{ThreadId, ThreadState};
use super::wait_queue::WaitQueue;
use super::{Runtime, block_active, timer, unmask_and_drain, with_runtime_mut};

/// Mutex handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexId(pub usize);

/// Monitor handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorId(pub usize);

pub(crate) struct MutexState {
    /// Spin guard for the waiter queue itself.
    pub(crate) guard: AtomicBool,
    pub(crate) owner: Option<ThreadId>,
    pub(crate) waiters: WaitQueue,
}

pub(crate) struct MonitorState {
    /// The mutex backing enter/exit.
    pub(crate) mutex: MutexId,
    /// Condition-variable queue.
    pub(crate) cond: WaitQueue,
}

/// Outcome of a lock or wait attempt that may suspend the caller.
pub(crate) enum LockPrep {
    Acquired,
    Blocked,
    Invalid,
}

impl Runtime {
    pub(crate) fn mutex_create(&mut self) -> MutexId {
        let state = MutexState {
            guard: AtomicBool::new(false),
            owner: None,
            waiters: WaitQueue::new(),
        };
        if let Some(i) = self.mutexes.iter().position(|m| m.is_none()) {
            self.mutexes[i] = Some(state);
            MutexId(i)
        } else {
            self.mutexes.push(Some(state));
            MutexId(self.mutexes.len() - 1)
        }
    }

    pub(crate) fn mutex_destroy(&mut self, m: MutexId) {
        match self.mutexes.get(m.0).and_then(|s| s.as_ref()) {
            None => {
                log::warn!("freeing unknown mutex {}", m.0);
                return;
            }
            Some(state) if !state.waiters.is_empty() => {
                log::warn!("refusing to free mutex {} with queued waiters", m.0);
                return;
            }
            Some(_) => {}
        }
        self.mutexes[m.0] = None;
    }

    pub(crate) fn mutex_lock_prepare(&mut self, m: MutexId) -> LockPrep {
        let active = self.active;
        let clock = self.clock;
        let Some(state) = self.mutexes.get_mut(m.0).and_then(|s| s.as_mut()) else {
            log::warn!("locking unknown mutex {}", m.0);
            return LockPrep::Invalid;
        };
        while state.guard.swap(true, Ordering::Acquire) {}
        if state.owner.is_none() {
            state.owner = Some(active);
            state.guard.store(false, Ordering::Release);
            LockPrep::Acquired
        } else {
            state.waiters.push(active);
            state.guard.store(false, Ordering::Release);
            let t = self.thread_mut(active);
            t.block_start = clock;
            t.state = ThreadState::Blocked;
            LockPrep::Blocked
        }
    }

    /// Release a mutex, transferring ownership to the head waiter if any.
    pub(crate) fn mutex_unlock_inner(&mut self, m: MutexId) {
        let active = self.active;
        let Some(state) = self.mutexes.get_mut(m.0).and_then(|s| s.as_mut()) else {
            log::warn!("unlocking unknown mutex {}", m.0);
            return;
        };
        if state.owner != Some(active) {
            log::warn!("unlock of mutex {} without holding it", m.0);
            return;
        }
        while state.guard.swap(true, Ordering::Acquire) {}
        let next_owner = state.waiters.pop();
        state.owner = next_owner;
        state.guard.store(false, Ordering::Release);

        if let Some(w) = next_owner {
            let vruntime;
            {
                let t = self.thread_mut(w);
                t.state = ThreadState::Runnable;
                vruntime = t.vruntime;
            }
            self.run_tree.insert(w, vruntime);
        }
    }

    pub(crate) fn monitor_create(&mut self) -> MonitorId {
        let mutex = self.mutex_create();
        let state = MonitorState {
            mutex,
            cond: WaitQueue::new(),
        };
        if let Some(i) = self.monitors.iter().position(|m| m.is_none()) {
            self.monitors[i] = Some(state);
            MonitorId(i)
        } else {
            self.monitors.push(Some(state));
            MonitorId(self.monitors.len() - 1)
        }
    }

    pub(crate) fn monitor_destroy(&mut self, mon: MonitorId) {
        match self.monitors.get(mon.0).and_then(|s| s.as_ref()) {
            None => log::warn!("freeing unknown monitor {}", mon.0),
            Some(state) if !state.cond.is_empty() => {
                log::warn!("refusing to free monitor {} with queued waiters", mon.0);
            }
            Some(state) => {
                let mutex = state.mutex;
                self.monitors[mon.0] = None;
                self.mutex_destroy(mutex);
            }
        }
    }

    pub(crate) fn monitor_mutex(&self, mon: MonitorId) -> Option<MutexId> {
        self.monitors.get(mon.0).and_then(|s| s.as_ref()).map(|s| s.mutex)
    }

    fn owns_monitor_mutex(&self, mutex: MutexId) -> bool {
        self.mutexes
            .get(mutex.0)
            .and_then(|s| s.as_ref())
            .map(|s| s.owner == Some(self.active))
            .unwrap_or(false)
    }

    /// Park the caller on the condition queue and release the monitor's
    /// mutex. The caller must hold the mutex.
    pub(crate) fn monitor_wait_prepare(&mut self, mon: MonitorId) -> LockPrep {
        let active = self.active;
        let clock = self.clock;
        let Some(mutex) = self.monitor_mutex(mon) else {
            log::warn!("waiting on unknown monitor {}", mon.0);
            return LockPrep::Invalid;
        };
        if !self.owns_monitor_mutex(mutex) {
            log::warn!("monitor wait called outside monitor {}", mon.0);
            return LockPrep::Invalid;
        }

        self.monitors[mon.0]
            .as_mut()
            .expect("monitor vanished")
            .cond
            .push(active);
        {
            let t = self.thread_mut(active);
            t.block_start = clock;
            t.state = ThreadState::Blocked;
        }
        self.mutex_unlock_inner(mutex);
        LockPrep::Blocked
    }

    /// Move the head of the condition queue (or all of it) to the tail of
    /// the mutex waiter queue. The caller must hold the mutex.
    pub(crate) fn monitor_signal_inner(&mut self, mon: MonitorId, all: bool) {
        let Some(mutex) = self.monitor_mutex(mon) else {
            log::warn!("signalling unknown monitor {}", mon.0);
            return;
        };
        if !self.owns_monitor_mutex(mutex) {
            log::warn!("monitor signal called outside monitor {}", mon.0);
            return;
        }

        let monitors = &mut self.monitors;
        let mutexes = &mut self.mutexes;
        let cond = &mut monitors[mon.0].as_mut().expect("monitor vanished").cond;
        let mstate = mutexes[mutex.0].as_mut().expect("monitor mutex vanished");

        while mstate.guard.swap(true, Ordering::Acquire) {}
        if all {
            while let Some(tid) = cond.pop() {
                mstate.waiters.push(tid);
            }
        } else if let Some(tid) = cond.pop() {
            mstate.waiters.push(tid);
        }
        mstate.guard.store(false, Ordering::Release);
    }
}

// ============================================================================
// Public API
// ============================================================================

pub fn mutex_init() -> MutexId {
    timer::mask();
    let m = with_runtime_mut(|rt| rt.mutex_create());
    unmask_and_drain();
    m
}

pub fn mutex_free(m: MutexId) {
    timer::mask();
    with_runtime_mut(|rt| rt.mutex_destroy(m));
    unmask_and_drain();
}

/// Acquire the mutex, blocking while another thread owns it.
pub fn mutex_lock(m: MutexId) {
    timer::mask();
    let prep = with_runtime_mut(|rt| rt.mutex_lock_prepare(m));
    if matches!(prep, LockPrep::Blocked) {
        block_active();
    }
    unmask_and_drain();
}

/// Release the mutex. Warns and returns when the caller is not the owner.
pub fn mutex_unlock(m: MutexId) {
    timer::mask();
    with_runtime_mut(|rt| rt.mutex_unlock_inner(m));
    unmask_and_drain();
}

pub fn monitor_init() -> MonitorId {
    timer::mask();
    let mon = with_runtime_mut(|rt| rt.monitor_create());
    unmask_and_drain();
    mon
}

pub fn monitor_free(mon: MonitorId) {
    timer::mask();
    with_runtime_mut(|rt| rt.monitor_destroy(mon));
    unmask_and_drain();
}

/// Enter the monitor (acquire its mutex).
pub fn monitor_enter(mon: MonitorId) {
    timer::mask();
    let prep = with_runtime_mut(|rt| match rt.monitor_mutex(mon) {
        Some(m) => rt.mutex_lock_prepare(m),
        None => {
            log::warn!("entering unknown monitor {}", mon.0);
            LockPrep::Invalid
        }
    });
    if matches!(prep, LockPrep::Blocked) {
        block_active();
    }
    unmask_and_drain();
}

/// Leave the monitor (release its mutex).
pub fn monitor_exit(mon: MonitorId) {
    timer::mask();
    with_runtime_mut(|rt| match rt.monitor_mutex(mon) {
        Some(m) => rt.mutex_unlock_inner(m),
        None => log::warn!("exiting unknown monitor {}", mon.0),
    });
    unmask_and_drain();
}

/// Wait on the monitor's condition queue, releasing the mutex while parked.
/// On return the caller owns the mutex again.
pub fn monitor_wait(mon: MonitorId) {
    timer::mask();
    let prep = with_runtime_mut(|rt| rt.monitor_wait_prepare(mon));
    if matches!(prep, LockPrep::Blocked) {
        block_active();
    }
    unmask_and_drain();
}

/// Wake the longest-waiting thread on the condition queue, granting it a
/// place in the mutex waiter queue.
pub fn monitor_signal(mon: MonitorId) {
    timer::mask();
    with_runtime_mut(|rt| rt.monitor_signal_inner(mon, false));
    unmask_and_drain();
}

/// Drain the condition queue into the mutex waiter queue.
pub fn monitor_signal_all(mon: MonitorId) {
    timer::mask();
    with_runtime_mut(|rt| rt.monitor_signal_inner(mon, true));
    unmask_and_drain();
}
