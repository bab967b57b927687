/*
 * Execution Contexts
 *
 * The narrow seam between the scheduler and the machinery that actually
 * suspends and resumes threads. Each green thread is backed by a dedicated
 * OS thread parked on a private gate (mutex + condvar). Switching signals
 * the target gate and parks on our own; at most one backing thread is
 * unparked at any time, so the runtime stays single-threaded cooperative
 * even though the host gives every context its own stack.
 *
 * The initial thread adopts the OS thread that called init() through a
 * blank context. New contexts spawn a backing thread that waits for its
 * first dispatch before running the entry trampoline.
 */

use std::sync::{Arc, Condvar, Mutex};
use std::thread;

/// Handle to a single execution context.
///
/// Cloning is cheap; clones refer to the same gate.
#[derive(Clone)]
pub struct Context {
    gate: Arc<Gate>,
}

struct Gate {
    ready: Mutex<bool>,
    cv: Condvar,
}

impl Context {
    fn new() -> Self {
        Self {
            gate: Arc::new(Gate {
                ready: Mutex::new(false),
                cv: Condvar::new(),
            }),
        }
    }

    /// Context for a thread that is already running on the calling OS
    /// thread. Used once, for the initial thread.
    pub fn new_blank() -> Self {
        Self::new()
    }

    fn signal(&self) {
        let mut ready = self.gate.ready.lock().expect("context gate poisoned");
        *ready = true;
        self.gate.cv.notify_one();
    }

    fn wait(&self) {
        let mut ready = self.gate.ready.lock().expect("context gate poisoned");
        while !*ready {
            ready = self.gate.cv.wait(ready).expect("context gate poisoned");
        }
        *ready = false;
    }
}

impl core::fmt::Debug for Context {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Context").finish()
    }
}

/// A prepared context switch: resume `to`, suspend the caller on `from`.
///
/// The scheduler computes switches under its lock and performs them after
/// releasing it, so a resumed thread can re-enter the scheduler immediately.
#[derive(Debug)]
pub struct SwitchOp {
    pub from: Context,
    pub to: Context,
}

impl SwitchOp {
    /// Perform the switch. Returns when this context is dispatched again.
    pub fn perform(self) {
        self.to.signal();
        self.from.wait();
    }
}

/// Resume `to` without suspending the caller. Used by exit, where the
/// calling context never runs again.
pub fn handoff(to: &Context) {
    to.signal();
}

/// Create a context whose backing OS thread runs `body` once dispatched for
/// the first time.
pub fn spawn_backing(name: String, body: impl FnOnce() + Send + 'static) -> Context {
    let ctx = Context::new();
    let first = ctx.clone();
    thread::Builder::new()
        .name(name)
        .spawn(move || {
            first.wait();
            body();
        })
        .expect("failed to spawn backing thread");
    ctx
}
