/*
 * Tick Timer and Interrupt Mask
 *
 * The scheduler is driven by a periodic tick. This module owns the pieces
 * the tick callback needs from the host:
 *
 * - the interrupt mask, a global depth counter raised by every public
 *   scheduler entry point. Ticks arriving while the mask is raised are
 *   queued and drained when the mask drops back to zero, which models a
 *   maskable timer interrupt on a single logical CPU.
 * - the pending-tick counter with a condvar, fed either by the periodic
 *   host ticker thread or by manual tick() calls from an embedder.
 * - the idle wait used when the runnable set empties: the OS thread blocks
 *   here until the next tick instead of spinning.
 *
 * Masking only defers tick delivery. Because exactly one green thread runs
 * at a time, the counters need no stronger discipline than atomics.
 */

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::Duration;

/// Tick period: 10 ms, i.e. a 100 Hz timer.
pub const TICK_PERIOD_NS: u64 = 10_000_000;

/// Interrupt mask depth. Zero means ticks may be delivered.
static MASK_DEPTH: AtomicU32 = AtomicU32::new(0);

/// Ticks posted while the mask was raised (or by the periodic ticker),
/// waiting to be delivered.
static PENDING: Mutex<u64> = Mutex::new(0);
static PENDING_CV: Condvar = Condvar::new();

/// Whether a periodic tick source is feeding PENDING. When false, ticks
/// only arrive through manual tick() calls and an empty runnable set is a
/// genuine deadlock.
static PERIODIC_ENABLED: AtomicBool = AtomicBool::new(false);

/// The host ticker thread is spawned once per process.
static TICKER_STARTED: AtomicBool = AtomicBool::new(false);

/// Raise the interrupt mask.
pub fn mask() {
    MASK_DEPTH.fetch_add(1, Ordering::SeqCst);
}

/// Lower the interrupt mask by one level. Pending ticks are drained by the
/// caller once the mask reaches zero.
pub fn unmask() {
    let prev = MASK_DEPTH.fetch_sub(1, Ordering::SeqCst);
    debug_assert!(prev > 0, "interrupt mask underflow");
}

pub fn masked() -> bool {
    MASK_DEPTH.load(Ordering::SeqCst) > 0
}

/// Queue one tick for later delivery.
pub fn post_pending() {
    let mut pending = PENDING.lock().expect("tick queue poisoned");
    *pending += 1;
    PENDING_CV.notify_all();
}

/// Take one queued tick if any is available.
pub fn take_pending() -> bool {
    let mut pending = PENDING.lock().expect("tick queue poisoned");
    if *pending > 0 {
        *pending -= 1;
        true
    } else {
        false
    }
}

/// Block the calling OS thread until a tick is available, then consume it.
///
/// Returns false when no periodic source is installed, in which case no
/// tick will ever arrive on its own and the caller must treat the situation
/// as a deadlock.
pub fn wait_pending() -> bool {
    if !PERIODIC_ENABLED.load(Ordering::SeqCst) {
        return false;
    }
    let mut pending = PENDING.lock().expect("tick queue poisoned");
    while *pending == 0 {
        pending = PENDING_CV.wait(pending).expect("tick queue poisoned");
    }
    *pending -= 1;
    true
}

/// Reset the mask and tick queue for a fresh runtime, choosing the tick
/// source. With `periodic` set, a host ticker thread posts one tick every
/// TICK_PERIOD_NS; otherwise the embedder pumps ticks explicitly.
pub fn reset(periodic: bool) {
    MASK_DEPTH.store(0, Ordering::SeqCst);
    *PENDING.lock().expect("tick queue poisoned") = 0;
    PERIODIC_ENABLED.store(periodic, Ordering::SeqCst);

    if periodic && !TICKER_STARTED.swap(true, Ordering::SeqCst) {
        thread::Builder::new()
            .name("fairthread-ticker".into())
            .spawn(|| {
                loop {
                    thread::sleep(Duration::from_nanos(TICK_PERIOD_NS));
                    if PERIODIC_ENABLED.load(Ordering::SeqCst) {
                        post_pending();
                    }
                }
            })
            .expect("failed to spawn ticker thread");
        log::info!("periodic tick source installed ({} ns period)", TICK_PERIOD_NS);
    }
}
