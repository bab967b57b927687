/*
 * Test Suite
 *
 * In-crate tests for the runtime and the cache, in three groups:
 *
 * - scheduler: white-box tests driving a Runtime value directly. Context
 *   switches are computed but not performed, so thread bodies never run and
 *   every scheduling decision is observable and deterministic.
 * - sync: white-box tests for mutex and monitor semantics.
 * - e2e: end-to-end tests on the global runtime with real context switches
 *   and a manual tick pump.
 *
 * Data-structure tests (runnable tree, wait queue, block cache) live next
 * to their modules.
 */

mod scheduler;

use std::sync::{Mutex, MutexGuard};

/// Tests touching the global runtime, interrupt mask or tick queue
/// serialize on this lock; the cargo harness otherwise runs tests in
/// parallel OS threads.
pub(crate) fn global_lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}
