/*
 * Cache Sweeper
 *
 * A runtime thread that periodically ages the cache. Each pass increments
 * every entry's counter; the R bit decays every 4 cycles and valid dirty
 * entries are flushed every 10, so the working set shows up in which
 * entries still carry R=1 when a victim has to be chosen.
 */

use crate::runtime;

/// Spawn the sweeper thread at priority 1.
///
/// The interval is clamped up to one tick: anything shorter would round to
/// a zero-tick sleep and spin.
pub(crate) fn start(interval_ns: u64) {
    let interval = interval_ns.max(runtime::TICK_PERIOD_NS);
    if interval != interval_ns {
        log::warn!(
            "sweep interval {} ns is below one tick, using {} ns",
            interval_ns,
            interval
        );
    }

    runtime::spawn(
        move || -> i64 {
            loop {
                runtime::sleep(interval);
                if let Some(cache) = super::BLOCK_CACHE.lock().as_mut() {
                    cache.sweep();
                }
            }
        },
        1,
    );
    log::info!("cache sweeper started ({} ns interval)", interval);
}
