/*
 * Cooperative Fair Scheduler
 *
 * This module implements the thread runtime: creation, exit, yield, sleep,
 * join, and the periodic tick that drives accounting and preemption.
 *
 * SCHEDULING MODEL:
 * ================
 *
 * Threads are ordered by accumulated virtual runtime. Every tick the active
 * thread's vruntime grows by its weight (priority + nice), so heavier
 * weights fall behind and run less often. The dispatcher always picks the
 * runnable thread with the smallest vruntime, which is the leftmost node of
 * the red-black runnable tree.
 *
 * Exactly one thread is active at any time. The active thread changes only
 * at suspension points: yield, sleep, join, a contended mutex lock, a
 * monitor wait, or the preemption check at the end of a tick. Preemption is
 * damped by a delay floor (MIN_DELAY ticks) and only fires when the
 * runnable minimum has caught up with the active thread.
 *
 * TICK DISPATCH ORDER:
 * ===================
 *
 * 1. Advance the clock.
 * 2. Wake sleepers whose wake_time matches the clock.
 * 3. Renormalize all vruntimes if the active one nears the 32-bit range.
 * 4. Account: active vruntime/runtime, waiting threads' waittime, blocked
 *    and sleeping threads' sleeptime.
 * 5. Decide preemption.
 *
 * INTERRUPT DISCIPLINE:
 * ====================
 *
 * Every public entry point raises the interrupt mask on entry and lowers it
 * before returning; a thread that suspends leaves its mask level to be
 * lowered by whoever resumes it. Ticks arriving while masked are queued and
 * drained when the mask drops to zero.
 *
 * The runtime itself is a process singleton behind a spin lock. Scheduler
 * state is only ever touched with the lock held; context switches happen
 * after the lock is released.
 */

pub mod context;
pub mod run_tree;
pub mod sync;
pub mod thread;
pub mod timer;
pub mod wait_queue;

pub use sync::{
    MonitorId, MutexId, monitor_enter, monitor_exit, monitor_free, monitor_init, monitor_signal,
    monitor_signal_all, monitor_wait, mutex_free, mutex_init, mutex_lock, mutex_unlock,
};
pub use thread::{Thread, ThreadId, ThreadState, ThreadStats};
pub use timer::TICK_PERIOD_NS;

use std::cell::Cell;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use context::{Context, SwitchOp};
use run_tree::RunTree;
use sync::{MonitorState, MutexState};
use wait_queue::WaitQueue;

/// Priority bounds; out-of-range values are clamped with a warning.
pub const PRIORITY_MIN: i64 = 1;
pub const PRIORITY_MAX: i64 = 10;

/// Nice bounds; out-of-range values are clamped with a warning.
pub const NICE_MIN: i64 = 0;
pub const NICE_MAX: i64 = 10;

/// Ticks an active thread is left alone before preemption is considered.
pub const MIN_DELAY: u64 = 5;

/// Largest per-tick vruntime increment the overflow guard must absorb.
pub const MAX_INC: i64 = 100;

/// Overflow trigger for vruntime renormalization. Counters are 64-bit but
/// deliberately confined to the 32-bit range.
pub const VRUNTIME_MAX: i64 = i32::MAX as i64;

/// Global runtime instance
static RUNTIME: Mutex<Option<Runtime>> = Mutex::new(None);

thread_local! {
    /// Set on backing threads running the entry trampoline, so exit() knows
    /// whether it can unwind back to the trampoline.
    static ON_TRAMPOLINE: Cell<bool> = const { Cell::new(false) };
}

/// Unwind payload carrying an exit value from exit() to the trampoline.
struct ThreadExit(i64);

// ============================================================================
// Runtime state machine
// ============================================================================

/// What a blocked thread should do next.
pub(crate) enum NextAction {
    /// Switch to another thread; returns when dispatched again.
    Switch(SwitchOp),
    /// The caller itself is the runnable minimum again; keep running.
    Resume,
    /// Nothing is runnable; idle until the next tick.
    Idle,
}

/// How exit() should leave the scheduler.
pub(crate) enum ExitAction {
    /// No runnable thread remains: tear down and end the process.
    Teardown,
    /// Resume the given context; the exiting one never runs again.
    Handoff(Context),
}

/// Outcome of the join search.
pub(crate) enum JoinPrep {
    /// Target was a zombie; its value has been consumed.
    Ready(i64),
    SelfJoin,
    NotFound,
    /// Caller was parked on the join queue; holds the caller's id.
    Blocked(ThreadId),
}

/// The scheduler state: every container threads move through, the thread
/// table itself, and the clock.
///
/// Threads are looked up by linear scan of the table. The table only grows;
/// dead threads keep their slot so a later join can still read their exit
/// value.
pub(crate) struct Runtime {
    pub(crate) threads: Vec<Thread>,
    pub(crate) run_tree: RunTree,
    pub(crate) sleepers: WaitQueue,
    pub(crate) joiners: WaitQueue,
    pub(crate) zombies: WaitQueue,
    pub(crate) dead: WaitQueue,
    pub(crate) mutexes: Vec<Option<MutexState>>,
    pub(crate) monitors: Vec<Option<MonitorState>>,
    pub(crate) active: ThreadId,
    pub(crate) clock: u64,
    pub(crate) next_tid: usize,
    /// Preemption damping counter, reset whenever a preemption fires.
    pub(crate) delay: u64,
}

impl Runtime {
    /// Build a runtime whose initial thread (id 1, priority 1) is the
    /// caller, adopting the given context.
    pub(crate) fn new(context: Context) -> Self {
        let mut main_thread = Thread::new(ThreadId(1), context, PRIORITY_MIN);
        main_thread.state = ThreadState::Running;
        Self {
            threads: vec![main_thread],
            run_tree: RunTree::new(),
            sleepers: WaitQueue::new(),
            joiners: WaitQueue::new(),
            zombies: WaitQueue::new(),
            dead: WaitQueue::new(),
            mutexes: Vec::new(),
            monitors: Vec::new(),
            active: ThreadId(1),
            clock: 1,
            next_tid: 2,
            delay: 0,
        }
    }

    pub(crate) fn find_thread(&self, tid: ThreadId) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id == tid)
    }

    pub(crate) fn find_thread_mut(&mut self, tid: ThreadId) -> Option<&mut Thread> {
        self.threads.iter_mut().find(|t| t.id == tid)
    }

    pub(crate) fn thread(&self, tid: ThreadId) -> &Thread {
        self.find_thread(tid).expect("unknown thread id")
    }

    pub(crate) fn thread_mut(&mut self, tid: ThreadId) -> &mut Thread {
        self.find_thread_mut(tid).expect("unknown thread id")
    }

    pub(crate) fn alloc_tid(&mut self) -> ThreadId {
        let tid = ThreadId(self.next_tid);
        self.next_tid += 1;
        tid
    }

    /// Register a freshly created thread and make it runnable.
    ///
    /// New arrivals start at the current runnable minimum's vruntime so they
    /// compete fairly instead of monopolizing the CPU with a zero count.
    /// Registration does not reschedule; the creator keeps running.
    pub(crate) fn register_thread(&mut self, tid: ThreadId, context: Context, priority: i64) {
        let priority = clamp_priority(priority);
        let vruntime = self.run_tree.min_key().unwrap_or(0);
        let mut thread = Thread::new(tid, context, priority);
        thread.vruntime = vruntime;
        self.run_tree.insert(tid, vruntime);
        self.threads.push(thread);
        log::info!("created {} with priority {}", tid, priority);
    }

    /// Move the runnable minimum onto the CPU, parking the active thread
    /// back into the tree.
    ///
    /// No-op when nothing else is runnable, and also when the active thread
    /// still has a strictly smaller vruntime than every runnable thread: it
    /// is already the most deserving. Equal vruntimes do switch, keeping
    /// yield a rotation among peers.
    pub(crate) fn yield_prepare(&mut self) -> Option<SwitchOp> {
        let min_key = self.run_tree.min_key()?;
        let old = self.active;
        let old_vruntime = self.thread(old).vruntime;
        if old_vruntime < min_key {
            return None;
        }
        let next = self.run_tree.remove_min().expect("minimum was just observed");
        self.thread_mut(old).state = ThreadState::Runnable;
        self.run_tree.insert(old, old_vruntime);
        Some(self.dispatch(old, next))
    }

    fn dispatch(&mut self, from: ThreadId, to: ThreadId) -> SwitchOp {
        let from_ctx = self.thread(from).context.clone();
        let to_ctx = self.thread(to).context.clone();
        self.thread_mut(to).state = ThreadState::Running;
        self.active = to;
        SwitchOp {
            from: from_ctx,
            to: to_ctx,
        }
    }

    /// The tick dispatcher. Runs with the interrupt mask raised.
    pub(crate) fn handle_tick(&mut self) -> Option<SwitchOp> {
        self.clock += 1;

        self.wake_sleepers();

        let active_vruntime = self.thread(self.active).vruntime;
        if active_vruntime >= VRUNTIME_MAX - MAX_INC {
            self.renormalize(active_vruntime);
        }

        let active = self.active;
        {
            let t = self.thread_mut(active);
            let weight = t.weight();
            t.vruntime += weight;
            t.runtime += 1;
        }
        self.bump_blocked_sleeptime(1);
        self.bump_runnable_waittime(1);

        if self.delay < MIN_DELAY {
            self.delay += 1;
            return None;
        }
        let min_key = self.run_tree.min_key()?;
        if self.thread(self.active).vruntime < min_key {
            self.delay += 1;
            return None;
        }
        self.delay = 0;
        self.yield_prepare()
    }

    /// A tick that passes while nothing is runnable: the clock still
    /// advances and sleepers still wake, but no thread is accounted for
    /// running and no preemption decision is made.
    pub(crate) fn idle_tick(&mut self) {
        self.clock += 1;
        self.wake_sleepers();
        self.bump_blocked_sleeptime(1);
        self.bump_runnable_waittime(1);
    }

    fn wake_sleepers(&mut self) {
        let mut remaining = WaitQueue::new();
        while let Some(tid) = self.sleepers.pop() {
            if self.thread(tid).wake_time == self.clock {
                let vruntime;
                {
                    let t = self.thread_mut(tid);
                    t.wake_time = 0;
                    t.sleeptime += 1;
                    t.state = ThreadState::Runnable;
                    vruntime = t.vruntime;
                }
                self.run_tree.insert(tid, vruntime);
            } else {
                remaining.push(tid);
            }
        }
        self.sleepers = remaining;
    }

    /// Subtract the active thread's vruntime from every live thread,
    /// reclaiming counter range while preserving all relative orderings.
    fn renormalize(&mut self, delta: i64) {
        log::info!("renormalizing vruntimes at clock {} (delta {})", self.clock, delta);
        self.run_tree.dec_keys(delta);

        let mut tids: Vec<ThreadId> = Vec::new();
        self.run_tree.visit_in_order(|tid| tids.push(tid));
        tids.extend(self.sleepers.iter());
        tids.extend(self.joiners.iter());
        for mutex in self.mutexes.iter().flatten() {
            tids.extend(mutex.waiters.iter());
        }
        for monitor in self.monitors.iter().flatten() {
            tids.extend(monitor.cond.iter());
        }
        for tid in tids {
            self.thread_mut(tid).vruntime -= delta;
        }
        let active = self.active;
        self.thread_mut(active).vruntime = 0;
    }

    fn bump_blocked_sleeptime(&mut self, delta: i64) {
        let mut tids: Vec<ThreadId> = self.sleepers.iter().collect();
        tids.extend(self.joiners.iter());
        for mutex in self.mutexes.iter().flatten() {
            tids.extend(mutex.waiters.iter());
        }
        for monitor in self.monitors.iter().flatten() {
            tids.extend(monitor.cond.iter());
        }
        for tid in tids {
            self.thread_mut(tid).sleeptime += delta;
        }
    }

    fn bump_runnable_waittime(&mut self, delta: i64) {
        let tree = &self.run_tree;
        let threads = &mut self.threads;
        tree.visit_in_order(|tid| {
            if let Some(t) = threads.iter_mut().find(|t| t.id == tid) {
                t.waittime += delta;
            }
        });
    }

    /// Park the active thread on the sleep queue until `ticks` from now.
    pub(crate) fn sleep_prepare(&mut self, ticks: u64) {
        let active = self.active;
        let wake_time = self.clock + ticks;
        let t = self.thread_mut(active);
        t.wake_time = wake_time;
        t.state = ThreadState::Sleeping;
        self.sleepers.push(active);
    }

    /// Pick what a thread that just left the CPU should hand over to. The
    /// caller must already have parked the active thread in some wait
    /// container (it may be woken again before anything else runs, which is
    /// the Resume case).
    pub(crate) fn next_action(&mut self) -> NextAction {
        match self.run_tree.remove_min() {
            Some(next) if next == self.active => {
                self.thread_mut(next).state = ThreadState::Running;
                NextAction::Resume
            }
            Some(next) => {
                let active = self.active;
                NextAction::Switch(self.dispatch(active, next))
            }
            None => NextAction::Idle,
        }
    }

    /// Terminate the active thread with the given value.
    ///
    /// Joiners waiting on it are handed the value and woken; with no joiner
    /// the thread turns zombie and keeps the value in its own control block
    /// for a later join to collect.
    pub(crate) fn exit_prepare(&mut self, ret: i64) -> ExitAction {
        let exiting = self.active;

        let mut woke_joiner = false;
        let mut remaining = WaitQueue::new();
        while let Some(tid) = self.joiners.pop() {
            if self.thread(tid).join_tid == Some(exiting) {
                let vruntime;
                {
                    let t = self.thread_mut(tid);
                    t.join_ret = Some(ret);
                    t.join_tid = None;
                    t.state = ThreadState::Runnable;
                    vruntime = t.vruntime;
                }
                self.run_tree.insert(tid, vruntime);
                woke_joiner = true;
            } else {
                remaining.push(tid);
            }
        }
        self.joiners = remaining;

        if woke_joiner {
            self.thread_mut(exiting).state = ThreadState::Dead;
            self.dead.push(exiting);
        } else {
            let t = self.thread_mut(exiting);
            t.join_ret = Some(ret);
            t.state = ThreadState::Zombie;
            self.zombies.push(exiting);
        }

        match self.run_tree.remove_min() {
            None => ExitAction::Teardown,
            Some(next) => {
                let to_ctx = self.thread(next).context.clone();
                self.thread_mut(next).state = ThreadState::Running;
                self.active = next;
                ExitAction::Handoff(to_ctx)
            }
        }
    }

    /// Search every container for the join target, in order: zombies
    /// (consuming the value), the active thread, the runnable tree, the
    /// sleep queue, the join queue.
    pub(crate) fn join_prepare(&mut self, target: ThreadId) -> JoinPrep {
        if self.zombies.contains(target) {
            self.zombies.remove(target);
            let value;
            {
                let t = self.thread_mut(target);
                value = t.join_ret.expect("zombie thread has no exit value");
                t.state = ThreadState::Dead;
            }
            self.dead.push(target);
            return JoinPrep::Ready(value);
        }

        if target == self.active {
            log::warn!("{} attempted to join itself", target);
            return JoinPrep::SelfJoin;
        }

        let Some(target_vruntime) = self.find_thread(target).map(|t| t.vruntime) else {
            return JoinPrep::NotFound;
        };
        let found = self.run_tree.contains(target, target_vruntime)
            || self.sleepers.contains(target)
            || self.joiners.contains(target);
        if !found {
            return JoinPrep::NotFound;
        }

        let me = self.active;
        {
            let t = self.thread_mut(me);
            t.join_tid = Some(target);
            t.state = ThreadState::Joining;
        }
        self.joiners.push(me);
        JoinPrep::Blocked(me)
    }

    /// Collect the value a joined thread deposited for us.
    pub(crate) fn join_collect(&mut self, me: ThreadId) -> i64 {
        self.thread_mut(me)
            .join_ret
            .take()
            .expect("joined thread exited without a value")
    }

    /// Set the active thread's nice value, returning the new effective
    /// priority.
    pub(crate) fn nice_set(&mut self, nice: i64) -> i64 {
        let nice = if nice > NICE_MAX {
            log::warn!("nice value {} too high, using {}", nice, NICE_MAX);
            NICE_MAX
        } else if nice < NICE_MIN {
            log::warn!("nice value {} too low, using {}", nice, NICE_MIN);
            NICE_MIN
        } else {
            nice
        };
        let active = self.active;
        let t = self.thread_mut(active);
        t.nice = nice;
        t.weight()
    }

    pub(crate) fn stats_snapshot(&self) -> Vec<ThreadStats> {
        self.threads.iter().map(ThreadStats::of).collect()
    }

    /// Render the human-readable diagnostic covering every container.
    pub(crate) fn render_dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== runtime dump ===");
        let _ = writeln!(out, "clock = {}", self.clock);

        let _ = writeln!(out, "active thread:");
        let _ = writeln!(out, "  {}", ThreadStats::of(self.thread(self.active)));

        let _ = writeln!(out, "runnable (vruntime order):");
        self.run_tree.visit_in_order(|tid| {
            let _ = writeln!(out, "  {}", ThreadStats::of(self.thread(tid)));
        });

        for (title, queue) in [
            ("sleeping", &self.sleepers),
            ("joining", &self.joiners),
            ("zombie", &self.zombies),
            ("dead", &self.dead),
        ] {
            let _ = writeln!(out, "{}:", title);
            for tid in queue.iter() {
                let _ = writeln!(out, "  {}", ThreadStats::of(self.thread(tid)));
            }
        }

        for (i, mutex) in self.mutexes.iter().enumerate() {
            if let Some(mutex) = mutex {
                let _ = writeln!(out, "mutex {} (owner: {:?}):", i, mutex.owner.map(|t| t.0));
                for tid in mutex.waiters.iter() {
                    let _ = writeln!(out, "  {}", ThreadStats::of(self.thread(tid)));
                }
            }
        }
        for (i, monitor) in self.monitors.iter().enumerate() {
            if let Some(monitor) = monitor {
                let _ = writeln!(out, "monitor {} (mutex {}):", i, monitor.mutex.0);
                for tid in monitor.cond.iter() {
                    let _ = writeln!(out, "  {}", ThreadStats::of(self.thread(tid)));
                }
            }
        }
        let _ = writeln!(out, "=== end dump ===");
        out
    }
}

fn clamp_priority(priority: i64) -> i64 {
    if priority > PRIORITY_MAX {
        log::warn!("priority {} too high, using {}", priority, PRIORITY_MAX);
        PRIORITY_MAX
    } else if priority < PRIORITY_MIN {
        log::warn!("priority {} too low, using {}", priority, PRIORITY_MIN);
        PRIORITY_MIN
    } else {
        priority
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Initialize the runtime with the periodic host tick source.
///
/// The calling OS thread becomes the initial thread (id 1, priority 1).
pub fn init() {
    init_inner(true);
}

/// Initialize the runtime without a periodic tick source; the embedder (or
/// test) drives time by calling tick() explicitly.
pub fn init_manual_tick() {
    init_inner(false);
}

fn init_inner(periodic: bool) {
    crate::utils::logger::init();
    install_exit_hook();
    timer::reset(periodic);
    *RUNTIME.lock() = Some(Runtime::new(Context::new_blank()));
    log::info!("runtime initialized, tick period {} ns", TICK_PERIOD_NS);
}

pub(crate) fn with_runtime<R>(f: impl FnOnce(&Runtime) -> R) -> R {
    let guard = RUNTIME.lock();
    let rt = guard.as_ref().expect("runtime not initialized");
    f(rt)
}

pub(crate) fn with_runtime_mut<R>(f: impl FnOnce(&mut Runtime) -> R) -> R {
    let mut guard = RUNTIME.lock();
    let rt = guard.as_mut().expect("runtime not initialized");
    f(rt)
}

/// Create a new thread running `entry`. Returns its id; does not
/// reschedule.
pub fn spawn<F>(entry: F, priority: i64) -> ThreadId
where
    F: FnOnce() -> i64 + Send + 'static,
{
    timer::mask();
    let tid = with_runtime_mut(|rt| rt.alloc_tid());
    let context = context::spawn_backing(format!("fairthread-{}", tid.0), move || {
        trampoline(entry);
    });
    with_runtime_mut(|rt| rt.register_thread(tid, context, priority));
    unmask_and_drain();
    tid
}

/// First code run by a new thread's backing context: lower the mask the
/// dispatcher left raised, run the entry function, and route its return
/// value (or the value passed to exit()) into the exit path.
fn trampoline<F: FnOnce() -> i64>(entry: F) {
    ON_TRAMPOLINE.with(|f| f.set(true));
    unmask_and_drain();
    let ret = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(entry)) {
        Ok(value) => value,
        Err(payload) => match payload.downcast::<ThreadExit>() {
            Ok(exit) => exit.0,
            Err(payload) => {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                log::error!("thread panicked: {}", msg);
                std::process::abort();
            }
        },
    };
    exit_shell(ret);
    // The context was handed off; this backing thread is done.
}

/// Terminate the current thread with the given value. Does not return.
pub fn exit(ret: i64) -> ! {
    if ON_TRAMPOLINE.with(|f| f.get()) {
        std::panic::panic_any(ThreadExit(ret));
    }
    exit_shell(ret);
    // Only the initial thread gets here; it has been handed off and will
    // never be dispatched again.
    loop {
        std::thread::park();
    }
}

fn exit_shell(ret: i64) {
    timer::mask();
    match with_runtime_mut(|rt| rt.exit_prepare(ret)) {
        ExitAction::Teardown => {
            log::info!("last runnable thread exited, terminating");
            std::process::exit(0);
        }
        ExitAction::Handoff(to) => context::handoff(&to),
    }
}

/// Cooperatively reschedule. No-op when nothing else is runnable.
pub fn yield_now() {
    timer::mask();
    let op = with_runtime_mut(|rt| rt.yield_prepare());
    if let Some(op) = op {
        op.perform();
    }
    unmask_and_drain();
}

/// Sleep for at least `ns` nanoseconds, rounded down to whole ticks.
/// Returns immediately when the duration is below one tick.
pub fn sleep(ns: u64) {
    timer::mask();
    let ticks = ns / TICK_PERIOD_NS;
    if ticks == 0 {
        unmask_and_drain();
        return;
    }
    with_runtime_mut(|rt| rt.sleep_prepare(ticks));
    block_active();
    unmask_and_drain();
}

/// Wait for `target` to exit and return the value it exited with.
pub fn join(target: ThreadId) -> Result<i64, &'static str> {
    timer::mask();
    let result = match with_runtime_mut(|rt| rt.join_prepare(target)) {
        JoinPrep::Ready(value) => Ok(value),
        JoinPrep::SelfJoin => Err("cannot join the current thread"),
        JoinPrep::NotFound => {
            log::warn!("join target {} not found", target);
            Err("thread not found")
        }
        JoinPrep::Blocked(me) => {
            block_active();
            Ok(with_runtime_mut(|rt| rt.join_collect(me)))
        }
    };
    unmask_and_drain();
    result
}

/// Set the current thread's nice value (clamped to [0, 10]) and return the
/// new effective priority.
pub fn nice(n: i64) -> i64 {
    timer::mask();
    let result = with_runtime_mut(|rt| rt.nice_set(n));
    unmask_and_drain();
    result
}

/// Timer callback: advance the scheduler by one tick. Queued for later when
/// the interrupt mask is raised.
pub fn tick() {
    if timer::masked() {
        timer::post_pending();
        return;
    }
    tick_once();
    drain_pending();
}

fn tick_once() {
    timer::mask();
    let op = with_runtime_mut(|rt| rt.handle_tick());
    if let Some(op) = op {
        op.perform();
    }
    timer::unmask();
}

fn drain_pending() {
    while !timer::masked() && timer::take_pending() {
        tick_once();
    }
}

pub(crate) fn unmask_and_drain() {
    timer::unmask();
    drain_pending();
}

/// Hand the CPU over after the active thread parked itself in a wait
/// container. When nothing is runnable the OS thread idles until the next
/// tick wakes a sleeper; without a periodic tick source that situation is a
/// deadlock and the runtime panics.
pub(crate) fn block_active() {
    loop {
        match with_runtime_mut(|rt| rt.next_action()) {
            NextAction::Switch(op) => {
                op.perform();
                return;
            }
            NextAction::Resume => return,
            NextAction::Idle => {
                if !timer::wait_pending() {
                    panic!(
                        "scheduler deadlock: runnable set is empty and no periodic tick source is installed"
                    );
                }
                with_runtime_mut(|rt| rt.idle_tick());
            }
        }
    }
}

pub fn current_thread_id() -> ThreadId {
    with_runtime(|rt| rt.active)
}

/// Current scheduler clock, in ticks since init.
pub fn clock_ticks() -> u64 {
    with_runtime(|rt| rt.clock)
}

/// Get statistics for all threads.
pub fn stats() -> Vec<ThreadStats> {
    with_runtime(|rt| rt.stats_snapshot())
}

/// Print a human-readable diagnostic of every thread container.
pub fn dump() {
    let text = with_runtime(|rt| rt.render_dump());
    print!("{}", text);
}

/// Suppress the default panic report for the quiet unwind exit() uses to
/// get back to the trampoline.
fn install_exit_hook() {
    static HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);
    if !HOOK_INSTALLED.swap(true, Ordering::SeqCst) {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if info.payload().downcast_ref::<ThreadExit>().is_some() {
                return;
            }
            previous(info);
        }));
    }
}
