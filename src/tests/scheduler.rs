/*
 * Scheduler State-Machine Tests
 *
 * These drive a Runtime value directly: prepared context switches are
 * dropped instead of performed, so no thread body ever executes and the
 * dispatcher's bookkeeping can be checked tick by tick.
 */

use crate::runtime::context::Context;
use crate::runtime::thread::{ThreadId, ThreadState};
use crate::runtime::{ExitAction, JoinPrep, MAX_INC, NextAction, Runtime, VRUNTIME_MAX};

fn runtime() -> Runtime {
    Runtime::new(Context::new_blank())
}

fn add_thread(rt: &mut Runtime, priority: i64) -> ThreadId {
    let tid = rt.alloc_tid();
    rt.register_thread(tid, Context::new_blank(), priority);
    tid
}

/// Reposition a runnable thread's vruntime, keeping tree key and control
/// block in sync.
fn set_runnable_vruntime(rt: &mut Runtime, tid: ThreadId, vruntime: i64) {
    let old = rt.thread(tid).vruntime;
    assert!(rt.run_tree.remove_entry(tid, old));
    rt.thread_mut(tid).vruntime = vruntime;
    rt.run_tree.insert(tid, vruntime);
}

/// Every thread must be in exactly one container, matching its state.
fn check_containers(rt: &Runtime) {
    for t in &rt.threads {
        let mut places = 0;
        if rt.active == t.id && t.state == ThreadState::Running {
            places += 1;
        }
        if rt.run_tree.contains(t.id, t.vruntime) {
            places += 1;
        }
        if rt.sleepers.contains(t.id) {
            places += 1;
        }
        if rt.joiners.contains(t.id) {
            places += 1;
        }
        if rt.zombies.contains(t.id) {
            places += 1;
        }
        if rt.dead.contains(t.id) {
            places += 1;
        }
        for m in rt.mutexes.iter().flatten() {
            if m.waiters.contains(t.id) {
                places += 1;
            }
        }
        for m in rt.monitors.iter().flatten() {
            if m.cond.contains(t.id) {
                places += 1;
            }
        }
        assert_eq!(places, 1, "{} found in {} containers", t.id, places);
    }
}

#[test]
fn init_state_has_single_running_thread() {
    let rt = runtime();
    assert_eq!(rt.active, ThreadId(1));
    assert_eq!(rt.clock, 1);
    assert_eq!(rt.thread(ThreadId(1)).priority, 1);
    assert!(rt.run_tree.is_empty());
    check_containers(&rt);
}

#[test]
fn new_threads_start_at_runnable_minimum() {
    let mut rt = runtime();
    let a = add_thread(&mut rt, 2);
    assert_eq!(rt.thread(a).vruntime, 0);

    set_runnable_vruntime(&mut rt, a, 500);
    let b = add_thread(&mut rt, 3);
    assert_eq!(rt.thread(b).vruntime, 500);
    check_containers(&rt);
}

#[test]
fn out_of_range_priorities_are_clamped() {
    let mut rt = runtime();
    let high = add_thread(&mut rt, 99);
    let low = add_thread(&mut rt, -3);
    assert_eq!(rt.thread(high).priority, 10);
    assert_eq!(rt.thread(low).priority, 1);
}

#[test]
fn yield_with_empty_tree_is_noop() {
    let mut rt = runtime();
    assert!(rt.yield_prepare().is_none());
    assert_eq!(rt.active, ThreadId(1));
    assert_eq!(rt.thread(ThreadId(1)).state, ThreadState::Running);
}

#[test]
fn yield_dispatches_minimum_and_requeues_active() {
    let mut rt = runtime();
    let a = add_thread(&mut rt, 1);
    let main = rt.active;

    let op = rt.yield_prepare();
    assert!(op.is_some());
    assert_eq!(rt.active, a);
    assert_eq!(rt.thread(a).state, ThreadState::Running);
    assert_eq!(rt.thread(main).state, ThreadState::Runnable);
    assert!(rt.run_tree.contains(main, 0));
    check_containers(&rt);
}

#[test]
fn yield_from_strictly_lowest_thread_is_noop() {
    let mut rt = runtime();
    let a = add_thread(&mut rt, 1);
    set_runnable_vruntime(&mut rt, a, 10);

    assert!(rt.yield_prepare().is_none());
    assert_eq!(rt.active, ThreadId(1));
    assert_eq!(rt.thread(ThreadId(1)).state, ThreadState::Running);
}

#[test]
fn preemption_respects_min_delay_floor() {
    let mut rt = runtime();
    let a = add_thread(&mut rt, 1);

    // Five ticks pass without a preemption check.
    for _ in 0..5 {
        assert!(rt.handle_tick().is_none());
    }
    // On the sixth the minimum (a at 0) has caught up with the active
    // thread, so it preempts.
    assert!(rt.handle_tick().is_some());
    assert_eq!(rt.active, a);
    assert_eq!(rt.delay, 0);
    check_containers(&rt);
}

#[test]
fn no_preemption_while_active_leads() {
    let mut rt = runtime();
    let a = add_thread(&mut rt, 1);
    set_runnable_vruntime(&mut rt, a, 1000);

    for _ in 0..20 {
        assert!(rt.handle_tick().is_none());
    }
    assert_eq!(rt.active, ThreadId(1));
    // The waiting thread accrued waittime, the active one runtime.
    assert_eq!(rt.thread(a).waittime, 20);
    assert_eq!(rt.thread(rt.active).runtime, 20);
}

#[test]
fn sleepers_wake_exactly_on_time() {
    let mut rt = runtime();
    let a = add_thread(&mut rt, 1);
    let main = rt.active;

    let _ = rt.yield_prepare();
    assert_eq!(rt.active, a);

    rt.sleep_prepare(3);
    assert!(matches!(rt.next_action(), NextAction::Switch(_)));
    assert_eq!(rt.active, main);
    assert_eq!(rt.thread(a).wake_time, 4);

    let _ = rt.handle_tick(); // clock 2
    let _ = rt.handle_tick(); // clock 3
    assert_eq!(rt.thread(a).state, ThreadState::Sleeping);
    assert_eq!(rt.thread(a).sleeptime, 2);

    let _ = rt.handle_tick(); // clock 4: wake
    assert_eq!(rt.thread(a).state, ThreadState::Runnable);
    assert_eq!(rt.thread(a).wake_time, 0);
    assert_eq!(rt.thread(a).sleeptime, 3);
    assert_eq!(rt.thread(a).vruntime, 0);
    assert!(rt.run_tree.contains(a, 0));
    check_containers(&rt);
}

#[test]
fn blocked_thread_resumes_itself_when_woken_first() {
    let mut rt = runtime();
    let main = rt.active;

    // Sleep with nothing else runnable: the idle path must eventually hand
    // the CPU back to the sleeper itself.
    rt.sleep_prepare(2);
    assert!(matches!(rt.next_action(), NextAction::Idle));

    rt.idle_tick(); // clock 2
    assert!(matches!(rt.next_action(), NextAction::Idle));
    rt.idle_tick(); // clock 3: wake
    assert!(matches!(rt.next_action(), NextAction::Resume));
    assert_eq!(rt.active, main);
    assert_eq!(rt.thread(main).state, ThreadState::Running);
    check_containers(&rt);
}

#[test]
fn exit_with_joiner_hands_value_and_dies() {
    let mut rt = runtime();
    let a = add_thread(&mut rt, 1);
    let main = rt.active;

    let prep = rt.join_prepare(a);
    let me = match prep {
        JoinPrep::Blocked(me) => me,
        _ => panic!("join should block"),
    };
    assert_eq!(me, main);
    assert!(matches!(rt.next_action(), NextAction::Switch(_)));
    assert_eq!(rt.active, a);

    match rt.exit_prepare(42) {
        ExitAction::Handoff(_) => {}
        ExitAction::Teardown => panic!("joiner should still be runnable"),
    }
    assert_eq!(rt.active, main);
    assert_eq!(rt.thread(a).state, ThreadState::Dead);
    assert_eq!(rt.join_collect(main), 42);
    check_containers(&rt);
}

#[test]
fn exit_without_joiner_turns_zombie_then_join_consumes() {
    let mut rt = runtime();
    let a = add_thread(&mut rt, 1);

    let _ = rt.yield_prepare();
    assert_eq!(rt.active, a);
    match rt.exit_prepare(7) {
        ExitAction::Handoff(_) => {}
        ExitAction::Teardown => panic!("main thread is still runnable"),
    }
    assert_eq!(rt.thread(a).state, ThreadState::Zombie);
    assert!(rt.zombies.contains(a));

    match rt.join_prepare(a) {
        JoinPrep::Ready(value) => assert_eq!(value, 7),
        _ => panic!("zombie join should complete immediately"),
    }
    assert_eq!(rt.thread(a).state, ThreadState::Dead);

    // The value was consumed; a second join no longer finds the thread.
    assert!(matches!(rt.join_prepare(a), JoinPrep::NotFound));
    check_containers(&rt);
}

#[test]
fn exit_of_last_runnable_thread_tears_down() {
    let mut rt = runtime();
    assert!(matches!(rt.exit_prepare(0), ExitAction::Teardown));
}

#[test]
fn multiple_joiners_all_receive_the_value() {
    let mut rt = runtime();
    let t = add_thread(&mut rt, 1);
    let a = add_thread(&mut rt, 1);
    let main = rt.active;

    assert!(matches!(rt.join_prepare(t), JoinPrep::Blocked(_)));
    assert!(matches!(rt.next_action(), NextAction::Switch(_)));
    assert_eq!(rt.active, t);

    let _ = rt.yield_prepare();
    assert_eq!(rt.active, a);
    assert!(matches!(rt.join_prepare(t), JoinPrep::Blocked(_)));
    assert!(matches!(rt.next_action(), NextAction::Switch(_)));
    assert_eq!(rt.active, t);

    match rt.exit_prepare(5) {
        ExitAction::Handoff(_) => {}
        ExitAction::Teardown => panic!("joiners should be runnable"),
    }
    assert_eq!(rt.thread(t).state, ThreadState::Dead);
    assert_eq!(rt.join_collect(main), 5);
    assert_eq!(rt.join_collect(a), 5);
    check_containers(&rt);
}

#[test]
fn self_join_is_rejected() {
    let mut rt = runtime();
    let main = rt.active;
    assert!(matches!(rt.join_prepare(main), JoinPrep::SelfJoin));
    assert_eq!(rt.thread(main).state, ThreadState::Running);
}

#[test]
fn join_of_unknown_thread_fails() {
    let mut rt = runtime();
    assert!(matches!(rt.join_prepare(ThreadId(99)), JoinPrep::NotFound));
}

#[test]
fn nice_clamps_and_returns_effective_priority() {
    let mut rt = runtime();
    assert_eq!(rt.nice_set(44), 1 + 10);
    assert_eq!(rt.nice_set(-2), 1);
    assert_eq!(rt.nice_set(4), 5);
    assert_eq!(rt.thread(rt.active).nice, 4);
}

#[test]
fn priority_controls_runtime_share() {
    // Two busy threads at priorities 1 and 10: over many ticks the light
    // one should get roughly ten times the CPU (the initial thread, also
    // priority 1, competes but does not change the a:b ratio).
    let mut rt = runtime();
    let a = add_thread(&mut rt, 1);
    let b = add_thread(&mut rt, 10);

    for _ in 0..10_000 {
        let _ = rt.handle_tick();
    }

    let a_runtime = rt.thread(a).runtime as f64;
    let b_runtime = rt.thread(b).runtime as f64;
    let ratio = a_runtime / b_runtime;
    assert!(
        (9.0..=11.0).contains(&ratio),
        "runtime ratio {} outside 10x +/- 10% (a {}, b {})",
        ratio,
        a_runtime,
        b_runtime
    );
    check_containers(&rt);
}

#[test]
fn vruntime_overflow_triggers_renormalization() {
    let mut rt = runtime();
    let a = add_thread(&mut rt, 1);
    let b = add_thread(&mut rt, 1);
    let main = rt.active;

    set_runnable_vruntime(&mut rt, a, VRUNTIME_MAX - 140);
    set_runnable_vruntime(&mut rt, b, VRUNTIME_MAX - 120);
    rt.thread_mut(main).vruntime = VRUNTIME_MAX - MAX_INC;

    let _ = rt.handle_tick();

    // Everyone dropped by the active thread's old vruntime; orderings and
    // gaps survive, and the active thread restarts at zero plus one tick
    // of accounting.
    assert_eq!(rt.thread(a).vruntime, -40);
    assert_eq!(rt.thread(b).vruntime, -20);
    assert_eq!(rt.thread(main).vruntime, 1);
    assert_eq!(rt.run_tree.min_tid(), Some(a));
    assert_eq!(rt.run_tree.min_key(), Some(-40));
    check_containers(&rt);
}

#[test]
fn renormalization_reaches_sleepers_and_joiners() {
    let mut rt = runtime();
    let s = add_thread(&mut rt, 1);
    let j = add_thread(&mut rt, 1);
    let main = rt.active;

    // Park s in the sleep queue with a known vruntime.
    let _ = rt.yield_prepare();
    assert_eq!(rt.active, s);
    rt.thread_mut(s).vruntime = 300;
    rt.sleep_prepare(100);
    assert!(matches!(rt.next_action(), NextAction::Switch(_)));

    // Park j in the join queue waiting for main.
    let t = rt.active;
    assert_eq!(t, j);
    rt.thread_mut(j).vruntime = 200;
    assert!(matches!(rt.join_prepare(main), JoinPrep::Blocked(_)));
    assert!(matches!(rt.next_action(), NextAction::Switch(_)));
    assert_eq!(rt.active, main);

    rt.thread_mut(main).vruntime = VRUNTIME_MAX - MAX_INC;
    let _ = rt.handle_tick();

    let delta = VRUNTIME_MAX - MAX_INC;
    assert_eq!(rt.thread(s).vruntime, 300 - delta);
    assert_eq!(rt.thread(j).vruntime, 200 - delta);
    assert_eq!(rt.thread(main).vruntime, 1);
}
