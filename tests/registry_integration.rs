//! Exercises `ProcRegistry` against the real `/proc` filesystem of the test
//! process itself, since every lookup it performs (`resolve_name`,
//! `resolve_ctx_id`) reads real `/proc/<pid>` files rather than an injected
//! fixture.

use taskmonitor::container_runtime::NullContainerRuntime;
use taskmonitor::registry::ProcRegistry;
use taskmonitor::scheduler::Lane;

fn self_pid() -> i32 {
    std::process::id() as i32
}

#[test]
fn add_proc_entry_reflects_into_the_registry() {
    let registry = ProcRegistry::new(vec![]);
    let runtime = NullContainerRuntime;
    let pid = self_pid();

    registry.add_proc_entry(pid, pid, &runtime);

    let entry = registry.get_proc_entry(pid).expect("self process should be tracked");
    assert_eq!(entry.pid, pid);
    assert!(!entry.name.is_empty());
    assert_eq!(registry.proc_count(), 1);
}

#[test]
fn rem_proc_entry_drops_it() {
    let registry = ProcRegistry::new(vec![]);
    let runtime = NullContainerRuntime;
    let pid = self_pid();

    registry.add_proc_entry(pid, pid, &runtime);
    assert_eq!(registry.proc_count(), 1);

    registry.rem_proc_entry(pid);
    assert_eq!(registry.proc_count(), 0);
    assert!(registry.get_proc_entry(pid).is_none());
}

#[test]
fn blacklisted_name_is_never_added() {
    let pid = self_pid();
    let name = ProcRegistry::resolve_name(pid).expect("self process has a /proc/<pid>/status");
    let registry = ProcRegistry::new(vec![name]);
    let runtime = NullContainerRuntime;

    registry.add_proc_entry(pid, pid, &runtime);

    assert_eq!(registry.proc_count(), 0);
}

#[test]
fn acct_pending_round_trip() {
    let registry = ProcRegistry::new(vec![]);
    let runtime = NullContainerRuntime;
    let pid = self_pid();
    registry.add_proc_entry(pid, pid, &runtime);

    registry.mark_acct_pending(pid);
    assert!(registry.get_proc_entry(pid).unwrap().acct_pending);

    let acct = taskmonitor::wire::monitor::ProcAcct {
        ac_comm: "self".to_owned(),
        ..Default::default()
    };
    registry.set_proc_acct(pid, acct.clone());

    let entry = registry.get_proc_entry(pid).unwrap();
    assert!(!entry.acct_pending);
    assert_eq!(entry.acct.ac_comm, "self");
}

#[test]
fn context_refresh_aggregates_and_prunes_empty_contexts() {
    let registry = ProcRegistry::new(vec![]);
    let runtime = NullContainerRuntime;
    let pid = self_pid();
    registry.add_proc_entry(pid, pid, &runtime);

    registry.refresh_contexts();

    let mut seen = Vec::new();
    registry.foreach_context(|ctx| seen.push(ctx.ctx_id));
    assert!(!seen.is_empty(), "self's context should survive a refresh");

    registry.rem_proc_entry(pid);
    registry.refresh_contexts();

    let mut seen_after = Vec::new();
    registry.foreach_context(|ctx| seen_after.push(ctx.ctx_id));
    assert!(seen_after.is_empty(), "a context with no members is pruned");
}

#[test]
fn update_only_runs_on_the_pace_lane() {
    let registry = ProcRegistry::new(vec![]);
    let runtime = NullContainerRuntime;
    let pid = self_pid();
    registry.add_proc_entry(pid, pid, &runtime);

    // A Fast-lane tick must not touch cpu_percent/cpu_time bookkeeping.
    registry.update(Lane::Fast, 100);
    let untouched = registry.get_proc_entry(pid).unwrap();
    assert_eq!(untouched.last_utime, 0);

    registry.update(Lane::Pace, 100);
    // Should still be tracked (the process is real and /proc/<pid>/stat exists).
    assert!(registry.get_proc_entry(pid).is_some());
}
