//! End-to-end lifecycle scenarios driven through the public entry points.

use std::time::Duration;

use stackvisor_core::testing::{spec, supervisor, TestSupervisor};
use stackvisor_core::{check_invariants, ActivityState, LifecycleTransaction, StackId};

fn assert_invariants(sup: &TestSupervisor) {
    let violations = check_invariants(sup);
    assert!(violations.is_empty(), "invariant violations: {violations:?}");
}

/// One resumed activity `app/.A` in a fresh fullscreen stack.
fn with_resumed_root() -> (TestSupervisor, StackId, stackvisor_core::ActivityId) {
    let mut sup = supervisor();
    let stack = sup.fullscreen_stack();
    let a = sup.launch(stack, spec("app/.A", "app"));
    sup.settle();
    assert_eq!(sup.state_of(a), Some(ActivityState::Resumed));
    (sup, stack, a)
}

#[test]
fn test_first_launch_waits_for_process() {
    let mut sup = supervisor();
    let stack = sup.fullscreen_stack();
    let a = sup.launch(stack, spec("app/.A", "app"));
    assert_invariants(&sup);

    assert_eq!(sup.state_of(a), Some(ActivityState::Initializing));
    assert_eq!(sup.services().starts_for("app"), 1);

    let pid = sup.services_mut().allocate_pid();
    let started = sup.attach_process("app", pid).unwrap();
    assert_invariants(&sup);

    assert_eq!(started, 1);
    assert_eq!(sup.state_of(a), Some(ActivityState::Resumed));
    assert_eq!(
        sup.services().last_to(a),
        Some(&LifecycleTransaction::Launch { and_resume: true })
    );
    assert_eq!(sup.focus().resumed_activity(), Some(a));
}

#[test]
fn test_launch_on_top_pauses_then_resumes() {
    let (mut sup, stack, a) = with_resumed_root();

    let b = sup.launch(stack, spec("app/.B", "app"));
    assert_invariants(&sup);
    assert_eq!(sup.state_of(a), Some(ActivityState::Pausing));
    assert_eq!(sup.state_of(b), Some(ActivityState::Initializing));
    assert!(matches!(
        sup.services().last_to(a),
        Some(LifecycleTransaction::Pause {
            finishing: false,
            user_leaving: true,
            ..
        })
    ));
    // Nothing resumes until the pause is acknowledged.
    assert_eq!(sup.services().count(b, "launch"), 0);

    sup.activity_paused(a).unwrap();
    assert_invariants(&sup);
    assert_eq!(sup.state_of(b), Some(ActivityState::Resumed));
    assert_eq!(sup.state_of(a), Some(ActivityState::Stopping));

    sup.activity_stopped(a).unwrap();
    assert_invariants(&sup);
    assert_eq!(sup.state_of(a), Some(ActivityState::Stopped));
    assert!(sup.hierarchy().activity(a).unwrap().has_saved_state());
}

#[test]
fn test_pause_timeout_forces_progress() {
    let (mut sup, stack, a) = with_resumed_root();
    let b = sup.launch(stack, spec("app/.B", "app"));
    assert_eq!(sup.state_of(a), Some(ActivityState::Pausing));

    sup.advance_time(Duration::from_millis(499));
    assert_eq!(sup.state_of(a), Some(ActivityState::Pausing));

    sup.advance_time(Duration::from_millis(1));
    assert_invariants(&sup);
    assert_eq!(sup.state_of(b), Some(ActivityState::Resumed));
    assert_ne!(sup.state_of(a), Some(ActivityState::Pausing));
}

#[test]
fn test_late_pause_ack_is_ignored() {
    let (mut sup, stack, a) = with_resumed_root();
    let b = sup.launch(stack, spec("app/.B", "app"));
    sup.activity_paused(a).unwrap();

    let delivered = sup.services().transactions.len();
    let state_a = sup.state_of(a);
    let state_b = sup.state_of(b);

    sup.activity_paused(a).unwrap();
    sup.activity_paused(a).unwrap();
    assert_invariants(&sup);

    assert_eq!(sup.services().transactions.len(), delivered);
    assert_eq!(sup.state_of(a), state_a);
    assert_eq!(sup.state_of(b), state_b);
}

#[test]
fn test_ack_for_unknown_activity_is_harmless() {
    let (mut sup, _, a) = with_resumed_root();
    sup.activity_paused(stackvisor_core::ActivityId(9_999)).unwrap();
    sup.activity_stopped(stackvisor_core::ActivityId(9_999)).unwrap();
    assert_eq!(sup.state_of(a), Some(ActivityState::Resumed));
    assert_invariants(&sup);
}

#[test]
fn test_process_death_during_pause_resumes_next() {
    let mut sup = supervisor();
    let stack = sup.fullscreen_stack();
    let a = sup.launch(stack, spec("one/.A", "one"));
    sup.settle();
    let pid_a = sup.processes()["one"];

    let b = sup.launch(stack, spec("two/.B", "two"));
    assert_eq!(sup.state_of(a), Some(ActivityState::Pausing));
    // The next activity's process is requested while the pause is in flight.
    assert_eq!(sup.services().starts_for("two"), 1);

    sup.handle_process_died(pid_a).unwrap();
    assert_invariants(&sup);
    assert!(!sup.hierarchy().contains_activity(a));
    assert!(sup.focus().all_pauses_complete());
    assert_eq!(sup.services().starts_for("two"), 1);

    sup.settle();
    assert_invariants(&sup);
    assert_eq!(sup.state_of(b), Some(ActivityState::Resumed));
}

#[test]
fn test_dead_process_keeps_stopped_activity_with_saved_state() {
    let mut sup = supervisor();
    let stack = sup.fullscreen_stack();
    let a = sup.launch(stack, spec("one/.A", "one"));
    sup.settle();
    let b = sup.launch(stack, spec("two/.B", "two"));
    sup.settle();
    assert_eq!(sup.state_of(a), Some(ActivityState::Stopped));

    let pid_a = sup.processes()["one"];
    sup.handle_process_died(pid_a).unwrap();
    assert_invariants(&sup);

    let record = sup.hierarchy().activity(a).unwrap();
    assert_eq!(record.state(), ActivityState::Stopped);
    assert_eq!(record.process(), None);
    assert!(!record.attached_to_process());
    assert_eq!(sup.state_of(b), Some(ActivityState::Resumed));
}

#[test]
fn test_delivery_to_dead_process_counts_as_death() {
    let mut sup = supervisor();
    let stack = sup.fullscreen_stack();
    let a = sup.launch(stack, spec("one/.A", "one"));
    sup.settle();
    let pid_a = sup.processes()["one"];
    sup.services_mut().kill(pid_a);

    let b = sup.launch(stack, spec("two/.B", "two"));
    assert_invariants(&sup);
    // The pause could not be delivered, so the pause completes at once.
    assert!(!sup.hierarchy().contains_activity(a));
    assert!(!sup.processes().contains_key("one"));

    sup.settle();
    assert_eq!(sup.state_of(b), Some(ActivityState::Resumed));
    assert_invariants(&sup);
}

#[test]
fn test_finish_top_resumes_previous() {
    let (mut sup, stack, a) = with_resumed_root();
    let b = sup.launch(stack, spec("app/.B", "app"));
    sup.settle();
    assert_eq!(sup.state_of(a), Some(ActivityState::Stopped));

    let removed = sup.finish_activity(b).unwrap();
    assert!(!removed);
    assert_eq!(sup.state_of(b), Some(ActivityState::Pausing));
    assert!(matches!(
        sup.services().last_to(b),
        Some(LifecycleTransaction::Pause { finishing: true, .. })
    ));

    sup.activity_paused(b).unwrap();
    assert_invariants(&sup);
    assert_eq!(sup.state_of(a), Some(ActivityState::Resumed));
    assert_eq!(sup.state_of(b), Some(ActivityState::Destroying));

    sup.activity_destroyed(b).unwrap();
    assert_invariants(&sup);
    assert!(!sup.hierarchy().contains_activity(b));
}

#[test]
fn test_duplicate_finish_is_ignored() {
    let (mut sup, stack, _) = with_resumed_root();
    let b = sup.launch(stack, spec("app/.B", "app"));
    sup.settle();

    sup.finish_activity(b).unwrap();
    let pauses = sup.services().count(b, "pause");
    assert!(!sup.finish_activity(b).unwrap());
    assert_eq!(sup.services().count(b, "pause"), pauses);
    assert_invariants(&sup);
}

#[test]
fn test_drawn_finishing_activity_waits_for_next_to_draw() {
    let (mut sup, stack, a) = with_resumed_root();
    let b = sup.launch(stack, spec("app/.B", "app"));
    sup.settle();
    sup.activity_drawn(b).unwrap();

    sup.finish_activity(b).unwrap();
    sup.activity_paused(b).unwrap();
    assert_invariants(&sup);
    assert_eq!(sup.state_of(a), Some(ActivityState::Resumed));
    assert_eq!(sup.state_of(b), Some(ActivityState::Stopping));
    assert_eq!(sup.services().count(b, "destroy"), 0);

    sup.activity_drawn(a).unwrap();
    assert_invariants(&sup);
    assert_eq!(sup.state_of(b), Some(ActivityState::Destroying));
    assert_eq!(sup.services().count(b, "destroy"), 1);
}

#[test]
fn test_destroy_timeout_removes_record() {
    let (mut sup, stack, _) = with_resumed_root();
    let b = sup.launch(stack, spec("app/.B", "app"));
    sup.settle();
    sup.finish_activity(b).unwrap();
    sup.activity_paused(b).unwrap();
    assert_eq!(sup.state_of(b), Some(ActivityState::Destroying));

    sup.advance_time(Duration::from_millis(10_000));
    assert_invariants(&sup);
    assert!(!sup.hierarchy().contains_activity(b));
}

#[test]
fn test_finishing_last_activity_removes_stack_and_requests_home() {
    let (mut sup, stack, a) = with_resumed_root();
    sup.finish_activity(a).unwrap();
    sup.settle();
    assert_invariants(&sup);

    assert!(!sup.hierarchy().contains_activity(a));
    assert!(sup.hierarchy().stack(stack).is_err());
    assert!(!sup.services().home_starts.is_empty());
}

#[test]
fn test_translucent_top_keeps_previous_visible_and_paused() {
    let (mut sup, stack, a) = with_resumed_root();
    let b = sup.launch(stack, spec("app/.Dialog", "app").translucent());
    sup.settle();
    assert_invariants(&sup);

    assert_eq!(sup.state_of(b), Some(ActivityState::Resumed));
    assert_eq!(sup.state_of(a), Some(ActivityState::Paused));
    assert!(sup.hierarchy().activity(a).unwrap().visible_requested());
    assert_eq!(sup.services().count(a, "stop"), 0);
}

#[test]
fn test_opaque_top_hides_everything_below() {
    let (mut sup, stack, a) = with_resumed_root();
    let b = sup.launch(stack, spec("app/.B", "app"));
    sup.settle();
    let c = sup.launch(stack, spec("app/.C", "app"));
    sup.settle();
    assert_invariants(&sup);

    assert_eq!(sup.state_of(c), Some(ActivityState::Resumed));
    for below in [a, b] {
        let record = sup.hierarchy().activity(below).unwrap();
        assert!(!record.visible_requested());
        assert_eq!(record.state(), ActivityState::Stopped);
    }
}

#[test]
fn test_convert_to_translucent_completes_when_below_draws() {
    let (mut sup, stack, a) = with_resumed_root();
    let b = sup.launch(stack, spec("app/.B", "app"));
    sup.settle();
    assert_eq!(sup.state_of(a), Some(ActivityState::Stopped));

    assert!(sup.convert_to_translucent(b).unwrap());
    assert_invariants(&sup);
    assert_eq!(
        sup.services().last_to(a),
        Some(&LifecycleTransaction::Start)
    );
    assert_eq!(sup.state_of(a), Some(ActivityState::Started));
    assert_eq!(
        sup.hierarchy().stack(stack).unwrap().translucent_activity_waiting(),
        Some(b)
    );

    sup.activity_drawn(a).unwrap();
    assert_eq!(
        sup.services().last_to(b),
        Some(&LifecycleTransaction::TranslucentConversionComplete { drawn: true })
    );
    assert_eq!(
        sup.hierarchy().stack(stack).unwrap().translucent_activity_waiting(),
        None
    );
}

#[test]
fn test_convert_to_translucent_times_out() {
    let (mut sup, stack, _) = with_resumed_root();
    let b = sup.launch(stack, spec("app/.B", "app"));
    sup.settle();
    sup.convert_to_translucent(b).unwrap();

    sup.advance_time(Duration::from_millis(2_000));
    assert_eq!(
        sup.services().last_to(b),
        Some(&LifecycleTransaction::TranslucentConversionComplete { drawn: false })
    );
    assert_invariants(&sup);
}

#[test]
fn test_results_are_delivered_with_resume() {
    let (mut sup, stack, a) = with_resumed_root();
    let b = sup.launch(stack, spec("app/.Picker", "app"));
    sup.settle();

    sup.send_result(a, "picked").unwrap();
    sup.finish_activity(b).unwrap();
    sup.settle();
    assert_invariants(&sup);

    assert_eq!(sup.state_of(a), Some(ActivityState::Resumed));
    assert_eq!(
        sup.services().last_to(a),
        Some(&LifecycleTransaction::Resume {
            results: vec!["picked".to_string()],
            new_intents: vec![],
        })
    );
}

#[test]
fn test_restart_process_if_visible_relaunches() {
    let (mut sup, _, a) = with_resumed_root();
    assert!(sup.restart_process_if_visible(a).unwrap());
    assert_invariants(&sup);
    assert_eq!(sup.processes().get("app"), None);
    assert!(sup.hierarchy().contains_activity(a));
    assert_eq!(sup.services().starts_for("app"), 2);

    sup.settle();
    assert_eq!(sup.state_of(a), Some(ActivityState::Resumed));
    assert_eq!(sup.services().count(a, "launch"), 2);
}

#[test]
fn test_dump_reflects_hierarchy() {
    let (mut sup, stack, a) = with_resumed_root();
    let b = sup.launch(stack, spec("app/.B", "app"));
    sup.settle();

    let snapshot = sup.dump();
    assert_eq!(snapshot.displays.len(), 1);
    let stack_snapshot = &snapshot.displays[0].stacks[0];
    assert_eq!(stack_snapshot.id, stack);
    let ids: Vec<_> = stack_snapshot.tasks[0]
        .activities
        .iter()
        .map(|activity| activity.id)
        .collect();
    assert_eq!(ids, vec![b, a]);
    assert_eq!(snapshot.displays[0].focused_stack, Some(stack));

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["displays"][0]["stacks"][0]["tasks"][0]["activities"][0]["state"], "resumed");
    assert_eq!(sup.dump().without_timestamp(), snapshot.without_timestamp());
}

#[test]
fn test_resume_while_pausing_resumes_without_waiting_for_ack() {
    let (mut sup, stack, a) = with_resumed_root();
    let mut quick = spec("app/.Quick", "app");
    quick.resume_while_pausing = true;

    let b = sup.launch(stack, quick);
    assert_invariants(&sup);

    assert_eq!(sup.state_of(b), Some(ActivityState::Resumed));
    assert!(matches!(
        sup.state_of(a),
        Some(ActivityState::Paused | ActivityState::Stopping)
    ));
    assert!(matches!(
        sup.services().sent_to(a).into_iter().find(|t| t.name() == "pause"),
        Some(LifecycleTransaction::Pause {
            dont_report: true,
            ..
        })
    ));
    assert!(sup.focus().pausing_in(stack).is_none());
}

#[test]
fn test_resume_while_pausing_waits_for_picture_in_picture_candidate() {
    let mut sup = supervisor();
    let stack = sup.fullscreen_stack();
    let mut player = spec("video/.Player", "video");
    player.supports_picture_in_picture = true;
    let a = sup.launch(stack, player);
    sup.settle();

    let mut quick = spec("video/.Quick", "video");
    quick.resume_while_pausing = true;
    let b = sup.launch(stack, quick);
    assert_invariants(&sup);

    assert_eq!(sup.state_of(a), Some(ActivityState::Pausing));
    assert_eq!(sup.state_of(b), Some(ActivityState::Initializing));
    assert_eq!(sup.services().count(b, "launch"), 0);

    sup.activity_paused(a).unwrap();
    assert_invariants(&sup);
    assert_eq!(sup.state_of(b), Some(ActivityState::Resumed));
}

#[test]
fn test_visible_activity_behind_translucent_launch_is_started_after_pause() {
    let mut sup = supervisor();
    let back = sup.fullscreen_stack();
    let w = sup.launch(back, spec("w/.W", "w"));
    sup.settle();
    let front = sup.fullscreen_stack();
    let r = sup.launch(front, spec("r/.R", "r"));
    sup.settle();
    assert_eq!(sup.state_of(w), Some(ActivityState::Stopped));

    let pid_w = sup.processes()["w"];
    sup.handle_process_died(pid_w).unwrap();
    let pid = sup.services_mut().allocate_pid();
    sup.attach_process("w", pid).unwrap();
    assert_eq!(sup.hierarchy().activity(w).unwrap().process(), None);

    let t = sup.launch(back, spec("t/.T", "t").translucent());
    assert_eq!(sup.state_of(r), Some(ActivityState::Pausing));
    sup.settle();
    assert_invariants(&sup);

    assert_eq!(sup.state_of(t), Some(ActivityState::Resumed));
    let record = sup.hierarchy().activity(w).unwrap();
    assert!(record.visible_requested());
    assert_eq!(record.process(), Some(pid));
    assert_eq!(record.state(), ActivityState::Paused);
    assert_eq!(sup.services().count(w, "launch"), 2);
}
