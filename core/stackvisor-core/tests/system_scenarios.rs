//! Launch modes, keyguard, power and ordering scenarios.

use stackvisor_core::testing::{spec, supervisor, TestSupervisor};
use stackvisor_core::{
    check_invariants, ActivityId, ActivityState, AppTransition, Bounds, LaunchMode,
    LifecycleTransaction, StackId, StartRequest, WindowingMode,
};

fn assert_invariants(sup: &TestSupervisor) {
    let violations = check_invariants(sup);
    assert!(violations.is_empty(), "invariant violations: {violations:?}");
}

fn with_resumed_root() -> (TestSupervisor, StackId, ActivityId) {
    let mut sup = supervisor();
    let stack = sup.fullscreen_stack();
    let a = sup.launch(stack, spec("app/.A", "app"));
    sup.settle();
    (sup, stack, a)
}

// ─────────────────────────────────────────────────────────────────────────────
// Launch modes
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_single_top_reuses_top_and_delivers_intent() {
    let mut sup = supervisor();
    let stack = sup.fullscreen_stack();
    let top = spec("app/.Search", "app").with_launch_mode(LaunchMode::SingleTop);
    let a = sup.launch(stack, top.clone());
    sup.settle();

    let outcome = sup
        .start_activity(StartRequest::new(top).with_intent("query"))
        .unwrap();
    assert_invariants(&sup);

    assert!(outcome.reused);
    assert_eq!(outcome.activity, a);
    assert_eq!(sup.hierarchy().activities().count(), 1);
    assert_eq!(
        sup.services().last_to(a),
        Some(&LifecycleTransaction::NewIntent {
            intents: vec!["query".to_string()],
        })
    );
    assert_eq!(sup.state_of(a), Some(ActivityState::Resumed));
}

#[test]
fn test_single_top_below_top_creates_new_instance() {
    let mut sup = supervisor();
    let stack = sup.fullscreen_stack();
    let top = spec("app/.Search", "app").with_launch_mode(LaunchMode::SingleTop);
    let a = sup.launch(stack, top.clone());
    sup.settle();
    sup.launch(stack, spec("app/.Detail", "app"));
    sup.settle();

    let outcome = sup.start_activity(StartRequest::new(top).in_stack(stack)).unwrap();
    assert!(!outcome.reused);
    assert_ne!(outcome.activity, a);
}

#[test]
fn test_single_task_clears_activities_above() {
    let mut sup = supervisor();
    let stack = sup.fullscreen_stack();
    let main = spec("app/.Main", "app").with_launch_mode(LaunchMode::SingleTask);
    let a = sup.launch(stack, main.clone());
    sup.settle();
    let b = sup.launch(stack, spec("app/.B", "app"));
    sup.settle();
    let c = sup.launch(stack, spec("app/.C", "app"));
    sup.settle();
    let task = sup.hierarchy().activity(a).unwrap().task();
    assert_eq!(sup.hierarchy().task(task).unwrap().activities(), &[a, b, c]);

    let outcome = sup
        .start_activity(StartRequest::new(main).with_intent("home"))
        .unwrap();
    assert!(outcome.reused);
    assert_eq!(outcome.activity, a);
    assert_invariants(&sup);

    sup.settle();
    assert_invariants(&sup);
    assert_eq!(sup.hierarchy().task(task).unwrap().activities(), &[a]);
    assert_eq!(sup.state_of(a), Some(ActivityState::Resumed));
    assert_eq!(
        sup.services().last_to(a),
        Some(&LifecycleTransaction::Resume {
            results: vec![],
            new_intents: vec!["home".to_string()],
        })
    );
}

#[test]
fn test_new_task_request_opens_task() {
    let (mut sup, stack, a) = with_resumed_root();
    let b = sup
        .start_activity(StartRequest::new(spec("other/.Main", "other")).in_stack(stack).in_new_task())
        .unwrap()
        .activity;
    sup.settle();
    assert_invariants(&sup);

    let task_a = sup.hierarchy().activity(a).unwrap().task();
    let task_b = sup.hierarchy().activity(b).unwrap().task();
    assert_ne!(task_a, task_b);
    assert_eq!(sup.hierarchy().stack(stack).unwrap().top_task(), Some(task_b));
    assert!(sup.services().transitions.contains(&AppTransition::TaskOpen));
}

// ─────────────────────────────────────────────────────────────────────────────
// Keyguard
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_keyguard_hides_ordinary_activity() {
    let (mut sup, _, a) = with_resumed_root();
    sup.set_keyguard_shown(true, false).unwrap();
    assert_invariants(&sup);

    assert!(!sup.hierarchy().activity(a).unwrap().visible_requested());
    assert!(!sup.keyguard().is_display_occluded(sup.default_display()));
    assert!(!sup.keyguard().is_aod_showing());
    assert!(sup.services().keyguard_occluded.is_empty());
}

#[test]
fn test_show_when_locked_activity_occludes_keyguard() {
    let (mut sup, stack, a) = with_resumed_root();
    sup.set_keyguard_shown(true, false).unwrap();

    let mut alarm = spec("clock/.Alarm", "clock");
    alarm.show_when_locked = true;
    let b = sup.launch(stack, alarm);
    sup.settle();
    assert_invariants(&sup);

    assert_eq!(sup.state_of(b), Some(ActivityState::Resumed));
    assert!(sup.hierarchy().activity(b).unwrap().visible_requested());
    assert!(!sup.hierarchy().activity(a).unwrap().visible_requested());
    assert!(sup.keyguard().is_display_occluded(sup.default_display()));
    assert_eq!(sup.services().keyguard_occluded.first(), Some(&true));
}

#[test]
fn test_dismiss_keyguard_activity_requests_dismissal_once() {
    let (mut sup, stack, _) = with_resumed_root();
    sup.set_keyguard_secure(true);
    sup.set_keyguard_shown(true, false).unwrap();

    let mut unlock = spec("bank/.Pay", "bank");
    unlock.dismiss_keyguard = true;
    sup.launch(stack, unlock);
    sup.settle();
    assert_invariants(&sup);

    assert!(sup.keyguard().is_secure());
    assert_eq!(sup.services().dismiss_keyguard_requests, 1);
    assert!(sup.keyguard().is_dismissal_requested());
}

#[test]
fn test_keyguard_going_away_shows_activity_again() {
    let (mut sup, _, a) = with_resumed_root();
    sup.set_keyguard_shown(true, false).unwrap();
    assert!(!sup.hierarchy().activity(a).unwrap().visible_requested());

    sup.keyguard_going_away();
    assert_invariants(&sup);
    assert!(sup.hierarchy().activity(a).unwrap().visible_requested());
    assert_eq!(
        sup.services().last_to(a),
        Some(&LifecycleTransaction::Visibility { visible: true })
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Power
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_sleep_pauses_and_stops_then_wake_resumes() {
    let (mut sup, _, a) = with_resumed_root();

    sup.go_to_sleep().unwrap();
    assert_eq!(sup.state_of(a), Some(ActivityState::Pausing));
    sup.settle();
    assert_invariants(&sup);
    assert!(sup.is_sleeping());
    assert_eq!(sup.state_of(a), Some(ActivityState::Stopped));

    sup.wake_up().unwrap();
    assert_invariants(&sup);
    assert!(!sup.is_sleeping());
    assert_eq!(sup.state_of(a), Some(ActivityState::Resumed));
    assert!(matches!(
        sup.services().last_to(a),
        Some(LifecycleTransaction::Resume { .. })
    ));
}

#[test]
fn test_no_resume_while_asleep() {
    let (mut sup, _, a) = with_resumed_root();
    sup.go_to_sleep().unwrap();
    sup.settle();

    let resumes = sup.services().count(a, "resume");
    sup.resume_focused_stacks_top_activities().unwrap();
    assert_eq!(sup.services().count(a, "resume"), resumes);
    assert_eq!(sup.state_of(a), Some(ActivityState::Stopped));
}

#[test]
fn test_shutdown_blocks_wake() {
    let (mut sup, _, a) = with_resumed_root();
    sup.shutdown().unwrap();
    sup.settle();
    assert!(sup.is_shutting_down());

    sup.wake_up().unwrap();
    assert!(sup.is_sleeping());
    assert_eq!(sup.state_of(a), Some(ActivityState::Stopped));
    assert_invariants(&sup);
}

// ─────────────────────────────────────────────────────────────────────────────
// Ordering
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_move_task_to_back_resumes_stack_below() {
    let (mut sup, _, a) = with_resumed_root();
    let front = sup.fullscreen_stack();
    let b = sup.launch(front, spec("two/.B", "two"));
    sup.settle();
    assert_eq!(sup.state_of(a), Some(ActivityState::Stopped));

    let task = sup.hierarchy().activity(b).unwrap().task();
    sup.move_task_to_back(task).unwrap();
    assert_eq!(sup.state_of(b), Some(ActivityState::Pausing));
    sup.settle();
    assert_invariants(&sup);

    assert_eq!(sup.state_of(a), Some(ActivityState::Resumed));
    assert_eq!(sup.state_of(b), Some(ActivityState::Stopped));
}

#[test]
fn test_move_to_pinned_keeps_task_visible_behind_focus() {
    let (mut sup, _, a) = with_resumed_root();
    let front = sup.fullscreen_stack();
    let b = sup.launch(front, spec("video/.Player", "video"));
    sup.settle();

    let task = sup.hierarchy().activity(b).unwrap().task();
    let bounds = Bounds::new(0, 0, 320, 180);
    let pinned = sup.move_task_to_pinned_stack(task, bounds).unwrap();
    sup.settle();
    assert_invariants(&sup);

    assert!(sup.hierarchy().stack(front).is_err());
    let record = sup.hierarchy().stack(pinned).unwrap();
    assert_eq!(record.windowing_mode(), WindowingMode::Pinned);
    assert_eq!(record.bounds(), Some(bounds));
    assert_eq!(sup.services().bounds_animations, vec![(pinned, bounds)]);

    assert_eq!(sup.state_of(a), Some(ActivityState::Resumed));
    assert_eq!(sup.state_of(b), Some(ActivityState::Paused));
    assert!(sup.hierarchy().activity(b).unwrap().visible_requested());
}

#[test]
fn test_force_hidden_stack_gives_up_focus() {
    let (mut sup, back, a) = with_resumed_root();
    let front = sup.fullscreen_stack();
    let b = sup.launch(front, spec("two/.B", "two"));
    sup.settle();

    sup.set_force_hidden(front, true).unwrap();
    sup.settle();
    assert_invariants(&sup);

    assert_eq!(sup.top_focused_stack(), Some(back));
    assert_eq!(sup.state_of(a), Some(ActivityState::Resumed));
    assert!(!sup.hierarchy().activity(b).unwrap().visible_requested());
}

#[test]
fn test_remove_task_finishes_every_activity() {
    let (mut sup, stack, a) = with_resumed_root();
    let b = sup.launch(stack, spec("app/.B", "app"));
    sup.settle();
    let task = sup.hierarchy().activity(a).unwrap().task();

    sup.remove_task(task).unwrap();
    sup.settle();
    assert_invariants(&sup);

    assert!(!sup.hierarchy().contains_activity(a));
    assert!(!sup.hierarchy().contains_activity(b));
    assert!(sup.hierarchy().task(task).is_err());
}
