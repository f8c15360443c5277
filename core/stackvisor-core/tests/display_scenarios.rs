//! Multi-window and multi-display scenarios.

use stackvisor_core::testing::{spec, supervisor, TestSupervisor};
use stackvisor_core::{
    check_invariants, ActivityState, ActivityType, StackVisibility, WindowingMode,
};

fn assert_invariants(sup: &TestSupervisor) {
    let violations = check_invariants(sup);
    assert!(violations.is_empty(), "invariant violations: {violations:?}");
}

#[test]
fn test_split_screen_primary_shows_secondary_until_dismissed() {
    let mut sup = supervisor();
    let back = sup.fullscreen_stack();
    let a = sup.launch(back, spec("mail/.Inbox", "mail"));
    sup.settle();
    let front = sup.fullscreen_stack();
    let b = sup.launch(front, spec("maps/.Map", "maps"));
    sup.settle();
    assert!(!sup.hierarchy().activity(a).unwrap().visible_requested());

    sup.set_windowing_mode(front, WindowingMode::SplitScreenPrimary)
        .unwrap();
    sup.settle();
    assert_invariants(&sup);
    assert_eq!(
        sup.hierarchy().stack(back).unwrap().windowing_mode(),
        WindowingMode::SplitScreenSecondary
    );
    assert!(sup.should_be_visible(back, None));
    assert!(sup.hierarchy().activity(a).unwrap().visible_requested());
    assert_eq!(sup.state_of(b), Some(ActivityState::Resumed));

    sup.set_windowing_mode(front, WindowingMode::Fullscreen).unwrap();
    sup.settle();
    assert_invariants(&sup);
    assert_eq!(
        sup.hierarchy().stack(back).unwrap().windowing_mode(),
        WindowingMode::Fullscreen
    );
    assert!(!sup.hierarchy().activity(a).unwrap().visible_requested());
}

#[test]
fn test_assistant_over_primary_visible_only_during_recents() {
    let mut sup = supervisor();
    let primary = sup.stack_with(WindowingMode::SplitScreenPrimary, ActivityType::Standard);
    sup.launch(primary, spec("notes/.Edit", "notes"));
    sup.settle();
    let assistant = sup.stack_with(WindowingMode::Fullscreen, ActivityType::Assistant);
    sup.launch(assistant, spec("assist/.Voice", "assist"));
    sup.settle();

    assert_eq!(sup.get_visibility(primary, None), StackVisibility::Invisible);

    sup.set_recents_animation_running(true);
    assert_eq!(sup.get_visibility(primary, None), StackVisibility::Visible);

    sup.set_recents_animation_running(false);
    assert!(!sup.should_be_visible(primary, None));
    assert_invariants(&sup);
}

#[test]
fn test_reparent_task_removes_emptied_stack() {
    let mut sup = supervisor();
    let back = sup.fullscreen_stack();
    let a = sup.launch(back, spec("one/.A", "one"));
    sup.settle();
    let front = sup.fullscreen_stack();
    let b = sup.launch(front, spec("two/.B", "two"));
    sup.settle();

    let task = sup.hierarchy().activity(a).unwrap().task();
    sup.reparent_task(task, front, true).unwrap();
    sup.settle();
    assert_invariants(&sup);

    assert!(sup.hierarchy().stack(back).is_err());
    assert_eq!(sup.hierarchy().task(task).unwrap().stack(), front);
    assert_eq!(sup.hierarchy().stack(front).unwrap().top_task(), Some(task));
    assert_eq!(sup.state_of(a), Some(ActivityState::Resumed));
    assert_eq!(sup.state_of(b), Some(ActivityState::Stopped));
}

#[test]
fn test_secondary_display_keeps_its_own_focus() {
    let mut sup = supervisor();
    let home = sup.fullscreen_stack();
    sup.launch(home, spec("launcher/.Home", "launcher"));
    sup.settle();

    let external = sup.add_display(false);
    let stack = sup
        .create_stack(external, WindowingMode::Fullscreen, ActivityType::Standard, true)
        .unwrap();
    let a = sup.launch(stack, spec("slides/.Present", "slides"));
    sup.settle();
    assert_invariants(&sup);

    assert_eq!(sup.focused_stack_on_display(external), Some(stack));
    assert_eq!(sup.focused_stack_on_display(sup.default_display()), Some(home));
    assert!(sup.is_focusable_and_visible(stack));
    assert_eq!(sup.state_of(a), Some(ActivityState::Resumed));
}

#[test]
fn test_trusted_keyguard_shows_insecure_display_content() {
    let mut sup = supervisor();
    let display = sup.add_display(true);
    let stack = sup
        .create_stack(display, WindowingMode::Fullscreen, ActivityType::Standard, true)
        .unwrap();
    let a = sup.launch(stack, spec("cast/.Screen", "cast"));
    sup.settle();

    sup.set_keyguard_secure(true);
    sup.set_keyguard_shown(true, false).unwrap();
    assert!(!sup.hierarchy().activity(a).unwrap().visible_requested());

    sup.set_keyguard_trusted(true);
    assert_invariants(&sup);
    assert!(sup.hierarchy().activity(a).unwrap().visible_requested());
}

#[test]
fn test_convert_from_translucent_hides_uncovered_activity_again() {
    let mut sup = supervisor();
    let stack = sup.fullscreen_stack();
    let a = sup.launch(stack, spec("app/.A", "app"));
    sup.settle();
    let b = sup.launch(stack, spec("app/.B", "app"));
    sup.settle();

    assert!(sup.convert_to_translucent(b).unwrap());
    sup.activity_drawn(a).unwrap();
    assert!(sup.hierarchy().activity(a).unwrap().visible_requested());

    assert!(sup.convert_from_translucent(b).unwrap());
    assert!(!sup.convert_from_translucent(b).unwrap());
    sup.settle();
    assert_invariants(&sup);
    assert!(!sup.hierarchy().activity(a).unwrap().visible_requested());
    assert_eq!(sup.state_of(a), Some(ActivityState::Stopped));
}
