//! Stacks: screen regions hosting an ordered list of tasks.
//!
//! There is one `Stack` type for every region kind; fullscreen, split-screen
//! halves, pinned and freeform stacks differ only in their [`WindowingMode`]
//! and [`ActivityType`]. The resumed and pausing pointers are not stored here:
//! they live in the [`FocusCoordinator`](crate::focus::FocusCoordinator) so no
//! stack ever writes another stack's focus state.

use std::collections::BTreeSet;

use crate::keyguard::KeyguardScan;
use crate::types::{
    ActivityId, ActivityType, Bounds, DisplayId, StackId, StackVisibility, TaskId, WindowingMode,
};

#[derive(Debug, Clone)]
pub struct Stack {
    pub id: StackId,
    pub(crate) display: DisplayId,
    pub(crate) windowing_mode: WindowingMode,
    pub(crate) activity_type: ActivityType,
    /// Bottom to top.
    pub(crate) tasks: Vec<TaskId>,
    pub(crate) last_paused_activity: Option<ActivityId>,
    pub(crate) last_no_history_activity: Option<ActivityId>,
    pub(crate) visibility: StackVisibility,
    pub(crate) force_hidden: bool,
    pub(crate) bounds: Option<Bounds>,
    /// Re-entrancy latch for `resume_top_activity`.
    pub(crate) in_resume_top_activity: bool,
    pub(crate) keyguard_scan: KeyguardScan,
    pub(crate) translucent_activity_waiting: Option<ActivityId>,
    pub(crate) undrawn_below_translucent: BTreeSet<ActivityId>,
}

impl Stack {
    pub(crate) fn new(
        id: StackId,
        display: DisplayId,
        windowing_mode: WindowingMode,
        activity_type: ActivityType,
    ) -> Self {
        Self {
            id,
            display,
            windowing_mode,
            activity_type,
            tasks: Vec::new(),
            last_paused_activity: None,
            last_no_history_activity: None,
            visibility: StackVisibility::Invisible,
            force_hidden: false,
            bounds: None,
            in_resume_top_activity: false,
            keyguard_scan: KeyguardScan::default(),
            translucent_activity_waiting: None,
            undrawn_below_translucent: BTreeSet::new(),
        }
    }

    pub fn display(&self) -> DisplayId {
        self.display
    }

    pub fn windowing_mode(&self) -> WindowingMode {
        self.windowing_mode
    }

    pub fn activity_type(&self) -> ActivityType {
        self.activity_type
    }

    /// Tasks bottom to top.
    pub fn tasks(&self) -> &[TaskId] {
        &self.tasks
    }

    pub fn top_task(&self) -> Option<TaskId> {
        self.tasks.last().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_home(&self) -> bool {
        self.activity_type == ActivityType::Home
    }

    pub fn is_force_hidden(&self) -> bool {
        self.force_hidden
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    /// Visibility computed by the most recent visibility pass.
    pub fn cached_visibility(&self) -> StackVisibility {
        self.visibility
    }

    pub fn last_paused_activity(&self) -> Option<ActivityId> {
        self.last_paused_activity
    }

    pub fn last_no_history_activity(&self) -> Option<ActivityId> {
        self.last_no_history_activity
    }

    pub fn translucent_activity_waiting(&self) -> Option<ActivityId> {
        self.translucent_activity_waiting
    }

    pub fn keyguard_scan(&self) -> &KeyguardScan {
        &self.keyguard_scan
    }

    /// Pinned stacks never take input focus.
    pub fn is_focusable(&self) -> bool {
        self.windowing_mode != WindowingMode::Pinned
    }

    pub(crate) fn position_task(&mut self, task: TaskId, on_top: bool) {
        self.tasks.retain(|id| *id != task);
        if on_top {
            self.tasks.push(task);
        } else {
            self.tasks.insert(0, task);
        }
    }

    pub(crate) fn remove_task(&mut self, task: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|id| *id != task);
        before != self.tasks.len()
    }

    /// Drops weak references to an activity that is leaving the stack.
    pub(crate) fn forget_activity(&mut self, activity: ActivityId) {
        if self.last_paused_activity == Some(activity) {
            self.last_paused_activity = None;
        }
        if self.last_no_history_activity == Some(activity) {
            self.last_no_history_activity = None;
        }
        if self.keyguard_scan.top_dismissing_keyguard_activity == Some(activity) {
            self.keyguard_scan.top_dismissing_keyguard_activity = None;
        }
        self.undrawn_below_translucent.remove(&activity);
    }
}
