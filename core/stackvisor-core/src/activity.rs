//! Activity records: the leaves of the hierarchy.
//!
//! An [`ActivityRecord`] owns its lifecycle state and the flags that feed the
//! visibility and keyguard computations. State changes go through
//! [`ActivityRecord::transition_to`], which rejects edges out of the terminal
//! teardown tail; the supervisor wraps that call so the focus registry stays in
//! sync with every change.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, StackError};
use crate::types::{ActivityId, ActivityState, LaunchMode, ProcessId, TaskId};

/// Static description of an activity supplied by whoever launches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySpec {
    pub component: String,
    pub process_name: String,
    #[serde(default)]
    pub affinity: Option<String>,
    #[serde(default)]
    pub launch_mode: LaunchMode,
    #[serde(default = "default_true")]
    pub occludes_parent: bool,
    #[serde(default)]
    pub no_history: bool,
    #[serde(default)]
    pub show_when_locked: bool,
    #[serde(default)]
    pub dismiss_keyguard: bool,
    #[serde(default)]
    pub resume_while_pausing: bool,
    #[serde(default)]
    pub supports_picture_in_picture: bool,
    #[serde(default = "default_true")]
    pub focusable: bool,
    #[serde(default)]
    pub state_not_needed: bool,
}

fn default_true() -> bool {
    true
}

impl ActivitySpec {
    pub fn new(component: impl Into<String>, process_name: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            process_name: process_name.into(),
            affinity: None,
            launch_mode: LaunchMode::Standard,
            occludes_parent: true,
            no_history: false,
            show_when_locked: false,
            dismiss_keyguard: false,
            resume_while_pausing: false,
            supports_picture_in_picture: false,
            focusable: true,
            state_not_needed: false,
        }
    }

    pub fn translucent(mut self) -> Self {
        self.occludes_parent = false;
        self
    }

    pub fn with_launch_mode(mut self, launch_mode: LaunchMode) -> Self {
        self.launch_mode = launch_mode;
        self
    }

    pub fn with_affinity(mut self, affinity: impl Into<String>) -> Self {
        self.affinity = Some(affinity.into());
        self
    }

    /// Task affinity, defaulting to the package part of the component.
    pub fn effective_affinity(&self) -> String {
        match &self.affinity {
            Some(affinity) => affinity.clone(),
            None => self
                .component
                .split('/')
                .next()
                .unwrap_or(&self.component)
                .to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub id: ActivityId,
    pub spec: ActivitySpec,
    pub(crate) task: TaskId,
    pub(crate) process: Option<ProcessId>,
    pub(crate) state: ActivityState,
    /// Mutable copy of `spec.occludes_parent`; translucent conversion flips it.
    pub(crate) occludes_parent: bool,
    pub(crate) finishing: bool,
    pub(crate) visible_requested: bool,
    pub(crate) visible_ignoring_keyguard: bool,
    pub(crate) now_visible: bool,
    /// Client saved instance state; set by a stop acknowledgement, cleared
    /// once a resume reaches the client.
    pub(crate) have_state: bool,
    pub(crate) has_been_launched: bool,
    pub(crate) launch_count: u32,
    pub(crate) last_launch_at: Option<Duration>,
    pub(crate) sleeping: bool,
    pub(crate) will_close_or_enter_pip: bool,
    pub(crate) pending_results: Vec<String>,
    pub(crate) new_intents: Vec<String>,
}

impl ActivityRecord {
    pub(crate) fn new(id: ActivityId, task: TaskId, spec: ActivitySpec) -> Self {
        let occludes_parent = spec.occludes_parent;
        Self {
            id,
            spec,
            task,
            process: None,
            state: ActivityState::Initializing,
            occludes_parent,
            finishing: false,
            visible_requested: false,
            visible_ignoring_keyguard: false,
            now_visible: false,
            have_state: false,
            has_been_launched: false,
            launch_count: 0,
            last_launch_at: None,
            sleeping: false,
            will_close_or_enter_pip: false,
            pending_results: Vec::new(),
            new_intents: Vec::new(),
        }
    }

    pub fn state(&self) -> ActivityState {
        self.state
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    pub fn process(&self) -> Option<ProcessId> {
        self.process
    }

    pub fn is_finishing(&self) -> bool {
        self.finishing
    }

    pub fn occludes_parent(&self) -> bool {
        self.occludes_parent
    }

    pub fn visible_requested(&self) -> bool {
        self.visible_requested
    }

    pub fn now_visible(&self) -> bool {
        self.now_visible
    }

    pub fn has_saved_state(&self) -> bool {
        self.have_state
    }

    pub fn is_state(&self, states: &[ActivityState]) -> bool {
        states.contains(&self.state)
    }

    pub fn attached_to_process(&self) -> bool {
        self.process.is_some()
    }

    /// Whether the activity is eligible for picture-in-picture when it leaves
    /// the foreground.
    pub fn can_enter_picture_in_picture(&self) -> bool {
        self.spec.supports_picture_in_picture
            && !self.finishing
            && self.is_state(&[
                ActivityState::Resumed,
                ActivityState::Pausing,
                ActivityState::Paused,
            ])
    }

    /// Applies a state change, returning the previous state.
    ///
    /// `Destroyed` is terminal, `Finishing` and `Destroying` only move forward,
    /// and a finishing activity can never be resumed again.
    pub(crate) fn transition_to(&mut self, next: ActivityState) -> Result<ActivityState> {
        let prev = self.state;
        if prev == next {
            return Ok(prev);
        }
        if !is_allowed_transition(prev, next, self.finishing) {
            return Err(StackError::InvalidTransition {
                activity: self.id,
                from: prev,
                to: next,
            });
        }
        self.state = next;
        if next == ActivityState::Resumed {
            self.sleeping = false;
        }
        Ok(prev)
    }
}

fn is_allowed_transition(from: ActivityState, to: ActivityState, finishing: bool) -> bool {
    use ActivityState::*;
    match from {
        Destroyed => false,
        Destroying => to == Destroyed,
        Finishing => matches!(to, Destroying | Destroyed),
        _ => match to {
            Resumed => !finishing,
            Destroying => false,
            _ => true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ActivityRecord {
        ActivityRecord::new(
            ActivityId(1),
            TaskId(1),
            ActivitySpec::new("com.example/.Main", "com.example"),
        )
    }

    #[test]
    fn pause_resume_cycle_is_allowed() {
        let mut activity = record();
        for state in [
            ActivityState::Resumed,
            ActivityState::Pausing,
            ActivityState::Paused,
            ActivityState::Resumed,
        ] {
            activity.transition_to(state).expect("cycle edge");
        }
        assert_eq!(activity.state(), ActivityState::Resumed);
    }

    #[test]
    fn destroyed_is_terminal() {
        let mut activity = record();
        activity.transition_to(ActivityState::Destroyed).unwrap();
        let err = activity.transition_to(ActivityState::Resumed).unwrap_err();
        assert!(matches!(err, StackError::InvalidTransition { .. }));
    }

    #[test]
    fn teardown_only_moves_forward() {
        let mut activity = record();
        activity.transition_to(ActivityState::Finishing).unwrap();
        assert!(activity.transition_to(ActivityState::Paused).is_err());
        activity.transition_to(ActivityState::Destroying).unwrap();
        assert!(activity.transition_to(ActivityState::Finishing).is_err());
        activity.transition_to(ActivityState::Destroyed).unwrap();
    }

    #[test]
    fn destroying_requires_finishing_first() {
        let mut activity = record();
        activity.transition_to(ActivityState::Stopped).unwrap();
        assert!(activity.transition_to(ActivityState::Destroying).is_err());
    }

    #[test]
    fn finishing_activity_cannot_resume() {
        let mut activity = record();
        activity.transition_to(ActivityState::Paused).unwrap();
        activity.finishing = true;
        assert!(activity.transition_to(ActivityState::Resumed).is_err());
    }

    #[test]
    fn resume_wakes_sleeping_activity() {
        let mut activity = record();
        activity.transition_to(ActivityState::Stopped).unwrap();
        activity.sleeping = true;
        activity.have_state = true;
        activity.transition_to(ActivityState::Resumed).unwrap();
        assert!(!activity.sleeping);
        assert!(activity.has_saved_state());
    }

    #[test]
    fn affinity_defaults_to_package() {
        let spec = ActivitySpec::new("com.example/.Main", "com.example");
        assert_eq!(spec.effective_affinity(), "com.example");
        let spec = spec.with_affinity("shared");
        assert_eq!(spec.effective_affinity(), "shared");
    }

    #[test]
    fn picture_in_picture_needs_support_and_foreground_state() {
        let mut activity = record();
        activity.spec.supports_picture_in_picture = true;
        assert!(!activity.can_enter_picture_in_picture());
        activity.transition_to(ActivityState::Resumed).unwrap();
        assert!(activity.can_enter_picture_in_picture());
    }
}
