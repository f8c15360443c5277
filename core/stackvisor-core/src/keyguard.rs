//! Lock screen state and its influence on activity visibility.
//!
//! The controller tracks what the system UI reports (keyguard showing, AOD,
//! secure, trusted) and what the last visibility pass derived per display
//! (occluded, dismissing activity). Activities consult it through
//! [`KeyguardController::check_keyguard_visibility`], which also records the
//! per-stack [`KeyguardScan`] the next occlusion update reads.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::activity::ActivityRecord;
use crate::types::{ActivityId, DisplayId};

/// Keyguard facts collected while walking one stack top to bottom.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyguardScan {
    pub top_dismissing_keyguard_activity: Option<ActivityId>,
    pub top_activity_occludes_keyguard: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DisplayKeyguardState {
    pub occluded: bool,
    pub dismissing_activity: Option<ActivityId>,
}

/// Outcome of recomputing one display after a visibility pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyguardUpdate {
    pub occluded_changed: bool,
    pub request_dismiss: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyguardController {
    showing: bool,
    aod_showing: bool,
    secure: bool,
    trusted: bool,
    going_away: bool,
    dismissal_requested: bool,
    displays: BTreeMap<DisplayId, DisplayKeyguardState>,
}

impl KeyguardController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_showing(&self) -> bool {
        self.showing
    }

    pub fn is_aod_showing(&self) -> bool {
        self.aod_showing
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn is_dismissal_requested(&self) -> bool {
        self.dismissal_requested
    }

    pub fn display_state(&self, display: DisplayId) -> DisplayKeyguardState {
        self.displays.get(&display).cloned().unwrap_or_default()
    }

    pub fn is_display_occluded(&self, display: DisplayId) -> bool {
        self.displays
            .get(&display)
            .is_some_and(|state| state.occluded)
    }

    /// Keyguard or AOD is up on the display and nothing occludes it.
    pub fn is_keyguard_or_aod_showing(&self, display: DisplayId) -> bool {
        (self.showing || self.aod_showing)
            && !self.going_away
            && !self.is_display_occluded(display)
    }

    /// Keyguard is up, possibly occluded by a show-when-locked activity.
    pub fn is_keyguard_locked(&self) -> bool {
        self.showing && !self.going_away
    }

    pub fn can_dismiss_keyguard(&self) -> bool {
        self.trusted || !self.secure
    }

    /// Returns whether the showing state actually changed.
    pub(crate) fn set_keyguard_shown(&mut self, showing: bool, aod_showing: bool) -> bool {
        let showing_changed = showing != self.showing || (self.going_away && showing);
        let aod_changed = aod_showing != self.aod_showing;
        if !showing_changed && !aod_changed {
            return false;
        }
        self.showing = showing;
        self.aod_showing = aod_showing;
        if showing_changed {
            self.going_away = false;
            if showing {
                self.dismissal_requested = false;
            }
        }
        tracing::info!(showing, aod_showing, "Keyguard shown state changed");
        true
    }

    pub(crate) fn set_secure(&mut self, secure: bool) {
        self.secure = secure;
    }

    pub(crate) fn set_trusted(&mut self, trusted: bool) {
        self.trusted = trusted;
    }

    pub(crate) fn keyguard_going_away(&mut self) {
        if self.showing {
            self.going_away = true;
        }
    }

    pub(crate) fn forget_activity(&mut self, activity: ActivityId) {
        for state in self.displays.values_mut() {
            if state.dismissing_activity == Some(activity) {
                state.dismissing_activity = None;
            }
        }
    }

    /// Dismiss-keyguard activities may show over the keyguard only when it
    /// can be dismissed right away and AOD is not up.
    fn can_show_activity_while_keyguard_showing(
        &self,
        record: &ActivityRecord,
        display: DisplayId,
    ) -> bool {
        let dismissing = self.display_state(display).dismissing_activity;
        record.spec.dismiss_keyguard
            && self.can_dismiss_keyguard()
            && !self.aod_showing
            && (self.dismissal_requested
                || (record.spec.show_when_locked && dismissing != Some(record.id)))
    }

    pub fn can_show_while_occluded(&self, dismiss_keyguard: bool, show_when_locked: bool) -> bool {
        show_when_locked || (dismiss_keyguard && !self.secure)
    }

    /// Folds keyguard state into the visibility of one activity.
    ///
    /// Records the top dismissing activity of the stack and, when `is_top`,
    /// whether the stack's top activity occludes the keyguard.
    pub fn check_keyguard_visibility(
        &self,
        scan: &mut KeyguardScan,
        record: &ActivityRecord,
        display: DisplayId,
        can_show_with_insecure_keyguard: bool,
        should_be_visible: bool,
        is_top: bool,
    ) -> bool {
        let show_when_locked = record.spec.show_when_locked;
        let dismiss_keyguard = record.spec.dismiss_keyguard;

        if should_be_visible {
            if dismiss_keyguard && scan.top_dismissing_keyguard_activity.is_none() {
                scan.top_dismissing_keyguard_activity = Some(record.id);
            }
            if is_top {
                scan.top_activity_occludes_keyguard |= show_when_locked;
            }
            if can_show_with_insecure_keyguard && self.can_dismiss_keyguard() {
                return true;
            }
        }

        if self.is_keyguard_or_aod_showing(display) {
            should_be_visible && self.can_show_activity_while_keyguard_showing(record, display)
        } else if self.is_keyguard_locked() {
            should_be_visible && self.can_show_while_occluded(dismiss_keyguard, show_when_locked)
        } else {
            should_be_visible
        }
    }

    /// Stores the occlusion result derived for a display.
    pub(crate) fn visibility_changed(
        &mut self,
        display_id: DisplayId,
        occluded: bool,
        dismissing_activity: Option<ActivityId>,
    ) -> KeyguardUpdate {
        let state = self.displays.entry(display_id).or_default();
        let last_occluded = state.occluded;
        let last_dismissing = state.dismissing_activity;
        state.occluded = occluded;
        state.dismissing_activity = dismissing_activity;

        let occluded_changed = last_occluded != occluded;
        if occluded_changed {
            tracing::info!(display = %display_id, occluded, "Keyguard occlusion changed");
        }

        let request_dismiss = last_dismissing != dismissing_activity
            && !occluded
            && dismissing_activity.is_some()
            && self.secure;
        if request_dismiss {
            self.dismissal_requested = true;
            tracing::debug!(display = %display_id, activity = ?dismissing_activity, "Keyguard dismissal requested");
        }

        KeyguardUpdate {
            occluded_changed,
            request_dismiss,
        }
    }
}
