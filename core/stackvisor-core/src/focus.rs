//! Authoritative registry of resumed and pausing activities.
//!
//! Stacks never hold these pointers themselves. Every change goes through the
//! supervisor, which keeps this registry in step with activity states, so the
//! single-resumed rule can be checked in one place.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::types::{ActivityId, StackId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FocusCoordinator {
    resumed: BTreeMap<StackId, ActivityId>,
    pausing: BTreeMap<StackId, ActivityId>,
}

impl FocusCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resumed_in(&self, stack: StackId) -> Option<ActivityId> {
        self.resumed.get(&stack).copied()
    }

    pub fn pausing_in(&self, stack: StackId) -> Option<ActivityId> {
        self.pausing.get(&stack).copied()
    }

    /// The globally resumed activity, if any.
    pub fn resumed_activity(&self) -> Option<ActivityId> {
        self.resumed.values().next().copied()
    }

    pub fn resumed(&self) -> impl Iterator<Item = (StackId, ActivityId)> + '_ {
        self.resumed.iter().map(|(stack, activity)| (*stack, *activity))
    }

    pub fn pausing(&self) -> impl Iterator<Item = (StackId, ActivityId)> + '_ {
        self.pausing.iter().map(|(stack, activity)| (*stack, *activity))
    }

    pub fn all_pauses_complete(&self) -> bool {
        self.pausing.is_empty()
    }

    pub(crate) fn set_resumed(&mut self, stack: StackId, activity: ActivityId) {
        if let Some(previous) = self.resumed.insert(stack, activity) {
            if previous != activity {
                tracing::error!(
                    stack = %stack,
                    previous = %previous,
                    activity = %activity,
                    "Resumed pointer overwritten without pausing"
                );
            }
        }
    }

    pub(crate) fn clear_resumed(&mut self, stack: StackId, activity: ActivityId) {
        if self.resumed.get(&stack) == Some(&activity) {
            self.resumed.remove(&stack);
        }
    }

    pub(crate) fn set_pausing(&mut self, stack: StackId, activity: ActivityId) {
        self.pausing.insert(stack, activity);
    }

    pub(crate) fn clear_pausing(&mut self, stack: StackId) -> Option<ActivityId> {
        self.pausing.remove(&stack)
    }

    /// Moves pointers held for `activity` from one stack to another.
    pub(crate) fn move_activity(&mut self, activity: ActivityId, from: StackId, to: StackId) {
        if self.resumed.get(&from) == Some(&activity) {
            self.resumed.remove(&from);
            self.resumed.insert(to, activity);
        }
        if self.pausing.get(&from) == Some(&activity) {
            self.pausing.remove(&from);
            self.pausing.insert(to, activity);
        }
    }

    pub(crate) fn forget_activity(&mut self, activity: ActivityId) {
        self.resumed.retain(|_, id| *id != activity);
        self.pausing.retain(|_, id| *id != activity);
    }

    pub(crate) fn forget_stack(&mut self, stack: StackId) {
        self.resumed.remove(&stack);
        self.pausing.remove(&stack);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_resumed_ignores_other_activity() {
        let mut focus = FocusCoordinator::new();
        focus.set_resumed(StackId(1), ActivityId(1));
        focus.clear_resumed(StackId(1), ActivityId(2));
        assert_eq!(focus.resumed_in(StackId(1)), Some(ActivityId(1)));
        focus.clear_resumed(StackId(1), ActivityId(1));
        assert_eq!(focus.resumed_activity(), None);
    }

    #[test]
    fn pauses_complete_when_no_pointer_left() {
        let mut focus = FocusCoordinator::new();
        assert!(focus.all_pauses_complete());
        focus.set_pausing(StackId(2), ActivityId(5));
        assert!(!focus.all_pauses_complete());
        assert_eq!(focus.clear_pausing(StackId(2)), Some(ActivityId(5)));
        assert!(focus.all_pauses_complete());
    }

    #[test]
    fn move_activity_carries_pointers() {
        let mut focus = FocusCoordinator::new();
        focus.set_resumed(StackId(1), ActivityId(3));
        focus.move_activity(ActivityId(3), StackId(1), StackId(2));
        assert_eq!(focus.resumed_in(StackId(1)), None);
        assert_eq!(focus.resumed_in(StackId(2)), Some(ActivityId(3)));
    }

    #[test]
    fn forget_activity_drops_every_pointer() {
        let mut focus = FocusCoordinator::new();
        focus.set_resumed(StackId(1), ActivityId(3));
        focus.set_pausing(StackId(2), ActivityId(3));
        focus.forget_activity(ActivityId(3));
        assert_eq!(focus.resumed().count(), 0);
        assert_eq!(focus.pausing().count(), 0);
    }
}
