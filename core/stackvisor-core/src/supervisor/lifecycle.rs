//! Pause and resume protocol.
//!
//! Resuming a new top activity is a two-step affair: every other resumed
//! activity is asked to pause, and the resume itself only happens once the
//! last pause completes (by acknowledgement, timeout or process death). The
//! completion paths all funnel into [`StackSupervisor::complete_operation`],
//! which consumes the pending record so a late duplicate does nothing.

use crate::error::Result;
use crate::services::{AppTransition, LifecycleTransaction, SystemServices};
use crate::types::{ActivityId, ActivityState, Completion, StackId, TimeoutKind};

use super::teardown::FinishMode;
use super::StackSupervisor;

impl<S: SystemServices> StackSupervisor<S> {
    // ─────────────────────────────────────────────────────────────────────
    // Client Acknowledgements
    // ─────────────────────────────────────────────────────────────────────

    pub fn activity_paused(&mut self, activity: ActivityId) -> Result<()> {
        self.run_entry("activity_paused", |s| {
            s.complete_operation(activity, TimeoutKind::Pause, Completion::Acked)
        })
    }

    pub fn activity_stopped(&mut self, activity: ActivityId) -> Result<()> {
        self.run_entry("activity_stopped", |s| {
            s.complete_operation(activity, TimeoutKind::Stop, Completion::Acked)
        })
    }

    pub fn activity_destroyed(&mut self, activity: ActivityId) -> Result<()> {
        self.run_entry("activity_destroyed", |s| {
            s.complete_operation(activity, TimeoutKind::Destroy, Completion::Acked)
        })
    }

    /// The client went idle; deferred stops and destroys may proceed.
    pub fn activity_idle(&mut self, activity: ActivityId) -> Result<()> {
        self.run_entry("activity_idle", |s| {
            if let Ok(record) = s.hierarchy.activity_mut(activity) {
                record.now_visible |= record.visible_requested;
            }
            s.process_stopping_activities(true)
        })
    }

    /// Single completion path for acknowledgements, timeouts and process death.
    ///
    /// Completions for operations that are no longer pending are ignored,
    /// which makes every acknowledgement idempotent.
    pub(crate) fn complete_operation(
        &mut self,
        activity: ActivityId,
        kind: TimeoutKind,
        completion: Completion,
    ) -> Result<()> {
        // Timeouts and deaths are only dispatched for operations that were pending.
        let was_pending =
            self.pending.resolve(activity, kind) || completion != Completion::Acked;
        if !self.hierarchy.contains_activity(activity) {
            tracing::debug!(activity = %activity, kind = ?kind, "Completion for removed activity ignored");
            return Ok(());
        }
        let stack = self.hierarchy.stack_of_activity(activity)?;
        let state = self.hierarchy.activity(activity)?.state;

        match kind {
            TimeoutKind::Pause => {
                if self.focus.pausing_in(stack) == Some(activity) {
                    tracing::debug!(activity = %activity, completion = ?completion, "Pause completed");
                    self.complete_pause(stack, completion != Completion::ProcessDied, None)?;
                } else if was_pending && state == ActivityState::Pausing {
                    self.set_state(activity, ActivityState::Paused, "activity_paused")?;
                    if self.hierarchy.activity(activity)?.finishing {
                        self.complete_finishing(activity, FinishMode::AfterVisible)?;
                    }
                } else {
                    tracing::debug!(activity = %activity, state = %state, "Stale pause completion ignored");
                }
            }
            TimeoutKind::Stop => {
                if state != ActivityState::Stopping {
                    tracing::debug!(activity = %activity, state = %state, "Stale stop completion ignored");
                    return Ok(());
                }
                if completion == Completion::Acked {
                    self.hierarchy.activity_mut(activity)?.have_state = true;
                }
                self.set_state(activity, ActivityState::Stopped, "activity_stopped")?;
                if self.hierarchy.activity(activity)?.finishing {
                    self.destroy_if_possible(activity, "stop-complete")?;
                }
            }
            TimeoutKind::Destroy => {
                if matches!(state, ActivityState::Destroying | ActivityState::Destroyed) {
                    self.remove_from_history(activity, "destroy-complete")?;
                    self.resume_requested = true;
                } else {
                    tracing::debug!(activity = %activity, state = %state, "Stale destroy completion ignored");
                }
            }
            TimeoutKind::TranslucentConversion => {
                if self.hierarchy.stack(stack)?.translucent_activity_waiting == Some(activity) {
                    self.notify_activity_drawn(stack, None)?;
                }
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Resume
    // ─────────────────────────────────────────────────────────────────────

    /// Resumes the top activity of the focused stack, or `target` if it is the
    /// focused stack.
    pub(crate) fn resume_focused_stacks(
        &mut self,
        target: Option<StackId>,
        prev: Option<ActivityId>,
    ) -> Result<bool> {
        if self.shutting_down {
            tracing::debug!("Resume skipped while shutting down");
            return Ok(false);
        }
        let Some(focused) = self.top_focused_stack() else {
            return self.resume_home_activity(prev, "no-focused-stack");
        };
        if target == Some(focused) {
            return self.resume_top_activity(focused, prev);
        }
        let top = self.hierarchy.top_running_activity_in_stack(focused, true);
        let top_resumed = top
            .and_then(|id| self.hierarchy.activity(id).ok())
            .is_some_and(|record| record.state == ActivityState::Resumed);
        if top_resumed {
            self.services.execute_app_transition(AppTransition::None);
            return Ok(false);
        }
        self.resume_top_activity(focused, None)
    }

    /// Brings the home task forward, or asks for a home activity if there is none.
    pub(crate) fn resume_home_activity(
        &mut self,
        prev: Option<ActivityId>,
        reason: &'static str,
    ) -> Result<bool> {
        if self.shutting_down {
            return Ok(false);
        }
        let display_id = self
            .hierarchy
            .displays_top_down()
            .first()
            .copied()
            .unwrap_or(self.default_display);
        if let Some(home) = self.hierarchy.home_stack(display_id) {
            if let Some(top) = self.hierarchy.top_running_activity_in_stack(home, true) {
                let task = self.hierarchy.activity(top)?.task;
                self.hierarchy.move_task_to_top(task)?;
                self.hierarchy.move_stack_to_front(home)?;
                return self.resume_top_activity(home, prev);
            }
        }
        tracing::info!(display = %display_id, reason, "Requesting home activity");
        self.services.start_home_activity(display_id, reason);
        Ok(false)
    }

    /// Latched entry to the resume algorithm; a nested call for the same
    /// stack returns false without doing anything.
    pub(crate) fn resume_top_activity(
        &mut self,
        stack: StackId,
        prev: Option<ActivityId>,
    ) -> Result<bool> {
        {
            let record = self.hierarchy.stack_mut(stack)?;
            if record.in_resume_top_activity {
                tracing::debug!(stack = %stack, "Resume already in progress");
                return Ok(false);
            }
            record.in_resume_top_activity = true;
        }
        let result = self.resume_top_activity_inner(stack, prev);
        if let Ok(record) = self.hierarchy.stack_mut(stack) {
            record.in_resume_top_activity = false;
        }
        result
    }

    fn resume_top_activity_inner(
        &mut self,
        stack: StackId,
        prev: Option<ActivityId>,
    ) -> Result<bool> {
        let user_leaving = std::mem::take(&mut self.user_leaving);
        let Some(next) = self.hierarchy.top_running_activity_in_stack(stack, true) else {
            return self.resume_next_focusable_when_empty(stack, prev);
        };

        if self.focus.resumed_in(stack) == Some(next)
            && self.hierarchy.activity(next)?.state == ActivityState::Resumed
        {
            self.services.execute_app_transition(AppTransition::None);
            tracing::debug!(activity = %next, "Top activity already resumed");
            return Ok(false);
        }

        let last_paused = self.hierarchy.stack(stack)?.last_paused_activity;
        if (self.sleeping || self.shutting_down)
            && last_paused == Some(next)
            && self.focus.all_pauses_complete()
        {
            self.services.execute_app_transition(AppTransition::None);
            tracing::debug!(activity = %next, "Top activity stays paused while asleep");
            return Ok(false);
        }

        self.stopping.retain(|id| *id != next);
        self.hierarchy.activity_mut(next)?.sleeping = false;

        if !self.focus.all_pauses_complete() {
            tracing::debug!(activity = %next, "Resume deferred until pauses complete");
            return Ok(false);
        }

        let last_resumed = self.focus.resumed_activity();
        let mut pausing = self.pause_back_stacks(stack, user_leaving, next)?;
        if self.focus.resumed_in(stack).is_some() {
            pausing |= self.start_pausing(stack, user_leaving, false, Some(next))?;
        }
        if pausing {
            self.prewarm_process(next)?;
            if let Some(last) = last_resumed {
                if let Ok(record) = self.hierarchy.activity_mut(last) {
                    record.will_close_or_enter_pip = true;
                }
            }
            return Ok(true);
        }
        if !self.hierarchy.contains_activity(next) {
            self.resume_requested = true;
            return Ok(false);
        }
        if self.focus.resumed_in(stack) == Some(next) {
            self.services.execute_app_transition(AppTransition::None);
            return Ok(true);
        }

        if self.sleeping {
            self.finish_last_no_history(stack)?;
        }

        let transition = self.transition_for(prev, next);
        if let Some(prev) = prev.filter(|prev| *prev != next) {
            let next_drawn = self.hierarchy.activity(next)?.now_visible;
            if let Ok(record) = self.hierarchy.activity_mut(prev) {
                if record.finishing && next_drawn {
                    record.visible_requested = false;
                }
            }
        }

        let (attached, last_state) = {
            let record = self.hierarchy.activity(next)?;
            (record.process.is_some(), record.state)
        };
        if !attached || last_state == ActivityState::RestartingProcess {
            self.hierarchy.activity_mut(next)?.has_been_launched = true;
            self.start_specific_activity(next, true)?;
            return Ok(true);
        }

        self.hierarchy.activity_mut(next)?.visible_requested = true;
        self.set_state(next, ActivityState::Resumed, "resume_top_activity")?;
        self.ensure_activities_visible(Some(next));

        if !self.hierarchy.contains_activity(next) {
            self.resume_requested = true;
            return Ok(true);
        }
        let still_top = self.hierarchy.top_running_activity_in_stack(stack, true) == Some(next);
        let still_resumed = self.hierarchy.activity(next)?.state == ActivityState::Resumed;
        if !still_top || !still_resumed {
            tracing::debug!(activity = %next, "Top changed during resume; rescheduling");
            self.resume_requested = true;
            if still_resumed {
                self.complete_resume(next, transition)?;
            }
            return Ok(true);
        }

        let (results, new_intents) = {
            let record = self.hierarchy.activity_mut(next)?;
            (
                std::mem::take(&mut record.pending_results),
                std::mem::take(&mut record.new_intents),
            )
        };
        let delivered = self.deliver(
            next,
            LifecycleTransaction::Resume {
                results: results.clone(),
                new_intents: new_intents.clone(),
            },
        )?;
        if !delivered {
            tracing::warn!(activity = %next, "Resume failed; relaunching activity");
            {
                let record = self.hierarchy.activity_mut(next)?;
                record.pending_results = results;
                record.new_intents = new_intents;
                record.has_been_launched = true;
            }
            self.set_state(next, last_state, "resume-failed")?;
            self.start_specific_activity(next, true)?;
            return Ok(true);
        }
        self.complete_resume(next, transition)?;
        Ok(true)
    }

    fn resume_next_focusable_when_empty(
        &mut self,
        stack: StackId,
        prev: Option<ActivityId>,
    ) -> Result<bool> {
        let record = self.hierarchy.stack(stack)?;
        if !record.is_home() {
            let display = record.display;
            let next_focusable = self
                .hierarchy
                .display(display)?
                .stacks_top_down()
                .filter(|other| *other != stack)
                .find(|other| self.is_focusable_and_visible(*other));
            if let Some(next) = next_focusable {
                tracing::debug!(from = %stack, to = %next, "Focus moving to next focusable stack");
                self.hierarchy.move_stack_to_front(next)?;
                return self.resume_focused_stacks(Some(next), prev);
            }
        }
        self.resume_home_activity(prev, "no-more-activities")
    }

    fn transition_for(&self, prev: Option<ActivityId>, next: ActivityId) -> AppTransition {
        let Some(prev) = prev.filter(|prev| *prev != next) else {
            return AppTransition::None;
        };
        let (Ok(prev), Ok(next)) = (self.hierarchy.activity(prev), self.hierarchy.activity(next))
        else {
            return AppTransition::None;
        };
        let same_task = prev.task == next.task;
        match (prev.finishing, same_task) {
            (true, true) => AppTransition::ActivityClose,
            (true, false) => AppTransition::TaskClose,
            (false, true) => AppTransition::ActivityOpen,
            (false, false) => AppTransition::TaskOpen,
        }
    }

    /// Bookkeeping once a resume has reached the client.
    pub(crate) fn complete_resume(
        &mut self,
        activity: ActivityId,
        transition: AppTransition,
    ) -> Result<()> {
        {
            let record = self.hierarchy.activity_mut(activity)?;
            record.visible_requested = true;
            record.pending_results.clear();
            record.new_intents.clear();
            record.have_state = false;
            record.has_been_launched = true;
            record.will_close_or_enter_pip = false;
        }
        self.stopping.retain(|id| *id != activity);
        self.services.execute_app_transition(transition);
        Ok(())
    }

    /// Starts the next activity's process early when it is known not to run.
    fn prewarm_process(&mut self, next: ActivityId) -> Result<()> {
        let record = self.hierarchy.activity(next)?;
        if record.process.is_some() || self.processes.contains_key(&record.spec.process_name) {
            return Ok(());
        }
        self.request_process_start(next, false, "pre-top-activity")
    }

    fn finish_last_no_history(&mut self, stack: StackId) -> Result<()> {
        let Some(no_history) = self.hierarchy.stack_mut(stack)?.last_no_history_activity.take()
        else {
            return Ok(());
        };
        let finishing = self
            .hierarchy
            .activity(no_history)
            .map(|record| record.finishing)
            .unwrap_or(true);
        if !finishing {
            self.finish_activity_inner(no_history, "no-history")?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Pause
    // ─────────────────────────────────────────────────────────────────────

    /// Pauses the resumed activity of every stack other than `target`.
    pub(crate) fn pause_back_stacks(
        &mut self,
        target: StackId,
        user_leaving: bool,
        resuming: ActivityId,
    ) -> Result<bool> {
        let stacks: Vec<StackId> = self
            .focus
            .resumed()
            .map(|(stack, _)| stack)
            .filter(|stack| *stack != target)
            .collect();
        let mut some_paused = false;
        for stack in stacks {
            some_paused |= self.start_pausing(stack, user_leaving, false, Some(resuming))?;
        }
        Ok(some_paused)
    }

    /// Begins pausing the stack's resumed activity.
    ///
    /// Returns true when the pause is in flight and the caller must wait for
    /// its completion; false when nothing needed pausing or the pause already
    /// completed synchronously.
    pub(crate) fn start_pausing(
        &mut self,
        stack: StackId,
        user_leaving: bool,
        ui_sleeping: bool,
        resuming: Option<ActivityId>,
    ) -> Result<bool> {
        if let Some(pending) = self.focus.pausing_in(stack) {
            tracing::warn!(stack = %stack, activity = %pending, "Pause requested while another is pending");
            if !self.sleeping {
                self.complete_pause(stack, false, resuming)?;
            }
        }
        let Some(prev) = self.focus.resumed_in(stack) else {
            if resuming.is_none() {
                tracing::warn!(stack = %stack, "Pause requested with nothing resumed");
                self.resume_requested = true;
            }
            return Ok(false);
        };
        if Some(prev) == resuming {
            tracing::warn!(activity = %prev, "Refusing to pause the activity being resumed");
            return Ok(false);
        }

        let (no_history, finishing) = {
            let record = self.hierarchy.activity(prev)?;
            (record.spec.no_history, record.finishing)
        };
        self.focus.set_pausing(stack, prev);
        {
            let record = self.hierarchy.stack_mut(stack)?;
            record.last_paused_activity = Some(prev);
            record.last_no_history_activity = no_history.then_some(prev);
        }
        self.set_state(prev, ActivityState::Pausing, "start_pausing")?;

        let resume_while_pausing = resuming
            .and_then(|id| self.hierarchy.activity(id).ok())
            .is_some_and(|record| record.spec.resume_while_pausing);
        let pause_immediately =
            resume_while_pausing && !self.hierarchy.activity(prev)?.can_enter_picture_in_picture();

        let delivered = self.deliver(
            prev,
            LifecycleTransaction::Pause {
                finishing,
                user_leaving,
                dont_report: pause_immediately,
            },
        )?;
        if !delivered {
            {
                let record = self.hierarchy.stack_mut(stack)?;
                record.last_paused_activity = None;
                record.last_no_history_activity = None;
            }
            self.complete_pause(stack, false, resuming)?;
            if resuming.is_none() {
                self.resume_requested = true;
            }
            return Ok(false);
        }

        if pause_immediately {
            tracing::debug!(activity = %prev, "Pause completed without waiting");
            self.complete_pause(stack, false, resuming)?;
            return Ok(false);
        }

        let deadline = self.now + self.config.timeouts.pause();
        self.pending.arm(prev, TimeoutKind::Pause, deadline);
        tracing::debug!(activity = %prev, ui_sleeping, user_leaving, "Pausing activity");
        Ok(true)
    }

    /// Finalizes the stack's pending pause. Safe to call when nothing is
    /// pending; the pausing pointer is cleared exactly once.
    pub(crate) fn complete_pause(
        &mut self,
        stack: StackId,
        resume_next: bool,
        resuming: Option<ActivityId>,
    ) -> Result<()> {
        let prev = self.focus.clear_pausing(stack);
        if let Some(prev) = prev.filter(|id| self.hierarchy.contains_activity(*id)) {
            self.pending.resolve(prev, TimeoutKind::Pause);
            self.hierarchy.activity_mut(prev)?.will_close_or_enter_pip = false;
            let was_stopping = self.hierarchy.activity(prev)?.state == ActivityState::Stopping;
            self.set_state(prev, ActivityState::Paused, "complete_pause")?;

            let (finishing, attached, visible) = {
                let record = self.hierarchy.activity(prev)?;
                (record.finishing, record.process.is_some(), record.visible_requested)
            };
            if finishing {
                tracing::debug!(activity = %prev, "Paused activity was finishing");
                self.complete_finishing(prev, FinishMode::AfterVisible)?;
            } else if attached {
                if was_stopping {
                    self.set_state(prev, ActivityState::Stopping, "complete_pause")?;
                } else if !visible || self.sleeping {
                    self.add_to_stopping(prev);
                }
            }
        }

        if resume_next {
            let top_stack = self.top_focused_stack();
            if !self.sleeping {
                self.resume_focused_stacks(top_stack, prev)?;
            } else {
                let top = top_stack
                    .and_then(|stack| self.hierarchy.top_running_activity_in_stack(stack, true));
                if top.is_some() && top != prev {
                    self.resume_focused_stacks(top_stack, None)?;
                }
            }
        }

        self.ensure_activities_visible(resuming);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::activity::ActivitySpec;
    use crate::testing::supervisor;
    use crate::types::ActivityState;

    #[test]
    fn nested_resume_of_same_stack_does_nothing() {
        let mut sup = supervisor();
        let stack = sup.fullscreen_stack();
        let task = sup
            .hierarchy
            .create_task(stack, "app".to_string(), true)
            .unwrap();
        let activity = sup
            .hierarchy
            .add_activity(task, ActivitySpec::new("app/.A", "app"))
            .unwrap();

        sup.hierarchy.stack_mut(stack).unwrap().in_resume_top_activity = true;
        let before = sup.dump().without_timestamp();

        assert!(!sup.resume_top_activity(stack, None).unwrap());
        assert_eq!(sup.dump().without_timestamp(), before);
        assert!(sup.pending().is_empty());
        assert_eq!(sup.focus().resumed_activity(), None);
        assert!(sup.services().process_starts.is_empty());
        assert_eq!(sup.state_of(activity), Some(ActivityState::Initializing));
        assert!(sup.hierarchy.stack(stack).unwrap().in_resume_top_activity);

        sup.hierarchy.stack_mut(stack).unwrap().in_resume_top_activity = false;
        sup.resume_top_activity(stack, None).unwrap();
        assert_eq!(sup.services().starts_for("app"), 1);
        assert!(!sup.hierarchy.stack(stack).unwrap().in_resume_top_activity);
    }
}
