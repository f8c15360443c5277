//! Stop, finish and destroy.
//!
//! Activities that leave the screen are queued on the stopping list and
//! stopped once nothing visible still depends on them. Finishing activities go
//! through the same list when they have to stay on screen until the activity
//! replacing them has drawn.

use crate::error::Result;
use crate::services::{AppTransition, LifecycleTransaction, SystemServices};
use crate::types::{ActivityId, ActivityState, StackId, TimeoutKind, WindowingMode};

use super::StackSupervisor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FinishMode {
    /// Stay visible until the next top activity has drawn.
    AfterVisible,
    Immediately,
}

impl<S: SystemServices> StackSupervisor<S> {
    // ─────────────────────────────────────────────────────────────────────
    // Finish
    // ─────────────────────────────────────────────────────────────────────

    /// Requests that an activity finish. Returns true when it was removed
    /// from the hierarchy right away.
    pub fn finish_activity(&mut self, activity: ActivityId) -> Result<bool> {
        self.run_entry("finish_activity", |s| {
            s.finish_activity_inner(activity, "app-request")
        })
    }

    pub(crate) fn finish_activity_inner(
        &mut self,
        activity: ActivityId,
        reason: &'static str,
    ) -> Result<bool> {
        let (task, already_finishing, state, visible) = {
            let record = self.hierarchy.activity(activity)?;
            (
                record.task,
                record.finishing,
                record.state,
                record.visible_requested || record.now_visible,
            )
        };
        if already_finishing {
            tracing::warn!(activity = %activity, reason, "Duplicate finish request ignored");
            return Ok(false);
        }
        let stack = self.hierarchy.stack_of_activity(activity)?;
        let ends_task = self.hierarchy.effective_root(task) == Some(activity);
        self.hierarchy.activity_mut(activity)?.finishing = true;
        tracing::info!(activity = %activity, reason, ends_task, "Finishing activity");

        if self.focus.resumed_in(stack) == Some(activity) {
            let transition = if ends_task {
                AppTransition::TaskClose
            } else {
                AppTransition::ActivityClose
            };
            self.hierarchy.activity_mut(activity)?.visible_requested = false;
            self.services.execute_app_transition(transition);
            if self.focus.pausing_in(stack).is_none() {
                self.start_pausing(stack, false, false, None)?;
            }
            return Ok(false);
        }

        if state == ActivityState::Pausing {
            tracing::debug!(activity = %activity, "Finish waits for pause to complete");
            return Ok(false);
        }
        let mode = if visible {
            FinishMode::AfterVisible
        } else {
            FinishMode::Immediately
        };
        self.complete_finishing(activity, mode)
    }

    /// Moves a finishing activity toward destruction. Returns true when the
    /// record was removed.
    pub(crate) fn complete_finishing(
        &mut self,
        activity: ActivityId,
        mode: FinishMode,
    ) -> Result<bool> {
        let stack = self.hierarchy.stack_of_activity(activity)?;
        let (display, windowing_mode) = {
            let record = self.hierarchy.stack(stack)?;
            (record.display, record.windowing_mode)
        };
        let (visible, state) = {
            let record = self.hierarchy.activity(activity)?;
            (record.visible_requested || record.now_visible, record.state)
        };
        let next_undrawn = self
            .hierarchy
            .top_running_activity_on_display(display, true)
            .and_then(|next| self.hierarchy.activity(next).ok())
            .is_some_and(|next| !next.now_visible);
        let floating = matches!(windowing_mode, WindowingMode::Freeform | WindowingMode::Pinned);

        self.resume_requested = true;
        if mode == FinishMode::AfterVisible && visible && next_undrawn && !floating {
            self.add_to_stopping(activity);
            if state != ActivityState::Stopping {
                self.set_state(activity, ActivityState::Stopping, "finish-after-visible")?;
            }
            tracing::debug!(activity = %activity, "Finishing activity waits for next to draw");
            return Ok(false);
        }

        self.stopping.retain(|id| *id != activity);
        self.destroy_if_possible(activity, "finish")
    }

    // ─────────────────────────────────────────────────────────────────────
    // Destroy
    // ─────────────────────────────────────────────────────────────────────

    /// Sends the destroy request, or removes the record outright when there is
    /// no client. Returns true when the record was removed.
    pub(crate) fn destroy_if_possible(
        &mut self,
        activity: ActivityId,
        reason: &'static str,
    ) -> Result<bool> {
        let (state, attached) = {
            let record = self.hierarchy.activity(activity)?;
            (record.state, record.process.is_some())
        };
        if matches!(state, ActivityState::Destroying | ActivityState::Destroyed) {
            return Ok(false);
        }
        let stack = self.hierarchy.stack_of_activity(activity)?;
        self.stopping.retain(|id| *id != activity);
        self.pending.resolve(activity, TimeoutKind::Pause);
        self.pending.resolve(activity, TimeoutKind::Stop);
        if self.focus.pausing_in(stack) == Some(activity) {
            self.focus.clear_pausing(stack);
        }
        self.hierarchy.activity_mut(activity)?.finishing = true;

        if !attached {
            self.remove_from_history(activity, reason)?;
            return Ok(true);
        }

        self.set_state(activity, ActivityState::Finishing, reason)?;
        let delivered = self.deliver(activity, LifecycleTransaction::Destroy { finishing: true })?;
        {
            let record = self.hierarchy.activity_mut(activity)?;
            record.visible_requested = false;
            record.now_visible = false;
        }
        if !delivered {
            self.remove_from_history(activity, reason)?;
            return Ok(true);
        }
        self.set_state(activity, ActivityState::Destroying, reason)?;
        let deadline = self.now + self.config.timeouts.destroy();
        self.pending.arm(activity, TimeoutKind::Destroy, deadline);
        Ok(false)
    }

    /// Drops the record and every reference to it; empties stacks as needed.
    pub(crate) fn remove_from_history(
        &mut self,
        activity: ActivityId,
        reason: &'static str,
    ) -> Result<()> {
        self.pending.cancel_all_for(activity);
        self.stopping.retain(|id| *id != activity);
        {
            let record = self.hierarchy.activity_mut(activity)?;
            record.finishing = true;
            record.process = None;
            record.visible_requested = false;
            record.now_visible = false;
        }
        self.set_state(activity, ActivityState::Destroyed, reason)?;
        self.focus.forget_activity(activity);
        self.keyguard.forget_activity(activity);

        let removed = self.hierarchy.remove_activity(activity)?;
        for stack in self.hierarchy.stack_ids() {
            let record = self.hierarchy.stack_mut(stack)?;
            if record.last_paused_activity == Some(activity) {
                record.last_paused_activity = None;
            }
            if record.last_no_history_activity == Some(activity) {
                record.last_no_history_activity = None;
            }
        }
        tracing::info!(activity = %activity, component = %removed.record.spec.component, reason, "Activity removed");

        if removed.task_removed {
            self.remove_stack_if_empty(removed.stack)?;
        }
        Ok(())
    }

    pub(crate) fn remove_stack_if_empty(&mut self, stack: StackId) -> Result<()> {
        let record = self.hierarchy.stack(stack)?;
        if !record.is_empty() {
            return Ok(());
        }
        if record.is_home() {
            self.hierarchy.move_stack_to_back(stack)?;
            return Ok(());
        }
        let (display, windowing_mode) = (record.display, record.windowing_mode);
        self.hierarchy.remove_stack(stack)?;
        self.focus.forget_stack(stack);
        tracing::info!(stack = %stack, "Removed empty stack");
        if windowing_mode == WindowingMode::SplitScreenPrimary {
            self.dismiss_split_screen(display)?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Stop
    // ─────────────────────────────────────────────────────────────────────

    pub(crate) fn add_to_stopping(&mut self, activity: ActivityId) {
        if !self.stopping.contains(&activity) {
            tracing::debug!(activity = %activity, "Queued for stopping");
            self.stopping.push(activity);
        }
    }

    /// Stops or destroys queued activities that nothing visible still needs.
    ///
    /// `force` releases finishing activities that wait for the next activity
    /// to draw.
    pub(crate) fn process_stopping_activities(&mut self, force: bool) -> Result<()> {
        let all_resumed_drawn = self.focus.resumed().all(|(_, activity)| {
            self.hierarchy
                .activity(activity)
                .is_ok_and(|record| record.now_visible)
        });

        let mut ready = Vec::new();
        for activity in self.stopping.clone() {
            let Ok(record) = self.hierarchy.activity(activity) else {
                self.stopping.retain(|id| *id != activity);
                continue;
            };
            match record.state {
                ActivityState::Pausing => continue,
                ActivityState::Resumed => {
                    self.stopping.retain(|id| *id != activity);
                    continue;
                }
                _ => {}
            }
            if record.visible_requested && !record.finishing && !self.sleeping {
                self.stopping.retain(|id| *id != activity);
                continue;
            }
            let asleep = self.sleeping || self.shutting_down;
            if record.finishing && !all_resumed_drawn && !force && !asleep {
                continue;
            }
            self.stopping.retain(|id| *id != activity);
            ready.push(activity);
        }

        for activity in ready {
            let Ok(record) = self.hierarchy.activity(activity) else {
                continue;
            };
            if record.finishing {
                self.complete_finishing(activity, FinishMode::Immediately)?;
            } else {
                self.stop_activity(activity)?;
            }
        }
        Ok(())
    }

    fn stop_activity(&mut self, activity: ActivityId) -> Result<()> {
        let (no_history, finishing, attached, state) = {
            let record = self.hierarchy.activity(activity)?;
            (
                record.spec.no_history,
                record.finishing,
                record.process.is_some(),
                record.state,
            )
        };
        if no_history && !finishing && !self.sleeping {
            self.finish_activity_inner(activity, "stop-no-history")?;
            return Ok(());
        }
        if matches!(state, ActivityState::Stopping | ActivityState::Stopped) {
            return Ok(());
        }
        if !attached {
            if matches!(state, ActivityState::Paused | ActivityState::Started) {
                self.set_state(activity, ActivityState::Stopped, "stop-detached")?;
            }
            return Ok(());
        }

        self.set_state(activity, ActivityState::Stopping, "stop_activity")?;
        if !self.deliver(activity, LifecycleTransaction::Stop)? {
            self.set_state(activity, ActivityState::Stopped, "stop-failed")?;
            return Ok(());
        }
        if self.sleeping || self.shutting_down {
            self.hierarchy.activity_mut(activity)?.sleeping = true;
        }
        let deadline = self.now + self.config.timeouts.stop();
        self.pending.arm(activity, TimeoutKind::Stop, deadline);
        Ok(())
    }
}
