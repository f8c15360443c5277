//! The visibility pass: applies occlusion and keyguard results to activities.
//!
//! Displays and stacks are walked front to back. Within a stack, activities
//! are visible until the first opaque one is passed; everything below is made
//! invisible and queued for stopping. After each display the keyguard
//! occlusion is recomputed from the scan of its controlling stack.

use crate::error::Result;
use crate::keyguard::KeyguardScan;
use crate::services::{LifecycleTransaction, SystemServices};
use crate::types::{ActivityId, ActivityState, DisplayId, StackId, TaskId, TimeoutKind, WindowingMode};

use super::StackSupervisor;

impl<S: SystemServices> StackSupervisor<S> {
    // ─────────────────────────────────────────────────────────────────────
    // Pass
    // ─────────────────────────────────────────────────────────────────────

    /// Recomputes visibility for every activity. Re-entrant calls are no-ops.
    pub(crate) fn ensure_activities_visible(&mut self, starting: Option<ActivityId>) {
        if self.in_visibility_update {
            return;
        }
        self.in_visibility_update = true;
        // A change in occlusion while locked alters which activities the
        // keyguard lets through, so it earns one more pass.
        for _ in 0..2 {
            let occlusion_changed = self.visibility_pass(starting);
            if !(occlusion_changed && self.keyguard.is_keyguard_locked()) {
                break;
            }
        }
        self.in_visibility_update = false;
    }

    fn visibility_pass(&mut self, starting: Option<ActivityId>) -> bool {
        let mut occlusion_changed = false;
        for display in self.hierarchy.displays_top_down() {
            let stacks: Vec<StackId> = match self.hierarchy.display(display) {
                Ok(record) => record.stacks_top_down().collect(),
                Err(_) => continue,
            };
            for stack in stacks {
                if let Err(err) = self.ensure_stack_visible(stack, starting) {
                    self.log_failure("ensure_activities_visible", &err);
                }
            }
            occlusion_changed |= self.update_keyguard_occlusion(display);
        }
        occlusion_changed
    }

    fn ensure_stack_visible(&mut self, stack: StackId, starting: Option<ActivityId>) -> Result<()> {
        let top = self.hierarchy.top_running_activity_in_stack(stack, false);
        self.check_translucent_activity_waiting(stack, top)?;

        let visibility = self.get_visibility(stack, starting);
        let stack_visible = visibility.is_visible();
        let is_top_not_pinned = self.hierarchy.is_top_not_pinned_stack(stack);
        let (display, windowing_mode, is_home, tasks) = {
            let record = self.hierarchy.stack_mut(stack)?;
            record.visibility = visibility;
            let tasks: Vec<TaskId> = record.tasks.iter().rev().copied().collect();
            (record.display, record.windowing_mode, record.is_home(), tasks)
        };
        let can_show_insecure = self.hierarchy.display(display)?.can_show_with_insecure_keyguard;

        let mut scan = KeyguardScan::default();
        let mut above_top = top.is_some();
        let mut behind_fullscreen = !stack_visible;
        for task in tasks {
            let activities: Vec<ActivityId> = self
                .hierarchy
                .task(task)
                .map(|record| record.activities().iter().rev().copied().collect())
                .unwrap_or_default();
            for activity in activities {
                let Ok(record) = self.hierarchy.activity(activity) else {
                    continue;
                };
                if record.finishing {
                    continue;
                }
                let is_top = Some(activity) == top;
                if above_top && !is_top {
                    continue;
                }
                above_top = false;

                let visible_ignoring_keyguard = !behind_fullscreen;
                let really_visible = self.keyguard.check_keyguard_visibility(
                    &mut scan,
                    record,
                    display,
                    can_show_insecure,
                    visible_ignoring_keyguard,
                    is_top && is_top_not_pinned,
                );
                let occludes = record.occludes_parent;
                let attached = record.process.is_some();
                let visible_requested = record.visible_requested;
                self.hierarchy.activity_mut(activity)?.visible_ignoring_keyguard =
                    visible_ignoring_keyguard;
                if visible_ignoring_keyguard && occludes {
                    behind_fullscreen = true;
                }

                if really_visible {
                    if !attached {
                        self.make_visible_and_restart_if_needed(activity, is_top, starting)?;
                    } else if visible_requested {
                        self.make_active_if_needed(activity)?;
                    } else {
                        self.make_visible_if_needed(stack, activity, top, starting)?;
                    }
                } else {
                    self.make_invisible(activity)?;
                }
            }
            if windowing_mode == WindowingMode::Freeform {
                behind_fullscreen = !stack_visible;
            } else if is_home {
                behind_fullscreen = true;
            }
        }

        let record = self.hierarchy.stack_mut(stack)?;
        record.keyguard_scan = scan;
        let nothing_to_draw = record.translucent_activity_waiting.is_some()
            && record.undrawn_below_translucent.is_empty();
        if nothing_to_draw {
            self.notify_activity_drawn(stack, None)?;
        }
        Ok(())
    }

    fn make_visible_and_restart_if_needed(
        &mut self,
        activity: ActivityId,
        is_top: bool,
        starting: Option<ActivityId>,
    ) -> Result<()> {
        // Launches deferred behind a pause retry on every pass until the
        // process start is in flight.
        let record = self.hierarchy.activity(activity)?;
        let start_in_flight = self
            .pending_process_starts
            .contains(record.spec.process_name.as_str());
        if !is_top && record.visible_requested && start_in_flight {
            return Ok(());
        }
        self.hierarchy.activity_mut(activity)?.visible_requested = true;
        if Some(activity) != starting {
            self.start_specific_activity(activity, false)?;
        }
        Ok(())
    }

    fn make_visible_if_needed(
        &mut self,
        stack: StackId,
        activity: ActivityId,
        top: Option<ActivityId>,
        starting: Option<ActivityId>,
    ) -> Result<()> {
        if Some(activity) == starting {
            return Ok(());
        }
        {
            let record = self.hierarchy.activity_mut(activity)?;
            record.visible_requested = true;
            record.sleeping = false;
        }
        self.deliver(activity, LifecycleTransaction::Visibility { visible: true })?;
        self.stopping.retain(|id| *id != activity);
        let record = self.hierarchy.stack_mut(stack)?;
        if record.translucent_activity_waiting.is_some() && Some(activity) != top {
            record.undrawn_below_translucent.insert(activity);
        }
        self.make_active_if_needed(activity)
    }

    /// Brings a stopped activity that became visible back to started.
    fn make_active_if_needed(&mut self, activity: ActivityId) -> Result<()> {
        if self.sleeping {
            return Ok(());
        }
        let record = self.hierarchy.activity(activity)?;
        let stopped = matches!(record.state, ActivityState::Stopping | ActivityState::Stopped);
        if !record.visible_requested || record.process.is_none() || !stopped {
            return Ok(());
        }
        self.pending.resolve(activity, TimeoutKind::Stop);
        if self.deliver(activity, LifecycleTransaction::Start)? {
            self.set_state(activity, ActivityState::Started, "make_active")?;
        }
        Ok(())
    }

    fn make_invisible(&mut self, activity: ActivityId) -> Result<()> {
        let state = {
            let record = self.hierarchy.activity_mut(activity)?;
            if !record.visible_requested {
                return Ok(());
            }
            record.visible_requested = false;
            record.now_visible = false;
            record.state
        };
        tracing::debug!(activity = %activity, state = %state, "Activity hidden");
        match state {
            ActivityState::Stopping | ActivityState::Stopped => {
                self.deliver(activity, LifecycleTransaction::Visibility { visible: false })?;
            }
            ActivityState::Initializing
            | ActivityState::Resumed
            | ActivityState::Pausing
            | ActivityState::Paused
            | ActivityState::Started => self.add_to_stopping(activity),
            _ => {}
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Keyguard
    // ─────────────────────────────────────────────────────────────────────

    fn update_keyguard_occlusion(&mut self, display: DisplayId) -> bool {
        let controlling = self.hierarchy.display(display).ok().and_then(|record| {
            record.stacks_top_down().find(|stack| {
                self.hierarchy.stack(*stack).is_ok_and(|stack| {
                    stack.is_focusable()
                        && stack.visibility.is_visible()
                        && stack.windowing_mode != WindowingMode::Pinned
                })
            })
        });

        let (occluded, dismissing) = match controlling {
            Some(stack) => {
                let scan = self
                    .hierarchy
                    .stack(stack)
                    .map(|record| record.keyguard_scan.clone())
                    .unwrap_or_default();
                let top = self.hierarchy.top_running_activity_in_stack(stack, false);
                let dismissing = scan.top_dismissing_keyguard_activity;
                let occluded = scan.top_activity_occludes_keyguard
                    || (dismissing.is_some()
                        && dismissing == top
                        && self.keyguard.can_show_while_occluded(true, false));
                (occluded, dismissing)
            }
            None => (false, None),
        };

        let update = self.keyguard.visibility_changed(display, occluded, dismissing);
        if update.occluded_changed && display == self.default_display {
            self.services.notify_keyguard_occluded(occluded);
            if let Err(err) = self.dismiss_split_screen_if_occluded() {
                self.log_failure("keyguard_occluded", &err);
            }
        }
        if update.request_dismiss {
            self.services.request_dismiss_keyguard();
        }
        update.occluded_changed
    }

    /// Split screen cannot stay up behind an occluding activity on the lock screen.
    fn dismiss_split_screen_if_occluded(&mut self) -> Result<()> {
        if self.keyguard.is_showing() && self.keyguard.is_display_occluded(self.default_display) {
            self.dismiss_split_screen(self.default_display)?;
        }
        Ok(())
    }

    pub fn set_keyguard_shown(&mut self, showing: bool, aod_showing: bool) -> Result<()> {
        self.run_entry("set_keyguard_shown", |s| {
            if s.keyguard.set_keyguard_shown(showing, aod_showing) {
                s.dismiss_split_screen_if_occluded()?;
            }
            Ok(())
        })
    }

    pub fn set_keyguard_secure(&mut self, secure: bool) {
        self.keyguard.set_secure(secure);
        self.finish_entry();
    }

    pub fn set_keyguard_trusted(&mut self, trusted: bool) {
        self.keyguard.set_trusted(trusted);
        self.finish_entry();
    }

    pub fn keyguard_going_away(&mut self) {
        self.keyguard.keyguard_going_away();
        tracing::info!("Keyguard going away");
        self.finish_entry();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Translucency
    // ─────────────────────────────────────────────────────────────────────

    /// Makes an opaque activity translucent. Completion is reported to the
    /// client once everything uncovered has drawn or the wait times out.
    pub fn convert_to_translucent(&mut self, activity: ActivityId) -> Result<bool> {
        self.run_entry("convert_to_translucent", |s| {
            let stack = s.hierarchy.stack_of_activity(activity)?;
            {
                let record = s.hierarchy.activity_mut(activity)?;
                if !record.occludes_parent {
                    return Ok(false);
                }
                record.occludes_parent = false;
            }
            {
                let record = s.hierarchy.stack_mut(stack)?;
                record.translucent_activity_waiting = Some(activity);
                record.undrawn_below_translucent.clear();
            }
            let deadline = s.now + s.config.timeouts.translucent_conversion();
            s.pending.arm(activity, TimeoutKind::TranslucentConversion, deadline);
            tracing::debug!(activity = %activity, "Converting to translucent");
            s.ensure_activities_visible(None);
            Ok(true)
        })
    }

    pub fn convert_from_translucent(&mut self, activity: ActivityId) -> Result<bool> {
        self.run_entry("convert_from_translucent", |s| {
            let record = s.hierarchy.activity_mut(activity)?;
            if record.occludes_parent {
                return Ok(false);
            }
            record.occludes_parent = true;
            tracing::debug!(activity = %activity, "Converted to opaque");
            Ok(true)
        })
    }

    /// The client finished drawing its first frame.
    pub fn activity_drawn(&mut self, activity: ActivityId) -> Result<()> {
        self.run_entry("activity_drawn", |s| {
            let stack = s.hierarchy.stack_of_activity(activity)?;
            s.hierarchy.activity_mut(activity)?.now_visible = true;
            s.notify_activity_drawn(stack, Some(activity))?;
            s.process_stopping_activities(false)
        })
    }

    fn check_translucent_activity_waiting(
        &mut self,
        stack: StackId,
        top: Option<ActivityId>,
    ) -> Result<()> {
        let waiting = self.hierarchy.stack(stack)?.translucent_activity_waiting;
        if waiting.is_some() && waiting != top {
            self.notify_activity_drawn(stack, None)?;
        }
        Ok(())
    }

    /// Records a drawn activity; `None` forces the pending conversion to
    /// complete as if nothing was drawn.
    pub(crate) fn notify_activity_drawn(
        &mut self,
        stack: StackId,
        drawn: Option<ActivityId>,
    ) -> Result<()> {
        let record = self.hierarchy.stack_mut(stack)?;
        let complete = match drawn {
            None => true,
            Some(activity) => {
                record.undrawn_below_translucent.remove(&activity)
                    && record.undrawn_below_translucent.is_empty()
            }
        };
        if !complete {
            return Ok(());
        }
        let waiting = record.translucent_activity_waiting.take();
        record.undrawn_below_translucent.clear();
        let Some(waiting) = waiting else {
            return Ok(());
        };
        self.pending.resolve(waiting, TimeoutKind::TranslucentConversion);
        if self.hierarchy.contains_activity(waiting) {
            self.deliver(
                waiting,
                LifecycleTransaction::TranslucentConversionComplete {
                    drawn: drawn.is_some(),
                },
            )?;
            tracing::debug!(activity = %waiting, drawn = drawn.is_some(), "Translucent conversion complete");
        }
        Ok(())
    }
}
