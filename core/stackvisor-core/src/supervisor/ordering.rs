//! Task and stack ordering, reparenting and windowing-mode changes.
//!
//! These only rearrange the hierarchy and then request a resume; the settle
//! step at the end of the entry point does the pausing and resuming.

use crate::error::Result;
use crate::services::{AppTransition, SystemServices};
use crate::types::{ActivityId, ActivityType, Bounds, DisplayId, StackId, TaskId, WindowingMode};

use super::StackSupervisor;

impl<S: SystemServices> StackSupervisor<S> {
    pub fn create_stack(
        &mut self,
        display_id: DisplayId,
        windowing_mode: WindowingMode,
        activity_type: ActivityType,
        on_top: bool,
    ) -> Result<StackId> {
        self.run_entry("create_stack", |s| {
            if windowing_mode == WindowingMode::SplitScreenPrimary {
                s.enter_split_screen(display_id, None)?;
            }
            let stack = s
                .hierarchy
                .create_stack(display_id, windowing_mode, activity_type, on_top)?;
            tracing::info!(
                stack = %stack,
                display = %display_id,
                mode = windowing_mode.as_str(),
                activity_type = activity_type.as_str(),
                "Stack created"
            );
            Ok(stack)
        })
    }

    pub fn move_task_to_front(&mut self, task: TaskId) -> Result<()> {
        self.run_entry("move_task_to_front", |s| {
            let stack = s.hierarchy.task(task)?.stack();
            s.hierarchy.move_task_to_top(task)?;
            s.hierarchy.move_stack_to_front(stack)?;
            s.user_leaving = true;
            s.services.execute_app_transition(AppTransition::TaskToFront);
            tracing::info!(task = %task, stack = %stack, "Task moved to front");
            s.resume_focused_stacks(Some(stack), None)?;
            Ok(())
        })
    }

    /// Sends the task to the bottom of its stack; a stack left showing only
    /// that task goes to the back of its display.
    pub fn move_task_to_back(&mut self, task: TaskId) -> Result<()> {
        self.run_entry("move_task_to_back", |s| {
            let stack = s.hierarchy.task(task)?.stack();
            s.hierarchy.move_task_to_bottom(task)?;
            let top_task = s.hierarchy.stack(stack)?.top_task();
            if top_task == Some(task) {
                s.hierarchy.move_stack_to_back(stack)?;
            }
            s.services.execute_app_transition(AppTransition::TaskToBack);
            tracing::info!(task = %task, stack = %stack, "Task moved to back");
            s.resume_requested = true;
            Ok(())
        })
    }

    pub fn reparent_task(&mut self, task: TaskId, to: StackId, on_top: bool) -> Result<()> {
        self.run_entry("reparent_task", |s| s.reparent_task_inner(task, to, on_top))
    }

    /// Finishes every activity of the task.
    pub fn remove_task(&mut self, task: TaskId) -> Result<()> {
        self.run_entry("remove_task", |s| {
            let activities: Vec<ActivityId> = s
                .hierarchy
                .task(task)?
                .activities()
                .iter()
                .rev()
                .copied()
                .collect();
            tracing::info!(task = %task, activities = activities.len(), "Removing task");
            for activity in activities {
                let Ok(record) = s.hierarchy.activity(activity) else {
                    continue;
                };
                if record.finishing {
                    continue;
                }
                let stack = s.hierarchy.stack_of_activity(activity)?;
                if s.focus.resumed_in(stack) == Some(activity) {
                    s.finish_activity_inner(activity, "remove-task")?;
                } else {
                    s.hierarchy.activity_mut(activity)?.finishing = true;
                    s.complete_finishing(activity, super::teardown::FinishMode::Immediately)?;
                }
            }
            Ok(())
        })
    }

    pub fn set_windowing_mode(&mut self, stack: StackId, mode: WindowingMode) -> Result<()> {
        self.run_entry("set_windowing_mode", |s| {
            let (display, old) = {
                let record = s.hierarchy.stack(stack)?;
                (record.display, record.windowing_mode)
            };
            if old == mode {
                return Ok(());
            }
            if mode == WindowingMode::SplitScreenPrimary {
                s.enter_split_screen(display, Some(stack))?;
            }
            s.hierarchy.stack_mut(stack)?.windowing_mode = mode;
            tracing::info!(stack = %stack, from = old.as_str(), to = mode.as_str(), "Windowing mode changed");
            if old == WindowingMode::SplitScreenPrimary {
                s.dismiss_split_screen(display)?;
            }
            s.resume_requested = true;
            Ok(())
        })
    }

    /// Moves the task into the display's pinned stack, creating it if needed.
    pub fn move_task_to_pinned_stack(&mut self, task: TaskId, bounds: Bounds) -> Result<StackId> {
        self.run_entry("move_task_to_pinned_stack", |s| {
            let from = s.hierarchy.task(task)?.stack();
            let display = s.hierarchy.display_of_stack(from)?;
            let pinned = match s
                .hierarchy
                .stacks_with_mode(display, WindowingMode::Pinned)
                .first()
            {
                Some(stack) => *stack,
                None => s.hierarchy.create_stack(
                    display,
                    WindowingMode::Pinned,
                    ActivityType::Standard,
                    true,
                )?,
            };
            s.reparent_task_inner(task, pinned, true)?;
            s.hierarchy.stack_mut(pinned)?.bounds = Some(bounds);
            s.services.animate_stack_bounds(pinned, bounds);
            tracing::info!(task = %task, stack = %pinned, "Task moved to pinned stack");
            Ok(pinned)
        })
    }

    pub fn set_force_hidden(&mut self, stack: StackId, hidden: bool) -> Result<()> {
        self.run_entry("set_force_hidden", |s| {
            let record = s.hierarchy.stack_mut(stack)?;
            if record.force_hidden == hidden {
                return Ok(());
            }
            record.force_hidden = hidden;
            tracing::debug!(stack = %stack, hidden, "Stack force-hidden changed");
            s.resume_requested = true;
            Ok(())
        })
    }

    fn reparent_task_inner(&mut self, task: TaskId, to: StackId, on_top: bool) -> Result<()> {
        let from = self.hierarchy.reparent_task(task, to, on_top)?;
        if from != to {
            let activities = self.hierarchy.task(task)?.activities().to_vec();
            for activity in activities {
                self.focus.move_activity(activity, from, to);
                if self.stack_translucent_waiting(from) == Some(activity) {
                    self.notify_activity_drawn(from, None)?;
                }
            }
            tracing::info!(task = %task, from = %from, to = %to, "Task reparented");
            self.remove_stack_if_empty(from)?;
        }
        if on_top {
            self.hierarchy.move_stack_to_front(to)?;
        }
        self.resume_requested = true;
        Ok(())
    }

    fn stack_translucent_waiting(&self, stack: StackId) -> Option<ActivityId> {
        self.hierarchy
            .stack(stack)
            .ok()
            .and_then(|record| record.translucent_activity_waiting)
    }

    /// Turns fullscreen standard stacks into split-screen secondaries so
    /// they pair with a new primary; an existing primary becomes fullscreen.
    fn enter_split_screen(&mut self, display: DisplayId, primary: Option<StackId>) -> Result<()> {
        let others: Vec<StackId> = self
            .hierarchy
            .display(display)?
            .stacks_top_down()
            .filter(|stack| Some(*stack) != primary)
            .collect();
        for stack in others {
            let record = self.hierarchy.stack_mut(stack)?;
            match record.windowing_mode {
                WindowingMode::SplitScreenPrimary => {
                    record.windowing_mode = WindowingMode::Fullscreen;
                }
                WindowingMode::Fullscreen if record.activity_type == ActivityType::Standard => {
                    record.windowing_mode = WindowingMode::SplitScreenSecondary;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns every split-screen stack on the display to fullscreen.
    pub(crate) fn dismiss_split_screen(&mut self, display_id: DisplayId) -> Result<()> {
        let stacks: Vec<StackId> = self.hierarchy.display(display_id)?.stacks().to_vec();
        let mut dismissed = false;
        for stack in stacks {
            let record = self.hierarchy.stack_mut(stack)?;
            if record.windowing_mode.is_split_screen() {
                record.windowing_mode = WindowingMode::Fullscreen;
                dismissed = true;
            }
        }
        if dismissed {
            tracing::info!(display = %display_id, "Split screen dismissed");
            self.resume_requested = true;
        }
        Ok(())
    }
}
