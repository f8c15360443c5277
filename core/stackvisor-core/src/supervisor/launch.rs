//! Activity launch: target resolution, launch modes and new-intent delivery.

use serde::{Deserialize, Serialize};

use crate::activity::ActivitySpec;
use crate::error::Result;
use crate::services::{AppTransition, LifecycleTransaction, SystemServices};
use crate::types::{
    ActivityId, ActivityState, ActivityType, DisplayId, LaunchMode, StackId, TaskId,
    WindowingMode,
};

use super::StackSupervisor;

/// A request to start an activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    pub spec: ActivitySpec,
    /// Launch into this stack instead of the default target.
    #[serde(default)]
    pub stack: Option<StackId>,
    #[serde(default)]
    pub new_task: bool,
    /// Intent payload delivered to a reused instance.
    #[serde(default)]
    pub intent: Option<String>,
}

impl StartRequest {
    pub fn new(spec: ActivitySpec) -> Self {
        Self {
            spec,
            stack: None,
            new_task: false,
            intent: None,
        }
    }

    pub fn in_stack(mut self, stack: StackId) -> Self {
        self.stack = Some(stack);
        self
    }

    pub fn in_new_task(mut self) -> Self {
        self.new_task = true;
        self
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LaunchOutcome {
    pub activity: ActivityId,
    /// An existing instance took the launch instead of a new record.
    pub reused: bool,
}

impl<S: SystemServices> StackSupervisor<S> {
    pub fn start_activity(&mut self, request: StartRequest) -> Result<LaunchOutcome> {
        self.run_entry("start_activity", |s| s.start_activity_inner(request))
    }

    /// Queues a result for delivery with the activity's next resume.
    pub fn send_result(&mut self, activity: ActivityId, result: impl Into<String>) -> Result<()> {
        let result = result.into();
        self.run_entry("send_result", |s| {
            s.hierarchy.activity_mut(activity)?.pending_results.push(result);
            Ok(())
        })
    }

    fn start_activity_inner(&mut self, request: StartRequest) -> Result<LaunchOutcome> {
        let display = match request.stack {
            Some(stack) => self.hierarchy.display_of_stack(stack)?,
            None => self.front_display(),
        };

        match request.spec.launch_mode {
            LaunchMode::SingleTask | LaunchMode::SingleInstance => {
                if let Some(existing) = self
                    .hierarchy
                    .find_activity_by_component(display, &request.spec.component)
                {
                    return self.bring_existing_to_front(existing, request.intent, true);
                }
            }
            LaunchMode::SingleTop => {
                let top = self.hierarchy.top_running_activity_on_display(display, true);
                let matches_top = top
                    .and_then(|id| self.hierarchy.activity(id).ok())
                    .is_some_and(|record| record.spec.component == request.spec.component);
                if let Some(top) = top.filter(|_| matches_top) {
                    return self.bring_existing_to_front(top, request.intent, false);
                }
            }
            LaunchMode::Standard => {}
        }

        let (stack, task, new_task) = self.resolve_launch_target(&request, display)?;
        let component = request.spec.component.clone();
        let activity = self.hierarchy.add_activity(task, request.spec)?;
        self.hierarchy.move_task_to_top(task)?;
        self.hierarchy.move_stack_to_front(stack)?;
        self.user_leaving = true;
        tracing::info!(
            activity = %activity,
            component = %component,
            stack = %stack,
            task = %task,
            "Starting activity"
        );
        self.services.execute_app_transition(if new_task {
            AppTransition::TaskOpen
        } else {
            AppTransition::ActivityOpen
        });
        self.resume_focused_stacks(Some(stack), None)?;
        Ok(LaunchOutcome {
            activity,
            reused: false,
        })
    }

    fn front_display(&self) -> DisplayId {
        self.hierarchy
            .displays_top_down()
            .first()
            .copied()
            .unwrap_or(self.default_display)
    }

    /// Picks the stack and task a new record lands in; the flag reports
    /// whether the task was created for it.
    fn resolve_launch_target(
        &mut self,
        request: &StartRequest,
        display: DisplayId,
    ) -> Result<(StackId, TaskId, bool)> {
        let affinity = request.spec.effective_affinity();
        let single_instance = request.spec.launch_mode == LaunchMode::SingleInstance;
        let wants_new_task = request.new_task
            || single_instance
            || request.spec.launch_mode == LaunchMode::SingleTask;

        if request.stack.is_none() && wants_new_task && !single_instance {
            if let Some(task) = self.hierarchy.find_task_by_affinity(display, &affinity) {
                let stack = self.hierarchy.task(task)?.stack();
                return Ok((stack, task, false));
            }
        }

        let focused = self.focused_stack_on_display(display);
        let stack = match request.stack {
            Some(stack) => stack,
            None => match self.default_launch_stack(display, focused) {
                Some(stack) => stack,
                None => self.hierarchy.create_stack(
                    display,
                    WindowingMode::Fullscreen,
                    ActivityType::Standard,
                    true,
                )?,
            },
        };

        let reusable_task = self.hierarchy.stack(stack)?.top_task();
        match reusable_task {
            Some(task) if !wants_new_task && Some(stack) == focused => Ok((stack, task, false)),
            _ => {
                let task = self.hierarchy.create_task(stack, affinity, true)?;
                Ok((stack, task, true))
            }
        }
    }

    fn default_launch_stack(
        &self,
        display: DisplayId,
        focused: Option<StackId>,
    ) -> Option<StackId> {
        let is_standard_host = |stack: StackId| {
            self.hierarchy.stack(stack).is_ok_and(|record| {
                record.activity_type == ActivityType::Standard
                    && record.windowing_mode != WindowingMode::Pinned
            })
        };
        if let Some(focused) = focused.filter(|stack| is_standard_host(*stack)) {
            return Some(focused);
        }
        self.hierarchy
            .stacks_with_mode(display, WindowingMode::Fullscreen)
            .into_iter()
            .find(|stack| is_standard_host(*stack))
    }

    fn bring_existing_to_front(
        &mut self,
        existing: ActivityId,
        intent: Option<String>,
        clear_top: bool,
    ) -> Result<LaunchOutcome> {
        let task = self.hierarchy.activity(existing)?.task;
        if clear_top {
            let above = self.hierarchy.task(task)?.above(existing);
            for activity in above.into_iter().rev() {
                let finishing = self.hierarchy.activity(activity)?.finishing;
                if !finishing {
                    self.finish_activity_inner(activity, "clear-top")?;
                }
            }
        }
        let stack = self.hierarchy.stack_of_activity(existing)?;
        self.hierarchy.move_task_to_top(task)?;
        self.hierarchy.move_stack_to_front(stack)?;
        self.services.execute_app_transition(AppTransition::TaskToFront);
        tracing::info!(activity = %existing, clear_top, "Reusing existing activity");
        if let Some(intent) = intent {
            self.deliver_new_intent(existing, intent)?;
        }
        self.user_leaving = true;
        self.resume_focused_stacks(Some(stack), None)?;
        Ok(LaunchOutcome {
            activity: existing,
            reused: true,
        })
    }

    /// Delivers now when the activity is in the foreground, otherwise queues
    /// the intent for its next resume.
    pub(crate) fn deliver_new_intent(&mut self, activity: ActivityId, intent: String) -> Result<()> {
        let foreground = {
            let record = self.hierarchy.activity(activity)?;
            record.process.is_some()
                && matches!(record.state, ActivityState::Resumed | ActivityState::Paused)
        };
        if foreground {
            let delivered = self.deliver(
                activity,
                LifecycleTransaction::NewIntent {
                    intents: vec![intent.clone()],
                },
            )?;
            if delivered {
                return Ok(());
            }
        }
        self.hierarchy.activity_mut(activity)?.new_intents.push(intent);
        Ok(())
    }
}
