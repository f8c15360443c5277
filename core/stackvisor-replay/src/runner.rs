//! Drives a validated script against a supervisor.

use std::collections::BTreeMap;
use std::time::Duration;

use stackvisor_core::{
    check_invariants, ActivityId, ActivitySpec, ActivityType, Bounds, DisplayId, LaunchMode,
    ProcessId, SchedulerConfig, SchedulerSnapshot, StackError, StackId, StackSupervisor,
    StartRequest, TaskId, WindowingMode,
};
use stackvisor_protocol::{Script, Step};
use thiserror::Error;

use crate::services::ScriptedServices;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("step {index} ({op}): {source}")]
    Supervisor {
        index: usize,
        op: &'static str,
        #[source]
        source: StackError,
    },

    #[error("step {index}: unknown label '{label}'")]
    UnknownLabel { index: usize, label: String },

    #[error("step {index}: unknown {kind} '{name}'")]
    UnknownName {
        index: usize,
        kind: &'static str,
        name: String,
    },

    #[error("step {index}: expected {activity} to be {expected}, found {actual}")]
    UnexpectedState {
        index: usize,
        activity: String,
        expected: String,
        actual: String,
    },
}

/// Outcome of a complete replay.
#[derive(Debug)]
pub struct ReplayReport {
    pub steps: usize,
    pub delivered: usize,
    pub process_starts: usize,
    pub dumps: Vec<SchedulerSnapshot>,
    pub invariant_violations: Vec<String>,
    pub final_snapshot: SchedulerSnapshot,
}

pub struct Replayer {
    supervisor: StackSupervisor<ScriptedServices>,
    displays: BTreeMap<String, DisplayId>,
    stacks: BTreeMap<String, StackId>,
    activities: BTreeMap<String, ActivityId>,
    dumps: Vec<SchedulerSnapshot>,
    violations: Vec<String>,
}

impl Replayer {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            supervisor: StackSupervisor::new(config, ScriptedServices::default()),
            displays: BTreeMap::new(),
            stacks: BTreeMap::new(),
            activities: BTreeMap::new(),
            dumps: Vec::new(),
            violations: Vec::new(),
        }
    }

    /// Runs every step, stopping at the first failure.
    pub fn run(mut self, script: &Script) -> Result<ReplayReport, ReplayError> {
        for (index, step) in script.steps.iter().enumerate() {
            tracing::debug!(step = index, op = step.name(), "Replaying step");
            self.apply(index, step)?;
            for violation in check_invariants(&self.supervisor) {
                tracing::error!(step = index, op = step.name(), violation = %violation, "Invariant violated");
                self.violations.push(format!("step {index}: {violation}"));
            }
        }

        let services = self.supervisor.services();
        Ok(ReplayReport {
            steps: script.steps.len(),
            delivered: services.delivered(),
            process_starts: services.process_starts(),
            final_snapshot: self.supervisor.dump(),
            dumps: self.dumps,
            invariant_violations: self.violations,
        })
    }

    pub fn apply(&mut self, index: usize, step: &Step) -> Result<(), ReplayError> {
        let op = step.name();
        let wrap = |source: StackError| ReplayError::Supervisor { index, op, source };

        match step {
            Step::AddDisplay {
                label,
                can_show_with_insecure_keyguard,
            } => {
                let display = self.supervisor.add_display(*can_show_with_insecure_keyguard);
                self.displays.insert(label.clone(), display);
            }
            Step::CreateStack {
                label,
                display,
                windowing_mode,
                activity_type,
                on_top,
            } => {
                let display = match display {
                    Some(label) => lookup(&self.displays, index, label)?,
                    None => self.supervisor.default_display(),
                };
                let mode = windowing_mode_named(index, windowing_mode)?;
                let activity_type = ActivityType::from_name(activity_type).ok_or_else(|| {
                    ReplayError::UnknownName {
                        index,
                        kind: "activity type",
                        name: activity_type.clone(),
                    }
                })?;
                let stack = self
                    .supervisor
                    .create_stack(display, mode, activity_type, *on_top)
                    .map_err(wrap)?;
                self.stacks.insert(label.clone(), stack);
            }
            Step::StartActivity {
                label,
                component,
                process,
                stack,
                new_task,
                launch_mode,
                affinity,
                intent,
                translucent,
                no_history,
                show_when_locked,
                dismiss_keyguard,
                resume_while_pausing,
                supports_picture_in_picture,
                state_not_needed,
            } => {
                let mut spec = ActivitySpec::new(component.as_str(), process.as_str());
                if let Some(mode) = launch_mode {
                    let mode = LaunchMode::from_name(mode).ok_or_else(|| ReplayError::UnknownName {
                        index,
                        kind: "launch mode",
                        name: mode.clone(),
                    })?;
                    spec = spec.with_launch_mode(mode);
                }
                if let Some(affinity) = affinity {
                    spec = spec.with_affinity(affinity.as_str());
                }
                if *translucent {
                    spec = spec.translucent();
                }
                spec.no_history = *no_history;
                spec.show_when_locked = *show_when_locked;
                spec.dismiss_keyguard = *dismiss_keyguard;
                spec.resume_while_pausing = *resume_while_pausing;
                spec.supports_picture_in_picture = *supports_picture_in_picture;
                spec.state_not_needed = *state_not_needed;

                let mut request = StartRequest::new(spec);
                if let Some(stack) = stack {
                    request = request.in_stack(lookup(&self.stacks, index, stack)?);
                }
                if *new_task {
                    request = request.in_new_task();
                }
                if let Some(intent) = intent {
                    request = request.with_intent(intent.as_str());
                }
                let outcome = self.supervisor.start_activity(request).map_err(wrap)?;
                if outcome.reused {
                    tracing::info!(label = %label, activity = %outcome.activity, "Label bound to reused activity");
                }
                self.activities.insert(label.clone(), outcome.activity);
            }
            Step::AttachProcess { process, pid } => {
                let attached = self
                    .supervisor
                    .attach_process(process, ProcessId(*pid))
                    .map_err(wrap)?;
                tracing::info!(process = %process, pid, attached, "Process attached");
            }
            Step::ProcessDied { pid } => {
                self.supervisor
                    .handle_process_died(ProcessId(*pid))
                    .map_err(wrap)?;
            }
            Step::KillProcess { pid } => {
                self.supervisor.services_mut().kill(ProcessId(*pid));
            }
            Step::ActivityPaused { activity } => {
                let id = self.activity(index, activity)?;
                self.supervisor.activity_paused(id).map_err(wrap)?;
            }
            Step::ActivityStopped { activity } => {
                let id = self.activity(index, activity)?;
                self.supervisor.activity_stopped(id).map_err(wrap)?;
            }
            Step::ActivityDestroyed { activity } => {
                let id = self.activity(index, activity)?;
                self.supervisor.activity_destroyed(id).map_err(wrap)?;
            }
            Step::ActivityIdle { activity } => {
                let id = self.activity(index, activity)?;
                self.supervisor.activity_idle(id).map_err(wrap)?;
            }
            Step::ActivityDrawn { activity } => {
                let id = self.activity(index, activity)?;
                self.supervisor.activity_drawn(id).map_err(wrap)?;
            }
            Step::FinishActivity { activity } => {
                let id = self.activity(index, activity)?;
                self.supervisor.finish_activity(id).map_err(wrap)?;
            }
            Step::SendResult { activity, result } => {
                let id = self.activity(index, activity)?;
                self.supervisor
                    .send_result(id, result.as_str())
                    .map_err(wrap)?;
            }
            Step::AdvanceTime { ms } => {
                self.supervisor.advance_time(Duration::from_millis(*ms));
            }
            Step::MoveTaskToFront { activity } => {
                let task = self.task_of(index, activity).map_err(|e| e.or(wrap))?;
                self.supervisor.move_task_to_front(task).map_err(wrap)?;
            }
            Step::MoveTaskToBack { activity } => {
                let task = self.task_of(index, activity).map_err(|e| e.or(wrap))?;
                self.supervisor.move_task_to_back(task).map_err(wrap)?;
            }
            Step::RemoveTask { activity } => {
                let task = self.task_of(index, activity).map_err(|e| e.or(wrap))?;
                self.supervisor.remove_task(task).map_err(wrap)?;
            }
            Step::MoveTaskToPinned {
                activity,
                label,
                bounds,
            } => {
                let task = self.task_of(index, activity).map_err(|e| e.or(wrap))?;
                let [left, top, right, bottom] = *bounds;
                let stack = self
                    .supervisor
                    .move_task_to_pinned_stack(task, Bounds::new(left, top, right, bottom))
                    .map_err(wrap)?;
                self.stacks.insert(label.clone(), stack);
            }
            Step::SetWindowingMode {
                stack,
                windowing_mode,
            } => {
                let stack = lookup(&self.stacks, index, stack)?;
                let mode = windowing_mode_named(index, windowing_mode)?;
                self.supervisor
                    .set_windowing_mode(stack, mode)
                    .map_err(wrap)?;
            }
            Step::SetForceHidden { stack, hidden } => {
                let stack = lookup(&self.stacks, index, stack)?;
                self.supervisor
                    .set_force_hidden(stack, *hidden)
                    .map_err(wrap)?;
            }
            Step::SetKeyguardShown {
                showing,
                aod_showing,
            } => self
                .supervisor
                .set_keyguard_shown(*showing, *aod_showing)
                .map_err(wrap)?,
            Step::SetKeyguardSecure { secure } => self.supervisor.set_keyguard_secure(*secure),
            Step::SetKeyguardTrusted { trusted } => self.supervisor.set_keyguard_trusted(*trusted),
            Step::KeyguardGoingAway => self.supervisor.keyguard_going_away(),
            Step::ConvertToTranslucent { activity } => {
                let id = self.activity(index, activity)?;
                let converted = self.supervisor.convert_to_translucent(id).map_err(wrap)?;
                tracing::info!(activity = %id, converted, "Convert to translucent");
            }
            Step::ConvertFromTranslucent { activity } => {
                let id = self.activity(index, activity)?;
                let converted = self.supervisor.convert_from_translucent(id).map_err(wrap)?;
                tracing::info!(activity = %id, converted, "Convert from translucent");
            }
            Step::RestartProcessIfVisible { activity } => {
                let id = self.activity(index, activity)?;
                let restarted = self.supervisor.restart_process_if_visible(id).map_err(wrap)?;
                tracing::info!(activity = %id, restarted, "Restart process if visible");
            }
            Step::GoToSleep => self.supervisor.go_to_sleep().map_err(wrap)?,
            Step::WakeUp => self.supervisor.wake_up().map_err(wrap)?,
            Step::Shutdown => self.supervisor.shutdown().map_err(wrap)?,
            Step::Resume => {
                self.supervisor
                    .resume_focused_stacks_top_activities()
                    .map_err(wrap)?;
            }
            Step::ExpectState { activity, state } => {
                let id = self.activity(index, activity)?;
                // Removed records count as destroyed.
                let actual = self
                    .supervisor
                    .activity_state(id)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "destroyed".to_string());
                if &actual != state {
                    return Err(ReplayError::UnexpectedState {
                        index,
                        activity: activity.clone(),
                        expected: state.clone(),
                        actual,
                    });
                }
            }
            Step::Dump => self.dumps.push(self.supervisor.dump()),
        }
        Ok(())
    }

    fn activity(&self, index: usize, label: &str) -> Result<ActivityId, ReplayError> {
        lookup(&self.activities, index, label)
    }

    fn task_of(&self, index: usize, label: &str) -> Result<TaskId, LookupFailure> {
        let id = self.activity(index, label).map_err(LookupFailure::Replay)?;
        let record = self
            .supervisor
            .hierarchy()
            .activity(id)
            .map_err(LookupFailure::Supervisor)?;
        Ok(record.task())
    }
}

/// Task lookups fail either on the label or inside the hierarchy.
enum LookupFailure {
    Replay(ReplayError),
    Supervisor(StackError),
}

impl LookupFailure {
    fn or(self, wrap: impl FnOnce(StackError) -> ReplayError) -> ReplayError {
        match self {
            LookupFailure::Replay(err) => err,
            LookupFailure::Supervisor(err) => wrap(err),
        }
    }
}

fn lookup<T: Copy>(map: &BTreeMap<String, T>, index: usize, label: &str) -> Result<T, ReplayError> {
    map.get(label).copied().ok_or_else(|| ReplayError::UnknownLabel {
        index,
        label: label.to_string(),
    })
}

fn windowing_mode_named(index: usize, name: &str) -> Result<WindowingMode, ReplayError> {
    WindowingMode::from_name(name).ok_or_else(|| ReplayError::UnknownName {
        index,
        kind: "windowing mode",
        name: name.to_string(),
    })
}
