//! Process attachment, activity launch and process death.

use crate::error::Result;
use crate::services::{AppTransition, LifecycleTransaction, ProcessStartRequest, SystemServices};
use crate::types::{ActivityId, ActivityState, Completion, ProcessId};

use super::StackSupervisor;

impl<S: SystemServices> StackSupervisor<S> {
    // ─────────────────────────────────────────────────────────────────────
    // Entry Points
    // ─────────────────────────────────────────────────────────────────────

    /// A requested process came up. Launches the activities waiting for it
    /// and returns how many were started.
    pub fn attach_process(&mut self, process_name: &str, pid: ProcessId) -> Result<usize> {
        self.run_entry("attach_process", |s| s.attach_process_inner(process_name, pid))
    }

    pub fn handle_process_died(&mut self, pid: ProcessId) -> Result<()> {
        self.run_entry("handle_process_died", |s| s.process_died(pid))
    }

    /// Kills and relaunches the activity's process if it is on screen.
    pub fn restart_process_if_visible(&mut self, activity: ActivityId) -> Result<bool> {
        self.run_entry("restart_process_if_visible", |s| {
            let (pid, visible) = {
                let record = s.hierarchy.activity(activity)?;
                (record.process, record.visible_requested)
            };
            let Some(pid) = pid.filter(|_| visible) else {
                return Ok(false);
            };
            tracing::info!(activity = %activity, pid = %pid, "Restarting visible activity process");
            s.set_state(activity, ActivityState::RestartingProcess, "restart")?;
            s.process_died(pid)?;
            s.request_process_start(activity, true, "restart")?;
            Ok(true)
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Launch
    // ─────────────────────────────────────────────────────────────────────

    /// Launches into the live process for the activity, or asks for one.
    pub(crate) fn start_specific_activity(
        &mut self,
        activity: ActivityId,
        and_resume: bool,
    ) -> Result<()> {
        let (name, mut known_dead) = {
            let record = self.hierarchy.activity(activity)?;
            (record.spec.process_name.clone(), record.process.is_some())
        };
        if let Some(pid) = self.processes.get(&name).copied() {
            if !self.focus.all_pauses_complete() {
                tracing::debug!(activity = %activity, "Launch deferred until pauses complete");
                return Ok(());
            }
            if self.real_start_activity(activity, pid, and_resume)? {
                return Ok(());
            }
            known_dead = true;
        }
        self.request_process_start(activity, known_dead, "activity")
    }

    pub(crate) fn request_process_start(
        &mut self,
        activity: ActivityId,
        known_dead: bool,
        reason: &'static str,
    ) -> Result<()> {
        let name = self.hierarchy.activity(activity)?.spec.process_name.clone();
        if !known_dead && self.pending_process_starts.contains(&name) {
            tracing::debug!(activity = %activity, process = %name, "Process start already requested");
            return Ok(());
        }
        self.pending_process_starts.insert(name.clone());
        let is_top = self
            .top_focused_stack()
            .and_then(|stack| self.hierarchy.top_running_activity_in_stack(stack, true))
            == Some(activity);
        tracing::info!(activity = %activity, process = %name, known_dead, reason, "Requesting process start");
        self.services
            .start_process_for_activity(ProcessStartRequest {
                activity,
                process_name: name,
                known_dead,
                is_top,
                reason,
            });
        Ok(())
    }

    /// Binds the activity to `pid` and delivers its launch transaction.
    pub(crate) fn real_start_activity(
        &mut self,
        activity: ActivityId,
        pid: ProcessId,
        and_resume: bool,
    ) -> Result<bool> {
        let now = self.now;
        {
            let record = self.hierarchy.activity_mut(activity)?;
            record.process = Some(pid);
            record.launch_count += 1;
            record.last_launch_at = Some(now);
            record.has_been_launched = true;
        }
        if !self.deliver(activity, LifecycleTransaction::Launch { and_resume })? {
            tracing::warn!(activity = %activity, pid = %pid, "Launch failed");
            self.hierarchy.activity_mut(activity)?.process = None;
            return Ok(false);
        }
        if and_resume {
            self.set_state(activity, ActivityState::Resumed, "launch")?;
            self.complete_resume(activity, AppTransition::None)?;
        } else {
            self.set_state(activity, ActivityState::Paused, "launch")?;
        }
        Ok(true)
    }

    fn attach_process_inner(&mut self, process_name: &str, pid: ProcessId) -> Result<usize> {
        if let Some(old) = self.processes.insert(process_name.to_string(), pid) {
            if old != pid {
                tracing::warn!(process = process_name, old = %old, pid = %pid, "Process replaced");
                self.mark_process_dead(old);
            }
        }
        self.pending_process_starts.remove(process_name);
        tracing::info!(process = process_name, pid = %pid, "Process attached");
        self.resume_requested = true;

        if !self.focus.all_pauses_complete() {
            tracing::debug!(process = process_name, "Launches deferred until pauses complete");
            return Ok(0);
        }

        let top = self
            .top_focused_stack()
            .and_then(|stack| self.hierarchy.top_running_activity_in_stack(stack, true));
        let waiting: Vec<ActivityId> = self
            .hierarchy
            .activities()
            .filter(|record| {
                record.process.is_none()
                    && record.spec.process_name == process_name
                    && !record.finishing
                    && !record.state.is_teardown()
                    && (record.visible_requested || Some(record.id) == top)
            })
            .map(|record| record.id)
            .collect();

        let mut started = 0;
        for activity in waiting {
            let and_resume = Some(activity) == top
                && self.focus.resumed_activity().is_none()
                && self.focus.all_pauses_complete();
            if self.real_start_activity(activity, pid, and_resume)? {
                started += 1;
            }
        }
        Ok(started)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Death
    // ─────────────────────────────────────────────────────────────────────

    /// Forces completion of everything the dead process owed us, then keeps
    /// or removes each of its activities.
    pub(crate) fn process_died(&mut self, pid: ProcessId) -> Result<()> {
        self.processes.retain(|_, live| *live != pid);
        self.dead_processes.retain(|dead| *dead != pid);
        let affected = self.hierarchy.activities_in_process(pid);
        if affected.is_empty() {
            tracing::debug!(pid = %pid, "Process died with no activities");
            return Ok(());
        }
        tracing::info!(pid = %pid, activities = affected.len(), "Process died");

        for activity in &affected {
            self.hierarchy.activity_mut(*activity)?.process = None;
        }
        for activity in &affected {
            for kind in self.pending.kinds_for(*activity) {
                self.complete_operation(*activity, kind, Completion::ProcessDied)?;
            }
        }
        for stack in self.hierarchy.stack_ids() {
            let record = self.hierarchy.stack_mut(stack)?;
            if record
                .last_paused_activity
                .is_some_and(|id| affected.contains(&id))
            {
                record.last_paused_activity = None;
                record.last_no_history_activity = None;
            }
        }

        let crash_loop_count = self.config.process_death.crash_loop_launch_count;
        let crash_loop_window = self.config.process_death.crash_loop_window();
        for activity in affected {
            let Ok(record) = self.hierarchy.activity(activity) else {
                continue;
            };
            let crash_looping = !record.visible_requested
                && record.launch_count >= crash_loop_count
                && record
                    .last_launch_at
                    .is_some_and(|at| self.now.saturating_sub(at) < crash_loop_window);
            let restarting = record.state == ActivityState::RestartingProcess;
            let unrecoverable =
                !record.have_state && !record.spec.state_not_needed && !restarting;
            let finishing = record.finishing;

            if finishing || unrecoverable || crash_looping {
                if !finishing {
                    tracing::warn!(activity = %activity, crash_looping, "Removing activity of dead process");
                }
                self.remove_from_history(activity, "process-died")?;
                continue;
            }

            self.stopping.retain(|id| *id != activity);
            self.hierarchy.activity_mut(activity)?.now_visible = false;
            if !restarting {
                self.set_state(activity, ActivityState::Stopped, "process-died")?;
            }
            tracing::debug!(activity = %activity, "Activity kept for relaunch");
        }
        self.resume_requested = true;
        Ok(())
    }
}
