//! The stack supervisor: owner of the hierarchy and every public entry point.
//!
//! All mutation happens through `&mut self`, so a single lock around the
//! supervisor (see [`SharedSupervisor`](crate::shared::SharedSupervisor))
//! serializes the whole scheduler. Operations that wait for a client never
//! block: they arm a [`PendingOperations`] record and return, and the matching
//! acknowledgement, timeout or process death resumes the protocol later.
//!
//! Every public entry point ends with a settle step that handles processes
//! discovered dead during delivery, runs a deferred resume, recomputes
//! visibility and drains the stopping list.

mod launch;
mod lifecycle;
mod ordering;
mod power;
mod process;
mod teardown;
mod visibility_pass;

pub use launch::{LaunchOutcome, StartRequest};

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::config::SchedulerConfig;
use crate::error::{DeliveryError, Result, StackError};
use crate::focus::FocusCoordinator;
use crate::hierarchy::Hierarchy;
use crate::keyguard::KeyguardController;
use crate::pending::PendingOperations;
use crate::services::{LifecycleTransaction, SystemServices};
use crate::types::{
    ActivityId, ActivityState, Completion, DisplayId, ProcessId, StackId, StackVisibility,
};
use crate::visibility;

/// Upper bound on settle iterations per entry point; leftovers wait for the next entry.
const MAX_SETTLE_PASSES: usize = 3;

pub struct StackSupervisor<S: SystemServices> {
    pub(crate) hierarchy: Hierarchy,
    pub(crate) focus: FocusCoordinator,
    pub(crate) pending: PendingOperations,
    pub(crate) keyguard: KeyguardController,
    pub(crate) config: SchedulerConfig,
    pub(crate) services: S,
    /// Live processes by name.
    pub(crate) processes: BTreeMap<String, ProcessId>,
    pub(crate) pending_process_starts: BTreeSet<String>,
    pub(crate) dead_processes: Vec<ProcessId>,
    pub(crate) stopping: Vec<ActivityId>,
    pub(crate) now: Duration,
    pub(crate) sleeping: bool,
    pub(crate) shutting_down: bool,
    pub(crate) recents_animation_running: bool,
    pub(crate) user_leaving: bool,
    pub(crate) resume_requested: bool,
    pub(crate) in_visibility_update: bool,
    pub(crate) default_display: DisplayId,
}

impl<S: SystemServices> StackSupervisor<S> {
    pub fn new(config: SchedulerConfig, services: S) -> Self {
        let mut hierarchy = Hierarchy::new();
        let default_display = hierarchy.add_display(config.display.can_show_with_insecure_keyguard);
        Self {
            hierarchy,
            focus: FocusCoordinator::new(),
            pending: PendingOperations::new(),
            keyguard: KeyguardController::new(),
            config,
            services,
            processes: BTreeMap::new(),
            pending_process_starts: BTreeSet::new(),
            dead_processes: Vec::new(),
            stopping: Vec::new(),
            now: Duration::ZERO,
            sleeping: false,
            shutting_down: false,
            recents_animation_running: false,
            user_leaving: false,
            resume_requested: false,
            in_visibility_update: false,
            default_display,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn focus(&self) -> &FocusCoordinator {
        &self.focus
    }

    pub fn pending(&self) -> &PendingOperations {
        &self.pending
    }

    pub fn keyguard(&self) -> &KeyguardController {
        &self.keyguard
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn services(&self) -> &S {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut S {
        &mut self.services
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    pub fn default_display(&self) -> DisplayId {
        self.default_display
    }

    pub fn stopping_activities(&self) -> &[ActivityId] {
        &self.stopping
    }

    pub fn processes(&self) -> &BTreeMap<String, ProcessId> {
        &self.processes
    }

    pub fn activity_state(&self, activity: ActivityId) -> Option<ActivityState> {
        self.hierarchy
            .activity(activity)
            .ok()
            .map(|record| record.state())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    pub fn top_running_activity(&self, focusable_only: bool) -> Option<ActivityId> {
        self.hierarchy.top_running_activity(focusable_only)
    }

    pub fn get_visibility(&self, stack: StackId, starting: Option<ActivityId>) -> StackVisibility {
        visibility::stack_visibility(
            &self.hierarchy,
            stack,
            starting,
            self.recents_animation_running,
        )
    }

    pub fn should_be_visible(&self, stack: StackId, starting: Option<ActivityId>) -> bool {
        self.get_visibility(stack, starting).is_visible()
    }

    /// A stack can take focus only while it shows a focusable running activity.
    pub fn is_focusable_and_visible(&self, stack: StackId) -> bool {
        self.hierarchy
            .stack(stack)
            .is_ok_and(|record| record.is_focusable())
            && self
                .hierarchy
                .top_running_activity_in_stack(stack, true)
                .is_some()
            && self.should_be_visible(stack, None)
    }

    /// Topmost focusable, visible stack on the display.
    pub fn focused_stack_on_display(&self, display: DisplayId) -> Option<StackId> {
        let display = self.hierarchy.display(display).ok()?;
        display
            .stacks_top_down()
            .find(|stack| self.is_focusable_and_visible(*stack))
    }

    /// Focused stack of the frontmost display that has one.
    pub fn top_focused_stack(&self) -> Option<StackId> {
        self.hierarchy
            .displays_top_down()
            .into_iter()
            .find_map(|display| self.focused_stack_on_display(display))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Entry Points
    // ─────────────────────────────────────────────────────────────────────

    pub fn add_display(&mut self, can_show_with_insecure_keyguard: bool) -> DisplayId {
        let display_id = self.hierarchy.add_display(can_show_with_insecure_keyguard);
        tracing::info!(display = %display_id, "Display added");
        display_id
    }

    /// Advances the virtual clock, forcing completion of expired operations.
    pub fn advance_time(&mut self, delta: Duration) {
        self.now += delta;
        while let Some(op) = self.pending.pop_expired(self.now) {
            tracing::warn!(
                activity = %op.activity,
                kind = ?op.kind,
                deadline_ms = op.deadline.as_millis() as u64,
                "Operation timed out"
            );
            if let Err(err) = self.complete_operation(op.activity, op.kind, Completion::TimedOut) {
                self.log_failure("timeout", &err);
            }
        }
        self.finish_entry();
    }

    /// Asks the scheduler to re-evaluate which activity should be resumed.
    pub fn resume_focused_stacks_top_activities(&mut self) -> Result<bool> {
        self.run_entry("resume_focused_stacks_top_activities", |s| {
            s.resume_focused_stacks(None, None)
        })
    }

    pub fn set_recents_animation_running(&mut self, running: bool) {
        self.recents_animation_running = running;
        self.finish_entry();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internal Plumbing
    // ─────────────────────────────────────────────────────────────────────

    /// Runs an entry point body, logs its failure and settles the scheduler.
    pub(crate) fn run_entry<T>(
        &mut self,
        operation: &'static str,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let result = body(self);
        if let Err(err) = &result {
            self.log_failure(operation, err);
        }
        self.finish_entry();
        result
    }

    pub(crate) fn log_failure(&self, operation: &'static str, err: &StackError) {
        if err.is_defect() {
            tracing::error!(operation, error = %err, "Operation aborted");
        } else {
            tracing::debug!(operation, error = %err, "Operation rejected");
        }
    }

    fn finish_entry(&mut self) {
        for _ in 0..MAX_SETTLE_PASSES {
            for pid in std::mem::take(&mut self.dead_processes) {
                if let Err(err) = self.process_died(pid) {
                    self.log_failure("process_died", &err);
                }
            }
            if std::mem::take(&mut self.resume_requested) {
                if let Err(err) = self.resume_focused_stacks(None, None) {
                    self.log_failure("resume_focused_stacks", &err);
                }
            }
            self.ensure_activities_visible(None);
            if let Err(err) = self.process_stopping_activities(false) {
                self.log_failure("process_stopping_activities", &err);
            }
            if self.dead_processes.is_empty() && !self.resume_requested {
                return;
            }
        }
        tracing::debug!(
            resume_requested = self.resume_requested,
            dead_processes = self.dead_processes.len(),
            "Scheduler left work for the next entry point"
        );
    }

    /// Applies a lifecycle state change and keeps the focus registry in step.
    pub(crate) fn set_state(
        &mut self,
        activity: ActivityId,
        state: ActivityState,
        reason: &'static str,
    ) -> Result<ActivityState> {
        let stack = self.hierarchy.stack_of_activity(activity)?;
        let prev = self.hierarchy.activity_mut(activity)?.transition_to(state)?;
        if prev == state {
            return Ok(prev);
        }
        tracing::debug!(activity = %activity, from = %prev, to = %state, reason, "State changed");
        if state == ActivityState::Resumed {
            self.focus.set_resumed(stack, activity);
            tracing::info!(activity = %activity, stack = %stack, "Activity resumed");
        } else if prev == ActivityState::Resumed {
            self.focus.clear_resumed(stack, activity);
        }
        Ok(prev)
    }

    /// Delivers a transaction; returns false when the client could not take it.
    pub(crate) fn deliver(
        &mut self,
        activity: ActivityId,
        transaction: LifecycleTransaction,
    ) -> Result<bool> {
        let Some(process) = self.hierarchy.activity(activity)?.process() else {
            return Ok(false);
        };
        let name = transaction.name();
        match self
            .services
            .deliver_transaction(process, activity, transaction)
        {
            Ok(()) => {
                tracing::debug!(activity = %activity, pid = %process, transaction = name, "Transaction delivered");
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(
                    activity = %activity,
                    pid = %process,
                    transaction = name,
                    error = %err,
                    "Transaction delivery failed"
                );
                if let DeliveryError::ProcessDead(_) = err {
                    self.mark_process_dead(process);
                }
                Ok(false)
            }
        }
    }

    /// Forgets a process as live and queues its death handling.
    pub(crate) fn mark_process_dead(&mut self, pid: ProcessId) {
        self.processes.retain(|_, live| *live != pid);
        if !self.dead_processes.contains(&pid) {
            self.dead_processes.push(pid);
        }
    }
}
