//! Test doubles and builders shared by unit and integration tests.
//!
//! Enabled for this crate's own tests and, through the `test-helpers`
//! feature, for the integration tests and the replay tool.

use std::collections::BTreeSet;

use crate::activity::ActivitySpec;
use crate::config::SchedulerConfig;
use crate::error::DeliveryError;
use crate::services::{AppTransition, LifecycleTransaction, ProcessStartRequest, SystemServices};
use crate::supervisor::{StackSupervisor, StartRequest};
use crate::types::{
    ActivityId, ActivityType, Bounds, DisplayId, ProcessId, StackId, TimeoutKind, WindowingMode,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredTransaction {
    pub process: ProcessId,
    pub activity: ActivityId,
    pub transaction: LifecycleTransaction,
}

/// Records every collaborator call; deliveries to processes in `dead` fail.
#[derive(Debug, Default)]
pub struct RecordingServices {
    pub transactions: Vec<DeliveredTransaction>,
    pub process_starts: Vec<ProcessStartRequest>,
    pub home_starts: Vec<DisplayId>,
    pub transitions: Vec<AppTransition>,
    pub bounds_animations: Vec<(StackId, Bounds)>,
    pub keyguard_occluded: Vec<bool>,
    pub dismiss_keyguard_requests: usize,
    pub dead: BTreeSet<ProcessId>,
    next_pid: u32,
}

impl RecordingServices {
    /// Makes every later delivery to `pid` fail as a dead process.
    pub fn kill(&mut self, pid: ProcessId) {
        self.dead.insert(pid);
    }

    pub fn allocate_pid(&mut self) -> ProcessId {
        self.next_pid += 1;
        ProcessId(1000 + self.next_pid)
    }

    pub fn sent_to(&self, activity: ActivityId) -> Vec<&LifecycleTransaction> {
        self.transactions
            .iter()
            .filter(|delivered| delivered.activity == activity)
            .map(|delivered| &delivered.transaction)
            .collect()
    }

    /// How many transactions named `name` reached the activity.
    pub fn count(&self, activity: ActivityId, name: &str) -> usize {
        self.sent_to(activity)
            .into_iter()
            .filter(|transaction| transaction.name() == name)
            .count()
    }

    pub fn last_to(&self, activity: ActivityId) -> Option<&LifecycleTransaction> {
        self.sent_to(activity).into_iter().last()
    }

    pub fn starts_for(&self, process_name: &str) -> usize {
        self.process_starts
            .iter()
            .filter(|request| request.process_name == process_name)
            .count()
    }

    pub fn clear(&mut self) {
        self.transactions.clear();
        self.process_starts.clear();
        self.home_starts.clear();
        self.transitions.clear();
        self.bounds_animations.clear();
        self.keyguard_occluded.clear();
        self.dismiss_keyguard_requests = 0;
    }
}

impl SystemServices for RecordingServices {
    fn deliver_transaction(
        &mut self,
        process: ProcessId,
        activity: ActivityId,
        transaction: LifecycleTransaction,
    ) -> Result<(), DeliveryError> {
        if self.dead.contains(&process) {
            return Err(DeliveryError::ProcessDead(process));
        }
        self.transactions.push(DeliveredTransaction {
            process,
            activity,
            transaction,
        });
        Ok(())
    }

    fn start_process_for_activity(&mut self, request: ProcessStartRequest) {
        self.process_starts.push(request);
    }

    fn start_home_activity(&mut self, display: DisplayId, _reason: &'static str) {
        self.home_starts.push(display);
    }

    fn animate_stack_bounds(&mut self, stack: StackId, bounds: Bounds) {
        self.bounds_animations.push((stack, bounds));
    }

    fn execute_app_transition(&mut self, transition: AppTransition) {
        if transition != AppTransition::None {
            self.transitions.push(transition);
        }
    }

    fn notify_keyguard_occluded(&mut self, occluded: bool) {
        self.keyguard_occluded.push(occluded);
    }

    fn request_dismiss_keyguard(&mut self) {
        self.dismiss_keyguard_requests += 1;
    }
}

pub type TestSupervisor = StackSupervisor<RecordingServices>;

pub fn supervisor() -> TestSupervisor {
    StackSupervisor::new(SchedulerConfig::default(), RecordingServices::default())
}

pub fn spec(component: &str, process: &str) -> ActivitySpec {
    ActivitySpec::new(component, process)
}

impl StackSupervisor<RecordingServices> {
    pub fn fullscreen_stack(&mut self) -> StackId {
        self.stack_with(WindowingMode::Fullscreen, ActivityType::Standard)
    }

    pub fn stack_with(&mut self, mode: WindowingMode, activity_type: ActivityType) -> StackId {
        let display = self.default_display();
        self.create_stack(display, mode, activity_type, true)
            .expect("create stack")
    }

    /// Starts `spec` in `stack` and returns the new record.
    pub fn launch(&mut self, stack: StackId, spec: ActivitySpec) -> ActivityId {
        self.start_activity(StartRequest::new(spec).in_stack(stack))
            .expect("start activity")
            .activity
    }

    /// Attaches every requested process that is not live yet.
    pub fn attach_requested_processes(&mut self) -> Vec<ProcessId> {
        let mut names: Vec<String> = self
            .services()
            .process_starts
            .iter()
            .map(|request| request.process_name.clone())
            .filter(|name| !self.processes().contains_key(name))
            .collect();
        names.dedup();
        let mut attached = Vec::new();
        for name in names {
            if self.processes().contains_key(&name) {
                continue;
            }
            let pid = self.services_mut().allocate_pid();
            self.attach_process(&name, pid).expect("attach process");
            attached.push(pid);
        }
        attached
    }

    /// Acknowledges pending pauses, stops and destroys until none are left.
    pub fn ack_all(&mut self) {
        for _ in 0..16 {
            let ops: Vec<_> = self
                .pending()
                .operations()
                .into_iter()
                .filter(|op| op.kind != TimeoutKind::TranslucentConversion)
                .collect();
            if ops.is_empty() {
                return;
            }
            for op in ops {
                let result = match op.kind {
                    TimeoutKind::Pause => self.activity_paused(op.activity),
                    TimeoutKind::Stop => self.activity_stopped(op.activity),
                    TimeoutKind::Destroy => self.activity_destroyed(op.activity),
                    TimeoutKind::TranslucentConversion => Ok(()),
                };
                result.expect("ack");
            }
        }
    }

    /// Attaches requested processes and acknowledges everything pending.
    pub fn settle(&mut self) {
        for _ in 0..8 {
            let attached = self.attach_requested_processes();
            let idle = self.pending().is_empty();
            self.ack_all();
            if attached.is_empty() && idle {
                return;
            }
        }
    }

    pub fn state_of(&self, activity: ActivityId) -> Option<crate::types::ActivityState> {
        self.activity_state(activity)
    }
}
