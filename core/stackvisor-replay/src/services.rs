//! Collaborators for replay: log every call, fail deliveries to killed pids.

use std::collections::BTreeSet;

use stackvisor_core::{
    ActivityId, AppTransition, Bounds, DeliveryError, DisplayId, LifecycleTransaction, ProcessId,
    ProcessStartRequest, StackId, SystemServices,
};

#[derive(Debug, Default)]
pub struct ScriptedServices {
    dead: BTreeSet<ProcessId>,
    delivered: usize,
    process_starts: usize,
}

impl ScriptedServices {
    pub fn kill(&mut self, pid: ProcessId) {
        tracing::info!(pid = %pid, "Process marked dead for delivery");
        self.dead.insert(pid);
    }

    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn process_starts(&self) -> usize {
        self.process_starts
    }
}

impl SystemServices for ScriptedServices {
    fn deliver_transaction(
        &mut self,
        process: ProcessId,
        activity: ActivityId,
        transaction: LifecycleTransaction,
    ) -> Result<(), DeliveryError> {
        if self.dead.contains(&process) {
            return Err(DeliveryError::ProcessDead(process));
        }
        self.delivered += 1;
        tracing::info!(
            pid = %process,
            activity = %activity,
            transaction = ?transaction,
            "deliver"
        );
        Ok(())
    }

    fn start_process_for_activity(&mut self, request: ProcessStartRequest) {
        self.process_starts += 1;
        tracing::info!(
            activity = %request.activity,
            process = %request.process_name,
            known_dead = request.known_dead,
            is_top = request.is_top,
            reason = request.reason,
            "start process"
        );
    }

    fn start_home_activity(&mut self, display_id: DisplayId, reason: &'static str) {
        tracing::info!(display = %display_id, reason, "start home");
    }

    fn animate_stack_bounds(&mut self, stack: StackId, bounds: Bounds) {
        tracing::info!(stack = %stack, bounds = ?bounds, "animate bounds");
    }

    fn execute_app_transition(&mut self, transition: AppTransition) {
        if transition != AppTransition::None {
            tracing::debug!(transition = ?transition, "app transition");
        }
    }

    fn notify_keyguard_occluded(&mut self, occluded: bool) {
        tracing::info!(occluded, "keyguard occluded");
    }

    fn request_dismiss_keyguard(&mut self) {
        tracing::info!("dismiss keyguard");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn killed_process_rejects_delivery() {
        let mut services = ScriptedServices::default();
        let pid = ProcessId(7);
        assert!(services
            .deliver_transaction(pid, ActivityId(1), LifecycleTransaction::Stop)
            .is_ok());

        services.kill(pid);
        let err = services
            .deliver_transaction(pid, ActivityId(1), LifecycleTransaction::Stop)
            .unwrap_err();
        assert_eq!(err, DeliveryError::ProcessDead(pid));
        assert_eq!(services.delivered(), 1);
    }
}
