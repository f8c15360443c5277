//! Collaborators the scheduler drives but does not implement.
//!
//! Transaction delivery and process creation are the only calls whose outcome
//! matters for correctness; the rest are fire-and-forget notifications to the
//! compositing and system UI layers.

use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;
use crate::types::{ActivityId, Bounds, DisplayId, ProcessId, StackId};

/// Lifecycle request sent to the client hosting an activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleTransaction {
    Launch {
        and_resume: bool,
    },
    Resume {
        results: Vec<String>,
        new_intents: Vec<String>,
    },
    NewIntent {
        intents: Vec<String>,
    },
    Start,
    Pause {
        finishing: bool,
        user_leaving: bool,
        dont_report: bool,
    },
    Stop,
    Destroy {
        finishing: bool,
    },
    Visibility {
        visible: bool,
    },
    TranslucentConversionComplete {
        drawn: bool,
    },
}

impl LifecycleTransaction {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleTransaction::Launch { .. } => "launch",
            LifecycleTransaction::Resume { .. } => "resume",
            LifecycleTransaction::NewIntent { .. } => "new_intent",
            LifecycleTransaction::Start => "start",
            LifecycleTransaction::Pause { .. } => "pause",
            LifecycleTransaction::Stop => "stop",
            LifecycleTransaction::Destroy { .. } => "destroy",
            LifecycleTransaction::Visibility { .. } => "visibility",
            LifecycleTransaction::TranslucentConversionComplete { .. } => {
                "translucent_conversion_complete"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppTransition {
    None,
    ActivityOpen,
    ActivityClose,
    TaskOpen,
    TaskClose,
    TaskToFront,
    TaskToBack,
}

/// Asynchronous process creation request; completion is observed later
/// through `attach_process`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessStartRequest {
    pub activity: ActivityId,
    pub process_name: String,
    pub known_dead: bool,
    pub is_top: bool,
    pub reason: &'static str,
}

pub trait SystemServices {
    /// Delivers a lifecycle transaction to the client process.
    fn deliver_transaction(
        &mut self,
        process: ProcessId,
        activity: ActivityId,
        transaction: LifecycleTransaction,
    ) -> Result<(), DeliveryError>;

    fn start_process_for_activity(&mut self, request: ProcessStartRequest);

    fn start_home_activity(&mut self, _display: DisplayId, _reason: &'static str) {}

    fn animate_stack_bounds(&mut self, _stack: StackId, _bounds: Bounds) {}

    fn execute_app_transition(&mut self, _transition: AppTransition) {}

    fn notify_keyguard_occluded(&mut self, _occluded: bool) {}

    fn request_dismiss_keyguard(&mut self) {}
}
