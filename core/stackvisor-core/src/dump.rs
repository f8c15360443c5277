//! Serializable snapshot of the whole scheduler for introspection.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::focus::FocusCoordinator;
use crate::keyguard::KeyguardController;
use crate::pending::PendingOperation;
use crate::services::SystemServices;
use crate::supervisor::StackSupervisor;
use crate::types::{
    ActivityId, ActivityState, ActivityType, Bounds, DisplayId, ProcessId, StackId,
    StackVisibility, TaskId, WindowingMode,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerSnapshot {
    pub captured_at: DateTime<Utc>,
    pub now_ms: u64,
    pub sleeping: bool,
    pub shutting_down: bool,
    /// Front to back.
    pub displays: Vec<DisplaySnapshot>,
    pub focus: FocusCoordinator,
    pub pending: Vec<PendingOperation>,
    pub keyguard: KeyguardController,
    pub stopping: Vec<ActivityId>,
    pub processes: Vec<ProcessSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplaySnapshot {
    pub id: DisplayId,
    pub focused_stack: Option<StackId>,
    /// Front to back.
    pub stacks: Vec<StackSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackSnapshot {
    pub id: StackId,
    pub windowing_mode: WindowingMode,
    pub activity_type: ActivityType,
    pub visibility: StackVisibility,
    pub force_hidden: bool,
    pub bounds: Option<Bounds>,
    pub last_paused_activity: Option<ActivityId>,
    /// Front to back.
    pub tasks: Vec<TaskSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub affinity: String,
    /// Front to back.
    pub activities: Vec<ActivitySnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivitySnapshot {
    pub id: ActivityId,
    pub component: String,
    pub state: ActivityState,
    pub finishing: bool,
    pub visible_requested: bool,
    pub now_visible: bool,
    pub occludes_parent: bool,
    pub process: Option<ProcessId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessSnapshot {
    pub name: String,
    pub pid: ProcessId,
}

impl<S: SystemServices> StackSupervisor<S> {
    pub fn dump(&self) -> SchedulerSnapshot {
        let displays = self
            .hierarchy
            .displays_top_down()
            .into_iter()
            .filter_map(|display| self.dump_display(display))
            .collect();
        SchedulerSnapshot {
            captured_at: Utc::now(),
            now_ms: self.now.as_millis() as u64,
            sleeping: self.sleeping,
            shutting_down: self.shutting_down,
            displays,
            focus: self.focus.clone(),
            pending: self.pending.operations(),
            keyguard: self.keyguard.clone(),
            stopping: self.stopping.clone(),
            processes: self
                .processes
                .iter()
                .map(|(name, pid)| ProcessSnapshot {
                    name: name.clone(),
                    pid: *pid,
                })
                .collect(),
        }
    }

    fn dump_display(&self, display: DisplayId) -> Option<DisplaySnapshot> {
        let record = self.hierarchy.display(display).ok()?;
        Some(DisplaySnapshot {
            id: display,
            focused_stack: self.focused_stack_on_display(display),
            stacks: record
                .stacks_top_down()
                .filter_map(|stack| self.dump_stack(stack))
                .collect(),
        })
    }

    fn dump_stack(&self, stack: StackId) -> Option<StackSnapshot> {
        let record = self.hierarchy.stack(stack).ok()?;
        let tasks = record
            .tasks()
            .iter()
            .rev()
            .filter_map(|task| self.hierarchy.task(*task).ok())
            .map(|task| TaskSnapshot {
                id: task.id,
                affinity: task.affinity.clone(),
                activities: task
                    .activities()
                    .iter()
                    .rev()
                    .filter_map(|id| self.hierarchy.activity(*id).ok())
                    .map(|activity| ActivitySnapshot {
                        id: activity.id,
                        component: activity.spec.component.clone(),
                        state: activity.state(),
                        finishing: activity.is_finishing(),
                        visible_requested: activity.visible_requested(),
                        now_visible: activity.now_visible(),
                        occludes_parent: activity.occludes_parent(),
                        process: activity.process(),
                    })
                    .collect(),
            })
            .collect();
        Some(StackSnapshot {
            id: stack,
            windowing_mode: record.windowing_mode(),
            activity_type: record.activity_type(),
            visibility: record.cached_visibility(),
            force_hidden: record.is_force_hidden(),
            bounds: record.bounds(),
            last_paused_activity: record.last_paused_activity(),
            tasks,
        })
    }
}

impl SchedulerSnapshot {
    /// Same snapshot with the capture time zeroed, for comparing two dumps.
    pub fn without_timestamp(mut self) -> Self {
        self.captured_at = DateTime::<Utc>::default();
        self
    }
}
