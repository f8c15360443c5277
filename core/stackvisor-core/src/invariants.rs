//! Structural checks over a live supervisor.
//!
//! Returns human-readable violations instead of failing, so callers can log
//! them or assert on an empty list after every step of a scenario.

use crate::services::SystemServices;
use crate::supervisor::StackSupervisor;
use crate::types::ActivityState;

pub fn check_invariants<S: SystemServices>(supervisor: &StackSupervisor<S>) -> Vec<String> {
    let mut violations = Vec::new();
    let hierarchy = supervisor.hierarchy();
    let focus = supervisor.focus();

    let resumed: Vec<_> = hierarchy
        .activities()
        .filter(|record| record.state() == ActivityState::Resumed)
        .map(|record| record.id)
        .collect();
    if resumed.len() > 1 {
        violations.push(format!("more than one resumed activity: {resumed:?}"));
    }

    for record in hierarchy.activities() {
        if record.is_finishing() && record.state() == ActivityState::Resumed {
            violations.push(format!("finishing activity {} is resumed", record.id));
        }
        let Ok(task) = hierarchy.task(record.task()) else {
            violations.push(format!("activity {} points at missing task {}", record.id, record.task()));
            continue;
        };
        if !task.contains(record.id) {
            violations.push(format!("task {} does not list activity {}", task.id, record.id));
        }
    }

    for (stack, activity) in focus.resumed() {
        match hierarchy.activity(activity) {
            Ok(record) if record.state() == ActivityState::Resumed => {}
            Ok(record) => violations.push(format!(
                "stack {stack} resumed pointer {activity} is {}",
                record.state()
            )),
            Err(_) => violations.push(format!("stack {stack} resumed pointer {activity} is dangling")),
        }
        if hierarchy.stack_of_activity(activity).ok() != Some(stack) {
            violations.push(format!("resumed pointer {activity} is not in stack {stack}"));
        }
    }
    for (stack, activity) in focus.pausing() {
        match hierarchy.activity(activity) {
            Ok(record) if record.state() == ActivityState::Pausing => {}
            Ok(record) => violations.push(format!(
                "stack {stack} pausing pointer {activity} is {}",
                record.state()
            )),
            Err(_) => violations.push(format!("stack {stack} pausing pointer {activity} is dangling")),
        }
    }

    for stack in hierarchy.stacks() {
        for task_id in stack.tasks() {
            match hierarchy.task(*task_id) {
                Ok(task) if task.is_empty() => violations.push(format!("task {task_id} is empty")),
                Ok(task) if task.stack() != stack.id => violations.push(format!(
                    "task {task_id} listed in {} but owned by {}",
                    stack.id,
                    task.stack()
                )),
                Ok(_) => {}
                Err(_) => violations.push(format!("stack {} lists missing task {task_id}", stack.id)),
            }
        }
        let pausing_here = hierarchy
            .activities_in_stack_top_down(stack.id)
            .into_iter()
            .filter(|id| {
                hierarchy
                    .activity(*id)
                    .is_ok_and(|record| record.state() == ActivityState::Pausing)
            })
            .count();
        if pausing_here > 1 {
            violations.push(format!("stack {} has {pausing_here} pausing activities", stack.id));
        }
    }

    violations
}
