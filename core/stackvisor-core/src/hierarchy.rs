//! Arena that owns every display, stack, task and activity.
//!
//! Forward links (display → stacks → tasks → activities) are ordered id lists
//! held by the parent; back links (activity → task → stack → display) are plain
//! ids on the child. Both are updated together by the methods here, so a
//! reparent or removal never leaves a dangling reference behind.

use std::collections::BTreeMap;

use crate::activity::{ActivityRecord, ActivitySpec};
use crate::display::Display;
use crate::error::{Result, StackError};
use crate::stack::Stack;
use crate::task::Task;
use crate::types::{
    ActivityId, ActivityType, DisplayId, ProcessId, StackId, TaskId, WindowingMode,
};

/// What `remove_activity` tore down along with the record.
#[derive(Debug)]
pub struct RemovedActivity {
    pub record: ActivityRecord,
    pub stack: StackId,
    pub task_removed: bool,
}

#[derive(Debug, Default)]
pub struct Hierarchy {
    displays: BTreeMap<DisplayId, Display>,
    /// Bottom to top; the last display holds the globally focused stack.
    display_order: Vec<DisplayId>,
    stacks: BTreeMap<StackId, Stack>,
    tasks: BTreeMap<TaskId, Task>,
    activities: BTreeMap<ActivityId, ActivityRecord>,
    next_id: u32,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    // ─────────────────────────────────────────────────────────────────────
    // Construction
    // ─────────────────────────────────────────────────────────────────────

    pub fn add_display(&mut self, can_show_with_insecure_keyguard: bool) -> DisplayId {
        let id = DisplayId(self.allocate());
        self.displays
            .insert(id, Display::new(id, can_show_with_insecure_keyguard));
        self.display_order.push(id);
        id
    }

    pub fn create_stack(
        &mut self,
        display: DisplayId,
        windowing_mode: WindowingMode,
        activity_type: ActivityType,
        on_top: bool,
    ) -> Result<StackId> {
        if !self.displays.contains_key(&display) {
            return Err(StackError::UnknownDisplay(display));
        }
        let id = StackId(self.allocate());
        self.stacks
            .insert(id, Stack::new(id, display, windowing_mode, activity_type));
        self.display_mut(display)?.position_stack(id, on_top);
        Ok(id)
    }

    pub fn create_task(&mut self, stack: StackId, affinity: String, on_top: bool) -> Result<TaskId> {
        if !self.stacks.contains_key(&stack) {
            return Err(StackError::UnknownStack(stack));
        }
        let id = TaskId(self.allocate());
        self.tasks.insert(id, Task::new(id, stack, affinity));
        self.stack_mut(stack)?.position_task(id, on_top);
        Ok(id)
    }

    /// Creates an activity record on top of `task`.
    pub fn add_activity(&mut self, task: TaskId, spec: ActivitySpec) -> Result<ActivityId> {
        if !self.tasks.contains_key(&task) {
            return Err(StackError::UnknownTask(task));
        }
        let id = ActivityId(self.allocate());
        self.activities
            .insert(id, ActivityRecord::new(id, task, spec));
        self.task_mut(task)?.add_on_top(id);
        Ok(id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lookups
    // ─────────────────────────────────────────────────────────────────────

    pub fn display(&self, id: DisplayId) -> Result<&Display> {
        self.displays.get(&id).ok_or(StackError::UnknownDisplay(id))
    }

    pub(crate) fn display_mut(&mut self, id: DisplayId) -> Result<&mut Display> {
        self.displays
            .get_mut(&id)
            .ok_or(StackError::UnknownDisplay(id))
    }

    pub fn stack(&self, id: StackId) -> Result<&Stack> {
        self.stacks.get(&id).ok_or(StackError::UnknownStack(id))
    }

    pub(crate) fn stack_mut(&mut self, id: StackId) -> Result<&mut Stack> {
        self.stacks.get_mut(&id).ok_or(StackError::UnknownStack(id))
    }

    pub fn task(&self, id: TaskId) -> Result<&Task> {
        self.tasks.get(&id).ok_or(StackError::UnknownTask(id))
    }

    pub(crate) fn task_mut(&mut self, id: TaskId) -> Result<&mut Task> {
        self.tasks.get_mut(&id).ok_or(StackError::UnknownTask(id))
    }

    pub fn activity(&self, id: ActivityId) -> Result<&ActivityRecord> {
        self.activities
            .get(&id)
            .ok_or(StackError::UnknownActivity(id))
    }

    pub(crate) fn activity_mut(&mut self, id: ActivityId) -> Result<&mut ActivityRecord> {
        self.activities
            .get_mut(&id)
            .ok_or(StackError::UnknownActivity(id))
    }

    pub fn contains_activity(&self, id: ActivityId) -> bool {
        self.activities.contains_key(&id)
    }

    pub fn activities(&self) -> impl Iterator<Item = &ActivityRecord> {
        self.activities.values()
    }

    pub fn stacks(&self) -> impl Iterator<Item = &Stack> {
        self.stacks.values()
    }

    pub fn stack_ids(&self) -> Vec<StackId> {
        self.stacks.keys().copied().collect()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Displays front to back.
    pub fn displays_top_down(&self) -> Vec<DisplayId> {
        self.display_order.iter().rev().copied().collect()
    }

    pub fn stack_of_activity(&self, activity: ActivityId) -> Result<StackId> {
        let task = self.activity(activity)?.task;
        Ok(self.task(task)?.stack)
    }

    pub fn display_of_stack(&self, stack: StackId) -> Result<DisplayId> {
        Ok(self.stack(stack)?.display)
    }

    /// Every activity of the stack, front to back.
    pub fn activities_in_stack_top_down(&self, stack: StackId) -> Vec<ActivityId> {
        let Ok(stack) = self.stack(stack) else {
            return Vec::new();
        };
        stack
            .tasks
            .iter()
            .rev()
            .filter_map(|task| self.tasks.get(task))
            .flat_map(|task| task.activities.iter().rev().copied())
            .collect()
    }

    pub fn activities_in_process(&self, process: ProcessId) -> Vec<ActivityId> {
        self.activities
            .values()
            .filter(|activity| activity.process == Some(process))
            .map(|activity| activity.id)
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Running-activity queries
    // ─────────────────────────────────────────────────────────────────────

    fn is_running(&self, activity: ActivityId, focusable_only: bool) -> bool {
        self.activities.get(&activity).is_some_and(|record| {
            !record.finishing && !record.state.is_teardown() && (!focusable_only || record.spec.focusable)
        })
    }

    pub fn top_running_activity_in_task(
        &self,
        task: TaskId,
        focusable_only: bool,
    ) -> Option<ActivityId> {
        self.tasks.get(&task).and_then(|task| {
            task.activities
                .iter()
                .rev()
                .copied()
                .find(|id| self.is_running(*id, focusable_only))
        })
    }

    pub fn top_running_activity_in_stack(
        &self,
        stack: StackId,
        focusable_only: bool,
    ) -> Option<ActivityId> {
        let stack = self.stacks.get(&stack)?;
        stack
            .tasks
            .iter()
            .rev()
            .find_map(|task| self.top_running_activity_in_task(*task, focusable_only))
    }

    pub fn has_running_activity(&self, stack: StackId) -> bool {
        self.top_running_activity_in_stack(stack, false).is_some()
    }

    pub fn top_running_activity_on_display(
        &self,
        display: DisplayId,
        focusable_only: bool,
    ) -> Option<ActivityId> {
        let display = self.displays.get(&display)?;
        display.stacks_top_down().find_map(|stack_id| {
            let stack = self.stacks.get(&stack_id)?;
            if focusable_only && !stack.is_focusable() {
                return None;
            }
            self.top_running_activity_in_stack(stack_id, focusable_only)
        })
    }

    /// Topmost running activity across all displays.
    pub fn top_running_activity(&self, focusable_only: bool) -> Option<ActivityId> {
        self.displays_top_down()
            .into_iter()
            .find_map(|display| self.top_running_activity_on_display(display, focusable_only))
    }

    /// Lowest non-finishing activity of the task; bounds clear/reset operations.
    pub fn effective_root(&self, task: TaskId) -> Option<ActivityId> {
        self.tasks.get(&task).and_then(|task| {
            task.activities.iter().copied().find(|id| {
                self.activities
                    .get(id)
                    .is_some_and(|record| !record.finishing)
            })
        })
    }

    pub fn home_stack(&self, display: DisplayId) -> Option<StackId> {
        let display = self.displays.get(&display)?;
        display
            .stacks_top_down()
            .find(|id| self.stacks.get(id).is_some_and(|stack| stack.is_home()))
    }

    pub fn stacks_with_mode(&self, display: DisplayId, mode: WindowingMode) -> Vec<StackId> {
        let Some(display) = self.displays.get(&display) else {
            return Vec::new();
        };
        display
            .stacks_top_down()
            .filter(|id| {
                self.stacks
                    .get(id)
                    .is_some_and(|stack| stack.windowing_mode == mode)
            })
            .collect()
    }

    pub fn is_top_not_pinned_stack(&self, stack: StackId) -> bool {
        let Ok(display) = self.display_of_stack(stack).and_then(|id| self.display(id)) else {
            return false;
        };
        display
            .stacks_top_down()
            .find(|id| {
                self.stacks
                    .get(id)
                    .is_some_and(|stack| stack.windowing_mode != WindowingMode::Pinned)
            })
            == Some(stack)
    }

    /// Topmost task on the display whose affinity matches.
    pub fn find_task_by_affinity(&self, display: DisplayId, affinity: &str) -> Option<TaskId> {
        let display = self.displays.get(&display)?;
        display.stacks_top_down().find_map(|stack_id| {
            let stack = self.stacks.get(&stack_id)?;
            stack.tasks.iter().rev().copied().find(|task| {
                self.tasks.get(task).is_some_and(|task| task.affinity == affinity)
                    && self.top_running_activity_in_task(*task, false).is_some()
            })
        })
    }

    /// Topmost running instance of `component` on the display.
    pub fn find_activity_by_component(
        &self,
        display: DisplayId,
        component: &str,
    ) -> Option<ActivityId> {
        let display = self.displays.get(&display)?;
        display.stacks_top_down().find_map(|stack| {
            self.activities_in_stack_top_down(stack)
                .into_iter()
                .find(|id| {
                    self.is_running(*id, false)
                        && self
                            .activities
                            .get(id)
                            .is_some_and(|record| record.spec.component == component)
                })
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Ordering
    // ─────────────────────────────────────────────────────────────────────

    pub fn move_task_to_top(&mut self, task: TaskId) -> Result<()> {
        let stack = self.task(task)?.stack;
        self.stack_mut(stack)?.position_task(task, true);
        Ok(())
    }

    pub fn move_task_to_bottom(&mut self, task: TaskId) -> Result<()> {
        let stack = self.task(task)?.stack;
        self.stack_mut(stack)?.position_task(task, false);
        Ok(())
    }

    /// Moves the stack to the top of its display and the display to the top.
    pub fn move_stack_to_front(&mut self, stack: StackId) -> Result<()> {
        let display = self.stack(stack)?.display;
        self.display_mut(display)?.position_stack(stack, true);
        self.display_order.retain(|id| *id != display);
        self.display_order.push(display);
        Ok(())
    }

    pub fn move_stack_to_back(&mut self, stack: StackId) -> Result<()> {
        let display = self.stack(stack)?.display;
        self.display_mut(display)?.position_stack(stack, false);
        Ok(())
    }

    /// Moves a task into another stack, returning the stack it left.
    pub fn reparent_task(&mut self, task: TaskId, to: StackId, on_top: bool) -> Result<StackId> {
        if !self.stacks.contains_key(&to) {
            return Err(StackError::UnknownStack(to));
        }
        let from = self.task(task)?.stack;
        if from == to {
            self.stack_mut(to)?.position_task(task, on_top);
            return Ok(from);
        }
        self.stack_mut(from)?.remove_task(task);
        self.stack_mut(to)?.position_task(task, on_top);
        self.task_mut(task)?.stack = to;
        Ok(from)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Removal
    // ─────────────────────────────────────────────────────────────────────

    /// Removes an activity record; its task goes with it when left empty.
    pub fn remove_activity(&mut self, activity: ActivityId) -> Result<RemovedActivity> {
        let record = self
            .activities
            .remove(&activity)
            .ok_or(StackError::UnknownActivity(activity))?;
        let task_id = record.task;
        let task = self.task_mut(task_id)?;
        task.remove(activity);
        let stack = task.stack;
        let task_removed = task.is_empty();
        if task_removed {
            self.tasks.remove(&task_id);
            self.stack_mut(stack)?.remove_task(task_id);
        }
        self.stack_mut(stack)?.forget_activity(activity);
        Ok(RemovedActivity {
            record,
            stack,
            task_removed,
        })
    }

    /// Removes an empty stack from its display.
    pub fn remove_stack(&mut self, stack: StackId) -> Result<Stack> {
        let record = self.stack(stack)?;
        if !record.is_empty() {
            return Err(StackError::InvariantViolation(format!(
                "refusing to remove non-empty stack {stack}"
            )));
        }
        let display = record.display;
        self.display_mut(display)?.remove_stack(stack);
        self.stacks
            .remove(&stack)
            .ok_or(StackError::UnknownStack(stack))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(component: &str) -> ActivitySpec {
        ActivitySpec::new(component, "com.example")
    }

    fn fixture() -> (Hierarchy, DisplayId, StackId, TaskId) {
        let mut hierarchy = Hierarchy::new();
        let display = hierarchy.add_display(false);
        let stack = hierarchy
            .create_stack(display, WindowingMode::Fullscreen, ActivityType::Standard, true)
            .unwrap();
        let task = hierarchy
            .create_task(stack, "com.example".to_string(), true)
            .unwrap();
        (hierarchy, display, stack, task)
    }

    #[test]
    fn top_running_skips_finishing_activities() {
        let (mut hierarchy, _, stack, task) = fixture();
        let bottom = hierarchy.add_activity(task, spec("com.example/.A")).unwrap();
        let top = hierarchy.add_activity(task, spec("com.example/.B")).unwrap();
        assert_eq!(hierarchy.top_running_activity_in_stack(stack, false), Some(top));

        hierarchy.activity_mut(top).unwrap().finishing = true;
        assert_eq!(
            hierarchy.top_running_activity_in_stack(stack, false),
            Some(bottom)
        );
    }

    #[test]
    fn focusable_only_skips_unfocusable_activities() {
        let (mut hierarchy, _, stack, task) = fixture();
        let focusable = hierarchy.add_activity(task, spec("com.example/.A")).unwrap();
        let mut overlay = spec("com.example/.Overlay");
        overlay.focusable = false;
        let overlay = hierarchy.add_activity(task, overlay).unwrap();

        assert_eq!(hierarchy.top_running_activity_in_stack(stack, false), Some(overlay));
        assert_eq!(
            hierarchy.top_running_activity_in_stack(stack, true),
            Some(focusable)
        );
    }

    #[test]
    fn removing_last_activity_removes_task() {
        let (mut hierarchy, _, stack, task) = fixture();
        let activity = hierarchy.add_activity(task, spec("com.example/.A")).unwrap();
        let removed = hierarchy.remove_activity(activity).unwrap();

        assert!(removed.task_removed);
        assert_eq!(removed.stack, stack);
        assert!(hierarchy.task(task).is_err());
        assert!(hierarchy.stack(stack).unwrap().is_empty());
    }

    #[test]
    fn reparent_updates_both_links() {
        let (mut hierarchy, display, from, task) = fixture();
        hierarchy.add_activity(task, spec("com.example/.A")).unwrap();
        let to = hierarchy
            .create_stack(display, WindowingMode::Pinned, ActivityType::Standard, true)
            .unwrap();

        assert_eq!(hierarchy.reparent_task(task, to, true).unwrap(), from);
        assert_eq!(hierarchy.task(task).unwrap().stack(), to);
        assert!(hierarchy.stack(from).unwrap().is_empty());
        assert_eq!(hierarchy.stack(to).unwrap().top_task(), Some(task));
    }

    #[test]
    fn remove_stack_refuses_non_empty() {
        let (mut hierarchy, _, stack, task) = fixture();
        hierarchy.add_activity(task, spec("com.example/.A")).unwrap();
        assert!(hierarchy.remove_stack(stack).is_err());
    }

    #[test]
    fn effective_root_skips_finishing_bottom() {
        let (mut hierarchy, _, _, task) = fixture();
        let root = hierarchy.add_activity(task, spec("com.example/.Root")).unwrap();
        let next = hierarchy.add_activity(task, spec("com.example/.Next")).unwrap();
        assert_eq!(hierarchy.effective_root(task), Some(root));

        hierarchy.activity_mut(root).unwrap().finishing = true;
        assert_eq!(hierarchy.effective_root(task), Some(next));
    }

    #[test]
    fn move_stack_to_front_raises_display() {
        let (mut hierarchy, first, stack, _) = fixture();
        let second = hierarchy.add_display(false);
        assert_eq!(hierarchy.displays_top_down()[0], second);

        hierarchy.move_stack_to_front(stack).unwrap();
        assert_eq!(hierarchy.displays_top_down()[0], first);
    }

    #[test]
    fn find_activity_by_component_ignores_finishing() {
        let (mut hierarchy, display, _, task) = fixture();
        let activity = hierarchy.add_activity(task, spec("com.example/.A")).unwrap();
        assert_eq!(
            hierarchy.find_activity_by_component(display, "com.example/.A"),
            Some(activity)
        );
        hierarchy.activity_mut(activity).unwrap().finishing = true;
        assert_eq!(
            hierarchy.find_activity_by_component(display, "com.example/.A"),
            None
        );
    }
}
