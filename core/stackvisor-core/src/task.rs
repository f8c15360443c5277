//! Tasks: z-ordered groups of activities representing one user journey.

use crate::types::{ActivityId, StackId, TaskId};

#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub affinity: String,
    pub(crate) stack: StackId,
    /// Bottom to top.
    pub(crate) activities: Vec<ActivityId>,
}

impl Task {
    pub(crate) fn new(id: TaskId, stack: StackId, affinity: String) -> Self {
        Self {
            id,
            affinity,
            stack,
            activities: Vec::new(),
        }
    }

    pub fn stack(&self) -> StackId {
        self.stack
    }

    /// Activities bottom to top.
    pub fn activities(&self) -> &[ActivityId] {
        &self.activities
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    pub fn contains(&self, activity: ActivityId) -> bool {
        self.activities.contains(&activity)
    }

    pub fn top(&self) -> Option<ActivityId> {
        self.activities.last().copied()
    }

    pub(crate) fn add_on_top(&mut self, activity: ActivityId) {
        self.activities.retain(|id| *id != activity);
        self.activities.push(activity);
    }

    pub(crate) fn remove(&mut self, activity: ActivityId) -> bool {
        let before = self.activities.len();
        self.activities.retain(|id| *id != activity);
        before != self.activities.len()
    }

    /// Activities stacked above `activity`, nearest first.
    pub fn above(&self, activity: ActivityId) -> Vec<ActivityId> {
        match self.activities.iter().position(|id| *id == activity) {
            Some(index) => self.activities[index + 1..].iter().rev().copied().collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with(ids: &[u32]) -> Task {
        let mut task = Task::new(TaskId(1), StackId(1), "com.example".to_string());
        for id in ids {
            task.add_on_top(ActivityId(*id));
        }
        task
    }

    #[test]
    fn add_on_top_moves_existing_entry() {
        let mut task = task_with(&[1, 2, 3]);
        task.add_on_top(ActivityId(1));
        assert_eq!(
            task.activities(),
            &[ActivityId(2), ActivityId(3), ActivityId(1)]
        );
        assert_eq!(task.top(), Some(ActivityId(1)));
    }

    #[test]
    fn above_lists_nearest_first() {
        let task = task_with(&[1, 2, 3, 4]);
        assert_eq!(task.above(ActivityId(2)), vec![ActivityId(4), ActivityId(3)]);
        assert!(task.above(ActivityId(4)).is_empty());
        assert!(task.above(ActivityId(9)).is_empty());
    }

    #[test]
    fn remove_reports_membership() {
        let mut task = task_with(&[1]);
        assert!(task.remove(ActivityId(1)));
        assert!(!task.remove(ActivityId(1)));
        assert!(task.is_empty());
    }
}
