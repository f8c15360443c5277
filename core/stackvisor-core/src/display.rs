//! Displays: the z-ordered stack lists over which occlusion is computed.

use crate::types::{DisplayId, StackId};

#[derive(Debug, Clone)]
pub struct Display {
    pub id: DisplayId,
    /// Bottom to top.
    pub(crate) stacks: Vec<StackId>,
    pub can_show_with_insecure_keyguard: bool,
}

impl Display {
    pub(crate) fn new(id: DisplayId, can_show_with_insecure_keyguard: bool) -> Self {
        Self {
            id,
            stacks: Vec::new(),
            can_show_with_insecure_keyguard,
        }
    }

    /// Stacks bottom to top.
    pub fn stacks(&self) -> &[StackId] {
        &self.stacks
    }

    /// Stacks front to back, the order of the occlusion scan.
    pub fn stacks_top_down(&self) -> impl Iterator<Item = StackId> + '_ {
        self.stacks.iter().rev().copied()
    }

    pub fn top_stack(&self) -> Option<StackId> {
        self.stacks.last().copied()
    }

    pub fn stack_at(&self, index: usize) -> Option<StackId> {
        self.stacks.get(index).copied()
    }

    pub fn index_of(&self, stack: StackId) -> Option<usize> {
        self.stacks.iter().position(|id| *id == stack)
    }

    pub(crate) fn position_stack(&mut self, stack: StackId, on_top: bool) {
        self.stacks.retain(|id| *id != stack);
        if on_top {
            self.stacks.push(stack);
        } else {
            self.stacks.insert(0, stack);
        }
    }

    pub(crate) fn remove_stack(&mut self, stack: StackId) -> bool {
        let before = self.stacks.len();
        self.stacks.retain(|id| *id != stack);
        before != self.stacks.len()
    }
}
