//! Pending asynchronous operations with explicit deadlines.
//!
//! Each record waits for one acknowledgement from a client. The record is
//! consumed by whichever of ack, timeout or process death arrives first; the
//! later arrivals find nothing pending.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::types::{ActivityId, TimeoutKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingOperation {
    pub activity: ActivityId,
    pub kind: TimeoutKind,
    #[serde(serialize_with = "serialize_millis")]
    pub deadline: Duration,
}

fn serialize_millis<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

#[derive(Debug, Clone, Default)]
pub struct PendingOperations {
    deadlines: BTreeMap<(ActivityId, TimeoutKind), Duration>,
}

impl PendingOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms (or re-arms) the operation, replacing any earlier deadline.
    pub(crate) fn arm(&mut self, activity: ActivityId, kind: TimeoutKind, deadline: Duration) {
        self.deadlines.insert((activity, kind), deadline);
    }

    /// Consumes the operation; returns false if it was not pending.
    pub(crate) fn resolve(&mut self, activity: ActivityId, kind: TimeoutKind) -> bool {
        self.deadlines.remove(&(activity, kind)).is_some()
    }

    pub fn is_pending(&self, activity: ActivityId, kind: TimeoutKind) -> bool {
        self.deadlines.contains_key(&(activity, kind))
    }

    pub fn kinds_for(&self, activity: ActivityId) -> Vec<TimeoutKind> {
        self.deadlines
            .range((activity, TimeoutKind::Pause)..=(activity, TimeoutKind::TranslucentConversion))
            .map(|((_, kind), _)| *kind)
            .collect()
    }

    pub(crate) fn cancel_all_for(&mut self, activity: ActivityId) -> Vec<TimeoutKind> {
        let kinds = self.kinds_for(activity);
        for kind in &kinds {
            self.deadlines.remove(&(activity, *kind));
        }
        kinds
    }

    /// Removes and returns the earliest operation whose deadline has passed.
    pub(crate) fn pop_expired(&mut self, now: Duration) -> Option<PendingOperation> {
        let next = self.next()?;
        if next.deadline > now {
            return None;
        }
        self.deadlines.remove(&(next.activity, next.kind));
        Some(next)
    }

    /// Earliest pending operation; ties break on activity then kind.
    pub fn next(&self) -> Option<PendingOperation> {
        self.deadlines
            .iter()
            .min_by_key(|((activity, kind), deadline)| (**deadline, *activity, *kind))
            .map(|((activity, kind), deadline)| PendingOperation {
                activity: *activity,
                kind: *kind,
                deadline: *deadline,
            })
    }

    /// Every pending operation in deadline order.
    pub fn operations(&self) -> Vec<PendingOperation> {
        let mut operations: Vec<_> = self
            .deadlines
            .iter()
            .map(|((activity, kind), deadline)| PendingOperation {
                activity: *activity,
                kind: *kind,
                deadline: *deadline,
            })
            .collect();
        operations.sort_by_key(|op| (op.deadline, op.activity, op.kind));
        operations
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}
