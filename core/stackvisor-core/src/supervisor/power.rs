//! Sleep, wake and shutdown.

use crate::error::Result;
use crate::services::SystemServices;
use crate::types::{ActivityId, ActivityState, StackId};

use super::StackSupervisor;

impl<S: SystemServices> StackSupervisor<S> {
    /// Pauses every resumed activity and lets paused ones stop.
    pub fn go_to_sleep(&mut self) -> Result<()> {
        self.run_entry("go_to_sleep", |s| s.go_to_sleep_inner(false))
    }

    pub fn wake_up(&mut self) -> Result<()> {
        self.run_entry("wake_up", |s| {
            if s.shutting_down {
                tracing::warn!("Wake requested during shutdown");
                return Ok(());
            }
            s.sleeping = false;
            let ids: Vec<ActivityId> = s.hierarchy.activities().map(|record| record.id).collect();
            for activity in ids {
                s.hierarchy.activity_mut(activity)?.sleeping = false;
            }
            tracing::info!("Waking up");
            s.resume_requested = true;
            Ok(())
        })
    }

    /// Like sleep, but resumes stay blocked for good.
    pub fn shutdown(&mut self) -> Result<()> {
        self.run_entry("shutdown", |s| s.go_to_sleep_inner(true))
    }

    fn go_to_sleep_inner(&mut self, shutting_down: bool) -> Result<()> {
        self.sleeping = true;
        self.shutting_down |= shutting_down;
        tracing::info!(shutting_down, "Going to sleep");

        let resumed: Vec<StackId> = self.focus.resumed().map(|(stack, _)| stack).collect();
        for stack in resumed {
            self.start_pausing(stack, false, true, None)?;
        }

        let asleep: Vec<(ActivityId, ActivityState)> = self
            .hierarchy
            .activities()
            .filter(|record| {
                !record.finishing
                    && record.process.is_some()
                    && record.is_state(&[
                        ActivityState::Paused,
                        ActivityState::Stopping,
                        ActivityState::Stopped,
                    ])
            })
            .map(|record| (record.id, record.state))
            .collect();
        for (activity, state) in asleep {
            self.hierarchy.activity_mut(activity)?.sleeping = true;
            if state == ActivityState::Paused {
                self.add_to_stopping(activity);
            }
        }
        Ok(())
    }
}
