//! Identifiers and small value types shared across the hierarchy.
//!
//! Every node of the display → stack → task → activity tree is addressed by a
//! stable integer id handed out by the [`Hierarchy`](crate::hierarchy::Hierarchy)
//! arena. Ids are never reused within one supervisor instance.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Stable token of an [`ActivityRecord`](crate::activity::ActivityRecord).
    ActivityId,
    "a"
);
id_type!(
    /// Stable id of a [`Task`](crate::task::Task).
    TaskId,
    "t"
);
id_type!(
    /// Stable id of a [`Stack`](crate::stack::Stack).
    StackId,
    "s"
);
id_type!(
    /// Stable id of a [`Display`](crate::display::Display).
    DisplayId,
    "d"
);
id_type!(
    /// OS process id of an attached client process.
    ProcessId,
    "pid"
);

/// Lifecycle state of a single activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    Initializing,
    Started,
    Resumed,
    Pausing,
    Paused,
    Stopping,
    Stopped,
    Finishing,
    Destroying,
    Destroyed,
    RestartingProcess,
}

impl ActivityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityState::Initializing => "initializing",
            ActivityState::Started => "started",
            ActivityState::Resumed => "resumed",
            ActivityState::Pausing => "pausing",
            ActivityState::Paused => "paused",
            ActivityState::Stopping => "stopping",
            ActivityState::Stopped => "stopped",
            ActivityState::Finishing => "finishing",
            ActivityState::Destroying => "destroying",
            ActivityState::Destroyed => "destroyed",
            ActivityState::RestartingProcess => "restarting_process",
        }
    }

    /// States on the `Finishing → Destroying → Destroyed` tail.
    pub fn is_teardown(&self) -> bool {
        matches!(
            self,
            ActivityState::Finishing | ActivityState::Destroying | ActivityState::Destroyed
        )
    }
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowingMode {
    Fullscreen,
    SplitScreenPrimary,
    SplitScreenSecondary,
    Pinned,
    Freeform,
}

impl WindowingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowingMode::Fullscreen => "fullscreen",
            WindowingMode::SplitScreenPrimary => "split_screen_primary",
            WindowingMode::SplitScreenSecondary => "split_screen_secondary",
            WindowingMode::Pinned => "pinned",
            WindowingMode::Freeform => "freeform",
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        match value {
            "fullscreen" => Some(WindowingMode::Fullscreen),
            "split_screen_primary" => Some(WindowingMode::SplitScreenPrimary),
            "split_screen_secondary" => Some(WindowingMode::SplitScreenSecondary),
            "pinned" => Some(WindowingMode::Pinned),
            "freeform" => Some(WindowingMode::Freeform),
            _ => None,
        }
    }

    pub fn is_split_screen(&self) -> bool {
        matches!(
            self,
            WindowingMode::SplitScreenPrimary | WindowingMode::SplitScreenSecondary
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Standard,
    Home,
    Recents,
    Assistant,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Standard => "standard",
            ActivityType::Home => "home",
            ActivityType::Recents => "recents",
            ActivityType::Assistant => "assistant",
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        match value {
            "standard" => Some(ActivityType::Standard),
            "home" => Some(ActivityType::Home),
            "recents" => Some(ActivityType::Recents),
            "assistant" => Some(ActivityType::Assistant),
            _ => None,
        }
    }
}

/// Result of the occlusion scan for one stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackVisibility {
    Visible,
    VisibleBehindTranslucent,
    Invisible,
}

impl StackVisibility {
    pub fn is_visible(&self) -> bool {
        !matches!(self, StackVisibility::Invisible)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    #[default]
    Standard,
    SingleTop,
    SingleTask,
    SingleInstance,
}

impl LaunchMode {
    pub fn from_name(value: &str) -> Option<Self> {
        match value {
            "standard" => Some(LaunchMode::Standard),
            "single_top" => Some(LaunchMode::SingleTop),
            "single_task" => Some(LaunchMode::SingleTask),
            "single_instance" => Some(LaunchMode::SingleInstance),
            _ => None,
        }
    }
}

/// Kind of asynchronous acknowledgement a pending operation waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutKind {
    Pause,
    Stop,
    Destroy,
    TranslucentConversion,
}

/// How a pending operation was resolved. Whichever arrives first wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    Acked,
    TimedOut,
    ProcessDied,
}

/// Screen rectangle handed to the bounds animator; never interpreted here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }
}
