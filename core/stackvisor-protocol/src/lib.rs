//! Replay script schema and validation for stackvisor.
//!
//! A script is a versioned JSON document holding an ordered list of steps.
//! Hierarchy nodes are referred to by caller-chosen labels, so a script never
//! depends on the ids a supervisor happens to hand out. Validation checks the
//! schema and that every label is defined before it is used; the replay tool
//! remains the authority on whether a step succeeds.

use std::collections::BTreeSet;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

pub const SCRIPT_VERSION: u32 = 1;
pub const MAX_SCRIPT_BYTES: usize = 1024 * 1024; // 1MB
pub const MAX_STEPS: usize = 10_000;
const MAX_LABEL_LEN: usize = 64;

pub const WINDOWING_MODES: &[&str] = &[
    "fullscreen",
    "split_screen_primary",
    "split_screen_secondary",
    "pinned",
    "freeform",
];
pub const ACTIVITY_TYPES: &[&str] = &["standard", "home", "recents", "assistant"];
pub const LAUNCH_MODES: &[&str] = &["standard", "single_top", "single_task", "single_instance"];
pub const ACTIVITY_STATES: &[&str] = &[
    "initializing",
    "resumed",
    "pausing",
    "paused",
    "started",
    "stopping",
    "stopped",
    "finishing",
    "destroying",
    "destroyed",
    "restarting_process",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    pub version: u32,
    #[serde(default)]
    pub description: Option<String>,
    /// RFC3339 authoring timestamp, informational only.
    #[serde(default)]
    pub recorded_at: Option<String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    AddDisplay {
        label: String,
        #[serde(default)]
        can_show_with_insecure_keyguard: bool,
    },
    CreateStack {
        label: String,
        /// Defaults to the supervisor's default display.
        #[serde(default)]
        display: Option<String>,
        #[serde(default = "default_windowing_mode")]
        windowing_mode: String,
        #[serde(default = "default_activity_type")]
        activity_type: String,
        #[serde(default = "default_true")]
        on_top: bool,
    },
    StartActivity {
        label: String,
        component: String,
        process: String,
        #[serde(default)]
        stack: Option<String>,
        #[serde(default)]
        new_task: bool,
        #[serde(default)]
        launch_mode: Option<String>,
        #[serde(default)]
        affinity: Option<String>,
        #[serde(default)]
        intent: Option<String>,
        #[serde(default)]
        translucent: bool,
        #[serde(default)]
        no_history: bool,
        #[serde(default)]
        show_when_locked: bool,
        #[serde(default)]
        dismiss_keyguard: bool,
        #[serde(default)]
        resume_while_pausing: bool,
        #[serde(default)]
        supports_picture_in_picture: bool,
        #[serde(default)]
        state_not_needed: bool,
    },
    AttachProcess {
        process: String,
        pid: u32,
    },
    ProcessDied {
        pid: u32,
    },
    /// Later deliveries to the pid fail as if the process had died.
    KillProcess {
        pid: u32,
    },
    ActivityPaused {
        activity: String,
    },
    ActivityStopped {
        activity: String,
    },
    ActivityDestroyed {
        activity: String,
    },
    ActivityIdle {
        activity: String,
    },
    ActivityDrawn {
        activity: String,
    },
    FinishActivity {
        activity: String,
    },
    SendResult {
        activity: String,
        result: String,
    },
    AdvanceTime {
        ms: u64,
    },
    MoveTaskToFront {
        activity: String,
    },
    MoveTaskToBack {
        activity: String,
    },
    RemoveTask {
        activity: String,
    },
    MoveTaskToPinned {
        activity: String,
        label: String,
        bounds: [i32; 4],
    },
    SetWindowingMode {
        stack: String,
        windowing_mode: String,
    },
    SetForceHidden {
        stack: String,
        hidden: bool,
    },
    SetKeyguardShown {
        showing: bool,
        #[serde(default)]
        aod_showing: bool,
    },
    SetKeyguardSecure {
        secure: bool,
    },
    SetKeyguardTrusted {
        trusted: bool,
    },
    KeyguardGoingAway,
    ConvertToTranslucent {
        activity: String,
    },
    ConvertFromTranslucent {
        activity: String,
    },
    RestartProcessIfVisible {
        activity: String,
    },
    GoToSleep,
    WakeUp,
    Shutdown,
    Resume,
    ExpectState {
        activity: String,
        state: String,
    },
    /// Prints a snapshot at this point of the replay.
    Dump,
}

fn default_windowing_mode() -> String {
    "fullscreen".to_string()
}

fn default_activity_type() -> String {
    "standard".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }

    fn at_step(index: usize, code: &str, message: impl Into<String>) -> Self {
        Self::new(code, format!("step {}: {}", index, message.into()))
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorInfo {}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::AddDisplay { .. } => "add_display",
            Step::CreateStack { .. } => "create_stack",
            Step::StartActivity { .. } => "start_activity",
            Step::AttachProcess { .. } => "attach_process",
            Step::ProcessDied { .. } => "process_died",
            Step::KillProcess { .. } => "kill_process",
            Step::ActivityPaused { .. } => "activity_paused",
            Step::ActivityStopped { .. } => "activity_stopped",
            Step::ActivityDestroyed { .. } => "activity_destroyed",
            Step::ActivityIdle { .. } => "activity_idle",
            Step::ActivityDrawn { .. } => "activity_drawn",
            Step::FinishActivity { .. } => "finish_activity",
            Step::SendResult { .. } => "send_result",
            Step::AdvanceTime { .. } => "advance_time",
            Step::MoveTaskToFront { .. } => "move_task_to_front",
            Step::MoveTaskToBack { .. } => "move_task_to_back",
            Step::RemoveTask { .. } => "remove_task",
            Step::MoveTaskToPinned { .. } => "move_task_to_pinned",
            Step::SetWindowingMode { .. } => "set_windowing_mode",
            Step::SetForceHidden { .. } => "set_force_hidden",
            Step::SetKeyguardShown { .. } => "set_keyguard_shown",
            Step::SetKeyguardSecure { .. } => "set_keyguard_secure",
            Step::SetKeyguardTrusted { .. } => "set_keyguard_trusted",
            Step::KeyguardGoingAway => "keyguard_going_away",
            Step::ConvertToTranslucent { .. } => "convert_to_translucent",
            Step::ConvertFromTranslucent { .. } => "convert_from_translucent",
            Step::RestartProcessIfVisible { .. } => "restart_process_if_visible",
            Step::GoToSleep => "go_to_sleep",
            Step::WakeUp => "wake_up",
            Step::Shutdown => "shutdown",
            Step::Resume => "resume",
            Step::ExpectState { .. } => "expect_state",
            Step::Dump => "dump",
        }
    }
}

/// Labels defined so far while walking a script in order.
#[derive(Default)]
struct Labels {
    displays: BTreeSet<String>,
    stacks: BTreeSet<String>,
    activities: BTreeSet<String>,
}

impl Script {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        if self.version != SCRIPT_VERSION {
            return Err(ErrorInfo::new(
                "unsupported_version",
                format!(
                    "script version {} is not supported (expected {})",
                    self.version, SCRIPT_VERSION
                ),
            ));
        }
        if let Some(recorded_at) = &self.recorded_at {
            if DateTime::parse_from_rfc3339(recorded_at).is_err() {
                return Err(ErrorInfo::new(
                    "invalid_timestamp",
                    "recorded_at must be RFC3339",
                ));
            }
        }
        if self.steps.is_empty() {
            return Err(ErrorInfo::new("empty_script", "script has no steps"));
        }
        if self.steps.len() > MAX_STEPS {
            return Err(ErrorInfo::new(
                "too_many_steps",
                format!("script must have {} steps or fewer", MAX_STEPS),
            ));
        }

        let mut labels = Labels::default();
        for (index, step) in self.steps.iter().enumerate() {
            validate_step(index, step, &mut labels)?;
        }
        Ok(())
    }
}

pub fn parse_script(text: &str) -> Result<Script, ErrorInfo> {
    if text.len() > MAX_SCRIPT_BYTES {
        return Err(ErrorInfo::new(
            "script_too_large",
            format!("script must be {} bytes or fewer", MAX_SCRIPT_BYTES),
        ));
    }
    let script: Script = serde_json::from_str(text).map_err(|err| {
        ErrorInfo::new("invalid_script", format!("script is invalid JSON: {}", err))
    })?;
    script.validate()?;
    Ok(script)
}

fn validate_step(index: usize, step: &Step, labels: &mut Labels) -> Result<(), ErrorInfo> {
    match step {
        Step::AddDisplay { label, .. } => define(index, label, &mut labels.displays),
        Step::CreateStack {
            label,
            display,
            windowing_mode,
            activity_type,
            ..
        } => {
            if let Some(display) = display {
                require_defined(index, display, &labels.displays, "display")?;
            }
            require_name(index, windowing_mode, WINDOWING_MODES, "windowing_mode")?;
            require_name(index, activity_type, ACTIVITY_TYPES, "activity_type")?;
            define(index, label, &mut labels.stacks)
        }
        Step::StartActivity {
            label,
            component,
            process,
            stack,
            launch_mode,
            ..
        } => {
            require_string(index, component, "component")?;
            require_string(index, process, "process")?;
            if let Some(stack) = stack {
                require_defined(index, stack, &labels.stacks, "stack")?;
            }
            if let Some(launch_mode) = launch_mode {
                require_name(index, launch_mode, LAUNCH_MODES, "launch_mode")?;
            }
            define(index, label, &mut labels.activities)
        }
        Step::AttachProcess { process, pid } => {
            require_string(index, process, "process")?;
            require_pid(index, *pid)
        }
        Step::ProcessDied { pid } | Step::KillProcess { pid } => require_pid(index, *pid),
        Step::ActivityPaused { activity }
        | Step::ActivityStopped { activity }
        | Step::ActivityDestroyed { activity }
        | Step::ActivityIdle { activity }
        | Step::ActivityDrawn { activity }
        | Step::FinishActivity { activity }
        | Step::SendResult { activity, .. }
        | Step::MoveTaskToFront { activity }
        | Step::MoveTaskToBack { activity }
        | Step::RemoveTask { activity }
        | Step::ConvertToTranslucent { activity }
        | Step::ConvertFromTranslucent { activity }
        | Step::RestartProcessIfVisible { activity } => {
            require_defined(index, activity, &labels.activities, "activity")
        }
        Step::MoveTaskToPinned {
            activity,
            label,
            bounds,
        } => {
            require_defined(index, activity, &labels.activities, "activity")?;
            let [left, top, right, bottom] = *bounds;
            if right <= left || bottom <= top {
                return Err(ErrorInfo::at_step(
                    index,
                    "invalid_bounds",
                    "bounds must be [left, top, right, bottom] with positive size",
                ));
            }
            // The pinned stack may already exist; its label can be reused.
            validate_label(index, label)?;
            labels.stacks.insert(label.clone());
            Ok(())
        }
        Step::SetWindowingMode {
            stack,
            windowing_mode,
        } => {
            require_defined(index, stack, &labels.stacks, "stack")?;
            require_name(index, windowing_mode, WINDOWING_MODES, "windowing_mode")
        }
        Step::SetForceHidden { stack, .. } => require_defined(index, stack, &labels.stacks, "stack"),
        Step::ExpectState { activity, state } => {
            require_defined(index, activity, &labels.activities, "activity")?;
            require_name(index, state, ACTIVITY_STATES, "state")
        }
        Step::AdvanceTime { .. }
        | Step::SetKeyguardShown { .. }
        | Step::SetKeyguardSecure { .. }
        | Step::SetKeyguardTrusted { .. }
        | Step::KeyguardGoingAway
        | Step::GoToSleep
        | Step::WakeUp
        | Step::Shutdown
        | Step::Resume
        | Step::Dump => Ok(()),
    }
}

fn validate_label(index: usize, label: &str) -> Result<(), ErrorInfo> {
    if label.trim().is_empty() {
        return Err(ErrorInfo::at_step(index, "invalid_label", "label is required"));
    }
    if label.len() > MAX_LABEL_LEN {
        return Err(ErrorInfo::at_step(
            index,
            "invalid_label",
            format!("label must be {} characters or fewer", MAX_LABEL_LEN),
        ));
    }
    Ok(())
}

fn define(index: usize, label: &str, defined: &mut BTreeSet<String>) -> Result<(), ErrorInfo> {
    validate_label(index, label)?;
    if !defined.insert(label.to_string()) {
        return Err(ErrorInfo::at_step(
            index,
            "duplicate_label",
            format!("label '{}' is already defined", label),
        ));
    }
    Ok(())
}

fn require_defined(
    index: usize,
    label: &str,
    defined: &BTreeSet<String>,
    kind: &str,
) -> Result<(), ErrorInfo> {
    if defined.contains(label) {
        return Ok(());
    }
    Err(ErrorInfo::at_step(
        index,
        "unknown_label",
        format!("{} '{}' is not defined by an earlier step", kind, label),
    ))
}

fn require_name(index: usize, value: &str, allowed: &[&str], field: &str) -> Result<(), ErrorInfo> {
    if allowed.contains(&value) {
        return Ok(());
    }
    Err(ErrorInfo::at_step(
        index,
        "invalid_value",
        format!("{} must be one of {}", field, allowed.join(", ")),
    ))
}

fn require_string(index: usize, value: &str, field: &str) -> Result<(), ErrorInfo> {
    if value.trim().is_empty() {
        return Err(ErrorInfo::at_step(
            index,
            "missing_field",
            format!("{} is required", field),
        ));
    }
    Ok(())
}

fn require_pid(index: usize, pid: u32) -> Result<(), ErrorInfo> {
    if pid == 0 {
        return Err(ErrorInfo::at_step(index, "invalid_pid", "pid must be non-zero"));
    }
    Ok(())
}
